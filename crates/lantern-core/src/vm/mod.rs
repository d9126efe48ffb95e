pub mod bytecode;
pub mod compiler;
pub mod runtime;

pub use bytecode::CompiledFn;
pub use compiler::compile_function;
