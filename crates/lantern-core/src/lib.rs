pub mod ast;
pub mod builtins;
pub mod env;
pub mod error;
pub mod eval;
pub mod options;
pub mod reader;
pub mod symbols;
pub mod vm;

use std::path::Path;

use ast::Value;
use error::LanternError;
use eval::Interp;
use options::EvalOptions;

/// Evaluate a source text in a fresh interpreter, propagating the
/// first error. Library and test entry point; the CLI drives an
/// `Interp` directly for per-form recovery.
pub fn eval_source(src: &str, options: Option<EvalOptions>) -> Result<Value, LanternError> {
    let mut interp = Interp::with_options(options.unwrap_or_default());
    interp.eval_source(src)
}

pub fn eval_file(path: &Path, options: Option<EvalOptions>) -> Result<Value, LanternError> {
    let source = std::fs::read_to_string(path)
        .map_err(|err| LanternError::message(format!("could not read {}: {}", path.display(), err)))?;
    let mut options = options.unwrap_or_default();
    if options.source_name.is_none() {
        options.source_name = Some(path.display().to_string());
    }
    eval_source(&source, Some(options))
}
