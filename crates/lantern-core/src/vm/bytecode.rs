use std::fmt;
use std::sync::Mutex;

use crate::ast::{Function, Params, Value};
use crate::builtins::BuiltinFn;

#[derive(Clone, Debug)]
pub enum Instruction {
    /// Push a constant-pool entry.
    Const(usize),
    ConstInt(i64),
    ConstFloat(f64),
    ConstNil,
    /// Push the value bound to an argument slot.
    LoadArg(usize),
    /// Full evaluator symbol resolution at runtime (bound value, T,
    /// NIL or the self-quoting symbol).
    LoadSymbol(usize),
    /// Pop into a local binding (loop variables stay dynamically
    /// visible to callees).
    StoreVar(usize),
    StoreGlobal(usize),
    /// Pop an item, prepend it to the named place, push the new list.
    PushPlace(usize),
    PopPlace(usize),
    SaveLocals,
    RestoreLocals,
    Dup,
    Pop,
    Jump(usize),
    /// Pop; jump when the popped value is nil.
    JumpIfNil(usize),
    /// Pop into an untyped auxiliary slot.
    StoreSlot(usize),
    /// Pop into a typed integer slot; a non-integer is a runtime type
    /// error (loop counts must be integers).
    StoreSlotInt(usize),
    LoadSlotInt(usize),
    IncSlot(usize),
    JumpIfSlotGe { a: usize, b: usize, target: usize },
    /// Loop-exit test for list iteration: jump when `index` has
    /// reached the end of the list held in `list`.
    JumpIfIterDone { list: usize, index: usize, target: usize },
    LoadElement { list: usize, index: usize },
    /// Dispatch through the chunk's call-site cell for this site; pops
    /// `argc` operand values, pushes the result.
    CallSite { site: usize, argc: usize },
    Return,
}

#[derive(Clone, Debug, Default)]
pub struct Chunk {
    code: Vec<Instruction>,
    constants: Vec<Value>,
    names: Vec<String>,
    call_sites: Vec<String>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn call_sites(&self) -> &[String] {
        &self.call_sites
    }

    pub fn push(&mut self, instr: Instruction) -> usize {
        let idx = self.code.len();
        self.code.push(instr);
        idx
    }

    pub fn add_const(&mut self, value: Value) -> usize {
        let idx = self.constants.len();
        self.constants.push(value);
        idx
    }

    pub fn add_name(&mut self, name: &str) -> usize {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        idx
    }

    pub fn add_call_site(&mut self, name: &str) -> usize {
        let idx = self.call_sites.len();
        self.call_sites.push(name.to_string());
        idx
    }

    pub fn patch_jump(&mut self, at: usize, new_target: usize) -> Result<(), String> {
        match self.code.get_mut(at) {
            Some(Instruction::Jump(target))
            | Some(Instruction::JumpIfNil(target))
            | Some(Instruction::JumpIfSlotGe { target, .. })
            | Some(Instruction::JumpIfIterDone { target, .. }) => {
                *target = new_target;
                Ok(())
            }
            _ => Err(format!("invalid jump patch at {}", at)),
        }
    }
}

/// A lazily resolved, retargetable callee reference. A cell is valid
/// only while its recorded version matches the symbol table's current
/// version for the name; compiling or redefining the callee bumps the
/// version and the next dispatch re-resolves.
#[derive(Clone)]
pub(crate) enum CallTarget {
    Builtin(BuiltinFn),
    /// Snapshot of the callee at resolve time — an interpreted
    /// function acts as a trampoline into the evaluator, a compiled
    /// one is a direct bind.
    Function(Function),
    /// Neither builtin nor in the symbol table when resolved; fall
    /// back to full evaluator resolution each call.
    Dynamic,
}

pub(crate) struct CallCell {
    cached: Mutex<Option<(u64, CallTarget)>>,
}

impl CallCell {
    fn new() -> Self {
        Self {
            cached: Mutex::new(None),
        }
    }

    pub(crate) fn get(&self, version: u64) -> Option<CallTarget> {
        let cached = self.cached.lock().unwrap();
        match cached.as_ref() {
            Some((cached_version, target)) if *cached_version == version => Some(target.clone()),
            _ => None,
        }
    }

    pub(crate) fn set(&self, version: u64, target: CallTarget) {
        *self.cached.lock().unwrap() = Some((version, target));
    }
}

/// The lowered callable. Calling contract is identical to an
/// interpreted call: same arity check, same call-time optional
/// defaults, same save/merge/restore locals discipline.
pub struct CompiledFn {
    pub name: Option<String>,
    pub params: Params,
    pub chunk: Chunk,
    pub slot_count: usize,
    pub(crate) cells: Vec<CallCell>,
}

impl CompiledFn {
    pub fn new(name: Option<String>, params: Params, chunk: Chunk, slot_count: usize) -> Self {
        let cells = (0..chunk.call_sites().len())
            .map(|_| CallCell::new())
            .collect();
        Self {
            name,
            params,
            chunk,
            slot_count,
            cells,
        }
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let label = self.name.as_deref().unwrap_or("<LAMBDA>");
        out.push_str(&format!("== {} ==\n", label));
        out.push_str(&format!(
            "params: {} required, {} optional; {} slots\n",
            self.params.required.len(),
            self.params.optional.len(),
            self.slot_count
        ));
        for (idx, instr) in self.chunk.code().iter().enumerate() {
            out.push_str(&format!("{:04} {}\n", idx, self.render(instr)));
        }
        if !self.chunk.constants().is_empty() {
            out.push_str("constants:\n");
            for (idx, value) in self.chunk.constants().iter().enumerate() {
                out.push_str(&format!("  [{}] {}\n", idx, value));
            }
        }
        out
    }

    fn render(&self, instr: &Instruction) -> String {
        match instr {
            Instruction::Const(idx) => format!("Const {}", self.chunk.constants()[*idx]),
            Instruction::LoadSymbol(idx) => format!("LoadSymbol {}", self.chunk.names()[*idx]),
            Instruction::StoreVar(idx) => format!("StoreVar {}", self.chunk.names()[*idx]),
            Instruction::StoreGlobal(idx) => format!("StoreGlobal {}", self.chunk.names()[*idx]),
            Instruction::PushPlace(idx) => format!("PushPlace {}", self.chunk.names()[*idx]),
            Instruction::PopPlace(idx) => format!("PopPlace {}", self.chunk.names()[*idx]),
            Instruction::CallSite { site, argc } => {
                format!("CallSite {} ({} args)", self.chunk.call_sites()[*site], argc)
            }
            other => format!("{:?}", other),
        }
    }
}

impl fmt::Debug for CompiledFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFn")
            .field("name", &self.name)
            .field("instructions", &self.chunk.code().len())
            .finish()
    }
}
