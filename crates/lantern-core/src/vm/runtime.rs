use crate::ast::Value;
use crate::builtins;
use crate::error::LanternError;
use crate::eval::Interp;
use crate::vm::bytecode::{CallTarget, CompiledFn, Instruction};

impl CompiledFn {
    /// Same contract as an interpreted call: arity check and call-time
    /// optional defaults in the caller's environment, then a locals
    /// snapshot with the parameters merged in (dynamically scoped
    /// callees observe them), restored on every exit path.
    pub fn call(&self, interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
        let label = self.name.as_deref().unwrap_or("<LAMBDA>");
        interp.check_arity(&self.params, label, args.len())?;
        let depth = interp.env().saved_depth();
        interp.env_mut().save_locals();
        let result = match interp.bind_parameters_in_scope(&self.params, args) {
            Ok(arg_slots) => {
                let mut vm = Vm::new(interp, self, arg_slots);
                vm.run()
            }
            Err(err) => Err(err),
        };
        match result {
            Ok(value) => {
                interp.env_mut().restore_locals();
                Ok(value)
            }
            Err(err) => {
                // The chunk may have died between SaveLocals and
                // RestoreLocals; unwinding keeps the snapshot stack at
                // its pre-call depth.
                interp.env_mut().unwind_saved(depth);
                Err(err)
            }
        }
    }
}

/// Runtime representation of an auxiliary slot. Loop counters and
/// limits stay unboxed.
#[derive(Clone, Debug)]
enum Slot {
    Empty,
    Int(i64),
    Val(Value),
}

struct Vm<'a> {
    interp: &'a mut Interp,
    compiled: &'a CompiledFn,
    args: Vec<Value>,
    stack: Vec<Value>,
    slots: Vec<Slot>,
}

impl<'a> Vm<'a> {
    fn new(interp: &'a mut Interp, compiled: &'a CompiledFn, args: Vec<Value>) -> Self {
        Self {
            interp,
            compiled,
            args,
            stack: Vec::new(),
            slots: vec![Slot::Empty; compiled.slot_count],
        }
    }

    fn run(&mut self) -> Result<Value, LanternError> {
        // Reborrow through the original lifetime so chunk data stays
        // readable while `self` methods take mutable borrows.
        let compiled = self.compiled;
        let code = compiled.chunk.code();
        let mut ip = 0;
        while ip < code.len() {
            match &code[ip] {
                Instruction::Const(idx) => {
                    self.stack.push(compiled.chunk.constants()[*idx].clone());
                }
                Instruction::ConstInt(n) => self.stack.push(Value::Int(*n)),
                Instruction::ConstFloat(n) => self.stack.push(Value::Float(*n)),
                Instruction::ConstNil => self.stack.push(Value::Nil),
                Instruction::LoadArg(idx) => {
                    let value = self
                        .args
                        .get(*idx)
                        .cloned()
                        .ok_or_else(|| self.internal("argument slot out of range"))?;
                    self.stack.push(value);
                }
                Instruction::LoadSymbol(idx) => {
                    let name = &compiled.chunk.names()[*idx];
                    self.stack.push(self.interp.resolve_symbol(name));
                }
                Instruction::StoreVar(idx) => {
                    let value = self.pop()?;
                    let name = &compiled.chunk.names()[*idx];
                    self.interp.env_mut().set_local(name, value);
                }
                Instruction::StoreGlobal(idx) => {
                    let value = self.pop()?;
                    let name = &compiled.chunk.names()[*idx];
                    self.interp.env_mut().set_global(name, value);
                }
                Instruction::PushPlace(idx) => {
                    let item = self.pop()?;
                    let name = &compiled.chunk.names()[*idx];
                    let updated = self.interp.push_place(name, item);
                    self.stack.push(updated);
                }
                Instruction::PopPlace(idx) => {
                    let name = &compiled.chunk.names()[*idx];
                    let popped = self.interp.pop_place(name);
                    self.stack.push(popped);
                }
                Instruction::SaveLocals => self.interp.env_mut().save_locals(),
                Instruction::RestoreLocals => self.interp.env_mut().restore_locals(),
                Instruction::Dup => {
                    let top = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or_else(|| self.internal("stack underflow"))?;
                    self.stack.push(top);
                }
                Instruction::Pop => {
                    self.pop()?;
                }
                Instruction::Jump(target) => {
                    ip = *target;
                    continue;
                }
                Instruction::JumpIfNil(target) => {
                    if self.pop()?.is_nil() {
                        ip = *target;
                        continue;
                    }
                }
                Instruction::StoreSlot(idx) => {
                    let value = self.pop()?;
                    self.slots[*idx] = Slot::Val(value);
                }
                Instruction::StoreSlotInt(idx) => {
                    let value = self.pop()?;
                    let Value::Int(n) = value else {
                        return Err(LanternError::type_mismatch(
                            "integer",
                            value.type_name(),
                        ));
                    };
                    self.slots[*idx] = Slot::Int(n);
                }
                Instruction::LoadSlotInt(idx) => {
                    let n = self.slot_int(*idx)?;
                    self.stack.push(Value::Int(n));
                }
                Instruction::IncSlot(idx) => {
                    let n = self.slot_int(*idx)?;
                    self.slots[*idx] = Slot::Int(n + 1);
                }
                Instruction::JumpIfSlotGe { a, b, target } => {
                    if self.slot_int(*a)? >= self.slot_int(*b)? {
                        ip = *target;
                        continue;
                    }
                }
                Instruction::JumpIfIterDone {
                    list,
                    index,
                    target,
                } => {
                    let len = self.slot_list_len(*list)?;
                    if self.slot_int(*index)? >= len {
                        ip = *target;
                        continue;
                    }
                }
                Instruction::LoadElement { list, index } => {
                    let idx = self.slot_int(*index)?;
                    let element = match &self.slots[*list] {
                        Slot::Val(Value::List(items)) => items.get(idx as usize).cloned(),
                        _ => None,
                    };
                    let element =
                        element.ok_or_else(|| self.internal("list iteration out of range"))?;
                    self.stack.push(element);
                }
                Instruction::CallSite { site, argc } => {
                    let result = self.dispatch_call_site(*site, *argc)?;
                    self.stack.push(result);
                }
                Instruction::Return => return self.pop(),
            }
            ip += 1;
        }
        Err(self.internal("chunk ended without Return"))
    }

    /// Version-guarded inline cache: the cell stays bound while the
    /// symbol table's version for the callee name is unchanged; a
    /// COMPILE or redefinition of the callee bumps the version and the
    /// next dispatch re-resolves. This is what lets an already-lowered
    /// caller pick up its callee's compiled form without being
    /// re-lowered itself.
    fn dispatch_call_site(&mut self, site: usize, argc: usize) -> Result<Value, LanternError> {
        let compiled = self.compiled;
        let name = &compiled.chunk.call_sites()[site];
        if self.stack.len() < argc {
            return Err(self.internal("stack underflow in call"));
        }
        let operands = self.stack.split_off(self.stack.len() - argc);
        let mut argv = Vec::with_capacity(argc + 1);
        argv.push(Value::Symbol(name.clone()));
        argv.extend(operands);

        let version = self.interp.function_version(name);
        let cell = &compiled.cells[site];
        let target = match cell.get(version) {
            Some(target) => target,
            None => {
                let target = resolve_target(self.interp, name);
                cell.set(version, target.clone());
                target
            }
        };
        match target {
            CallTarget::Builtin(builtin) => builtin(&mut *self.interp, &argv),
            CallTarget::Function(func) => self.interp.apply(&func, name, &argv[1..]),
            CallTarget::Dynamic => self.interp.call_by_name(name, argv),
        }
    }

    fn pop(&mut self) -> Result<Value, LanternError> {
        self.stack
            .pop()
            .ok_or_else(|| self.internal("stack underflow"))
    }

    fn slot_int(&self, idx: usize) -> Result<i64, LanternError> {
        match self.slots.get(idx) {
            Some(Slot::Int(n)) => Ok(*n),
            _ => Err(self.internal("expected integer slot")),
        }
    }

    fn slot_list_len(&self, idx: usize) -> Result<i64, LanternError> {
        match self.slots.get(idx) {
            Some(Slot::Val(Value::List(items))) => Ok(items.len() as i64),
            Some(Slot::Val(Value::Nil)) => Ok(0),
            Some(Slot::Val(other)) => Err(LanternError::type_mismatch(
                "list",
                other.type_name(),
            )),
            _ => Err(self.internal("expected list slot")),
        }
    }

    fn internal(&self, message: &str) -> LanternError {
        let label = self.compiled.name.as_deref().unwrap_or("<LAMBDA>");
        LanternError::message(format!("internal VM error in {}: {}", label, message))
    }
}

/// First dispatch through a cell resolves it: the builtin library, the
/// symbol table (interpreted snapshot or compiled handle), or the
/// fully dynamic fallback.
fn resolve_target(interp: &Interp, name: &str) -> CallTarget {
    if let Some(builtin) = builtins::lookup(name) {
        return CallTarget::Builtin(builtin);
    }
    if let Some(func) = interp.function(name) {
        return CallTarget::Function(func.clone());
    }
    CallTarget::Dynamic
}
