use crate::ast::{FnDef, Params, Value};
use crate::error::LanternError;
use crate::eval::is_special_form;
use crate::vm::bytecode::{Chunk, CompiledFn, Instruction};

/// Special forms the lowering engine does not translate. Compiling a
/// body containing one aborts the COMPILE operation; the interpreted
/// definition stays in place.
const UNSUPPORTED_FORM_HEADS: &[&str] = &[
    "LET", "COND", "AND", "OR", "DEFUN", "LAMBDA", "COMPILE",
];

/// Lower a function body to a chunk. The emitted code assumes the
/// caller has already bound the full parameter list (arity check and
/// call-time optional defaults happen in `CompiledFn::call`, shared
/// with the interpreter).
pub fn compile_function(name: Option<&str>, def: &FnDef) -> Result<CompiledFn, LanternError> {
    let mut compiler = Compiler::new(&def.params);
    compiler.compile_expr(&def.body)?;
    compiler.expect_stack_depth(1)?;
    compiler.emit(Instruction::Return);
    let (chunk, slot_count) = compiler.finish();
    Ok(CompiledFn::new(
        name.map(str::to_string),
        def.params.clone(),
        chunk,
        slot_count,
    ))
}

/// Abstract value kind tracked per stack entry and per auxiliary slot.
/// Branch-target reconciliation merges these: equal kinds survive a
/// merge, differing kinds demote to `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AbstractKind {
    Int,
    Float,
    Str,
    Nil,
    List,
    Unknown,
}

fn merge_kind(a: AbstractKind, b: AbstractKind) -> AbstractKind {
    if a == b {
        a
    } else {
        AbstractKind::Unknown
    }
}

/// The layout every control-flow path must agree on at a label: the
/// abstract kinds of the value stack and of the live auxiliary slots.
#[derive(Clone, Debug, PartialEq, Eq)]
struct FlowState {
    stack: Vec<AbstractKind>,
    slots: Vec<AbstractKind>,
}

impl FlowState {
    fn merge(&self, other: &FlowState) -> Result<FlowState, LanternError> {
        if self.stack.len() != other.stack.len() || self.slots.len() != other.slots.len() {
            return Err(LanternError::compile(
                "internal: control paths disagree on layout at a branch target",
            ));
        }
        Ok(FlowState {
            stack: self
                .stack
                .iter()
                .zip(&other.stack)
                .map(|(a, b)| merge_kind(*a, *b))
                .collect(),
            slots: self
                .slots
                .iter()
                .zip(&other.slots)
                .map(|(a, b)| merge_kind(*a, *b))
                .collect(),
        })
    }
}

/// A forward branch target: jumps waiting to be patched, plus the flow
/// state each predecessor arrives with.
struct PendingLabel {
    jumps: Vec<usize>,
    states: Vec<FlowState>,
}

impl PendingLabel {
    fn new() -> Self {
        Self {
            jumps: Vec::new(),
            states: Vec::new(),
        }
    }
}

/// A backward branch target (loop entry) with its committed layout.
struct LoopHead {
    ip: usize,
    state: FlowState,
}

struct Compiler<'a> {
    chunk: Chunk,
    params: &'a Params,
    state: FlowState,
    max_slots: usize,
}

impl<'a> Compiler<'a> {
    fn new(params: &'a Params) -> Self {
        Self {
            chunk: Chunk::new(),
            params,
            state: FlowState {
                stack: Vec::new(),
                slots: Vec::new(),
            },
            max_slots: 0,
        }
    }

    fn finish(self) -> (Chunk, usize) {
        (self.chunk, self.max_slots)
    }

    fn emit(&mut self, instr: Instruction) -> usize {
        self.chunk.push(instr)
    }

    fn here(&self) -> usize {
        self.chunk.code().len()
    }

    fn push_kind(&mut self, kind: AbstractKind) {
        self.state.stack.push(kind);
    }

    fn pop_kind(&mut self) -> Result<AbstractKind, LanternError> {
        self.state
            .stack
            .pop()
            .ok_or_else(|| LanternError::compile("internal: value stack underflow"))
    }

    fn expect_stack_depth(&self, depth: usize) -> Result<(), LanternError> {
        if self.state.stack.len() != depth {
            return Err(LanternError::compile(
                "internal: unbalanced value stack after lowering",
            ));
        }
        Ok(())
    }

    fn alloc_slot(&mut self, kind: AbstractKind) -> usize {
        let idx = self.state.slots.len();
        self.state.slots.push(kind);
        if self.state.slots.len() > self.max_slots {
            self.max_slots = self.state.slots.len();
        }
        idx
    }

    fn release_slots(&mut self, down_to: usize) {
        self.state.slots.truncate(down_to);
    }

    /// Emit a forward jump whose target is patched when the label is
    /// bound; the jump-taken flow state is recorded for reconciliation.
    fn emit_pending_jump(&mut self, instr: Instruction, label: &mut PendingLabel) {
        let at = self.emit(instr);
        label.jumps.push(at);
        label.states.push(self.state.clone());
    }

    /// Bind a forward label here. All recorded predecessor states (and
    /// the fallthrough state, when the label is reachable by falling
    /// through) merge into the single layout this label continues
    /// with.
    fn bind_label(
        &mut self,
        label: PendingLabel,
        include_fallthrough: bool,
    ) -> Result<(), LanternError> {
        let target = self.here();
        let mut states = label.states;
        if include_fallthrough {
            states.push(self.state.clone());
        }
        let mut merged = states
            .pop()
            .ok_or_else(|| LanternError::compile("internal: unreachable branch target"))?;
        for state in &states {
            merged = merged.merge(state)?;
        }
        for at in label.jumps {
            self.chunk
                .patch_jump(at, target)
                .map_err(LanternError::compile)?;
        }
        self.state = merged;
        Ok(())
    }

    fn mark_loop_head(&self) -> LoopHead {
        LoopHead {
            ip: self.here(),
            state: self.state.clone(),
        }
    }

    /// A back edge must arrive with a layout compatible with what the
    /// loop entry was compiled under; a kind that would demote here
    /// means the entry's layout was wrong and lowering must fail
    /// rather than emit inconsistent code.
    fn emit_back_jump(&mut self, head: &LoopHead) -> Result<(), LanternError> {
        let merged = head.state.merge(&self.state)?;
        if merged != head.state {
            return Err(LanternError::compile(
                "internal: loop entry layout changed along the back edge",
            ));
        }
        self.emit(Instruction::Jump(head.ip));
        Ok(())
    }

    fn compile_expr(&mut self, form: &Value) -> Result<(), LanternError> {
        match form {
            Value::Nil => {
                self.emit(Instruction::ConstNil);
                self.push_kind(AbstractKind::Nil);
                Ok(())
            }
            Value::Int(n) => {
                self.emit(Instruction::ConstInt(*n));
                self.push_kind(AbstractKind::Int);
                Ok(())
            }
            Value::Float(n) => {
                self.emit(Instruction::ConstFloat(*n));
                self.push_kind(AbstractKind::Float);
                Ok(())
            }
            Value::Str(_) | Value::Function(_) => {
                let idx = self.chunk.add_const(form.clone());
                self.emit(Instruction::Const(idx));
                self.push_kind(match form {
                    Value::Str(_) => AbstractKind::Str,
                    _ => AbstractKind::Unknown,
                });
                Ok(())
            }
            Value::Symbol(name) => self.compile_symbol(name),
            Value::List(items) => self.compile_list(items),
        }
    }

    fn compile_symbol(&mut self, name: &str) -> Result<(), LanternError> {
        if let Some(position) = self.params.position_of(name) {
            self.emit(Instruction::LoadArg(position));
            self.push_kind(AbstractKind::Unknown);
            return Ok(());
        }
        let idx = self.chunk.add_name(name);
        self.emit(Instruction::LoadSymbol(idx));
        self.push_kind(AbstractKind::Unknown);
        Ok(())
    }

    fn compile_list(&mut self, items: &[Value]) -> Result<(), LanternError> {
        if items.is_empty() {
            self.emit(Instruction::ConstNil);
            self.push_kind(AbstractKind::Nil);
            return Ok(());
        }
        let Value::Symbol(head) = &items[0] else {
            return Err(LanternError::compile(
                "unsupported construct: call head must be a symbol in compiled code",
            ));
        };
        if UNSUPPORTED_FORM_HEADS.contains(&head.as_str()) {
            return Err(LanternError::compile(format!(
                "unsupported construct: {}",
                head
            )));
        }
        if is_special_form(head) {
            let args = &items[1..];
            return match head.as_str() {
                "IF" => self.compile_if(args),
                "QUOTE" => self.compile_quote(args),
                "PROGN" => self.compile_progn(args),
                "DOTIMES" => self.compile_dotimes(args),
                "DOLIST" => self.compile_dolist(args),
                "DO" => self.compile_do(args),
                "SET" => self.compile_set(args),
                "PUSH" => self.compile_push(args),
                "POP" => self.compile_pop(args),
                other => Err(LanternError::compile(format!(
                    "unsupported construct: {}",
                    other
                ))),
            };
        }
        self.compile_call(head, &items[1..])
    }

    fn compile_call(&mut self, name: &str, args: &[Value]) -> Result<(), LanternError> {
        for arg in args {
            self.compile_expr(arg)?;
        }
        let site = self.chunk.add_call_site(name);
        self.emit(Instruction::CallSite {
            site,
            argc: args.len(),
        });
        for _ in args {
            self.pop_kind()?;
        }
        self.push_kind(AbstractKind::Unknown);
        Ok(())
    }

    fn compile_if(&mut self, args: &[Value]) -> Result<(), LanternError> {
        if args.len() != 3 {
            return Err(LanternError::compile(format!(
                "IF expects test, then and else, got {} operands",
                args.len()
            )));
        }
        self.compile_expr(&args[0])?;
        self.pop_kind()?;
        let mut else_label = PendingLabel::new();
        self.emit_pending_jump(Instruction::JumpIfNil(usize::MAX), &mut else_label);
        self.compile_expr(&args[1])?;
        let mut merge_label = PendingLabel::new();
        self.emit_pending_jump(Instruction::Jump(usize::MAX), &mut merge_label);
        // The fallthrough after an unconditional jump is dead; the
        // else path enters with the layout the test left behind.
        self.bind_label(else_label, false)?;
        self.compile_expr(&args[2])?;
        self.bind_label(merge_label, true)?;
        Ok(())
    }

    fn compile_quote(&mut self, args: &[Value]) -> Result<(), LanternError> {
        if args.len() != 1 {
            return Err(LanternError::compile(format!(
                "QUOTE expects exactly 1 operand, got {}",
                args.len()
            )));
        }
        let idx = self.chunk.add_const(args[0].clone());
        self.emit(Instruction::Const(idx));
        self.push_kind(match &args[0] {
            Value::Int(_) => AbstractKind::Int,
            Value::Float(_) => AbstractKind::Float,
            Value::Str(_) => AbstractKind::Str,
            Value::Nil => AbstractKind::Nil,
            Value::List(_) => AbstractKind::List,
            _ => AbstractKind::Unknown,
        });
        Ok(())
    }

    fn compile_progn(&mut self, args: &[Value]) -> Result<(), LanternError> {
        if args.is_empty() {
            self.emit(Instruction::ConstNil);
            self.push_kind(AbstractKind::Nil);
            return Ok(());
        }
        for (idx, form) in args.iter().enumerate() {
            self.compile_expr(form)?;
            if idx + 1 < args.len() {
                self.emit(Instruction::Pop);
                self.pop_kind()?;
            }
        }
        Ok(())
    }

    fn compile_dotimes(&mut self, args: &[Value]) -> Result<(), LanternError> {
        let (var, count_form, body) = split_loop_header(args, "DOTIMES")?;
        let slot_base = self.state.slots.len();
        self.compile_expr(count_form)?;
        self.pop_kind()?;
        self.emit(Instruction::SaveLocals);
        let counter = self.alloc_slot(AbstractKind::Int);
        let stop = self.alloc_slot(AbstractKind::Int);
        // The count was compiled first, so it is on top of the stack.
        self.emit(Instruction::StoreSlotInt(stop));
        self.emit(Instruction::ConstInt(0));
        self.emit(Instruction::StoreSlotInt(counter));
        let var_idx = self.chunk.add_name(&var);

        // Top-tested: zero iterations when the count is not positive.
        let head = self.mark_loop_head();
        let mut exit_label = PendingLabel::new();
        self.emit_pending_jump(
            Instruction::JumpIfSlotGe {
                a: counter,
                b: stop,
                target: usize::MAX,
            },
            &mut exit_label,
        );
        self.emit(Instruction::LoadSlotInt(counter));
        self.emit(Instruction::StoreVar(var_idx));
        self.compile_loop_body(body)?;
        self.emit(Instruction::IncSlot(counter));
        self.emit_back_jump(&head)?;
        self.bind_label(exit_label, false)?;

        self.emit(Instruction::RestoreLocals);
        self.release_slots(slot_base);
        self.emit(Instruction::ConstNil);
        self.push_kind(AbstractKind::Nil);
        Ok(())
    }

    fn compile_dolist(&mut self, args: &[Value]) -> Result<(), LanternError> {
        let (var, list_form, body) = split_loop_header(args, "DOLIST")?;
        let slot_base = self.state.slots.len();
        self.compile_expr(list_form)?;
        self.pop_kind()?;
        self.emit(Instruction::SaveLocals);
        let list = self.alloc_slot(AbstractKind::List);
        let index = self.alloc_slot(AbstractKind::Int);
        self.emit(Instruction::StoreSlot(list));
        self.emit(Instruction::ConstInt(0));
        self.emit(Instruction::StoreSlotInt(index));
        let var_idx = self.chunk.add_name(&var);

        let head = self.mark_loop_head();
        let mut exit_label = PendingLabel::new();
        self.emit_pending_jump(
            Instruction::JumpIfIterDone {
                list,
                index,
                target: usize::MAX,
            },
            &mut exit_label,
        );
        self.emit(Instruction::LoadElement { list, index });
        self.emit(Instruction::StoreVar(var_idx));
        self.compile_loop_body(body)?;
        self.emit(Instruction::IncSlot(index));
        self.emit_back_jump(&head)?;
        self.bind_label(exit_label, false)?;

        self.emit(Instruction::RestoreLocals);
        self.release_slots(slot_base);
        self.emit(Instruction::ConstNil);
        self.push_kind(AbstractKind::Nil);
        Ok(())
    }

    fn compile_do(&mut self, args: &[Value]) -> Result<(), LanternError> {
        if args.len() < 2 {
            return Err(LanternError::compile(
                "DO expects a binding list and a predicate",
            ));
        }
        let clauses = parse_do_clauses(&args[0])?;
        let pred = &args[1];
        let body = &args[2..];

        self.emit(Instruction::SaveLocals);
        let mut var_indices = Vec::with_capacity(clauses.len());
        for (var, init, _) in &clauses {
            let var_idx = self.chunk.add_name(var);
            self.compile_expr(init)?;
            self.pop_kind()?;
            self.emit(Instruction::StoreVar(var_idx));
            var_indices.push(var_idx);
        }

        let head = self.mark_loop_head();
        self.compile_expr(pred)?;
        self.pop_kind()?;
        let mut exit_label = PendingLabel::new();
        self.emit_pending_jump(Instruction::JumpIfNil(usize::MAX), &mut exit_label);
        self.compile_loop_body(body)?;
        for ((_, _, step), var_idx) in clauses.iter().zip(&var_indices) {
            self.compile_expr(step)?;
            self.pop_kind()?;
            self.emit(Instruction::StoreVar(*var_idx));
        }
        self.emit_back_jump(&head)?;
        self.bind_label(exit_label, false)?;

        self.emit(Instruction::RestoreLocals);
        self.emit(Instruction::ConstNil);
        self.push_kind(AbstractKind::Nil);
        Ok(())
    }

    fn compile_loop_body(&mut self, body: &[Value]) -> Result<(), LanternError> {
        for form in body {
            self.compile_expr(form)?;
            self.emit(Instruction::Pop);
            self.pop_kind()?;
        }
        Ok(())
    }

    fn compile_set(&mut self, args: &[Value]) -> Result<(), LanternError> {
        if args.len() != 2 {
            return Err(LanternError::compile(format!(
                "SET expects name and value, got {} operands",
                args.len()
            )));
        }
        let Value::Symbol(name) = &args[0] else {
            return Err(LanternError::compile("SET name must be a symbol"));
        };
        let name_idx = self.chunk.add_name(name);
        self.compile_expr(&args[1])?;
        self.emit(Instruction::Dup);
        self.emit(Instruction::StoreGlobal(name_idx));
        Ok(())
    }

    fn compile_push(&mut self, args: &[Value]) -> Result<(), LanternError> {
        if args.len() != 2 {
            return Err(LanternError::compile(format!(
                "PUSH expects item and place, got {} operands",
                args.len()
            )));
        }
        let Value::Symbol(place) = &args[1] else {
            return Err(LanternError::compile("PUSH place must be a symbol"));
        };
        let place_idx = self.chunk.add_name(place);
        self.compile_expr(&args[0])?;
        self.pop_kind()?;
        self.emit(Instruction::PushPlace(place_idx));
        self.push_kind(AbstractKind::List);
        Ok(())
    }

    fn compile_pop(&mut self, args: &[Value]) -> Result<(), LanternError> {
        if args.len() != 1 {
            return Err(LanternError::compile(format!(
                "POP expects a place, got {} operands",
                args.len()
            )));
        }
        let Value::Symbol(place) = &args[0] else {
            return Err(LanternError::compile("POP place must be a symbol"));
        };
        let place_idx = self.chunk.add_name(place);
        self.emit(Instruction::PopPlace(place_idx));
        self.push_kind(AbstractKind::Unknown);
        Ok(())
    }
}

fn split_loop_header<'f>(
    args: &'f [Value],
    form_name: &str,
) -> Result<(String, &'f Value, &'f [Value]), LanternError> {
    let Some(Value::List(header)) = args.first() else {
        return Err(LanternError::compile(format!(
            "{} header must be a (var form) list",
            form_name
        )));
    };
    if header.len() != 2 {
        return Err(LanternError::compile(format!(
            "{} header must have a variable and one form",
            form_name
        )));
    }
    let Value::Symbol(var) = &header[0] else {
        return Err(LanternError::compile(format!(
            "{} variable must be a symbol",
            form_name
        )));
    };
    Ok((var.clone(), &header[1], &args[1..]))
}

fn parse_do_clauses(form: &Value) -> Result<Vec<(String, Value, Value)>, LanternError> {
    let items = match form {
        Value::List(items) => items.as_slice(),
        Value::Nil => &[],
        _ => return Err(LanternError::compile("DO binding list must be a list")),
    };
    let mut clauses = Vec::with_capacity(items.len());
    for item in items {
        let Value::List(parts) = item else {
            return Err(LanternError::compile("DO binding must be (var init step)"));
        };
        if parts.len() != 3 {
            return Err(LanternError::compile("DO binding must be (var init step)"));
        }
        let Value::Symbol(var) = &parts[0] else {
            return Err(LanternError::compile("DO variable must be a symbol"));
        };
        clauses.push((var.clone(), parts[1].clone(), parts[2].clone()));
    }
    Ok(clauses)
}
