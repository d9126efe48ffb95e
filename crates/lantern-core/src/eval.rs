use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{FnDef, Function, OptionalParam, Params, Value};
use crate::builtins;
use crate::env::Env;
use crate::error::{format_error, LanternError};
use crate::options::EvalOptions;
use crate::reader;
use crate::symbols::canonical_symbol_name;
use crate::vm;

const SPECIAL_FORMS: &[&str] = &[
    "IF", "QUOTE", "PROGN", "LET", "DEFUN", "LAMBDA", "DOTIMES", "DOLIST", "DO", "COND", "AND",
    "OR", "SET", "PUSH", "POP", "COMPILE",
];

pub fn is_special_form(name: &str) -> bool {
    SPECIAL_FORMS.contains(&name)
}

/// One interpreter: environment, symbol table (dispatch cells) and the
/// per-name version counters that invalidate lowered call sites.
/// Everything is owned here — independent interpreters do not share
/// state.
pub struct Interp {
    pub(crate) env: Env,
    functions: HashMap<String, Function>,
    versions: HashMap<String, u64>,
    options: EvalOptions,
    quit: bool,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    pub fn new() -> Self {
        Self::with_options(EvalOptions::default())
    }

    pub fn with_options(options: EvalOptions) -> Self {
        Self {
            env: Env::new(),
            functions: HashMap::new(),
            versions: HashMap::new(),
            options,
            quit: false,
        }
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Env {
        &mut self.env
    }

    pub fn saved_depth(&self) -> usize {
        self.env.saved_depth()
    }

    /// Install or replace a dispatch cell. The map entry is swapped in
    /// one step and the version bump makes every lowered call site
    /// re-resolve on its next dispatch.
    pub fn define(&mut self, name: &str, func: Function) {
        let canonical = canonical_symbol_name(name).into_owned();
        self.functions.insert(canonical.clone(), func);
        *self.versions.entry(canonical).or_insert(0) += 1;
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(canonical_symbol_name(name).as_ref())
    }

    pub fn function_version(&self, name: &str) -> u64 {
        self.versions
            .get(canonical_symbol_name(name).as_ref())
            .copied()
            .unwrap_or(0)
    }

    pub fn eval(&mut self, form: &Value) -> Result<Value, LanternError> {
        match form {
            Value::Nil
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Function(_) => Ok(form.clone()),
            Value::Symbol(name) => Ok(self.resolve_symbol(name)),
            Value::List(items) => self.eval_list(items),
        }
    }

    /// Bound value, the truth sentinel, nil, or the symbol itself as a
    /// self-quoting literal.
    pub(crate) fn resolve_symbol(&self, name: &str) -> Value {
        if let Some(value) = self.env.lookup(name) {
            return value;
        }
        match name {
            "T" => Value::truth(),
            "NIL" => Value::Nil,
            _ => Value::Symbol(name.to_string()),
        }
    }

    fn eval_list(&mut self, items: &[Value]) -> Result<Value, LanternError> {
        if items.is_empty() {
            return Ok(Value::Nil);
        }
        let head = self.eval(&items[0])?;
        match head {
            Value::Symbol(name) => {
                if is_special_form(&name) {
                    return self.eval_special(&name, &items[1..]);
                }
                let argv = self.eval_call_args(&name, &items[1..])?;
                self.call_by_name(&name, argv)
            }
            Value::Function(func) => {
                let mut args = Vec::with_capacity(items.len() - 1);
                for form in &items[1..] {
                    args.push(self.eval(form)?);
                }
                self.apply(&func, "<LAMBDA>", &args)
            }
            other => Err(LanternError::type_mismatch("function", other.type_name())),
        }
    }

    fn eval_call_args(
        &mut self,
        name: &str,
        arg_forms: &[Value],
    ) -> Result<Vec<Value>, LanternError> {
        let mut argv = Vec::with_capacity(arg_forms.len() + 1);
        argv.push(Value::symbol(name));
        for form in arg_forms {
            argv.push(self.eval(form)?);
        }
        Ok(argv)
    }

    /// The shared calling convention: `argv[0]` is the operator-name
    /// symbol, the rest are evaluated operand values. Lowered call
    /// sites dispatch through the same resolution order.
    pub fn call_by_name(&mut self, name: &str, argv: Vec<Value>) -> Result<Value, LanternError> {
        if let Some(builtin) = builtins::lookup(name) {
            return builtin(self, &argv);
        }
        if let Some(func) = self.function(name).cloned() {
            return self.apply(&func, name, &argv[1..]);
        }
        if let Some(Value::Function(func)) = self.env.lookup(name) {
            return self.apply(&func.clone(), name, &argv[1..]);
        }
        Err(LanternError::unbound_function(name))
    }

    pub fn apply(
        &mut self,
        func: &Function,
        name: &str,
        args: &[Value],
    ) -> Result<Value, LanternError> {
        match func {
            Function::Interpreted(def) => self.apply_interpreted(def, name, args),
            Function::Compiled(compiled) => compiled.call(self, args),
        }
    }

    fn apply_interpreted(
        &mut self,
        def: &FnDef,
        name: &str,
        args: &[Value],
    ) -> Result<Value, LanternError> {
        self.check_arity(&def.params, name, args.len())?;
        self.env.save_locals();
        let result = match self.bind_parameters_in_scope(&def.params, args) {
            Ok(_) => self.eval(&def.body),
            Err(err) => Err(err),
        };
        self.env.restore_locals();
        result
    }

    pub(crate) fn check_arity(
        &self,
        params: &Params,
        name: &str,
        provided: usize,
    ) -> Result<(), LanternError> {
        let min = params.min_arity();
        let max = params.max_arity();
        if provided < min || provided > max {
            let expected = if min == max {
                format!("exactly {}", min)
            } else {
                format!("between {} and {}", min, max)
            };
            return Err(LanternError::arity(format!(
                "{} expects {} args, got {}",
                name, expected, provided
            )));
        }
        Ok(())
    }

    /// Bind parameters into the freshly saved locals scope, in order.
    /// Shared by interpreted and compiled calls. A missing optional
    /// gets its default evaluated here — at call time, with the
    /// caller's bindings still visible (dynamic scoping) and earlier
    /// parameters of this call already bound. Returns the bound values
    /// in slot order. Must run between save and restore.
    pub(crate) fn bind_parameters_in_scope(
        &mut self,
        params: &Params,
        args: &[Value],
    ) -> Result<Vec<Value>, LanternError> {
        let mut slots = Vec::with_capacity(params.max_arity());
        for (idx, param) in params.required.iter().enumerate() {
            self.env.set_local(param, args[idx].clone());
            slots.push(args[idx].clone());
        }
        for (idx, opt) in params.optional.iter().enumerate() {
            let slot = params.required.len() + idx;
            let value = match args.get(slot) {
                Some(v) => v.clone(),
                None => match &opt.default {
                    Some(default) => self.eval(default)?,
                    None => Value::Nil,
                },
            };
            self.env.set_local(&opt.name, value.clone());
            slots.push(value);
        }
        Ok(slots)
    }

    fn eval_special(&mut self, name: &str, args: &[Value]) -> Result<Value, LanternError> {
        match name {
            "IF" => self.eval_if(args),
            "QUOTE" => self.eval_quote(args),
            "PROGN" => self.eval_sequence(args),
            "LET" => self.eval_let(args),
            "DEFUN" => self.eval_defun(args),
            "LAMBDA" => self.eval_lambda(args),
            "DOTIMES" => self.eval_dotimes(args),
            "DOLIST" => self.eval_dolist(args),
            "DO" => self.eval_do(args),
            "COND" => self.eval_cond(args),
            "AND" => self.eval_and(args),
            "OR" => self.eval_or(args),
            "SET" => self.eval_set(args),
            "PUSH" => self.eval_push(args),
            "POP" => self.eval_pop(args),
            "COMPILE" => self.eval_compile(args),
            _ => Err(LanternError::message(format!(
                "unhandled special form {}",
                name
            ))),
        }
    }

    fn eval_if(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.len() != 3 {
            return Err(LanternError::arity(format!(
                "IF expects test, then and else, got {} operands",
                args.len()
            )));
        }
        let test = self.eval(&args[0])?;
        if test.is_truthy() {
            self.eval(&args[1])
        } else {
            self.eval(&args[2])
        }
    }

    fn eval_quote(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.len() != 1 {
            return Err(LanternError::arity(format!(
                "QUOTE expects exactly 1 operand, got {}",
                args.len()
            )));
        }
        Ok(args[0].clone())
    }

    fn eval_sequence(&mut self, forms: &[Value]) -> Result<Value, LanternError> {
        let mut last = Value::Nil;
        for form in forms {
            last = self.eval(form)?;
        }
        Ok(last)
    }

    fn eval_let(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.is_empty() {
            return Err(LanternError::arity("LET expects a binding list"));
        }
        let binding_forms = match &args[0] {
            Value::List(items) => items.as_slice(),
            Value::Nil => &[],
            other => {
                return Err(LanternError::type_mismatch(
                    "binding list",
                    other.type_name(),
                ))
            }
        };
        // All initializers run in the pre-LET scope, in order, before
        // any binding is installed.
        let mut bindings = Vec::with_capacity(binding_forms.len());
        for form in binding_forms {
            match form {
                Value::Symbol(name) => bindings.push((name.clone(), Value::Nil)),
                Value::List(pair) if pair.len() == 2 => {
                    let Value::Symbol(name) = &pair[0] else {
                        return Err(LanternError::syntax("LET binding name must be a symbol"));
                    };
                    let value = self.eval(&pair[1])?;
                    bindings.push((name.clone(), value));
                }
                _ => {
                    return Err(LanternError::syntax(
                        "LET binding must be a name or a (name value) pair",
                    ))
                }
            }
        }
        self.env.save_locals();
        for (name, value) in bindings {
            self.env.set_local(&name, value);
        }
        let result = self.eval_sequence(&args[1..]);
        self.env.restore_locals();
        result
    }

    fn eval_defun(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.len() != 3 {
            return Err(LanternError::arity(format!(
                "DEFUN expects name, parameter list and body, got {} operands",
                args.len()
            )));
        }
        let Value::Symbol(name) = &args[0] else {
            return Err(LanternError::type_mismatch("symbol", args[0].type_name()));
        };
        if matches!(self.function(name), Some(Function::Compiled(_))) {
            return Err(LanternError::message(format!(
                "cannot redefine {} after compile",
                name
            )));
        }
        let params = parse_parameter_list(&args[1])?;
        let def = FnDef {
            params,
            body: args[2].clone(),
        };
        self.define(name, Function::Interpreted(def));
        Ok(Value::Symbol(name.clone()))
    }

    fn eval_lambda(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.len() != 2 {
            return Err(LanternError::arity(format!(
                "LAMBDA expects parameter list and body, got {} operands",
                args.len()
            )));
        }
        let params = parse_parameter_list(&args[0])?;
        let def = FnDef {
            params,
            body: args[1].clone(),
        };
        Ok(Value::Function(Arc::new(Function::Interpreted(def))))
    }

    fn eval_dotimes(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        let (var, count_form, body) = split_loop_header(args, "DOTIMES")?;
        let count = match self.eval(count_form)? {
            Value::Int(n) => n,
            other => return Err(LanternError::type_mismatch("integer", other.type_name())),
        };
        self.env.save_locals();
        let mut result = Ok(Value::Nil);
        'iterations: for i in 0..count.max(0) {
            self.env.set_local(&var, Value::Int(i));
            for form in body {
                if let Err(err) = self.eval(form) {
                    result = Err(err);
                    break 'iterations;
                }
            }
        }
        self.env.restore_locals();
        result
    }

    fn eval_dolist(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        let (var, list_form, body) = split_loop_header(args, "DOLIST")?;
        let elements = match self.eval(list_form)? {
            Value::List(items) => items,
            Value::Nil => Vec::new(),
            other => return Err(LanternError::type_mismatch("list", other.type_name())),
        };
        self.env.save_locals();
        let mut result = Ok(Value::Nil);
        'iterations: for element in elements {
            self.env.set_local(&var, element);
            for form in body {
                if let Err(err) = self.eval(form) {
                    result = Err(err);
                    break 'iterations;
                }
            }
        }
        self.env.restore_locals();
        result
    }

    fn eval_do(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.len() < 2 {
            return Err(LanternError::arity(
                "DO expects a binding list and a predicate",
            ));
        }
        let clauses = parse_do_clauses(&args[0])?;
        let pred = &args[1];
        let body = &args[2..];
        self.env.save_locals();
        let result = self.run_do_loop(&clauses, pred, body);
        self.env.restore_locals();
        result
    }

    fn run_do_loop(
        &mut self,
        clauses: &[DoClause],
        pred: &Value,
        body: &[Value],
    ) -> Result<Value, LanternError> {
        for clause in clauses {
            let init = self.eval(&clause.init)?;
            self.env.set_local(&clause.var, init);
        }
        while self.eval(pred)?.is_truthy() {
            for form in body {
                self.eval(form)?;
            }
            for clause in clauses {
                let next = self.eval(&clause.step)?;
                self.env.set_local(&clause.var, next);
            }
        }
        Ok(Value::Nil)
    }

    fn eval_cond(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        for clause in args {
            let Value::List(items) = clause else {
                return Err(LanternError::syntax("COND clause must be a list"));
            };
            if items.is_empty() {
                return Err(LanternError::syntax("COND clause must not be empty"));
            }
            let test = self.eval(&items[0])?;
            if test.is_truthy() {
                if items.len() == 1 {
                    return Ok(test);
                }
                return self.eval_sequence(&items[1..]);
            }
        }
        Ok(Value::Nil)
    }

    fn eval_and(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        let mut last = Value::truth();
        for form in args {
            last = self.eval(form)?;
            if last.is_nil() {
                return Ok(Value::Nil);
            }
        }
        Ok(last)
    }

    fn eval_or(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        for form in args {
            let value = self.eval(form)?;
            if value.is_truthy() {
                return Ok(value);
            }
        }
        Ok(Value::Nil)
    }

    fn eval_set(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.len() != 2 {
            return Err(LanternError::arity(format!(
                "SET expects name and value, got {} operands",
                args.len()
            )));
        }
        let Value::Symbol(name) = &args[0] else {
            return Err(LanternError::type_mismatch("symbol", args[0].type_name()));
        };
        let value = self.eval(&args[1])?;
        self.env.set_global(name, value.clone());
        Ok(value)
    }

    fn eval_push(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.len() != 2 {
            return Err(LanternError::arity(format!(
                "PUSH expects item and place, got {} operands",
                args.len()
            )));
        }
        let item = self.eval(&args[0])?;
        let Value::Symbol(place) = &args[1] else {
            return Err(LanternError::type_mismatch("symbol", args[1].type_name()));
        };
        Ok(self.push_place(&place.clone(), item))
    }

    fn eval_pop(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.len() != 1 {
            return Err(LanternError::arity(format!(
                "POP expects a place, got {} operands",
                args.len()
            )));
        }
        let Value::Symbol(place) = &args[0] else {
            return Err(LanternError::type_mismatch("symbol", args[0].type_name()));
        };
        Ok(self.pop_place(&place.clone()))
    }

    /// Prepend `item` to the list held by `place` (globally bound, as
    /// in the original). A non-list value v becomes `(v item)`.
    pub(crate) fn push_place(&mut self, place: &str, item: Value) -> Value {
        let updated = match self.env.lookup(place) {
            None | Some(Value::Nil) => vec![item],
            Some(Value::List(items)) => {
                let mut out = Vec::with_capacity(items.len() + 1);
                out.push(item);
                out.extend(items);
                out
            }
            Some(other) => vec![other, item],
        };
        let updated = Value::List(updated);
        self.env.set_global(place, updated.clone());
        updated
    }

    pub(crate) fn pop_place(&mut self, place: &str) -> Value {
        match self.env.lookup(place) {
            Some(Value::List(items)) if !items.is_empty() => {
                let mut items = items;
                let first = items.remove(0);
                self.env.set_global(place, Value::List(items));
                first
            }
            Some(Value::List(_)) | Some(Value::Nil) | None => Value::Nil,
            Some(other) => {
                self.env.set_global(place, Value::Nil);
                other
            }
        }
    }

    fn eval_compile(&mut self, args: &[Value]) -> Result<Value, LanternError> {
        if args.is_empty() {
            return Err(LanternError::arity(
                "COMPILE expects a function name or definition",
            ));
        }
        let (name, def) = match &args[0] {
            Value::Symbol(n) => match self.function(n) {
                Some(Function::Interpreted(def)) => (Some(n.clone()), def.clone()),
                Some(Function::Compiled(_)) => {
                    return Err(LanternError::compile(format!("{} is already compiled", n)))
                }
                None => return Err(LanternError::unbound_function(n.clone())),
            },
            other => match self.eval(other)? {
                Value::Function(func) => match func.as_ref() {
                    Function::Interpreted(def) => (None, def.clone()),
                    Function::Compiled(_) => {
                        return Err(LanternError::compile("target is already compiled"))
                    }
                },
                _ => {
                    return Err(LanternError::compile(
                        "COMPILE expects a function name or definition",
                    ))
                }
            },
        };
        let dump = args[1..]
            .iter()
            .any(|opt| matches!(opt, Value::Symbol(s) if s == "DEBUG"));
        let compiled = Arc::new(vm::compile_function(name.as_deref(), &def)?);
        if dump {
            self.write_compile_listing(&compiled);
        }
        match name {
            Some(n) => {
                self.define(&n, Function::Compiled(compiled));
                Ok(Value::truth())
            }
            None => Ok(Value::Function(Arc::new(Function::Compiled(compiled)))),
        }
    }

    fn write_compile_listing(&self, compiled: &vm::bytecode::CompiledFn) {
        use crate::error::WARN_TAG;
        let dir = self
            .options
            .compile_dump_dir
            .clone()
            .unwrap_or_else(|| std::path::PathBuf::from("."));
        let stem = compiled.name.clone().unwrap_or_else(|| "LAMBDA".to_string());
        let path = dir.join(format!("{}.lst", stem));
        if let Err(err) = std::fs::write(&path, compiled.disassemble()) {
            eprintln!("{} could not write {}: {}", WARN_TAG, path.display(), err);
        }
    }

    pub fn eval_forms(&mut self, forms: &[Value]) -> Result<Value, LanternError> {
        let mut last = Value::Nil;
        for form in forms {
            last = self.eval(form)?;
        }
        Ok(last)
    }

    /// Top-level driver contract: a failing form is reported, the
    /// saved-locals stack is unwound to its pre-form depth, the form
    /// yields nil and evaluation continues with the next form.
    pub fn eval_top_level(&mut self, form: &Value) -> Value {
        let depth = self.env.saved_depth();
        match self.eval(form) {
            Ok(value) => value,
            Err(err) => {
                self.env.unwind_saved(depth);
                if self.options.print_diagnostics {
                    for line in format_error(&err) {
                        eprintln!("{}", line);
                    }
                }
                Value::Nil
            }
        }
    }

    /// Run every form through `eval_top_level`, returning the last
    /// result. Stops early when a form requested QUIT.
    pub fn eval_forms_recovering(&mut self, forms: &[Value]) -> Value {
        let mut last = Value::Nil;
        for form in forms {
            last = self.eval_top_level(form);
            if self.quit {
                break;
            }
        }
        last
    }

    pub fn eval_source(&mut self, src: &str) -> Result<Value, LanternError> {
        let forms = reader::read_all(src)?;
        self.eval_forms(&forms)
    }
}

struct DoClause {
    var: String,
    init: Value,
    step: Value,
}

fn parse_do_clauses(form: &Value) -> Result<Vec<DoClause>, LanternError> {
    let items = match form {
        Value::List(items) => items.as_slice(),
        Value::Nil => &[],
        other => {
            return Err(LanternError::type_mismatch(
                "binding list",
                other.type_name(),
            ))
        }
    };
    let mut clauses = Vec::with_capacity(items.len());
    for item in items {
        let Value::List(parts) = item else {
            return Err(LanternError::syntax("DO binding must be (var init step)"));
        };
        if parts.len() != 3 {
            return Err(LanternError::syntax("DO binding must be (var init step)"));
        }
        let Value::Symbol(var) = &parts[0] else {
            return Err(LanternError::syntax("DO variable must be a symbol"));
        };
        clauses.push(DoClause {
            var: var.clone(),
            init: parts[1].clone(),
            step: parts[2].clone(),
        });
    }
    Ok(clauses)
}

fn split_loop_header<'a>(
    args: &'a [Value],
    form_name: &str,
) -> Result<(String, &'a Value, &'a [Value]), LanternError> {
    if args.is_empty() {
        return Err(LanternError::arity(format!(
            "{} expects a (var form) header",
            form_name
        )));
    }
    let Value::List(header) = &args[0] else {
        return Err(LanternError::syntax(format!(
            "{} header must be a (var form) list",
            form_name
        )));
    };
    if header.len() != 2 {
        return Err(LanternError::syntax(format!(
            "{} header must have a variable and one form",
            form_name
        )));
    }
    let Value::Symbol(var) = &header[0] else {
        return Err(LanternError::syntax(format!(
            "{} variable must be a symbol",
            form_name
        )));
    };
    Ok((var.clone(), &header[1], &args[1..]))
}

/// `(a b &OPTIONAL c (d expr))` → required `a b`, optional `c` (nil
/// default) and `d` (call-time default).
pub(crate) fn parse_parameter_list(form: &Value) -> Result<Params, LanternError> {
    let items = match form {
        Value::List(items) => items.as_slice(),
        Value::Nil => &[],
        other => {
            return Err(LanternError::type_mismatch(
                "parameter list",
                other.type_name(),
            ))
        }
    };
    let mut params = Params::default();
    let mut in_optional = false;
    for item in items {
        match item {
            Value::Symbol(name) if name == "&OPTIONAL" => {
                if in_optional {
                    return Err(LanternError::syntax("duplicate &OPTIONAL marker"));
                }
                in_optional = true;
            }
            Value::Symbol(name) => {
                if in_optional {
                    params.optional.push(OptionalParam {
                        name: name.clone(),
                        default: None,
                    });
                } else {
                    params.required.push(name.clone());
                }
            }
            Value::List(pair) if pair.len() == 2 => {
                if !in_optional {
                    return Err(LanternError::syntax(
                        "default value is only allowed after &OPTIONAL",
                    ));
                }
                let Value::Symbol(name) = &pair[0] else {
                    return Err(LanternError::syntax("parameter name must be a symbol"));
                };
                params.optional.push(OptionalParam {
                    name: name.clone(),
                    default: Some(pair[1].clone()),
                });
            }
            _ => return Err(LanternError::syntax("malformed parameter list")),
        }
    }
    Ok(params)
}
