mod math;
mod seq;
mod string;

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::ast::Value;
use crate::error::LanternError;
use crate::eval::Interp;
use crate::reader;
use crate::symbols::builtin_key;

/// Calling convention shared with lowered code: `args[0]` is the
/// operator-name symbol, `args[1..]` are already-evaluated operands.
pub type BuiltinFn = fn(&mut Interp, &[Value]) -> Result<Value, LanternError>;

/// The builtin library is a compile-time-known mapping, consulted
/// before the symbol table when resolving a call's operator name.
static REGISTRY: Lazy<HashMap<&'static str, BuiltinFn>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, BuiltinFn> = HashMap::new();
    let entries: &[(&'static str, BuiltinFn)] = &[
        ("ADD", math::add),
        ("SUBTRACT", math::subtract),
        ("MULT", math::mult),
        ("DIVIDE", math::divide),
        ("EQUALS", math::equals),
        ("NOT_EQUALS", math::not_equals),
        ("LESS_THAN", math::less_than),
        ("GREATER_THAN", math::greater_than),
        ("LESS_OR_EQUAL", math::less_or_equal),
        ("GREATER_OR_EQUAL", math::greater_or_equal),
        ("ONE_PLUS", math::one_plus),
        ("ONE_MINUS", math::one_minus),
        ("MIN", math::min),
        ("MAX", math::max),
        ("MOD", math::modulo),
        ("SIN", math::sin),
        ("COS", math::cos),
        ("SQRT", math::sqrt),
        ("RANDOM", math::random),
        ("ROUND", math::round),
        ("ZEROP", math::zerop),
        ("CAR", seq::car),
        ("FIRST", seq::car),
        ("CDR", seq::cdr),
        ("REST", seq::cdr),
        ("CONS", seq::cons),
        ("LIST", seq::list),
        ("ELT", seq::elt),
        ("ATOM", seq::atom),
        ("NULL", seq::null),
        ("STRING", string::string),
        ("STRING_UPCASE", string::string_upcase),
        ("STRING_DOWNCASE", string::string_downcase),
        ("FORMAT", string::format),
        ("NOT", not),
        ("EQ", eq),
        ("EQL", eql),
        ("EQUAL", equal),
        ("TYPEOF", typeof_),
        ("LOAD", load),
        ("QUIT", quit),
    ];
    for (name, func) in entries {
        table.insert(*name, *func);
    }
    table
});

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    REGISTRY.get(builtin_key(name).as_ref()).copied()
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

pub(crate) fn op_name(args: &[Value]) -> &str {
    match args.first() {
        Some(Value::Symbol(name)) => name,
        _ => "?",
    }
}

pub(crate) fn expect_exact(args: &[Value], count: usize) -> Result<(), LanternError> {
    if args.len() - 1 != count {
        return Err(LanternError::arity(format!(
            "{} expects exactly {} args, got {}",
            op_name(args),
            count,
            args.len() - 1
        )));
    }
    Ok(())
}

pub(crate) fn expect_at_least(args: &[Value], count: usize) -> Result<(), LanternError> {
    if args.len() - 1 < count {
        return Err(LanternError::arity(format!(
            "{} expects at least {} args, got {}",
            op_name(args),
            count,
            args.len() - 1
        )));
    }
    Ok(())
}

fn not(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    Ok(Value::bool(args[1].is_nil()))
}

// Identity-flavored equality: symbols, integers and nil only.
fn eq(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 2)?;
    let same = match (&args[1], &args[2]) {
        (Value::Symbol(a), Value::Symbol(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (a, b) => a.is_nil() && b.is_nil(),
    };
    Ok(Value::bool(same))
}

// EQ plus same-type float comparison.
fn eql(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 2)?;
    if let (Value::Float(a), Value::Float(b)) = (&args[1], &args[2]) {
        return Ok(Value::bool(a == b));
    }
    eq(_interp, args)
}

fn equal(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 2)?;
    Ok(Value::bool(args[1] == args[2]))
}

fn typeof_(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    Ok(Value::Str(args[1].type_name().to_string()))
}

fn load(interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    let Value::Str(path) = &args[1] else {
        return Err(LanternError::type_mismatch("string", args[1].type_name()));
    };
    let source = std::fs::read_to_string(path)
        .map_err(|err| LanternError::message(format!("could not load {}: {}", path, err)))?;
    let forms = reader::read_all(&source)?;
    interp.eval_forms(&forms)?;
    Ok(Value::truth())
}

fn quit(interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    let _ = args;
    interp.request_quit();
    Ok(Value::Nil)
}
