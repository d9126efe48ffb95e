use rand::Rng;

use crate::ast::Value;
use crate::error::LanternError;
use crate::eval::Interp;

use super::{expect_at_least, expect_exact, op_name};

/// Numeric contagion as in the original: integer arithmetic unless any
/// operand is a float, in which case everything widens to float.
enum Numbers {
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

fn numbers(args: &[Value]) -> Result<Numbers, LanternError> {
    let operands = &args[1..];
    for value in operands {
        if !value.is_number() {
            return Err(LanternError::type_mismatch("number", value.type_name()));
        }
    }
    if operands.iter().any(|v| matches!(v, Value::Float(_))) {
        let floats = operands
            .iter()
            .map(|v| v.as_f64().unwrap_or_default())
            .collect();
        Ok(Numbers::Floats(floats))
    } else {
        let ints = operands
            .iter()
            .map(|v| match v {
                Value::Int(n) => *n,
                _ => 0,
            })
            .collect();
        Ok(Numbers::Ints(ints))
    }
}

pub(super) fn add(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    match numbers(args)? {
        Numbers::Ints(ns) => Ok(Value::Int(ns.iter().sum())),
        Numbers::Floats(ns) => Ok(Value::Float(ns.iter().sum())),
    }
}

pub(super) fn subtract(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_at_least(args, 1)?;
    match numbers(args)? {
        Numbers::Ints(ns) => {
            if ns.len() == 1 {
                return Ok(Value::Int(-ns[0]));
            }
            Ok(Value::Int(ns[1..].iter().fold(ns[0], |acc, n| acc - n)))
        }
        Numbers::Floats(ns) => {
            if ns.len() == 1 {
                return Ok(Value::Float(-ns[0]));
            }
            Ok(Value::Float(ns[1..].iter().fold(ns[0], |acc, n| acc - n)))
        }
    }
}

pub(super) fn mult(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    match numbers(args)? {
        Numbers::Ints(ns) => Ok(Value::Int(ns.iter().product())),
        Numbers::Floats(ns) => Ok(Value::Float(ns.iter().product())),
    }
}

pub(super) fn divide(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_at_least(args, 1)?;
    match numbers(args)? {
        Numbers::Ints(ns) => {
            if ns.len() == 1 {
                return Ok(Value::Int(ns[0]));
            }
            let mut acc = ns[0];
            for n in &ns[1..] {
                if *n == 0 {
                    return Err(LanternError::message("division by zero"));
                }
                acc /= n;
            }
            Ok(Value::Int(acc))
        }
        Numbers::Floats(ns) => {
            if ns.len() == 1 {
                return Ok(Value::Float(ns[0]));
            }
            Ok(Value::Float(ns[1..].iter().fold(ns[0], |acc, n| acc / n)))
        }
    }
}

fn as_floats(args: &[Value]) -> Result<Vec<f64>, LanternError> {
    match numbers(args)? {
        Numbers::Ints(ns) => Ok(ns.into_iter().map(|n| n as f64).collect()),
        Numbers::Floats(ns) => Ok(ns),
    }
}

fn comparison_chain(
    args: &[Value],
    ok: impl Fn(f64, f64) -> bool,
) -> Result<Value, LanternError> {
    expect_at_least(args, 1)?;
    let ns = as_floats(args)?;
    let holds = ns.windows(2).all(|pair| ok(pair[0], pair[1]));
    Ok(Value::bool(holds))
}

pub(super) fn equals(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    comparison_chain(args, |a, b| a == b)
}

/// True when no two operands are numerically equal; the two-argument
/// case is the negation of `=`.
pub(super) fn not_equals(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_at_least(args, 1)?;
    let ns = as_floats(args)?;
    for (idx, a) in ns.iter().enumerate() {
        if ns[idx + 1..].iter().any(|b| a == b) {
            return Ok(Value::Nil);
        }
    }
    Ok(Value::truth())
}

pub(super) fn less_than(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    comparison_chain(args, |a, b| a < b)
}

pub(super) fn greater_than(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    comparison_chain(args, |a, b| a > b)
}

pub(super) fn less_or_equal(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    comparison_chain(args, |a, b| a <= b)
}

pub(super) fn greater_or_equal(
    _interp: &mut Interp,
    args: &[Value],
) -> Result<Value, LanternError> {
    comparison_chain(args, |a, b| a >= b)
}

pub(super) fn one_plus(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    match &args[1] {
        Value::Int(n) => Ok(Value::Int(n + 1)),
        Value::Float(n) => Ok(Value::Float(n + 1.0)),
        other => Err(LanternError::type_mismatch("number", other.type_name())),
    }
}

pub(super) fn one_minus(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    match &args[1] {
        Value::Int(n) => Ok(Value::Int(n - 1)),
        Value::Float(n) => Ok(Value::Float(n - 1.0)),
        other => Err(LanternError::type_mismatch("number", other.type_name())),
    }
}

pub(super) fn min(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_at_least(args, 1)?;
    match numbers(args)? {
        Numbers::Ints(ns) => Ok(Value::Int(ns.into_iter().min().unwrap_or(0))),
        Numbers::Floats(ns) => Ok(Value::Float(ns.into_iter().fold(f64::INFINITY, f64::min))),
    }
}

pub(super) fn max(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_at_least(args, 1)?;
    match numbers(args)? {
        Numbers::Ints(ns) => Ok(Value::Int(ns.into_iter().max().unwrap_or(0))),
        Numbers::Floats(ns) => Ok(Value::Float(
            ns.into_iter().fold(f64::NEG_INFINITY, f64::max),
        )),
    }
}

pub(super) fn modulo(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 2)?;
    let (Value::Int(a), Value::Int(b)) = (&args[1], &args[2]) else {
        return Err(LanternError::message(format!(
            "{} only works for integer values",
            op_name(args)
        )));
    };
    if *b == 0 {
        return Err(LanternError::message("division by zero"));
    }
    Ok(Value::Int(a % b))
}

fn unary_float(args: &[Value], f: impl Fn(f64) -> f64) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    match args[1].as_f64() {
        Some(n) => Ok(Value::Float(f(n))),
        None => Err(LanternError::type_mismatch(
            "number",
            args[1].type_name(),
        )),
    }
}

pub(super) fn sin(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    unary_float(args, f64::sin)
}

pub(super) fn cos(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    unary_float(args, f64::cos)
}

pub(super) fn sqrt(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    unary_float(args, f64::sqrt)
}

pub(super) fn random(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    let mut rng = rand::thread_rng();
    match &args[1] {
        Value::Int(n) if *n > 0 => Ok(Value::Int(rng.gen_range(0..*n))),
        Value::Float(n) if *n > 0.0 => Ok(Value::Float(rng.gen::<f64>() * n)),
        other if other.is_number() => Err(LanternError::message(format!(
            "{} expects a positive bound",
            op_name(args)
        ))),
        other => Err(LanternError::type_mismatch("number", other.type_name())),
    }
}

/// `(quotient remainder)` of rounding the first operand by the second
/// (default 1).
pub(super) fn round(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    if args.len() - 1 != 1 && args.len() - 1 != 2 {
        return Err(LanternError::arity(format!(
            "{} expects 1 or 2 args, got {}",
            op_name(args),
            args.len() - 1
        )));
    }
    let both_int = args[1..].iter().all(|v| matches!(v, Value::Int(_)));
    let a = args[1]
        .as_f64()
        .ok_or_else(|| LanternError::type_mismatch("number", args[1].type_name()))?;
    let b = match args.get(2) {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| LanternError::type_mismatch("number", v.type_name()))?,
        None => 1.0,
    };
    if b == 0.0 {
        return Err(LanternError::message("division by zero"));
    }
    let quotient = (a / b).round();
    let remainder = a - quotient * b;
    let remainder = if both_int {
        Value::Int(remainder as i64)
    } else {
        Value::Float(remainder)
    };
    Ok(Value::List(vec![Value::Int(quotient as i64), remainder]))
}

pub(super) fn zerop(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    match args[1].as_f64() {
        Some(n) => Ok(Value::bool(n == 0.0)),
        None => Err(LanternError::type_mismatch(
            "number",
            args[1].type_name(),
        )),
    }
}
