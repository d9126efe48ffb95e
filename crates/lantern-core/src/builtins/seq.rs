use crate::ast::Value;
use crate::error::LanternError;
use crate::eval::Interp;

use super::{expect_exact, op_name};

pub(super) fn car(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    match &args[1] {
        Value::List(items) => Ok(items.first().cloned().unwrap_or(Value::Nil)),
        Value::Nil => Ok(Value::Nil),
        other => Err(LanternError::type_mismatch("list", other.type_name())),
    }
}

pub(super) fn cdr(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    match &args[1] {
        Value::List(items) if items.len() > 1 => Ok(Value::List(items[1..].to_vec())),
        Value::List(_) | Value::Nil => Ok(Value::Nil),
        other => Err(LanternError::type_mismatch("list", other.type_name())),
    }
}

/// Prepend onto a list; `(CONS a NIL)` is `(a)` and consing onto a
/// non-list atom yields the two-element list `(a b)`.
pub(super) fn cons(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 2)?;
    let head = args[1].clone();
    match &args[2] {
        Value::Nil => Ok(Value::List(vec![head])),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len() + 1);
            out.push(head);
            out.extend(items.iter().cloned());
            Ok(Value::List(out))
        }
        tail => Ok(Value::List(vec![head, tail.clone()])),
    }
}

pub(super) fn list(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    if args.len() == 1 {
        return Ok(Value::Nil);
    }
    Ok(Value::List(args[1..].to_vec()))
}

pub(super) fn elt(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 2)?;
    let Value::Int(idx) = &args[2] else {
        return Err(LanternError::type_mismatch("integer", args[2].type_name()));
    };
    let idx = usize::try_from(*idx)
        .map_err(|_| LanternError::message(format!("{} index out of bounds", op_name(args))))?;
    match &args[1] {
        Value::Str(s) => s
            .chars()
            .nth(idx)
            .map(|ch| Value::Str(ch.to_string()))
            .ok_or_else(|| LanternError::message(format!("{} index out of bounds", op_name(args)))),
        Value::List(items) => items
            .get(idx)
            .cloned()
            .ok_or_else(|| LanternError::message(format!("{} index out of bounds", op_name(args)))),
        other => Err(LanternError::type_mismatch("sequence", other.type_name())),
    }
}

pub(super) fn atom(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    let is_cons = matches!(&args[1], Value::List(items) if !items.is_empty());
    Ok(Value::bool(!is_cons))
}

pub(super) fn null(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    Ok(Value::bool(args[1].is_nil()))
}
