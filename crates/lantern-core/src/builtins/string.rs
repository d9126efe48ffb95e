use crate::ast::Value;
use crate::error::LanternError;
use crate::eval::Interp;

use super::{expect_at_least, expect_exact};

/// Display form without the quotes a string carries in list printing.
fn display_plain(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(super) fn string(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    Ok(Value::Str(display_plain(&args[1])))
}

pub(super) fn string_upcase(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    Ok(Value::Str(display_plain(&args[1]).to_uppercase()))
}

pub(super) fn string_downcase(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_exact(args, 1)?;
    Ok(Value::Str(display_plain(&args[1]).to_lowercase()))
}

/// `(FORMAT dest control args...)` with the `~A`, `~D` and `~%`
/// directives. A truthy destination prints and yields nil; a nil
/// destination yields the built string.
pub(super) fn format(_interp: &mut Interp, args: &[Value]) -> Result<Value, LanternError> {
    expect_at_least(args, 2)?;
    let dest = &args[1];
    let Value::Str(control) = &args[2] else {
        return Err(LanternError::type_mismatch("string", args[2].type_name()));
    };
    let mut rest = args[3..].iter();
    let mut out = String::new();
    let mut chars = control.chars();
    while let Some(ch) = chars.next() {
        if ch != '~' {
            out.push(ch);
            continue;
        }
        match chars.next().map(|d| d.to_ascii_uppercase()) {
            Some('A') | Some('D') => {
                let value = rest.next().ok_or_else(|| {
                    LanternError::arity("FORMAT ran out of args for its directives")
                })?;
                out.push_str(&display_plain(value));
            }
            Some('%') => out.push('\n'),
            // Unknown directives are consumed without output.
            Some(_) => {}
            None => break,
        }
    }
    if dest.is_truthy() {
        print!("{}", out);
        Ok(Value::Nil)
    } else {
        Ok(Value::Str(out))
    }
}
