use std::fmt;
use std::sync::Arc;

use crate::symbols::canonical_symbol_name;
use crate::vm::bytecode::CompiledFn;

/// A Lantern expression and a Lantern value are the same thing: the
/// reader produces `Value` trees and the evaluator returns them.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    List(Vec<Value>),
    Function(Arc<Function>),
}

/// A named or anonymous function. Exactly one representation at a
/// time: DEFUN/LAMBDA create `Interpreted`, COMPILE replaces it with
/// `Compiled`.
#[derive(Clone, Debug)]
pub enum Function {
    Interpreted(FnDef),
    Compiled(Arc<CompiledFn>),
}

#[derive(Clone, Debug)]
pub struct FnDef {
    pub params: Params,
    pub body: Value,
}

/// Parameter list split at the `&OPTIONAL` marker.
#[derive(Clone, Debug, Default)]
pub struct Params {
    pub required: Vec<String>,
    pub optional: Vec<OptionalParam>,
}

#[derive(Clone, Debug)]
pub struct OptionalParam {
    pub name: String,
    /// Default expression, evaluated at call time in the caller's
    /// pre-call environment when the actual is omitted.
    pub default: Option<Value>,
}

impl Params {
    pub fn min_arity(&self) -> usize {
        self.required.len()
    }

    pub fn max_arity(&self) -> usize {
        self.required.len() + self.optional.len()
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        if let Some(idx) = self.required.iter().position(|p| p == name) {
            return Some(idx);
        }
        self.optional
            .iter()
            .position(|p| p.name == name)
            .map(|idx| self.required.len() + idx)
    }
}

impl Value {
    pub fn symbol(name: impl AsRef<str>) -> Value {
        Value::Symbol(canonical_symbol_name(name.as_ref()).into_owned())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    pub fn truth() -> Value {
        Value::Symbol("T".to_string())
    }

    /// Boolean from truthiness: `T` for true, nil for false.
    pub fn bool(truthy: bool) -> Value {
        if truthy {
            Value::truth()
        } else {
            Value::Nil
        }
    }

    /// The nil sentinel and the empty list are the same false value.
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        !self.is_nil()
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Function(_) => "function",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Nil, Value::List(items)) | (Value::List(items), Value::Nil) => items.is_empty(),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "NIL"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Symbol(name) => write!(f, "{}", name),
            Value::List(items) => {
                if items.is_empty() {
                    return write!(f, "NIL");
                }
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Function(func) => match func.as_ref() {
                Function::Interpreted(_) => write!(f, "#<FUNCTION>"),
                Function::Compiled(compiled) => match &compiled.name {
                    Some(name) => write!(f, "#<COMPILED-FUNCTION {}>", name),
                    None => write!(f, "#<COMPILED-FUNCTION>"),
                },
            },
        }
    }
}
