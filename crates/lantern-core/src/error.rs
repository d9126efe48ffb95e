use thiserror::Error;

pub const ERROR_TAG: &str = "\x1b[31m[ERROR]\x1b[0m";
pub const WARN_TAG: &str = "\x1b[33m[WARN]\x1b[0m";

/// Every failure is scoped to one top-level form: the driver reports
/// it, unwinds the saved-locals stack and moves to the next form.
#[derive(Error, Debug, Clone)]
pub enum LanternError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Arity mismatch: {0}")]
    Arity(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    Type { expected: String, actual: String },

    #[error("Unbound variable: {0}")]
    UnboundVariable(String),

    #[error("Unbound function: {0}")]
    UnboundFunction(String),

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("{0}")]
    Message(String),
}

impl LanternError {
    pub fn syntax(message: impl Into<String>) -> Self {
        LanternError::Syntax(message.into())
    }

    pub fn arity(message: impl Into<String>) -> Self {
        LanternError::Arity(message.into())
    }

    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        LanternError::Type {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn unbound_variable(name: impl Into<String>) -> Self {
        LanternError::UnboundVariable(name.into())
    }

    pub fn unbound_function(name: impl Into<String>) -> Self {
        LanternError::UnboundFunction(name.into())
    }

    pub fn compile(message: impl Into<String>) -> Self {
        LanternError::Compile(message.into())
    }

    pub fn message(message: impl Into<String>) -> Self {
        LanternError::Message(message.into())
    }

    pub fn is_compile_error(&self) -> bool {
        matches!(self, LanternError::Compile(_))
    }
}

pub fn format_error(err: &LanternError) -> Vec<String> {
    vec![format!("{} {}", ERROR_TAG, err)]
}
