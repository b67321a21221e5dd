//! Interpreter conditions and status codes.

use thiserror::Error;

/// Coarse outcome of a run, shared with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Aborted,
    Internal,
    FailedPrecondition,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpreterCondition {
    InvalidOperandAddressV1,
    InvalidOperandFlagsAddressV1,
    InvalidOperandFlagsAddressV2,
    InvalidOperandJumpV1,
    InvalidOperandOffsetV1,
    InvalidOperandTypeV1,
    InvalidOperandImmediateChrV1,
    InvalidDataStackV1,
    InvalidDataStackV2,
    InvalidReceiver,
    RuntimeInvariant,
    MissingAssembly,
    MissingSymbol,
    ExceededMaximumRecursion,
    Interrupted,
    Aborted,
}

impl InterpreterCondition {
    pub fn status_code(self) -> StatusCode {
        use InterpreterCondition::*;
        match self {
            InvalidOperandAddressV1 | InvalidOperandFlagsAddressV1 | InvalidOperandFlagsAddressV2
            | InvalidOperandJumpV1 | InvalidOperandOffsetV1 | InvalidOperandTypeV1
            | InvalidOperandImmediateChrV1 | InvalidDataStackV1 | InvalidDataStackV2 | InvalidReceiver
            | Aborted => StatusCode::Aborted,
            RuntimeInvariant => StatusCode::Internal,
            MissingAssembly | MissingSymbol => StatusCode::FailedPrecondition,
            Interrupted => StatusCode::Cancelled,
            ExceededMaximumRecursion => StatusCode::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{condition:?}: {message}")]
pub struct InterpreterError {
    pub condition: InterpreterCondition,
    pub message: String,
}

impl InterpreterError {
    pub fn new(condition: InterpreterCondition, message: impl Into<String>) -> Self {
        Self { condition, message: message.into() }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(InterpreterCondition::RuntimeInvariant, message)
    }

    #[inline]
    pub fn status_code(&self) -> StatusCode {
        self.condition.status_code()
    }
}

impl From<lyric_object::ObjectError> for InterpreterError {
    fn from(err: lyric_object::ObjectError) -> Self {
        Self::invariant(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InterpreterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_status_codes() {
        assert_eq!(InterpreterCondition::InvalidReceiver.status_code(), StatusCode::Aborted);
        assert_eq!(InterpreterCondition::RuntimeInvariant.status_code(), StatusCode::Internal);
        assert_eq!(InterpreterCondition::MissingSymbol.status_code(), StatusCode::FailedPrecondition);
        assert_eq!(InterpreterCondition::Interrupted.status_code(), StatusCode::Cancelled);
        assert_eq!(InterpreterCondition::ExceededMaximumRecursion.status_code(), StatusCode::Unknown);
    }

    #[test]
    fn test_error_display() {
        let err = InterpreterError::invariant("missing call");
        assert_eq!(err.to_string(), "RuntimeInvariant: missing call");
    }
}
