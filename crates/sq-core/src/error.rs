//! Error types for the softquad interpreter

use thiserror::Error;

/// Main error type for softquad
#[derive(Error, Debug)]
pub enum SoftquadError {
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Shader error: {0}")]
    Shader(String),
}

/// Shader execution machine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("{stack} stack overflow (capacity {capacity})")]
    StackOverflow { stack: &'static str, capacity: usize },

    #[error("{stack} stack underflow")]
    StackUnderflow { stack: &'static str },

    #[error("Invalid program at instruction {pc}: {reason}")]
    InvalidProgram { pc: usize, reason: String },

    #[error("Loop at instruction {pc} exceeded {limit} iterations")]
    LoopIterationLimit { pc: usize, limit: u32 },

    #[error("No shader bound")]
    NotBound,

    #[error("Program counter {0} out of range")]
    PcOutOfRange(i32),

    #[error("Compute dispatch did not converge after {0} barrier rounds")]
    BarrierDeadlock(u32),
}

/// Texture sampling errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    #[error("Invalid texture: {0}")]
    InvalidTexture(String),

    #[error("Unit {0} out of range")]
    UnitOutOfRange(u32),
}

impl ExecError {
    /// Shorthand for a bind-time validation failure
    pub fn invalid(pc: usize, reason: impl Into<String>) -> Self {
        Self::InvalidProgram {
            pc,
            reason: reason.into(),
        }
    }
}

/// Result type alias for softquad operations
pub type Result<T> = std::result::Result<T, SoftquadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExecError::StackOverflow {
            stack: "cond",
            capacity: 32,
        };
        assert_eq!(format!("{}", err), "cond stack overflow (capacity 32)");

        let err = ExecError::invalid(7, "label out of range");
        assert_eq!(
            format!("{}", err),
            "Invalid program at instruction 7: label out of range"
        );
    }

    #[test]
    fn test_error_conversion() {
        let exec_err = ExecError::NotBound;
        let err: SoftquadError = exec_err.into();
        assert!(matches!(err, SoftquadError::Exec(ExecError::NotBound)));

        let err: SoftquadError = SamplerError::UnitOutOfRange(200).into();
        assert!(matches!(err, SoftquadError::Sampler(_)));
    }
}
