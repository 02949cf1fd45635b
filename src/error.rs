//! Error types for wgkern

use crate::dtype::DType;
use thiserror::Error;

/// Result type alias using wgkern's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running a kernel program
#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported dtype for an operation
    #[error("Unsupported dtype {dtype:?} for operation '{op}'")]
    UnsupportedDType {
        /// The unsupported dtype
        dtype: DType,
        /// The operation name
        op: &'static str,
    },

    /// Operand rank exceeds what the index machinery supports
    #[error("Rank {rank} exceeds the maximum supported rank {max}")]
    RankOverflow {
        /// The offending rank
        rank: usize,
        /// Maximum supported rank
        max: usize,
    },

    /// An element count, offset, or dispatch quantity is out of its representable range
    #[error("Geometry overflow: {what} = {value} is out of range")]
    GeometryOverflow {
        /// Which quantity overflowed
        what: &'static str,
        /// The unrepresentable value
        value: u128,
    },

    /// Shape mismatch in an operation
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Shapes cannot be broadcast together
    #[error("Cannot broadcast shapes {lhs:?} and {rhs:?}")]
    BroadcastError {
        /// Left-hand side shape
        lhs: Vec<usize>,
        /// Right-hand side shape
        rhs: Vec<usize>,
    },

    /// DType mismatch between operands
    #[error("DType mismatch: {lhs:?} vs {rhs:?}")]
    DTypeMismatch {
        /// Left-hand side dtype
        lhs: DType,
        /// Right-hand side dtype
        rhs: DType,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// No registered kernel matches the requested operator signature
    #[error("No kernel registered for '{op}' version {version} with dtype {dtype:?}")]
    KernelNotFound {
        /// Operator name
        op: String,
        /// Requested opset version
        version: u32,
        /// Requested element type
        dtype: DType,
    },

    /// The execution adapter failed to compile or run a program
    #[error("Execution failed: {0}")]
    Execution(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create a broadcast error
    pub fn broadcast(lhs: &[usize], rhs: &[usize]) -> Self {
        Self::BroadcastError {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        }
    }

    /// Create an unsupported dtype error
    pub fn unsupported_dtype(dtype: DType, op: &'static str) -> Self {
        Self::UnsupportedDType { dtype, op }
    }

    /// Create a geometry overflow error
    pub fn geometry_overflow(what: &'static str, value: impl Into<u128>) -> Self {
        Self::GeometryOverflow {
            what,
            value: value.into(),
        }
    }

    /// Wrap an adapter failure without altering it
    pub fn execution<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Execution(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::unsupported_dtype(DType::String, "Add");
        assert_eq!(
            err.to_string(),
            "Unsupported dtype String for operation 'Add'"
        );

        let err = Error::RankOverflow { rank: 9, max: 8 };
        assert!(err.to_string().contains("Rank 9"));

        let err = Error::geometry_overflow("packed_count", u64::MAX);
        assert!(err.to_string().contains("packed_count"));
    }

    #[test]
    fn test_execution_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::other("device lost");
        let err = Error::execution(io);
        let source = err.source().expect("execution error carries its source");
        assert_eq!(source.to_string(), "device lost");
    }
}
