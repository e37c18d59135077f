//! Error types for blocksolve

use thiserror::Error;

/// Result type alias using blocksolve's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of an [`Error`], used by callers to pick a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad option or device index, detected before any device work.
    Configuration,
    /// Allocation failure or device API error. Fatal for the solver instance.
    Device,
    /// Singular pivot or degenerate pattern. The caller may retry with a
    /// different preconditioner or a smaller step.
    Numerical,
    /// An operation was called out of order or with mismatched data.
    Usage,
}

/// Errors that can occur while setting up or running a solve
#[derive(Error, Debug)]
pub enum Error {
    /// Array lengths or block size inconsistent with the stated dimensions
    #[error("Invalid dimension for {what}: {reason}")]
    InvalidDimension {
        /// Which argument was rejected
        what: &'static str,
        /// Why
        reason: String,
    },

    /// Option value recognized but not supported, or not recognized at all
    #[error("Unsupported configuration {option}={value}: {reason}")]
    UnsupportedConfiguration {
        /// Option name
        option: &'static str,
        /// Offending value
        value: String,
        /// Reason for rejection
        reason: String,
    },

    /// The runtime found no compute platforms
    #[error("No compute platforms found for runtime '{runtime}'")]
    NoPlatforms {
        /// Runtime name
        runtime: &'static str,
    },

    /// Platform index out of range
    #[error("Platform index {index} out of range ({available} platforms available)")]
    InvalidPlatform {
        /// Requested platform
        index: usize,
        /// Number of platforms found
        available: usize,
    },

    /// Device index out of range for the chosen platform
    #[error("Device index {index} out of range ({available} devices on platform {platform})")]
    InvalidDevice {
        /// Chosen platform
        platform: usize,
        /// Requested device
        index: usize,
        /// Number of devices on the platform
        available: usize,
    },

    /// Device buffer could not be created
    #[error("Device allocation of {bytes} bytes for '{label}' failed: {reason}")]
    DeviceAllocation {
        /// Buffer label
        label: &'static str,
        /// Requested size in bytes
        bytes: u64,
        /// Underlying reason
        reason: String,
    },

    /// A device API call failed
    #[error("Device error during {operation}: {message}")]
    Device {
        /// The operation being attempted
        operation: &'static str,
        /// Message reported by the device layer
        message: String,
    },

    /// Diagonal block could not be inverted during factorization
    #[error("Singular pivot in block row {block_row} (|pivot| = {pivot:e})")]
    SingularPivot {
        /// Block row (in solver order) whose diagonal block failed
        block_row: usize,
        /// Magnitude of the offending pivot
        pivot: f64,
    },

    /// Structural analysis of the sparsity pattern failed
    #[error("Matrix analysis failed: {reason}")]
    AnalysisFailed {
        /// Why the pattern was rejected
        reason: String,
    },

    /// Building the preconditioner from the current values failed
    #[error("Preconditioner build failed: {source}")]
    PreconditionerBuildFailed {
        /// Cause, usually [`Error::SingularPivot`]
        #[source]
        source: Box<Error>,
    },

    /// Operation called in the wrong solver state
    #[error("Operation '{operation}' not allowed in state {state}")]
    InvalidState {
        /// Operation name
        operation: &'static str,
        /// Current state
        state: String,
    },

    /// Vector or matrix length does not match the initialized system
    #[error("Length mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// What was checked
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        got: usize,
    },
}

impl Error {
    /// Create an invalid dimension error
    pub fn invalid_dimension(what: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidDimension {
            what,
            reason: reason.into(),
        }
    }

    /// Create an unsupported configuration error
    pub fn unsupported(
        option: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedConfiguration {
            option,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a device error
    pub fn device(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Device {
            operation,
            message: message.into(),
        }
    }

    /// Create an analysis error
    pub fn analysis(reason: impl Into<String>) -> Self {
        Self::AnalysisFailed {
            reason: reason.into(),
        }
    }

    /// Create a length mismatch error, or `Ok` when the lengths agree
    pub fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
        if expected == got {
            Ok(())
        } else {
            Err(Self::ShapeMismatch {
                what,
                expected,
                got,
            })
        }
    }

    /// Broad category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDimension { .. }
            | Self::UnsupportedConfiguration { .. }
            | Self::NoPlatforms { .. }
            | Self::InvalidPlatform { .. }
            | Self::InvalidDevice { .. } => ErrorCategory::Configuration,
            Self::DeviceAllocation { .. } | Self::Device { .. } => ErrorCategory::Device,
            Self::SingularPivot { .. }
            | Self::AnalysisFailed { .. }
            | Self::PreconditionerBuildFailed { .. } => ErrorCategory::Numerical,
            Self::InvalidState { .. } | Self::ShapeMismatch { .. } => ErrorCategory::Usage,
        }
    }

    /// True when the caller can retry (other preconditioner, smaller step)
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Numerical
    }

    /// Innermost error, following `PreconditionerBuildFailed` chains
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::PreconditionerBuildFailed { source } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let e = Error::unsupported("preconditioner", "cpr_trueimpes", "not implemented");
        assert_eq!(e.category(), ErrorCategory::Configuration);
        assert!(!e.is_recoverable());

        let e = Error::PreconditionerBuildFailed {
            source: Box::new(Error::SingularPivot {
                block_row: 3,
                pivot: 0.0,
            }),
        };
        assert!(e.is_recoverable());
        assert!(matches!(
            e.root_cause(),
            Error::SingularPivot { block_row: 3, .. }
        ));
    }

    #[test]
    fn test_check_len() {
        assert!(Error::check_len("rhs", 4, 4).is_ok());
        let err = Error::check_len("rhs", 4, 3).unwrap_err();
        assert_eq!(err.to_string(), "Length mismatch for rhs: expected 4, got 3");
    }
}
