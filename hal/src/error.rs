//! # Error Handling
//!
//! Typed errors for the native layer and everything built on top of it.
//!
//! Errors follow these rules:
//! - Errors are `Copy` and `no_std` compatible
//! - No panics in production code paths
//! - Every error maps onto exactly one public [`ResultCode`]

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// Replay result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Usage Errors
    // =========================================================================
    /// Operation is not valid in the object's current state
    InvalidOperation,
    /// A value is out of range or malformed
    InvalidValue,
    /// A required handle was missing
    InvalidNullHandle,
    /// A required pointer was missing
    InvalidNullPointer,
    /// An argument descriptor is malformed
    InvalidArgument,
    /// Work dimension outside `1..=3`
    InvalidWorkDimension,
    /// Global size is not a multiple of the work-group size
    InvalidWorkGroupSize,

    // =========================================================================
    // Capability Errors
    // =========================================================================
    /// The device lacks a capability required by the request
    UnsupportedFeature,

    // =========================================================================
    // Resource Errors
    // =========================================================================
    /// Host allocation failed
    OutOfHostMemory,
    /// Device allocation failed
    OutOfDeviceMemory,

    // =========================================================================
    // Native Layer Errors
    // =========================================================================
    /// The device stopped responding
    DeviceLost,
    /// A host wait timed out
    Timeout,
    /// The queried object has not completed yet
    NotReady,
    /// Unexpected native failure
    Unknown,
}

impl Error {
    /// Public result code for this error
    pub const fn code(self) -> ResultCode {
        match self {
            Self::InvalidOperation => ResultCode::ErrorInvalidOperation,
            Self::InvalidValue => ResultCode::ErrorInvalidValue,
            Self::InvalidNullHandle => ResultCode::ErrorInvalidNullHandle,
            Self::InvalidNullPointer => ResultCode::ErrorInvalidNullPointer,
            Self::InvalidArgument => ResultCode::ErrorInvalidArgument,
            Self::InvalidWorkDimension => ResultCode::ErrorInvalidWorkDimension,
            Self::InvalidWorkGroupSize => ResultCode::ErrorInvalidWorkGroupSize,
            Self::UnsupportedFeature => ResultCode::ErrorUnsupportedFeature,
            Self::OutOfHostMemory => ResultCode::ErrorOutOfHostMemory,
            Self::OutOfDeviceMemory => ResultCode::ErrorOutOfDeviceMemory,
            Self::DeviceLost => ResultCode::ErrorDeviceLost,
            Self::Timeout | Self::NotReady | Self::Unknown => ResultCode::ErrorUnknown,
        }
    }

    /// Whether a caller could reasonably retry
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::NotReady)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Usage
            Self::InvalidOperation => write!(f, "invalid operation"),
            Self::InvalidValue => write!(f, "invalid value"),
            Self::InvalidNullHandle => write!(f, "invalid null handle"),
            Self::InvalidNullPointer => write!(f, "invalid null pointer"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::InvalidWorkDimension => write!(f, "invalid work dimension"),
            Self::InvalidWorkGroupSize => write!(f, "invalid work-group size"),

            // Capability
            Self::UnsupportedFeature => write!(f, "unsupported feature"),

            // Resource
            Self::OutOfHostMemory => write!(f, "out of host memory"),
            Self::OutOfDeviceMemory => write!(f, "out of device memory"),

            // Native
            Self::DeviceLost => write!(f, "device lost"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::NotReady => write!(f, "not ready"),
            Self::Unknown => write!(f, "unknown native failure"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Self::OutOfHostMemory
    }
}

// =============================================================================
// RESULT CODES
// =============================================================================

/// Result code returned across the public API boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    /// Success
    Success = 0,
    /// See [`Error::InvalidOperation`]
    ErrorInvalidOperation = 1,
    /// See [`Error::InvalidValue`]
    ErrorInvalidValue = 2,
    /// See [`Error::InvalidNullHandle`]
    ErrorInvalidNullHandle = 3,
    /// See [`Error::InvalidNullPointer`]
    ErrorInvalidNullPointer = 4,
    /// See [`Error::InvalidArgument`]
    ErrorInvalidArgument = 5,
    /// See [`Error::InvalidWorkDimension`]
    ErrorInvalidWorkDimension = 6,
    /// See [`Error::InvalidWorkGroupSize`]
    ErrorInvalidWorkGroupSize = 7,
    /// See [`Error::UnsupportedFeature`]
    ErrorUnsupportedFeature = 8,
    /// See [`Error::OutOfHostMemory`]
    ErrorOutOfHostMemory = 9,
    /// See [`Error::OutOfDeviceMemory`]
    ErrorOutOfDeviceMemory = 10,
    /// See [`Error::DeviceLost`]
    ErrorDeviceLost = 11,
    /// Unexpected native failure wrapped opaquely
    ErrorUnknown = 0x7fff_fffe,
}

impl ResultCode {
    /// Collapse a result into its code
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.code(),
        }
    }

    /// Check for success
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<Error> for ResultCode {
    fn from(error: Error) -> Self {
        error.code()
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_for_usage_errors() {
        let errors = [
            Error::InvalidOperation,
            Error::InvalidValue,
            Error::InvalidNullHandle,
            Error::InvalidNullPointer,
            Error::InvalidArgument,
            Error::InvalidWorkDimension,
            Error::InvalidWorkGroupSize,
            Error::UnsupportedFeature,
            Error::OutOfHostMemory,
        ];
        for (i, a) in errors.iter().enumerate() {
            for b in &errors[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_native_failures_collapse_to_unknown() {
        assert_eq!(Error::Timeout.code(), ResultCode::ErrorUnknown);
        assert_eq!(Error::Unknown.code(), ResultCode::ErrorUnknown);
        assert!(Error::NotReady.is_transient());
        assert!(!Error::InvalidValue.is_transient());
    }

    #[test]
    fn test_result_code_of() {
        let ok: Result<u32> = Ok(1);
        let err: Result<u32> = Err(Error::InvalidOperation);
        assert!(ResultCode::of(&ok).is_success());
        assert_eq!(ResultCode::of(&err), ResultCode::ErrorInvalidOperation);
    }
}
