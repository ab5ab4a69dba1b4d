//! Legacy return codes
//!
//! The legacy surface reports failures two ways. Socket and init style
//! operations return a POSIX errno ([`Errno`]); the rest return a legacy
//! status value ([`V2xError`]). Both carry the numeric code the C ABI used.

use thiserror::Error;
use v2x_core::{AdmissionError, RadioError};

/// POSIX style failure of a socket or init operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Errno {
    /// Invalid argument, or no usable radio
    #[error("invalid argument")]
    Inval,

    /// The backend refused or failed the request
    #[error("operation not permitted")]
    Perm,
}

impl Errno {
    /// Positive errno value
    pub fn raw(&self) -> i32 {
        match self {
            Errno::Inval => libc::EINVAL,
            Errno::Perm => libc::EPERM,
        }
    }

    /// Negative return value as seen by legacy callers
    pub fn code(&self) -> i32 {
        -self.raw()
    }
}

/// Legacy status values other than success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum V2xError {
    /// Generic failure
    #[error("failure")]
    Fail,

    /// Out of memory
    #[error("out of memory")]
    NoMemory,

    /// Bad parameter, typically an unknown socket
    #[error("bad parameter")]
    BadParam,

    /// The radio is missing or not initialised
    #[error("radio not ready")]
    RadioNotReady,
}

impl V2xError {
    /// Numeric legacy status; success is 0
    pub fn code(&self) -> i32 {
        match self {
            V2xError::Fail => 1,
            V2xError::NoMemory => 2,
            V2xError::BadParam => 3,
            V2xError::RadioNotReady => 5,
        }
    }
}

impl From<AdmissionError> for V2xError {
    fn from(status: AdmissionError) -> Self {
        match status {
            AdmissionError::InvalidState => V2xError::RadioNotReady,
            AdmissionError::NoMemory => V2xError::NoMemory,
            _ => V2xError::Fail,
        }
    }
}

impl From<RadioError> for V2xError {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::Admission(status) => status.into(),
            RadioError::Backend(_) | RadioError::Completion(_) => V2xError::Fail,
        }
    }
}

/// Legacy numeric code of an operation result
pub fn status_code(result: Result<(), V2xError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}
