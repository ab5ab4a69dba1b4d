//! Error types for radio coordination
//!
//! A backend call can fail at two distinct points: synchronously, when the
//! request is refused before any asynchronous work starts, and later, when
//! the single completion for the request carries a failure code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Synchronous refusal of a backend request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionError {
    /// Generic failure
    #[error("request failed")]
    Failed,

    /// A parameter was out of range or missing
    #[error("invalid parameter")]
    InvalidParam,

    /// The radio is not in a state that accepts the request
    #[error("invalid state")]
    InvalidState,

    /// The subsystem has not finished initializing
    #[error("subsystem not ready")]
    NotReady,

    /// The request is not permitted
    #[error("not allowed")]
    NotAllowed,

    /// The operation has no implementation on this backend
    #[error("not implemented")]
    NotImplemented,

    /// The requested change is already in effect
    #[error("already in effect")]
    Already,

    /// The referenced object does not exist
    #[error("no such object")]
    NoSuch,

    /// The backend could not allocate resources for the request
    #[error("out of memory")]
    NoMemory,
}

/// Failure carried by an asynchronous completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unspecified failure
    #[error("generic failure")]
    GenericFailure,

    /// The modem rejected the request
    #[error("modem error")]
    ModemErr,

    /// A required resource was not supplied
    #[error("missing resource")]
    MissingResource,

    /// The referenced element is not registered
    #[error("no such element")]
    NoSuchElement,

    /// The request changed nothing
    #[error("request had no effect")]
    NoEffect,

    /// Internal backend error
    #[error("internal error")]
    InternalErr,

    /// No resources available to satisfy the request
    #[error("no resources")]
    NoResources,

    /// An argument was rejected by the backend
    #[error("invalid argument")]
    InvalidArg,

    /// The backend does not support the request
    #[error("not supported")]
    NotSupported,

    /// The maximum number of flows of the requested kind is already allocated
    #[error("maximum number of flows exceeded")]
    ExceedMax,

    /// Service ids or L2 addresses conflict with an existing registration
    #[error("service id or L2 address not compatible with existing registration")]
    SrvIdL2AddrsNotCompatible,
}

/// Failure of the single-shot completion channel itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// A second fulfillment was attempted on a completion that already fired
    #[error("completion already fulfilled")]
    AlreadyFulfilled,

    /// Every responder was dropped without fulfilling the completion
    #[error("completion abandoned before it was fulfilled")]
    Abandoned,
}

/// Errors surfaced by a coordinated backend request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RadioError {
    /// The backend refused the request synchronously
    #[error("request refused: {0}")]
    Admission(#[from] AdmissionError),

    /// The backend completed the request with a failure
    #[error("request failed: {0}")]
    Backend(#[from] ErrorCode),

    /// The completion channel failed
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
}

impl RadioError {
    /// Backend error code, if the request reached the backend and failed there
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            RadioError::Backend(code) => Some(*code),
            _ => None,
        }
    }

    /// Admission error, if the backend refused the request up front
    pub fn admission(&self) -> Option<AdmissionError> {
        match self {
            RadioError::Admission(status) => Some(*status),
            _ => None,
        }
    }
}
