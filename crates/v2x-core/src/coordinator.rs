//! Blocking request coordination over asynchronous backend calls
//!
//! The backend API is asynchronous: a method first admits or refuses the
//! request synchronously, then later fires the supplied responder exactly
//! once. [`request`] turns that into a blocking call. When admission fails it
//! returns at once without waiting; otherwise it blocks until the responder
//! fires. Nothing is retried.

use tracing::{debug, warn};

use crate::completion::{promise, Reply, Responder};
use crate::error::{AdmissionError, RadioError};

/// Issue a request and block for its single completion
///
/// `op` names the operation in log messages. `start` hands the responder to
/// the backend and returns its admission status.
pub fn request<T, F>(op: &str, start: F) -> Result<T, RadioError>
where
    T: Send + 'static,
    F: FnOnce(Responder<T>) -> Result<(), AdmissionError>,
{
    let (responder, pending) = promise();

    if let Err(status) = start(responder) {
        warn!("{} refused: {}", op, status);
        return Err(status.into());
    }

    debug!("{} admitted, waiting for completion", op);
    let value = pending.wait().inspect_err(|e| warn!("{}: {}", op, e))?;
    Ok(value)
}

/// Like [`request`], for operations whose completion carries an error code
pub fn call<T, F>(op: &str, start: F) -> Result<T, RadioError>
where
    T: Send + 'static,
    F: FnOnce(Reply<T>) -> Result<(), AdmissionError>,
{
    request(op, start)?.map_err(|code| {
        warn!("{} failed: {}", op, code);
        RadioError::Backend(code)
    })
}
