//! Single-shot completions
//!
//! Every asynchronous backend method receives a [`Responder`] and must fire
//! it exactly once. The caller side either supplies its own callback via
//! [`Responder::new`] or builds a [`promise`] and blocks on the returned
//! [`Pending`].
//!
//! A responder can be cloned so that backends which split work across tasks
//! can hand copies around, but only the first `respond` delivers a value.
//! Later calls are reported as [`CompletionError::AlreadyFulfilled`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::error;

use crate::error::{CompletionError, ErrorCode};

type Callback<T> = Box<dyn FnOnce(T) + Send>;

/// Fulfilling side of a single-shot completion
pub struct Responder<T> {
    slot: Arc<Mutex<Option<Callback<T>>>>,
}

/// A responder for operations that complete with a backend error code
pub type Reply<T> = Responder<Result<T, ErrorCode>>;

impl<T: 'static> Responder<T> {
    /// Create a responder that runs `callback` on fulfillment
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    /// A responder that discards its value
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    /// Deliver the value
    ///
    /// The callback runs on the calling thread, outside the internal lock.
    pub fn respond(&self, value: T) -> Result<(), CompletionError> {
        let callback = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match callback {
            Some(callback) => {
                callback(value);
                Ok(())
            }
            None => {
                error!("Completion fulfilled more than once");
                Err(CompletionError::AlreadyFulfilled)
            }
        }
    }

    /// Whether a value has already been delivered
    pub fn is_fulfilled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Adapt this responder to accept a different value type
    pub fn map<U, F>(self, f: F) -> Responder<U>
    where
        U: 'static,
        F: FnOnce(U) -> T + Send + 'static,
        T: Send,
    {
        Responder::new(move |value| {
            let _ = self.respond(f(value));
        })
    }
}

impl<T> Clone for Responder<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for Responder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fulfilled = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none();
        f.debug_struct("Responder")
            .field("fulfilled", &fulfilled)
            .finish()
    }
}

/// Waiting side of a [`promise`]
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Pending<T> {
    /// Block the current thread until the value arrives
    ///
    /// Must not be called from inside an async runtime. There is no timeout;
    /// a backend that never responds and never drops its responder blocks
    /// the caller indefinitely.
    pub fn wait(self) -> Result<T, CompletionError> {
        self.rx
            .blocking_recv()
            .map_err(|_| CompletionError::Abandoned)
    }

    /// Take the value if it has already arrived
    pub fn try_take(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected responder and pending value
pub fn promise<T: Send + 'static>() -> (Responder<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    let responder = Responder::new(move |value| {
        // The waiter may have given up already
        let _ = tx.send(value);
    });
    (responder, Pending { rx })
}
