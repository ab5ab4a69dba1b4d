//! Listener capabilities and registration sets
//!
//! Backends notify listeners from their own threads. Every method has an
//! empty default so an implementor only overrides what it cares about.
//! Implementations must not block.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::AdmissionError;
use crate::status::Cv2xStatusEx;
use crate::types::{RadioCapabilities, ServiceStatus, SlssRxInfo, SpsSchedulingInfo, TxStatusReport};

/// Manager level notifications
pub trait Cv2xListener: Send + Sync {
    fn on_status_changed(&self, _status: &Cv2xStatusEx) {}

    fn on_service_status_change(&self, _status: ServiceStatus) {}

    fn on_slss_rx_info_changed(&self, _info: &SlssRxInfo) {}
}

/// Radio level notifications
pub trait RadioListener: Send + Sync {
    fn on_l2_addr_changed(&self, _new_l2_address: u32) {}

    fn on_sps_scheduling_changed(&self, _info: &SpsSchedulingInfo) {}

    fn on_capabilities_changed(&self, _caps: &RadioCapabilities) {}

    fn on_mac_address_clone_attack(&self, _detected: bool) {}
}

/// Per-transmission reports for ports with reporting enabled
pub trait TxStatusReportListener: Send + Sync {
    fn on_tx_status_report(&self, report: &TxStatusReport);
}

/// A set of registered listeners compared by identity
pub struct ListenerSet<L: ?Sized> {
    listeners: Mutex<Vec<Arc<L>>>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

/// Whether two listener handles point at the same object
pub fn same<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    // Compare data pointers only, vtables may differ across codegen units
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<L>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, listener: Arc<L>) -> Result<(), AdmissionError> {
        let mut listeners = self.lock();
        if listeners.iter().any(|l| same(l, &listener)) {
            return Err(AdmissionError::Already);
        }
        listeners.push(listener);
        Ok(())
    }

    pub fn deregister(&self, listener: &Arc<L>) -> Result<(), AdmissionError> {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| !same(l, listener));
        if listeners.len() == before {
            return Err(AdmissionError::NoSuch);
        }
        Ok(())
    }

    /// Copy of the current registrations, for notifying outside the lock
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;
    impl Cv2xListener for Counter {}

    #[test]
    fn test_register_twice_is_rejected() {
        let set: ListenerSet<dyn Cv2xListener> = ListenerSet::new();
        let l: Arc<dyn Cv2xListener> = Arc::new(Counter);
        set.register(Arc::clone(&l)).unwrap();
        assert_eq!(set.register(Arc::clone(&l)), Err(AdmissionError::Already));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_same_compares_objects() {
        let a: Arc<dyn Cv2xListener> = Arc::new(Counter);
        let b: Arc<dyn Cv2xListener> = Arc::new(Counter);
        assert!(same(&a, &Arc::clone(&a)));
        assert!(!same(&a, &b));
    }

    #[test]
    fn test_deregister_missing() {
        let set: ListenerSet<dyn Cv2xListener> = ListenerSet::new();
        let a: Arc<dyn Cv2xListener> = Arc::new(Counter);
        let b: Arc<dyn Cv2xListener> = Arc::new(Counter);
        set.register(Arc::clone(&a)).unwrap();
        assert_eq!(set.deregister(&b), Err(AdmissionError::NoSuch));
        set.deregister(&a).unwrap();
        assert!(set.is_empty());
    }
}
