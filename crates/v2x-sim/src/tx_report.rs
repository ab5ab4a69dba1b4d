//! Per-port Tx status report enablement

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use v2x_core::{AdmissionError, TxStatusReport, TxStatusReportListener};

/// Ports with Tx status reporting enabled and their listeners
#[derive(Default)]
pub struct TxReportRegistry {
    ports: Mutex<HashMap<u16, Arc<dyn TxStatusReportListener>>>,
}

impl std::fmt::Debug for TxReportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ports: Vec<u16> = self.lock().keys().copied().collect();
        ports.sort_unstable();
        f.debug_struct("TxReportRegistry").field("ports", &ports).finish()
    }
}

impl TxReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u16, Arc<dyn TxStatusReportListener>>> {
        self.ports.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enable reports for `port`
    ///
    /// Fails with `Already` when the port is already enabled.
    pub fn enable(
        &self,
        port: u16,
        listener: Arc<dyn TxStatusReportListener>,
    ) -> Result<(), AdmissionError> {
        let mut ports = self.lock();
        if ports.contains_key(&port) {
            debug!("Tx status report already enabled on port {}", port);
            return Err(AdmissionError::Already);
        }
        ports.insert(port, listener);
        Ok(())
    }

    /// Disable reports for `port`
    ///
    /// Fails with `NoSuch` when the port was not enabled.
    pub fn disable(&self, port: u16) -> Result<(), AdmissionError> {
        match self.lock().remove(&port) {
            Some(_) => Ok(()),
            None => {
                debug!("Tx status report not enabled on port {}", port);
                Err(AdmissionError::NoSuch)
            }
        }
    }

    pub fn is_enabled(&self, port: u16) -> bool {
        self.lock().contains_key(&port)
    }

    /// Deliver a report to the listener of its port
    ///
    /// Returns false when reporting is not enabled for the port.
    pub fn report(&self, report: &TxStatusReport) -> bool {
        let listener = self.lock().get(&report.port).cloned();
        match listener {
            Some(listener) => {
                listener.on_tx_status_report(report);
                true
            }
            None => false,
        }
    }
}
