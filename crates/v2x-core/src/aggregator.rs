//! Composite radio status tracking
//!
//! The aggregator caches the last valid Tx/Rx status, collapses it into a
//! [`V2xEvent`] and decides which callbacks a new update must trigger. It
//! never invokes callbacks itself: [`StatusAggregator::apply`] returns a
//! [`StatusTransition`] describing what to notify, and the caller fires the
//! callbacks after the internal lock has been released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::status::{Cv2xStatusEx, Cv2xStatusType, V2xEvent};

/// Channel measurements forwarded with every valid status update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChanMeasurements {
    /// Channel busy percentage, -1.0 when not reported
    pub channel_busy_percentage: f32,
    /// Time uncertainty in milliseconds, -1.0 when not reported
    pub time_uncertainty: f32,
}

impl ChanMeasurements {
    fn from_status(status: &Cv2xStatusEx) -> Self {
        Self {
            channel_busy_percentage: status.status.cbr_value.map_or(-1.0, f32::from),
            time_uncertainty: status.time_uncertainty.unwrap_or(-1.0),
        }
    }
}

/// Outcome of applying one valid status update
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    /// Event after the update
    pub event: V2xEvent,
    /// The full status that was applied
    pub status: Cv2xStatusEx,
    /// The collapsed event differs from the previous one
    pub changed: bool,
    /// A plane moved from ACTIVE/SUSPENDED to INACTIVE
    pub went_inactive: bool,
    /// The legacy event callback must fire
    pub notify_event: bool,
    /// The extended status callback must fire
    pub notify_ext: bool,
    /// Present while periodic measurements are enabled
    pub measurements: Option<ChanMeasurements>,
}

#[derive(Debug)]
struct AggregatorState {
    status: Cv2xStatusEx,
    event: V2xEvent,
    last_update: Option<Instant>,
    need_initial: bool,
    need_initial_ext: bool,
}

/// Tracks radio status and derives listener notifications
#[derive(Debug)]
pub struct StatusAggregator {
    state: Mutex<AggregatorState>,
    periodic_measurements: AtomicBool,
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregatorState {
                status: Cv2xStatusEx::default(),
                event: V2xEvent::Inactive,
                last_update: None,
                need_initial: true,
                need_initial_ext: false,
            }),
            periodic_measurements: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a status update from the backend
    ///
    /// Updates with UNKNOWN on either plane are dropped and return `None`.
    /// `has_event_listener` and `has_ext_listener` report whether the
    /// respective callbacks are installed; an initial-notification latch is
    /// only consumed when its callback exists.
    pub fn apply(
        &self,
        update: &Cv2xStatusEx,
        has_event_listener: bool,
        has_ext_listener: bool,
    ) -> Option<StatusTransition> {
        if update.status.has_unknown() {
            debug!(
                "Ignoring status with UNKNOWN plane (rx={}, tx={})",
                update.status.rx_status, update.status.tx_status
            );
            return None;
        }

        let measurements = ChanMeasurements::from_status(update);
        debug!(
            "Status update: CBP={:.1}, tx_status={}, rx_status={}, time_uncertainty={}",
            measurements.channel_busy_percentage,
            update.status.tx_status,
            update.status.rx_status,
            measurements.time_uncertainty
        );

        let mut state = self.lock();
        state.last_update = Some(Instant::now());

        let prev = state.status.status;
        let went_inactive = (prev.rx_status.is_operational()
            && update.status.rx_status == Cv2xStatusType::Inactive)
            || (prev.tx_status.is_operational()
                && update.status.tx_status == Cv2xStatusType::Inactive);
        if went_inactive {
            debug!("Status transitioned to inactive");
        }

        state.status = update.clone();

        let event = update.status.event();
        let changed = state.event != event;
        if changed {
            state.event = event;
            info!("Status changed to {}", event);
        }

        let notify_event = has_event_listener && (changed || state.need_initial);
        if notify_event {
            state.need_initial = false;
        }
        let notify_ext = has_ext_listener && (changed || state.need_initial_ext);
        if notify_ext {
            state.need_initial_ext = false;
        }

        Some(StatusTransition {
            event,
            status: update.clone(),
            changed,
            went_inactive,
            notify_event,
            notify_ext,
            measurements: self
                .periodic_measurements()
                .then_some(measurements),
        })
    }

    /// Current collapsed event
    pub fn event(&self) -> V2xEvent {
        self.lock().event
    }

    /// Last valid status applied
    pub fn status(&self) -> Cv2xStatusEx {
        self.lock().status.clone()
    }

    /// Current event and the time since the last valid update
    ///
    /// The age is `None` when no valid update has been received yet.
    pub fn poll(&self) -> (V2xEvent, Option<Duration>) {
        let state = self.lock();
        (state.event, state.last_update.map(|t| t.elapsed()))
    }

    pub fn set_periodic_measurements(&self, enabled: bool) {
        self.periodic_measurements.store(enabled, Ordering::SeqCst);
    }

    pub fn periodic_measurements(&self) -> bool {
        self.periodic_measurements.load(Ordering::SeqCst)
    }

    /// Request an initial notification for a newly installed extended listener
    pub fn arm_ext_initial(&self) {
        self.lock().need_initial_ext = true;
    }

    pub fn disarm_ext_initial(&self) {
        self.lock().need_initial_ext = false;
    }

    /// Re-arm the legacy initial notification, for a new session
    pub fn reset_initial(&self) {
        self.lock().need_initial = true;
    }
}
