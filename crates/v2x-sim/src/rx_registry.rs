//! Conflict-checked Rx subscription bookkeeping

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};
use v2x_core::{ErrorCode, TrafficIpType};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    ip_type: TrafficIpType,
    port: u16,
    ids: Vec<u32>,
}

impl Entry {
    fn is_wildcard(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Active Rx subscriptions
///
/// A subscription without service ids (or with an empty list) is a
/// wildcard. For the same IP type a new subscription conflicts with an
/// existing one when, checked in this order and stopping at the first hit:
///
/// 1. either of the two is a wildcard
/// 2. both use the same port
/// 3. their service id lists share an id
#[derive(Debug, Default)]
pub struct RxSubscriptionRegistry {
    subs: Mutex<Vec<Entry>>,
}

impl RxSubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.subs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(
        &self,
        ip_type: TrafficIpType,
        port: u16,
        ids: Option<&[u32]>,
    ) -> Result<(), ErrorCode> {
        let new = Entry {
            ip_type,
            port,
            ids: ids.map(<[u32]>::to_vec).unwrap_or_default(),
        };

        let mut subs = self.lock();
        for existing in subs.iter().filter(|s| s.ip_type == ip_type) {
            if new.is_wildcard() || existing.is_wildcard() {
                error!("Wildcard Rx subscription policy conflict on port {}", port);
                return Err(ErrorCode::SrvIdL2AddrsNotCompatible);
            }
            if existing.port == port {
                error!("Rx subscription port conflict {}", port);
                return Err(ErrorCode::SrvIdL2AddrsNotCompatible);
            }
            if let Some(id) = new.ids.iter().find(|id| existing.ids.contains(id)) {
                error!("Rx subscription id conflict {}", id);
                return Err(ErrorCode::SrvIdL2AddrsNotCompatible);
            }
        }

        debug!("Rx subscription iptype {:?}, port {} added", ip_type, port);
        subs.push(new);
        Ok(())
    }

    pub fn remove(&self, ip_type: TrafficIpType, port: u16) -> Result<(), ErrorCode> {
        let mut subs = self.lock();
        match subs
            .iter()
            .position(|s| s.ip_type == ip_type && s.port == port)
        {
            Some(index) => {
                subs.remove(index);
                Ok(())
            }
            None => {
                error!("No Rx subscription on port {}", port);
                Err(ErrorCode::NoSuchElement)
            }
        }
    }

    pub fn contains(&self, ip_type: TrafficIpType, port: u16) -> bool {
        self.lock()
            .iter()
            .any(|s| s.ip_type == ip_type && s.port == port)
    }

    /// Number of wildcard subscriptions for an IP type
    pub fn wildcard_count(&self, ip_type: TrafficIpType) -> usize {
        self.lock()
            .iter()
            .filter(|s| s.ip_type == ip_type && s.is_wildcard())
            .count()
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
