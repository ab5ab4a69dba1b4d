//! Tx flow id allocation
//!
//! SPS flows draw ids from `[0, sps_max)` and event flows from
//! `[event_base, event_base + event_max)`. The lowest free id is always
//! handed out first.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{error, info};
use v2x_core::{ErrorCode, FlowKind, TrafficIpType};

/// Description of a flow being registered or deregistered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowRequest {
    pub ip_type: TrafficIpType,
    pub service_id: u32,
    /// Non-zero for SPS flows
    pub sps_port: u16,
    /// Non-zero for event flows
    pub event_port: u16,
    /// Allocated id, used on deregistration
    pub flow_id: u32,
}

impl FlowRequest {
    pub fn sps(ip_type: TrafficIpType, service_id: u32, port: u16) -> Self {
        Self {
            ip_type,
            service_id,
            sps_port: port,
            event_port: 0,
            flow_id: 0,
        }
    }

    pub fn event(ip_type: TrafficIpType, service_id: u32, port: u16) -> Self {
        Self {
            ip_type,
            service_id,
            sps_port: 0,
            event_port: port,
            flow_id: 0,
        }
    }

    pub fn with_id(mut self, flow_id: u32) -> Self {
        self.flow_id = flow_id;
        self
    }

    /// Flow kind selected by the ports, SPS taking precedence
    pub fn kind(&self) -> Option<FlowKind> {
        if self.sps_port > 0 {
            Some(FlowKind::Sps)
        } else if self.event_port > 0 {
            Some(FlowKind::Event)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct Pools {
    sps: BTreeMap<u32, FlowRequest>,
    event: BTreeMap<u32, FlowRequest>,
}

/// Bounded allocator of Tx flow ids
#[derive(Debug)]
pub struct FlowRegistry {
    pools: Mutex<Pools>,
    sps_max: u32,
    event_base: u32,
    event_max: u32,
}

fn save(
    flows: &mut BTreeMap<u32, FlowRequest>,
    request: &FlowRequest,
    base: u32,
    max: u32,
) -> Option<u32> {
    if flows.len() as u32 >= max {
        error!("Existing flows reached max {}", max);
        return None;
    }
    let id = (base..base + max).find(|id| !flows.contains_key(id))?;
    flows.insert(id, request.with_id(id));
    info!("New flow with id {}", id);
    Some(id)
}

impl FlowRegistry {
    pub fn new(sps_max: u32, event_base: u32, event_max: u32) -> Self {
        Self {
            pools: Mutex::new(Pools::default()),
            sps_max,
            event_base,
            event_max,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pools> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id for a new flow
    pub fn register(&self, request: &FlowRequest) -> Result<u32, ErrorCode> {
        let mut pools = self.lock();
        match request.kind() {
            Some(FlowKind::Sps) => {
                save(&mut pools.sps, request, 0, self.sps_max).ok_or(ErrorCode::ExceedMax)
            }
            Some(FlowKind::Event) => {
                save(&mut pools.event, request, self.event_base, self.event_max)
                    .ok_or(ErrorCode::ModemErr)
            }
            None => {
                error!("Flow registration without SPS or event port");
                Err(ErrorCode::InvalidArg)
            }
        }
    }

    /// Release the id held by a flow
    pub fn deregister(&self, request: &FlowRequest) -> Result<(), ErrorCode> {
        let mut pools = self.lock();
        let flows = match request.kind() {
            Some(FlowKind::Sps) => &mut pools.sps,
            Some(FlowKind::Event) => &mut pools.event,
            None => return Err(ErrorCode::InvalidArg),
        };
        match flows.remove(&request.flow_id) {
            Some(_) => Ok(()),
            None => {
                error!("Flow id {} not found", request.flow_id);
                Err(ErrorCode::NoSuchElement)
            }
        }
    }

    pub fn contains(&self, kind: FlowKind, flow_id: u32) -> bool {
        let pools = self.lock();
        match kind {
            FlowKind::Sps => pools.sps.contains_key(&flow_id),
            FlowKind::Event => pools.event.contains_key(&flow_id),
        }
    }

    pub fn sps_count(&self) -> usize {
        self.lock().sps.len()
    }

    pub fn event_count(&self) -> usize {
        self.lock().event.len()
    }

    /// Ids currently allocated, SPS first
    pub fn ids(&self) -> Vec<u32> {
        let pools = self.lock();
        pools.sps.keys().chain(pools.event.keys()).copied().collect()
    }

    /// Drop every flow
    pub fn clear(&self) {
        let mut pools = self.lock();
        pools.sps.clear();
        pools.event.clear();
    }
}
