//! Tx flows and Rx subscriptions as handed out by the backend

use std::net::SocketAddrV6;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::types::{Periodicity, Priority, TrafficIpType};

/// Virtual socket descriptor bound to a flow or subscription
pub type SockFd = i32;

/// Kind of transmit flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Semi-persistent scheduled, bandwidth reserved
    Sps,
    /// Event driven, no reservation
    Event,
}

/// Parameters of an SPS reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpsFlowInfo {
    pub priority: Priority,
    pub periodicity: Periodicity,
    /// Exact periodicity in milliseconds
    pub periodicity_ms: u64,
    pub nbytes_reserved: u32,
    pub auto_retrans_enabled: Option<bool>,
    pub peak_tx_power: Option<i32>,
    pub mcs_index: Option<u8>,
    pub tx_pool_id: Option<u8>,
}

impl Default for SpsFlowInfo {
    fn default() -> Self {
        Self {
            priority: Priority::Priority2,
            periodicity: Periodicity::Ms100,
            periodicity_ms: 100,
            nbytes_reserved: 0,
            auto_retrans_enabled: None,
            peak_tx_power: None,
            mcs_index: None,
            tx_pool_id: None,
        }
    }
}

/// Per-flow overrides for an event flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFlowInfo {
    pub auto_retrans_enabled: Option<bool>,
    pub peak_tx_power: Option<i32>,
    pub mcs_index: Option<u8>,
    pub tx_pool_id: Option<u8>,
    pub is_unicast: bool,
}

/// An allocated transmit flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxFlow {
    pub flow_id: u32,
    pub kind: FlowKind,
    pub ip_type: TrafficIpType,
    pub service_id: u32,
    pub sock: SockFd,
    pub addr: SocketAddrV6,
}

impl TxFlow {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn is_sps(&self) -> bool {
        self.kind == FlowKind::Sps
    }
}

/// An active receive subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RxSubscription {
    pub ip_type: TrafficIpType,
    /// `None` subscribes to every service id
    pub ids: Option<Vec<u32>>,
    pub sock: SockFd,
    pub addr: SocketAddrV6,
}

impl RxSubscription {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn is_wildcard(&self) -> bool {
        self.ids.is_none()
    }
}

/// Result of a combined SPS + event flow creation
///
/// Delivered once both halves have completed. `event` is `None` when no
/// event port was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpsFlowPair {
    pub sps: Result<TxFlow, ErrorCode>,
    pub event: Option<Result<TxFlow, ErrorCode>>,
}
