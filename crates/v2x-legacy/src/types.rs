//! Legacy API types and callback capabilities

use std::net::SocketAddrV6;

use v2x_core::{
    ChanMeasurements, ConcurrencyMode, Cv2xCause, Cv2xStatusType, ErrorCode, Priority,
    RxSubscription, ServiceStatus, SlssRxInfo, SockFd, TrafficIpType, TxFlow, TxPoolIdInfo,
    TxStatusReport, V2xEvent,
};

use crate::error::V2xError;

/// Interface handle handed out by `init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RadioHandle(pub u32);

impl RadioHandle {
    pub const BAD: RadioHandle = RadioHandle(0);
    pub const IP: RadioHandle = RadioHandle(1);
    pub const NON_IP: RadioHandle = RadioHandle(2);

    pub fn for_ip_type(ip_type: TrafficIpType) -> Self {
        match ip_type {
            TrafficIpType::Ip => RadioHandle::IP,
            TrafficIpType::NonIp => RadioHandle::NON_IP,
        }
    }

    /// Traffic type behind the handle, `None` for anything but IP/NON_IP
    pub fn ip_type(&self) -> Option<TrafficIpType> {
        match *self {
            RadioHandle::IP => Some(TrafficIpType::Ip),
            RadioHandle::NON_IP => Some(TrafficIpType::NonIp),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.ip_type().is_some()
    }
}

/// Auto retransmission choice for a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetransmitPolicy {
    Disabled,
    Enabled,
    /// Leave the radio default in place
    #[default]
    DontCare,
}

impl RetransmitPolicy {
    pub fn as_override(&self) -> Option<bool> {
        match self {
            RetransmitPolicy::Disabled => Some(false),
            RetransmitPolicy::Enabled => Some(true),
            RetransmitPolicy::DontCare => None,
        }
    }
}

/// Bandwidth reservation of an SPS flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxBandwidthReservation {
    /// Service id the flow is registered for
    pub v2x_id: u32,
    pub priority: Priority,
    /// Requested interval, snapped down to a periodicity bucket
    pub period_interval_ms: u32,
    /// Bytes reserved per period, 0 releases the flow on change
    pub tx_reservation_size_bytes: u32,
}

/// Optional per-flow overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxFlowInfo {
    pub retransmit_policy: RetransmitPolicy,
    pub default_tx_power: Option<i32>,
    pub mcs_index: Option<u8>,
    pub tx_pool_id: Option<u8>,
    pub is_unicast: Option<bool>,
}

/// SPS reservation plus flow overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxSpsFlowInfo {
    pub reservation: TxBandwidthReservation,
    pub flow_info: TxFlowInfo,
}

/// A bound socket and its address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SockInfo {
    pub sock: SockFd,
    pub addr: SocketAddrV6,
}

impl From<&TxFlow> for SockInfo {
    fn from(flow: &TxFlow) -> Self {
        Self {
            sock: flow.sock,
            addr: flow.addr,
        }
    }
}

impl From<&RxSubscription> for SockInfo {
    fn from(sub: &RxSubscription) -> Self {
        Self {
            sock: sub.sock,
            addr: sub.addr,
        }
    }
}

/// Sockets produced by the combined create and bind call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SockSet {
    pub tx_sps: Option<SockInfo>,
    pub tx_event: Option<SockInfo>,
    pub rx: Option<SockInfo>,
}

/// Interface capabilities in the legacy layout
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IfaceCapabilities {
    pub link_ip_mtu_bytes: u16,
    pub link_non_ip_mtu_bytes: u16,
    pub max_supported_concurrency: ConcurrencyMode,
    pub non_ip_tx_payload_offset_bytes: u16,
    pub non_ip_rx_payload_offset_bytes: u16,
    pub int_min_periodicity_multiplier_ms: u16,
    pub int_maximum_periodicity_ms: u16,
    pub supports_10ms_periodicity: bool,
    pub supports_20ms_periodicity: bool,
    pub supports_50ms_periodicity: bool,
    pub supports_100ms_periodicity: bool,
    pub max_quantity_of_auto_retrans: u8,
    pub size_of_layer2_mac_address: u8,
    pub v2x_number_of_priority_levels: u8,
    pub highest_priority_value: u16,
    pub lowest_priority_value: u16,
    pub max_qty_sps_flows: u16,
    pub max_qty_non_sps_flows: u16,
    pub max_tx_pwr: i32,
    pub min_tx_pwr: i32,
    pub tx_pool_ids_supported: Vec<TxPoolIdInfo>,
}

/// MAC/PHY parameters accepted by `set_macphy`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MacPhyParams {
    pub channel_center_khz: i32,
    pub channel_bandwidth_mhz: i32,
    pub tx_power_limit_decidbm: i32,
    pub qty_auto_retrans: i32,
    pub l2_source_addr: Vec<u8>,
}

/// Channel measurement request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChanMeasParams {
    pub channel_measurement_interval_us: u32,
    pub rs_threshold_decidbm: i32,
}

/// Library version report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersion {
    pub version_num: u32,
    pub build_details: String,
}

/// SPS timing handed to `SpsCalls::sps_offset_changed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpsMacDetails {
    pub periodicity_in_use_ns: u64,
    /// Next grant time
    pub utc_time_ns: u64,
}

/// Status and cause of one plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneStatus {
    pub status: Cv2xStatusType,
    pub cause: Cv2xCause,
}

/// Plane status of a single resource pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolPlaneStatus {
    pub pool_id: u8,
    pub status: PlaneStatus,
}

/// Extended radio status in the legacy layout
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RadioStatusEx {
    pub tx_status: PlaneStatus,
    pub rx_status: PlaneStatus,
    /// Tx pools whose Tx status is known
    pub tx_pools: Vec<PoolPlaneStatus>,
    /// Rx pools whose Rx status is known
    pub rx_pools: Vec<PoolPlaneStatus>,
}

/// Session level callbacks installed by `init`
///
/// Every method defaults to doing nothing. Calls arrive on backend threads
/// and must not block.
pub trait RadioCalls: Send + Sync {
    /// Radio initialisation finished
    fn init_complete(&self, _status: Result<(), V2xError>) {}

    /// The collapsed radio event changed, or the first status arrived
    fn radio_status(&self, _event: V2xEvent) {}

    /// Measurements from a status update, while measurements are enabled
    fn chan_measurements(&self, _meas: &ChanMeasurements) {}

    fn l2_addr_changed(&self, _new_l2_address: u32) {}

    fn macphy_change_complete(&self) {}

    fn capabilities_changed(&self, _caps: &IfaceCapabilities) {}

    fn service_status(&self, _status: ServiceStatus) {}
}

/// Per SPS flow callbacks
pub trait SpsCalls: Send + Sync {
    /// New SPS timing for the flow
    fn sps_offset_changed(&self, _details: &SpsMacDetails) {}

    /// Result of a reservation change
    fn reservation_change_complete(&self, _result: Result<(), ErrorCode>) {}
}

/// SPS callbacks that ignore everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpsCalls;

impl SpsCalls for NoSpsCalls {}

/// Extended radio status listener
pub trait ExtStatusListener: Send + Sync {
    fn on_ext_status(&self, status: &RadioStatusEx);
}

/// SLSS receive information listener
pub trait SlssRxListener: Send + Sync {
    fn on_slss_rx_info(&self, info: &SlssRxInfo);
}

/// Tx status report listener
pub trait TxReportListener: Send + Sync {
    fn on_tx_status_report(&self, report: &TxStatusReport);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles() {
        assert_eq!(RadioHandle::IP.ip_type(), Some(TrafficIpType::Ip));
        assert_eq!(RadioHandle::NON_IP.ip_type(), Some(TrafficIpType::NonIp));
        assert_eq!(RadioHandle::BAD.ip_type(), None);
        assert!(!RadioHandle(7).is_valid());
        assert_eq!(
            RadioHandle::for_ip_type(TrafficIpType::NonIp),
            RadioHandle::NON_IP
        );
    }

    #[test]
    fn test_retransmit_override() {
        assert_eq!(RetransmitPolicy::DontCare.as_override(), None);
        assert_eq!(RetransmitPolicy::Enabled.as_override(), Some(true));
        assert_eq!(RetransmitPolicy::Disabled.as_override(), Some(false));
    }
}
