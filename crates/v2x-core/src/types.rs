//! Domain types exchanged with the radio backend

use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

/// Selects the IP-bearing or non-IP-bearing radio interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficIpType {
    Ip,
    NonIp,
}

impl TrafficIpType {
    pub const ALL: [TrafficIpType; 2] = [TrafficIpType::Ip, TrafficIpType::NonIp];
}

/// Traffic category a radio instance is acquired for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficCategory {
    #[default]
    Safety,
    NonSafety,
}

/// Availability of a backend service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Available,
    #[default]
    Unavailable,
    Failed,
}

impl ServiceStatus {
    pub fn is_available(&self) -> bool {
        *self == ServiceStatus::Available
    }
}

/// SPS reservation periodicity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    Ms10,
    Ms20,
    Ms50,
    Ms100,
}

impl Periodicity {
    pub fn as_millis(&self) -> u64 {
        match self {
            Periodicity::Ms10 => 10,
            Periodicity::Ms20 => 20,
            Periodicity::Ms50 => 50,
            Periodicity::Ms100 => 100,
        }
    }
}

/// Transmit priority level, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    MostUrgent,
    Priority1,
    #[default]
    Priority2,
    Priority3,
    Priority4,
    Priority5,
    Priority6,
    Background,
}

impl Priority {
    /// Number of distinct priority levels
    pub const LEVELS: u8 = 8;

    /// Priority for a level index, `None` past `Background`
    pub fn from_index(index: u8) -> Option<Self> {
        let p = match index {
            0 => Priority::MostUrgent,
            1 => Priority::Priority1,
            2 => Priority::Priority2,
            3 => Priority::Priority3,
            4 => Priority::Priority4,
            5 => Priority::Priority5,
            6 => Priority::Priority6,
            7 => Priority::Background,
            _ => return None,
        };
        Some(p)
    }

    pub fn index(&self) -> u8 {
        *self as u8
    }
}

/// WWAN / C-V2X concurrency mode, ordered by capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    #[default]
    WwanNonConcurrent,
    WwanConcurrent,
}

/// A Tx resource pool and its frequency span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TxPoolIdInfo {
    pub pool_id: u8,
    pub min_freq: u16,
    pub max_freq: u16,
}

/// Radio capabilities as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioCapabilities {
    pub link_ip_mtu_bytes: u16,
    pub link_non_ip_mtu_bytes: u16,
    pub max_supported_concurrency: ConcurrencyMode,
    pub non_ip_tx_payload_offset_bytes: u16,
    pub non_ip_rx_payload_offset_bytes: u16,
    /// Supported periodicity buckets
    pub periodicities_supported: Vec<Periodicity>,
    /// Exact supported periodicities in milliseconds
    pub periodicities: Vec<u64>,
    pub max_num_auto_retransmissions: u8,
    pub layer2_mac_address_size: u8,
    /// Bit `n` set when priority level `n` is supported
    pub priorities_supported: u8,
    pub max_num_sps_flows: u16,
    pub max_num_non_sps_flows: u16,
    pub max_tx_power: i32,
    pub min_tx_power: i32,
    pub tx_pool_ids_supported: Vec<TxPoolIdInfo>,
    pub is_unicast_supported: bool,
}

impl RadioCapabilities {
    pub fn supports_periodicity(&self, periodicity: Periodicity) -> bool {
        self.periodicities_supported.contains(&periodicity)
    }

    /// Whether an exact periodicity in milliseconds is supported
    pub fn supports_periodicity_ms(&self, ms: u64) -> bool {
        self.periodicities.contains(&ms)
    }

    /// Human readable list of supported periodicities
    pub fn periodicities_to_string(&self) -> String {
        let list = self
            .periodicities
            .iter()
            .map(|p| format!("{}ms", p))
            .collect::<Vec<_>>()
            .join(" ");
        format!("V2X supported periodicity: {} only", list)
    }
}

/// Sync pattern offset of an SLSS reference UE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlssSyncPattern {
    #[default]
    OffsetInd1,
    OffsetInd2,
    OffsetInd3,
}

impl SlssSyncPattern {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(SlssSyncPattern::OffsetInd1),
            1 => Some(SlssSyncPattern::OffsetInd2),
            2 => Some(SlssSyncPattern::OffsetInd3),
            _ => None,
        }
    }
}

/// One sidelink synchronization reference UE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRefUeInfo {
    pub slss_id: u32,
    pub in_coverage: bool,
    pub pattern: SlssSyncPattern,
    pub rsrp: u32,
    pub selected: bool,
}

impl Default for SyncRefUeInfo {
    fn default() -> Self {
        Self {
            slss_id: 1,
            in_coverage: true,
            pattern: SlssSyncPattern::OffsetInd1,
            rsrp: 1,
            selected: true,
        }
    }
}

/// Sidelink synchronization receive information
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlssRxInfo {
    pub ue_info: Vec<SyncRefUeInfo>,
}

/// SPS scheduling update for one SPS flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpsSchedulingInfo {
    pub sps_id: u32,
    /// Next grant time, UTC milliseconds
    pub utc_time: u64,
    pub periodicity: u32,
}

/// Source L2 address filter entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct L2FilterInfo {
    pub src_l2_id: u32,
    pub duration_ms: u32,
    /// ProSe per-packet priority
    pub pppp: u8,
}

/// Trust metadata for a peer UE
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrustedUeInfo {
    pub source_l2_id: u32,
    pub time_uncertainty: f32,
    pub position_confidence_level: u32,
    pub propagation_delay: u32,
}

/// Malicious and trusted peer lists pushed to the backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrustedUeInfoList {
    pub malicious_ids_valid: bool,
    pub malicious_ids: Vec<u32>,
    pub trusted_ues_valid: bool,
    pub trusted_ues: Vec<TrustedUeInfo>,
}

/// RF chain state for a transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RfStatus {
    #[default]
    Inactive,
    Operational,
    Fault,
}

/// Per-antenna Tx report detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RfTxInfo {
    pub status: RfStatus,
    /// Tx power in dBm
    pub power: i32,
}

/// Segment position of a transmitted packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentType {
    First,
    Last,
    Middle,
    #[default]
    Only,
}

/// New transmission or retransmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxType {
    #[default]
    NewTx,
    ReTx,
}

/// Report of one over-the-air transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxStatusReport {
    pub rf_info: [RfTxInfo; 2],
    pub num_rb: u8,
    pub start_rb: u8,
    pub mcs: u8,
    pub seg_num: u8,
    pub seg_type: SegmentType,
    pub tx_type: TxType,
    /// Over-the-air timing, microseconds
    pub ota_timing: u64,
    pub port: u16,
}

/// Global IPv6 address assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6AddrInfo {
    pub prefix_len: u8,
    pub addr: Ipv6Addr,
}

/// Destination L2 address for global IP unicast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnicastRoutingInfo {
    pub dest_mac_addr: [u8; 6],
}
