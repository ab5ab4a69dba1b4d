//! Simulation configuration
//!
//! Every field has a default, so a config file only lists what it changes:
//!
//! ```json
//! {
//!   "default_delay_ms": 2,
//!   "replies": {
//!     "create_tx_sps_flow": { "error": "exceed_max" },
//!     "get_radio": { "delay_ms": 50 }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use v2x_core::{
    AdmissionError, ConcurrencyMode, Cv2xStatus, Cv2xStatusType, ErrorCode, Periodicity,
    Priority, RadioCapabilities, ServiceStatus, SlssRxInfo, SyncRefUeInfo, TrafficIpType,
    TxPoolIdInfo,
};

use crate::error::SimError;

/// Canned reply for one backend API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiReply {
    /// Refuse the request at admission
    pub refuse: Option<AdmissionError>,
    /// Complete the request with this error
    pub error: Option<ErrorCode>,
    /// Completion delay, falls back to `SimConfig::default_delay_ms`
    pub delay_ms: Option<u64>,
}

/// Simulated backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Status reported at startup and restored by `start_cv2x`
    pub default_status: Cv2xStatus,
    /// Service status reported when the manager is obtained
    pub service_status: ServiceStatus,
    /// Delay before the manager service status is reported
    #[serde(default = "default_service_delay_ms")]
    pub service_delay_ms: u64,
    /// Completion delay for APIs without an explicit one
    #[serde(default = "default_delay_ms")]
    pub default_delay_ms: u64,
    /// Per-API canned replies keyed by method name
    pub replies: BTreeMap<String, ApiReply>,
    #[serde(default = "default_ip_iface")]
    pub ip_iface: String,
    #[serde(default = "default_non_ip_iface")]
    pub non_ip_iface: String,
    #[serde(default = "default_capabilities")]
    pub capabilities: RadioCapabilities,
    #[serde(default = "default_sps_max_flows")]
    pub sps_max_flows: u32,
    #[serde(default = "default_event_flow_base")]
    pub event_flow_base: u32,
    #[serde(default = "default_event_max_flows")]
    pub event_max_flows: u32,
    #[serde(default = "default_slss_rx_info")]
    pub slss_rx_info: SlssRxInfo,
    /// Re-send the current status this often, 0 disables periodic reports
    pub status_interval_ms: u64,
}

fn default_service_delay_ms() -> u64 {
    10
}

fn default_delay_ms() -> u64 {
    5
}

fn default_ip_iface() -> String {
    "rmnet_data0".to_string()
}

fn default_non_ip_iface() -> String {
    "rmnet_data1".to_string()
}

fn default_sps_max_flows() -> u32 {
    2
}

fn default_event_flow_base() -> u32 {
    2
}

fn default_event_max_flows() -> u32 {
    254
}

fn default_slss_rx_info() -> SlssRxInfo {
    SlssRxInfo {
        ue_info: vec![SyncRefUeInfo::default()],
    }
}

/// Capabilities reported by the simulated radio
pub fn default_capabilities() -> RadioCapabilities {
    RadioCapabilities {
        link_ip_mtu_bytes: 1452,
        link_non_ip_mtu_bytes: 2000,
        max_supported_concurrency: ConcurrencyMode::WwanConcurrent,
        non_ip_tx_payload_offset_bytes: 0,
        non_ip_rx_payload_offset_bytes: 0,
        periodicities_supported: vec![Periodicity::Ms100],
        periodicities: vec![100],
        max_num_auto_retransmissions: 1,
        layer2_mac_address_size: 3,
        priorities_supported: (1 << Priority::MostUrgent.index())
            | (1 << Priority::Priority2.index()),
        max_num_sps_flows: 2,
        max_num_non_sps_flows: 254,
        max_tx_power: 33,
        min_tx_power: -30,
        tx_pool_ids_supported: vec![TxPoolIdInfo {
            pool_id: 0,
            min_freq: 54800,
            max_freq: 54980,
        }],
        is_unicast_supported: true,
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            default_status: Cv2xStatus::new(Cv2xStatusType::Active, Cv2xStatusType::Active),
            service_status: ServiceStatus::Available,
            service_delay_ms: default_service_delay_ms(),
            default_delay_ms: default_delay_ms(),
            replies: BTreeMap::new(),
            ip_iface: default_ip_iface(),
            non_ip_iface: default_non_ip_iface(),
            capabilities: default_capabilities(),
            sps_max_flows: default_sps_max_flows(),
            event_flow_base: default_event_flow_base(),
            event_max_flows: default_event_max_flows(),
            slss_rx_info: default_slss_rx_info(),
            status_interval_ms: 0,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Canned reply for an API, defaulting to plain success
    pub fn reply(&self, api: &str) -> ApiReply {
        self.replies.get(api).cloned().unwrap_or_default()
    }

    /// Completion delay for an API
    pub fn delay(&self, api: &str) -> Duration {
        let ms = self
            .replies
            .get(api)
            .and_then(|r| r.delay_ms)
            .unwrap_or(self.default_delay_ms);
        Duration::from_millis(ms)
    }

    /// Override the reply of one API
    pub fn with_reply(mut self, api: &str, reply: ApiReply) -> Self {
        self.replies.insert(api.to_string(), reply);
        self
    }

    pub fn iface_name(&self, ip_type: TrafficIpType) -> &str {
        match ip_type {
            TrafficIpType::Ip => &self.ip_iface,
            TrafficIpType::NonIp => &self.non_ip_iface,
        }
    }
}
