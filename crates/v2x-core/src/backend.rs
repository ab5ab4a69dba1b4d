//! Radio backend interface
//!
//! A backend is reached through a [`RadioFactory`], which hands out the
//! [`RadioManager`]; the manager in turn hands out one [`Radio`] per traffic
//! category.
//!
//! Every asynchronous method follows the same contract. It returns
//! `Err(AdmissionError)` when the request is refused up front, in which case
//! the responder is dropped unfired. When it returns `Ok(())`, the responder
//! is fired exactly once, later, from a backend thread.

use std::sync::Arc;

use crate::completion::{Reply, Responder};
use crate::error::AdmissionError;
use crate::flow::{EventFlowInfo, RxSubscription, SpsFlowInfo, SpsFlowPair, TxFlow};
use crate::listener::{Cv2xListener, RadioListener, TxStatusReportListener};
use crate::status::Cv2xStatusEx;
use crate::types::{
    Ipv6AddrInfo, L2FilterInfo, RadioCapabilities, ServiceStatus, SlssRxInfo, TrafficCategory,
    TrafficIpType, TrustedUeInfoList, UnicastRoutingInfo,
};

/// Entry point to a backend
pub trait RadioFactory: Send + Sync {
    /// Obtain the radio manager
    ///
    /// `status` fires once the manager's service status is known.
    fn radio_manager(&self, status: Responder<ServiceStatus>) -> Option<Arc<dyn RadioManager>>;
}

/// Manager level operations
pub trait RadioManager: Send + Sync {
    fn register_listener(&self, listener: Arc<dyn Cv2xListener>) -> Result<(), AdmissionError>;

    fn deregister_listener(&self, listener: &Arc<dyn Cv2xListener>) -> Result<(), AdmissionError>;

    /// Obtain the radio for a traffic category
    ///
    /// `init` fires once radio initialisation has finished.
    fn get_radio(
        &self,
        category: TrafficCategory,
        init: Responder<ServiceStatus>,
    ) -> Option<Arc<dyn Radio>>;

    fn request_cv2x_status(&self, reply: Reply<Cv2xStatusEx>) -> Result<(), AdmissionError>;

    fn start_cv2x(&self, reply: Reply<()>) -> Result<(), AdmissionError>;

    fn stop_cv2x(&self, reply: Reply<()>) -> Result<(), AdmissionError>;

    /// Cap the Tx power of every flow, in dBm
    fn set_peak_tx_power(&self, dbm: i8, reply: Reply<()>) -> Result<(), AdmissionError>;

    fn set_l2_filters(
        &self,
        filters: &[L2FilterInfo],
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    fn remove_l2_filters(&self, l2_ids: &[u32], reply: Reply<()>) -> Result<(), AdmissionError>;

    fn get_slss_rx_info(&self, reply: Reply<SlssRxInfo>) -> Result<(), AdmissionError>;

    /// Inject coarse UTC time, milliseconds since the epoch
    fn inject_coarse_utc_time(&self, utc_ms: u64, reply: Reply<()>) -> Result<(), AdmissionError>;
}

/// Radio level operations
pub trait Radio: Send + Sync {
    /// Whether initialisation completed successfully
    fn is_ready(&self) -> bool;

    /// Network interface carrying traffic of the given type
    fn iface_name(&self, ip_type: TrafficIpType) -> String;

    fn register_listener(&self, listener: Arc<dyn RadioListener>) -> Result<(), AdmissionError>;

    fn deregister_listener(&self, listener: &Arc<dyn RadioListener>)
        -> Result<(), AdmissionError>;

    /// Subscribe to received traffic on `port`
    ///
    /// `ids` restricts the subscription to those service ids; `None`
    /// receives every service id.
    fn create_rx_subscription(
        &self,
        ip_type: TrafficIpType,
        port: u16,
        ids: Option<Vec<u32>>,
        reply: Reply<RxSubscription>,
    ) -> Result<(), AdmissionError>;

    fn enable_rx_meta_data_report(
        &self,
        ip_type: TrafficIpType,
        enable: bool,
        ids: &[u32],
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    /// Create an SPS flow and optionally an event flow in one request
    ///
    /// `done` fires once, after both halves have completed.
    #[allow(clippy::too_many_arguments)]
    fn create_tx_sps_flow(
        &self,
        ip_type: TrafficIpType,
        service_id: u32,
        sps: SpsFlowInfo,
        sps_port: u16,
        event_port: Option<u16>,
        event: EventFlowInfo,
        done: Responder<SpsFlowPair>,
    ) -> Result<(), AdmissionError>;

    fn create_tx_event_flow(
        &self,
        ip_type: TrafficIpType,
        service_id: u32,
        info: EventFlowInfo,
        port: u16,
        reply: Reply<TxFlow>,
    ) -> Result<(), AdmissionError>;

    fn close_rx_subscription(
        &self,
        sub: &RxSubscription,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    fn close_tx_flow(&self, flow: &TxFlow, reply: Reply<()>) -> Result<(), AdmissionError>;

    fn change_sps_flow_info(
        &self,
        flow: &TxFlow,
        info: SpsFlowInfo,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    fn change_event_flow_info(
        &self,
        flow: &TxFlow,
        info: EventFlowInfo,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    fn request_capabilities(&self, reply: Reply<RadioCapabilities>) -> Result<(), AdmissionError>;

    /// Ask the radio to pick a new source L2 address
    fn update_src_l2_info(&self, reply: Reply<()>) -> Result<(), AdmissionError>;

    fn update_trusted_ue_list(
        &self,
        list: &TrustedUeInfoList,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    fn register_tx_status_report_listener(
        &self,
        port: u16,
        listener: Arc<dyn TxStatusReportListener>,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    fn deregister_tx_status_report_listener(
        &self,
        port: u16,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    fn set_global_ip_info(
        &self,
        info: Ipv6AddrInfo,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    fn set_global_ip_unicast_routing_info(
        &self,
        info: UnicastRoutingInfo,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError>;

    fn inject_vehicle_speed(&self, speed_kmph: u32, reply: Reply<()>)
        -> Result<(), AdmissionError>;
}
