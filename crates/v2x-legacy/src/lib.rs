//! Handle and socket based legacy V2X radio API
//!
//! Older applications address the radio through an interface handle and
//! plain sockets instead of flow objects. This crate provides that API on
//! top of the [`v2x_core`] backend traits, so the same applications run
//! against any backend, the simulator included.
//!
//! # Architecture
//!
//! A [`LegacyRadio`] is one session. It acquires the radio manager lazily,
//! initialises the radio in [`LegacyRadio::init_v3`] and from then on:
//!
//! - **Flows**: Tx flows and Rx subscriptions are looked up by socket in
//!   side tables, and SPS flows keep their [`SpsCalls`]
//! - **Status**: backend status updates pass through a
//!   [`v2x_core::StatusAggregator`] and reach the installed [`RadioCalls`]
//!   only when the collapsed event changes
//! - **Control**: filters, trusted lists and injections are blocking calls
//!   that map backend failures to [`V2xError`] or [`Errno`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use v2x_core::{ConcurrencyMode, RadioFactory};
//! use v2x_legacy::{LegacyRadio, RadioCalls};
//!
//! struct Calls;
//! impl RadioCalls for Calls {}
//!
//! fn open(factory: Arc<dyn RadioFactory>) {
//!     let radio = LegacyRadio::new(factory);
//!     let (ip, non_ip) = radio
//!         .init_v3(ConcurrencyMode::WwanConcurrent, Some(Arc::new(Calls)))
//!         .expect("radio init");
//!     println!("handles {:?} {:?}, status {:?}", ip, non_ip, radio.get_status());
//! }
//! ```

mod context;
mod control;
mod convert;
mod error;
mod flows;
mod tables;
mod types;

pub use context::{
    handle_for_iface, LegacyRadio, API_VERSION_NUMBER, DEST_ADDR, IFNAMSIZ, IP_IFACE,
    NON_IP_IFACE, RX_WILDCARD_PORT,
};
pub use control::{MAX_FILTER_IDS_LIST_LEN, MAX_MALICIOUS_IDS_LIST_LEN, MAX_TRUSTED_IDS_LIST_LEN};
pub use convert::{
    convert_capabilities, convert_event_flow_info, convert_ext_radio_status,
    convert_priority_to_traffic_class, convert_reservation, convert_slss_rx_info,
    convert_sps_flow_info, convert_sps_scheduling_info, convert_traffic_class_to_priority,
    snap_periodicity, MAX_POOL_IDS_LIST_LEN, MAX_RX_POOL_NUM, MAX_SLSS_SYNC_REF_UE_NUM,
    MAX_TX_POOL_NUM, TRAFFIC_CLASS_OFFSET,
};
pub use error::{status_code, Errno, V2xError};
pub use flows::MAX_SUBSCRIBE_SIDS_LIST_LEN;
pub use types::{
    ApiVersion, ChanMeasParams, ExtStatusListener, IfaceCapabilities, MacPhyParams, NoSpsCalls,
    PlaneStatus, PoolPlaneStatus, RadioCalls, RadioHandle, RadioStatusEx, RetransmitPolicy,
    SlssRxListener, SockInfo, SockSet, SpsCalls, SpsMacDetails, TxBandwidthReservation,
    TxFlowInfo, TxReportListener, TxSpsFlowInfo,
};
