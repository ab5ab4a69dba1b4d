//! C-V2X radio coordination core
//!
//! This crate holds everything shared between a radio backend and the
//! layers that drive it: the domain types, the error taxonomy, single-shot
//! completions and the blocking request coordinator built on them, the
//! status aggregator, and the backend and listener traits.
//!
//! # Architecture
//!
//! The backend is asynchronous. Each request is admitted or refused
//! synchronously and later completed exactly once through a [`Responder`].
//! Callers that need a blocking API go through [`coordinator::call`]:
//!
//! - **Admission**: a refusal returns immediately as [`RadioError::Admission`]
//! - **Completion**: the caller blocks on a [`Pending`] until the backend
//!   fires the responder, and a failure code surfaces as [`RadioError::Backend`]
//!
//! Status updates flow the other way. The backend calls
//! [`Cv2xListener::on_status_changed`], and the consumer feeds the update to
//! a [`StatusAggregator`], which collapses Tx/Rx state into a [`V2xEvent`]
//! and decides which callbacks fire.
//!
//! # Example
//!
//! ```rust
//! use v2x_core::{coordinator, Reply};
//!
//! let caps: Result<u32, _> = coordinator::call("demo", |reply: Reply<u32>| {
//!     let _ = reply.respond(Ok(5));
//!     Ok(())
//! });
//! assert_eq!(caps.unwrap(), 5);
//! ```

pub mod aggregator;
pub mod backend;
pub mod completion;
pub mod coordinator;
pub mod error;
pub mod flow;
pub mod listener;
pub mod status;
pub mod types;

pub use aggregator::{ChanMeasurements, StatusAggregator, StatusTransition};
pub use backend::{Radio, RadioFactory, RadioManager};
pub use completion::{promise, Pending, Reply, Responder};
pub use error::{AdmissionError, CompletionError, ErrorCode, RadioError};
pub use flow::{EventFlowInfo, FlowKind, RxSubscription, SockFd, SpsFlowInfo, SpsFlowPair, TxFlow};
pub use listener::{Cv2xListener, ListenerSet, RadioListener, TxStatusReportListener};
pub use status::{collapse, Cv2xCause, Cv2xStatus, Cv2xStatusEx, Cv2xStatusType, PoolStatus, V2xEvent};
pub use types::{
    ConcurrencyMode, Ipv6AddrInfo, L2FilterInfo, Periodicity, Priority, RadioCapabilities,
    RfStatus, RfTxInfo, SegmentType, ServiceStatus, SlssRxInfo, SlssSyncPattern,
    SpsSchedulingInfo, SyncRefUeInfo, TrafficCategory, TrafficIpType, TrustedUeInfo,
    TrustedUeInfoList, TxPoolIdInfo, TxStatusReport, TxType, UnicastRoutingInfo,
};
