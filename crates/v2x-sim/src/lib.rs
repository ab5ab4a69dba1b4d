//! Simulated C-V2X radio backend
//!
//! This crate implements the `v2x-core` backend traits without modem
//! hardware, so the coordination layers can be exercised end to end. It
//! includes:
//!
//! - **FlowRegistry**: Tx flow id allocation from the SPS and event pools
//! - **RxSubscriptionRegistry**: Rx subscription conflict policy
//! - **TxReportRegistry**: per-port Tx status report enablement
//! - **RadioServer**: the simulated radio state and listener fan-out
//! - **SimBackend**: runtime, event task and the `RadioFactory` entry point
//!
//! Events are injected as text lines, e.g. `cv2x_status suspended active 3`.
//!
//! # Example
//!
//! ```rust
//! use v2x_core::{promise, ServiceStatus, TrafficCategory};
//! use v2x_sim::{SimBackend, SimConfig};
//!
//! let sim = SimBackend::new(SimConfig::default()).unwrap();
//!
//! let (status, pending) = promise();
//! let manager = sim.factory().radio_manager(status).unwrap();
//! assert_eq!(pending.wait().unwrap(), ServiceStatus::Available);
//!
//! let (init, pending) = promise();
//! let radio = manager.get_radio(TrafficCategory::Safety, init).unwrap();
//! assert_eq!(pending.wait().unwrap(), ServiceStatus::Available);
//! assert!(radio.is_ready());
//!
//! sim.inject("cv2x_status active suspended 0").unwrap();
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod flow_registry;
pub mod rx_registry;
pub mod server;
pub mod task;
pub mod tx_report;

pub use backend::{SimBackend, SimFactory, SimRadio, SimRadioManager, MIN_FLOW_PORT};
pub use config::{ApiReply, SimConfig};
pub use error::SimError;
pub use event::SimEvent;
pub use flow_registry::{FlowRegistry, FlowRequest};
pub use rx_registry::RxSubscriptionRegistry;
pub use server::RadioServer;
pub use tx_report::TxReportRegistry;
