//! Server-side radio state
//!
//! [`RadioServer`] is the single owner of everything the simulated radio
//! remembers: the current status, allocated flows, Rx subscriptions, Tx
//! report ports, capabilities and SLSS information. It also fans injected
//! events out to the registered listeners.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use v2x_core::{
    Cv2xCause, Cv2xListener, Cv2xStatus, Cv2xStatusEx, Cv2xStatusType, ErrorCode, FlowKind,
    ListenerSet, PoolStatus, RadioCapabilities, RadioListener, RfStatus, RfTxInfo, SlssRxInfo,
    SockFd, TrafficIpType, TxFlow, TxStatusReport,
};

use crate::config::SimConfig;
use crate::event::SimEvent;
use crate::flow_registry::{FlowRegistry, FlowRequest};
use crate::rx_registry::RxSubscriptionRegistry;
use crate::tx_report::TxReportRegistry;

/// First descriptor handed out for virtual sockets
const FIRST_SOCK: SockFd = 100;

/// Largest source L2 id, 24 bits
const L2_ID_MASK: u32 = 0x00FF_FFFF;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated radio state shared by the manager, the radio and the event task
pub struct RadioServer {
    config: SimConfig,
    status: Mutex<Cv2xStatus>,
    capabilities: Mutex<RadioCapabilities>,
    slss: Mutex<SlssRxInfo>,
    flows: FlowRegistry,
    rx_subs: RxSubscriptionRegistry,
    tx_reports: TxReportRegistry,
    manager_listeners: ListenerSet<dyn Cv2xListener>,
    radio_listeners: ListenerSet<dyn RadioListener>,
    next_sock: AtomicI32,
}

impl std::fmt::Debug for RadioServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioServer")
            .field("status", &self.status())
            .field("flows", &self.flows)
            .field("rx_subs", &self.rx_subs)
            .finish_non_exhaustive()
    }
}

impl RadioServer {
    pub fn new(config: SimConfig) -> Self {
        Self {
            status: Mutex::new(config.default_status),
            capabilities: Mutex::new(config.capabilities.clone()),
            slss: Mutex::new(config.slss_rx_info.clone()),
            flows: FlowRegistry::new(
                config.sps_max_flows,
                config.event_flow_base,
                config.event_max_flows,
            ),
            rx_subs: RxSubscriptionRegistry::new(),
            tx_reports: TxReportRegistry::new(),
            manager_listeners: ListenerSet::new(),
            radio_listeners: ListenerSet::new(),
            next_sock: AtomicI32::new(FIRST_SOCK),
            config,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    pub fn rx_subscriptions(&self) -> &RxSubscriptionRegistry {
        &self.rx_subs
    }

    pub fn tx_reports(&self) -> &TxReportRegistry {
        &self.tx_reports
    }

    pub fn manager_listeners(&self) -> &ListenerSet<dyn Cv2xListener> {
        &self.manager_listeners
    }

    pub fn radio_listeners(&self) -> &ListenerSet<dyn RadioListener> {
        &self.radio_listeners
    }

    pub fn status(&self) -> Cv2xStatus {
        *lock(&self.status)
    }

    /// Status with one pool entry per supported Tx pool
    pub fn status_ex(&self) -> Cv2xStatusEx {
        let status = self.status();
        let pool_status = lock(&self.capabilities)
            .tx_pool_ids_supported
            .iter()
            .map(|pool| PoolStatus {
                pool_id: pool.pool_id,
                status,
            })
            .collect();
        Cv2xStatusEx {
            status,
            pool_status,
            time_uncertainty: None,
        }
    }

    pub fn capabilities(&self) -> RadioCapabilities {
        lock(&self.capabilities).clone()
    }

    pub fn slss_rx_info(&self) -> SlssRxInfo {
        lock(&self.slss).clone()
    }

    /// Allocate a virtual socket descriptor
    pub fn next_sock(&self) -> SockFd {
        self.next_sock.fetch_add(1, Ordering::SeqCst)
    }

    /// Link-local address of the interface carrying `ip_type` traffic
    pub fn bind_addr(&self, ip_type: TrafficIpType, port: u16) -> SocketAddrV6 {
        let host = match ip_type {
            TrafficIpType::Ip => 1,
            TrafficIpType::NonIp => 2,
        };
        SocketAddrV6::new(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, host), port, 0, 0)
    }

    /// Register a Tx flow and describe it
    pub fn open_flow(&self, request: &FlowRequest) -> Result<TxFlow, ErrorCode> {
        let flow_id = self.flows.register(request)?;
        let (kind, port) = match request.kind() {
            Some(FlowKind::Sps) => (FlowKind::Sps, request.sps_port),
            _ => (FlowKind::Event, request.event_port),
        };
        Ok(TxFlow {
            flow_id,
            kind,
            ip_type: request.ip_type,
            service_id: request.service_id,
            sock: self.next_sock(),
            addr: self.bind_addr(request.ip_type, port),
        })
    }

    /// Release a Tx flow
    pub fn close_flow(&self, flow: &TxFlow) -> Result<(), ErrorCode> {
        let request = match flow.kind {
            FlowKind::Sps => FlowRequest::sps(flow.ip_type, flow.service_id, flow.port()),
            FlowKind::Event => FlowRequest::event(flow.ip_type, flow.service_id, flow.port()),
        };
        self.flows.deregister(&request.with_id(flow.flow_id))
    }

    /// Drop state owned by planes that left ACTIVE/SUSPENDED
    pub fn on_status_changed(&self, status: &Cv2xStatus) {
        debug!(
            "Server status change rx={} tx={}",
            status.rx_status, status.tx_status
        );
        if !status.rx_status.is_operational() {
            self.rx_subs.clear();
        }
        if !status.tx_status.is_operational() {
            self.flows.clear();
        }
    }

    /// Restore the configured default status
    pub fn start_cv2x(&self) {
        self.apply(&SimEvent::Cv2xStatus(self.config.default_status));
    }

    /// Put both planes into INACTIVE with cause UE mode
    pub fn stop_cv2x(&self) {
        let status = Cv2xStatus {
            rx_cause: Cv2xCause::UeMode,
            tx_cause: Cv2xCause::UeMode,
            ..Cv2xStatus::new(Cv2xStatusType::Inactive, Cv2xStatusType::Inactive)
        };
        self.apply(&SimEvent::Cv2xStatus(status));
    }

    /// Re-deliver the current status to manager listeners
    pub fn report_status(&self) {
        let status = self.status_ex();
        for listener in self.manager_listeners.snapshot() {
            listener.on_status_changed(&status);
        }
    }

    /// Apply an injected event and notify listeners
    pub fn apply(&self, event: &SimEvent) {
        debug!("Applying {} event", event.name());
        match event {
            SimEvent::Cv2xStatus(status) => {
                *lock(&self.status) = *status;
                self.on_status_changed(status);
                self.report_status();
            }
            SimEvent::SlssRxInfo(ue) => {
                let info = SlssRxInfo { ue_info: vec![*ue] };
                *lock(&self.slss) = info.clone();
                for listener in self.manager_listeners.snapshot() {
                    listener.on_slss_rx_info_changed(&info);
                }
            }
            SimEvent::SrcL2Id => {
                let id = fastrand::u32(..=L2_ID_MASK);
                info!("New source L2 id {:06X}", id);
                for listener in self.radio_listeners.snapshot() {
                    listener.on_l2_addr_changed(id);
                }
            }
            SimEvent::SpsSchedule(info) => {
                for listener in self.radio_listeners.snapshot() {
                    listener.on_sps_scheduling_changed(info);
                }
            }
            SimEvent::MacCloneAttack(detected) => {
                for listener in self.radio_listeners.snapshot() {
                    listener.on_mac_address_clone_attack(*detected);
                }
            }
            SimEvent::Capabilities(pools) => {
                let caps = {
                    let mut caps = lock(&self.capabilities);
                    caps.tx_pool_ids_supported = pools.clone();
                    caps.clone()
                };
                for listener in self.radio_listeners.snapshot() {
                    listener.on_capabilities_changed(&caps);
                }
            }
            SimEvent::TxReport(port) => {
                let power = lock(&self.capabilities).max_tx_power;
                let report = TxStatusReport {
                    rf_info: [
                        RfTxInfo {
                            status: RfStatus::Operational,
                            power,
                        },
                        RfTxInfo::default(),
                    ],
                    port: *port,
                    ..Default::default()
                };
                if !self.tx_reports.report(&report) {
                    debug!("Tx status report not enabled on port {}", port);
                }
            }
        }
    }
}
