//! Simulated implementation of the radio backend traits
//!
//! [`SimBackend`] owns a tokio runtime, the [`RadioServer`] and the event
//! task. Every asynchronous API call consults the configured canned reply
//! for its method name: a `refuse` entry fails admission, otherwise a task
//! sleeps the configured delay and then completes the request with either
//! the canned `error` or the simulated result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use v2x_core::{
    promise, AdmissionError, Cv2xListener, Cv2xStatusEx, ErrorCode, EventFlowInfo, FlowKind,
    Ipv6AddrInfo, L2FilterInfo, Radio, RadioCapabilities, RadioFactory, RadioListener,
    RadioManager, Reply, Responder, RxSubscription, ServiceStatus, SlssRxInfo, SpsFlowInfo,
    SpsFlowPair, TrafficCategory, TrafficIpType, TrustedUeInfoList, TxFlow,
    TxStatusReportListener, UnicastRoutingInfo,
};

use crate::config::SimConfig;
use crate::error::SimError;
use crate::event::SimEvent;
use crate::flow_registry::FlowRequest;
use crate::server::RadioServer;
use crate::task::{run_event_task, SimCommand};

/// Ports below this are reserved and rejected for flows
pub const MIN_FLOW_PORT: u16 = 1024;

/// State shared by the factory, manager and radios
struct SimContext {
    server: Arc<RadioServer>,
    handle: Handle,
}

impl SimContext {
    fn config(&self) -> &SimConfig {
        self.server.config()
    }

    /// Admit a request and complete it after the configured delay
    ///
    /// `work` runs on the runtime once the delay has elapsed, unless the
    /// canned reply forces an error.
    fn complete<T, F>(&self, api: &'static str, reply: Reply<T>, work: F) -> Result<(), AdmissionError>
    where
        T: Send + 'static,
        F: FnOnce(&RadioServer) -> Result<T, ErrorCode> + Send + 'static,
    {
        let canned = self.config().reply(api);
        if let Some(status) = canned.refuse {
            warn!("{} refused by configuration: {}", api, status);
            return Err(status);
        }

        let delay = self.config().delay(api);
        let server = Arc::clone(&self.server);
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let result = match canned.error {
                Some(code) => Err(code),
                None => work(&server),
            };
            if let Err(code) = &result {
                debug!("{} completed with {}", api, code);
            }
            let _ = reply.respond(result);
        });
        Ok(())
    }
}

/// A running simulated backend
pub struct SimBackend {
    ctx: Arc<SimContext>,
    events: mpsc::UnboundedSender<SimCommand>,
    runtime: Option<Runtime>,
}

impl SimBackend {
    /// Start the runtime and event task
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("v2x-sim")
            .enable_all()
            .build()?;

        let server = Arc::new(RadioServer::new(config));
        let (events, cmd_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_event_task(Arc::clone(&server), cmd_rx));

        info!("Simulated C-V2X backend started");
        Ok(Self {
            ctx: Arc::new(SimContext {
                server,
                handle: runtime.handle().clone(),
            }),
            events,
            runtime: Some(runtime),
        })
    }

    /// Factory handing out the simulated manager
    pub fn factory(&self) -> Arc<dyn RadioFactory> {
        Arc::new(SimFactory {
            ctx: Arc::clone(&self.ctx),
        })
    }

    pub fn server(&self) -> &Arc<RadioServer> {
        &self.ctx.server
    }

    /// Parse and apply an injection line, blocking until listeners ran
    ///
    /// Must not be called from inside an async runtime.
    pub fn inject(&self, line: &str) -> Result<(), SimError> {
        self.inject_event(SimEvent::parse(line)?)
    }

    /// Apply an event, blocking until listeners ran
    pub fn inject_event(&self, event: SimEvent) -> Result<(), SimError> {
        let (done, pending) = promise();
        self.events
            .send(SimCommand::Inject { event, done })
            .map_err(|_| SimError::TaskStopped)?;
        pending.wait().map_err(|_| SimError::TaskStopped)
    }

    /// Stop the event task and the runtime
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = self.events.send(SimCommand::Shutdown);
            runtime.shutdown_background();
            info!("Simulated C-V2X backend stopped");
        }
    }
}

impl Drop for SimBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Entry point to the simulated backend
pub struct SimFactory {
    ctx: Arc<SimContext>,
}

impl RadioFactory for SimFactory {
    fn radio_manager(&self, status: Responder<ServiceStatus>) -> Option<Arc<dyn RadioManager>> {
        let canned = self.ctx.config().reply("radio_manager");
        if let Some(refused) = canned.refuse {
            warn!("Radio manager unavailable: {}", refused);
            return None;
        }

        let service_status = match canned.error {
            Some(_) => ServiceStatus::Failed,
            None => self.ctx.config().service_status,
        };
        let delay = std::time::Duration::from_millis(self.ctx.config().service_delay_ms);
        self.ctx.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = status.respond(service_status);
        });

        Some(Arc::new(SimRadioManager {
            ctx: Arc::clone(&self.ctx),
        }))
    }
}

/// Simulated radio manager
pub struct SimRadioManager {
    ctx: Arc<SimContext>,
}

impl RadioManager for SimRadioManager {
    fn register_listener(&self, listener: Arc<dyn Cv2xListener>) -> Result<(), AdmissionError> {
        self.ctx.server.manager_listeners().register(listener)
    }

    fn deregister_listener(&self, listener: &Arc<dyn Cv2xListener>) -> Result<(), AdmissionError> {
        self.ctx.server.manager_listeners().deregister(listener)
    }

    fn get_radio(
        &self,
        category: TrafficCategory,
        init: Responder<ServiceStatus>,
    ) -> Option<Arc<dyn Radio>> {
        let canned = self.ctx.config().reply("get_radio");
        if let Some(refused) = canned.refuse {
            warn!("Radio for {:?} unavailable: {}", category, refused);
            return None;
        }

        let radio = Arc::new(SimRadio {
            ctx: Arc::clone(&self.ctx),
            category,
            ready: AtomicBool::new(false),
        });

        let delay = self.ctx.config().delay("get_radio");
        let pending = Arc::clone(&radio);
        self.ctx.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let status = pending.ctx.server.status();
            let ok = canned.error.is_none()
                && (status.rx_status.is_operational() || status.tx_status.is_operational());
            pending.ready.store(ok, Ordering::SeqCst);
            info!("Radio for {:?} initialised, ready={}", category, ok);
            let _ = init.respond(if ok {
                ServiceStatus::Available
            } else {
                ServiceStatus::Failed
            });
        });

        Some(radio)
    }

    fn request_cv2x_status(&self, reply: Reply<Cv2xStatusEx>) -> Result<(), AdmissionError> {
        self.ctx
            .complete("request_cv2x_status", reply, |server| Ok(server.status_ex()))
    }

    fn start_cv2x(&self, reply: Reply<()>) -> Result<(), AdmissionError> {
        self.ctx.complete("start_cv2x", reply, |server| {
            server.start_cv2x();
            Ok(())
        })
    }

    fn stop_cv2x(&self, reply: Reply<()>) -> Result<(), AdmissionError> {
        self.ctx.complete("stop_cv2x", reply, |server| {
            server.stop_cv2x();
            Ok(())
        })
    }

    fn set_peak_tx_power(&self, dbm: i8, reply: Reply<()>) -> Result<(), AdmissionError> {
        debug!("Peak Tx power set to {} dBm", dbm);
        self.ctx.complete("set_peak_tx_power", reply, |_| Ok(()))
    }

    fn set_l2_filters(
        &self,
        filters: &[L2FilterInfo],
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        debug!("Setting {} L2 filters", filters.len());
        self.ctx.complete("set_l2_filters", reply, |_| Ok(()))
    }

    fn remove_l2_filters(&self, l2_ids: &[u32], reply: Reply<()>) -> Result<(), AdmissionError> {
        debug!("Removing {} L2 filters", l2_ids.len());
        self.ctx.complete("remove_l2_filters", reply, |_| Ok(()))
    }

    fn get_slss_rx_info(&self, reply: Reply<SlssRxInfo>) -> Result<(), AdmissionError> {
        self.ctx
            .complete("get_slss_rx_info", reply, |server| Ok(server.slss_rx_info()))
    }

    fn inject_coarse_utc_time(&self, utc_ms: u64, reply: Reply<()>) -> Result<(), AdmissionError> {
        debug!("Coarse UTC time injected: {}", utc_ms);
        self.ctx.complete("inject_coarse_utc_time", reply, |_| Ok(()))
    }
}

/// Simulated radio for one traffic category
pub struct SimRadio {
    ctx: Arc<SimContext>,
    category: TrafficCategory,
    ready: AtomicBool,
}

impl SimRadio {
    fn check_ready(&self, api: &str) -> Result<(), AdmissionError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            warn!("{} on {:?} radio before initialisation", api, self.category);
            Err(AdmissionError::InvalidState)
        }
    }

    fn check_port(&self, api: &str, port: u16) -> Result<(), AdmissionError> {
        if port < MIN_FLOW_PORT {
            warn!("{} with reserved port {}", api, port);
            return Err(AdmissionError::InvalidParam);
        }
        Ok(())
    }
}

impl Radio for SimRadio {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn iface_name(&self, ip_type: TrafficIpType) -> String {
        self.ctx.config().iface_name(ip_type).to_string()
    }

    fn register_listener(&self, listener: Arc<dyn RadioListener>) -> Result<(), AdmissionError> {
        self.ctx.server.radio_listeners().register(listener)
    }

    fn deregister_listener(
        &self,
        listener: &Arc<dyn RadioListener>,
    ) -> Result<(), AdmissionError> {
        self.ctx.server.radio_listeners().deregister(listener)
    }

    fn create_rx_subscription(
        &self,
        ip_type: TrafficIpType,
        port: u16,
        ids: Option<Vec<u32>>,
        reply: Reply<RxSubscription>,
    ) -> Result<(), AdmissionError> {
        self.check_ready("create_rx_subscription")?;
        self.check_port("create_rx_subscription", port)?;
        self.ctx.complete("create_rx_subscription", reply, move |server| {
            server
                .rx_subscriptions()
                .add(ip_type, port, ids.as_deref())?;
            Ok(RxSubscription {
                ip_type,
                ids,
                sock: server.next_sock(),
                addr: server.bind_addr(ip_type, port),
            })
        })
    }

    fn enable_rx_meta_data_report(
        &self,
        ip_type: TrafficIpType,
        enable: bool,
        ids: &[u32],
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        self.check_ready("enable_rx_meta_data_report")?;
        debug!(
            "Rx meta data report {} for {:?}, {} ids",
            if enable { "enabled" } else { "disabled" },
            ip_type,
            ids.len()
        );
        self.ctx
            .complete("enable_rx_meta_data_report", reply, |_| Ok(()))
    }

    fn create_tx_sps_flow(
        &self,
        ip_type: TrafficIpType,
        service_id: u32,
        sps: SpsFlowInfo,
        sps_port: u16,
        event_port: Option<u16>,
        event: EventFlowInfo,
        done: Responder<SpsFlowPair>,
    ) -> Result<(), AdmissionError> {
        self.check_ready("create_tx_sps_flow")?;
        self.check_port("create_tx_sps_flow", sps_port)?;
        if let Some(port) = event_port {
            self.check_port("create_tx_sps_flow", port)?;
        }

        let config = self.ctx.config();
        let sps_reply = config.reply("create_tx_sps_flow");
        if let Some(status) = sps_reply.refuse {
            warn!("create_tx_sps_flow refused by configuration: {}", status);
            return Err(status);
        }
        let event_error = config.reply("create_tx_event_flow").error;
        let delay = config.delay("create_tx_sps_flow");

        debug!(
            "SPS flow request: {} bytes every {} ms, priority {:?}",
            sps.nbytes_reserved, sps.periodicity_ms, sps.priority
        );
        if let Some(port) = event_port {
            debug!(
                "Event half on port {}: unicast={}, retransmit {:?}, power {:?}, mcs {:?}, pool {:?}",
                port,
                event.is_unicast,
                event.auto_retrans_enabled,
                event.peak_tx_power,
                event.mcs_index,
                event.tx_pool_id
            );
        }

        let server = Arc::clone(&self.ctx.server);
        self.ctx.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let sps = match sps_reply.error {
                Some(code) => Err(code),
                None => server.open_flow(&FlowRequest::sps(ip_type, service_id, sps_port)),
            };
            let event = event_port.map(|port| match event_error {
                Some(code) => Err(code),
                None => server.open_flow(&FlowRequest::event(ip_type, service_id, port)),
            });
            let _ = done.respond(SpsFlowPair { sps, event });
        });
        Ok(())
    }

    fn create_tx_event_flow(
        &self,
        ip_type: TrafficIpType,
        service_id: u32,
        info: EventFlowInfo,
        port: u16,
        reply: Reply<TxFlow>,
    ) -> Result<(), AdmissionError> {
        self.check_ready("create_tx_event_flow")?;
        self.check_port("create_tx_event_flow", port)?;
        debug!("Event flow request on port {}, unicast={}", port, info.is_unicast);
        self.ctx.complete("create_tx_event_flow", reply, move |server| {
            server.open_flow(&FlowRequest::event(ip_type, service_id, port))
        })
    }

    fn close_rx_subscription(
        &self,
        sub: &RxSubscription,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        let (ip_type, port) = (sub.ip_type, sub.port());
        self.ctx.complete("close_rx_subscription", reply, move |server| {
            server.rx_subscriptions().remove(ip_type, port)
        })
    }

    fn close_tx_flow(&self, flow: &TxFlow, reply: Reply<()>) -> Result<(), AdmissionError> {
        let flow = *flow;
        self.ctx
            .complete("close_tx_flow", reply, move |server| server.close_flow(&flow))
    }

    fn change_sps_flow_info(
        &self,
        flow: &TxFlow,
        info: SpsFlowInfo,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        let id = flow.flow_id;
        debug!("SPS flow {} reservation now {} bytes", id, info.nbytes_reserved);
        self.ctx.complete("change_sps_flow_info", reply, move |server| {
            if server.flows().contains(FlowKind::Sps, id) {
                Ok(())
            } else {
                Err(ErrorCode::NoSuchElement)
            }
        })
    }

    fn change_event_flow_info(
        &self,
        flow: &TxFlow,
        _info: EventFlowInfo,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        let id = flow.flow_id;
        self.ctx.complete("change_event_flow_info", reply, move |server| {
            if server.flows().contains(FlowKind::Event, id) {
                Ok(())
            } else {
                Err(ErrorCode::NoSuchElement)
            }
        })
    }

    fn request_capabilities(&self, reply: Reply<RadioCapabilities>) -> Result<(), AdmissionError> {
        self.ctx
            .complete("request_capabilities", reply, |server| Ok(server.capabilities()))
    }

    fn update_src_l2_info(&self, reply: Reply<()>) -> Result<(), AdmissionError> {
        self.ctx.complete("update_src_l2_info", reply, |server| {
            server.apply(&SimEvent::SrcL2Id);
            Ok(())
        })
    }

    fn update_trusted_ue_list(
        &self,
        list: &TrustedUeInfoList,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        debug!(
            "Trusted UE list: {} malicious, {} trusted",
            list.malicious_ids.len(),
            list.trusted_ues.len()
        );
        self.ctx.complete("update_trusted_ue_list", reply, |_| Ok(()))
    }

    fn register_tx_status_report_listener(
        &self,
        port: u16,
        listener: Arc<dyn TxStatusReportListener>,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        if self.ctx.server.tx_reports().is_enabled(port) {
            debug!("Tx status report already enabled on port {}", port);
            return Err(AdmissionError::Already);
        }
        self.ctx.complete("enable_tx_status_report", reply, move |server| {
            server
                .tx_reports()
                .enable(port, listener)
                .map_err(|_| ErrorCode::NoEffect)
        })
    }

    fn deregister_tx_status_report_listener(
        &self,
        port: u16,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        if !self.ctx.server.tx_reports().is_enabled(port) {
            debug!("Tx status report not enabled on port {}", port);
            return Err(AdmissionError::NoSuch);
        }
        self.ctx.complete("disable_tx_status_report", reply, move |server| {
            server
                .tx_reports()
                .disable(port)
                .map_err(|_| ErrorCode::NoSuchElement)
        })
    }

    fn set_global_ip_info(
        &self,
        info: Ipv6AddrInfo,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        debug!("Global IP {}/{}", info.addr, info.prefix_len);
        self.ctx.complete("set_global_ip_info", reply, |_| Ok(()))
    }

    fn set_global_ip_unicast_routing_info(
        &self,
        info: UnicastRoutingInfo,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        debug!("Global IP unicast destination {:02X?}", info.dest_mac_addr);
        self.ctx
            .complete("set_global_ip_unicast_routing_info", reply, |_| Ok(()))
    }

    fn inject_vehicle_speed(
        &self,
        speed_kmph: u32,
        reply: Reply<()>,
    ) -> Result<(), AdmissionError> {
        debug!("Vehicle speed injected: {} km/h", speed_kmph);
        self.ctx.complete("inject_vehicle_speed", reply, |_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use v2x_core::{coordinator, RadioError};

    fn backend(config: SimConfig) -> SimBackend {
        SimBackend::new(config).unwrap()
    }

    fn ready_radio(sim: &SimBackend) -> (Arc<dyn RadioManager>, Arc<dyn Radio>) {
        let (status, pending) = promise();
        let manager = sim.factory().radio_manager(status).unwrap();
        assert_eq!(pending.wait().unwrap(), ServiceStatus::Available);

        let (init, pending) = promise();
        let radio = manager.get_radio(TrafficCategory::Safety, init).unwrap();
        assert_eq!(pending.wait().unwrap(), ServiceStatus::Available);
        (manager, radio)
    }

    #[test]
    fn test_radio_becomes_ready() {
        let sim = backend(SimConfig::default());
        let (_manager, radio) = ready_radio(&sim);
        assert!(radio.is_ready());
        assert_eq!(radio.iface_name(TrafficIpType::Ip), "rmnet_data0");
    }

    #[test]
    fn test_radio_not_ready_when_inactive() {
        use v2x_core::{Cv2xStatus, Cv2xStatusType};

        let config = SimConfig {
            default_status: Cv2xStatus::new(Cv2xStatusType::Inactive, Cv2xStatusType::Inactive),
            ..Default::default()
        };
        let sim = backend(config);

        let (status, pending) = promise();
        let manager = sim.factory().radio_manager(status).unwrap();
        pending.wait().unwrap();
        let (init, pending) = promise();
        let radio = manager.get_radio(TrafficCategory::Safety, init).unwrap();
        assert_eq!(pending.wait().unwrap(), ServiceStatus::Failed);

        let result = coordinator::call("event", |reply| {
            radio.create_tx_event_flow(TrafficIpType::Ip, 1, EventFlowInfo::default(), 2600, reply)
        });
        assert_eq!(result, Err(RadioError::Admission(AdmissionError::InvalidState)));
    }

    #[test]
    fn test_reserved_port_rejected() {
        let sim = backend(SimConfig::default());
        let (_manager, radio) = ready_radio(&sim);
        let result = coordinator::call("rx", |reply| {
            radio.create_rx_subscription(TrafficIpType::Ip, 80, None, reply)
        });
        assert_eq!(result, Err(RadioError::Admission(AdmissionError::InvalidParam)));
    }

    #[test]
    fn test_canned_error() {
        let config = SimConfig::default().with_reply(
            "create_tx_event_flow",
            crate::config::ApiReply {
                error: Some(ErrorCode::ModemErr),
                ..Default::default()
            },
        );
        let sim = backend(config);
        let (_manager, radio) = ready_radio(&sim);
        let result = coordinator::call("event", |reply| {
            radio.create_tx_event_flow(TrafficIpType::Ip, 1, EventFlowInfo::default(), 2600, reply)
        });
        assert_eq!(result, Err(RadioError::Backend(ErrorCode::ModemErr)));
        assert_eq!(sim.server().flows().event_count(), 0);
    }

    #[test]
    fn test_sps_pair() {
        let sim = backend(SimConfig::default());
        let (_manager, radio) = ready_radio(&sim);
        let pair = coordinator::request("sps", |done| {
            radio.create_tx_sps_flow(
                TrafficIpType::NonIp,
                1,
                SpsFlowInfo::default(),
                2500,
                Some(2600),
                EventFlowInfo::default(),
                done,
            )
        })
        .unwrap();
        let sps = pair.sps.unwrap();
        assert_eq!(sps.flow_id, 0);
        assert_eq!(sps.port(), 2500);
        assert_eq!(pair.event.unwrap().unwrap().flow_id, 2);
    }

    #[test]
    fn test_inject_reaches_listeners() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct Watch(Mutex<Vec<Cv2xStatusEx>>);
        impl Cv2xListener for Watch {
            fn on_status_changed(&self, status: &Cv2xStatusEx) {
                self.0.lock().unwrap().push(status.clone());
            }
        }

        let sim = backend(SimConfig::default());
        let (manager, _radio) = ready_radio(&sim);
        let watch = Arc::new(Watch::default());
        manager.register_listener(watch.clone()).unwrap();

        sim.inject("cv2x_status suspended active 0").unwrap();
        let seen = watch.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status.rx_status, v2x_core::Cv2xStatusType::Suspended);
    }

    #[test]
    fn test_inject_rejects_garbage() {
        let sim = backend(SimConfig::default());
        assert!(matches!(sim.inject("warp 9"), Err(SimError::UnknownEvent(_))));
    }
}
