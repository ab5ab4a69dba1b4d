//! The legacy radio session
//!
//! [`LegacyRadio`] owns everything the handle based API used to keep in
//! process globals: the manager and radio obtained from the backend, the
//! installed callbacks, the status aggregator and the socket tables.
//!
//! Listeners registered with the backend hold only a `Weak` reference back
//! to the session. Dropping the session therefore stops callback delivery
//! without the backend keeping it alive.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error, info, warn};
use v2x_core::{
    coordinator, promise, ConcurrencyMode, Cv2xListener, Cv2xStatusEx, Radio, RadioCapabilities,
    RadioFactory, RadioListener, RadioManager, ServiceStatus, SlssRxInfo, SpsSchedulingInfo,
    StatusAggregator, TrafficCategory, TrafficIpType, TxStatusReport, TxStatusReportListener,
    V2xEvent,
};

use crate::convert::{
    convert_capabilities, convert_ext_radio_status, convert_slss_rx_info,
    convert_sps_scheduling_info,
};
use crate::error::{Errno, V2xError};
use crate::tables::SocketTables;
use crate::types::{
    ApiVersion, ExtStatusListener, IfaceCapabilities, MacPhyParams, RadioCalls, RadioHandle,
    SlssRxListener, TxReportListener,
};

pub const API_VERSION_NUMBER: u32 = 1;
/// Port used for Rx subscriptions when the caller does not pick one
pub const RX_WILDCARD_PORT: u16 = 9000;
/// Default destination of Tx sockets
pub const DEST_ADDR: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
pub const IP_IFACE: &str = "rmnet_data0";
pub const NON_IP_IFACE: &str = "rmnet_data1";
/// Longest accepted interface name, terminator included
pub const IFNAMSIZ: usize = 16;

const DEFAULT_TRAFFIC_CATEGORY: TrafficCategory = TrafficCategory::Safety;

/// Handle of a legacy interface name
pub fn handle_for_iface(name: &str) -> Option<RadioHandle> {
    match name {
        IP_IFACE => Some(RadioHandle::IP),
        NON_IP_IFACE => Some(RadioHandle::NON_IP),
        _ => None,
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Session {
    manager: Option<Arc<dyn RadioManager>>,
    status_listener: Option<Arc<dyn Cv2xListener>>,
    radio: Option<Arc<dyn Radio>>,
    radio_listener: Option<Arc<dyn RadioListener>>,
    calls: Option<Arc<dyn RadioCalls>>,
    mode: ConcurrencyMode,
    dest_port_override: u16,
    rx_port: u16,
    socket_connect: bool,
    macphy: MacPhyParams,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            manager: None,
            status_listener: None,
            radio: None,
            radio_listener: None,
            calls: None,
            mode: ConcurrencyMode::default(),
            dest_port_override: 0,
            rx_port: RX_WILDCARD_PORT,
            socket_connect: true,
            macphy: MacPhyParams::default(),
        }
    }
}

pub(crate) struct Inner {
    factory: Arc<dyn RadioFactory>,
    session: Mutex<Session>,
    /// Serialises manager acquisition so the status listener registers once
    acquire: Mutex<()>,
    pub(crate) aggregator: StatusAggregator,
    pub(crate) tables: SocketTables,
    capabilities: Mutex<RadioCapabilities>,
    service_status: Mutex<ServiceStatus>,
    pub(crate) ext_listener: Mutex<Option<Arc<dyn ExtStatusListener>>>,
    pub(crate) slss_listeners: Mutex<Vec<(Arc<dyn SlssRxListener>, Arc<dyn Cv2xListener>)>>,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    pub(crate) fn calls(&self) -> Option<Arc<dyn RadioCalls>> {
        self.session().calls.clone()
    }

    pub(crate) fn radio(&self) -> Option<Arc<dyn Radio>> {
        self.session().radio.clone()
    }

    pub(crate) fn capabilities(&self) -> RadioCapabilities {
        lock(&self.capabilities).clone()
    }

    pub(crate) fn rx_port(&self) -> u16 {
        self.session().rx_port
    }

    /// The cached manager, acquiring it from the factory when needed
    ///
    /// Acquisition registers the session status listener and blocks until
    /// the manager reports its service status. A manager that is not
    /// available is discarded.
    pub(crate) fn manager(self: &Arc<Self>) -> Option<Arc<dyn RadioManager>> {
        let _acquiring = lock(&self.acquire);
        if let Some(manager) = self.session().manager.clone() {
            return Some(manager);
        }

        let (status, pending) = promise();
        let Some(manager) = self.factory.radio_manager(status) else {
            error!("Failed to acquire Cv2xRadioManager");
            return None;
        };

        let listener: Arc<dyn Cv2xListener> = Arc::new(StatusAdapter {
            inner: Arc::downgrade(self),
        });
        if let Err(e) = manager.register_listener(Arc::clone(&listener)) {
            warn!("Failed to register status listener: {}", e);
        }

        let service = pending.wait().unwrap_or_else(|e| {
            error!("Cv2xRadioManager service status lost: {}", e);
            ServiceStatus::Failed
        });
        *lock(&self.service_status) = service;

        if !service.is_available() {
            error!("Cv2xRadioManager failed to initialize ({:?})", service);
            let _ = manager.deregister_listener(&listener);
            return None;
        }

        let mut session = self.session();
        session.manager = Some(Arc::clone(&manager));
        session.status_listener = Some(listener);
        Some(manager)
    }

    fn on_status(&self, status: &Cv2xStatusEx) {
        let calls = self.calls();
        let ext = lock(&self.ext_listener).clone();

        let Some(t) = self
            .aggregator
            .apply(status, calls.is_some(), ext.is_some())
        else {
            return;
        };

        if t.went_inactive {
            self.drop_radio_listener();
        }

        if let Some(calls) = &calls {
            if t.notify_event {
                calls.radio_status(t.event);
            }
        }
        if t.notify_ext {
            if let Some(ext) = &ext {
                ext.on_ext_status(&convert_ext_radio_status(&t.status));
            }
        }
        if let (Some(calls), Some(meas)) = (&calls, &t.measurements) {
            calls.chan_measurements(meas);
        }
    }

    fn drop_radio_listener(&self) {
        let (radio, listener) = {
            let mut session = self.session();
            (session.radio.clone(), session.radio_listener.take())
        };
        if let (Some(radio), Some(listener)) = (radio, listener) {
            if let Err(e) = radio.deregister_listener(&listener) {
                debug!("Radio listener deregistration: {}", e);
            }
        }
    }

    fn on_service_status(&self, status: ServiceStatus) {
        {
            let mut current = lock(&self.service_status);
            if *current != status {
                info!("Service status changed to {:?}", status);
            }
            *current = status;
        }

        if let Some(calls) = self.calls() {
            let reported = match status {
                ServiceStatus::Available => ServiceStatus::Available,
                _ => ServiceStatus::Unavailable,
            };
            calls.service_status(reported);
        }
    }

    fn on_capabilities(&self, caps: &RadioCapabilities) {
        *lock(&self.capabilities) = caps.clone();
        debug!("Capabilities updated: {:?}", caps);

        if let Some(calls) = self.calls() {
            calls.capabilities_changed(&convert_capabilities(caps));
        }
    }

    fn on_sps_scheduling(&self, info: &SpsSchedulingInfo) {
        if let Some(calls) = self.tables.find_sps_calls(info.sps_id) {
            calls.sps_offset_changed(&convert_sps_scheduling_info(info));
        }
    }

    fn on_l2_addr_changed(&self, new_l2_address: u32) {
        info!("L2 address changed to {:#08x}", new_l2_address);
        if let Some(calls) = self.calls() {
            calls.l2_addr_changed(new_l2_address);
        }
    }
}

struct StatusAdapter {
    inner: Weak<Inner>,
}

impl Cv2xListener for StatusAdapter {
    fn on_status_changed(&self, status: &Cv2xStatusEx) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_status(status);
        }
    }

    fn on_service_status_change(&self, status: ServiceStatus) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_service_status(status);
        }
    }
}

struct RadioAdapter {
    inner: Weak<Inner>,
}

impl RadioListener for RadioAdapter {
    fn on_l2_addr_changed(&self, new_l2_address: u32) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_l2_addr_changed(new_l2_address);
        }
    }

    fn on_sps_scheduling_changed(&self, info: &SpsSchedulingInfo) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_sps_scheduling(info);
        }
    }

    fn on_capabilities_changed(&self, caps: &RadioCapabilities) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_capabilities(caps);
        }
    }

    fn on_mac_address_clone_attack(&self, detected: bool) {
        warn!("MAC address clone attack detected: {}", detected);
    }
}

/// Forwards SLSS updates to one legacy listener
pub(crate) struct SlssAdapter {
    pub(crate) listener: Arc<dyn SlssRxListener>,
}

impl Cv2xListener for SlssAdapter {
    fn on_slss_rx_info_changed(&self, info: &SlssRxInfo) {
        self.listener.on_slss_rx_info(&convert_slss_rx_info(info));
    }
}

/// Forwards Tx status reports to one legacy listener
pub(crate) struct TxReportAdapter {
    pub(crate) listener: Arc<dyn TxReportListener>,
}

impl TxStatusReportListener for TxReportAdapter {
    fn on_tx_status_report(&self, report: &TxStatusReport) {
        self.listener.on_tx_status_report(report);
    }
}

/// A legacy radio session over a backend
///
/// Blocking operations wait on backend completions and must be called from
/// plain threads, not from inside an async runtime.
pub struct LegacyRadio {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for LegacyRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.session();
        f.debug_struct("LegacyRadio")
            .field("has_manager", &session.manager.is_some())
            .field("has_radio", &session.radio.is_some())
            .field("mode", &session.mode)
            .field("tables", &self.inner.tables)
            .finish()
    }
}

impl LegacyRadio {
    pub fn new(factory: Arc<dyn RadioFactory>) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                session: Mutex::new(Session::default()),
                acquire: Mutex::new(()),
                aggregator: StatusAggregator::new(),
                tables: SocketTables::new(),
                capabilities: Mutex::new(RadioCapabilities::default()),
                service_status: Mutex::new(ServiceStatus::Unavailable),
                ext_listener: Mutex::new(None),
                slss_listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Initialise the radio behind a legacy interface name
    pub fn init(
        &self,
        iface_name: &str,
        mode: ConcurrencyMode,
        calls: Option<Arc<dyn RadioCalls>>,
    ) -> Result<RadioHandle, Errno> {
        let Some(handle) = handle_for_iface(iface_name) else {
            error!("Failed to find handle for interface {}", iface_name);
            return Err(Errno::Perm);
        };
        let ip_type = handle.ip_type().ok_or(Errno::Perm)?;
        self.init_v2(ip_type, mode, calls)
    }

    /// Initialise the radio and return the handle for one traffic type
    pub fn init_v2(
        &self,
        ip_type: TrafficIpType,
        mode: ConcurrencyMode,
        calls: Option<Arc<dyn RadioCalls>>,
    ) -> Result<RadioHandle, Errno> {
        debug!("init_v2: traffic type {:?}", ip_type);
        self.init_v3(mode, calls)?;
        Ok(RadioHandle::for_ip_type(ip_type))
    }

    /// Initialise the radio, returning the IP and non-IP handles
    ///
    /// Acquires the manager, applies the current status, waits for the radio,
    /// reports the result through `init_complete` and caches capabilities.
    /// A requested mode above what the radio supports is downgraded.
    pub fn init_v3(
        &self,
        mode: ConcurrencyMode,
        calls: Option<Arc<dyn RadioCalls>>,
    ) -> Result<(RadioHandle, RadioHandle), Errno> {
        let inner = &self.inner;
        {
            let mut session = inner.session();
            session.calls = calls.clone();
            session.mode = mode;
            session.dest_port_override = 0;
            session.rx_port = RX_WILDCARD_PORT;
        }
        *lock(&inner.service_status) = ServiceStatus::Available;
        inner.aggregator.reset_initial();

        let Some(manager) = inner.manager() else {
            error!("init_v3: Failed to acquire Cv2xRadioManager");
            return Err(Errno::Perm);
        };

        let (init, radio_init) = promise();
        let radio = manager.get_radio(DEFAULT_TRAFFIC_CATEGORY, init);

        let status = coordinator::call("request_cv2x_status", |reply| {
            manager.request_cv2x_status(reply)
        })
        .map_err(|e| {
            error!("init_v3: Failed to obtain Cv2x status: {}", e);
            Errno::Perm
        })?;
        inner.on_status(&status);

        let init_result = match radio {
            None => {
                error!("init_v3: Failed to acquire Cv2xRadio");
                Err(V2xError::Fail)
            }
            Some(radio) => {
                info!("Waiting for Cv2x radio initialization result");
                match radio_init.wait() {
                    Ok(ServiceStatus::Available) => {
                        inner.session().radio = Some(radio);
                        Ok(())
                    }
                    Ok(other) => {
                        error!("Cv2xRadio failed to initialize ({:?})", other);
                        Err(V2xError::Fail)
                    }
                    Err(e) => {
                        error!("Cv2xRadio initialization lost: {}", e);
                        Err(V2xError::Fail)
                    }
                }
            }
        };

        if let Some(calls) = &calls {
            calls.init_complete(init_result);
        }
        if init_result.is_err() {
            inner.session().radio = None;
            return Err(Errno::Perm);
        }

        let radio = inner.radio().ok_or(Errno::Perm)?;
        let listener: Arc<dyn RadioListener> = Arc::new(RadioAdapter {
            inner: Arc::downgrade(inner),
        });
        if let Err(e) = radio.register_listener(Arc::clone(&listener)) {
            warn!("Failed to register radio listener: {}", e);
        }
        inner.session().radio_listener = Some(listener);

        self.set_radio_info(&radio, mode).map_err(|e| {
            error!("init_v3: Error setting radio info: {}", e);
            Errno::Perm
        })?;

        Ok((RadioHandle::IP, RadioHandle::NON_IP))
    }

    fn set_radio_info(&self, radio: &Arc<dyn Radio>, mode: ConcurrencyMode) -> Result<(), V2xError> {
        info!("set_radio_info: concurrency mode {:?}", mode);

        let caps = coordinator::call("request_capabilities", |reply| {
            radio.request_capabilities(reply)
        })
        .map_err(|e| {
            error!("Failed to obtain initial Cv2xRadioCapabilities: {}", e);
            V2xError::Fail
        })?;

        let supported = caps.max_supported_concurrency;
        *lock(&self.inner.capabilities) = caps;

        let mut session = self.inner.session();
        if mode > supported {
            warn!(
                "init() requested unsupported WWAN/C-V2X concurrency, switching to supported mode ({:?})",
                supported
            );
            session.mode = supported;
        } else {
            session.mode = mode;
        }
        Ok(())
    }

    /// Release the radio and the manager
    pub fn deinit(&self, _handle: RadioHandle) -> Result<(), V2xError> {
        info!("deinit");
        let (manager, status_listener, radio, radio_listener) = {
            let mut session = self.inner.session();
            (
                session.manager.take(),
                session.status_listener.take(),
                session.radio.take(),
                session.radio_listener.take(),
            )
        };

        if let (Some(radio), Some(listener)) = (radio, radio_listener) {
            let _ = radio.deregister_listener(&listener);
        }
        if let (Some(manager), Some(listener)) = (manager, status_listener) {
            let _ = manager.deregister_listener(&listener);
        }
        Ok(())
    }

    /// Store MAC/PHY parameters and report completion
    pub fn set_macphy(&self, _handle: RadioHandle, params: MacPhyParams) -> Result<(), V2xError> {
        let l2 = params
            .l2_source_addr
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":");
        info!(
            "Mac/phy params: Freq={:.3}, bw={}, tx_power={:.1} dBm, retrans={} L2-HWaddr={}",
            params.channel_center_khz as f32 / 1000.0,
            params.channel_bandwidth_mhz,
            params.tx_power_limit_decidbm as f32 / 10.0,
            params.qty_auto_retrans,
            l2
        );

        self.inner.session().macphy = params;
        if let Some(calls) = self.inner.calls() {
            calls.macphy_change_complete();
        }
        Ok(())
    }

    pub fn macphy(&self) -> MacPhyParams {
        self.inner.session().macphy.clone()
    }

    pub fn api_version(&self) -> ApiVersion {
        ApiVersion {
            version_num: API_VERSION_NUMBER,
            build_details: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }

    /// Query the backend for the current event
    ///
    /// Any failure reports `Inactive`.
    pub fn get_status(&self) -> V2xEvent {
        let Some(manager) = self.inner.manager() else {
            error!("Failed to initialize Cv2xRadioManager");
            return V2xEvent::Inactive;
        };

        match coordinator::call("request_cv2x_status", |reply| {
            manager.request_cv2x_status(reply)
        }) {
            Ok(status) => {
                let event = status.status.event();
                info!("V2X Status {}", event);
                event
            }
            Err(e) => {
                error!("get_status: Failed to obtain Cv2xStatus: {}", e);
                V2xEvent::Inactive
            }
        }
    }

    /// Cached event and microseconds since the last valid status
    ///
    /// The age is `u64::MAX` until a valid status has been received.
    pub fn status_poll(&self) -> (V2xEvent, u64) {
        let (event, age) = self.inner.aggregator.poll();
        let age_us = age.map_or(u64::MAX, |a| {
            u64::try_from(a.as_micros()).unwrap_or(u64::MAX)
        });
        (event, age_us)
    }

    pub fn query_parameters(&self, _iface_name: &str) -> Result<IfaceCapabilities, V2xError> {
        self.query_capabilities()
    }

    /// Cached capabilities in the legacy layout
    pub fn query_capabilities(&self) -> Result<IfaceCapabilities, V2xError> {
        let session = self.inner.session();
        if session.manager.is_none() || session.radio.is_none() {
            error!("query_capabilities: radio not initialized");
            return Err(V2xError::Fail);
        }
        drop(session);
        Ok(convert_capabilities(&self.inner.capabilities()))
    }

    pub fn get_iface_name(&self, ip_type: TrafficIpType) -> Result<String, V2xError> {
        let Some(radio) = self.inner.radio() else {
            error!("get_iface_name: radio not initialized");
            return Err(V2xError::Fail);
        };
        let name = radio.iface_name(ip_type);
        if name.is_empty() || name.len() >= IFNAMSIZ {
            error!("get_iface_name: unusable interface name {:?}", name);
            return Err(V2xError::Fail);
        }
        Ok(name)
    }

    pub fn set_dest_port(&self, port: u16) {
        self.inner.session().dest_port_override = port;
        debug!("destination portnum changed to {}", port);
    }

    pub fn dest_port_override(&self) -> u16 {
        self.inner.session().dest_port_override
    }

    pub fn set_rx_port(&self, port: u16) {
        self.inner.session().rx_port = port;
        debug!("RX listen portnum set to {}", port);
    }

    pub fn rx_port(&self) -> u16 {
        self.inner.rx_port()
    }

    pub fn set_dest_ipv6_addr(&self, addr: &str) {
        error!("set_dest_ipv6_addr({}) is not supported", addr);
    }

    /// Destination a Tx socket would connect to
    pub fn dest_addr(&self, port: u16) -> SocketAddrV6 {
        let session = self.inner.session();
        let port = match session.dest_port_override {
            0 => port,
            p => p,
        };
        SocketAddrV6::new(DEST_ADDR, port, 0, 0)
    }

    pub fn disable_socket_connect(&self) {
        self.inner.session().socket_connect = false;
    }

    pub fn socket_connect_enabled(&self) -> bool {
        self.inner.session().socket_connect
    }

    pub fn tx_flush(&self, iface_name: &str) {
        error!("tx_flush({}) is not supported", iface_name);
    }

    /// Concurrency mode in effect after init
    pub fn mode(&self) -> ConcurrencyMode {
        self.inner.session().mode
    }

    pub fn start_v2x_mode(&self) -> Result<(), V2xError> {
        let manager = self.inner.manager().ok_or(V2xError::Fail)?;
        coordinator::call("start_cv2x", |reply| manager.start_cv2x(reply)).map_err(|e| {
            error!("start_v2x_mode failed: {}", e);
            V2xError::Fail
        })
    }

    pub fn stop_v2x_mode(&self) -> Result<(), V2xError> {
        let manager = self.inner.manager().ok_or(V2xError::Fail)?;
        coordinator::call("stop_cv2x", |reply| manager.stop_cv2x(reply)).map_err(|e| {
            error!("stop_v2x_mode failed: {}", e);
            V2xError::Fail
        })
    }
}
