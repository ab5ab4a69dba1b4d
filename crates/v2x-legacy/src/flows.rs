//! Socket creation, reservation changes and teardown

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use v2x_core::{
    coordinator, ErrorCode, EventFlowInfo, Radio, RadioError, Responder, RxSubscription, SockFd,
    TrafficIpType, TxFlow,
};

use crate::context::{handle_for_iface, LegacyRadio};
use crate::convert::{convert_event_flow_info, convert_sps_flow_info};
use crate::error::{Errno, V2xError};
use crate::types::{
    NoSpsCalls, RadioHandle, SockInfo, SockSet, SpsCalls, TxBandwidthReservation, TxFlowInfo,
    TxSpsFlowInfo,
};

/// Most service ids accepted in one Rx subscription
pub const MAX_SUBSCRIBE_SIDS_LIST_LEN: usize = 10;

fn truncate_ids(op: &str, ids: &[u32]) -> Vec<u32> {
    if ids.len() > MAX_SUBSCRIBE_SIDS_LIST_LEN {
        warn!(
            "{}: {} service ids given, using the first {}",
            op,
            ids.len(),
            MAX_SUBSCRIBE_SIDS_LIST_LEN
        );
    }
    ids.iter()
        .take(MAX_SUBSCRIBE_SIDS_LIST_LEN)
        .copied()
        .collect()
}

fn handle_ip_type(op: &str, handle: RadioHandle) -> Result<TrafficIpType, Errno> {
    handle.ip_type().ok_or_else(|| {
        error!("{}: Failed to find handle ID {}", op, handle.0);
        Errno::Inval
    })
}

impl LegacyRadio {
    pub(crate) fn radio_or_inval(&self, op: &str) -> Result<Arc<dyn Radio>, Errno> {
        self.inner.radio().ok_or_else(|| {
            error!("{}: called when C-V2X radio interface is invalid", op);
            Errno::Inval
        })
    }

    /// The radio, only when it is present and initialised
    pub(crate) fn ready_radio(&self, op: &str) -> Option<Arc<dyn Radio>> {
        match self.inner.radio() {
            Some(radio) if radio.is_ready() => Some(radio),
            _ => {
                error!("{}: called when C-V2X radio interface is invalid", op);
                None
            }
        }
    }

    fn close_tx_flow(&self, radio: &Arc<dyn Radio>, flow: &TxFlow) -> Result<(), RadioError> {
        coordinator::call("close_tx_flow", |reply| radio.close_tx_flow(flow, reply))
    }

    fn close_rx_subscription(
        &self,
        radio: &Arc<dyn Radio>,
        sub: &RxSubscription,
    ) -> Result<(), RadioError> {
        coordinator::call("close_rx_subscription", |reply| {
            radio.close_rx_subscription(sub, reply)
        })
    }

    fn register_sps_flow(&self, flow: &TxFlow, calls: Option<Arc<dyn SpsCalls>>) {
        self.inner.tables.add_tx(*flow);
        self.inner
            .tables
            .add_sps_calls(flow.flow_id, calls.unwrap_or_else(|| Arc::new(NoSpsCalls)));
    }

    /// Open a wildcard Rx socket on the default Rx port
    pub fn rx_sock_create_and_bind(&self, handle: RadioHandle) -> Result<SockInfo, Errno> {
        self.rx_sock_create_and_bind_v2(handle, None)
    }

    /// Open an Rx socket on the session Rx port
    pub fn rx_sock_create_and_bind_v2(
        &self,
        handle: RadioHandle,
        ids: Option<&[u32]>,
    ) -> Result<SockInfo, Errno> {
        self.rx_sock_create_and_bind_v3(handle, self.rx_port(), ids)
    }

    /// Open an Rx socket on `port`
    ///
    /// An absent or empty id list subscribes to every service id. Longer
    /// lists are truncated to [`MAX_SUBSCRIBE_SIDS_LIST_LEN`].
    pub fn rx_sock_create_and_bind_v3(
        &self,
        handle: RadioHandle,
        port: u16,
        ids: Option<&[u32]>,
    ) -> Result<SockInfo, Errno> {
        const OP: &str = "rx_sock_create_and_bind";
        let radio = self.radio_or_inval(OP)?;
        let ip_type = handle_ip_type(OP, handle)?;

        let ids = ids
            .filter(|ids| !ids.is_empty())
            .map(|ids| truncate_ids(OP, ids));

        let sub = coordinator::call("create_rx_subscription", |reply| {
            radio.create_rx_subscription(ip_type, port, ids, reply)
        })
        .map_err(|e| {
            error!("{}: Failed to create Rx subscription on port {}: {}", OP, port, e);
            Errno::Perm
        })?;

        let info = SockInfo::from(&sub);
        info!("{}: Rx socket {} bound to port {}", OP, sub.sock, port);
        self.inner.tables.add_rx(sub);
        Ok(info)
    }

    /// Enable or disable Rx meta data reports for service ids
    pub fn enable_rx_meta_data(
        &self,
        handle: RadioHandle,
        enable: bool,
        ids: &[u32],
    ) -> Result<(), Errno> {
        const OP: &str = "enable_rx_meta_data";
        let radio = self.radio_or_inval(OP)?;
        if ids.is_empty() {
            error!("{}: empty service id list", OP);
            return Err(Errno::Inval);
        }
        let ip_type = handle_ip_type(OP, handle)?;
        let ids = truncate_ids(OP, ids);

        coordinator::call("enable_rx_meta_data_report", |reply| {
            radio.enable_rx_meta_data_report(ip_type, enable, &ids, reply)
        })
        .map_err(|e| {
            error!("{}: {}", OP, e);
            Errno::Perm
        })
    }

    /// Create the requested Tx flows and an Rx subscription in one call
    ///
    /// With an SPS port the SPS (and optional event) pair is created, else
    /// with an event port a single event flow. The Rx subscription follows;
    /// when it fails every Tx socket created here is closed again.
    #[allow(clippy::too_many_arguments)]
    pub fn sock_create_and_bind(
        &self,
        handle: RadioHandle,
        tx_flow_info: Option<&TxSpsFlowInfo>,
        calls: Option<Arc<dyn SpsCalls>>,
        tx_sps_port: Option<u16>,
        tx_event_port: Option<u16>,
        rx_port: Option<u16>,
        rx_ids: Option<&[u32]>,
    ) -> Result<SockSet, Errno> {
        info!(
            "sock_create_and_bind: tx sps port {:?}, tx event port {:?}, rx port {:?}",
            tx_sps_port, tx_event_port, rx_port
        );
        let ip_type = handle_ip_type("sock_create_and_bind", handle)?;

        let mut set = SockSet::default();
        match (tx_flow_info, tx_sps_port, tx_event_port) {
            (Some(info), Some(sps_port), event_port) => {
                let (sps, event) =
                    self.tx_sps_sock_create_and_bind_v2(handle, info, calls, sps_port, event_port)?;
                set.tx_sps = Some(sps);
                set.tx_event = event;
            }
            (Some(info), None, Some(event_port)) => {
                set.tx_event = Some(self.tx_event_sock_create_and_bind_v3(
                    ip_type,
                    info.reservation.v2x_id,
                    event_port,
                    &info.flow_info,
                )?);
            }
            _ => {}
        }

        if let Some(port) = rx_port {
            match self.rx_sock_create_and_bind_v3(handle, port, rx_ids) {
                Ok(rx) => set.rx = Some(rx),
                Err(e) => {
                    error!("sock_create_and_bind: create Rx flow error, close Tx flow");
                    for tx in [set.tx_sps, set.tx_event].into_iter().flatten() {
                        let mut sock = tx.sock;
                        let _ = self.sock_close(&mut sock);
                    }
                    return Err(e);
                }
            }
        }

        Ok(set)
    }

    /// Create an SPS flow without an event flow
    pub fn tx_sps_only_create(
        &self,
        handle: RadioHandle,
        res: &TxBandwidthReservation,
        calls: Option<Arc<dyn SpsCalls>>,
        sps_port: u16,
    ) -> Result<SockInfo, Errno> {
        let info = TxSpsFlowInfo {
            reservation: *res,
            flow_info: TxFlowInfo::default(),
        };
        self.tx_sps_only_create_v2(handle, &info, calls, sps_port)
    }

    pub fn tx_sps_only_create_v2(
        &self,
        handle: RadioHandle,
        info: &TxSpsFlowInfo,
        calls: Option<Arc<dyn SpsCalls>>,
        sps_port: u16,
    ) -> Result<SockInfo, Errno> {
        const OP: &str = "tx_sps_only_create";
        let radio = self.radio_or_inval(OP)?;
        let sps = convert_sps_flow_info(info, &self.inner.capabilities())?;
        let ip_type = handle_ip_type(OP, handle)?;

        let pair = coordinator::request("create_tx_sps_flow", |done| {
            radio.create_tx_sps_flow(
                ip_type,
                info.reservation.v2x_id,
                sps,
                sps_port,
                None,
                EventFlowInfo::default(),
                done,
            )
        })
        .map_err(|e| {
            error!("{}: {}", OP, e);
            Errno::Perm
        })?;

        let flow = pair.sps.map_err(|code| {
            error!("{}: SPS flow creation failed: {}", OP, code);
            Errno::Perm
        })?;

        self.register_sps_flow(&flow, calls);
        info!("{}: SPS flow {} on socket {}", OP, flow.flow_id, flow.sock);
        Ok(SockInfo::from(&flow))
    }

    /// Create an SPS flow and optionally an event flow
    pub fn tx_sps_sock_create_and_bind(
        &self,
        handle: RadioHandle,
        res: &TxBandwidthReservation,
        calls: Option<Arc<dyn SpsCalls>>,
        sps_port: u16,
        event_port: Option<u16>,
    ) -> Result<(SockInfo, Option<SockInfo>), Errno> {
        let info = TxSpsFlowInfo {
            reservation: *res,
            flow_info: TxFlowInfo::default(),
        };
        self.tx_sps_sock_create_and_bind_v2(handle, &info, calls, sps_port, event_port)
    }

    /// Create an SPS flow and optionally an event flow, with flow overrides
    ///
    /// When the radio has no SPS flow left, plain event flows are created on
    /// the requested ports instead. Any other failure closes whichever half
    /// was created and fails with [`Errno::Perm`].
    pub fn tx_sps_sock_create_and_bind_v2(
        &self,
        handle: RadioHandle,
        info: &TxSpsFlowInfo,
        calls: Option<Arc<dyn SpsCalls>>,
        sps_port: u16,
        event_port: Option<u16>,
    ) -> Result<(SockInfo, Option<SockInfo>), Errno> {
        const OP: &str = "tx_sps_sock_create_and_bind";
        let radio = self.radio_or_inval(OP)?;
        let ip_type = handle_ip_type(OP, handle)?;
        let sps = convert_sps_flow_info(info, &self.inner.capabilities())?;
        let event_info = convert_event_flow_info(&info.flow_info);
        let service_id = info.reservation.v2x_id;

        let pair = coordinator::request("create_tx_sps_flow", |done| {
            radio.create_tx_sps_flow(
                ip_type, service_id, sps, sps_port, event_port, event_info, done,
            )
        })
        .map_err(|e| {
            error!("{}: {}", OP, e);
            Errno::Perm
        })?;

        match (pair.sps, pair.event) {
            (Ok(sps_flow), None) => {
                self.register_sps_flow(&sps_flow, calls);
                Ok((SockInfo::from(&sps_flow), None))
            }
            (Ok(sps_flow), Some(Ok(event_flow))) => {
                self.register_sps_flow(&sps_flow, calls);
                self.inner.tables.add_tx(event_flow);
                Ok((
                    SockInfo::from(&sps_flow),
                    Some(SockInfo::from(&event_flow)),
                ))
            }
            (Err(ErrorCode::ExceedMax), event) => {
                warn!("{}: SPS flows exhausted, using event flows instead", OP);
                if let Some(Ok(orphan)) = event {
                    if let Err(e) = self.close_tx_flow(&radio, &orphan) {
                        warn!("{}: closing event half failed: {}", OP, e);
                    }
                }
                self.event_fallback(&radio, ip_type, service_id, event_info, sps_port, event_port)
            }
            (sps, event) => {
                for flow in [sps.ok(), event.and_then(Result::ok)].into_iter().flatten() {
                    if let Err(e) = self.close_tx_flow(&radio, &flow) {
                        warn!("{}: closing flow {} failed: {}", OP, flow.flow_id, e);
                    }
                }
                error!("{}: SPS and event flow creation failed", OP);
                Err(Errno::Perm)
            }
        }
    }

    fn create_event_flow(
        &self,
        radio: &Arc<dyn Radio>,
        ip_type: TrafficIpType,
        service_id: u32,
        info: EventFlowInfo,
        port: u16,
    ) -> Result<TxFlow, Errno> {
        coordinator::call("create_tx_event_flow", |reply| {
            radio.create_tx_event_flow(ip_type, service_id, info, port, reply)
        })
        .map_err(|e| {
            error!("Event flow creation on port {} failed: {}", port, e);
            Errno::Perm
        })
    }

    fn event_fallback(
        &self,
        radio: &Arc<dyn Radio>,
        ip_type: TrafficIpType,
        service_id: u32,
        info: EventFlowInfo,
        sps_port: u16,
        event_port: Option<u16>,
    ) -> Result<(SockInfo, Option<SockInfo>), Errno> {
        let first = self.create_event_flow(radio, ip_type, service_id, info, sps_port)?;

        let second = match event_port {
            None => None,
            Some(port) => match self.create_event_flow(radio, ip_type, service_id, info, port) {
                Ok(flow) => Some(flow),
                Err(e) => {
                    if let Err(close) = self.close_tx_flow(radio, &first) {
                        warn!("Closing fallback flow {} failed: {}", first.flow_id, close);
                    }
                    return Err(e);
                }
            },
        };

        self.inner.tables.add_tx(first);
        if let Some(flow) = &second {
            self.inner.tables.add_tx(*flow);
        }
        Ok((SockInfo::from(&first), second.as_ref().map(SockInfo::from)))
    }

    /// Create an event flow on a legacy interface name
    pub fn tx_event_sock_create_and_bind(
        &self,
        iface_name: &str,
        v2x_id: u32,
        port: u16,
    ) -> Result<SockInfo, Errno> {
        self.tx_event_sock_create_and_bind_v2(iface_name, v2x_id, port, &TxFlowInfo::default())
    }

    pub fn tx_event_sock_create_and_bind_v2(
        &self,
        iface_name: &str,
        v2x_id: u32,
        port: u16,
        flow_info: &TxFlowInfo,
    ) -> Result<SockInfo, Errno> {
        let ip_type = handle_for_iface(iface_name)
            .and_then(|h| h.ip_type())
            .ok_or_else(|| {
                error!("tx_event_sock_create_and_bind: unknown interface {}", iface_name);
                Errno::Inval
            })?;
        self.tx_event_sock_create_and_bind_v3(ip_type, v2x_id, port, flow_info)
    }

    pub fn tx_event_sock_create_and_bind_v3(
        &self,
        ip_type: TrafficIpType,
        v2x_id: u32,
        port: u16,
        flow_info: &TxFlowInfo,
    ) -> Result<SockInfo, Errno> {
        let radio = self.radio_or_inval("tx_event_sock_create_and_bind")?;
        let flow = self.create_event_flow(
            &radio,
            ip_type,
            v2x_id,
            convert_event_flow_info(flow_info),
            port,
        )?;

        self.inner.tables.add_tx(flow);
        info!(
            "Event flow {} on socket {} to {}",
            flow.flow_id,
            flow.sock,
            self.dest_addr(port)
        );
        Ok(SockInfo::from(&flow))
    }

    /// Change the reservation of an SPS flow
    pub fn tx_reservation_change(
        &self,
        sock: SockFd,
        res: &TxBandwidthReservation,
    ) -> Result<(), V2xError> {
        let info = TxSpsFlowInfo {
            reservation: *res,
            flow_info: TxFlowInfo::default(),
        };
        self.tx_reservation_change_v2(sock, &info)
    }

    /// Change the reservation of an SPS flow, with flow overrides
    ///
    /// A reservation of zero bytes closes the flow instead. Otherwise the
    /// change is only submitted here; its result is reported through the
    /// flow's [`SpsCalls::reservation_change_complete`].
    pub fn tx_reservation_change_v2(
        &self,
        sock: SockFd,
        info: &TxSpsFlowInfo,
    ) -> Result<(), V2xError> {
        let radio = self
            .ready_radio("tx_reservation_change")
            .ok_or(V2xError::Fail)?;

        let Some(flow) = self.inner.tables.find_tx(sock) else {
            error!("Invalid socket {}", sock);
            return Err(V2xError::BadParam);
        };

        if info.reservation.tx_reservation_size_bytes == 0 {
            info!(
                "Deregister flow ID #{} due to zeros in reservation update",
                flow.flow_id
            );
            if let Err(e) = self.close_tx_flow(&radio, &flow) {
                warn!("Closing flow {} failed: {}", flow.flow_id, e);
            }
            self.inner.tables.remove_tx(sock);
            self.inner.tables.remove_sps_calls(flow.flow_id);
            return Ok(());
        }

        let Some(calls) = self.inner.tables.find_sps_calls(flow.flow_id) else {
            warn!(
                "tx_reservation_change called on an EVENT flow ID #{}",
                flow.flow_id
            );
            return Err(V2xError::Fail);
        };

        let sps = convert_sps_flow_info(info, &self.inner.capabilities())
            .map_err(|_| V2xError::Fail)?;

        let flow_id = flow.flow_id;
        let reply = Responder::new(move |result: Result<(), ErrorCode>| {
            match result {
                Ok(()) => info!("tx reservation change succeeded for flow {}", flow_id),
                Err(code) => error!("tx reservation change failed for flow {}: {}", flow_id, code),
            }
            calls.reservation_change_complete(result);
        });

        radio.change_sps_flow_info(&flow, sps, reply).map_err(|e| {
            error!("TX Reservation Change failed: {}", e);
            V2xError::Fail
        })
    }

    /// Change the overrides of an event flow
    pub fn tx_event_flow_info_change(
        &self,
        sock: SockFd,
        flow_info: &TxFlowInfo,
    ) -> Result<(), V2xError> {
        let radio = self
            .ready_radio("tx_event_flow_info_change")
            .ok_or(V2xError::Fail)?;

        let Some(flow) = self.inner.tables.find_tx(sock) else {
            error!("Invalid socket {}", sock);
            return Err(V2xError::BadParam);
        };

        if self.inner.tables.is_sps(flow.flow_id) {
            warn!(
                "tx_event_flow_info_change called on an SPS flow ID #{}",
                flow.flow_id
            );
            return Err(V2xError::Fail);
        }

        let info = convert_event_flow_info(flow_info);
        coordinator::call("change_event_flow_info", |reply| {
            radio.change_event_flow_info(&flow, info, reply)
        })
        .map_err(|e| {
            error!("Event flow info change failed: {}", e);
            V2xError::Fail
        })
    }

    /// Close whatever socket `sock` refers to
    ///
    /// On success `sock` is set to -1. Closing a socket this session does not
    /// know succeeds without effect.
    pub fn sock_close(&self, sock: &mut SockFd) -> Result<(), Errno> {
        if *sock < 0 {
            error!("Invalid socket");
            return Err(Errno::Inval);
        }

        let radio = self.inner.radio();
        let mut result = Ok(());

        if let Some(sub) = self.inner.tables.remove_rx(*sock) {
            let closed = radio
                .as_ref()
                .map_or(Err(()), |r| self.close_rx_subscription(r, &sub).map_err(|_| ()));
            if closed.is_err() {
                result = Err(Errno::Inval);
            }
        }

        if let Some(flow) = self.inner.tables.remove_tx(*sock) {
            let closed = radio
                .as_ref()
                .map_or(Err(()), |r| self.close_tx_flow(r, &flow).map_err(|_| ()));
            if closed.is_err() {
                result = Err(Errno::Inval);
            }
            self.inner.tables.remove_sps_calls(flow.flow_id);
        }

        match result {
            Ok(()) => {
                debug!("Socket {} closed", sock);
                *sock = -1;
            }
            Err(_) => error!("Failed for socket {}", sock),
        }
        result
    }

    pub fn find_tx_flow(&self, sock: SockFd) -> Option<TxFlow> {
        self.inner.tables.find_tx(sock)
    }

    pub fn find_rx_sub(&self, sock: SockFd) -> Option<RxSubscription> {
        self.inner.tables.find_rx(sock)
    }
}
