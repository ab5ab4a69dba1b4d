//! Integration tests for the legacy API over the simulated backend
//!
//! These tests drive a [`LegacyRadio`] against `v2x-sim` and verify:
//! - Initialisation and status callbacks
//! - SPS flows, reservation changes and the event flow fallback
//! - Socket lookup, rollback and close semantics
//! - Control operations and listener registration

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use v2x_core::{
    ChanMeasurements, ConcurrencyMode, ErrorCode, FlowKind, L2FilterInfo, Priority, SlssRxInfo,
    TrustedUeInfo, TxStatusReport, V2xEvent,
};
use v2x_legacy::{
    ChanMeasParams, Errno, ExtStatusListener, LegacyRadio, RadioCalls, RadioHandle,
    RadioStatusEx, SlssRxListener, SpsCalls, SpsMacDetails, TxBandwidthReservation,
    TxFlowInfo, TxReportListener, V2xError,
};
use v2x_sim::{ApiReply, SimBackend, SimConfig};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Records every session callback
    #[derive(Default)]
    pub struct CallLog {
        pub inits: Mutex<Vec<Result<(), V2xError>>>,
        pub events: Mutex<Vec<V2xEvent>>,
        pub measurements: Mutex<usize>,
        pub l2_addrs: Mutex<Vec<u32>>,
    }

    impl RadioCalls for CallLog {
        fn init_complete(&self, status: Result<(), V2xError>) {
            self.inits.lock().unwrap().push(status);
        }

        fn radio_status(&self, event: V2xEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn chan_measurements(&self, _meas: &ChanMeasurements) {
            *self.measurements.lock().unwrap() += 1;
        }

        fn l2_addr_changed(&self, new_l2_address: u32) {
            self.l2_addrs.lock().unwrap().push(new_l2_address);
        }
    }

    impl CallLog {
        pub fn events(&self) -> Vec<V2xEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn measurements(&self) -> usize {
            *self.measurements.lock().unwrap()
        }
    }

    /// Records SPS flow callbacks
    #[derive(Default)]
    pub struct SpsLog {
        pub offsets: Mutex<Vec<SpsMacDetails>>,
        pub changes: Mutex<Vec<Result<(), ErrorCode>>>,
    }

    impl SpsCalls for SpsLog {
        fn sps_offset_changed(&self, details: &SpsMacDetails) {
            self.offsets.lock().unwrap().push(*details);
        }

        fn reservation_change_complete(&self, result: Result<(), ErrorCode>) {
            self.changes.lock().unwrap().push(result);
        }
    }

    #[derive(Default)]
    pub struct ExtLog(pub Mutex<Vec<RadioStatusEx>>);

    impl ExtStatusListener for ExtLog {
        fn on_ext_status(&self, status: &RadioStatusEx) {
            self.0.lock().unwrap().push(status.clone());
        }
    }

    #[derive(Default)]
    pub struct SlssLog(pub Mutex<Vec<SlssRxInfo>>);

    impl SlssRxListener for SlssLog {
        fn on_slss_rx_info(&self, info: &SlssRxInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[derive(Default)]
    pub struct ReportLog(pub Mutex<Vec<u16>>);

    impl TxReportListener for ReportLog {
        fn on_tx_status_report(&self, report: &TxStatusReport) {
            self.0.lock().unwrap().push(report.port);
        }
    }

    /// Start a backend and initialise a legacy session on it
    pub fn session(config: SimConfig) -> (SimBackend, LegacyRadio, Arc<CallLog>) {
        let sim = SimBackend::new(config).unwrap();
        let radio = LegacyRadio::new(sim.factory());
        let log = Arc::new(CallLog::default());
        radio
            .init_v3(ConcurrencyMode::WwanConcurrent, Some(log.clone()))
            .unwrap();
        (sim, radio, log)
    }

    pub fn reservation(bytes: u32) -> TxBandwidthReservation {
        TxBandwidthReservation {
            v2x_id: 1,
            priority: Priority::Priority3,
            period_interval_ms: 100,
            tx_reservation_size_bytes: bytes,
        }
    }

    /// Poll until `cond` holds or a second has passed
    pub fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }
}

use helpers::*;

// ============================================================================
// Init and Status Tests
// ============================================================================

mod init_tests {
    use super::*;

    #[test]
    fn test_init_reports_active() {
        let (_sim, radio, log) = session(SimConfig::default());

        assert_eq!(*log.inits.lock().unwrap(), vec![Ok(())]);
        assert_eq!(log.events(), vec![V2xEvent::Active]);
        assert_eq!(radio.get_status(), V2xEvent::Active);

        let (event, age_us) = radio.status_poll();
        assert_eq!(event, V2xEvent::Active);
        assert!(age_us < u64::MAX);
    }

    #[test]
    fn test_init_by_iface_name() {
        let sim = SimBackend::new(SimConfig::default()).unwrap();
        let radio = LegacyRadio::new(sim.factory());

        assert_eq!(
            radio.init("wlan0", ConcurrencyMode::WwanConcurrent, None),
            Err(Errno::Perm)
        );
        let handle = radio
            .init("rmnet_data1", ConcurrencyMode::WwanConcurrent, None)
            .unwrap();
        assert_eq!(handle, RadioHandle::NON_IP);
    }

    #[test]
    fn test_init_fails_without_manager() {
        let config = SimConfig::default().with_reply(
            "radio_manager",
            ApiReply {
                refuse: Some(v2x_core::AdmissionError::NotReady),
                ..Default::default()
            },
        );
        let sim = SimBackend::new(config).unwrap();
        let radio = LegacyRadio::new(sim.factory());

        let result = radio.init_v3(ConcurrencyMode::WwanConcurrent, None);
        assert_eq!(result, Err(Errno::Perm));
        assert_eq!(radio.get_status(), V2xEvent::Inactive);
    }

    #[test]
    fn test_status_changes_collapse_to_events() {
        let (sim, _radio, log) = session(SimConfig::default());

        sim.inject("cv2x_status suspended active 3").unwrap();
        sim.inject("cv2x_status suspended active 3").unwrap();
        sim.inject("cv2x_status unknown active").unwrap();
        sim.inject("cv2x_status active active").unwrap();

        assert_eq!(
            log.events(),
            vec![V2xEvent::Active, V2xEvent::RxSuspended, V2xEvent::Active]
        );
    }

    #[test]
    fn test_inactive_status() {
        let (sim, radio, log) = session(SimConfig::default());

        sim.inject("cv2x_status inactive inactive 2 2").unwrap();
        assert_eq!(log.events().last(), Some(&V2xEvent::Inactive));
        assert_eq!(radio.status_poll().0, V2xEvent::Inactive);
    }

    #[test]
    fn test_deinit_releases_radio() {
        let (_sim, radio, _log) = session(SimConfig::default());

        radio.deinit(RadioHandle::IP).unwrap();
        assert_eq!(radio.inject_vehicle_speed(40), Err(V2xError::RadioNotReady));
    }
}

// ============================================================================
// SPS Flow Tests
// ============================================================================

mod sps_flow_tests {
    use super::*;

    #[test]
    fn test_zero_reservation_closes_flow() {
        let (sim, radio, _log) = session(SimConfig::default());

        let (sps, event) = radio
            .tx_sps_sock_create_and_bind(
                RadioHandle::NON_IP,
                &reservation(200),
                Some(Arc::new(SpsLog::default())),
                2500,
                None,
            )
            .unwrap();
        assert!(event.is_none());

        let flow = radio.find_tx_flow(sps.sock).unwrap();
        assert_eq!(flow.flow_id, 0);
        assert_eq!(flow.kind, FlowKind::Sps);
        assert!(sim.server().flows().contains(FlowKind::Sps, 0));

        radio.tx_reservation_change(sps.sock, &reservation(0)).unwrap();
        assert!(radio.find_tx_flow(sps.sock).is_none());
        assert!(!sim.server().flows().contains(FlowKind::Sps, 0));
    }

    #[test]
    fn test_reservation_change_completes_through_callback() {
        let (_sim, radio, _log) = session(SimConfig::default());
        let sps_log = Arc::new(SpsLog::default());

        let (sps, _) = radio
            .tx_sps_sock_create_and_bind(
                RadioHandle::NON_IP,
                &reservation(200),
                Some(sps_log.clone()),
                2500,
                None,
            )
            .unwrap();

        radio.tx_reservation_change(sps.sock, &reservation(400)).unwrap();
        assert!(wait_for(|| !sps_log.changes.lock().unwrap().is_empty()));
        assert_eq!(*sps_log.changes.lock().unwrap(), vec![Ok(())]);
    }

    #[test]
    fn test_reservation_change_on_unknown_socket() {
        let (_sim, radio, _log) = session(SimConfig::default());
        assert_eq!(
            radio.tx_reservation_change(4242, &reservation(200)),
            Err(V2xError::BadParam)
        );
    }

    #[test]
    fn test_reservation_change_on_event_flow() {
        let (_sim, radio, _log) = session(SimConfig::default());
        let info = radio
            .tx_event_sock_create_and_bind("rmnet_data1", 1, 2600)
            .unwrap();
        assert_eq!(
            radio.tx_reservation_change(info.sock, &reservation(200)),
            Err(V2xError::Fail)
        );
    }

    #[test]
    fn test_third_sps_flow_falls_back_to_event() {
        let (_sim, radio, _log) = session(SimConfig::default());

        for port in [2500, 2501] {
            radio
                .tx_sps_sock_create_and_bind(
                    RadioHandle::NON_IP,
                    &reservation(200),
                    None,
                    port,
                    None,
                )
                .unwrap();
        }

        let (third, _) = radio
            .tx_sps_sock_create_and_bind(
                RadioHandle::NON_IP,
                &reservation(200),
                None,
                2502,
                None,
            )
            .unwrap();
        let flow = radio.find_tx_flow(third.sock).unwrap();
        assert_eq!(flow.kind, FlowKind::Event);
        assert!(flow.flow_id >= 2);
        assert_eq!(third.addr.port(), 2502);
    }

    #[test]
    fn test_failed_event_half_closes_sps_half() {
        let config = SimConfig::default().with_reply(
            "create_tx_event_flow",
            ApiReply {
                error: Some(ErrorCode::GenericFailure),
                ..Default::default()
            },
        );
        let (sim, radio, _log) = session(config);

        let result = radio.tx_sps_sock_create_and_bind(
            RadioHandle::NON_IP,
            &reservation(200),
            None,
            2500,
            Some(2600),
        );
        assert_eq!(result, Err(Errno::Perm));
        assert_eq!(sim.server().flows().sps_count(), 0);
    }

    #[test]
    fn test_unsupported_periodicity() {
        let (_sim, radio, _log) = session(SimConfig::default());
        let res = TxBandwidthReservation {
            period_interval_ms: 50,
            ..reservation(200)
        };
        let result = radio.tx_sps_only_create(RadioHandle::NON_IP, &res, None, 2500);
        assert_eq!(result, Err(Errno::Inval));
    }

    #[test]
    fn test_sps_offset_reaches_flow_callbacks() {
        let (sim, radio, _log) = session(SimConfig::default());
        let sps_log = Arc::new(SpsLog::default());

        radio
            .tx_sps_only_create(
                RadioHandle::NON_IP,
                &reservation(200),
                Some(sps_log.clone()),
                2500,
            )
            .unwrap();

        sim.inject("sps_schedule 0 1700000000000 100").unwrap();
        sim.inject("sps_schedule 1 1700000000000 100").unwrap();

        let offsets = sps_log.offsets.lock().unwrap();
        assert_eq!(offsets.len(), 1);
        assert_eq!(offsets[0].periodicity_in_use_ns, 100_000_000);
    }

    #[test]
    fn test_event_flow_change_rejects_sps_flow() {
        let (_sim, radio, _log) = session(SimConfig::default());
        let sock = radio
            .tx_sps_only_create(RadioHandle::NON_IP, &reservation(200), None, 2500)
            .unwrap()
            .sock;
        assert_eq!(
            radio.tx_event_flow_info_change(sock, &TxFlowInfo::default()),
            Err(V2xError::Fail)
        );
    }
}

// ============================================================================
// Socket Tests
// ============================================================================

mod socket_tests {
    use super::*;

    #[test]
    fn test_wildcard_rx_and_close() {
        let (sim, radio, _log) = session(SimConfig::default());

        let rx = radio.rx_sock_create_and_bind(RadioHandle::IP).unwrap();
        assert_eq!(rx.addr.port(), v2x_legacy::RX_WILDCARD_PORT);
        assert!(radio.find_rx_sub(rx.sock).unwrap().is_wildcard());

        let second = radio.rx_sock_create_and_bind_v3(RadioHandle::IP, 9001, Some(&[]));
        assert_eq!(second, Err(Errno::Perm));

        let mut sock = rx.sock;
        radio.sock_close(&mut sock).unwrap();
        assert_eq!(sock, -1);
        assert!(sim.server().rx_subscriptions().is_empty());
        assert_eq!(radio.sock_close(&mut sock), Err(Errno::Inval));
    }

    #[test]
    fn test_rx_with_service_ids() {
        let (_sim, radio, _log) = session(SimConfig::default());

        radio
            .rx_sock_create_and_bind_v3(RadioHandle::NON_IP, 9001, Some(&[1, 2]))
            .unwrap();
        let overlap = radio.rx_sock_create_and_bind_v3(RadioHandle::NON_IP, 9002, Some(&[2]));
        assert_eq!(overlap, Err(Errno::Perm));
        radio
            .rx_sock_create_and_bind_v3(RadioHandle::NON_IP, 9003, Some(&[3]))
            .unwrap();
    }

    #[test]
    fn test_event_flow_by_iface_name() {
        let (_sim, radio, _log) = session(SimConfig::default());

        let info = radio
            .tx_event_sock_create_and_bind("rmnet_data1", 1, 2600)
            .unwrap();
        assert_eq!(radio.find_tx_flow(info.sock).unwrap().kind, FlowKind::Event);
        assert_eq!(
            radio.tx_event_sock_create_and_bind("wlan0", 1, 2601),
            Err(Errno::Inval)
        );
    }

    #[test]
    fn test_rx_failure_rolls_back_tx() {
        let (sim, radio, _log) = session(SimConfig::default());
        radio.rx_sock_create_and_bind(RadioHandle::NON_IP).unwrap();

        let result = radio.sock_create_and_bind(
            RadioHandle::NON_IP,
            None,
            None,
            None,
            Some(2600),
            Some(9001),
            None,
        );
        assert_eq!(result, Err(Errno::Perm));
        assert_eq!(sim.server().flows().event_count(), 0);
    }

    #[test]
    fn test_combined_create() {
        let (_sim, radio, _log) = session(SimConfig::default());
        let info = v2x_legacy::TxSpsFlowInfo {
            reservation: reservation(200),
            flow_info: TxFlowInfo::default(),
        };

        let set = radio
            .sock_create_and_bind(
                RadioHandle::NON_IP,
                Some(&info),
                None,
                Some(2500),
                Some(2600),
                Some(9000),
                None,
            )
            .unwrap();
        assert!(set.tx_sps.is_some());
        assert!(set.tx_event.is_some());
        assert!(set.rx.is_some());
    }

    #[test]
    fn test_flows_need_radio() {
        let sim = SimBackend::new(SimConfig::default()).unwrap();
        let radio = LegacyRadio::new(sim.factory());
        assert_eq!(
            radio.rx_sock_create_and_bind(RadioHandle::IP),
            Err(Errno::Inval)
        );
    }
}

// ============================================================================
// Control Tests
// ============================================================================

mod control_tests {
    use super::*;

    #[test]
    fn test_measurements_toggle() {
        let (sim, radio, log) = session(SimConfig::default());
        let params = ChanMeasParams::default();

        radio.stop_measurements(RadioHandle::IP).unwrap();
        let before = log.measurements();
        sim.inject("cv2x_status active active").unwrap();
        assert_eq!(log.measurements(), before);

        radio.start_measurements(RadioHandle::IP, &params).unwrap();
        sim.inject("cv2x_status active active").unwrap();
        assert_eq!(log.measurements(), before + 1);

        assert_eq!(
            radio.start_measurements(RadioHandle::BAD, &params),
            Err(V2xError::Fail)
        );
    }

    #[test]
    fn test_measurements_need_callbacks() {
        let sim = SimBackend::new(SimConfig::default()).unwrap();
        let radio = LegacyRadio::new(sim.factory());
        radio.init_v3(ConcurrencyMode::WwanConcurrent, None).unwrap();

        assert_eq!(
            radio.start_measurements(RadioHandle::IP, &ChanMeasParams::default()),
            Err(V2xError::Fail)
        );
    }

    #[test]
    fn test_ext_listener_gets_initial_status() {
        let (sim, radio, _log) = session(SimConfig::default());
        let ext = Arc::new(ExtLog::default());

        radio
            .register_ext_radio_status_listener(Some(ext.clone()))
            .unwrap();
        sim.inject("cv2x_status active active").unwrap();
        sim.inject("cv2x_status active active").unwrap();
        assert_eq!(ext.0.lock().unwrap().len(), 1);

        sim.inject("cv2x_status active suspended 1").unwrap();
        assert_eq!(ext.0.lock().unwrap().len(), 2);

        radio.register_ext_radio_status_listener(None).unwrap();
        sim.inject("cv2x_status active active").unwrap();
        assert_eq!(ext.0.lock().unwrap().len(), 2);

        let status = radio.get_ext_radio_status().unwrap();
        assert_eq!(status.tx_pools.len(), 1);
    }

    #[test]
    fn test_slss_listener_lifecycle() {
        let (sim, radio, _log) = session(SimConfig::default());
        let log = Arc::new(SlssLog::default());
        let listener: Arc<dyn SlssRxListener> = log.clone();

        radio.register_slss_rx_listener(listener.clone()).unwrap();
        sim.inject("slss_rx_info 7 1 0 50 1").unwrap();
        assert_eq!(log.0.lock().unwrap()[0].ue_info[0].slss_id, 7);

        radio.deregister_slss_rx_listener(&listener).unwrap();
        sim.inject("slss_rx_info 8 1 0 50 1").unwrap();
        assert_eq!(log.0.lock().unwrap().len(), 1);
        assert_eq!(
            radio.deregister_slss_rx_listener(&listener),
            Err(V2xError::Fail)
        );

        let info = radio.get_slss_rx_info().unwrap();
        assert_eq!(info.ue_info[0].slss_id, 8);
    }

    #[test]
    fn test_tx_report_listener() {
        let (sim, radio, _log) = session(SimConfig::default());
        let log = Arc::new(ReportLog::default());

        radio
            .register_tx_status_report_listener(2500, log.clone())
            .unwrap();
        sim.inject("tx_report 2500").unwrap();
        radio.deregister_tx_status_report_listener(2500).unwrap();
        sim.inject("tx_report 2500").unwrap();

        assert_eq!(*log.0.lock().unwrap(), vec![2500]);
    }

    #[test]
    fn test_l2_filters() {
        let (_sim, radio, _log) = session(SimConfig::default());

        assert_eq!(radio.set_l2_filters(&[]), Err(V2xError::Fail));
        let filter = L2FilterInfo {
            src_l2_id: 0x1234,
            duration_ms: 1000,
            pppp: 3,
        };
        radio.set_l2_filters(&[filter]).unwrap();
        radio.remove_l2_filters(&[0x1234]).unwrap();
        assert_eq!(radio.remove_l2_filters(&[]), Err(V2xError::Fail));
    }

    #[test]
    fn test_l2_update_and_trusted_list() {
        let (sim, radio, log) = session(SimConfig::default());

        radio.trigger_l2_update(RadioHandle::IP).unwrap();
        sim.inject("src_l2_id").unwrap();
        assert!(!log.l2_addrs.lock().unwrap().is_empty());

        let malicious: Vec<u32> = (0..60).collect();
        radio
            .update_trusted_ue_list(&malicious, &[TrustedUeInfo::default()])
            .unwrap();
    }

    #[test]
    fn test_injections_and_power() {
        let (_sim, radio, _log) = session(SimConfig::default());

        radio.set_peak_tx_power(20).unwrap();
        radio.inject_coarse_utc_time(1_700_000_000_000).unwrap();
        radio.inject_vehicle_speed(50).unwrap();
        radio
            .set_global_ipaddr(64, "2001:db8::1".parse().unwrap())
            .unwrap();
        radio.set_ip_routing_info([0, 1, 2, 3, 4, 5]).unwrap();
    }

    #[test]
    fn test_radio_operations_before_init() {
        let sim = SimBackend::new(SimConfig::default()).unwrap();
        let radio = LegacyRadio::new(sim.factory());

        assert_eq!(radio.inject_vehicle_speed(50), Err(V2xError::RadioNotReady));
        assert_eq!(
            radio.set_ip_routing_info([0; 6]),
            Err(V2xError::RadioNotReady)
        );
        assert_eq!(radio.trigger_l2_update(RadioHandle::IP), Err(Errno::Inval));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;
    use v2x_legacy::{convert_priority_to_traffic_class, convert_traffic_class_to_priority};

    proptest! {
        #[test]
        fn prop_traffic_class_round_trip(index in 0u8..Priority::LEVELS) {
            let priority = Priority::from_index(index).unwrap();
            let class = convert_priority_to_traffic_class(priority);
            prop_assert_eq!(convert_traffic_class_to_priority(class), priority);
        }

        #[test]
        fn prop_unknown_traffic_class_is_default(class in 9u16..) {
            prop_assert_eq!(convert_traffic_class_to_priority(class), Priority::Priority2);
        }
    }
}
