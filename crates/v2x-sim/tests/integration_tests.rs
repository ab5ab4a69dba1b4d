//! Integration tests for the simulated backend
//!
//! These tests drive the backend through the `v2x-core` traits and verify:
//! - Flow id allocation across the SPS and event pools
//! - Rx subscription conflict policy
//! - Server state reacting to injected status changes
//! - Canned replies and event injection

use std::sync::{Arc, Mutex};

use v2x_core::{
    coordinator, promise, Cv2xListener, Cv2xStatusEx, Cv2xStatusType, ErrorCode, EventFlowInfo,
    FlowKind, Radio, RadioError, RadioListener, RadioManager, RxSubscription, ServiceStatus,
    SpsFlowInfo, SpsSchedulingInfo, TrafficCategory, TrafficIpType, TxFlow, TxStatusReport,
    TxStatusReportListener,
};
use v2x_sim::{ApiReply, FlowRegistry, FlowRequest, RxSubscriptionRegistry, SimBackend, SimConfig};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Start a backend and wait for a ready safety radio
    pub fn session(config: SimConfig) -> (SimBackend, Arc<dyn RadioManager>, Arc<dyn Radio>) {
        let sim = SimBackend::new(config).unwrap();
        let (status, pending) = promise();
        let manager = sim.factory().radio_manager(status).unwrap();
        assert_eq!(pending.wait().unwrap(), ServiceStatus::Available);

        let (init, pending) = promise();
        let radio = manager.get_radio(TrafficCategory::Safety, init).unwrap();
        assert_eq!(pending.wait().unwrap(), ServiceStatus::Available);
        (sim, manager, radio)
    }

    pub fn subscribe(
        radio: &Arc<dyn Radio>,
        ip_type: TrafficIpType,
        port: u16,
        ids: Option<Vec<u32>>,
    ) -> Result<RxSubscription, RadioError> {
        coordinator::call("rx", |reply| {
            radio.create_rx_subscription(ip_type, port, ids, reply)
        })
    }

    pub fn event_flow(radio: &Arc<dyn Radio>, port: u16) -> Result<TxFlow, RadioError> {
        coordinator::call("event", |reply| {
            radio.create_tx_event_flow(
                TrafficIpType::NonIp,
                1,
                EventFlowInfo::default(),
                port,
                reply,
            )
        })
    }

    /// Records every status the manager reports
    #[derive(Default)]
    pub struct StatusLog(pub Mutex<Vec<Cv2xStatusEx>>);

    impl Cv2xListener for StatusLog {
        fn on_status_changed(&self, status: &Cv2xStatusEx) {
            self.0.lock().unwrap().push(status.clone());
        }
    }

    /// Records SPS scheduling changes
    #[derive(Default)]
    pub struct SpsLog(pub Mutex<Vec<SpsSchedulingInfo>>);

    impl RadioListener for SpsLog {
        fn on_sps_scheduling_changed(&self, info: &SpsSchedulingInfo) {
            self.0.lock().unwrap().push(*info);
        }
    }

    #[derive(Default)]
    pub struct ReportLog(pub Mutex<Vec<u16>>);

    impl TxStatusReportListener for ReportLog {
        fn on_tx_status_report(&self, report: &TxStatusReport) {
            self.0.lock().unwrap().push(report.port);
        }
    }
}

use helpers::*;

// ============================================================================
// Rx Subscription Tests
// ============================================================================

mod rx_subscription_tests {
    use super::*;

    #[test]
    fn test_second_wildcard_rejected() {
        let (sim, _manager, radio) = session(SimConfig::default());

        let first = subscribe(&radio, TrafficIpType::Ip, 5000, None).unwrap();
        assert_eq!(first.port(), 5000);

        let second = subscribe(&radio, TrafficIpType::Ip, 5001, None);
        assert_eq!(
            second,
            Err(RadioError::Backend(ErrorCode::SrvIdL2AddrsNotCompatible))
        );
        assert!(sim.server().rx_subscriptions().contains(TrafficIpType::Ip, 5000));
        assert_eq!(sim.server().rx_subscriptions().len(), 1);
    }

    #[test]
    fn test_overlapping_ids_by_ip_type() {
        let (_sim, _manager, radio) = session(SimConfig::default());

        subscribe(&radio, TrafficIpType::NonIp, 6000, Some(vec![1, 2, 3])).unwrap();
        let overlap = subscribe(&radio, TrafficIpType::NonIp, 6001, Some(vec![3, 4]));
        assert_eq!(
            overlap,
            Err(RadioError::Backend(ErrorCode::SrvIdL2AddrsNotCompatible))
        );

        subscribe(&radio, TrafficIpType::Ip, 6001, Some(vec![3, 4])).unwrap();
        subscribe(&radio, TrafficIpType::NonIp, 6002, Some(vec![4, 5])).unwrap();
    }

    #[test]
    fn test_close_then_resubscribe() {
        let (_sim, _manager, radio) = session(SimConfig::default());

        let sub = subscribe(&radio, TrafficIpType::Ip, 5000, None).unwrap();
        coordinator::call("close", |reply| radio.close_rx_subscription(&sub, reply)).unwrap();
        subscribe(&radio, TrafficIpType::Ip, 5001, None).unwrap();

        let again = coordinator::call("close", |reply| radio.close_rx_subscription(&sub, reply));
        assert_eq!(again, Err(RadioError::Backend(ErrorCode::NoSuchElement)));
    }
}

// ============================================================================
// Tx Flow Tests
// ============================================================================

mod tx_flow_tests {
    use super::*;

    fn sps_flow(radio: &Arc<dyn Radio>, port: u16) -> Result<TxFlow, ErrorCode> {
        let pair = coordinator::request("sps", |done| {
            radio.create_tx_sps_flow(
                TrafficIpType::NonIp,
                1,
                SpsFlowInfo::default(),
                port,
                None,
                EventFlowInfo::default(),
                done,
            )
        })
        .unwrap();
        assert!(pair.event.is_none());
        pair.sps
    }

    #[test]
    fn test_sps_pool_exhaustion() {
        let (_sim, _manager, radio) = session(SimConfig::default());

        assert_eq!(sps_flow(&radio, 2500).unwrap().flow_id, 0);
        assert_eq!(sps_flow(&radio, 2501).unwrap().flow_id, 1);
        assert_eq!(sps_flow(&radio, 2502), Err(ErrorCode::ExceedMax));
    }

    #[test]
    fn test_sps_pair_with_event_settings() {
        let (_sim, _manager, radio) = session(SimConfig::default());
        let event = EventFlowInfo {
            auto_retrans_enabled: Some(true),
            peak_tx_power: Some(20),
            mcs_index: Some(5),
            tx_pool_id: Some(1),
            is_unicast: true,
        };

        let pair = coordinator::request("sps", |done| {
            radio.create_tx_sps_flow(
                TrafficIpType::NonIp,
                1,
                SpsFlowInfo::default(),
                2500,
                Some(2600),
                event,
                done,
            )
        })
        .unwrap();
        assert_eq!(pair.sps.unwrap().port(), 2500);
        let event_half = pair.event.unwrap().unwrap();
        assert_eq!(event_half.port(), 2600);
        assert_eq!(event_half.kind, FlowKind::Event);
    }

    #[test]
    fn test_tx_loss_frees_flow_ids() {
        let (sim, _manager, radio) = session(SimConfig::default());

        sps_flow(&radio, 2500).unwrap();
        event_flow(&radio, 2600).unwrap();
        assert_eq!(event_flow(&radio, 2601).unwrap().flow_id, 3);

        sim.inject("cv2x_status active inactive 2").unwrap();
        assert!(sim.server().flows().ids().is_empty());

        sim.inject("cv2x_status active active").unwrap();
        assert_eq!(sps_flow(&radio, 2500).unwrap().flow_id, 0);
        assert_eq!(event_flow(&radio, 2600).unwrap().flow_id, 2);
    }

    #[test]
    fn test_change_info_on_closed_flow() {
        let (_sim, _manager, radio) = session(SimConfig::default());

        let flow = sps_flow(&radio, 2500).unwrap();
        coordinator::call("change", |reply| {
            radio.change_sps_flow_info(&flow, SpsFlowInfo::default(), reply)
        })
        .unwrap();

        coordinator::call("close", |reply| radio.close_tx_flow(&flow, reply)).unwrap();
        let changed = coordinator::call("change", |reply| {
            radio.change_sps_flow_info(&flow, SpsFlowInfo::default(), reply)
        });
        assert_eq!(changed, Err(RadioError::Backend(ErrorCode::NoSuchElement)));
    }

    #[test]
    fn test_flow_sockets_bind_to_iface_address() {
        let (_sim, _manager, radio) = session(SimConfig::default());
        let flow = event_flow(&radio, 2600).unwrap();
        assert_eq!(flow.kind, FlowKind::Event);
        assert_eq!(flow.addr.ip().segments()[0], 0xfe80);
        assert_eq!(flow.port(), 2600);
    }
}

// ============================================================================
// Canned Reply Tests
// ============================================================================

mod canned_reply_tests {
    use super::*;
    use v2x_core::AdmissionError;

    #[test]
    fn test_refused_admission_never_completes() {
        let config = SimConfig::default().with_reply(
            "request_capabilities",
            ApiReply {
                refuse: Some(AdmissionError::NotAllowed),
                ..Default::default()
            },
        );
        let (_sim, _manager, radio) = session(config);

        let caps = coordinator::call("caps", |reply| radio.request_capabilities(reply));
        assert_eq!(caps, Err(RadioError::Admission(AdmissionError::NotAllowed)));
    }

    #[test]
    fn test_manager_refused() {
        let config = SimConfig::default().with_reply(
            "radio_manager",
            ApiReply {
                refuse: Some(AdmissionError::NotReady),
                ..Default::default()
            },
        );
        let sim = SimBackend::new(config).unwrap();
        let (status, pending) = promise();
        assert!(sim.factory().radio_manager(status).is_none());
        assert!(pending.wait().is_err());
    }

    #[test]
    fn test_start_stop_round() {
        let (sim, manager, _radio) = session(SimConfig::default());

        coordinator::call("stop", |reply| manager.stop_cv2x(reply)).unwrap();
        assert_eq!(sim.server().status().tx_status, Cv2xStatusType::Inactive);

        coordinator::call("start", |reply| manager.start_cv2x(reply)).unwrap();
        let status = coordinator::call("status", |reply| manager.request_cv2x_status(reply))
            .unwrap();
        assert_eq!(status.status.rx_status, Cv2xStatusType::Active);
        assert_eq!(status.pool_status.len(), 1);
    }
}

// ============================================================================
// Event Injection Tests
// ============================================================================

mod injection_tests {
    use super::*;

    #[test]
    fn test_status_reaches_manager_listeners() {
        let (sim, manager, _radio) = session(SimConfig::default());
        let log = Arc::new(StatusLog::default());
        manager.register_listener(log.clone()).unwrap();

        sim.inject("cv2x_status suspended active 3").unwrap();
        sim.inject("cv2x_status unknown active").unwrap();

        let seen = log.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].status.rx_status, Cv2xStatusType::Suspended);
        assert_eq!(seen[1].status.rx_status, Cv2xStatusType::Unknown);
    }

    #[test]
    fn test_sps_schedule_reaches_radio_listeners() {
        let (sim, _manager, radio) = session(SimConfig::default());
        let log = Arc::new(SpsLog::default());
        radio.register_listener(log.clone()).unwrap();

        sim.inject("sps_schedule 1 1700000000000 100").unwrap();
        let seen = log.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].periodicity, 100);
    }

    #[test]
    fn test_tx_report_only_on_enabled_port() {
        let (sim, _manager, radio) = session(SimConfig::default());
        let log = Arc::new(ReportLog::default());

        coordinator::call("enable", |reply| {
            radio.register_tx_status_report_listener(2500, log.clone(), reply)
        })
        .unwrap();
        sim.inject("tx_report 2500").unwrap();
        sim.inject("tx_report 2501").unwrap();

        coordinator::call("disable", |reply| {
            radio.deregister_tx_status_report_listener(2500, reply)
        })
        .unwrap();
        sim.inject("tx_report 2500").unwrap();

        assert_eq!(*log.0.lock().unwrap(), vec![2500]);
    }

    #[test]
    fn test_failed_tx_report_enable_leaves_port_disabled() {
        let config = SimConfig::default().with_reply(
            "enable_tx_status_report",
            ApiReply {
                error: Some(ErrorCode::ModemErr),
                ..Default::default()
            },
        );
        let (sim, _manager, radio) = session(config);
        let log = Arc::new(ReportLog::default());

        let enable = |log: &Arc<ReportLog>| {
            coordinator::call("enable", |reply| {
                radio.register_tx_status_report_listener(2500, log.clone(), reply)
            })
        };
        assert_eq!(enable(&log), Err(RadioError::Backend(ErrorCode::ModemErr)));
        assert!(!sim.server().tx_reports().is_enabled(2500));

        sim.inject("tx_report 2500").unwrap();
        assert!(log.0.lock().unwrap().is_empty());

        assert_eq!(enable(&log), Err(RadioError::Backend(ErrorCode::ModemErr)));
    }

    #[test]
    fn test_failed_tx_report_disable_keeps_listener() {
        let config = SimConfig::default().with_reply(
            "disable_tx_status_report",
            ApiReply {
                error: Some(ErrorCode::ModemErr),
                ..Default::default()
            },
        );
        let (sim, _manager, radio) = session(config);
        let log = Arc::new(ReportLog::default());

        coordinator::call("enable", |reply| {
            radio.register_tx_status_report_listener(2500, log.clone(), reply)
        })
        .unwrap();
        let disabled = coordinator::call("disable", |reply| {
            radio.deregister_tx_status_report_listener(2500, reply)
        });
        assert_eq!(disabled, Err(RadioError::Backend(ErrorCode::ModemErr)));
        assert!(sim.server().tx_reports().is_enabled(2500));

        sim.inject("tx_report 2500").unwrap();
        assert_eq!(*log.0.lock().unwrap(), vec![2500]);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[derive(Debug, Clone)]
    enum Op {
        Sps(u16),
        Event(u16),
        Close(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1024u16..4096).prop_map(Op::Sps),
            (1024u16..4096).prop_map(Op::Event),
            (0usize..16).prop_map(Op::Close),
        ]
    }

    fn ip_type_strategy() -> impl Strategy<Value = TrafficIpType> {
        prop_oneof![Just(TrafficIpType::Ip), Just(TrafficIpType::NonIp)]
    }

    proptest! {
        #[test]
        fn prop_flow_ids_disjoint(ops in prop::collection::vec(op_strategy(), 0..64)) {
            let registry = FlowRegistry::new(2, 2, 4);
            let mut live: Vec<FlowRequest> = Vec::new();

            for op in ops {
                match op {
                    Op::Sps(port) => {
                        let req = FlowRequest::sps(TrafficIpType::NonIp, 1, port);
                        if let Ok(id) = registry.register(&req) {
                            prop_assert!(id < 2);
                            live.push(req.with_id(id));
                        }
                    }
                    Op::Event(port) => {
                        let req = FlowRequest::event(TrafficIpType::NonIp, 1, port);
                        if let Ok(id) = registry.register(&req) {
                            prop_assert!((2..6).contains(&id));
                            live.push(req.with_id(id));
                        }
                    }
                    Op::Close(i) if !live.is_empty() => {
                        let req = live.remove(i % live.len());
                        prop_assert!(registry.deregister(&req).is_ok());
                    }
                    Op::Close(_) => {}
                }

                let ids: HashSet<u32> = live.iter().map(|r| r.flow_id).collect();
                prop_assert_eq!(ids.len(), live.len());
            }
        }

        #[test]
        fn prop_single_wildcard_per_ip_type(
            requests in prop::collection::vec((ip_type_strategy(), 1024u16..1100), 1..24)
        ) {
            let registry = RxSubscriptionRegistry::new();
            for (ip_type, port) in requests {
                let before = registry.len();
                let had_wildcard = registry.wildcard_count(ip_type) > 0;
                let result = registry.add(ip_type, port, None);
                if had_wildcard {
                    prop_assert_eq!(result, Err(ErrorCode::SrvIdL2AddrsNotCompatible));
                    prop_assert_eq!(registry.len(), before);
                }
                prop_assert!(registry.wildcard_count(ip_type) <= 1);
            }
        }
    }
}
