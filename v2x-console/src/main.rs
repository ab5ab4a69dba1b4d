//! Interactive console for the simulated C-V2X radio
//!
//! Starts the simulated backend, opens a legacy session on it and prints
//! every callback. Commands on stdin create and close flows; any other
//! line is injected into the simulator as an event.

mod command;
mod settings;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use v2x_core::{
    ChanMeasurements, ConcurrencyMode, ErrorCode, Priority, ServiceStatus, TxStatusReport,
    V2xEvent,
};
use v2x_legacy::{
    IfaceCapabilities, LegacyRadio, RadioCalls, RadioHandle, RadioStatusEx, SpsCalls,
    SpsMacDetails, TxBandwidthReservation, TxReportListener, V2xError,
};
use v2x_sim::SimBackend;

use command::{Command, HELP};

/// Prints every callback the session delivers
struct Printer;

impl RadioCalls for Printer {
    fn init_complete(&self, status: Result<(), V2xError>) {
        println!("< init complete: {:?}", status);
    }

    fn radio_status(&self, event: V2xEvent) {
        println!("< radio status: {}", event);
    }

    fn chan_measurements(&self, meas: &ChanMeasurements) {
        println!(
            "< measurements: CBP {:.1}%, time uncertainty {:.1} ms",
            meas.channel_busy_percentage, meas.time_uncertainty
        );
    }

    fn l2_addr_changed(&self, new_l2_address: u32) {
        println!("< L2 address: {:06X}", new_l2_address);
    }

    fn capabilities_changed(&self, caps: &IfaceCapabilities) {
        println!("< capabilities: {} Tx pools", caps.tx_pool_ids_supported.len());
    }

    fn service_status(&self, status: ServiceStatus) {
        println!("< service status: {:?}", status);
    }
}

impl SpsCalls for Printer {
    fn sps_offset_changed(&self, details: &SpsMacDetails) {
        println!(
            "< SPS offset: period {} ns, next grant {} ns",
            details.periodicity_in_use_ns, details.utc_time_ns
        );
    }

    fn reservation_change_complete(&self, result: Result<(), ErrorCode>) {
        println!("< reservation change: {:?}", result);
    }
}

impl v2x_legacy::ExtStatusListener for Printer {
    fn on_ext_status(&self, status: &RadioStatusEx) {
        println!(
            "< ext status: tx {:?}/{:?}, rx {:?}/{:?}, {} Tx pools",
            status.tx_status.status,
            status.tx_status.cause,
            status.rx_status.status,
            status.rx_status.cause,
            status.tx_pools.len()
        );
    }
}

impl TxReportListener for Printer {
    fn on_tx_status_report(&self, report: &TxStatusReport) {
        println!("< tx report on port {}", report.port);
    }
}

fn run(radio: &LegacyRadio, sim: &SimBackend, printer: &Arc<Printer>, command: Command) -> bool {
    let handle = RadioHandle::NON_IP;
    match command {
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
        Command::Status => println!("status: {}", radio.get_status()),
        Command::Caps => match radio.query_capabilities() {
            Ok(caps) => println!("{:#?}", caps),
            Err(e) => println!("error: {}", e),
        },
        Command::Sps {
            port,
            bytes,
            event_port,
        } => {
            let res = TxBandwidthReservation {
                v2x_id: 1,
                priority: Priority::Priority2,
                period_interval_ms: 100,
                tx_reservation_size_bytes: bytes,
            };
            let calls: Arc<dyn SpsCalls> = printer.clone();
            match radio.tx_sps_sock_create_and_bind(handle, &res, Some(calls), port, event_port)
            {
                Ok((sps, event)) => {
                    println!("sps socket {} on {}", sps.sock, sps.addr);
                    if let Some(event) = event {
                        println!("event socket {} on {}", event.sock, event.addr);
                    }
                    let listener: Arc<dyn TxReportListener> = printer.clone();
                    if let Err(e) = radio.register_tx_status_report_listener(port, listener) {
                        println!("tx reports on port {} unavailable: {}", port, e);
                    }
                }
                Err(e) => println!("error: {}", e),
            }
        }
        Command::Event { port } => {
            match radio.tx_event_sock_create_and_bind_v3(
                v2x_core::TrafficIpType::NonIp,
                1,
                port,
                &Default::default(),
            ) {
                Ok(info) => println!("event socket {} on {}", info.sock, info.addr),
                Err(e) => println!("error: {}", e),
            }
        }
        Command::Rx { port, ids } => {
            match radio.rx_sock_create_and_bind_v3(handle, port, Some(ids.as_slice())) {
                Ok(info) => println!("rx socket {} on {}", info.sock, info.addr),
                Err(e) => println!("error: {}", e),
            }
        }
        Command::Reserve { sock, bytes } => {
            let res = TxBandwidthReservation {
                v2x_id: 1,
                priority: Priority::Priority2,
                period_interval_ms: 100,
                tx_reservation_size_bytes: bytes,
            };
            if let Err(e) = radio.tx_reservation_change(sock, &res) {
                println!("error: {}", e);
            }
        }
        Command::Close { sock } => {
            let port = radio.find_tx_flow(sock).map(|flow| flow.port());
            let mut sock = sock;
            match radio.sock_close(&mut sock) {
                Ok(()) => {
                    println!("closed");
                    if let Some(port) = port {
                        let _ = radio.deregister_tx_status_report_listener(port);
                    }
                }
                Err(e) => println!("error: {}", e),
            }
        }
        Command::Inject(line) => {
            if let Err(e) = sim.inject(&line) {
                println!("error: {}", e);
            }
        }
    }
    true
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "v2x_console=info,v2x_core=info,v2x_sim=info,v2x_legacy=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting V2X simulation console");

    let path = settings::config_path();
    let config = settings::load_config(path.as_deref()).context("loading simulation config")?;
    let mut sim = SimBackend::new(config).context("starting simulated backend")?;

    let radio = LegacyRadio::new(sim.factory());
    let printer = Arc::new(Printer);
    let (ip, non_ip) = radio
        .init_v3(ConcurrencyMode::WwanConcurrent, Some(printer.clone()))
        .map_err(|e| anyhow::anyhow!("radio init failed: {}", e))?;
    println!("handles: IP {}, non-IP {}", ip.0, non_ip.0);
    println!("mode: {:?}", radio.mode());

    if let Err(e) = radio.register_ext_radio_status_listener(Some(printer.clone())) {
        tracing::warn!("Extended status listener unavailable: {}", e);
    }
    println!("{}", HELP);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        match Command::parse(&line?) {
            Ok(None) => {}
            Ok(Some(command)) => {
                if !run(&radio, &sim, &printer, command) {
                    break;
                }
            }
            Err(e) => println!("error: {}", e),
        }
    }

    if let Err(e) = radio.deinit(non_ip) {
        tracing::warn!("deinit failed: {}", e);
    }
    sim.shutdown();
    Ok(())
}
