//! Simulation event actor task
//!
//! The task owns the delivery of injected events. It runs a select! loop
//! that:
//! - applies events received on the command channel to the radio server
//! - re-sends the current status on a fixed interval, when configured
//! - stops on a shutdown command or when every sender is gone

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use v2x_core::Responder;

use crate::event::SimEvent;
use crate::server::RadioServer;

/// Commands accepted by the event task
#[derive(Debug)]
pub enum SimCommand {
    /// Apply an event, then fire `done`
    Inject {
        event: SimEvent,
        done: Responder<()>,
    },
    /// Stop the task
    Shutdown,
}

/// Run the event task until shutdown
pub async fn run_event_task(
    server: Arc<RadioServer>,
    mut cmd_rx: mpsc::UnboundedReceiver<SimCommand>,
) {
    let period = server.config().status_interval_ms;
    let periodic = period > 0;
    let mut status_timer = interval(Duration::from_millis(period.max(1)));
    status_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Starting simulation event task");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SimCommand::Inject { event, done }) => {
                        server.apply(&event);
                        let _ = done.respond(());
                    }
                    Some(SimCommand::Shutdown) => {
                        info!("Shutdown requested for simulation event task");
                        break;
                    }
                    None => {
                        debug!("Command channel closed for simulation event task");
                        break;
                    }
                }
            }

            _ = status_timer.tick(), if periodic => {
                server.report_status();
            }
        }
    }

    info!("Simulation event task ended");
}
