use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use coffee_types::{InboundMessage, Reply};

use crate::coordinator::Coordinator;

/// Work for the control thread.
#[derive(Debug)]
pub enum ControlEvent {
    Inbound {
        message: InboundMessage,
        respond: oneshot::Sender<Vec<Reply>>,
    },
    MatchingRound {
        reminder_time: DateTime<Utc>,
    },
}

/// Process control events one at a time until every sender is dropped.
///
/// Blocks the calling thread; run it under `spawn_blocking` or on a
/// dedicated thread.
pub fn run_control_loop(mut coordinator: Coordinator, mut rx: mpsc::UnboundedReceiver<ControlEvent>) {
    info!("Control loop started");

    while let Some(event) = rx.blocking_recv() {
        match event {
            ControlEvent::Inbound { message, respond } => {
                let replies = coordinator.respond(&message);
                if respond.send(replies).is_err() {
                    debug!("Caller for member {} left before the replies were ready", message.member_id);
                }
            }
            ControlEvent::MatchingRound { reminder_time } => {
                match coordinator.run_matching_round(reminder_time) {
                    Ok(summary) => info!(
                        "Scheduled round finished: cycle {}, {} pairs",
                        summary.cycle,
                        summary.pairs.len()
                    ),
                    Err(e) => error!("Scheduled matching round failed: {}", e),
                }
            }
        }
    }

    info!("Control channel closed, control loop stopping");
}
