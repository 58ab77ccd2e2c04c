use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use coffee_db::Database;
use coffee_types::{ChatAddress, Reminder};

/// Outbound message transport for fired reminders.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, destination: ChatAddress, body: &str) -> anyhow::Result<()>;
}

/// Drain the delivery queue until every sender is gone.
///
/// A reminder row is deleted only after the sink accepts it. A failed or
/// slow send is logged, the row stays for the next recovery and the worker
/// moves on to the next reminder.
pub async fn run_delivery_worker(
    mut rx: mpsc::Receiver<Reminder>,
    sink: Arc<dyn DeliverySink>,
    db: Arc<Database>,
    timeout: Duration,
) {
    while let Some(reminder) = rx.recv().await {
        match tokio::time::timeout(timeout, sink.deliver(reminder.destination, &reminder.body)).await {
            Ok(Ok(())) => {
                info!("Delivered reminder {} to {}", reminder.id, reminder.destination);
                if let Err(e) = db.delete_reminder(reminder.id) {
                    warn!("Failed to prune delivered reminder {}: {}", reminder.id, e);
                }
            }
            Ok(Err(e)) => error!(
                "Delivery of reminder {} to {} failed: {}",
                reminder.id, reminder.destination, e
            ),
            Err(_) => warn!(
                "Delivery of reminder {} to {} timed out after {:?}",
                reminder.id, reminder.destination, timeout
            ),
        }
    }
    info!("Delivery queue closed, worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(ChatAddress, String)>>,
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn deliver(&self, destination: ChatAddress, body: &str) -> anyhow::Result<()> {
            if body == "boom" {
                anyhow::bail!("transport down");
            }
            if body == "hang" {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.sent.lock().unwrap().push((destination, body.to_string()));
            Ok(())
        }
    }

    /// Persist a reminder the way the scheduler does and return it.
    fn reminder(db: &Database, destination: ChatAddress, body: &str) -> Reminder {
        let id = db.insert_reminder(1_600_000_000, destination, body).unwrap();
        Reminder {
            id,
            fire_at: 1_600_000_000,
            destination,
            body: body.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failures_and_timeouts_do_not_stop_the_worker() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(8);
        let worker = tokio::spawn(run_delivery_worker(rx, sink.clone(), db.clone(), Duration::from_secs(5)));

        tx.send(reminder(&db, 101, "boom")).await.unwrap();
        tx.send(reminder(&db, 102, "hang")).await.unwrap();
        tx.send(reminder(&db, 103, "see you at noon")).await.unwrap();
        drop(tx);

        worker.await.unwrap();
        let sent = sink.sent.lock().unwrap();
        assert_eq!(*sent, vec![(103, "see you at noon".to_string())]);

        // Undelivered rows stay for the next recovery.
        let mut left: Vec<String> = db.pending_reminders().unwrap().into_iter().map(|r| r.body).collect();
        left.sort();
        assert_eq!(left, vec!["boom", "hang"]);
    }
}
