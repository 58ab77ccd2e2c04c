mod config;
mod sink;
mod timer;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use coffee_api::AppState;
use coffee_db::Database;
use coffee_engine::{Coordinator, CoordinatorConfig, MatchingOrchestrator, SqliteMatchStore, run_control_loop};
use coffee_scheduler::{DeliverySink, ReminderQueue, ReminderScheduler, run_delivery_worker};
use coffee_types::{Clock, SystemClock};

use crate::config::Config;
use crate::sink::{LogSink, WebhookSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "coffee_server=debug,coffee_engine=debug,coffee_scheduler=debug,coffee_db=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(SqliteMatchStore::open(db.clone(), clock.clone())?);

    // Fired reminders -> delivery worker -> transport
    let sink: Arc<dyn DeliverySink> = match &config.delivery_url {
        Some(url) => {
            info!("Delivering reminders to {}", url);
            Arc::new(WebhookSink::new(
                url.clone(),
                config.delivery_retries,
                config.delivery_retry_delay,
            ))
        }
        None => {
            warn!("COFFEE_DELIVERY_URL is not set, reminders will only be logged");
            Arc::new(LogSink)
        }
    };
    let (handoff_tx, handoff_rx) = mpsc::channel(config.delivery_queue);
    let delivery = tokio::spawn(run_delivery_worker(
        handoff_rx,
        sink,
        db.clone(),
        config.delivery_timeout,
    ));

    let (scheduler, dispatcher) =
        ReminderScheduler::start(db.clone(), clock.clone(), handoff_tx, config.reminder_grace);
    scheduler.recover()?;
    let queue: Arc<dyn ReminderQueue> = Arc::new(scheduler);

    let orchestrator = MatchingOrchestrator::new(db.clone(), store.clone(), queue.clone());
    let coordinator = Coordinator::new(
        db.clone(),
        store.clone(),
        queue,
        orchestrator,
        clock.clone(),
        CoordinatorConfig {
            admin_handle: config.admin_handle.clone(),
            notify_before: config.notify_before,
        },
    );

    // Conversation events and matching rounds share one thread
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let control = tokio::task::spawn_blocking(move || run_control_loop(coordinator, control_rx));
    let match_timer = tokio::spawn(timer::run_match_timer(
        control_tx.clone(),
        clock,
        config.match_weekday,
        config.announce_after,
    ));

    let app = coffee_api::router(AppState {
        control: control_tx,
        matches: store,
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Coffee match server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router is gone; stopping the timer drops the last control sender.
    match_timer.abort();
    let _ = match_timer.await;
    control.await?;

    // Armed reminders stay on disk and are recovered on the next start.
    dispatcher.abort();
    let _ = dispatcher.await;
    delivery.await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
