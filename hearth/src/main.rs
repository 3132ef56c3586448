use std::time::Duration;

use hearth::bus::Bus;
use hearth::config::Config;
use hearth::hub::Hub;
use hearth::pipeline::Pipeline;
use hearth::state::AppState;
use hearth::{http, tcp_server};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LIVE_LOGS_TOPIC: &str = "live_logs";
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    info!(redis_url = %config.redis_url, "connecting to bus");
    let bus = match Bus::connect(&config.redis_url, LIVE_LOGS_TOPIC).await {
        Ok(bus) => bus,
        Err(err) => {
            error!(%err, "failed to connect to bus, exiting");
            std::process::exit(1);
        }
    };

    let (hub, hub_actor) = Hub::new();
    hub_actor.run();
    spawn_bus_forwarder(bus.clone(), hub.clone());

    let (pipeline, worker) = Pipeline::new(bus);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline_handle = worker.start(shutdown_rx.clone());

    let tcp_addr = match config.tcp_addr().parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(%err, "invalid TCP_PORT");
            std::process::exit(1);
        }
    };
    let tcp_pipeline = pipeline.clone();
    let tcp_shutdown = shutdown_rx.clone();
    let tcp_task = tokio::spawn(async move {
        if let Err(err) = tcp_server::run(tcp_addr, tcp_pipeline, tcp_shutdown).await {
            error!(%err, "tcp listener failed, exiting");
            std::process::exit(1);
        }
    });

    let state = AppState::new(hub, pipeline);
    let router = http::build_router(state);
    let http_listener = match tokio::net::TcpListener::bind(&config.http_addr()).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, "failed to bind http listener, exiting");
            std::process::exit(1);
        }
    };
    info!(addr = %config.http_addr(), "http listening");

    let mut http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, router)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await
    });

    wait_for_signal().await;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(SHUTDOWN_WAIT, http_task).await.is_err() {
        error!("http shutdown exceeded grace period");
    }
    if tokio::time::timeout(SHUTDOWN_WAIT, tcp_task).await.is_err() {
        error!("tcp shutdown exceeded grace period");
    }
    let _ = pipeline_handle.await;

    info!("shutdown complete");
}

/// Forwards every message published to the Bus into the Hub for fan-out to
/// viewer sessions. Exits (and relies on a process supervisor to restart)
/// if the underlying subscription connection is lost.
fn spawn_bus_forwarder(bus: Bus, hub: Hub) {
    tokio::spawn(async move {
        let mut stream = match bus.subscribe().await {
            Ok(stream) => stream,
            Err(err) => {
                error!(%err, "failed to subscribe to bus, exiting");
                std::process::exit(1);
            }
        };
        use tokio_stream::StreamExt;
        while let Some(payload) = stream.next().await {
            hub.broadcast(payload).await;
        }
        error!("bus subscription ended, exiting");
        std::process::exit(1);
    });
}

async fn wait_for_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C"); },
        _ = terminate => { info!("received SIGTERM"); },
    }
}
