use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use tickcast::broker::{BroadcastEngine, ConnectionRegistry};
use tickcast::config::{Settings, load_config};
use tickcast::publisher::{CpuPublisher, TimePublisher, run_publisher};
use tickcast::transport::{ServerContext, bind, start_websocket_server};
use tickcast::utils::{ServerError, ShutdownCoordinator, logging};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("{}", ServerError::from(e));
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.logging.level);

    match run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: Settings) -> Result<(), ServerError> {
    let listener = bind(&config.server.addr()).await?;
    let registry = Arc::new(ConnectionRegistry::new());
    let engine = BroadcastEngine::new(Arc::clone(&registry), config.broker.send_timeout());
    let coordinator = ShutdownCoordinator::new();

    let mut handles = vec![
        tokio::spawn(run_publisher(
            TimePublisher::new(config.publishers.time_interval()),
            engine.clone(),
            coordinator.token(),
        )),
        tokio::spawn(run_publisher(
            CpuPublisher::new(config.publishers.cpu_interval()),
            engine,
            coordinator.token(),
        )),
    ];

    let ctx = ServerContext::new(registry, config.broker.clone(), config.server.path.clone());
    let mut server = tokio::spawn(start_websocket_server(listener, ctx, coordinator.token()));

    let outcome = tokio::select! {
        res = &mut server => {
            error!("WebSocket server exited unexpectedly.");
            coordinator
                .graceful_shutdown(handles, config.shutdown.timeout())
                .await;
            return res.map_err(|e| ServerError::Io(io::Error::other(e)))?;
        }
        res = tokio::signal::ctrl_c() => res,
    };
    if let Err(e) = outcome {
        warn!(error = %e, "failed to listen for the shutdown signal");
    }
    info!("Shutdown signal received. Closing connections.");

    handles.push(tokio::spawn(async move {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("WebSocket server failed during shutdown: {e}"),
            Err(e) => error!("WebSocket server task failed: {e}"),
        }
    }));

    if !coordinator
        .graceful_shutdown(handles, config.shutdown.timeout())
        .await
    {
        warn!("forced shutdown after timeout");
    }
    info!("Server stopped.");
    Ok(())
}
