//! Shelfscan Server - scanning desk for self-service lending

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfscan_server::{
    api,
    config::AppConfig,
    scanner::{DeviceFactory, Indicator, PinIndicator, ScanSessionManager, SimulatedDevices},
    services::Services,
    AppState,
};

/// Pulse length of the buzzer and indicator light
const INDICATOR_PULSE: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("shelfscan_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Shelfscan Server v{}", env!("CARGO_PKG_VERSION"));

    // No hardware backend is linked into this binary; drivers plug in through
    // the same DeviceFactory / OutputPin traits.
    tracing::warn!(
        "Using simulated {:?} reader (success rate {:.0}%)",
        config.scanner.mode,
        config.simulation.success_rate * 100.0
    );
    let devices: Arc<dyn DeviceFactory> =
        Arc::new(SimulatedDevices::new(&config.scanner, &config.simulation));
    let indicator: Arc<dyn Indicator> = Arc::new(PinIndicator::logged(INDICATOR_PULSE));

    let services = Services::new(&config, devices, indicator);
    let scanner = services.scanner.clone();

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scanner))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C once the active scan is cancelled and the reader released,
/// so in-flight scan requests finish instead of holding the shutdown open
async fn shutdown_signal(scanner: ScanSessionManager) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, releasing scanner");
    scanner.shutdown().await;
}
