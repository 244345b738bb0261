use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use wakegate::config::Config;
use wakegate::core::Core;
use wakegate::host::DockerHost;
use wakegate::server::{WakeServer, PKG_NAME, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wakegate=info".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        let config = Config::load(&config_path).map_err(|e| {
            error!(path = %config_path.display(), error = %e, "Failed to load configuration");
            e
        })?;
        info!(path = %config_path.display(), "Configuration loaded");
        config
    } else {
        info!(path = %config_path.display(), "No configuration file, using defaults");
        Config::default()
    };

    print_startup_banner(&config);

    // Connect to the container runtime
    let host = Arc::new(DockerHost::connect(config.docker.host.as_deref()).await?);
    if let Some(banner) = host.runtime_banner().await {
        info!(runtime = %banner, "Connected to container runtime");
    }

    // Build the controller; its poll driver starts reconciling immediately
    let core = Core::new(Arc::clone(&host), config.controller.core_settings());

    // Create shutdown channel and the wake endpoint
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.server.bind, port = config.server.port, error = %e, "Invalid bind address");
            anyhow::anyhow!("Invalid bind address: {}", e)
        })?;

    let server = WakeServer::new(addr, Arc::clone(&core), shutdown_rx);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Wake endpoint error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    if config.controller.stop_on_exit {
        info!("Stopping all managed containers...");
        core.stop_all().await;
    } else {
        warn!("Leaving managed containers running (controller.stop_on_exit is off)");
    }

    core.close().await;
    let _ = server_handle.await;

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting lazy-start controller");
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        "Server configuration"
    );
    info!(
        label_prefix = %config.controller.label_prefix,
        poll_interval_secs = config.controller.poll_interval_secs,
        default_stop_delay_secs = config.controller.default_stop_delay_secs,
        stop_on_exit = config.controller.stop_on_exit,
        "Controller configuration"
    );
}
