use anyhow::{Context, Result};
use school_gate_gateway::config::GatewayConfig;
use school_gate_gateway::server::GatewayServer;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("Failed to load configuration")?;

    // Initialize tracing with the configured log level
    init_tracing(&config.log_level);

    info!("school-gate starting");
    info!(
        "Configuration loaded: upstream={}, tenant_directory={}, user_context={}",
        config.upstream_url, config.tenant_directory_url, config.user_context_url
    );
    info!(
        "Tenant cache TTL: {}s, collaborator retries: {}, context signing: {}",
        config.tenant_cache_ttl_secs,
        config.collaborator_max_retries,
        config.context_signing_secret.is_some()
    );

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e);
    }

    let server = GatewayServer::new(config).context("Failed to create gateway server")?;

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
        }
    }

    info!("school-gate stopped");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
