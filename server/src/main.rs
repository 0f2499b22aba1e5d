use clap::Parser;
use log::{error, info, warn};
use server::commands::Dispatcher;
use server::config::{BreakerConfig, HealthConfig, RetryPolicy, ServerConfig, SidecarConfig};
use server::error::ServerError;
use server::health::{HealthReporter, ReporterState};
use server::network::Server;
use server::sdk::{SidecarApi, SidecarClient};
use shared::{DEFAULT_PORT, DEFAULT_SDK_HTTP_PORT};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind the UDP server to
    #[arg(short = 'H', long, env = "ECHO_HOST", default_value = "0.0.0.0")]
    host: String,

    /// UDP port to listen on
    #[arg(short, long, env = "ECHO_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Port of the sidecar's HTTP gateway on loopback
    #[arg(long, env = "AGONES_SDK_HTTP_PORT", default_value_t = DEFAULT_SDK_HTTP_PORT)]
    sdk_port: u16,

    /// Seconds between health pings
    #[arg(long, env = "HEALTH_INTERVAL_SECS", default_value = "2")]
    health_interval_secs: u64,

    /// Retries for transient sidecar failures
    #[arg(long, env = "SDK_RETRIES", default_value = "3")]
    retries: u32,

    /// Consecutive failures before the circuit breaker opens
    #[arg(long, env = "SDK_BREAKER_THRESHOLD", default_value = "5")]
    breaker_threshold: u32,

    /// Seconds the circuit breaker stays open
    #[arg(long, env = "SDK_BREAKER_SECS", default_value = "30")]
    breaker_secs: u64,

    /// Per-request timeout for sidecar calls, in seconds
    #[arg(long, env = "SDK_REQUEST_TIMEOUT_SECS", default_value = "10")]
    request_timeout_secs: u64,
}

impl Args {
    fn sidecar_config(&self) -> SidecarConfig {
        SidecarConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry: RetryPolicy {
                retries: self.retries,
                ..RetryPolicy::default()
            },
            breaker: BreakerConfig {
                failure_threshold: self.breaker_threshold,
                break_duration: Duration::from_secs(self.breaker_secs),
            },
            ..SidecarConfig::for_port(self.sdk_port)
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Starts the health reporter and the UDP server, then exits with the
/// server's status once it stops.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or("info,reqwest=warn,hyper=warn,hyper_util=warn"),
    )
    .init();

    let args = Args::parse();
    let server_config = args.server_config();
    info!(
        "Starting echo UDP server with sidecar support on {}",
        server_config.bind_addr()
    );

    let client = Arc::new(SidecarClient::new(args.sidecar_config())?);
    let sidecar: Arc<dyn SidecarApi> = client.clone();
    let state = Arc::new(ReporterState::new());
    let cancel = CancellationToken::new();

    let reporter = HealthReporter::new(
        Arc::clone(&sidecar),
        Arc::clone(&state),
        HealthConfig {
            interval: Duration::from_secs(args.health_interval_secs),
        },
    );
    let health_handle = tokio::spawn(reporter.run(cancel.child_token()));

    let dispatcher = Dispatcher::new(Arc::clone(&sidecar), Arc::clone(&state));
    let server = Server::bind(&server_config.bind_addr(), sidecar, dispatcher).await?;
    let mut server_handle = tokio::spawn(server.run(cancel.clone()));

    let outcome = tokio::select! {
        result = &mut server_handle => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            cancel.cancel();
            // Releases any dispatch stuck in sidecar back-off
            client.stop();
            server_handle.await
        }
    };

    // Stop the reporter and wait for it before exiting
    cancel.cancel();
    client.stop();
    match health_handle.await {
        Ok(Ok(())) => info!("Health reporter stopped after health was disabled"),
        Ok(Err(ServerError::Cancelled)) => info!("Health reporter stopped"),
        Ok(Err(e)) => error!("Health reporter failed: {}", e),
        Err(e) => error!("Health reporter task panicked: {}", e),
    }

    match outcome {
        Ok(Ok(exit)) => {
            info!("Exiting with status {}", exit.code());
            std::process::exit(exit.code());
        }
        Ok(Err(ServerError::Cancelled)) => {
            warn!("Server cancelled before EXIT");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(e.into()),
    }
}
