use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workout_sink::{config::Config, SinkService, WorkoutApiClient};

#[derive(Debug, Parser)]
#[command(name = "workout-sink", version, about = "Import workout files dropped into a sink folder")]
struct Cli {
    /// Configuration file (defaults to ~/.workout-sink/config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the sink folder structure
    Setup,
    /// Import every file currently in the sink folder, then exit
    BatchProcess {
        /// Log every file
        #[arg(short, long)]
        verbose: bool,
    },
    /// Watch the sink folder and import files as they arrive
    Watch {
        /// Process existing files before watching
        #[arg(long)]
        scan: bool,
        /// Log every file
        #[arg(short, long)]
        verbose: bool,
    },
}

impl Command {
    fn verbose(&self) -> bool {
        match self {
            Command::Setup => false,
            Command::BatchProcess { verbose } | Command::Watch { verbose, .. } => *verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let level = if cli.command.verbose() {
        "debug"
    } else {
        config.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("workout_sink={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let client = Arc::new(WorkoutApiClient::new(
        &config.api_url,
        config.api_token.clone(),
        config.request_timeout(),
    )?);
    let service = SinkService::new(config, client.clone(), client.clone(), client.clone());

    match cli.command {
        Command::Setup => {
            service.setup()?;
            tracing::info!("✅ Sink folder ready at {}", service.layout().root().display());
        }
        Command::BatchProcess { .. } => {
            check_api(&client).await;
            let shutdown = shutdown_token();
            service.batch_process(&shutdown).await?;
        }
        Command::Watch { scan, .. } => {
            check_api(&client).await;
            let initial_scan = scan || service.config().scan_on_start;
            tracing::info!(
                "🚀 Starting sink folder watcher on {} (backend: {:?})",
                service.layout().root().display(),
                service.config().watch_backend
            );
            let report = service.watch(initial_scan, shutdown_token()).await?;
            tracing::info!("✅ Watcher stopped: {}", report);
        }
    }

    Ok(())
}

async fn check_api(client: &WorkoutApiClient) {
    match client.health_check().await {
        Ok(true) => tracing::info!("✅ Workout API reachable at {}", client.base_url()),
        Ok(false) => tracing::warn!("⚠️ Workout API health check returned an error status"),
        Err(e) => tracing::warn!(
            "⚠️ Workout API not available: {}. Imports will fail until it is reachable.",
            e
        ),
    }
}

/// Cancelled on Ctrl-C or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown requested, finishing current file");
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("⚠️ Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
