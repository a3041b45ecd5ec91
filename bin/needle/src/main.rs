use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use needle_core::{
    dtab_channel, Backend, MemoryBackend, PostgresBackend, Store, SyncMetrics, Synchronizer,
    VersionRouter,
};
use needle_kube::{KubeClient, KubeInstanceLister};
use needle_namerd::NamerdClient;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
mod http;
mod logging;
mod server;
mod service;

use config::{CliOverrides, Config, DatabaseBackend, LogFormat};
use server::GrpcServer;
use service::NeedleApi;

#[derive(Debug, Parser)]
#[command(name = "needle", version, about = "Keeps namerd delegation tables in sync with a relational store")]
struct Cli {
    /// Configuration file, `needle.toml` when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the gRPC API, the metrics endpoint and the synchronizer
    Serve {
        /// gRPC listen address
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Print the version
    Version,
}

#[derive(Debug, Subcommand)]
enum MigrateAction {
    /// Apply pending migrations
    Up,
    /// Print the latest applied migration
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve { listen: None });

    if let Command::Version = command {
        println!("needle {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let overrides = CliOverrides {
        log_format: cli.log_format,
        grpc_listen: match &command {
            Command::Serve { listen } => *listen,
            _ => None,
        },
    };
    let config = Config::load(cli.config.as_deref(), &overrides)?;
    logging::init_tracing(&config.log)?;

    match command {
        Command::Serve { .. } => serve(config).await,
        Command::Migrate { action } => migrate(config, action).await,
        Command::Version => Ok(()),
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting needle {}...", env!("CARGO_PKG_VERSION"));

    let metrics = SyncMetrics::new()?;
    let (notifier, receiver) = dtab_channel(config.sync.queue_capacity);
    let notifier = notifier.with_metrics(metrics.clone());

    let backend: Arc<dyn Backend> = match config.database.backend {
        DatabaseBackend::Postgres => {
            let postgres = PostgresBackend::connect(&config.database.postgres())
                .await
                .context("failed to connect to postgres")?;
            Arc::new(postgres)
        }
        DatabaseBackend::Memory => {
            warn!("Using the in-memory backend, state is lost on exit");
            Arc::new(MemoryBackend::new())
        }
    };
    let store = Store::new(backend, notifier);

    let namerd = NamerdClient::new(&config.namerd).context("invalid namerd configuration")?;
    info!("namerd client targeting {}", config.namerd.base_url());

    let kube = KubeClient::connect(config.kube.context.as_deref()).await?;
    let router = VersionRouter::new(store.clone(), Arc::new(KubeInstanceLister::new(&kube)));

    let shutdown = CancellationToken::new();

    let synchronizer = Synchronizer::new(store.clone(), Arc::new(namerd), receiver)
        .with_reconcile_interval(config.sync.reconcile_interval())
        .with_metrics(metrics.clone());
    let sync_task = tokio::spawn(synchronizer.run(shutdown.clone()));

    let http_task = tokio::spawn(http::serve(
        config.http.listen_address,
        metrics,
        shutdown.clone(),
    ));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received, exiting...");
            shutdown.cancel();
        }
    });

    let served = GrpcServer::new(NeedleApi::new(store, router))
        .start_with_shutdown(config.grpc.listen_address, shutdown.clone())
        .await;
    shutdown.cancel();

    sync_task.await.context("synchronizer task panicked")?;
    match http_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("metrics server error: {:#}", e),
        Err(e) => error!("metrics server task panicked: {}", e),
    }
    served
}

async fn migrate(config: Config, action: MigrateAction) -> Result<()> {
    if config.database.backend != DatabaseBackend::Postgres {
        bail!("migrations only apply to the postgres backend");
    }
    let postgres = PostgresBackend::connect(&config.database.postgres())
        .await
        .context("failed to connect to postgres")?;

    match action {
        MigrateAction::Up => {
            postgres.migrate().await.context("failed to apply migrations")?;
            info!("migrations applied");
        }
        MigrateAction::Version => match postgres.migration_version().await? {
            Some((version, dirty)) => println!("{} (dirty: {})", version, dirty),
            None => println!("no migrations applied"),
        },
    }
    postgres.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
