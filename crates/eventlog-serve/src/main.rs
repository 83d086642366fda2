//! Eventlog Serve - HTTP event ingestion server.
//!
//! Starts the append-log writer and count index, serves the HTTP API and
//! drains the writer on shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use eventlog_core::metrics::{init_metrics, start_metrics_server};
use eventlog_core::{Clock, SystemClock};
use eventlog_ingest::{
    AppendLog, AppendLogConfig, CountIndex, Ingestor, MemoryCountIndex, SqliteCountIndex,
};
use eventlog_serve::{AppState, Config, SupervisorExit, app, supervise};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so clap's env fallbacks can see it
    let dotenv = std::env::var("DOTENV_PATH").unwrap_or_else(|_| ".env".to_string());
    if std::path::Path::new(&dotenv).exists() {
        dotenvy::from_path(&dotenv)?;
        eprintln!("Loaded environment from {}", dotenv);
    }

    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = config.validate()?;

    if config.metrics_port > 0 {
        let handle = init_metrics();
        start_metrics_server(config.metrics_port, handle)
            .await
            .context("failed to start metrics server")?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let writer = Arc::new(
        AppendLog::start(
            AppendLogConfig {
                data_dir: config.data_dir.clone(),
                buffer_capacity: config.buffer_size,
            },
            Arc::clone(&clock),
        )
        .context("failed to start append-log writer")?,
    );

    let index: Arc<dyn CountIndex> = match &config.index_db {
        Some(path) => Arc::new(
            SqliteCountIndex::open(path)
                .with_context(|| format!("failed to open count index {}", path.display()))?,
        ),
        None => Arc::new(MemoryCountIndex::new()),
    };
    tracing::info!(backend = index.name(), "count index ready");

    let ingestor = Ingestor::new(registry, Arc::clone(&writer), index, clock);
    let app = app(AppState::new(ingestor));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown = Arc::new(shutdown_tx);

    let supervisor = tokio::spawn(supervise(
        Arc::clone(&writer),
        config.fault_policy(),
        Arc::clone(&shutdown),
    ));

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            shutdown.send_replace(true);
        });
    }

    // Start server
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "starting server");

    let server = axum::serve(listener, app).with_graceful_shutdown(wait_for(shutdown_rx.clone()));
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server => {
            result.context("server task panicked")??;
        }
        () = wait_for(shutdown_rx) => {
            tracing::info!("Shutting down...");
            drain_server(&mut server, config.shutdown_timeout()).await?;
        }
    }

    // wake the supervisor if the server stopped on its own
    shutdown.send_replace(true);
    let exit = supervisor.await.context("supervisor task panicked")?;

    let stopped = tokio::task::spawn_blocking(move || writer.stop())
        .await
        .context("writer stop panicked")?;
    match stopped {
        Ok(stats) => tracing::info!(
            records = stats.records_written,
            bytes = stats.bytes_written,
            files = stats.files_opened,
            "writer drained"
        ),
        Err(e) => tracing::error!(error = %e, "writer did not stop cleanly"),
    }

    if exit == SupervisorExit::StorageFailed {
        anyhow::bail!("stopped after an unrecoverable storage fault");
    }

    tracing::info!("Goodbye");
    Ok(())
}

/// Let in-flight requests finish, up to `timeout`.
async fn drain_server(
    server: &mut tokio::task::JoinHandle<std::io::Result<()>>,
    timeout: Duration,
) -> anyhow::Result<()> {
    match tokio::time::timeout(timeout, &mut *server).await {
        Ok(result) => result.context("server task panicked")??,
        Err(_) => {
            tracing::warn!(?timeout, "in-flight requests did not finish, dropping them");
            server.abort();
        }
    }
    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    // an Err means every sender is gone, which only happens at exit anyway
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
