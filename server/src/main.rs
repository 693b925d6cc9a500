#![allow(dead_code)]
mod db_core;
mod email;
mod error;
mod model;
mod server_config;
mod state;
mod testing;

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{routing::get, Router};
use email::client::GmailClient;
use mimalloc::MiMalloc;
use server_config::cfg;
use state::{ingestion::IngestionCoordinator, scheduler::SweepScheduler};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    tracing::info!("{}", *cfg);

    let db_url = env::var("DATABASE_URL").context("DATABASE_URL is not set in .env file")?;
    let conn = db_core::connect(&db_url)
        .await
        .context("Database connection failed")?;
    if cfg.settings.create_schema_on_startup {
        db_core::create_schema(&conn).await?;
    }

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let gmail = GmailClient::new(http_client, &cfg.gmail.api_base_url);

    let conn = Arc::new(conn);
    let coordinator = IngestionCoordinator::new(
        Arc::new(gmail),
        conn.clone(),
        conn.clone(),
        conn.clone(),
        cfg.settings.item_timeout(),
    );

    let scheduler = SweepScheduler::new().await?;
    {
        let coordinator = coordinator.clone();
        scheduler
            .add_sweep(
                "sync",
                Duration::from_secs(cfg.scheduler.sync_interval_secs),
                move || {
                    let coordinator = coordinator.clone();
                    async move {
                        state::tasks::run_sync_sweep(&coordinator, &cfg.scheduler).await?;
                        Ok::<(), anyhow::Error>(())
                    }
                },
            )
            .await?;

        let conn = conn.clone();
        scheduler
            .add_sweep(
                "retention",
                Duration::from_secs(cfg.scheduler.retention_interval_secs),
                move || {
                    let conn = conn.clone();
                    async move {
                        state::tasks::run_retention_sweep(
                            conn.as_ref(),
                            cfg.settings.retention_max_age(),
                        )
                        .await?;
                        Ok::<(), anyhow::Error>(())
                    }
                },
            )
            .await?;
    }

    scheduler.start().await?;
    tracing::info!("Scheduler started");

    run_server(scheduler).await
}

async fn shutdown_signal(mut scheduler: SweepScheduler) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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

    if let Err(e) = scheduler.shutdown().await {
        tracing::error!("Scheduler shutdown failed: {:?}", e);
    }
    tracing::info!("Cleanups done, shutting down");
}

async fn run_server(scheduler: SweepScheduler) -> anyhow::Result<()> {
    let health_router = Router::new().route("/", get(|| async { "OK" }));

    let port = env::var("PORT").unwrap_or("5006".to_string());
    let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>()?));
    tracing::info!("Mailsort server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, health_router)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    Ok(())
}
