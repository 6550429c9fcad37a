use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;

mod config;
mod error;
mod functions;
mod routes;
mod schema;
mod services;
mod store;
#[cfg(test)]
mod testutil;

use crate::config::AppConfig;
use crate::functions::{NotificationWorker, ScheduleService};
use crate::services::{EmailGateway, LogMailer, ResendMailer};
use crate::store::{PgStore, ScheduleStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store: Arc<dyn ScheduleStore> = Arc::new(PgStore::new(pool));

    let mailer: Arc<dyn EmailGateway> = match config.resend_api_key.clone() {
        Some(api_key) => Arc::new(ResendMailer::new(api_key, config.email_from.clone())),
        None => {
            tracing::warn!("RESEND_API_KEY not set, outbound email will only be logged");
            Arc::new(LogMailer)
        }
    };

    let service = Arc::new(ScheduleService::new(
        store.clone(),
        mailer.clone(),
        config.conflict_policy,
        config.timezone,
    ));

    let mut worker = NotificationWorker::new(
        store.clone(),
        mailer.clone(),
        config.dispatch_interval,
        config.dispatch_batch,
    );
    worker.start();

    let app = routes::router(routes::AppState { service, store });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "coachd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
