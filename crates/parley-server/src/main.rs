mod retention;
mod router;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use parley_api::rate_limit::{Quotas, RateLimiter};
use parley_api::state::{AppState, AppStateInner};

use crate::retention::{RetentionConfig, RetentionSweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let mut quotas = Quotas::default();
    quotas.create_conversation.max_events =
        env_or("PARLEY_RATE_CREATE_CONVERSATIONS", quotas.create_conversation.max_events)?;
    quotas.send_message.max_events =
        env_or("PARLEY_RATE_SEND_MESSAGES", quotas.send_message.max_events)?;
    quotas.submit_report.max_events =
        env_or("PARLEY_RATE_SUBMIT_REPORTS", quotas.submit_report.max_events)?;

    let retention_config = RetentionConfig::from_env()?;

    // Init database
    let db = Arc::new(parley_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret,
        limiter: RateLimiter::new(quotas),
    });

    // Retention sweeper runs beside the request loop; aborting the handle
    // stops it.
    let _sweeper_handle = if retention_config.any_enabled() {
        info!(
            "Retention sweeper enabled (messages: {:?}d, notifications: {:?}d, reports: {:?}d, every {}s)",
            retention_config.message_days,
            retention_config.notification_days,
            retention_config.report_days,
            retention_config.interval_secs,
        );
        Some(RetentionSweeper::new(db, retention_config).spawn())
    } else {
        info!("Retention sweeper disabled");
        None
    };

    let app = router::app_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn env_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key} '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}
