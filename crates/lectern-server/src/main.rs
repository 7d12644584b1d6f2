mod config;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use lectern_api::routes;
use lectern_api::state::AppStateInner;
use lectern_db::Database;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lectern_server=debug,lectern_api=debug,lectern_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;
    if let Some(name) = &config.seed_group {
        seed_group(&db, name)?;
    }

    let app = routes::router(AppStateInner::new(db, config.jwt_secret));

    info!("Lectern listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Ensures a group with a `general` channel exists. The group id is derived
/// from the name, so restarts find the existing group.
fn seed_group(db: &Database, name: &str) -> anyhow::Result<()> {
    let group_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();
    let now = Utc::now();

    if db.get_group(&group_id)?.is_none() {
        db.create_group(&group_id, name, now)?;
        info!("Seeded group '{}' ({})", name, group_id);
    }
    if db.find_channel_by_name(&group_id, "general")?.is_none() {
        db.create_channel(&Uuid::new_v4().to_string(), &group_id, "general", now)?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
