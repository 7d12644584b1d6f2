use anyhow::{Context, Result, bail};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    /// Group (with a `general` channel) created on startup if missing.
    pub seed_group: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("LECTERN_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("LECTERN_JWT_SECRET is unset or still a placeholder; it must match the secret that signs session tokens");
        }

        let db_path: PathBuf = std::env::var("LECTERN_DB_PATH")
            .unwrap_or_else(|_| "lectern.db".into())
            .into();
        let host = std::env::var("LECTERN_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("LECTERN_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("LECTERN_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let seed_group = std::env::var("LECTERN_SEED_GROUP")
            .ok()
            .filter(|name| !name.trim().is_empty());

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            seed_group,
        })
    }
}
