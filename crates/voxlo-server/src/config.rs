use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::CorsLayer;

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// `None` runs without persistence
    pub db_path: Option<PathBuf>,
    pub compaction_interval_secs: u64,
    pub snapshot_interval_secs: u64,
    pub client_url: Option<String>,
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("VOXLO_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("VOXLO_PORT")
            .unwrap_or_else(|| "3001".into())
            .parse()
            .context("VOXLO_PORT must be a port number")?;

        // Set but empty means "no persistence"
        let db_path = match lookup("VOXLO_DB_PATH") {
            Some(path) if path.trim().is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from("voxlo.db")),
        };

        let compaction_interval_secs: u64 = lookup("VOXLO_COMPACTION_INTERVAL_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(60)
            .max(1);
        let snapshot_interval_secs: u64 = lookup("VOXLO_SNAPSHOT_INTERVAL_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(5)
            .max(1);

        let client_url = lookup("CLIENT_URL").filter(|v| !v.trim().is_empty());
        let admin_token = lookup("VOXLO_ADMIN_TOKEN").filter(|v| !v.trim().is_empty());

        Ok(Self {
            host,
            port,
            db_path,
            compaction_interval_secs,
            snapshot_interval_secs,
            client_url,
            admin_token,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    /// CORS restricted to `CLIENT_URL` when set, permissive otherwise.
    pub fn cors_layer(&self) -> anyhow::Result<CorsLayer> {
        let Some(origin) = &self.client_url else {
            return Ok(CorsLayer::permissive());
        };
        let origin: HeaderValue = origin
            .parse()
            .with_context(|| format!("CLIENT_URL is not a valid origin: {}", origin))?;
        Ok(CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.addr().unwrap().port(), 3001);
        assert_eq!(config.db_path, Some(PathBuf::from("voxlo.db")));
        assert_eq!(config.compaction_interval_secs, 60);
        assert_eq!(config.snapshot_interval_secs, 5);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn empty_db_path_disables_persistence() {
        let config = config(&[("VOXLO_DB_PATH", "")]).unwrap();
        assert!(config.db_path.is_none());
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(config(&[("VOXLO_PORT", "ninety")]).is_err());
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = config(&[("VOXLO_SNAPSHOT_INTERVAL_SECS", "0")]).unwrap();
        assert_eq!(config.snapshot_interval_secs, 1);
    }
}
