//! Server configuration loaded from environment variables.
//!
//! Everything except the JWT secret has a default suitable for local
//! development.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, bail};

/// Secrets copied from sample env files. Refused at startup.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "dev-secret-change-me",
    "change-me",
    "changeme",
    "secret",
    "your-secret-here",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `PARLEY_HOST`, default `0.0.0.0`
    pub host: IpAddr,

    /// Env: `PARLEY_PORT`, default `3000`
    pub port: u16,

    /// SQLite database file.
    /// Env: `PARLEY_DB_PATH`, default `parley.db`
    pub db_path: PathBuf,

    /// HS256 signing key for bearer and gateway tokens. Required.
    /// Env: `PARLEY_JWT_SECRET`
    pub jwt_secret: String,

    /// Directory uploaded blobs are written to.
    /// Env: `PARLEY_STORAGE_DIR`, default `./storage`
    pub storage_dir: PathBuf,

    /// Base URL clients reach the server on; storage URLs are built from it.
    /// Env: `PARLEY_PUBLIC_URL`, default `http://localhost:3000`
    pub public_url: String,

    /// Env: `PARLEY_MAX_UPLOAD_BYTES`, default 10 MiB
    pub max_upload_bytes: usize,

    /// Lifetime of an upload URL.
    /// Env: `PARLEY_UPLOAD_URL_TTL_SECS`, default `3600`
    pub upload_url_ttl_secs: u64,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = match lookup("PARLEY_JWT_SECRET") {
            Some(secret) => secret.trim().to_string(),
            None => bail!("PARLEY_JWT_SECRET must be set"),
        };
        let placeholder = PLACEHOLDER_SECRETS.contains(&jwt_secret.to_lowercase().as_str());
        if jwt_secret.is_empty() || placeholder {
            bail!("PARLEY_JWT_SECRET is empty or a placeholder value; set a real secret");
        }

        Ok(Self {
            host: parsed(&lookup, "PARLEY_HOST", IpAddr::from([0, 0, 0, 0])),
            port: parsed(&lookup, "PARLEY_PORT", 3000),
            db_path: lookup("PARLEY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("parley.db")),
            jwt_secret,
            storage_dir: lookup("PARLEY_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./storage")),
            public_url: lookup("PARLEY_PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            max_upload_bytes: parsed(&lookup, "PARLEY_MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
            upload_url_ttl_secs: parsed(&lookup, "PARLEY_UPLOAD_URL_TTL_SECS", 3600),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Parse `key` when set, warning and keeping `default` on a bad value.
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "Invalid {}, using default", key);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("PARLEY_JWT_SECRET", "a-long-random-value")]).unwrap();
        assert_eq!(config.addr(), SocketAddr::from(([0, 0, 0, 0], 3000)));
        assert_eq!(config.db_path, PathBuf::from("parley.db"));
        assert_eq!(config.public_url, "http://localhost:3000");
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.upload_url_ttl_secs, 3600);
    }

    #[test]
    fn test_secret_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("PARLEY_JWT_SECRET", "  ")]).is_err());
        assert!(load(&[("PARLEY_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = load(&[
            ("PARLEY_JWT_SECRET", "a-long-random-value"),
            ("PARLEY_HOST", "127.0.0.1"),
            ("PARLEY_PORT", "not-a-port"),
            ("PARLEY_PUBLIC_URL", "https://chat.example.com/"),
            ("PARLEY_MAX_UPLOAD_BYTES", "2048"),
        ])
        .unwrap();
        assert_eq!(config.addr(), SocketAddr::from(([127, 0, 0, 1], 3000)));
        assert_eq!(config.public_url, "https://chat.example.com");
        assert_eq!(config.max_upload_bytes, 2048);
    }
}
