use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DB_PATH_VAR: &str = "WEDDING_DB_PATH";
pub const BIND_ADDR_VAR: &str = "WEDDING_BIND_ADDR";
pub const CORS_ORIGINS_VAR: &str = "CORS_ORIGINS";

/// Runtime settings for the API server and admin CLI
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    /// Allowed browser origins; empty means any origin
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("wedding.db"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Defaults overridden by environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut config = Self::default();

        if let Some(path) = lookup(DB_PATH_VAR).filter(|v| !v.trim().is_empty()) {
            config.db_path = PathBuf::from(path);
        }

        if let Some(addr) = lookup(BIND_ADDR_VAR).filter(|v| !v.trim().is_empty()) {
            config.bind_addr = addr
                .trim()
                .parse()
                .with_context(|| format!("{} is not a socket address: {}", BIND_ADDR_VAR, addr))?;
        }

        if let Some(origins) = lookup(CORS_ORIGINS_VAR) {
            config.cors_origins = parse_origins(&origins);
        }

        Ok(config)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty()
    }
}

/// Comma-separated origin list; `*` anywhere means any origin
fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();

    if origins.iter().any(|origin| origin == "*") {
        Vec::new()
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_addr, "0.0.0.0:8001".parse::<SocketAddr>().unwrap());
        assert!(config.allows_any_origin());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            (DB_PATH_VAR, "/tmp/registry.db"),
            (BIND_ADDR_VAR, "127.0.0.1:9000"),
            (CORS_ORIGINS_VAR, "https://ana-faris.test, http://localhost:3000"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/registry.db"));
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(
            config.cors_origins,
            vec!["https://ana-faris.test".to_string(), "http://localhost:3000".to_string()]
        );
    }

    #[test]
    fn test_wildcard_origin_means_any() {
        let config = Config::from_lookup(lookup_from(&[(CORS_ORIGINS_VAR, "*")])).unwrap();
        assert!(config.allows_any_origin());
    }

    #[test]
    fn test_bad_bind_addr_is_error() {
        assert!(Config::from_lookup(lookup_from(&[(BIND_ADDR_VAR, "not-an-addr")])).is_err());
    }
}
