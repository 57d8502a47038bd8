use anyhow::{Context, Result};

/// Where proxied document operations go
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyBackend {
    MongoDb,
    Memory,
}

/// Where per-user connection settings are kept
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Required when `settings_backend` is Postgres
    pub database_url: Option<String>,
    pub settings_backend: SettingsBackend,

    pub proxy_backend: ProxyBackend,
    /// Used when a proxy request carries no URI of its own
    pub default_mongodb_uri: Option<String>,
    /// Bearer token required on proxy and settings routes, if set
    pub proxy_api_key: Option<String>,

    pub http_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let settings_backend = match var("SETTINGS_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => SettingsBackend::Memory,
            "postgres" => SettingsBackend::Postgres,
            other => anyhow::bail!("SETTINGS_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        };

        let proxy_backend = match var("PROXY_BACKEND")
            .unwrap_or_else(|| "mongodb".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => ProxyBackend::Memory,
            "mongodb" => ProxyBackend::MongoDb,
            other => anyhow::bail!("PROXY_BACKEND must be 'mongodb' or 'memory', got '{}'", other),
        };

        let database_url = var("DATABASE_URL");
        if settings_backend == SettingsBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when SETTINGS_BACKEND=postgres");
        }

        Ok(Self {
            database_url,
            settings_backend,
            proxy_backend,
            default_mongodb_uri: var("MONGODB_URI"),
            proxy_api_key: var("PROXY_API_KEY"),
            http_port: var("HTTP_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("HTTP_PORT must be a valid port number")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/agentdesk")]).unwrap();

        assert_eq!(config.http_port, 3000);
        assert_eq!(config.settings_backend, SettingsBackend::Postgres);
        assert_eq!(config.proxy_backend, ProxyBackend::MongoDb);
        assert!(config.proxy_api_key.is_none());
        assert!(config.default_mongodb_uri.is_none());
    }

    #[test]
    fn test_postgres_needs_database_url() {
        assert!(config(&[]).is_err());
        assert!(config(&[("DATABASE_URL", "  ")]).is_err());
        assert!(config(&[("SETTINGS_BACKEND", "memory")]).is_ok());
    }

    #[test]
    fn test_backends_and_port() {
        let config = config(&[
            ("SETTINGS_BACKEND", "memory"),
            ("PROXY_BACKEND", "Memory"),
            ("HTTP_PORT", "8088"),
            ("PROXY_API_KEY", "secret"),
            ("MONGODB_URI", "mongodb://localhost:27017"),
        ])
        .unwrap();

        assert_eq!(config.proxy_backend, ProxyBackend::Memory);
        assert_eq!(config.http_port, 8088);
        assert_eq!(config.proxy_api_key.as_deref(), Some("secret"));
        assert_eq!(
            config.default_mongodb_uri.as_deref(),
            Some("mongodb://localhost:27017")
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("SETTINGS_BACKEND", "memory"), ("HTTP_PORT", "http")]).is_err());
        assert!(config(&[("SETTINGS_BACKEND", "redis")]).is_err());
        assert!(config(&[("SETTINGS_BACKEND", "memory"), ("PROXY_BACKEND", "sqlite")]).is_err());
    }
}
