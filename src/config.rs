use anyhow::Context;
use std::env;

// ============================================================================
// Configuration - read once from the environment at startup
// ============================================================================

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Absent means the in-memory store is used
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Load demo users/products into the in-memory store
    pub seed_demo_data: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = read("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match read("SERVER_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("SERVER_PORT is not a valid port: {}", raw))?,
            None => DEFAULT_PORT,
        };

        let database_url = read("DATABASE_URL");

        let max_connections = match read("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS is not a number: {}", raw))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let seed_demo_data = match read("SEED_DEMO_DATA") {
            Some(raw) => parse_flag(&raw).with_context(|| format!("SEED_DEMO_DATA is not a boolean: {}", raw))?,
            None => database_url.is_none(),
        };

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            seed_demo_data,
        })
    }
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("expected true/false"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_use_in_memory_store_with_demo_data() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, None);
        assert_eq!(config.max_connections, 5);
        assert!(config.seed_demo_data);
    }

    #[test]
    fn test_database_url_disables_seeding_by_default() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/marketplace"),
            ("SERVER_PORT", "9000"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/marketplace"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_connections, 12);
        assert!(!config.seed_demo_data);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config_from(&[("SERVER_PORT", "http")]).is_err());
        assert!(config_from(&[("DATABASE_MAX_CONNECTIONS", "-1")]).is_err());
        assert!(config_from(&[("SEED_DEMO_DATA", "maybe")]).is_err());
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("SERVER_HOST", "  "), ("SEED_DEMO_DATA", "off")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert!(!config.seed_demo_data);
    }
}
