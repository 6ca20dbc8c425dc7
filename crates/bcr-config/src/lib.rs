//! Environment-backed configuration.
//!
//! All knobs come from `BCR_*` environment variables; binaries bootstrap
//! `.env.local` via dotenvy before calling [`AppConfig::from_env`]. Secrets
//! (the sponsor key) are never logged; `AppConfig` deliberately does not
//! derive `Debug` on the secret-carrying part.

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::str::FromStr;

pub const ENV_DB_URL: &str = "BCR_DATABASE_URL";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS origin allowed on the HTTP/WS surface.
    pub cors_origin: String,
}

#[derive(Clone)]
pub struct SuiConfig {
    /// mainnet | testnet | devnet | localnet
    pub network: String,
    /// Fullnode JSON-RPC endpoint (derived from `network` unless overridden).
    pub rpc_url: String,
    /// Move package publishing `game` and `badge` modules.
    pub package_id: String,
    /// Shared badge registry object.
    pub registry_id: String,
    /// Sponsor secret in any of the three accepted encodings.
    pub sponsor_secret: String,
    /// When set, startup verifies it matches the address derived from the
    /// secret and refuses to boot otherwise.
    pub sponsor_address: Option<String>,
    pub gas_budget: u64,
}

impl fmt::Debug for SuiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiConfig")
            .field("network", &self.network)
            .field("rpc_url", &self.rpc_url)
            .field("package_id", &self.package_id)
            .field("registry_id", &self.registry_id)
            .field("sponsor_secret", &"<redacted>")
            .field("sponsor_address", &self.sponsor_address)
            .field("gas_budget", &self.gas_budget)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub processing_interval_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            processing_interval_ms: 1000,
            max_retries: 3,
            retry_base_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub database_ssl: bool,
    pub sui: SuiConfig,
    pub queue: QueueConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let network = env_or("BCR_SUI_NETWORK", "testnet");
        let rpc_url = match std::env::var("BCR_SUI_RPC_URL") {
            Ok(v) if !v.is_empty() => v,
            _ => default_rpc_url(&network)?,
        };

        Ok(Self {
            server: ServerConfig {
                host: env_or("BCR_HOST", "0.0.0.0"),
                port: env_parse("BCR_PORT", 3001)?,
                cors_origin: env_or("BCR_CORS_ORIGIN", "http://localhost:3000"),
            },
            database_url: env_req(ENV_DB_URL)?,
            database_ssl: env_parse("BCR_DATABASE_SSL", false)?,
            sui: SuiConfig {
                network,
                rpc_url,
                package_id: env_req("BCR_PACKAGE_ID")?,
                registry_id: env_req("BCR_REGISTRY_ID")?,
                sponsor_secret: env_req("BCR_SPONSOR_SECRET")?,
                sponsor_address: std::env::var("BCR_SPONSOR_ADDRESS")
                    .ok()
                    .filter(|s| !s.is_empty()),
                gas_budget: env_parse("BCR_GAS_BUDGET", 100_000_000)?,
            },
            queue: QueueConfig {
                processing_interval_ms: env_parse("BCR_PROCESSING_INTERVAL_MS", 1000)?,
                max_retries: env_parse("BCR_MAX_RETRIES", 3)?,
                retry_base_delay_ms: env_parse("BCR_RETRY_DELAY_MS", 5000)?,
            },
        })
    }

    /// Connection string with the SSL flag applied, unless the URL already
    /// pins an sslmode.
    pub fn effective_database_url(&self) -> String {
        if self.database_ssl && !self.database_url.contains("sslmode=") {
            let sep = if self.database_url.contains('?') { '&' } else { '?' };
            format!("{}{sep}sslmode=require", self.database_url)
        } else {
            self.database_url.clone()
        }
    }
}

/// Fullnode endpoint for a named Sui network.
pub fn default_rpc_url(network: &str) -> Result<String> {
    match network {
        "mainnet" | "testnet" | "devnet" => {
            Ok(format!("https://fullnode.{network}.sui.io:443"))
        }
        "localnet" => Ok("http://127.0.0.1:9000".to_string()),
        other => Err(anyhow!(
            "unknown Sui network '{other}' (expected mainnet|testnet|devnet|localnet; \
             or set BCR_SUI_RPC_URL explicitly)"
        )),
    }
}

fn env_req(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing env var {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .map_err(|e| anyhow!("invalid {key}='{raw}': {e}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_urls_per_network() {
        assert_eq!(
            default_rpc_url("testnet").unwrap(),
            "https://fullnode.testnet.sui.io:443"
        );
        assert_eq!(default_rpc_url("localnet").unwrap(), "http://127.0.0.1:9000");
        assert!(default_rpc_url("bogusnet").is_err());
    }

    #[test]
    fn env_parse_falls_back_and_rejects_garbage() {
        std::env::remove_var("BCR_TEST_UNSET_KNOB");
        assert_eq!(env_parse("BCR_TEST_UNSET_KNOB", 42u64).unwrap(), 42);

        std::env::set_var("BCR_TEST_BAD_KNOB", "not-a-number");
        assert!(env_parse::<u64>("BCR_TEST_BAD_KNOB", 0).is_err());
        std::env::remove_var("BCR_TEST_BAD_KNOB");
    }

    #[test]
    fn queue_defaults_match_operational_defaults() {
        let q = QueueConfig::default();
        assert_eq!(q.processing_interval_ms, 1000);
        assert_eq!(q.max_retries, 3);
        assert_eq!(q.retry_base_delay_ms, 5000);
    }

    #[test]
    fn ssl_flag_appends_sslmode_once() {
        let base = AppConfig {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 3001,
                cors_origin: "http://localhost:3000".into(),
            },
            database_url: "postgres://u:p@localhost/bcr".into(),
            database_ssl: true,
            sui: SuiConfig {
                network: "testnet".into(),
                rpc_url: "https://fullnode.testnet.sui.io:443".into(),
                package_id: "0x1".into(),
                registry_id: "0x2".into(),
                sponsor_secret: "s".into(),
                sponsor_address: None,
                gas_budget: 100_000_000,
            },
            queue: QueueConfig::default(),
        };
        assert_eq!(
            base.effective_database_url(),
            "postgres://u:p@localhost/bcr?sslmode=require"
        );

        let mut pinned = base.clone();
        pinned.database_url = "postgres://u:p@localhost/bcr?sslmode=disable".into();
        assert_eq!(
            pinned.effective_database_url(),
            "postgres://u:p@localhost/bcr?sslmode=disable"
        );

        let mut no_ssl = base;
        no_ssl.database_ssl = false;
        assert_eq!(
            no_ssl.effective_database_url(),
            "postgres://u:p@localhost/bcr"
        );
    }

    #[test]
    fn sui_config_debug_redacts_secret() {
        let cfg = SuiConfig {
            network: "testnet".into(),
            rpc_url: "https://fullnode.testnet.sui.io:443".into(),
            package_id: "0x1".into(),
            registry_id: "0x2".into(),
            sponsor_secret: "suiprivkey1qqqq".into(),
            sponsor_address: None,
            gas_budget: 100_000_000,
        };
        let dbg = format!("{cfg:?}");
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("suiprivkey"));
    }
}
