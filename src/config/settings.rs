//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! configuration files or environment variables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Ledger RPC configuration.
    pub rpc: RpcSettings,
    /// Anchor contract configuration.
    pub contract: ContractSettings,
    /// Observer loop configuration.
    pub observer: ObserverSettings,
    /// CAS gateway configuration.
    pub cas: CasSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Metrics configuration.
    pub metrics: MetricsSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `OBSERVER_` prefix
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("rpc.url", "http://localhost:8545")?
            .set_default("rpc.request_timeout_ms", 30000)?
            .set_default("contract.anchor_address", Option::<String>::None)?
            .set_default("contract.deployment_block", Option::<i64>::None)?
            .set_default("observer.batch_size", 500)?
            .set_default("observer.rate_limit_delay_ms", 100)?
            .set_default("observer.max_retries", 3)?
            .set_default("observer.retry_delay_ms", 1000)?
            .set_default("observer.max_concurrent_downloads", 4)?
            .set_default("observer.observing_interval_secs", 30)?
            .set_default("observer.max_records_per_block", 100)?
            .set_default("observer.monitor_interval_secs", 60)?
            .set_default("observer.pagination.default_batch_size", 1000)?
            .set_default("observer.pagination.max_batch_size", 10000)?
            .set_default("cas.gateway_url", "http://localhost:5001")?
            .set_default("cas.read_timeout_ms", 10000)?
            .set_default("cas.max_file_size_bytes", 20 * 1024 * 1024)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("logging.file_path", Option::<String>::None)?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.host", "0.0.0.0")?
            .set_default("metrics.port", 9090)?
            // Load default configuration file
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (OBSERVER_ prefix)
            .add_source(
                Environment::with_prefix("OBSERVER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.rpc.url.is_empty() {
            errors.push("rpc.url cannot be empty".into());
        }

        match &self.contract.anchor_address {
            None => errors.push("contract.anchor_address must be set".into()),
            Some(addr) if Address::from_str(addr).is_err() => {
                errors.push(format!("contract.anchor_address is not an address: {addr}"));
            }
            Some(_) => {}
        }

        if self.observer.batch_size == 0 {
            errors.push("observer.batch_size must be non-zero".into());
        }
        if self.observer.max_concurrent_downloads == 0 {
            errors.push("observer.max_concurrent_downloads must be at least 1".into());
        }
        if self.observer.observing_interval_secs == 0 {
            errors.push("observer.observing_interval_secs must be non-zero".into());
        }
        if self.observer.max_records_per_block == 0 {
            errors.push("observer.max_records_per_block must be non-zero".into());
        }

        let pagination = &self.observer.pagination;
        if pagination.default_batch_size == 0 {
            errors.push("observer.pagination.default_batch_size must be non-zero".into());
        }
        if pagination.default_batch_size > pagination.max_batch_size {
            errors.push(
                "observer.pagination.default_batch_size cannot exceed max_batch_size".into(),
            );
        }

        if self.cas.max_file_size_bytes == 0 {
            errors.push("cas.max_file_size_bytes must be non-zero".into());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Parsed anchor contract address.
    ///
    /// # Errors
    /// Returns an error message if the address is unset or malformed.
    pub fn anchor_address(&self) -> Result<Address, String> {
        let raw = self
            .contract
            .anchor_address
            .as_deref()
            .ok_or_else(|| "contract.anchor_address must be set".to_string())?;
        Address::from_str(raw).map_err(|e| format!("invalid anchor address '{raw}': {e}"))
    }
}

/// Ledger RPC configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    /// HTTP RPC endpoint URL.
    pub url: String,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl RpcSettings {
    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Anchor contract configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractSettings {
    /// Address of the anchor contract. Must be set for the observer to run.
    pub anchor_address: Option<String>,
    /// Block the contract was deployed at. When unset, the observer falls
    /// back to a binary search over `eth_getCode` (O(log N) RPC calls).
    pub deployment_block: Option<u64>,
}

/// Observer loop configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ObserverSettings {
    /// Blocks per historical batch.
    pub batch_size: u64,
    /// Sleep between historical batches in milliseconds.
    pub rate_limit_delay_ms: u64,
    /// Retry attempts per paginator sub-range.
    pub max_retries: u32,
    /// Base retry delay in milliseconds (linear backoff).
    pub retry_delay_ms: u64,
    /// Cap on concurrently processing records in the live loop.
    pub max_concurrent_downloads: usize,
    /// Delay between live iterations in seconds.
    pub observing_interval_secs: u64,
    /// Per-block admission cap applied by the throughput limiter.
    pub max_records_per_block: usize,
    /// Progress-monitor interval in seconds (0 disables the monitor).
    pub monitor_interval_secs: u64,
    /// Range pagination settings.
    pub pagination: PaginationSettings,
}

impl ObserverSettings {
    /// Get the rate-limit delay as a `Duration`.
    #[must_use]
    pub const fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    /// Get the base retry delay as a `Duration`.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Get the observing interval as a `Duration`.
    #[must_use]
    pub const fn observing_interval(&self) -> Duration {
        Duration::from_secs(self.observing_interval_secs)
    }

    /// Get the monitor interval as a `Duration`, `None` when disabled.
    #[must_use]
    pub const fn monitor_interval(&self) -> Option<Duration> {
        if self.monitor_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.monitor_interval_secs))
        }
    }
}

/// Range pagination settings for the paginator.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationSettings {
    /// Blocks per sub-range request.
    pub default_batch_size: u64,
    /// Advisory ceiling: ranges beyond this are logged as oversized.
    pub max_batch_size: u64,
}

/// CAS gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CasSettings {
    /// Base URL of the IPFS HTTP gateway.
    pub gateway_url: String,
    /// Per-read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Maximum file size fetched from the CAS.
    pub max_file_size_bytes: u64,
}

impl CasSettings {
    /// Get the read timeout as a `Duration`.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log format (json, pretty).
    pub format: String,
    /// Optional file path for log output.
    pub file_path: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// Whether the Prometheus exporter is enabled.
    pub enabled: bool,
    /// Host to bind the metrics server to.
    pub host: String,
    /// Port for the metrics server.
    pub port: u16,
}

impl MetricsSettings {
    /// Get the metrics socket address string.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNC PRESETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Bundled observer tuning profiles.
///
/// Presets override the observer and pagination blocks; everything else is
/// left as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SyncPreset {
    /// Gentle on rate-limited public endpoints.
    Conservative,
    /// The defaults.
    Balanced,
    /// For dedicated nodes that can absorb large ranges.
    Aggressive,
}

impl SyncPreset {
    /// Apply this preset to the observer block of `settings`.
    pub fn apply(self, settings: &mut Settings) {
        let observer = &mut settings.observer;
        match self {
            Self::Conservative => {
                observer.batch_size = 250;
                observer.rate_limit_delay_ms = 500;
                observer.max_concurrent_downloads = 2;
                observer.pagination.default_batch_size = 500;
                observer.pagination.max_batch_size = 5000;
            }
            Self::Balanced => {
                observer.batch_size = 500;
                observer.rate_limit_delay_ms = 100;
                observer.max_concurrent_downloads = 4;
                observer.pagination.default_batch_size = 1000;
                observer.pagination.max_batch_size = 10000;
            }
            Self::Aggressive => {
                observer.batch_size = 1000;
                observer.rate_limit_delay_ms = 25;
                observer.max_concurrent_downloads = 8;
                observer.pagination.default_batch_size = 2500;
                observer.pagination.max_batch_size = 20000;
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
