//! # Queue Samples
//!
//! Runnable demonstrations of the queue storage service.
//!
//! The binary loads configuration, builds one shared queue service client and
//! runs the basic and advanced scenario suites in order, stopping at the first
//! failure.

use clap::Parser;
use queue_storage_client::{
    ClientConfig, ConfigurationError, ProviderConfig, QueueError, QueueServiceClient,
    QueueServiceClientFactory, StorageAccount, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod runner;
pub mod scenarios;

pub use runner::{RunFailure, RunReport, RunState, Scenario, ScenarioError, ScenarioRunner};
pub use scenarios::{default_scenarios, SampleSettings};

/// Environment variable consulted when no connection string is configured
pub const CONNECTION_STRING_ENV: &str = "AZURE_STORAGE_CONNECTION_STRING";

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue samples - run every queue storage demonstration in order
#[derive(Debug, Parser)]
#[command(name = "queue-samples")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs the queue storage samples against a storage account or emulator")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEUE_SAMPLES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the samples binary
#[derive(Debug, thiserror::Error)]
pub enum SamplesError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Logging initialization failed: {message}")]
    Logging { message: String },

    #[error("Client error: {0}")]
    Client(#[from] QueueError),

    #[error(transparent)]
    Run(#[from] RunFailure),
}

impl SamplesError {
    /// Process exit code for the error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Client(_) => 2,
            Self::Run(_) => 3,
            Self::Logging { .. } => 4,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Invalid connection settings: {0}")]
    Connection(#[from] ConfigurationError),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Samples configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplesConfig {
    pub storage: StorageConfig,
    pub scenarios: SampleSettings,
}

impl SamplesConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.scenarios.validate()?;
        Ok(())
    }
}

/// Which client implementation runs the samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Storage account or emulator over HTTP
    #[default]
    Http,
    /// Process-local service, nothing leaves the process
    InMemory,
}

/// Storage connection settings
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub provider: ProviderKind,
    /// The development storage emulator is used when unset
    pub connection_string: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Http,
            connection_string: None,
            request_timeout_seconds: 30,
        }
    }
}

impl StorageConfig {
    /// Validate the storage settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_seconds == 0 {
            return Err(ValidationError::OutOfRange {
                field: "storage.request_timeout_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        if self.provider == ProviderKind::Http {
            self.storage_account()?;
        }

        Ok(())
    }

    /// Account described by the connection string, or the emulator account
    pub fn storage_account(&self) -> Result<StorageAccount, ConfigError> {
        match &self.connection_string {
            Some(connection_string) => Ok(StorageAccount::from_connection_string(
                connection_string,
            )?),
            None => Ok(StorageAccount::development_storage()),
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("provider", &self.provider)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Initialize logging; `RUST_LOG` overrides the given level
pub fn initialize_logging(level: &str, json: bool) -> Result<(), SamplesError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| SamplesError::Logging {
            message: format!("invalid log level '{}': {}", level, e),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| SamplesError::Logging {
        message: e.to_string(),
    })
}

/// Load configuration.
///
/// Sources, later ones overriding earlier ones:
///  1. `config/samples.{toml,yaml,json}` when present
///  2. The explicit file, which must exist
///  3. Environment variables prefixed `QUEUE_SAMPLES__`, e.g.
///     `QUEUE_SAMPLES__STORAGE__PROVIDER=in-memory`
///
/// `AZURE_STORAGE_CONNECTION_STRING` fills in a missing connection string.
pub fn load_configuration(path: Option<&Path>) -> Result<SamplesConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config/samples").required(false));

    if let Some(path) = path {
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let mut samples_config: SamplesConfig = builder
        .add_source(config::Environment::with_prefix("QUEUE_SAMPLES").separator("__"))
        .build()?
        .try_deserialize()?;

    if samples_config.storage.connection_string.is_none() {
        samples_config.storage.connection_string = std::env::var(CONNECTION_STRING_ENV)
            .ok()
            .filter(|value| !value.is_empty());
    }

    samples_config.validate()?;
    debug!(config = ?samples_config, "Loaded configuration");
    Ok(samples_config)
}

/// Create the client shared by every scenario
pub fn create_client(storage: &StorageConfig) -> Result<Arc<dyn QueueServiceClient>, SamplesError> {
    let provider = match storage.provider {
        ProviderKind::Http => ProviderConfig::Http(storage.storage_account()?),
        ProviderKind::InMemory => ProviderConfig::InMemory,
    };

    let client = QueueServiceClientFactory::create_client(ClientConfig {
        provider,
        request_timeout: Duration::from_secs(storage.request_timeout_seconds),
    })?;
    Ok(client)
}

/// Load configuration and run every scenario
pub async fn run_samples(cli: &Cli) -> Result<RunReport, SamplesError> {
    let samples_config = load_configuration(cli.config.as_deref())?;
    let client = create_client(&samples_config.storage)?;

    let runner = ScenarioRunner::new(client, default_scenarios(&samples_config.scenarios));
    Ok(runner.run().await?)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
