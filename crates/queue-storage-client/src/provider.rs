//! Provider types and connection configuration.

use crate::error::ConfigurationError;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Account used by the local storage emulator
pub const DEVELOPMENT_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Well-known, publicly documented key of the local storage emulator
pub const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Queue port of the local storage emulator
pub const DEVELOPMENT_QUEUE_PORT: u16 = 10001;

/// Enumeration of supported queue service providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// Hosted queue service (or its emulator) over HTTP
    Http,
    /// Process-local emulation of the service contract
    InMemory,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::InMemory => write!(f, "in-memory"),
        }
    }
}

/// Configuration for queue service client initialization
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub provider: ProviderConfig,
    /// Per-request timeout applied by the HTTP transport
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::InMemory,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Configuration for a storage account reached over HTTP
    pub fn for_account(account: StorageAccount) -> Self {
        Self {
            provider: ProviderConfig::Http(account),
            ..Default::default()
        }
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Http(StorageAccount),
    InMemory,
}

/// Credentials and endpoints of a storage account
#[derive(Clone)]
pub struct StorageAccount {
    pub account_name: String,
    account_key: String,
    pub queue_endpoint: Url,
    /// Read-only replica endpoint; service statistics are served from here
    pub secondary_queue_endpoint: Option<Url>,
}

impl StorageAccount {
    /// Create account with explicit endpoint
    pub fn new(
        account_name: impl Into<String>,
        account_key: impl Into<String>,
        queue_endpoint: Url,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            account_key: account_key.into(),
            queue_endpoint,
            secondary_queue_endpoint: None,
        }
    }

    /// Account of the local storage emulator
    pub fn development_storage() -> Self {
        Self::development_storage_at("http://127.0.0.1")
            .expect("default development storage endpoint is a valid URL")
    }

    fn development_storage_at(proxy: &str) -> Result<Self, ConfigurationError> {
        let base = proxy.trim_end_matches('/');
        let primary = format!(
            "{}:{}/{}",
            base, DEVELOPMENT_QUEUE_PORT, DEVELOPMENT_ACCOUNT_NAME
        );
        let secondary = format!("{}-secondary", primary);

        Ok(Self {
            account_name: DEVELOPMENT_ACCOUNT_NAME.to_string(),
            account_key: DEVELOPMENT_ACCOUNT_KEY.to_string(),
            queue_endpoint: parse_endpoint(&primary)?,
            secondary_queue_endpoint: Some(parse_endpoint(&secondary)?),
        })
    }

    /// Parse a storage connection string.
    ///
    /// Supports `UseDevelopmentStorage=true` (with an optional
    /// `DevelopmentStorageProxyUri`) and account strings carrying
    /// `AccountName` and `AccountKey`, with either an explicit `QueueEndpoint`
    /// or `DefaultEndpointsProtocol` and `EndpointSuffix`.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, ConfigurationError> {
        let mut settings = std::collections::HashMap::new();
        for part in connection_string.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| ConfigurationError::Parsing {
                message: format!("setting '{}' is not a key=value pair", redact_setting(part)),
            })?;
            settings.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        if settings
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return match settings.get("developmentstorageproxyuri") {
                Some(proxy) => Self::development_storage_at(proxy),
                None => Ok(Self::development_storage()),
            };
        }

        let account_name = settings
            .remove("accountname")
            .ok_or_else(|| ConfigurationError::Missing {
                key: "AccountName".to_string(),
            })?;
        let account_key = settings
            .remove("accountkey")
            .ok_or_else(|| ConfigurationError::Missing {
                key: "AccountKey".to_string(),
            })?;

        let (queue_endpoint, secondary_queue_endpoint) = match settings.get("queueendpoint") {
            Some(endpoint) => (parse_endpoint(endpoint)?, None),
            None => {
                let protocol = settings
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                if protocol != "https" && protocol != "http" {
                    return Err(ConfigurationError::Invalid {
                        message: format!("unsupported DefaultEndpointsProtocol '{}'", protocol),
                    });
                }
                let suffix = settings
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");

                let primary = parse_endpoint(&format!(
                    "{}://{}.queue.{}",
                    protocol, account_name, suffix
                ))?;
                let secondary = parse_endpoint(&format!(
                    "{}://{}-secondary.queue.{}",
                    protocol, account_name, suffix
                ))?;
                (primary, Some(secondary))
            }
        };

        Ok(Self {
            account_name,
            account_key,
            queue_endpoint,
            secondary_queue_endpoint,
        })
    }

    /// Get the base64 encoded account key
    pub fn account_key(&self) -> &str {
        &self.account_key
    }

    /// Whether this is the local storage emulator account
    pub fn is_development_storage(&self) -> bool {
        self.account_name == DEVELOPMENT_ACCOUNT_NAME
    }
}

impl fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAccount")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("queue_endpoint", &self.queue_endpoint.as_str())
            .field(
                "secondary_queue_endpoint",
                &self.secondary_queue_endpoint.as_ref().map(Url::as_str),
            )
            .finish()
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigurationError> {
    Url::parse(endpoint).map_err(|e| ConfigurationError::Invalid {
        message: format!("invalid queue endpoint '{}': {}", endpoint, e),
    })
}

/// Keep key names but never echo secret values into error messages
fn redact_setting(part: &str) -> String {
    if part.to_ascii_lowercase().starts_with("accountkey") {
        "AccountKey=<redacted>".to_string()
    } else {
        part.to_string()
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
