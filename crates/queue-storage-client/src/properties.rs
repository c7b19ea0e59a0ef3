//! Service properties, CORS rules, statistics and queue access policies.

use crate::error::ValidationError;
use crate::message::Timestamp;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Service Properties
// ============================================================================

/// Queue service settings for analytics logging, metrics and CORS.
///
/// Sections left as `None` are omitted when the properties are written, which
/// leaves the service's current value for that section untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceProperties {
    pub logging: Option<LoggingProperties>,
    pub hour_metrics: Option<MetricsProperties>,
    pub minute_metrics: Option<MetricsProperties>,
    /// `Some(vec![])` clears every CORS rule
    pub cors: Option<Vec<CorsRule>>,
}

/// Analytics logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingProperties {
    pub version: String,
    pub delete: bool,
    pub read: bool,
    pub write: bool,
    pub retention_policy: RetentionPolicy,
}

impl Default for LoggingProperties {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            delete: false,
            read: false,
            write: false,
            retention_policy: RetentionPolicy::disabled(),
        }
    }
}

/// Hour or minute metrics settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsProperties {
    pub version: String,
    pub enabled: bool,
    /// Only meaningful while metrics are enabled
    pub include_apis: Option<bool>,
    pub retention_policy: RetentionPolicy,
}

impl Default for MetricsProperties {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            enabled: false,
            include_apis: None,
            retention_policy: RetentionPolicy::disabled(),
        }
    }
}

/// How long analytics data is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub days: Option<u32>,
}

impl RetentionPolicy {
    /// Keep data for the given number of days
    pub fn days(days: u32) -> Self {
        Self {
            enabled: true,
            days: Some(days),
        }
    }

    /// Keep data indefinitely
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            days: None,
        }
    }
}

/// Cross-origin resource sharing rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub max_age_in_seconds: u32,
}

impl CorsRule {
    /// Service limit on CORS rules per account
    pub const MAX_RULES: usize = 5;

    /// Check the rule against the methods the service accepts
    pub fn validate(&self) -> Result<(), ValidationError> {
        const METHODS: [&str; 7] = ["DELETE", "GET", "HEAD", "MERGE", "POST", "OPTIONS", "PUT"];

        if self.allowed_origins.is_empty() {
            return Err(ValidationError::Required {
                field: "allowed_origins".to_string(),
            });
        }

        if let Some(method) = self
            .allowed_methods
            .iter()
            .find(|m| !METHODS.contains(&m.as_str()))
        {
            return Err(ValidationError::InvalidFormat {
                field: "allowed_methods".to_string(),
                message: format!("unsupported method '{}'", method),
            });
        }

        Ok(())
    }
}

impl ServiceProperties {
    /// Check every section is acceptable to the service
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(rules) = &self.cors {
            if rules.len() > CorsRule::MAX_RULES {
                return Err(ValidationError::OutOfRange {
                    field: "cors".to_string(),
                    message: format!("at most {} rules allowed", CorsRule::MAX_RULES),
                });
            }
            for rule in rules {
                rule.validate()?;
            }
        }

        let retention_policies = self
            .logging
            .iter()
            .map(|l| &l.retention_policy)
            .chain(self.hour_metrics.iter().map(|m| &m.retention_policy))
            .chain(self.minute_metrics.iter().map(|m| &m.retention_policy));

        for policy in retention_policies {
            if let Some(days) = policy.days {
                if !(1..=365).contains(&days) {
                    return Err(ValidationError::OutOfRange {
                        field: "retention_policy.days".to_string(),
                        message: "must be 1-365".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Geo-replication statistics of the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStats {
    pub geo_replication: GeoReplication,
}

/// Secondary replication state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoReplication {
    /// `live`, `bootstrap` or `unavailable`
    pub status: String,
    pub last_sync_time: Option<Timestamp>,
}

// ============================================================================
// Access Policies
// ============================================================================

/// Permissions granted by a stored access policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuePermissions {
    pub read: bool,
    pub add: bool,
    pub update: bool,
    pub process: bool,
}

impl QueuePermissions {
    /// Permission to dequeue and delete messages
    pub const PROCESS: Self = Self {
        read: false,
        add: false,
        update: false,
        process: true,
    };

    /// Every queue permission
    pub const ALL: Self = Self {
        read: true,
        add: true,
        update: true,
        process: true,
    };
}

impl fmt::Display for QueuePermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Service requires the canonical r-a-u-p order
        let flags = [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.update, 'u'),
            (self.process, 'p'),
        ];
        for (set, flag) in flags {
            if set {
                write!(f, "{}", flag)?;
            }
        }
        Ok(())
    }
}

impl FromStr for QueuePermissions {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut permissions = Self::default();
        for c in s.chars() {
            match c {
                'r' => permissions.read = true,
                'a' => permissions.add = true,
                'u' => permissions.update = true,
                'p' => permissions.process = true,
                other => {
                    return Err(ValidationError::InvalidFormat {
                        field: "permissions".to_string(),
                        message: format!("unknown permission '{}'", other),
                    })
                }
            }
        }
        Ok(permissions)
    }
}

/// Stored access policy attached to a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub start: Option<Timestamp>,
    pub expiry: Option<Timestamp>,
    pub permissions: QueuePermissions,
}

/// Policy id to access policy
pub type SignedIdentifiers = BTreeMap<String, AccessPolicy>;

/// Service limit on stored access policies per queue
pub const MAX_SIGNED_IDENTIFIERS: usize = 5;

/// Check a set of access policies can be stored on a queue
pub fn validate_signed_identifiers(identifiers: &SignedIdentifiers) -> Result<(), ValidationError> {
    if identifiers.len() > MAX_SIGNED_IDENTIFIERS {
        return Err(ValidationError::OutOfRange {
            field: "signed_identifiers".to_string(),
            message: format!("at most {} policies allowed", MAX_SIGNED_IDENTIFIERS),
        });
    }

    if let Some(id) = identifiers.keys().find(|id| id.is_empty() || id.len() > 64) {
        return Err(ValidationError::OutOfRange {
            field: "signed_identifier.id".to_string(),
            message: format!("'{}' must be 1-64 characters", id),
        });
    }

    Ok(())
}

#[cfg(test)]
#[path = "properties_tests.rs"]
mod tests;
