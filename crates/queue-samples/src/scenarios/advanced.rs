//! Service property, CORS, metadata and access policy scenarios.
//!
//! The service-wide scenarios restore what they found before returning, so a
//! successful run leaves the account's settings unchanged.

use super::SampleSettings;
use crate::runner::{Scenario, ScenarioError};
use async_trait::async_trait;
use chrono::Duration;
use queue_storage_client::{
    AccessPolicy, CorsRule, LoggingProperties, MetricsProperties, QueuePermissions,
    QueueServiceClient, RetentionPolicy, ServiceProperties, SignedIdentifiers, Timestamp,
};
use std::collections::BTreeMap;
use tracing::info;

#[cfg(test)]
#[path = "advanced_tests.rs"]
mod tests;

/// Days analytics data is kept by the sample settings
const SAMPLE_RETENTION_DAYS: u32 = 10;

/// Id of the stored access policy created by the samples
pub const SAMPLE_POLICY_ID: &str = "sampleIDForQueuePolicy";

// ============================================================================
// CORS
// ============================================================================

/// Install a permissive CORS rule, then put the original rules back
pub struct CorsScenario;

impl CorsScenario {
    /// Rule installed by the scenario
    pub fn sample_rule() -> CorsRule {
        CorsRule {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["POST", "GET", "HEAD", "PUT"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["*".to_string()],
            exposed_headers: vec!["*".to_string()],
            max_age_in_seconds: 3600,
        }
    }
}

#[async_trait]
impl Scenario for CorsScenario {
    fn name(&self) -> &str {
        "Queue CORS Sample"
    }

    async fn run(&self, client: &dyn QueueServiceClient) -> Result<(), ScenarioError> {
        let original = client.get_service_properties().await?;
        let original_rules = original.cors.unwrap_or_default();
        info!(rules = original_rules.len(), "Read CORS rules");

        client
            .set_service_properties(&ServiceProperties {
                cors: Some(vec![Self::sample_rule()]),
                ..Default::default()
            })
            .await?;
        info!("Installed sample CORS rule");

        client
            .set_service_properties(&ServiceProperties {
                cors: Some(original_rules),
                ..Default::default()
            })
            .await?;
        info!("Restored original CORS rules");

        Ok(())
    }
}

// ============================================================================
// Service Properties
// ============================================================================

/// Turn on analytics logging and metrics, then restore the original settings
pub struct ServicePropertiesScenario;

impl ServicePropertiesScenario {
    /// Logging and metrics installed by the scenario
    pub fn sample_properties() -> ServiceProperties {
        let metrics = MetricsProperties {
            version: "1.0".to_string(),
            enabled: true,
            include_apis: Some(true),
            retention_policy: RetentionPolicy::days(SAMPLE_RETENTION_DAYS),
        };

        ServiceProperties {
            logging: Some(LoggingProperties {
                version: "1.0".to_string(),
                delete: true,
                read: true,
                write: true,
                retention_policy: RetentionPolicy::days(SAMPLE_RETENTION_DAYS),
            }),
            hour_metrics: Some(metrics.clone()),
            minute_metrics: Some(metrics),
            cors: None,
        }
    }
}

#[async_trait]
impl Scenario for ServicePropertiesScenario {
    fn name(&self) -> &str {
        "Queue Service Properties Sample"
    }

    async fn run(&self, client: &dyn QueueServiceClient) -> Result<(), ScenarioError> {
        let original = client.get_service_properties().await?;
        info!(
            logging = original.logging.is_some(),
            hour_metrics = original.hour_metrics.is_some(),
            minute_metrics = original.minute_metrics.is_some(),
            "Read service properties"
        );

        client
            .set_service_properties(&Self::sample_properties())
            .await?;
        info!(
            retention_days = SAMPLE_RETENTION_DAYS,
            "Enabled analytics logging and metrics"
        );

        client.set_service_properties(&original).await?;
        info!("Restored original service properties");

        Ok(())
    }
}

// ============================================================================
// Queue Metadata
// ============================================================================

/// Set metadata on a queue and read it back
pub struct MetadataScenario {
    settings: SampleSettings,
}

impl MetadataScenario {
    pub fn new(settings: SampleSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Scenario for MetadataScenario {
    fn name(&self) -> &str {
        "Queue Metadata Sample"
    }

    async fn run(&self, client: &dyn QueueServiceClient) -> Result<(), ScenarioError> {
        let queue = self.settings.queue_name("myqueueformetadata")?;

        let created = client.create_queue_if_not_exists(&queue).await?;
        info!(queue = %queue, created, "Created queue");

        let metadata = BTreeMap::from([
            ("color".to_string(), "blue".to_string()),
            ("foo".to_string(), "Bar".to_string()),
        ]);
        client.set_queue_metadata(&queue, &metadata).await?;
        info!(queue = %queue, "Set queue metadata");

        let properties = client.get_queue_metadata(&queue).await?;
        let value = |key: &str| {
            properties.metadata.get(key).cloned().ok_or_else(|| {
                ScenarioError::unexpected(
                    "get_queue_metadata",
                    format!("metadata '{}' was not returned", key),
                )
            })
        };
        info!(
            queue = %queue,
            color = %value("color")?,
            foo = %value("foo")?,
            "Read queue metadata"
        );

        client.delete_queue(&queue).await?;
        info!(queue = %queue, "Deleted queue");

        Ok(())
    }
}

// ============================================================================
// Access Policies
// ============================================================================

/// Store an access policy on a queue and read it back
pub struct AccessPolicyScenario {
    settings: SampleSettings,
}

impl AccessPolicyScenario {
    pub fn new(settings: SampleSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Scenario for AccessPolicyScenario {
    fn name(&self) -> &str {
        "Queue Access Policy Sample"
    }

    async fn run(&self, client: &dyn QueueServiceClient) -> Result<(), ScenarioError> {
        let queue = self.settings.queue_name("myqueueforacl")?;

        let created = client.create_queue_if_not_exists(&queue).await?;
        info!(queue = %queue, created, "Created queue");

        let start = Timestamp::now();
        let identifiers = SignedIdentifiers::from([(
            SAMPLE_POLICY_ID.to_string(),
            AccessPolicy {
                start: Some(start),
                expiry: Some(start.plus(Duration::minutes(10))),
                permissions: QueuePermissions::PROCESS,
            },
        )]);
        client.set_queue_acl(&queue, &identifiers).await?;
        info!(queue = %queue, policy = SAMPLE_POLICY_ID, "Set queue access policy");

        let stored = client.get_queue_acl(&queue).await?;
        let policy = stored.get(SAMPLE_POLICY_ID).ok_or_else(|| {
            ScenarioError::unexpected(
                "get_queue_acl",
                format!("policy '{}' was not returned", SAMPLE_POLICY_ID),
            )
        })?;
        info!(
            queue = %queue,
            permissions = %policy.permissions,
            expiry = ?policy.expiry.map(|e| e.to_iso8601()),
            "Read queue access policy"
        );

        client.delete_queue(&queue).await?;
        info!(queue = %queue, "Deleted queue");

        Ok(())
    }
}
