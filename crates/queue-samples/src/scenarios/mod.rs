//! The sample scenarios, in the order they run.
//!
//! The basic suite covers queue and message operations. The advanced suite
//! covers service properties, CORS, queue metadata and access policies.

use crate::runner::{Scenario, ScenarioError};
use queue_storage_client::{QueueError, QueueName, ValidationError};
use serde::{Deserialize, Serialize};

pub mod advanced;
pub mod basic;

pub use advanced::{
    AccessPolicyScenario, CorsScenario, MetadataScenario, ServicePropertiesScenario,
};
pub use basic::{DeleteQueueScenario, MessageOperationsScenario, QueueOperationsScenario};

/// Suffixes of every queue the scenarios create
pub const QUEUE_SUFFIXES: [&str; 7] = [
    "1",
    "2",
    "3",
    "myqueueformessages",
    "myqueuedelete",
    "myqueueformetadata",
    "myqueueforacl",
];

/// Largest page a queue listing may request
const MAX_LIST_PAGE_SIZE: u32 = 5000;

/// Settings shared by every scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleSettings {
    /// Prepended to every queue name the samples create
    pub queue_prefix: String,
    /// Page size used when listing queues
    pub list_page_size: u32,
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self {
            queue_prefix: "storagesampleforqueue".to_string(),
            list_page_size: 2,
        }
    }
}

impl SampleSettings {
    /// Queue name made from the prefix and a suffix
    pub fn queue_name(&self, suffix: &str) -> Result<QueueName, ScenarioError> {
        QueueName::with_prefix(&self.queue_prefix, suffix)
            .map_err(|e| ScenarioError::Queue(QueueError::from(e)))
    }

    /// Check the prefix forms a valid name with every suffix and the page size is accepted
    pub fn validate(&self) -> Result<(), ValidationError> {
        for suffix in QUEUE_SUFFIXES {
            QueueName::with_prefix(&self.queue_prefix, suffix)?;
        }

        if self.list_page_size == 0 || self.list_page_size > MAX_LIST_PAGE_SIZE {
            return Err(ValidationError::OutOfRange {
                field: "list_page_size".to_string(),
                message: format!("must be 1-{}", MAX_LIST_PAGE_SIZE),
            });
        }

        Ok(())
    }
}

/// Scenarios that exercise queues and messages
pub fn basic_scenarios(settings: &SampleSettings) -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(QueueOperationsScenario::new(settings.clone())),
        Box::new(MessageOperationsScenario::new(settings.clone())),
        Box::new(DeleteQueueScenario::new(settings.clone())),
    ]
}

/// Scenarios that exercise service settings, metadata and access policies
pub fn advanced_scenarios(settings: &SampleSettings) -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(CorsScenario),
        Box::new(ServicePropertiesScenario),
        Box::new(MetadataScenario::new(settings.clone())),
        Box::new(AccessPolicyScenario::new(settings.clone())),
    ]
}

/// Every scenario: the basic suite, then the advanced suite
pub fn default_scenarios(settings: &SampleSettings) -> Vec<Box<dyn Scenario>> {
    let mut scenarios = basic_scenarios(settings);
    scenarios.extend(advanced_scenarios(settings));
    scenarios
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
