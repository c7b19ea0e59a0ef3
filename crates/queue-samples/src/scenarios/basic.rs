//! Queue and message scenarios.

use super::SampleSettings;
use crate::runner::{Scenario, ScenarioError};
use async_trait::async_trait;
use chrono::Duration;
use queue_storage_client::{list_all_queues, ListQueuesOptions, QueueServiceClient};
use tracing::info;

#[cfg(test)]
#[path = "basic_tests.rs"]
mod tests;

/// Visibility timeout given to the updated message
const UPDATED_MESSAGE_VISIBILITY_SECONDS: i64 = 10;

// ============================================================================
// Queue Operations
// ============================================================================

/// Create three queues, list them page by page, then delete them
pub struct QueueOperationsScenario {
    settings: SampleSettings,
}

impl QueueOperationsScenario {
    pub fn new(settings: SampleSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Scenario for QueueOperationsScenario {
    fn name(&self) -> &str {
        "Basic Operations on Queue"
    }

    async fn run(&self, client: &dyn QueueServiceClient) -> Result<(), ScenarioError> {
        let queues = ["1", "2", "3"]
            .iter()
            .map(|suffix| self.settings.queue_name(suffix))
            .collect::<Result<Vec<_>, _>>()?;

        for queue in &queues {
            let created = client.create_queue_if_not_exists(queue).await?;
            info!(queue = %queue, created, "Created queue");
        }

        let prefix = self.settings.queue_prefix.as_str();
        let options = ListQueuesOptions::new()
            .with_max_results(self.settings.list_page_size)
            .with_metadata();

        let listed = list_all_queues(client, Some(prefix), &options).await?;
        for entry in &listed {
            info!(queue = %entry.name, metadata = ?entry.metadata, "Listed queue");
        }
        info!(prefix, total = listed.len(), "Listed queues");

        if let Some(missing) = queues
            .iter()
            .find(|q| !listed.iter().any(|entry| entry.name == q.as_str()))
        {
            return Err(ScenarioError::unexpected(
                "list_queues_segmented",
                format!("created queue '{}' was not listed", missing),
            ));
        }

        for queue in &queues {
            client.delete_queue(queue).await?;
            info!(queue = %queue, "Deleted queue");
        }

        Ok(())
    }
}

// ============================================================================
// Message Operations
// ============================================================================

/// Post, dequeue, peek, update and delete messages on one queue
pub struct MessageOperationsScenario {
    settings: SampleSettings,
}

impl MessageOperationsScenario {
    pub fn new(settings: SampleSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Scenario for MessageOperationsScenario {
    fn name(&self) -> &str {
        "Basic Operations on Queue Messages"
    }

    async fn run(&self, client: &dyn QueueServiceClient) -> Result<(), ScenarioError> {
        let queue = self.settings.queue_name("myqueueformessages")?;

        let created = client.create_queue_if_not_exists(&queue).await?;
        info!(queue = %queue, created, "Created queue");

        for text in ["Hello world", "Hello world again"] {
            client.create_message(&queue, text).await?;
            info!(queue = %queue, text, "Posted message");
        }

        let message = client
            .get_message(&queue)
            .await?
            .ok_or_else(|| ScenarioError::unexpected("get_message", "queue returned no message"))?;
        info!(
            message_id = %message.message_id,
            text = %message.message_text,
            dequeue_count = message.dequeue_count,
            "Dequeued message"
        );

        client
            .delete_message(&queue, &message.message_id, &message.pop_receipt)
            .await?;
        info!(message_id = %message.message_id, "Deleted message");

        let peeked = client.peek_messages(&queue, 1).await?;
        let next = peeked
            .first()
            .ok_or_else(|| ScenarioError::unexpected("peek_messages", "queue returned no message"))?;
        info!(message_id = %next.message_id, text = %next.message_text, "Peeked message");

        let message = client
            .get_message(&queue)
            .await?
            .ok_or_else(|| ScenarioError::unexpected("get_message", "queue returned no message"))?;

        let updated = client
            .update_message(
                &queue,
                &message.message_id,
                &message.pop_receipt,
                Duration::seconds(UPDATED_MESSAGE_VISIBILITY_SECONDS),
                "new text",
            )
            .await?;
        info!(
            message_id = %message.message_id,
            next_visible = %updated.time_next_visible,
            "Updated message text"
        );

        client.delete_queue(&queue).await?;
        info!(queue = %queue, "Deleted queue");

        Ok(())
    }
}

// ============================================================================
// Delete Queue
// ============================================================================

/// Create a queue and remove it with delete-if-exists
pub struct DeleteQueueScenario {
    settings: SampleSettings,
}

impl DeleteQueueScenario {
    pub fn new(settings: SampleSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Scenario for DeleteQueueScenario {
    fn name(&self) -> &str {
        "Delete Queue"
    }

    async fn run(&self, client: &dyn QueueServiceClient) -> Result<(), ScenarioError> {
        let queue = self.settings.queue_name("myqueuedelete")?;

        let created = client.create_queue_if_not_exists(&queue).await?;
        info!(queue = %queue, created, "Created queue");

        let deleted = client.delete_queue_if_exists(&queue).await?;
        info!(queue = %queue, deleted, "Deleted queue if it existed");

        Ok(())
    }
}
