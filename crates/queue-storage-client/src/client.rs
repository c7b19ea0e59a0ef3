//! Client trait for queue service operations and helpers built on it.

use crate::error::QueueError;
use crate::message::{
    ContinuationToken, GetMessagesOptions, ListQueuesOptions, MessageId, PeekedMessage,
    PopReceipt, QueueInfo, QueueMessage, QueueName, QueueProperties, QueueSegment,
    UpdatedMessage,
};
use crate::properties::{ServiceProperties, ServiceStats, SignedIdentifiers};
use crate::provider::{ClientConfig, ProviderConfig, ProviderType};
use crate::providers::{HttpQueueServiceClient, InMemoryQueueService};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Operations offered by the queue storage service.
///
/// Every call is a single attempt. Errors are returned as reported by the
/// service; nothing is retried.
#[async_trait]
pub trait QueueServiceClient: Send + Sync {
    /// Create queue, returning `false` when it already existed
    async fn create_queue_if_not_exists(&self, queue: &QueueName) -> Result<bool, QueueError>;

    /// Delete queue and every message in it
    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError>;

    /// Delete queue, returning `false` when it did not exist
    async fn delete_queue_if_exists(&self, queue: &QueueName) -> Result<bool, QueueError> {
        match self.delete_queue(queue).await {
            Ok(()) => Ok(true),
            Err(QueueError::QueueNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List one page of queues whose names start with `prefix`
    async fn list_queues_segmented(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&ContinuationToken>,
        options: &ListQueuesOptions,
    ) -> Result<QueueSegment, QueueError>;

    /// Replace the user-defined metadata of a queue
    async fn set_queue_metadata(
        &self,
        queue: &QueueName,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), QueueError>;

    /// Get the user-defined metadata and message count of a queue
    async fn get_queue_metadata(&self, queue: &QueueName) -> Result<QueueProperties, QueueError>;

    /// Append a message to the back of a queue
    async fn create_message(&self, queue: &QueueName, text: &str) -> Result<(), QueueError>;

    /// Dequeue visible messages, hiding them for the visibility timeout
    async fn get_messages(
        &self,
        queue: &QueueName,
        options: &GetMessagesOptions,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Dequeue a single message with default options
    async fn get_message(&self, queue: &QueueName) -> Result<Option<QueueMessage>, QueueError> {
        let messages = self
            .get_messages(queue, &GetMessagesOptions::default())
            .await?;
        Ok(messages.into_iter().next())
    }

    /// Look at visible messages without changing their visibility
    async fn peek_messages(
        &self,
        queue: &QueueName,
        count: u32,
    ) -> Result<Vec<PeekedMessage>, QueueError>;

    /// Replace the text of a dequeued message and reset its visibility.
    ///
    /// The receipt must come from the most recent dequeue or update of the
    /// message; the returned receipt supersedes it.
    async fn update_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
        visibility_timeout: Duration,
        text: &str,
    ) -> Result<UpdatedMessage, QueueError>;

    /// Delete a dequeued message
    async fn delete_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError>;

    /// Replace the stored access policies of a queue
    async fn set_queue_acl(
        &self,
        queue: &QueueName,
        identifiers: &SignedIdentifiers,
    ) -> Result<(), QueueError>;

    /// Get the stored access policies of a queue
    async fn get_queue_acl(&self, queue: &QueueName) -> Result<SignedIdentifiers, QueueError>;

    /// Get logging, metrics and CORS settings
    async fn get_service_properties(&self) -> Result<ServiceProperties, QueueError>;

    /// Write logging, metrics and CORS settings
    async fn set_service_properties(
        &self,
        properties: &ServiceProperties,
    ) -> Result<(), QueueError>;

    /// Get geo-replication statistics
    async fn get_service_stats(&self) -> Result<ServiceStats, QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// List every queue matching `prefix`, following continuation tokens.
///
/// Entries are returned in page order. Listing stops at the first page that
/// carries no continuation token.
pub async fn list_all_queues(
    client: &dyn QueueServiceClient,
    prefix: Option<&str>,
    options: &ListQueuesOptions,
) -> Result<Vec<QueueInfo>, QueueError> {
    let mut queues = Vec::new();
    let mut token: Option<ContinuationToken> = None;
    let mut page: u32 = 0;

    loop {
        let segment = client
            .list_queues_segmented(prefix, token.as_ref(), options)
            .await?;
        page += 1;

        info!(
            page,
            page_entries = segment.entries.len(),
            has_more = segment.continuation_token.is_some(),
            "Received queue listing segment"
        );

        queues.extend(segment.entries);
        match segment.continuation_token {
            Some(next) => token = Some(next),
            None => {
                debug!(pages = page, total = queues.len(), "Queue listing complete");
                return Ok(queues);
            }
        }
    }
}

/// Factory for creating queue service clients
pub struct QueueServiceClientFactory;

impl QueueServiceClientFactory {
    /// Create client from configuration
    pub fn create_client(config: ClientConfig) -> Result<Arc<dyn QueueServiceClient>, QueueError> {
        let client: Arc<dyn QueueServiceClient> = match config.provider {
            ProviderConfig::Http(account) => Arc::new(HttpQueueServiceClient::new(
                account,
                config.request_timeout,
            )?),
            ProviderConfig::InMemory => Arc::new(InMemoryQueueService::new()),
        };

        debug!(provider = %client.provider_type(), "Created queue service client");
        Ok(client)
    }

    /// Create test client backed by the in-memory service
    pub fn create_test_client() -> Arc<dyn QueueServiceClient> {
        Arc::new(InMemoryQueueService::new())
    }
}
