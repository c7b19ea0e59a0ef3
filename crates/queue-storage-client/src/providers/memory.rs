//! In-memory queue service for testing and development.
//!
//! Emulates the service contract closely enough for the samples to run
//! without a storage account:
//! - Queues, metadata and stored access policies per queue
//! - FIFO delivery with visibility timeouts and a seven day message TTL
//! - Pop receipts that are replaced on every dequeue and update
//! - Lexicographic, marker-based queue listing
//! - Service properties and replication statistics

use crate::client::QueueServiceClient;
use crate::error::{QueueError, ValidationError};
use crate::message::{
    validate_message_count, validate_visibility_timeout, ContinuationToken, GetMessagesOptions,
    ListQueuesOptions, MessageId, PeekedMessage, PopReceipt, QueueInfo, QueueMessage, QueueName,
    QueueProperties, QueueSegment, Timestamp, UpdatedMessage,
};
use crate::properties::{
    validate_signed_identifiers, GeoReplication, LoggingProperties, MetricsProperties,
    ServiceProperties, ServiceStats, SignedIdentifiers,
};
use crate::provider::ProviderType;
use async_trait::async_trait;
use chrono::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Largest page a listing may request
pub const MAX_LIST_RESULTS: u32 = 5000;

/// Largest message text accepted, in bytes
pub const MAX_MESSAGE_TEXT_BYTES: usize = 64 * 1024;

const MESSAGE_TIME_TO_LIVE_DAYS: i64 = 7;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Shared state of the emulated service
struct ServiceState {
    queues: BTreeMap<QueueName, StoredQueue>,
    properties: ServiceProperties,
}

impl ServiceState {
    fn new() -> Self {
        Self {
            queues: BTreeMap::new(),
            properties: ServiceProperties {
                logging: Some(LoggingProperties::default()),
                hour_metrics: Some(MetricsProperties::default()),
                minute_metrics: Some(MetricsProperties::default()),
                cors: Some(Vec::new()),
            },
        }
    }

    fn queue(&self, name: &QueueName) -> Result<&StoredQueue, QueueError> {
        self.queues.get(name).ok_or_else(|| queue_not_found(name))
    }

    fn queue_mut(&mut self, name: &QueueName) -> Result<&mut StoredQueue, QueueError> {
        let queue = self
            .queues
            .get_mut(name)
            .ok_or_else(|| queue_not_found(name))?;
        queue.purge_expired(Timestamp::now());
        Ok(queue)
    }
}

/// State of a single queue
#[derive(Default)]
struct StoredQueue {
    metadata: BTreeMap<String, String>,
    acl: SignedIdentifiers,
    /// Insertion order
    messages: Vec<StoredMessage>,
}

impl StoredQueue {
    fn purge_expired(&mut self, now: Timestamp) {
        self.messages.retain(|m| m.expiration_time > now);
    }

    fn visible(&self, now: Timestamp) -> impl Iterator<Item = &StoredMessage> {
        self.messages
            .iter()
            .filter(move |m| m.expiration_time > now && m.time_next_visible <= now)
    }

    /// Find a message and check the receipt is the latest one issued for it
    fn authorize(
        &mut self,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<usize, QueueError> {
        let index = self
            .messages
            .iter()
            .position(|m| &m.message_id == message_id)
            .ok_or_else(|| QueueError::MessageNotFound {
                message_id: message_id.to_string(),
            })?;

        match &self.messages[index].pop_receipt {
            Some(current) if current == pop_receipt => Ok(index),
            _ => Err(QueueError::PopReceiptMismatch {
                message_id: message_id.to_string(),
            }),
        }
    }
}

/// A message stored in a queue
struct StoredMessage {
    message_id: MessageId,
    text: String,
    insertion_time: Timestamp,
    expiration_time: Timestamp,
    time_next_visible: Timestamp,
    dequeue_count: u32,
    /// Issued by the latest dequeue or update; `None` until first dequeued
    pop_receipt: Option<PopReceipt>,
}

impl StoredMessage {
    fn new(text: &str, now: Timestamp) -> Self {
        Self {
            message_id: MessageId::new(),
            text: text.to_string(),
            insertion_time: now,
            expiration_time: now.plus(Duration::days(MESSAGE_TIME_TO_LIVE_DAYS)),
            time_next_visible: now,
            dequeue_count: 0,
            pop_receipt: None,
        }
    }

    fn peeked(&self) -> PeekedMessage {
        PeekedMessage {
            message_id: self.message_id.clone(),
            message_text: self.text.clone(),
            insertion_time: self.insertion_time,
            expiration_time: self.expiration_time,
            dequeue_count: self.dequeue_count,
        }
    }
}

fn queue_not_found(name: &QueueName) -> QueueError {
    QueueError::QueueNotFound {
        queue_name: name.to_string(),
    }
}

fn validate_message_text(text: &str) -> Result<(), ValidationError> {
    if text.len() > MAX_MESSAGE_TEXT_BYTES {
        return Err(ValidationError::OutOfRange {
            field: "message_text".to_string(),
            message: format!(
                "{} bytes exceeds the {} byte limit",
                text.len(),
                MAX_MESSAGE_TEXT_BYTES
            ),
        });
    }
    Ok(())
}

// ============================================================================
// In-Memory Service
// ============================================================================

/// Process-local queue service
///
/// Clones share the same storage, so a clone handed to a test observes every
/// change made through the original.
#[derive(Clone)]
pub struct InMemoryQueueService {
    state: Arc<RwLock<ServiceState>>,
}

impl InMemoryQueueService {
    /// Create an empty service
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ServiceState::new())),
        }
    }

    /// Names of every queue, in listing order
    pub async fn queue_names(&self) -> Vec<QueueName> {
        self.state.read().await.queues.keys().cloned().collect()
    }
}

impl Default for InMemoryQueueService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueServiceClient for InMemoryQueueService {
    async fn create_queue_if_not_exists(&self, queue: &QueueName) -> Result<bool, QueueError> {
        let mut state = self.state.write().await;
        if state.queues.contains_key(queue) {
            return Ok(false);
        }
        state.queues.insert(queue.clone(), StoredQueue::default());
        Ok(true)
    }

    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        state
            .queues
            .remove(queue)
            .map(|_| ())
            .ok_or_else(|| queue_not_found(queue))
    }

    async fn list_queues_segmented(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&ContinuationToken>,
        options: &ListQueuesOptions,
    ) -> Result<QueueSegment, QueueError> {
        let page_size = options.max_results.unwrap_or(MAX_LIST_RESULTS);
        if page_size == 0 || page_size > MAX_LIST_RESULTS {
            return Err(ValidationError::OutOfRange {
                field: "max_results".to_string(),
                message: format!("must be 1-{}", MAX_LIST_RESULTS),
            }
            .into());
        }
        let page_size = page_size as usize;

        let state = self.state.read().await;
        let prefix = prefix.unwrap_or_default();

        // The marker names the first queue of the next page
        let mut matching = state
            .queues
            .iter()
            .filter(|(name, _)| {
                continuation_token.map_or(true, |marker| name.as_str() >= marker.as_str())
            })
            .filter(|(name, _)| name.as_str().starts_with(prefix));

        let entries: Vec<QueueInfo> = matching
            .by_ref()
            .take(page_size)
            .map(|(name, queue)| QueueInfo {
                name: name.to_string(),
                metadata: if options.include_metadata {
                    queue.metadata.clone()
                } else {
                    BTreeMap::new()
                },
            })
            .collect();

        let continuation_token = matching
            .next()
            .map(|(name, _)| ContinuationToken::new(name.as_str()));

        Ok(QueueSegment {
            entries,
            continuation_token,
        })
    }

    async fn set_queue_metadata(
        &self,
        queue: &QueueName,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        state.queue_mut(queue)?.metadata = metadata.clone();
        Ok(())
    }

    async fn get_queue_metadata(&self, queue: &QueueName) -> Result<QueueProperties, QueueError> {
        let now = Timestamp::now();
        let state = self.state.read().await;
        let stored = state.queue(queue)?;

        Ok(QueueProperties {
            metadata: stored.metadata.clone(),
            approximate_message_count: stored
                .messages
                .iter()
                .filter(|m| m.expiration_time > now)
                .count() as u64,
        })
    }

    async fn create_message(&self, queue: &QueueName, text: &str) -> Result<(), QueueError> {
        validate_message_text(text)?;

        let mut state = self.state.write().await;
        state
            .queue_mut(queue)?
            .messages
            .push(StoredMessage::new(text, Timestamp::now()));
        Ok(())
    }

    async fn get_messages(
        &self,
        queue: &QueueName,
        options: &GetMessagesOptions,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        options.validate()?;

        let now = Timestamp::now();
        let mut state = self.state.write().await;
        let stored = state.queue_mut(queue)?;

        let mut dequeued = Vec::new();
        for message in stored
            .messages
            .iter_mut()
            .filter(|m| m.time_next_visible <= now)
            .take(options.number_of_messages as usize)
        {
            let receipt = PopReceipt::generate();
            message.dequeue_count += 1;
            message.time_next_visible = now.plus(options.visibility_timeout);
            message.pop_receipt = Some(receipt.clone());

            dequeued.push(QueueMessage {
                message_id: message.message_id.clone(),
                pop_receipt: receipt,
                message_text: message.text.clone(),
                insertion_time: message.insertion_time,
                expiration_time: message.expiration_time,
                time_next_visible: message.time_next_visible,
                dequeue_count: message.dequeue_count,
            });
        }

        Ok(dequeued)
    }

    async fn peek_messages(
        &self,
        queue: &QueueName,
        count: u32,
    ) -> Result<Vec<PeekedMessage>, QueueError> {
        validate_message_count(count)?;

        let now = Timestamp::now();
        let state = self.state.read().await;
        Ok(state
            .queue(queue)?
            .visible(now)
            .take(count as usize)
            .map(StoredMessage::peeked)
            .collect())
    }

    async fn update_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
        visibility_timeout: Duration,
        text: &str,
    ) -> Result<UpdatedMessage, QueueError> {
        validate_visibility_timeout(visibility_timeout)?;
        validate_message_text(text)?;

        let now = Timestamp::now();
        let mut state = self.state.write().await;
        let stored = state.queue_mut(queue)?;
        let index = stored.authorize(message_id, pop_receipt)?;

        let message = &mut stored.messages[index];
        let receipt = PopReceipt::generate();
        message.text = text.to_string();
        message.time_next_visible = now.plus(visibility_timeout);
        message.pop_receipt = Some(receipt.clone());

        Ok(UpdatedMessage {
            pop_receipt: receipt,
            time_next_visible: message.time_next_visible,
        })
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        let stored = state.queue_mut(queue)?;
        let index = stored.authorize(message_id, pop_receipt)?;
        stored.messages.remove(index);
        Ok(())
    }

    async fn set_queue_acl(
        &self,
        queue: &QueueName,
        identifiers: &SignedIdentifiers,
    ) -> Result<(), QueueError> {
        validate_signed_identifiers(identifiers)?;

        let mut state = self.state.write().await;
        state.queue_mut(queue)?.acl = identifiers.clone();
        Ok(())
    }

    async fn get_queue_acl(&self, queue: &QueueName) -> Result<SignedIdentifiers, QueueError> {
        let state = self.state.read().await;
        Ok(state.queue(queue)?.acl.clone())
    }

    async fn get_service_properties(&self) -> Result<ServiceProperties, QueueError> {
        Ok(self.state.read().await.properties.clone())
    }

    async fn set_service_properties(
        &self,
        properties: &ServiceProperties,
    ) -> Result<(), QueueError> {
        properties.validate()?;

        let mut state = self.state.write().await;
        let current = &mut state.properties;
        if let Some(logging) = &properties.logging {
            current.logging = Some(logging.clone());
        }
        if let Some(metrics) = &properties.hour_metrics {
            current.hour_metrics = Some(metrics.clone());
        }
        if let Some(metrics) = &properties.minute_metrics {
            current.minute_metrics = Some(metrics.clone());
        }
        if let Some(cors) = &properties.cors {
            current.cors = Some(cors.clone());
        }
        Ok(())
    }

    async fn get_service_stats(&self) -> Result<ServiceStats, QueueError> {
        Ok(ServiceStats {
            geo_replication: GeoReplication {
                status: "live".to_string(),
                last_sync_time: Some(Timestamp::now()),
            },
        })
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

