//! Common test utilities for queue samples integration tests
//!
//! This module provides:
//! - A fault-injecting client wrapped around the in-memory service
//! - Helpers for building queue names

use async_trait::async_trait;
use chrono::Duration;
use queue_storage_client::{
    ContinuationToken, GetMessagesOptions, InMemoryQueueService, ListQueuesOptions, MessageId,
    PeekedMessage, PopReceipt, ProviderType, QueueError, QueueMessage, QueueName,
    QueueProperties, QueueSegment, QueueServiceClient, ServiceProperties, ServiceStats,
    SignedIdentifiers, UpdatedMessage,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[allow(dead_code)]
pub fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

// ============================================================================
// Fault-injecting Client
// ============================================================================

/// How an injected fault behaves
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum Fault {
    /// The operation fails with the error built by the function
    Fail(fn() -> QueueError),
    /// Dequeues succeed but return no messages
    EmptyDequeue,
}

/// In-memory service that records every call and can fail one operation
#[derive(Clone)]
#[allow(dead_code)]
pub struct FaultyQueueService {
    inner: InMemoryQueueService,
    calls: Arc<Mutex<Vec<&'static str>>>,
    fault: Arc<Mutex<Option<(&'static str, Fault)>>>,
}

impl FaultyQueueService {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            inner: InMemoryQueueService::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fault: Arc::new(Mutex::new(None)),
        }
    }

    /// Inject a fault into every later call of `operation`
    #[allow(dead_code)]
    pub fn inject(&self, operation: &'static str, fault: Fault) {
        *self.fault.lock().unwrap() = Some((operation, fault));
    }

    /// Operations called so far, in order
    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// The wrapped service, for inspecting state
    #[allow(dead_code)]
    pub fn inner(&self) -> &InMemoryQueueService {
        &self.inner
    }

    fn enter(&self, operation: &'static str) -> Result<Option<Fault>, QueueError> {
        self.calls.lock().unwrap().push(operation);
        match *self.fault.lock().unwrap() {
            Some((name, Fault::Fail(make_error))) if name == operation => Err(make_error()),
            Some((name, fault)) if name == operation => Ok(Some(fault)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl QueueServiceClient for FaultyQueueService {
    async fn create_queue_if_not_exists(&self, queue: &QueueName) -> Result<bool, QueueError> {
        self.enter("create_queue_if_not_exists")?;
        self.inner.create_queue_if_not_exists(queue).await
    }

    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        self.enter("delete_queue")?;
        self.inner.delete_queue(queue).await
    }

    async fn list_queues_segmented(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&ContinuationToken>,
        options: &ListQueuesOptions,
    ) -> Result<QueueSegment, QueueError> {
        self.enter("list_queues_segmented")?;
        self.inner
            .list_queues_segmented(prefix, continuation_token, options)
            .await
    }

    async fn set_queue_metadata(
        &self,
        queue: &QueueName,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), QueueError> {
        self.enter("set_queue_metadata")?;
        self.inner.set_queue_metadata(queue, metadata).await
    }

    async fn get_queue_metadata(&self, queue: &QueueName) -> Result<QueueProperties, QueueError> {
        self.enter("get_queue_metadata")?;
        self.inner.get_queue_metadata(queue).await
    }

    async fn create_message(&self, queue: &QueueName, text: &str) -> Result<(), QueueError> {
        self.enter("create_message")?;
        self.inner.create_message(queue, text).await
    }

    async fn get_messages(
        &self,
        queue: &QueueName,
        options: &GetMessagesOptions,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        if let Some(Fault::EmptyDequeue) = self.enter("get_messages")? {
            return Ok(Vec::new());
        }
        self.inner.get_messages(queue, options).await
    }

    async fn peek_messages(
        &self,
        queue: &QueueName,
        count: u32,
    ) -> Result<Vec<PeekedMessage>, QueueError> {
        self.enter("peek_messages")?;
        self.inner.peek_messages(queue, count).await
    }

    async fn update_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
        visibility_timeout: Duration,
        text: &str,
    ) -> Result<UpdatedMessage, QueueError> {
        self.enter("update_message")?;
        self.inner
            .update_message(queue, message_id, pop_receipt, visibility_timeout, text)
            .await
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        self.enter("delete_message")?;
        self.inner
            .delete_message(queue, message_id, pop_receipt)
            .await
    }

    async fn set_queue_acl(
        &self,
        queue: &QueueName,
        identifiers: &SignedIdentifiers,
    ) -> Result<(), QueueError> {
        self.enter("set_queue_acl")?;
        self.inner.set_queue_acl(queue, identifiers).await
    }

    async fn get_queue_acl(&self, queue: &QueueName) -> Result<SignedIdentifiers, QueueError> {
        self.enter("get_queue_acl")?;
        self.inner.get_queue_acl(queue).await
    }

    async fn get_service_properties(&self) -> Result<ServiceProperties, QueueError> {
        self.enter("get_service_properties")?;
        self.inner.get_service_properties().await
    }

    async fn set_service_properties(
        &self,
        properties: &ServiceProperties,
    ) -> Result<(), QueueError> {
        self.enter("set_service_properties")?;
        self.inner.set_service_properties(properties).await
    }

    async fn get_service_stats(&self) -> Result<ServiceStats, QueueError> {
        self.enter("get_service_stats")?;
        self.inner.get_service_stats().await
    }

    fn provider_type(&self) -> ProviderType {
        self.inner.provider_type()
    }
}
