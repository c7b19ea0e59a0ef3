//! # Queue Storage Client
//!
//! Client for a cloud queue storage service, with an HTTP implementation that
//! signs requests with the account's shared key and an in-memory
//! implementation of the same contract.
//!
//! This library provides:
//! - Queue management: create, delete, paged listing, metadata
//! - Message operations: put, get, peek, update and delete with pop receipts
//! - Stored access policies per queue
//! - Service properties (logging, metrics, CORS) and replication statistics
//! - Connection string parsing, including the local development emulator
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Queue names, messages and receipts
//! - [`properties`] - Service properties and access policies
//! - [`provider`] - Provider types, accounts and configuration
//! - [`client`] - Client trait and factory
//! - [`providers`] - HTTP and in-memory implementations

pub mod client;
pub mod error;
pub mod message;
pub mod properties;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{list_all_queues, QueueServiceClient, QueueServiceClientFactory};
pub use error::{ConfigurationError, QueueError, ValidationError};
pub use message::{
    ContinuationToken, GetMessagesOptions, ListQueuesOptions, MessageId, PeekedMessage,
    PopReceipt, QueueInfo, QueueMessage, QueueName, QueueProperties, QueueSegment, Timestamp,
    UpdatedMessage,
};
pub use properties::{
    AccessPolicy, CorsRule, GeoReplication, LoggingProperties, MetricsProperties,
    QueuePermissions, RetentionPolicy, ServiceProperties, ServiceStats, SignedIdentifiers,
};
pub use provider::{
    ClientConfig, ProviderConfig, ProviderType, StorageAccount, DEVELOPMENT_ACCOUNT_KEY,
    DEVELOPMENT_ACCOUNT_NAME, DEVELOPMENT_QUEUE_PORT,
};
pub use providers::{HttpQueueServiceClient, InMemoryQueueService};
