//! Queue and message types including core domain identifiers.

use crate::error::ValidationError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name.
///
/// Queue names are 3-63 characters of lowercase ASCII letters, digits and
/// hyphens. They start and end with a letter or digit and never contain two
/// consecutive hyphens.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.len() < 3 || name.len() > 63 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 3-63 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only lowercase ASCII letters, digits, and hyphens allowed".to_string(),
            });
        }

        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Create queue name by appending a suffix to a prefix
    pub fn with_prefix(prefix: &str, suffix: &str) -> Result<Self, ValidationError> {
        Self::new(format!("{}{}", prefix, suffix))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Service-assigned identifier of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token identifying one dequeued instance of a message.
///
/// Required to delete or update that instance. A receipt is invalidated by the
/// delete or update it authorises and by any later dequeue of the same message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PopReceipt(String);

impl PopReceipt {
    /// Wrap a receipt string returned by the service
    pub fn new(receipt: impl Into<String>) -> Self {
        Self(receipt.into())
    }

    /// Generate a fresh random receipt
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get receipt as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PopReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque listing cursor returned with a partial page of results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Wrap a marker returned by the service
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    /// Get marker as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp offset from this one
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }

    /// Parse an HTTP date such as `Wed, 09 Jun 2021 10:18:14 GMT`
    pub fn parse_rfc1123(s: &str) -> Result<Self, ValidationError> {
        DateTime::parse_from_rfc2822(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| ValidationError::InvalidFormat {
                field: "timestamp".to_string(),
                message: format!("'{}' is not an HTTP date: {}", s, e),
            })
    }

    /// Format as an HTTP date
    pub fn to_rfc1123(&self) -> String {
        self.0.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Format as ISO 8601 with a `Z` suffix, as used by access policies
    pub fn to_iso8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Queue Types
// ============================================================================

/// Queue entry returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    /// Only populated when the listing asked for metadata
    pub metadata: BTreeMap<String, String>,
}

impl QueueInfo {
    /// Create queue entry without metadata
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// One page of a queue listing
#[derive(Debug, Clone, Default)]
pub struct QueueSegment {
    pub entries: Vec<QueueInfo>,
    /// Present when more results remain
    pub continuation_token: Option<ContinuationToken>,
}

/// User-defined metadata and statistics of a queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueProperties {
    pub metadata: BTreeMap<String, String>,
    pub approximate_message_count: u64,
}

/// Options for listing queues
#[derive(Debug, Clone, Default)]
pub struct ListQueuesOptions {
    /// Page size; the service default (5000) applies when unset
    pub max_results: Option<u32>,
    pub include_metadata: bool,
}

impl ListQueuesOptions {
    /// Create new listing options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set page size
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Include queue metadata in the listing
    pub fn with_metadata(mut self) -> Self {
        self.include_metadata = true;
        self
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Maximum number of messages a single dequeue or peek may return
pub const MAX_MESSAGES_PER_REQUEST: u32 = 32;

/// Maximum visibility timeout accepted by the service (7 days)
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Minimum visibility timeout for a dequeue; only updates may use zero
pub const MIN_DEQUEUE_VISIBILITY_TIMEOUT_SECONDS: i64 = 1;

/// A dequeued message, invisible to other consumers until `time_next_visible`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: MessageId,
    pub pop_receipt: PopReceipt,
    pub message_text: String,
    pub insertion_time: Timestamp,
    pub expiration_time: Timestamp,
    pub time_next_visible: Timestamp,
    pub dequeue_count: u32,
}

/// A message observed without changing its visibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeekedMessage {
    pub message_id: MessageId,
    pub message_text: String,
    pub insertion_time: Timestamp,
    pub expiration_time: Timestamp,
    pub dequeue_count: u32,
}

/// Result of updating a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedMessage {
    /// Replaces the receipt used for the update
    pub pop_receipt: PopReceipt,
    pub time_next_visible: Timestamp,
}

/// Options for dequeuing messages
#[derive(Debug, Clone)]
pub struct GetMessagesOptions {
    /// Number of messages to dequeue (1-32)
    pub number_of_messages: u32,
    /// How long dequeued messages stay invisible
    pub visibility_timeout: Duration,
}

impl Default for GetMessagesOptions {
    fn default() -> Self {
        Self {
            number_of_messages: 1,
            visibility_timeout: Duration::seconds(30),
        }
    }
}

impl GetMessagesOptions {
    /// Create new dequeue options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of messages to dequeue
    pub fn with_number_of_messages(mut self, count: u32) -> Self {
        self.number_of_messages = count;
        self
    }

    /// Set visibility timeout
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Check the options are within service limits
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_message_count(self.number_of_messages)?;
        validate_dequeue_visibility_timeout(self.visibility_timeout)
    }
}

/// Check a dequeue or peek count is within 1-32
pub fn validate_message_count(count: u32) -> Result<(), ValidationError> {
    if count == 0 || count > MAX_MESSAGES_PER_REQUEST {
        return Err(ValidationError::OutOfRange {
            field: "number_of_messages".to_string(),
            message: format!("must be 1-{}", MAX_MESSAGES_PER_REQUEST),
        });
    }
    Ok(())
}

/// Check an update's visibility timeout is within 0 seconds and 7 days
pub fn validate_visibility_timeout(timeout: Duration) -> Result<(), ValidationError> {
    check_visibility_timeout(timeout, 0)
}

/// Check a dequeue's visibility timeout is within 1 second and 7 days
pub fn validate_dequeue_visibility_timeout(timeout: Duration) -> Result<(), ValidationError> {
    check_visibility_timeout(timeout, MIN_DEQUEUE_VISIBILITY_TIMEOUT_SECONDS)
}

fn check_visibility_timeout(timeout: Duration, min_seconds: i64) -> Result<(), ValidationError> {
    // Sub-second remainders count; 500ms is below a 1 second minimum
    let within = timeout >= Duration::seconds(min_seconds)
        && timeout <= Duration::seconds(MAX_VISIBILITY_TIMEOUT_SECONDS);
    if !within {
        return Err(ValidationError::OutOfRange {
            field: "visibility_timeout".to_string(),
            message: format!("must be between {}s and 7 days", min_seconds),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
