//! Tests for the queue service client trait helpers and factory.

use super::*;
use crate::message::Timestamp;
use crate::provider::StorageAccount;
use std::sync::Mutex;

// ============================================================================
// Scripted Client
// ============================================================================

/// Client that serves pre-recorded listing pages and records every call
struct ScriptedClient {
    pages: Mutex<Vec<QueueSegment>>,
    tokens_seen: Mutex<Vec<Option<String>>>,
    delete_result: fn(&QueueName) -> Result<(), QueueError>,
    dequeued: Vec<QueueMessage>,
}

impl ScriptedClient {
    fn with_pages(pages: Vec<QueueSegment>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().rev().collect()),
            tokens_seen: Mutex::new(Vec::new()),
            delete_result: |_| Ok(()),
            dequeued: Vec::new(),
        }
    }

    fn tokens_seen(&self) -> Vec<Option<String>> {
        self.tokens_seen.lock().unwrap().clone()
    }
}

fn page(names: &[&str], token: Option<&str>) -> QueueSegment {
    QueueSegment {
        entries: names.iter().map(|n| QueueInfo::new(*n)).collect(),
        continuation_token: token.map(ContinuationToken::new),
    }
}

fn dequeued_message(text: &str) -> QueueMessage {
    let now = Timestamp::now();
    QueueMessage {
        message_id: MessageId::new(),
        pop_receipt: PopReceipt::generate(),
        message_text: text.to_string(),
        insertion_time: now,
        expiration_time: now.plus(Duration::days(7)),
        time_next_visible: now.plus(Duration::seconds(30)),
        dequeue_count: 1,
    }
}

#[async_trait]
impl QueueServiceClient for ScriptedClient {
    async fn create_queue_if_not_exists(&self, _queue: &QueueName) -> Result<bool, QueueError> {
        unimplemented!("not scripted")
    }

    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        (self.delete_result)(queue)
    }

    async fn list_queues_segmented(
        &self,
        _prefix: Option<&str>,
        continuation_token: Option<&ContinuationToken>,
        _options: &ListQueuesOptions,
    ) -> Result<QueueSegment, QueueError> {
        self.tokens_seen
            .lock()
            .unwrap()
            .push(continuation_token.map(|t| t.as_str().to_string()));

        self.pages
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| QueueError::InvalidResponse {
                message: "listing continued past the last page".to_string(),
            })
    }

    async fn set_queue_metadata(
        &self,
        _queue: &QueueName,
        _metadata: &BTreeMap<String, String>,
    ) -> Result<(), QueueError> {
        unimplemented!("not scripted")
    }

    async fn get_queue_metadata(&self, _queue: &QueueName) -> Result<QueueProperties, QueueError> {
        unimplemented!("not scripted")
    }

    async fn create_message(&self, _queue: &QueueName, _text: &str) -> Result<(), QueueError> {
        unimplemented!("not scripted")
    }

    async fn get_messages(
        &self,
        _queue: &QueueName,
        options: &GetMessagesOptions,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        assert_eq!(options.number_of_messages, 1);
        Ok(self.dequeued.clone())
    }

    async fn peek_messages(
        &self,
        _queue: &QueueName,
        _count: u32,
    ) -> Result<Vec<PeekedMessage>, QueueError> {
        unimplemented!("not scripted")
    }

    async fn update_message(
        &self,
        _queue: &QueueName,
        _message_id: &MessageId,
        _pop_receipt: &PopReceipt,
        _visibility_timeout: Duration,
        _text: &str,
    ) -> Result<UpdatedMessage, QueueError> {
        unimplemented!("not scripted")
    }

    async fn delete_message(
        &self,
        _queue: &QueueName,
        _message_id: &MessageId,
        _pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        unimplemented!("not scripted")
    }

    async fn set_queue_acl(
        &self,
        _queue: &QueueName,
        _identifiers: &SignedIdentifiers,
    ) -> Result<(), QueueError> {
        unimplemented!("not scripted")
    }

    async fn get_queue_acl(&self, _queue: &QueueName) -> Result<SignedIdentifiers, QueueError> {
        unimplemented!("not scripted")
    }

    async fn get_service_properties(&self) -> Result<ServiceProperties, QueueError> {
        unimplemented!("not scripted")
    }

    async fn set_service_properties(
        &self,
        _properties: &ServiceProperties,
    ) -> Result<(), QueueError> {
        unimplemented!("not scripted")
    }

    async fn get_service_stats(&self) -> Result<ServiceStats, QueueError> {
        unimplemented!("not scripted")
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

// ============================================================================
// Pagination Tests
// ============================================================================

mod pagination {
    use super::*;

    /// Pages are concatenated in order and tokens are passed back verbatim.
    #[tokio::test]
    async fn test_list_all_queues_follows_continuation_tokens() {
        let client = ScriptedClient::with_pages(vec![
            page(&["queue1", "queue2"], Some("marker-a")),
            page(&["queue3", "queue4"], Some("marker-b")),
            page(&["queue5"], None),
        ]);

        let queues = list_all_queues(&client, Some("queue"), &ListQueuesOptions::new())
            .await
            .unwrap();

        let names: Vec<_> = queues.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["queue1", "queue2", "queue3", "queue4", "queue5"]);
        assert_eq!(
            client.tokens_seen(),
            vec![
                None,
                Some("marker-a".to_string()),
                Some("marker-b".to_string())
            ]
        );
    }

    /// A single page without a token ends the listing after one call.
    #[tokio::test]
    async fn test_list_all_queues_single_page() {
        let client = ScriptedClient::with_pages(vec![page(&["only"], None)]);

        let queues = list_all_queues(&client, None, &ListQueuesOptions::new())
            .await
            .unwrap();

        assert_eq!(queues.len(), 1);
        assert_eq!(client.tokens_seen().len(), 1);
    }

    /// Empty intermediate pages still follow the token.
    #[tokio::test]
    async fn test_list_all_queues_empty_page_with_token() {
        let client = ScriptedClient::with_pages(vec![
            page(&[], Some("marker-a")),
            page(&["late"], None),
        ]);

        let queues = list_all_queues(&client, None, &ListQueuesOptions::new())
            .await
            .unwrap();

        assert_eq!(queues, vec![QueueInfo::new("late")]);
    }

    /// A failing page aborts the listing with that error.
    #[tokio::test]
    async fn test_list_all_queues_propagates_errors() {
        let client = ScriptedClient::with_pages(vec![page(&["queue1"], Some("marker-a"))]);

        let result = list_all_queues(&client, None, &ListQueuesOptions::new()).await;

        assert!(matches!(result, Err(QueueError::InvalidResponse { .. })));
    }
}

// ============================================================================
// Default Method Tests
// ============================================================================

mod default_methods {
    use super::*;

    #[tokio::test]
    async fn test_delete_queue_if_exists_maps_not_found_to_false() {
        let mut client = ScriptedClient::with_pages(Vec::new());
        client.delete_result = |queue| {
            Err(QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })
        };
        let queue = QueueName::new("missing".to_string()).unwrap();

        assert!(!client.delete_queue_if_exists(&queue).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_queue_if_exists_keeps_other_errors() {
        let mut client = ScriptedClient::with_pages(Vec::new());
        client.delete_result = |_| {
            Err(QueueError::ConnectionRefused {
                endpoint: "http://127.0.0.1:10001".to_string(),
            })
        };
        let queue = QueueName::new("existing".to_string()).unwrap();

        let result = client.delete_queue_if_exists(&queue).await;
        assert!(result.unwrap_err().is_connection_refused());
    }

    #[tokio::test]
    async fn test_delete_queue_if_exists_reports_existing() {
        let client = ScriptedClient::with_pages(Vec::new());
        let queue = QueueName::new("existing".to_string()).unwrap();

        assert!(client.delete_queue_if_exists(&queue).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_message_returns_first_dequeued() {
        let mut client = ScriptedClient::with_pages(Vec::new());
        client.dequeued = vec![dequeued_message("first")];
        let queue = QueueName::new("messages".to_string()).unwrap();

        let message = client.get_message(&queue).await.unwrap();
        assert_eq!(message.map(|m| m.message_text), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_get_message_on_empty_queue() {
        let client = ScriptedClient::with_pages(Vec::new());
        let queue = QueueName::new("messages".to_string()).unwrap();

        assert!(client.get_message(&queue).await.unwrap().is_none());
    }
}

// ============================================================================
// Factory Tests
// ============================================================================

mod factory {
    use super::*;

    #[test]
    fn test_create_in_memory_client() {
        let client = QueueServiceClientFactory::create_client(ClientConfig::default()).unwrap();
        assert_eq!(client.provider_type(), ProviderType::InMemory);
    }

    #[test]
    fn test_create_http_client() {
        let config = ClientConfig::for_account(StorageAccount::development_storage());
        let client = QueueServiceClientFactory::create_client(config).unwrap();
        assert_eq!(client.provider_type(), ProviderType::Http);
    }

    #[test]
    fn test_create_http_client_rejects_bad_key() {
        let account = StorageAccount::new(
            "samples",
            "not base64!",
            url::Url::parse("http://localhost:10001/samples").unwrap(),
        );
        let result = QueueServiceClientFactory::create_client(ClientConfig::for_account(account));
        assert!(matches!(result, Err(QueueError::ConfigurationError(_))));
    }

    #[test]
    fn test_create_test_client() {
        let client = QueueServiceClientFactory::create_test_client();
        assert_eq!(client.provider_type(), ProviderType::InMemory);
    }
}
