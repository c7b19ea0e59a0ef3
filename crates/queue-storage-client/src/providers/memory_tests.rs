//! Tests for the in-memory queue service.

use super::*;
use crate::client::list_all_queues;
use crate::properties::{AccessPolicy, CorsRule, QueuePermissions, RetentionPolicy};

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

async fn service_with_queue(name: &str) -> (InMemoryQueueService, QueueName) {
    let service = InMemoryQueueService::new();
    let queue = queue(name);
    service.create_queue_if_not_exists(&queue).await.unwrap();
    (service, queue)
}

// ============================================================================
// Queue Management Tests
// ============================================================================

mod queue_management {
    use super::*;

    /// Creating twice reports the queue as pre-existing the second time.
    #[tokio::test]
    async fn test_create_queue_is_idempotent() {
        let service = InMemoryQueueService::new();
        let name = queue("orders");

        assert!(service.create_queue_if_not_exists(&name).await.unwrap());
        assert!(!service.create_queue_if_not_exists(&name).await.unwrap());
        assert_eq!(service.queue_names().await, vec![name]);
    }

    #[tokio::test]
    async fn test_delete_missing_queue_fails() {
        let service = InMemoryQueueService::new();

        let result = service.delete_queue(&queue("missing")).await;
        assert!(matches!(result, Err(QueueError::QueueNotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_queue_if_exists() {
        let (service, name) = service_with_queue("orders").await;

        assert!(service.delete_queue_if_exists(&name).await.unwrap());
        assert!(!service.delete_queue_if_exists(&name).await.unwrap());
        assert!(service.queue_names().await.is_empty());
    }

    /// Deleting a queue drops its messages with it.
    #[tokio::test]
    async fn test_recreated_queue_is_empty() {
        let (service, name) = service_with_queue("orders").await;
        service.create_message(&name, "stale").await.unwrap();

        service.delete_queue(&name).await.unwrap();
        service.create_queue_if_not_exists(&name).await.unwrap();

        assert!(service.peek_messages(&name, 32).await.unwrap().is_empty());
    }

    /// Operations on a missing queue report the queue, not the message.
    #[tokio::test]
    async fn test_message_operations_on_missing_queue() {
        let service = InMemoryQueueService::new();
        let name = queue("missing");

        let result = service.create_message(&name, "text").await;
        assert!(matches!(result, Err(QueueError::QueueNotFound { ref queue_name }) if queue_name == "missing"));

        let result = service.get_messages(&name, &GetMessagesOptions::new()).await;
        assert!(matches!(result, Err(QueueError::QueueNotFound { .. })));
    }
}

// ============================================================================
// Listing Tests
// ============================================================================

mod listing {
    use super::*;

    async fn service_with_queues(names: &[&str]) -> InMemoryQueueService {
        let service = InMemoryQueueService::new();
        for name in names {
            service
                .create_queue_if_not_exists(&queue(name))
                .await
                .unwrap();
        }
        service
    }

    /// Pages are lexicographic and the marker names the next page's first queue.
    #[tokio::test]
    async fn test_paged_listing_with_markers() {
        let service = service_with_queues(&["sample3", "sample1", "other", "sample2"]).await;
        let options = ListQueuesOptions::new().with_max_results(2);

        let first = service
            .list_queues_segmented(Some("sample"), None, &options)
            .await
            .unwrap();
        let names: Vec<_> = first.entries.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["sample1", "sample2"]);
        assert_eq!(
            first.continuation_token.as_ref().map(ContinuationToken::as_str),
            Some("sample3")
        );

        let second = service
            .list_queues_segmented(Some("sample"), first.continuation_token.as_ref(), &options)
            .await
            .unwrap();
        let names: Vec<_> = second.entries.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["sample3"]);
        assert!(second.continuation_token.is_none());
    }

    /// An exact page fill ends without a token.
    #[tokio::test]
    async fn test_listing_without_remaining_queues_has_no_token() {
        let service = service_with_queues(&["sample1", "sample2"]).await;
        let options = ListQueuesOptions::new().with_max_results(2);

        let segment = service
            .list_queues_segmented(Some("sample"), None, &options)
            .await
            .unwrap();

        assert_eq!(segment.entries.len(), 2);
        assert!(segment.continuation_token.is_none());
    }

    #[tokio::test]
    async fn test_listing_includes_metadata_on_request() {
        let service = service_with_queues(&["tagged"]).await;
        let metadata = BTreeMap::from([("color".to_string(), "blue".to_string())]);
        service
            .set_queue_metadata(&queue("tagged"), &metadata)
            .await
            .unwrap();

        let plain = service
            .list_queues_segmented(None, None, &ListQueuesOptions::new())
            .await
            .unwrap();
        assert!(plain.entries[0].metadata.is_empty());

        let detailed = service
            .list_queues_segmented(None, None, &ListQueuesOptions::new().with_metadata())
            .await
            .unwrap();
        assert_eq!(detailed.entries[0].metadata, metadata);
    }

    #[tokio::test]
    async fn test_listing_rejects_invalid_page_size() {
        let service = InMemoryQueueService::new();

        for size in [0, MAX_LIST_RESULTS + 1] {
            let options = ListQueuesOptions::new().with_max_results(size);
            let result = service.list_queues_segmented(None, None, &options).await;
            assert!(matches!(result, Err(QueueError::ValidationError(_))));
        }
    }

    /// Following every token yields each matching queue exactly once.
    #[tokio::test]
    async fn test_list_all_queues_sees_every_queue_once() {
        let names: Vec<String> = (0..7).map(|i| format!("listing-q{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let service = service_with_queues(&refs).await;
        service
            .create_queue_if_not_exists(&queue("unrelated"))
            .await
            .unwrap();

        let listed = list_all_queues(
            &service,
            Some("listing-"),
            &ListQueuesOptions::new().with_max_results(3),
        )
        .await
        .unwrap();

        let listed: Vec<String> = listed.into_iter().map(|q| q.name).collect();
        assert_eq!(listed, names);
    }
}

// ============================================================================
// Message Lifecycle Tests
// ============================================================================

mod message_lifecycle {
    use super::*;

    /// Messages are delivered in insertion order.
    #[tokio::test]
    async fn test_messages_are_fifo() {
        let (service, name) = service_with_queue("fifo").await;
        service.create_message(&name, "first").await.unwrap();
        service.create_message(&name, "second").await.unwrap();

        let messages = service
            .get_messages(&name, &GetMessagesOptions::new().with_number_of_messages(32))
            .await
            .unwrap();

        let texts: Vec<_> = messages.iter().map(|m| m.message_text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(messages.iter().all(|m| m.dequeue_count == 1));
    }

    /// A dequeued message is hidden until its visibility timeout passes.
    #[tokio::test]
    async fn test_dequeued_message_is_invisible() {
        let (service, name) = service_with_queue("hidden").await;
        service.create_message(&name, "only").await.unwrap();

        let message = service.get_message(&name).await.unwrap().unwrap();
        assert!(message.time_next_visible > message.insertion_time);

        assert!(service.get_message(&name).await.unwrap().is_none());
        assert!(service.peek_messages(&name, 1).await.unwrap().is_empty());
        assert_eq!(
            service
                .get_queue_metadata(&name)
                .await
                .unwrap()
                .approximate_message_count,
            1
        );
    }

    /// Dequeues reject a zero visibility timeout.
    #[tokio::test]
    async fn test_zero_dequeue_visibility_timeout_is_rejected() {
        let (service, name) = service_with_queue("zerodequeue").await;
        service.create_message(&name, "hidden").await.unwrap();
        let options = GetMessagesOptions::new().with_visibility_timeout(Duration::zero());

        let result = service.get_messages(&name, &options).await;

        assert!(matches!(
            result,
            Err(QueueError::ValidationError(ValidationError::OutOfRange { .. }))
        ));
        assert_eq!(service.peek_messages(&name, 1).await.unwrap()[0].dequeue_count, 0);
    }

    /// An update with a zero timeout makes the message visible again at once.
    #[tokio::test]
    async fn test_zero_update_visibility_timeout_redelivers() {
        let (service, name) = service_with_queue("redeliver").await;
        service.create_message(&name, "again").await.unwrap();
        let options = GetMessagesOptions::new().with_visibility_timeout(Duration::seconds(1));

        let first = service.get_messages(&name, &options).await.unwrap();
        let released = service
            .update_message(
                &name,
                &first[0].message_id,
                &first[0].pop_receipt,
                Duration::zero(),
                "again",
            )
            .await
            .unwrap();
        let second = service.get_messages(&name, &options).await.unwrap();

        assert_eq!(first[0].message_id, second[0].message_id);
        assert_eq!(second[0].dequeue_count, 2);
        assert_ne!(first[0].pop_receipt, second[0].pop_receipt);
        assert_ne!(released.pop_receipt, second[0].pop_receipt);

        // Only the latest receipt is honoured
        let result = service
            .delete_message(&name, &first[0].message_id, &first[0].pop_receipt)
            .await;
        assert!(matches!(result, Err(QueueError::PopReceiptMismatch { .. })));
        service
            .delete_message(&name, &second[0].message_id, &second[0].pop_receipt)
            .await
            .unwrap();
    }

    /// Peeking leaves visibility and dequeue count untouched.
    #[tokio::test]
    async fn test_peek_does_not_dequeue() {
        let (service, name) = service_with_queue("peeking").await;
        service.create_message(&name, "look").await.unwrap();

        let peeked = service.peek_messages(&name, 32).await.unwrap();
        assert_eq!(peeked.len(), 1);
        assert_eq!(peeked[0].message_text, "look");
        assert_eq!(peeked[0].dequeue_count, 0);

        let message = service.get_message(&name).await.unwrap().unwrap();
        assert_eq!(message.message_id, peeked[0].message_id);
        assert_eq!(message.dequeue_count, 1);
    }

    /// Updating replaces the text and the receipt.
    #[tokio::test]
    async fn test_update_message_issues_new_receipt() {
        let (service, name) = service_with_queue("updates").await;
        service.create_message(&name, "old text").await.unwrap();
        let message = service.get_message(&name).await.unwrap().unwrap();

        let updated = service
            .update_message(
                &name,
                &message.message_id,
                &message.pop_receipt,
                Duration::zero(),
                "new text",
            )
            .await
            .unwrap();
        assert_ne!(updated.pop_receipt, message.pop_receipt);

        let stale = service
            .update_message(
                &name,
                &message.message_id,
                &message.pop_receipt,
                Duration::zero(),
                "newer text",
            )
            .await;
        assert!(matches!(stale, Err(QueueError::PopReceiptMismatch { .. })));

        let peeked = service.peek_messages(&name, 1).await.unwrap();
        assert_eq!(peeked[0].message_text, "new text");

        service
            .delete_message(&name, &message.message_id, &updated.pop_receipt)
            .await
            .unwrap();
        assert!(service.peek_messages(&name, 1).await.unwrap().is_empty());
    }

    /// A message that was never dequeued has no valid receipt.
    #[tokio::test]
    async fn test_delete_without_dequeue_fails() {
        let (service, name) = service_with_queue("undequeued").await;
        service.create_message(&name, "text").await.unwrap();
        let peeked = service.peek_messages(&name, 1).await.unwrap();

        let result = service
            .delete_message(&name, &peeked[0].message_id, &PopReceipt::generate())
            .await;
        assert!(matches!(result, Err(QueueError::PopReceiptMismatch { .. })));
    }

    #[tokio::test]
    async fn test_delete_unknown_message_fails() {
        let (service, name) = service_with_queue("unknown").await;

        let result = service
            .delete_message(&name, &MessageId::new(), &PopReceipt::generate())
            .await;
        assert!(matches!(result, Err(QueueError::MessageNotFound { .. })));
    }

    #[tokio::test]
    async fn test_message_limits_are_enforced() {
        let (service, name) = service_with_queue("limits").await;

        let oversized = "x".repeat(MAX_MESSAGE_TEXT_BYTES + 1);
        let result = service.create_message(&name, &oversized).await;
        assert!(matches!(result, Err(QueueError::ValidationError(_))));

        let options = GetMessagesOptions::new().with_number_of_messages(33);
        let result = service.get_messages(&name, &options).await;
        assert!(matches!(result, Err(QueueError::ValidationError(_))));

        let result = service.peek_messages(&name, 0).await;
        assert!(matches!(result, Err(QueueError::ValidationError(_))));
    }
}

// ============================================================================
// Metadata and Access Policy Tests
// ============================================================================

mod queue_settings {
    use super::*;

    #[tokio::test]
    async fn test_metadata_round_trip_replaces_previous_values() {
        let (service, name) = service_with_queue("metadata").await;

        let first = BTreeMap::from([("stale".to_string(), "value".to_string())]);
        service.set_queue_metadata(&name, &first).await.unwrap();

        let second = BTreeMap::from([
            ("color".to_string(), "blue".to_string()),
            ("foo".to_string(), "Bar".to_string()),
        ]);
        service.set_queue_metadata(&name, &second).await.unwrap();

        let properties = service.get_queue_metadata(&name).await.unwrap();
        assert_eq!(properties.metadata, second);
        assert_eq!(properties.approximate_message_count, 0);
    }

    #[tokio::test]
    async fn test_acl_round_trip() {
        let (service, name) = service_with_queue("acl").await;
        let start = Timestamp::now();
        let identifiers = SignedIdentifiers::from([(
            "policy".to_string(),
            AccessPolicy {
                start: Some(start),
                expiry: Some(start.plus(Duration::minutes(10))),
                permissions: QueuePermissions::PROCESS,
            },
        )]);

        service.set_queue_acl(&name, &identifiers).await.unwrap();

        assert_eq!(service.get_queue_acl(&name).await.unwrap(), identifiers);
    }

    #[tokio::test]
    async fn test_acl_limit_is_enforced() {
        let (service, name) = service_with_queue("acl-limit").await;
        let identifiers: SignedIdentifiers = (0..6)
            .map(|i| {
                (
                    format!("policy{}", i),
                    AccessPolicy {
                        start: None,
                        expiry: None,
                        permissions: QueuePermissions::ALL,
                    },
                )
            })
            .collect();

        let result = service.set_queue_acl(&name, &identifiers).await;
        assert!(matches!(result, Err(QueueError::ValidationError(_))));
    }
}

// ============================================================================
// Service Properties Tests
// ============================================================================

mod service_properties {
    use super::*;

    #[tokio::test]
    async fn test_defaults_have_every_section() {
        let service = InMemoryQueueService::new();
        let properties = service.get_service_properties().await.unwrap();

        assert!(properties.logging.is_some());
        assert!(properties.hour_metrics.is_some());
        assert!(properties.minute_metrics.is_some());
        assert_eq!(properties.cors, Some(Vec::new()));
    }

    /// Omitted sections keep their stored value.
    #[tokio::test]
    async fn test_set_properties_merges_sections() {
        let service = InMemoryQueueService::new();
        let rule = CorsRule {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string()],
            allowed_headers: vec!["*".to_string()],
            exposed_headers: vec!["*".to_string()],
            max_age_in_seconds: 3600,
        };
        service
            .set_service_properties(&ServiceProperties {
                cors: Some(vec![rule.clone()]),
                ..Default::default()
            })
            .await
            .unwrap();

        let logging = LoggingProperties {
            delete: true,
            read: true,
            write: true,
            retention_policy: RetentionPolicy::days(10),
            ..Default::default()
        };
        service
            .set_service_properties(&ServiceProperties {
                logging: Some(logging.clone()),
                ..Default::default()
            })
            .await
            .unwrap();

        let properties = service.get_service_properties().await.unwrap();
        assert_eq!(properties.cors, Some(vec![rule]));
        assert_eq!(properties.logging, Some(logging));
    }

    #[tokio::test]
    async fn test_invalid_properties_are_rejected() {
        let service = InMemoryQueueService::new();
        let logging = LoggingProperties {
            retention_policy: RetentionPolicy::days(0),
            ..Default::default()
        };

        let result = service
            .set_service_properties(&ServiceProperties {
                logging: Some(logging),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(QueueError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_service_stats_report_live_replication() {
        let service = InMemoryQueueService::new();
        let stats = service.get_service_stats().await.unwrap();

        assert_eq!(stats.geo_replication.status, "live");
        assert!(stats.geo_replication.last_sync_time.is_some());
    }
}
