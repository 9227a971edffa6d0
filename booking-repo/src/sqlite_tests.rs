//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use booking_types::{
        BookingEvent, BookingRepository, Currency, DomainError, Money, NewMessage,
        NewNotification, NewServiceRequest, OutboxStatus, PaymentStatus, RelatedRef, RepoError,
        RequestFilter, RequestStatus, Review, Role, ServiceRequest, ServiceRequestId, Transition,
        UserId,
    };
    use chrono::NaiveDate;

    use crate::sqlite::SqliteRepo;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    fn new_request(requester: UserId, price: Option<i64>) -> ServiceRequest {
        ServiceRequest::new(
            requester,
            NewServiceRequest {
                service_type: "mowing".to_string(),
                address: Some("123 Maple Ave".to_string()),
                scheduled_date: NaiveDate::from_ymd_opt(2026, 5, 1),
                price: price.map(|p| Money::new(p, Currency::USD).unwrap()),
            },
        )
        .unwrap()
    }

    async fn accepted_request(repo: &SqliteRepo, requester: UserId, provider: UserId) -> ServiceRequest {
        let req = repo.create_request(new_request(requester, Some(4500))).await.unwrap();
        let (req, _) = repo
            .apply_transition(req.id, Transition::Accept { provider })
            .await
            .unwrap();
        req
    }

    async fn completed_request(repo: &SqliteRepo, requester: UserId, provider: UserId) -> ServiceRequest {
        let req = accepted_request(repo, requester, provider).await;
        let (req, _) = repo
            .apply_transition(req.id, Transition::Complete { provider })
            .await
            .unwrap();
        req
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Service requests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_and_get_request() {
        let repo = setup_repo().await;
        let requester = UserId::new();

        let created = repo.create_request(new_request(requester, Some(4500))).await.unwrap();
        let fetched = repo.get_request(created.id).await.unwrap().unwrap();

        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.requester_id, requester);
        assert_eq!(fetched.provider_id, None);
        assert_eq!(fetched.address, "123 Maple Ave");
        assert_eq!(fetched.scheduled_date, NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());
        assert_eq!(fetched.price, Some(Money::new(4500, Currency::USD).unwrap()));
        assert_eq!(fetched.status, RequestStatus::Pending);
        assert_eq!(fetched.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_get_request_not_found() {
        let repo = setup_repo().await;

        let result = repo.get_request(ServiceRequestId::new()).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_requests_filters_and_orders() {
        let repo = setup_repo().await;
        let alice = UserId::new();
        let bob = UserId::new();
        let provider = UserId::new();

        let first = repo.create_request(new_request(alice, None)).await.unwrap();
        let second = repo.create_request(new_request(alice, None)).await.unwrap();
        repo.create_request(new_request(bob, None)).await.unwrap();
        repo.apply_transition(first.id, Transition::Accept { provider })
            .await
            .unwrap();

        let all = repo.list_requests(&RequestFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let mine = repo.list_requests(&RequestFilter::requested_by(alice)).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, second.id, "newest first");
        assert_eq!(mine[1].id, first.id);

        let assigned = repo.list_requests(&RequestFilter::provided_by(provider)).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, first.id);

        let open = repo.list_requests(&RequestFilter::open()).await.unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|r| r.status == RequestStatus::Pending));
    }

    #[tokio::test]
    async fn test_lifecycle_writes_outbox_events() {
        let repo = setup_repo().await;
        let requester = UserId::new();
        let provider = UserId::new();

        let req = completed_request(&repo, requester, provider).await;
        assert_eq!(req.status, RequestStatus::Completed);
        assert_eq!(req.provider_id, Some(provider));

        let events = repo.pending_events(10).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.event.kind()).collect();
        assert_eq!(kinds, vec!["request.accepted", "request.completed"]);
        assert!(events.iter().all(|e| e.status == OutboxStatus::Pending));
        assert_eq!(
            events[0].event,
            BookingEvent::RequestAccepted {
                request_id: req.id,
                requester_id: requester,
                provider_id: provider,
            }
        );
    }

    #[tokio::test]
    async fn test_accept_twice_is_invalid_transition() {
        let repo = setup_repo().await;
        let req = accepted_request(&repo, UserId::new(), UserId::new()).await;

        let result = repo
            .apply_transition(req.id, Transition::Accept { provider: UserId::new() })
            .await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InvalidTransition {
                from: RequestStatus::Accepted,
                action: "accept"
            }))
        ));
    }

    #[tokio::test]
    async fn test_complete_by_other_provider_is_unauthorized() {
        let repo = setup_repo().await;
        let req = accepted_request(&repo, UserId::new(), UserId::new()).await;

        let result = repo
            .apply_transition(req.id, Transition::Complete { provider: UserId::new() })
            .await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::Unauthorized(_)))
        ));
        let current = repo.get_request(req.id).await.unwrap().unwrap();
        assert_eq!(current.status, RequestStatus::Accepted);
    }

    #[tokio::test]
    async fn test_cancel_from_terminal_state_fails() {
        let repo = setup_repo().await;
        let requester = UserId::new();
        let req = completed_request(&repo, requester, UserId::new()).await;

        let result = repo
            .apply_transition(req.id, Transition::Cancel { by: requester })
            .await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_transition_not_found() {
        let repo = setup_repo().await;

        let result = repo
            .apply_transition(ServiceRequestId::new(), Transition::Cancel { by: UserId::new() })
            .await;

        assert!(matches!(result, Err(RepoError::NotFound)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_exactly_one_wins() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/booking.db", dir.path().display());
        let repo = Arc::new(SqliteRepo::new(&url).await.unwrap());
        let req_id = repo
            .create_request(new_request(UserId::new(), None))
            .await
            .unwrap()
            .id;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.apply_transition(req_id, Transition::Accept { provider: UserId::new() })
                    .await
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok((updated, _)) => winners.push(updated.provider_id),
                Err(RepoError::Domain(DomainError::InvalidTransition { .. })) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = repo.get_request(req_id).await.unwrap().unwrap();
        assert_eq!(stored.provider_id, winners[0]);
        assert_eq!(repo.pending_events(100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_request_cascades() {
        let repo = setup_repo().await;
        let requester = UserId::new();
        let provider = UserId::new();
        let req = completed_request(&repo, requester, provider).await;

        let conversation = repo.get_or_create_conversation(req.id).await.unwrap();
        repo.append_message(NewMessage {
            conversation_id: conversation.id,
            service_request_id: req.id,
            sender_id: requester,
            recipient_id: Some(provider),
            content: "thanks".to_string(),
        })
        .await
        .unwrap();
        repo.create_review(Review::new(&req, requester, 5, None).unwrap())
            .await
            .unwrap();
        let notification = repo
            .create_notification(NewNotification::about(
                provider,
                "New message",
                "thanks",
                RelatedRef::Conversation(conversation.id),
            ))
            .await
            .unwrap();

        assert!(repo.delete_request(req.id).await.unwrap());
        assert!(!repo.delete_request(req.id).await.unwrap());

        assert!(repo.get_request(req.id).await.unwrap().is_none());
        assert!(repo.get_conversation(conversation.id).await.unwrap().is_none());
        assert!(repo.list_messages(conversation.id).await.unwrap().is_empty());
        assert!(repo.get_review_for_request(req.id).await.unwrap().is_none());

        // Notifications survive but lose their deep link.
        let survivor = repo.get_notification(notification.id).await.unwrap().unwrap();
        assert_eq!(survivor.related, None);
        assert_eq!(survivor.link, None);
        assert_eq!(survivor.body, "thanks");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payments
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_mark_paid_requires_completed() {
        let repo = setup_repo().await;
        let req = accepted_request(&repo, UserId::new(), UserId::new()).await;

        let result = repo.mark_paid(req.id).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InvalidTransition { action: "pay", .. }))
        ));
    }

    #[tokio::test]
    async fn test_mark_paid_once() {
        let repo = setup_repo().await;
        let provider = UserId::new();
        let req = completed_request(&repo, UserId::new(), provider).await;

        let updated = repo
            .record_payment_intent(req.id, None, "pi_123")
            .await
            .unwrap();
        assert_eq!(updated.payment_intent_id.as_deref(), Some("pi_123"));

        let (paid, event) = repo.mark_paid(req.id).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert!(paid.invariants_hold());
        assert!(matches!(
            event.event,
            BookingEvent::PaymentSucceeded { provider_id: Some(p), .. } if p == provider
        ));

        assert!(matches!(
            repo.mark_paid(req.id).await,
            Err(RepoError::Domain(DomainError::AlreadyPaid))
        ));
    }

    #[tokio::test]
    async fn test_record_payment_intent_not_found() {
        let repo = setup_repo().await;

        let result = repo
            .record_payment_intent(ServiceRequestId::new(), None, "pi_1")
            .await;

        assert!(matches!(result, Err(RepoError::NotFound)));
    }

    #[tokio::test]
    async fn test_paid_booking_keeps_its_intent() {
        let repo = setup_repo().await;
        let req = completed_request(&repo, UserId::new(), UserId::new()).await;
        repo.record_payment_intent(req.id, None, "pi_A").await.unwrap();
        let (paid, _) = repo.mark_paid(req.id).await.unwrap();

        let result = repo
            .record_payment_intent(req.id, Some("pi_A"), "pi_B")
            .await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::AlreadyPaid))
        ));
        let stored = repo.get_request(req.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_A"));
        assert_eq!(stored.updated_at, paid.updated_at);
    }

    #[tokio::test]
    async fn test_stale_intent_write_conflicts() {
        let repo = setup_repo().await;
        let req = completed_request(&repo, UserId::new(), UserId::new()).await;
        repo.record_payment_intent(req.id, None, "pi_A").await.unwrap();

        // Both writers read "no intent"; the second one loses.
        let result = repo.record_payment_intent(req.id, None, "pi_B").await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));

        let replaced = repo
            .record_payment_intent(req.id, Some("pi_A"), "pi_C")
            .await
            .unwrap();
        assert_eq!(replaced.payment_intent_id.as_deref(), Some("pi_C"));
    }

    #[tokio::test]
    async fn test_intent_requires_completed() {
        let repo = setup_repo().await;
        let req = accepted_request(&repo, UserId::new(), UserId::new()).await;

        let result = repo.record_payment_intent(req.id, None, "pi_A").await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InvalidTransition { action: "pay", .. }))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_intent_writes_exactly_one_wins() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/booking.db", dir.path().display());
        let repo = Arc::new(SqliteRepo::new(&url).await.unwrap());
        let req_id = completed_request(&repo, UserId::new(), UserId::new())
            .await
            .id;

        let mut handles = Vec::new();
        for n in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let intent = format!("pi_{n}");
                repo.record_payment_intent(req_id, None, &intent)
                    .await
                    .map(|_| intent)
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(intent) => winners.push(intent),
                Err(RepoError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = repo.get_request(req_id).await.unwrap().unwrap();
        assert_eq!(stored.payment_intent_id, Some(winners[0].clone()));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversations
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_get_or_create_conversation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/booking.db", dir.path().display());
        let repo = Arc::new(SqliteRepo::new(&url).await.unwrap());
        let req_id = repo
            .create_request(new_request(UserId::new(), None))
            .await
            .unwrap()
            .id;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.get_or_create_conversation(req_id).await.unwrap().id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 10);
        assert!(ids.iter().all(|id| *id == ids[0]));

        let rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE service_request_id = ?")
                .bind(req_id.to_string())
                .fetch_one(repo.pool())
                .await
                .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_messages_are_sequenced() {
        let repo = setup_repo().await;
        let requester = UserId::new();
        let provider = UserId::new();
        let req = accepted_request(&repo, requester, provider).await;
        let conversation = repo.get_or_create_conversation(req.id).await.unwrap();

        for (sender, recipient, content) in [
            (provider, requester, "on my way"),
            (requester, provider, "great"),
            (provider, requester, "arrived"),
        ] {
            let (_, event) = repo
                .append_message(NewMessage {
                    conversation_id: conversation.id,
                    service_request_id: req.id,
                    sender_id: sender,
                    recipient_id: Some(recipient),
                    content: content.to_string(),
                })
                .await
                .unwrap();
            assert!(event.is_some());
        }

        let first = repo.list_messages(conversation.id).await.unwrap();
        let second = repo.list_messages(conversation.id).await.unwrap();

        assert_eq!(first, second);
        let seqs: Vec<i64> = first.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(first[0].content, "on my way");
        assert_eq!(first[2].content, "arrived");
    }

    #[tokio::test]
    async fn test_message_without_recipient_has_no_event() {
        let repo = setup_repo().await;
        let requester = UserId::new();
        let req = repo.create_request(new_request(requester, None)).await.unwrap();
        let conversation = repo.get_or_create_conversation(req.id).await.unwrap();

        let (message, event) = repo
            .append_message(NewMessage {
                conversation_id: conversation.id,
                service_request_id: req.id,
                sender_id: requester,
                recipient_id: None,
                content: "anyone?".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(message.seq, 1);
        assert!(event.is_none());
        assert!(repo.pending_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let repo = setup_repo().await;
        let req = repo.create_request(new_request(UserId::new(), None)).await.unwrap();
        let conversation = repo.get_or_create_conversation(req.id).await.unwrap();

        let result = repo
            .append_message(NewMessage {
                conversation_id: conversation.id,
                service_request_id: req.id,
                sender_id: req.requester_id,
                recipient_id: None,
                content: "   ".to_string(),
            })
            .await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_inbox_orders_by_activity() {
        let repo = setup_repo().await;
        let requester = UserId::new();
        let provider = UserId::new();

        let older = accepted_request(&repo, requester, provider).await;
        let newer = accepted_request(&repo, requester, provider).await;
        let older_conv = repo.get_or_create_conversation(older.id).await.unwrap();
        repo.get_or_create_conversation(newer.id).await.unwrap();

        repo.append_message(NewMessage {
            conversation_id: older_conv.id,
            service_request_id: older.id,
            sender_id: provider,
            recipient_id: Some(requester),
            content: "bumped".to_string(),
        })
        .await
        .unwrap();

        let inbox = repo.list_conversations_for_user(requester).await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].conversation.id, older_conv.id);
        assert_eq!(
            inbox[0].last_message.as_ref().map(|m| m.content.as_str()),
            Some("bumped")
        );
        assert_eq!(inbox[0].service_request.status, RequestStatus::Accepted);
        assert!(inbox[1].last_message.is_none());

        assert!(
            repo.list_conversations_for_user(UserId::new())
                .await
                .unwrap()
                .is_empty()
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Notifications & outbox
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_notifications_newest_first_and_bounded() {
        let repo = setup_repo().await;
        let user = UserId::new();

        for i in 0..5 {
            repo.create_notification(NewNotification {
                recipient_id: user,
                title: format!("n{i}"),
                body: "body".to_string(),
                link: None,
                related: None,
            })
            .await
            .unwrap();
        }

        let latest = repo.list_notifications(user, 3).await.unwrap();
        let titles: Vec<_> = latest.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["n4", "n3", "n2"]);
        assert!(repo.list_notifications(UserId::new(), 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_notification_read_is_idempotent() {
        let repo = setup_repo().await;
        let req = repo.create_request(new_request(UserId::new(), None)).await.unwrap();
        let created = repo
            .create_notification(NewNotification::about(
                req.requester_id,
                "Request accepted",
                "A provider accepted your request",
                RelatedRef::ServiceRequest(req.id),
            ))
            .await
            .unwrap();
        assert!(!created.is_read());

        let first = repo.mark_notification_read(created.id).await.unwrap();
        let second = repo.mark_notification_read(created.id).await.unwrap();

        assert!(first.is_read());
        assert_eq!(first.read_at, second.read_at);
        assert_eq!(first.related, Some(RelatedRef::ServiceRequest(req.id)));
    }

    #[tokio::test]
    async fn test_deliver_event_exactly_once() {
        let repo = Arc::new(setup_repo().await);
        let requester = UserId::new();
        let req_id = accepted_request(&repo, requester, UserId::new()).await.id;
        let event_id = repo.pending_events(1).await.unwrap().remove(0).id;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let notification = NewNotification::about(
                    requester,
                    "Request accepted",
                    "A provider accepted your request",
                    RelatedRef::ServiceRequest(req_id),
                );
                repo.deliver_event(event_id, vec![notification]).await.unwrap()
            }));
        }

        let mut delivered = 0;
        for handle in handles {
            if handle.await.unwrap() {
                delivered += 1;
            }
        }

        assert_eq!(delivered, 1);
        assert_eq!(repo.list_notifications(requester, 20).await.unwrap().len(), 1);
        assert!(repo.pending_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_failure_parks_after_max_attempts() {
        let repo = setup_repo().await;
        accepted_request(&repo, UserId::new(), UserId::new()).await;
        let event = repo.pending_events(1).await.unwrap().remove(0);

        repo.record_event_failure(event.id, "boom", 2).await.unwrap();
        let retried = repo.pending_events(1).await.unwrap();
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].attempts, 1);
        assert_eq!(retried[0].last_error.as_deref(), Some("boom"));

        repo.record_event_failure(event.id, "boom again", 2).await.unwrap();
        assert!(repo.pending_events(1).await.unwrap().is_empty());
        assert!(!repo.deliver_event(event.id, Vec::new()).await.unwrap());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reviews
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_review_once_per_request() {
        let repo = setup_repo().await;
        let requester = UserId::new();
        let provider = UserId::new();
        let req = completed_request(&repo, requester, provider).await;

        let review = Review::new(&req, requester, 5, Some("Great work".to_string())).unwrap();
        let (stored, event) = repo.create_review(review).await.unwrap();
        assert_eq!(stored.rating, 5);
        assert!(matches!(
            event.event,
            BookingEvent::ReviewSubmitted { rating: 5, .. }
        ));

        let fetched = repo.get_review_for_request(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, stored.id);
        assert_eq!(fetched.provider_id, provider);
        assert_eq!(fetched.comment.as_deref(), Some("Great work"));

        let again = Review::new(&req, requester, 1, None).unwrap();
        assert!(matches!(
            repo.create_review(again).await,
            Err(RepoError::Domain(DomainError::AlreadyReviewed))
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_api_key() {
        let repo = setup_repo().await;
        let user = UserId::new();

        let (key, raw_key) = repo.create_api_key("Test Key", user, Role::Provider).await.unwrap();

        assert_eq!(key.name, "Test Key");
        assert!(raw_key.starts_with("sk_"));
        assert!(key.is_active);
        assert_eq!(repo.count_api_keys().await.unwrap(), 1);

        let hash = crate::security::hash_api_key(&raw_key);
        let found = repo.verify_api_key_hash(&hash).await.unwrap().unwrap();
        assert_eq!(found.id, key.id);
        assert_eq!(found.actor().user_id, user);
        assert_eq!(found.role, Role::Provider);
        assert!(found.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_list_api_keys() {
        let repo = setup_repo().await;

        repo.create_api_key("Key 1", UserId::new(), Role::Admin).await.unwrap();
        repo.create_api_key("Key 2", UserId::new(), Role::Homeowner).await.unwrap();

        let keys = repo.list_api_keys().await.unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_api_key() {
        let repo = setup_repo().await;
        let (key, raw_key) = repo
            .create_api_key("To Delete", UserId::new(), Role::Homeowner)
            .await
            .unwrap();

        assert!(repo.delete_api_key(key.id).await.unwrap());
        assert!(!repo.delete_api_key(key.id).await.unwrap());

        let hash = crate::security::hash_api_key(&raw_key);
        assert!(repo.verify_api_key_hash(&hash).await.unwrap().is_none());
        assert_eq!(repo.count_api_keys().await.unwrap(), 0);
    }
}
