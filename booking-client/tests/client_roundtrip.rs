//! Drives a live server over TCP through the client SDK.

use std::sync::Arc;

use booking_client::{BookingClient, ClientError};
use booking_hex::{BookingService, inbound::HttpServer};
use booking_repo::sqlite::SqliteRepo;
use booking_repo::stripe::DisabledProcessor;
use booking_types::{
    CreateServiceRequest, Currency, RequestFilter, RequestStatus, Role, UserId,
};

async fn spawn_server() -> String {
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let service = BookingService::new(repo, Arc::new(DisabledProcessor));
    let router = HttpServer::with_rate_limit(service, 1000).router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_booking_flow_through_client() {
    let base = spawn_server().await;
    assert!(BookingClient::new(&base).health().await.unwrap());

    let admin_key = BookingClient::new(&base)
        .bootstrap("ops", None)
        .await
        .unwrap();
    assert_eq!(admin_key.role, Role::Admin);
    let admin = BookingClient::new(&base).with_api_key(admin_key.api_key);

    let homeowner_id = UserId::new();
    let provider_id = UserId::new();
    let homeowner_key = admin
        .create_api_key("homeowner", homeowner_id, Role::Homeowner)
        .await
        .unwrap();
    let provider_key = admin
        .create_api_key("provider", provider_id, Role::Provider)
        .await
        .unwrap();
    assert_eq!(admin.list_api_keys().await.unwrap().len(), 3);

    let homeowner = BookingClient::new(&base).with_api_key(homeowner_key.api_key);
    let provider = BookingClient::new(&base).with_api_key(provider_key.api_key);

    let created = homeowner
        .create_request(&CreateServiceRequest {
            service_type: "gutter cleaning".into(),
            address: Some("9 Elm St".into()),
            scheduled_date: chrono::NaiveDate::from_ymd_opt(2026, 11, 2),
            price: Some(12000),
            currency: Currency::USD,
        })
        .await
        .unwrap();
    assert_eq!(created.requester_id, homeowner_id);

    let board = provider.list_requests(&RequestFilter::open()).await.unwrap();
    assert_eq!(board.len(), 1);

    let accepted = provider.accept(created.id).await.unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    assert_eq!(accepted.provider_id, Some(provider_id));

    let conversation = homeowner.open_conversation(created.id).await.unwrap();
    homeowner
        .post_message(conversation.id, "side gate is open")
        .await
        .unwrap();
    let thread = provider.list_messages(conversation.id).await.unwrap();
    assert_eq!(thread.len(), 1);

    let inbox = provider.list_notifications().await.unwrap();
    assert_eq!(inbox.len(), 1);
    let read = provider.mark_notification_read(inbox[0].id).await.unwrap();
    assert!(read.is_read());

    provider.complete(created.id).await.unwrap();
    let review = homeowner
        .create_review(created.id, 4, Some("Tidy work".into()))
        .await
        .unwrap();
    assert_eq!(review.rating, 4);

    let mine = homeowner
        .list_requests(&RequestFilter::requested_by(homeowner_id))
        .await
        .unwrap();
    assert_eq!(mine[0].status, RequestStatus::Completed);
}

#[tokio::test]
async fn test_api_errors_carry_kind() {
    let base = spawn_server().await;
    let admin_key = BookingClient::new(&base)
        .bootstrap("ops", None)
        .await
        .unwrap();
    let admin = BookingClient::new(&base).with_api_key(admin_key.api_key);

    let err = admin
        .get_request(booking_types::ServiceRequestId::new())
        .await
        .unwrap_err();
    match err {
        ClientError::Api { status, kind, .. } => {
            assert_eq!(status, 404);
            assert_eq!(kind, "not_found");
        }
        other => panic!("unexpected error: {}", other),
    }

    let err = BookingClient::new(&base)
        .list_conversations()
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 401, .. }));
}
