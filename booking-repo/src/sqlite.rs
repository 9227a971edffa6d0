//! SQLite repository adapter.
//!
//! UUIDs and timestamps are stored as text. In-memory databases are pinned
//! to a single pooled connection; file databases run in WAL mode with a busy
//! timeout so concurrent writers queue instead of failing.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use booking_types::{
    ApiKey, ApiKeyId, BookingEvent, BookingRepository, BookingSummary, Conversation,
    ConversationId, ConversationSummary, DomainError, EventId, Message, MessageId, NewMessage,
    NewNotification, Notification, NotificationId, OutboxEvent, RelatedRef, RepoError,
    RequestFilter, Review, ReviewId, Role, ServiceRequest, ServiceRequestId, Transition, UserId,
};

use crate::types::text::{parse_date, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid, ts};
use crate::types::{
    event_from_json, event_to_json, is_unique_violation, parse_outbox_status,
    intent_failure, parse_payment_status, parse_price, parse_role, parse_status,
    payment_failure, transition_failure,
};

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001", include_str!("../migrations/0001_create_service_requests.sql")),
    ("0002", include_str!("../migrations/0002_create_conversations.sql")),
    ("0003", include_str!("../migrations/0003_create_notifications.sql")),
    ("0004", include_str!("../migrations/0004_create_reviews.sql")),
    ("0005", include_str!("../migrations/0005_create_domain_events.sql")),
    ("0006", include_str!("../migrations/0006_create_api_keys.sql")),
];

const SELECT_REQUEST_BY_ID: &str = r#"
    SELECT id, requester_id, provider_id, service_type, address, scheduled_date,
           price_amount, price_currency, status, payment_status, payment_intent_id,
           created_at, updated_at
    FROM service_requests WHERE id = ?"#;

const SELECT_NOTIFICATIONS: &str = r#"
    SELECT n.id, n.recipient_id, n.title, n.body, n.link, n.related_kind, n.related_id,
           n.read_at, n.created_at,
           CASE n.related_kind
               WHEN 'conversation' THEN EXISTS (SELECT 1 FROM conversations c WHERE c.id = n.related_id)
               WHEN 'service_request' THEN EXISTS (SELECT 1 FROM service_requests r WHERE r.id = n.related_id)
               ELSE 1
           END AS related_exists
    FROM notifications n"#;

const API_KEY_COLUMNS: &str =
    "id, name, key_hash, user_id, role, is_active, created_at, last_used_at";

// ─────────────────────────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct RequestRow {
    id: String,
    requester_id: String,
    provider_id: Option<String>,
    service_type: String,
    address: String,
    scheduled_date: String,
    price_amount: Option<i64>,
    price_currency: Option<String>,
    status: String,
    payment_status: String,
    payment_intent_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RequestRow {
    fn into_domain(self) -> Result<ServiceRequest, RepoError> {
        Ok(ServiceRequest {
            id: ServiceRequestId::from_uuid(parse_uuid(&self.id)?),
            requester_id: UserId::from_uuid(parse_uuid(&self.requester_id)?),
            provider_id: parse_opt_uuid(self.provider_id)?.map(UserId::from_uuid),
            service_type: self.service_type,
            address: self.address,
            scheduled_date: parse_date(&self.scheduled_date)?,
            price: parse_price(self.price_amount, self.price_currency.as_deref())?,
            status: parse_status(&self.status)?,
            payment_status: parse_payment_status(&self.payment_status)?,
            payment_intent_id: self.payment_intent_id,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct ConversationRow {
    id: String,
    service_request_id: String,
    created_at: String,
    last_activity_at: String,
}

impl ConversationRow {
    fn into_domain(self) -> Result<Conversation, RepoError> {
        Ok(Conversation {
            id: ConversationId::from_uuid(parse_uuid(&self.id)?),
            service_request_id: ServiceRequestId::from_uuid(parse_uuid(&self.service_request_id)?),
            created_at: parse_ts(&self.created_at)?,
            last_activity_at: parse_ts(&self.last_activity_at)?,
        })
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    content: String,
    seq: i64,
    created_at: String,
}

impl MessageRow {
    fn into_domain(self) -> Result<Message, RepoError> {
        Ok(Message {
            id: MessageId::from_uuid(parse_uuid(&self.id)?),
            conversation_id: ConversationId::from_uuid(parse_uuid(&self.conversation_id)?),
            sender_id: UserId::from_uuid(parse_uuid(&self.sender_id)?),
            content: self.content,
            seq: self.seq,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

/// Conversation joined with its booking and (optionally) its latest message.
#[derive(FromRow)]
struct InboxRow {
    id: String,
    service_request_id: String,
    created_at: String,
    last_activity_at: String,
    service_type: String,
    address: String,
    status: String,
    message_id: Option<String>,
    sender_id: Option<String>,
    content: Option<String>,
    seq: Option<i64>,
    message_created_at: Option<String>,
}

impl InboxRow {
    fn into_domain(self) -> Result<ConversationSummary, RepoError> {
        let conversation = ConversationRow {
            id: self.id,
            service_request_id: self.service_request_id,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
        .into_domain()?;

        let last_message = match (
            self.message_id,
            self.sender_id,
            self.content,
            self.seq,
            self.message_created_at,
        ) {
            (Some(id), Some(sender_id), Some(content), Some(seq), Some(created_at)) => Some(
                MessageRow {
                    id,
                    conversation_id: conversation.id.to_string(),
                    sender_id,
                    content,
                    seq,
                    created_at,
                }
                .into_domain()?,
            ),
            _ => None,
        };

        Ok(ConversationSummary {
            service_request: BookingSummary {
                id: conversation.service_request_id,
                service_type: self.service_type,
                address: self.address,
                status: parse_status(&self.status)?,
            },
            conversation,
            last_message,
        })
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    title: String,
    body: String,
    link: Option<String>,
    related_kind: Option<String>,
    related_id: Option<String>,
    read_at: Option<String>,
    created_at: String,
    related_exists: i64,
}

impl NotificationRow {
    fn into_domain(self) -> Result<Notification, RepoError> {
        let related = match (self.related_kind, self.related_id) {
            (Some(kind), Some(id)) => Some(RelatedRef::from_parts(&kind, parse_uuid(&id)?)?),
            _ => None,
        };
        let notification = Notification {
            id: NotificationId::from_uuid(parse_uuid(&self.id)?),
            recipient_id: UserId::from_uuid(parse_uuid(&self.recipient_id)?),
            title: self.title,
            body: self.body,
            link: self.link,
            related,
            read_at: parse_opt_ts(self.read_at)?,
            created_at: parse_ts(&self.created_at)?,
        };
        if notification.related.is_some() && self.related_exists == 0 {
            Ok(notification.detach_related())
        } else {
            Ok(notification)
        }
    }
}

#[derive(FromRow)]
struct EventRow {
    id: String,
    payload: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: String,
    processed_at: Option<String>,
}

impl EventRow {
    fn into_domain(self) -> Result<OutboxEvent, RepoError> {
        let payload: serde_json::Value =
            serde_json::from_str(&self.payload).map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(OutboxEvent {
            id: EventId::from_uuid(parse_uuid(&self.id)?),
            event: event_from_json(payload)?,
            status: parse_outbox_status(&self.status)?,
            created_at: parse_ts(&self.created_at)?,
            processed_at: parse_opt_ts(self.processed_at)?,
            attempts: self.attempts,
            last_error: self.last_error,
        })
    }
}

#[derive(FromRow)]
struct ReviewRow {
    id: String,
    service_request_id: String,
    reviewer_id: String,
    provider_id: String,
    rating: i64,
    comment: Option<String>,
    created_at: String,
}

impl ReviewRow {
    fn into_domain(self) -> Result<Review, RepoError> {
        Ok(Review {
            id: ReviewId::from_uuid(parse_uuid(&self.id)?),
            service_request_id: ServiceRequestId::from_uuid(parse_uuid(&self.service_request_id)?),
            reviewer_id: UserId::from_uuid(parse_uuid(&self.reviewer_id)?),
            provider_id: UserId::from_uuid(parse_uuid(&self.provider_id)?),
            rating: u8::try_from(self.rating).map_err(|e| RepoError::Database(e.to_string()))?,
            comment: self.comment,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct ApiKeyRow {
    id: String,
    name: String,
    key_hash: String,
    user_id: String,
    role: String,
    is_active: i64,
    created_at: String,
    last_used_at: Option<String>,
}

impl ApiKeyRow {
    fn into_domain(self) -> Result<ApiKey, RepoError> {
        Ok(ApiKey {
            id: ApiKeyId::from_uuid(parse_uuid(&self.id)?),
            name: self.name,
            key_hash: self.key_hash,
            user_id: UserId::from_uuid(parse_uuid(&self.user_id)?),
            role: parse_role(&self.role)?,
            is_active: self.is_active != 0,
            created_at: parse_ts(&self.created_at)?,
            last_used_at: parse_opt_ts(self.last_used_at)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), RepoError> {
    for (name, sql) in MIGRATIONS {
        for statement in sql.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(pool).await.map_err(|e| {
                    RepoError::Database(format!("Migration {} failed: {}", name, e))
                })?;
            }
        }
    }
    Ok(())
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = is_in_memory(database_url);

        // Ensure on-disk SQLite target directory exists.
        if !in_memory {
            if let Some(path) = database_url.strip_prefix("sqlite://") {
                let path = path.split('?').next().unwrap_or(path);
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = if in_memory {
            // Every connection to :memory: is a separate database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            let options = options
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));
            SqlitePoolOptions::new().connect_with(options).await?
        };

        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn fetch_request<'e, E>(
    executor: E,
    id: ServiceRequestId,
) -> Result<Option<ServiceRequest>, RepoError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row: Option<RequestRow> = sqlx::query_as(SELECT_REQUEST_BY_ID)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

    row.map(RequestRow::into_domain).transpose()
}

async fn insert_event(conn: &mut SqliteConnection, event: &OutboxEvent) -> Result<(), RepoError> {
    let payload = event_to_json(&event.event)?;

    sqlx::query(
        r#"INSERT INTO domain_events (id, event_type, payload, status, attempts, created_at)
           VALUES (?, ?, ?, 'PENDING', 0, ?)"#,
    )
    .bind(event.id.to_string())
    .bind(event.event.kind())
    .bind(payload.to_string())
    .bind(ts(event.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| RepoError::Database(e.to_string()))?;

    Ok(())
}

async fn insert_notification(
    conn: &mut SqliteConnection,
    n: &Notification,
) -> Result<(), RepoError> {
    sqlx::query(
        r#"INSERT INTO notifications (id, recipient_id, title, body, link, related_kind, related_id, read_at, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)"#,
    )
    .bind(n.id.to_string())
    .bind(n.recipient_id.to_string())
    .bind(&n.title)
    .bind(&n.body)
    .bind(&n.link)
    .bind(n.related.map(|r| r.kind()))
    .bind(n.related.map(|r| r.uuid().to_string()))
    .bind(ts(n.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| RepoError::Database(e.to_string()))?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl BookingRepository for SqliteRepo {
    async fn create_request(&self, req: ServiceRequest) -> Result<ServiceRequest, RepoError> {
        sqlx::query(
            r#"INSERT INTO service_requests
               (id, requester_id, provider_id, service_type, address, scheduled_date,
                price_amount, price_currency, status, payment_status, payment_intent_id,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(req.id.to_string())
        .bind(req.requester_id.to_string())
        .bind(req.provider_id.map(|p| p.to_string()))
        .bind(&req.service_type)
        .bind(&req.address)
        .bind(req.scheduled_date.to_string())
        .bind(req.price.map(|p| p.amount()))
        .bind(req.price.map(|p| p.currency().to_string()))
        .bind(req.status.as_str())
        .bind(req.payment_status.as_str())
        .bind(&req.payment_intent_id)
        .bind(ts(req.created_at))
        .bind(ts(req.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(req)
    }

    async fn get_request(
        &self,
        id: ServiceRequestId,
    ) -> Result<Option<ServiceRequest>, RepoError> {
        fetch_request(&self.pool, id).await
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ServiceRequest>, RepoError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT id, requester_id, provider_id, service_type, address, scheduled_date,
                      price_amount, price_currency, status, payment_status, payment_intent_id,
                      created_at, updated_at
               FROM service_requests WHERE 1 = 1"#,
        );
        if let Some(requester) = filter.requester_id {
            qb.push(" AND requester_id = ").push_bind(requester.to_string());
        }
        if let Some(provider) = filter.provider_id {
            qb.push(" AND provider_id = ").push_bind(provider.to_string());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at DESC, rowid DESC");

        let rows: Vec<RequestRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(RequestRow::into_domain).collect()
    }

    async fn apply_transition(
        &self,
        id: ServiceRequestId,
        transition: Transition,
    ) -> Result<(ServiceRequest, OutboxEvent), RepoError> {
        let now = ts(Utc::now());
        let id_str = id.to_string();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // Compare-and-set: the WHERE clause is the state machine's guard.
        let result = match transition {
            Transition::Accept { provider } => {
                sqlx::query(
                    r#"UPDATE service_requests SET status = 'accepted', provider_id = ?, updated_at = ?
                       WHERE id = ? AND status = 'pending'"#,
                )
                .bind(provider.to_string())
                .bind(&now)
                .bind(&id_str)
                .execute(&mut *db_tx)
                .await
            }
            Transition::Complete { provider } => {
                sqlx::query(
                    r#"UPDATE service_requests SET status = 'completed', updated_at = ?
                       WHERE id = ? AND status = 'accepted' AND provider_id = ?"#,
                )
                .bind(&now)
                .bind(&id_str)
                .bind(provider.to_string())
                .execute(&mut *db_tx)
                .await
            }
            Transition::Cancel { .. } => {
                sqlx::query(
                    r#"UPDATE service_requests SET status = 'cancelled', updated_at = ?
                       WHERE id = ? AND status IN ('pending', 'accepted')"#,
                )
                .bind(&now)
                .bind(&id_str)
                .execute(&mut *db_tx)
                .await
            }
        }
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            let current = fetch_request(&mut *db_tx, id).await?;
            return Err(transition_failure(current, &transition));
        }

        let updated = fetch_request(&mut *db_tx, id)
            .await?
            .ok_or(RepoError::NotFound)?;
        let event = OutboxEvent::new(transition.event_for(&updated));
        insert_event(&mut db_tx, &event).await?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok((updated, event))
    }

    async fn delete_request(&self, id: ServiceRequestId) -> Result<bool, RepoError> {
        let id_str = id.to_string();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"DELETE FROM messages WHERE conversation_id IN
               (SELECT id FROM conversations WHERE service_request_id = ?)"#,
        )
        .bind(&id_str)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        sqlx::query(r#"DELETE FROM conversations WHERE service_request_id = ?"#)
            .bind(&id_str)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        sqlx::query(r#"DELETE FROM reviews WHERE service_request_id = ?"#)
            .bind(&id_str)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let result = sqlx::query(r#"DELETE FROM service_requests WHERE id = ?"#)
            .bind(&id_str)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_payment_intent(
        &self,
        id: ServiceRequestId,
        expected: Option<&str>,
        intent_id: &str,
    ) -> Result<ServiceRequest, RepoError> {
        let result = sqlx::query(
            r#"UPDATE service_requests SET payment_intent_id = ?, updated_at = ?
               WHERE id = ? AND status = 'completed' AND payment_status = 'unpaid'
                 AND payment_intent_id IS ?"#,
        )
        .bind(intent_id)
        .bind(ts(Utc::now()))
        .bind(id.to_string())
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            let current = fetch_request(&self.pool, id).await?;
            return Err(intent_failure(current));
        }

        fetch_request(&self.pool, id)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn mark_paid(
        &self,
        id: ServiceRequestId,
    ) -> Result<(ServiceRequest, OutboxEvent), RepoError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let result = sqlx::query(
            r#"UPDATE service_requests SET payment_status = 'paid', updated_at = ?
               WHERE id = ? AND status = 'completed' AND payment_status = 'unpaid'"#,
        )
        .bind(ts(Utc::now()))
        .bind(id.to_string())
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            let current = fetch_request(&mut *db_tx, id).await?;
            return Err(payment_failure(current));
        }

        let updated = fetch_request(&mut *db_tx, id)
            .await?
            .ok_or(RepoError::NotFound)?;
        let event = OutboxEvent::new(BookingEvent::PaymentSucceeded {
            request_id: updated.id,
            requester_id: updated.requester_id,
            provider_id: updated.provider_id,
        });
        insert_event(&mut db_tx, &event).await?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok((updated, event))
    }

    async fn get_or_create_conversation(
        &self,
        request_id: ServiceRequestId,
    ) -> Result<Conversation, RepoError> {
        let candidate = Conversation::new(request_id);
        let request_id_str = request_id.to_string();

        sqlx::query(
            r#"INSERT INTO conversations (id, service_request_id, message_count, created_at, last_activity_at)
               VALUES (?, ?, 0, ?, ?)
               ON CONFLICT (service_request_id) DO NOTHING"#,
        )
        .bind(candidate.id.to_string())
        .bind(&request_id_str)
        .bind(ts(candidate.created_at))
        .bind(ts(candidate.last_activity_at))
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let row: ConversationRow = sqlx::query_as(
            r#"SELECT id, service_request_id, created_at, last_activity_at
               FROM conversations WHERE service_request_id = ?"#,
        )
        .bind(&request_id_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.into_domain()
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepoError> {
        let row: Option<ConversationRow> = sqlx::query_as(
            r#"SELECT id, service_request_id, created_at, last_activity_at
               FROM conversations WHERE id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(ConversationRow::into_domain).transpose()
    }

    async fn list_conversations_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<ConversationSummary>, RepoError> {
        let user_str = user.to_string();

        let rows: Vec<InboxRow> = sqlx::query_as(
            r#"SELECT c.id, c.service_request_id, c.created_at, c.last_activity_at,
                      r.service_type, r.address, r.status,
                      m.id AS message_id, m.sender_id, m.content, m.seq,
                      m.created_at AS message_created_at
               FROM conversations c
               JOIN service_requests r ON r.id = c.service_request_id
               LEFT JOIN messages m ON m.conversation_id = c.id AND m.seq = c.message_count
               WHERE r.requester_id = ? OR r.provider_id = ?
               ORDER BY c.last_activity_at DESC, c.rowid DESC"#,
        )
        .bind(&user_str)
        .bind(&user_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(InboxRow::into_domain).collect()
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepoError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"SELECT id, conversation_id, sender_id, content, seq, created_at
               FROM messages WHERE conversation_id = ? ORDER BY seq ASC"#,
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(MessageRow::into_domain).collect()
    }

    async fn append_message(
        &self,
        msg: NewMessage,
    ) -> Result<(Message, Option<OutboxEvent>), RepoError> {
        msg.validate()?;
        let now = Utc::now();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // The counter bump takes the write lock, so seq follows commit order.
        let row: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE conversations
               SET message_count = message_count + 1, last_activity_at = ?
               WHERE id = ?
               RETURNING message_count"#,
        )
        .bind(ts(now))
        .bind(msg.conversation_id.to_string())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let (seq,) = row.ok_or(RepoError::NotFound)?;

        let message = Message {
            id: MessageId::new(),
            conversation_id: msg.conversation_id,
            sender_id: msg.sender_id,
            content: msg.content,
            seq,
            created_at: now,
        };

        sqlx::query(
            r#"INSERT INTO messages (id, conversation_id, sender_id, content, seq, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(message.conversation_id.to_string())
        .bind(message.sender_id.to_string())
        .bind(&message.content)
        .bind(message.seq)
        .bind(ts(message.created_at))
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let event = match msg.recipient_id {
            Some(recipient_id) => {
                let event = OutboxEvent::new(BookingEvent::MessagePosted {
                    request_id: msg.service_request_id,
                    conversation_id: message.conversation_id,
                    message_id: message.id,
                    sender_id: message.sender_id,
                    recipient_id,
                });
                insert_event(&mut db_tx, &event).await?;
                Some(event)
            }
            None => None,
        };

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok((message, event))
    }

    async fn create_notification(&self, n: NewNotification) -> Result<Notification, RepoError> {
        let notification = n.into_notification();
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        insert_notification(&mut conn, &notification).await?;
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        user: UserId,
        limit: i64,
    ) -> Result<Vec<Notification>, RepoError> {
        let sql = format!(
            "{} WHERE n.recipient_id = ? ORDER BY n.created_at DESC, n.rowid DESC LIMIT ?",
            SELECT_NOTIFICATIONS
        );
        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .bind(user.to_string())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepoError> {
        let sql = format!("{} WHERE n.id = ?", SELECT_NOTIFICATIONS);
        let row: Option<NotificationRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(NotificationRow::into_domain).transpose()
    }

    async fn mark_notification_read(&self, id: NotificationId) -> Result<Notification, RepoError> {
        let result =
            sqlx::query(r#"UPDATE notifications SET read_at = COALESCE(read_at, ?) WHERE id = ?"#)
                .bind(ts(Utc::now()))
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        self.get_notification(id).await?.ok_or(RepoError::NotFound)
    }

    async fn pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, RepoError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"SELECT id, payload, status, attempts, last_error, created_at, processed_at
               FROM domain_events
               WHERE status = 'PENDING'
               ORDER BY created_at ASC, rowid ASC
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(EventRow::into_domain).collect()
    }

    async fn deliver_event(
        &self,
        id: EventId,
        notifications: Vec<NewNotification>,
    ) -> Result<bool, RepoError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let claimed = sqlx::query(
            r#"UPDATE domain_events
               SET status = 'DELIVERED', processed_at = ?, attempts = attempts + 1
               WHERE id = ? AND status = 'PENDING'"#,
        )
        .bind(ts(Utc::now()))
        .bind(id.to_string())
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if claimed.rows_affected() == 0 {
            db_tx
                .rollback()
                .await
                .map_err(|e| RepoError::Transaction(e.to_string()))?;
            return Ok(false);
        }

        for n in notifications {
            insert_notification(&mut db_tx, &n.into_notification()).await?;
        }

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(true)
    }

    async fn record_event_failure(
        &self,
        id: EventId,
        error: &str,
        max_attempts: i32,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"UPDATE domain_events
               SET attempts = attempts + 1,
                   last_error = ?,
                   status = CASE WHEN attempts + 1 >= ? THEN 'FAILED' ELSE status END
               WHERE id = ? AND status = 'PENDING'"#,
        )
        .bind(error)
        .bind(max_attempts)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn create_review(&self, review: Review) -> Result<(Review, OutboxEvent), RepoError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO reviews (id, service_request_id, reviewer_id, provider_id, rating, comment, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(review.id.to_string())
        .bind(review.service_request_id.to_string())
        .bind(review.reviewer_id.to_string())
        .bind(review.provider_id.to_string())
        .bind(i64::from(review.rating))
        .bind(&review.comment)
        .bind(ts(review.created_at))
        .execute(&mut *db_tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepoError::Domain(DomainError::AlreadyReviewed)
            } else {
                RepoError::Database(e.to_string())
            }
        })?;

        let event = OutboxEvent::new(BookingEvent::ReviewSubmitted {
            request_id: review.service_request_id,
            provider_id: review.provider_id,
            rating: review.rating,
        });
        insert_event(&mut db_tx, &event).await?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok((review, event))
    }

    async fn get_review_for_request(
        &self,
        request_id: ServiceRequestId,
    ) -> Result<Option<Review>, RepoError> {
        let row: Option<ReviewRow> = sqlx::query_as(
            r#"SELECT id, service_request_id, reviewer_id, provider_id, rating, comment, created_at
               FROM reviews WHERE service_request_id = ?"#,
        )
        .bind(request_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(ReviewRow::into_domain).transpose()
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let sql = format!(
            "UPDATE api_keys SET last_used_at = ? WHERE key_hash = ? AND is_active = 1 RETURNING {}",
            API_KEY_COLUMNS
        );
        let row: Option<ApiKeyRow> = sqlx::query_as(&sql)
            .bind(ts(Utc::now()))
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(ApiKeyRow::into_domain).transpose()
    }

    async fn create_api_key(
        &self,
        name: &str,
        user_id: UserId,
        role: Role,
    ) -> Result<(ApiKey, String), RepoError> {
        let raw_key = crate::security::generate_api_key();
        let api_key = ApiKey::new(
            name.to_string(),
            crate::security::hash_api_key(&raw_key),
            user_id,
            role,
        );

        sqlx::query(
            r#"INSERT INTO api_keys (id, name, key_hash, user_id, role, is_active, created_at)
               VALUES (?, ?, ?, ?, ?, 1, ?)"#,
        )
        .bind(api_key.id.to_string())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(api_key.user_id.to_string())
        .bind(api_key.role.as_str())
        .bind(ts(api_key.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok((api_key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.0)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE is_active = 1 ORDER BY created_at DESC",
            API_KEY_COLUMNS
        );
        let rows: Vec<ApiKeyRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(ApiKeyRow::into_domain).collect()
    }

    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError> {
        let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ? AND is_active = 1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
