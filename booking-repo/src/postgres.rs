//! PostgreSQL repository adapter.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use booking_types::{
    ApiKey, ApiKeyId, BookingEvent, BookingRepository, BookingSummary, Conversation,
    ConversationId, ConversationSummary, DomainError, EventId, Message, MessageId, NewMessage,
    NewNotification, Notification, NotificationId, OutboxEvent, RelatedRef, RepoError,
    RequestFilter, Review, ReviewId, Role, ServiceRequest, ServiceRequestId, Transition, UserId,
};

use crate::types::{
    event_from_json, event_to_json, intent_failure, is_unique_violation, parse_outbox_status,
    parse_payment_status, parse_price, parse_role, parse_status, payment_failure,
    transition_failure,
};

const SELECT_REQUEST_BY_ID: &str = r#"
    SELECT id, requester_id, provider_id, service_type, address, scheduled_date,
           price_amount, price_currency, status, payment_status, payment_intent_id,
           created_at, updated_at
    FROM service_requests WHERE id = $1"#;

const SELECT_NOTIFICATIONS: &str = r#"
    SELECT n.id, n.recipient_id, n.title, n.body, n.link, n.related_kind, n.related_id,
           n.read_at, n.created_at,
           CASE n.related_kind
               WHEN 'conversation' THEN EXISTS (SELECT 1 FROM conversations c WHERE c.id = n.related_id)
               WHEN 'service_request' THEN EXISTS (SELECT 1 FROM service_requests r WHERE r.id = n.related_id)
               ELSE TRUE
           END AS related_exists
    FROM notifications n"#;

const API_KEY_COLUMNS: &str =
    "id, name, key_hash, user_id, role, is_active, created_at, last_used_at";

// ─────────────────────────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct RequestRow {
    id: Uuid,
    requester_id: Uuid,
    provider_id: Option<Uuid>,
    service_type: String,
    address: String,
    scheduled_date: NaiveDate,
    price_amount: Option<i64>,
    price_currency: Option<String>,
    status: String,
    payment_status: String,
    payment_intent_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RequestRow {
    fn into_domain(self) -> Result<ServiceRequest, RepoError> {
        Ok(ServiceRequest {
            id: ServiceRequestId::from_uuid(self.id),
            requester_id: UserId::from_uuid(self.requester_id),
            provider_id: self.provider_id.map(UserId::from_uuid),
            service_type: self.service_type,
            address: self.address,
            scheduled_date: self.scheduled_date,
            price: parse_price(self.price_amount, self.price_currency.as_deref())?,
            status: parse_status(&self.status)?,
            payment_status: parse_payment_status(&self.payment_status)?,
            payment_intent_id: self.payment_intent_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ConversationRow {
    id: Uuid,
    service_request_id: Uuid,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: ConversationId::from_uuid(row.id),
            service_request_id: ServiceRequestId::from_uuid(row.service_request_id),
            created_at: row.created_at,
            last_activity_at: row.last_activity_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    seq: i64,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: MessageId::from_uuid(row.id),
            conversation_id: ConversationId::from_uuid(row.conversation_id),
            sender_id: UserId::from_uuid(row.sender_id),
            content: row.content,
            seq: row.seq,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct InboxRow {
    id: Uuid,
    service_request_id: Uuid,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    service_type: String,
    address: String,
    status: String,
    message_id: Option<Uuid>,
    sender_id: Option<Uuid>,
    content: Option<String>,
    seq: Option<i64>,
    message_created_at: Option<DateTime<Utc>>,
}

impl InboxRow {
    fn into_domain(self) -> Result<ConversationSummary, RepoError> {
        let last_message = match (
            self.message_id,
            self.sender_id,
            self.content,
            self.seq,
            self.message_created_at,
        ) {
            (Some(id), Some(sender_id), Some(content), Some(seq), Some(created_at)) => {
                Some(Message {
                    id: MessageId::from_uuid(id),
                    conversation_id: ConversationId::from_uuid(self.id),
                    sender_id: UserId::from_uuid(sender_id),
                    content,
                    seq,
                    created_at,
                })
            }
            _ => None,
        };

        Ok(ConversationSummary {
            conversation: Conversation {
                id: ConversationId::from_uuid(self.id),
                service_request_id: ServiceRequestId::from_uuid(self.service_request_id),
                created_at: self.created_at,
                last_activity_at: self.last_activity_at,
            },
            service_request: BookingSummary {
                id: ServiceRequestId::from_uuid(self.service_request_id),
                service_type: self.service_type,
                address: self.address,
                status: parse_status(&self.status)?,
            },
            last_message,
        })
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    title: String,
    body: String,
    link: Option<String>,
    related_kind: Option<String>,
    related_id: Option<Uuid>,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    related_exists: bool,
}

impl NotificationRow {
    fn into_domain(self) -> Result<Notification, RepoError> {
        let related = match (self.related_kind, self.related_id) {
            (Some(kind), Some(id)) => Some(RelatedRef::from_parts(&kind, id)?),
            _ => None,
        };
        let notification = Notification {
            id: NotificationId::from_uuid(self.id),
            recipient_id: UserId::from_uuid(self.recipient_id),
            title: self.title,
            body: self.body,
            link: self.link,
            related,
            read_at: self.read_at,
            created_at: self.created_at,
        };
        if notification.related.is_some() && !self.related_exists {
            Ok(notification.detach_related())
        } else {
            Ok(notification)
        }
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl EventRow {
    fn into_domain(self) -> Result<OutboxEvent, RepoError> {
        Ok(OutboxEvent {
            id: EventId::from_uuid(self.id),
            event: event_from_json(self.payload)?,
            status: parse_outbox_status(&self.status)?,
            created_at: self.created_at,
            processed_at: self.processed_at,
            attempts: self.attempts,
            last_error: self.last_error,
        })
    }
}

#[derive(FromRow)]
struct ReviewRow {
    id: Uuid,
    service_request_id: Uuid,
    reviewer_id: Uuid,
    provider_id: Uuid,
    rating: i16,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl ReviewRow {
    fn into_domain(self) -> Result<Review, RepoError> {
        Ok(Review {
            id: ReviewId::from_uuid(self.id),
            service_request_id: ServiceRequestId::from_uuid(self.service_request_id),
            reviewer_id: UserId::from_uuid(self.reviewer_id),
            provider_id: UserId::from_uuid(self.provider_id),
            rating: u8::try_from(self.rating).map_err(|e| RepoError::Database(e.to_string()))?,
            comment: self.comment,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ApiKeyRow {
    id: Uuid,
    name: String,
    key_hash: String,
    user_id: Uuid,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRow {
    fn into_domain(self) -> Result<ApiKey, RepoError> {
        Ok(ApiKey {
            id: ApiKeyId::from_uuid(self.id),
            name: self.name,
            key_hash: self.key_hash,
            user_id: UserId::from_uuid(self.user_id),
            role: parse_role(&self.role)?,
            is_active: self.is_active,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository. Lifecycle writes are compare-and-set updates, so
/// no explicit row locks are taken.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_service_requests_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_conversations_pg.sql"),
        "0002",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0003_create_notifications_pg.sql"),
        "0003",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0004_create_reviews_pg.sql"),
        "0004",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0005_create_domain_events_pg.sql"),
        "0005",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0006_create_api_keys_pg.sql"),
        "0006",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn fetch_request<'e, E>(
    executor: E,
    id: ServiceRequestId,
) -> Result<Option<ServiceRequest>, RepoError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row: Option<RequestRow> = sqlx::query_as(SELECT_REQUEST_BY_ID)
        .bind(id.into_uuid())
        .fetch_optional(executor)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

    row.map(RequestRow::into_domain).transpose()
}

async fn insert_event(conn: &mut PgConnection, event: &OutboxEvent) -> Result<(), RepoError> {
    let payload = event_to_json(&event.event)?;

    sqlx::query(
        r#"INSERT INTO domain_events (id, event_type, payload, status, attempts, created_at)
           VALUES ($1, $2, $3, 'PENDING', 0, $4)"#,
    )
    .bind(event.id.into_uuid())
    .bind(event.event.kind())
    .bind(payload)
    .bind(event.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| RepoError::Database(e.to_string()))?;

    Ok(())
}

async fn insert_notification(conn: &mut PgConnection, n: &Notification) -> Result<(), RepoError> {
    sqlx::query(
        r#"INSERT INTO notifications (id, recipient_id, title, body, link, related_kind, related_id, read_at, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8)"#,
    )
    .bind(n.id.into_uuid())
    .bind(n.recipient_id.into_uuid())
    .bind(&n.title)
    .bind(&n.body)
    .bind(&n.link)
    .bind(n.related.map(|r| r.kind()))
    .bind(n.related.map(|r| r.uuid()))
    .bind(n.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| RepoError::Database(e.to_string()))?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl BookingRepository for PostgresRepo {
    async fn create_request(&self, req: ServiceRequest) -> Result<ServiceRequest, RepoError> {
        sqlx::query(
            r#"INSERT INTO service_requests
               (id, requester_id, provider_id, service_type, address, scheduled_date,
                price_amount, price_currency, status, payment_status, payment_intent_id,
                created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
        )
        .bind(req.id.into_uuid())
        .bind(req.requester_id.into_uuid())
        .bind(req.provider_id.map(UserId::into_uuid))
        .bind(&req.service_type)
        .bind(&req.address)
        .bind(req.scheduled_date)
        .bind(req.price.map(|p| p.amount()))
        .bind(req.price.map(|p| p.currency().to_string()))
        .bind(req.status.as_str())
        .bind(req.payment_status.as_str())
        .bind(&req.payment_intent_id)
        .bind(req.created_at)
        .bind(req.updated_at)
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
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"SELECT id, requester_id, provider_id, service_type, address, scheduled_date,
                      price_amount, price_currency, status, payment_status, payment_intent_id,
                      created_at, updated_at
               FROM service_requests WHERE TRUE"#,
        );
        if let Some(requester) = filter.requester_id {
            qb.push(" AND requester_id = ").push_bind(requester.into_uuid());
        }
        if let Some(provider) = filter.provider_id {
            qb.push(" AND provider_id = ").push_bind(provider.into_uuid());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

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
        let now = Utc::now();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // Compare-and-set: the WHERE clause is the state machine's guard.
        let result = match transition {
            Transition::Accept { provider } => {
                sqlx::query(
                    r#"UPDATE service_requests SET status = 'accepted', provider_id = $1, updated_at = $2
                       WHERE id = $3 AND status = 'pending'"#,
                )
                .bind(provider.into_uuid())
                .bind(now)
                .bind(id.into_uuid())
                .execute(&mut *db_tx)
                .await
            }
            Transition::Complete { provider } => {
                sqlx::query(
                    r#"UPDATE service_requests SET status = 'completed', updated_at = $1
                       WHERE id = $2 AND status = 'accepted' AND provider_id = $3"#,
                )
                .bind(now)
                .bind(id.into_uuid())
                .bind(provider.into_uuid())
                .execute(&mut *db_tx)
                .await
            }
            Transition::Cancel { .. } => {
                sqlx::query(
                    r#"UPDATE service_requests SET status = 'cancelled', updated_at = $1
                       WHERE id = $2 AND status IN ('pending', 'accepted')"#,
                )
                .bind(now)
                .bind(id.into_uuid())
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
        let id = id.into_uuid();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"DELETE FROM messages WHERE conversation_id IN
               (SELECT id FROM conversations WHERE service_request_id = $1)"#,
        )
        .bind(id)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        sqlx::query(r#"DELETE FROM conversations WHERE service_request_id = $1"#)
            .bind(id)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        sqlx::query(r#"DELETE FROM reviews WHERE service_request_id = $1"#)
            .bind(id)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let result = sqlx::query(r#"DELETE FROM service_requests WHERE id = $1"#)
            .bind(id)
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
        let row: Option<RequestRow> = sqlx::query_as(
            r#"UPDATE service_requests SET payment_intent_id = $1, updated_at = $2
               WHERE id = $3 AND status = 'completed' AND payment_status = 'unpaid'
                 AND payment_intent_id IS NOT DISTINCT FROM $4::TEXT
               RETURNING id, requester_id, provider_id, service_type, address, scheduled_date,
                         price_amount, price_currency, status, payment_status, payment_intent_id,
                         created_at, updated_at"#,
        )
        .bind(intent_id)
        .bind(Utc::now())
        .bind(id.into_uuid())
        .bind(expected)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        match row {
            Some(row) => row.into_domain(),
            None => Err(intent_failure(fetch_request(&self.pool, id).await?)),
        }
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
            r#"UPDATE service_requests SET payment_status = 'paid', updated_at = $1
               WHERE id = $2 AND status = 'completed' AND payment_status = 'unpaid'"#,
        )
        .bind(Utc::now())
        .bind(id.into_uuid())
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

        sqlx::query(
            r#"INSERT INTO conversations (id, service_request_id, message_count, created_at, last_activity_at)
               VALUES ($1, $2, 0, $3, $4)
               ON CONFLICT (service_request_id) DO NOTHING"#,
        )
        .bind(candidate.id.into_uuid())
        .bind(request_id.into_uuid())
        .bind(candidate.created_at)
        .bind(candidate.last_activity_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let row: ConversationRow = sqlx::query_as(
            r#"SELECT id, service_request_id, created_at, last_activity_at
               FROM conversations WHERE service_request_id = $1"#,
        )
        .bind(request_id.into_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.into())
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepoError> {
        let row: Option<ConversationRow> = sqlx::query_as(
            r#"SELECT id, service_request_id, created_at, last_activity_at
               FROM conversations WHERE id = $1"#,
        )
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.map(Conversation::from))
    }

    async fn list_conversations_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<ConversationSummary>, RepoError> {
        let rows: Vec<InboxRow> = sqlx::query_as(
            r#"SELECT c.id, c.service_request_id, c.created_at, c.last_activity_at,
                      r.service_type, r.address, r.status,
                      m.id AS message_id, m.sender_id, m.content, m.seq,
                      m.created_at AS message_created_at
               FROM conversations c
               JOIN service_requests r ON r.id = c.service_request_id
               LEFT JOIN messages m ON m.conversation_id = c.id AND m.seq = c.message_count
               WHERE r.requester_id = $1 OR r.provider_id = $1
               ORDER BY c.last_activity_at DESC, c.id DESC"#,
        )
        .bind(user.into_uuid())
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
               FROM messages WHERE conversation_id = $1 ORDER BY seq ASC"#,
        )
        .bind(conversation_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Message::from).collect())
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

        // The row lock taken by the counter bump orders concurrent appends.
        let row: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE conversations
               SET message_count = message_count + 1, last_activity_at = $1
               WHERE id = $2
               RETURNING message_count"#,
        )
        .bind(now)
        .bind(msg.conversation_id.into_uuid())
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
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(message.id.into_uuid())
        .bind(message.conversation_id.into_uuid())
        .bind(message.sender_id.into_uuid())
        .bind(&message.content)
        .bind(message.seq)
        .bind(message.created_at)
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
            "{} WHERE n.recipient_id = $1 ORDER BY n.seq DESC LIMIT $2",
            SELECT_NOTIFICATIONS
        );
        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .bind(user.into_uuid())
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
        let sql = format!("{} WHERE n.id = $1", SELECT_NOTIFICATIONS);
        let row: Option<NotificationRow> = sqlx::query_as(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(NotificationRow::into_domain).transpose()
    }

    async fn mark_notification_read(&self, id: NotificationId) -> Result<Notification, RepoError> {
        let result = sqlx::query(
            r#"UPDATE notifications SET read_at = COALESCE(read_at, $1) WHERE id = $2"#,
        )
        .bind(Utc::now())
        .bind(id.into_uuid())
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
               ORDER BY seq ASC
               LIMIT $1"#,
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
               SET status = 'DELIVERED', processed_at = $1, attempts = attempts + 1
               WHERE id = $2 AND status = 'PENDING'"#,
        )
        .bind(Utc::now())
        .bind(id.into_uuid())
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
                   last_error = $1,
                   status = CASE WHEN attempts + 1 >= $2 THEN 'FAILED' ELSE status END
               WHERE id = $3 AND status = 'PENDING'"#,
        )
        .bind(error)
        .bind(max_attempts)
        .bind(id.into_uuid())
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
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(review.id.into_uuid())
        .bind(review.service_request_id.into_uuid())
        .bind(review.reviewer_id.into_uuid())
        .bind(review.provider_id.into_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.created_at)
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
               FROM reviews WHERE service_request_id = $1"#,
        )
        .bind(request_id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(ReviewRow::into_domain).transpose()
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let sql = format!(
            "UPDATE api_keys SET last_used_at = $1 WHERE key_hash = $2 AND is_active = TRUE RETURNING {}",
            API_KEY_COLUMNS
        );
        let row: Option<ApiKeyRow> = sqlx::query_as(&sql)
            .bind(Utc::now())
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
               VALUES ($1, $2, $3, $4, $5, TRUE, $6)"#,
        )
        .bind(api_key.id.into_uuid())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(api_key.user_id.into_uuid())
        .bind(api_key.role.as_str())
        .bind(api_key.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok((api_key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE is_active = TRUE")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.0)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE is_active = TRUE ORDER BY created_at DESC",
            API_KEY_COLUMNS
        );
        let rows: Vec<ApiKeyRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(ApiKeyRow::into_domain).collect()
    }

    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError> {
        let result =
            sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE id = $1 AND is_active = TRUE")
                .bind(id.into_uuid())
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
