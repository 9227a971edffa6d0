//! Parsing helpers shared by the SQLite and PostgreSQL adapters.

use booking_types::{
    BookingEvent, Currency, DomainError, Money, OutboxStatus, PaymentStatus, RepoError,
    RequestStatus, Role, ServiceRequest, Transition,
};

pub fn parse_currency(s: &str) -> Result<Currency, RepoError> {
    s.parse()
        .map_err(|_| RepoError::Database(format!("Unknown currency: {}", s)))
}

pub fn parse_status(s: &str) -> Result<RequestStatus, RepoError> {
    s.parse()
        .map_err(|_| RepoError::Database(format!("Unknown request status: {}", s)))
}

pub fn parse_payment_status(s: &str) -> Result<PaymentStatus, RepoError> {
    s.parse()
        .map_err(|_| RepoError::Database(format!("Unknown payment status: {}", s)))
}

pub fn parse_role(s: &str) -> Result<Role, RepoError> {
    s.parse()
        .map_err(|_| RepoError::Database(format!("Unknown role: {}", s)))
}

pub fn parse_outbox_status(s: &str) -> Result<OutboxStatus, RepoError> {
    s.parse().map_err(RepoError::Database)
}

/// Rebuilds an optional price from its two nullable columns.
pub fn parse_price(
    amount: Option<i64>,
    currency: Option<&str>,
) -> Result<Option<Money>, RepoError> {
    match (amount, currency) {
        (Some(amount), Some(currency)) => {
            Ok(Some(Money::new(amount, parse_currency(currency)?)?))
        }
        (None, _) => Ok(None),
        (Some(_), None) => Err(RepoError::Database("Price without currency".into())),
    }
}

pub fn event_to_json(event: &BookingEvent) -> Result<serde_json::Value, RepoError> {
    serde_json::to_value(event).map_err(|e| RepoError::Database(e.to_string()))
}

pub fn event_from_json(value: serde_json::Value) -> Result<BookingEvent, RepoError> {
    serde_json::from_value(value).map_err(|e| RepoError::Database(e.to_string()))
}

/// Why a compare-and-set transition matched no row.
///
/// Replays the transition against the current row so the caller gets the
/// same error the state machine would have produced.
pub fn transition_failure(current: Option<ServiceRequest>, transition: &Transition) -> RepoError {
    match current {
        None => RepoError::NotFound,
        Some(mut req) => match req.apply(transition) {
            Err(e) => RepoError::Domain(e),
            Ok(_) => RepoError::Conflict("Service request changed concurrently".into()),
        },
    }
}

/// Why a mark-paid compare-and-set matched no row.
pub fn payment_failure(current: Option<ServiceRequest>) -> RepoError {
    match current {
        None => RepoError::NotFound,
        Some(mut req) => match req.mark_paid() {
            Err(e) => RepoError::Domain(e),
            Ok(()) => RepoError::Conflict("Service request changed concurrently".into()),
        },
    }
}

/// Why a record-intent compare-and-set matched no row.
///
/// `Conflict` means another caller recorded a different intent first.
pub fn intent_failure(current: Option<ServiceRequest>) -> RepoError {
    match current {
        None => RepoError::NotFound,
        Some(req) if req.is_paid() => RepoError::Domain(DomainError::AlreadyPaid),
        Some(req) if req.status != RequestStatus::Completed => {
            RepoError::Domain(DomainError::InvalidTransition {
                from: req.status,
                action: "pay",
            })
        }
        Some(_) => RepoError::Conflict("Payment intent changed concurrently".into()),
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite text encodings
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
pub mod text {
    use booking_types::RepoError;
    use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
    use uuid::Uuid;

    /// Fixed-width RFC 3339 so that text ordering equals time ordering.
    pub fn ts(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, RepoError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepoError::Database(e.to_string()))
    }

    pub fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, RepoError> {
        s.as_deref().map(parse_ts).transpose()
    }

    pub fn parse_uuid(s: &str) -> Result<Uuid, RepoError> {
        Uuid::parse_str(s).map_err(|e| RepoError::Database(e.to_string()))
    }

    pub fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, RepoError> {
        s.as_deref().map(parse_uuid).transpose()
    }

    pub fn parse_date(s: &str) -> Result<NaiveDate, RepoError> {
        s.parse()
            .map_err(|e: chrono::ParseError| RepoError::Database(e.to_string()))
    }
}
