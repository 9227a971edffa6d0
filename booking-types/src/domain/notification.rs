//! Per-user notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::ids::{ConversationId, NotificationId, ServiceRequestId, UserId};
use crate::error::DomainError;

/// What a notification points at. Lookup only; never ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RelatedRef {
    Conversation(ConversationId),
    ServiceRequest(ServiceRequestId),
}

impl RelatedRef {
    pub fn kind(&self) -> &'static str {
        match self {
            RelatedRef::Conversation(_) => "conversation",
            RelatedRef::ServiceRequest(_) => "service_request",
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            RelatedRef::Conversation(id) => id.into_uuid(),
            RelatedRef::ServiceRequest(id) => id.into_uuid(),
        }
    }

    /// Rebuilds a reference from its stored kind and id.
    pub fn from_parts(kind: &str, id: Uuid) -> Result<Self, DomainError> {
        match kind {
            "conversation" => Ok(RelatedRef::Conversation(ConversationId::from_uuid(id))),
            "service_request" => Ok(RelatedRef::ServiceRequest(ServiceRequestId::from_uuid(id))),
            other => Err(DomainError::Validation(format!(
                "Unknown related kind: {}",
                other
            ))),
        }
    }

    /// Client route for the referenced entity.
    pub fn deep_link(&self) -> String {
        match self {
            RelatedRef::Conversation(id) => format!("/conversations/{}", id),
            RelatedRef::ServiceRequest(id) => format!("/service_requests/{}", id),
        }
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    #[schema(example = "New Message")]
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub related: Option<RelatedRef>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// Drops the deep link when the referenced entity is gone.
    pub fn detach_related(mut self) -> Self {
        self.related = None;
        self.link = None;
        self
    }
}

/// A notification about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: UserId,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub related: Option<RelatedRef>,
}

impl NewNotification {
    /// Notification pointing at `related`, deep-linked to it.
    pub fn about(
        recipient_id: UserId,
        title: impl Into<String>,
        body: impl Into<String>,
        related: RelatedRef,
    ) -> Self {
        Self {
            recipient_id,
            title: title.into(),
            body: body.into(),
            link: Some(related.deep_link()),
            related: Some(related),
        }
    }

    /// Unread notification built from this input.
    pub fn into_notification(self) -> Notification {
        Notification {
            id: NotificationId::new(),
            recipient_id: self.recipient_id,
            title: self.title,
            body: self.body,
            link: self.link,
            related: self.related,
            read_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_related_ref_roundtrips_through_parts() {
        let related = RelatedRef::Conversation(ConversationId::new());
        let back = RelatedRef::from_parts(related.kind(), related.uuid()).unwrap();
        assert_eq!(back, related);
        assert!(RelatedRef::from_parts("invoice", Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_detached_notification_has_no_link() {
        let n = NewNotification::about(
            UserId::new(),
            "New Message",
            "hello",
            RelatedRef::ServiceRequest(ServiceRequestId::new()),
        )
        .into_notification()
        .detach_related();

        assert!(n.link.is_none());
        assert!(n.related.is_none());
        assert!(!n.is_read());
    }
}
