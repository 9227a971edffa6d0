//! Strongly typed identifiers.
//!
//! Every entity gets its own UUID newtype so a `ConversationId` can never be
//! passed where a `ServiceRequestId` is expected.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

macro_rules! entity_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Creates a new random identifier.
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                /// Wraps an existing UUID.
                pub fn from_uuid(uuid: Uuid) -> Self {
                    Self(uuid)
                }

                /// Returns the underlying UUID.
                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }

                /// Returns the UUID value.
                pub fn into_uuid(self) -> Uuid {
                    self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl std::str::FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Ok(Self(Uuid::parse_str(s)?))
                }
            }
        )*
    };
}

entity_id! {
    /// Identifies a marketplace user (requester, provider or admin).
    UserId,
    /// Identifies a service request (booking).
    ServiceRequestId,
    /// Identifies the conversation thread of a booking.
    ConversationId,
    /// Identifies a chat message.
    MessageId,
    /// Identifies a notification.
    NotificationId,
    /// Identifies a review.
    ReviewId,
    /// Identifies an API key.
    ApiKeyId,
    /// Identifies an outbox event.
    EventId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_and_display() {
        let id = ServiceRequestId::new();
        let parsed: ServiceRequestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&ConversationId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }
}
