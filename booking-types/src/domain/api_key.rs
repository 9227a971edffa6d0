//! API key domain type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::actor::{Actor, Role};
use super::ids::{ApiKeyId, UserId};

/// A bearer key bound to one marketplace user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub name: String,
    pub key_hash: String,
    pub user_id: UserId,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Creates an active key with the given name and hash.
    pub fn new(name: String, key_hash: String, user_id: UserId, role: Role) -> Self {
        Self {
            id: ApiKeyId::new(),
            name,
            key_hash,
            user_id,
            role,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    /// Identity this key authenticates as.
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role)
    }
}
