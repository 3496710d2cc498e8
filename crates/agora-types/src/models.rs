use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named topic container. Channels are provisioned by an admin and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    /// Unique slug, e.g. `announcements`.
    pub name: String,
    pub title: String,
    pub description: String,
    pub is_admin_only: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// A file reference produced by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A stored message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub author_name: String,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<Uuid>,
    /// Privilege of the author when the message was posted. Never recomputed.
    pub is_admin_authored: bool,
    /// Client-generated temporary id, echoed back so optimistic entries can be matched.
    pub nonce: Option<String>,
}

impl Message {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Total order of messages within a channel.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}

/// The identity a write is performed as, as vouched for by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub user_id: Uuid,
    pub name: String,
    pub is_privileged: bool,
}

impl Author {
    pub fn new(user_id: Uuid, name: impl Into<String>, is_privileged: bool) -> Self {
        Self {
            user_id,
            name: name.into(),
            is_privileged,
        }
    }
}

/// emoji -> users who reacted with it. Empty sets are never stored.
pub type ReactionMap = BTreeMap<String, BTreeSet<Uuid>>;
