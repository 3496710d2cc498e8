use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Attachment, Author, Channel, Message, ReactionMap};

// -- JWT Claims --

/// Claims issued by the identity provider. Shared by the REST middleware and
/// the development token helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: usize,
}

impl Claims {
    /// The identity these claims vouch for.
    pub fn author(&self) -> Author {
        Author::new(self.sub, self.username.clone(), self.is_admin)
    }
}

// -- Channels --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_admin_only: bool,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub id: Uuid,
    pub name: String,
    pub title: String,
    pub description: String,
    pub is_admin_only: bool,
    pub position: i32,
    pub thread_count: u64,
    pub message_count: u64,
}

impl ChannelResponse {
    pub fn new(channel: &Channel, thread_count: u64, message_count: u64) -> Self {
        Self {
            id: channel.id,
            name: channel.name.clone(),
            title: channel.title.clone(),
            description: channel.description.clone(),
            is_admin_only: channel.is_admin_only,
            position: channel.position,
            thread_count,
            message_count,
        }
    }
}

// -- Messages --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub attachment_type: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl SendMessageRequest {
    /// Attachment fields travel flat on the wire; a url without a type is a plain file.
    pub fn attachment(&self) -> Option<Attachment> {
        match (&self.attachment_url, &self.attachment_type) {
            (Some(url), Some(kind)) => Some(Attachment {
                url: url.clone(),
                kind: kind.clone(),
            }),
            (Some(url), None) => Some(Attachment {
                url: url.clone(),
                kind: "file".into(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub author_name: String,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub parent_id: Option<Uuid>,
    pub is_admin_authored: bool,
    #[serde(default)]
    pub nonce: Option<String>,
    /// emoji -> user ids, in a stable order.
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<Uuid>>,
}

impl MessageResponse {
    pub fn new(message: Message, reactions: ReactionMap) -> Self {
        Self {
            id: message.id,
            channel_id: message.channel_id,
            user_id: message.user_id,
            author_name: message.author_name,
            content: message.content,
            attachment: message.attachment,
            created_at: message.created_at,
            parent_id: message.parent_id,
            is_admin_authored: message.is_admin_authored,
            nonce: message.nonce,
            reactions: reactions
                .into_iter()
                .map(|(emoji, users)| (emoji, users.into_iter().collect()))
                .collect(),
        }
    }

    pub fn reaction_count(&self, emoji: &str) -> usize {
        self.reactions.get(emoji).map_or(0, Vec::len)
    }
}

// -- Reactions --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionQuery {
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionResponse {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

// -- Uploads --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

// -- Errors --

/// Machine-readable error code carried in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    InvalidParent,
    InvalidInput,
    AdminOnlyChannel,
    AdminRequired,
    Conflict,
    Unauthorized,
    Storage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}
