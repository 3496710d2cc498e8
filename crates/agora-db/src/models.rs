//! Database row types. These map directly to SQLite rows and are kept
//! distinct from agora-types models so the storage layer stays independent.

use agora_types::models::{Attachment, Channel, Message};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub is_admin_only: bool,
    pub position: i32,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub author_name: String,
    pub content: String,
    pub attachment_url: Option<String>,
    pub attachment_type: Option<String>,
    pub parent_id: Option<String>,
    pub is_admin_authored: bool,
    pub nonce: Option<String>,
    pub created_at: String,
}

pub struct ReactionRow {
    pub message_id: String,
    pub emoji: String,
    pub user_id: String,
}

/// Microsecond RFC 3339, which sorts lexicographically in time order.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{raw}'"))?
        .with_timezone(&Utc))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{raw}'"))
}

impl From<&Channel> for ChannelRow {
    fn from(c: &Channel) -> Self {
        Self {
            id: c.id.to_string(),
            name: c.name.clone(),
            title: c.title.clone(),
            description: c.description.clone(),
            is_admin_only: c.is_admin_only,
            position: c.position,
            created_at: format_ts(&c.created_at),
        }
    }
}

impl ChannelRow {
    pub fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            id: parse_id(&self.id)?,
            name: self.name,
            title: self.title,
            description: self.description,
            is_admin_only: self.is_admin_only,
            position: self.position,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl From<&Message> for MessageRow {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.to_string(),
            channel_id: m.channel_id.to_string(),
            user_id: m.user_id.to_string(),
            author_name: m.author_name.clone(),
            content: m.content.clone(),
            attachment_url: m.attachment.as_ref().map(|a| a.url.clone()),
            attachment_type: m.attachment.as_ref().map(|a| a.kind.clone()),
            parent_id: m.parent_id.map(|p| p.to_string()),
            is_admin_authored: m.is_admin_authored,
            nonce: m.nonce.clone(),
            created_at: format_ts(&m.created_at),
        }
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let attachment = match (self.attachment_url, self.attachment_type) {
            (Some(url), Some(kind)) => Some(Attachment { url, kind }),
            (Some(url), None) => Some(Attachment {
                url,
                kind: "file".into(),
            }),
            _ => None,
        };
        Ok(Message {
            id: parse_id(&self.id)?,
            channel_id: parse_id(&self.channel_id)?,
            user_id: parse_id(&self.user_id)?,
            author_name: self.author_name,
            content: self.content,
            attachment,
            created_at: parse_ts(&self.created_at)?,
            parent_id: self.parent_id.as_deref().map(parse_id).transpose()?,
            is_admin_authored: self.is_admin_authored,
            nonce: self.nonce,
        })
    }
}

impl ReactionRow {
    pub fn into_entry(self) -> Result<(Uuid, String, Uuid)> {
        Ok((
            parse_id(&self.message_id)?,
            self.emoji,
            parse_id(&self.user_id)?,
        ))
    }
}
