use std::collections::HashMap;
use std::sync::Arc;

use agora_types::models::{Attachment, Author, Message};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::shard::ShardedMap;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;
pub const MAX_CONTENT_CHARS: usize = 4000;
const MAX_NONCE_LEN: usize = 64;

/// A message as submitted by a client, before the log assigns id and timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub content: String,
    pub attachment: Option<Attachment>,
    pub parent_id: Option<Uuid>,
    pub nonce: Option<String>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn reply(parent_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            parent_id: Some(parent_id),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(CoreError::invalid(format!(
                "message content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }
        match &self.attachment {
            Some(a) if a.url.trim().is_empty() => {
                return Err(CoreError::invalid("attachment url is empty"));
            }
            None if self.content.trim().is_empty() => {
                return Err(CoreError::invalid("message needs content or an attachment"));
            }
            _ => {}
        }
        if self.nonce.as_ref().is_some_and(|n| n.len() > MAX_NONCE_LEN) {
            return Err(CoreError::invalid(format!(
                "nonce exceeds {MAX_NONCE_LEN} bytes"
            )));
        }
        Ok(())
    }
}

/// Which slice of a channel to read.
#[derive(Debug, Clone, Default)]
pub struct Window {
    pub limit: Option<usize>,
    pub query: Option<String>,
    /// Only messages strictly older than this one.
    pub before: Option<Uuid>,
}

impl Window {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn search(limit: usize, query: impl Into<String>) -> Self {
        Self {
            limit: Some(limit),
            query: Some(query.into()),
            before: None,
        }
    }

    /// Capped at `MAX_LIMIT`; a zero limit yields an empty page.
    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }
}

#[derive(Default)]
struct ChannelLog {
    entries: Vec<Message>,
    positions: HashMap<Uuid, usize>,
    thread_count: u64,
}

impl ChannelLog {
    fn push(&mut self, message: Message) {
        if message.is_top_level() {
            self.thread_count += 1;
        }
        self.positions.insert(message.id, self.entries.len());
        self.entries.push(message);
    }

    /// Strictly later than the last entry, at microsecond precision so the
    /// timestamp survives a round trip through storage unchanged.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        match self.entries.last() {
            Some(last) if now <= last.created_at => last.created_at + Duration::microseconds(1),
            _ => now,
        }
    }
}

/// Per-channel append-only message logs.
///
/// Every channel has its own `RwLock`; appends to one channel serialize on
/// that lock only. A sharded index maps message ids to their channel.
pub struct MessageLog {
    channels: RwLock<HashMap<Uuid, Arc<RwLock<ChannelLog>>>>,
    index: ShardedMap<Uuid>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            index: ShardedMap::new(),
        }
    }

    /// Create the (empty) log for a channel. Idempotent.
    pub fn open_channel(&self, channel_id: Uuid) {
        self.channels.write().entry(channel_id).or_default();
    }

    fn channel(&self, channel_id: Uuid) -> Result<Arc<RwLock<ChannelLog>>> {
        self.channels
            .read()
            .get(&channel_id)
            .cloned()
            .ok_or(CoreError::ChannelNotFound(channel_id))
    }

    /// Append a message and return the stored record.
    ///
    /// `on_commit` runs while the channel's writer lock is still held, so
    /// observers see commits of one channel in log order.
    pub fn append(
        &self,
        channel_id: Uuid,
        author: &Author,
        new: NewMessage,
        on_commit: impl FnOnce(&Message),
    ) -> Result<Message> {
        new.validate()?;
        let log = self.channel(channel_id)?;
        let mut log = log.write();

        if let Some(parent_id) = new.parent_id {
            if !log.positions.contains_key(&parent_id) {
                return Err(CoreError::InvalidParent(parent_id));
            }
        }

        let message = Message {
            id: Uuid::now_v7(),
            channel_id,
            user_id: author.user_id,
            author_name: author.name.clone(),
            content: new.content,
            attachment: new.attachment,
            created_at: log.next_timestamp(),
            parent_id: new.parent_id,
            is_admin_authored: author.is_privileged,
            nonce: new.nonce,
        };

        log.push(message.clone());
        self.index.insert(message.id, channel_id);
        on_commit(&message);
        Ok(message)
    }

    /// Re-insert a persisted message. Messages must be replayed in log order.
    pub fn replay(&self, message: Message) -> Result<()> {
        let log = self.channel(message.channel_id)?;
        let mut log = log.write();

        if let Some(last) = log.entries.last() {
            if message.sort_key() <= last.sort_key() {
                return Err(CoreError::invalid(format!(
                    "message {} replayed out of order",
                    message.id
                )));
            }
        }
        if let Some(parent_id) = message.parent_id {
            if !log.positions.contains_key(&parent_id) {
                return Err(CoreError::InvalidParent(parent_id));
            }
        }

        self.index.insert(message.id, message.channel_id);
        log.push(message);
        Ok(())
    }

    /// Up to `limit` most recent matching messages, oldest first.
    pub fn list(&self, channel_id: Uuid, window: &Window) -> Result<Vec<Message>> {
        let log = self.channel(channel_id)?;
        let log = log.read();

        let end = match window.before {
            Some(before) => *log
                .positions
                .get(&before)
                .ok_or(CoreError::MessageNotFound(before))?,
            None => log.entries.len(),
        };

        let needle = window
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let mut page: Vec<Message> = log.entries[..end]
            .iter()
            .rev()
            .filter(|m| {
                needle
                    .as_deref()
                    .is_none_or(|n| m.content.to_lowercase().contains(n))
            })
            .take(window.effective_limit())
            .cloned()
            .collect();
        page.reverse();
        Ok(page)
    }

    pub fn get(&self, message_id: Uuid) -> Result<Message> {
        let channel_id = self
            .index
            .get(&message_id)
            .ok_or(CoreError::MessageNotFound(message_id))?;
        let log = self.channel(channel_id)?;
        let log = log.read();
        log.positions
            .get(&message_id)
            .map(|&pos| log.entries[pos].clone())
            .ok_or(CoreError::MessageNotFound(message_id))
    }

    /// `(thread_count, message_count)` for a channel.
    pub fn counts(&self, channel_id: Uuid) -> Result<(u64, u64)> {
        let log = self.channel(channel_id)?;
        let log = log.read();
        Ok((log.thread_count, log.entries.len() as u64))
    }

    pub fn total_messages(&self) -> usize {
        self.index.len()
    }
}
