use std::collections::BTreeSet;
use std::sync::Arc;

use agora_types::events::StoreEvent;
use agora_types::models::{Author, Channel, Message, ReactionMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directory::{ChannelDirectory, NewChannel};
use crate::error::{CoreError, Result};
use crate::log::{MessageLog, NewMessage, Window};
use crate::permissions::{can_manage_channels, can_post};
use crate::reactions::{ReactionLedger, validate_emoji};

/// Receives every committed state change, in commit order per channel and
/// per reaction pair. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn record(&self, event: StoreEvent);
}

/// A channel together with its derived counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub channel: Channel,
    pub thread_count: u64,
    pub message_count: u64,
}

/// Persisted state to rebuild a hub from.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub channels: Vec<Channel>,
    /// Ordered by `(created_at, id)` within each channel.
    pub messages: Vec<Message>,
    /// `(message_id, emoji, user_id)` memberships.
    pub reactions: Vec<(Uuid, String, Uuid)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub channels: usize,
    pub messages: usize,
    pub reactions: usize,
    pub skipped: usize,
}

/// The server-side messaging store: channel directory, message logs and
/// reaction ledger behind one facade that enforces permissions.
pub struct Hub {
    directory: ChannelDirectory,
    log: MessageLog,
    reactions: ReactionLedger,
    sink: Option<Arc<dyn EventSink>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            directory: ChannelDirectory::new(),
            log: MessageLog::new(),
            reactions: ReactionLedger::new(),
            sink: None,
        }
    }

    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new()
        }
    }

    fn emit(&self, event: StoreEvent) {
        if let Some(sink) = &self.sink {
            sink.record(event);
        }
    }

    // -- Channels --

    fn summarize(&self, channel: Channel) -> Result<ChannelSummary> {
        let (thread_count, message_count) = self.log.counts(channel.id)?;
        Ok(ChannelSummary {
            channel,
            thread_count,
            message_count,
        })
    }

    pub fn list_channels(&self, query: Option<&str>) -> Vec<ChannelSummary> {
        self.directory
            .list_channels(query)
            .into_iter()
            .filter_map(|c| self.summarize(c).ok())
            .collect()
    }

    pub fn channel(&self, channel_id: Uuid) -> Result<ChannelSummary> {
        self.summarize(self.directory.get_channel(channel_id)?)
    }

    pub fn channel_by_name(&self, name: &str) -> Result<ChannelSummary> {
        self.summarize(self.directory.get_channel_by_name(name)?)
    }

    pub fn has_channels(&self) -> bool {
        !self.directory.is_empty()
    }

    pub fn create_channel(&self, actor: &Author, new: NewChannel) -> Result<ChannelSummary> {
        if !can_manage_channels(actor) {
            return Err(CoreError::AdminRequired);
        }
        let channel = self.directory.create(new)?;
        self.log.open_channel(channel.id);
        info!("Channel #{} created by {}", channel.name, actor.name);
        self.emit(StoreEvent::ChannelCreated(channel.clone()));
        Ok(ChannelSummary {
            channel,
            thread_count: 0,
            message_count: 0,
        })
    }

    // -- Messages --

    /// Permission check, then append. The check runs on every call; clients
    /// are never trusted to have enforced it.
    pub fn post_message(
        &self,
        channel_id: Uuid,
        author: &Author,
        new: NewMessage,
    ) -> Result<Message> {
        let channel = self.directory.get_channel(channel_id)?;
        if let Err(e) = can_post(&channel, author, new.parent_id).into_result() {
            debug!(
                "Denied top-level post by {} in #{}",
                author.user_id, channel.name
            );
            return Err(e);
        }

        self.log.append(channel_id, author, new, |message| {
            self.emit(StoreEvent::MessageAppended(message.clone()));
        })
    }

    pub fn messages(
        &self,
        channel_id: Uuid,
        window: &Window,
    ) -> Result<Vec<(Message, ReactionMap)>> {
        self.directory.get_channel(channel_id)?;
        let page = self.log.list(channel_id, window)?;
        Ok(page
            .into_iter()
            .map(|m| {
                let reactions = self.reactions.get(m.id);
                (m, reactions)
            })
            .collect())
    }

    /// Fetch one message, which must belong to `channel_id`.
    pub fn message(&self, channel_id: Uuid, message_id: Uuid) -> Result<(Message, ReactionMap)> {
        let message = self.message_in_channel(channel_id, message_id)?;
        let reactions = self.reactions.get(message_id);
        Ok((message, reactions))
    }

    fn message_in_channel(&self, channel_id: Uuid, message_id: Uuid) -> Result<Message> {
        self.directory.get_channel(channel_id)?;
        let message = self.log.get(message_id)?;
        if message.channel_id != channel_id {
            return Err(CoreError::MessageNotFound(message_id));
        }
        Ok(message)
    }

    // -- Reactions --

    pub fn toggle_reaction(
        &self,
        channel_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<BTreeSet<Uuid>> {
        validate_emoji(emoji)?;
        self.message_in_channel(channel_id, message_id)?;

        Ok(self.reactions.toggle(message_id, user_id, emoji, |present| {
            self.emit(StoreEvent::ReactionChanged {
                message_id,
                emoji: emoji.to_string(),
                user_id,
                present,
            });
        }))
    }

    pub fn reactions(&self, message_id: Uuid) -> Result<ReactionMap> {
        self.log.get(message_id)?;
        Ok(self.reactions.get(message_id))
    }

    pub fn total_messages(&self) -> usize {
        self.log.total_messages()
    }

    // -- Restore --

    /// Rebuild state from persisted records without emitting events.
    /// Records that violate an invariant are skipped and logged.
    pub fn restore(&self, snapshot: Snapshot) -> RestoreStats {
        let mut stats = RestoreStats::default();

        for channel in snapshot.channels {
            let id = channel.id;
            match self.directory.insert(channel) {
                Ok(()) => {
                    self.log.open_channel(id);
                    stats.channels += 1;
                }
                Err(e) => {
                    warn!("Skipping channel {}: {}", id, e);
                    stats.skipped += 1;
                }
            }
        }

        for message in snapshot.messages {
            let id = message.id;
            match self.log.replay(message) {
                Ok(()) => stats.messages += 1,
                Err(e) => {
                    warn!("Skipping message {}: {}", id, e);
                    stats.skipped += 1;
                }
            }
        }

        for (message_id, emoji, user_id) in snapshot.reactions {
            if self.log.get(message_id).is_err() {
                warn!("Skipping reaction on unknown message {}", message_id);
                stats.skipped += 1;
                continue;
            }
            self.reactions.set(message_id, user_id, &emoji, true);
            stats.reactions += 1;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StoreEvent>>);

    impl EventSink for Recorder {
        fn record(&self, event: StoreEvent) {
            self.0.lock().push(event);
        }
    }

    fn admin() -> Author {
        Author::new(Uuid::new_v4(), "admin", true)
    }

    #[test]
    fn emits_events_for_every_commit() {
        let recorder = Arc::new(Recorder::default());
        let hub = Hub::with_sink(recorder.clone());
        let admin = admin();

        let general = hub
            .create_channel(
                &admin,
                NewChannel {
                    name: "general".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let msg = hub
            .post_message(general.channel.id, &admin, NewMessage::text("hi"))
            .unwrap();
        hub.toggle_reaction(general.channel.id, msg.id, admin.user_id, "👍")
            .unwrap();

        let events = recorder.0.lock();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], StoreEvent::ChannelCreated(_)));
        assert_eq!(events[1], StoreEvent::MessageAppended(msg.clone()));
        assert_eq!(
            events[2],
            StoreEvent::ReactionChanged {
                message_id: msg.id,
                emoji: "👍".into(),
                user_id: admin.user_id,
                present: true,
            }
        );
    }

    #[test]
    fn denied_writes_emit_nothing() {
        let recorder = Arc::new(Recorder::default());
        let hub = Hub::with_sink(recorder.clone());
        let news = hub
            .create_channel(
                &admin(),
                NewChannel {
                    name: "news".into(),
                    is_admin_only: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let member = Author::new(Uuid::new_v4(), "member", false);
        let err = hub
            .post_message(news.channel.id, &member, NewMessage::text("hey"))
            .unwrap_err();
        assert_eq!(err, CoreError::AdminOnlyChannel);
        assert_eq!(recorder.0.lock().len(), 1);
    }

    #[test]
    fn members_cannot_create_channels() {
        let hub = Hub::new();
        let member = Author::new(Uuid::new_v4(), "member", false);
        let err = hub
            .create_channel(
                &member,
                NewChannel {
                    name: "mine".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err, CoreError::AdminRequired);
        assert!(!hub.has_channels());
    }

    #[test]
    fn reactions_on_other_channel_are_not_found() {
        let hub = Hub::new();
        let admin = admin();
        let a = hub
            .create_channel(&admin, NewChannel { name: "a".into(), ..Default::default() })
            .unwrap();
        let b = hub
            .create_channel(&admin, NewChannel { name: "b".into(), ..Default::default() })
            .unwrap();
        let msg = hub
            .post_message(a.channel.id, &admin, NewMessage::text("in a"))
            .unwrap();

        let err = hub
            .toggle_reaction(b.channel.id, msg.id, admin.user_id, "👍")
            .unwrap_err();
        assert_eq!(err, CoreError::MessageNotFound(msg.id));
    }

    #[test]
    fn restore_rebuilds_state_and_counters() {
        let source = Hub::new();
        let admin = admin();
        let general = source
            .create_channel(&admin, NewChannel { name: "general".into(), ..Default::default() })
            .unwrap();
        let root = source
            .post_message(general.channel.id, &admin, NewMessage::text("root"))
            .unwrap();
        let reply = source
            .post_message(general.channel.id, &admin, NewMessage::reply(root.id, "reply"))
            .unwrap();

        let orphan = Message {
            id: Uuid::now_v7(),
            created_at: reply.created_at + chrono::Duration::seconds(1),
            parent_id: Some(Uuid::new_v4()),
            ..reply.clone()
        };

        let restored = Hub::new();
        let stats = restored.restore(Snapshot {
            channels: vec![general.channel.clone()],
            messages: vec![root.clone(), reply.clone(), orphan],
            reactions: vec![(root.id, "🔥".into(), admin.user_id)],
        });

        assert_eq!(
            stats,
            RestoreStats {
                channels: 1,
                messages: 2,
                reactions: 1,
                skipped: 1,
            }
        );
        let summary = restored.channel(general.channel.id).unwrap();
        assert_eq!((summary.thread_count, summary.message_count), (1, 2));
        assert_eq!(restored.reactions(root.id).unwrap()["🔥"].len(), 1);
    }
}
