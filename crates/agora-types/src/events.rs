use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Channel, Message};

/// State changes committed by the store, in commit order per channel and per
/// reaction pair. Consumed by the persistence journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    /// An admin provisioned a channel
    ChannelCreated(Channel),

    /// A message was appended to a channel log
    MessageAppended(Message),

    /// A user joined (`present`) or left a reaction set
    ReactionChanged {
        message_id: Uuid,
        emoji: String,
        user_id: Uuid,
        present: bool,
    },
}

impl StoreEvent {
    /// Returns the channel_id if this event is scoped to a specific channel.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::ChannelCreated(channel) => Some(channel.id),
            Self::MessageAppended(message) => Some(message.channel_id),
            Self::ReactionChanged { .. } => None,
        }
    }
}
