use agora_core::Snapshot;
use agora_types::events::StoreEvent;
use agora_types::models::{Channel, Message};
use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use crate::Database;
use crate::models::{ChannelRow, MessageRow, ReactionRow};

impl Database {
    // -- Writes --

    /// Apply a batch of store events in a single transaction. Nothing is
    /// written if any event fails.
    pub fn apply_events(&self, events: &[StoreEvent]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for event in events {
                apply_event(&tx, event)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Apply events one at a time, each committed on its own. Returns the
    /// index and error of every event that could not be written.
    pub fn apply_each(&self, events: &[StoreEvent]) -> Result<Vec<(usize, anyhow::Error)>> {
        self.with_conn(|conn| {
            Ok(events
                .iter()
                .enumerate()
                .filter_map(|(i, event)| apply_event(conn, event).err().map(|e| (i, e)))
                .collect())
        })
    }

    // -- Reads --

    pub fn load_channels(&self) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, title, description, is_admin_only, position, created_at
                 FROM channels
                 ORDER BY position, name",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ChannelRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        title: row.get(2)?,
                        description: row.get(3)?,
                        is_admin_only: row.get(4)?,
                        position: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ChannelRow::into_channel).collect()
        })
    }

    /// All messages, in log order within each channel.
    pub fn load_messages(&self) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, user_id, author_name, content, attachment_url,
                        attachment_type, parent_id, is_admin_authored, nonce, created_at
                 FROM messages
                 ORDER BY channel_id, created_at, id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        channel_id: row.get(1)?,
                        user_id: row.get(2)?,
                        author_name: row.get(3)?,
                        content: row.get(4)?,
                        attachment_url: row.get(5)?,
                        attachment_type: row.get(6)?,
                        parent_id: row.get(7)?,
                        is_admin_authored: row.get(8)?,
                        nonce: row.get(9)?,
                        created_at: row.get(10)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // Skip corrupt rows rather than refusing to start
            Ok(rows
                .into_iter()
                .filter_map(|row| {
                    let id = row.id.clone();
                    row.into_message()
                        .map_err(|e| warn!("Corrupt message row '{}': {}", id, e))
                        .ok()
                })
                .collect())
        })
    }

    pub fn load_reactions(&self) -> Result<Vec<(Uuid, String, Uuid)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, emoji, user_id FROM reactions ORDER BY message_id, emoji, created_at",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        emoji: row.get(1)?,
                        user_id: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ReactionRow::into_entry).collect()
        })
    }

    /// Everything needed to rebuild the in-memory hub.
    pub fn load_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            channels: self.load_channels()?,
            messages: self.load_messages()?,
            reactions: self.load_reactions()?,
        })
    }
}

fn apply_event(conn: &Connection, event: &StoreEvent) -> Result<()> {
    match event {
        StoreEvent::ChannelCreated(channel) => insert_channel(conn, &ChannelRow::from(channel)),
        StoreEvent::MessageAppended(message) => insert_message(conn, &MessageRow::from(message)),
        StoreEvent::ReactionChanged {
            message_id,
            emoji,
            user_id,
            present,
        } => {
            if *present {
                conn.execute(
                    "INSERT OR IGNORE INTO reactions (message_id, emoji, user_id) VALUES (?1, ?2, ?3)",
                    rusqlite::params![message_id.to_string(), emoji, user_id.to_string()],
                )?;
            } else {
                conn.execute(
                    "DELETE FROM reactions WHERE message_id = ?1 AND emoji = ?2 AND user_id = ?3",
                    rusqlite::params![message_id.to_string(), emoji, user_id.to_string()],
                )?;
            }
            Ok(())
        }
    }
}

fn insert_channel(conn: &Connection, row: &ChannelRow) -> Result<()> {
    conn.execute(
        "INSERT INTO channels (id, name, title, description, is_admin_only, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            row.id,
            row.name,
            row.title,
            row.description,
            row.is_admin_only,
            row.position,
            row.created_at,
        ],
    )?;
    Ok(())
}

fn insert_message(conn: &Connection, row: &MessageRow) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, channel_id, user_id, author_name, content, attachment_url,
                               attachment_type, parent_id, is_admin_authored, nonce, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            row.id,
            row.channel_id,
            row.user_id,
            row.author_name,
            row.content,
            row.attachment_url,
            row.attachment_type,
            row.parent_id,
            row.is_admin_authored,
            row.nonce,
            row.created_at,
        ],
    )?;
    Ok(())
}
