use std::collections::HashMap;

use agora_types::models::Channel;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{CoreError, Result};

const MAX_NAME_LEN: usize = 64;

/// Parameters for provisioning a channel.
#[derive(Debug, Clone, Default)]
pub struct NewChannel {
    pub name: String,
    pub title: Option<String>,
    pub description: String,
    pub is_admin_only: bool,
    pub position: i32,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<Uuid, Channel>,
    by_name: HashMap<String, Uuid>,
}

/// The set of channels. Writes happen only when an admin provisions a channel.
#[derive(Default)]
pub struct ChannelDirectory {
    inner: RwLock<Inner>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels whose name, title or description contain `query`
    /// (case-insensitive), ordered by `(position, name)`. A blank query
    /// matches everything.
    pub fn list_channels(&self, query: Option<&str>) -> Vec<Channel> {
        let needle = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let inner = self.inner.read();
        let mut channels: Vec<Channel> = inner
            .by_id
            .values()
            .filter(|c| needle.as_deref().is_none_or(|n| matches(c, n)))
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));
        channels
    }

    pub fn get_channel(&self, id: Uuid) -> Result<Channel> {
        self.inner
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(CoreError::ChannelNotFound(id))
    }

    pub fn get_channel_by_name(&self, name: &str) -> Result<Channel> {
        let key = name.trim().trim_start_matches('#').to_lowercase();
        let inner = self.inner.read();
        inner
            .by_name
            .get(&key)
            .and_then(|id| inner.by_id.get(id))
            .cloned()
            .ok_or(CoreError::ChannelNameNotFound(key))
    }

    /// Validate and insert a new channel. Name uniqueness is checked under the
    /// same write lock as the insert.
    pub fn create(&self, new: NewChannel) -> Result<Channel> {
        let name = new.name.trim().trim_start_matches('#').to_lowercase();
        validate_name(&name)?;

        let channel = Channel {
            id: Uuid::new_v4(),
            title: new
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| name.clone()),
            name,
            description: new.description.trim().to_string(),
            is_admin_only: new.is_admin_only,
            position: new.position,
            created_at: Utc::now(),
        };

        self.insert(channel.clone())?;
        Ok(channel)
    }

    /// Insert an already-built channel (used when replaying persisted state).
    pub fn insert(&self, channel: Channel) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(&channel.name) {
            return Err(CoreError::Conflict(channel.name));
        }
        inner.by_name.insert(channel.name.clone(), channel.id);
        inner.by_id.insert(channel.id, channel);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }
}

fn matches(channel: &Channel, needle: &str) -> bool {
    channel.name.to_lowercase().contains(needle)
        || channel.title.to_lowercase().contains(needle)
        || channel.description.to_lowercase().contains(needle)
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(CoreError::invalid(format!(
            "channel name must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(CoreError::invalid(
            "channel name may only contain a-z, 0-9 and '-'",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(CoreError::invalid("channel name cannot start or end with '-'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> ChannelDirectory {
        let dir = ChannelDirectory::new();
        for (name, description, position) in [
            ("announcements", "Official updates from the team.", 0),
            ("skincare", "Best products and routines for clear skin.", 4),
            ("jawline", "Mewing and jaw training.", 2),
        ] {
            dir.create(NewChannel {
                name: name.into(),
                description: description.into(),
                position,
                ..Default::default()
            })
            .unwrap();
        }
        dir
    }

    #[test]
    fn lists_in_position_order_without_query() {
        let names: Vec<String> = seeded()
            .list_channels(None)
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["announcements", "jawline", "skincare"]);
    }

    #[test]
    fn search_is_case_insensitive_over_name_and_description() {
        let dir = seeded();
        let hits = dir.list_channels(Some("SKIN"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "skincare");

        let hits = dir.list_channels(Some("official"));
        assert_eq!(hits[0].name, "announcements");

        assert!(dir.list_channels(Some("nothing-like-this")).is_empty());
        assert_eq!(dir.list_channels(Some("   ")).len(), 3);
    }

    #[test]
    fn duplicate_names_conflict() {
        let dir = seeded();
        let err = dir
            .create(NewChannel {
                name: "#Jawline".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, CoreError::Conflict("jawline".into()));
    }

    #[test]
    fn rejects_bad_slugs() {
        let dir = ChannelDirectory::new();
        for bad in ["", "has space", "-edge", "emoji🔥"] {
            let err = dir
                .create(NewChannel {
                    name: bad.into(),
                    ..Default::default()
                })
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(_)), "{bad:?}");
        }
    }

    #[test]
    fn lookup_by_id_and_name() {
        let dir = seeded();
        let jaw = dir.get_channel_by_name("#jawline").unwrap();
        assert_eq!(dir.get_channel(jaw.id).unwrap().name, "jawline");
        assert_eq!(jaw.title, "jawline");

        let missing = Uuid::new_v4();
        assert_eq!(
            dir.get_channel(missing).unwrap_err(),
            CoreError::ChannelNotFound(missing)
        );
    }
}
