use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use agora_types::models::ReactionMap;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::shard::ShardedMap;

const MAX_EMOJI_CHARS: usize = 32;

/// Users reacting with one emoji on one message.
#[derive(Default)]
struct Pair {
    users: BTreeSet<Uuid>,
    /// Unlinked from its message after being emptied; look it up again.
    retired: bool,
}

type ReactionSet = Arc<Mutex<Pair>>;

/// All reaction sets of one message, each behind its own lock.
///
/// Lock order is `by_emoji` before any pair lock.
#[derive(Default)]
struct MessageReactions {
    by_emoji: RwLock<HashMap<String, ReactionSet>>,
}

impl MessageReactions {
    fn set(&self, emoji: &str) -> ReactionSet {
        if let Some(set) = self.by_emoji.read().get(emoji) {
            return set.clone();
        }
        self.by_emoji
            .write()
            .entry(emoji.to_string())
            .or_default()
            .clone()
    }

    /// Drop the entry for `emoji` if its set is still empty.
    fn prune(&self, emoji: &str) {
        let mut by_emoji = self.by_emoji.write();
        let emptied = by_emoji.get(emoji).is_some_and(|set| {
            let mut pair = set.lock();
            if pair.users.is_empty() {
                pair.retired = true;
            }
            pair.retired
        });
        if emptied {
            by_emoji.remove(emoji);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_emoji.read().len()
    }
}

/// Per-message, per-emoji sets of reacting users.
///
/// Toggles serialize on the `(message, emoji)` pair only. Sets that become
/// empty are removed.
pub struct ReactionLedger {
    messages: ShardedMap<Arc<MessageReactions>>,
}

impl Default for ReactionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactionLedger {
    pub fn new() -> Self {
        Self {
            messages: ShardedMap::new(),
        }
    }

    /// Run `f` on the pair's users with the pair lock held.
    fn with_pair<T>(
        &self,
        message_id: Uuid,
        emoji: &str,
        f: impl FnOnce(&mut BTreeSet<Uuid>) -> T,
    ) -> T {
        loop {
            let reactions = self
                .messages
                .get_or_insert_with(message_id, Default::default);
            let set = reactions.set(emoji);
            let mut pair = set.lock();
            if pair.retired {
                continue;
            }

            let out = f(&mut pair.users);
            let emptied = pair.users.is_empty();
            drop(pair);
            if emptied {
                reactions.prune(emoji);
            }
            return out;
        }
    }

    /// Flip `user_id`'s membership and return the resulting set.
    ///
    /// `on_commit(present)` runs while the pair lock is held.
    pub fn toggle(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
        on_commit: impl FnOnce(bool),
    ) -> BTreeSet<Uuid> {
        self.with_pair(message_id, emoji, |users| {
            let present = if users.remove(&user_id) {
                false
            } else {
                users.insert(user_id);
                true
            };
            on_commit(present);
            users.clone()
        })
    }

    /// Force a membership state (used when replaying persisted state).
    pub fn set(&self, message_id: Uuid, user_id: Uuid, emoji: &str, present: bool) {
        self.with_pair(message_id, emoji, |users| {
            if present {
                users.insert(user_id);
            } else {
                users.remove(&user_id);
            }
        });
    }

    /// Number of emoji entries held for a message, empty or not.
    #[cfg(test)]
    fn tracked(&self, message_id: Uuid) -> usize {
        self.messages.get(&message_id).map_or(0, |r| r.len())
    }

/// Non-empty reaction sets of a message.
    pub fn get(&self, message_id: Uuid) -> ReactionMap {
        let Some(reactions) = self.messages.get(&message_id) else {
            return ReactionMap::new();
        };
        let by_emoji = reactions.by_emoji.read();
        by_emoji
            .iter()
            .filter_map(|(emoji, set)| {
                let pair = set.lock();
                (!pair.users.is_empty()).then(|| (emoji.clone(), pair.users.clone()))
            })
            .collect()
    }
}

/// Emoji are short, non-blank and contain no whitespace.
pub fn validate_emoji(emoji: &str) -> Result<()> {
    let len = emoji.chars().count();
    if len == 0 || len > MAX_EMOJI_CHARS || emoji.chars().any(char::is_whitespace) {
        return Err(CoreError::invalid(format!(
            "emoji must be 1 to {MAX_EMOJI_CHARS} characters without whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_twice_is_identity() {
        let ledger = ReactionLedger::new();
        let (m, u) = (Uuid::new_v4(), Uuid::new_v4());

        let after_first = ledger.toggle(m, u, "🔥", |present| assert!(present));
        assert!(after_first.contains(&u));

        let after_second = ledger.toggle(m, u, "🔥", |present| assert!(!present));
        assert!(after_second.is_empty());
        assert!(ledger.get(m).is_empty());
    }

    #[test]
    fn sets_are_independent_per_emoji() {
        let ledger = ReactionLedger::new();
        let m = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        ledger.toggle(m, a, "🔥", |_| {});
        ledger.toggle(m, b, "🔥", |_| {});
        ledger.toggle(m, a, "💯", |_| {});

        let map = ledger.get(m);
        assert_eq!(map["🔥"].len(), 2);
        assert_eq!(map["💯"].len(), 1);
        assert!(ledger.get(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn set_is_idempotent() {
        let ledger = ReactionLedger::new();
        let (m, u) = (Uuid::new_v4(), Uuid::new_v4());
        ledger.set(m, u, "👍", true);
        ledger.set(m, u, "👍", true);
        assert_eq!(ledger.get(m)["👍"].len(), 1);
        ledger.set(m, u, "👍", false);
        ledger.set(m, u, "👍", false);
        assert!(ledger.get(m).is_empty());
    }

    #[test]
    fn emptied_sets_are_pruned() {
        let ledger = ReactionLedger::new();
        let (m, u) = (Uuid::new_v4(), Uuid::new_v4());

        for i in 0..100 {
            let emoji = format!(":e{i}:");
            ledger.toggle(m, u, &emoji, |_| {});
            ledger.toggle(m, u, &emoji, |_| {});
        }
        assert_eq!(ledger.tracked(m), 0);

        ledger.toggle(m, u, "🔥", |_| {});
        ledger.set(m, u, "👍", false);
        assert_eq!(ledger.tracked(m), 1);
        assert_eq!(ledger.get(m)["🔥"].len(), 1);
    }

    #[test]
    fn concurrent_toggles_survive_pruning() {
        let ledger = Arc::new(ReactionLedger::new());
        let m = Uuid::new_v4();
        let users: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

        // Each user toggles an odd number of times and ends up reacting
        let handles: Vec<_> = users
            .iter()
            .map(|&u| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..201 {
                        ledger.toggle(m, u, "🔥", |_| {});
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let set = &ledger.get(m)["🔥"];
        assert_eq!(set.len(), users.len());
        assert!(users.iter().all(|u| set.contains(u)));
    }

    #[test]
    fn emoji_validation() {
        assert!(validate_emoji("🔥").is_ok());
        assert!(validate_emoji(":fire:").is_ok());
        assert!(validate_emoji("").is_err());
        assert!(validate_emoji("a b").is_err());
    }
}
