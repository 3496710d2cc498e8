use std::collections::{BTreeMap, HashMap};

use agora_types::api::{MessageResponse, SendMessageRequest};
use agora_types::models::{Attachment, Author};
use chrono::Utc;
use uuid::Uuid;

use crate::error::SyncError;

/// Lifecycle of one channel view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Created, not yet opened.
    Idle,
    /// Converging with the server on every tick.
    Polling,
    /// Polling, with local writes not yet acknowledged.
    Reconciling,
    /// Showing a one-shot search result; polling is suspended.
    Searching,
    Closed,
}

/// A view is scoped to one channel as seen by one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub channel_id: Uuid,
    pub viewer: Uuid,
}

/// A message as currently displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEntry {
    pub message: MessageResponse,
    /// Optimistic entry whose write has not been acknowledged.
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub key: ViewKey,
    pub phase: SyncPhase,
    pub entries: Vec<ViewEntry>,
    /// Active search query, if the entries are a search result.
    pub search: Option<String>,
}

impl ViewSnapshot {
    pub fn confirmed(&self) -> impl Iterator<Item = &MessageResponse> {
        self.entries.iter().filter(|e| !e.pending).map(|e| &e.message)
    }
}

/// A message the viewer is about to send.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub attachment: Option<Attachment>,
}

impl Draft {
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

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    fn to_request(&self, nonce: &str) -> SendMessageRequest {
        SendMessageRequest {
            content: self.content.clone(),
            parent_id: self.parent_id,
            attachment_url: self.attachment.as_ref().map(|a| a.url.clone()),
            attachment_type: self.attachment.as_ref().map(|a| a.kind.clone()),
            nonce: Some(nonce.to_string()),
        }
    }
}

struct PendingMessage {
    temp_id: String,
    message: MessageResponse,
}

struct PendingToggle {
    in_flight: u32,
    /// Whether the viewer should appear in the set once the toggles land.
    present: bool,
}

struct Search {
    query: String,
    results: Vec<MessageResponse>,
}

/// Reconciliation state of one view, free of I/O.
///
/// Every server response is applied with the epoch it was requested at.
/// The epoch advances whenever a local write is acknowledged, so a poll that
/// was already in flight cannot erase a write it never saw.
pub struct ViewState {
    key: ViewKey,
    viewer: Author,
    opened: bool,
    closed: bool,
    epoch: u64,
    timeline: Vec<MessageResponse>,
    pending: Vec<PendingMessage>,
    /// Acknowledged writes not yet seen in a poll, with the epoch they landed at.
    settled: Vec<(u64, MessageResponse)>,
    toggles: HashMap<(Uuid, String), PendingToggle>,
    settled_reactions: HashMap<(Uuid, String), (u64, Vec<Uuid>)>,
    search: Option<Search>,
}

type ReactionSets = BTreeMap<String, Vec<Uuid>>;

fn set_membership(reactions: &mut ReactionSets, emoji: &str, user: Uuid, present: bool) {
    let users = reactions.entry(emoji.to_string()).or_default();
    match (users.binary_search(&user), present) {
        (Err(at), true) => users.insert(at, user),
        (Ok(at), false) => {
            users.remove(at);
        }
        _ => {}
    }
    if users.is_empty() {
        reactions.remove(emoji);
    }
}

fn set_users(reactions: &mut ReactionSets, emoji: &str, mut users: Vec<Uuid>) {
    if users.is_empty() {
        reactions.remove(emoji);
    } else {
        users.sort();
        users.dedup();
        reactions.insert(emoji.to_string(), users);
    }
}

fn insert_sorted(list: &mut Vec<MessageResponse>, message: MessageResponse) {
    if list.iter().any(|m| m.id == message.id) {
        return;
    }
    let key = (message.created_at, message.id);
    let at = list.partition_point(|m| (m.created_at, m.id) < key);
    list.insert(at, message);
}

impl ViewState {
    pub fn new(channel_id: Uuid, viewer: Author) -> Self {
        Self {
            key: ViewKey {
                channel_id,
                viewer: viewer.user_id,
            },
            viewer,
            opened: false,
            closed: false,
            epoch: 0,
            timeline: Vec::new(),
            pending: Vec::new(),
            settled: Vec::new(),
            toggles: HashMap::new(),
            settled_reactions: HashMap::new(),
            search: None,
        }
    }

    pub fn key(&self) -> ViewKey {
        self.key
    }

    pub fn open(&mut self) {
        if !self.closed {
            self.opened = true;
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
        self.toggles.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn phase(&self) -> SyncPhase {
        if self.closed {
            SyncPhase::Closed
        } else if !self.opened {
            SyncPhase::Idle
        } else if self.search.is_some() {
            SyncPhase::Searching
        } else if !self.pending.is_empty() || !self.toggles.is_empty() {
            SyncPhase::Reconciling
        } else {
            SyncPhase::Polling
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let entries = match &self.search {
            Some(search) => search
                .results
                .iter()
                .map(|m| ViewEntry {
                    message: m.clone(),
                    pending: false,
                })
                .collect(),
            None => self
                .timeline
                .iter()
                .map(|m| ViewEntry {
                    message: m.clone(),
                    pending: false,
                })
                .chain(self.pending.iter().map(|p| ViewEntry {
                    message: p.message.clone(),
                    pending: true,
                }))
                .collect(),
        };

        ViewSnapshot {
            key: self.key,
            phase: self.phase(),
            entries,
            search: self.search.as_ref().map(|s| s.query.clone()),
        }
    }

    // -- Polling --

    /// Ticket to pass back to [`apply_poll`](Self::apply_poll).
    pub fn begin_poll(&self) -> u64 {
        self.epoch
    }

    /// Replace the timeline with a fresh window, then lay local state back on
    /// top. Returns false when the view is closed and the result was dropped.
    pub fn apply_poll(&mut self, ticket: u64, mut messages: Vec<MessageResponse>) -> bool {
        if self.closed {
            return false;
        }

        // Writes acknowledged after the poll was sent may be missing from it
        self.settled
            .retain(|(epoch, m)| *epoch > ticket && !messages.iter().any(|s| s.id == m.id));
        for (_, m) in &self.settled {
            insert_sorted(&mut messages, m.clone());
        }
        messages.sort_by_key(|m| (m.created_at, m.id));

        let viewer = self.viewer.user_id;
        self.pending.retain(|p| {
            !messages
                .iter()
                .any(|m| m.user_id == viewer && m.nonce.as_deref() == Some(p.temp_id.as_str()))
        });

        self.timeline = messages;
        self.settled_reactions.retain(|_, (epoch, _)| *epoch > ticket);
        self.overlay_reactions();
        true
    }

    fn overlay_reactions(&mut self) {
        let viewer = self.viewer.user_id;
        let settled: Vec<_> = self
            .settled_reactions
            .iter()
            .map(|((id, emoji), (_, users))| (*id, emoji.clone(), users.clone()))
            .collect();
        for (id, emoji, users) in settled {
            self.for_each_copy(id, |r| set_users(r, &emoji, users.clone()));
        }

        let desired: Vec<_> = self
            .toggles
            .iter()
            .map(|((id, emoji), t)| (*id, emoji.clone(), t.present))
            .collect();
        for (id, emoji, present) in desired {
            self.for_each_copy(id, |r| set_membership(r, &emoji, viewer, present));
        }
    }

    /// Apply `f` to the reactions of every displayed copy of a message.
    fn for_each_copy(&mut self, message_id: Uuid, mut f: impl FnMut(&mut ReactionSets)) -> bool {
        let mut found = false;
        let search = self.search.iter_mut().flat_map(|s| s.results.iter_mut());
        for m in self.timeline.iter_mut().chain(search) {
            if m.id == message_id {
                f(&mut m.reactions);
                found = true;
            }
        }
        found
    }

    // -- Messages --

    /// Show the draft immediately. Returns the temporary id and the request
    /// to send; the temporary id travels as the request's nonce.
    pub fn begin_post(&mut self, draft: &Draft) -> Result<(String, SendMessageRequest), SyncError> {
        if self.closed {
            return Err(SyncError::Closed);
        }

        let temp_id = Uuid::new_v4().to_string();
        let message = MessageResponse {
            id: Uuid::new_v4(),
            channel_id: self.key.channel_id,
            user_id: self.viewer.user_id,
            author_name: self.viewer.name.clone(),
            content: draft.content.clone(),
            attachment: draft.attachment.clone(),
            created_at: Utc::now(),
            parent_id: draft.parent_id,
            is_admin_authored: self.viewer.is_privileged,
            nonce: Some(temp_id.clone()),
            reactions: BTreeMap::new(),
        };
        let request = draft.to_request(&temp_id);
        self.pending.push(PendingMessage {
            temp_id: temp_id.clone(),
            message,
        });
        Ok((temp_id, request))
    }

    /// Swap the optimistic entry for the stored record.
    pub fn confirm_post(&mut self, temp_id: &str, record: MessageResponse) {
        if self.closed {
            return;
        }
        self.epoch += 1;
        self.pending.retain(|p| p.temp_id != temp_id);
        insert_sorted(&mut self.timeline, record.clone());
        self.settled.push((self.epoch, record));
    }

    pub fn rollback_post(&mut self, temp_id: &str) {
        self.pending.retain(|p| p.temp_id != temp_id);
    }

    // -- Reactions --

    /// Flip the viewer's membership locally. Only messages the server has
    /// acknowledged can be reacted to.
    pub fn begin_toggle(&mut self, message_id: Uuid, emoji: &str) -> Result<(), SyncError> {
        if self.closed {
            return Err(SyncError::Closed);
        }

        let viewer = self.viewer.user_id;
        let current = self
            .timeline
            .iter()
            .chain(self.search.iter().flat_map(|s| s.results.iter()))
            .find(|m| m.id == message_id)
            .map(|m| m.reactions.get(emoji).is_some_and(|u| u.contains(&viewer)))
            .ok_or_else(|| SyncError::NotFound(format!("message {message_id} is not in view")))?;

        let present = !current;
        let toggle = self
            .toggles
            .entry((message_id, emoji.to_string()))
            .or_insert(PendingToggle {
                in_flight: 0,
                present,
            });
        toggle.in_flight += 1;
        toggle.present = present;

        self.for_each_copy(message_id, |r| set_membership(r, emoji, viewer, present));
        Ok(())
    }

    /// Adopt the authoritative set returned by the server.
    pub fn confirm_toggle(&mut self, message_id: Uuid, emoji: &str, users: Vec<Uuid>) {
        if self.closed {
            return;
        }
        self.epoch += 1;

        let pair = (message_id, emoji.to_string());
        let still_pending = self.finish_toggle(&pair);
        self.for_each_copy(message_id, |r| set_users(r, emoji, users.clone()));
        if let Some(present) = still_pending {
            let viewer = self.viewer.user_id;
            self.for_each_copy(message_id, |r| set_membership(r, emoji, viewer, present));
        }
        self.settled_reactions.insert(pair, (self.epoch, users));
    }

    /// Undo the local flip of a toggle the server refused.
    pub fn rollback_toggle(&mut self, message_id: Uuid, emoji: &str) {
        if self.closed {
            return;
        }
        let pair = (message_id, emoji.to_string());
        let Some(toggle) = self.toggles.get_mut(&pair) else {
            return;
        };
        toggle.present = !toggle.present;
        let restored = toggle.present;
        self.finish_toggle(&pair);

        let viewer = self.viewer.user_id;
        self.for_each_copy(message_id, |r| set_membership(r, emoji, viewer, restored));
    }

    /// Returns the desired membership if other toggles of the pair are still in flight.
    fn finish_toggle(&mut self, pair: &(Uuid, String)) -> Option<bool> {
        let toggle = self.toggles.get_mut(pair)?;
        toggle.in_flight = toggle.in_flight.saturating_sub(1);
        if toggle.in_flight == 0 {
            self.toggles.remove(pair);
            None
        } else {
            Some(toggle.present)
        }
    }

    // -- Search --

    pub fn begin_search(&mut self, query: &str) -> Result<(), SyncError> {
        if self.closed {
            return Err(SyncError::Closed);
        }
        self.search = Some(Search {
            query: query.to_string(),
            results: Vec::new(),
        });
        Ok(())
    }

    /// Returns false if the search was cleared or replaced meanwhile.
    pub fn apply_search(&mut self, query: &str, results: Vec<MessageResponse>) -> bool {
        if self.closed {
            return false;
        }
        match &mut self.search {
            Some(search) if search.query == query => {
                search.results = results;
                true
            }
            _ => false,
        }
    }

    pub fn end_search(&mut self) {
        self.search = None;
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn viewer() -> Author {
        Author::new(Uuid::new_v4(), "looksmaxxer", false)
    }

    fn record(state: &ViewState, content: &str, offset_ms: i64) -> MessageResponse {
        MessageResponse {
            id: Uuid::now_v7(),
            channel_id: state.key.channel_id,
            user_id: Uuid::new_v4(),
            author_name: "someone".into(),
            content: content.into(),
            attachment: None,
            created_at: Utc::now() + Duration::milliseconds(offset_ms),
            parent_id: None,
            is_admin_authored: false,
            nonce: None,
            reactions: BTreeMap::new(),
        }
    }

    fn echo(state: &ViewState, request: &SendMessageRequest) -> MessageResponse {
        MessageResponse {
            user_id: state.viewer.user_id,
            author_name: state.viewer.name.clone(),
            nonce: request.nonce.clone(),
            ..record(state, &request.content, 0)
        }
    }

    fn opened() -> ViewState {
        let mut state = ViewState::new(Uuid::new_v4(), viewer());
        state.open();
        state
    }

    #[test]
    fn phases_follow_lifecycle() {
        let mut state = ViewState::new(Uuid::new_v4(), viewer());
        assert_eq!(state.phase(), SyncPhase::Idle);
        state.open();
        assert_eq!(state.phase(), SyncPhase::Polling);

        let (temp, _) = state.begin_post(&Draft::text("hi")).unwrap();
        assert_eq!(state.phase(), SyncPhase::Reconciling);
        state.rollback_post(&temp);
        assert_eq!(state.phase(), SyncPhase::Polling);

        state.begin_search("jaw").unwrap();
        assert_eq!(state.phase(), SyncPhase::Searching);
        state.end_search();

        state.close();
        assert_eq!(state.phase(), SyncPhase::Closed);
        assert!(matches!(
            state.begin_post(&Draft::text("late")),
            Err(SyncError::Closed)
        ));
    }

    #[test]
    fn pending_entries_trail_the_timeline_until_confirmed() {
        let mut state = opened();
        let older = record(&state, "older", -1000);
        state.apply_poll(0, vec![older.clone()]);

        let (temp, request) = state.begin_post(&Draft::text("mine")).unwrap();
        assert_eq!(request.nonce.as_deref(), Some(temp.as_str()));

        let snap = state.snapshot();
        assert_eq!(snap.entries.len(), 2);
        assert!(snap.entries[1].pending);
        assert_eq!(snap.entries[1].message.content, "mine");

        let stored = echo(&state, &request);
        state.confirm_post(&temp, stored.clone());
        let snap = state.snapshot();
        assert!(snap.entries.iter().all(|e| !e.pending));
        assert_eq!(snap.entries[1].message.id, stored.id);
    }

    #[test]
    fn stale_poll_does_not_drop_acknowledged_write() {
        let mut state = opened();
        let ticket = state.begin_poll();

        let (temp, request) = state.begin_post(&Draft::text("mine")).unwrap();
        let stored = echo(&state, &request);
        state.confirm_post(&temp, stored.clone());

        // Poll requested before the write landed
        state.apply_poll(ticket, vec![]);
        assert_eq!(state.snapshot().entries.len(), 1);

        // A later poll that still lacks it is trusted
        let ticket = state.begin_poll();
        state.apply_poll(ticket, vec![]);
        assert!(state.snapshot().entries.is_empty());
    }

    #[test]
    fn echo_by_nonce_replaces_pending_entry() {
        let mut state = opened();
        let (temp, request) = state.begin_post(&Draft::text("mine")).unwrap();
        let stored = echo(&state, &request);

        let ticket = state.begin_poll();
        state.apply_poll(ticket, vec![stored.clone()]);
        let snap = state.snapshot();
        assert_eq!(snap.entries.len(), 1);
        assert!(!snap.entries[0].pending);

        // The response arriving afterwards must not duplicate it
        state.confirm_post(&temp, stored);
        assert_eq!(state.snapshot().entries.len(), 1);
        assert_eq!(state.phase(), SyncPhase::Polling);
    }

    #[test]
    fn foreign_nonce_does_not_clear_pending_entry() {
        let mut state = opened();
        let (temp, _) = state.begin_post(&Draft::text("mine")).unwrap();
        let mut other = record(&state, "theirs", 0);
        other.nonce = Some(temp);

        state.apply_poll(0, vec![other]);
        assert_eq!(state.snapshot().entries.len(), 2);
    }

    #[test]
    fn toggle_is_optimistic_and_reverts_on_failure() {
        let mut state = opened();
        let post = record(&state, "rate my jaw", 0);
        state.apply_poll(0, vec![post.clone()]);
        let me = state.viewer.user_id;

        state.begin_toggle(post.id, "🔥").unwrap();
        assert_eq!(state.snapshot().entries[0].message.reactions["🔥"], [me]);
        assert_eq!(state.phase(), SyncPhase::Reconciling);

        state.rollback_toggle(post.id, "🔥");
        assert!(state.snapshot().entries[0].message.reactions.is_empty());
        assert_eq!(state.phase(), SyncPhase::Polling);
    }

    #[test]
    fn toggle_adopts_server_set_and_survives_polls() {
        let mut state = opened();
        let post = record(&state, "rate my jaw", 0);
        state.apply_poll(0, vec![post.clone()]);
        let me = state.viewer.user_id;
        let friend = Uuid::new_v4();

        state.begin_toggle(post.id, "🔥").unwrap();
        let in_flight = state.begin_poll();
        // Poll answered before the toggle reached the server
        state.apply_poll(in_flight, vec![post.clone()]);
        assert_eq!(state.snapshot().entries[0].message.reactions["🔥"], [me]);

        state.confirm_toggle(post.id, "🔥", vec![friend, me]);
        let snap = state.snapshot();
        assert_eq!(snap.entries[0].message.reactions["🔥"].len(), 2);

        // Another stale poll keeps the adopted set
        state.apply_poll(in_flight, vec![post.clone()]);
        assert_eq!(state.snapshot().entries[0].message.reactions["🔥"].len(), 2);
    }

    #[test]
    fn toggle_requires_a_confirmed_message() {
        let mut state = opened();
        let missing = Uuid::new_v4();
        assert!(matches!(
            state.begin_toggle(missing, "👍"),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn search_shadows_timeline_and_late_results_are_dropped() {
        let mut state = opened();
        let a = record(&state, "jawline", 0);
        let b = record(&state, "skincare", 1);
        state.apply_poll(0, vec![a.clone(), b.clone()]);

        state.begin_search("jaw").unwrap();
        assert!(state.apply_search("jaw", vec![a.clone()]));
        let snap = state.snapshot();
        assert_eq!(snap.search.as_deref(), Some("jaw"));
        assert_eq!(snap.entries.len(), 1);

        state.end_search();
        assert!(!state.apply_search("jaw", vec![]));
        assert_eq!(state.snapshot().entries.len(), 2);
    }

    #[test]
    fn closed_view_discards_results() {
        let mut state = opened();
        let ticket = state.begin_poll();
        state.close();
        assert!(!state.apply_poll(ticket, vec![record(&state, "late", 0)]));
        assert!(state.snapshot().entries.is_empty());
    }
}
