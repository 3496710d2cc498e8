use std::sync::Arc;
use std::time::Duration;

use agora_types::api::{MessageResponse, ReactionResponse};
use agora_types::models::Author;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::transport::ChannelTransport;
use crate::view::{Draft, SyncPhase, ViewKey, ViewSnapshot, ViewState};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_WINDOW: usize = 50;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Number of most recent messages kept in view.
    pub window: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            window: DEFAULT_WINDOW,
        }
    }
}

struct Shared {
    channel_id: Uuid,
    transport: Arc<dyn ChannelTransport>,
    config: SyncConfig,
    /// Never held across an await.
    state: Mutex<ViewState>,
    /// At most one fetch per view is in flight.
    fetch: AsyncMutex<()>,
    updates: watch::Sender<ViewSnapshot>,
    wake: Notify,
    cancel: CancellationToken,
}

impl Shared {
    fn publish(&self) {
        let snapshot = self.state.lock().snapshot();
        self.updates.send_replace(snapshot);
    }

    async fn poll(&self) -> Result<(), SyncError> {
        let _fetch = self.fetch.lock().await;
        let ticket = {
            let state = self.state.lock();
            if state.is_closed() {
                return Err(SyncError::Closed);
            }
            if state.is_searching() {
                return Ok(());
            }
            state.begin_poll()
        };

        let messages = self
            .transport
            .list_messages(self.channel_id, self.config.window, None)
            .await?;

        if self.state.lock().apply_poll(ticket, messages) {
            self.publish();
        } else {
            debug!("Dropped poll result for closed view of {}", self.channel_id);
        }
        Ok(())
    }
}

async fn poll_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = shared.wake.notified() => ticker.reset(),
            _ = ticker.tick() => {}
        }

        // Not raced against cancellation: an in-flight fetch completes and
        // its result is dropped by the closed view.
        match shared.poll().await {
            Ok(()) => {}
            Err(SyncError::Closed) => break,
            Err(e) => warn!(
                "Poll of channel {} failed, retrying next tick: {}",
                shared.channel_id, e
            ),
        }
    }

    debug!("Poll loop for channel {} stopped", shared.channel_id);
}

/// One viewer's live view of one channel.
///
/// Polls the server on a fixed interval, applies the viewer's writes
/// optimistically and publishes every change through [`subscribe`](Self::subscribe).
/// Dropping the session stops polling.
pub struct ChannelSession {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSession {
    /// Open the view and start polling. The first fetch is issued immediately.
    /// A zero interval or window falls back to the default.
    pub fn open(
        transport: Arc<dyn ChannelTransport>,
        channel_id: Uuid,
        viewer: Author,
        mut config: SyncConfig,
    ) -> Self {
        if config.poll_interval.is_zero() {
            warn!("Poll interval must be positive, using {:?}", DEFAULT_POLL_INTERVAL);
            config.poll_interval = DEFAULT_POLL_INTERVAL;
        }
        if config.window == 0 {
            config.window = DEFAULT_WINDOW;
        }

        let mut state = ViewState::new(channel_id, viewer);
        state.open();
        let (updates, _) = watch::channel(state.snapshot());

        let shared = Arc::new(Shared {
            channel_id,
            transport,
            config,
            state: Mutex::new(state),
            fetch: AsyncMutex::new(()),
            updates,
            wake: Notify::new(),
            cancel: CancellationToken::new(),
        });
        let task = tokio::spawn(poll_loop(shared.clone()));

        info!(
            "Opened view of channel {} (every {:?})",
            channel_id, shared.config.poll_interval
        );
        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn key(&self) -> ViewKey {
        self.shared.state.lock().key()
    }

    pub fn phase(&self) -> SyncPhase {
        self.shared.state.lock().phase()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.shared.state.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Poll now instead of waiting for the next tick. Unlike the periodic
    /// poll, failures are returned to the caller.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        self.shared.poll().await
    }

    /// Send a message or reply. The draft shows up as a pending entry at once
    /// and is replaced by the stored record, or removed if the server refuses.
    pub async fn post(&self, draft: Draft) -> Result<MessageResponse, SyncError> {
        let (temp_id, request) = self.shared.state.lock().begin_post(&draft)?;
        self.shared.publish();

        let result = self
            .shared
            .transport
            .post_message(self.shared.channel_id, &request)
            .await;

        {
            let mut state = self.shared.state.lock();
            match &result {
                Ok(record) => state.confirm_post(&temp_id, record.clone()),
                Err(_) => state.rollback_post(&temp_id),
            }
        }
        self.shared.publish();

        if let Err(e) = &result {
            warn!("Post to channel {} rolled back: {}", self.shared.channel_id, e);
        }
        result
    }

    /// Flip the viewer's reaction. The local set changes immediately and is
    /// replaced by the server's authoritative set, or reverted on failure.
    pub async fn toggle_reaction(
        &self,
        message_id: Uuid,
        emoji: &str,
    ) -> Result<ReactionResponse, SyncError> {
        self.shared.state.lock().begin_toggle(message_id, emoji)?;
        self.shared.publish();

        let result = self
            .shared
            .transport
            .toggle_reaction(self.shared.channel_id, message_id, emoji)
            .await;

        {
            let mut state = self.shared.state.lock();
            match &result {
                Ok(resp) => state.confirm_toggle(message_id, emoji, resp.user_ids.clone()),
                Err(_) => state.rollback_toggle(message_id, emoji),
            }
        }
        self.shared.publish();

        if let Err(e) = &result {
            warn!("Reaction {} on {} reverted: {}", emoji, message_id, e);
        }
        result
    }

    /// Show a one-shot search result and suspend polling until
    /// [`clear_search`](Self::clear_search). An empty query clears the search.
    pub async fn search(&self, query: &str) -> Result<Vec<MessageResponse>, SyncError> {
        let query = query.trim();
        if query.is_empty() {
            self.clear_search();
            return Ok(Vec::new());
        }

        self.shared.state.lock().begin_search(query)?;
        self.shared.publish();

        let result = {
            let _fetch = self.shared.fetch.lock().await;
            self.shared
                .transport
                .list_messages(self.shared.channel_id, self.shared.config.window, Some(query))
                .await
        };

        match result {
            Ok(results) => {
                if self.shared.state.lock().apply_search(query, results.clone()) {
                    self.shared.publish();
                }
                Ok(results)
            }
            Err(e) => {
                warn!("Search '{}' in {} failed: {}", query, self.shared.channel_id, e);
                self.clear_search();
                Err(e)
            }
        }
    }

    /// Return to the live timeline and refresh it right away.
    pub fn clear_search(&self) {
        self.shared.state.lock().end_search();
        self.shared.publish();
        self.shared.wake.notify_one();
    }

    /// Fetch a single message, e.g. a thread parent outside the window.
    /// The view itself is left unchanged.
    pub async fn fetch_message(&self, message_id: Uuid) -> Result<MessageResponse, SyncError> {
        self.shared
            .transport
            .get_message(self.shared.channel_id, message_id)
            .await
    }

    /// Stop polling. Requests already in flight finish and are ignored.
    pub fn close(&self) {
        self.shared.state.lock().close();
        self.shared.cancel.cancel();
        self.shared.publish();
        info!("Closed view of channel {}", self.shared.channel_id);
    }

    /// Close and wait for the poll loop to exit.
    pub async fn shutdown(&self) {
        self.close();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Poll loop for {} ended abnormally: {}", self.shared.channel_id, e);
            }
        }
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}
