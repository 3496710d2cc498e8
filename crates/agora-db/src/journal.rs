use std::sync::Arc;
use std::time::Duration;

use agora_core::EventSink;
use agora_types::events::StoreEvent;
use rusqlite::ErrorCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::Database;

const MAX_BATCH: usize = 256;
const MAX_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Write-behind journal: store events are queued without blocking and a
/// single background task persists them in batches, in queue order.
#[derive(Clone)]
pub struct Journal {
    tx: mpsc::UnboundedSender<StoreEvent>,
}

/// Handle to the background writer. Resolves once every queued event has
/// been written and all `Journal` handles have been dropped.
pub struct JournalTask {
    handle: JoinHandle<()>,
}

impl Journal {
    pub fn spawn(db: Arc<Database>) -> (Self, JournalTask) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_writer(db, rx));
        (Self { tx }, JournalTask { handle })
    }
}

impl EventSink for Journal {
    fn record(&self, event: StoreEvent) {
        if self.tx.send(event).is_err() {
            warn!("Journal writer has stopped, event not persisted");
        }
    }
}

impl JournalTask {
    pub async fn finish(self) {
        if let Err(e) = self.handle.await {
            error!("Journal writer panicked: {}", e);
        }
    }
}

async fn run_writer(db: Arc<Database>, mut rx: mpsc::UnboundedReceiver<StoreEvent>) {
    let mut batch = Vec::with_capacity(MAX_BATCH);

    while rx.recv_many(&mut batch, MAX_BATCH).await > 0 {
        let events = Arc::new(std::mem::take(&mut batch));
        persist(&db, events).await;
    }

    info!("Journal writer drained and stopped");
}

/// Write one batch. Busy or I/O failures are retried with backoff; if the
/// batch still fails it is split so one bad event only loses itself.
async fn persist(db: &Arc<Database>, events: Arc<Vec<StoreEvent>>) {
    let count = events.len();
    let scope = events.first().and_then(StoreEvent::channel_id);
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        // Run blocking DB writes off the async runtime
        let (db, batch) = (db.clone(), events.clone());
        match tokio::task::spawn_blocking(move || db.apply_events(&batch)).await {
            Ok(Ok(())) => {
                debug!("Journaled {} events (first scoped to {:?})", count, scope);
                return;
            }
            Ok(Err(e)) if is_transient(&e) && attempt < MAX_ATTEMPTS => {
                warn!(
                    "Journal batch of {} events failed (attempt {}), retrying in {:?}: {}",
                    count, attempt, backoff, e
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Ok(Err(e)) => {
                warn!("Journal batch of {} events failed, writing one by one: {}", count, e);
                break;
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                break;
            }
        }
    }

    let (db, batch) = (db.clone(), events.clone());
    match tokio::task::spawn_blocking(move || db.apply_each(&batch)).await {
        Ok(Ok(failed)) => {
            for (i, e) in &failed {
                error!("Dropped journal event {:?}: {}", events[*i], e);
            }
            debug!("Journaled {} of {} events", count - failed.len(), count);
        }
        Ok(Err(e)) => error!("Failed to journal {} events: {}", count, e),
        Err(e) => error!("spawn_blocking join error: {}", e),
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::DiskFull
                    | ErrorCode::SystemIoFailure
            )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_busy_and_io_errors_are_retried() {
        let failure = |code| {
            anyhow::Error::from(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code,
                    extended_code: 0,
                },
                None,
            ))
        };
        assert!(is_transient(&failure(ErrorCode::DatabaseBusy)));
        assert!(is_transient(&failure(ErrorCode::DiskFull)));
        assert!(!is_transient(&failure(ErrorCode::ConstraintViolation)));
        assert!(!is_transient(&anyhow::anyhow!("bad uuid")));
    }
}
