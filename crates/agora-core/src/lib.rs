//! In-memory messaging core.
//!
//! Each channel owns an append-only log guarded by its own writer lock, so
//! appends to different channels never contend. Reaction sets are locked per
//! `(message, emoji)` pair. Nothing in here takes an exclusive lock over the
//! whole store.

pub mod directory;
pub mod error;
pub mod hub;
pub mod log;
pub mod permissions;
pub mod reactions;
mod shard;

pub use directory::NewChannel;
pub use error::{CoreError, Result};
pub use hub::{ChannelSummary, EventSink, Hub, RestoreStats, Snapshot};
pub use log::{NewMessage, Window};
pub use permissions::{Permission, can_post};
