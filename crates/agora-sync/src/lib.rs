//! Client-side sync coordinator.
//!
//! A [`ChannelSession`] keeps one viewer's window of one channel converged
//! with the server by polling, and folds the viewer's own writes into that
//! window optimistically. [`ViewState`] holds the pure reconciliation logic;
//! the session adds timers and I/O around it.

pub mod error;
pub mod session;
pub mod transport;
pub mod view;

pub use error::SyncError;
pub use session::{ChannelSession, SyncConfig};
pub use transport::{ChannelTransport, HttpTransport, LocalTransport};
pub use view::{Draft, SyncPhase, ViewEntry, ViewKey, ViewSnapshot, ViewState};
