//! Types shared by the server, the storage layer and clients.

pub mod api;
pub mod events;
pub mod models;
