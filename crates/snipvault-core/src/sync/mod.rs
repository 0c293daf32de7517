//! Client/server synchronization.
//!
//! [`protocol`] holds the wire types both sides share. [`SyncEngine`] drives
//! the client half over a [`SyncTransport`].

mod engine;
pub mod protocol;
mod transport;

pub use engine::{EngineStatus, MergeStats, SyncEngine, SyncOutcome, SyncReport, MAX_RETRIES};
pub use transport::{
    error_from_response, HttpSyncTransport, SyncTransport, TransportError, TransportResult,
};
