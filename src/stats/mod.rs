//! Processing statistics for a running session.
//!
//! Only counts are kept here; no event payloads are stored.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, read_persisted, Counter,
    ProcessingLog, ProcessingStats, SharedProcessingLog,
};
