//! news-digest adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `state`: SQLite and in-memory subscription stores
//! - `telegram`: Bot API transport, update listener and public-preview source
//! - `outbox`: JSONL delivery transport for dry runs

pub mod outbox;
mod state_memory;
mod state_sqlite;

pub mod telegram;

/// Re-exports for state adapters
pub mod state {
    pub use crate::state_memory::InMemorySubscriptionStore;
    pub use crate::state_sqlite::SqliteSubscriptionStore;
}
