//! Application use cases / business logic

pub mod commands;
pub mod deliver;
pub mod dispatch;
pub mod poll_loop;

pub use commands::{Command, CommandHandler};
pub use deliver::{ActionOutcome, DeliveryConfig, DeliveryController};
pub use dispatch::Dispatcher;
pub use poll_loop::{PollEngine, PollEngineConfig, PollError};
