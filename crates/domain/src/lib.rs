//! news-digest domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `normalize`: Pure text normalization pipeline
//! - `usecases`: Polling, delivery and command handling

pub mod model;
pub mod normalize;
pub mod ports;
pub mod usecases;

pub use model::*;
pub use ports::*;
