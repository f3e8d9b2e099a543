//! hostpool provisioning engine.
//!
//! Places rented services on a pool of servers without overselling any
//! server's capacity, drives each service through its lifecycle, reports an
//! internal cost share per service, and keeps invoice status convergent with
//! the billing provider.
//!
//! The crate ships a `hostpool-engine` binary that runs the background
//! workers; the library surface is what integration tests and embedding
//! services use.

pub mod billing;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod cost;
pub mod engine;
pub mod error;
pub mod host;
pub mod identity;
pub mod inventory;
pub mod ledger;
pub mod lifecycle;
pub mod model;
pub mod selector;
pub mod store;
pub mod worker;

pub use engine::{Engine, EngineSettings};
pub use error::{EngineError, EngineResult};
