//! # verdant-engine
//! Wires the ledger, catalog, redemption, rule, directory, and snapshot
//! stores behind one lock and exposes the engine's public operations.

pub mod config;
pub mod engine;

pub use config::EngineConfig;
pub use engine::{ApplyReport, Engine, EngineState, EngineStats};
