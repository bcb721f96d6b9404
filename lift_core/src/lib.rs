#![forbid(unsafe_code)]

//! Core domain model and business logic for the lift program engine.
//!
//! This crate provides:
//! - Domain types (lifts, maxes, prescriptions, programs, sessions)
//! - Load calculation and set-scheme expansion
//! - Workout assembly from a program graph
//! - The enrollment/session state machine
//! - Progression rules and failure counters
//! - Persistence (in-memory and JSON file stores, program catalog, CSV export)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod rpe;
pub mod load;
pub mod scheme;
pub mod assembler;
pub mod lifecycle;
pub mod failure;
pub mod progression;
pub mod store;
pub mod state;
pub mod catalog;
pub mod export;
pub mod engine;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use catalog::{builtin_programs, load_catalog};
pub use lifecycle::{LifecycleEvent, Phase};
pub use progression::{ProgressionOutcome, ProgressionRegistry, TriggerBatch, TriggerResult};
pub use scheme::SetOutcome;
pub use store::{ChangeSet, MemoryStore, Store};
pub use state::FileStore;
pub use engine::{AdvanceOutcome, FinishOutcome, LogOutcome, TrainingEngine};
