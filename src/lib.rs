//! Guild Leveling Library
//!
//! This library provides the core modules for a chat leveling add-on:
//! - Cache-backed, path-addressed document store
//! - JSON file, LMDB and PostgreSQL storage backends
//! - XP, level, settings and rank managers with broadcast events

pub mod config;
pub mod error;
pub mod leveling;
pub mod storage;

// Re-export commonly used types
pub use config::{Config, DatabaseConfig, LevelingOptions};
pub use error::{ConfigError, DatabaseError, StoreError, StoreResult};
pub use leveling::{Leveling, LevelingEvent, MessageEvent, UserRecord};
pub use storage::{DataStore, Mutation, StoreState, StoreStats};
