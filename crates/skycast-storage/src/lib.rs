//! Skycast Storage crate - local persistence for the conversation log.
//!
//! A single-table SQLite key-value store holding the serialized message log
//! and the session identifier. Every save overwrites the whole value.

pub mod db;
pub mod store;

pub use db::Database;
pub use store::{Store, MESSAGES_KEY, SESSION_ID_KEY};
