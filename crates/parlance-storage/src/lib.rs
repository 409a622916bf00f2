//! Parlance Storage crate - SQLite persistence for bots, intents,
//! knowledge chunks, conversation logs and unrecognized queries.
//!
//! Provides a WAL-mode SQLite database with migrations and repositories
//! implementing the store contracts from `parlance-core`.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{
    BotRepository, ChunkStatus, ConversationRepository, UnrecognizedQueryRepository,
};
