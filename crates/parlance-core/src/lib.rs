pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::ParlanceConfig;
pub use error::{ParlanceError, Result};
pub use store::{BotStore, ConversationStore, MemoryStore, UnrecognizedQueryStore};
pub use types::*;
