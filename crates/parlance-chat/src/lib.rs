//! Response resolution for Parlance bots.
//!
//! Scores utterances against labeled intents, retrieves knowledge chunks,
//! composes grounded generations, and routes between them according to
//! each bot's routing mode.

pub mod error;
pub mod generation;
pub mod intent;
pub mod lexical;
pub mod providers;
pub mod router;
pub mod text;
pub mod unrecognized;

pub use error::{ChatError, ProviderError};
pub use generation::{
    build_system_prompt, Completion, CompletionRequest, GenerativeProvider, GenerativeResponder,
    GroundingDocument,
};
pub use intent::{IntentMatch, IntentResolver};
pub use lexical::{LexicalMatch, LexicalRetriever};
pub use providers::{build_provider, AnthropicProvider, OpenAiChatProvider};
pub use router::Router;
pub use text::{normalize, phrase_match_score, similarity};
pub use unrecognized::UnrecognizedQueryLogger;
