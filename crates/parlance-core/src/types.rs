use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Who authored a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

impl std::str::FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "bot" => Ok(Sender::Bot),
            other => Err(format!("unknown sender: {}", other)),
        }
    }
}

/// Which resolution strategy produced a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// A labeled intent matched the utterance.
    Intent,
    /// A knowledge chunk was returned verbatim.
    KnowledgeBase,
    /// A generative provider composed the reply.
    LlmGeneration,
    /// Nothing matched; the bot's fallback message was used.
    Fallback,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Intent => "intent",
            ResolutionSource::KnowledgeBase => "knowledge_base",
            ResolutionSource::LlmGeneration => "llm_generation",
            ResolutionSource::Fallback => "fallback",
        }
    }
}

impl std::str::FromStr for ResolutionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intent" => Ok(ResolutionSource::Intent),
            "knowledge_base" => Ok(ResolutionSource::KnowledgeBase),
            "llm_generation" => Ok(ResolutionSource::LlmGeneration),
            "fallback" => Ok(ResolutionSource::Fallback),
            other => Err(format!("unknown resolution source: {}", other)),
        }
    }
}

/// Bot-level routing policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Deterministic path only (intents, then lexical knowledge).
    IntentOnly,
    /// Generative first, deterministic path when generation is weak.
    LlmFirst,
    /// Deterministic first, generative when confidence is below threshold.
    #[default]
    Hybrid,
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingMode::IntentOnly => "intent_only",
            RoutingMode::LlmFirst => "llm_first",
            RoutingMode::Hybrid => "hybrid",
        }
    }
}

/// How an intent training phrase matched the utterance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Substring,
    Fuzzy,
}

// =============================================================================
// Intents and knowledge
// =============================================================================

/// One candidate reply for an intent, with optional alternate phrasings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResponse {
    pub text: String,
    #[serde(default)]
    pub variations: Vec<String>,
}

impl IntentResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            variations: Vec::new(),
        }
    }
}

/// A labeled cluster of example utterances mapped to candidate replies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    pub display_name: String,
    pub training_phrases: Vec<String>,
    pub responses: Vec<IntentResponse>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Provenance of a knowledge chunk within its source document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub source: String,
    pub chunk_index: usize,
}

/// A bounded span of source-document text stored for retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: Uuid,
    pub text: String,
    pub metadata: ChunkMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

// =============================================================================
// Conversation log
// =============================================================================

/// How a bot message was resolved, kept alongside the message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageResolution {
    pub intent: Option<String>,
    pub confidence: f32,
    pub source: ResolutionSource,
}

/// An entry of the append-only per-session message log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<MessageResolution>,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
            resolution: None,
        }
    }

    pub fn bot(text: impl Into<String>, resolution: Option<MessageResolution>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
            timestamp: Utc::now(),
            resolution,
        }
    }
}

// =============================================================================
// Bots
// =============================================================================

/// Per-bot routing settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub mode: RoutingMode,
    /// Minimum deterministic confidence accepted in hybrid mode.
    pub acceptance_threshold: f32,
    /// In llm_first mode, whether weak generations fall back to the deterministic path.
    pub fallback_enabled: bool,
    /// Number of recent messages loaded as generation context.
    pub context_messages: usize,
    /// Ground generation with vector search when a vector retriever is available.
    pub use_vector_search: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::default(),
            acceptance_threshold: 0.7,
            fallback_enabled: true,
            context_messages: 10,
            use_vector_search: true,
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

/// A bot's configuration as seen by the resolution engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl Bot {
    /// Create an active bot with default routing and fallback message.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            persona: String::new(),
            tone: String::new(),
            fallback_message: default_fallback_message(),
            is_active: true,
            routing: RoutingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_fallback_message() -> String {
    "I'm sorry, I didn't quite understand that. Could you rephrase your question?".to_string()
}

// =============================================================================
// Resolution output
// =============================================================================

/// Observability details attached to a [`RouterResult`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<RoutingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_phrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_kind: Option<MatchKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_ids: Vec<Uuid>,
    /// Set when the configured mode could not run and the router degraded.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// The single reply produced for an utterance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouterResult {
    pub response_text: String,
    pub intent: Option<String>,
    pub confidence: f32,
    pub source: ResolutionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResolutionMetadata>,
}

impl RouterResult {
    /// A reply backed by a matched intent.
    pub fn from_intent(
        response_text: impl Into<String>,
        intent: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            response_text: response_text.into(),
            intent: Some(intent.into()),
            confidence: clamp_confidence(confidence),
            source: ResolutionSource::Intent,
            metadata: None,
        }
    }

    /// A reply composed by a non-intent strategy. `intent` stays `None`.
    pub fn from_source(
        response_text: impl Into<String>,
        source: ResolutionSource,
        confidence: f32,
    ) -> Self {
        Self {
            response_text: response_text.into(),
            intent: None,
            confidence: clamp_confidence(confidence),
            source,
            metadata: None,
        }
    }

    /// The bot's "I don't know" reply.
    pub fn fallback(response_text: impl Into<String>) -> Self {
        Self::from_source(response_text, ResolutionSource::Fallback, 0.0)
    }

    pub fn with_metadata(mut self, metadata: ResolutionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Mutable access to metadata, creating it when absent.
    pub fn metadata_mut(&mut self) -> &mut ResolutionMetadata {
        self.metadata.get_or_insert_with(ResolutionMetadata::default)
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ResolutionSource::Fallback
    }

    /// Resolution record to store alongside the bot's message.
    pub fn resolution(&self) -> MessageResolution {
        MessageResolution {
            intent: self.intent.clone(),
            confidence: self.confidence,
            source: self.source,
        }
    }
}

fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// An utterance no strategy could answer, kept for curation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnrecognizedQuery {
    pub bot_id: Uuid,
    pub text: String,
    pub occurrences: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
