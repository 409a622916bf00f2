//! Grounded generation with a primary and an optional secondary provider.
//!
//! The responder never fails: when every provider errors, times out or
//! returns nothing, it answers with a fixed apology at low confidence.
//! Confidence is a fixed constant, not derived from the model.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use parlance_core::types::{
    Bot, ConversationMessage, ResolutionMetadata, ResolutionSource, RouterResult, Sender,
};

use crate::error::ProviderError;

/// Confidence of a successful generation.
pub const GENERATION_CONFIDENCE: f32 = 0.95;
/// Confidence of the apology returned when every provider failed.
pub const APOLOGY_CONFIDENCE: f32 = 0.3;
pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, I'm having trouble answering right now. Please try again in a moment.";

/// Inputs of a single completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text produced by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// A text-generation backend.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Short provider identifier recorded in resolution metadata.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

/// A retrieved document used to ground a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingDocument {
    pub id: Uuid,
    pub title: String,
    pub text: String,
}

/// Builds grounded prompts and walks the provider fallback chain.
pub struct GenerativeResponder {
    primary: Arc<dyn GenerativeProvider>,
    secondary: Option<Arc<dyn GenerativeProvider>>,
    timeout: Duration,
    history_turns: usize,
}

impl GenerativeResponder {
    pub fn new(primary: Arc<dyn GenerativeProvider>, timeout: Duration) -> Self {
        Self {
            primary,
            secondary: None,
            timeout,
            history_turns: 10,
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn GenerativeProvider>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Upper bound on conversation messages included in the prompt.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Generate a reply. Always returns a result with source `llm_generation`.
    pub async fn respond(
        &self,
        bot: &Bot,
        utterance: &str,
        documents: &[GroundingDocument],
        history: &[ConversationMessage],
    ) -> RouterResult {
        let window = &history[history.len().saturating_sub(self.history_turns)..];
        let request = CompletionRequest {
            system_prompt: build_system_prompt(bot, documents, window),
            user_message: utterance.to_string(),
            temperature: bot.routing.temperature,
            max_tokens: bot.routing.max_tokens,
        };
        let document_ids: Vec<Uuid> = documents.iter().map(|d| d.id).collect();

        let chain = std::iter::once(&self.primary).chain(self.secondary.iter());
        for provider in chain {
            match self.call(provider.as_ref(), &request).await {
                Ok(completion) => {
                    debug!(
                        bot_id = %bot.id,
                        provider = provider.name(),
                        model = %completion.model,
                        documents = document_ids.len(),
                        "Generation succeeded"
                    );
                    return RouterResult::from_source(
                        completion.text,
                        ResolutionSource::LlmGeneration,
                        GENERATION_CONFIDENCE,
                    )
                    .with_metadata(ResolutionMetadata {
                        provider: Some(provider.name().to_string()),
                        model: Some(completion.model),
                        document_ids,
                        ..Default::default()
                    });
                }
                Err(e) => {
                    warn!(
                        bot_id = %bot.id,
                        provider = provider.name(),
                        error = %e,
                        "Generation provider failed"
                    );
                }
            }
        }

        RouterResult::from_source(
            APOLOGY_MESSAGE,
            ResolutionSource::LlmGeneration,
            APOLOGY_CONFIDENCE,
        )
        .with_metadata(ResolutionMetadata {
            document_ids,
            ..Default::default()
        })
    }

    async fn call(
        &self,
        provider: &dyn GenerativeProvider,
        request: &CompletionRequest,
    ) -> Result<Completion, ProviderError> {
        let completion = tokio::time::timeout(self.timeout, provider.complete(request))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;
        if completion.text.trim().is_empty() {
            return Err(ProviderError::EmptyCompletion);
        }
        Ok(completion)
    }
}

/// System prompt from the bot persona, retrieved knowledge and recent turns.
pub fn build_system_prompt(
    bot: &Bot,
    documents: &[GroundingDocument],
    history: &[ConversationMessage],
) -> String {
    let mut prompt = format!("You are {}", bot.name);
    if !bot.description.is_empty() {
        let _ = write!(prompt, ", {}", bot.description);
    }
    prompt.push_str(".\n");
    if !bot.persona.is_empty() {
        let _ = writeln!(prompt, "Persona: {}", bot.persona);
    }
    if !bot.tone.is_empty() {
        let _ = writeln!(prompt, "Tone: {}", bot.tone);
    }
    prompt.push_str(
        "Answer the user's question using the knowledge below. \
         If the knowledge does not contain the answer, say so honestly instead of guessing.\n\n",
    );

    prompt.push_str("## Knowledge\n");
    if documents.is_empty() {
        prompt.push_str("No relevant context was retrieved from the knowledge base.\n");
    } else {
        let blocks: Vec<String> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| format!("[Document {}: {}]\n{}", i + 1, doc.title, doc.text))
            .collect();
        prompt.push_str(&blocks.join("\n---\n"));
        prompt.push('\n');
    }

    if !history.is_empty() {
        prompt.push_str("\n## Recent conversation\n");
        for message in history {
            let role = match message.sender {
                Sender::User => "User",
                Sender::Bot => "Assistant",
            };
            let _ = writeln!(prompt, "{}: {}", role, message.text);
        }
    }
    prompt
}
