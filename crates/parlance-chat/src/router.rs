//! The routing policy engine.
//!
//! `Router::resolve` is the single entry point of the resolution engine. It
//! validates the utterance, loads the bot, then applies the bot's routing
//! mode over three strategies:
//!
//! - deterministic path: intent resolver, then lexical knowledge, then the
//!   bot's fallback message
//! - generative path: grounded generation with provider fallback
//!
//! Without a generative responder every mode runs the deterministic path
//! and the result is flagged `degraded`.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use parlance_core::config::{LexicalStrategy, RouterSettings};
use parlance_core::store::{BotStore, ConversationStore, UnrecognizedQueryStore};
use parlance_core::types::{
    Bot, ConversationMessage, ResolutionMetadata, ResolutionSource, RouterResult, RoutingMode,
};
use parlance_vector::{VectorRetriever, VectorSearchParams};

use crate::error::ChatError;
use crate::generation::{GenerativeResponder, GroundingDocument};
use crate::intent::IntentResolver;
use crate::lexical::LexicalRetriever;
use crate::unrecognized::UnrecognizedQueryLogger;

/// Default number of retrieved chunks placed in a generation prompt.
pub const DEFAULT_GROUNDING_LIMIT: usize = 5;

/// Resolves utterances to replies for any bot in the store.
pub struct Router {
    bots: Arc<dyn BotStore>,
    conversations: Arc<dyn ConversationStore>,
    unrecognized: UnrecognizedQueryLogger,
    settings: RouterSettings,
    intents: IntentResolver,
    lexical: LexicalRetriever,
    grounding_limit: usize,
    generator: Option<GenerativeResponder>,
    vector: Option<(VectorRetriever, VectorSearchParams)>,
}

impl Router {
    pub fn new(
        bots: Arc<dyn BotStore>,
        conversations: Arc<dyn ConversationStore>,
        unrecognized: Arc<dyn UnrecognizedQueryStore>,
    ) -> Self {
        Self {
            bots,
            conversations,
            unrecognized: UnrecognizedQueryLogger::new(unrecognized),
            settings: RouterSettings::default(),
            intents: IntentResolver::new(),
            lexical: LexicalRetriever::default(),
            grounding_limit: DEFAULT_GROUNDING_LIMIT,
            generator: None,
            vector: None,
        }
    }

    pub fn with_settings(mut self, settings: RouterSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_lexical_strategy(mut self, strategy: LexicalStrategy) -> Self {
        self.lexical = LexicalRetriever::new(strategy);
        self
    }

    pub fn with_grounding_limit(mut self, limit: usize) -> Self {
        self.grounding_limit = limit;
        self
    }

    /// Enable the generative path.
    pub fn with_generator(mut self, generator: GenerativeResponder) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Ground generations with vector search for bots that enable it.
    pub fn with_vector_retriever(
        mut self,
        retriever: VectorRetriever,
        params: VectorSearchParams,
    ) -> Self {
        self.vector = Some((retriever, params));
        self
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Produce the single best reply for `utterance`.
    ///
    /// Only invalid input, unknown or inactive bots and storage failures
    /// are errors. "I don't know" is a fallback result, never an error.
    pub async fn resolve(
        &self,
        bot_id: Uuid,
        utterance: &str,
        session_id: Option<&str>,
    ) -> Result<RouterResult, ChatError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if utterance.chars().count() > self.settings.max_message_length {
            return Err(ChatError::MessageTooLong(self.settings.max_message_length));
        }

        let bot = match self.bots.find_bot(bot_id).await? {
            Some(bot) if bot.is_active => bot,
            _ => return Err(ChatError::BotNotFound(bot_id)),
        };
        let mode = bot.routing.mode;

        let mut result = match (&self.generator, mode) {
            (None, _) | (_, RoutingMode::IntentOnly) => {
                let mut result = self.resolve_deterministic(&bot, utterance).await?;
                if mode != RoutingMode::IntentOnly {
                    debug!(%bot_id, mode = mode.as_str(), "No generative provider, degrading");
                    result.metadata_mut().degraded = true;
                }
                result
            }
            (Some(generator), RoutingMode::LlmFirst) => {
                let generated = self
                    .generate(generator, &bot, utterance, session_id)
                    .await?;
                if generated.confidence >= self.settings.llm_first_min_confidence
                    || !bot.routing.fallback_enabled
                {
                    generated
                } else {
                    debug!(
                        %bot_id,
                        confidence = generated.confidence,
                        "Generation below threshold, using deterministic path"
                    );
                    self.resolve_deterministic(&bot, utterance).await?
                }
            }
            (Some(generator), RoutingMode::Hybrid) => {
                let deterministic = self.resolve_deterministic(&bot, utterance).await?;
                if deterministic.confidence >= bot.routing.acceptance_threshold
                    && !deterministic.is_fallback()
                {
                    deterministic
                } else {
                    debug!(
                        %bot_id,
                        confidence = deterministic.confidence,
                        threshold = bot.routing.acceptance_threshold,
                        "Deterministic answer not accepted, generating"
                    );
                    self.generate(generator, &bot, utterance, session_id)
                        .await?
                }
            }
        };

        result.metadata_mut().mode = Some(mode);
        debug!(
            %bot_id,
            mode = mode.as_str(),
            source = result.source.as_str(),
            confidence = result.confidence,
            "Utterance resolved"
        );
        Ok(result)
    }

    /// Intent resolver, then lexical knowledge, then the fallback message.
    async fn resolve_deterministic(
        &self,
        bot: &Bot,
        utterance: &str,
    ) -> Result<RouterResult, ChatError> {
        let intents = self.bots.find_active_intents(bot.id).await?;
        if let Some(m) = self.intents.resolve(utterance, &intents) {
            return Ok(
                RouterResult::from_intent(m.response_text, m.intent_name, m.confidence)
                    .with_metadata(ResolutionMetadata {
                        matched_phrase: Some(m.matched_phrase),
                        match_kind: Some(m.kind),
                        ..Default::default()
                    }),
            );
        }

        let chunks = self.bots.find_active_completed_chunks(bot.id).await?;
        if let Some(m) = self.lexical.retrieve(utterance, &chunks) {
            return Ok(RouterResult::from_source(
                m.chunk.text,
                ResolutionSource::KnowledgeBase,
                m.confidence,
            )
            .with_metadata(ResolutionMetadata {
                chunk_id: Some(m.chunk.id),
                chunk_title: Some(m.chunk.metadata.title),
                ..Default::default()
            }));
        }

        self.unrecognized.record(bot.id, utterance);
        Ok(RouterResult::fallback(bot.fallback_message.clone()))
    }

    async fn generate(
        &self,
        generator: &GenerativeResponder,
        bot: &Bot,
        utterance: &str,
        session_id: Option<&str>,
    ) -> Result<RouterResult, ChatError> {
        let documents = self.grounding(bot, utterance).await?;
        let history = self.load_history(bot, session_id).await;
        Ok(generator
            .respond(bot, utterance, &documents, &history)
            .await)
    }

    /// Vector hits when the bot enables vector search and a retriever is
    /// configured, lexical ranking otherwise. An empty vector result is
    /// final.
    async fn grounding(
        &self,
        bot: &Bot,
        utterance: &str,
    ) -> Result<Vec<GroundingDocument>, ChatError> {
        if bot.routing.use_vector_search {
            if let Some((retriever, params)) = &self.vector {
                let hits = retriever.retrieve(bot.id, utterance, *params).await;
                return Ok(hits
                    .into_iter()
                    .take(self.grounding_limit)
                    .map(|hit| GroundingDocument {
                        id: hit.chunk_id,
                        title: hit.metadata.title,
                        text: hit.text,
                    })
                    .collect());
            }
        }

        let chunks = self.bots.find_active_completed_chunks(bot.id).await?;
        Ok(self
            .lexical
            .retrieve_ranked(utterance, &chunks, self.grounding_limit)
            .into_iter()
            .map(|m| GroundingDocument {
                id: m.chunk.id,
                title: m.chunk.metadata.title,
                text: m.chunk.text,
            })
            .collect())
    }

    async fn load_history(&self, bot: &Bot, session_id: Option<&str>) -> Vec<ConversationMessage> {
        let Some(session_id) = session_id else {
            return Vec::new();
        };
        match self
            .conversations
            .load_recent_messages(bot.id, session_id, bot.routing.context_messages)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(bot_id = %bot.id, session_id, error = %e, "Failed to load conversation context");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use parlance_core::error::{ParlanceError, Result as CoreResult};
    use parlance_core::store::MemoryStore;
    use parlance_core::types::{ChunkMetadata, Intent, IntentResponse, KnowledgeChunk, MatchKind};
    use parlance_vector::{EmbeddingProvider, MockEmbedding, VectorIndex, VectorRecord, VectorStore};

    use crate::error::ProviderError;
    use crate::generation::{
        Completion, CompletionRequest, GenerativeProvider, APOLOGY_MESSAGE,
    };

    // ---- Fakes ----

    struct ScriptedProvider {
        reply: Option<String>,
        calls: AtomicUsize,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_prompt(&self) -> String {
            self.last_request
                .lock()
                .unwrap()
                .as_ref()
                .map(|r| r.system_prompt.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl GenerativeProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<Completion, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            match &self.reply {
                Some(text) => Ok(Completion {
                    text: text.clone(),
                    model: "scripted-1".to_string(),
                }),
                None => Err(ProviderError::Api {
                    status: 503,
                    message: "overloaded".to_string(),
                }),
            }
        }
    }

    /// Counts intent lookups to prove the deterministic path did not run.
    struct CountingBotStore {
        inner: Arc<MemoryStore>,
        intent_lookups: AtomicUsize,
    }

    #[async_trait]
    impl BotStore for CountingBotStore {
        async fn find_bot(&self, bot_id: Uuid) -> CoreResult<Option<Bot>> {
            self.inner.find_bot(bot_id).await
        }

        async fn find_active_intents(&self, bot_id: Uuid) -> CoreResult<Vec<Intent>> {
            self.intent_lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_active_intents(bot_id).await
        }

        async fn find_active_completed_chunks(
            &self,
            bot_id: Uuid,
        ) -> CoreResult<Vec<KnowledgeChunk>> {
            self.inner.find_active_completed_chunks(bot_id).await
        }
    }

    struct BrokenConversations;

    #[async_trait]
    impl ConversationStore for BrokenConversations {
        async fn load_recent_messages(
            &self,
            _bot_id: Uuid,
            _session_id: &str,
            _limit: usize,
        ) -> CoreResult<Vec<ConversationMessage>> {
            Err(ParlanceError::Storage("connection reset".to_string()))
        }

        async fn append_message(
            &self,
            _bot_id: Uuid,
            _session_id: &str,
            _message: ConversationMessage,
        ) -> CoreResult<()> {
            Ok(())
        }
    }

    // ---- Fixtures ----

    fn seeded_store(mode: RoutingMode) -> (Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let mut bot = Bot::new("Ada");
        bot.routing.mode = mode;
        bot.fallback_message = "Sorry, I don't know that one.".to_string();
        let bot_id = bot.id;
        store.insert_bot(bot).unwrap();

        store
            .insert_intent(
                bot_id,
                Intent {
                    name: "hours".to_string(),
                    display_name: "Opening hours".to_string(),
                    training_phrases: vec![
                        "What are your opening hours".to_string(),
                        "When are you open".to_string(),
                    ],
                    responses: vec![IntentResponse::new("We are open 9 to 5.")],
                    priority: 0,
                    is_active: true,
                },
            )
            .unwrap();
        store
            .insert_intent(
                bot_id,
                Intent {
                    name: "courses".to_string(),
                    display_name: "Courses".to_string(),
                    training_phrases: vec!["What are the courses available".to_string()],
                    responses: vec![IntentResponse::new("We offer Rust and Go.")],
                    priority: 0,
                    is_active: true,
                },
            )
            .unwrap();
        store
            .insert_chunk(
                bot_id,
                KnowledgeChunk {
                    id: Uuid::new_v4(),
                    text: "Refunds are processed within five business days.".to_string(),
                    metadata: ChunkMetadata {
                        title: "Refund policy".to_string(),
                        source: "refunds.md".to_string(),
                        chunk_index: 0,
                    },
                    embedding: None,
                },
            )
            .unwrap();
        (store, bot_id)
    }

    fn router_over(store: &Arc<MemoryStore>) -> Router {
        Router::new(store.clone(), store.clone(), store.clone())
    }

    fn generator(provider: Arc<ScriptedProvider>) -> GenerativeResponder {
        GenerativeResponder::new(provider, Duration::from_secs(5))
    }

    /// Let detached logger tasks run to completion.
    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    // ---- Validation ----

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (store, bot_id) = seeded_store(RoutingMode::IntentOnly);
        let router = router_over(&store);
        assert!(matches!(
            router.resolve(bot_id, "   \n\t", None).await,
            Err(ChatError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn test_long_message_rejected() {
        let (store, bot_id) = seeded_store(RoutingMode::IntentOnly);
        let router = router_over(&store).with_settings(RouterSettings {
            max_message_length: 10,
            ..Default::default()
        });
        assert!(matches!(
            router.resolve(bot_id, "this is far too long", None).await,
            Err(ChatError::MessageTooLong(10))
        ));
        assert!(router.resolve(bot_id, "  hours  ", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_bots() {
        let (store, bot_id) = seeded_store(RoutingMode::IntentOnly);
        let router = router_over(&store);
        let missing = Uuid::new_v4();
        assert!(matches!(
            router.resolve(missing, "hello", None).await,
            Err(ChatError::BotNotFound(id)) if id == missing
        ));

        let mut bot = store.find_bot(bot_id).await.unwrap().unwrap();
        bot.is_active = false;
        store.insert_bot(bot).unwrap();
        assert!(matches!(
            router.resolve(bot_id, "hello", None).await,
            Err(ChatError::BotNotFound(_))
        ));
    }

    // ---- Deterministic path ----

    #[tokio::test]
    async fn test_intent_only_exact_match() {
        let (store, bot_id) = seeded_store(RoutingMode::IntentOnly);
        let result = router_over(&store)
            .resolve(bot_id, "what are your opening hours?", None)
            .await
            .unwrap();
        assert_eq!(result.response_text, "We are open 9 to 5.");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.source, ResolutionSource::Intent);
        assert_eq!(result.intent.as_deref(), Some("hours"));
        let meta = result.metadata.unwrap();
        assert_eq!(meta.match_kind, Some(MatchKind::Exact));
        assert_eq!(meta.mode, Some(RoutingMode::IntentOnly));
        assert!(!meta.degraded);
    }

    #[tokio::test]
    async fn test_fuzzy_intent_confidence_range() {
        let (store, bot_id) = seeded_store(RoutingMode::IntentOnly);
        let result = router_over(&store)
            .resolve(bot_id, "What are the cources available", None)
            .await
            .unwrap();
        assert_eq!(result.source, ResolutionSource::Intent);
        assert!(result.confidence >= 0.5 && result.confidence < 0.9);
    }

    #[tokio::test]
    async fn test_lexical_knowledge_answer() {
        let (store, bot_id) = seeded_store(RoutingMode::IntentOnly);
        let result = router_over(&store)
            .resolve(bot_id, "how long do refunds take to be processed", None)
            .await
            .unwrap();
        assert_eq!(result.source, ResolutionSource::KnowledgeBase);
        assert_eq!(result.confidence, 0.7);
        assert!(result.intent.is_none());
        assert_eq!(
            result.response_text,
            "Refunds are processed within five business days."
        );
        assert_eq!(
            result.metadata.unwrap().chunk_title.as_deref(),
            Some("Refund policy")
        );
    }

    #[tokio::test]
    async fn test_no_match_falls_back_and_logs() {
        let (store, bot_id) = seeded_store(RoutingMode::IntentOnly);
        let result = router_over(&store)
            .resolve(bot_id, "  xq zzv plork  ", None)
            .await
            .unwrap();
        assert_eq!(result.source, ResolutionSource::Fallback);
        assert_eq!(result.confidence, 0.0);
        assert!(result.intent.is_none());
        assert_eq!(result.response_text, "Sorry, I don't know that one.");

        settle().await;
        let logged = store.list(bot_id, 10).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].text, "xq zzv plork");
    }

    // ---- Modes ----

    #[tokio::test]
    async fn test_hybrid_accepts_confident_intent_without_generation() {
        let (store, bot_id) = seeded_store(RoutingMode::Hybrid);
        let provider = ScriptedProvider::replying("generated");
        let router = router_over(&store).with_generator(generator(provider.clone()));

        let result = router
            .resolve(bot_id, "When are you open", None)
            .await
            .unwrap();
        assert_eq!(result.source, ResolutionSource::Intent);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_hybrid_below_threshold_generates_once() {
        let (store, bot_id) = seeded_store(RoutingMode::Hybrid);
        let mut bot = store.find_bot(bot_id).await.unwrap().unwrap();
        bot.routing.acceptance_threshold = 0.95;
        store.insert_bot(bot).unwrap();

        let provider = ScriptedProvider::replying("Our catalogue lists Rust and Go.");
        let router = router_over(&store).with_generator(generator(provider.clone()));

        let result = router
            .resolve(bot_id, "What are the cources available", None)
            .await
            .unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(result.source, ResolutionSource::LlmGeneration);
        assert_eq!(result.response_text, "Our catalogue lists Rust and Go.");
        assert_eq!(result.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_hybrid_gibberish_generates() {
        let (store, bot_id) = seeded_store(RoutingMode::Hybrid);
        let provider = ScriptedProvider::replying("I can help with hours and refunds.");
        let router = router_over(&store).with_generator(generator(provider.clone()));

        let result = router.resolve(bot_id, "xq zzv plork", None).await.unwrap();
        assert_eq!(result.source, ResolutionSource::LlmGeneration);
        assert_eq!(result.response_text, "I can help with hours and refunds.");
        assert_eq!(provider.calls(), 1);
        let meta = result.metadata.unwrap();
        assert_eq!(meta.provider.as_deref(), Some("scripted"));
        assert_eq!(meta.mode, Some(RoutingMode::Hybrid));

        // The deterministic miss is still recorded.
        settle().await;
        assert_eq!(store.list(bot_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hybrid_accepts_knowledge_answer_at_default_threshold() {
        let (store, bot_id) = seeded_store(RoutingMode::Hybrid);
        let provider = ScriptedProvider::replying("generated");
        let router = router_over(&store).with_generator(generator(provider.clone()));

        // Lexical confidence equals the default acceptance threshold of 0.7.
        let result = router
            .resolve(bot_id, "how long do refunds take to be processed", None)
            .await
            .unwrap();
        assert_eq!(result.source, ResolutionSource::KnowledgeBase);
        assert_eq!(result.confidence, 0.7);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_hybrid_function_words_alone_reach_knowledge_answer() {
        let (store, bot_id) = seeded_store(RoutingMode::Hybrid);
        store
            .insert_chunk(
                bot_id,
                KnowledgeChunk {
                    id: Uuid::new_v4(),
                    text: "This is the place where the team meets on Mondays.".to_string(),
                    metadata: ChunkMetadata::default(),
                    embedding: None,
                },
            )
            .unwrap();
        let provider = ScriptedProvider::replying("generated");
        let router = router_over(&store).with_generator(generator(provider.clone()));

        // Tokens match by literal containment: "is" inside "this", and "the".
        let result = router
            .resolve(bot_id, "what is the capital of france", None)
            .await
            .unwrap();
        assert_eq!(result.source, ResolutionSource::KnowledgeBase);
        assert_eq!(
            result.response_text,
            "This is the place where the team meets on Mondays."
        );
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_hybrid_stricter_threshold_generates_over_knowledge_answer() {
        let (store, bot_id) = seeded_store(RoutingMode::Hybrid);
        let mut bot = store.find_bot(bot_id).await.unwrap().unwrap();
        bot.routing.acceptance_threshold = 0.75;
        store.insert_bot(bot).unwrap();

        let provider = ScriptedProvider::replying("Refunds usually take under a week.");
        let router = router_over(&store).with_generator(generator(provider.clone()));

        let result = router
            .resolve(bot_id, "how long do refunds take to be processed", None)
            .await
            .unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(result.source, ResolutionSource::LlmGeneration);
        assert_eq!(result.response_text, "Refunds usually take under a week.");

        // A knowledge answer is a match, so nothing is logged as unrecognized.
        settle().await;
        assert!(store.list(bot_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_llm_first_returns_generation() {
        let (store, bot_id) = seeded_store(RoutingMode::LlmFirst);
        let provider = ScriptedProvider::replying("Generated hours answer.");
        let router = router_over(&store).with_generator(generator(provider.clone()));

        let result = router
            .resolve(bot_id, "What are your opening hours", None)
            .await
            .unwrap();
        assert_eq!(result.source, ResolutionSource::LlmGeneration);
        assert_eq!(result.response_text, "Generated hours answer.");
    }

    #[tokio::test]
    async fn test_llm_first_low_confidence_uses_deterministic() {
        let (store, bot_id) = seeded_store(RoutingMode::LlmFirst);
        let provider = ScriptedProvider::failing();
        let router = router_over(&store).with_generator(generator(provider.clone()));

        let result = router
            .resolve(bot_id, "What are your opening hours", None)
            .await
            .unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(result.source, ResolutionSource::Intent);
        assert_eq!(result.response_text, "We are open 9 to 5.");
    }

    #[tokio::test]
    async fn test_llm_first_without_fallback_returns_apology() {
        let (memory, bot_id) = seeded_store(RoutingMode::LlmFirst);
        let mut bot = memory.find_bot(bot_id).await.unwrap().unwrap();
        bot.routing.fallback_enabled = false;
        memory.insert_bot(bot).unwrap();

        let bots = Arc::new(CountingBotStore {
            inner: memory.clone(),
            intent_lookups: AtomicUsize::new(0),
        });
        let provider = ScriptedProvider::failing();
        let router = Router::new(bots.clone(), memory.clone(), memory.clone())
            .with_generator(generator(provider));

        let result = router
            .resolve(bot_id, "What are your opening hours", None)
            .await
            .unwrap();
        assert_eq!(result.source, ResolutionSource::LlmGeneration);
        assert_eq!(result.confidence, 0.3);
        assert_eq!(result.response_text, APOLOGY_MESSAGE);
        assert_eq!(bots.intent_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_llm_first_without_provider_degrades() {
        let (store, bot_id) = seeded_store(RoutingMode::LlmFirst);
        let router = router_over(&store);
        assert!(!router.has_generator());

        let result = router
            .resolve(bot_id, "When are you open", None)
            .await
            .unwrap();
        assert_eq!(result.source, ResolutionSource::Intent);
        assert_eq!(result.response_text, "We are open 9 to 5.");
        let meta = result.metadata.unwrap();
        assert!(meta.degraded);
        assert_eq!(meta.mode, Some(RoutingMode::LlmFirst));
    }

    // ---- Grounding and context ----

    #[tokio::test]
    async fn test_generation_grounded_lexically_with_history() {
        let (store, bot_id) = seeded_store(RoutingMode::LlmFirst);
        store
            .append_message(bot_id, "s1", ConversationMessage::user("I bought a kettle"))
            .await
            .unwrap();

        let provider = ScriptedProvider::replying("Five business days.");
        let router = router_over(&store).with_generator(generator(provider.clone()));

        let result = router
            .resolve(bot_id, "when will my refund be processed", Some("s1"))
            .await
            .unwrap();
        let prompt = provider.last_prompt();
        assert!(prompt.contains("Refunds are processed within five business days."));
        assert!(prompt.contains("I bought a kettle"));
        assert_eq!(result.metadata.unwrap().document_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_generation_grounded_by_vector_search() {
        let (store, bot_id) = seeded_store(RoutingMode::LlmFirst);
        let embedder = Arc::new(MockEmbedding::new());
        let index = Arc::new(VectorIndex::new());
        let chunk_id = Uuid::new_v4();
        let text = "Gift cards never expire and can be used online.";
        index
            .upsert(
                bot_id,
                vec![VectorRecord {
                    id: chunk_id,
                    embedding: embedder.embed(text).await.unwrap(),
                    text: text.to_string(),
                    metadata: ChunkMetadata {
                        title: "Gift cards".to_string(),
                        ..Default::default()
                    },
                }],
            )
            .await
            .unwrap();

        let provider = ScriptedProvider::replying("They never expire.");
        let router = router_over(&store)
            .with_generator(generator(provider.clone()))
            .with_vector_retriever(
                VectorRetriever::new(embedder, index, Duration::from_secs(5)),
                VectorSearchParams::default(),
            );

        let result = router.resolve(bot_id, text, None).await.unwrap();
        assert!(provider.last_prompt().contains("[Document 1: Gift cards]"));
        assert_eq!(result.metadata.unwrap().document_ids, vec![chunk_id]);
    }

    #[tokio::test]
    async fn test_context_failure_treated_as_empty() {
        let (store, bot_id) = seeded_store(RoutingMode::LlmFirst);
        let provider = ScriptedProvider::replying("Still answering.");
        let router = Router::new(store.clone(), Arc::new(BrokenConversations), store.clone())
            .with_generator(generator(provider.clone()));

        let result = router
            .resolve(bot_id, "anything at all", Some("s1"))
            .await
            .unwrap();
        assert_eq!(result.response_text, "Still answering.");
        assert_eq!(provider.calls(), 1);
    }
}
