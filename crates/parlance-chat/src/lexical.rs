//! Keyword retrieval over a bot's knowledge chunks.
//!
//! A query token matches a chunk when it appears literally in the
//! normalized chunk text or a chunk word is a close fuzzy match. A chunk
//! qualifies once `min(2, token count)` tokens match.

use tracing::debug;

use parlance_core::config::LexicalStrategy;
use parlance_core::types::KnowledgeChunk;

use crate::text::{normalize, similarity, WORD_MATCH_THRESHOLD};

/// Fixed confidence of a lexical knowledge answer.
pub const LEXICAL_CONFIDENCE: f32 = 0.7;

/// A chunk that qualified for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalMatch {
    pub chunk: KnowledgeChunk,
    pub match_count: usize,
    pub confidence: f32,
}

/// Finds knowledge chunks sharing enough words with a query.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalRetriever {
    strategy: LexicalStrategy,
}

impl LexicalRetriever {
    pub fn new(strategy: LexicalStrategy) -> Self {
        Self { strategy }
    }

    /// The single chunk to answer with.
    ///
    /// `FirstMatch` returns the first qualifying chunk in storage order;
    /// `BestScore` the one with the most matching tokens, ties in storage order.
    pub fn retrieve(&self, query: &str, chunks: &[KnowledgeChunk]) -> Option<LexicalMatch> {
        let tokens = query_tokens(query);
        if tokens.is_empty() {
            return None;
        }
        let required = tokens.len().min(2);

        let mut best: Option<(usize, &KnowledgeChunk)> = None;
        for chunk in chunks {
            let count = match_count(&tokens, &chunk.text);
            if count < required {
                continue;
            }
            match self.strategy {
                LexicalStrategy::FirstMatch => {
                    best = Some((count, chunk));
                    break;
                }
                LexicalStrategy::BestScore => {
                    if best.map_or(true, |(c, _)| count > c) {
                        best = Some((count, chunk));
                    }
                }
            }
        }

        let (match_count, chunk) = best?;
        debug!(
            chunk_id = %chunk.id,
            match_count,
            strategy = ?self.strategy,
            "Knowledge chunk matched"
        );
        Some(LexicalMatch {
            chunk: chunk.clone(),
            match_count,
            confidence: LEXICAL_CONFIDENCE,
        })
    }

    /// Every qualifying chunk ranked by match count, ties in storage order.
    pub fn retrieve_ranked(
        &self,
        query: &str,
        chunks: &[KnowledgeChunk],
        limit: usize,
    ) -> Vec<LexicalMatch> {
        let tokens = query_tokens(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        let required = tokens.len().min(2);

        let mut matches: Vec<LexicalMatch> = chunks
            .iter()
            .filter_map(|chunk| {
                let count = match_count(&tokens, &chunk.text);
                (count >= required).then(|| LexicalMatch {
                    chunk: chunk.clone(),
                    match_count: count,
                    confidence: LEXICAL_CONFIDENCE,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.match_count.cmp(&a.match_count));
        matches.truncate(limit);
        matches
    }
}

/// Normalized query words of at least two characters.
fn query_tokens(query: &str) -> Vec<String> {
    normalize(query)
        .split_whitespace()
        .filter(|w| w.chars().count() >= 2)
        .map(String::from)
        .collect()
}

fn match_count(tokens: &[String], chunk_text: &str) -> usize {
    let text = normalize(chunk_text);
    let words: Vec<&str> = text.split_whitespace().collect();
    tokens
        .iter()
        .filter(|token| {
            text.contains(token.as_str())
                || words
                    .iter()
                    .any(|w| similarity(token, w) >= WORD_MATCH_THRESHOLD)
        })
        .count()
}
