//! Intent resolution against a bot's labeled training phrases.
//!
//! Intents are tried in descending priority. Within an intent, an exact
//! normalized match scores 1.0 and substring containment in either
//! direction 0.9; either ends the search for that intent. Otherwise the
//! best fuzzy phrase score is accepted at 0.5 or above, capped at 0.88 so
//! fuzzy matches never reach the literal range. The first intent with the
//! strictly highest confidence wins.

use rand::seq::IndexedRandom;
use tracing::debug;

use parlance_core::types::{Intent, MatchKind};

use crate::text::{normalize, phrase_match_score};

pub const EXACT_CONFIDENCE: f32 = 1.0;
pub const SUBSTRING_CONFIDENCE: f32 = 0.9;
pub const FUZZY_THRESHOLD: f64 = 0.5;
pub const FUZZY_CAP: f32 = 0.88;

/// The intent chosen for an utterance and the reply to send.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentMatch {
    pub intent_name: String,
    pub response_text: String,
    pub confidence: f32,
    pub kind: MatchKind,
    /// Training phrase that produced the match, as written.
    pub matched_phrase: String,
}

/// Matches utterances against intents. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentResolver;

struct Candidate<'a> {
    intent: &'a Intent,
    confidence: f32,
    kind: MatchKind,
    phrase: &'a str,
}

impl IntentResolver {
    pub fn new() -> Self {
        Self
    }

    /// Best intent for `utterance`, or `None` when nothing clears the threshold.
    pub fn resolve(&self, utterance: &str, intents: &[Intent]) -> Option<IntentMatch> {
        let input = normalize(utterance);
        if input.is_empty() {
            return None;
        }

        let mut ordered: Vec<&Intent> = intents
            .iter()
            .filter(|i| i.is_active && !i.responses.is_empty())
            .collect();
        // Stable, so equal priorities keep their given order.
        ordered.sort_by_key(|i| std::cmp::Reverse(i.priority));

        let mut best: Option<Candidate> = None;
        for intent in ordered {
            let Some(candidate) = Self::score_intent(&input, intent) else {
                continue;
            };
            if best
                .as_ref()
                .map_or(true, |b| candidate.confidence > b.confidence)
            {
                best = Some(candidate);
            }
        }

        let best = best?;
        let response_text = pick_response(best.intent)?;
        debug!(
            intent = %best.intent.name,
            confidence = best.confidence,
            kind = ?best.kind,
            "Intent matched"
        );
        Some(IntentMatch {
            intent_name: best.intent.name.clone(),
            response_text,
            confidence: best.confidence,
            kind: best.kind,
            matched_phrase: best.phrase.to_string(),
        })
    }

    fn score_intent<'a>(input: &str, intent: &'a Intent) -> Option<Candidate<'a>> {
        let phrases: Vec<(&'a str, String)> = intent
            .training_phrases
            .iter()
            .map(|p| (p.as_str(), normalize(p)))
            .filter(|(_, n)| !n.is_empty())
            .collect();

        if let Some((raw, _)) = phrases.iter().find(|(_, n)| n == input) {
            return Some(Candidate {
                intent,
                confidence: EXACT_CONFIDENCE,
                kind: MatchKind::Exact,
                phrase: *raw,
            });
        }

        if let Some((raw, _)) = phrases
            .iter()
            .find(|(_, n)| n.contains(input) || input.contains(n.as_str()))
        {
            return Some(Candidate {
                intent,
                confidence: SUBSTRING_CONFIDENCE,
                kind: MatchKind::Substring,
                phrase: *raw,
            });
        }

        let mut best: Option<(f64, &'a str)> = None;
        for (raw, normalized) in &phrases {
            let score = phrase_match_score(input, normalized);
            if score >= FUZZY_THRESHOLD && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, *raw));
            }
        }

        best.map(|(score, raw)| Candidate {
            intent,
            confidence: (score as f32).min(FUZZY_CAP),
            kind: MatchKind::Fuzzy,
            phrase: raw,
        })
    }
}

/// First response text, or a uniform pick among it and its variations.
fn pick_response(intent: &Intent) -> Option<String> {
    let primary = intent.responses.first()?;
    if primary.variations.is_empty() {
        return Some(primary.text.clone());
    }
    let mut options: Vec<&String> = Vec::with_capacity(primary.variations.len() + 1);
    options.push(&primary.text);
    options.extend(primary.variations.iter());
    options.choose(&mut rand::rng()).map(|s| (*s).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_core::types::IntentResponse;

    fn intent(name: &str, phrases: &[&str], response: &str, priority: i32) -> Intent {
        Intent {
            name: name.to_string(),
            display_name: name.to_string(),
            training_phrases: phrases.iter().map(|p| p.to_string()).collect(),
            responses: vec![IntentResponse::new(response)],
            priority,
            is_active: true,
        }
    }

    #[test]
    fn test_exact_match_full_confidence() {
        let intents = vec![intent("hours", &["What are your opening hours?"], "9 to 5", 0)];
        let m = IntentResolver::new()
            .resolve("what are your OPENING hours", &intents)
            .unwrap();
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.kind, MatchKind::Exact);
        assert_eq!(m.response_text, "9 to 5");
        assert_eq!(m.matched_phrase, "What are your opening hours?");
    }

    #[test]
    fn test_exact_beats_earlier_substring_phrase() {
        let intents = vec![intent(
            "greeting",
            &["hello there friend", "hello there"],
            "Hi!",
            0,
        )];
        let m = IntentResolver::new().resolve("hello there", &intents).unwrap();
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.kind, MatchKind::Exact);
    }

    #[test]
    fn test_substring_either_direction() {
        let intents = vec![intent("refund", &["refund policy"], "30 days", 0)];
        let resolver = IntentResolver::new();

        let longer = resolver
            .resolve("tell me about your refund policy", &intents)
            .unwrap();
        assert_eq!(longer.confidence, 0.9);
        assert_eq!(longer.kind, MatchKind::Substring);

        let shorter = resolver.resolve("refund", &intents).unwrap();
        assert_eq!(shorter.confidence, 0.9);
    }

    #[test]
    fn test_fuzzy_typo_capped() {
        let intents = vec![intent(
            "courses",
            &["What are the courses available"],
            "We offer Rust and Go.",
            0,
        )];
        let m = IntentResolver::new()
            .resolve("What are the cources available", &intents)
            .unwrap();
        assert!(m.confidence >= 0.5);
        assert!(m.confidence < 0.9);
        assert_eq!(m.confidence, FUZZY_CAP);
        assert_eq!(m.kind, MatchKind::Fuzzy);
    }

    #[test]
    fn test_no_match_returns_none() {
        let intents = vec![intent("hours", &["opening hours"], "9 to 5", 0)];
        assert!(IntentResolver::new()
            .resolve("xq zzv plork", &intents)
            .is_none());
        assert!(IntentResolver::new().resolve("   ", &intents).is_none());
        assert!(IntentResolver::new().resolve("hours", &[]).is_none());
    }

    #[test]
    fn test_priority_wins_ties() {
        let intents = vec![
            intent("low", &["reset password"], "low", 1),
            intent("high", &["reset password"], "high", 5),
        ];
        let m = IntentResolver::new()
            .resolve("reset password", &intents)
            .unwrap();
        assert_eq!(m.intent_name, "high");
    }

    #[test]
    fn test_equal_priority_keeps_input_order() {
        let intents = vec![
            intent("first", &["track order"], "first", 0),
            intent("second", &["track order"], "second", 0),
        ];
        let m = IntentResolver::new().resolve("track order", &intents).unwrap();
        assert_eq!(m.intent_name, "first");
    }

    #[test]
    fn test_higher_confidence_beats_priority() {
        let intents = vec![
            intent("near", &["track my orders"], "near", 10),
            intent("exact", &["track my order"], "exact", 0),
        ];
        let m = IntentResolver::new()
            .resolve("track my order", &intents)
            .unwrap();
        assert_eq!(m.intent_name, "exact");
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn test_inactive_and_responseless_intents_skipped() {
        let mut inactive = intent("inactive", &["hello"], "nope", 10);
        inactive.is_active = false;
        let mut silent = intent("silent", &["hello"], "nope", 9);
        silent.responses.clear();
        let active = intent("active", &["hello"], "Hi!", 0);

        let m = IntentResolver::new()
            .resolve("hello", &[inactive, silent, active])
            .unwrap();
        assert_eq!(m.intent_name, "active");
    }

    #[test]
    fn test_empty_phrases_ignored() {
        let intents = vec![intent("blank", &["", "?!"], "never", 0)];
        assert!(IntentResolver::new()
            .resolve("anything at all", &intents)
            .is_none());
    }

    #[test]
    fn test_variations_are_picked_from_pool() {
        let mut greeting = intent("greeting", &["hello"], "Hello!", 0);
        greeting.responses[0].variations = vec!["Hi!".to_string(), "Hey!".to_string()];
        let pool = ["Hello!", "Hi!", "Hey!"];
        for _ in 0..20 {
            let m = IntentResolver::new()
                .resolve("hello", std::slice::from_ref(&greeting))
                .unwrap();
            assert!(pool.contains(&m.response_text.as_str()));
        }
    }
}
