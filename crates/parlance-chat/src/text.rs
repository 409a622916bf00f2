//! Text normalization and edit-distance similarity scoring.
//!
//! Everything here is pure. The fuzzy matchers in `intent` and `lexical`
//! are built on [`similarity`] and [`phrase_match_score`].

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Minimum word similarity for two words to count as the same word.
pub const WORD_MATCH_THRESHOLD: f64 = 0.75;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("Invalid non-word regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "is", "are", "was", "were", "be", "am", "i", "me", "my", "you", "your",
        "we", "our", "it", "its", "to", "of", "in", "on", "at", "for", "with", "and", "or", "do",
        "does", "did", "can", "could", "would", "should", "will", "what", "how", "this", "that",
        "there", "please",
    ]
    .into_iter()
    .collect()
});

/// Lowercase, turn non-word characters into spaces, collapse whitespace, trim.
pub fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let spaced = NON_WORD.replace_all(&lower, " ");
    WHITESPACE.replace_all(&spaced, " ").trim().to_string()
}

/// Character-level Levenshtein edit distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - levenshtein / max length`, in [0, 1]. Equal strings score 1.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Fraction of input words that have a phrase word at or above
/// [`WORD_MATCH_THRESHOLD`] similarity. Empty input scores 0.
pub fn word_overlap_score(input_words: &[&str], phrase_words: &[&str]) -> f64 {
    if input_words.is_empty() {
        return 0.0;
    }
    let matched = input_words
        .iter()
        .filter(|w| {
            phrase_words
                .iter()
                .any(|p| similarity(w, p) >= WORD_MATCH_THRESHOLD)
        })
        .count();
    matched as f64 / input_words.len() as f64
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

/// Words of `s` without stopwords, or all words when every one is a stopword.
pub fn content_words(s: &str) -> Vec<&str> {
    let words: Vec<&str> = s.split_whitespace().collect();
    let filtered: Vec<&str> = words.iter().copied().filter(|w| !is_stopword(w)).collect();
    if filtered.is_empty() {
        words
    } else {
        filtered
    }
}

/// Best of stopword-filtered word overlap and whole-string similarity.
///
/// Both arguments are expected to be normalized already.
pub fn phrase_match_score(input: &str, phrase: &str) -> f64 {
    let overlap = word_overlap_score(&content_words(input), &content_words(phrase));
    overlap.max(similarity(input, phrase))
}
