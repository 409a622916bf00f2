//! Recursive separator-based text chunking.
//!
//! Text is split on the coarsest separator present (paragraph, line,
//! sentence, word, then single characters). Pieces that still exceed the
//! target size are split again with the next separator, and small pieces
//! are merged back together with a trailing overlap carried into the next
//! chunk. Sizes are measured in characters.

use std::collections::VecDeque;

const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Splits documents into overlapping chunks of bounded size.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl RecursiveChunker {
    /// Create a chunker. The overlap is clamped below the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty chunks in document order.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let (separator, remaining) = match separators.get(position) {
            Some(sep) => (sep.as_str(), &separators[position + 1..]),
            None => ("", &separators[..0]),
        };

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, keeping up to `chunk_overlap`
    /// characters of trailing pieces at the start of the next chunk.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>, total: usize| {
                total + len + if window.is_empty() { 0 } else { sep_len }
            };

            if joined_len(&window, total) > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window, separator);
                while !window.is_empty()
                    && (total > self.chunk_overlap || joined_len(&window, total) > self.chunk_size)
                {
                    if let Some(front) = window.pop_front() {
                        total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                    }
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }
        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = RecursiveChunker::default();
        let chunks = chunker.split("  Opening hours are 9 to 5.  ");
        assert_eq!(chunks, vec!["Opening hours are 9 to 5.".to_string()]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let chunker = RecursiveChunker::default();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("\n\n   \n\n").is_empty());
    }

    #[test]
    fn test_paragraphs_packed_up_to_size() {
        let chunker = RecursiveChunker::new(30, 0);
        let text = "first paragraph\n\nsecond one\n\nthird paragraph here";
        let chunks = chunker.split(text);
        assert_eq!(
            chunks,
            vec![
                "first paragraph\n\nsecond one".to_string(),
                "third paragraph here".to_string()
            ]
        );
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunker = RecursiveChunker::new(50, 10);
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let chunks = chunker.split(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn test_overlap_carries_words_forward() {
        let chunker = RecursiveChunker::new(20, 8);
        let chunks = chunker.split("alpha beta gamma delta epsilon zeta eta theta");
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].split(' ').any(|w| w == first_word),
                "{:?} should overlap {:?}",
                pair[1],
                pair[0]
            );
        }
        assert_eq!(chunks[0], "alpha beta gamma");
        assert_eq!(chunks[1], "gamma delta epsilon");
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let chunker = RecursiveChunker::new(10, 0);
        let text = "x".repeat(35);
        let chunks = chunker.split(&text);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_multibyte_text_measured_in_chars() {
        let chunker = RecursiveChunker::new(5, 0);
        let chunks = chunker.split("ééééééééé");
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
        assert_eq!(chunks.concat(), "ééééééééé");
    }

    #[test]
    fn test_overlap_clamped_below_size() {
        let chunker = RecursiveChunker::new(10, 50);
        assert_eq!(chunker.chunk_overlap(), 9);
        assert_eq!(RecursiveChunker::new(0, 0).chunk_size(), 1);
    }
}
