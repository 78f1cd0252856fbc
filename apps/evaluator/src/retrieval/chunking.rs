//! Token-window chunking of reference documents.

use std::ops::Range;

/// Splits text into tokens, reported as byte ranges into the input.
pub trait Tokenizer: Send + Sync {
    fn spans(&self, text: &str) -> Vec<Range<usize>>;

    fn count(&self, text: &str) -> usize {
        self.spans(text).len()
    }
}

/// Each run of alphanumeric characters is one token, as is every other
/// non-whitespace character. Whitespace is never a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut word_start: Option<usize> = None;

        for (i, ch) in text.char_indices() {
            if ch.is_alphanumeric() || ch == '_' {
                word_start.get_or_insert(i);
                continue;
            }
            if let Some(start) = word_start.take() {
                spans.push(start..i);
            }
            if !ch.is_whitespace() {
                spans.push(i..i + ch.len_utf8());
            }
        }
        if let Some(start) = word_start {
            spans.push(start..text.len());
        }

        spans
    }
}

#[cfg(feature = "hf-tokenizer")]
pub use hf::HfTokenizer;

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use std::ops::Range;
    use std::path::Path;

    use super::{snap_to_char_boundary, Tokenizer};
    use crate::retrieval::RetrievalError;

    /// Wraps a HuggingFace `tokenizer.json` so windows line up with model tokens.
    pub struct HfTokenizer {
        inner: tokenizers::Tokenizer,
    }

    impl HfTokenizer {
        pub fn from_file(path: &Path) -> Result<Self, RetrievalError> {
            let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
                RetrievalError::Tokenizer(format!("failed to load {}: {e}", path.display()))
            })?;
            Ok(Self { inner })
        }
    }

    impl Tokenizer for HfTokenizer {
        fn spans(&self, text: &str) -> Vec<Range<usize>> {
            let encoding = match self.inner.encode(text, false) {
                Ok(encoding) => encoding,
                Err(e) => {
                    tracing::warn!("Tokenizer failed, falling back to word tokens: {e}");
                    return super::WordTokenizer.spans(text);
                }
            };

            encoding
                .get_offsets()
                .iter()
                .map(|&(start, end)| {
                    snap_to_char_boundary(text, start)..snap_to_char_boundary(text, end)
                })
                .filter(|span| !span.is_empty())
                .collect()
        }
    }
}

/// Moves `offset` back to the nearest char boundary of `text`.
#[cfg_attr(not(feature = "hf-tokenizer"), allow(dead_code))]
fn snap_to_char_boundary(text: &str, mut offset: usize) -> usize {
    offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    /// Byte range of this chunk in the source text.
    pub byte_range: Range<usize>,
    pub token_count: usize,
}

/// Splits `text` into windows of `size` tokens where consecutive windows share
/// `overlap` tokens. The last window ends at the last token, so no trailing
/// window is made up of overlap alone.
pub fn chunk_text(
    text: &str,
    tokenizer: &dyn Tokenizer,
    size: usize,
    overlap: usize,
) -> Vec<TextChunk> {
    let spans = tokenizer.spans(text);
    if spans.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(spans.len());
        let byte_range = spans[start].start..spans[end - 1].end;
        chunks.push(TextChunk {
            index: chunks.len(),
            text: text[byte_range.clone()].to_string(),
            byte_range,
            token_count: end - start,
        });
        if end == spans.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Reassembles ordered chunks, dropping the bytes each chunk shares with its
/// predecessor. Whitespace between non-overlapping windows becomes one space.
pub fn merge_chunks(chunks: &[TextChunk]) -> String {
    let mut merged = String::new();
    let mut covered_to: Option<usize> = None;

    for chunk in chunks {
        match covered_to {
            None => merged.push_str(&chunk.text),
            Some(end) if end < chunk.byte_range.start => {
                merged.push(' ');
                merged.push_str(&chunk.text);
            }
            Some(end) if end < chunk.byte_range.end => {
                let skip = end.saturating_sub(chunk.byte_range.start);
                merged.push_str(&chunk.text[skip..]);
            }
            Some(_) => {}
        }
        covered_to = Some(covered_to.map_or(chunk.byte_range.end, |end| {
            end.max(chunk.byte_range.end)
        }));
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_word_tokenizer_splits_words_and_punctuation() {
        let text = "Python, AWS; led team";
        let tokens: Vec<&str> = WordTokenizer
            .spans(text)
            .into_iter()
            .map(|r| &text[r])
            .collect();
        assert_eq!(tokens, vec!["Python", ",", "AWS", ";", "led", "team"]);
    }

    #[test]
    fn test_word_tokenizer_handles_multibyte_text() {
        let text = "café naïve résumé";
        assert_eq!(WordTokenizer.count(text), 3);
    }

    #[test]
    fn test_chunk_windows_overlap_by_configured_tokens() {
        let text = numbered_words(25);
        let chunks = chunk_text(&text, &WordTokenizer, 10, 2);

        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].text.starts_with("w0 "));
        assert!(chunks[0].text.ends_with(" w9"));
        assert!(chunks[1].text.starts_with("w8 "));
        assert!(chunks[2].text.starts_with("w16 "));
        assert!(chunks[2].text.ends_with(" w24"));
        assert_eq!(chunks[2].token_count, 9);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_short_text_is_a_single_chunk() {
        let chunks = chunk_text("just a few words", &WordTokenizer, 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "just a few words");
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("  \n ", &WordTokenizer, 500, 50).is_empty());
    }

    #[test]
    fn test_merge_reconstructs_cleaned_text() {
        let text = "Backend engineers build APIs.\n\nThey care about latency, \
                    retries and observability. Scoring: 1 to 5 per criterion.";
        for (size, overlap) in [(3, 1), (5, 2), (50, 10)] {
            let chunks = chunk_text(text, &WordTokenizer, size, overlap);
            assert_eq!(merge_chunks(&chunks), text, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn test_merge_without_overlap_matches_modulo_whitespace() {
        let text = "one two\n\nthree four five six";
        let chunks = chunk_text(text, &WordTokenizer, 2, 0);
        let words = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(words(&merge_chunks(&chunks)), words(text));
    }

    #[test]
    fn test_snap_to_char_boundary() {
        let text = "é";
        assert_eq!(snap_to_char_boundary(text, 1), 0);
        assert_eq!(snap_to_char_boundary(text, 9), 2);
    }
}
