use serde::{Deserialize, Serialize};

use super::types::{Chunk, Document};

/// Chunking settings for the corpus.
///
/// With `enabled = false` every document becomes exactly one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub enabled: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub sentence_aware: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chunk_size: 1000,
            chunk_overlap: 200,
            sentence_aware: true,
        }
    }
}

pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        if document.content.trim().is_empty() {
            return Vec::new();
        }

        let pieces: Vec<String> = if !self.config.enabled {
            vec![document.content.clone()]
        } else if self.config.sentence_aware {
            self.merge_sentences(&split_sentences(&document.content))
        } else {
            self.split_chars(&document.content)
        };

        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| Chunk {
                content,
                metadata: document.metadata.clone(),
                chunk_index,
            })
            .collect()
    }

    fn merge_sentences(&self, sentences: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(size.saturating_sub(1));

        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in sentences {
            if !current.is_empty() && current.len() + sentence.len() > size {
                let carried = tail_on_boundary(&current, overlap).to_owned();
                chunks.push(std::mem::replace(&mut current, carried));
            }
            current.push_str(sentence);
        }
        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }

    fn split_chars(&self, text: &str) -> Vec<String> {
        let size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(size.saturating_sub(1));
        let step = size - overlap;

        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

/// Splits on `.`, `?` or `!` followed by a space, and on blank lines.
/// Terminators stay with the sentence they close.
fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let end = match (bytes[i], bytes.get(i + 1)) {
            (b'\n', Some(b'\n')) => Some(i + 2),
            (b'.' | b'?' | b'!', Some(b' ')) => Some(i + 1),
            _ => None,
        };
        match end {
            Some(end) => {
                if !text[start..end].trim().is_empty() {
                    sentences.push(&text[start..end]);
                    start = end;
                }
                i = end;
            }
            None => i += 1,
        }
    }
    if start < text.len() && !text[start..].trim().is_empty() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Last `max` bytes of `s`, moved forward to a char boundary.
fn tail_on_boundary(s: &str, max: usize) -> &str {
    let mut from = s.len().saturating_sub(max);
    while !s.is_char_boundary(from) {
        from += 1;
    }
    &s[from..]
}
