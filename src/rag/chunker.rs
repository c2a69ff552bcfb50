//! Text chunking for RAG indexing.
//!
//! Splits text into overlapping windows measured in characters. Window `i + 1`
//! starts exactly `chunk_overlap` characters before window `i` ends, and windows are
//! never trimmed, so dropping the first `chunk_overlap` characters of every window
//! after the first and concatenating reproduces the input exactly.

use crate::error::{RagError, Result};

/// A window over the source text, with character offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub text: String,
    /// Start character offset (inclusive)
    pub start: usize,
    /// End character offset (exclusive)
    pub end: usize,
}

/// Splits text into bounded, overlapping chunks. Holds no mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::InvalidChunking {
                chunk_size,
                chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into chunk strings.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.windows(text).into_iter().map(|w| w.text).collect()
    }

    /// Split text into windows with their character offsets.
    pub fn windows(&self, text: &str) -> Vec<TextWindow> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len == 0 {
            return Vec::new();
        }

        let mut windows = Vec::new();
        let mut start = 0;

        loop {
            let hard_end = (start + self.chunk_size).min(len);
            if hard_end == len {
                windows.push(window(&chars, start, len));
                break;
            }

            let end = find_break_point(&chars[start..hard_end], self.chunk_overlap)
                .map(|offset| start + offset)
                .unwrap_or(hard_end);

            windows.push(window(&chars, start, end));
            // end - start > chunk_overlap, so this always advances
            start = end - self.chunk_overlap;
        }

        windows
    }
}

fn window(chars: &[char], start: usize, end: usize) -> TextWindow {
    TextWindow {
        text: chars[start..end].iter().collect(),
        start,
        end,
    }
}

/// Find a good break point in the window (prefer paragraph, then sentence, then line,
/// then clause, then word boundaries). Returns a length strictly greater than `overlap`.
fn find_break_point(window: &[char], overlap: usize) -> Option<usize> {
    let min_end = (overlap + 1).max(window.len() / 3);

    BREAK_TIERS.iter().find_map(|tier| {
        tier.iter()
            .filter_map(|sep| rfind(window, sep).map(|pos| pos + sep.len()))
            .filter(|end| *end >= min_end)
            .max()
    })
}

const BREAK_TIERS: [&[&[char]]; 5] = [
    &[&['\n', '\n']],
    &[&['.', ' '], &['!', ' '], &['?', ' '], &['.', '\n'], &['!', '\n'], &['?', '\n']],
    &[&['\n']],
    &[&[';', ' '], &[',', ' ']],
    &[&[' ']],
];

fn rfind(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}
