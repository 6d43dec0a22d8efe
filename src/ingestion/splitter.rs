//! Recursive character splitter.
//!
//! Text is cut on the first separator that occurs in it; pieces that are
//! still too long are cut again with the remaining separators, down to
//! single characters. Small pieces are then greedily merged back into chunks
//! of at most `chunk_size` characters, each chunk starting with up to
//! `chunk_overlap` characters carried over from the end of the previous one.
//! Separators stay attached to the start of the piece that follows them.

use crate::core::config::ChunkingSettings;

const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ".", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let pieces = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }

            if !short_pieces.is_empty() {
                chunks.extend(self.merge(&short_pieces));
                short_pieces.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !short_pieces.is_empty() {
            chunks.extend(self.merge(&short_pieces));
        }
        chunks
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    let dropped = window.remove(0);
                    total -= char_len(dropped);
                }
            }
            window.push(piece);
            total += len;
        }
        push_joined(&mut chunks, &window);
        chunks
    }
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self::from_settings(&ChunkingSettings::default())
    }
}

/// First separator present in `text` plus the finer ones after it.
fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator, &separators[i + 1..]);
        }
    }
    ("", &[])
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    for (i, part) in text.split(separator).enumerate() {
        let piece = if i == 0 {
            part.to_string()
        } else {
            format!("{}{}", separator, part)
        };
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }
    pieces
}

fn push_joined(chunks: &mut Vec<String>, window: &[&str]) {
    let joined = window.concat();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
