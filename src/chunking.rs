//! Chunking utilities for splitting page text into overlapping segments.
//!
//! Each page is chunked on its own so that every chunk keeps the page it
//! came from. Windows are measured in characters (Unicode scalar values),
//! never bytes, so multi-byte text is never split mid-character.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Window parameters for [`chunk_page`].
///
/// # Examples
///
/// ```
/// use brochure_rag::chunking::ChunkingConfig;
///
/// assert!(ChunkingConfig::new(4, 1).is_ok());
/// assert!(ChunkingConfig::new(0, 0).is_err());
/// assert!(ChunkingConfig::new(4, 4).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// Build a validated configuration.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidArgument(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidArgument(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Distance between the starts of two consecutive windows.
    fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

/// A chunk of text from one page of a source document.
///
/// Produced by [`chunk_page`]. The text is a trimmed, contiguous slice of
/// exactly one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text content, trimmed of surrounding whitespace.
    pub text: String,
    /// File name of the originating document (no directory component).
    pub source_file: String,
    /// One-based page number within `source_file`.
    pub page: u32,
}

/// Split one page of text into overlapping chunks.
///
/// Windows start at character 0 and advance by `chunk_size - overlap`.
/// Each window is trimmed and dropped if nothing is left. The walk stops
/// once a window has reached the end of the text, so a short trailing
/// window is emitted exactly once.
///
/// # Examples
///
/// ```
/// use brochure_rag::chunking::{ChunkingConfig, chunk_page};
///
/// let config = ChunkingConfig::new(4, 1).unwrap();
/// let chunks = chunk_page("abcdefghij", "a.pdf", 1, config).unwrap();
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, ["abcd", "defg", "ghij", "j"]);
/// ```
pub fn chunk_page(
    text: &str,
    source_file: &str,
    page: u32,
    config: ChunkingConfig,
) -> Result<Vec<Chunk>> {
    config.validate()?;

    Ok(window_bounds(text, config)
        .into_iter()
        .filter_map(|(start, end)| {
            let window = text[start..end].trim();
            (!window.is_empty()).then(|| Chunk {
                text: window.to_string(),
                source_file: source_file.to_string(),
                page,
            })
        })
        .collect())
}

/// Chunk every page of a document, numbering pages from 1.
pub fn chunk_pages(
    pages: &[String],
    source_file: &str,
    config: ChunkingConfig,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for (idx, page_text) in pages.iter().enumerate() {
        let page = u32::try_from(idx + 1).map_err(|_| {
            Error::InvalidArgument(format!(
                "{source_file} has more pages than can be numbered"
            ))
        })?;
        chunks.extend(chunk_page(page_text, source_file, page, config)?);
    }
    Ok(chunks)
}

/// Byte ranges of each untrimmed window, in order.
fn window_bounds(text: &str, config: ChunkingConfig) -> Vec<(usize, usize)> {
    // char index -> byte index, with one extra entry for the end of text
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = char_to_byte.len() - 1;

    let step = config.step();
    let mut bounds = Vec::new();
    let mut start_char = 0;

    while start_char < char_count {
        let end_char = (start_char + config.chunk_size).min(char_count);
        bounds.push((char_to_byte[start_char], char_to_byte[end_char]));

        if end_char == char_count {
            break;
        }
        start_char += step;
    }

    bounds
}
