//! Rendering retrieved hits for a downstream language model.
//!
//! Nothing here calls a model. The output is meant to be piped into one.

use crate::vector_index::Hit;

/// Characters of chunk text shown in a source preview.
pub const PREVIEW_CHARS: usize = 400;

const INSTRUCTIONS: &str = "You are a helpful property brochure assistant. \
Use the provided context (below) to answer the user's question. If the \
answer is not in the context, say you don't know. Do NOT hallucinate.";

/// Join hits into `Source: <file> (page N)` blocks separated by blank
/// lines, best hit first.
pub fn build_context(hits: &[Hit]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "Source: {} (page {})\n{}\n",
                hit.chunk.source_file, hit.chunk.page, hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The grounded question-answering prompt for `question`.
pub fn build_prompt(question: &str, hits: &[Hit]) -> String {
    format!(
        "{INSTRUCTIONS}\n\nContext:\n{}\n\nQuestion: {question}\n\nAnswer:",
        build_context(hits)
    )
}

/// Chunk text cut to [`PREVIEW_CHARS`] characters, with an ellipsis when
/// anything was dropped.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
