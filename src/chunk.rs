//! Sliding-window text splitter.
//!
//! Pages are shown to the model one "scroll" at a time. Each scroll is a window
//! of whitespace-separated tokens; consecutive windows may share
//! `chunk_overlap` tokens so a sentence cut at a boundary is still seen whole
//! in one of them.

/// Split `text` into windows of `tokens_per_chunk` tokens.
///
/// Windows advance by `tokens_per_chunk - chunk_overlap` tokens. The overlap is
/// clamped to `tokens_per_chunk - 1` and a chunk size of zero is treated as one,
/// so the window always moves forward. The final window ends at the last token.
/// Blank input yields no chunks.
pub fn split_text(text: &str, tokens_per_chunk: usize, chunk_overlap: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let size = tokens_per_chunk.max(1);
    let overlap = chunk_overlap.min(size - 1);
    let step = size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(tokens.len());
        chunks.push(tokens[start..end].join(" "));
        if end == tokens.len() {
            break;
        }
        start += step;
    }
    chunks
}
