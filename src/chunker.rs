use std::ops::Range;
use log::{error, debug};

use crate::errors::ChunkError;
use crate::markup::{Block, Document};

// @module: Size-bounded document splitting for the synthesis service

/// Byte overhead of the `<speak>` envelope wrapped around each chunk body
const ENVELOPE_OVERHEAD: usize = "<speak>\n".len() + "\n</speak>".len();

/// Default per-request byte limit. The service caps requests at 5000 bytes;
/// the margin covers request framing.
pub const DEFAULT_CHUNK_LIMIT: usize = 4800;

/// A self-contained, independently valid fragment of the document.
///
/// Each chunk parses on its own and serializes to at most the configured
/// byte limit.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Ordinal position of this chunk within the job
    pub index: usize,
    /// The enveloped markup submitted to the synthesis service
    pub ssml: String,
    /// Serialized size in UTF-8 bytes
    pub byte_size: usize,
    /// Narration-text range of the original document covered by this chunk
    pub text_range: Range<usize>,
}

/// One accumulation unit: either a whole block or a sentence-level piece of
/// an oversized block
struct Piece {
    markup: String,
    text_range: Range<usize>,
    /// Pieces from a subdivided block never merge with neighbors
    standalone: bool,
}

/// Split a document into ordered chunks of at most `limit` serialized bytes.
///
/// Walks top-level blocks accumulating serialized size and flushes the
/// current chunk whenever the next block would exceed the limit; blocks are
/// never split internally. A single block that alone exceeds the limit is
/// subdivided at sentence boundaries, keeping any header prefix glued to the
/// first piece; if even one sentence cannot fit, the job refuses to start
/// with [`ChunkError::TooLarge`] rather than truncating narration.
///
/// An empty document yields zero chunks. Output is deterministic for
/// identical input and limit.
pub fn split(document: &Document, limit: usize) -> Result<Vec<Chunk>, ChunkError> {
    if document.is_empty() {
        return Ok(Vec::new());
    }

    let effective_limit = limit.saturating_sub(ENVELOPE_OVERHEAD);
    let mut pieces: Vec<Piece> = Vec::new();

    for (block_index, block) in document.blocks().iter().enumerate() {
        let markup = block.markup();
        if markup.len() <= effective_limit {
            pieces.push(Piece {
                markup,
                text_range: block.text_range.clone(),
                standalone: false,
            });
        } else {
            debug!(
                "Block {} serializes to {} bytes, splitting at sentence boundaries",
                block_index,
                markup.len()
            );
            subdivide_block(block, block_index, effective_limit, limit, &mut pieces)?;
        }
    }

    let chunks = accumulate(pieces, effective_limit);

    audit_coverage(document, &chunks);
    Ok(chunks)
}

/// Split an oversized block into `<p>`-wrapped sentence groups.
///
/// The block's prefix (section header, breaks) stays with the first group so
/// a chapter marker can never be separated from its first sentence.
fn subdivide_block(
    block: &Block,
    block_index: usize,
    effective_limit: usize,
    limit: usize,
    pieces: &mut Vec<Piece>,
) -> Result<(), ChunkError> {
    const PARA_WRAPPER: usize = "<p>".len() + "</p>".len();

    if block.sentences.is_empty() {
        // Nothing finer to split at
        return Err(ChunkError::TooLarge {
            block_index,
            size: block.markup().len() + ENVELOPE_OVERHEAD,
            limit,
        });
    }

    let prefix = &block.prefix_markup;
    let mut current: Vec<&crate::markup::Sentence> = Vec::new();
    let mut current_size = 0usize;
    let mut first_group = true;

    let group_overhead = |first: bool| {
        if first && !prefix.is_empty() {
            PARA_WRAPPER + prefix.len() + 1
        } else {
            PARA_WRAPPER
        }
    };

    let mut flush =
        |group: &mut Vec<&crate::markup::Sentence>, first: bool, pieces: &mut Vec<Piece>| {
            if group.is_empty() {
                return;
            }
            let body: String = group.iter().map(|s| s.markup.as_str()).collect();
            let markup = if first && !prefix.is_empty() {
                format!("{}\n<p>{}</p>", prefix, body)
            } else {
                format!("<p>{}</p>", body)
            };
            let start = if first {
                block.text_range.start
            } else {
                group[0].text_range.start
            };
            let end = group.last().map(|s| s.text_range.end).unwrap_or(start);
            pieces.push(Piece {
                markup,
                text_range: start..end,
                standalone: true,
            });
            group.clear();
        };

    for sentence in &block.sentences {
        let sentence_size = sentence.markup.len();

        if sentence_size + group_overhead(current.is_empty() && first_group) > effective_limit {
            return Err(ChunkError::TooLarge {
                block_index,
                size: sentence_size + group_overhead(first_group) + ENVELOPE_OVERHEAD,
                limit,
            });
        }

        if !current.is_empty()
            && current_size + sentence_size + group_overhead(first_group) > effective_limit
        {
            flush(&mut current, first_group, pieces);
            first_group = false;
            current_size = 0;
        }

        current.push(sentence);
        current_size += sentence_size;
    }
    flush(&mut current, first_group, pieces);

    Ok(())
}

/// Greedily pack pieces into enveloped chunks
fn accumulate(pieces: Vec<Piece>, effective_limit: usize) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<Piece> = Vec::new();
    let mut current_size = 0usize;

    let mut flush = |current: &mut Vec<Piece>, chunks: &mut Vec<Chunk>| {
        if current.is_empty() {
            return;
        }
        let body: Vec<&str> = current.iter().map(|p| p.markup.as_str()).collect();
        let ssml = format!("<speak>\n{}\n</speak>", body.join("\n"));
        let text_range =
            current[0].text_range.start..current.last().unwrap().text_range.end;
        chunks.push(Chunk {
            index: chunks.len(),
            byte_size: ssml.len(),
            ssml,
            text_range,
        });
        current.clear();
    };

    for piece in pieces {
        if piece.standalone {
            flush(&mut current, &mut chunks);
            current_size = 0;
            current.push(piece);
            flush(&mut current, &mut chunks);
            continue;
        }

        let joined = if current.is_empty() {
            piece.markup.len()
        } else {
            current_size + 1 + piece.markup.len()
        };
        if !current.is_empty() && joined > effective_limit {
            flush(&mut current, &mut chunks);
            current_size = piece.markup.len();
        } else {
            current_size = joined;
        }
        current.push(piece);
    }
    flush(&mut current, &mut chunks);

    chunks
}

/// Verify the chunks cover the document's narration text with no gaps.
/// Losing content during chunking is a correctness violation for narrated
/// audio, so a mismatch is loudly logged.
fn audit_coverage(document: &Document, chunks: &[Chunk]) {
    let covered: usize = chunks
        .iter()
        .map(|c| c.text_range.end - c.text_range.start)
        .sum();
    if covered != document.text_len() {
        error!(
            "CRITICAL: chunking lost narration text. Document has {} chars, chunks cover {}",
            document.text_len(),
            covered
        );
    }
}
