use log::debug;

use crate::markup::Document;

// @module: Chapter extraction from document headers

/// A named navigation point derived from a document section header.
///
/// `source_offset` is the narration-text offset of the header's first
/// character; `resolved_time_ms` is filled in by the assembler once the
/// audio timeline is known.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// Spoken section title
    pub title: String,
    /// Narration-text offset of the header's first character
    pub source_offset: usize,
    /// Time offset in the assembled audio, set during assembly
    pub resolved_time_ms: Option<u64>,
}

/// Scan the document for section headers, in document order.
///
/// One entry per header unit; no two chapters share a `source_offset`
/// (guaranteed by construction, since every header owns at least its title
/// text). A document without headers yields an empty sequence — the export
/// simply carries no chapter table.
pub fn extract(document: &Document) -> Vec<Chapter> {
    let mut chapters = Vec::new();
    for block in document.blocks() {
        if let Some(header) = &block.header {
            if header.title.is_empty() {
                continue;
            }
            chapters.push(Chapter {
                title: header.title.clone(),
                source_offset: header.text_offset,
                resolved_time_ms: None,
            });
        }
    }
    debug!("Extracted {} chapter(s) from document", chapters.len());
    chapters
}
