/*!
 * Tests for size-bounded document chunking
 */

use papercast::chunker::{self, DEFAULT_CHUNK_LIMIT};
use papercast::errors::ChunkError;
use papercast::markup::Document;

use crate::common::{generated_article, sample_article};

#[test]
fn test_split_smallDocument_shouldYieldSingleEnvelopedChunk() {
    let (document, _) = Document::parse(&sample_article()).unwrap();
    let chunks = chunker::split(&document, DEFAULT_CHUNK_LIMIT).unwrap();

    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!(chunk.index, 0);
    assert!(chunk.ssml.starts_with("<speak>"));
    assert!(chunk.ssml.ends_with("</speak>"));
    assert_eq!(chunk.byte_size, chunk.ssml.len());
    assert!(chunk.byte_size <= DEFAULT_CHUNK_LIMIT);
}

/// Every chunk respects the byte bound and chunk text ranges partition the
/// document narration exactly
#[test]
fn test_split_largeDocument_shouldPartitionNarrationLosslessly() {
    let (document, _) = Document::parse(&generated_article(12, 6)).unwrap();
    let limit = 600;
    let chunks = chunker::split(&document, limit).unwrap();

    assert!(chunks.len() > 1, "expected multiple chunks");
    let mut cursor = 0usize;
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, i);
        assert!(chunk.byte_size <= limit, "chunk {} is {} bytes", i, chunk.byte_size);
        assert_eq!(chunk.text_range.start, cursor, "gap before chunk {}", i);
        cursor = chunk.text_range.end;
    }
    assert_eq!(cursor, document.text_len());
}

/// Every chunk is independently parseable markup
#[test]
fn test_split_chunks_shouldEachParseStandalone() {
    let (document, _) = Document::parse(&generated_article(6, 4)).unwrap();
    let chunks = chunker::split(&document, 500).unwrap();

    for chunk in &chunks {
        let (parsed, repairs) = Document::parse(&chunk.ssml).unwrap();
        assert!(repairs.is_empty(), "chunk {} needed repairs: {:?}", chunk.index, repairs);
        assert!(!parsed.is_empty());
    }
}

#[test]
fn test_split_sameInput_shouldBeDeterministic() {
    let (document, _) = Document::parse(&generated_article(8, 5)).unwrap();
    let first: Vec<String> = chunker::split(&document, 700)
        .unwrap()
        .into_iter()
        .map(|c| c.ssml)
        .collect();
    let second: Vec<String> = chunker::split(&document, 700)
        .unwrap()
        .into_iter()
        .map(|c| c.ssml)
        .collect();
    assert_eq!(first, second);
}

/// A paragraph bigger than the whole limit is subdivided at sentence
/// boundaries, and the section header stays with the first piece
#[test]
fn test_split_oversizedParagraph_shouldSubdivideKeepingHeaderFirst() {
    // One section whose paragraph alone exceeds the limit
    let raw = generated_article(1, 60);
    let (document, _) = Document::parse(&raw).unwrap();
    assert_eq!(document.blocks().len(), 1);

    let limit = 1200;
    let chunks = chunker::split(&document, limit).unwrap();

    assert!(chunks.len() >= 2, "oversized paragraph should split");
    for chunk in &chunks {
        assert!(chunk.byte_size <= limit);
    }
    assert!(
        chunks[0].ssml.contains("Section number 1"),
        "header must lead the first piece"
    );
    assert!(
        !chunks[1].ssml.contains("<prosody"),
        "later pieces must not repeat the header"
    );
}

#[test]
fn test_split_unfittableSentence_shouldFailWithTooLarge() {
    let mut sentence = String::from("<speak><p><s>");
    sentence.push_str(&"word ".repeat(300));
    sentence.push_str("</s></p></speak>");
    let (document, _) = Document::parse(&sentence).unwrap();

    let err = chunker::split(&document, 400).unwrap_err();
    match err {
        ChunkError::TooLarge { block_index, size, limit } => {
            assert_eq!(block_index, 0);
            assert!(size > limit);
            assert_eq!(limit, 400);
        }
    }
}

#[test]
fn test_split_emptyDocument_shouldYieldNoChunks() {
    let (document, _) = Document::parse("").unwrap();
    let chunks = chunker::split(&document, DEFAULT_CHUNK_LIMIT).unwrap();
    assert!(chunks.is_empty());
}
