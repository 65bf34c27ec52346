/*!
 * Tests for markup validation, repair, and the document model
 */

use papercast::markup::{billable_chars, Document, RepairAction};

use crate::common::sample_article;

/// Well-formed input parses with no repairs
#[test]
fn test_parse_wellFormedArticle_shouldNeedNoRepairs() {
    let (document, repairs) = Document::parse(&sample_article()).unwrap();

    assert!(repairs.is_empty(), "unexpected repairs: {:?}", repairs);
    assert_eq!(document.blocks().len(), 2);
    assert!(!document.is_empty());

    let narration = document.narration_text();
    assert!(narration.contains("Introduction"));
    assert!(narration.contains("Second section sentence."));
    assert_eq!(document.text_len(), narration.chars().count());
}

#[test]
fn test_parse_sectionHeaders_shouldGlueToFollowingParagraph() {
    let (document, _) = Document::parse(&sample_article()).unwrap();

    let first = &document.blocks()[0];
    let header = first.header.as_ref().expect("first block should carry a header");
    assert_eq!(header.title, "Introduction");
    assert_eq!(header.text_offset, 0);
    assert!(first.prefix_markup.contains("<prosody"));
    assert!(first.body_markup.starts_with("<p>"));

    let second = &document.blocks()[1];
    assert_eq!(second.header.as_ref().unwrap().title, "Methods");
}

/// Serialization is canonical: re-parsing the output needs zero repairs and
/// serializes to the same bytes
#[test]
fn test_serialize_reparsed_shouldBeIdempotent() {
    let (document, _) = Document::parse(&sample_article()).unwrap();
    let serialized = document.serialize();

    let (reparsed, repairs) = Document::parse(&serialized).unwrap();
    assert!(repairs.is_empty(), "reparse needed repairs: {:?}", repairs);
    assert_eq!(reparsed.serialize(), serialized);
    assert_eq!(reparsed.text_len(), document.text_len());
}

#[test]
fn test_parse_unsupportedTag_shouldStripKeepingText() {
    let raw = "<speak><p><s>Hello <bold>brave</bold> world.</s></p></speak>";
    let (document, repairs) = Document::parse(raw).unwrap();

    assert!(repairs
        .iter()
        .any(|r| matches!(r, RepairAction::StrippedUnsupportedTag { name } if name == "bold")));
    assert_eq!(document.narration_text(), "Hello brave world.");
    assert!(!document.serialize().contains("bold"));
}

#[test]
fn test_parse_bareAmpersand_shouldEscapeAndRecord() {
    let raw = "<speak><p><s>Q & A</s></p></speak>";
    let (document, repairs) = Document::parse(raw).unwrap();

    assert_eq!(
        repairs,
        vec![RepairAction::EscapedAmpersands { count: 1 }]
    );
    assert_eq!(document.narration_text(), "Q & A");
    assert!(document.serialize().contains("Q &amp; A"));
}

#[test]
fn test_parse_strayClosingTag_shouldDropAndRecord() {
    let raw = "<speak><p><s>Hi.</s></s></p></speak>";
    let (document, repairs) = Document::parse(raw).unwrap();

    assert!(repairs
        .iter()
        .any(|r| matches!(r, RepairAction::RemovedStrayClosingTag { name } if name == "s")));
    assert_eq!(document.narration_text(), "Hi.");
}

#[test]
fn test_parse_unterminatedTags_shouldAutoClose() {
    let raw = "<speak><p><s>Hi.";
    let (document, repairs) = Document::parse(raw).unwrap();

    assert!(repairs
        .iter()
        .any(|r| matches!(r, RepairAction::ClosedUnterminatedTag { name } if name == "s")));
    assert_eq!(document.narration_text(), "Hi.");

    // The repaired form is stable
    let (reparsed, second_repairs) = Document::parse(&document.serialize()).unwrap();
    assert!(second_repairs.is_empty());
    assert_eq!(reparsed.narration_text(), "Hi.");
}

#[test]
fn test_parse_controlCharacters_shouldRemoveAndRecord() {
    let raw = "<speak><p><s>Be\u{0000}ep\u{0007}.</s></p></speak>";
    let (document, repairs) = Document::parse(raw).unwrap();

    assert!(repairs
        .iter()
        .any(|r| matches!(r, RepairAction::RemovedControlCharacters { count: 2 })));
    assert_eq!(document.narration_text(), "Beep.");
}

#[test]
fn test_parse_xmlComments_shouldVanishSilently() {
    let raw = "<!-- converter: v2 --><speak><p><s>Hi.</s></p></speak>";
    let (document, repairs) = Document::parse(raw).unwrap();

    assert!(repairs.is_empty());
    assert_eq!(document.narration_text(), "Hi.");
}

/// Plain text input gets wrapped into paragraph/sentence structure
#[test]
fn test_parse_plainText_shouldWrapIntoStructure() {
    let raw = "First sentence. Second sentence.\n\nNext paragraph here.";
    let (document, repairs) = Document::parse(raw).unwrap();

    assert!(repairs.contains(&RepairAction::WrappedBareText));
    assert_eq!(document.blocks().len(), 2);
    assert_eq!(document.blocks()[0].sentences.len(), 2);
    assert_eq!(document.blocks()[1].sentences.len(), 1);
}

#[test]
fn test_parse_emptyInput_shouldYieldEmptyDocument() {
    for raw in ["", "   \n  ", "<speak></speak>", "<!-- nothing -->"] {
        let (document, _) = Document::parse(raw).unwrap();
        assert!(document.is_empty(), "input {:?} should be empty", raw);
        assert_eq!(document.text_len(), 0);
    }
}

#[test]
fn test_billableChars_markup_shouldCountStrippedText() {
    assert_eq!(
        billable_chars("<speak><p><s>Hello world.</s></p></speak>"),
        12
    );
    assert_eq!(billable_chars("<speak></speak>"), 0);
}

/// Narration offsets in sentences partition the document text
#[test]
fn test_parse_sentenceRanges_shouldBeContiguous() {
    let (document, _) = Document::parse(&sample_article()).unwrap();

    let mut cursor = 0usize;
    for block in document.blocks() {
        assert_eq!(block.text_range.start, cursor);
        cursor = block.text_range.end;
    }
    assert_eq!(cursor, document.text_len());
}
