/*!
 * Tests for chapter extraction from section headers
 */

use papercast::chapters;
use papercast::markup::Document;

use crate::common::sample_article;

#[test]
fn test_extract_sampleArticle_shouldYieldOneChapterPerHeader() {
    let (document, _) = Document::parse(&sample_article()).unwrap();
    let chapters = chapters::extract(&document);

    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].title, "Introduction");
    assert_eq!(chapters[0].source_offset, 0);
    assert_eq!(chapters[1].title, "Methods");
    assert!(chapters[1].source_offset > chapters[0].source_offset);
    assert!(chapters.iter().all(|c| c.resolved_time_ms.is_none()));
}

#[test]
fn test_extract_offsets_shouldPointAtHeaderText() {
    let (document, _) = Document::parse(&sample_article()).unwrap();
    let chapters = chapters::extract(&document);
    let narration = document.narration_text();

    for chapter in &chapters {
        let tail: String = narration.chars().skip(chapter.source_offset).collect();
        assert!(
            tail.starts_with(&chapter.title),
            "offset {} does not point at '{}'",
            chapter.source_offset,
            chapter.title
        );
    }
}

#[test]
fn test_extract_noHeaders_shouldYieldEmptyList() {
    let raw = "<speak><p><s>Just a paragraph.</s></p></speak>";
    let (document, _) = Document::parse(raw).unwrap();
    assert!(chapters::extract(&document).is_empty());
}

#[test]
fn test_extract_trailingHeaderOnlySection_shouldStillAppear() {
    let raw = r#"<speak>
<p><s>Body text first.</s></p>
<prosody pitch="+2st">Appendix</prosody>
</speak>"#;
    let (document, _) = Document::parse(raw).unwrap();
    let chapters = chapters::extract(&document);

    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0].title, "Appendix");
}
