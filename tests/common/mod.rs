/*!
 * Common test utilities for the papercast test suite
 */

use std::path::PathBuf;
use std::fs;
use anyhow::Result;
use tempfile::TempDir;

use papercast::app_config::Config;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &PathBuf, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// A small well-formed article with two sections
pub fn sample_article() -> String {
    r#"<speak>
<prosody pitch="+2st">Introduction</prosody>
<break time="750ms"/>
<p><s>First sentence one.</s><s>First sentence two.</s></p>
<prosody pitch="+2st">Methods</prosody>
<p><s>Second section sentence.</s></p>
</speak>"#
        .to_string()
}

/// Build an article with `paragraphs` sections of `sentences` sentences each
pub fn generated_article(paragraphs: usize, sentences: usize) -> String {
    let mut out = String::from("<speak>\n");
    for p in 0..paragraphs {
        out.push_str(&format!(
            "<prosody pitch=\"+2st\">Section number {}</prosody>\n<p>",
            p + 1
        ));
        for s in 0..sentences {
            out.push_str(&format!(
                "<s>Paragraph {} carries sentence number {} with some filler words.</s>",
                p + 1,
                s + 1
            ));
        }
        out.push_str("</p>\n");
    }
    out.push_str("</speak>");
    out
}

/// Configuration tuned for fast deterministic tests: no rate limiting,
/// millisecond backoff, and a dummy API key so validation passes
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.synthesis.api_key = "test-key".to_string();
    config.synthesis.rate_limit_delay_ms = 0;
    config.synthesis.retry_backoff_ms = 1;
    config.synthesis.concurrent_requests = 2;
    config.audio.format = "wav".to_string();
    config
}
