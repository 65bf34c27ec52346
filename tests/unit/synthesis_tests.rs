/*!
 * Tests for the synthesis trait, retry policy, and mock backend
 */

use std::io::Cursor;

use papercast::app_config::VoiceConfig;
use papercast::errors::SynthesisError;
use papercast::synthesis::mock::MockSynthesizer;
use papercast::synthesis::{synthesize_with_retry, RetryPolicy, SpeechSynthesizer, SynthesisRequest};

fn request(ssml: &str) -> SynthesisRequest {
    SynthesisRequest {
        ssml: ssml.to_string(),
        voice: VoiceConfig::default(),
        sample_rate_hertz: 24_000,
    }
}

#[tokio::test]
async fn test_mockSynthesize_working_shouldReturnDecodableAudio() {
    let mock = MockSynthesizer::working();
    let result = mock
        .synthesize(&request("<speak><p><s>Hello there.</s></p></speak>"))
        .await
        .unwrap();

    assert_eq!(result.billable_chars, 12);
    assert!(result.duration_estimate_ms > 0);

    let reader = hound::WavReader::new(Cursor::new(result.audio.as_slice())).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 24_000);
    assert_eq!(spec.bits_per_sample, 16);
}

#[tokio::test]
async fn test_retry_transientTwiceThenOk_shouldSucceed() {
    let mock = MockSynthesizer::transient_times(2);
    let policy = RetryPolicy { max_retries: 3, backoff_ms: 1 };

    let result = synthesize_with_retry(&mock, &request("<speak><p><s>Hi.</s></p></speak>"), &policy).await;

    assert!(result.is_ok());
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn test_retry_exhausted_shouldReturnLastTransientError() {
    let mock = MockSynthesizer::transient_times(100);
    let policy = RetryPolicy { max_retries: 2, backoff_ms: 1 };

    let err = synthesize_with_retry(&mock, &request("<speak><p><s>Hi.</s></p></speak>"), &policy)
        .await
        .unwrap_err();

    assert!(matches!(err, SynthesisError::Transient { .. }));
    // Initial attempt plus two retries
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn test_retry_fatalError_shouldNotRetry() {
    let mock = MockSynthesizer::failing();
    let policy = RetryPolicy { max_retries: 5, backoff_ms: 1 };

    let err = synthesize_with_retry(&mock, &request("<speak><p><s>Hi.</s></p></speak>"), &policy)
        .await
        .unwrap_err();

    assert!(matches!(err, SynthesisError::Fatal { .. }));
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_testConnection_byBehavior_shouldReflectServiceHealth() {
    assert!(MockSynthesizer::working().test_connection().await.is_ok());
    assert!(MockSynthesizer::failing().test_connection().await.is_err());
}

#[test]
fn test_isRetryable_byVariant_shouldOnlyAllowTransient() {
    let transient = SynthesisError::Transient { message: "429".into(), retry_after_secs: Some(2) };
    let fatal = SynthesisError::Fatal { message: "401".into() };
    let invalid = SynthesisError::InvalidAudio("bad".into());

    assert!(transient.is_retryable());
    assert!(!fatal.is_retryable());
    assert!(!invalid.is_retryable());
}

#[test]
fn test_requestBillableChars_markupStripped_shouldCountNarrationOnly() {
    let req = request("<speak><p><s>One two.</s></p></speak>");
    assert_eq!(req.billable_chars(), 8);
}
