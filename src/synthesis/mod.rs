/*!
 * Speech synthesis service boundary.
 *
 * This module defines the interface to the external text-to-speech service:
 * - `SpeechSynthesizer`: the trait every backend implements
 * - `synthesis::google`: Google Cloud Text-to-Speech REST client
 * - `synthesis::mock`: configurable test double
 *
 * All backends return LINEAR16 WAV audio regardless of the job's target
 * container, so durations can be measured exactly from PCM sample counts and
 * transcoding happens once, at export.
 */

use std::fmt::Debug;
use std::time::Duration;
use async_trait::async_trait;
use log::warn;
use rand::Rng;

use crate::app_config::VoiceConfig;
use crate::chunker::Chunk;
use crate::errors::SynthesisError;
use crate::markup;

/// One synthesis request: a self-contained markup fragment plus voice settings
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Enveloped markup, at most the configured byte limit
    pub ssml: String,
    /// Voice selection and prosody
    pub voice: VoiceConfig,
    /// Requested PCM sample rate
    pub sample_rate_hertz: u32,
}

impl SynthesisRequest {
    /// Build the request for one chunk
    pub fn for_chunk(chunk: &Chunk, voice: &VoiceConfig, sample_rate_hertz: u32) -> Self {
        Self {
            ssml: chunk.ssml.clone(),
            voice: voice.clone(),
            sample_rate_hertz,
        }
    }

    /// Characters the service bills for this request (tag-stripped text,
    /// not UTF-8 bytes)
    pub fn billable_chars(&self) -> u64 {
        markup::billable_chars(&self.ssml)
    }
}

/// Audio produced for one chunk. Ownership transfers to the assembler, which
/// consumes results strictly in chunk-index order.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// Raw WAV (LINEAR16) bytes
    pub audio: Vec<u8>,
    /// Backend's duration estimate; the assembler measures the real value
    pub duration_estimate_ms: u64,
    /// Characters the service charged for this request
    pub billable_chars: u64,
}

/// Common trait for all speech synthesis backends
///
/// This trait defines the interface that all backend implementations must
/// follow, allowing them to be used interchangeably by the pipeline.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + Debug {
    /// Synthesize one request to audio
    ///
    /// # Arguments
    /// * `request` - The markup fragment and voice settings
    ///
    /// # Returns
    /// * `Result<SynthesisResult, SynthesisError>` - Audio bytes and billing
    ///   info, or a transient/fatal failure
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisResult, SynthesisError>;

    /// Test the connection to the backend
    async fn test_connection(&self) -> Result<(), SynthesisError>;
}

/// Retry configuration for transient synthesis failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled on each attempt
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// Backoff for the given attempt: exponential with uniform jitter.
    /// A server-provided retry hint overrides the computed delay when longer.
    fn delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let exponential = self.backoff_ms.saturating_mul(1u64 << attempt.min(10));
        let jitter = rand::rng().random_range(0..=250u64);
        let computed = exponential + jitter;
        let hinted = retry_after_secs.map(|s| s * 1000).unwrap_or(0);
        Duration::from_millis(computed.max(hinted))
    }
}

/// Synthesize with retries on transient failures.
///
/// Fatal failures return immediately; transient ones are retried up to the
/// policy bound with exponential backoff and jitter. When retries exhaust,
/// the last transient error is returned and the caller decides the job's
/// fate — a chunk is never silently skipped.
pub async fn synthesize_with_retry(
    synthesizer: &dyn SpeechSynthesizer,
    request: &SynthesisRequest,
    policy: &RetryPolicy,
) -> Result<SynthesisResult, SynthesisError> {
    let mut attempt = 0u32;
    loop {
        match synthesizer.synthesize(request).await {
            Ok(result) => return Ok(result),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let retry_after = match &err {
                    SynthesisError::Transient { retry_after_secs, .. } => *retry_after_secs,
                    _ => None,
                };
                let delay = policy.delay(attempt, retry_after);
                attempt += 1;
                warn!(
                    "Transient synthesis failure (attempt {}/{}), retrying in {}ms: {}",
                    attempt,
                    policy.max_retries,
                    delay.as_millis(),
                    err
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

pub mod google;
pub mod mock;
