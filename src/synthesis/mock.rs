/*!
 * Mock synthesizer implementations for testing.
 *
 * This module provides mock backends that simulate different behaviors:
 * - `MockSynthesizer::working()` - Always succeeds with generated audio
 * - `MockSynthesizer::transient_times(n)` - Fails n times, then succeeds
 * - `MockSynthesizer::failing()` - Always fails fatally
 */

use async_trait::async_trait;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::SynthesisError;
use crate::synthesis::{SpeechSynthesizer, SynthesisRequest, SynthesisResult};

/// Milliseconds of generated audio per billable character
const MS_PER_CHAR: u64 = 10;

/// Behavior mode for the mock synthesizer
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with generated audio
    Working,
    /// First N requests fail transiently, then all succeed
    TransientTimes { failures: usize },
    /// Requests whose markup contains the needle always fail transiently;
    /// everything else succeeds
    TransientWhenContains { needle: String },
    /// Always fails with a fatal error
    Failing,
    /// Succeeds but returns bytes that are not decodable audio
    Garbage,
    /// Simulates a slow backend (for cancellation testing)
    Slow { delay_ms: u64 },
}

/// Mock synthesizer for testing pipeline behavior
#[derive(Debug)]
pub struct MockSynthesizer {
    /// Behavior mode
    behavior: MockBehavior,
    /// Total requests observed, shared so tests can assert on it
    request_count: Arc<AtomicUsize>,
    /// Sample rate of the generated audio
    sample_rate: u32,
}

impl MockSynthesizer {
    /// Create a new mock synthesizer with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            sample_rate: 24_000,
        }
    }

    /// Create a working mock that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock that fails transiently N times before succeeding
    pub fn transient_times(failures: usize) -> Self {
        Self::new(MockBehavior::TransientTimes { failures })
    }

    /// Create a mock that fails transiently whenever the markup contains
    /// the given needle
    pub fn transient_when_contains(needle: impl Into<String>) -> Self {
        Self::new(MockBehavior::TransientWhenContains { needle: needle.into() })
    }

    /// Create a mock that always fails fatally
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that returns undecodable audio
    pub fn garbage() -> Self {
        Self::new(MockBehavior::Garbage)
    }

    /// Create a slow mock for cancellation tests
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Handle to the shared request counter
    pub fn request_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.request_count)
    }

    /// Number of requests observed so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Generate a silent WAV of the given duration.
    ///
    /// Writing into a cursor never fails, so the hound errors are mapped to
    /// `InvalidAudio` only to satisfy the signature.
    pub fn silence_wav(sample_rate: u32, duration_ms: u64) -> Result<Vec<u8>, SynthesisError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| SynthesisError::InvalidAudio(e.to_string()))?;
            let samples = sample_rate as u64 * duration_ms / 1000;
            for _ in 0..samples {
                writer
                    .write_sample(0i16)
                    .map_err(|e| SynthesisError::InvalidAudio(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| SynthesisError::InvalidAudio(e.to_string()))?;
        }
        Ok(cursor.into_inner())
    }

    fn generate(&self, request: &SynthesisRequest) -> Result<SynthesisResult, SynthesisError> {
        let billable_chars = request.billable_chars();
        // Duration scales with text length so timeline math stays meaningful
        let duration_ms = (billable_chars * MS_PER_CHAR).max(MS_PER_CHAR);
        let audio = Self::silence_wav(self.sample_rate, duration_ms)?;
        Ok(SynthesisResult {
            audio,
            duration_estimate_ms: duration_ms,
            billable_chars,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisResult, SynthesisError> {
        let seen = self.request_count.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            MockBehavior::Working => self.generate(request),
            MockBehavior::TransientTimes { failures } => {
                if seen < *failures {
                    Err(SynthesisError::Transient {
                        message: format!("simulated transient failure {}", seen + 1),
                        retry_after_secs: None,
                    })
                } else {
                    self.generate(request)
                }
            }
            MockBehavior::TransientWhenContains { needle } => {
                if request.ssml.contains(needle.as_str()) {
                    Err(SynthesisError::Transient {
                        message: format!("simulated transient failure for '{}'", needle),
                        retry_after_secs: None,
                    })
                } else {
                    self.generate(request)
                }
            }
            MockBehavior::Failing => Err(SynthesisError::Fatal {
                message: "simulated fatal failure".to_string(),
            }),
            MockBehavior::Garbage => Ok(SynthesisResult {
                audio: vec![0xDE, 0xAD, 0xBE, 0xEF],
                duration_estimate_ms: 0,
                billable_chars: request.billable_chars(),
            }),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
                self.generate(request)
            }
        }
    }

    async fn test_connection(&self) -> Result<(), SynthesisError> {
        match self.behavior {
            MockBehavior::Failing => Err(SynthesisError::Fatal {
                message: "simulated fatal failure".to_string(),
            }),
            _ => Ok(()),
        }
    }
}
