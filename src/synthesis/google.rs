use std::time::Duration;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::app_config::{SynthesisConfig, VoiceModel};
use crate::errors::SynthesisError;
use crate::synthesis::{SpeechSynthesizer, SynthesisRequest, SynthesisResult};

/// Google Cloud Text-to-Speech REST client
#[derive(Debug)]
pub struct GoogleSynthesizer {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint URL
    endpoint: String,
}

/// Top-level synthesize request body
#[derive(Debug, Serialize)]
struct SynthesizeBody<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    #[serde(rename = "audioConfig")]
    audio_config: AudioConfigBody,
}

/// Markup input for the request
#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    ssml: &'a str,
}

/// Voice selection parameters
#[derive(Debug, Serialize)]
struct VoiceSelection<'a> {
    #[serde(rename = "languageCode")]
    language_code: &'a str,
    name: &'a str,
}

/// Audio output parameters
#[derive(Debug, Serialize)]
struct AudioConfigBody {
    /// Always LINEAR16 so durations can be measured from PCM
    #[serde(rename = "audioEncoding")]
    audio_encoding: &'static str,

    #[serde(rename = "speakingRate")]
    speaking_rate: f64,

    #[serde(rename = "volumeGainDb")]
    volume_gain_db: f64,

    #[serde(rename = "sampleRateHertz")]
    sample_rate_hertz: u32,

    /// Pitch in semitones. Chirp 3 HD voices reject this field, so it is
    /// omitted for them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pitch: Option<f64>,
}

/// Successful synthesize response
#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    /// Base64-encoded audio bytes
    #[serde(rename = "audioContent")]
    audio_content: String,
}

impl GoogleSynthesizer {
    /// Create a new client from synthesis settings
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
        }
    }

    fn api_url(&self) -> String {
        format!(
            "{}/v1/text:synthesize?key={}",
            self.endpoint.trim_end_matches('/'),
            self.api_key
        )
    }

    /// Classify an HTTP failure status. Rate limiting and server errors are
    /// retryable; everything else means the request itself is bad.
    fn classify_status(
        status: StatusCode,
        retry_after_secs: Option<u64>,
        body: String,
    ) -> SynthesisError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            SynthesisError::Transient {
                message: format!("service returned {}: {}", status, body),
                retry_after_secs,
            }
        } else {
            SynthesisError::Fatal {
                message: format!("service returned {}: {}", status, body),
            }
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisResult, SynthesisError> {
        let pitch = match request.voice.model() {
            VoiceModel::Neural2 => Some(request.voice.pitch_semitones),
            VoiceModel::Chirp3Hd => None,
        };

        let body = SynthesizeBody {
            input: SynthesisInput { ssml: &request.ssml },
            voice: VoiceSelection {
                language_code: &request.voice.language_code,
                name: &request.voice.voice_name,
            },
            audio_config: AudioConfigBody {
                audio_encoding: "LINEAR16",
                speaking_rate: request.voice.speaking_rate,
                volume_gain_db: request.voice.volume_gain_db,
                sample_rate_hertz: request.sample_rate_hertz,
                pitch,
            },
        };

        debug!(
            "Submitting {} byte request to {} voice {}",
            request.ssml.len(),
            self.endpoint,
            request.voice.voice_name
        );

        let response = self
            .client
            .post(self.api_url())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                // Connection and timeout failures are worth retrying
                SynthesisError::Transient {
                    message: format!("request failed: {}", e),
                    retry_after_secs: None,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response body".to_string());
            error!("Synthesis API error ({}): {}", status, error_text);
            return Err(Self::classify_status(status, retry_after_secs, error_text));
        }

        let parsed = response.json::<SynthesizeResponse>().await.map_err(|e| {
            SynthesisError::InvalidAudio(format!("unparseable response: {}", e))
        })?;

        let audio = BASE64
            .decode(parsed.audio_content.as_bytes())
            .map_err(|e| SynthesisError::InvalidAudio(format!("bad base64 audio: {}", e)))?;
        if audio.is_empty() {
            return Err(SynthesisError::InvalidAudio("empty audio payload".to_string()));
        }

        // LINEAR16 mono: 2 bytes per sample after the 44-byte header
        let pcm_bytes = audio.len().saturating_sub(44) as u64;
        let duration_estimate_ms =
            pcm_bytes * 1000 / (request.sample_rate_hertz as u64 * 2).max(1);

        Ok(SynthesisResult {
            audio,
            duration_estimate_ms,
            billable_chars: request.billable_chars(),
        })
    }

    async fn test_connection(&self) -> Result<(), SynthesisError> {
        let url = format!(
            "{}/v1/voices?key={}",
            self.endpoint.trim_end_matches('/'),
            self.api_key
        );
        let response = self.client.get(&url).send().await.map_err(|e| {
            SynthesisError::Transient {
                message: format!("connection test failed: {}", e),
                retry_after_secs: None,
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::Fatal {
                message: format!("connection test returned {}", status),
            });
        }
        Ok(())
    }
}
