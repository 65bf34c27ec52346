use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Voice selection and prosody settings
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Synthesis service settings
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Audio output settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Per-character pricing used for cost estimation
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Voice model family, inferred from the voice name
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoiceModel {
    /// Chirp 3 HD voices (premium tier)
    Chirp3Hd,
    /// Neural2 voices (standard tier, supports pitch)
    Neural2,
}

impl VoiceModel {
    // @returns: Capitalized model name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Chirp3Hd => "Chirp 3 HD",
            Self::Neural2 => "Neural2",
        }
    }
}

impl std::fmt::Display for VoiceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Voice selection and prosody configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VoiceConfig {
    /// Full voice name (e.g., "en-GB-Chirp3-HD-Charon")
    #[serde(default = "default_voice_name")]
    pub voice_name: String,

    /// BCP-47 language code
    #[serde(default = "default_language_code")]
    pub language_code: String,

    /// Speaking rate multiplier (0.25 to 4.0)
    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f64,

    /// Pitch adjustment in semitones. Only effective for Neural2 voices;
    /// Chirp 3 HD ignores it.
    #[serde(default)]
    pub pitch_semitones: f64,

    /// Volume gain in dB
    #[serde(default)]
    pub volume_gain_db: f64,
}

impl VoiceConfig {
    /// Infer the voice model family from the voice name
    pub fn model(&self) -> VoiceModel {
        if self.voice_name.contains("Neural2") {
            VoiceModel::Neural2
        } else {
            VoiceModel::Chirp3Hd
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_name: default_voice_name(),
            language_code: default_language_code(),
            speaking_rate: default_speaking_rate(),
            pitch_semitones: 0.0,
            volume_gain_db: 0.0,
        }
    }
}

/// Synthesis service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SynthesisConfig {
    /// Service endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key for the service
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of concurrent synthesis requests
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Retry count for transient failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff for retries (in milliseconds), doubled on each attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Fixed delay before each request, in milliseconds.
    ///
    /// Chirp 3 HD voices are limited to 200 requests per minute; the
    /// default of 300ms keeps a safety margin below that.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Maximum serialized request payload in bytes. The service rejects
    /// requests above 5000 bytes; the default leaves a margin.
    #[serde(default = "default_chunk_byte_limit")]
    pub chunk_byte_limit: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            concurrent_requests: default_concurrent_requests(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            chunk_byte_limit: default_chunk_byte_limit(),
        }
    }
}

/// Audio output configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    /// Default output format when the output path has no known extension
    #[serde(default = "default_format")]
    pub format: String,

    /// Encoder bitrate for lossy formats
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Whether to peak-normalize before encoding
    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Sample rate requested from the synthesis service
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hertz: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            bitrate: default_bitrate(),
            normalize: true,
            sample_rate_hertz: default_sample_rate(),
        }
    }
}

/// Per-character USD pricing by voice model
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PricingConfig {
    /// USD per million characters for Chirp 3 HD voices
    #[serde(default = "default_chirp3_price")]
    pub chirp3_hd_per_million: f64,

    /// USD per million characters for Neural2 voices
    #[serde(default = "default_neural2_price")]
    pub neural2_per_million: f64,
}

impl PricingConfig {
    /// USD rate per single billable character for the given model
    pub fn rate_per_char(&self, model: VoiceModel) -> f64 {
        match model {
            VoiceModel::Chirp3Hd => self.chirp3_hd_per_million / 1_000_000.0,
            VoiceModel::Neural2 => self.neural2_per_million / 1_000_000.0,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            chirp3_hd_per_million: default_chirp3_price(),
            neural2_per_million: default_neural2_price(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_voice_name() -> String {
    "en-GB-Chirp3-HD-Charon".to_string()
}

fn default_language_code() -> String {
    "en-GB".to_string()
}

fn default_speaking_rate() -> f64 {
    0.95
}

fn default_endpoint() -> String {
    "https://texttospeech.googleapis.com".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_retry_count() -> u32 {
    3 // Default to 3 retries
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_rate_limit_delay_ms() -> u64 {
    300
}

fn default_chunk_byte_limit() -> usize {
    crate::chunker::DEFAULT_CHUNK_LIMIT
}

fn default_format() -> String {
    "mp3".to_string()
}

fn default_bitrate() -> String {
    "128k".to_string()
}

fn default_sample_rate() -> u32 {
    24_000
}

fn default_chirp3_price() -> f64 {
    30.0
}

fn default_neural2_price() -> f64 {
    16.0
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.synthesis.api_key.is_empty() {
            return Err(anyhow!("Synthesis API key is required"));
        }

        if !(0.25..=4.0).contains(&self.voice.speaking_rate) {
            return Err(anyhow!(
                "Speaking rate {} is outside the supported range 0.25-4.0",
                self.voice.speaking_rate
            ));
        }

        if self.synthesis.chunk_byte_limit < 200 {
            return Err(anyhow!(
                "Chunk byte limit {} is too small to fit any markup envelope",
                self.synthesis.chunk_byte_limit
            ));
        }

        if self.synthesis.concurrent_requests == 0 {
            return Err(anyhow!("concurrent_requests must be at least 1"));
        }

        Ok(())
    }

    /// Per-character rate for the configured voice
    pub fn active_rate_per_char(&self) -> f64 {
        self.pricing.rate_per_char(self.voice.model())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            voice: VoiceConfig::default(),
            synthesis: SynthesisConfig::default(),
            audio: AudioConfig::default(),
            pricing: PricingConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
