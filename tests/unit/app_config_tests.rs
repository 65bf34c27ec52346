/*!
 * Tests for application configuration functionality
 */

use papercast::app_config::{Config, LogLevel, VoiceModel};

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.voice.voice_name, "en-GB-Chirp3-HD-Charon");
    assert_eq!(config.voice.language_code, "en-GB");
    assert!((config.voice.speaking_rate - 0.95).abs() < f64::EPSILON);

    assert_eq!(config.synthesis.endpoint, "https://texttospeech.googleapis.com");
    assert!(config.synthesis.api_key.is_empty());
    assert_eq!(config.synthesis.concurrent_requests, 4);
    assert_eq!(config.synthesis.retry_count, 3);
    assert_eq!(config.synthesis.chunk_byte_limit, 4800);

    assert_eq!(config.audio.format, "mp3");
    assert_eq!(config.audio.sample_rate_hertz, 24_000);
    assert!(config.audio.normalize);

    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_voiceModel_fromVoiceName_shouldInferFamily() {
    let mut config = Config::default();
    assert_eq!(config.voice.model(), VoiceModel::Chirp3Hd);

    config.voice.voice_name = "en-US-Neural2-J".to_string();
    assert_eq!(config.voice.model(), VoiceModel::Neural2);
}

#[test]
fn test_ratePerChar_byModel_shouldMatchPricingTable() {
    let config = Config::default();
    let chirp_rate = config.pricing.rate_per_char(VoiceModel::Chirp3Hd);
    let neural_rate = config.pricing.rate_per_char(VoiceModel::Neural2);

    assert!((chirp_rate - 30.0 / 1_000_000.0).abs() < 1e-15);
    assert!((neural_rate - 16.0 / 1_000_000.0).abs() < 1e-15);

    // The active rate follows the configured voice
    assert!((config.active_rate_per_char() - chirp_rate).abs() < 1e-15);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    // Start with a valid config
    let mut config = Config::default();
    config.synthesis.api_key = "key".to_string();
    assert!(config.validate().is_ok());

    // Missing API key
    config.synthesis.api_key = String::new();
    assert!(config.validate().is_err());
    config.synthesis.api_key = "key".to_string();

    // Speaking rate outside the supported range
    config.voice.speaking_rate = 5.0;
    assert!(config.validate().is_err());
    config.voice.speaking_rate = 1.0;

    // Chunk limit too small for any envelope
    config.synthesis.chunk_byte_limit = 50;
    assert!(config.validate().is_err());
    config.synthesis.chunk_byte_limit = 4800;

    // Zero concurrency
    config.synthesis.concurrent_requests = 0;
    assert!(config.validate().is_err());
}

/// Partial JSON fills everything else from defaults
#[test]
fn test_config_deserialization_withPartialJson_shouldApplyDefaults() {
    let json = r#"{ "synthesis": { "api_key": "secret" }, "voice": { "voice_name": "en-US-Neural2-J" } }"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.synthesis.api_key, "secret");
    assert_eq!(config.voice.voice_name, "en-US-Neural2-J");
    // Untouched fields come from defaults
    assert_eq!(config.synthesis.timeout_secs, 60);
    assert_eq!(config.voice.language_code, "en-GB");
    assert_eq!(config.audio.bitrate, "128k");
}

#[test]
fn test_config_serialization_roundTrip_shouldPreserveValues() {
    let mut config = Config::default();
    config.synthesis.api_key = "round-trip".to_string();
    config.voice.speaking_rate = 1.2;

    let json = serde_json::to_string_pretty(&config).unwrap();
    let parsed: Config = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.synthesis.api_key, "round-trip");
    assert!((parsed.voice.speaking_rate - 1.2).abs() < f64::EPSILON);
    assert_eq!(parsed.log_level, LogLevel::Info);
}
