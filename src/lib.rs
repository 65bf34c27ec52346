/*!
 * # Papercast
 *
 * A Rust library for turning marked-up articles into narrated audio using
 * cloud text-to-speech.
 *
 * ## Features
 *
 * - Validate and repair speech markup (SSML subset) before spending money
 * - Split documents into service-sized chunks at structural boundaries
 * - Synthesize chunks concurrently with retry and rate limiting
 * - Assemble audio in document order with exact measured durations
 * - Resolve section headers into chapter markers on the audio timeline
 * - Export tagged MP3/OGG/M4B (with chapters) or plain WAV
 * - Track billable characters and estimated cost per job
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `markup`: Markup validation, repair, and canonical serialization
 * - `chunker`: Size-bounded document splitting
 * - `chapters`: Chapter extraction from section headers
 * - `synthesis`: Speech synthesis backends:
 *   - `synthesis::google`: Google Cloud Text-to-Speech client
 *   - `synthesis::mock`: Test double with scripted behaviors
 * - `assembler`: Ordered audio assembly and chapter time resolution
 * - `exporter`: Normalization, tagging, and container export
 * - `cost`: Billable character ledger and cost estimation
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod assembler;
pub mod chapters;
pub mod chunker;
pub mod cost;
pub mod errors;
pub mod exporter;
pub mod file_utils;
pub mod markup;
pub mod synthesis;

// Re-export main types for easier usage
pub use app_config::{Config, VoiceModel};
pub use app_controller::{Controller, JobMetadata, JobReport};
pub use markup::Document;
pub use synthesis::{SpeechSynthesizer, SynthesisRequest, SynthesisResult};
pub use errors::{AppError, ChunkError, ExportError, MarkupError, PipelineError, SynthesisError};
