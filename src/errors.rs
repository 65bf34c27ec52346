/*!
 * Error types for the papercast application.
 *
 * This module contains custom error types for different parts of the pipeline,
 * using the thiserror crate for ergonomic error definitions.
 */

// Allow dead code - error types are for library consumers
#![allow(dead_code)]

use thiserror::Error;

/// Errors produced while parsing or repairing document markup
#[derive(Error, Debug)]
pub enum MarkupError {
    /// Input could not be parsed even after bounded repair
    #[error("Malformed markup: {reason}")]
    Malformed {
        /// Why the document was rejected
        reason: String,
    },
}

/// Errors produced while splitting a document into synthesis chunks
#[derive(Error, Debug)]
pub enum ChunkError {
    /// A structural unit cannot fit the byte limit even after
    /// sentence-level subdivision. Silent truncation is never an option
    /// for narrated audio, so the job refuses to start.
    #[error("Block {block_index} serializes to {size} bytes which exceeds the {limit} byte limit even after sentence splitting")]
    TooLarge {
        /// Index of the offending top-level block
        block_index: usize,
        /// Serialized size of the smallest unsplittable fragment
        size: usize,
        /// The configured per-request byte limit
        limit: usize,
    },
}

/// Errors returned by the speech synthesis service boundary
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// Retryable failure: rate limit, network error, timeout, 5xx
    #[error("Transient synthesis failure: {message}")]
    Transient {
        /// Description of the failure
        message: String,
        /// Server-provided retry hint, if any
        retry_after_secs: Option<u64>,
    },

    /// Non-retryable failure: rejected markup, bad credentials, quota
    #[error("Fatal synthesis failure: {message}")]
    Fatal {
        /// Description of the failure
        message: String,
    },

    /// The service returned audio bytes that could not be decoded
    #[error("Invalid audio returned by synthesis service: {0}")]
    InvalidAudio(String),
}

impl SynthesisError {
    /// Whether the retry loop should attempt this request again
    pub fn is_retryable(&self) -> bool {
        matches!(self, SynthesisError::Transient { .. })
    }
}

/// Errors produced while encoding and tagging the final audio file
#[derive(Error, Debug)]
pub enum ExportError {
    /// The requested container format is not recognized
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Writing the output file failed
    #[error("Export I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external encoder rejected the input or crashed
    #[error("Encoder failed: {0}")]
    Encoder(String),
}

/// Errors that abort a whole synthesis job
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A chunk exhausted its retries or hit a fatal synthesis error.
    /// Skipping a chunk would produce coherent-sounding audio with content
    /// silently missing, so the whole job fails instead.
    #[error("Job incomplete: chunk {chunk_index} failed: {source}")]
    JobIncomplete {
        /// Index of the chunk that could not be synthesized
        chunk_index: usize,
        /// The underlying synthesis failure
        #[source]
        source: SynthesisError,
    },

    /// The caller cancelled the job; partial audio is discarded
    #[error("Job cancelled")]
    Cancelled,

    /// Chunks were handed to the assembler out of index order
    #[error("Out-of-order assembly: expected chunk {expected}, got {got}")]
    OutOfOrder {
        /// The next index the assembler would accept
        expected: usize,
        /// The index actually supplied
        got: usize,
    },

    /// Synthesized chunks disagree on sample rate or channel count
    #[error("Audio format mismatch at chunk {chunk_index}: {message}")]
    FormatMismatch {
        /// Index of the mismatching chunk
        chunk_index: usize,
        /// What differed
        message: String,
    },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from markup validation/repair
    #[error("Markup error: {0}")]
    Markup(#[from] MarkupError),

    /// Error from chunking
    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// Error from the synthesis service
    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Error that aborted the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Error from export/tagging
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
