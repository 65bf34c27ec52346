use std::io::Cursor;
use std::ops::Range;
use log::{debug, warn};

use crate::chapters::Chapter;
use crate::errors::PipelineError;

// @module: Ordered audio assembly and chapter time resolution

/// Placement of one chunk's audio on the assembled timeline
#[derive(Debug, Clone)]
pub struct ChunkTiming {
    /// Chunk ordinal within the job
    pub index: usize,
    /// Start offset in the assembled audio, milliseconds
    pub start_ms: u64,
    /// Measured duration of this chunk's audio, milliseconds
    pub duration_ms: u64,
    /// Narration-text range the chunk covers
    pub text_range: Range<usize>,
}

/// The assembled audio timeline for one job.
///
/// Chunk audio must be appended in strict index order with no gaps; durations
/// are measured from decoded PCM sample counts, never estimated. All appended
/// audio must share one format, since the assembled stream is written as a
/// single PCM track.
#[derive(Debug, Default)]
pub struct AudioTrack {
    spec: Option<hound::WavSpec>,
    samples: Vec<i16>,
    timings: Vec<ChunkTiming>,
    next_index: usize,
}

impl AudioTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk's WAV audio to the timeline.
    ///
    /// Rejects out-of-order appends and audio whose format differs from what
    /// the track already holds.
    pub fn append(
        &mut self,
        chunk_index: usize,
        text_range: Range<usize>,
        wav_bytes: &[u8],
    ) -> Result<(), PipelineError> {
        if chunk_index != self.next_index {
            return Err(PipelineError::OutOfOrder {
                expected: self.next_index,
                got: chunk_index,
            });
        }

        let mut reader = hound::WavReader::new(Cursor::new(wav_bytes)).map_err(|e| {
            PipelineError::FormatMismatch {
                chunk_index,
                message: format!("undecodable audio: {}", e),
            }
        })?;
        let spec = reader.spec();

        if spec.channels != 1
            || spec.bits_per_sample != 16
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(PipelineError::FormatMismatch {
                chunk_index,
                message: format!(
                    "expected 16-bit mono PCM, got {} channel(s) at {} bits",
                    spec.channels, spec.bits_per_sample
                ),
            });
        }
        if let Some(existing) = self.spec {
            if existing.sample_rate != spec.sample_rate {
                return Err(PipelineError::FormatMismatch {
                    chunk_index,
                    message: format!(
                        "sample rate {} differs from track rate {}",
                        spec.sample_rate, existing.sample_rate
                    ),
                });
            }
        } else {
            self.spec = Some(spec);
        }

        let start_ms = self.total_duration_ms();
        let before = self.samples.len();
        for sample in reader.samples::<i16>() {
            let sample = sample.map_err(|e| PipelineError::FormatMismatch {
                chunk_index,
                message: format!("corrupt sample data: {}", e),
            })?;
            self.samples.push(sample);
        }
        let appended = self.samples.len() - before;
        let duration_ms = appended as u64 * 1000 / spec.sample_rate as u64;

        debug!(
            "Appended chunk {} ({} samples, {}ms at offset {}ms)",
            chunk_index, appended, duration_ms, start_ms
        );

        self.timings.push(ChunkTiming {
            index: chunk_index,
            start_ms,
            duration_ms,
            text_range,
        });
        self.next_index += 1;
        Ok(())
    }

    /// Number of chunks appended so far
    pub fn chunk_count(&self) -> usize {
        self.timings.len()
    }

    /// Total assembled duration, measured from the PCM sample count.
    /// Computed from the cumulative total so per-chunk rounding never drifts.
    pub fn total_duration_ms(&self) -> u64 {
        match self.spec {
            Some(spec) => self.samples.len() as u64 * 1000 / spec.sample_rate as u64,
            None => 0,
        }
    }

    /// Per-chunk placements, in index order
    pub fn timings(&self) -> &[ChunkTiming] {
        &self.timings
    }

    /// Format of the assembled audio, if anything has been appended
    pub fn spec(&self) -> Option<hound::WavSpec> {
        self.spec
    }

    /// Assembled PCM samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Mutable access to the PCM samples, for normalization before export
    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    /// Resolve chapter text offsets to timeline positions.
    ///
    /// A chapter's time is interpolated within the chunk that covers its
    /// source offset: the chunk's start plus the offset's fraction of the
    /// chunk's text range, scaled to the chunk's measured duration. This is
    /// an approximation (speech rate varies within a chunk), but chapters
    /// open sections, and a header at a chunk boundary resolves exactly to
    /// the chunk start.
    ///
    /// Resolved times are guaranteed non-decreasing in document order and
    /// never exceed the total duration.
    pub fn resolve_chapters(&self, chapters: &mut [Chapter]) {
        let total = self.total_duration_ms();
        let mut previous = 0u64;

        for chapter in chapters.iter_mut() {
            let resolved = match self.timing_for_offset(chapter.source_offset) {
                Some(timing) => {
                    let span = timing.text_range.end - timing.text_range.start;
                    let within = chapter.source_offset.saturating_sub(timing.text_range.start);
                    let offset_ms = if span == 0 {
                        0
                    } else {
                        timing.duration_ms * within as u64 / span as u64
                    };
                    timing.start_ms + offset_ms
                }
                None => {
                    warn!(
                        "Chapter '{}' at offset {} is outside the assembled timeline",
                        chapter.title, chapter.source_offset
                    );
                    total
                }
            };
            // Keep the sequence monotonic even if interpolation wobbles
            let resolved = resolved.max(previous).min(total);
            previous = resolved;
            chapter.resolved_time_ms = Some(resolved);
        }
    }

    /// Find the chunk whose text range covers the given narration offset
    fn timing_for_offset(&self, offset: usize) -> Option<&ChunkTiming> {
        self.timings
            .iter()
            .find(|t| t.text_range.contains(&offset))
            .or_else(|| {
                // Boundary offsets fall between ranges; take the first chunk
                // starting at or after the offset
                self.timings.iter().find(|t| t.text_range.start >= offset)
            })
    }
}
