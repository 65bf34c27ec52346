use anyhow::Result;
use log::{error, warn, info, debug};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex as TokioMutex, Semaphore};
use tokio::time::Instant as TokioInstant;
use indicatif::{ProgressBar, ProgressStyle};

use crate::app_config::Config;
use crate::assembler::AudioTrack;
use crate::chapters::{self, Chapter};
use crate::chunker;
use crate::cost::{CostLedger, CostTotals};
use crate::errors::{AppError, PipelineError, SynthesisError};
use crate::exporter::{self, AudioFormat, TagSet};
use crate::file_utils::FileManager;
use crate::markup::{self, Document};
use crate::synthesis::google::GoogleSynthesizer;
use crate::synthesis::{synthesize_with_retry, RetryPolicy, SpeechSynthesizer, SynthesisRequest, SynthesisResult};

// @module: Application controller for audio narration jobs

/// Shared flag a caller can set to stop a running job at the next safe point
pub type CancellationFlag = Arc<AtomicBool>;

/// Descriptive metadata for the produced audio
#[derive(Debug, Clone, Default)]
pub struct JobMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
}

/// One resolved chapter marker in the final audio
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterMark {
    pub title: String,
    pub start_ms: u64,
}

/// Outcome of a completed job
#[derive(Debug)]
pub struct JobReport {
    /// Path of the written audio, or `None` when there was nothing to speak
    pub output_path: Option<PathBuf>,
    /// Number of synthesis requests the document was split into
    pub chunk_count: usize,
    /// Measured duration of the assembled audio
    pub duration_ms: u64,
    /// Chapter markers with resolved times
    pub chapters: Vec<ChapterMark>,
    /// Billable usage totals
    pub cost: CostTotals,
    /// Non-fatal issues encountered along the way (repairs, skipped tags)
    pub warnings: Vec<String>,
}

/// Cost and shape of a job without contacting the synthesis service
#[derive(Debug)]
pub struct JobPlan {
    pub chunk_count: usize,
    pub chapter_count: usize,
    pub billable_chars: u64,
    pub estimated_cost_usd: f64,
    pub repairs: Vec<String>,
}

/// Main application controller for narration jobs
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the full workflow for an input markup file.
    ///
    /// Reads the file, synthesizes it through the configured service, and
    /// writes the tagged audio next to the input unless an explicit output
    /// path is given.
    pub async fn run(
        &self,
        input_file: PathBuf,
        output_path: Option<PathBuf>,
        metadata: JobMetadata,
    ) -> Result<JobReport, AppError> {
        if !FileManager::file_exists(&input_file) {
            return Err(AppError::File(format!(
                "Input file does not exist: {:?}",
                input_file
            )));
        }
        let raw = FileManager::read_to_string(&input_file)?;

        let output_path = output_path.unwrap_or_else(|| {
            FileManager::generate_output_path(&input_file, &self.config.audio.format)
        });

        let synthesizer: Arc<dyn SpeechSynthesizer> =
            Arc::new(GoogleSynthesizer::new(&self.config.synthesis));

        // Progress bar over synthesized chunks
        let progress_bar = ProgressBar::new(0);
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(template_result.progress_chars("█▓▒░"));
        progress_bar.set_message("Synthesizing");

        let pb = progress_bar.clone();
        let cancel: CancellationFlag = Arc::new(AtomicBool::new(false));
        let result = self
            .run_job(
                &raw,
                synthesizer,
                &metadata,
                &output_path,
                &cancel,
                move |completed, total| {
                    pb.set_length(total as u64);
                    pb.set_position(completed as u64);
                },
            )
            .await;
        progress_bar.finish_and_clear();

        let report = result?;
        for warning in &report.warnings {
            warn!("{}", warning);
        }
        info!(
            "Job complete: {} chunk(s), {} duration, {} billable chars, est. ${:.4}",
            report.chunk_count,
            Self::format_duration(Duration::from_millis(report.duration_ms)),
            report.cost.billable_chars,
            report.cost.estimated_cost_usd
        );
        if let Some(path) = &report.output_path {
            info!("Success: {}", path.display());
        }
        Ok(report)
    }

    /// Estimate a job without contacting the synthesis service
    pub fn plan(&self, raw: &str) -> Result<JobPlan, AppError> {
        let (document, repairs) = markup::Document::parse(raw)?;
        let chunks = chunker::split(&document, self.config.synthesis.chunk_byte_limit)?;
        let chapters = chapters::extract(&document);
        let billable_chars: u64 = chunks.iter().map(|c| markup::billable_chars(&c.ssml)).sum();
        Ok(JobPlan {
            chunk_count: chunks.len(),
            chapter_count: chapters.len(),
            billable_chars,
            estimated_cost_usd: billable_chars as f64 * self.config.active_rate_per_char(),
            repairs: repairs.iter().map(|r| r.to_string()).collect(),
        })
    }

    /// Run one narration job end to end.
    ///
    /// Validates and repairs the markup, splits it into service-sized chunks,
    /// checks the service is reachable before the first paid request,
    /// synthesizes the chunks concurrently, assembles the audio in document order,
    /// resolves chapter times, and exports the tagged result. If any chunk
    /// cannot be synthesized after retries, no output file is written.
    pub async fn run_job(
        &self,
        raw_markup: &str,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        metadata: &JobMetadata,
        output_path: &Path,
        cancel: &CancellationFlag,
        progress_callback: impl Fn(usize, usize) + Clone + Send + 'static,
    ) -> Result<JobReport, AppError> {
        let start_time = std::time::Instant::now();
        let mut ledger = CostLedger::new(self.config.active_rate_per_char());

        // Resolve the output format up front so a bad path fails before any
        // paid synthesis happens
        let format = self.resolve_format(output_path)?;

        let (document, repairs) = markup::Document::parse(raw_markup)?;
        let mut warnings: Vec<String> = repairs.iter().map(|r| format!("Repaired markup: {}", r)).collect();
        if !repairs.is_empty() {
            info!("Markup repaired with {} action(s)", repairs.len());
        }

        if document.is_empty() {
            warn!("Document contains no speakable text, nothing to synthesize");
            warnings.push("Document contains no speakable text; no audio was produced".to_string());
            return Ok(JobReport {
                output_path: None,
                chunk_count: 0,
                duration_ms: 0,
                chapters: Vec::new(),
                cost: ledger.total(),
                warnings,
            });
        }

        let mut chapter_list = chapters::extract(&document);
        let chunks = chunker::split(&document, self.config.synthesis.chunk_byte_limit)?;
        info!(
            "Document split into {} chunk(s), {} chapter(s) found",
            chunks.len(),
            chapter_list.len()
        );
        if !format.supports_chapters() && !chapter_list.is_empty() {
            warnings.push(format!(
                "WAV output cannot embed the {} chapter marker(s)",
                chapter_list.len()
            ));
        }

        // Check the service is reachable before the first paid request
        synthesizer.test_connection().await?;

        let results = self
            .synthesize_chunks(&chunks, synthesizer, cancel, progress_callback)
            .await?;

        if cancel.load(Ordering::SeqCst) {
            return Err(PipelineError::Cancelled.into());
        }

        // Assemble strictly in document order, recording usage per chunk
        let mut track = AudioTrack::new();
        for (chunk, result) in chunks.iter().zip(results.into_iter()) {
            let chars_in = chunk.ssml.chars().count() as u64;
            let chars_out = (chunk.text_range.end - chunk.text_range.start) as u64;
            track.append(chunk.index, chunk.text_range.clone(), &result.audio)?;
            ledger.record(chars_in, chars_out, result.billable_chars);
        }
        let duration_ms = track.total_duration_ms();
        debug!("Assembled {}ms of audio from {} chunk(s)", duration_ms, track.chunk_count());

        track.resolve_chapters(&mut chapter_list);

        if cancel.load(Ordering::SeqCst) {
            return Err(PipelineError::Cancelled.into());
        }

        if self.config.audio.normalize {
            exporter::normalize_peak(track.samples_mut());
        }

        let sample_rate = track
            .spec()
            .map(|s| s.sample_rate)
            .unwrap_or(self.config.audio.sample_rate_hertz);
        let tags = self.build_tags(metadata);
        exporter::export(
            track.samples(),
            sample_rate,
            &chapter_list,
            &tags,
            format,
            &self.config.audio.bitrate,
            output_path,
        )
        .await?;

        info!("{}", ledger.summary());
        let elapsed = start_time.elapsed();
        debug!("Job finished in {}", Self::format_duration(elapsed));

        Ok(JobReport {
            output_path: Some(output_path.to_path_buf()),
            chunk_count: chunks.len(),
            duration_ms,
            chapters: resolved_marks(&chapter_list),
            cost: ledger.total(),
            warnings,
        })
    }

    /// Synthesize all chunks with bounded concurrency.
    ///
    /// Requests are paced to stay under the service's rate limit and run
    /// under a semaphore sized from the configuration. The first failure sets
    /// a shared abort flag so queued chunks stop before spending money; the
    /// job then fails with the index of the lowest failed chunk.
    async fn synthesize_chunks(
        &self,
        chunks: &[chunker::Chunk],
        synthesizer: Arc<dyn SpeechSynthesizer>,
        cancel: &CancellationFlag,
        progress_callback: impl Fn(usize, usize) + Clone + Send + 'static,
    ) -> Result<Vec<SynthesisResult>, AppError> {
        let total_chunks = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.synthesis.concurrent_requests));
        let abort = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicUsize::new(0));
        let slots: Arc<StdMutex<Vec<Option<SynthesisResult>>>> =
            Arc::new(StdMutex::new((0..total_chunks).map(|_| None).collect()));
        let first_failure: Arc<StdMutex<Option<(usize, SynthesisError)>>> =
            Arc::new(StdMutex::new(None));
        // Next instant a request is allowed to start
        let pacing = Arc::new(TokioMutex::new(TokioInstant::now()));

        let retry_policy = RetryPolicy {
            max_retries: self.config.synthesis.retry_count,
            backoff_ms: self.config.synthesis.retry_backoff_ms,
        };
        let rate_limit_delay = Duration::from_millis(self.config.synthesis.rate_limit_delay_ms);

        stream::iter(chunks.iter().cloned())
            .map(|chunk| {
                let synthesizer = Arc::clone(&synthesizer);
                let semaphore = Arc::clone(&semaphore);
                let abort = Arc::clone(&abort);
                let cancel = Arc::clone(cancel);
                let completed = Arc::clone(&completed);
                let slots = Arc::clone(&slots);
                let first_failure = Arc::clone(&first_failure);
                let pacing = Arc::clone(&pacing);
                let progress_callback = progress_callback.clone();
                let voice = self.config.voice.clone();
                let sample_rate = self.config.audio.sample_rate_hertz;

                async move {
                    if abort.load(Ordering::SeqCst) || cancel.load(Ordering::SeqCst) {
                        return;
                    }

                    // Acquire a permit from the semaphore
                    let _permit = semaphore.acquire().await.unwrap();

                    if abort.load(Ordering::SeqCst) || cancel.load(Ordering::SeqCst) {
                        return;
                    }

                    // Space request starts out to respect the service rate limit
                    let start_at = {
                        let mut next_allowed = pacing.lock().await;
                        let at = (*next_allowed).max(TokioInstant::now());
                        *next_allowed = at + rate_limit_delay;
                        at
                    };
                    tokio::time::sleep_until(start_at).await;

                    let request = SynthesisRequest::for_chunk(&chunk, &voice, sample_rate);
                    debug!("Synthesizing chunk {} ({} bytes)", chunk.index, chunk.byte_size);

                    match synthesize_with_retry(synthesizer.as_ref(), &request, &retry_policy).await {
                        Ok(result) => {
                            slots.lock().unwrap()[chunk.index] = Some(result);
                            let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            progress_callback(current, total_chunks);
                        }
                        Err(e) => {
                            error!("Chunk {} failed after retries: {}", chunk.index, e);
                            abort.store(true, Ordering::SeqCst);
                            let mut failure = first_failure.lock().unwrap();
                            match &*failure {
                                Some((index, _)) if *index <= chunk.index => {}
                                _ => *failure = Some((chunk.index, e)),
                            }
                        }
                    }
                }
            })
            .buffer_unordered(self.config.synthesis.concurrent_requests)
            .collect::<Vec<_>>()
            .await;

        if cancel.load(Ordering::SeqCst) {
            return Err(PipelineError::Cancelled.into());
        }
        if let Some((chunk_index, source)) = first_failure.lock().unwrap().take() {
            return Err(PipelineError::JobIncomplete { chunk_index, source }.into());
        }

        let slots = slots.lock().unwrap().drain(..).collect::<Vec<_>>();
        let mut results = Vec::with_capacity(total_chunks);
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(result) => results.push(result),
                // A skipped slot with no recorded failure means cancellation
                // raced the abort flag
                None => {
                    return Err(PipelineError::JobIncomplete {
                        chunk_index: index,
                        source: SynthesisError::Fatal {
                            message: "chunk was never synthesized".to_string(),
                        },
                    }
                    .into())
                }
            }
        }
        Ok(results)
    }

    /// Pick the output format from the path extension, falling back to the
    /// configured default when the path has none
    fn resolve_format(&self, output_path: &Path) -> Result<AudioFormat, AppError> {
        match output_path.extension() {
            Some(_) => Ok(AudioFormat::from_path(output_path)?),
            None => Ok(self.config.audio.format.parse()?),
        }
    }

    fn build_tags(&self, metadata: &JobMetadata) -> TagSet {
        TagSet {
            title: metadata.title.clone(),
            artist: metadata.author.clone(),
            album: metadata.title.clone(),
            date: Some(chrono::Local::now().format("%Y").to_string()),
            genre: Some("Speech".to_string()),
            comment: metadata.description.clone(),
        }
    }

    // Format duration in a human-readable format (HH:MM:SS)
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}

/// Flatten resolved chapters into report marks, dropping any that never got
/// a timeline position
fn resolved_marks(chapters: &[Chapter]) -> Vec<ChapterMark> {
    chapters
        .iter()
        .filter_map(|c| {
            c.resolved_time_ms.map(|start_ms| ChapterMark {
                title: c.title.clone(),
                start_ms,
            })
        })
        .collect()
}

/// Parse and repair markup, returning the document and human-readable repair
/// notes. Exposed for callers that validate without synthesizing.
pub fn validate_markup(raw: &str) -> Result<(Document, Vec<String>), AppError> {
    let (document, repairs) = markup::Document::parse(raw)?;
    Ok((document, repairs.iter().map(|r| r.to_string()).collect()))
}
