use std::path::Path;
use std::str::FromStr;
use log::{debug, error, info, warn};
use tokio::process::Command;

use crate::chapters::Chapter;
use crate::errors::ExportError;

// @module: Tagging and export of the assembled audio

/// Peak normalization target, as a fraction of full scale
const NORMALIZE_TARGET: f64 = 0.97;

/// Supported output containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Ogg,
    M4b,
}

impl AudioFormat {
    /// Determine the format from an output path's extension
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        ext.parse()
    }

    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::M4b => "m4b",
        }
    }

    /// Whether the container carries embedded chapter markers
    pub fn supports_chapters(&self) -> bool {
        !matches!(self, Self::Wav)
    }

    fn codec(&self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::Ogg => "libvorbis",
            Self::M4b => "aac",
            Self::Wav => "pcm_s16le",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            "ogg" => Ok(Self::Ogg),
            "m4b" => Ok(Self::M4b),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Descriptive tags written into the output container
#[derive(Debug, Clone, Default)]
pub struct TagSet {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
}

/// Scale PCM samples so the loudest peak sits just below full scale.
///
/// A silent track is left untouched. Scaling both amplifies quiet tracks and
/// attenuates clipped-hot ones.
pub fn normalize_peak(samples: &mut [i16]) {
    let peak = samples.iter().map(|s| (*s as i32).abs()).max().unwrap_or(0);
    if peak == 0 {
        debug!("Normalization skipped: track is silent");
        return;
    }
    let target = (i16::MAX as f64) * NORMALIZE_TARGET;
    let scale = target / peak as f64;
    if (scale - 1.0).abs() < 0.001 {
        return;
    }
    debug!("Normalizing peak {} with scale factor {:.4}", peak, scale);
    for sample in samples.iter_mut() {
        let scaled = (*sample as f64 * scale).round();
        *sample = scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    }
}

/// Write the assembled audio to its final container.
///
/// WAV output is written directly; chapters and tags are skipped with a
/// warning since the container cannot carry them. Every other format is
/// produced by a single ffmpeg transcode from a temporary WAV, with tags and
/// chapter markers supplied through an ffmetadata file.
pub async fn export(
    samples: &[i16],
    sample_rate: u32,
    chapters: &[Chapter],
    tags: &TagSet,
    format: AudioFormat,
    bitrate: &str,
    output_path: &Path,
) -> Result<(), ExportError> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    if format == AudioFormat::Wav {
        if !chapters.is_empty() {
            warn!(
                "WAV output cannot embed the {} chapter marker(s); they are kept in the job report only",
                chapters.len()
            );
        }
        write_wav(samples, sample_rate, output_path)?;
        info!("Wrote {}", output_path.display());
        return Ok(());
    }

    let workdir = tempfile::tempdir()?;
    let wav_path = workdir.path().join("assembled.wav");
    let meta_path = workdir.path().join("metadata.txt");

    write_wav(samples, sample_rate, &wav_path)?;

    let total_ms = samples.len() as u64 * 1000 / sample_rate as u64;
    let metadata = render_ffmetadata(tags, chapters, total_ms);
    std::fs::write(&meta_path, metadata)?;

    run_ffmpeg(&wav_path, &meta_path, format, bitrate, output_path).await?;
    info!("Wrote {}", output_path.display());
    Ok(())
}

fn write_wav(samples: &[i16], sample_rate: u32, path: &Path) -> Result<(), ExportError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| ExportError::Encoder(e.to_string()))?;
    let mut writer16 = writer.get_i16_writer(samples.len() as u32);
    for sample in samples {
        writer16.write_sample(*sample);
    }
    writer16
        .flush()
        .map_err(|e| ExportError::Encoder(e.to_string()))?;
    writer
        .finalize()
        .map_err(|e| ExportError::Encoder(e.to_string()))?;
    Ok(())
}

/// Render tags and chapters in ffmetadata format.
///
/// Chapter ends are the next chapter's start; the last chapter runs to the
/// end of the audio. Unresolved chapters are skipped.
fn render_ffmetadata(tags: &TagSet, chapters: &[Chapter], total_ms: u64) -> String {
    let mut out = String::from(";FFMETADATA1\n");

    let mut tag = |key: &str, value: &Option<String>| {
        if let Some(value) = value {
            if !value.is_empty() {
                out.push_str(&format!("{}={}\n", key, escape_metadata(value)));
            }
        }
    };
    tag("title", &tags.title);
    tag("artist", &tags.artist);
    tag("album", &tags.album);
    tag("date", &tags.date);
    tag("genre", &tags.genre);
    tag("comment", &tags.comment);

    let resolved: Vec<(&str, u64)> = chapters
        .iter()
        .filter_map(|c| c.resolved_time_ms.map(|t| (c.title.as_str(), t)))
        .collect();

    for (i, (title, start)) in resolved.iter().enumerate() {
        let end = resolved
            .get(i + 1)
            .map(|(_, next)| *next)
            .unwrap_or(total_ms)
            .max(*start);
        out.push_str("[CHAPTER]\n");
        out.push_str("TIMEBASE=1/1000\n");
        out.push_str(&format!("START={}\n", start));
        out.push_str(&format!("END={}\n", end));
        out.push_str(&format!("title={}\n", escape_metadata(title)));
    }

    out
}

/// Escape the characters the ffmetadata format treats specially
fn escape_metadata(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '=' | ';' | '#' | '\\' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '\n' => escaped.push_str("\\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

async fn run_ffmpeg(
    wav_path: &Path,
    meta_path: &Path,
    format: AudioFormat,
    bitrate: &str,
    output_path: &Path,
) -> Result<(), ExportError> {
    let mut args: Vec<String> = vec![
        "-y".to_string(),
        "-i".to_string(),
        wav_path.to_string_lossy().into_owned(),
        "-i".to_string(),
        meta_path.to_string_lossy().into_owned(),
        "-map_metadata".to_string(),
        "1".to_string(),
        "-map_chapters".to_string(),
        "1".to_string(),
        "-c:a".to_string(),
        format.codec().to_string(),
        "-b:a".to_string(),
        bitrate.to_string(),
    ];
    if format == AudioFormat::M4b {
        // Audiobook container: ipod muxer, index up front for streaming
        args.push("-f".to_string());
        args.push("ipod".to_string());
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
    }
    args.push(output_path.to_string_lossy().into_owned());

    debug!("Running ffmpeg with args: {:?}", args);

    // Add timeout to prevent hanging on problematic encodes
    let ffmpeg_future = Command::new("ffmpeg").args(&args).output();
    let timeout_duration = std::time::Duration::from_secs(300);
    let result = tokio::select! {
        result = ffmpeg_future => {
            result.map_err(|e| ExportError::Encoder(format!("failed to execute ffmpeg: {}", e)))?
        },
        _ = tokio::time::sleep(timeout_duration) => {
            return Err(ExportError::Encoder("ffmpeg timed out after 5 minutes".to_string()));
        }
    };

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let filtered = filter_ffmpeg_stderr(&stderr);
        error!("Encoding failed: {}", filtered);
        return Err(ExportError::Encoder(filtered));
    }
    Ok(())
}

/// Filter ffmpeg stderr to only show meaningful error lines, stripping the
/// version banner, build configuration, and stream metadata noise.
fn filter_ffmpeg_stderr(stderr: &str) -> String {
    let dominated_prefixes = [
        "ffmpeg version",
        "  built with",
        "  configuration:",
        "  lib",
        "Input #",
        "  Metadata:",
        "  Duration:",
        "  Chapter",
        "    Chapter",
        "Output #",
        "Stream mapping:",
        "Press [q]",
        "size=",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return false;
            }
            !dominated_prefixes.iter().any(|p| line.starts_with(p) || trimmed.starts_with(p))
        })
        .collect();

    if meaningful.is_empty() {
        "unknown ffmpeg error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}
