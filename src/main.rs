// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_arguments)]

use anyhow::{Result, anyhow, Context};
use log::{info, warn, LevelFilter, Log, Metadata, Record, Level, SetLoggerError};
use std::path::{Path, PathBuf};
use std::io::Write;
use std::fs::File;
use std::io::BufReader;
use clap::{Parser, ValueEnum, CommandFactory, Subcommand};
use clap_complete::{generate, Shell};

use crate::app_config::Config;
use crate::file_utils::FileManager;
use app_controller::{Controller, JobMetadata};

mod app_config;
mod app_controller;
mod assembler;
mod chapters;
mod chunker;
mod cost;
mod errors;
mod exporter;
mod file_utils;
mod markup;
mod synthesis;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize a markup document into narrated audio (default command)
    #[command(alias = "synthesize")]
    Synthesize(SynthesizeArgs),

    /// Generate shell completions for papercast
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct SynthesizeArgs {
    /// Input markup file to narrate
    #[arg(value_name = "INPUT_FILE")]
    input_file: PathBuf,

    /// Output audio path; format is taken from the extension
    /// (defaults to the input path with the configured format)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Voice name to use (e.g., 'en-GB-Chirp3-HD-Charon')
    #[arg(short, long)]
    voice: Option<String>,

    /// Speaking rate multiplier (0.25 to 4.0)
    #[arg(short = 'r', long)]
    speaking_rate: Option<f64>,

    /// Title tag for the output audio
    #[arg(long)]
    title: Option<String>,

    /// Author/artist tag for the output audio
    #[arg(long)]
    author: Option<String>,

    /// Description written into the comment tag
    #[arg(long)]
    description: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Validate, chunk, and estimate cost without synthesizing
    #[arg(short = 'n', long)]
    dry_run: bool,
}

/// Papercast - article-to-audio narration
///
/// Converts marked-up articles into narrated audio with chapters using
/// cloud text-to-speech.
#[derive(Parser, Debug)]
#[command(name = "papercast")]
#[command(version = "0.1.0")]
#[command(about = "Article-to-audio narration tool")]
#[command(long_about = "Papercast validates speech markup, synthesizes it through a cloud TTS service, and assembles a single tagged audio file with chapter markers.

EXAMPLES:
    papercast article.ssml                      # Narrate using default config
    papercast -o book.m4b article.ssml          # Audiobook output with chapters
    papercast -v en-US-Neural2-J article.ssml   # Use a specific voice
    papercast -n article.ssml                   # Dry run: chunks and cost only
    papercast --log-level debug article.ssml    # Verbose logging
    papercast completions bash > papercast.bash # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically. The synthesis API key must be set in the
    config before any paid request is made.

OUTPUT FORMATS:
    mp3  - MP3 with ID3 tags and chapters
    m4b  - audiobook container with chapters, index up front
    ogg  - Vorbis with tags and chapters
    wav  - raw PCM, no tags or chapters")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input markup file to narrate
    #[arg(value_name = "INPUT_FILE")]
    input_file: Option<PathBuf>,

    /// Output audio path; format is taken from the extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Voice name to use
    #[arg(short, long)]
    voice: Option<String>,

    /// Speaking rate multiplier (0.25 to 4.0)
    #[arg(short = 'r', long)]
    speaking_rate: Option<f64>,

    /// Title tag for the output audio
    #[arg(long)]
    title: Option<String>,

    /// Author/artist tag for the output audio
    #[arg(long)]
    author: Option<String>,

    /// Description written into the comment tag
    #[arg(long)]
    description: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Validate, chunk, and estimate cost without synthesizing
    #[arg(short = 'n', long)]
    dry_run: bool,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");

            let mut stderr = std::io::stderr();
            let color = match record.level() {
                Level::Error => "\x1B[1;31m",
                Level::Warn => "\x1B[1;33m",
                Level::Info => "\x1B[1;32m",
                Level::Debug => "\x1B[1;36m",
                Level::Trace => "\x1B[1;35m",
            };
            let _ = writeln!(stderr, "{}{} {}\x1B[0m", color, now, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    // Parse command line arguments using clap
    let cli = CommandLineOptions::parse();

    // Handle subcommands
    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "papercast", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Synthesize(args)) => run_synthesize(args).await,
        None => {
            // Default behavior - use top-level args for backwards compatibility
            let input_file = cli.input_file.ok_or_else(|| {
                anyhow!("INPUT_FILE is required when no subcommand is specified")
            })?;

            let args = SynthesizeArgs {
                input_file,
                output: cli.output,
                voice: cli.voice,
                speaking_rate: cli.speaking_rate,
                title: cli.title,
                author: cli.author,
                description: cli.description,
                config_path: cli.config_path,
                log_level: cli.log_level,
                dry_run: cli.dry_run,
            };
            run_synthesize(args).await
        }
    }
}

async fn run_synthesize(options: SynthesizeArgs) -> Result<()> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        log::set_max_level(to_level_filter(&cmd_log_level.clone().into()));
    }

    // Load or create configuration
    let config_path = &options.config_path;
    let mut config = if Path::new(config_path).exists() {
        // Load existing configuration
        let file = File::open(config_path)
            .context(format!("Failed to open config file: {}", config_path))?;

        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .context(format!("Failed to parse config file: {}", config_path))?;
        config
    } else {
        // Create default configuration if not exists
        warn!("Config file not found at '{}', creating default config.", config_path);

        let config = Config::default();

        // Save default config
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;

        std::fs::write(config_path, config_json)
            .context(format!("Failed to write default config to file: {}", config_path))?;

        config
    };

    // Override config with CLI options if provided
    if let Some(voice) = &options.voice {
        config.voice.voice_name = voice.clone();
        // Keep the language code in sync with the voice's locale prefix
        let parts: Vec<&str> = voice.splitn(3, '-').collect();
        if parts.len() >= 2 {
            config.voice.language_code = format!("{}-{}", parts[0], parts[1]);
        }
    }
    if let Some(rate) = options.speaking_rate {
        config.voice.speaking_rate = rate;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    // A dry run never contacts the service, so a missing API key is fine
    if options.dry_run {
        if !(0.25..=4.0).contains(&config.voice.speaking_rate) {
            return Err(anyhow!(
                "Speaking rate {} is outside the supported range 0.25-4.0",
                config.voice.speaking_rate
            ));
        }
        return dry_run(&options, config);
    }

    // Validate the configuration after loading and overriding
    config.validate()
        .context("Configuration validation failed")?;

    // If log level was not set via command line, update it from config now
    if options.log_level.is_none() {
        log::set_max_level(to_level_filter(&config.log_level));
    }

    let metadata = JobMetadata {
        title: options.title.clone(),
        author: options.author.clone(),
        description: options.description.clone(),
    };

    // Create controller and run the job
    let controller = Controller::with_config(config)?;
    controller
        .run(options.input_file.clone(), options.output.clone(), metadata)
        .await
        .map_err(|e| anyhow!("{}", e))?;

    Ok(())
}

/// Estimate the job without synthesizing anything
fn dry_run(options: &SynthesizeArgs, config: Config) -> Result<()> {
    let raw = FileManager::read_to_string(&options.input_file)?;
    let controller = Controller::with_config(config)?;
    let plan = controller.plan(&raw).map_err(|e| anyhow!("{}", e))?;

    for repair in &plan.repairs {
        warn!("Repaired markup: {}", repair);
    }
    info!(
        "Dry run: {} chunk(s), {} chapter(s), {} billable chars, est. ${:.4}",
        plan.chunk_count, plan.chapter_count, plan.billable_chars, plan.estimated_cost_usd
    );
    Ok(())
}

fn to_level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}
