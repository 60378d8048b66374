use anyhow::{Context, Result};
use clap::Parser;
use nback_experiment::ExperimentConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Digit N-back working-memory test
#[derive(Debug, Parser)]
#[command(name = "nback", version, about = "Digit N-back working-memory test")]
pub struct Cli {
    /// JSON file with experiment settings; the flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stimuli per run
    #[arg(long)]
    pub length: Option<usize>,

    /// Forced matches per run
    #[arg(long)]
    pub matches: Option<usize>,

    /// Response window in milliseconds
    #[arg(long)]
    pub stimulus_ms: Option<u64>,

    /// Blank interval in milliseconds
    #[arg(long)]
    pub blank_ms: Option<u64>,

    /// Delay after Test.end before the annotation log is closed
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Seed for sequence generation; a random seed is drawn and logged when absent
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSONL file the annotations are appended to
    #[arg(long, default_value = "nback-annotations.jsonl")]
    pub annotations: PathBuf,

    /// Write the end-of-test summary to this file as JSON
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// TrueType/OpenType font; common system locations are tried when absent
    #[arg(long)]
    pub font: Option<PathBuf>,

    #[arg(long, default_value_t = 96.0)]
    pub font_size: f32,

    /// Run in a window instead of borderless fullscreen
    #[arg(long)]
    pub windowed: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Settings from `--config` (or defaults) with explicit flags applied on top.
    pub fn experiment_config(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(v) = self.length {
            config.sequence_length = v;
        }
        if let Some(v) = self.matches {
            config.forced_matches = v;
        }
        if let Some(v) = self.stimulus_ms {
            config.stimulus_duration_ms = v;
        }
        if let Some(v) = self.blank_ms {
            config.blank_duration_ms = v;
        }
        if let Some(v) = self.settle_ms {
            config.settle_duration_ms = v;
        }
        Ok(config)
    }
}

pub fn load_config(path: &Path) -> Result<ExperimentConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

pub fn env_filter(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}
