//! Application configuration.
//!
//! Read once at startup from a JSON file, then overridden by `IMAGE_MOVER_*`
//! environment variables (a `.env` file is honoured). Immutable afterwards.

use anyhow::{Context, Result, anyhow, bail};
use log::LevelFilter;
use serde::Deserialize;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    background::processors::naming::NamePattern,
    common::{DEFAULT_FILE_FORMAT, DEFAULT_PREVIEW_LONG_EDGE, DEFAULT_SETTLE_DELAY},
    utils::expand_home,
};

pub const DEFAULT_CONFIG_FILE: &str = "image-mover.json";

const ENV_PREFIX: &str = "IMAGE_MOVER_";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub file_format: String,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub settle_delay_ms: u64,
    pub preview_long_edge: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("~/Pictures/incoming"),
            destination_dir: PathBuf::from("~/Pictures/sorted"),
            file_format: DEFAULT_FILE_FORMAT.to_string(),
            log_file: None,
            log_level: "info".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            settle_delay_ms: DEFAULT_SETTLE_DELAY.as_millis() as u64,
            preview_long_edge: DEFAULT_PREVIEW_LONG_EDGE,
        }
    }
}

/// Environment overrides; every field optional so unset variables keep the file value.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    source_dir: Option<PathBuf>,
    destination_dir: Option<PathBuf>,
    file_format: Option<String>,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
    ffmpeg_path: Option<String>,
    ffprobe_path: Option<String>,
    settle_delay_ms: Option<u64>,
    preview_long_edge: Option<u32>,
}

impl AppConfig {
    /// Load the configuration file (defaults when absent), apply environment
    /// overrides and expand `~` in path options.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        let mut config = Self::from_file(&path)?;

        let overrides = envy::prefixed(ENV_PREFIX)
            .from_env::<EnvOverrides>()
            .context("failed to read IMAGE_MOVER_* environment overrides")?;
        config.apply(overrides);
        config.expand_home_directory();

        Ok(config)
    }

    /// Parse a JSON config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        match File::open(path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("failed to parse config file {:?}", path)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("failed to open config file {:?}", path)),
        }
    }

    fn apply(&mut self, overrides: EnvOverrides) {
        if let Some(v) = overrides.source_dir {
            self.source_dir = v;
        }
        if let Some(v) = overrides.destination_dir {
            self.destination_dir = v;
        }
        if let Some(v) = overrides.file_format {
            self.file_format = v;
        }
        if let Some(v) = overrides.log_file {
            self.log_file = Some(v);
        }
        if let Some(v) = overrides.log_level {
            self.log_level = v;
        }
        if let Some(v) = overrides.ffmpeg_path {
            self.ffmpeg_path = v;
        }
        if let Some(v) = overrides.ffprobe_path {
            self.ffprobe_path = v;
        }
        if let Some(v) = overrides.settle_delay_ms {
            self.settle_delay_ms = v;
        }
        if let Some(v) = overrides.preview_long_edge {
            self.preview_long_edge = v;
        }
    }

    pub fn expand_home_directory(&mut self) {
        self.source_dir = expand_home(&self.source_dir);
        self.destination_dir = expand_home(&self.destination_dir);
        self.log_file = self.log_file.as_deref().map(expand_home);
    }

    /// Fail fast before any watch is registered.
    pub fn validate(&self) -> Result<()> {
        if !self.source_dir.is_dir() {
            bail!("From directory, {:?}, not found", self.source_dir);
        }
        if !self.destination_dir.is_dir() {
            bail!("To directory, {:?}, not found", self.destination_dir);
        }
        if self.preview_long_edge == 0 {
            bail!("preview_long_edge must be greater than zero");
        }
        self.name_pattern()?;
        self.log_level_filter()?;
        Ok(())
    }

    pub fn name_pattern(&self) -> Result<NamePattern> {
        NamePattern::parse(&self.file_format)
            .with_context(|| format!("invalid file_format {:?}", self.file_format))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Accepts level names and the numeric levels of older config files.
    pub fn log_level_filter(&self) -> Result<LevelFilter> {
        let level = self.log_level.trim();
        match level {
            "50" | "40" => Ok(LevelFilter::Error),
            "30" => Ok(LevelFilter::Warn),
            "20" => Ok(LevelFilter::Info),
            "10" => Ok(LevelFilter::Debug),
            "0" => Ok(LevelFilter::Trace),
            other => other
                .parse::<LevelFilter>()
                .map_err(|_| anyhow!("unknown log_level {:?}", other)),
        }
    }
}
