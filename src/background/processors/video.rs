//! Video processing module - wraps the external encoder.
//!
//! Includes:
//! - Container remux to the canonical format (streams copied, metadata kept)
//! - Downscaled preview generation
//!
//! Every encode writes to a hidden temporary beside its output and is renamed
//! into place only after the encoder exits with status zero.

use crate::{
    background::processors::metadata::Dimensions,
    common::{CANONICAL_VIDEO_EXTENSION, PREVIEW_SUFFIX, errors::DispatchError},
    utils::with_appended_extension,
};
use anyhow::{Context, anyhow};
use log::debug;
use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tempfile::TempPath;

pub trait Transcode: Send + Sync {
    /// Copy video and audio streams of `input` into the canonical container at `output`.
    fn remux(&self, input: &Path, output: &Path) -> Result<(), DispatchError>;

    /// Re-encode `input` so its long edge equals `long_edge`, written to `output`.
    fn preview(
        &self,
        input: &Path,
        output: &Path,
        dimensions: Dimensions,
        long_edge: u32,
    ) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run one encode into a temporary and no-clobber rename it to `output`.
    fn encode_into_place(
        &self,
        input: &Path,
        output: &Path,
        args: &[&str],
    ) -> Result<(), DispatchError> {
        if output.exists() {
            return Err(DispatchError::DestinationExists {
                origin: input.to_path_buf(),
                destination: output.to_path_buf(),
            });
        }

        let temp = temporary_beside(output)?;

        let mut cmd = create_silent_ffmpeg_command(&self.program);
        cmd.arg("-y").arg("-i").arg(input).args(args).arg(&*temp);
        debug!("Running {:?}", cmd);

        let result = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to spawn `{}` for {:?}", self.program, input))?;

        if !result.status.success() {
            return Err(DispatchError::EncoderFailed {
                program: self.program.clone(),
                input: input.to_path_buf(),
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        temp.persist_noclobber(output).map_err(|err| {
            if err.error.kind() == ErrorKind::AlreadyExists {
                DispatchError::DestinationExists {
                    origin: input.to_path_buf(),
                    destination: output.to_path_buf(),
                }
            } else {
                DispatchError::Io(
                    anyhow!(err.error).context(format!("failed to rename encode into {:?}", output)),
                )
            }
        })
    }
}

impl Transcode for Ffmpeg {
    fn remux(&self, input: &Path, output: &Path) -> Result<(), DispatchError> {
        self.encode_into_place(
            input,
            output,
            &[
                "-c:v",
                "copy",
                "-c:a",
                "copy",
                "-map_metadata",
                "0",
                "-movflags",
                "use_metadata_tags",
            ],
        )
    }

    fn preview(
        &self,
        input: &Path,
        output: &Path,
        dimensions: Dimensions,
        long_edge: u32,
    ) -> Result<(), DispatchError> {
        let filter = scale_filter(dimensions, long_edge);
        self.encode_into_place(
            input,
            output,
            &[
                "-map_metadata",
                "0",
                "-vf",
                filter.as_str(),
                "-movflags",
                "+faststart+use_metadata_tags",
            ],
        )
    }
}

// ────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────

/// Creates a base `ffmpeg` command that only reports errors on stderr.
pub fn create_silent_ffmpeg_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    // These global options must come before the input/output options.
    cmd.args(["-v", "error", "-hide_banner", "-nostats", "-nostdin"]);
    cmd
}

/// Scale so the display long edge equals `long_edge`; the other axis keeps the
/// aspect ratio rounded to an even number.
pub fn scale_filter(dimensions: Dimensions, long_edge: u32) -> String {
    if dimensions.is_landscape() {
        format!("scale={}:-2", long_edge)
    } else {
        format!("scale=-2:{}", long_edge)
    }
}

/// `<stem>_preview.mp4` next to `destination`.
pub fn preview_path(destination: &Path) -> PathBuf {
    let mut stem = destination
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(OsString::new);
    stem.push(PREVIEW_SUFFIX);
    with_appended_extension(
        &destination.with_file_name(stem),
        Some(CANONICAL_VIDEO_EXTENSION),
    )
}

/// Path of the canonical container produced from a raw one.
pub fn converted_path(raw: &Path) -> PathBuf {
    raw.with_extension(CANONICAL_VIDEO_EXTENSION)
}

/// Hidden, closed temporary in the output's directory so the final rename
/// never crosses filesystems.
fn temporary_beside(output: &Path) -> Result<TempPath, DispatchError> {
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let suffix = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix(".")
        .suffix(&suffix)
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temporary file in {:?}", parent))?;
    Ok(temp.into_temp_path())
}
