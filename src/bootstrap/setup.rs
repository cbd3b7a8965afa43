//! Startup tasks: logger initialization and the external tool check.

use anstyle::{AnsiColor, Style};
use anyhow::{Context, Result};
use env_logger::{Builder, Target, WriteStyle};
use log::{error, info, kv::Key};
use std::{
    fs::OpenOptions,
    io::{IsTerminal, Write},
    process::Command,
};

use crate::config::AppConfig;

// ────────────────────────────────────────────────────────────────
// FFmpeg Check
// ────────────────────────────────────────────────────────────────

/// Log the versions of the configured encoder and probe.
///
/// A missing tool is logged but not fatal: images are still filed.
pub fn check_ffmpeg_and_ffprobe(config: &AppConfig) {
    for command in [&config.ffmpeg_path, &config.ffprobe_path] {
        match Command::new(command).arg("-version").output() {
            Ok(output) if output.status.success() => {
                let version_info = String::from_utf8_lossy(&output.stdout);
                let version_number = version_info
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(2))
                    .unwrap_or("Unknown");
                info!("{} version: {}", command, version_number);
            }
            Ok(_) => {
                error!(
                    "`{}` command was found, but it returned an error. Videos will not be converted.",
                    command
                );
            }
            Err(_) => {
                error!(
                    "`{}` is not installed or not available in PATH. Videos will not be converted.",
                    command
                );
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Logger Initialization
// ────────────────────────────────────────────────────────────────

/// Install the global logger. Writes to `log_file` (appending) when set, else stderr.
pub fn initialize_logger(config: &AppConfig) -> Result<()> {
    let level = config.log_level_filter()?;

    let (target, color) = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {:?}", path))?;
            (Target::Pipe(Box::new(file)), false)
        }
        None => (Target::Stderr, std::io::stderr().is_terminal()),
    };

    let dim = if color {
        AnsiColor::BrightBlack.on_default()
    } else {
        Style::new()
    };
    let accent = if color {
        AnsiColor::Cyan.on_default()
    } else {
        Style::new()
    };

    Builder::new()
        .write_style(if color {
            WriteStyle::Always
        } else {
            WriteStyle::Never
        })
        .format(move |buf, record| {
            let ts = buf.timestamp();

            let level_style = if color {
                buf.default_level_style(record.level())
            } else {
                Style::new()
            };

            // Reformat "1.234567ms" as "1.23 ms"
            let dur_raw = record
                .key_values()
                .get(Key::from("duration"))
                .map(|v| {
                    let s = format!("{}", v);
                    if let Some(idx) = s.find(|c: char| c.is_alphabetic()) {
                        let (num, unit) = (&s[..idx], &s[idx..]);
                        if let Ok(val) = num.parse::<f32>() {
                            return format!("{:.2} {}", val, unit);
                        }
                    }
                    s
                })
                .unwrap_or_default();

            let dur = if dur_raw.is_empty() {
                " ".repeat(10)
            } else {
                format!("{accent}{:>10}{accent:#}", dur_raw)
            };

            writeln!(
                buf,
                "{dim}{ts}{dim:#} {level_style}{}{level_style:#} {dim}{}{dim:#}",
                record.level(),
                record.target()
            )?;

            let message = format!("{}", record.args());
            let subsequent_indent = " ".repeat(11);
            let mut lines = message.lines();

            if let Some(first_line) = lines.next() {
                writeln!(buf, "{} {}", dur, first_line)?;
            }
            for line in lines {
                writeln!(buf, "{}{}", subsequent_indent, line)?;
            }

            Ok(())
        })
        .target(target)
        .filter(None, level)
        .filter(Some("notify"), log::LevelFilter::Warn)
        .try_init()
        .context("logger already initialized")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_level_is_rejected_before_install() {
        let config = AppConfig {
            log_level: "loud".to_string(),
            ..AppConfig::default()
        };
        assert!(initialize_logger(&config).is_err());
    }

    #[test]
    fn unopenable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            log_file: Some(dir.path().join("missing/dir/mover.log")),
            ..AppConfig::default()
        };
        assert!(initialize_logger(&config).is_err());
    }
}
