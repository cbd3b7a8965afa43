//! Capture-time extraction.
//!
//! Includes:
//! - EXIF `DateTimeOriginal` for images (kamadak-exif)
//! - Recorded/encoded date container tags for videos (ffprobe)
//! - Display-oriented video dimensions for preview scaling

use crate::{
    common::{
        ENCODED_DATE_PREFIX, ENCODED_DATE_TAGS, RECORDED_DATE_TAGS,
        SHOULD_SWAP_WIDTH_HEIGHT_ROTATION, errors::DispatchError,
    },
    models::{CaptureTimestamp, MediaClass},
};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use exif::{In, Tag, Value};
use log::warn;
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::Path,
    process::Command,
    sync::LazyLock,
};

static REGEX_ROTATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").unwrap());

const NAIVE_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y:%m:%d %H:%M:%S",
    "%Y%m%d %H%M%S",
];

const OFFSET_DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

// ────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────

/// Width and height as the video is displayed (rotation applied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }
}

/// Where capture times and video dimensions come from.
pub trait MetadataSource: Send + Sync {
    /// `None` means the capture time is unknown; that is not an error.
    fn capture_time(&self, path: &Path, class: MediaClass) -> Option<CaptureTimestamp>;

    fn video_dimensions(&self, path: &Path) -> Result<Dimensions, DispatchError>;
}

/// Reads EXIF in-process and container tags through `ffprobe`.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    ffprobe: String,
}

impl MediaProbe {
    pub fn new(ffprobe: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    fn probe(&self, path: &Path) -> Result<ProbeOutput, DispatchError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(path)
            .output()
            .map_err(|err| DispatchError::Probe {
                path: path.to_path_buf(),
                reason: format!("failed to spawn `{}`: {}", self.ffprobe, err),
            })?;

        if !output.status.success() {
            return Err(DispatchError::Probe {
                path: path.to_path_buf(),
                reason: format!(
                    "`{}` exited with status code {:?}: {}",
                    self.ffprobe,
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        ProbeOutput::from_json(&output.stdout).map_err(|err| DispatchError::Probe {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }
}

impl MetadataSource for MediaProbe {
    fn capture_time(&self, path: &Path, class: MediaClass) -> Option<CaptureTimestamp> {
        if class.reads_exif() {
            return capture_time_from_exif(path);
        }
        match self.probe(path) {
            Ok(probe) => capture_time_from_tags(&probe.container_tags()),
            Err(err) => {
                warn!("{:?}: {}", path, err);
                None
            }
        }
    }

    fn video_dimensions(&self, path: &Path) -> Result<Dimensions, DispatchError> {
        self.probe(path)?
            .display_dimensions()
            .ok_or_else(|| DispatchError::Probe {
                path: path.to_path_buf(),
                reason: "no video stream with width and height".to_string(),
            })
    }
}

// ────────────────────────────────────────────────────────────────
// Image: EXIF
// ────────────────────────────────────────────────────────────────

/// EXIF `DateTimeOriginal` as local wall-clock time, or `None` on any failure.
pub fn capture_time_from_exif(path: &Path) -> Option<CaptureTimestamp> {
    match exif_date_time_original(path) {
        Ok(naive) => Some(local_wall_clock(naive)),
        Err(err) => {
            warn!("{:?}: {}", path, err);
            None
        }
    }
}

fn exif_date_time_original(path: &Path) -> Result<NaiveDateTime> {
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let exif = exif::Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .context("failed to read EXIF")?;

    let field = exif
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .ok_or_else(|| anyhow!("no DateTimeOriginal tag"))?;

    let raw = match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .ok_or_else(|| anyhow!("DateTimeOriginal tag is empty"))?,
        other => bail!("DateTimeOriginal has unexpected type {:?}", other),
    };

    let dt = exif::DateTime::from_ascii(raw).context("failed to parse DateTimeOriginal")?;
    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())
        .and_then(|date| date.and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into()))
        .ok_or_else(|| anyhow!("DateTimeOriginal is out of range: {}", dt))
}

// ────────────────────────────────────────────────────────────────
// Video: container tags
// ────────────────────────────────────────────────────────────────

/// Prefer the recorded date (already local); fall back to the encoded date
/// (UTC, converted to local time). `None` when neither parses.
pub fn capture_time_from_tags(tags: &BTreeMap<String, String>) -> Option<CaptureTimestamp> {
    let recorded = RECORDED_DATE_TAGS
        .iter()
        .filter_map(|key| tags.get(*key))
        .find_map(|value| parse_recorded_date(value));
    if recorded.is_some() {
        return recorded;
    }

    ENCODED_DATE_TAGS
        .iter()
        .filter_map(|key| tags.get(*key))
        .find_map(|value| parse_encoded_date(value))
}

/// A recorded date keeps its own offset; without one it is local wall-clock time.
pub fn parse_recorded_date(value: &str) -> Option<CaptureTimestamp> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    if let Some(dt) = OFFSET_DATE_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
    {
        return Some(dt);
    }
    parse_naive(value).map(local_wall_clock)
}

/// An encoded date is UTC whatever it says; the result is in local time.
pub fn parse_encoded_date(value: &str) -> Option<CaptureTimestamp> {
    let value = value.trim();
    let value = value.strip_prefix(ENCODED_DATE_PREFIX).unwrap_or(value).trim();

    let utc = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| parse_naive(value))?;

    if is_zero_epoch(&utc) {
        return None;
    }

    Some(Utc.from_utc_datetime(&utc).with_timezone(&Local).fixed_offset())
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    NAIVE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Containers written without a clock report the QuickTime or Unix epoch.
fn is_zero_epoch(utc: &NaiveDateTime) -> bool {
    let epochs = [
        NaiveDate::from_ymd_opt(1904, 1, 1),
        NaiveDate::from_ymd_opt(1970, 1, 1),
    ];
    epochs
        .iter()
        .flatten()
        .filter_map(|date| date.and_hms_opt(0, 0, 0))
        .any(|epoch| epoch == *utc)
}

/// Attach the local offset to a wall-clock time. Times skipped by a DST jump
/// keep their wall clock with a zero offset.
pub fn local_wall_clock(naive: NaiveDateTime) -> CaptureTimestamp {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .unwrap_or_else(|| naive.and_utc().fixed_offset())
}

// ────────────────────────────────────────────────────────────────
// Video: dimensions
// ────────────────────────────────────────────────────────────────

/// Swap width/height when the stream is rotated a quarter turn.
pub fn display_dimensions(width: u32, height: u32, rotation: Option<&str>) -> Dimensions {
    let should_swap = rotation
        .and_then(|r| REGEX_ROTATION.find(r))
        .is_some_and(|m| SHOULD_SWAP_WIDTH_HEIGHT_ROTATION.contains(&m.as_str()));
    if should_swap {
        Dimensions {
            width: height,
            height: width,
        }
    } else {
        Dimensions { width, height }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<serde_json::Value>,
}

impl ProbeOutput {
    fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("failed to parse ffprobe JSON output")
    }

    /// Format tags with lowercase keys.
    fn container_tags(&self) -> BTreeMap<String, String> {
        self.format
            .tags
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect()
    }

    fn display_dimensions(&self) -> Option<Dimensions> {
        let stream = self.streams.first()?;
        let (width, height) = (stream.width?, stream.height?);
        Some(display_dimensions(width, height, stream.rotation().as_deref()))
    }
}

impl ProbeStream {
    /// Newer ffmpeg reports rotation as display-matrix side data, older as a tag.
    fn rotation(&self) -> Option<String> {
        self.side_data_list
            .iter()
            .find_map(|side_data| side_data.get("rotation"))
            .map(|rotation| rotation.to_string())
            .or_else(|| self.tags.get("rotate").cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use exif::{Field, experimental::Writer};
    use std::{fs, io::Cursor};

    fn write_tiff(path: &Path, fields: &[Field]) {
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        fs::write(path, buf.into_inner()).unwrap();
    }

    fn ascii_field(tag: Tag, value: &str) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![value.as_bytes().to_vec()]),
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_date_time_original_as_local_wall_clock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.tif");
        write_tiff(
            &path,
            &[ascii_field(Tag::DateTimeOriginal, "2021:03:04 10:20:30")],
        );

        let ts = capture_time_from_exif(&path).unwrap();
        assert_eq!(
            ts.naive_local(),
            NaiveDate::from_ymd_opt(2021, 3, 4)
                .unwrap()
                .and_hms_opt(10, 20, 30)
                .unwrap()
        );
    }

    #[test]
    fn missing_date_tag_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_date.tif");
        write_tiff(&path, &[ascii_field(Tag::Make, "Camera")]);
        assert_eq!(capture_time_from_exif(&path), None);
    }

    #[test]
    fn non_image_file_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"just text").unwrap();
        assert_eq!(capture_time_from_exif(&path), None);
        assert_eq!(capture_time_from_exif(&dir.path().join("absent.jpg")), None);
    }

    #[test]
    fn blank_date_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.tif");
        write_tiff(
            &path,
            &[ascii_field(Tag::DateTimeOriginal, "    :  :     :  :  ")],
        );
        assert_eq!(capture_time_from_exif(&path), None);
    }

    #[test]
    fn recorded_date_keeps_its_offset() {
        let ts = capture_time_from_tags(&tags(&[
            ("com.apple.quicktime.creationdate", "2021-03-04T10:20:30+0900"),
            ("creation_time", "2021-03-04T01:20:30.000000Z"),
        ]))
        .unwrap();
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (10, 20, 30));
        assert_eq!(ts.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn naive_recorded_date_is_local() {
        let ts = capture_time_from_tags(&tags(&[("date", "2021-03-04 10:20:30")])).unwrap();
        assert_eq!(ts.naive_local().to_string(), "2021-03-04 10:20:30");
    }

    #[test]
    fn encoded_date_is_converted_from_utc() {
        let ts = capture_time_from_tags(&tags(&[("creation_time", "2021-03-04T10:20:30.000000Z")]))
            .unwrap();
        let expected = Utc
            .with_ymd_and_hms(2021, 3, 4, 10, 20, 30)
            .unwrap()
            .with_timezone(&Local);
        assert_eq!(ts.naive_local(), expected.naive_local());
        assert_eq!(ts.naive_utc().to_string(), "2021-03-04 10:20:30");
    }

    #[test]
    fn encoded_date_prefix_is_dropped() {
        let ts = parse_encoded_date("UTC 2021-03-04 10:20:30").unwrap();
        assert_eq!(ts.naive_utc().to_string(), "2021-03-04 10:20:30");
    }

    #[test]
    fn unparseable_recorded_date_falls_back_to_encoded() {
        let ts = capture_time_from_tags(&tags(&[
            ("date", "2021"),
            ("creation_time", "2020-12-31T23:00:00Z"),
        ]))
        .unwrap();
        assert_eq!(ts.naive_utc().year(), 2020);
    }

    #[test]
    fn zero_epoch_encoded_date_is_unknown() {
        assert_eq!(parse_encoded_date("1904-01-01T00:00:00.000000Z"), None);
        assert_eq!(parse_encoded_date("UTC 1970-01-01 00:00:00"), None);
    }

    #[test]
    fn no_date_tags_is_unknown() {
        assert_eq!(capture_time_from_tags(&tags(&[("encoder", "Lavf60")])), None);
    }

    #[test]
    fn quarter_turn_rotation_swaps_dimensions() {
        assert_eq!(
            display_dimensions(1920, 1080, Some("90")),
            Dimensions {
                width: 1080,
                height: 1920
            }
        );
        assert_eq!(
            display_dimensions(1920, 1080, Some("-90")).width,
            1080
        );
        assert_eq!(display_dimensions(1920, 1080, Some("270°")).width, 1080);
        assert_eq!(display_dimensions(1920, 1080, Some("180")).width, 1920);
        assert_eq!(display_dimensions(1920, 1080, None).width, 1920);
    }

    #[test]
    fn probe_output_reads_side_data_rotation() {
        let probe = ProbeOutput::from_json(
            br#"{
                "streams": [{
                    "width": 1920,
                    "height": 1080,
                    "side_data_list": [{ "side_data_type": "Display Matrix", "rotation": -90 }]
                }],
                "format": { "tags": { "Creation_Time": "2021-03-04T10:20:30.000000Z" } }
            }"#,
        )
        .unwrap();

        let dims = probe.display_dimensions().unwrap();
        assert!(!dims.is_landscape());
        assert!(probe.container_tags().contains_key("creation_time"));
    }

    #[test]
    fn probe_output_reads_legacy_rotate_tag() {
        let probe = ProbeOutput::from_json(
            br#"{ "streams": [{ "width": 640, "height": 480, "tags": { "rotate": "270" } }] }"#,
        )
        .unwrap();
        assert_eq!(
            probe.display_dimensions(),
            Some(Dimensions {
                width: 480,
                height: 640
            })
        );
    }
}
