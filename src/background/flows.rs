use anyhow::{Context, anyhow};
use log::{debug, info, warn};
use path_clean::PathClean;
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use crate::{
    background::{
        actors::mover::{check_free, ensure_parent_dir, move_into_place},
        processors::{
            metadata::MetadataSource,
            naming::NamePattern,
            video::{Transcode, converted_path, preview_path},
        },
    },
    common::{
        FAILED_DIR_NAME,
        errors::{DispatchError, handle_error},
    },
    config::AppConfig,
    models::{CaptureTimestamp, MediaClass, Outcome, QueueItem},
    utils::{PathExt, with_appended_extension},
};

/// Everything the dispatcher needs from the configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub pattern: NamePattern,
    pub settle_delay: Duration,
    pub preview_long_edge: u32,
}

impl DispatchSettings {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            source_dir: config.source_dir.clone(),
            destination_dir: config.destination_dir.clone(),
            pattern: config.name_pattern()?,
            settle_delay: config.settle_delay(),
            preview_long_edge: config.preview_long_edge,
        })
    }
}

/// Files one source path: classify, convert, name, preview, move.
///
/// Not safe to run concurrently with itself: the collision check and the
/// move are separate steps.
pub struct Dispatcher<M, T> {
    settings: DispatchSettings,
    metadata: M,
    transcoder: T,
}

impl<M: MetadataSource, T: Transcode> Dispatcher<M, T> {
    pub fn new(settings: DispatchSettings, metadata: M, transcoder: T) -> Self {
        Self {
            settings,
            metadata,
            transcoder,
        }
    }

    pub fn transcoder(&self) -> &T {
        &self.transcoder
    }

    /// Dispatch one queued item, logging instead of returning any failure.
    pub fn process(&self, item: QueueItem) -> Option<Outcome> {
        let start_time = Instant::now();
        let source = item.into_path();
        match self.dispatch(&source) {
            Ok(outcome) => {
                info!(
                    duration = &*format!("{:?}", start_time.elapsed());
                    "Processed {:?} into {:?}", source, outcome.destination()
                );
                Some(outcome)
            }
            Err(err) => {
                handle_error(&err);
                None
            }
        }
    }

    pub fn dispatch(&self, source: &Path) -> Result<Outcome, DispatchError> {
        let source = source.to_path_buf().clean();

        // Give a writer that just closed the file a moment to let go of it.
        if !self.settings.settle_delay.is_zero() {
            thread::sleep(self.settings.settle_delay);
        }

        if !source.exists() {
            return Err(DispatchError::SourceMissing(source));
        }
        if !source.is_file() {
            return Err(DispatchError::Io(anyhow!("{:?} is not a regular file", source)));
        }

        match MediaClass::from_path(&source) {
            MediaClass::RawVideoContainer => {
                let converted = self.convert(&source)?;
                self.file(&converted, MediaClass::CanonicalVideo)
            }
            class => self.file(&source, class),
        }
    }

    /// Remux a raw container to the canonical format next to it, then drop the original.
    fn convert(&self, raw: &Path) -> Result<PathBuf, DispatchError> {
        let converted = converted_path(raw);
        debug!("Converting {:?} to {:?}", raw, converted);
        self.transcoder.remux(raw, &converted)?;
        fs::remove_file(raw).with_context(|| {
            format!("converted {:?} but failed to remove the original", raw)
        })?;
        info!("Converted {:?} to {:?}", raw, converted);
        Ok(converted)
    }

    fn file(&self, source: &Path, class: MediaClass) -> Result<Outcome, DispatchError> {
        let timestamp = self.metadata.capture_time(source, class);
        if timestamp.is_none() {
            info!("No capture date for {:?}, moving it to {}/", source, FAILED_DIR_NAME);
        }

        let destination = self.destination_for(source, timestamp.as_ref())?;
        ensure_parent_dir(&destination)?;
        check_free(source, &destination)?;

        let preview = if class == MediaClass::CanonicalVideo {
            Some(self.create_preview(source, &destination)?)
        } else {
            None
        };

        if let Err(err) = move_into_place(source, &destination) {
            if let Some(preview) = &preview {
                if let Err(remove_err) = fs::remove_file(preview) {
                    warn!("Failed to remove orphaned preview {:?}: {}", preview, remove_err);
                }
            }
            return Err(err);
        }

        Ok(match timestamp {
            Some(_) => Outcome::Filed {
                destination,
                preview,
            },
            None => Outcome::Unsorted {
                destination,
                preview,
            },
        })
    }

    fn create_preview(&self, source: &Path, destination: &Path) -> Result<PathBuf, DispatchError> {
        let preview = preview_path(destination);
        debug!("Creating low res version of {:?} at {:?}", source, preview);
        let dimensions = self.metadata.video_dimensions(source)?;
        self.transcoder.preview(
            source,
            &preview,
            dimensions,
            self.settings.preview_long_edge,
        )?;
        Ok(preview)
    }

    /// `<destination>/<pattern(ts)>.<ext>`, or `<source>/failed/<name>` without a timestamp.
    pub fn destination_for(
        &self,
        source: &Path,
        timestamp: Option<&CaptureTimestamp>,
    ) -> Result<PathBuf, DispatchError> {
        match timestamp {
            Some(ts) => {
                let stem = self
                    .settings
                    .pattern
                    .destination_stem(&self.settings.destination_dir, ts)?;
                Ok(with_appended_extension(&stem, source.ext_verbatim().as_deref()))
            }
            None => {
                let name = source
                    .file_name()
                    .ok_or_else(|| anyhow!("{:?} has no file name", source))?;
                Ok(self
                    .settings
                    .source_dir
                    .join(FAILED_DIR_NAME)
                    .join(name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::processors::metadata::Dimensions;
    use chrono::{FixedOffset, TimeZone};

    struct NoMetadata;

    impl MetadataSource for NoMetadata {
        fn capture_time(&self, _: &Path, _: MediaClass) -> Option<CaptureTimestamp> {
            None
        }

        fn video_dimensions(&self, path: &Path) -> Result<Dimensions, DispatchError> {
            Err(DispatchError::Probe {
                path: path.to_path_buf(),
                reason: "not a video".to_string(),
            })
        }
    }

    struct NoEncoder;

    impl Transcode for NoEncoder {
        fn remux(&self, _: &Path, _: &Path) -> Result<(), DispatchError> {
            unreachable!("no remux expected")
        }

        fn preview(&self, _: &Path, _: &Path, _: Dimensions, _: u32) -> Result<(), DispatchError> {
            unreachable!("no preview expected")
        }
    }

    fn dispatcher(pattern: &str) -> Dispatcher<NoMetadata, NoEncoder> {
        Dispatcher::new(
            DispatchSettings {
                source_dir: PathBuf::from("/in"),
                destination_dir: PathBuf::from("/out"),
                pattern: NamePattern::parse(pattern).unwrap(),
                settle_delay: Duration::ZERO,
                preview_long_edge: 320,
            },
            NoMetadata,
            NoEncoder,
        )
    }

    #[test]
    fn dated_files_keep_their_extension_verbatim() {
        let ts = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2021, 3, 4, 10, 20, 30)
            .unwrap();
        let destination = dispatcher("%Y%m%d_%H%M%S")
            .destination_for(Path::new("/in/IMG_0001.JPG"), Some(&ts))
            .unwrap();
        assert_eq!(destination, PathBuf::from("/out/20210304_102030.JPG"));
    }

    #[test]
    fn undated_files_go_to_failed_under_the_source() {
        let destination = dispatcher("%Y%m%d_%H%M%S")
            .destination_for(Path::new("/in/IMG_0001.JPG"), None)
            .unwrap();
        assert_eq!(destination, PathBuf::from("/in/failed/IMG_0001.JPG"));
    }

    #[test]
    fn missing_source_is_a_duplicate_delivery() {
        let err = dispatcher("%Y")
            .dispatch(Path::new("/definitely/not/here.jpg"))
            .unwrap_err();
        assert!(err.is_duplicate_delivery());
    }
}
