//! Destination base names from capture timestamps.

use anyhow::{Result, anyhow, bail};
use chrono::format::{Item, StrftimeItems};
use std::{
    fmt::Write,
    path::{Component, Path, PathBuf},
};

use crate::models::CaptureTimestamp;

/// A validated strftime pattern. May contain `/` to file into sub-directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern(String);

impl NamePattern {
    pub fn parse(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if pattern.trim().is_empty() {
            bail!("name pattern is empty");
        }
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            bail!("name pattern {:?} contains an invalid strftime specifier", pattern);
        }
        let relative = Path::new(&pattern)
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !relative {
            bail!(
                "name pattern {:?} must stay inside the destination directory",
                pattern
            );
        }
        Ok(Self(pattern))
    }

    /// Render the base name (no extension) for `timestamp`.
    pub fn format(&self, timestamp: &CaptureTimestamp) -> Result<String> {
        let mut name = String::new();
        write!(name, "{}", timestamp.format(&self.0))
            .map_err(|_| anyhow!("failed to format {} with {:?}", timestamp, self.0))?;
        Ok(name)
    }

    /// Destination path without extension, relative to `root`.
    pub fn destination_stem(&self, root: &Path, timestamp: &CaptureTimestamp) -> Result<PathBuf> {
        Ok(root.join(self.format(timestamp)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn timestamp(offset_hours: i32) -> CaptureTimestamp {
        FixedOffset::east_opt(offset_hours * 3600)
            .unwrap()
            .with_ymd_and_hms(2021, 3, 4, 10, 20, 30)
            .unwrap()
    }

    #[test]
    fn formats_the_default_pattern() {
        let pattern = NamePattern::parse("%Y%m%d_%H%M%S").unwrap();
        assert_eq!(pattern.format(&timestamp(0)).unwrap(), "20210304_102030");
    }

    #[test]
    fn uses_the_timestamps_own_wall_clock() {
        let pattern = NamePattern::parse("%Y%m%d_%H%M%S").unwrap();
        assert_eq!(pattern.format(&timestamp(9)).unwrap(), "20210304_102030");
        assert_eq!(pattern.format(&timestamp(-5)).unwrap(), "20210304_102030");
    }

    #[test]
    fn is_deterministic() {
        let pattern = NamePattern::parse("IMG_%Y-%m-%d_%H.%M.%S").unwrap();
        let first = pattern.format(&timestamp(1)).unwrap();
        assert_eq!(first, pattern.format(&timestamp(1)).unwrap());
        assert_eq!(first, "IMG_2021-03-04_10.20.30");
    }

    #[test]
    fn sub_directories_join_under_root() {
        let pattern = NamePattern::parse("%Y/%m/%Y%m%d_%H%M%S").unwrap();
        assert_eq!(
            pattern
                .destination_stem(Path::new("/out"), &timestamp(0))
                .unwrap(),
            PathBuf::from("/out/2021/03/20210304_102030")
        );
    }

    #[test]
    fn rejects_invalid_specifiers() {
        assert!(NamePattern::parse("%Y%m%d_%").is_err());
        assert!(NamePattern::parse("").is_err());
    }

    #[test]
    fn rejects_patterns_escaping_the_root() {
        assert!(NamePattern::parse("/%Y/%m").is_err());
        assert!(NamePattern::parse("../%Y").is_err());
    }
}
