use std::path::{Path, PathBuf};

use directories::BaseDirs;

pub trait PathExt {
    fn ext_lower(&self) -> String;

    /// Extension exactly as written, without the dot.
    fn ext_verbatim(&self) -> Option<String>;
}

impl PathExt for Path {
    fn ext_lower(&self) -> String {
        self.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn ext_verbatim(&self) -> Option<String> {
        self.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
    }
}

/// Append `.ext` to `path` without touching dots already in the file name.
pub fn with_appended_extension(path: &Path, ext: Option<&str>) -> PathBuf {
    match ext {
        Some(ext) if !ext.is_empty() => {
            let mut os = path.as_os_str().to_os_string();
            os.push(".");
            os.push(ext);
            PathBuf::from(os)
        }
        _ => path.to_path_buf(),
    }
}

pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Expand a leading `~` to `home`.
pub fn expand_home_with(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

pub fn expand_home(path: &Path) -> PathBuf {
    match home_dir() {
        Some(home) => expand_home_with(path, &home),
        None => path.to_path_buf(),
    }
}
