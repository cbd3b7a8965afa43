use crate::common::{MAX_COPY_RETRIES, errors::DispatchError};
use anyhow::{Context, anyhow};
use log::{info, warn};
use std::{
    fs::{self, File},
    io::{self, ErrorKind, Seek},
    path::Path,
    thread,
    time::Duration,
};

/// Create the destination's parent directory tree if it is missing.
pub fn ensure_parent_dir(destination: &Path) -> Result<(), DispatchError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory tree for {:?}", parent))?;
    }
    Ok(())
}

/// Refuse to go on when something already sits at `destination`.
pub fn check_free(source: &Path, destination: &Path) -> Result<(), DispatchError> {
    if destination.exists() {
        return Err(DispatchError::DestinationExists {
            origin: source.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }
    Ok(())
}

/// Move `source` to `destination`, never replacing an existing file.
///
/// The collision check and the rename are separate steps; callers must be the
/// only writer of the destination tree.
pub fn move_into_place(source: &Path, destination: &Path) -> Result<(), DispatchError> {
    if !source.exists() {
        return Err(DispatchError::SourceMissing(source.to_path_buf()));
    }
    ensure_parent_dir(destination)?;
    check_free(source, destination)?;

    match fs::rename(source, destination) {
        Ok(()) => {
            info!("Moved from {:?} to {:?}", source, destination);
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            copy_across_devices(source, destination)?;
            info!("Copied from {:?} to {:?} across filesystems", source, destination);
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound && !source.exists() => {
            Err(DispatchError::SourceMissing(source.to_path_buf()))
        }
        Err(err) => Err(DispatchError::Io(anyhow!(err).context(format!(
            "failed to rename {:?} to {:?}",
            source, destination
        )))),
    }
}

/// Copy into a hidden temporary beside the destination, rename it into place,
/// then remove the source.
fn copy_across_devices(source: &Path, destination: &Path) -> Result<(), DispatchError> {
    let parent = destination
        .parent()
        .ok_or_else(|| anyhow!("destination {:?} has no parent", destination))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temporary file in {:?}", parent))?;

    copy_with_retry(source, temp.as_file_mut())
        .with_context(|| format!("failed to copy {:?} to {:?}", source, destination))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed to flush copy of {:?}", source))?;

    temp.persist_noclobber(destination).map_err(|err| {
        if err.error.kind() == ErrorKind::AlreadyExists {
            DispatchError::DestinationExists {
                origin: source.to_path_buf(),
                destination: destination.to_path_buf(),
            }
        } else {
            DispatchError::Io(anyhow!(err.error).context(format!(
                "failed to rename copy into {:?}",
                destination
            )))
        }
    })?;

    fs::remove_file(source)
        .with_context(|| format!("copied to {:?} but failed to remove {:?}", destination, source))?;
    Ok(())
}

fn copy_with_retry(source: &Path, target: &mut File) -> io::Result<u64> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match copy_once(source, &mut *target) {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempts < MAX_COPY_RETRIES => {
                warn!(
                    "Failed copying {:?} (attempt {}), retrying in {}ms: {}",
                    source,
                    attempts,
                    100 * attempts,
                    err
                );
                thread::sleep(Duration::from_millis(100 * u64::from(attempts)));
            }
            Err(err) => return Err(err),
        }
    }
}

fn copy_once(source: &Path, target: &mut File) -> io::Result<u64> {
    let mut reader = File::open(source)?;
    target.set_len(0)?;
    target.rewind()?;
    io::copy(&mut reader, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_and_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("IMG_0001.jpg");
        let destination = dir.path().join("out/2021/03/20210304_102030.jpg");
        fs::write(&source, b"pixels").unwrap();

        move_into_place(&source, &destination).unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), b"pixels");
    }

    #[test]
    fn never_replaces_an_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("IMG_0001.jpg");
        let destination = dir.path().join("20210304_102030.jpg");
        fs::write(&source, b"new").unwrap();
        fs::write(&destination, b"old").unwrap();

        let err = move_into_place(&source, &destination).unwrap_err();

        assert!(matches!(err, DispatchError::DestinationExists { .. }));
        assert_eq!(fs::read(&source).unwrap(), b"new");
        assert_eq!(fs::read(&destination).unwrap(), b"old");
    }

    #[test]
    fn missing_source_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_into_place(&dir.path().join("gone.jpg"), &dir.path().join("x.jpg"))
            .unwrap_err();
        assert!(err.is_duplicate_delivery());
    }

    #[test]
    fn cross_device_copy_places_file_and_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        let destination = dir.path().join("sorted/clip.mp4");
        fs::write(&source, b"frames").unwrap();
        ensure_parent_dir(&destination).unwrap();

        copy_across_devices(&source, &destination).unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), b"frames");
    }
}
