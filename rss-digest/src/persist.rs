//! Atomic file replacement and quarantine of unreadable files.

use crate::types::Result;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Write `path` through a temporary file in the same directory, then rename
/// it over the target. Readers see either the old or the new contents.
///
/// If `write` fails, or the flush/rename fails, the temporary file is removed
/// and the error is returned. The previous contents of `path` are untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let tmp_path = temp_path_for(path);
    let outcome = write_then_rename(&tmp_path, path, write);

    if outcome.is_err() {
        match fs::remove_file(&tmp_path) {
            Ok(()) => debug!("Removed temporary file {}", tmp_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temporary file {}: {}", tmp_path.display(), e),
        }
    }
    outcome
}

fn write_then_rename<F>(tmp_path: &Path, path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let mut file = File::create(tmp_path)?;
    {
        let mut writer = BufWriter::new(&mut file);
        write(&mut writer)?;
        writer.flush()?;
    }
    file.sync_all()?;
    drop(file);

    fs::rename(tmp_path, path)?;
    Ok(())
}

/// `.<name>.<uuid>.tmp` next to `path`.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

/// Rename an unreadable file aside so it is kept for inspection.
/// Returns the quarantine path.
pub fn quarantine(path: &Path) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());

    let mut target = path.with_file_name(format!("{}.corrupt", name));
    if target.exists() {
        // never clobber an earlier quarantined copy
        target = path.with_file_name(format!("{}.corrupt.{}", name, Uuid::new_v4().simple()));
    }

    fs::rename(path, &target)?;
    Ok(target)
}
