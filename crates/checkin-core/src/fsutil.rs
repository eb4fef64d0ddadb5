//! Whole-file writes via temp file + rename

use crate::errors::CheckinError;
use std::io::Write;
use std::path::Path;

/// Replace `path` with `contents`. Readers see either the old file or the
/// new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CheckinError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CheckinError::Io(e.error.to_string()))?;
    Ok(())
}
