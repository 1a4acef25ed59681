//! Small filesystem helpers shared by the settings, project index and caches

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{QuestError, Result};

/// Write `bytes` to `path` by writing a sibling temp file and renaming it over the target.
///
/// Readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| QuestError::ConfigInvalid {
        key: "path".to_string(),
        reason: format!("{} has no parent directory", path.display()),
    })?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| QuestError::Io(e.error))?;
    Ok(())
}

/// Move a file, falling back to copy + remove when a rename crosses filesystems
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

/// Remove a file or directory if it exists
pub fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b").join("file.txt");

        write_atomic(&target, b"hello").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");

        write_atomic(&target, b"replaced").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "replaced");
    }

    #[test]
    fn test_move_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from.txt");
        let to = dir.path().join("nested").join("to.txt");
        fs::write(&from, "data").unwrap();

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "data");

        remove_path(&to).unwrap();
        assert!(!to.exists());
        // Removing a missing path is not an error
        remove_path(&to).unwrap();
    }
}
