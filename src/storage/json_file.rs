//! Atomic JSON document storage.

use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Upper bound on a state file, to refuse reading something unexpected.
pub const MAX_STATE_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Serializes `value` and writes it to `path` atomically.
///
/// Parent directories are created as needed.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_state".to_string(),
        cause: e.to_string(),
    })?;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
        operation: "create_state_dir".to_string(),
        cause: format!("{}: {e}", parent.display()),
    })?;

    let temp_name = format!(
        ".{}.tmp.{}",
        path.file_name()
            .map_or_else(|| "state".to_string(), |n| n.to_string_lossy().into_owned()),
        std::process::id()
    );
    let temp_path = parent.join(temp_name);

    let written = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::OperationFailed {
            operation: "write_state_file".to_string(),
            cause: format!("{}: {e}", temp_path.display()),
        });
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::OperationFailed {
            operation: "rename_state_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        });
    }

    Ok(())
}

/// Reads and deserializes `path`, returning `None` if it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let metadata = fs::metadata(path).map_err(|e| Error::OperationFailed {
        operation: "read_state_metadata".to_string(),
        cause: e.to_string(),
    })?;
    if metadata.len() > MAX_STATE_FILE_SIZE {
        return Err(Error::InvalidInput(format!(
            "state file exceeds maximum size of {MAX_STATE_FILE_SIZE} bytes: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_state_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::OperationFailed {
            operation: "deserialize_state".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
}

/// Deletes `path` if present.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::OperationFailed {
            operation: "remove_state_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        let mut value = BTreeMap::new();
        value.insert("copied".to_string(), 4);

        write_json_atomic(&path, &value).unwrap();
        let back: Option<BTreeMap<String, i32>> = read_json(&path).unwrap();
        assert_eq!(back, Some(value));

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Vec<String>> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_read_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let result: Result<Option<Vec<String>>> = read_json(&path);
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_remove_if_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.json");
        remove_if_exists(&path).unwrap();
        fs::write(&path, "[]").unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}
