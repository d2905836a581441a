//! Atomic snapshot persistence
//!
//! Writes go to a `.tmp` sibling, `sync_all()`, then `fs::rename()` over the
//! final path, so a reader never observes a partially-written file.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use bmc_error::{BmcError, Result};

/// Serialize `value` as pretty JSON and atomically replace the file at `path`.
pub fn save_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    let json = serde_json::to_string_pretty(value)?;

    let mut file = fs::File::create(&tmp_path).map_err(|e| BmcError::FileWrite {
        path: tmp_path.clone(),
        source: e,
    })?;
    file.write_all(json.as_bytes()).map_err(|e| BmcError::FileWrite {
        path: tmp_path.clone(),
        source: e,
    })?;
    file.sync_all().map_err(|e| BmcError::FileWrite {
        path: tmp_path.clone(),
        source: e,
    })?;

    fs::rename(&tmp_path, path).map_err(|e| BmcError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

/// Load and deserialize a snapshot written by `save_atomic`.
pub fn load<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| BmcError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        save_atomic(&path, &Sample { value: 7 }).unwrap();
        let loaded: Sample = load(&path).unwrap();
        assert_eq!(loaded, Sample { value: 7 });
    }

    #[test]
    fn save_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        save_atomic(&path, &Sample { value: 1 }).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert!(path.exists());
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let result: Result<Sample> = load(&path);
        assert!(result.is_err());
    }
}
