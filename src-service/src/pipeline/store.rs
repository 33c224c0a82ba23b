//! Durable JSON snapshots.
//!
//! Write-temp-then-rename persistence: a snapshot is serialized to a
//! sibling temp file and atomically renamed over the destination, so a
//! crash mid-write (or a concurrent reader) never observes a partially
//! written file. Loading is lenient — a missing or unparseable snapshot is
//! reported as absent, never as fatal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace the snapshot at `path` with `value`.
pub fn save_snapshot<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let data = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let tmp = temp_sibling(path);
    fs::write(&tmp, &data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        // The half-written temp file must not linger next to the store.
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Load the snapshot at `path`, or `None` when missing or corrupt.
pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "snapshot unreadable, treating as empty");
            return None;
        }
    };
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "snapshot corrupt, treating as empty");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scratch_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let dir = std::env::temp_dir().join(format!(
            "auricle-store-{}-{}-{}",
            label,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_round_trip() {
        let path = scratch_dir("roundtrip").join("snap.json");
        save_snapshot(&path, &vec![1u32, 2, 3]).unwrap();
        let loaded: Vec<u32> = load_snapshot(&path).unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let path = scratch_dir("parents").join("nested").join("snap.json");
        save_snapshot(&path, &42u32).unwrap();
        assert_eq!(load_snapshot::<u32>(&path), Some(42));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = scratch_dir("tmpclean");
        let path = dir.join("snap.json");
        save_snapshot(&path, &1u32).unwrap();
        let entries: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("snap.json")]);
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let path = scratch_dir("missing").join("never-written.json");
        assert_eq!(load_snapshot::<u32>(&path), None);
    }

    #[test]
    fn test_corrupt_snapshot_is_none() {
        let path = scratch_dir("corrupt").join("snap.json");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(load_snapshot::<u32>(&path), None);
    }

    #[test]
    fn test_save_onto_directory_fails_cleanly() {
        let dir = scratch_dir("collide");
        let path = dir.join("snap.json");
        fs::create_dir_all(&path).unwrap(); // destination is a directory
        assert!(save_snapshot(&path, &1u32).is_err());
        assert!(!temp_sibling(&path).exists());
    }
}
