//! One-file-per-entry persistence.
//!
//! Files are named `<sha256(key)>.json` and hold a serialized [`CacheEntry`].
//! Writes go to a temporary file in the same directory and are renamed into
//! place, so a reader sees either the old file or the new one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::cache::entry::CacheEntry;

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Result of scanning the cache directory at startup.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Valid entries, oldest first.
    pub entries: Vec<CacheEntry>,
    pub expired: usize,
    pub corrupt: usize,
}

#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{}.{}", name, ENTRY_EXTENSION))
    }

    pub fn write(&self, entry: &CacheEntry) -> io::Result<()> {
        let bytes = serde_json::to_vec(entry)?;
        let temp = self
            .dir
            .join(format!(".{}.{}", uuid::Uuid::new_v4(), TEMP_EXTENSION));
        fs::write(&temp, bytes)?;
        if let Err(e) = fs::rename(&temp, self.path_for(&entry.key)) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        Ok(())
    }

    /// Remove the file for `key`. Returns whether a file existed.
    pub fn remove(&self, key: &str) -> io::Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read every entry file. Expired, corrupt and misnamed files are deleted,
    /// as are temporary files left by an interrupted write.
    pub fn load_all(&self, now: u64) -> io::Result<LoadReport> {
        let mut report = LoadReport::default();

        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(ENTRY_EXTENSION) => {}
                Some(TEMP_EXTENSION) => {
                    let _ = fs::remove_file(&path);
                    continue;
                }
                _ => continue,
            }

            let parsed = fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<CacheEntry>(&bytes).ok())
                .filter(|entry| self.path_for(&entry.key) == path);

            match parsed {
                Some(entry) if entry.is_valid(now) => report.entries.push(entry),
                Some(_) => {
                    report.expired += 1;
                    let _ = fs::remove_file(&path);
                }
                None => {
                    tracing::warn!(path = %path.display(), "Removing unreadable cache file");
                    report.corrupt += 1;
                    let _ = fs::remove_file(&path);
                }
            }
        }

        report.entries.sort_by_key(|entry| entry.created_at);
        Ok(report)
    }

    /// Bytes used by entry files.
    pub fn total_bytes(&self) -> u64 {
        self.entry_files()
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Delete every entry file. Returns the number deleted.
    pub fn clear(&self) -> usize {
        self.entry_files()
            .iter()
            .filter(|path| fs::remove_file(path).is_ok())
            .count()
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION))
            .collect()
    }
}
