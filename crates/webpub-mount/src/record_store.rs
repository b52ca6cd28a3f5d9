//! Durable alias → source records.
//!
//! One file per active publish, `<state_dir>/<alias>.path`, whose content is
//! exactly the source path. There is no locking and no atomic rename: the
//! store only has to be good enough to guide recovery after a crash.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Suffix of record files.
pub const RECORD_SUFFIX: &str = ".path";

/// A record together with when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    /// Alias (record key)
    pub alias: String,
    /// Published source directory
    pub source: PathBuf,
    /// Modification time of the record file
    pub published_at: Option<DateTime<Utc>>,
}

/// Directory of publish records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{alias}{RECORD_SUFFIX}"))
    }

    /// Write (or overwrite) the record for `alias`, creating the directory on first use.
    pub fn write(&self, alias: &str, source: &Path) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.record_path(alias), source.as_os_str().as_bytes())?;
        tracing::debug!(alias, source = %source.display(), "record written");
        Ok(())
    }

    /// Source path recorded for `alias`, if any.
    pub fn read(&self, alias: &str) -> io::Result<Option<PathBuf>> {
        match fs::read(self.record_path(alias)) {
            Ok(bytes) => Ok(Some(parse_record(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete the record for `alias`; absence is not an error.
    pub fn delete(&self, alias: &str) -> io::Result<()> {
        match fs::remove_file(self.record_path(alias)) {
            Ok(()) => {
                tracing::debug!(alias, "record deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Aliases with a record, sorted. A missing directory means no records.
    pub fn list_aliases(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut aliases = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(alias) = name.to_str().and_then(|n| n.strip_suffix(RECORD_SUFFIX))
                && !alias.is_empty()
            {
                aliases.push(alias.to_string());
            }
        }

        aliases.sort();
        Ok(aliases)
    }

    /// Every record with its source and timestamp.
    pub fn list_records(&self) -> io::Result<Vec<RecordEntry>> {
        let mut records = Vec::new();
        for alias in self.list_aliases()? {
            let path = self.record_path(&alias);
            // May vanish between listing and reading if a session ends
            let Some(source) = self.read(&alias)? else {
                continue;
            };
            let published_at = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            records.push(RecordEntry {
                alias,
                source,
                published_at,
            });
        }
        Ok(records)
    }
}

fn parse_record(bytes: &[u8]) -> PathBuf {
    let trimmed = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    PathBuf::from(OsStr::from_bytes(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_directory() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path().join("run/webpub"));

        store.write("site", Path::new("/home/u/site")).unwrap();

        let content = fs::read_to_string(temp.path().join("run/webpub/site.path")).unwrap();
        assert_eq!(content, "/home/u/site");
    }

    #[test]
    fn test_read_returns_recorded_source() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path());

        store.write("site", Path::new("/home/u/my site")).unwrap();

        assert_eq!(store.read("site").unwrap(), Some(PathBuf::from("/home/u/my site")));
        assert_eq!(store.read("other").unwrap(), None);
    }

    #[test]
    fn test_read_tolerates_trailing_newline() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("site.path"), "/home/u/site\n").unwrap();
        let store = RecordStore::new(temp.path());

        assert_eq!(store.read("site").unwrap(), Some(PathBuf::from("/home/u/site")));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path());
        store.write("site", Path::new("/home/u/site")).unwrap();

        store.delete("site").unwrap();
        store.delete("site").unwrap();
        assert_eq!(store.read("site").unwrap(), None);

        let missing_dir = RecordStore::new(temp.path().join("never-created"));
        missing_dir.delete("site").unwrap();
    }

    #[test]
    fn test_list_aliases_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path());
        store.write("zeta", Path::new("/z")).unwrap();
        store.write("alpha", Path::new("/a")).unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(temp.path().join("dir.path")).unwrap();

        assert_eq!(store.list_aliases().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_list_aliases_missing_directory() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path().join("absent"));
        assert!(store.list_aliases().unwrap().is_empty());
    }

    #[test]
    fn test_list_records_includes_timestamp() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path());
        store.write("site", Path::new("/home/u/site")).unwrap();

        let records = store.list_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].alias, "site");
        assert_eq!(records[0].source, PathBuf::from("/home/u/site"));
        assert!(records[0].published_at.is_some());
    }
}
