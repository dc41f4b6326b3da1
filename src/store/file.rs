use super::KeyValueStore;
use crate::error::Result;
use crate::key_generator::KeyGenerator;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

const TEMP_SUFFIX: &str = ".tmp";

// Distinguishes concurrent writes of the same key within one process.
static WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Directory-scoped store: one file per key.
///
/// The directory is created lazily on the first write, so opening a store on
/// a path that does not exist yet is not an error. `clear_all` only removes
/// files this store could have written; anything else in the directory is
/// left alone.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(KeyGenerator::file_name(key))
    }

    fn temp_path_for(&self, path: &Path) -> PathBuf {
        let sequence = WRITE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".{}.{}{}", std::process::id(), sequence, TEMP_SUFFIX));
        PathBuf::from(tmp)
    }
}

/// Record files and the temporary files written next to them.
fn is_owned_file_name(name: &str) -> bool {
    let record = match name.strip_suffix(TEMP_SUFFIX) {
        Some(stem) => {
            // `{record}.{pid}.{sequence}`
            let mut parts = stem.rsplitn(3, '.');
            let sequence = parts.next().unwrap_or_default();
            let pid = parts.next().unwrap_or_default();
            let numeric = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
            if !numeric(sequence) || !numeric(pid) {
                return false;
            }
            parts.next().unwrap_or_default()
        }
        None => name,
    };
    KeyGenerator::is_record_file_name(record)
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = self.temp_path_for(&path);

        // Readers only ever see a complete value.
        let written = match tokio::fs::write(&tmp, value).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temporary record");
                }
            }
            return Err(e.into());
        }

        debug!(key = %key, path = %path.display(), "Stored record");
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_owned_file_name(name) || !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        debug!(dir = %self.dir.display(), removed, "Cleared store directory");
        Ok(())
    }
}
