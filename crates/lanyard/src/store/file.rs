//! File-backed storage.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, instrument, warn};

use crate::Result;
use crate::error::StorageError;

use super::{Storage, StoredEntry};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

type Document = BTreeMap<String, StoredEntry>;

/// One JSON document holding every key of a store.
///
/// Writers take an exclusive advisory lock on a sibling `.lock` file, write
/// the new document to a `.tmp` file and rename it into place, so readers
/// see either the old or the new document. On Unix the document is
/// readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Open (or prepare to create) the document at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        Ok(Self { path })
    }

    /// Get the document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn lock(&self, exclusive: bool) -> Result<File> {
        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, e))?;

        let locked = if exclusive {
            lock_file.lock_exclusive()
        } else {
            lock_file.lock_shared()
        };
        locked.map_err(|e| io_error(&lock_path, e))?;

        Ok(lock_file)
    }

    fn read_document(&self) -> Result<Document> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(io_error(&self.path, e).into()),
        };

        serde_json::from_str(&content).map_err(|e| {
            StorageError::Corrupt {
                path: self.path.display().to_string(),
                source: e,
            }
            .into()
        })
    }

    /// Read the document for rewriting. A corrupt document is discarded so
    /// that a fresh write can replace it.
    fn read_document_for_write(&self) -> Result<Document> {
        match self.read_document() {
            Err(crate::Error::Storage(StorageError::Corrupt { source, .. })) => {
                warn!(path = %self.path.display(), error = %source, "Replacing corrupt store document");
                Ok(Document::new())
            }
            other => other,
        }
    }

    fn write_document(&self, document: &Document) -> Result<()> {
        if document.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error(&self.path, e).into()),
            };
        }

        let content =
            serde_json::to_string_pretty(document).map_err(|e| StorageError::Corrupt {
                path: self.path.display().to_string(),
                source: e,
            })?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &content).map_err(|e| io_error(&temp_path, e))?;

        #[cfg(unix)]
        {
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&temp_path, perms).map_err(|e| io_error(&temp_path, e))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| io_error(&self.path, e))?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<StoredEntry>> {
        let lock = self.lock(false)?;
        let mut document = self.read_document()?;
        lock.unlock().map_err(|e| io_error(&self.lock_path(), e))?;
        Ok(document.remove(key))
    }

    #[instrument(skip(self, entries), fields(path = %self.path.display()))]
    fn store(&self, entries: &[(&str, StoredEntry)]) -> Result<()> {
        let lock = self.lock(true)?;
        let mut document = self.read_document_for_write()?;
        for (key, entry) in entries {
            document.insert((*key).to_string(), entry.clone());
        }
        self.write_document(&document)?;
        lock.unlock().map_err(|e| io_error(&self.lock_path(), e))?;

        debug!(count = entries.len(), "Stored entries");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn remove(&self, keys: &[&str]) -> Result<()> {
        let lock = self.lock(true)?;
        let mut document = self.read_document_for_write()?;
        let before = document.len();
        for key in keys {
            document.remove(*key);
        }
        if document.len() != before {
            self.write_document(&document)?;
            debug!(removed = before - document.len(), "Removed entries");
        }
        lock.unlock().map_err(|e| io_error(&self.lock_path(), e))?;
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}
