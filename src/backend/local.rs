//! Local filesystem backends used by the CLI

use super::{FileStore, LockService};
use crate::config::FilesConfig;
use crate::error::{CropError, CropResult};
use crate::uri::StreamUri;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};

/// Files under per-scheme directories of a site root
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    roots: HashMap<String, PathBuf>,
}

impl LocalFileStore {
    /// Map every registered scheme to its directory below `files.root`
    pub fn from_config(files: &FilesConfig) -> Self {
        let roots = FilesConfig::SCHEMES
            .iter()
            .filter_map(|scheme| {
                files
                    .scheme_dir(scheme)
                    .map(|dir| (scheme.to_string(), files.root.join(dir)))
            })
            .collect();
        Self { roots }
    }

    /// Filesystem path for a URI
    pub fn resolve(&self, uri: &StreamUri) -> CropResult<PathBuf> {
        let root = self
            .roots
            .get(uri.scheme())
            .ok_or_else(|| CropError::UnknownScheme(uri.scheme().to_string()))?;

        if uri
            .target()
            .split(['/', '\\'])
            .any(|segment| segment == "..")
        {
            return Err(CropError::PathInvalid {
                path: PathBuf::from(uri.target()),
                reason: "path traversal".to_string(),
            });
        }

        Ok(root.join(uri.target()))
    }
}

fn is_not_found(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::NotFound
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, uri: &StreamUri) -> CropResult<bool> {
        let path = self.resolve(uri)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(CropError::io(format!("checking {}", path.display()), e)),
        }
    }

    async fn read(&self, uri: &StreamUri) -> CropResult<Vec<u8>> {
        let path = self.resolve(uri)?;
        fs::read(&path).await.map_err(|e| {
            if is_not_found(&e) {
                CropError::NotFound(uri.to_string())
            } else {
                CropError::io(format!("reading {}", path.display()), e)
            }
        })
    }

    async fn write(&self, uri: &StreamUri, bytes: &[u8]) -> CropResult<()> {
        let path = self.resolve(uri)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CropError::io(format!("creating {}", parent.display()), e))?;
        }

        let tmp = path.with_file_name(format!(
            ".{}.{}.tmp",
            uri.file_name(),
            std::process::id()
        ));
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| CropError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| CropError::io(format!("replacing {}", path.display()), e))?;

        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    async fn delete(&self, uri: &StreamUri) -> CropResult<bool> {
        let path = self.resolve(uri)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(CropError::io(format!("deleting {}", path.display()), e)),
        }
    }

    async fn delete_recursive(&self, uri: &StreamUri) -> CropResult<()> {
        let path = self.resolve(uri)?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(CropError::io(format!("removing {}", path.display()), e)),
        }
    }
}

/// Cross-process locks backed by exclusive lock files
///
/// A lock file older than the stale timeout is assumed to belong to a
/// crashed process and is taken over.
#[derive(Debug, Clone)]
pub struct FileLockService {
    dir: PathBuf,
    stale_after: Duration,
}

impl FileLockService {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stale_after: Duration::from_secs(30),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.lock", file))
    }

    fn create(path: &Path) -> std::io::Result<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(|_| ())
    }

    fn is_stale(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.stale_after)
    }
}

impl LockService for FileLockService {
    fn try_acquire(&self, name: &str) -> CropResult<bool> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| CropError::io(format!("creating {}", self.dir.display()), e))?;

        let path = self.lock_path(name);
        match Self::create(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !self.is_stale(&path) {
                    return Ok(false);
                }
                warn!("Taking over stale lock {}", name);
                let _ = std::fs::remove_file(&path);
                match Self::create(&path) {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
                    Err(e) => Err(CropError::io(format!("creating {}", path.display()), e)),
                }
            }
            Err(e) => Err(CropError::io(format!("creating {}", path.display()), e)),
        }
    }

    fn release(&self, name: &str) {
        let path = self.lock_path(name);
        if let Err(e) = std::fs::remove_file(&path) {
            if !is_not_found(&e) {
                warn!("Failed to release lock {}: {}", name, e);
            }
        }
    }
}
