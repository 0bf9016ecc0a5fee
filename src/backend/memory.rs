//! In-memory backends

use super::{FileStore, LockService};
use crate::error::{CropError, CropResult};
use crate::uri::StreamUri;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Files held in a map keyed by URI
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file
    pub fn insert(&self, uri: &StreamUri, bytes: impl Into<Vec<u8>>) {
        lock(&self.files).insert(uri.to_string(), bytes.into());
    }

    /// URIs of all stored files, sorted
    pub fn uris(&self) -> Vec<String> {
        lock(&self.files).keys().cloned().collect()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn exists(&self, uri: &StreamUri) -> CropResult<bool> {
        Ok(lock(&self.files).contains_key(&uri.to_string()))
    }

    async fn read(&self, uri: &StreamUri) -> CropResult<Vec<u8>> {
        lock(&self.files)
            .get(&uri.to_string())
            .cloned()
            .ok_or_else(|| CropError::NotFound(uri.to_string()))
    }

    async fn write(&self, uri: &StreamUri, bytes: &[u8]) -> CropResult<()> {
        self.insert(uri, bytes);
        Ok(())
    }

    async fn delete(&self, uri: &StreamUri) -> CropResult<bool> {
        Ok(lock(&self.files).remove(&uri.to_string()).is_some())
    }

    async fn delete_recursive(&self, uri: &StreamUri) -> CropResult<()> {
        lock(&self.files).retain(|key, _| match StreamUri::parse(key) {
            Ok(file) => !(file == *uri || uri.contains(&file)),
            Err(_) => true,
        });
        Ok(())
    }
}

/// Process-local lock table with acquire/release counters
#[derive(Debug, Default)]
pub struct MemoryLockService {
    held: Mutex<HashSet<String>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful acquisitions so far
    pub fn acquisitions(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Releases of held locks so far
    pub fn releases(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn is_held(&self, name: &str) -> bool {
        lock(&self.held).contains(name)
    }
}

impl LockService for MemoryLockService {
    fn try_acquire(&self, name: &str) -> CropResult<bool> {
        let inserted = lock(&self.held).insert(name.to_string());
        if inserted {
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }
        Ok(inserted)
    }

    fn release(&self, name: &str) {
        if lock(&self.held).remove(name) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}
