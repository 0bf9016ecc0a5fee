//! Crop store implementations
//!
//! `MemoryCropStore` backs tests and embedding; `JsonCropStore` persists
//! the same table to a JSON file for the CLI.

use super::{Crop, CropId, CropStore};
use crate::error::{CropError, CropResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::fs;
use tracing::debug;

/// Serializable crop and file-record table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CropTable {
    next_crop_id: u64,
    next_file_id: u64,
    crops: BTreeMap<u64, Crop>,
    files: BTreeMap<String, u64>,
}

impl CropTable {
    fn find(&self, uri: &str, crop_type: &str, context: &str) -> Option<&Crop> {
        self.crops
            .values()
            .find(|c| c.uri == uri && c.crop_type == crop_type && c.context == context)
    }

    fn allocate_crop_id(&mut self) -> CropResult<CropId> {
        self.next_crop_id += 1;
        CropId::new(self.next_crop_id)
            .ok_or_else(|| CropError::Internal("crop id overflow".to_string()))
    }

    fn save(&mut self, crop: &mut Crop) -> CropResult<CropId> {
        let id = match crop.id {
            Some(id) => id,
            None => {
                let existing = self
                    .find(&crop.uri, &crop.crop_type, &crop.context)
                    .and_then(|c| c.id);
                match existing {
                    Some(id) => id,
                    None => self.allocate_crop_id()?,
                }
            }
        };
        crop.id = Some(id);
        self.crops.insert(id.get(), crop.clone());
        Ok(id)
    }

    fn register_file(&mut self, uri: &str) -> u64 {
        if let Some(id) = self.files.get(uri) {
            return *id;
        }
        self.next_file_id += 1;
        self.files.insert(uri.to_string(), self.next_file_id);
        self.next_file_id
    }
}

/// In-memory crop store
#[derive(Debug, Default)]
pub struct MemoryCropStore {
    table: Mutex<CropTable>,
}

impl MemoryCropStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, CropTable> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record a managed file for a source URI, returning its id
    pub fn register_file(&self, uri: &str) -> u64 {
        self.table().register_file(uri)
    }

    /// Number of stored crops
    pub fn len(&self) -> usize {
        self.table().crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored crop in id order
    pub fn all(&self) -> Vec<Crop> {
        self.table().crops.values().cloned().collect()
    }

    fn snapshot(&self) -> CropTable {
        self.table().clone()
    }

    fn replace(&self, table: CropTable) {
        *self.table() = table;
    }

    fn from_table(table: CropTable) -> Self {
        Self {
            table: Mutex::new(table),
        }
    }
}

#[async_trait]
impl CropStore for MemoryCropStore {
    async fn load(&self, id: CropId) -> CropResult<Option<Crop>> {
        Ok(self.table().crops.get(&id.get()).cloned())
    }

    async fn find_by_keys(
        &self,
        uri: &str,
        crop_type: &str,
        context: &str,
    ) -> CropResult<Option<Crop>> {
        Ok(self.table().find(uri, crop_type, context).cloned())
    }

    async fn find_by_context_prefix(&self, prefix: &str) -> CropResult<Vec<Crop>> {
        Ok(self
            .table()
            .crops
            .values()
            .filter(|c| c.context.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn source_file_id(&self, uri: &str) -> CropResult<Option<u64>> {
        Ok(self.table().files.get(uri).copied())
    }

    async fn save(&self, crop: &mut Crop) -> CropResult<CropId> {
        self.table().save(crop)
    }
}

/// Crop store persisted to a JSON file
///
/// The whole table is rewritten on every save; crop volumes handled by a
/// single site stay small.
#[derive(Debug)]
pub struct JsonCropStore {
    path: PathBuf,
    inner: MemoryCropStore,

    /// Serializes read-modify-persist cycles
    writer: tokio::sync::Mutex<()>,
}

impl JsonCropStore {
    /// Open the store, starting empty if the file does not exist
    pub async fn open(path: impl Into<PathBuf>) -> CropResult<Self> {
        let path = path.into();
        let table = if path.exists() {
            let content = fs::read_to_string(&path).await.map_err(|e| {
                CropError::io(format!("reading crop store {}", path.display()), e)
            })?;
            serde_json::from_str(&content)?
        } else {
            debug!("Crop store {} not found, starting empty", path.display());
            CropTable::default()
        };

        Ok(Self {
            path,
            inner: MemoryCropStore::from_table(table),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a managed file and persist the table
    pub async fn register_file(&self, uri: &str) -> CropResult<u64> {
        let _writer = self.writer.lock().await;
        let mut table = self.inner.snapshot();
        let id = table.register_file(uri);
        self.persist(&table).await?;
        self.inner.replace(table);
        Ok(id)
    }

    /// Every stored crop in id order
    pub fn all(&self) -> Vec<Crop> {
        self.inner.all()
    }

    /// Write `table` to disk; memory is only updated once this succeeds
    async fn persist(&self, table: &CropTable) -> CropResult<()> {
        let content = serde_json::to_string_pretty(table)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CropError::io("creating crop store directory", e))?;
        }

        // Write beside the target and rename so readers never see half a file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| CropError::io(format!("writing crop store {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            CropError::io(format!("replacing crop store {}", self.path.display()), e)
        })?;

        Ok(())
    }
}

#[async_trait]
impl CropStore for JsonCropStore {
    async fn load(&self, id: CropId) -> CropResult<Option<Crop>> {
        self.inner.load(id).await
    }

    async fn find_by_keys(
        &self,
        uri: &str,
        crop_type: &str,
        context: &str,
    ) -> CropResult<Option<Crop>> {
        self.inner.find_by_keys(uri, crop_type, context).await
    }

    async fn find_by_context_prefix(&self, prefix: &str) -> CropResult<Vec<Crop>> {
        self.inner.find_by_context_prefix(prefix).await
    }

    async fn source_file_id(&self, uri: &str) -> CropResult<Option<u64>> {
        self.inner.source_file_id(uri).await
    }

    async fn save(&self, crop: &mut Crop) -> CropResult<CropId> {
        let _writer = self.writer.lock().await;
        let mut table = self.inner.snapshot();
        let mut saved = crop.clone();
        let id = table.save(&mut saved)?;
        self.persist(&table).await?;
        self.inner.replace(table);
        *crop = saved;
        Ok(id)
    }
}
