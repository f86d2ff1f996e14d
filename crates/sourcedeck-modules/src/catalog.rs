//! Catalog store: JSON-file persistence of module records.
//!
//! The catalog is one JSON array rewritten in full on every mutation.
//! All read-modify-write cycles go through [`CatalogStore::lock`], which
//! hands out a [`CatalogTxn`] guard; holding it is the only way to write
//! the catalog file or a script file.

use std::collections::HashSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::descriptor::ModuleDescriptor;
use crate::error::ModuleError;

/// File name of the catalog, locally and in the cloud mirror.
pub const CATALOG_FILE_NAME: &str = "modules.json";

/// Directory (under the data dir) holding one script file per module.
const SCRIPTS_DIR_NAME: &str = "modules";

/// Extension used for script files.
const SCRIPT_EXTENSION: &str = "js";

/// A module known to this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    /// Generated at creation, never changes.
    pub id: Uuid,
    pub metadata: ModuleDescriptor,
    /// File name of the script under the scripts directory.
    pub local_path: String,
    /// Where the descriptor was fetched from. Unique across the catalog.
    pub metadata_url: String,
    pub is_active: bool,
}

impl ModuleRecord {
    /// Build a new record with a fresh id and matching script file name.
    pub fn new(metadata: ModuleDescriptor, metadata_url: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            metadata,
            local_path: script_file_name(id),
            metadata_url: metadata_url.into(),
            is_active: false,
        }
    }
}

/// Script file name for a module id.
pub fn script_file_name(id: Uuid) -> String {
    format!("{id}.{SCRIPT_EXTENSION}")
}

/// Decode catalog bytes. Used both for the local file and for cloud copies
/// before they are allowed to replace the local file.
pub fn decode_catalog(bytes: &[u8]) -> Result<Vec<ModuleRecord>, ModuleError> {
    serde_json::from_slice(bytes).map_err(|e| ModuleError::Catalog(format!("invalid catalog: {e}")))
}

/// Reject catalogs that break the record invariants: ids and metadata
/// URLs are unique.
pub fn validate_catalog(records: &[ModuleRecord]) -> Result<(), ModuleError> {
    let mut ids = HashSet::with_capacity(records.len());
    let mut urls = HashSet::with_capacity(records.len());
    for record in records {
        if !ids.insert(record.id) {
            return Err(ModuleError::Catalog(format!(
                "duplicate module id {}",
                record.id
            )));
        }
        if !urls.insert(record.metadata_url.as_str()) {
            return Err(ModuleError::Catalog(format!(
                "duplicate metadata URL {}",
                record.metadata_url
            )));
        }
    }
    Ok(())
}

/// `path` with `.tmp` appended to its file name.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Encode a catalog the way it is stored on disk.
pub fn encode_catalog(records: &[ModuleRecord]) -> Result<Vec<u8>, ModuleError> {
    serde_json::to_vec_pretty(records)
        .map_err(|e| ModuleError::Catalog(format!("failed to encode catalog: {e}")))
}

// ─── Store ──────────────────────────────────────────────────────────────

/// Local, file-backed catalog with its script directory.
#[derive(Debug)]
pub struct CatalogStore {
    catalog_path: PathBuf,
    scripts_dir: PathBuf,
    lock: Mutex<()>,
}

impl CatalogStore {
    /// Create a store rooted at `data_dir`. Nothing is touched on disk
    /// until the first write.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            catalog_path: data_dir.join(CATALOG_FILE_NAME),
            scripts_dir: data_dir.join(SCRIPTS_DIR_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Absolute path of a script file name stored in a record.
    ///
    /// Only the final component of `local_path` is used, so a record
    /// pulled from elsewhere cannot point outside the scripts directory.
    pub fn script_path(&self, local_path: &str) -> PathBuf {
        let name = Path::new(local_path)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        self.scripts_dir.join(name)
    }

    /// Acquire exclusive access to the catalog and script files.
    pub async fn lock(&self) -> CatalogTxn<'_> {
        CatalogTxn {
            store: self,
            _guard: self.lock.lock().await,
        }
    }

    /// Snapshot of the current records.
    pub async fn records(&self) -> Result<Vec<ModuleRecord>, ModuleError> {
        self.lock().await.load().await
    }

    /// Read a module's script text. Does not take the catalog lock.
    pub async fn read_script(&self, local_path: &str) -> Result<String, ModuleError> {
        let path = self.script_path(local_path);
        let bytes = tokio::fs::read(&path).await?;
        // A local file that is not text is a damaged file, not a bad download.
        String::from_utf8(bytes)
            .map_err(|e| ModuleError::Io(std::io::Error::new(ErrorKind::InvalidData, e)))
    }

    /// Whether a record's script file is present on disk.
    pub async fn script_exists(&self, local_path: &str) -> bool {
        tokio::fs::metadata(self.script_path(local_path))
            .await
            .is_ok()
    }
}

/// A script written next to its final path but not yet visible there.
///
/// Finish with [`CatalogTxn::publish_script`] or
/// [`CatalogTxn::discard_script`].
#[derive(Debug)]
#[must_use]
pub struct StagedScript {
    staged: PathBuf,
    target: PathBuf,
}

/// Exclusive access to the catalog, obtained from [`CatalogStore::lock`].
pub struct CatalogTxn<'a> {
    store: &'a CatalogStore,
    _guard: MutexGuard<'a, ()>,
}

impl CatalogTxn<'_> {
    /// Load all records. A missing catalog file is an empty catalog.
    pub async fn load(&self) -> Result<Vec<ModuleRecord>, ModuleError> {
        match self.read_raw().await? {
            Some(bytes) => decode_catalog(&bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Rewrite the whole catalog.
    pub async fn commit(&self, records: &[ModuleRecord]) -> Result<(), ModuleError> {
        let bytes = encode_catalog(records)?;
        self.write_raw(&bytes).await
    }

    /// Raw catalog bytes, `None` when the file does not exist.
    pub async fn read_raw(&self) -> Result<Option<Vec<u8>>, ModuleError> {
        match tokio::fs::read(&self.store.catalog_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the catalog file with `bytes`, via a temp file and rename.
    pub async fn write_raw(&self, bytes: &[u8]) -> Result<(), ModuleError> {
        let path = &self.store.catalog_path;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Write a module's script file, replacing any previous one whole.
    pub async fn write_script(&self, local_path: &str, script: &str) -> Result<(), ModuleError> {
        let staged = self.stage_script(local_path, script).await?;
        self.publish_script(staged).await
    }

    /// Write `script` to a temp file beside the module's script path.
    pub async fn stage_script(
        &self,
        local_path: &str,
        script: &str,
    ) -> Result<StagedScript, ModuleError> {
        tokio::fs::create_dir_all(&self.store.scripts_dir).await?;
        let target = self.store.script_path(local_path);
        let staged = temp_path(&target);
        tokio::fs::write(&staged, script).await?;
        Ok(StagedScript { staged, target })
    }

    /// Move a staged script into place.
    pub async fn publish_script(&self, staged: StagedScript) -> Result<(), ModuleError> {
        if let Err(e) = tokio::fs::rename(&staged.staged, &staged.target).await {
            self.discard_script(staged).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop a staged script. The live script is untouched.
    pub async fn discard_script(&self, staged: StagedScript) {
        if let Err(e) = tokio::fs::remove_file(&staged.staged).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %staged.staged.display(), "failed to remove staged script: {e}");
            }
        }
    }

    /// File names currently in the scripts directory. A missing
    /// directory has none.
    pub async fn script_file_names(&self) -> Result<Vec<String>, ModuleError> {
        let mut entries = match tokio::fs::read_dir(&self.store.scripts_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove a module's script file. An already absent file is fine.
    pub async fn remove_script(&self, local_path: &str) -> Result<(), ModuleError> {
        match tokio::fs::remove_file(self.store.script_path(local_path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
