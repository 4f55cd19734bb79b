// # File State Store
//
// JSON file holding the state of every resource the provider manages, so a
// later `read`, `update` or `delete` finds the identity, the attributes and
// the `original` snapshot taken on create.
//
// ## Writes
//
// Every mutation is written through:
// 1. The new document goes to `<path>.tmp`
// 2. The current file, if any, is copied to `<path>.backup`
// 3. `<path>.tmp` is renamed over `<path>`
//
// ## Loading
//
// A file that does not parse falls back to `<path>.backup`, and the backup is
// copied back into place. A file written by a newer format is refused rather
// than silently rewritten.
//
// ## File Format
//
// ```json
// {
//   "format_version": 1,
//   "resources": {
//     "//localhost/network_adapters/Ethernet0": {
//       "resource_type": "windows_network_adapter",
//       "attributes": { "name": "Ethernet0", "original": { "name": "Ethernet0" } },
//       "last_updated": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::Error;
use crate::traits::state_store::{StateRecord, StateStore};

const FORMAT_VERSION: u32 = 1;

type Resources = BTreeMap<String, StateRecord>;

#[derive(serde::Serialize, serde::Deserialize)]
struct Document {
    format_version: u32,
    #[serde(default)]
    resources: Resources,
}

/// Outcome of reading one file
enum Loaded {
    Missing,
    Parsed(Resources),
    Unreadable(serde_json::Error),
}

/// File-backed state store
///
/// Resources are kept sorted by identity so the file diffs cleanly.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    resources: Mutex<Resources>,
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::state_store(format!("cannot {} {}: {}", action, path.display(), e))
}

async fn read_document(path: &Path) -> Result<Loaded, Error> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(e) => return Err(io_error("read", path, e)),
    };

    let document: Document = match serde_json::from_str(&content) {
        Ok(document) => document,
        Err(e) => return Ok(Loaded::Unreadable(e)),
    };
    if document.format_version > FORMAT_VERSION {
        return Err(Error::state_store(format!(
            "{} was written with state format {}, this provider reads up to {}",
            path.display(),
            document.format_version,
            FORMAT_VERSION
        )));
    }
    Ok(Loaded::Parsed(document.resources))
}

impl FileStateStore {
    /// Open the state file at `path`, creating parent directories as needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "cannot create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let resources = Self::load(&path).await?;
        debug!(path = %path.display(), resources = resources.len(), "state loaded");

        Ok(Self {
            path,
            resources: Mutex::new(resources),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(path: &Path) -> PathBuf {
        sibling(path, "backup")
    }

    async fn load(path: &Path) -> Result<Resources, Error> {
        let corruption = match read_document(path).await? {
            Loaded::Missing => return Ok(Resources::new()),
            Loaded::Parsed(resources) => return Ok(resources),
            Loaded::Unreadable(e) => e,
        };
        warn!(path = %path.display(), "state file is corrupted, trying the backup: {}", corruption);

        let backup = Self::backup_path(path);
        match read_document(&backup).await? {
            Loaded::Parsed(resources) => {
                info!(resources = resources.len(), "state recovered from backup");
                if let Err(e) = fs::copy(&backup, path).await {
                    error!(backup = %backup.display(), "cannot put the backup back into place: {}", e);
                }
                Ok(resources)
            }
            Loaded::Missing => {
                warn!("no state backup, starting empty");
                Ok(Resources::new())
            }
            Loaded::Unreadable(e) => {
                error!("state backup is corrupted too, starting empty: {}", e);
                Ok(Resources::new())
            }
        }
    }

    async fn persist(&self, resources: &Resources) -> Result<(), Error> {
        let document = Document {
            format_version: FORMAT_VERSION,
            resources: resources.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let tmp = sibling(&self.path, "tmp");
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| io_error("create", &tmp, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| io_error("write", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error("sync", &tmp, e))?;
        drop(file);

        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let backup = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup).await {
                warn!(backup = %backup.display(), "cannot back up state: {}", e);
            }
        }

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error("replace", &self.path, e))?;
        trace!(path = %self.path.display(), "state written");
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_record(&self, id: &str) -> Result<Option<StateRecord>, Error> {
        Ok(self.resources.lock().await.get(id).cloned())
    }

    async fn set_record(&self, id: &str, record: &StateRecord) -> Result<(), Error> {
        let mut resources = self.resources.lock().await;
        resources.insert(id.to_string(), record.clone());
        self.persist(&resources).await
    }

    async fn delete_record(&self, id: &str) -> Result<(), Error> {
        let mut resources = self.resources.lock().await;
        if resources.remove(id).is_some() {
            self.persist(&resources).await?;
        }
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<String>, Error> {
        Ok(self.resources.lock().await.keys().cloned().collect())
    }

    /// Writes are already durable when `set_record`/`delete_record` return
    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
