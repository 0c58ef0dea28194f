use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    expand_names, Backend, BackendError, FetchOptions, Locators, NameResolver, TableChange,
    TableLocators,
};

const HASH_PREFIX: &str = "fs:/hash/";
const TABLE_PREFIX: &str = "fs:/table/";
const PRIVATE_SUFFIX: &str = "/private";

const HASH_DIR: &str = "hash";
const LIST_DIR: &str = "lists";
const TABLE_DIR: &str = "tables";

/// Directory-backed backend
///
/// ```text
/// <root>/hash/<blake3>        stored blobs
/// <root>/lists/<blake3>.jsonl one serialized entry per line
/// <root>/tables/<uuid>.json   table contents
/// ```
///
/// Change notification is not supported.
#[derive(Clone)]
pub struct FsBackend {
    root: PathBuf,
    resolver: Arc<RwLock<Option<Arc<dyn NameResolver>>>>,
}

impl std::fmt::Debug for FsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBackend").field("root", &self.root).finish()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableFile {
    owner: String,
    kind: String,
    entries: BTreeMap<String, String>,
}

impl FsBackend {
    /// Open (creating if needed) a backend rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, BackendError> {
        let root = root.as_ref().to_path_buf();
        for dir in [HASH_DIR, LIST_DIR, TABLE_DIR] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self {
            root,
            resolver: Arc::new(RwLock::new(None)),
        })
    }

    fn blob_path(&self, locator: &str) -> Option<PathBuf> {
        let hash = locator.strip_prefix(HASH_PREFIX)?;
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(self.root.join(HASH_DIR).join(hash))
    }

    fn list_path(&self, locator: &str) -> PathBuf {
        let name = blake3::hash(locator.as_bytes()).to_hex();
        self.root.join(LIST_DIR).join(format!("{name}.jsonl"))
    }

    fn table_path(&self, locators: &Locators, write: bool) -> Result<PathBuf, BackendError> {
        for locator in locators {
            let Some(rest) = locator.strip_prefix(TABLE_PREFIX) else {
                continue;
            };
            let (id, private) = match rest.strip_suffix(PRIVATE_SUFFIX) {
                Some(id) => (id, true),
                None => (rest, false),
            };
            if write && !private {
                continue;
            }
            if let Ok(id) = Uuid::parse_str(id) {
                return Ok(self.root.join(TABLE_DIR).join(format!("{id}.json")));
            }
        }
        if write {
            Err(BackendError::ReadOnly(locators.joined()))
        } else {
            Err(BackendError::NotFound(locators.joined()))
        }
    }

    async fn read_table(&self, path: &Path) -> Result<TableFile, BackendError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw)
            .map_err(|e| anyhow::anyhow!("corrupt table file {}: {}", path.display(), e).into())
    }

    async fn write_table(&self, path: &Path, table: &TableFile) -> Result<(), BackendError> {
        let raw = serde_json::to_vec_pretty(table).map_err(anyhow::Error::from)?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }
}

fn to_text(value: Vec<u8>) -> Result<String, BackendError> {
    String::from_utf8(value)
        .map_err(|_| anyhow::anyhow!("table values must be utf-8 text").into())
}

#[async_trait]
impl Backend for FsBackend {
    async fn raw_store(&self, data: Vec<u8>) -> Result<Locators, BackendError> {
        let hash = blake3::hash(&data).to_hex();
        let path = self.root.join(HASH_DIR).join(hash.as_str());
        tracing::debug!("raw_store: {} ({} bytes)", path.display(), data.len());
        tokio::fs::write(&path, data).await?;
        Ok(Locators::from(format!("{HASH_PREFIX}{hash}")))
    }

    async fn raw_fetch(
        &self,
        locators: &Locators,
        _opts: &FetchOptions,
    ) -> Result<Bytes, BackendError> {
        let resolver = self.resolver.read().clone();
        let locators = expand_names(resolver, locators).await;
        for locator in &locators {
            let Some(path) = self.blob_path(locator) else {
                continue;
            };
            match tokio::fs::read(&path).await {
                Ok(data) => return Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(BackendError::NotFound(locators.joined()))
    }

    async fn list_append(&self, list: &Locators, entry: Vec<u8>) -> Result<(), BackendError> {
        use tokio::io::AsyncWriteExt;

        let mut line = to_text(entry)?;
        if line.contains('\n') {
            return Err(anyhow::anyhow!("list entries must be single line").into());
        }
        line.push('\n');
        for locator in list {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.list_path(locator))
                .await?;
            file.write_all(line.as_bytes()).await?;
        }
        Ok(())
    }

    async fn list_entries(
        &self,
        list: &Locators,
        _opts: &FetchOptions,
    ) -> Result<Vec<Bytes>, BackendError> {
        for locator in list {
            match tokio::fs::read_to_string(self.list_path(locator)).await {
                Ok(raw) => {
                    return Ok(raw
                        .lines()
                        .filter(|l| !l.is_empty())
                        .map(|l| Bytes::from(l.to_string()))
                        .collect())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Vec::new())
    }

    async fn new_table(&self, owner: &str, kind: &str) -> Result<TableLocators, BackendError> {
        let id = Uuid::new_v4();
        let path = self.root.join(TABLE_DIR).join(format!("{id}.json"));
        let table = TableFile {
            owner: owner.to_string(),
            kind: kind.to_string(),
            entries: BTreeMap::new(),
        };
        self.write_table(&path, &table).await?;
        tracing::debug!("new_table: {} kind={}", id, kind);
        Ok(TableLocators {
            private: Locators::from(format!("{TABLE_PREFIX}{id}{PRIVATE_SUFFIX}")),
            public: Locators::from(format!("{TABLE_PREFIX}{id}")),
        })
    }

    async fn table_set(
        &self,
        table: &Locators,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), BackendError> {
        let path = self.table_path(table, true)?;
        let mut file = self.read_table(&path).await?;
        file.entries.insert(key.to_string(), to_text(value)?);
        self.write_table(&path, &file).await
    }

    async fn table_get(
        &self,
        table: &Locators,
        keys: &[String],
        _opts: &FetchOptions,
    ) -> Result<Vec<(String, Bytes)>, BackendError> {
        let path = self.table_path(table, false)?;
        let file = self.read_table(&path).await?;
        Ok(keys
            .iter()
            .filter_map(|k| {
                file.entries
                    .get(k)
                    .map(|v| (k.clone(), Bytes::from(v.clone())))
            })
            .collect())
    }

    async fn table_get_all(
        &self,
        table: &Locators,
        _opts: &FetchOptions,
    ) -> Result<Vec<(String, Bytes)>, BackendError> {
        let path = self.table_path(table, false)?;
        let file = self.read_table(&path).await?;
        Ok(file
            .entries
            .into_iter()
            .map(|(k, v)| (k, Bytes::from(v)))
            .collect())
    }

    async fn table_keys(&self, table: &Locators) -> Result<Vec<String>, BackendError> {
        let path = self.table_path(table, false)?;
        Ok(self.read_table(&path).await?.entries.into_keys().collect())
    }

    async fn table_delete(&self, table: &Locators, key: &str) -> Result<(), BackendError> {
        let path = self.table_path(table, true)?;
        let mut file = self.read_table(&path).await?;
        if file.entries.remove(key).is_some() {
            self.write_table(&path, &file).await?;
        }
        Ok(())
    }

    async fn monitor(
        &self,
        _table: &Locators,
    ) -> Result<flume::Receiver<TableChange>, BackendError> {
        Err(BackendError::Unsupported("monitor".to_string()))
    }

    fn resolve_names_with(&self, resolver: Arc<dyn NameResolver>) {
        *self.resolver.write() = Some(resolver);
    }
}
