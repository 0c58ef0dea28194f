use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    expand_names, Backend, BackendError, ChangeKind, FetchOptions, Locators, NameResolver,
    TableChange, TableLocators,
};

const HASH_PREFIX: &str = "mem:/hash/";
const TABLE_PREFIX: &str = "mem:/table/";
const PRIVATE_SUFFIX: &str = "/private";

/// In-memory backend
///
/// Blobs are content addressed by their BLAKE3 hash, so storing the same
/// bytes twice yields the same locator. Tables hand out a private locator
/// for writes and a public one for reads and monitoring.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<MemoryBackendInner>>,
}

#[derive(Default)]
struct MemoryBackendInner {
    blobs: HashMap<String, Bytes>,
    /// list locator -> entries
    lists: HashMap<String, Vec<Bytes>>,
    tables: HashMap<Uuid, MemoryTable>,
    resolver: Option<Arc<dyn NameResolver>>,
}

#[derive(Default)]
struct MemoryTable {
    entries: BTreeMap<String, Bytes>,
    monitors: Vec<flume::Sender<TableChange>>,
}

impl MemoryTable {
    fn notify(&mut self, change: TableChange) {
        self.monitors.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MemoryBackend")
            .field("blobs", &inner.blobs.len())
            .field("lists", &inner.lists.len())
            .field("tables", &inner.tables.len())
            .finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the table a locator set points at. Writes need a private locator.
    fn table_id(locators: &Locators, write: bool) -> Result<Uuid, BackendError> {
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
                return Ok(id);
            }
        }
        if write {
            Err(BackendError::ReadOnly(locators.joined()))
        } else {
            Err(BackendError::NotFound(locators.joined()))
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn raw_store(&self, data: Vec<u8>) -> Result<Locators, BackendError> {
        let locator = format!("{}{}", HASH_PREFIX, blake3::hash(&data).to_hex());
        tracing::debug!("raw_store: {} ({} bytes)", locator, data.len());
        self.inner
            .write()
            .blobs
            .insert(locator.clone(), Bytes::from(data));
        Ok(Locators::from(locator))
    }

    async fn raw_fetch(
        &self,
        locators: &Locators,
        _opts: &FetchOptions,
    ) -> Result<Bytes, BackendError> {
        let resolver = self.inner.read().resolver.clone();
        let locators = expand_names(resolver, locators).await;
        let inner = self.inner.read();
        locators
            .iter()
            .find_map(|l| inner.blobs.get(l).cloned())
            .ok_or_else(|| BackendError::NotFound(locators.joined()))
    }

    async fn list_append(&self, list: &Locators, entry: Vec<u8>) -> Result<(), BackendError> {
        if list.is_empty() {
            return Err(anyhow::anyhow!("list_append: no list locators").into());
        }
        let entry = Bytes::from(entry);
        let mut inner = self.inner.write();
        for locator in list {
            inner
                .lists
                .entry(locator.clone())
                .or_default()
                .push(entry.clone());
        }
        Ok(())
    }

    async fn list_entries(
        &self,
        list: &Locators,
        _opts: &FetchOptions,
    ) -> Result<Vec<Bytes>, BackendError> {
        let inner = self.inner.read();
        Ok(list
            .iter()
            .find_map(|l| inner.lists.get(l).cloned())
            .unwrap_or_default())
    }

    async fn new_table(&self, owner: &str, kind: &str) -> Result<TableLocators, BackendError> {
        let id = Uuid::new_v4();
        tracing::debug!("new_table: {} kind={} owner={}", id, kind, owner);
        self.inner.write().tables.insert(id, MemoryTable::default());
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
        let id = Self::table_id(table, true)?;
        let value = Bytes::from(value);
        let mut inner = self.inner.write();
        let table = inner
            .tables
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        table.entries.insert(key.to_string(), value.clone());
        table.notify(TableChange {
            kind: ChangeKind::Set,
            key: key.to_string(),
            value: Some(value),
        });
        Ok(())
    }

    async fn table_get(
        &self,
        table: &Locators,
        keys: &[String],
        _opts: &FetchOptions,
    ) -> Result<Vec<(String, Bytes)>, BackendError> {
        let id = Self::table_id(table, false)?;
        let inner = self.inner.read();
        let table = inner
            .tables
            .get(&id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        Ok(keys
            .iter()
            .filter_map(|k| table.entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn table_get_all(
        &self,
        table: &Locators,
        _opts: &FetchOptions,
    ) -> Result<Vec<(String, Bytes)>, BackendError> {
        let id = Self::table_id(table, false)?;
        let inner = self.inner.read();
        let table = inner
            .tables
            .get(&id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        Ok(table
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn table_keys(&self, table: &Locators) -> Result<Vec<String>, BackendError> {
        let id = Self::table_id(table, false)?;
        let inner = self.inner.read();
        let table = inner
            .tables
            .get(&id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        Ok(table.entries.keys().cloned().collect())
    }

    async fn table_delete(&self, table: &Locators, key: &str) -> Result<(), BackendError> {
        let id = Self::table_id(table, true)?;
        let mut inner = self.inner.write();
        let table = inner
            .tables
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        if table.entries.remove(key).is_some() {
            table.notify(TableChange {
                kind: ChangeKind::Delete,
                key: key.to_string(),
                value: None,
            });
        }
        Ok(())
    }

    async fn monitor(&self, table: &Locators) -> Result<flume::Receiver<TableChange>, BackendError> {
        let id = Self::table_id(table, false)?;
        let mut inner = self.inner.write();
        let table = inner
            .tables
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        let (tx, rx) = flume::unbounded();
        table.monitors.push(tx);
        Ok(rx)
    }

    fn resolve_names_with(&self, resolver: Arc<dyn NameResolver>) {
        self.inner.write().resolver = Some(resolver);
    }
}
