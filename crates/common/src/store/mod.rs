//! Storage backend boundary
//!
//! Everything this crate persists goes through a [`Backend`]: opaque
//! byte blobs addressed by the [`Locators`] the backend hands back,
//! append-only entry logs, and mutable string-keyed tables with change
//! notification. The backend is a collaborator; this crate only defines
//! what it needs from one.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryBackend`], an in-process store used by tests
//! - [`FsBackend`], a directory-backed store used by the CLI

mod fs;
mod memory;

use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use fs::FsBackend;
pub use memory::MemoryBackend;

/// Scheme prefix of name-style references routed through the name resolver
pub const NAME_SCHEME: &str = "dweb:/";

/// An object's identity: the set of locators its serialized form was stored under
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locators(Vec<String>);

impl Deref for Locators {
    type Target = [String];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<String>> for Locators {
    fn from(locators: Vec<String>) -> Self {
        Locators(locators)
    }
}

impl From<&str> for Locators {
    fn from(locator: &str) -> Self {
        Locators(vec![locator.to_string()])
    }
}

impl From<String> for Locators {
    fn from(locator: String) -> Self {
        Locators(vec![locator])
    }
}

impl FromIterator<String> for Locators {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Locators(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Locators {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Locators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two identities match if they share any locator
    pub fn intersects(&self, other: &Locators) -> bool {
        self.0.iter().any(|l| other.0.contains(l))
    }

    /// Append locators not already present
    pub fn extend_from(&mut self, other: &Locators) {
        for l in &other.0 {
            if !self.0.contains(l) {
                self.0.push(l.clone());
            }
        }
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }

    /// Comma joined form, as used in signable strings
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("nothing stored at {0}")]
    NotFound(String),
    /// A write was attempted through a public (read-only) locator
    #[error("locator is read only: {0}")]
    ReadOnly(String),
    #[error("unsupported by this backend: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Per-call options handed through to the backend untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

/// Both handles on a freshly created table
#[derive(Debug, Clone, Default)]
pub struct TableLocators {
    /// Write access
    pub private: Locators,
    /// Read access, safe to publish
    pub public: Locators,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Delete,
}

/// One change notification from a monitored table
#[derive(Debug, Clone, PartialEq)]
pub struct TableChange {
    pub kind: ChangeKind,
    pub key: String,
    /// Serialized value, present for [`ChangeKind::Set`]
    pub value: Option<Bytes>,
}

/// Hook a backend calls to turn `dweb:/` names into locators
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Map each name to the locators it resolves to. Names that do not
    ///  resolve map to nothing; anything that is not a name passes through.
    async fn resolve_names(&self, names: &[String]) -> Vec<String>;
}

#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Store serialized bytes, returning the locators they can be fetched by
    async fn raw_store(&self, data: Vec<u8>) -> Result<Locators, BackendError>;

    /// Fetch the bytes stored under any of `locators`
    async fn raw_fetch(&self, locators: &Locators, opts: &FetchOptions)
        -> Result<Bytes, BackendError>;

    /// Append one serialized entry to the log addressed by `list`
    async fn list_append(&self, list: &Locators, entry: Vec<u8>) -> Result<(), BackendError>;

    /// Every entry in the log addressed by `list`, oldest first
    async fn list_entries(
        &self,
        list: &Locators,
        opts: &FetchOptions,
    ) -> Result<Vec<Bytes>, BackendError>;

    /// Create a table owned by `owner` (a `NACL VERIFY:` export)
    async fn new_table(&self, owner: &str, kind: &str) -> Result<TableLocators, BackendError>;

    /// Write a key; `table` must carry a private locator
    async fn table_set(&self, table: &Locators, key: &str, value: Vec<u8>)
        -> Result<(), BackendError>;

    /// Read some keys; missing keys are absent from the result
    async fn table_get(
        &self,
        table: &Locators,
        keys: &[String],
        opts: &FetchOptions,
    ) -> Result<Vec<(String, Bytes)>, BackendError>;

    async fn table_get_all(
        &self,
        table: &Locators,
        opts: &FetchOptions,
    ) -> Result<Vec<(String, Bytes)>, BackendError>;

    async fn table_keys(&self, table: &Locators) -> Result<Vec<String>, BackendError>;

    async fn table_delete(&self, table: &Locators, key: &str) -> Result<(), BackendError>;

    /// Subscribe to changes of a table. Dropping the receiver unsubscribes.
    async fn monitor(&self, table: &Locators) -> Result<flume::Receiver<TableChange>, BackendError>;

    /// Route `dweb:/` names in fetched locators through `resolver`
    fn resolve_names_with(&self, resolver: Arc<dyn NameResolver>);
}

/// Expand any `dweb:/` names in `locators` through `resolver`
pub(crate) async fn expand_names(
    resolver: Option<Arc<dyn NameResolver>>,
    locators: &Locators,
) -> Locators {
    match resolver {
        Some(resolver) if locators.iter().any(|l| l.starts_with(NAME_SCHEME)) => {
            Locators::from(resolver.resolve_names(locators).await)
        }
        _ => locators.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_intersects() {
        let a = Locators::from(vec!["a".to_string(), "b".to_string()]);
        let b = Locators::from("b");
        let c = Locators::from("c");
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!Locators::new().intersects(&a));
    }

    #[test]
    fn test_extend_dedupes() {
        let mut a = Locators::from("a");
        a.extend_from(&Locators::from(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(a.to_vec(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(a.joined(), "a,b");
    }
}
