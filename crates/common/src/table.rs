//! Key value tables
//!
//! A table is a keyed object whose records point at one or more backend
//! tables: a private locator the master writes through, and public
//! locators anyone can read. Values are either plain JSON or whole
//! object records written inline.
//!
//! Reads come in two flavours. [`KeyValueTable::get`] trusts the local
//! cache and the first backend that answers. [`KeyValueTable::get_merge`]
//! asks every public source at once and keeps the value with the latest
//! signature; on a tie, or when nothing is signed, the first decoded
//! candidate in source order wins. The winner is cached locally and not
//! written back to the stale sources.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{select_all, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::crypto::KeyMaterial;
use crate::error::{Error, Result};
use crate::keyed::{store_keyed, Keyed, PublicPrivate};
use crate::object::{
    put, take, AccessControl, ContentAddressed, Envelope, Fields, Object, ObjectMeta, Projection,
    TypeTag, TYPE_TAG_FIELD,
};
use crate::session::Session;
use crate::store::{ChangeKind, Locators, TableChange};

pub const TABLE_LOCATORS_FIELD: &str = "tableurls";
pub const TABLE_PUBLIC_LOCATORS_FIELD: &str = "tablepublicurls";

/// Keys a remote delete is never applied to
pub const PROTECTED_KEYS: [&str; 2] = [TABLE_LOCATORS_FIELD, TABLE_PUBLIC_LOCATORS_FIELD];

/// A value held in a table
#[derive(Debug, Clone)]
pub enum TableValue {
    /// Plain JSON, or an encrypted record not yet opened
    Json(Value),
    Object(Box<Object>),
}

impl From<Value> for TableValue {
    fn from(value: Value) -> Self {
        TableValue::Json(value)
    }
}

impl From<Object> for TableValue {
    fn from(obj: Object) -> Self {
        TableValue::Object(Box::new(obj))
    }
}

impl TableValue {
    pub fn to_bytes(&self, opts: &SetOptions) -> Result<Vec<u8>> {
        match self {
            TableValue::Json(value) => Ok(serde_json::to_vec(value)?),
            TableValue::Object(obj) => {
                let projection = if opts.public_only {
                    Projection::Public
                } else {
                    Projection::Master
                };
                let encrypt = opts.encrypt_if_access_control && !opts.public_only;
                Ok(serde_json::to_vec(&obj.to_record(projection, encrypt)?)?)
            }
        }
    }

    /// Decode a stored value; plain records become objects, everything
    ///  else (envelopes included) stays JSON
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(data)?;
        match value {
            Value::Object(fields)
                if fields.contains_key(TYPE_TAG_FIELD) && !fields.contains_key("encrypted") =>
            {
                Ok(Object::from_record(fields, Locators::new())?.into())
            }
            other => Ok(TableValue::Json(other)),
        }
    }

    /// The value as an object, opening an envelope through the session
    pub async fn into_object(self, session: &Session) -> Result<Object> {
        match self {
            TableValue::Object(obj) => Ok(*obj),
            TableValue::Json(value) if Envelope::from_value(&value).is_some() => {
                Object::from_value(value, Locators::new(), session).await
            }
            TableValue::Json(_) => Err(Error::Coding("table value is not an object".to_string())),
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            TableValue::Object(obj) => Some(obj.as_ref()),
            TableValue::Json(_) => None,
        }
    }

    pub fn is_master(&self) -> bool {
        self.as_object().map(Object::is_master).unwrap_or(false)
    }

    /// Date of the newest signature, if the value is signed
    pub fn latest_signature(&self) -> Option<DateTime<Utc>> {
        self.as_object()
            .and_then(Object::signable)
            .and_then(|s| s.latest_signature_date())
    }

    /// Equality of what would be written
    pub fn same_as(&self, other: &TableValue) -> bool {
        match (self.canonical(), other.canonical()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn canonical(&self) -> Option<Value> {
        match self {
            TableValue::Json(value) => Some(value.clone()),
            TableValue::Object(obj) => obj.to_record(Projection::Public, false).ok(),
        }
    }
}

/// How a [`KeyValueTable::set`] is written
#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    /// Write only the public projection of a keyed value
    pub public_only: bool,
    pub encrypt_if_access_control: bool,
    /// The change came from a monitor notification; never write it back
    pub from_network: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            public_only: false,
            encrypt_if_access_control: true,
            from_network: false,
        }
    }
}

impl SetOptions {
    pub fn public_only() -> Self {
        Self {
            public_only: true,
            encrypt_if_access_control: false,
            from_network: false,
        }
    }

    fn from_network() -> Self {
        Self {
            from_network: true,
            ..Default::default()
        }
    }
}

/// Settings for a newly created table
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    pub name: Option<String>,
    pub access_control: Option<AccessControl>,
    pub allow_unsafe_store: bool,
}

impl TableOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_access_control(mut self, access_control: AccessControl) -> Self {
        self.access_control = Some(access_control);
        self
    }

    pub fn allow_unsafe_store(mut self) -> Self {
        self.allow_unsafe_store = true;
        self
    }
}

/// A change applied by a monitor
#[derive(Debug, Clone)]
pub enum TableEvent {
    Set { key: String, value: TableValue },
    Delete { key: String },
}

impl TableEvent {
    pub fn key(&self) -> &str {
        match self {
            TableEvent::Set { key, .. } | TableEvent::Delete { key } => key,
        }
    }
}

/// Live feed of changes applied to a table.
///
/// Dropping it, or calling [`TableSubscription::close`], stops delivery.
#[derive(Debug)]
pub struct TableSubscription {
    events: flume::Receiver<TableEvent>,
    task: JoinHandle<()>,
}

impl TableSubscription {
    /// Next applied change; `None` once every source has closed
    pub async fn next(&self) -> Option<TableEvent> {
        self.events.recv_async().await.ok()
    }

    pub fn try_next(&self) -> Option<TableEvent> {
        self.events.try_recv().ok()
    }

    pub fn close(self) {}
}

impl Drop for TableSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone)]
pub struct KeyValueTable {
    pub(crate) keyed: Keyed,
    pub(crate) name: Option<String>,
    /// Private write handle; only ever known to the master
    table_locators: Locators,
    table_public_locators: Locators,
    write_through: bool,
    cache: Arc<RwLock<BTreeMap<String, TableValue>>>,
}

impl KeyValueTable {
    /// Create a backend table owned by `keys`, without storing the record
    pub(crate) async fn open_new(
        session: &Session,
        keys: KeyMaterial,
        kind: TypeTag,
        opts: TableOptions,
    ) -> Result<Self> {
        let owner = keys.verify_export().ok_or_else(|| {
            Error::Coding("a table owner needs a signing key".to_string())
        })?;
        let locators = session.backend().new_table(&owner, kind.as_str()).await?;
        let mut keyed = Keyed::new(keys);
        keyed.meta.access_control = opts.access_control;
        keyed.allow_unsafe_store = opts.allow_unsafe_store;
        tracing::info!(
            "table {}: created at {}",
            opts.name.as_deref().unwrap_or("unnamed"),
            locators.public.joined()
        );
        Ok(Self {
            write_through: keyed.is_master() && !locators.private.is_empty(),
            keyed,
            name: opts.name,
            table_locators: locators.private,
            table_public_locators: locators.public,
            cache: Arc::default(),
        })
    }

    /// Create a backend table and store this table's records
    pub async fn create(session: &Session, keys: KeyMaterial, opts: TableOptions) -> Result<Self> {
        let mut table = Self::open_new(session, keys, TypeTag::KeyValueTable, opts).await?;
        table.store(session).await?;
        Ok(table)
    }

    pub fn from_fields(mut fields: Fields, locators: Locators) -> Result<Self> {
        let keyed = Keyed::from_fields(&mut fields, locators)?;
        let name = take::<String>(&mut fields, "name")?;
        let table_locators = take::<Locators>(&mut fields, TABLE_LOCATORS_FIELD)?.unwrap_or_default();
        let table_public_locators =
            take::<Locators>(&mut fields, TABLE_PUBLIC_LOCATORS_FIELD)?.unwrap_or_default();
        Ok(Self {
            write_through: keyed.is_master() && !table_locators.is_empty(),
            keyed,
            name,
            table_locators,
            table_public_locators,
            cache: Arc::default(),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn table_public_locators(&self) -> &Locators {
        &self.table_public_locators
    }

    pub fn is_write_through(&self) -> bool {
        self.write_through
    }

    pub async fn store(&mut self, session: &Session) -> Result<Locators> {
        store_keyed(self, session).await
    }

    /// Write `value` under `key`; see the module docs for when the
    ///  backend is touched
    pub async fn set(
        &self,
        session: &Session,
        key: &str,
        value: impl Into<TableValue>,
        opts: SetOptions,
    ) -> Result<()> {
        let value = value.into();
        let differs = match self.cache.read().get(key) {
            Some(cached) => !cached.same_as(&value),
            None => true,
        };
        if self.write_through && !opts.from_network && differs {
            let bytes = value.to_bytes(&opts)?;
            session
                .backend()
                .table_set(&self.table_locators, key, bytes)
                .await?;
            tracing::debug!("table {}: set {key}", self.table_public_locators.joined());
        }
        let mut cache = self.cache.write();
        let shielded = cache.get(key).map(TableValue::is_master).unwrap_or(false) && !value.is_master();
        if !shielded {
            cache.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn cached(&self, key: &str) -> Option<TableValue> {
        self.cache.read().get(key).cloned()
    }

    /// Cached value of `key`, fetched from the backend if missing
    pub async fn get(&self, session: &Session, key: &str) -> Result<Option<TableValue>> {
        let mut found = self.get_many(session, &[key.to_string()]).await?;
        Ok(found.remove(key))
    }

    /// Values of `keys`, fetching only the ones not cached
    pub async fn get_many(
        &self,
        session: &Session,
        keys: &[String],
    ) -> Result<BTreeMap<String, TableValue>> {
        let mut found = BTreeMap::new();
        let mut missing = Vec::new();
        {
            let cache = self.cache.read();
            for key in keys {
                match cache.get(key) {
                    Some(value) => {
                        found.insert(key.clone(), value.clone());
                    }
                    None => missing.push(key.clone()),
                }
            }
        }
        if missing.is_empty() || self.table_public_locators.is_empty() {
            return Ok(found);
        }
        let rows = session
            .backend()
            .table_get(&self.table_public_locators, &missing, &session.fetch_options())
            .await?;
        let mut cache = self.cache.write();
        for (key, bytes) in rows {
            let value = TableValue::from_bytes(&bytes)?;
            cache.entry(key.clone()).or_insert_with(|| value.clone());
            found.insert(key, value);
        }
        Ok(found)
    }

    /// Ask every public source for `key` and keep the latest signed value
    pub async fn get_merge(&self, session: &Session, key: &str) -> Result<Option<TableValue>> {
        let cached = self.cached(key);
        if cached.is_some() {
            return Ok(cached);
        }
        let backend = session.backend();
        let opts = session.fetch_options();
        let keys = [key.to_string()];
        let sources: Vec<Locators> = self
            .table_public_locators
            .iter()
            .map(|l| Locators::from(l.clone()))
            .collect();
        let answers = join_all(
            sources
                .iter()
                .map(|source| backend.table_get(source, &keys, &opts)),
        )
        .await;

        let mut winner: Option<(TableValue, Option<DateTime<Utc>>)> = None;
        for (source, answer) in sources.iter().zip(answers) {
            let rows = match answer {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!("merge {key}: source {} failed: {e}", source.joined());
                    continue;
                }
            };
            for (_, bytes) in rows {
                let candidate = match TableValue::from_bytes(&bytes) {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        tracing::warn!("merge {key}: bad value from {}: {e}", source.joined());
                        continue;
                    }
                };
                let date = candidate.latest_signature();
                let later = match &winner {
                    None => true,
                    Some((_, best)) => date > *best,
                };
                if later {
                    winner = Some((candidate, date));
                }
            }
        }

        let Some((value, _)) = winner else {
            return Ok(None);
        };
        self.cache.write().insert(key.to_string(), value.clone());
        Ok(Some(value))
    }

    /// [`KeyValueTable::get_merge`] over every key any source knows
    pub async fn get_merge_all(&self, session: &Session) -> Result<BTreeMap<String, TableValue>> {
        let mut merged = BTreeMap::new();
        for key in self.keys(session).await? {
            if let Some(value) = self.get_merge(session, &key).await? {
                merged.insert(key, value);
            }
        }
        Ok(merged)
    }

    pub async fn keys(&self, session: &Session) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for locator in self.table_public_locators.iter() {
            match session.backend().table_keys(&Locators::from(locator.clone())).await {
                Ok(found) => {
                    for key in found {
                        if !keys.contains(&key) {
                            keys.push(key);
                        }
                    }
                }
                Err(e) => tracing::warn!("keys: source {locator} failed: {e}"),
            }
        }
        for key in self.cache.read().keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        Ok(keys)
    }

    /// Every value in the first public source that answers, merged into
    ///  the cache
    pub async fn get_all(&self, session: &Session) -> Result<BTreeMap<String, TableValue>> {
        if !self.table_public_locators.is_empty() {
            let rows = session
                .backend()
                .table_get_all(&self.table_public_locators, &session.fetch_options())
                .await?;
            let mut cache = self.cache.write();
            for (key, bytes) in rows {
                match TableValue::from_bytes(&bytes) {
                    Ok(value) => {
                        cache.entry(key).or_insert(value);
                    }
                    Err(e) => tracing::warn!("get_all: skipping {key}: {e}"),
                }
            }
        }
        Ok(self.cache.read().clone())
    }

    /// Drop `key` locally and, unless the change came from the network,
    ///  from the backend
    pub async fn delete(&self, session: &Session, key: &str, from_network: bool) -> Result<()> {
        self.cache.write().remove(key);
        if from_network {
            return Ok(());
        }
        if self.table_locators.is_empty() {
            return Err(Error::Forbidden(
                "only the table master can delete keys".to_string(),
            ));
        }
        session.backend().table_delete(&self.table_locators, key).await?;
        tracing::debug!("table {}: delete {key}", self.table_public_locators.joined());
        Ok(())
    }

    /// Follow remote changes to every public source, applying each to
    ///  this table (and its clones) and passing it on
    pub async fn monitor(&self, session: &Session) -> Result<TableSubscription> {
        let mut receivers = Vec::new();
        for locator in self.table_public_locators.iter() {
            receivers.push(
                session
                    .backend()
                    .monitor(&Locators::from(locator.clone()))
                    .await?,
            );
        }
        let (tx, events) = flume::unbounded();
        let table = self.clone();
        let session = session.clone();
        let task = tokio::spawn(async move {
            if receivers.is_empty() {
                return;
            }
            let mut changes = select_all(receivers.into_iter().map(|rx| Box::pin(rx.into_stream())));
            while let Some(change) = changes.next().await {
                match table.apply_change(&session, change).await {
                    Ok(Some(event)) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("monitor: dropping change: {e}"),
                }
            }
        });
        Ok(TableSubscription { events, task })
    }

    async fn apply_change(&self, session: &Session, change: TableChange) -> Result<Option<TableEvent>> {
        match change.kind {
            ChangeKind::Set => {
                let bytes = change.value.ok_or_else(|| {
                    Error::Coding(format!("set of {} without a value", change.key))
                })?;
                let value = TableValue::from_bytes(&bytes)?;
                self.set(session, &change.key, value.clone(), SetOptions::from_network())
                    .await?;
                Ok(Some(TableEvent::Set {
                    key: change.key,
                    value,
                }))
            }
            ChangeKind::Delete => {
                if PROTECTED_KEYS.contains(&change.key.as_str()) {
                    tracing::debug!("monitor: ignoring delete of protected {}", change.key);
                    return Ok(None);
                }
                self.delete(session, &change.key, true).await?;
                Ok(Some(TableEvent::Delete { key: change.key }))
            }
        }
    }
}

impl ContentAddressed for KeyValueTable {
    fn type_tag(&self) -> TypeTag {
        TypeTag::KeyValueTable
    }

    fn meta(&self) -> &ObjectMeta {
        &self.keyed.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.keyed.meta
    }

    fn fields(&self, projection: Projection) -> Result<Fields> {
        let mut fields = self.keyed.fields(projection)?;
        put(&mut fields, "name", &self.name)?;
        if projection == Projection::Master && !self.table_locators.is_empty() {
            put(&mut fields, TABLE_LOCATORS_FIELD, &self.table_locators)?;
        }
        put(&mut fields, TABLE_PUBLIC_LOCATORS_FIELD, &self.table_public_locators)?;
        Ok(fields)
    }
}

impl PublicPrivate for KeyValueTable {
    fn keyed(&self) -> &Keyed {
        &self.keyed
    }

    fn keyed_mut(&mut self) -> &mut Keyed {
        &mut self.keyed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryBackend;

    fn unsafe_session() -> Session {
        let config = Config {
            allow_unsafe_store: true,
            ..Default::default()
        };
        Session::with_config(Arc::new(MemoryBackend::new()), config)
    }

    #[tokio::test]
    async fn test_private_locators_stay_in_master_record() {
        let session = unsafe_session();
        let table = KeyValueTable::create(&session, KeyMaterial::generate(), TableOptions::named("t"))
            .await
            .unwrap();
        assert!(table.is_write_through());

        let master = table.fields(Projection::Master).unwrap();
        assert!(master.contains_key(TABLE_LOCATORS_FIELD));
        let public = table.fields(Projection::Public).unwrap();
        assert!(!public.contains_key(TABLE_LOCATORS_FIELD));
        assert!(public.contains_key(TABLE_PUBLIC_LOCATORS_FIELD));
    }

    #[tokio::test]
    async fn test_public_copy_reads_what_master_wrote() {
        let session = unsafe_session();
        let table = KeyValueTable::create(&session, KeyMaterial::generate(), TableOptions::default())
            .await
            .unwrap();
        table
            .set(&session, "colour", serde_json::json!("blue"), SetOptions::default())
            .await
            .unwrap();

        let Object::KeyValueTable(public) =
            Object::fetch(&session, table.public_locators()).await.unwrap()
        else {
            panic!("expected a table");
        };
        assert!(!public.is_write_through());
        let value = public.get(&session, "colour").await.unwrap().unwrap();
        assert!(value.same_as(&serde_json::json!("blue").into()));
        assert!(public.get(&session, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_public_copy_cannot_delete() {
        let session = unsafe_session();
        let table = KeyValueTable::create(&session, KeyMaterial::generate(), TableOptions::default())
            .await
            .unwrap();
        let Object::KeyValueTable(public) =
            Object::fetch(&session, table.public_locators()).await.unwrap()
        else {
            panic!("expected a table");
        };
        assert!(matches!(
            public.delete(&session, "k", false).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_master_value_shielded_from_public_echo() {
        let session = unsafe_session();
        let table = KeyValueTable::create(&session, KeyMaterial::generate(), TableOptions::default())
            .await
            .unwrap();
        let kp: Object = crate::object::KeyPairObject::new(KeyMaterial::generate()).into();
        table
            .set(&session, "me", kp.clone(), SetOptions::public_only())
            .await
            .unwrap();

        let echoed = TableValue::from_bytes(&TableValue::from(kp).to_bytes(&SetOptions::public_only()).unwrap())
            .unwrap();
        assert!(!echoed.is_master());
        table
            .set(&session, "me", echoed, SetOptions::from_network())
            .await
            .unwrap();
        assert!(table.cached("me").unwrap().is_master());
    }

    #[tokio::test]
    async fn test_monitor_applies_remote_changes() {
        let session = unsafe_session();
        let table = KeyValueTable::create(&session, KeyMaterial::generate(), TableOptions::default())
            .await
            .unwrap();
        let Object::KeyValueTable(follower) =
            Object::fetch(&session, table.public_locators()).await.unwrap()
        else {
            panic!("expected a table");
        };
        let subscription = follower.monitor(&session).await.unwrap();

        table
            .set(&session, "k", serde_json::json!(1), SetOptions::default())
            .await
            .unwrap();
        let event = subscription.next().await.unwrap();
        assert_eq!(event.key(), "k");
        assert!(follower.cached("k").is_some());

        table.delete(&session, "k", false).await.unwrap();
        assert!(matches!(subscription.next().await, Some(TableEvent::Delete { .. })));
        assert!(follower.cached("k").is_none());
        subscription.close();
    }

    #[tokio::test]
    async fn test_monitor_ignores_remote_delete_of_identity_keys() {
        let session = unsafe_session();
        let table = KeyValueTable::create(&session, KeyMaterial::generate(), TableOptions::default())
            .await
            .unwrap();
        let Object::KeyValueTable(follower) =
            Object::fetch(&session, table.public_locators()).await.unwrap()
        else {
            panic!("expected a table");
        };
        let subscription = follower.monitor(&session).await.unwrap();

        table
            .set(
                &session,
                TABLE_PUBLIC_LOCATORS_FIELD,
                serde_json::json!(["mem:/table/elsewhere"]),
                SetOptions::default(),
            )
            .await
            .unwrap();
        let event = subscription.next().await.unwrap();
        assert_eq!(event.key(), TABLE_PUBLIC_LOCATORS_FIELD);

        table
            .delete(&session, TABLE_PUBLIC_LOCATORS_FIELD, false)
            .await
            .unwrap();
        table
            .set(&session, "after", serde_json::json!(2), SetOptions::default())
            .await
            .unwrap();

        // The delete produced no event, so the next one is the later set
        let event = subscription.next().await.unwrap();
        assert!(matches!(&event, TableEvent::Set { key, .. } if key == "after"));
        assert!(subscription.try_next().is_none());
        assert!(follower.cached(TABLE_PUBLIC_LOCATORS_FIELD).is_some());
        subscription.close();
    }
}
