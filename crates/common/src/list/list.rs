use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::SignedEntry;
use crate::crypto::KeyMaterial;
use crate::error::{Error, Result};
use crate::keyed::{store_keyed, Keyed, PublicPrivate};
use crate::object::{ContentAddressed, Fields, Object, ObjectMeta, Projection, TypeTag};
use crate::session::Session;
use crate::store::Locators;

/// A generic signed append-only list.
///
/// Clones share the entry sequence, so a list held by the session and
/// the same list held by a caller see each other's appends and fetches.
#[derive(Debug, Clone)]
pub struct SignedList {
    pub(crate) keyed: Keyed,
    name: Option<String>,
    entries: Arc<RwLock<Vec<SignedEntry>>>,
}

/// Access to the list inside the list-like types
pub(crate) trait ListOwner: PublicPrivate + Send + Sync {
    fn list(&self) -> &SignedList;
}

impl SignedList {
    pub fn new(keys: KeyMaterial) -> Self {
        Self {
            keyed: Keyed::new(keys),
            name: None,
            entries: Arc::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn allow_unsafe_store(mut self) -> Self {
        self.keyed.allow_unsafe_store = true;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn from_fields(mut fields: Fields, locators: Locators) -> Result<Self> {
        let keyed = Keyed::from_fields(&mut fields, locators)?;
        let name = fields.get("name").and_then(Value::as_str).map(str::to_string);
        Ok(Self {
            keyed,
            name,
            entries: Arc::default(),
        })
    }

    pub async fn store(&mut self, session: &Session) -> Result<Locators> {
        store_keyed(self, session).await
    }

    /// Sign and append a reference to `content`, storing it first
    pub async fn append(
        &mut self,
        session: &Session,
        content: impl Into<Object>,
    ) -> Result<SignedEntry> {
        append_entry(self, session, content.into()).await
    }

    /// Snapshot of the entries loaded or appended so far
    pub fn entries(&self) -> Vec<SignedEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replace the local entries with the backend's log.
    ///
    /// Entries that do not verify against this list's identity are
    /// dropped.
    pub async fn load(&self, session: &Session) -> Result<()> {
        let public = self.public_locators().clone();
        if public.is_empty() {
            return Ok(());
        }
        let raw = session
            .backend()
            .list_entries(&public, &session.fetch_options())
            .await?;
        let mut loaded = Vec::with_capacity(raw.len());
        for data in raw {
            let entry = match SignedEntry::from_json(&data) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("list {}: skipping malformed entry: {e}", public.joined());
                    continue;
                }
            };
            if !self.verify(&entry).unwrap_or(false) {
                tracing::warn!(
                    "list {}: skipping entry for {} with a bad signature",
                    public.joined(),
                    entry.locators.joined()
                );
                continue;
            }
            loaded.push(entry);
        }
        tracing::debug!("list {}: loaded {} entries", public.joined(), loaded.len());
        *self.entries.write() = loaded;
        Ok(())
    }

    /// Fetch (once) the object an entry refers to.
    ///
    /// With `ignore_errors` a failure is logged and yields `None`.
    pub async fn fetch_content(
        &self,
        session: &Session,
        entry: &SignedEntry,
        ignore_errors: bool,
    ) -> Result<Option<Object>> {
        if let Some(content) = &entry.content {
            return Ok(Some((**content).clone()));
        }
        if let Some(cached) = self.cached_content(entry) {
            return Ok(Some(cached));
        }
        match Object::fetch(session, &entry.locators).await {
            Ok(obj) => {
                let mut entries = self.entries.write();
                if let Some(e) = entries.iter_mut().find(|e| e.signature == entry.signature) {
                    e.content = Some(Box::new(obj.clone()));
                }
                Ok(Some(obj))
            }
            Err(e) if ignore_errors => {
                tracing::warn!("skipping entry {}: {e}", entry.locators.joined());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch every entry's content, in entry order
    pub async fn fetch_contents(&self, session: &Session, ignore_errors: bool) -> Result<Vec<Object>> {
        let mut contents = Vec::new();
        for entry in self.entries() {
            if let Some(obj) = self.fetch_content(session, &entry, ignore_errors).await? {
                contents.push(obj);
            }
        }
        Ok(contents)
    }

    /// Contents already fetched, without touching the backend
    pub fn cached_contents(&self) -> Vec<Object> {
        self.entries
            .read()
            .iter()
            .filter_map(|e| e.content.as_deref().cloned())
            .collect()
    }

    fn cached_content(&self, entry: &SignedEntry) -> Option<Object> {
        self.entries
            .read()
            .iter()
            .find(|e| e.signature == entry.signature)
            .and_then(|e| e.content.as_deref().cloned())
    }

    fn push(&self, entry: SignedEntry) {
        self.entries.write().push(entry);
    }
}

/// Append on behalf of any list-like owner, storing the owner itself
///  when it has no public identity yet
pub(crate) async fn append_entry<T>(
    owner: &mut T,
    session: &Session,
    mut content: Object,
) -> Result<SignedEntry>
where
    T: ListOwner + ?Sized,
{
    if !owner.is_master() {
        return Err(Error::Forbidden(format!(
            "only the master can append to a {}",
            owner.type_tag()
        )));
    }
    content.store(session).await?;
    if owner.public_locators().is_empty() {
        store_keyed(owner, session).await?;
    }

    let target = if content.locators().is_empty() {
        content.public_locators().clone()
    } else {
        content.locators().clone()
    };
    let mut entry = SignedEntry::sign(owner.keys(), owner.public_locators(), target)?;

    let public = owner.public_locators().clone();
    if let Err(e) = session
        .backend()
        .list_append(&public, entry.to_json()?)
        .await
    {
        tracing::warn!("list {}: append not propagated: {e}", public.joined());
    }
    entry.content = Some(Box::new(content));
    owner.list().push(entry.clone());
    Ok(entry)
}

impl ContentAddressed for SignedList {
    fn type_tag(&self) -> TypeTag {
        TypeTag::List
    }

    fn meta(&self) -> &ObjectMeta {
        &self.keyed.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.keyed.meta
    }

    fn fields(&self, projection: Projection) -> Result<Fields> {
        let mut fields = self.keyed.fields(projection)?;
        if let Some(name) = &self.name {
            fields.insert("name".to_string(), Value::String(name.clone()));
        }
        Ok(fields)
    }
}

impl PublicPrivate for SignedList {
    fn keyed(&self) -> &Keyed {
        &self.keyed
    }

    fn keyed_mut(&mut self) -> &mut Keyed {
        &mut self.keyed
    }
}

impl ListOwner for SignedList {
    fn list(&self) -> &SignedList {
        self
    }
}

/// Implements the object traits of a type wrapping a [`SignedList`] in
///  a field named `list`, under its own tag
macro_rules! list_wrapper {
    ($ty:ty, $tag:expr) => {
        impl $crate::object::ContentAddressed for $ty {
            fn type_tag(&self) -> $crate::object::TypeTag {
                $tag
            }

            fn meta(&self) -> &$crate::object::ObjectMeta {
                &self.list.keyed.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::object::ObjectMeta {
                &mut self.list.keyed.meta
            }

            fn fields(
                &self,
                projection: $crate::object::Projection,
            ) -> $crate::error::Result<$crate::object::Fields> {
                self.fields_with(projection)
            }
        }

        impl $crate::keyed::PublicPrivate for $ty {
            fn keyed(&self) -> &$crate::keyed::Keyed {
                &self.list.keyed
            }

            fn keyed_mut(&mut self) -> &mut $crate::keyed::Keyed {
                &mut self.list.keyed
            }
        }

        impl $crate::list::ListOwner for $ty {
            fn list(&self) -> &$crate::list::SignedList {
                &self.list
            }
        }
    };
}
pub(crate) use list_wrapper;
