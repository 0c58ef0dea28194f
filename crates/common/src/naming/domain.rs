use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use super::{Leaf, Nameable, Resolution, SignatureRecord, Signable};
use crate::crypto::KeyMaterial;
use crate::error::{Error, Result};
use crate::keyed::{store_keyed, Keyed, PublicPrivate};
use crate::object::{put, take, ContentAddressed, Fields, Object, ObjectMeta, Projection, TypeTag};
use crate::session::Session;
use crate::store::Locators;
use crate::table::{KeyValueTable, SetOptions, TableOptions, TABLE_PUBLIC_LOCATORS_FIELD};

const AUTHORIZED_KEYS_FIELD: &str = "keys";

/// A node of the naming tree
#[derive(Debug, Clone)]
pub struct Domain {
    table: KeyValueTable,
    /// `NACL VERIFY:` exports allowed to sign entries
    authorized_keys: Vec<String>,
    signatures: Vec<SignatureRecord>,
    expires: Option<DateTime<Utc>>,
}

impl Domain {
    /// Create a domain with its own backing table. Its keys are the only
    ///  authorized signer unless others are added.
    pub async fn create(
        session: &Session,
        name: &str,
        keys: KeyMaterial,
        opts: TableOptions,
    ) -> Result<Self> {
        let authorized = keys.verify_export().into_iter().collect();
        let opts = TableOptions {
            name: Some(name.to_string()),
            ..opts
        };
        let table = KeyValueTable::open_new(session, keys, TypeTag::Domain, opts).await?;
        let mut domain = Self {
            table,
            authorized_keys: authorized,
            signatures: Vec::new(),
            expires: None,
        };
        domain.store(session).await?;
        tracing::info!("domain {name}: created at {}", domain.public_locators().joined());
        Ok(domain)
    }

    pub fn from_fields(mut fields: Fields, locators: Locators) -> Result<Self> {
        let authorized_keys = take(&mut fields, AUTHORIZED_KEYS_FIELD)?.unwrap_or_default();
        let signatures = take(&mut fields, "signatures")?.unwrap_or_default();
        let expires = take::<String>(&mut fields, "expires")?
            .map(|s| crate::timestamp::parse(&s))
            .transpose()
            .map_err(|e| Error::Coding(format!("field expires: {e}")))?;
        Ok(Self {
            table: KeyValueTable::from_fields(fields, locators)?,
            authorized_keys,
            signatures,
            expires,
        })
    }

    pub fn table(&self) -> &KeyValueTable {
        &self.table
    }

    pub fn authorized_keys(&self) -> &[String] {
        &self.authorized_keys
    }

    pub fn authorize(&mut self, verify_export: impl Into<String>) {
        let key = verify_export.into();
        if !self.authorized_keys.contains(&key) {
            self.authorized_keys.push(key);
            self.mark_dirty();
        }
    }

    pub async fn store(&mut self, session: &Session) -> Result<Locators> {
        store_keyed(self, session).await
    }

    /// Sign `obj` as `name` and publish it in this domain.
    ///
    /// Anything other than a domain or a leaf is published through a leaf
    ///  pointing at it.
    pub async fn register(
        &self,
        session: &Session,
        name: &str,
        obj: impl Into<Object>,
    ) -> Result<Object> {
        if !self.is_master() {
            return Err(Error::Forbidden(format!(
                "only the master of {} can register names",
                self.printable_name()
            )));
        }
        let mut obj = match obj.into() {
            obj @ (Object::Domain(_) | Object::Leaf(_)) => obj,
            mut other => {
                other.store(session).await?;
                Leaf::pointing_at(&other)?.into()
            }
        };
        match &mut obj {
            Object::Domain(domain) => domain.set_name(name),
            Object::Leaf(leaf) => leaf.set_name(name),
            _ => {}
        }
        let signable = obj
            .signable_mut()
            .ok_or_else(|| Error::Coding("only domains and leaves can be registered".to_string()))?;
        signable.sign(self.keys())?;
        if !self.verify(name, &obj) {
            return Err(Error::Coding(format!(
                "{name} does not verify against {} after signing",
                self.printable_name()
            )));
        }
        self.table
            .set(session, name, obj.clone(), SetOptions::public_only())
            .await?;
        tracing::info!("domain {}: registered {name}", self.printable_name());
        Ok(obj)
    }

    /// True iff `candidate` is named `name` and signed by an authorized key
    pub fn verify(&self, name: &str, candidate: &Object) -> bool {
        let Some(signable) = candidate.signable() else {
            return false;
        };
        candidate.name() == Some(name) && signable.signed_by_any(&self.authorized_keys)
    }

    /// Walk `path` (`a/b/c`) down the naming tree.
    ///
    /// An absent name is `(None, Some(path))`, not an error; a bad path or
    ///  a bad signature is.
    pub fn resolve<'a>(
        &'a self,
        session: &'a Session,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Resolution>> {
        Box::pin(async move {
            if path.starts_with('/') {
                return Err(Error::Coding(format!("path {path} must be relative")));
            }
            let (segment, remainder) = match path.split_once('/') {
                Some((segment, remainder)) => (segment, remainder),
                None => (path, ""),
            };
            let Some(value) = self.table.get_merge(session, segment).await? else {
                tracing::debug!("resolve: {segment} not found in {}", self.printable_name());
                return Ok((None, Some(path.to_string())));
            };
            let found = value.into_object(session).await?;
            if !self.verify(segment, &found) {
                return Err(Error::Signing(format!(
                    "{segment} in {} is not signed for that name",
                    self.printable_name()
                )));
            }
            if remainder.is_empty() {
                return Ok((Some(found), None));
            }
            let resolved = match &found {
                Object::Domain(domain) => domain.resolve(session, remainder).await?,
                Object::Leaf(leaf) => leaf.resolve(session, remainder).await?,
                other => {
                    return Err(Error::Resolution(format!(
                        "cannot continue into a {} with {remainder}",
                        other.type_tag()
                    )))
                }
            };
            match resolved {
                (None, _) => Ok((None, Some(path.to_string()))),
                found => Ok(found),
            }
        })
    }

    /// Indented listing of every name below this domain
    pub fn printable<'a>(
        &'a self,
        session: &'a Session,
        indent: usize,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut out = String::new();
            let pad = "  ".repeat(indent);
            for (name, value) in self.table.get_merge_all(session).await? {
                match value.into_object(session).await {
                    Ok(Object::Domain(domain)) => {
                        out.push_str(&format!("{pad}{name}/\n"));
                        out.push_str(&domain.printable(session, indent + 1).await?);
                    }
                    Ok(Object::Leaf(leaf)) => {
                        out.push_str(&format!("{pad}{name} -> {}\n", leaf.targets().joined()));
                    }
                    Ok(other) => out.push_str(&format!("{pad}{name} ({})\n", other.type_tag())),
                    Err(e) => out.push_str(&format!("{pad}{name} <{e}>\n")),
                }
            }
            Ok(out)
        })
    }

    fn printable_name(&self) -> &str {
        self.table.name().unwrap_or("unnamed domain")
    }
}

impl ContentAddressed for Domain {
    fn type_tag(&self) -> TypeTag {
        TypeTag::Domain
    }

    fn meta(&self) -> &ObjectMeta {
        &self.table.keyed.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.table.keyed.meta
    }

    fn fields(&self, projection: Projection) -> Result<Fields> {
        let mut fields = self.table.fields(projection)?;
        put(&mut fields, AUTHORIZED_KEYS_FIELD, &self.authorized_keys)?;
        put(&mut fields, "expires", &self.expires.as_ref().map(crate::timestamp::iso))?;
        put(&mut fields, "signatures", &self.signatures)?;
        Ok(fields)
    }
}

impl PublicPrivate for Domain {
    fn keyed(&self) -> &Keyed {
        &self.table.keyed
    }

    fn keyed_mut(&mut self) -> &mut Keyed {
        &mut self.table.keyed
    }
}

impl Signable for Domain {
    fn signed_fields(&self) -> Result<Fields> {
        let mut fields = Fields::new();
        put(&mut fields, TABLE_PUBLIC_LOCATORS_FIELD, self.table.table_public_locators())?;
        put(&mut fields, "name", &self.table.name)?;
        put(&mut fields, AUTHORIZED_KEYS_FIELD, &self.authorized_keys)?;
        put(&mut fields, "expires", &self.expires.as_ref().map(crate::timestamp::iso))?;
        Ok(fields)
    }

    fn signatures(&self) -> &[SignatureRecord] {
        &self.signatures
    }

    fn signatures_mut(&mut self) -> &mut Vec<SignatureRecord> {
        &mut self.signatures
    }
}

impl Nameable for Domain {
    fn name(&self) -> Option<&str> {
        self.table.name()
    }

    fn set_name(&mut self, name: &str) {
        self.table.name = Some(name.to_string());
        self.mark_dirty();
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    fn set_expires(&mut self, expires: Option<DateTime<Utc>>) {
        self.expires = expires;
        self.mark_dirty();
    }
}
