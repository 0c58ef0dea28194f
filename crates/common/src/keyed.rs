//! Master and public projections of keyed objects
//!
//! A keyed object holds [`KeyMaterial`]. While it holds a private half it
//! is the *master*; anything fetched from its public record is not. A
//! master is stored twice:
//!
//! 1. a public projection, keys exported public only and never encrypted,
//!    whose locators become the object's stable public identity;
//! 2. the master projection, carrying the seed, which must be sealed by an
//!    access control reference unless the unsafe override is set.
//!
//! Objects flagged "do not store master" (key chains, whose private half
//! can always be re-derived) only ever write the public projection.

use serde_json::Value;

use crate::crypto::KeyMaterial;
use crate::error::{Error, Result};
use crate::list::SignedEntry;
use crate::object::{put, take, ContentAddressed, Fields, ObjectMeta, Projection};
use crate::session::Session;
use crate::store::Locators;

const KEYPAIR_FIELD: &str = "keypair";
const PUBLIC_LOCATORS_FIELD: &str = "public_locators";

/// Key material plus the bookkeeping of the two projections
#[derive(Debug, Clone, Default)]
pub struct Keyed {
    pub meta: ObjectMeta,
    pub keys: KeyMaterial,
    /// Identity of the public projection; fixed once set
    pub public_locators: Locators,
    pub allow_unsafe_store: bool,
    pub dont_store_master: bool,
}

impl Keyed {
    pub fn new(keys: KeyMaterial) -> Self {
        Self {
            keys,
            ..Default::default()
        }
    }

    pub fn is_master(&self) -> bool {
        self.keys.has_private()
    }

    pub fn fields(&self, projection: Projection) -> Result<Fields> {
        let mut fields = Fields::new();
        if projection == Projection::Master && self.is_master() {
            fields.insert(
                KEYPAIR_FIELD.to_string(),
                Value::String(self.keys.export_private()?),
            );
            if !self.public_locators.is_empty() {
                put(&mut fields, PUBLIC_LOCATORS_FIELD, &self.public_locators)?;
            }
        } else {
            put(&mut fields, KEYPAIR_FIELD, &self.keys.export_public())?;
        }
        Ok(fields)
    }

    /// Pull the key fields out of a record.
    ///
    /// A record without a `public_locators` field is itself the public
    /// projection, so its own locators are its public identity.
    pub fn from_fields(fields: &mut Fields, locators: Locators) -> Result<Self> {
        let keys = match fields.remove(KEYPAIR_FIELD) {
            Some(Value::String(export)) => KeyMaterial::import(&export)?,
            Some(Value::Array(exports)) => KeyMaterial::import_all(
                exports.iter().filter_map(Value::as_str),
            )?,
            Some(_) => return Err(Error::Coding("keypair field must be a string or list".into())),
            None => KeyMaterial::default(),
        };
        let public_locators = take::<Locators>(fields, PUBLIC_LOCATORS_FIELD)?
            .unwrap_or_else(|| locators.clone());
        Ok(Self {
            meta: ObjectMeta {
                locators,
                access_control: None,
            },
            keys,
            public_locators,
            allow_unsafe_store: false,
            dont_store_master: false,
        })
    }

    /// True iff `entry` was signed by this identity and the signature holds
    pub fn verify(&self, entry: &SignedEntry) -> Result<bool> {
        if !self.public_locators.intersects(&entry.signed_by) {
            return Ok(false);
        }
        Ok(self
            .keys
            .verify(entry.signable().as_bytes(), &entry.signature)?)
    }
}

/// Capability shared by every object that holds key material
pub trait PublicPrivate: ContentAddressed {
    fn keyed(&self) -> &Keyed;
    fn keyed_mut(&mut self) -> &mut Keyed;

    fn is_master(&self) -> bool {
        self.keyed().is_master()
    }

    fn keys(&self) -> &KeyMaterial {
        &self.keyed().keys
    }

    fn public_locators(&self) -> &Locators {
        &self.keyed().public_locators
    }

    fn verify(&self, entry: &SignedEntry) -> Result<bool> {
        self.keyed().verify(entry)
    }
}

/// Two phase store of a keyed object; see the module docs.
///
/// Returns the locators of the master projection, or the public ones
/// when no master record is written.
pub async fn store_keyed<T>(obj: &mut T, session: &Session) -> Result<Locators>
where
    T: PublicPrivate + Send + ?Sized,
{
    let keyed = obj.keyed();
    let master = keyed.is_master();
    if master
        && !keyed.dont_store_master
        && obj.access_control().is_none()
        && !keyed.allow_unsafe_store
        && !session.config().allow_unsafe_store
    {
        return Err(Error::SecurityWarning(format!(
            "refusing to store private keys of a {} without access control",
            obj.type_tag()
        )));
    }
    let backend = session.backend();

    if master && keyed.public_locators.is_empty() {
        let record = obj.to_record(Projection::Public, false)?;
        let locators = backend.raw_store(serde_json::to_vec(&record)?).await?;
        tracing::debug!("store: public {} at {}", obj.type_tag(), locators.joined());
        obj.keyed_mut().public_locators = locators;
    }

    if !master {
        if !obj.is_stored() {
            let record = obj.to_record(Projection::Public, false)?;
            let locators = backend.raw_store(serde_json::to_vec(&record)?).await?;
            obj.meta_mut().locators = locators;
        }
        if obj.keyed().public_locators.is_empty() {
            let locators = obj.locators().clone();
            obj.keyed_mut().public_locators = locators;
        }
        return Ok(obj.locators().clone());
    }

    if obj.keyed().dont_store_master {
        return Ok(obj.public_locators().clone());
    }
    if !obj.is_stored() {
        let record = obj.to_record(Projection::Master, true)?;
        let locators = backend.raw_store(serde_json::to_vec(&record)?).await?;
        tracing::debug!("store: master {} at {}", obj.type_tag(), locators.joined());
        obj.meta_mut().locators = locators;
    }
    Ok(obj.locators().clone())
}
