//! Content addressed objects
//!
//! Every stored thing in this crate is a type tagged JSON record whose
//! identity is the set of [`Locators`] the backend returned when it was
//! stored. An object with no locators is unstored; once stored it is
//! treated as immutable and any mutation clears its locators
//! ([`ContentAddressed::mark_dirty`]) so the next store writes a new
//! record.
//!
//! # Wire format
//!
//! A plain record is the object's fields plus `type_tag`. Fields whose
//! name starts with `_` are internal and never written. An object with
//! an access control reference is written as an [`Envelope`] instead:
//!
//! ```text
//! { "type_tag": "...", "encrypted": "<b64>", "access_control_ref": [..] }
//! ```
//!
//! Decoding goes through exactly one place, [`Object::from_record`],
//! which refuses tags it does not know.

mod dict;
mod envelope;
mod key_pair;
mod registry;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::store::Locators;

pub use dict::Dict;
pub use envelope::{AccessControl, Envelope};
pub use key_pair::KeyPairObject;
pub use registry::{Object, TypeTag};

/// Field carrying the record's type
pub const TYPE_TAG_FIELD: &str = "type_tag";

pub type Fields = serde_json::Map<String, Value>;

/// Which of a keyed object's two serialized forms to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Everything, including private key material
    Master,
    /// Keys exported public only, never encrypted
    Public,
}

/// State every content addressed object carries
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub locators: Locators,
    pub access_control: Option<AccessControl>,
}

pub trait ContentAddressed {
    fn type_tag(&self) -> TypeTag;
    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Content fields of the given projection, without `type_tag`
    fn fields(&self, projection: Projection) -> Result<Fields>;

    fn locators(&self) -> &Locators {
        &self.meta().locators
    }

    fn is_stored(&self) -> bool {
        !self.meta().locators.is_empty()
    }

    /// Forget this object's identity so the next store writes it again
    fn mark_dirty(&mut self) {
        self.meta_mut().locators.clear();
    }

    /// Identity check: true if any locator is shared
    fn matches(&self, locators: &Locators) -> bool {
        self.locators().intersects(locators)
    }

    fn access_control(&self) -> Option<&AccessControl> {
        self.meta().access_control.as_ref()
    }

    fn set_access_control(&mut self, access_control: Option<AccessControl>) {
        self.meta_mut().access_control = access_control;
        self.mark_dirty();
    }

    /// The record as written to the backend; sealed in an [`Envelope`]
    ///  when `encrypt` is set and an access control reference is present.
    fn to_record(&self, projection: Projection, encrypt: bool) -> Result<Value> {
        let mut fields = self.fields(projection)?;
        fields.retain(|k, _| !k.starts_with('_'));
        fields.insert(
            TYPE_TAG_FIELD.to_string(),
            Value::String(self.type_tag().as_str().to_string()),
        );
        let record = Value::Object(fields);
        match (encrypt, self.access_control()) {
            (true, Some(access_control)) => {
                Ok(Envelope::seal(access_control, self.type_tag(), &record)?.to_value()?)
            }
            _ => Ok(record),
        }
    }
}

/// Store an object that has no key material: one record, encrypted if
///  it carries an access control reference. No-op when already stored.
pub async fn store_plain<T>(obj: &mut T, session: &Session) -> Result<Locators>
where
    T: ContentAddressed + Send + ?Sized,
{
    if obj.is_stored() {
        return Ok(obj.locators().clone());
    }
    let record = obj.to_record(Projection::Master, true)?;
    let locators = session
        .backend()
        .raw_store(serde_json::to_vec(&record)?)
        .await?;
    tracing::debug!("store: {} at {}", obj.type_tag(), locators.joined());
    obj.meta_mut().locators = locators.clone();
    Ok(locators)
}

/// Remove and decode an optional field
pub(crate) fn take<T: DeserializeOwned>(fields: &mut Fields, name: &str) -> Result<Option<T>> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::Coding(format!("field {name}: {e}"))),
    }
}

/// Insert a field unless it is `None`
pub(crate) fn put<T: Serialize>(fields: &mut Fields, name: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    if !value.is_null() {
        fields.insert(name.to_string(), value);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_take_and_put() {
        let mut fields = Fields::new();
        put(&mut fields, "a", &Some(3u32)).unwrap();
        put(&mut fields, "b", &Option::<u32>::None).unwrap();
        assert!(!fields.contains_key("b"));

        assert_eq!(take::<u32>(&mut fields, "a").unwrap(), Some(3));
        assert_eq!(take::<u32>(&mut fields, "a").unwrap(), None);

        fields.insert("c".to_string(), Value::String("x".to_string()));
        assert!(matches!(take::<u32>(&mut fields, "c"), Err(Error::Coding(_))));
    }
}
