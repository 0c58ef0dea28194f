use serde_json::Value;

use super::{store_plain, AccessControl, ContentAddressed, Fields, Object, ObjectMeta, Projection, TypeTag};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::store::Locators;

/// A plain bag of named fields; the simplest stored object
#[derive(Debug, Clone, Default)]
pub struct Dict {
    meta: ObjectMeta,
    fields: Fields,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_control(mut self, access_control: AccessControl) -> Self {
        self.meta.access_control = Some(access_control);
        self
    }

    /// Builder form of [`Dict::set`]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn from_fields(fields: Fields, locators: Locators) -> Result<Self> {
        Ok(Self {
            meta: ObjectMeta {
                locators,
                access_control: None,
            },
            fields,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields_ref(&self) -> &Fields {
        &self.fields
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
        self.mark_dirty();
    }

    /// Refer to another object by its public locators
    pub fn set_object(&mut self, name: &str, obj: &Object) -> Result<()> {
        let locators = obj.public_locators();
        if locators.is_empty() {
            return Err(Error::Coding(format!(
                "{} must be stored before {name} can refer to it",
                obj.type_tag()
            )));
        }
        self.set(name, serde_json::to_value(locators)?);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.fields.remove(name);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    pub async fn store(&mut self, session: &Session) -> Result<Locators> {
        store_plain(self, session).await
    }
}

impl ContentAddressed for Dict {
    fn type_tag(&self) -> TypeTag {
        TypeTag::Dict
    }

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn fields(&self, _projection: Projection) -> Result<Fields> {
        Ok(self.fields.clone())
    }
}
