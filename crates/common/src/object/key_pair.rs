use serde_json::Value;

use super::{ContentAddressed, Fields, ObjectMeta, Projection, TypeTag};
use crate::crypto::KeyMaterial;
use crate::error::Result;
use crate::keyed::{store_keyed, Keyed, PublicPrivate};
use crate::session::Session;
use crate::store::Locators;

/// Standalone key material, e.g. a viewer identity handed to an ACL
#[derive(Debug, Clone)]
pub struct KeyPairObject {
    keyed: Keyed,
    name: Option<String>,
}

impl KeyPairObject {
    pub fn new(keys: KeyMaterial) -> Self {
        Self {
            keyed: Keyed::new(keys),
            name: None,
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
        Ok(Self { keyed, name })
    }

    pub async fn store(&mut self, session: &Session) -> Result<Locators> {
        store_keyed(self, session).await
    }
}

impl ContentAddressed for KeyPairObject {
    fn type_tag(&self) -> TypeTag {
        TypeTag::KeyPair
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

impl PublicPrivate for KeyPairObject {
    fn keyed(&self) -> &Keyed {
        &self.keyed
    }

    fn keyed_mut(&mut self) -> &mut Keyed {
        &mut self.keyed
    }
}
