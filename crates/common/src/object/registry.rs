use std::fmt;

use futures::future::BoxFuture;
use serde_json::Value;

use super::{ContentAddressed, Dict, Envelope, Fields, KeyPairObject, Projection, TYPE_TAG_FIELD};
use crate::acl::AccessControlList;
use crate::crypto::KeyMaterial;
use crate::error::{Error, Result};
use crate::keyed::PublicPrivate;
use crate::list::{KeyChain, SignedList, VersionList};
use crate::naming::{Domain, Leaf, Nameable, Signable};
use crate::session::Session;
use crate::store::Locators;
use crate::table::KeyValueTable;

/// Tags of crate types that exist but are not content addressed objects.
/// A record claiming one of these is refused outright.
const NON_OBJECT_TAGS: &[&str] = &["session", "backend", "subscription", "envelope"];

/// Every kind of record this crate knows how to rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Dict,
    KeyPair,
    List,
    KeyChain,
    AccessControlList,
    VersionList,
    KeyValueTable,
    Domain,
    Leaf,
}

impl TypeTag {
    pub const ALL: [TypeTag; 9] = [
        TypeTag::Dict,
        TypeTag::KeyPair,
        TypeTag::List,
        TypeTag::KeyChain,
        TypeTag::AccessControlList,
        TypeTag::VersionList,
        TypeTag::KeyValueTable,
        TypeTag::Domain,
        TypeTag::Leaf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Dict => "sd",
            TypeTag::KeyPair => "kp",
            TypeTag::List => "list",
            TypeTag::KeyChain => "keychain",
            TypeTag::AccessControlList => "acl",
            TypeTag::VersionList => "versionlist",
            TypeTag::KeyValueTable => "keyvaluetable",
            TypeTag::Domain => "domain",
            TypeTag::Leaf => "leaf",
        }
    }

    /// Look a tag up, rejecting missing, unknown and non-object tags
    pub fn parse(tag: Option<&str>) -> Result<TypeTag> {
        let tag = tag.ok_or_else(|| {
            Error::ToBeImplemented("record has no type_tag to rebuild from".to_string())
        })?;
        if let Some(known) = Self::ALL.iter().find(|t| t.as_str() == tag) {
            return Ok(*known);
        }
        if NON_OBJECT_TAGS.contains(&tag) {
            return Err(Error::Forbidden(format!(
                "{tag} is not a content addressed type"
            )));
        }
        Err(Error::ToBeImplemented(format!("no type registered for tag {tag}")))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded record of any known type
#[derive(Debug, Clone)]
pub enum Object {
    Dict(Dict),
    KeyPair(KeyPairObject),
    List(SignedList),
    KeyChain(KeyChain),
    AccessControlList(AccessControlList),
    VersionList(VersionList),
    KeyValueTable(KeyValueTable),
    Domain(Domain),
    Leaf(Leaf),
}

macro_rules! object_from {
    ($(($variant:ident, $ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Object {
                fn from(obj: $ty) -> Self {
                    Object::$variant(obj)
                }
            }
        )*
    };
}

object_from! {
    (Dict, Dict),
    (KeyPair, KeyPairObject),
    (List, SignedList),
    (KeyChain, KeyChain),
    (AccessControlList, AccessControlList),
    (VersionList, VersionList),
    (KeyValueTable, KeyValueTable),
    (Domain, Domain),
    (Leaf, Leaf),
}

impl Object {
    pub fn content(&self) -> &dyn ContentAddressed {
        match self {
            Object::Dict(o) => o,
            Object::KeyPair(o) => o,
            Object::List(o) => o,
            Object::KeyChain(o) => o,
            Object::AccessControlList(o) => o,
            Object::VersionList(o) => o,
            Object::KeyValueTable(o) => o,
            Object::Domain(o) => o,
            Object::Leaf(o) => o,
        }
    }

    pub fn content_mut(&mut self) -> &mut dyn ContentAddressed {
        match self {
            Object::Dict(o) => o,
            Object::KeyPair(o) => o,
            Object::List(o) => o,
            Object::KeyChain(o) => o,
            Object::AccessControlList(o) => o,
            Object::VersionList(o) => o,
            Object::KeyValueTable(o) => o,
            Object::Domain(o) => o,
            Object::Leaf(o) => o,
        }
    }

    /// The keyed half, for everything but plain records and leaves
    pub fn keyed(&self) -> Option<&dyn PublicPrivate> {
        match self {
            Object::Dict(_) | Object::Leaf(_) => None,
            Object::KeyPair(o) => Some(o as &dyn PublicPrivate),
            Object::List(o) => Some(o as &dyn PublicPrivate),
            Object::KeyChain(o) => Some(o as &dyn PublicPrivate),
            Object::AccessControlList(o) => Some(o as &dyn PublicPrivate),
            Object::VersionList(o) => Some(o as &dyn PublicPrivate),
            Object::KeyValueTable(o) => Some(o as &dyn PublicPrivate),
            Object::Domain(o) => Some(o as &dyn PublicPrivate),
        }
    }

    pub fn signable(&self) -> Option<&dyn Signable> {
        match self {
            Object::Domain(o) => Some(o as &dyn Signable),
            Object::Leaf(o) => Some(o as &dyn Signable),
            _ => None,
        }
    }

    pub fn signable_mut(&mut self) -> Option<&mut dyn Signable> {
        match self {
            Object::Domain(o) => Some(o as &mut dyn Signable),
            Object::Leaf(o) => Some(o as &mut dyn Signable),
            _ => None,
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        self.content().type_tag()
    }

    pub fn locators(&self) -> &Locators {
        self.content().locators()
    }

    /// The locators other objects should refer to this one by
    pub fn public_locators(&self) -> &Locators {
        match self.keyed() {
            Some(keyed) if !keyed.public_locators().is_empty() => keyed.public_locators(),
            _ => self.locators(),
        }
    }

    pub fn keys(&self) -> Option<&KeyMaterial> {
        self.keyed().map(|k| k.keys())
    }

    pub fn is_master(&self) -> bool {
        self.keyed().map(|k| k.is_master()).unwrap_or(false)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Object::Dict(_) => None,
            Object::KeyPair(o) => o.name(),
            Object::List(o) => o.name(),
            Object::KeyChain(o) => o.name(),
            Object::AccessControlList(o) => o.name(),
            Object::VersionList(o) => o.name(),
            Object::KeyValueTable(o) => o.name(),
            Object::Domain(o) => Nameable::name(o),
            Object::Leaf(o) => Nameable::name(o),
        }
    }

    pub fn to_record(&self, projection: Projection, encrypt: bool) -> Result<Value> {
        self.content().to_record(projection, encrypt)
    }

    pub async fn store(&mut self, session: &Session) -> Result<Locators> {
        match self {
            Object::Dict(o) => o.store(session).await,
            Object::KeyPair(o) => o.store(session).await,
            Object::List(o) => o.store(session).await,
            Object::KeyChain(o) => o.store(session).await,
            Object::AccessControlList(o) => o.store(session).await,
            Object::VersionList(o) => o.store(session).await,
            Object::KeyValueTable(o) => o.store(session).await,
            Object::Domain(o) => o.store(session).await,
            Object::Leaf(o) => o.store(session).await,
        }
    }

    /// Rebuild an object from a plain (unencrypted) record
    pub fn from_record(mut fields: Fields, locators: Locators) -> Result<Object> {
        let tag = TypeTag::parse(fields.get(TYPE_TAG_FIELD).and_then(Value::as_str))?;
        fields.remove(TYPE_TAG_FIELD);
        Ok(match tag {
            TypeTag::Dict => Dict::from_fields(fields, locators)?.into(),
            TypeTag::KeyPair => KeyPairObject::from_fields(fields, locators)?.into(),
            TypeTag::List => SignedList::from_fields(fields, locators)?.into(),
            TypeTag::KeyChain => KeyChain::from_fields(fields, locators)?.into(),
            TypeTag::AccessControlList => {
                AccessControlList::from_fields(fields, locators)?.into()
            }
            TypeTag::VersionList => VersionList::from_fields(fields, locators)?.into(),
            TypeTag::KeyValueTable => KeyValueTable::from_fields(fields, locators)?.into(),
            TypeTag::Domain => Domain::from_fields(fields, locators)?.into(),
            TypeTag::Leaf => Leaf::from_fields(fields, locators)?.into(),
        })
    }

    /// Rebuild an object from a decoded record, decrypting envelopes
    ///  through the session first
    pub fn from_value<'a>(
        value: Value,
        locators: Locators,
        session: &'a Session,
    ) -> BoxFuture<'a, Result<Object>> {
        Box::pin(async move {
            if let Some(envelope) = Envelope::from_value(&value) {
                let (record, access_control) = session.decrypt_envelope(&envelope).await?;
                let Value::Object(fields) = record else {
                    return Err(Error::Coding("decrypted record is not an object".to_string()));
                };
                if fields.get(TYPE_TAG_FIELD).and_then(Value::as_str)
                    != Some(envelope.type_tag.as_str())
                {
                    return Err(Error::Forbidden(
                        "envelope tag does not match the record inside it".to_string(),
                    ));
                }
                let mut obj = Object::from_record(fields, locators)?;
                obj.content_mut().meta_mut().access_control = Some(access_control);
                return Ok(obj);
            }
            match value {
                Value::Object(fields) => Object::from_record(fields, locators),
                other => Err(Error::Coding(format!(
                    "expected a record, found {}",
                    json_kind(&other)
                ))),
            }
        })
    }

    /// Fetch and rebuild whatever is stored at `locators`
    pub fn fetch<'a>(session: &'a Session, locators: &'a Locators) -> BoxFuture<'a, Result<Object>> {
        Box::pin(async move {
            tracing::debug!("fetch: {}", locators.joined());
            let bytes = session
                .backend()
                .raw_fetch(locators, &session.fetch_options())
                .await?;
            let value: Value = serde_json::from_slice(&bytes)?;
            Object::from_value(value, locators.clone(), session).await
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
