use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;

use super::{Nameable, Resolution, SignatureRecord, Signable};
use crate::error::{Error, Result};
use crate::object::{
    put, store_plain, take, ContentAddressed, Fields, Object, ObjectMeta, Projection, TypeTag,
};
use crate::session::Session;
use crate::store::Locators;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const HTML_CONTENT_TYPE: &str = "text/html";
/// `jsontype` metadata marking a JSON leaf whose target is a stored object
pub const OBJECT_JSON_TYPE: &str = "dweb.object";

/// A named pointer at stored content
#[derive(Debug, Clone, Default)]
pub struct Leaf {
    meta: ObjectMeta,
    name: Option<String>,
    targets: Locators,
    content_type: Option<String>,
    metadata: Fields,
    signatures: Vec<SignatureRecord>,
    expires: Option<DateTime<Utc>>,
}

impl Leaf {
    pub fn new(targets: Locators) -> Self {
        Self {
            targets,
            ..Default::default()
        }
    }

    /// A leaf at a stored object, typed so resolution can follow it
    pub fn pointing_at(obj: &Object) -> Result<Self> {
        let targets = obj.public_locators().clone();
        if targets.is_empty() {
            return Err(Error::Coding(format!(
                "{} must be stored before a leaf can point at it",
                obj.type_tag()
            )));
        }
        Ok(Self::new(targets)
            .with_content_type(JSON_CONTENT_TYPE)
            .with_metadata("jsontype", OBJECT_JSON_TYPE))
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(name.to_string(), value.into());
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn from_fields(mut fields: Fields, locators: Locators) -> Result<Self> {
        Ok(Self {
            meta: ObjectMeta {
                locators,
                access_control: None,
            },
            name: take(&mut fields, "name")?,
            targets: take(&mut fields, "targets")?.unwrap_or_default(),
            content_type: take(&mut fields, "content_type")?,
            metadata: take(&mut fields, "metadata")?.unwrap_or_default(),
            signatures: take(&mut fields, "signatures")?.unwrap_or_default(),
            expires: take::<String>(&mut fields, "expires")?
                .map(|s| crate::timestamp::parse(&s))
                .transpose()
                .map_err(|e| Error::Coding(format!("field expires: {e}")))?,
        })
    }

    pub fn targets(&self) -> &Locators {
        &self.targets
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn metadata(&self, name: &str) -> Option<&Value> {
        self.metadata.get(name)
    }

    pub async fn store(&mut self, session: &Session) -> Result<Locators> {
        store_plain(self, session).await
    }

    /// Continue a path past this leaf.
    ///
    /// Only a few kinds of leaf can be continued; any failure on the way
    ///  is a resolution failure.
    pub fn resolve<'a>(
        &'a self,
        session: &'a Session,
        remainder: &'a str,
    ) -> BoxFuture<'a, Result<Resolution>> {
        Box::pin(async move {
            self.resolve_inner(session, remainder)
                .await
                .map_err(Error::resolution)
        })
    }

    async fn resolve_inner(&self, session: &Session, remainder: &str) -> Result<Resolution> {
        let remainder = remainder.trim_start_matches('/');
        let jsontype = self.metadata("jsontype").and_then(Value::as_str);
        let htmlpath = self.metadata("htmlpath").and_then(Value::as_str);

        if self.content_type() == Some(JSON_CONTENT_TYPE) && jsontype == Some(OBJECT_JSON_TYPE) {
            let obj = Object::fetch(session, &self.targets).await?;
            return match obj {
                Object::Domain(domain) if !remainder.is_empty() => {
                    match domain.resolve(session, remainder).await? {
                        (None, _) => Ok((None, Some(remainder.to_string()))),
                        found => Ok(found),
                    }
                }
                obj if remainder.is_empty() => Ok((Some(obj), None)),
                obj => Err(Error::Resolution(format!(
                    "cannot continue into a {} with {remainder}",
                    obj.type_tag()
                ))),
            };
        }
        if self.content_type() == Some(HTML_CONTENT_TYPE) {
            let rest = (!remainder.is_empty()).then(|| remainder.to_string());
            return Ok((Some(self.clone().into()), rest));
        }
        if htmlpath == Some("/") {
            let mut leaf = self.clone();
            leaf.targets = self
                .targets
                .iter()
                .map(|t| format!("{}/{remainder}", t.trim_end_matches('/')))
                .collect();
            leaf.mark_dirty();
            return Ok((Some(leaf.into()), None));
        }
        Err(Error::Resolution(format!(
            "a leaf of type {} cannot resolve {remainder}",
            self.content_type().unwrap_or("unknown")
        )))
    }
}

impl ContentAddressed for Leaf {
    fn type_tag(&self) -> TypeTag {
        TypeTag::Leaf
    }

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn fields(&self, _projection: Projection) -> Result<Fields> {
        let mut fields = self.signed_fields()?;
        put(&mut fields, "content_type", &self.content_type)?;
        if !self.metadata.is_empty() {
            put(&mut fields, "metadata", &self.metadata)?;
        }
        put(&mut fields, "signatures", &self.signatures)?;
        Ok(fields)
    }
}

impl Signable for Leaf {
    fn signed_fields(&self) -> Result<Fields> {
        let mut fields = Fields::new();
        put(&mut fields, "expires", &self.expires.as_ref().map(crate::timestamp::iso))?;
        put(&mut fields, "name", &self.name)?;
        put(&mut fields, "targets", &self.targets)?;
        Ok(fields)
    }

    fn signatures(&self) -> &[SignatureRecord] {
        &self.signatures
    }

    fn signatures_mut(&mut self) -> &mut Vec<SignatureRecord> {
        &mut self.signatures
    }
}

impl Nameable for Leaf {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::KeyMaterial;
    use crate::store::MemoryBackend;
    use std::sync::Arc;

    #[test]
    fn test_signature_covers_name() {
        let keys = KeyMaterial::generate();
        let mut leaf = Leaf::new(Locators::from("X"));
        leaf.set_name("b");
        leaf.sign(&keys).unwrap();
        let signer = keys.verify_export().unwrap();
        assert!(leaf.signed_by_any(&[signer.clone()]));

        leaf.set_name("c");
        assert!(!leaf.signed_by_any(&[signer]));
    }

    #[test]
    fn test_record_round_trip_keeps_signatures() {
        let keys = KeyMaterial::generate();
        let mut leaf = Leaf::new(Locators::from("X")).with_expires(crate::timestamp::now());
        leaf.set_name("a");
        leaf.sign(&keys).unwrap();

        let record = leaf.to_record(Projection::Public, false).unwrap();
        let serde_json::Value::Object(mut fields) = record else {
            panic!("record is not an object");
        };
        fields.remove("type_tag");
        let back = Leaf::from_fields(fields, Locators::new()).unwrap();
        assert_eq!(back.signatures(), leaf.signatures());
        assert_eq!(back.expires(), leaf.expires());
        assert!(back.signed_by_any(&[keys.verify_export().unwrap()]));
    }

    #[tokio::test]
    async fn test_directory_leaf_appends_remainder() {
        let session = Session::new(Arc::new(MemoryBackend::new()));
        let leaf = Leaf::new(Locators::from("https://example.org/site/")).with_metadata("htmlpath", "/");
        let (found, rest) = leaf.resolve(&session, "docs/index.html").await.unwrap();
        let Some(Object::Leaf(found)) = found else {
            panic!("expected a leaf");
        };
        assert_eq!(found.targets()[0], "https://example.org/site/docs/index.html");
        assert!(rest.is_none());
    }

    #[tokio::test]
    async fn test_unknown_leaf_type_fails_resolution() {
        let session = Session::new(Arc::new(MemoryBackend::new()));
        let leaf = Leaf::new(Locators::from("X")).with_content_type("image/png");
        assert!(matches!(
            leaf.resolve(&session, "more").await,
            Err(Error::Resolution(_))
        ));
    }

    #[tokio::test]
    async fn test_html_leaf_hands_back_remainder() {
        let session = Session::new(Arc::new(MemoryBackend::new()));
        let leaf = Leaf::new(Locators::from("X")).with_content_type(HTML_CONTENT_TYPE);
        let (found, rest) = leaf.resolve(&session, "page").await.unwrap();
        assert!(matches!(found, Some(Object::Leaf(_))));
        assert_eq!(rest.as_deref(), Some("page"));
    }
}
