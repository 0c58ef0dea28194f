//! Access control lists
//!
//! An ACL is a signed list whose entries are viewer tokens: the list's
//! symmetric access key, sealed for one viewer's public encryption key by
//! the ACL's own box key. Content encrypted under the ACL can be opened by
//! the master (which holds the access key) and by any viewer who can open
//! one of the tokens addressed to them.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use serde_json::Value;

use crate::crypto::{KeyMaterial, Secret};
use crate::error::{Error, Result};
use crate::keyed::{store_keyed, PublicPrivate};
use crate::list::{append_entry, list_wrapper, KeyChain, SignedList};
use crate::object::{
    take, AccessControl, ContentAddressed, Dict, Fields, KeyPairObject, Object, Projection,
    TypeTag,
};
use crate::session::Session;
use crate::store::Locators;

const ACCESS_KEY_FIELD: &str = "access_key";

#[derive(Debug, Clone)]
pub struct AccessControlList {
    list: SignedList,
    /// Present only on the master side
    access_key: Option<Secret>,
}

list_wrapper!(AccessControlList, TypeTag::AccessControlList);

/// Who a token is for
#[derive(Debug, Clone, Copy)]
pub enum Viewer<'a> {
    Keys(&'a KeyPairObject),
    Locators(&'a Locators),
}

/// The access key wrapped for one viewer
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerToken {
    /// Public locators of the viewer's key pair
    pub viewer: Locators,
    /// url-safe base64 sealed access key
    pub token: String,
    pub label: Option<String>,
}

impl ViewerToken {
    fn to_dict(&self) -> Result<Dict> {
        let mut dict = Dict::new()
            .with("viewer", serde_json::to_value(&self.viewer)?)
            .with("token", self.token.clone());
        if let Some(label) = &self.label {
            dict.set("name", label.clone());
        }
        Ok(dict)
    }

    fn from_dict(dict: &Dict) -> Option<Self> {
        let viewer = serde_json::from_value(dict.get("viewer")?.clone()).ok()?;
        let token = dict.get("token")?.as_str()?.to_string();
        let label = dict.get("name").and_then(Value::as_str).map(str::to_string);
        Some(Self {
            viewer,
            token,
            label,
        })
    }
}

impl AccessControlList {
    /// A new list; a master gets a fresh random access key
    pub fn new(keys: KeyMaterial) -> Self {
        let access_key = keys.has_private().then(Secret::generate);
        Self {
            list: SignedList::new(keys),
            access_key,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.list = self.list.with_name(name);
        self
    }

    pub fn allow_unsafe_store(mut self) -> Self {
        self.list = self.list.allow_unsafe_store();
        self
    }

    /// Create and store a master ACL protected by `keychain`, which also
    ///  keeps it so later sessions can find it again
    pub async fn create(session: &Session, name: &str, keychain: &mut KeyChain) -> Result<Self> {
        let mut acl = Self::new(KeyMaterial::generate()).with_name(name);
        acl.set_access_control(Some(keychain.as_access_control()?));
        acl.store(session).await?;
        keychain.add(session, acl.clone()).await?;
        tracing::info!("acl {name}: created at {}", acl.public_locators().joined());
        Ok(acl)
    }

    pub fn from_fields(mut fields: Fields, locators: Locators) -> Result<Self> {
        let access_key = take::<String>(&mut fields, ACCESS_KEY_FIELD)?
            .map(|encoded| Secret::from_base64(&encoded))
            .transpose()?;
        Ok(Self {
            list: SignedList::from_fields(fields, locators)?,
            access_key,
        })
    }

    fn fields_with(&self, projection: Projection) -> Result<Fields> {
        let mut fields = self.list.fields(projection)?;
        if let (Projection::Master, Some(access_key)) = (projection, &self.access_key) {
            fields.insert(
                ACCESS_KEY_FIELD.to_string(),
                Value::String(access_key.to_base64()),
            );
        }
        Ok(fields)
    }

    pub fn name(&self) -> Option<&str> {
        self.list.name()
    }

    pub fn list(&self) -> &SignedList {
        &self.list
    }

    pub async fn store(&mut self, session: &Session) -> Result<Locators> {
        store_keyed(self, session).await
    }

    /// The reference content is sealed with when protected by this list
    pub fn as_access_control(&self) -> Result<AccessControl> {
        let access_key = self.access_key.clone().ok_or_else(|| {
            Error::Encryption("public acl has no access key to encrypt with".to_string())
        })?;
        if self.public_locators().is_empty() {
            return Err(Error::Coding(
                "acl must be stored before it can protect anything".to_string(),
            ));
        }
        Ok(AccessControl::List {
            public: self.public_locators().clone(),
            access_key,
        })
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let access_key = self.access_key.as_ref().ok_or_else(|| {
            Error::Encryption("public acl has no access key to encrypt with".to_string())
        })?;
        Ok(KeyMaterial::symmetric_encrypt(data, access_key)?)
    }

    /// Wrap the access key for `viewer` and append the token
    pub async fn add_viewer(
        &mut self,
        session: &Session,
        viewer: Viewer<'_>,
        label: Option<&str>,
    ) -> Result<ViewerToken> {
        if !self.is_master() {
            return Err(Error::Forbidden("only the acl master can add viewers".to_string()));
        }
        let (viewer_locators, viewer_keys) = match viewer {
            Viewer::Keys(kp) => (kp.public_locators().clone(), kp.keys().public_only()),
            Viewer::Locators(locators) => {
                if locators.is_empty() {
                    return Err(Error::Coding("viewer reference is empty".to_string()));
                }
                let obj = Object::fetch(session, locators).await?;
                let keys = obj.keys().cloned().ok_or_else(|| {
                    Error::Coding(format!("a {} has no keys to share with", obj.type_tag()))
                })?;
                (obj.public_locators().clone(), keys.public_only())
            }
        };
        if viewer_locators.is_empty() {
            return Err(Error::Coding("viewer reference is empty".to_string()));
        }
        let access_key = self.access_key.as_ref().ok_or_else(|| {
            Error::Encryption("acl master has lost its access key".to_string())
        })?;
        let sealed = viewer_keys.encrypt(access_key.bytes(), Some(self.keys()))?;
        let token = ViewerToken {
            viewer: viewer_locators,
            token: URL_SAFE.encode(sealed),
            label: label.map(str::to_string),
        };
        append_entry(self, session, token.to_dict()?.into()).await?;
        tracing::debug!("acl: added viewer {}", token.viewer.joined());
        Ok(token)
    }

    /// Every token among the entries fetched so far
    pub fn tokens(&self) -> Vec<ViewerToken> {
        self.list
            .cached_contents()
            .iter()
            .filter_map(|obj| match obj {
                Object::Dict(dict) => ViewerToken::from_dict(dict),
                _ => None,
            })
            .collect()
    }

    /// Tokens addressed to `viewer`
    pub fn find_tokens(&self, viewer: &KeyPairObject) -> Vec<ViewerToken> {
        self.tokens()
            .into_iter()
            .filter(|t| t.viewer.intersects(viewer.public_locators()))
            .collect()
    }

    /// Open a token with the viewer's private keys
    pub fn unwrap_token(&self, token: &ViewerToken, viewer_keys: &KeyMaterial) -> Result<Secret> {
        let sealed = URL_SAFE
            .decode(&token.token)
            .map_err(|e| Error::Coding(format!("viewer token is not base64: {e}")))?;
        let bytes = viewer_keys.decrypt(&sealed, self.keys())?;
        Ok(Secret::from_slice(&bytes)?)
    }

    /// Decrypt with the first access key that works: our own, then any
    ///  token addressed to one of `viewers`
    pub fn decrypt(&self, data: &[u8], viewers: &[KeyPairObject]) -> Result<(Vec<u8>, Secret)> {
        if let Some(access_key) = &self.access_key {
            if let Ok(plain) = access_key.decrypt(data) {
                return Ok((plain, access_key.clone()));
            }
        }
        for viewer in viewers {
            for token in self.find_tokens(viewer) {
                let Ok(access_key) = self.unwrap_token(&token, viewer.keys()) else {
                    continue;
                };
                if let Ok(plain) = access_key.decrypt(data) {
                    return Ok((plain, access_key));
                }
            }
        }
        Err(Error::Authentication(format!(
            "no held key opens content under acl {}",
            self.public_locators().joined()
        )))
    }

    /// Load entries and fetch the tokens they point at
    pub async fn load_tokens(&self, session: &Session) -> Result<()> {
        self.list.load(session).await?;
        self.list.fetch_contents(session, true).await?;
        Ok(())
    }
}
