use super::{append_entry, list_wrapper, SignedEntry, SignedList};
use crate::acl::AccessControlList;
use crate::crypto::{KeyMaterial, KeySource};
use crate::error::{Error, Result};
use crate::keyed::{store_keyed, PublicPrivate};
use crate::object::{AccessControl, ContentAddressed, Fields, KeyPairObject, Object, Projection, TypeTag};
use crate::session::Session;
use crate::store::Locators;

/// A user's collection of keys and ACLs, each encrypted to the chain.
///
/// Only the public projection is ever stored: the private half comes
/// back from the passphrase or mnemonic it was derived from, and since
/// the public record is content addressed the same source always finds
/// the same entries.
#[derive(Debug, Clone)]
pub struct KeyChain {
    list: SignedList,
}

list_wrapper!(KeyChain, TypeTag::KeyChain);

impl KeyChain {
    pub fn new(keys: KeyMaterial, name: impl Into<String>) -> Self {
        let mut list = SignedList::new(keys).with_name(name);
        list.keyed.dont_store_master = true;
        Self { list }
    }

    /// Derive a chain, store its public record, log it in and load
    ///  whatever it already holds
    pub async fn create(session: &Session, name: &str, source: KeySource) -> Result<Self> {
        let mut chain = Self::new(KeyMaterial::derive(source)?, name);
        chain.store(session).await?;
        session.login(chain.clone());
        chain.list.load(session).await?;
        chain.list.fetch_contents(session, true).await?;
        tracing::info!(
            "keychain {name}: {} entries at {}",
            chain.list.len(),
            chain.public_locators().joined()
        );
        Ok(chain)
    }

    pub fn from_fields(fields: Fields, locators: Locators) -> Result<Self> {
        let mut list = SignedList::from_fields(fields, locators)?;
        list.keyed.dont_store_master = true;
        Ok(Self { list })
    }

    fn fields_with(&self, projection: Projection) -> Result<Fields> {
        self.list.fields(projection)
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

    /// The reference objects are sealed with when added to this chain
    pub fn as_access_control(&self) -> Result<AccessControl> {
        if self.public_locators().is_empty() {
            return Err(Error::Coding(
                "keychain must be stored before it can protect anything".to_string(),
            ));
        }
        Ok(AccessControl::KeyChain {
            public: self.public_locators().clone(),
            keys: self.keys().clone(),
        })
    }

    /// Encrypt `obj` to this chain and append it
    pub async fn add(&mut self, session: &Session, obj: impl Into<Object>) -> Result<SignedEntry> {
        let mut obj = obj.into();
        if self.public_locators().is_empty() {
            self.store(session).await?;
        }
        let access_control = self.as_access_control()?;
        if obj.content().access_control().map(AccessControl::reference)
            != Some(access_control.reference())
        {
            obj.content_mut().set_access_control(Some(access_control));
        }
        append_entry(self, session, obj).await
    }

    pub async fn load(&self, session: &Session) -> Result<()> {
        self.list.load(session).await?;
        self.list.fetch_contents(session, true).await?;
        Ok(())
    }

    /// Key pairs held in this chain, among the contents fetched so far
    pub fn my_keys(&self) -> Vec<KeyPairObject> {
        self.list
            .cached_contents()
            .into_iter()
            .filter_map(|obj| match obj {
                Object::KeyPair(kp) => Some(kp),
                _ => None,
            })
            .collect()
    }

    /// Master ACLs held in this chain
    pub fn my_acls(&self) -> Vec<AccessControlList> {
        self.list
            .cached_contents()
            .into_iter()
            .filter_map(|obj| match obj {
                Object::AccessControlList(acl) if acl.is_master() => Some(acl),
                _ => None,
            })
            .collect()
    }

    /// Open data sealed to this chain
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.keys().has_private() {
            return Err(Error::Authentication(format!(
                "keychain {} is not unlocked",
                self.name().unwrap_or("unnamed")
            )));
        }
        Ok(self.keys().decrypt(data, self.keys())?)
    }
}
