//! The explicit context every operation runs in
//!
//! A [`Session`] owns the backend handle, the configuration and the set of
//! logged-in key chains. It starts with nobody logged in; a
//! [`KeyChain::create`] logs its chain in, and [`Session::logout`] drops
//! every chain (and with it the ability to open anything they protect).
//! Sessions are cheap to clone; clones share state.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::acl::AccessControlList;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::keyed::PublicPrivate;
use crate::list::KeyChain;
use crate::naming::{Domain, Resolution};
use crate::object::{AccessControl, Envelope, KeyPairObject, Object};
use crate::store::{Backend, FetchOptions, Locators, NameResolver, NAME_SCHEME};

#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    backend: Arc<dyn Backend>,
    config: Config,
    keychains: RwLock<Vec<KeyChain>>,
    root: OnceCell<Domain>,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_config(backend, Config::default())
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: Config) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                backend,
                config,
                keychains: RwLock::new(Vec::new()),
                root: OnceCell::new(),
            }),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::with_timeout(self.inner.config.fetch_timeout_ms.map(Duration::from_millis))
    }

    /// Hold `keychain`, replacing an earlier login of the same chain
    pub fn login(&self, keychain: KeyChain) {
        let mut keychains = self.inner.keychains.write();
        keychains.retain(|k| !k.public_locators().intersects(keychain.public_locators()));
        tracing::info!(
            "login: {}",
            keychain.name().unwrap_or("unnamed keychain")
        );
        keychains.push(keychain);
    }

    pub fn logout(&self) {
        let mut keychains = self.inner.keychains.write();
        tracing::info!("logout: dropping {} keychains", keychains.len());
        keychains.clear();
    }

    pub fn keychains(&self) -> Vec<KeyChain> {
        self.inner.keychains.read().clone()
    }

    pub fn keychain_matching(&self, locators: &Locators) -> Option<KeyChain> {
        self.inner
            .keychains
            .read()
            .iter()
            .find(|k| k.public_locators().intersects(locators))
            .cloned()
    }

    /// Every key pair held by a logged-in chain
    pub fn my_keys(&self) -> Vec<KeyPairObject> {
        self.inner
            .keychains
            .read()
            .iter()
            .flat_map(KeyChain::my_keys)
            .collect()
    }

    /// A master ACL held by a logged-in chain, by public identity
    pub fn acl_matching(&self, locators: &Locators) -> Option<AccessControlList> {
        self.inner
            .keychains
            .read()
            .iter()
            .flat_map(KeyChain::my_acls)
            .find(|acl| acl.public_locators().intersects(locators))
    }

    /// Open an envelope with whatever this session holds.
    ///
    /// A logged-in chain or a held master ACL is used directly; otherwise
    ///  the reference is fetched and, if it is an ACL, its tokens are
    ///  tried against every key pair the session holds.
    pub async fn decrypt_envelope(&self, envelope: &Envelope) -> Result<(Value, AccessControl)> {
        let reference = &envelope.access_control_ref;
        let ciphertext = envelope.ciphertext()?;

        if let Some(chain) = self.keychain_matching(reference) {
            let plain = chain.decrypt(&ciphertext)?;
            return Ok((serde_json::from_slice(&plain)?, chain.as_access_control()?));
        }
        if let Some(acl) = self.acl_matching(reference) {
            if let Ok((plain, access_key)) = acl.decrypt(&ciphertext, &[]) {
                let access_control = AccessControl::List {
                    public: reference.clone(),
                    access_key,
                };
                return Ok((serde_json::from_slice(&plain)?, access_control));
            }
        }

        match Object::fetch(self, reference).await? {
            Object::KeyChain(chain) => Err(Error::Authentication(format!(
                "must be logged in as {}",
                chain.name().unwrap_or("an unnamed keychain")
            ))),
            Object::AccessControlList(acl) => {
                acl.load_tokens(self).await?;
                let (plain, access_key) = acl.decrypt(&ciphertext, &self.my_keys())?;
                let access_control = AccessControl::List {
                    public: reference.clone(),
                    access_key,
                };
                Ok((serde_json::from_slice(&plain)?, access_control))
            }
            other => Err(Error::Forbidden(format!(
                "a {} cannot protect content",
                other.type_tag()
            ))),
        }
    }

    /// The configured root domain, fetched once per session
    pub async fn root_domain(&self) -> Result<&Domain> {
        self.inner
            .root
            .get_or_try_init(|| async move {
                let root = Locators::from(self.inner.config.root.clone());
                if root.is_empty() {
                    return Err(Error::Resolution("no root domain configured".to_string()));
                }
                match Object::fetch(self, &root).await? {
                    Object::Domain(domain) => Ok(domain),
                    other => Err(Error::Resolution(format!(
                        "root is a {}, not a domain",
                        other.type_tag()
                    ))),
                }
            })
            .await
    }

    /// Resolve `dweb:/a/b`, `/a/b` or `a/b` from the root domain
    pub async fn root_resolve(&self, path: &str) -> Result<Resolution> {
        let path = path.strip_prefix("dweb:").unwrap_or(path);
        let path = path.trim_start_matches('/');
        self.root_domain().await?.resolve(self, path).await
    }

    /// Turn `dweb:/` names into the locators they lead to. Other entries
    ///  pass through; names that do not resolve are dropped.
    ///
    /// A leaf leads to its targets. A domain rebuilt from a table value has
    ///  no locators of its own, so it leads to its public table.
    pub async fn resolve_names(&self, names: &[String]) -> Vec<String> {
        let mut locators = Vec::new();
        for name in names {
            if !name.starts_with(NAME_SCHEME) {
                locators.push(name.clone());
                continue;
            }
            match self.root_resolve(name).await {
                Ok((Some(Object::Leaf(leaf)), None)) => locators.extend(leaf.targets().to_vec()),
                Ok((Some(Object::Domain(domain)), None)) if domain.public_locators().is_empty() => {
                    locators.extend(domain.table().table_public_locators().to_vec())
                }
                Ok((Some(obj), None)) => locators.extend(obj.public_locators().to_vec()),
                Ok(_) => tracing::debug!("resolve_names: {name} did not resolve"),
                Err(e) => tracing::warn!("resolve_names: {name}: {e}"),
            }
        }
        locators
    }

    /// Let the backend route `dweb:/` names through this session
    pub fn install_name_resolver(&self) {
        let resolver = SessionResolver {
            inner: Arc::downgrade(&self.inner),
        };
        self.backend().resolve_names_with(Arc::new(resolver));
    }
}

/// Backend hook; holds the session weakly so the backend does not keep
///  it alive
struct SessionResolver {
    inner: Weak<SessionInner>,
}

#[async_trait]
impl NameResolver for SessionResolver {
    async fn resolve_names(&self, names: &[String]) -> Vec<String> {
        match self.inner.upgrade() {
            Some(inner) => Session { inner }.resolve_names(names).await,
            None => names
                .iter()
                .filter(|n| !n.starts_with(NAME_SCHEME))
                .cloned()
                .collect(),
        }
    }
}
