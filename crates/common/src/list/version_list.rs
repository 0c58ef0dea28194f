use super::{append_entry, list_wrapper, SignedEntry, SignedList};
use crate::crypto::KeyMaterial;
use crate::error::{Error, Result};
use crate::keyed::store_keyed;
use crate::object::{
    put, take, AccessControl, ContentAddressed, Dict, Fields, Object, Projection, TypeTag,
};
use crate::session::Session;
use crate::store::Locators;

const CONTENT_ACCESS_FIELD: &str = "content_access";

/// A list of snapshots of one working [`Dict`]
#[derive(Debug, Clone)]
pub struct VersionList {
    list: SignedList,
    working: Option<Dict>,
    /// Sealing applied to each saved version
    content_access: Option<AccessControl>,
    /// Reference of `content_access`; the only part kept in the master record
    content_access_ref: Option<Locators>,
}

list_wrapper!(VersionList, TypeTag::VersionList);

impl VersionList {
    pub fn new(keys: KeyMaterial) -> Self {
        Self {
            list: SignedList::new(keys),
            working: None,
            content_access: None,
            content_access_ref: None,
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

    /// Seal saved versions with `access_control`
    pub fn with_content_access(mut self, access_control: AccessControl) -> Self {
        self.content_access_ref = Some(access_control.reference().clone());
        self.content_access = Some(access_control);
        self
    }

    pub fn from_fields(mut fields: Fields, locators: Locators) -> Result<Self> {
        let content_access_ref = take(&mut fields, CONTENT_ACCESS_FIELD)?;
        Ok(Self {
            list: SignedList::from_fields(fields, locators)?,
            working: None,
            content_access: None,
            content_access_ref,
        })
    }

    fn fields_with(&self, projection: Projection) -> Result<Fields> {
        let mut fields = self.list.fields(projection)?;
        if let (Projection::Master, Some(reference)) = (projection, &self.content_access_ref) {
            put(&mut fields, CONTENT_ACCESS_FIELD, reference)?;
        }
        Ok(fields)
    }

    /// Sealing for the next saved version. A list read back from its
    ///  record only knows the reference, so the key chain or ACL behind
    ///  it must be held by the session.
    fn resolve_content_access(&self, session: &Session) -> Result<Option<AccessControl>> {
        if let Some(access_control) = &self.content_access {
            return Ok(Some(access_control.clone()));
        }
        let Some(reference) = &self.content_access_ref else {
            return Ok(None);
        };
        if let Some(chain) = session.keychain_matching(reference) {
            return chain.as_access_control().map(Some);
        }
        if let Some(acl) = session.acl_matching(reference) {
            return acl.as_access_control().map(Some);
        }
        Err(Error::Authentication(format!(
            "versions are sealed with {}, which this session does not hold",
            reference.joined()
        )))
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

    pub fn working(&self) -> Option<&Dict> {
        self.working.as_ref()
    }

    /// The working copy, started empty if there is none yet
    pub fn working_mut(&mut self) -> &mut Dict {
        self.working.get_or_insert_with(Dict::new)
    }

    /// Append the working copy as a new version and continue from an
    ///  unstored copy of it
    pub async fn save_version(&mut self, session: &Session) -> Result<SignedEntry> {
        let content_access = self.resolve_content_access(session)?;
        let mut version = self
            .working
            .take()
            .ok_or_else(|| Error::Coding("no working copy to save".to_string()))?;
        if let Some(access_control) = content_access {
            version.set_access_control(Some(access_control));
        }
        let mut next = version.clone();
        let entry = match append_entry(self, session, version.into()).await {
            Ok(entry) => entry,
            Err(e) => {
                self.working = Some(next);
                return Err(e);
            }
        };
        next.mark_dirty();
        self.working = Some(next);
        Ok(entry)
    }

    /// Make the version behind `entry` the working copy
    pub async fn restore_version(&mut self, session: &Session, entry: &SignedEntry) -> Result<()> {
        let content = self.list.fetch_content(session, entry, false).await?;
        match content {
            Some(Object::Dict(mut dict)) => {
                dict.mark_dirty();
                self.working = Some(dict);
                Ok(())
            }
            Some(other) => Err(Error::Coding(format!(
                "version entry holds a {}, not a dict",
                other.type_tag()
            ))),
            None => Err(Error::Coding("version entry has no content".to_string())),
        }
    }

    /// Load the versions and take the newest as the working copy
    pub async fn fetch_list_and_working(&mut self, session: &Session) -> Result<()> {
        self.list.load(session).await?;
        if let Some(latest) = self.list.entries().last() {
            self.restore_version(session, latest).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::crypto::KeySource;
    use crate::keyed::PublicPrivate;
    use crate::list::KeyChain;
    use crate::store::MemoryBackend;
    use std::sync::Arc;

    fn unsafe_session() -> Session {
        let config = Config {
            allow_unsafe_store: true,
            ..Default::default()
        };
        Session::with_config(Arc::new(MemoryBackend::new()), config)
    }

    #[tokio::test]
    async fn test_save_and_restore() {
        let session = unsafe_session();
        let mut versions = VersionList::new(KeyMaterial::generate()).with_name("notes");
        versions.working_mut().set("text", "first");
        let first = versions.save_version(&session).await.unwrap();
        assert!(!versions.working().unwrap().is_stored());

        versions.working_mut().set("text", "second");
        versions.save_version(&session).await.unwrap();

        versions.restore_version(&session, &first).await.unwrap();
        assert_eq!(versions.working().unwrap().get("text").unwrap(), "first");
    }

    #[tokio::test]
    async fn test_fetch_list_and_working_takes_newest() {
        let session = unsafe_session();
        let mut versions = VersionList::new(KeyMaterial::generate());
        versions.working_mut().set("n", 1);
        versions.save_version(&session).await.unwrap();
        versions.working_mut().set("n", 2);
        versions.save_version(&session).await.unwrap();

        let Object::VersionList(mut public) =
            Object::fetch(&session, versions.public_locators()).await.unwrap()
        else {
            panic!("expected a version list");
        };
        public.fetch_list_and_working(&session).await.unwrap();
        assert_eq!(public.working().unwrap().get("n").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reloaded_list_keeps_sealing_versions() {
        let backend = Arc::new(MemoryBackend::new());
        let config = Config {
            allow_unsafe_store: true,
            ..Default::default()
        };
        let session = Session::with_config(backend.clone(), config);
        let chain = KeyChain::create(&session, "writer", KeySource::Passphrase("writer".into()))
            .await
            .unwrap();

        let mut versions = VersionList::new(KeyMaterial::generate())
            .with_content_access(chain.as_access_control().unwrap());
        versions.store(&session).await.unwrap();

        let Object::VersionList(mut reloaded) =
            Object::fetch(&session, versions.locators()).await.unwrap()
        else {
            panic!("expected a version list");
        };
        assert!(reloaded.is_master());
        reloaded.working_mut().set("text", "sealed");
        let entry = reloaded.save_version(&session).await.unwrap();

        let stranger = Session::new(backend);
        assert!(matches!(
            Object::fetch(&stranger, &entry.locators).await,
            Err(Error::Authentication(_))
        ));

        session.logout();
        reloaded.working_mut().set("text", "unsealed");
        assert!(matches!(
            reloaded.save_version(&session).await,
            Err(Error::Authentication(_))
        ));
        assert_eq!(reloaded.working().unwrap().get("text").unwrap(), "unsealed");
    }

    #[tokio::test]
    async fn test_save_without_working_copy() {
        let session = unsafe_session();
        let mut versions = VersionList::new(KeyMaterial::generate());
        assert!(matches!(
            versions.save_version(&session).await,
            Err(Error::Coding(_))
        ));
    }
}
