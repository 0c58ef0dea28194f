/**
 * Access control lists: a symmetric access key
 *  shared with viewers through signed tokens.
 */
pub mod acl;
pub mod config;
/**
 * Cryptographic types and operations.
 *  - Signing and box key pairs derived from one seed
 *  - Symmetric secrets for content under an ACL
 */
pub mod crypto;
pub mod error;
/**
 * Public and master projections of anything
 *  that holds key material.
 */
pub mod keyed;
/**
 * Signed append-only lists, and the key chains
 *  and version lists built on them.
 */
pub mod list;
/**
 * Domains and leaves: names signed by their parent
 *  and checked on every step of a lookup.
 */
pub mod naming;
/**
 * Type tagged records, the envelope they are
 *  encrypted in, and the single decode boundary.
 */
pub mod object;
pub mod session;
/**
 * Backend boundary and the in-memory and
 *  filesystem backends.
 */
pub mod store;
/**
 * Key value tables with multi-source merge
 *  and change subscriptions.
 */
pub mod table;
pub mod timestamp;

pub mod prelude {
    pub use crate::acl::{AccessControlList, Viewer, ViewerToken};
    pub use crate::config::Config;
    pub use crate::crypto::{KeyMaterial, KeySource, Secret};
    pub use crate::error::{Error, Result};
    pub use crate::keyed::PublicPrivate;
    pub use crate::list::{KeyChain, SignedEntry, SignedList, VersionList};
    pub use crate::naming::{Domain, Leaf, Nameable, Signable};
    pub use crate::object::{
        AccessControl, ContentAddressed, Dict, KeyPairObject, Object, Projection, TypeTag,
    };
    pub use crate::session::Session;
    pub use crate::store::{Backend, FsBackend, Locators, MemoryBackend};
    pub use crate::table::{KeyValueTable, SetOptions, TableEvent, TableOptions, TableValue};
}
