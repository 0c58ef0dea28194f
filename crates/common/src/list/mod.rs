//! Append-only signed lists
//!
//! A [`SignedList`] is a keyed object whose public locators address an
//! append log on the backend. Only the master can append; every entry is
//! signed over its date and the locators it references, so anyone holding
//! the public record can check who wrote what.
//!
//! [`KeyChain`] and [`VersionList`] are lists with a purpose: the first
//! collects a user's keys and ACLs, the second keeps snapshots of a
//! working dict.

mod entry;
mod keychain;
#[allow(clippy::module_inception)]
mod list;
mod version_list;

pub use entry::{filter_unique, SignedEntry};
pub use keychain::KeyChain;
pub use list::SignedList;
pub(crate) use list::{append_entry, list_wrapper, ListOwner};
pub use version_list::VersionList;
