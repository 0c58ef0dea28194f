//! Verified naming
//!
//! A [`Domain`] is a key value table whose entries are names. Every entry
//! is a [`Domain`] or a [`Leaf`] carrying its own name and a signature by
//! one of the parent's authorized keys, so a path like `a/b/c` can be
//! resolved from public data alone and checked at every step.

mod domain;
mod leaf;
mod signable;

pub use domain::Domain;
pub use leaf::{Leaf, HTML_CONTENT_TYPE, JSON_CONTENT_TYPE, OBJECT_JSON_TYPE};
pub use signable::{Nameable, SignatureRecord, Signable};

use crate::object::Object;

/// Outcome of resolving a path: what was found, and the part of the path
///  left over. `(None, Some(path))` means a name along the way is absent.
pub type Resolution = (Option<Object>, Option<String>);
