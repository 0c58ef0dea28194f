//! Cryptographic primitives
//!
//! - **Identity & Signatures**: Ed25519 key pairs; every signed entry and every
//!   name registration is signed with one.
//! - **Authenticated encryption**: X25519 key agreement feeding ChaCha20-Poly1305,
//!   used to wrap an access key for one viewer. The scheme is sender-bound:
//!   the recipient checks who sealed the box.
//! - **Content encryption**: a symmetric [`Secret`] per access control list.
//!
//! Keys travel as tagged strings (`NACL VERIFY:<b64>`, ...), see [`KeyMaterial`].

mod key_material;
mod keys;
mod secret;

pub use key_material::{ExportTag, KeyMaterial, KeySource, PASSPHRASE_ROUNDS, SEED_SIZE};
pub use keys::{BoxPublicKey, BoxSecretKey, KeyError, PublicKey, SecretKey};
pub use secret::{Secret, SecretError, NONCE_SIZE, SECRET_SIZE};
