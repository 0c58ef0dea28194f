use std::fmt;
use std::ops::Deref;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::secret::Secret;

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Size of an X25519 key in bytes
pub const BOX_KEY_SIZE: usize = 32;

/// Context string for deriving a box key from an X25519 shared secret
const BOX_KEY_CONTEXT: &str = "dweb 2024-01-01 box key v1";

/// Errors that can occur during key operations
///
/// The categories line up with the crate-wide taxonomy so they can be
/// folded into [`crate::error::Error`] without losing meaning.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("coding error: {0}")]
    Coding(String),
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("decryption failed: {0}")]
    DecryptionFail(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("not implemented: {0}")]
    ToBeImplemented(String),
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Public half of an Ed25519 signing key pair
///
/// Exported as `NACL VERIFY:<b64>`. This is the key a Domain lists among
/// its authorised keys and the key every signature is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl Deref for PublicKey {
    type Target = VerifyingKey;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        PublicKey(key)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid public key size, expected {}, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut buff = [0; PUBLIC_KEY_SIZE];
        buff.copy_from_slice(bytes);
        let key = VerifyingKey::from_bytes(&buff)
            .map_err(|_| anyhow::anyhow!("public key is not a valid edwards point"))?;
        Ok(PublicKey(key))
    }
}

impl PublicKey {
    /// Convert public key to raw bytes
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Convert public key to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &ed25519_dalek::Signature,
    ) -> Result<(), ed25519_dalek::SignatureError> {
        self.0.verify_strict(msg, signature)
    }
}

/// Private half of an Ed25519 signing key pair
///
/// Never exported on its own: only the seed it came from is.
#[derive(Debug, Clone)]
pub struct SecretKey(SigningKey);

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(&secret))
    }
}

impl SecretKey {
    /// Derive the public key from this secret key
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Sign a message with this secret key using Ed25519.
    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }
}

/// Public half of an X25519 encryption key pair, exported as `NACL PUBLIC:<b64>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxPublicKey(X25519PublicKey);

impl From<[u8; BOX_KEY_SIZE]> for BoxPublicKey {
    fn from(bytes: [u8; BOX_KEY_SIZE]) -> Self {
        BoxPublicKey(X25519PublicKey::from(bytes))
    }
}

impl TryFrom<&[u8]> for BoxPublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != BOX_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid encryption key size, expected {}, got {}",
                BOX_KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut buff = [0; BOX_KEY_SIZE];
        buff.copy_from_slice(bytes);
        Ok(buff.into())
    }
}

impl BoxPublicKey {
    pub fn to_bytes(&self) -> [u8; BOX_KEY_SIZE] {
        self.0.to_bytes()
    }
}

/// Private half of an X25519 encryption key pair
#[derive(Clone)]
pub struct BoxSecretKey(StaticSecret);

impl fmt::Debug for BoxSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoxSecretKey").field(&"..").finish()
    }
}

impl BoxSecretKey {
    /// Expand a seed into an encryption secret.
    ///
    /// The first half of SHA-512(seed) becomes the X25519 scalar, the same
    /// expansion NaCl uses for seeded box key pairs.
    pub fn from_seed(seed: &[u8]) -> Self {
        let digest = Sha512::digest(seed);
        let mut scalar = [0u8; BOX_KEY_SIZE];
        scalar.copy_from_slice(&digest[..BOX_KEY_SIZE]);
        BoxSecretKey(StaticSecret::from(scalar))
    }

    pub fn public(&self) -> BoxPublicKey {
        BoxPublicKey(X25519PublicKey::from(&self.0))
    }

    /// Shared symmetric key between this secret and a peer's public key.
    ///
    /// Both sides of a pair arrive at the same key, so the sender seals
    /// with (sender secret, recipient public) and the recipient opens with
    /// (recipient secret, sender public).
    fn shared_key(&self, peer: &BoxPublicKey) -> Secret {
        let shared = self.0.diffie_hellman(&peer.0);
        Secret::from(blake3::derive_key(BOX_KEY_CONTEXT, shared.as_bytes()))
    }

    /// Authenticated encryption to `recipient`, with a fresh nonce prefixed
    pub fn seal(&self, recipient: &BoxPublicKey, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        self.shared_key(recipient)
            .encrypt(data)
            .map_err(|e| KeyError::Encryption(e.to_string()))
    }

    /// Open a box sealed by `sender` for this key
    pub fn open(&self, sender: &BoxPublicKey, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        self.shared_key(sender).decrypt(data).map_err(|_| {
            KeyError::DecryptionFail("box authentication failed".to_string())
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let secret_key = SecretKey::from([7u8; PRIVATE_KEY_SIZE]);
        let public_key = secret_key.public();
        let message = b"hello, world!";

        let signature = secret_key.sign(message);
        assert!(public_key.verify(message, &signature).is_ok());

        let wrong_message = b"hello, world?";
        assert!(public_key.verify(wrong_message, &signature).is_err());

        let other_key = SecretKey::from([8u8; PRIVATE_KEY_SIZE]).public();
        assert!(other_key.verify(message, &signature).is_err());
    }

    #[test]
    fn test_public_key_bytes() {
        let public_key = SecretKey::from([3u8; PRIVATE_KEY_SIZE]).public();
        let recovered = PublicKey::try_from(public_key.to_bytes().as_slice()).unwrap();
        assert_eq!(public_key, recovered);
        assert!(PublicKey::try_from([1u8; 5].as_slice()).is_err());
    }

    #[test]
    fn test_seal_and_open() {
        let alice = BoxSecretKey::from_seed(b"alice");
        let bob = BoxSecretKey::from_seed(b"bob");

        let sealed = alice.seal(&bob.public(), b"for bob").unwrap();
        let opened = bob.open(&alice.public(), &sealed).unwrap();
        assert_eq!(opened, b"for bob");

        let mallory = BoxSecretKey::from_seed(b"mallory");
        assert!(matches!(
            mallory.open(&alice.public(), &sealed),
            Err(KeyError::DecryptionFail(_))
        ));
    }

    #[test]
    fn test_seed_expansion_is_deterministic() {
        let a = BoxSecretKey::from_seed(b"same seed");
        let b = BoxSecretKey::from_seed(b"same seed");
        assert_eq!(a.public(), b.public());
    }
}
