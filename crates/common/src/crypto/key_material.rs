//! Key material held by every keyed object
//!
//! A [`KeyMaterial`] carries up to two key pairs:
//!
//! - an Ed25519 signing pair, exported as `NACL VERIFY:`
//! - an X25519 encryption pair, exported as `NACL PUBLIC:`
//!
//! and, when it was derived rather than imported, the 32 byte seed both
//! pairs came from (exported as `NACL SEED:`). Any half may be missing:
//! a public projection holds only the two public keys.
//!
//! # Derivation
//!
//! Passphrases are hashed with SHA-256 a fixed number of times to get a
//! seed. This is deterministic on purpose, so that test and setup
//! scenarios can recreate the same identity; it is not a password KDF.
//! Mnemonic derivation is a placeholder that knows exactly one phrase.

use std::fmt;
use std::str::FromStr;

use base64::{
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
    Engine as _,
};
use sha2::{Digest, Sha256};

use super::keys::{BoxPublicKey, BoxSecretKey, KeyError, PublicKey, SecretKey};
use super::secret::Secret;

pub const SEED_SIZE: usize = 32;
/// SHA-256 rounds applied to a passphrase
pub const PASSPHRASE_ROUNDS: usize = 100;

const TEST_MNEMONIC: &str = "coral maze mimic half fat breeze thought champion couple muscle snack heavy gloom orchard tooth alert cram often ask hockey inform broken school cotton";
const TEST_MNEMONIC_SEED: &[u8; SEED_SIZE] = b"01234567890123456789012345678901";

/// Where a fresh [`KeyMaterial`] comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    Seed([u8; SEED_SIZE]),
    Passphrase(String),
    Mnemonic(String),
    Random,
}

/// Algorithm tag in front of an exported key string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTag {
    Seed,
    Public,
    Private,
    Signing,
    Verify,
}

impl ExportTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportTag::Seed => "NACL SEED",
            ExportTag::Public => "NACL PUBLIC",
            ExportTag::Private => "NACL PRIVATE",
            ExportTag::Signing => "NACL SIGNING",
            ExportTag::Verify => "NACL VERIFY",
        }
    }

    fn export(&self, bytes: &[u8]) -> String {
        format!("{}:{}", self.as_str(), URL_SAFE.encode(bytes))
    }
}

impl FromStr for ExportTag {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NACL SEED" => Ok(ExportTag::Seed),
            "NACL PUBLIC" => Ok(ExportTag::Public),
            "NACL PRIVATE" => Ok(ExportTag::Private),
            "NACL SIGNING" => Ok(ExportTag::Signing),
            "NACL VERIFY" => Ok(ExportTag::Verify),
            other => Err(KeyError::ToBeImplemented(format!(
                "unsupported key export tag {other}"
            ))),
        }
    }
}

fn decode_b64(encoded: &str) -> Result<Vec<u8>, KeyError> {
    URL_SAFE
        .decode(encoded)
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
        .map_err(|e| KeyError::Coding(format!("key base64 decode error: {e}")))
}

/// Signing and encryption key pairs, any half of which may be absent
#[derive(Clone, Default)]
pub struct KeyMaterial {
    seed: Option<[u8; SEED_SIZE]>,
    signing_public: Option<PublicKey>,
    signing_secret: Option<SecretKey>,
    box_public: Option<BoxPublicKey>,
    box_secret: Option<BoxSecretKey>,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("fingerprint", &self.fingerprint())
            .field("public", &self.box_export())
            .field("private", &self.has_private())
            .finish()
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
            && self.signing_public == other.signing_public
            && self.box_public == other.box_public
    }
}

impl KeyMaterial {
    pub fn derive(source: KeySource) -> Result<Self, KeyError> {
        match source {
            KeySource::Seed(seed) => Ok(Self::from_seed(seed)),
            KeySource::Passphrase(passphrase) => {
                Ok(Self::from_seed(Self::passphrase_seed(&passphrase)))
            }
            KeySource::Mnemonic(mnemonic) => Self::mnemonic_seed(&mnemonic).map(Self::from_seed),
            KeySource::Random => Ok(Self::generate()),
        }
    }

    /// Both key pairs from one seed
    pub fn from_seed(seed: [u8; SEED_SIZE]) -> Self {
        let signing_secret = SecretKey::from(seed);
        let box_secret = BoxSecretKey::from_seed(&seed);
        Self {
            seed: Some(seed),
            signing_public: Some(signing_secret.public()),
            signing_secret: Some(signing_secret),
            box_public: Some(box_secret.public()),
            box_secret: Some(box_secret),
        }
    }

    pub fn generate() -> Self {
        let mut seed = [0u8; SEED_SIZE];
        getrandom::getrandom(&mut seed).expect("failed to generate random bytes");
        Self::from_seed(seed)
    }

    pub fn passphrase_seed(passphrase: &str) -> [u8; SEED_SIZE] {
        let mut seed: [u8; SEED_SIZE] = Sha256::digest(passphrase.as_bytes()).into();
        for _ in 1..PASSPHRASE_ROUNDS {
            seed = Sha256::digest(seed).into();
        }
        seed
    }

    /// Placeholder: only the single fixed test phrase is understood
    pub fn mnemonic_seed(mnemonic: &str) -> Result<[u8; SEED_SIZE], KeyError> {
        if mnemonic.trim() == TEST_MNEMONIC {
            Ok(*TEST_MNEMONIC_SEED)
        } else {
            Err(KeyError::ToBeImplemented(
                "mnemonic to seed derivation".to_string(),
            ))
        }
    }

    /// Parse one exported key string
    pub fn import(tagged: &str) -> Result<Self, KeyError> {
        let mut keys = Self::default();
        keys.import_into(tagged)?;
        Ok(keys)
    }

    /// Parse several exported key strings into one key material
    pub fn import_all<I, S>(tagged: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = Self::default();
        for t in tagged {
            keys.import_into(t.as_ref())?;
        }
        Ok(keys)
    }

    fn import_into(&mut self, tagged: &str) -> Result<(), KeyError> {
        let (tag, encoded) = tagged
            .split_once(':')
            .ok_or_else(|| KeyError::Coding(format!("key string without a tag: {tagged}")))?;
        let bytes = decode_b64(encoded)?;
        match tag.parse::<ExportTag>()? {
            ExportTag::Seed => {
                let seed: [u8; SEED_SIZE] = bytes.as_slice().try_into().map_err(|_| {
                    KeyError::Coding(format!("seed must be {SEED_SIZE} bytes"))
                })?;
                *self = Self::from_seed(seed);
            }
            ExportTag::Public => self.box_public = Some(BoxPublicKey::try_from(bytes.as_slice())?),
            ExportTag::Verify => self.signing_public = Some(PublicKey::try_from(bytes.as_slice())?),
            ExportTag::Private | ExportTag::Signing => {
                return Err(KeyError::ToBeImplemented(format!(
                    "importing {} keys",
                    tag
                )));
            }
        }
        Ok(())
    }

    /// `NACL VERIFY:` export of the signing key
    pub fn verify_export(&self) -> Option<String> {
        self.signing_public
            .map(|k| ExportTag::Verify.export(&k.to_bytes()))
    }

    /// `NACL PUBLIC:` export of the encryption key
    pub fn box_export(&self) -> Option<String> {
        self.box_public.map(|k| ExportTag::Public.export(&k.to_bytes()))
    }

    /// Every public half this material holds, encryption key first
    pub fn export_public(&self) -> Vec<String> {
        self.box_export()
            .into_iter()
            .chain(self.verify_export())
            .collect()
    }

    /// `NACL SEED:` export; only seeded material can be exported privately
    pub fn export_private(&self) -> Result<String, KeyError> {
        match &self.seed {
            Some(seed) => Ok(ExportTag::Seed.export(seed)),
            None => Err(KeyError::ToBeImplemented(
                "private export of key material without a seed".to_string(),
            )),
        }
    }

    pub fn seed(&self) -> Option<&[u8; SEED_SIZE]> {
        self.seed.as_ref()
    }

    pub fn has_private(&self) -> bool {
        self.signing_secret.is_some() || self.box_secret.is_some()
    }

    pub fn has_signing(&self) -> bool {
        self.signing_public.is_some()
    }

    pub fn has_encryption(&self) -> bool {
        self.box_public.is_some()
    }

    pub fn verify_key(&self) -> Option<&PublicKey> {
        self.signing_public.as_ref()
    }

    /// Hex of the signing public key, for display
    pub fn fingerprint(&self) -> Option<String> {
        self.signing_public.map(|k| k.to_hex())
    }

    /// The same keys with every private half dropped
    pub fn public_only(&self) -> Self {
        Self {
            seed: None,
            signing_public: self.signing_public,
            signing_secret: None,
            box_public: self.box_public,
            box_secret: None,
        }
    }

    /// Sign `message`, returning the url-safe base64 signature
    pub fn sign(&self, message: &[u8]) -> Result<String, KeyError> {
        let secret = self.signing_secret.as_ref().ok_or_else(|| {
            KeyError::Encryption("signing requires a private signing key".to_string())
        })?;
        Ok(URL_SAFE.encode(secret.sign(message).to_bytes()))
    }

    /// Check a url-safe base64 signature over `message`.
    ///
    /// A well formed signature that does not match returns `Ok(false)`;
    /// a missing verify key or an unparseable signature is an error.
    pub fn verify(&self, message: &[u8], signature: &str) -> Result<bool, KeyError> {
        let key = self
            .signing_public
            .as_ref()
            .ok_or_else(|| KeyError::Signing("no verify key to check against".to_string()))?;
        let bytes = decode_b64(signature).map_err(|e| KeyError::Signing(e.to_string()))?;
        let signature = ed25519_dalek::Signature::from_slice(&bytes)
            .map_err(|_| KeyError::Signing("malformed signature".to_string()))?;
        Ok(key.verify(message, &signature).is_ok())
    }

    /// Authenticated encryption of `data` to this (recipient) material.
    ///
    /// The scheme binds the sender, so a sender holding a private
    /// encryption key is required.
    pub fn encrypt(&self, data: &[u8], sender: Option<&KeyMaterial>) -> Result<Vec<u8>, KeyError> {
        let sender = sender.ok_or_else(|| {
            KeyError::Coding("asymmetric encryption requires a sender".to_string())
        })?;
        let sender_secret = sender.box_secret.as_ref().ok_or_else(|| {
            KeyError::Encryption("sender has no private encryption key".to_string())
        })?;
        let recipient = self.box_public.as_ref().ok_or_else(|| {
            KeyError::Encryption("recipient has no public encryption key".to_string())
        })?;
        sender_secret.seal(recipient, data)
    }

    /// Open data that `sender` encrypted to this material
    pub fn decrypt(&self, data: &[u8], sender: &KeyMaterial) -> Result<Vec<u8>, KeyError> {
        if data.is_empty() {
            return Err(KeyError::Coding("nothing to decrypt".to_string()));
        }
        let secret = self.box_secret.as_ref().ok_or_else(|| {
            KeyError::Encryption("decryption requires a private encryption key".to_string())
        })?;
        let sender_public = sender.box_public.as_ref().ok_or_else(|| {
            KeyError::Encryption("sender has no public encryption key".to_string())
        })?;
        secret.open(sender_public, data)
    }

    pub fn symmetric_encrypt(data: &[u8], key: &Secret) -> Result<Vec<u8>, KeyError> {
        key.encrypt(data)
            .map_err(|e| KeyError::Encryption(e.to_string()))
    }

    pub fn symmetric_decrypt(data: &[u8], key: &Secret) -> Result<Vec<u8>, KeyError> {
        key.decrypt(data)
            .map_err(|e| KeyError::DecryptionFail(e.to_string()))
    }

    /// Encode the seed in PEM format for secure storage
    pub fn to_pem(&self) -> Result<String, KeyError> {
        let seed = self.seed.as_ref().ok_or_else(|| {
            KeyError::ToBeImplemented("pem export of key material without a seed".to_string())
        })?;
        Ok(pem::encode(&pem::Pem::new("PRIVATE KEY", seed.to_vec())))
    }

    /// Parse seeded key material from PEM format
    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str).map_err(|e| anyhow::anyhow!("failed to parse PEM: {}", e))?;

        if pem.tag() != "PRIVATE KEY" {
            return Err(anyhow::anyhow!("invalid PEM tag, expected PRIVATE KEY").into());
        }

        let seed: [u8; SEED_SIZE] = pem.contents().try_into().map_err(|_| {
            anyhow::anyhow!(
                "invalid seed size in PEM, expected {}, got {}",
                SEED_SIZE,
                pem.contents().len()
            )
        })?;
        Ok(Self::from_seed(seed))
    }
}
