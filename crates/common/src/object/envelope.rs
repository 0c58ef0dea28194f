use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TypeTag;
use crate::crypto::{KeyMaterial, Secret};
use crate::error::{Error, Result};
use crate::store::Locators;

/// What an object is encrypted with when it is stored
#[derive(Debug, Clone)]
pub enum AccessControl {
    /// Sealed with an access control list's access key
    List { public: Locators, access_key: Secret },
    /// Sealed to a key chain's own encryption key
    KeyChain { public: Locators, keys: KeyMaterial },
}

impl AccessControl {
    /// Public identity written into the envelope
    pub fn reference(&self) -> &Locators {
        match self {
            AccessControl::List { public, .. } => public,
            AccessControl::KeyChain { public, .. } => public,
        }
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            AccessControl::List { access_key, .. } => {
                Ok(KeyMaterial::symmetric_encrypt(data, access_key)?)
            }
            AccessControl::KeyChain { keys, .. } => Ok(keys.encrypt(data, Some(keys))?),
        }
    }
}

/// An encrypted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub type_tag: String,
    /// url-safe base64 ciphertext
    pub encrypted: String,
    pub access_control_ref: Locators,
}

impl Envelope {
    pub fn seal(access_control: &AccessControl, tag: TypeTag, record: &Value) -> Result<Self> {
        if access_control.reference().is_empty() {
            return Err(Error::Coding(
                "access control must be stored before it can seal records".to_string(),
            ));
        }
        let ciphertext = access_control.encrypt(&serde_json::to_vec(record)?)?;
        Ok(Self {
            type_tag: tag.as_str().to_string(),
            encrypted: URL_SAFE.encode(ciphertext),
            access_control_ref: access_control.reference().clone(),
        })
    }

    /// Recognise an envelope among decoded records
    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;
        if !fields.contains_key("encrypted") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn ciphertext(&self) -> Result<Vec<u8>> {
        URL_SAFE
            .decode(&self.encrypted)
            .map_err(|e| Error::Coding(format!("envelope ciphertext is not base64: {e}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seal_with_access_key() {
        let access_key = Secret::generate();
        let access_control = AccessControl::List {
            public: Locators::from("mem:/hash/acl"),
            access_key: access_key.clone(),
        };
        let record = serde_json::json!({"type_tag": "sd", "a": 1});
        let envelope = Envelope::seal(&access_control, TypeTag::Dict, &record).unwrap();

        let value = envelope.to_value().unwrap();
        assert!(value.get("a").is_none());
        let recovered = Envelope::from_value(&value).unwrap();
        assert_eq!(recovered, envelope);

        let plain = access_key.decrypt(&recovered.ciphertext().unwrap()).unwrap();
        let plain: Value = serde_json::from_slice(&plain).unwrap();
        assert_eq!(plain, record);
    }

    #[test]
    fn test_unstored_access_control_cannot_seal() {
        let access_control = AccessControl::List {
            public: Locators::new(),
            access_key: Secret::generate(),
        };
        let record = serde_json::json!({"a": 1});
        assert!(matches!(
            Envelope::seal(&access_control, TypeTag::Dict, &record),
            Err(Error::Coding(_))
        ));
    }

    #[test]
    fn test_plain_record_is_not_an_envelope() {
        assert!(Envelope::from_value(&serde_json::json!({"type_tag": "sd"})).is_none());
    }
}
