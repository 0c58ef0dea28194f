use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::crypto::KeyMaterial;
use crate::error::{Error, Result};
use crate::object::{ContentAddressed, Fields};
use crate::timestamp;

/// One signature over an object's signed fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    #[serde(with = "crate::timestamp::iso8601")]
    pub date: DateTime<Utc>,
    pub signature: String,
    /// `NACL VERIFY:` export of the signer
    pub signed_by: String,
}

/// Objects that carry signatures over a declared subset of their fields
pub trait Signable: ContentAddressed {
    /// The fields a signature covers
    fn signed_fields(&self) -> Result<Fields>;
    fn signatures(&self) -> &[SignatureRecord];
    fn signatures_mut(&mut self) -> &mut Vec<SignatureRecord>;

    /// Canonical string signed at `date`
    fn signable(&self, date: &DateTime<Utc>) -> Result<String> {
        Ok(json!({
            "date": timestamp::iso(date),
            "signed": Value::Object(self.signed_fields()?),
        })
        .to_string())
    }

    fn sign_at(&mut self, keys: &KeyMaterial, date: DateTime<Utc>) -> Result<()> {
        let signed_by = keys
            .verify_export()
            .ok_or_else(|| Error::Signing("signing keys have no verify half".to_string()))?;
        let signature = keys.sign(self.signable(&date)?.as_bytes())?;
        self.signatures_mut().push(SignatureRecord {
            date,
            signature,
            signed_by,
        });
        self.mark_dirty();
        Ok(())
    }

    fn sign(&mut self, keys: &KeyMaterial) -> Result<()> {
        self.sign_at(keys, timestamp::now())
    }

    /// Exports of every signer whose signature still holds
    fn verified_signers(&self) -> Vec<String> {
        self.signatures()
            .iter()
            .filter(|sig| {
                let Ok(keys) = KeyMaterial::import(&sig.signed_by) else {
                    return false;
                };
                let Ok(signable) = self.signable(&sig.date) else {
                    return false;
                };
                keys.verify(signable.as_bytes(), &sig.signature)
                    .unwrap_or(false)
            })
            .map(|sig| sig.signed_by.clone())
            .collect()
    }

    /// True if any signer in `authorized` has a valid signature
    fn signed_by_any(&self, authorized: &[String]) -> bool {
        self.verified_signers()
            .iter()
            .any(|signer| authorized.contains(signer))
    }

    fn latest_signature_date(&self) -> Option<DateTime<Utc>> {
        self.signatures().iter().map(|sig| sig.date).max()
    }
}

pub trait Nameable {
    fn name(&self) -> Option<&str>;
    fn set_name(&mut self, name: &str);
    fn expires(&self) -> Option<DateTime<Utc>>;
    fn set_expires(&mut self, expires: Option<DateTime<Utc>>);

    fn is_expired(&self) -> bool {
        self.expires().map(|e| e <= Utc::now()).unwrap_or(false)
    }
}
