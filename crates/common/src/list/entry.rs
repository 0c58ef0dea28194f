use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::KeyMaterial;
use crate::error::Result;
use crate::object::Object;
use crate::store::Locators;
use crate::timestamp;

/// One signed reference in a list's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEntry {
    #[serde(with = "crate::timestamp::iso8601")]
    pub date: DateTime<Utc>,
    /// What the entry points at
    pub locators: Locators,
    pub signature: String,
    /// Public identity of the signer
    pub signed_by: Locators,
    /// Fetched target, cached after the first fetch
    #[serde(skip)]
    pub content: Option<Box<Object>>,
}

impl SignedEntry {
    /// Sign a reference to `locators` now
    pub fn sign(keys: &KeyMaterial, signed_by: &Locators, locators: Locators) -> Result<Self> {
        let date = timestamp::now();
        let signature = keys.sign(signable(&date, &locators).as_bytes())?;
        Ok(Self {
            date,
            locators,
            signature,
            signed_by: signed_by.clone(),
            content: None,
        })
    }

    /// The exact string the signature covers
    pub fn signable(&self) -> String {
        signable(&self.date, &self.locators)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

fn signable(date: &DateTime<Utc>, locators: &Locators) -> String {
    format!("{} {}", timestamp::iso(date), locators.joined())
}

/// Keep the first entry for each distinct locator set
pub fn filter_unique(entries: &[SignedEntry]) -> Vec<SignedEntry> {
    let mut seen: Vec<&Locators> = Vec::new();
    let mut unique = Vec::new();
    for entry in entries {
        if seen.contains(&&entry.locators) {
            continue;
        }
        seen.push(&entry.locators);
        unique.push(entry.clone());
    }
    unique
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_signature_covers_date_and_locators() {
        let keys = KeyMaterial::generate();
        let entry = SignedEntry::sign(&keys, &Locators::from("me"), Locators::from("a")).unwrap();
        assert!(keys.verify(entry.signable().as_bytes(), &entry.signature).unwrap());

        let mut moved = entry.clone();
        moved.locators = Locators::from("b");
        assert!(!keys.verify(moved.signable().as_bytes(), &moved.signature).unwrap());
    }

    #[test]
    fn test_json_skips_content() {
        let keys = KeyMaterial::generate();
        let entry = SignedEntry::sign(&keys, &Locators::from("me"), Locators::from("a")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&entry.to_json().unwrap()).unwrap();
        assert!(value.get("content").is_none());
        assert!(value["date"].as_str().unwrap().ends_with('Z'));

        let back = SignedEntry::from_json(&entry.to_json().unwrap()).unwrap();
        assert_eq!(back.date, entry.date);
    }

    #[test]
    fn test_filter_unique_keeps_first() {
        let keys = KeyMaterial::generate();
        let me = Locators::from("me");
        let a1 = SignedEntry::sign(&keys, &me, Locators::from("a")).unwrap();
        let b = SignedEntry::sign(&keys, &me, Locators::from("b")).unwrap();
        let a2 = SignedEntry::sign(&keys, &me, Locators::from("a")).unwrap();
        let unique = filter_unique(&[a1.clone(), b, a2]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].signature, a1.signature);
    }

    #[test]
    fn test_filter_unique_keeps_overlapping_sets() {
        let keys = KeyMaterial::generate();
        let me = Locators::from("me");
        let ab = Locators::from(vec!["a".to_string(), "b".to_string()]);
        let bc = Locators::from(vec!["b".to_string(), "c".to_string()]);
        let first = SignedEntry::sign(&keys, &me, ab.clone()).unwrap();
        let second = SignedEntry::sign(&keys, &me, bc).unwrap();
        let again = SignedEntry::sign(&keys, &me, ab).unwrap();
        let unique = filter_unique(&[first.clone(), second.clone(), again]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].signature, first.signature);
        assert_eq!(unique[1].signature, second.signature);
    }
}
