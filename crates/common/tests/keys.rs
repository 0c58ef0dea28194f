//! Key derivation and export

use common::crypto::{KeyMaterial, KeySource};
use common::error::Error;

#[test]
fn test_passphrase_determinism() {
    let derive = || KeyMaterial::derive(KeySource::Passphrase("All knowledge is power".into())).unwrap();
    let (a, b) = (derive(), derive());
    assert_eq!(a.export_public(), b.export_public());
    assert_eq!(a.export_private().unwrap(), b.export_private().unwrap());

    let other = KeyMaterial::derive(KeySource::Passphrase("All knowledge is power!".into())).unwrap();
    assert_ne!(a.export_public(), other.export_public());
}

#[test]
fn test_public_import_cannot_sign() {
    let keys = KeyMaterial::generate();
    let public = KeyMaterial::import_all(keys.export_public()).unwrap();
    assert!(!public.has_private());
    assert!(public.has_signing() && public.has_encryption());

    let signature = keys.sign(b"message").unwrap();
    assert!(public.verify(b"message", &signature).unwrap());
    assert!(matches!(
        Error::from(public.sign(b"message").unwrap_err()),
        Error::Encryption(_)
    ));
}

#[test]
fn test_unsupported_imports() {
    for tagged in ["NACL PRIVATE:AAAA", "NACL SIGNING:AAAA", "PGP KEY:AAAA"] {
        assert!(matches!(
            KeyMaterial::import(tagged).map_err(Error::from),
            Err(Error::ToBeImplemented(_))
        ));
    }
}
