//! Shared setup for the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::prelude::*;

/// Log to the test writer; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A session over a fresh in-memory backend
pub fn setup_session() -> (Session, Arc<MemoryBackend>) {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    (Session::new(backend.clone()), backend)
}

/// A session that may store master records in the clear
pub fn unsafe_session() -> Session {
    init_tracing();
    let config = Config {
        allow_unsafe_store: true,
        ..Default::default()
    };
    Session::with_config(Arc::new(MemoryBackend::new()), config)
}

/// Another session on the same backend, nobody logged in
pub fn session_on(backend: &Arc<MemoryBackend>) -> Session {
    Session::new(backend.clone())
}

pub async fn login_keychain(session: &Session, passphrase: &str) -> KeyChain {
    KeyChain::create(session, passphrase, KeySource::Passphrase(passphrase.to_string()))
        .await
        .unwrap()
}

/// Add a fresh key pair to `chain` and return the stored copy
pub async fn add_key_pair(session: &Session, chain: &mut KeyChain, name: &str) -> KeyPairObject {
    let kp = KeyPairObject::new(KeyMaterial::generate()).with_name(name);
    let entry = chain.add(session, kp).await.unwrap();
    match *entry.content.unwrap() {
        Object::KeyPair(kp) => kp,
        other => panic!("expected a key pair, got {}", other.type_tag()),
    }
}

/// A stored key pair that is nobody's secret
pub async fn loose_key_pair(session: &Session) -> KeyPairObject {
    let mut kp = KeyPairObject::new(KeyMaterial::generate()).allow_unsafe_store();
    kp.store(session).await.unwrap();
    kp
}
