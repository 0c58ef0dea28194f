//! Storing and fetching plain and keyed objects

mod common;

use ::common::prelude::*;
use ::common::store::BackendError;
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_dict_round_trip() {
    let (session, _) = common::setup_session();
    let mut dict = Dict::new().with("title", "hello").with("count", 3);
    let locators = dict.store(&session).await.unwrap();

    let Object::Dict(fetched) = Object::fetch(&session, &locators).await.unwrap() else {
        panic!("expected a dict");
    };
    assert_eq!(fetched.get("title"), Some(&json!("hello")));
    assert_eq!(fetched.get("count"), Some(&json!(3)));
    assert_eq!(fetched.locators(), &locators);
}

#[tokio::test]
async fn test_round_trip_through_filesystem() {
    let dir = TempDir::new().unwrap();
    let backend = FsBackend::open(dir.path()).await.unwrap();
    let session = Session::new(std::sync::Arc::new(backend));

    let mut dict = Dict::new().with("path", "/tmp");
    let locators = dict.store(&session).await.unwrap();
    let fetched = Object::fetch(&session, &locators).await.unwrap();
    assert_eq!(fetched.type_tag(), TypeTag::Dict);
}

#[tokio::test]
async fn test_storing_again_is_a_no_op_until_dirty() {
    let (session, _) = common::setup_session();
    let mut dict = Dict::new().with("a", 1);
    let first = dict.store(&session).await.unwrap();
    assert_eq!(dict.store(&session).await.unwrap(), first);

    dict.set("a", 2);
    assert!(!dict.is_stored());
    assert_ne!(dict.store(&session).await.unwrap(), first);
}

#[tokio::test]
async fn test_master_without_access_control_is_refused() {
    let (session, backend) = common::setup_session();
    let mut kp = KeyPairObject::new(KeyMaterial::generate());
    assert!(matches!(
        kp.store(&session).await,
        Err(Error::SecurityWarning(_))
    ));
    // nothing reached the backend
    assert!(format!("{backend:?}").contains("blobs: 0"));
}

#[tokio::test]
async fn test_public_projection_carries_no_secrets() {
    let session = common::unsafe_session();
    let mut kp = KeyPairObject::new(KeyMaterial::generate()).with_name("me");
    kp.store(&session).await.unwrap();
    assert_ne!(kp.public_locators(), kp.locators());

    let public = Object::fetch(&session, kp.public_locators()).await.unwrap();
    assert!(!public.is_master());
    assert_eq!(public.keys().unwrap(), &kp.keys().public_only());

    let master = Object::fetch(&session, kp.locators()).await.unwrap();
    assert!(master.is_master());
    assert_eq!(master.public_locators(), kp.public_locators());
    assert_eq!(master.name(), Some("me"));
}

#[tokio::test]
async fn test_unknown_and_forbidden_tags() {
    let (session, _) = common::setup_session();
    let backend = session.backend();

    let unknown = backend
        .raw_store(serde_json::to_vec(&json!({"type_tag": "spaceship"})).unwrap())
        .await
        .unwrap();
    assert!(matches!(
        Object::fetch(&session, &unknown).await,
        Err(Error::ToBeImplemented(_))
    ));

    let forbidden = backend
        .raw_store(serde_json::to_vec(&json!({"type_tag": "session"})).unwrap())
        .await
        .unwrap();
    assert!(matches!(
        Object::fetch(&session, &forbidden).await,
        Err(Error::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_fetch_missing() {
    let (session, _) = common::setup_session();
    assert!(matches!(
        Object::fetch(&session, &Locators::from("mem:/hash/nothing")).await,
        Err(Error::Backend(BackendError::NotFound(_)))
    ));
}
