//! Multi-source reads of key value tables

mod common;

use ::common::prelude::*;
use ::common::timestamp;
use chrono::Duration;
use serde_json::{json, Map};

/// A table written by its own master
async fn source(session: &Session) -> KeyValueTable {
    KeyValueTable::create(session, KeyMaterial::generate(), TableOptions::default())
        .await
        .unwrap()
}

fn leaf_signed_at(target: &str, keys: &KeyMaterial, date: chrono::DateTime<chrono::Utc>) -> Leaf {
    let mut leaf = Leaf::new(Locators::from(target));
    leaf.set_name("k");
    leaf.sign_at(keys, date).unwrap();
    leaf
}

/// A read-only view over several sources, queried in the given order
fn view_over(sources: &[&KeyValueTable]) -> KeyValueTable {
    let public: Vec<String> = sources
        .iter()
        .flat_map(|t| t.table_public_locators().to_vec())
        .collect();
    let mut fields = Map::new();
    fields.insert("tablepublicurls".to_string(), json!(public));
    KeyValueTable::from_fields(fields, Locators::new()).unwrap()
}

fn target_of(value: Option<TableValue>) -> String {
    match value.and_then(|v| v.as_object().cloned()) {
        Some(Object::Leaf(leaf)) => leaf.targets()[0].clone(),
        other => panic!("expected a leaf, got {other:?}"),
    }
}

#[tokio::test]
async fn test_latest_signature_wins_in_any_order() {
    let session = common::unsafe_session();
    let signer = KeyMaterial::generate();
    let t1 = timestamp::now();
    let t2 = t1 + Duration::seconds(5);

    let older = source(&session).await;
    let newer = source(&session).await;
    older
        .set(&session, "k", Object::from(leaf_signed_at("old", &signer, t1)), SetOptions::public_only())
        .await
        .unwrap();
    newer
        .set(&session, "k", Object::from(leaf_signed_at("new", &signer, t2)), SetOptions::public_only())
        .await
        .unwrap();

    let forward = view_over(&[&older, &newer]);
    assert_eq!(target_of(forward.get_merge(&session, "k").await.unwrap()), "new");
    let backward = view_over(&[&newer, &older]);
    assert_eq!(target_of(backward.get_merge(&session, "k").await.unwrap()), "new");
}

#[tokio::test]
async fn test_tie_keeps_first_source() {
    let session = common::unsafe_session();
    let signer = KeyMaterial::generate();
    let date = timestamp::now();

    let first = source(&session).await;
    let second = source(&session).await;
    first
        .set(&session, "k", Object::from(leaf_signed_at("first", &signer, date)), SetOptions::public_only())
        .await
        .unwrap();
    second
        .set(&session, "k", Object::from(leaf_signed_at("second", &signer, date)), SetOptions::public_only())
        .await
        .unwrap();

    let view = view_over(&[&first, &second]);
    assert_eq!(target_of(view.get_merge(&session, "k").await.unwrap()), "first");
}

#[tokio::test]
async fn test_failed_source_is_skipped() {
    let session = common::unsafe_session();
    let signer = KeyMaterial::generate();
    let good = source(&session).await;
    good.set(
        &session,
        "k",
        Object::from(leaf_signed_at("good", &signer, timestamp::now())),
        SetOptions::public_only(),
    )
    .await
    .unwrap();

    let mut fields = Map::new();
    let mut public = vec!["mem:/table/00000000-0000-0000-0000-000000000000".to_string()];
    public.extend(good.table_public_locators().to_vec());
    fields.insert("tablepublicurls".to_string(), json!(public));
    let view = KeyValueTable::from_fields(fields, Locators::new()).unwrap();

    assert_eq!(target_of(view.get_merge(&session, "k").await.unwrap()), "good");
    assert!(view.get_merge(&session, "absent").await.unwrap().is_none());
}

#[tokio::test]
async fn test_winner_is_cached_not_written_back() {
    let session = common::unsafe_session();
    let signer = KeyMaterial::generate();
    let t1 = timestamp::now();
    let older = source(&session).await;
    let newer = source(&session).await;
    older
        .set(&session, "k", Object::from(leaf_signed_at("old", &signer, t1)), SetOptions::public_only())
        .await
        .unwrap();
    newer
        .set(
            &session,
            "k",
            Object::from(leaf_signed_at("new", &signer, t1 + Duration::seconds(1))),
            SetOptions::public_only(),
        )
        .await
        .unwrap();

    let view = view_over(&[&older, &newer]);
    view.get_merge(&session, "k").await.unwrap();
    assert_eq!(target_of(view.cached("k")), "new");

    let stale = view_over(&[&older]);
    assert_eq!(target_of(stale.get_merge(&session, "k").await.unwrap()), "old");
}

#[tokio::test]
async fn test_plain_values_and_keys() {
    let session = common::unsafe_session();
    let table = source(&session).await;
    table.set(&session, "a", json!(1), SetOptions::default()).await.unwrap();
    table.set(&session, "b", json!({"x": true}), SetOptions::default()).await.unwrap();

    let view = view_over(&[&table]);
    let mut keys = view.keys(&session).await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(view.get_all(&session).await.unwrap().len(), 2);
}
