//! Domain registration and path resolution

mod common;

use std::sync::Arc;

use ::common::prelude::*;

async fn domain(session: &Session, name: &str) -> Domain {
    Domain::create(session, name, KeyMaterial::generate(), TableOptions::default())
        .await
        .unwrap()
}

fn leaf_target(found: Option<Object>) -> Locators {
    match found {
        Some(Object::Leaf(leaf)) => leaf.targets().clone(),
        other => panic!("expected a leaf, got {other:?}"),
    }
}

/// root: a -> (leaf at domain a), a: b -> Y
async fn two_level_tree(session: &Session) -> (Domain, Domain) {
    let root = domain(session, "root").await;
    let a = domain(session, "a").await;
    let pointer = Leaf::pointing_at(&Object::from(a.clone())).unwrap();
    root.register(session, "a", pointer).await.unwrap();
    a.register(session, "b", Leaf::new(Locators::from("Y")))
        .await
        .unwrap();
    (root, a)
}

#[tokio::test]
async fn test_resolve_through_a_pointer_leaf() {
    let session = common::unsafe_session();
    let (root, _) = two_level_tree(&session).await;

    let (found, rest) = root.resolve(&session, "a/b").await.unwrap();
    assert_eq!(leaf_target(found), Locators::from("Y"));
    assert!(rest.is_none());
}

#[tokio::test]
async fn test_missing_name_is_not_an_error() {
    let session = common::unsafe_session();
    let (root, _) = two_level_tree(&session).await;

    let (found, rest) = root.resolve(&session, "a/bogus").await.unwrap();
    assert!(found.is_none());
    assert_eq!(rest.as_deref(), Some("a/bogus"));

    let (found, rest) = root.resolve(&session, "nothing").await.unwrap();
    assert!(found.is_none());
    assert_eq!(rest.as_deref(), Some("nothing"));
}

#[tokio::test]
async fn test_resolve_through_registered_domain() {
    let session = common::unsafe_session();
    let root = domain(&session, "root").await;
    let sub = domain(&session, "sub").await;
    sub.register(&session, "leaf", Leaf::new(Locators::from("Z")))
        .await
        .unwrap();
    root.register(&session, "sub", sub).await.unwrap();

    let (found, rest) = root.resolve(&session, "sub/leaf").await.unwrap();
    assert_eq!(leaf_target(found), Locators::from("Z"));
    assert!(rest.is_none());

    // a reader only has the published records
    let Object::Domain(public_root) = Object::fetch(&session, root.public_locators()).await.unwrap()
    else {
        panic!("expected a domain");
    };
    let (found, _) = public_root.resolve(&session, "sub/leaf").await.unwrap();
    assert_eq!(leaf_target(found), Locators::from("Z"));

    let (found, _) = public_root.resolve(&session, "sub").await.unwrap();
    let Some(Object::Domain(sub)) = found else {
        panic!("expected a domain");
    };
    assert!(!sub.is_master());
    assert_eq!(sub.name(), Some("sub"));
}

#[tokio::test]
async fn test_register_wraps_plain_objects() {
    let session = common::unsafe_session();
    let root = domain(&session, "root").await;
    let registered = root
        .register(&session, "doc", Dict::new().with("body", "text"))
        .await
        .unwrap();
    assert_eq!(registered.type_tag(), TypeTag::Leaf);

    let (found, _) = root.resolve(&session, "doc").await.unwrap();
    let targets = leaf_target(found);
    let Object::Dict(dict) = Object::fetch(&session, &targets).await.unwrap() else {
        panic!("expected a dict");
    };
    assert_eq!(dict.get("body").unwrap(), "text");
}

#[tokio::test]
async fn test_name_must_match_signature() {
    let session = common::unsafe_session();
    let root = domain(&session, "root").await;

    let mut impostor = Leaf::new(Locators::from("evil"));
    impostor.set_name("c");
    impostor.sign(root.keys()).unwrap();
    let impostor = Object::from(impostor);
    assert!(root.verify("c", &impostor));
    assert!(!root.verify("b", &impostor));

    root.table()
        .set(&session, "b", impostor, SetOptions::public_only())
        .await
        .unwrap();
    assert!(matches!(
        root.resolve(&session, "b").await,
        Err(Error::Signing(_))
    ));
}

#[tokio::test]
async fn test_unauthorized_signer_rejected() {
    let session = common::unsafe_session();
    let root = domain(&session, "root").await;

    let mut stray = Leaf::new(Locators::from("X"));
    stray.set_name("x");
    stray.sign(&KeyMaterial::generate()).unwrap();
    root.table()
        .set(&session, "x", Object::from(stray), SetOptions::public_only())
        .await
        .unwrap();
    assert!(matches!(
        root.resolve(&session, "x").await,
        Err(Error::Signing(_))
    ));
}

#[tokio::test]
async fn test_absolute_path_and_unsupported_leaf() {
    let session = common::unsafe_session();
    let root = domain(&session, "root").await;
    root.register(
        &session,
        "img",
        Leaf::new(Locators::from("X")).with_content_type("image/png"),
    )
    .await
    .unwrap();

    assert!(matches!(
        root.resolve(&session, "/img").await,
        Err(Error::Coding(_))
    ));
    assert!(matches!(
        root.resolve(&session, "img/more").await,
        Err(Error::Resolution(_))
    ));
}

#[tokio::test]
async fn test_root_resolve_and_name_hook() {
    let backend = Arc::new(MemoryBackend::new());
    let owner = Session::with_config(
        backend.clone(),
        Config {
            allow_unsafe_store: true,
            ..Default::default()
        },
    );
    let root = domain(&owner, "root").await;
    root.register(&owner, "doc", Dict::new().with("body", "named"))
        .await
        .unwrap();

    let reader = Session::with_config(
        backend.clone(),
        Config {
            root: root.public_locators().to_vec(),
            ..Default::default()
        },
    );
    let (found, rest) = reader.root_resolve("dweb:/doc").await.unwrap();
    assert!(matches!(found, Some(Object::Leaf(_))));
    assert!(rest.is_none());

    reader.install_name_resolver();
    let Object::Dict(dict) = Object::fetch(&reader, &Locators::from("dweb:/doc")).await.unwrap()
    else {
        panic!("expected a dict");
    };
    assert_eq!(dict.get("body").unwrap(), "named");
}

#[tokio::test]
async fn test_name_hook_maps_domain_to_its_table() {
    let backend = Arc::new(MemoryBackend::new());
    let owner = Session::with_config(
        backend.clone(),
        Config {
            allow_unsafe_store: true,
            ..Default::default()
        },
    );
    let root = domain(&owner, "root").await;
    let sub = domain(&owner, "sub").await;
    let sub_table = sub.table().table_public_locators().clone();
    root.register(&owner, "sub", sub).await.unwrap();

    let reader = Session::with_config(
        backend,
        Config {
            root: root.public_locators().to_vec(),
            ..Default::default()
        },
    );
    let names = ["dweb:/sub".to_string(), "mem:/hash/plain".to_string()];
    let resolved = reader.resolve_names(&names).await;
    let mut expected = sub_table.to_vec();
    expected.push("mem:/hash/plain".to_string());
    assert_eq!(resolved, expected);
}

#[tokio::test]
async fn test_printable_lists_names() {
    let session = common::unsafe_session();
    let (root, _) = two_level_tree(&session).await;
    let listing = root.printable(&session, 0).await.unwrap();
    assert!(listing.contains("a -> "));
}
