pub mod domain;
pub mod get;
pub mod init;
pub mod keys;
pub mod put;
pub mod resolve;
pub mod version;

pub use domain::Domain;
pub use get::Get;
pub use init::Init;
pub use keys::Keys;
pub use put::Put;
pub use resolve::Resolve;
pub use version::Version;

use common::prelude::{Error, Object, Projection};

/// Public record of `obj`, pretty printed
pub(crate) fn render(obj: &Object) -> Result<String, Error> {
    let record = obj.to_record(Projection::Public, false)?;
    Ok(serde_json::to_string_pretty(&record)?)
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::*;
    use crate::cli::op::{Op, OpContext};

    fn ctx_in(tmp: &tempfile::TempDir) -> OpContext {
        OpContext::new(Some(tmp.path().join("state")))
    }

    fn write_json(tmp: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = tmp.path().join("doc.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx_in(&tmp);
        Init.execute(&ctx).await.unwrap();

        let file = write_json(&tmp, r#"{"title": "hello", "n": 3}"#);
        let locators = Put { file, private: false }.execute(&ctx).await.unwrap();

        let out = Get {
            locators: locators.split(',').map(str::to_string).collect(),
        }
        .execute(&ctx)
        .await
        .unwrap();
        assert!(out.contains("\"title\": \"hello\""));
    }

    #[tokio::test]
    async fn test_private_put_reads_back_when_logged_in() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx_in(&tmp);
        Init.execute(&ctx).await.unwrap();

        let file = write_json(&tmp, r#"{"secret": "plans"}"#);
        let locators = Put { file, private: true }.execute(&ctx).await.unwrap();

        let out = Get {
            locators: locators.split(',').map(str::to_string).collect(),
        }
        .execute(&ctx)
        .await
        .unwrap();
        assert!(out.contains("plans"));
    }

    #[tokio::test]
    async fn test_put_rejects_non_object() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx_in(&tmp);
        Init.execute(&ctx).await.unwrap();

        let file = write_json(&tmp, "[1, 2, 3]");
        let err = Put { file, private: false }.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, put::PutError::NotAnObject));
    }

    #[tokio::test]
    async fn test_ops_need_init() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx_in(&tmp);
        let err = Get {
            locators: vec!["fs:/hash/00".to_string()],
        }
        .execute(&ctx)
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            get::GetError::State(crate::state::StateError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_domain_register_and_resolve() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx_in(&tmp);
        Init.execute(&ctx).await.unwrap();

        let created = domain::create::Create {
            name: "home".to_string(),
            root: true,
        }
        .execute(&ctx)
        .await
        .unwrap();
        let master = created
            .lines()
            .find_map(|l| l.strip_prefix(" - master: "))
            .unwrap()
            .split(',')
            .map(str::to_string)
            .collect::<Vec<_>>();

        let file = write_json(&tmp, r#"{"body": "welcome"}"#);
        let target = Put { file, private: false }.execute(&ctx).await.unwrap();
        domain::register::Register {
            domain: master.clone(),
            name: "readme".to_string(),
            target: target.split(',').map(str::to_string).collect(),
        }
        .execute(&ctx)
        .await
        .unwrap();

        let listing = domain::show::Show { domain: master }
            .execute(&ctx)
            .await
            .unwrap();
        assert!(listing.contains("readme"));

        let leaf = Resolve {
            path: "dweb:/readme".to_string(),
            root: None,
        }
        .execute(&ctx)
        .await
        .unwrap();
        assert!(leaf.contains("\"type_tag\": \"leaf\""));

        let missing = Resolve {
            path: "nope".to_string(),
            root: None,
        }
        .execute(&ctx)
        .await
        .unwrap_err();
        assert!(matches!(missing, resolve::ResolveError::NotFound(p) if p == "nope"));
    }
}
