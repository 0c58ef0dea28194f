use std::path::PathBuf;

use clap::Args;
use serde_json::Value;

use common::prelude::{Dict, Locators, Object};

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// JSON file holding a single object
    pub file: PathBuf,

    /// Encrypt to the state key chain and record it there
    #[arg(long)]
    pub private: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error(transparent)]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Object(#[from] common::error::Error),
    #[error("could not read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object at the top level")]
    NotAnObject,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Put {
    type Error = PutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let raw = std::fs::read_to_string(&self.file)
            .map_err(|e| PutError::Read(self.file.clone(), e))?;
        let Value::Object(fields) = serde_json::from_str(&raw)? else {
            return Err(PutError::NotAnObject);
        };
        let (_state, session, mut keychain) = ctx.session().await?;

        let dict = Dict::from_fields(fields, Locators::new())?;
        let locators = if self.private {
            keychain.add(&session, dict).await?.locators
        } else {
            Object::from(dict).store(&session).await?
        };
        tracing::info!("put {}: {}", self.file.display(), locators.joined());
        Ok(locators.joined())
    }
}
