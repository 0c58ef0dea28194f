use clap::Args;

use common::prelude::{Locators, Object};

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Locators of the object (any one is enough)
    #[arg(required = true, value_delimiter = ',')]
    pub locators: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error(transparent)]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Object(#[from] common::error::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = GetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_state, session, _keychain) = ctx.session().await?;
        let locators = Locators::from(self.locators.clone());
        let obj = Object::fetch(&session, &locators).await?;
        Ok(super::render(&obj)?)
    }
}
