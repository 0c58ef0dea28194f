use clap::Args;

use common::prelude::{Locators, Object};

#[derive(Args, Debug, Clone)]
pub struct Register {
    /// Master locators of the domain to register in
    #[arg(long, required = true, value_delimiter = ',')]
    pub domain: Vec<String>,

    /// Name to register
    pub name: String,

    /// Locators of the object the name points at
    #[arg(required = true, value_delimiter = ',')]
    pub target: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Naming(#[from] common::error::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Register {
    type Error = RegisterError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_state, session, _keychain) = ctx.session().await?;
        let domain = super::fetch_domain(&session, &self.domain).await?;
        let target = Object::fetch(&session, &Locators::from(self.target.clone())).await?;
        let registered = domain.register(&session, &self.name, target).await?;
        Ok(format!(
            "registered {} as a {}",
            self.name,
            registered.type_tag()
        ))
    }
}
