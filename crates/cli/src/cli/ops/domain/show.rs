use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Show {
    /// Locators of the domain to list
    #[arg(required = true, value_delimiter = ',')]
    pub domain: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error(transparent)]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Naming(#[from] common::error::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Show {
    type Error = ShowError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_state, session, _keychain) = ctx.session().await?;
        let domain = super::fetch_domain(&session, &self.domain).await?;
        Ok(domain.printable(&session, 0).await?.trim_end().to_string())
    }
}
