use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Resolve {
    /// Slash separated name, e.g. `docs/readme` or `dweb:/docs/readme`
    pub path: String,

    /// Start from this domain instead of the configured root
    #[arg(long, value_delimiter = ',')]
    pub root: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Naming(#[from] common::error::Error),
    #[error("nothing registered at {0}")]
    NotFound(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Resolve {
    type Error = ResolveError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_state, session, _keychain) = ctx.session().await?;
        let (found, remainder) = match &self.root {
            Some(root) => {
                let domain = super::domain::fetch_domain(&session, root).await?;
                let path = self.path.strip_prefix("dweb:").unwrap_or(&self.path);
                domain.resolve(&session, path.trim_start_matches('/')).await?
            }
            None => session.root_resolve(&self.path).await?,
        };
        let Some(found) = found else {
            return Err(ResolveError::NotFound(remainder.unwrap_or_else(|| self.path.clone())));
        };
        let mut out = super::render(&found)?;
        if let Some(rest) = remainder {
            out.push_str(&format!("\nremainder: {rest}"));
        }
        Ok(out)
    }
}
