use clap::Args;

use common::naming::Domain;
use common::prelude::{KeyMaterial, Object, TableOptions};

#[derive(Args, Debug, Clone)]
pub struct Create {
    /// Name of the new domain
    pub name: String,

    /// Make the new domain the root that `dweb resolve` starts from
    #[arg(long)]
    pub root: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error(transparent)]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Domain(#[from] common::error::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Create {
    type Error = CreateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (mut state, session, keychain) = ctx.session().await?;
        let opts = TableOptions::named(&self.name).with_access_control(keychain.as_access_control()?);
        let domain = Domain::create(&session, &self.name, KeyMaterial::generate(), opts).await?;
        let domain = Object::from(domain);

        let public = domain.public_locators().clone();
        if self.root {
            state.config.root = public.to_vec();
            state.save_config()?;
        }
        Ok(format!(
            "domain {}\n - master: {}\n - public: {}{}",
            self.name,
            domain.locators().joined(),
            public.joined(),
            if self.root { "\n - set as root" } else { "" }
        ))
    }
}
