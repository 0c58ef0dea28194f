use clap::Args;

use crate::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Init;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::init(ctx.config_path.clone(), None)?;
        let keys = state.load_keys()?;

        let output = format!(
            "Initialized dweb directory at: {}\n\
             - Key: {}\n\
             - Store: {}\n\
             - Config: {}\n\
             - Public keys: {}\n\
             - Fingerprint: {}",
            state.dir.display(),
            state.key_path.display(),
            state.store_path.display(),
            state.config_path.display(),
            keys.export_public().join(" "),
            keys.fingerprint().unwrap_or_default(),
        );
        Ok(output)
    }
}
