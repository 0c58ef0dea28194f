use clap::Args;

use common::prelude::{KeyMaterial, KeySource};

#[derive(Args, Debug, Clone)]
pub struct Keys {
    /// Derive from a passphrase instead of the state key file
    #[arg(long, conflicts_with = "mnemonic")]
    pub passphrase: Option<String>,

    /// Derive from a mnemonic instead of the state key file
    #[arg(long)]
    pub mnemonic: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum KeysError {
    #[error(transparent)]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Keys(#[from] common::crypto::KeyError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Keys {
    type Error = KeysError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let keys = match (&self.passphrase, &self.mnemonic) {
            (Some(passphrase), _) => KeyMaterial::derive(KeySource::Passphrase(passphrase.clone()))?,
            (None, Some(mnemonic)) => KeyMaterial::derive(KeySource::Mnemonic(mnemonic.clone()))?,
            (None, None) => ctx.state()?.load_keys()?,
        };
        let mut lines = keys.export_public();
        lines.push(keys.export_private()?);
        if let Some(fingerprint) = keys.fingerprint() {
            lines.push(format!("fingerprint: {fingerprint}"));
        }
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cli::op::{Op, OpContext};

    #[tokio::test]
    async fn test_passphrase_keys_are_stable() {
        let ctx = OpContext::new(None);
        let op = Keys {
            passphrase: Some("All knowledge is power".to_string()),
            mnemonic: None,
        };
        let a = op.execute(&ctx).await.unwrap();
        let b = op.execute(&ctx).await.unwrap();
        assert_eq!(a, b);
        assert!(a.contains("NACL VERIFY:"));
        assert!(a.contains("NACL PUBLIC:"));
        assert!(a.contains("NACL SEED:"));
        let expected = KeyMaterial::derive(KeySource::Passphrase("All knowledge is power".to_string()))
            .unwrap()
            .fingerprint()
            .unwrap();
        assert!(a.contains(&format!("fingerprint: {expected}")));
    }

    #[tokio::test]
    async fn test_unknown_mnemonic() {
        let ctx = OpContext::new(None);
        let op = Keys {
            passphrase: None,
            mnemonic: Some("not a real phrase".to_string()),
        };
        assert!(matches!(op.execute(&ctx).await, Err(KeysError::Keys(_))));
    }
}
