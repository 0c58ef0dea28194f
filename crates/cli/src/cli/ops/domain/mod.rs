use clap::{Args, Subcommand};

pub mod create;
pub mod register;
pub mod show;

use crate::cli::op::Op;

use common::prelude::{Locators, Object, Session};

crate::command_enum! {
    (Create, create::Create),
    (Register, register::Register),
    (Show, show::Show),
}

pub type DomainCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Domain {
    #[command(subcommand)]
    pub command: DomainCommand,
}

#[async_trait::async_trait]
impl Op for Domain {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

/// Fetch the domain stored at `locators`
pub(crate) async fn fetch_domain(
    session: &Session,
    locators: &[String],
) -> Result<common::naming::Domain, common::error::Error> {
    let locators = Locators::from(locators.to_vec());
    match Object::fetch(session, &locators).await? {
        Object::Domain(domain) => Ok(domain),
        other => Err(common::error::Error::Coding(format!(
            "{} holds a {}, not a domain",
            locators.joined(),
            other.type_tag()
        ))),
    }
}
