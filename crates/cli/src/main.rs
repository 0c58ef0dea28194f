mod cli;
mod state;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Domain, Get, Init, Keys, Put, Resolve, Version};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

command_enum! {
    (Domain, Domain),
    (Get, Get),
    (Init, Init),
    (Keys, Keys),
    (Put, Put),
    (Resolve, Resolve),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(args.log_level.into())
        .from_env_lossy();
    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    tracing_subscriber::registry().with(stderr_layer).init();

    let ctx = cli::op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
