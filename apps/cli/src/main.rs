mod cli;
mod config;
mod upload;
mod watch;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,strato=debug")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let path = config::config_path(cli.global.config.as_deref());
    let mut cfg = config::load(&path)?;
    config::apply_overrides(&mut cfg, &cli.global);

    match cli.command {
        Command::Upload(args) => {
            let results = upload::run(cfg, args.paths, args.folder).await?;
            Ok(upload::summarize(&results))
        }
        Command::Watch(args) => {
            let url = args.url.unwrap_or_else(|| config::push_url(&cfg.server_url));
            watch::run(url, args.folder).await?;
            Ok(true)
        }
        Command::Config(args) => {
            if args.save {
                cfg.validate()?;
                config::save(&cfg, &path)?;
                println!("saved {}", path.display());
            }
            if args.print || !args.save {
                println!("{}", serde_json::to_string_pretty(&config::redacted(&cfg))?);
            }
            Ok(true)
        }
    }
}
