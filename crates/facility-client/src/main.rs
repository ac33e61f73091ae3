//! facility CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use facility_client::cli::{Cli, Command, ConfigAction};
use facility_client::commands;
use facility_client::commands::server::ServerOptions;
use facility_client::config::ClientConfig;
use facility_client::error::{ClientError, ClientResult};
use facility_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = match cli.command {
        Command::Server { .. } if cli.debug => TracingConfig::cli_debug(),
        Command::Server { .. } => TracingConfig::daemon(),
        _ if cli.debug => TracingConfig::cli_debug(),
        _ => TracingConfig::cli(),
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let mut config = if let Some(ref path) = cli.config {
        ClientConfig::load_from(path).map_err(ClientError::Config)?
    } else {
        ClientConfig::load().map_err(ClientError::Config)?
    };

    if let Some(server) = cli.server {
        config.client.server = server;
    }
    if let Some(timeout) = cli.timeout {
        config.client.timeout_secs = timeout;
    }
    if let Some(retries) = cli.retries {
        config.client.retries = retries;
    }
    config.client.json |= cli.json;

    match cli.command {
        Command::Server {
            at_most_once,
            simulate_failure,
            bind,
            notify_on_cancel,
        } => {
            let options = ServerOptions {
                at_most_once,
                simulate_failure,
                bind,
                notify_on_cancel,
            };
            commands::server::run(commands::server::build_config(config.server, &options)).await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config).await,
            ConfigAction::Path => commands::config::path(cli.config.as_ref()),
        },
        Command::Watch { facility, minutes } => {
            commands::watch::run(&config.client, &facility, minutes).await
        }
        command => commands::booking::run(&config.client, command).await,
    }
}
