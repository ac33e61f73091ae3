//! Server command: runs the booking server in the foreground.

use std::net::SocketAddr;

use tracing::info;

use facility_server::{InvocationSemantics, ServerConfig, SignalHandler, UdpServer};

use crate::error::ClientResult;

/// Command-line switches layered over the `[server]` config table.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub at_most_once: bool,
    pub simulate_failure: bool,
    pub bind: Option<SocketAddr>,
    pub notify_on_cancel: bool,
}

/// Applies the switches to `config`. Flags only ever turn behavior on.
pub fn build_config(mut config: ServerConfig, options: &ServerOptions) -> ServerConfig {
    if options.at_most_once {
        config = config.with_semantics(InvocationSemantics::AtMostOnce);
    }
    if options.simulate_failure {
        config = config.with_simulate_failure(true);
    }
    if options.notify_on_cancel {
        config = config.with_notify_on_cancel(true);
    }
    if let Some(bind) = options.bind {
        config.bind = bind;
    }
    config
}

/// Starts the server and blocks until SIGTERM or SIGINT.
pub async fn run(config: ServerConfig) -> ClientResult<()> {
    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener()?;

    let mut server = UdpServer::bind(config).await?;
    info!(addr = %server.local_addr()?, "Server listening");

    server
        .run_until_shutdown(signal_handler.shutdown().wait())
        .await?;

    info!(
        bookings = server.dispatcher().bookings().len(),
        "Server stopped"
    );
    Ok(())
}
