//! Command implementations.

pub mod booking;
pub mod config;
pub mod server;
pub mod watch;

use crate::config::ClientSettings;
use crate::error::ClientResult;
use crate::render::Output;
use crate::udp::UdpClient;

/// Opens a client using the connection settings.
pub async fn connect(settings: &ClientSettings) -> ClientResult<UdpClient> {
    UdpClient::connect(&settings.server, settings.timeout(), settings.retries).await
}

/// Prints a command result to stdout.
pub fn print(output: &Output, json: bool) -> ClientResult<()> {
    println!("{}", output.render(json)?);
    Ok(())
}
