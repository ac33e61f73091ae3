//! CLI, UDP client with retransmission, monitor watcher, output rendering
//!
//! This crate provides the `facility` command-line interface. It talks to a
//! booking server over UDP and can also run one in the foreground.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod render;
pub mod udp;
pub mod watch;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use render::Output;
pub use udp::UdpClient;
pub use watch::Watcher;
