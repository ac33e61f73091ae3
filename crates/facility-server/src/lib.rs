//! Facility booking daemon.
//!
//! This crate provides the server side of the booking service:
//! - A UDP loop that acknowledges, decodes and answers requests
//! - At-least-once and at-most-once handling of retransmitted requests
//! - The booking registry and per-facility interval engine behind the dispatcher
//! - Monitor subscriptions pushed over TCP when availability changes
//!
//! # Example
//!
//! ```rust,no_run
//! use facility_server::{ServerConfig, SignalHandler, UdpServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener()?;
//!
//!     let mut server = UdpServer::bind(ServerConfig::default()).await?;
//!     server.run_until_shutdown(signals.shutdown().wait()).await?;
//!     Ok(())
//! }
//! ```

mod bookings;
mod cache;
mod config;
mod error;
mod handler;
mod monitor;
mod push;
mod semantics;
mod signals;
mod socket;

pub use bookings::{Booking, BookingRegistry};
pub use cache::{CacheEntry, ReplyCache};
pub use config::{DEFAULT_PORT, FacilitySpec, ServerConfig, default_facilities};
pub use error::{ServerError, ServerResult};
pub use handler::{Dispatched, Dispatcher, Notification};
pub use monitor::{MonitorError, MonitorRegistry, Subscription, Sweep};
pub use push::PushTransport;
pub use semantics::{InvocationLayer, InvocationSemantics};
pub use signals::{ShutdownSignal, SignalHandler};
pub use socket::UdpServer;
