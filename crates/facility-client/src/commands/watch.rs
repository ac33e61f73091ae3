//! Watch command: register a monitor and print pushed updates until the
//! window closes or the user interrupts.

use std::time::Duration;

use chrono::Local;
use tokio::time::Instant;
use tracing::info;

use facility_core::Day;
use facility_server::SignalHandler;

use crate::config::ClientSettings;
use crate::error::{ClientError, ClientResult};
use crate::render::Output;
use crate::watch::Watcher;

/// Watches `facility` for `minutes`.
pub async fn run(settings: &ClientSettings, facility: &str, minutes: u32) -> ClientResult<()> {
    let window = i32::try_from(minutes)
        .map_err(|_| ClientError::Usage(format!("monitor window too long: {}", minutes)))?;

    let mut client = super::connect(settings).await?;
    let mut watcher = Watcher::bind(client.local_addr()?.ip()).await?;
    let port = watcher.port()?;

    client.monitor(facility, window, port).await?;
    let deadline = Instant::now() + Duration::from_secs(u64::from(minutes) * 60);
    info!(facility, minutes, port, "Monitor registered");

    super::print(
        &Output::Watching {
            facility: facility.to_string(),
            minutes,
            port,
        },
        settings.json,
    )?;
    let days = client.query(facility, &Day::ALL).await?;
    super::print(
        &Output::Availability {
            facility: facility.to_string(),
            days,
        },
        settings.json,
    )?;

    let signals = SignalHandler::new();
    signals.spawn_listener()?;
    let interrupted = signals.shutdown().wait();
    tokio::pin!(interrupted);

    loop {
        let update = tokio::select! {
            _ = &mut interrupted => {
                info!("Interrupted");
                return Ok(());
            }
            update = watcher.next_update(deadline) => update?,
        };
        let Some(days) = update else {
            info!(facility, "Monitor window elapsed");
            return Ok(());
        };
        super::print(
            &Output::Update {
                at: Local::now(),
                facility: facility.to_string(),
                days,
            },
            settings.json,
        )?;
    }
}
