//! One-shot booking commands: query, book, shift, extend, cancel, capacity
//! and list.

use facility_core::{Day, Interval};

use crate::cli::Command;
use crate::config::ClientSettings;
use crate::error::{ClientError, ClientResult};
use crate::render::Output;
use crate::udp::UdpClient;

/// Connects, runs `command` and prints its result.
pub async fn run(settings: &ClientSettings, command: Command) -> ClientResult<()> {
    let mut client = super::connect(settings).await?;
    let output = execute(&mut client, command).await?;
    super::print(&output, settings.json)
}

/// Runs one booking command against the server.
pub async fn execute(client: &mut UdpClient, command: Command) -> ClientResult<Output> {
    match command {
        Command::Query { facility, days } => {
            let days = if days.is_empty() {
                Day::ALL.to_vec()
            } else {
                days
            };
            let days = client.query(&facility, &days).await?;
            Ok(Output::Availability { facility, days })
        }
        Command::Book {
            facility,
            day,
            start,
            end,
        } => {
            let interval = Interval::new(start, end)
                .map_err(|e| ClientError::Usage(format!("invalid booking window: {}", e)))?;
            let uid = client.book(&facility, day, interval).await?;
            Ok(Output::Booked {
                uid,
                facility,
                day,
                interval,
            })
        }
        Command::Shift { uid, offset } => {
            client.shift(uid, offset).await?;
            Ok(Output::Shifted { uid, offset })
        }
        Command::Extend { uid, minutes } => {
            client.extend(uid, minutes).await?;
            Ok(Output::Extended {
                uid,
                offset: minutes,
            })
        }
        Command::Cancel { uid } => {
            client.cancel(uid).await?;
            Ok(Output::Cancelled { uid })
        }
        Command::Capacity { facility } => {
            let capacity = client.capacity(&facility).await?;
            Ok(Output::Capacity { facility, capacity })
        }
        Command::List => Ok(Output::Facilities {
            names: client.list().await?,
        }),
        other => Err(ClientError::Usage(format!(
            "not a booking command: {:?}",
            other
        ))),
    }
}
