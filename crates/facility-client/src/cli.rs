//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use facility_core::{Day, TimeOfDay};

/// facility - book shared facilities over UDP
#[derive(Debug, Parser)]
#[command(name = "facility")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FACILITY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Server address (host:port)
    #[arg(long, short, env = "FACILITY_SERVER", global = true)]
    pub server: Option<String>,

    /// Seconds to wait for each ACK or reply
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Retransmissions after the first attempt
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Print replies as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the booking server in the foreground
    Server {
        /// Answer retransmitted requests from the reply cache
        #[arg(long, visible_alias = "atmost")]
        at_most_once: bool,

        /// Drop the ACK and reply of the first request
        #[arg(long, visible_alias = "failure")]
        simulate_failure: bool,

        /// Address to bind (default 0.0.0.0:3000)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Push availability to monitors after cancellations too
        #[arg(long)]
        notify_on_cancel: bool,
    },

    /// Show free windows of a facility
    Query {
        /// Facility name
        facility: String,

        /// Days (0-6 or names); all days when omitted
        days: Vec<Day>,
    },

    /// Book a facility
    Book {
        /// Facility name
        facility: String,

        /// Day (0-6 or name)
        day: Day,

        /// Start time (HHMM or HH:MM)
        start: TimeOfDay,

        /// End time (HHMM or HH:MM)
        end: TimeOfDay,
    },

    /// Move a booking by a number of minutes
    Shift {
        /// Confirmation id
        uid: u32,

        /// Offset in minutes (negative moves earlier)
        #[arg(allow_negative_numbers = true)]
        offset: i32,
    },

    /// Lengthen or shorten a booking
    Extend {
        /// Confirmation id
        uid: u32,

        /// Minutes to add to the end (negative shortens)
        #[arg(allow_negative_numbers = true)]
        minutes: i32,
    },

    /// Cancel a booking
    Cancel {
        /// Confirmation id
        uid: u32,
    },

    /// Watch a facility for availability changes
    Watch {
        /// Facility name
        facility: String,

        /// How long to watch, in minutes
        #[arg(default_value = "10")]
        minutes: u32,
    },

    /// Show the capacity of a facility
    Capacity {
        /// Facility name
        facility: String,
    },

    /// List all facilities
    List,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_book() {
        let cli = Cli::parse_from(["facility", "book", "Gym", "tue", "0900", "10:30"]);
        match cli.command {
            Command::Book {
                facility,
                day,
                start,
                end,
            } => {
                assert_eq!(facility, "Gym");
                assert_eq!(day, Day::Tuesday);
                assert_eq!(start.minutes(), 540);
                assert_eq!(end.minutes(), 630);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_negative_offset() {
        let cli = Cli::parse_from(["facility", "shift", "3", "-30"]);
        assert!(matches!(cli.command, Command::Shift { uid: 3, offset: -30 }));
    }

    #[test]
    fn parse_query_days_and_globals() {
        let cli = Cli::parse_from([
            "facility", "--server", "10.0.0.1:3000", "--json", "query", "Pool", "0", "sunday",
        ]);
        assert_eq!(cli.server.as_deref(), Some("10.0.0.1:3000"));
        assert!(cli.json);
        match cli.command {
            Command::Query { facility, days } => {
                assert_eq!(facility, "Pool");
                assert_eq!(days, vec![Day::Monday, Day::Sunday]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_server_aliases() {
        let cli = Cli::parse_from(["facility", "server", "--atmost", "--failure"]);
        assert!(matches!(
            cli.command,
            Command::Server {
                at_most_once: true,
                simulate_failure: true,
                ..
            }
        ));
    }

    #[test]
    fn watch_defaults_to_ten_minutes() {
        let cli = Cli::parse_from(["facility", "watch", "Gym"]);
        assert!(matches!(cli.command, Command::Watch { minutes: 10, .. }));
    }

    #[test]
    fn invalid_time_rejected() {
        assert!(Cli::try_parse_from(["facility", "book", "Gym", "mon", "2500", "2600"]).is_err());
    }
}
