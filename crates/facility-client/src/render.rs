//! Output rendering for CLI commands.
//!
//! Every command produces an [`Output`], printed either as human-readable
//! text or as JSON.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

use facility_core::{Day, DayAvailability, Interval};

use crate::error::{ClientError, ClientResult};

/// Result of a command.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Output {
    Availability {
        facility: String,
        days: Vec<DayAvailability>,
    },
    Booked {
        uid: u32,
        facility: String,
        day: Day,
        interval: Interval,
    },
    Shifted {
        uid: u32,
        offset: i32,
    },
    Extended {
        uid: u32,
        offset: i32,
    },
    Cancelled {
        uid: u32,
    },
    Capacity {
        facility: String,
        capacity: u32,
    },
    Facilities {
        names: Vec<String>,
    },
    Watching {
        facility: String,
        minutes: u32,
        port: u16,
    },
    Update {
        at: DateTime<Local>,
        facility: String,
        days: Vec<DayAvailability>,
    },
}

impl Output {
    /// Renders as JSON (one line) or as text.
    pub fn render(&self, json: bool) -> ClientResult<String> {
        if json {
            serde_json::to_string(self)
                .map_err(|e| ClientError::Config(format!("failed to serialize output: {}", e)))
        } else {
            Ok(self.to_string())
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Availability { facility, days } => {
                write!(f, "{} availability:", facility)?;
                write_days(f, days)
            }
            Output::Booked {
                uid,
                facility,
                day,
                interval,
            } => write!(
                f,
                "Booked {} on {} {} (confirmation {})",
                facility, day, interval, uid
            ),
            Output::Shifted { uid, offset } => {
                write!(f, "Booking {} shifted by {} minutes", uid, offset)
            }
            Output::Extended { uid, offset } if *offset < 0 => {
                write!(f, "Booking {} shortened by {} minutes", uid, offset.unsigned_abs())
            }
            Output::Extended { uid, offset } => {
                write!(f, "Booking {} extended by {} minutes", uid, offset)
            }
            Output::Cancelled { uid } => write!(f, "Booking {} cancelled", uid),
            Output::Capacity { facility, capacity } => {
                write!(f, "{} capacity: {}", facility, capacity)
            }
            Output::Facilities { names } if names.is_empty() => f.write_str("No facilities"),
            Output::Facilities { names } => {
                f.write_str("Facilities:")?;
                for name in names {
                    write!(f, "\n  {}", name)?;
                }
                Ok(())
            }
            Output::Watching {
                facility,
                minutes,
                port,
            } => write!(
                f,
                "Watching {} for {} minutes (callback port {})",
                facility, minutes, port
            ),
            Output::Update { at, facility, days } => {
                write!(f, "[{}] {} availability changed:", at.format("%H:%M:%S"), facility)?;
                write_days(f, days)
            }
        }
    }
}

fn write_days(f: &mut fmt::Formatter<'_>, days: &[DayAvailability]) -> fmt::Result {
    for day in days {
        write!(f, "\n  {:<9} ", format!("{}:", day.day))?;
        if day.free.is_empty() {
            f.write_str("fully booked")?;
            continue;
        }
        let windows: Vec<String> = day.free.iter().map(ToString::to_string).collect();
        f.write_str(&windows.join(", "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn span(start: u32, end: u32) -> Interval {
        Interval::from_minutes(start, end).unwrap()
    }

    fn week() -> Vec<DayAvailability> {
        vec![
            DayAvailability {
                day: Day::Monday,
                free: vec![span(0, 540), span(600, 1439)],
            },
            DayAvailability {
                day: Day::Wednesday,
                free: Vec::new(),
            },
        ]
    }

    #[test]
    fn availability_text() {
        let output = Output::Availability {
            facility: "Gym".into(),
            days: week(),
        };
        insta::assert_snapshot!(output.to_string(), @r"
        Gym availability:
          Monday:   00:00-09:00, 10:00-23:59
          Wednesday: fully booked
        ");
    }

    #[test]
    fn booking_text() {
        let output = Output::Booked {
            uid: 7,
            facility: "Art Studio".into(),
            day: Day::Friday,
            interval: span(810, 870),
        };
        insta::assert_snapshot!(output.to_string(), @"Booked Art Studio on Friday 13:30-14:30 (confirmation 7)");
    }

    #[test]
    fn modification_text() {
        assert_eq!(
            Output::Shifted { uid: 3, offset: -30 }.to_string(),
            "Booking 3 shifted by -30 minutes"
        );
        assert_eq!(
            Output::Extended { uid: 3, offset: 15 }.to_string(),
            "Booking 3 extended by 15 minutes"
        );
        assert_eq!(
            Output::Extended { uid: 3, offset: -15 }.to_string(),
            "Booking 3 shortened by 15 minutes"
        );
        assert_eq!(Output::Cancelled { uid: 3 }.to_string(), "Booking 3 cancelled");
    }

    #[test]
    fn facilities_text() {
        let output = Output::Facilities {
            names: vec!["Auditorium".into(), "Gym".into()],
        };
        insta::assert_snapshot!(output.to_string(), @r"
        Facilities:
          Auditorium
          Gym
        ");
        let empty = Output::Facilities { names: Vec::new() };
        assert_eq!(empty.to_string(), "No facilities");
    }

    #[test]
    fn update_text_has_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 5, 6, 14, 3, 9).unwrap();
        let output = Output::Update {
            at,
            facility: "Gym".into(),
            days: week()[..1].to_vec(),
        };
        insta::assert_snapshot!(output.to_string(), @r"
        [14:03:09] Gym availability changed:
          Monday:   00:00-09:00, 10:00-23:59
        ");
    }

    #[test]
    fn json_output() {
        let output = Output::Capacity {
            facility: "Pool".into(),
            capacity: 30,
        };
        insta::assert_snapshot!(output.render(true).unwrap(), @r#"{"kind":"capacity","facility":"Pool","capacity":30}"#);

        let output = Output::Booked {
            uid: 1,
            facility: "Gym".into(),
            day: Day::Monday,
            interval: span(540, 600),
        };
        insta::assert_snapshot!(output.render(true).unwrap(), @r#"{"kind":"booked","uid":1,"facility":"Gym","day":"monday","interval":{"start":540,"end":600}}"#);
    }

    #[test]
    fn text_render_matches_display() {
        let output = Output::Cancelled { uid: 9 };
        assert_eq!(output.render(false).unwrap(), output.to_string());
    }
}
