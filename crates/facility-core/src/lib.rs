//! Core types: time of day, intervals, days, the facility booking engine

pub mod facility;
pub mod time;
pub mod tracing;

pub use facility::{BookingError, DayAvailability, Facility};
pub use time::{Day, Interval, LAST_MINUTE, MINUTES_PER_HOUR, TimeError, TimeOfDay, by_start};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
