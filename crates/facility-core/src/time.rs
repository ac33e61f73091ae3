//! Time types for facility bookings.
//!
//! This module provides [`TimeOfDay`] (minutes since midnight), [`Interval`]
//! (a non-empty `[start, end]` span within one day) and [`Day`] (the seven
//! weekdays a facility can be booked on).
//!
//! All arithmetic happens in whole minutes. There is no day rollover: a value
//! that would cross midnight is rejected rather than wrapped.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in one hour.
pub const MINUTES_PER_HOUR: u16 = 60;

/// The last representable minute of a day (23:59).
pub const LAST_MINUTE: u16 = 23 * MINUTES_PER_HOUR + 59;

/// Errors produced when building time values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// Hour outside 0..=23.
    #[error("hour out of range: {0}")]
    HourOutOfRange(u32),

    /// Minute outside 0..=59.
    #[error("minute out of range: {0}")]
    MinuteOutOfRange(u32),

    /// Minutes since midnight outside 0..=1439.
    #[error("time out of range: {0} minutes since midnight")]
    OutOfRange(i64),

    /// Interval whose end is not after its start.
    #[error("empty interval: {start} - {end}")]
    EmptyInterval { start: TimeOfDay, end: TimeOfDay },

    /// Unparseable time string.
    #[error("invalid time format: {0:?} (expected HHMM or HH:MM)")]
    InvalidFormat(String),

    /// Unparseable day.
    #[error("invalid day: {0:?}")]
    InvalidDay(String),
}

/// A time of day with minute resolution, stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    /// 00:00.
    pub const MIDNIGHT: Self = Self(0);

    /// 23:59.
    pub const END_OF_DAY: Self = Self(LAST_MINUTE);

    /// Creates a time from minutes since midnight.
    pub fn from_minutes(minutes: u32) -> Result<Self, TimeError> {
        if minutes > u32::from(LAST_MINUTE) {
            return Err(TimeError::OutOfRange(i64::from(minutes)));
        }
        Ok(Self(minutes as u16))
    }

    /// Creates a time from an hour and a minute.
    pub fn from_hm(hour: u32, minute: u32) -> Result<Self, TimeError> {
        if hour > 23 {
            return Err(TimeError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(TimeError::MinuteOutOfRange(minute));
        }
        Ok(Self((hour * 60 + minute) as u16))
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.0
    }

    /// Hour component.
    pub fn hour(self) -> u8 {
        (self.0 / MINUTES_PER_HOUR) as u8
    }

    /// Minute component.
    pub fn minute(self) -> u8 {
        (self.0 % MINUTES_PER_HOUR) as u8
    }

    /// Moves the time by a signed number of minutes.
    ///
    /// Fails if the result falls outside the day.
    pub fn offset(self, minutes: i32) -> Result<Self, TimeError> {
        let moved = i64::from(self.0) + i64::from(minutes);
        if !(0..=i64::from(LAST_MINUTE)).contains(&moved) {
            return Err(TimeError::OutOfRange(moved));
        }
        Ok(Self(moved as u16))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeError;

    /// Parses `HHMM` or `HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() {
            return Err(TimeError::InvalidFormat(s.to_string()));
        }
        let (hh, mm) = match s.len() {
            4 => (&s[..2], &s[2..]),
            5 if s.as_bytes()[2] == b':' => (&s[..2], &s[3..]),
            _ => return Err(TimeError::InvalidFormat(s.to_string())),
        };
        if !hh.bytes().chain(mm.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(TimeError::InvalidFormat(s.to_string()));
        }
        let hour: u32 = hh
            .parse()
            .map_err(|_| TimeError::InvalidFormat(s.to_string()))?;
        let minute: u32 = mm
            .parse()
            .map_err(|_| TimeError::InvalidFormat(s.to_string()))?;
        Self::from_hm(hour, minute)
    }
}

/// A booked or free span within a single day.
///
/// Invariant: `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Interval {
    start: TimeOfDay,
    end: TimeOfDay,
}

impl Interval {
    /// Creates an interval, rejecting empty or backwards spans.
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, TimeError> {
        if start >= end {
            return Err(TimeError::EmptyInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates an interval from minutes since midnight.
    pub fn from_minutes(start: u32, end: u32) -> Result<Self, TimeError> {
        Self::new(TimeOfDay::from_minutes(start)?, TimeOfDay::from_minutes(end)?)
    }

    /// The whole bookable day, 00:00 to 23:59.
    pub fn whole_day() -> Self {
        Self {
            start: TimeOfDay::MIDNIGHT,
            end: TimeOfDay::END_OF_DAY,
        }
    }

    /// Start of the interval.
    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    /// End of the interval.
    pub fn end(&self) -> TimeOfDay {
        self.end
    }

    /// Length in minutes.
    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    /// Returns true if the two intervals share any minute range.
    ///
    /// Touching intervals (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Both endpoints moved by `minutes`.
    pub fn shifted(&self, minutes: i32) -> Result<Self, TimeError> {
        Self::new(self.start.offset(minutes)?, self.end.offset(minutes)?)
    }

    /// Only the end moved by `minutes`; the start stays fixed.
    pub fn extended(&self, minutes: i32) -> Result<Self, TimeError> {
        Self::new(self.start, self.end.offset(minutes)?)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Orders intervals by start time, then by end time.
///
/// This is the ordering of every sorted interval container in the workspace.
pub fn by_start(a: &Interval, b: &Interval) -> Ordering {
    a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end))
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        by_start(self, other)
    }
}

/// Day of the week. The discriminant is the wire index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Day {
    Monday = 0,
    Tuesday = 1,
    Wednesday = 2,
    Thursday = 3,
    Friday = 4,
    Saturday = 5,
    Sunday = 6,
}

impl Day {
    /// All days, Monday first.
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    /// Wire index, 0 for Monday.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Looks a day up by wire index.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    /// Full English name.
    pub fn name(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Day {
    type Err = TimeError;

    /// Accepts a wire index (`0`..`6`), a full name or a three-letter prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<u8>() {
            return Self::from_index(index).ok_or_else(|| TimeError::InvalidDay(s.to_string()));
        }
        let lower = trimmed.to_lowercase();
        if lower.len() >= 3 {
            for day in Self::ALL {
                if day.name().to_lowercase().starts_with(&lower) {
                    return Ok(day);
                }
            }
        }
        Err(TimeError::InvalidDay(s.to_string()))
    }
}
