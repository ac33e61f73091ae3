//! Per-facility booking engine.
//!
//! A [`Facility`] owns, for each [`Day`], the set of booked intervals. The set
//! is kept well-ordered: sorted by [`by_start`](crate::time::by_start) and
//! pairwise non-overlapping. Free windows are derived from it on demand.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::time::{Day, Interval, TimeError, TimeOfDay};

/// Errors returned by booking operations. None of them mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// The interval overlaps an existing booking.
    #[error("{interval} on {day} overlaps an existing booking")]
    Conflict { day: Day, interval: Interval },

    /// The moved interval would leave the day or become empty.
    #[error("out of bounds: {0}")]
    OutOfBounds(#[from] TimeError),

    /// The interval is not currently booked.
    #[error("no booking for {interval} on {day}")]
    NotBooked { day: Day, interval: Interval },
}

/// Free windows for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    /// The day.
    pub day: Day,
    /// Free intervals, sorted by start.
    pub free: Vec<Interval>,
}

/// A bookable facility.
#[derive(Debug, Clone)]
pub struct Facility {
    name: String,
    capacity: u32,
    days: [BTreeSet<Interval>; 7],
}

impl Facility {
    /// Creates a facility with no bookings.
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            days: Default::default(),
        }
    }

    /// Facility name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Booked intervals for a day, sorted by start.
    pub fn bookings(&self, day: Day) -> impl Iterator<Item = &Interval> {
        self.days[usize::from(day.index())].iter()
    }

    /// Total number of booked intervals across all days.
    pub fn booking_count(&self) -> usize {
        self.days.iter().map(BTreeSet::len).sum()
    }

    /// Returns true if `interval` could be booked on `day` right now.
    pub fn is_free(&self, day: Day, interval: &Interval) -> bool {
        fits(&self.days[usize::from(day.index())], interval)
    }

    /// Free windows for each requested day, in request order.
    pub fn query_availability(&self, days: &[Day]) -> Vec<DayAvailability> {
        days.iter()
            .map(|&day| DayAvailability {
                day,
                free: self.free_windows(day),
            })
            .collect()
    }

    /// Free windows for all seven days.
    pub fn snapshot(&self) -> Vec<DayAvailability> {
        self.query_availability(&Day::ALL)
    }

    /// Complement of the booked intervals within the day, in one pass.
    fn free_windows(&self, day: Day) -> Vec<Interval> {
        let mut free = Vec::new();
        let mut cursor = TimeOfDay::MIDNIGHT;
        for booked in self.bookings(day) {
            if let Ok(gap) = Interval::new(cursor, booked.start()) {
                free.push(gap);
            }
            cursor = booked.end();
        }
        if let Ok(tail) = Interval::new(cursor, TimeOfDay::END_OF_DAY) {
            free.push(tail);
        }
        free
    }

    /// Books `interval` on `day` if it overlaps nothing.
    pub fn book(&mut self, day: Day, interval: Interval) -> Result<(), BookingError> {
        let set = &mut self.days[usize::from(day.index())];
        if !fits(set, &interval) {
            return Err(BookingError::Conflict { day, interval });
        }
        set.insert(interval);
        trace!(facility = %self.name, %day, %interval, "Booked interval");
        Ok(())
    }

    /// Moves both endpoints of a booked interval by `offset` minutes.
    ///
    /// All-or-nothing: on failure the original interval is still booked.
    pub fn shift(
        &mut self,
        day: Day,
        current: Interval,
        offset: i32,
    ) -> Result<Interval, BookingError> {
        let moved = current.shifted(offset)?;
        self.relocate(day, current, moved)
    }

    /// Moves only the end of a booked interval by `offset` minutes.
    ///
    /// All-or-nothing: on failure the original interval is still booked.
    pub fn extend(
        &mut self,
        day: Day,
        current: Interval,
        offset: i32,
    ) -> Result<Interval, BookingError> {
        let moved = current.extended(offset)?;
        self.relocate(day, current, moved)
    }

    /// Removes an exact booked interval.
    pub fn cancel(&mut self, day: Day, interval: Interval) -> Result<(), BookingError> {
        if !self.days[usize::from(day.index())].remove(&interval) {
            return Err(BookingError::NotBooked { day, interval });
        }
        trace!(facility = %self.name, %day, %interval, "Cancelled interval");
        Ok(())
    }

    fn relocate(
        &mut self,
        day: Day,
        current: Interval,
        moved: Interval,
    ) -> Result<Interval, BookingError> {
        let set = &mut self.days[usize::from(day.index())];
        if !set.remove(&current) {
            return Err(BookingError::NotBooked {
                day,
                interval: current,
            });
        }
        if fits(set, &moved) {
            set.insert(moved);
            trace!(facility = %self.name, %day, from = %current, to = %moved, "Moved interval");
            Ok(moved)
        } else {
            set.insert(current);
            Err(BookingError::Conflict {
                day,
                interval: moved,
            })
        }
    }
}

/// Well-ordered check: the candidate's predecessor must end at or before its
/// start and its successor must start at or after its end.
fn fits(set: &BTreeSet<Interval>, candidate: &Interval) -> bool {
    let before = set
        .range(..*candidate)
        .next_back()
        .is_none_or(|prev| prev.end() <= candidate.start());
    let after = set
        .range(*candidate..)
        .next()
        .is_none_or(|next| next.start() >= candidate.end());
    before && after
}
