//! Confirmation-id registry.
//!
//! Maps each confirmation id to the facility, day and current interval of a
//! booking. The facility engine owns the interval sets; this registry only
//! remembers where each booking lives so shift/extend/cancel can find it by id.

use std::collections::HashMap;

use facility_core::{Day, Interval};
use tracing::trace;

/// A confirmed booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub uid: u32,
    pub facility: String,
    pub day: Day,
    pub interval: Interval,
}

/// Bookings by confirmation id. Ids are handed out in increasing order and
/// never reused, even after cancellation. Once `u32::MAX` has been issued no
/// further ids are available.
#[derive(Debug)]
pub struct BookingRegistry {
    next_uid: Option<u32>,
    bookings: HashMap<u32, Booking>,
}

impl Default for BookingRegistry {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BookingRegistry {
    /// Creates an empty registry whose first id is `first_uid`.
    pub fn new(first_uid: u32) -> Self {
        Self {
            next_uid: Some(first_uid),
            bookings: HashMap::new(),
        }
    }

    /// Reserves the next confirmation id. Returns `None` once the id space
    /// is used up.
    pub fn issue_uid(&mut self) -> Option<u32> {
        let uid = self.next_uid?;
        self.next_uid = uid.checked_add(1);
        Some(uid)
    }

    /// Records a booking under an issued id.
    pub fn create(&mut self, uid: u32, facility: impl Into<String>, day: Day, interval: Interval) {
        let booking = Booking {
            uid,
            facility: facility.into(),
            day,
            interval,
        };
        trace!(uid, facility = %booking.facility, %day, %interval, "Registered booking");
        self.bookings.insert(uid, booking);
    }

    /// Looks a booking up.
    pub fn lookup(&self, uid: u32) -> Option<&Booking> {
        self.bookings.get(&uid)
    }

    /// Replaces the interval of a booking. Returns false for unknown ids.
    pub fn replace(&mut self, uid: u32, interval: Interval) -> bool {
        match self.bookings.get_mut(&uid) {
            Some(booking) => {
                booking.interval = interval;
                true
            }
            None => false,
        }
    }

    /// Forgets a booking.
    pub fn remove(&mut self, uid: u32) -> Option<Booking> {
        self.bookings.remove(&uid)
    }

    /// Number of live bookings.
    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    /// Returns true if there are no live bookings.
    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}
