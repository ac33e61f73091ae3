//! Request dispatch.
//!
//! The [`Dispatcher`] owns all booking state and turns one decoded
//! [`Request`] into one [`Reply`]. It does no I/O: monitor pushes are returned
//! as a [`Notification`] for the server loop to deliver, and the current time
//! is passed in so expiry can be tested deterministically.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use tracing::{debug, info, warn};

use facility_core::{BookingError, Day, Facility, Interval};
use facility_protocol::{Opcode, Reply, ReplyBody, Request, RequestBody, Status};

use crate::bookings::BookingRegistry;
use crate::config::{FacilitySpec, ServerConfig};
use crate::monitor::{MonitorError, MonitorRegistry};

/// Availability push owed to the monitors of one facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub facility: String,
    /// Push frame with the seven-day snapshot.
    pub frame: Reply,
    /// Endpoints to push to.
    pub live: Vec<SocketAddr>,
    /// Endpoints whose subscription expired during this evaluation.
    pub expired: Vec<SocketAddr>,
}

/// A reply plus any push it triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub reply: Reply,
    pub notification: Option<Notification>,
}

impl Dispatched {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            notification: None,
        }
    }
}

/// Routes requests to the booking engine, the booking registry and the
/// monitor registry.
#[derive(Debug)]
pub struct Dispatcher {
    facilities: BTreeMap<String, Facility>,
    bookings: BookingRegistry,
    monitors: MonitorRegistry,
    notify_on_cancel: bool,
}

impl Dispatcher {
    /// Creates a dispatcher over the given facilities.
    pub fn new(facilities: impl IntoIterator<Item = Facility>, first_uid: u32) -> Self {
        let facilities: BTreeMap<String, Facility> = facilities
            .into_iter()
            .map(|facility| (facility.name().to_string(), facility))
            .collect();
        let monitors = MonitorRegistry::new(facilities.keys().cloned());
        Self {
            facilities,
            bookings: BookingRegistry::new(first_uid),
            monitors,
            notify_on_cancel: false,
        }
    }

    /// Creates a dispatcher from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        let facilities = config
            .facilities
            .iter()
            .map(|FacilitySpec { name, capacity }| Facility::new(name.clone(), *capacity));
        Self::new(facilities, config.first_uid).with_notify_on_cancel(config.notify_on_cancel)
    }

    /// Builder: push availability after cancellations too.
    pub fn with_notify_on_cancel(mut self, notify: bool) -> Self {
        self.notify_on_cancel = notify;
        self
    }

    /// Looks a facility up by name.
    pub fn facility(&self, name: &str) -> Option<&Facility> {
        self.facilities.get(name)
    }

    /// The booking registry.
    pub fn bookings(&self) -> &BookingRegistry {
        &self.bookings
    }

    /// The monitor registry.
    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    /// Mutable access for the periodic sweep.
    pub fn monitors_mut(&mut self) -> &mut MonitorRegistry {
        &mut self.monitors
    }

    /// Handles one request. `source` is the datagram's sender, used as the
    /// address of monitor callbacks.
    #[tracing::instrument(skip(self, request, now), fields(req_id = request.req_id, uid = request.uid, op = %request.opcode()))]
    pub fn dispatch(&mut self, request: &Request, source: IpAddr, now: Instant) -> Dispatched {
        let opcode = request.opcode();
        match &request.body {
            RequestBody::Query { facility, days } => self.query(facility, days),
            RequestBody::Create {
                facility,
                day,
                interval,
            } => self.create(facility, *day, *interval, now),
            RequestBody::Shift { offset } => self.relocate(request.uid, opcode, *offset, now),
            RequestBody::Extend { offset } => self.relocate(request.uid, opcode, *offset, now),
            RequestBody::Monitor {
                facility,
                window_minutes,
                callback_port,
            } => self.monitor(
                facility,
                SocketAddr::new(source, *callback_port),
                *window_minutes,
                now,
            ),
            RequestBody::Capacity { facility } => self.capacity(facility),
            RequestBody::ListFacilities => self.list(),
            RequestBody::Cancel => self.cancel(request.uid, now),
        }
    }

    fn query(&self, name: &str, days: &[Day]) -> Dispatched {
        let Some(facility) = self.facilities.get(name) else {
            return unknown_facility(name, Opcode::Query);
        };
        let availability = facility.query_availability(days);
        debug!(facility = name, days = days.len(), "Answered availability query");
        Dispatched::reply(Reply::ok(0, Opcode::Query, ReplyBody::Availability(availability)))
    }

    fn create(&mut self, name: &str, day: Day, interval: Interval, now: Instant) -> Dispatched {
        let Some(facility) = self.facilities.get_mut(name) else {
            return unknown_facility(name, Opcode::Create);
        };
        if let Err(e) = facility.book(day, interval) {
            debug!(facility = name, %day, %interval, error = %e, "Booking rejected");
            return Dispatched::reply(Reply::error(
                booking_status(&e),
                0,
                Opcode::Create.code(),
            ));
        }

        let Some(uid) = self.bookings.issue_uid() else {
            warn!(facility = name, %day, %interval, "Confirmation ids exhausted");
            if let Err(e) = facility.cancel(day, interval) {
                warn!(facility = name, error = %e, "Failed to roll back booking");
            }
            return Dispatched::reply(Reply::error(Status::Unavailable, 0, Opcode::Create.code()));
        };
        self.bookings.create(uid, name, day, interval);
        info!(uid, facility = name, %day, %interval, "Booking created");

        let notification = self.notify(name, now);
        Dispatched {
            reply: Reply::ok(uid, Opcode::Create, ReplyBody::Empty),
            notification,
        }
    }

    /// Shift (both endpoints) or extend (end only) an existing booking.
    fn relocate(&mut self, uid: u32, opcode: Opcode, offset: i32, now: Instant) -> Dispatched {
        let Some(booking) = self.bookings.lookup(uid) else {
            debug!(uid, "Unknown confirmation id");
            return Dispatched::reply(Reply::error(Status::UnknownBooking, uid, opcode.code()));
        };
        let (name, day, current) = (booking.facility.clone(), booking.day, booking.interval);
        let Some(facility) = self.facilities.get_mut(&name) else {
            warn!(uid, facility = %name, "Booking refers to a missing facility");
            return unknown_facility(&name, opcode);
        };

        let moved = match opcode {
            Opcode::Extend => facility.extend(day, current, offset),
            _ => facility.shift(day, current, offset),
        };
        match moved {
            Ok(interval) => {
                self.bookings.replace(uid, interval);
                info!(uid, facility = %name, from = %current, to = %interval, "Booking moved");
                let notification = self.notify(&name, now);
                Dispatched {
                    reply: Reply::ok(uid, opcode, ReplyBody::Empty),
                    notification,
                }
            }
            Err(e) => {
                debug!(uid, offset, error = %e, "Move rejected");
                Dispatched::reply(Reply::error(booking_status(&e), uid, opcode.code()))
            }
        }
    }

    fn cancel(&mut self, uid: u32, now: Instant) -> Dispatched {
        let Some(booking) = self.bookings.lookup(uid) else {
            debug!(uid, "Unknown confirmation id");
            return Dispatched::reply(Reply::error(
                Status::UnknownBooking,
                uid,
                Opcode::Cancel.code(),
            ));
        };
        let (name, day, interval) = (booking.facility.clone(), booking.day, booking.interval);
        let Some(facility) = self.facilities.get_mut(&name) else {
            return unknown_facility(&name, Opcode::Cancel);
        };
        if let Err(e) = facility.cancel(day, interval) {
            warn!(uid, error = %e, "Registry and facility disagree");
            return Dispatched::reply(Reply::error(
                booking_status(&e),
                uid,
                Opcode::Cancel.code(),
            ));
        }
        self.bookings.remove(uid);
        info!(uid, facility = %name, %day, %interval, "Booking cancelled");

        let notification = if self.notify_on_cancel {
            self.notify(&name, now)
        } else {
            None
        };
        Dispatched {
            reply: Reply::ok(uid, Opcode::Cancel, ReplyBody::Empty),
            notification,
        }
    }

    fn monitor(
        &mut self,
        name: &str,
        endpoint: SocketAddr,
        window_minutes: i32,
        now: Instant,
    ) -> Dispatched {
        match self.monitors.register(name, endpoint, window_minutes, now) {
            Ok(()) => Dispatched::reply(Reply::ok(0, Opcode::Monitor, ReplyBody::Empty)),
            Err(MonitorError::UnknownFacility(_)) => unknown_facility(name, Opcode::Monitor),
            Err(MonitorError::InvalidWindow(_)) => Dispatched::reply(Reply::error(
                Status::Unavailable,
                0,
                Opcode::Monitor.code(),
            )),
        }
    }

    fn capacity(&self, name: &str) -> Dispatched {
        match self.facilities.get(name) {
            Some(facility) => Dispatched::reply(Reply::ok(
                0,
                Opcode::Capacity,
                ReplyBody::Capacity(facility.capacity()),
            )),
            None => unknown_facility(name, Opcode::Capacity),
        }
    }

    fn list(&self) -> Dispatched {
        let names = self.facilities.keys().cloned().collect();
        Dispatched::reply(Reply::ok(0, Opcode::ListFacilities, ReplyBody::Facilities(names)))
    }

    /// Evaluates the monitors of `name` after a successful mutation.
    fn notify(&mut self, name: &str, now: Instant) -> Option<Notification> {
        let sweep = self.monitors.notify_if_live(name, now);
        if sweep.live.is_empty() && sweep.expired.is_empty() {
            return None;
        }
        let snapshot = self.facilities.get(name)?.snapshot();
        Some(Notification {
            facility: name.to_string(),
            frame: Reply::push(snapshot),
            live: sweep.live,
            expired: sweep.expired,
        })
    }
}

fn unknown_facility(name: &str, opcode: Opcode) -> Dispatched {
    debug!(facility = name, "Unknown facility");
    Dispatched::reply(Reply::error(Status::UnknownFacility, 0, opcode.code()))
}

fn booking_status(error: &BookingError) -> Status {
    match error {
        BookingError::Conflict { .. } | BookingError::OutOfBounds(_) => Status::Unavailable,
        BookingError::NotBooked { .. } => Status::UnknownBooking,
    }
}
