//! Request and reply types for the booking protocol.

use std::fmt;

use facility_core::{Day, DayAvailability, Interval};
use serde::Serialize;

use crate::error::ProtocolError;

/// Operation codes carried in the third header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Opcode {
    /// Free windows for a facility on some days.
    Query = 101,
    /// Book an interval.
    Create = 102,
    /// Move a booking by a signed offset.
    Shift = 103,
    /// Subscribe to availability pushes.
    Monitor = 104,
    /// Facility capacity.
    Capacity = 105,
    /// Move the end of a booking by a signed offset.
    Extend = 106,
    /// Names of all facilities.
    ListFacilities = 107,
    /// Remove a booking.
    Cancel = 108,
}

impl Opcode {
    /// Numeric wire value.
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            101 => Opcode::Query,
            102 => Opcode::Create,
            103 => Opcode::Shift,
            104 => Opcode::Monitor,
            105 => Opcode::Capacity,
            106 => Opcode::Extend,
            107 => Opcode::ListFacilities,
            108 => Opcode::Cancel,
            other => return Err(ProtocolError::UnknownOpcode(other)),
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Query => "QUERY",
            Opcode::Create => "CREATE",
            Opcode::Shift => "UPDATE",
            Opcode::Monitor => "MONITOR",
            Opcode::Capacity => "QUERY_CAPACITY",
            Opcode::Extend => "UPDATE_LENGTH",
            Opcode::ListFacilities => "LIST_FACILITIES",
            Opcode::Cancel => "CANCEL",
        };
        f.write_str(name)
    }
}

/// Reply status codes, carried in the first header word of every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Status {
    /// Success; the payload is present.
    Ok = 100,
    /// No facility with the requested name.
    UnknownFacility = 200,
    /// Interval overlaps a booking, leaves the day, or the monitor window is invalid.
    Unavailable = 300,
    /// No booking with the given confirmation id.
    UnknownBooking = 400,
    /// The request could not be decoded.
    Malformed = 500,
}

impl Status {
    /// Numeric wire value.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::UnknownFacility => "facility not found",
            Status::Unavailable => "requested interval is unavailable",
            Status::UnknownBooking => "confirmation id not found",
            Status::Malformed => "malformed request",
        }
    }
}

impl TryFrom<u32> for Status {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            100 => Status::Ok,
            200 => Status::UnknownFacility,
            300 => Status::Unavailable,
            400 => Status::UnknownBooking,
            500 => Status::Malformed,
            other => return Err(ProtocolError::UnknownStatus(other)),
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// The fixed 16-byte header shared by requests and replies.
///
/// `word0` is the request id on requests and the status code on replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Header {
    pub word0: u32,
    pub uid: u32,
    pub opcode: u32,
    pub payload_len: u32,
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    /// Client-chosen id used for duplicate detection.
    pub req_id: u32,
    /// Confirmation id; meaningful for shift, extend and cancel.
    pub uid: u32,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// Per-opcode request payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RequestBody {
    Query {
        facility: String,
        days: Vec<Day>,
    },
    Create {
        facility: String,
        day: Day,
        interval: Interval,
    },
    Shift {
        offset: i32,
    },
    Monitor {
        facility: String,
        window_minutes: i32,
        callback_port: u16,
    },
    Capacity {
        facility: String,
    },
    Extend {
        offset: i32,
    },
    ListFacilities,
    Cancel,
}

impl RequestBody {
    /// Opcode for this payload.
    pub fn opcode(&self) -> Opcode {
        match self {
            RequestBody::Query { .. } => Opcode::Query,
            RequestBody::Create { .. } => Opcode::Create,
            RequestBody::Shift { .. } => Opcode::Shift,
            RequestBody::Monitor { .. } => Opcode::Monitor,
            RequestBody::Capacity { .. } => Opcode::Capacity,
            RequestBody::Extend { .. } => Opcode::Extend,
            RequestBody::ListFacilities => Opcode::ListFacilities,
            RequestBody::Cancel => Opcode::Cancel,
        }
    }
}

impl Request {
    /// Creates a request that does not refer to a booking.
    pub fn new(req_id: u32, body: RequestBody) -> Self {
        Self {
            req_id,
            uid: 0,
            body,
        }
    }

    /// Creates a request for an existing booking.
    pub fn for_booking(req_id: u32, uid: u32, body: RequestBody) -> Self {
        Self { req_id, uid, body }
    }

    /// Opcode for this request.
    pub fn opcode(&self) -> Opcode {
        self.body.opcode()
    }
}

/// A reply. The payload is only sent when the status is [`Status::Ok`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub status: Status,
    /// New confirmation id for create, echoed uid otherwise.
    pub uid: u32,
    /// Echoed request opcode. Kept raw so unknown opcodes can be echoed too.
    pub opcode: u32,
    pub body: ReplyBody,
}

/// Per-opcode reply payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ReplyBody {
    Empty,
    Availability(Vec<DayAvailability>),
    Capacity(u32),
    Facilities(Vec<String>),
}

impl Reply {
    /// Successful reply.
    pub fn ok(uid: u32, opcode: Opcode, body: ReplyBody) -> Self {
        Self {
            status: Status::Ok,
            uid,
            opcode: opcode.code(),
            body,
        }
    }

    /// Failed reply with no payload.
    pub fn error(status: Status, uid: u32, opcode: u32) -> Self {
        Self {
            status,
            uid,
            opcode,
            body: ReplyBody::Empty,
        }
    }

    /// Monitor push frame carrying a seven-day snapshot.
    pub fn push(snapshot: Vec<DayAvailability>) -> Self {
        Self::ok(0, Opcode::Monitor, ReplyBody::Availability(snapshot))
    }

    /// Returns true if the status is [`Status::Ok`].
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}
