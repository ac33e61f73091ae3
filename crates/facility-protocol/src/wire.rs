//! Byte-exact datagram codec.
//!
//! Every datagram starts with a 16-byte header of four big-endian `u32`
//! words, followed by `payload_len` bytes of opcode-specific payload:
//!
//! ```text
//! +---------------+---------+------------+-----------------+-------------+
//! | word0 (4 BE)  | uid (4) | opcode (4) | payload_len (4) |  payload    |
//! +---------------+---------+------------+-----------------+-------------+
//! ```
//!
//! Requests put the request id in `word0`; replies put the status code there.
//! Bytes after the declared payload are ignored.

use facility_core::{Day, DayAvailability, Interval, TimeOfDay};

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Header, Opcode, Reply, ReplyBody, Request, RequestBody, Status};

/// Size of the fixed header.
pub const HEADER_LEN: usize = 16;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Largest payload that fits after the header.
pub const MAX_PAYLOAD_LEN: usize = MAX_DATAGRAM_SIZE - HEADER_LEN;

/// Acknowledgement datagram sent before a request is processed.
pub const ACK: &[u8] = b"ACK";

impl Header {
    /// Reads the header from the start of a datagram.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let mut reader = Reader::new(data);
        Ok(Self {
            word0: reader.u32()?,
            uid: reader.u32()?,
            opcode: reader.u32()?,
            payload_len: reader.u32()?,
        })
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.word0.to_be_bytes());
        buf.extend_from_slice(&self.uid.to_be_bytes());
        buf.extend_from_slice(&self.opcode.to_be_bytes());
        buf.extend_from_slice(&self.payload_len.to_be_bytes());
    }
}

/// Encodes a request datagram.
pub fn encode_request(request: &Request) -> ProtocolResult<Vec<u8>> {
    let mut payload = Vec::new();
    match &request.body {
        RequestBody::Query { facility, days } => {
            put_name(&mut payload, facility);
            payload.extend(days.iter().map(|day| day.index()));
        }
        RequestBody::Create {
            facility,
            day,
            interval,
        } => {
            put_name(&mut payload, facility);
            payload.push(day.index());
            put_hhmm(&mut payload, interval.start());
            put_hhmm(&mut payload, interval.end());
        }
        RequestBody::Shift { offset } | RequestBody::Extend { offset } => {
            payload.extend_from_slice(&offset.to_be_bytes());
        }
        RequestBody::Monitor {
            facility,
            window_minutes,
            callback_port,
        } => {
            put_name(&mut payload, facility);
            payload.extend_from_slice(&window_minutes.to_be_bytes());
            payload.extend_from_slice(&callback_port.to_be_bytes());
        }
        RequestBody::Capacity { facility } => put_name(&mut payload, facility),
        RequestBody::ListFacilities | RequestBody::Cancel => {}
    }
    frame(
        Header {
            word0: request.req_id,
            uid: request.uid,
            opcode: request.opcode().code(),
            payload_len: 0,
        },
        payload,
    )
}

/// Decodes a request datagram.
///
/// On failure the caller can still recover the header with
/// [`Header::decode`] to answer with a protocol error.
pub fn decode_request(data: &[u8]) -> ProtocolResult<Request> {
    let (header, payload) = split(data)?;
    let opcode = Opcode::try_from(header.opcode)?;
    let mut reader = Reader::new(payload);

    let body = match opcode {
        Opcode::Query => {
            let facility = reader.name()?;
            let days = reader
                .rest()
                .iter()
                .map(|&byte| decode_day(byte))
                .collect::<ProtocolResult<Vec<_>>>()?;
            RequestBody::Query { facility, days }
        }
        Opcode::Create => {
            let facility = reader.name()?;
            let day = decode_day(reader.u8()?)?;
            let start = reader.hhmm()?;
            let end = reader.hhmm()?;
            let interval = Interval::new(start, end)?;
            RequestBody::Create {
                facility,
                day,
                interval,
            }
        }
        Opcode::Shift => RequestBody::Shift {
            offset: reader.i32()?,
        },
        Opcode::Monitor => RequestBody::Monitor {
            facility: reader.name()?,
            window_minutes: reader.i32()?,
            callback_port: reader.u16()?,
        },
        Opcode::Capacity => RequestBody::Capacity {
            facility: reader.name()?,
        },
        Opcode::Extend => RequestBody::Extend {
            offset: reader.i32()?,
        },
        Opcode::ListFacilities => RequestBody::ListFacilities,
        Opcode::Cancel => RequestBody::Cancel,
    };

    Ok(Request {
        req_id: header.word0,
        uid: header.uid,
        body,
    })
}

/// Encodes a reply datagram. Non-OK replies carry no payload.
pub fn encode_reply(reply: &Reply) -> ProtocolResult<Vec<u8>> {
    let mut payload = Vec::new();
    if reply.is_ok() {
        match &reply.body {
            ReplyBody::Empty => {}
            ReplyBody::Availability(days) => put_availability(&mut payload, days),
            ReplyBody::Capacity(capacity) => payload.extend_from_slice(&capacity.to_be_bytes()),
            ReplyBody::Facilities(names) => {
                put_len(&mut payload, names.len());
                for name in names {
                    put_name(&mut payload, name);
                }
            }
        }
    }
    frame(
        Header {
            word0: reply.status.code(),
            uid: reply.uid,
            opcode: reply.opcode,
            payload_len: 0,
        },
        payload,
    )
}

/// Decodes a reply datagram, including monitor push frames.
pub fn decode_reply(data: &[u8]) -> ProtocolResult<Reply> {
    let (header, payload) = split(data)?;
    let status = Status::try_from(header.word0)?;
    let mut reader = Reader::new(payload);

    let body = if status != Status::Ok || payload.is_empty() {
        ReplyBody::Empty
    } else {
        match Opcode::try_from(header.opcode)? {
            Opcode::Query | Opcode::Monitor => ReplyBody::Availability(reader.availability()?),
            Opcode::Capacity => ReplyBody::Capacity(reader.u32()?),
            Opcode::ListFacilities => {
                let count = reader.u32()?;
                let mut names = Vec::new();
                for _ in 0..count {
                    names.push(reader.name()?);
                }
                ReplyBody::Facilities(names)
            }
            Opcode::Create | Opcode::Shift | Opcode::Extend | Opcode::Cancel => ReplyBody::Empty,
        }
    };

    Ok(Reply {
        status,
        uid: header.uid,
        opcode: header.opcode,
        body,
    })
}

/// Accepts the raw index `0..=6` or the ASCII digit `'0'..='6'`.
fn decode_day(byte: u8) -> ProtocolResult<Day> {
    let index = if byte.is_ascii_digit() {
        byte - b'0'
    } else {
        byte
    };
    Day::from_index(index).ok_or(ProtocolError::InvalidDay(byte))
}

fn frame(mut header: Header, payload: Vec<u8>) -> ProtocolResult<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    header.payload_len = payload.len() as u32;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    header.encode_into(&mut buf);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Splits a datagram into its header and exactly `payload_len` payload bytes.
fn split(data: &[u8]) -> ProtocolResult<(Header, &[u8])> {
    let header = Header::decode(data)?;
    let len = header.payload_len as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_LEN,
        });
    }
    let end = HEADER_LEN + len;
    if data.len() < end {
        return Err(ProtocolError::Truncated {
            expected: end,
            received: data.len(),
        });
    }
    Ok((header, &data[HEADER_LEN..end]))
}

fn put_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u32).to_be_bytes());
}

fn put_name(buf: &mut Vec<u8>, name: &str) {
    put_len(buf, name.len());
    buf.extend_from_slice(name.as_bytes());
}

fn put_hhmm(buf: &mut Vec<u8>, time: TimeOfDay) {
    let digits = format!("{:02}{:02}", time.hour(), time.minute());
    buf.extend_from_slice(digits.as_bytes());
}

fn put_availability(buf: &mut Vec<u8>, days: &[DayAvailability]) {
    put_len(buf, days.len());
    for availability in days {
        buf.push(availability.day.index());
        put_len(buf, availability.free.len());
        for interval in &availability.free {
            buf.extend_from_slice(&u32::from(interval.start().minutes()).to_be_bytes());
            buf.extend_from_slice(&u32::from(interval.end().minutes()).to_be_bytes());
        }
    }
}

/// Bounds-checked big-endian cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        let data: &'a [u8] = self.data;
        let end = self.pos.saturating_add(n);
        let bytes = data.get(self.pos..end).ok_or(ProtocolError::Truncated {
            expected: end,
            received: self.data.len(),
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn rest(&mut self) -> &'a [u8] {
        let data: &'a [u8] = self.data;
        let rest = &data[self.pos.min(data.len())..];
        self.pos = data.len();
        rest
    }

    fn u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> ProtocolResult<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> ProtocolResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> ProtocolResult<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn name(&mut self) -> ProtocolResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Four HHMM bytes, each an ASCII digit or a raw digit value.
    fn hhmm(&mut self) -> ProtocolResult<TimeOfDay> {
        let mut digits = [0u32; 4];
        for (digit, byte) in digits.iter_mut().zip(self.array::<4>()?) {
            *digit = match byte {
                b'0'..=b'9' => u32::from(byte - b'0'),
                0..=9 => u32::from(byte),
                other => return Err(ProtocolError::InvalidTimeDigit(other)),
            };
        }
        let hour = digits[0] * 10 + digits[1];
        let minute = digits[2] * 10 + digits[3];
        Ok(TimeOfDay::from_hm(hour, minute)?)
    }

    fn availability(&mut self) -> ProtocolResult<Vec<DayAvailability>> {
        let count = self.u32()?;
        let mut days = Vec::new();
        for _ in 0..count {
            let day = decode_day(self.u8()?)?;
            let intervals = self.u32()?;
            let mut free = Vec::new();
            for _ in 0..intervals {
                let start = self.u32()?;
                let end = self.u32()?;
                free.push(Interval::from_minutes(start, end)?);
            }
            days.push(DayAvailability { day, free });
        }
        Ok(days)
    }
}
