//! Wire protocol for the facility booking service.
//!
//! Clients talk to the server over UDP. Each request datagram carries a
//! 16-byte big-endian header (`req_id`, `uid`, `opcode`, `payload_len`) and an
//! opcode-specific payload; the server answers with an [`ACK`] datagram
//! followed by a reply whose first header word is the [`Status`].
//!
//! # Example
//!
//! ```rust
//! use facility_protocol::{Request, RequestBody, decode_request, encode_request};
//!
//! let request = Request::new(1, RequestBody::ListFacilities);
//! let bytes = encode_request(&request).unwrap();
//! assert_eq!(bytes.len(), 16);
//! assert_eq!(decode_request(&bytes).unwrap(), request);
//! ```

mod error;
mod types;
mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use types::{Header, Opcode, Reply, ReplyBody, Request, RequestBody, Status};
pub use wire::{
    ACK, HEADER_LEN, MAX_DATAGRAM_SIZE, MAX_PAYLOAD_LEN, decode_reply, decode_request,
    encode_reply, encode_request,
};
