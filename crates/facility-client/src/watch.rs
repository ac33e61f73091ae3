//! Receiver for monitor pushes.
//!
//! The server connects back to the port named in the MONITOR request and
//! writes one reply frame per availability change. A frame is a 16-byte
//! header followed by `payload_len` bytes.

use std::io;
use std::net::{IpAddr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use facility_core::DayAvailability;
use facility_protocol::{
    HEADER_LEN, Header, MAX_PAYLOAD_LEN, ProtocolError, Reply, ReplyBody, Status, decode_reply,
};

use crate::error::{ClientError, ClientResult};

/// Accepts the server's push connection and yields availability updates.
///
/// Only one push connection is read at a time; further connections wait in
/// the listen backlog until the current one is dropped.
pub struct Watcher {
    listener: TcpListener,
    stream: Option<TcpStream>,
}

enum Event {
    Expired,
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Frame(ClientResult<Option<Reply>>),
}

impl Watcher {
    /// Listens on an ephemeral TCP port of `ip`.
    pub async fn bind(ip: IpAddr) -> ClientResult<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, 0)).await?;
        debug!(addr = %listener.local_addr()?, "Listening for monitor pushes");
        Ok(Self {
            listener,
            stream: None,
        })
    }

    /// Port to put in the MONITOR request.
    pub fn port(&self) -> ClientResult<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Waits for the next availability push. Returns `None` once `deadline`
    /// passes or the server closes the push connection.
    pub async fn next_update(
        &mut self,
        deadline: Instant,
    ) -> ClientResult<Option<Vec<DayAvailability>>> {
        loop {
            let event = tokio::select! {
                _ = sleep_until(deadline) => Event::Expired,
                accepted = self.listener.accept(), if self.stream.is_none() => {
                    Event::Accepted(accepted)
                }
                frame = read_next(&mut self.stream) => Event::Frame(frame),
            };

            match event {
                Event::Expired => return Ok(None),
                Event::Accepted(Ok((stream, peer))) => {
                    info!(%peer, "Server connected for pushes");
                    self.stream = Some(stream);
                }
                Event::Accepted(Err(e)) => {
                    warn!(error = %e, "Failed to accept push connection");
                }
                Event::Frame(Ok(Some(Reply {
                    status: Status::Ok,
                    body: ReplyBody::Availability(days),
                    ..
                }))) => return Ok(Some(days)),
                Event::Frame(Ok(Some(reply))) => {
                    debug!(status = %reply.status, opcode = reply.opcode, "Ignoring push frame");
                }
                Event::Frame(Ok(None)) => {
                    info!("Server closed the push connection");
                    self.stream = None;
                    return Ok(None);
                }
                Event::Frame(Err(e)) => {
                    warn!(error = %e, "Dropping push connection");
                    self.stream = None;
                }
            }
        }
    }
}

async fn read_next(stream: &mut Option<TcpStream>) -> ClientResult<Option<Reply>> {
    match stream {
        Some(stream) => read_frame(stream).await,
        None => std::future::pending().await,
    }
}

/// Reads one reply frame. Returns `None` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> ClientResult<Option<Reply>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = Header::decode(&header)?.payload_len as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(ClientError::Protocol(ProtocolError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_LEN,
        }));
    }

    let mut frame = vec![0u8; HEADER_LEN + len];
    frame[..HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_LEN..]).await?;
    Ok(Some(decode_reply(&frame)?))
}
