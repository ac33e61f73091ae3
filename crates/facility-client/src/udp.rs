//! UDP client for the facility booking server.
//!
//! Each call sends one request datagram and waits for the server's ACK and
//! then its reply, each bounded by the configured timeout. When either wait
//! runs out the identical bytes (same request id) are sent again, up to the
//! configured number of retries.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{UdpSocket, lookup_host};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};
use uuid::Uuid;

use facility_core::{Day, DayAvailability, Interval};
use facility_protocol::{
    ACK, MAX_DATAGRAM_SIZE, Opcode, Reply, ReplyBody, Request, RequestBody, Status, decode_reply,
    encode_request,
};

use crate::error::{ClientError, ClientResult};

/// Client bound to one server.
pub struct UdpClient {
    socket: UdpSocket,
    server: SocketAddr,
    timeout: Duration,
    retries: u32,
    next_req_id: u32,
}

impl UdpClient {
    /// Resolves `server` (`host:port`) and binds an ephemeral local socket.
    pub async fn connect(server: &str, timeout: Duration, retries: u32) -> ClientResult<Self> {
        let addr = lookup_host(server)
            .await
            .map_err(|e| ClientError::Connection(format!("failed to resolve {}: {}", server, e)))?
            .next()
            .ok_or_else(|| ClientError::Connection(format!("no address for {}", server)))?;
        Self::new(addr, timeout, retries).await
    }

    /// Binds an ephemeral local socket for talking to `server`.
    pub async fn new(server: SocketAddr, timeout: Duration, retries: u32) -> ClientResult<Self> {
        let local = if server.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(server).await.map_err(|e| {
            ClientError::Connection(format!("failed to connect to {}: {}", server, e))
        })?;

        // Request ids start at a random value per process.
        let next_req_id = Uuid::new_v4().as_u128() as u32;
        debug!(%server, local = %socket.local_addr()?, next_req_id, "UDP client ready");

        Ok(Self {
            socket,
            server,
            timeout,
            retries,
            next_req_id,
        })
    }

    /// Server address.
    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Local address of the client socket.
    pub fn local_addr(&self) -> ClientResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn take_req_id(&mut self) -> u32 {
        let id = self.next_req_id;
        self.next_req_id = id.wrapping_add(1);
        id
    }

    /// Sends a request and returns the server's reply, whatever its status.
    #[tracing::instrument(skip(self, body), fields(server = %self.server, opcode = %body.opcode()))]
    pub async fn call(&mut self, uid: u32, body: RequestBody) -> ClientResult<Reply> {
        self.discard_pending();
        let request = Request::for_booking(self.take_req_id(), uid, body);
        let bytes = encode_request(&request)?;
        let opcode = request.opcode().code();
        let attempts = self.retries + 1;

        for attempt in 1..=attempts {
            debug!(req_id = request.req_id, attempt, "Sending request");
            self.socket.send(&bytes).await?;
            if let Some(reply) = self.await_reply(opcode).await? {
                debug!(req_id = request.req_id, status = %reply.status, "Reply received");
                return Ok(reply);
            }
            if attempt < attempts {
                warn!(req_id = request.req_id, attempt, "No reply, retransmitting");
            }
        }
        Err(ClientError::Timeout { attempts })
    }

    /// Drops datagrams already queued on the socket, such as the second
    /// reply to a retransmitted request.
    fn discard_pending(&self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            match self.socket.try_recv(&mut buf) {
                Ok(len) => debug!(len, "Discarding late datagram"),
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "Stopped discarding datagrams");
                    break;
                }
            }
        }
    }

    /// Waits for the ACK and then the reply. `None` means the attempt timed
    /// out.
    async fn await_reply(&self, opcode: u32) -> ClientResult<Option<Reply>> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut deadline = Instant::now() + self.timeout;
        let mut acked = false;

        loop {
            let len = match timeout_at(deadline, self.socket.recv(&mut buf)).await {
                Err(_) => {
                    debug!(acked, "Timed out waiting for server");
                    return Ok(None);
                }
                Ok(Ok(len)) => len,
                Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    debug!("Server port unreachable");
                    tokio::time::sleep_until(deadline).await;
                    return Ok(None);
                }
                Ok(Err(e)) => return Err(e.into()),
            };
            let data = &buf[..len];

            if data == ACK {
                if !acked {
                    acked = true;
                    deadline = Instant::now() + self.timeout;
                }
                continue;
            }

            match decode_reply(data) {
                Ok(reply) if reply.opcode == opcode => return Ok(Some(reply)),
                Ok(reply) => {
                    debug!(opcode = reply.opcode, "Skipping reply to an earlier request");
                }
                Err(e) => {
                    warn!(len, error = %e, "Ignoring undecodable datagram");
                }
            }
        }
    }

    /// Sends a request and fails unless the reply status is OK.
    async fn call_ok(&mut self, uid: u32, body: RequestBody) -> ClientResult<Reply> {
        let reply = self.call(uid, body).await?;
        if reply.status == Status::Ok {
            Ok(reply)
        } else {
            Err(ClientError::Server(reply.status))
        }
    }

    /// Free windows of `facility` on `days`.
    pub async fn query(
        &mut self,
        facility: &str,
        days: &[Day],
    ) -> ClientResult<Vec<DayAvailability>> {
        let body = RequestBody::Query {
            facility: facility.to_string(),
            days: days.to_vec(),
        };
        availability(self.call_ok(0, body).await?)
    }

    /// Books `interval` on `day`. Returns the confirmation id.
    pub async fn book(&mut self, facility: &str, day: Day, interval: Interval) -> ClientResult<u32> {
        let body = RequestBody::Create {
            facility: facility.to_string(),
            day,
            interval,
        };
        Ok(self.call_ok(0, body).await?.uid)
    }

    /// Moves booking `uid` by `offset` minutes.
    pub async fn shift(&mut self, uid: u32, offset: i32) -> ClientResult<()> {
        self.call_ok(uid, RequestBody::Shift { offset }).await?;
        Ok(())
    }

    /// Moves the end of booking `uid` by `offset` minutes.
    pub async fn extend(&mut self, uid: u32, offset: i32) -> ClientResult<()> {
        self.call_ok(uid, RequestBody::Extend { offset }).await?;
        Ok(())
    }

    /// Cancels booking `uid`.
    pub async fn cancel(&mut self, uid: u32) -> ClientResult<()> {
        self.call_ok(uid, RequestBody::Cancel).await?;
        Ok(())
    }

    /// Registers for availability pushes to `callback_port` on this host for
    /// `window_minutes`.
    pub async fn monitor(
        &mut self,
        facility: &str,
        window_minutes: i32,
        callback_port: u16,
    ) -> ClientResult<()> {
        let body = RequestBody::Monitor {
            facility: facility.to_string(),
            window_minutes,
            callback_port,
        };
        self.call_ok(0, body).await?;
        Ok(())
    }

    /// Capacity of `facility`.
    pub async fn capacity(&mut self, facility: &str) -> ClientResult<u32> {
        let body = RequestBody::Capacity {
            facility: facility.to_string(),
        };
        match self.call_ok(0, body).await?.body {
            ReplyBody::Capacity(capacity) => Ok(capacity),
            other => Err(unexpected(Opcode::Capacity, &other)),
        }
    }

    /// Names of all facilities.
    pub async fn list(&mut self) -> ClientResult<Vec<String>> {
        match self.call_ok(0, RequestBody::ListFacilities).await?.body {
            ReplyBody::Facilities(names) => Ok(names),
            ReplyBody::Empty => Ok(Vec::new()),
            other => Err(unexpected(Opcode::ListFacilities, &other)),
        }
    }
}

fn availability(reply: Reply) -> ClientResult<Vec<DayAvailability>> {
    match reply.body {
        ReplyBody::Availability(days) => Ok(days),
        ReplyBody::Empty => Ok(Vec::new()),
        other => Err(ClientError::Connection(format!(
            "unexpected {:?} payload for availability",
            other
        ))),
    }
}

fn unexpected(opcode: Opcode, body: &ReplyBody) -> ClientError {
    ClientError::Connection(format!("unexpected {:?} payload for {}", body, opcode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_protocol::encode_reply;
    use facility_server::{FacilitySpec, ServerConfig, UdpServer};

    async fn spawn_server(config: ServerConfig) -> SocketAddr {
        let mut server = UdpServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    fn config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap()).with_facilities(vec![
            FacilitySpec::new("Gym", 30),
            FacilitySpec::new("Pool", 12),
        ])
    }

    async fn client(addr: SocketAddr) -> UdpClient {
        UdpClient::new(addr, Duration::from_millis(300), 2)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn booking_round_trip() {
        let addr = spawn_server(config()).await;
        let mut client = client(addr).await;

        assert_eq!(client.list().await.unwrap(), vec!["Gym", "Pool"]);
        assert_eq!(client.capacity("Pool").await.unwrap(), 12);

        let uid = client
            .book("Gym", Day::Monday, Interval::from_minutes(540, 600).unwrap())
            .await
            .unwrap();
        assert_eq!(uid, 1);

        let week = client.query("Gym", &[Day::Monday]).await.unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(
            week[0].free,
            vec![
                Interval::from_minutes(0, 540).unwrap(),
                Interval::from_minutes(600, 1439).unwrap(),
            ]
        );

        client.shift(uid, 60).await.unwrap();
        client.extend(uid, 30).await.unwrap();
        let week = client.query("Gym", &[Day::Monday]).await.unwrap();
        assert_eq!(week[0].free[1], Interval::from_minutes(690, 1439).unwrap());

        client.cancel(uid).await.unwrap();
        let week = client.query("Gym", &[Day::Monday]).await.unwrap();
        assert_eq!(week[0].free, vec![Interval::whole_day()]);
    }

    #[tokio::test]
    async fn failure_statuses_become_errors() {
        let addr = spawn_server(config()).await;
        let mut client = client(addr).await;

        let err = client.capacity("Sauna").await.unwrap_err();
        assert!(matches!(err, ClientError::Server(Status::UnknownFacility)));

        let err = client.monitor("Sauna", 5, 4000).await.unwrap_err();
        assert!(matches!(err, ClientError::Server(Status::UnknownFacility)));

        let err = client.monitor("Gym", -1, 4000).await.unwrap_err();
        assert!(matches!(err, ClientError::Server(Status::Unavailable)));

        let err = client.cancel(99).await.unwrap_err();
        assert!(matches!(err, ClientError::Server(Status::UnknownBooking)));

        client
            .book("Gym", Day::Friday, Interval::from_minutes(60, 120).unwrap())
            .await
            .unwrap();
        let err = client
            .book("Gym", Day::Friday, Interval::from_minutes(90, 150).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Server(Status::Unavailable)));
    }

    #[tokio::test]
    async fn retransmits_after_simulated_failure() {
        let addr = spawn_server(config().with_simulate_failure(true)).await;
        let mut client = client(addr).await;

        let reply = client.call(0, RequestBody::ListFacilities).await.unwrap();
        assert!(reply.is_ok());
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        let mut client = UdpClient::new(addr, Duration::from_millis(50), 1)
            .await
            .unwrap();

        let err = client.list().await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { attempts: 2 }));

        let mut buf = [0u8; 64];
        let (first, _) = silent.recv_from(&mut buf).await.unwrap();
        let first = buf[..first].to_vec();
        let (second, _) = silent.recv_from(&mut buf).await.unwrap();
        assert_eq!(first, &buf[..second], "retransmission reuses the request bytes");
    }

    #[tokio::test]
    async fn skips_stale_replies() {
        let fake = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = fake.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (_, peer) = fake.recv_from(&mut buf).await.unwrap();
            fake.send_to(ACK, peer).await.unwrap();
            let stale = encode_reply(&Reply::ok(7, Opcode::Create, ReplyBody::Empty)).unwrap();
            fake.send_to(&stale, peer).await.unwrap();
            fake.send_to(b"junk", peer).await.unwrap();
            let fresh =
                encode_reply(&Reply::ok(0, Opcode::Capacity, ReplyBody::Capacity(42))).unwrap();
            fake.send_to(&fresh, peer).await.unwrap();
        });

        let mut client = client(addr).await;
        assert_eq!(client.capacity("Gym").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn late_duplicate_reply_is_not_taken_for_the_next() {
        let fake = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = fake.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (_, peer) = fake.recv_from(&mut buf).await.unwrap();
            fake.send_to(ACK, peer).await.unwrap();
            let booked = encode_reply(&Reply::ok(1, Opcode::Create, ReplyBody::Empty)).unwrap();
            fake.send_to(&booked, peer).await.unwrap();
            // Answer to a retransmission of the same request.
            fake.send_to(ACK, peer).await.unwrap();
            let conflict =
                encode_reply(&Reply::error(Status::Unavailable, 0, Opcode::Create.code()))
                    .unwrap();
            fake.send_to(&conflict, peer).await.unwrap();

            let (_, peer) = fake.recv_from(&mut buf).await.unwrap();
            fake.send_to(ACK, peer).await.unwrap();
            let booked = encode_reply(&Reply::ok(2, Opcode::Create, ReplyBody::Empty)).unwrap();
            fake.send_to(&booked, peer).await.unwrap();
        });

        let mut client = client(addr).await;
        let first = client
            .book("Gym", Day::Monday, Interval::from_minutes(60, 120).unwrap())
            .await
            .unwrap();
        assert_eq!(first, 1);

        let second = client
            .book("Gym", Day::Tuesday, Interval::from_minutes(60, 120).unwrap())
            .await
            .unwrap();
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn request_ids_increment() {
        let fake = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut client = UdpClient::new(fake.local_addr().unwrap(), Duration::from_millis(10), 0)
            .await
            .unwrap();
        let first = client.take_req_id();
        assert_eq!(client.take_req_id(), first.wrapping_add(1));
    }

    #[tokio::test]
    async fn connect_parses_address_strings() {
        let addr = spawn_server(config()).await;
        let mut client = UdpClient::connect(
            &format!("127.0.0.1:{}", addr.port()),
            Duration::from_millis(300),
            1,
        )
        .await
        .unwrap();
        assert_eq!(client.server_addr(), addr);
        assert_eq!(client.list().await.unwrap().len(), 2);
    }
}
