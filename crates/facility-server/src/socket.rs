//! UDP server loop.
//!
//! One task owns the socket and all booking state. Each datagram is handled
//! to completion (ACK, decode, duplicate check, dispatch, reply, pushes)
//! before the next one is read.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use facility_protocol::{
    ACK, Header, MAX_DATAGRAM_SIZE, Reply, Status, decode_request, encode_reply,
};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{Dispatcher, Notification};
use crate::push::PushTransport;
use crate::semantics::InvocationLayer;

/// The facility booking server.
pub struct UdpServer {
    socket: UdpSocket,
    dispatcher: Dispatcher,
    invocations: InvocationLayer,
    push: PushTransport,
    sweep_interval: Option<Duration>,
    drop_next: bool,
}

enum Event {
    Shutdown,
    Sweep,
    Datagram(std::io::Result<(usize, SocketAddr)>),
}

impl UdpServer {
    /// Validates the configuration and binds the UDP socket.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(config.bind)
            .await
            .map_err(|e| ServerError::bind(config.bind, e))?;

        info!(
            addr = %socket.local_addr()?,
            semantics = %config.semantics,
            simulate_failure = config.simulate_failure,
            facilities = config.facilities.len(),
            "UDP server listening"
        );

        Ok(Self {
            socket,
            dispatcher: Dispatcher::from_config(&config),
            invocations: InvocationLayer::new(config.semantics),
            push: PushTransport::new(config.push_timeout()),
            sweep_interval: config.sweep_interval(),
            drop_next: config.simulate_failure,
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Booking state, for inspection.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handles one received datagram.
    pub async fn handle_datagram(&mut self, data: &[u8], peer: SocketAddr) {
        let drop_replies = std::mem::take(&mut self.drop_next);
        if !drop_replies {
            self.send(ACK, peer).await;
        }

        let Some((reply, notification)) = self.process(data, peer) else {
            return;
        };

        if drop_replies {
            warn!(%peer, "Simulated failure: dropping ACK and reply");
        } else {
            self.send(&reply, peer).await;
        }

        if let Some(notification) = notification {
            self.deliver(notification).await;
        }
    }

    /// Produces the reply bytes for a datagram, or `None` if it must be
    /// dropped.
    fn process(
        &mut self,
        data: &[u8],
        peer: SocketAddr,
    ) -> Option<(Vec<u8>, Option<Notification>)> {
        let header = match Header::decode(data) {
            Ok(header) => header,
            Err(e) => {
                warn!(%peer, len = data.len(), error = %e, "Dropping unreadable datagram");
                return None;
            }
        };

        if let Some(cached) = self.invocations.replay(header.word0) {
            info!(%peer, req_id = header.word0, "Duplicate request, replaying reply");
            return Some((cached, None));
        }

        let (reply, notification) = match decode_request(data) {
            Ok(request) => {
                debug!(%peer, ?request, "Request");
                let now = Instant::now().into_std();
                let dispatched = self.dispatcher.dispatch(&request, peer.ip(), now);
                (dispatched.reply, dispatched.notification)
            }
            Err(e) => {
                warn!(
                    %peer,
                    req_id = header.word0,
                    opcode = header.opcode,
                    error = %e,
                    "Malformed request"
                );
                (Reply::error(Status::Malformed, header.uid, header.opcode), None)
            }
        };
        debug!(%peer, ?reply, "Reply");

        let bytes = match encode_reply(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%peer, error = %e, "Failed to encode reply");
                encode_reply(&Reply::error(Status::Malformed, reply.uid, reply.opcode)).ok()?
            }
        };
        self.invocations.remember(header.word0, &bytes);
        Some((bytes, notification))
    }

    async fn send(&self, bytes: &[u8], peer: SocketAddr) {
        if let Err(e) = self.socket.send_to(bytes, peer).await {
            warn!(%peer, error = %e, "Failed to send datagram");
        }
    }

    async fn deliver(&mut self, notification: Notification) {
        for endpoint in &notification.expired {
            if !self.dispatcher.monitors().is_subscribed(*endpoint) {
                self.push.close(*endpoint);
            }
        }
        let frame = match encode_reply(&notification.frame) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(facility = %notification.facility, error = %e, "Failed to encode push");
                return;
            }
        };
        for endpoint in &notification.live {
            self.push.push(*endpoint, &frame).await;
        }
    }

    /// Drops expired subscriptions and their push connections.
    pub fn sweep(&mut self) {
        let now = Instant::now().into_std();
        for endpoint in self.dispatcher.monitors_mut().sweep_expired(now) {
            if !self.dispatcher.monitors().is_subscribed(endpoint) {
                self.push.close(endpoint);
            }
        }
    }

    /// Serves datagrams until `shutdown` completes.
    pub async fn run_until_shutdown<S>(&mut self, shutdown: S) -> ServerResult<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut sweeper = self.sweep_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => Event::Shutdown,
                _ = tick(&mut sweeper) => Event::Sweep,
                received = self.socket.recv_from(&mut buf) => Event::Datagram(received),
            };

            match event {
                Event::Shutdown => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
                Event::Sweep => self.sweep(),
                Event::Datagram(Ok((len, peer))) => {
                    self.handle_datagram(&buf[..len], peer).await;
                }
                Event::Datagram(Err(e)) => {
                    warn!(error = %e, "Failed to receive datagram");
                }
            }
        }
    }

    /// Serves datagrams forever.
    pub async fn run(&mut self) -> ServerResult<()> {
        self.run_until_shutdown(std::future::pending()).await
    }
}

async fn tick(sweeper: &mut Option<Interval>) {
    match sweeper {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_core::{Day, Interval as Span};
    use facility_protocol::{
        Opcode, ReplyBody, Request, RequestBody, decode_reply, encode_request,
    };
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use crate::config::FacilitySpec;
    use crate::semantics::InvocationSemantics;

    fn config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_facilities(vec![FacilitySpec::new("Gym", 30)])
            .with_push_timeout(Duration::from_secs(1))
    }

    fn span(start: u32, end: u32) -> Span {
        Span::from_minutes(start, end).unwrap()
    }

    fn create(req_id: u32, start: u32, end: u32) -> Vec<u8> {
        encode_request(&Request::new(
            req_id,
            RequestBody::Create {
                facility: "Gym".into(),
                day: Day::Tuesday,
                interval: span(start, end),
            },
        ))
        .unwrap()
    }

    fn query(req_id: u32) -> Vec<u8> {
        encode_request(&Request::new(
            req_id,
            RequestBody::Query {
                facility: "Gym".into(),
                days: vec![Day::Tuesday],
            },
        ))
        .unwrap()
    }

    async fn spawn(config: ServerConfig) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let mut server = UdpServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let _ = server.run().await;
        });
        (addr, task)
    }

    async fn client() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn recv(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        buf.truncate(len);
        buf
    }

    async fn call(socket: &UdpSocket, server: SocketAddr, bytes: &[u8]) -> Reply {
        socket.send_to(bytes, server).await.unwrap();
        assert_eq!(recv(socket).await, ACK);
        decode_reply(&recv(socket).await).unwrap()
    }

    #[tokio::test]
    async fn end_to_end_over_udp() {
        let (addr, task) = spawn(config()).await;
        let socket = client().await;

        let created = call(&socket, addr, &create(1, 540, 630)).await;
        assert_eq!(created.status, Status::Ok);
        let uid = created.uid;

        let reply = call(&socket, addr, &query(2)).await;
        let ReplyBody::Availability(days) = reply.body else {
            panic!("expected availability");
        };
        assert_eq!(days[0].free, vec![span(0, 540), span(630, 1439)]);

        let clash = call(&socket, addr, &create(3, 600, 660)).await;
        assert_eq!(clash.status, Status::Unavailable);

        let cancel = encode_request(&Request::for_booking(4, uid, RequestBody::Cancel)).unwrap();
        assert_eq!(call(&socket, addr, &cancel).await.status, Status::Ok);

        let reply = call(&socket, addr, &query(5)).await;
        let ReplyBody::Availability(days) = reply.body else {
            panic!("expected availability");
        };
        assert_eq!(days[0].free, vec![Span::whole_day()]);

        task.abort();
    }

    #[tokio::test]
    async fn at_most_once_replays_identical_bytes() {
        let config = config().with_semantics(InvocationSemantics::AtMostOnce);
        let mut server = UdpServer::bind(config).await.unwrap();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let request = create(42, 60, 120);
        let (first, _) = server.process(&request, peer).unwrap();
        let (second, _) = server.process(&request, peer).unwrap();
        assert_eq!(first, second);
        assert_eq!(server.dispatcher().bookings().len(), 1);

        // A failed first execution is replayed too.
        let clash = create(43, 90, 150);
        let (first, _) = server.process(&clash, peer).unwrap();
        let (second, _) = server.process(&clash, peer).unwrap();
        assert_eq!(first, second);
        assert_eq!(decode_reply(&first).unwrap().status, Status::Unavailable);
    }

    /// A retried CREATE runs again under at-least-once and yields a second
    /// booking. A byte-identical retry would fail the overlap check instead
    /// (see `at_least_once_retry_of_same_create_conflicts`), so the retry
    /// keeps the request id but targets another day.
    #[tokio::test]
    async fn at_least_once_executes_duplicates() {
        let mut server = UdpServer::bind(config()).await.unwrap();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let first = server.process(&create(42, 60, 120), peer).unwrap().0;
        let retry = encode_request(&Request::new(
            42,
            RequestBody::Create {
                facility: "Gym".into(),
                day: Day::Wednesday,
                interval: span(60, 120),
            },
        ))
        .unwrap();
        let second = server.process(&retry, peer).unwrap().0;

        let first = decode_reply(&first).unwrap();
        let second = decode_reply(&second).unwrap();
        assert_ne!(first.uid, second.uid);
        assert_eq!(server.dispatcher().bookings().len(), 2);
    }

    #[tokio::test]
    async fn at_least_once_retry_of_same_create_conflicts() {
        let mut server = UdpServer::bind(config()).await.unwrap();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let request = create(7, 60, 120);
        let first = decode_reply(&server.process(&request, peer).unwrap().0).unwrap();
        let second = decode_reply(&server.process(&request, peer).unwrap().0).unwrap();
        assert_eq!(first.status, Status::Ok);
        assert_eq!(second.status, Status::Unavailable);
    }

    #[tokio::test]
    async fn malformed_and_unreadable_datagrams() {
        let mut server = UdpServer::bind(config()).await.unwrap();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();

        assert!(server.process(&[1, 2, 3], peer).is_none());

        let mut unknown = Vec::new();
        for word in [5u32, 6, 999, 0] {
            unknown.extend_from_slice(&word.to_be_bytes());
        }
        let reply = decode_reply(&server.process(&unknown, peer).unwrap().0).unwrap();
        assert_eq!(reply.status, Status::Malformed);
        assert_eq!(reply.uid, 6);
        assert_eq!(reply.opcode, 999);

        let mut truncated = create(8, 60, 120);
        truncated.truncate(truncated.len() - 2);
        let reply = decode_reply(&server.process(&truncated, peer).unwrap().0).unwrap();
        assert_eq!(reply.status, Status::Malformed);
        assert_eq!(reply.opcode, Opcode::Create.code());
    }

    #[tokio::test]
    async fn simulated_failure_drops_first_replies() {
        let (addr, task) = spawn(config().with_simulate_failure(true)).await;
        let socket = client().await;

        socket.send_to(&create(1, 60, 120), addr).await.unwrap();
        let mut buf = [0u8; 64];
        let silent =
            tokio::time::timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
        assert!(silent.is_err());

        // The booking was made, so the at-least-once retry now conflicts.
        let retry = call(&socket, addr, &create(1, 60, 120)).await;
        assert_eq!(retry.status, Status::Unavailable);

        task.abort();
    }

    #[tokio::test]
    async fn monitor_receives_push_over_tcp() {
        let (addr, task) = spawn(config()).await;
        let socket = client().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let callback_port = listener.local_addr().unwrap().port();

        let monitor = encode_request(&Request::new(
            1,
            RequestBody::Monitor {
                facility: "Gym".into(),
                window_minutes: 5,
                callback_port,
            },
        ))
        .unwrap();
        assert_eq!(call(&socket, addr, &monitor).await.status, Status::Ok);

        assert_eq!(call(&socket, addr, &create(2, 60, 120)).await.status, Status::Ok);

        let (mut stream, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let mut header = [0u8; 16];
        stream.read_exact(&mut header).await.unwrap();
        let len = u32::from_be_bytes(header[12..16].try_into().unwrap()) as usize;
        let mut frame = header.to_vec();
        frame.resize(16 + len, 0);
        stream.read_exact(&mut frame[16..]).await.unwrap();

        let push = decode_reply(&frame).unwrap();
        assert_eq!(push.opcode, Opcode::Monitor.code());
        let ReplyBody::Availability(days) = push.body else {
            panic!("expected availability");
        };
        assert_eq!(days.len(), 7);
        assert_eq!(days[1].free, vec![span(0, 60), span(120, 1439)]);

        task.abort();
    }

    #[tokio::test]
    async fn shutdown_stops_loop() {
        let mut server = UdpServer::bind(config()).await.unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            server.run_until_shutdown(async {}),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn bind_rejects_invalid_config() {
        let result = UdpServer::bind(config().with_facilities(Vec::new())).await;
        assert!(matches!(result, Err(ServerError::Config { .. })));
    }
}
