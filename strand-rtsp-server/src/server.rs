use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use strand_rtsp_protocol::Status;

use crate::app::config::ServerConfig;
use crate::conn::{self, ConnectionConfig, ConnectionHandle, ConnectionId, ConnectionIdGenerator, StreamInfo};
use crate::error::Error;
use crate::handler::Handler;
use crate::session::{Session, SessionHandle, SessionId, SessionReply, SessionRequest};

/// What connections and sessions need from the server: the router for
/// requests of unbound connections, the registry to report closing to, and
/// the shared settings and hooks.
#[derive(Clone)]
pub struct ServerHandle {
    pub(crate) session_request_tx: mpsc::Sender<SessionRequest>,
    connection_close_tx: mpsc::Sender<ConnectionId>,
    session_close_tx: mpsc::Sender<SessionId>,
    handler: Arc<dyn Handler>,
    config: ConnectionConfig,
    token: CancellationToken,
    tracker: TaskTracker,
}

pub(crate) struct ServerInbox {
    pub session_requests: mpsc::Receiver<SessionRequest>,
    pub closed_connections: mpsc::Receiver<ConnectionId>,
    pub closed_sessions: mpsc::Receiver<SessionId>,
}

impl ServerHandle {
    pub(crate) fn new(
        handler: Arc<dyn Handler>,
        config: ConnectionConfig,
        token: CancellationToken,
        tracker: TaskTracker,
    ) -> (Self, ServerInbox) {
        let (session_request_tx, session_requests) = mpsc::channel(1);
        let (connection_close_tx, closed_connections) = mpsc::channel(1);
        let (session_close_tx, closed_sessions) = mpsc::channel(1);
        (
            Self {
                session_request_tx,
                connection_close_tx,
                session_close_tx,
                handler,
                config,
                token,
                tracker,
            },
            ServerInbox {
                session_requests,
                closed_connections,
                closed_sessions,
            },
        )
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub(crate) async fn connection_closed(&self, id: ConnectionId) {
        select! {
            _ = self.connection_close_tx.send(id) => {},
            _ = self.token.cancelled() => {},
        }
    }

    pub(crate) async fn session_closed(&self, session: &SessionHandle) {
        select! {
            _ = self.session_close_tx.send(session.secret_id().clone()) => {},
            _ = self.token.cancelled() => {},
        }
    }
}

pub struct Server {
    local_addr: SocketAddr,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Server {
    pub async fn start(config: &ServerConfig, handler: impl Handler) -> Result<Self, Error> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (server, inbox) = ServerHandle::new(
            Arc::new(handler),
            config.connection_config(),
            token.clone(),
            tracker.clone(),
        );

        let (accepted_tx, accepted_rx) = mpsc::channel(1);
        tracker.spawn(accept_loop(listener, accepted_tx, token.clone()));
        tracker.spawn(Registry::new(server).run(inbox, accepted_rx));

        tracing::info!(%local_addr, "server started");
        Ok(Self {
            local_addr,
            token,
            tracker,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every connection and session, and wait until
    /// all of them are gone.
    pub async fn stop(&self) {
        tracing::trace!("stopping server");
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    accepted_tx: mpsc::Sender<(TcpStream, StreamInfo)>,
    token: CancellationToken,
) {
    loop {
        let accepted = select! {
            // CANCEL SAFETY: `TcpListener::accept` is cancel safe.
            accepted = listener.accept() => accepted,
            _ = token.cancelled() => break,
        };

        let (stream, remote) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::error!(%err, "failed to accept connection");
                continue;
            }
        };

        let info = match stream.local_addr() {
            Ok(local) => StreamInfo { remote, local },
            Err(err) => {
                tracing::warn!(%remote, %err, "dropping connection without local address");
                continue;
            }
        };

        select! {
            _ = accepted_tx.send((stream, info)) => {},
            _ = token.cancelled() => break,
        }
    }
    tracing::trace!("accept loop stopped");
}

/// Registry of live connections and sessions. Routes requests of unbound
/// connections to sessions, creating them on demand.
struct Registry {
    server: ServerHandle,
    connection_ids: ConnectionIdGenerator,
    connections: HashMap<ConnectionId, ConnectionHandle>,
    sessions: HashMap<SessionId, SessionHandle>,
}

impl Registry {
    fn new(server: ServerHandle) -> Self {
        Self {
            server,
            connection_ids: ConnectionIdGenerator::new(),
            connections: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    async fn run(
        mut self,
        mut inbox: ServerInbox,
        mut accepted_rx: mpsc::Receiver<(TcpStream, StreamInfo)>,
    ) {
        let token = self.server.token().clone();
        loop {
            select! {
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some((stream, info)) = accepted_rx.recv() => {
                    let id = self.connection_ids.generate();
                    let connection = conn::open(id, stream, info, &self.server);
                    self.connections.insert(id, connection);
                },
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some(session_request) = inbox.session_requests.recv() => {
                    self.route(session_request).await;
                },
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some(id) = inbox.closed_connections.recv() => {
                    self.connections.remove(&id);
                    tracing::trace!(connection_id = %id, connections = self.connections.len(), "connection removed");
                },
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some(secret_id) = inbox.closed_sessions.recv() => {
                    if let Some(session) = self.sessions.remove(&secret_id) {
                        tracing::trace!(session_id = %session.id(), sessions = self.sessions.len(), "session removed");
                    }
                },
                // CANCEL SAFETY: `CancellationToken::cancelled` is cancel safe.
                _ = token.cancelled() => {
                    break;
                },
            }
        }

        // Children of the server token are already cancelled.
        self.connections.clear();
        self.sessions.clear();
        tracing::trace!("registry stopped");
    }

    async fn route(&mut self, session_request: SessionRequest) {
        let session = match self.sessions.get(&SessionId::from(session_request.id.as_str())) {
            Some(session) => session.clone(),
            None if !session_request.create => {
                tracing::debug!(
                    connection_id = %session_request.connection.id(),
                    "request names session that does not exist",
                );
                let _ = session_request.reply.send(SessionReply::rejected(
                    None,
                    Status::SessionNotFound,
                    Error::SessionNotFound,
                ));
                return;
            }
            None => {
                let session = Session::start(&self.server);
                tracing::debug!(
                    connection_id = %session_request.connection.id(),
                    session_id = %session.id(),
                    "created session",
                );
                self.sessions
                    .insert(session.secret_id().clone(), session.clone());
                session
            }
        };

        select! {
            permit = session.request_tx.reserve() => match permit {
                Ok(permit) => permit.send(session_request),
                Err(_) => reply_terminated(session_request),
            },
            _ = session.token.cancelled() => reply_terminated(session_request),
        }
    }
}

fn reply_terminated(session_request: SessionRequest) {
    let _ = session_request.reply.send(SessionReply::rejected(
        None,
        Status::BadRequest,
        Error::Terminated,
    ));
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    use strand_rtsp_protocol::{AsClient, Codec, MaybeInterleaved, Method, Request, Response};

    use super::Server;
    use crate::app::config::ServerConfig;
    use crate::handler::{Handler, PacketContext, SessionCloseContext};

    const SDP: &[u8] = b"v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=stream\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=control:trackID=0\r\n";

    #[derive(Default)]
    struct Recorder {
        packets: Mutex<Vec<(usize, u16)>>,
        closed_sessions: Mutex<Vec<String>>,
    }

    impl Handler for Arc<Recorder> {
        fn on_session_close(&self, ctx: SessionCloseContext) {
            self.closed_sessions.lock().unwrap().push(ctx.error.to_string());
        }

        fn on_packet_rtp(&self, ctx: PacketContext) {
            self.packets
                .lock()
                .unwrap()
                .push((ctx.track_id, ctx.packet.sequence_number));
        }
    }

    type Client = Framed<TcpStream, Codec<AsClient>>;

    async fn start() -> (Server, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::start(&config, recorder.clone()).await.unwrap();
        (server, recorder)
    }

    async fn connect(server: &Server) -> Client {
        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        Framed::new(stream, Codec::new())
    }

    async fn request(client: &mut Client, request: Request) -> Response {
        client
            .send(MaybeInterleaved::Message(request))
            .await
            .unwrap();
        match client.next().await {
            Some(Ok(MaybeInterleaved::Message(response))) => response,
            _ => panic!("expected response"),
        }
    }

    fn announce() -> Request {
        Request::new(Method::Announce, "rtsp://127.0.0.1/cam".parse().unwrap())
            .with_header("CSeq", "1")
            .with_header("Content-Type", "application/sdp")
            .with_body(Bytes::from_static(SDP))
    }

    fn rtp(sequence_number: u16) -> Bytes {
        let mut data = vec![0x80, 0x60];
        data.extend_from_slice(&sequence_number.to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 2, 0xab]);
        Bytes::from(data)
    }

    #[tokio::test]
    async fn announce_creates_session() {
        let (server, _recorder) = start().await;
        let mut client = connect(&server).await;

        let response = request(&mut client, announce()).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.headers.get("CSeq"), Some("1"));
        assert!(response.headers.get("Session").is_some());

        server.stop().await;
    }

    #[tokio::test]
    async fn session_is_bound_to_its_connection() {
        let (server, _recorder) = start().await;
        let mut owner = connect(&server).await;
        let response = request(&mut owner, announce()).await;
        let session_id = response.headers.get("Session").unwrap().to_string();

        let mut intruder = connect(&server).await;
        let setup = Request::new(Method::Setup, "rtsp://127.0.0.1/cam/trackID=0".parse().unwrap())
            .with_header("CSeq", "1")
            .with_header("Session", session_id.as_str())
            .with_header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record");
        let response = request(&mut intruder, setup).await;
        assert_eq!(response.status, 400);

        server.stop().await;
    }

    #[tokio::test]
    async fn announced_sessions_are_private_to_their_connection() {
        let (server, _recorder) = start().await;
        let mut first = connect(&server).await;
        let mut second = connect(&server).await;

        let first_id = request(&mut first, announce())
            .await
            .headers
            .get("Session")
            .unwrap()
            .to_string();
        let second_id = request(&mut second, announce())
            .await
            .headers
            .get("Session")
            .unwrap()
            .to_string();
        assert_ne!(first_id, second_id);

        for (client, foreign_id) in [(&mut first, &second_id), (&mut second, &first_id)] {
            let setup = Request::new(Method::Setup, "rtsp://127.0.0.1/cam/trackID=0".parse().unwrap())
                .with_header("CSeq", "2")
                .with_header("Session", foreign_id.as_str())
                .with_header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record");
            let response = request(client, setup).await;
            assert_eq!(response.status, 400);
            assert!(response.headers.get("Session").is_none());
        }

        // Each connection still owns its own session.
        let setup = Request::new(Method::Setup, "rtsp://127.0.0.1/cam/trackID=0".parse().unwrap())
            .with_header("CSeq", "3")
            .with_header("Session", first_id.as_str())
            .with_header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record");
        let response = request(&mut first, setup).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.headers.get("Session"), Some(first_id.as_str()));

        server.stop().await;
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (server, _recorder) = start().await;
        let mut client = connect(&server).await;

        let play = Request::new(Method::Play, "rtsp://127.0.0.1/cam".parse().unwrap())
            .with_header("CSeq", "7")
            .with_header("Session", "doesnotexist");
        let response = request(&mut client, play).await;
        assert_eq!(response.status, 454);
        assert_eq!(response.headers.get("CSeq"), Some("7"));

        server.stop().await;
    }

    #[tokio::test]
    async fn record_and_teardown() {
        let (server, recorder) = start().await;
        let mut client = connect(&server).await;

        let response = request(&mut client, announce()).await;
        assert_eq!(response.status, 200);
        let session_id = response.headers.get("Session").unwrap().to_string();

        let setup = Request::new(Method::Setup, "rtsp://127.0.0.1/cam/trackID=0".parse().unwrap())
            .with_header("CSeq", "2")
            .with_header("Session", session_id.as_str())
            .with_header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record");
        let response = request(&mut client, setup).await;
        assert_eq!(response.status, 200);
        assert_eq!(
            response.headers.get("Transport"),
            Some("RTP/AVP/TCP;unicast;interleaved=0-1;mode=RECORD")
        );

        let record = Request::new(Method::Record, "rtsp://127.0.0.1/cam".parse().unwrap())
            .with_header("CSeq", "3")
            .with_header("Session", session_id.as_str());
        assert_eq!(request(&mut client, record).await.status, 200);

        client
            .send(MaybeInterleaved::Interleaved {
                channel: 0,
                payload: rtp(100),
            })
            .await
            .unwrap();
        client
            .send(MaybeInterleaved::Interleaved {
                channel: 1,
                payload: Bytes::from_static(b"rtcp"),
            })
            .await
            .unwrap();

        let teardown = Request::new(Method::Teardown, "rtsp://127.0.0.1/cam".parse().unwrap())
            .with_header("CSeq", "4")
            .with_header("Session", session_id.as_str());
        let response = request(&mut client, teardown).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.headers.get("CSeq"), Some("4"));

        assert_eq!(*recorder.packets.lock().unwrap(), vec![(0, 100)]);

        server.stop().await;
        assert_eq!(
            *recorder.closed_sessions.lock().unwrap(),
            vec!["torn down by client".to_string()]
        );
    }

    #[tokio::test]
    async fn stop_closes_connections() {
        let (server, _recorder) = start().await;
        let mut client = connect(&server).await;
        let options = Request::new(Method::Options, "*".parse().unwrap()).with_header("CSeq", "1");
        assert_eq!(request(&mut client, options).await.status, 200);

        server.stop().await;
        assert!(client.next().await.is_none());
    }
}
