mod bridge;
mod request;

pub mod reader;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use strand_rtsp_protocol::{AsServer, Codec};

use crate::error::Error;
use crate::handler::{ConnCloseContext, ConnOpenContext, Handler};
use crate::server::ServerHandle;
use crate::session::{SessionHandle, SessionId};

use self::reader::{ReadRequest, Reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Default)]
pub struct ConnectionIdGenerator(u64);

impl ConnectionIdGenerator {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn generate(&mut self) -> ConnectionId {
        let id = self.0;
        self.0 += 1;
        ConnectionId(id)
    }
}

/// Transport details of the underlying stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub remote: SocketAddr,
    pub local: SocketAddr,
}

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub read_buffer_count: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            read_buffer_count: 256,
        }
    }
}

#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    info: StreamInfo,
    session_remove_tx: mpsc::Sender<SessionId>,
    pub(crate) token: CancellationToken,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn stream(&self) -> &StreamInfo {
        &self.info
    }

    pub fn ip(&self) -> IpAddr {
        self.info.remote.ip()
    }

    /// IPv6 scope id of the remote address, if any.
    pub fn zone(&self) -> Option<u32> {
        match self.info.remote {
            SocketAddr::V6(addr) if addr.scope_id() != 0 => Some(addr.scope_id()),
            _ => None,
        }
    }

    /// Close the connection. Safe to call more than once and from any task.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Tell the connection that `session` is gone. Gives up when the
    /// connection is shutting down.
    pub(crate) async fn session_removed(&self, session: &SessionHandle) {
        select! {
            _ = self.session_remove_tx.send(session.secret_id().clone()) => {},
            _ = self.token.cancelled() => {},
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("remote", &self.info.remote)
            .finish_non_exhaustive()
    }
}

/// Start serving `stream`. The connection runs until the peer goes away, a
/// fatal error occurs, or it is closed through the returned handle or by
/// stopping the server.
pub fn open<S>(id: ConnectionId, stream: S, info: StreamInfo, server: &ServerHandle) -> ConnectionHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let config = *server.config();
    let (session_remove_tx, session_remove_rx) = mpsc::channel(1);
    let handle = ConnectionHandle {
        id,
        info,
        session_remove_tx,
        token: server.token().child_token(),
    };

    let (read, write) = tokio::io::split(stream);
    let (read_request_tx, read_request_rx) = mpsc::channel(1);
    let (read_error_tx, read_error_rx) = mpsc::channel(1);

    server.handler().on_conn_open(ConnOpenContext {
        connection: &handle,
    });
    tracing::debug!(connection_id = %id, remote = %info.remote, "connection opened");

    let reader = Reader::new(
        FramedRead::new(read, Codec::<AsServer>::new()),
        handle.clone(),
        server.handler().clone(),
        read_request_tx,
        config.read_timeout,
        config.read_buffer_count,
    );
    let reader_task = server.tracker().spawn(reader.run(read_error_tx));

    let dispatcher = Dispatcher {
        connection: handle.clone(),
        session: None,
        outbound: FramedWrite::new(write, Codec::<AsServer>::new()),
        server: server.clone(),
        handler: server.handler().clone(),
        write_timeout: config.write_timeout,
    };
    server.tracker().spawn(dispatcher.run(
        DispatcherInbox {
            read_requests: read_request_rx,
            read_errors: read_error_rx,
            session_removals: session_remove_rx,
        },
        reader_task,
    ));

    handle
}

struct DispatcherInbox {
    read_requests: mpsc::Receiver<ReadRequest>,
    read_errors: mpsc::Receiver<Error>,
    session_removals: mpsc::Receiver<SessionId>,
}

/// Owns the session binding of a connection and the write half of its
/// stream. Handles one inbound message at a time.
struct Dispatcher<W> {
    connection: ConnectionHandle,
    session: Option<SessionHandle>,
    outbound: FramedWrite<W, Codec<AsServer>>,
    server: ServerHandle,
    handler: Arc<dyn Handler>,
    write_timeout: Duration,
}

impl<S> Dispatcher<WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn run(mut self, mut inbox: DispatcherInbox, reader_task: JoinHandle<()>) {
        let id = self.connection.id();

        let cause = loop {
            select! {
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some(read_request) = inbox.read_requests.recv() => {
                    let result = self.handle_read_request(read_request.request).await;
                    let _ = read_request.reply.send(result);
                },
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some(err) = inbox.read_errors.recv() => {
                    break Some(err);
                },
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some(secret_id) = inbox.session_removals.recv() => {
                    if self.session.as_ref().map(SessionHandle::secret_id) == Some(&secret_id) {
                        tracing::trace!(connection_id = %id, "session went away");
                        self.session = None;
                    }
                },
                // CANCEL SAFETY: `CancellationToken::cancelled` is cancel safe.
                _ = self.connection.token.cancelled() => {
                    break Some(Error::Terminated);
                },
            }
        };

        let cause = close_cause(cause, self.server.token().is_cancelled());

        self.teardown(reader_task, cause).await;
    }

    async fn teardown(mut self, reader_task: JoinHandle<()>, cause: Option<Error>) {
        let id = self.connection.id();

        self.connection.token.cancel();
        if let Err(err) = self.outbound.get_mut().shutdown().await {
            tracing::trace!(connection_id = %id, %err, "failed to shut down stream");
        }
        let _ = reader_task.await;

        if let Some(session) = self.session.take() {
            session.connection_detached(id).await;
        }
        self.server.connection_closed(id).await;

        match cause.as_ref() {
            Some(err) => tracing::debug!(connection_id = %id, %err, "connection closed"),
            None => tracing::debug!(connection_id = %id, "connection closed"),
        }
        self.handler.on_conn_close(ConnCloseContext {
            connection: &self.connection,
            error: cause.as_ref(),
        });
    }
}

/// Error reported to the close callback. Stopping together with the server
/// is a clean shutdown; real failures are reported even then.
fn close_cause(cause: Option<Error>, server_stopped: bool) -> Option<Error> {
    match cause {
        Some(Error::Terminated) if server_stopped => None,
        cause => cause,
    }
}
