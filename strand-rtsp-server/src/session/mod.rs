pub mod setup;
pub mod track;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use strand_rtsp_protocol as rtsp;

use crate::conn::reader::{Interleaved, InterleavedMode, ReadStrategy};
use crate::conn::{ConnectionHandle, ConnectionId};
use crate::error::Error;
use crate::handler::{Handler, SessionCloseContext, SessionOpenContext};
use crate::server::ServerHandle;
use crate::session::setup::{track_id_from_path, InterleavedSetup};
use crate::session::track::{tracks_from_sdp, Track};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    const SESSION_ID_LEN: u32 = 8;
    const SECRET_ID_LEN: usize = 16;

    /// Public identifier, used in logs and by the application.
    pub fn generate() -> SessionId {
        SessionId(
            rand::thread_rng()
                .sample(rand::distributions::Uniform::from(
                    10_u32.pow(Self::SESSION_ID_LEN - 1)..10_u32.pow(Self::SESSION_ID_LEN),
                ))
                .to_string(),
        )
    }

    /// Identifier handed to the client in the `Session` header. Knowing it is
    /// what entitles a request to address the session.
    pub fn generate_secret() -> SessionId {
        SessionId(
            rand::thread_rng()
                .sample_iter(&rand::distributions::Alphanumeric)
                .take(Self::SECRET_ID_LEN)
                .map(char::from)
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SessionId {
    fn from(session_id: &str) -> Self {
        SessionId(session_id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initialized,
    Playing,
    Recording,
    Paused,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionState::Initialized => write!(f, "initialized"),
            SessionState::Playing => write!(f, "playing"),
            SessionState::Recording => write!(f, "recording"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// A session-affine request, sent by a connection to its bound session or,
/// when unbound, to the server which routes it.
pub struct SessionRequest {
    pub connection: ConnectionHandle,
    pub request: rtsp::Request,
    /// Session id claimed by the request, empty if none.
    pub id: String,
    /// Create a session when none matches `id`.
    pub create: bool,
    pub reply: oneshot::Sender<SessionReply>,
}

pub struct SessionReply {
    /// Session the connection is bound to from now on.
    pub session: Option<SessionHandle>,
    pub result: Result<rtsp::Response, Rejected>,
    /// Read strategy the connection switches to, if any.
    pub strategy: Option<ReadStrategy>,
}

impl SessionReply {
    pub fn rejected(session: Option<SessionHandle>, status: rtsp::Status, error: Error) -> Self {
        Self {
            session,
            result: Err(Rejected::new(status, error)),
            strategy: None,
        }
    }
}

/// Negative outcome of a request, carrying the response the peer receives.
#[derive(Debug)]
pub struct Rejected {
    pub response: rtsp::Response,
    pub error: Error,
}

impl Rejected {
    pub fn new(status: rtsp::Status, error: Error) -> Self {
        Self {
            response: rtsp::Response::error(status).build(),
            error,
        }
    }
}

#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    secret_id: SessionId,
    pub(crate) request_tx: mpsc::Sender<SessionRequest>,
    pub(crate) detach_tx: mpsc::Sender<ConnectionId>,
    pub(crate) writer_start_tx: mpsc::Sender<ConnectionId>,
    pub(crate) token: CancellationToken,
}

pub(crate) struct SessionInbox {
    pub requests: mpsc::Receiver<SessionRequest>,
    pub detached: mpsc::Receiver<ConnectionId>,
    pub writer_start: mpsc::Receiver<ConnectionId>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        secret_id: SessionId,
        token: CancellationToken,
    ) -> (Self, SessionInbox) {
        let (request_tx, requests) = mpsc::channel(1);
        let (detach_tx, detached) = mpsc::channel(1);
        let (writer_start_tx, writer_start) = mpsc::channel(1);
        (
            Self {
                id,
                secret_id,
                request_tx,
                detach_tx,
                writer_start_tx,
                token,
            },
            SessionInbox {
                requests,
                detached,
                writer_start,
            },
        )
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn secret_id(&self) -> &SessionId {
        &self.secret_id
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    /// Tell the session that `connection` is gone. Gives up when the session
    /// is shutting down.
    pub(crate) async fn connection_detached(&self, connection: ConnectionId) {
        select! {
            _ = self.detach_tx.send(connection) => {},
            _ = self.token.cancelled() => {},
        }
    }

    /// Tell the session that `connection` reads interleaved data from now on.
    /// Gives up when the session is shutting down.
    pub(crate) async fn writer_started(&self, connection: ConnectionId) {
        select! {
            _ = self.writer_start_tx.send(connection) => {},
            _ = self.token.cancelled() => {},
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Session actor. Owns the session state machine; everything else talks to
/// it through its [`SessionHandle`].
pub struct Session {
    handle: SessionHandle,
    server: ServerHandle,
    handler: Arc<dyn Handler>,
    state: SessionState,
    connection: Option<ConnectionHandle>,
    tracks: Vec<Track>,
    announced: bool,
}

impl Session {
    pub fn start(server: &ServerHandle) -> SessionHandle {
        let (handle, inbox) = SessionHandle::new(
            SessionId::generate(),
            SessionId::generate_secret(),
            server.token().child_token(),
        );

        let session = Self {
            handle: handle.clone(),
            server: server.clone(),
            handler: server.handler().clone(),
            state: SessionState::Initialized,
            connection: None,
            tracks: Vec::new(),
            announced: false,
        };

        tracing::trace!(id = %handle.id(), "starting session");
        server.tracker().spawn(session.run(inbox));

        handle
    }

    async fn run(mut self, mut inbox: SessionInbox) {
        let cause = loop {
            select! {
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some(request) = inbox.requests.recv() => {
                    if let Some(cause) = self.handle_request(request) {
                        break cause;
                    }
                },
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some(connection_id) = inbox.detached.recv() => {
                    if self.connection.as_ref().map(ConnectionHandle::id) == Some(connection_id) {
                        break Error::ConnectionClosed;
                    }
                },
                // CANCEL SAFETY: `mpsc::Receiver::recv` is cancel safe.
                Some(connection_id) = inbox.writer_start.recv() => {
                    tracing::trace!(
                        id = %self.handle.id(),
                        %connection_id,
                        state = %self.state,
                        "connection switched to interleaved",
                    );
                },
                // CANCEL SAFETY: `CancellationToken::cancelled` is cancel safe.
                _ = self.handle.token.cancelled() => {
                    break Error::Terminated;
                },
            }
        };

        self.close(cause).await;
    }

    /// Handle one request and reply to it. Returns the close cause if the
    /// session ends because of it.
    fn handle_request(&mut self, session_request: SessionRequest) -> Option<Error> {
        let SessionRequest {
            connection,
            request,
            reply,
            ..
        } = session_request;

        match self.connection.as_ref() {
            Some(bound) if bound.id() != connection.id() => {
                tracing::debug!(
                    id = %self.handle.id(),
                    connection_id = %connection.id(),
                    "request from connection other than the one bound to session",
                );
                let _ = reply.send(SessionReply::rejected(
                    None,
                    rtsp::Status::BadRequest,
                    Error::SessionLinkedToOtherConnection,
                ));
                return None;
            }
            Some(_) => {}
            None => {
                self.handler.on_session_open(SessionOpenContext {
                    session: &self.handle,
                    connection: &connection,
                    request: &request,
                });
                self.connection = Some(connection);
            }
        }

        let (result, strategy) = match self.handle(&request) {
            Ok((response, strategy)) => (Ok(response), strategy),
            Err(rejected) => {
                tracing::debug!(
                    id = %self.handle.id(),
                    method = %request.method,
                    err = %rejected.error,
                    "rejected request",
                );
                (Err(rejected), None)
            }
        };

        let torn_down = self.state == SessionState::Closed;
        let _ = reply.send(SessionReply {
            session: (!torn_down).then(|| self.handle.clone()),
            result,
            strategy,
        });

        torn_down.then_some(Error::TornDown)
    }

    fn handle(
        &mut self,
        request: &rtsp::Request,
    ) -> Result<(rtsp::Response, Option<ReadStrategy>), Rejected> {
        match request.method {
            rtsp::Method::Options | rtsp::Method::GetParameter | rtsp::Method::SetParameter => {
                Ok((self.reply_ok().build(), None))
            }
            rtsp::Method::Announce => self.announce(request),
            rtsp::Method::Setup => self.setup(request),
            rtsp::Method::Play => self.play(),
            rtsp::Method::Record => self.record(),
            rtsp::Method::Pause => self.pause(),
            rtsp::Method::Teardown => {
                tracing::debug!(id = %self.handle.id(), "session torn down");
                self.state = SessionState::Closed;
                Ok((self.reply_ok().build(), Some(ReadStrategy::Standard)))
            }
            _ => Err(self.invalid_state()),
        }
    }

    fn announce(
        &mut self,
        request: &rtsp::Request,
    ) -> Result<(rtsp::Response, Option<ReadStrategy>), Rejected> {
        if self.state != SessionState::Initialized || !self.tracks.is_empty() {
            return Err(self.invalid_state());
        }

        let tracks = request
            .body
            .as_deref()
            .map(tracks_from_sdp)
            .unwrap_or_default();
        if tracks.is_empty() {
            return Err(Rejected::new(rtsp::Status::BadRequest, Error::SdpInvalid));
        }

        tracing::debug!(id = %self.handle.id(), tracks = tracks.len(), "announced");
        self.tracks = tracks;
        self.announced = true;

        Ok((self.reply_ok().build(), None))
    }

    fn setup(
        &mut self,
        request: &rtsp::Request,
    ) -> Result<(rtsp::Response, Option<ReadStrategy>), Rejected> {
        if self.state != SessionState::Initialized {
            return Err(self.invalid_state());
        }

        let setup = request
            .transport()
            .map_err(|_| Error::UnsupportedTransport)
            .and_then(InterleavedSetup::from_rtsp_candidate_transports)
            .map_err(|err| Rejected::new(rtsp::Status::UnsupportedTransport, err))?;

        let track_id = track_id_from_path(request.path())
            .map_err(|err| Rejected::new(rtsp::Status::BadRequest, err))?;
        if self.announced {
            if track_id >= self.tracks.len() {
                return Err(Rejected::new(
                    rtsp::Status::BadRequest,
                    Error::InvalidTrack { track_id },
                ));
            }
        } else if track_id >= self.tracks.len() {
            self.tracks.resize(track_id + 1, Track::new(String::new()));
        }

        let channel_in_use = self
            .tracks
            .iter()
            .enumerate()
            .filter(|(id, _)| *id != track_id)
            .filter_map(|(_, track)| track.channel)
            .any(|channel| channel == setup.rtp_channel || channel == setup.rtcp_channel);
        if channel_in_use {
            return Err(Rejected::new(
                rtsp::Status::UnsupportedTransport,
                Error::UnsupportedTransport,
            ));
        }

        self.tracks[track_id].channel = Some(setup.rtp_channel);
        tracing::debug!(
            id = %self.handle.id(),
            track_id,
            channel = setup.rtp_channel,
            "track set up",
        );

        Ok((
            self.reply_ok()
                .with_header("Transport", setup.transport.to_string())
                .build(),
            None,
        ))
    }

    fn play(&mut self) -> Result<(rtsp::Response, Option<ReadStrategy>), Rejected> {
        let ready = matches!(self.state, SessionState::Initialized | SessionState::Paused)
            && !self.announced
            && self.tracks.iter().any(Track::is_setup);
        if !ready {
            return Err(self.invalid_state());
        }

        self.state = SessionState::Playing;
        tracing::info!(id = %self.handle.id(), "session now playing");

        Ok((
            self.reply_ok().build(),
            Some(ReadStrategy::Interleaved(Interleaved::new(
                self.handle.clone(),
                self.channels(),
                InterleavedMode::Play,
            ))),
        ))
    }

    fn record(&mut self) -> Result<(rtsp::Response, Option<ReadStrategy>), Rejected> {
        let ready = matches!(self.state, SessionState::Initialized | SessionState::Paused)
            && self.announced
            && self.tracks.iter().all(Track::is_setup);
        if !ready {
            return Err(self.invalid_state());
        }

        let cleaners = self
            .tracks
            .iter()
            .enumerate()
            .map(|(track_id, track)| self.handler.make_cleaner(track_id, &track.media))
            .collect();

        self.state = SessionState::Recording;
        tracing::info!(id = %self.handle.id(), "session now recording");

        Ok((
            self.reply_ok().build(),
            Some(ReadStrategy::Interleaved(Interleaved::new(
                self.handle.clone(),
                self.channels(),
                InterleavedMode::Record { cleaners },
            ))),
        ))
    }

    fn pause(&mut self) -> Result<(rtsp::Response, Option<ReadStrategy>), Rejected> {
        match self.state {
            SessionState::Playing | SessionState::Recording => {
                self.state = SessionState::Paused;
                tracing::debug!(id = %self.handle.id(), "session paused");
                Ok((self.reply_ok().build(), Some(ReadStrategy::Standard)))
            }
            SessionState::Initialized | SessionState::Paused => Ok((self.reply_ok().build(), None)),
            SessionState::Closed => Err(self.invalid_state()),
        }
    }

    fn channels(&self) -> HashMap<rtsp::ChannelId, usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter_map(|(track_id, track)| track.channel.map(|channel| (channel, track_id)))
            .collect()
    }

    fn reply_ok(&self) -> rtsp::ResponseBuilder {
        rtsp::Response::ok().with_header("Session", self.handle.secret_id().as_str())
    }

    fn invalid_state(&self) -> Rejected {
        Rejected::new(
            rtsp::Status::MethodNotValidInThisState,
            Error::InvalidState { state: self.state },
        )
    }

    async fn close(mut self, cause: Error) {
        self.state = SessionState::Closed;
        self.handle.token.cancel();

        if let Some(connection) = self.connection.take() {
            connection.session_removed(&self.handle).await;
        }
        self.server.session_closed(&self.handle).await;

        tracing::debug!(id = %self.handle.id(), %cause, "session closed");
        self.handler.on_session_close(SessionCloseContext {
            session: &self.handle,
            error: &cause,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::SessionId;

    #[test]
    fn generated_ids() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_digit()));

        let secret = SessionId::generate_secret();
        assert_eq!(secret.as_str().len(), 16);
        assert_ne!(secret, SessionId::generate_secret());
    }
}
