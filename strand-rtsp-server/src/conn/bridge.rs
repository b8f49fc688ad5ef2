use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use strand_rtsp_protocol::{Request, Status};

use crate::conn::request::Handled;
use crate::conn::Dispatcher;
use crate::error::Error;
use crate::session::{Rejected, SessionReply, SessionRequest};

impl<S> Dispatcher<WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Hand a session-affine request to the bound session, or to the server
    /// if the connection is not bound yet, and adopt the binding it replies
    /// with.
    pub(super) async fn handle_request_in_session(
        &mut self,
        id: &str,
        request: Request,
        create: bool,
    ) -> Handled {
        let (target, token) = match self.session.as_ref() {
            Some(session) => {
                // A connection talks to a single session. The id may be left
                // out, clients do so on requests that precede the reply
                // carrying it.
                if !id.is_empty() && id != session.secret_id().as_str() {
                    tracing::debug!(
                        connection_id = %self.connection.id(),
                        session_id = %session.id(),
                        "request names another session than the bound one",
                    );
                    return Handled::error(Status::BadRequest, Error::LinkedToOtherSession);
                }
                (session.request_tx.clone(), session.token.clone())
            }
            None => (
                self.server.session_request_tx.clone(),
                self.server.token().clone(),
            ),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let session_request = SessionRequest {
            connection: self.connection.clone(),
            request,
            id: id.to_string(),
            create,
            reply: reply_tx,
        };

        match send_and_wait(&target, &token, session_request, reply_rx).await {
            Some(reply) => self.adopt(reply),
            None => Handled::error(Status::BadRequest, Error::Terminated),
        }
    }

    fn adopt(&mut self, reply: SessionReply) -> Handled {
        let SessionReply {
            session,
            result,
            strategy,
        } = reply;

        self.session = session;

        match result {
            Ok(response) => Handled {
                response,
                error: None,
                strategy,
            },
            Err(Rejected { response, error }) => Handled {
                response,
                error: Some(error),
                strategy: None,
            },
        }
    }
}

/// Deliver `session_request` and wait for the reply. Returns `None` when the
/// target shuts down first.
async fn send_and_wait(
    target: &mpsc::Sender<SessionRequest>,
    token: &CancellationToken,
    session_request: SessionRequest,
    reply_rx: oneshot::Receiver<SessionReply>,
) -> Option<SessionReply> {
    select! {
        permit = target.reserve() => permit.ok()?.send(session_request),
        _ = token.cancelled() => return None,
    }

    select! {
        biased;
        reply = reply_rx => reply.ok(),
        _ = token.cancelled() => None,
    }
}
