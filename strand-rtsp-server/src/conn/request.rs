use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};

use strand_rtsp_protocol::{MaybeInterleaved, Method, Request, Response, Status};

use crate::conn::reader::ReadStrategy;
use crate::conn::Dispatcher;
use crate::error::Error;
use crate::handler::{DescribeContext, Described};

pub const SERVER_NAME: &str = "strand";

/// Methods announced in the `Public` header of OPTIONS responses.
const SUPPORTED_METHODS: [Method; 7] = [
    Method::Describe,
    Method::Announce,
    Method::Setup,
    Method::Play,
    Method::Record,
    Method::Pause,
    Method::Teardown,
];

/// Outcome of handling a request, before the response is finalized.
pub(super) struct Handled {
    pub response: Response,
    pub error: Option<Error>,
    pub strategy: Option<ReadStrategy>,
}

impl Handled {
    pub fn ok(response: Response) -> Self {
        Self {
            response,
            error: None,
            strategy: None,
        }
    }

    pub fn error(status: Status, error: Error) -> Self {
        Self {
            response: Response::error(status).build(),
            error: Some(error),
            strategy: None,
        }
    }
}

impl<S> Dispatcher<WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Handle `request`, write the response and tell the reader how to go on.
    /// Only errors that end the connection are returned.
    pub(super) async fn handle_read_request(
        &mut self,
        request: Request,
    ) -> Result<Option<ReadStrategy>, Error> {
        let connection_id = self.connection.id();
        let cseq = request.cseq().map(str::to_string);
        tracing::trace!(%connection_id, %request, "handling request");

        let Handled {
            mut response,
            error,
            strategy,
        } = self.handle_request(request).await;

        if !matches!(error, Some(Error::CSeqMissing)) {
            if let Some(cseq) = cseq {
                response.headers.insert("CSeq", cseq);
            }
        }
        response.headers.insert("Server", SERVER_NAME);

        tracing::trace!(%connection_id, %response, "sending response");
        self.write(response).await?;

        match error {
            Some(err) if err.is_fatal() => Err(err),
            Some(err) => {
                tracing::debug!(%connection_id, %err, "request failed");
                Ok(None)
            }
            None => Ok(strategy),
        }
    }

    async fn handle_request(&mut self, request: Request) -> Handled {
        if request.cseq().is_none() {
            tracing::debug!(
                connection_id = %self.connection.id(),
                "request has missing or duplicate CSeq",
            );
            return Handled::error(Status::BadRequest, Error::CSeqMissing);
        }

        let session_id = request.session().unwrap_or_default().to_string();

        match request.method {
            Method::Options => {
                if !session_id.is_empty() {
                    return self.handle_request_in_session(&session_id, request, false).await;
                }
                Handled::ok(reply_to_options_with_supported_methods())
            }
            Method::Describe => self.handle_describe(&request),
            Method::Announce | Method::Setup => {
                self.handle_request_in_session(&session_id, request, true)
                    .await
            }
            Method::Play | Method::Record | Method::Pause | Method::Teardown
                if !session_id.is_empty() =>
            {
                self.handle_request_in_session(&session_id, request, false)
                    .await
            }
            _ => {
                tracing::debug!(method = %request.method, "method not implemented");
                Handled::ok(Response::error(Status::NotImplemented).build())
            }
        }
    }

    fn handle_describe(&self, request: &Request) -> Handled {
        let Some((path, query)) = request.path_and_query() else {
            tracing::debug!(uri = %request.uri, "invalid path");
            return Handled::error(Status::BadRequest, Error::InvalidPath);
        };

        let Described {
            mut response,
            stream,
        } = self.handler.on_describe(DescribeContext {
            connection: &self.connection,
            request,
            path: &path,
            query: &query,
        });

        if response.is_ok() {
            response
                .headers
                .insert("Content-Base", format!("{}/", request.uri));
            response.headers.insert("Content-Type", "application/sdp");
            if let Some(stream) = stream {
                response.set_body(stream.sdp());
            }
        }

        Handled::ok(response)
    }

    async fn write(&mut self, response: Response) -> Result<(), Error> {
        tokio::time::timeout(
            self.write_timeout,
            self.outbound.send(MaybeInterleaved::Message(response)),
        )
        .await
        .map_err(|_| Error::WriteTimeout)?
        .map_err(Error::from)
    }
}

fn reply_to_options_with_supported_methods() -> Response {
    let public = SUPPORTED_METHODS
        .iter()
        .map(Method::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Response::ok().with_header("Public", public).build()
}

#[cfg(test)]
mod tests {
    use super::reply_to_options_with_supported_methods;

    #[test]
    fn options_lists_supported_methods() {
        let response = reply_to_options_with_supported_methods();
        assert_eq!(
            response.headers.get("Public"),
            Some("DESCRIBE, ANNOUNCE, SETUP, PLAY, RECORD, PAUSE, TEARDOWN")
        );
    }
}
