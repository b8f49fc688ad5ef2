use std::error;
use std::fmt;
use std::io;

use strand_rtsp_protocol as rtsp;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Request has no CSeq header, or more than one.
    CSeqMissing,
    /// Request URI does not carry a usable path.
    InvalidPath,
    /// Request names a session other than the one bound to the connection.
    LinkedToOtherSession,
    /// Session is bound to another connection.
    SessionLinkedToOtherConnection,
    /// Request names a session that does not exist.
    SessionNotFound,
    /// Request is not valid in the current session state.
    InvalidState {
        state: crate::session::SessionState,
    },
    /// No acceptable candidate in the `Transport` header.
    UnsupportedTransport,
    /// SETUP names a track that was not announced.
    InvalidTrack { track_id: usize },
    /// ANNOUNCE body does not describe any media.
    SdpInvalid,
    /// Session was torn down by the client.
    TornDown,
    /// Connection bound to the session went away.
    ConnectionClosed,
    /// The server, the session or the connection is shutting down.
    Terminated,
    /// Peer did not send anything within the read timeout.
    ReadTimeout,
    /// Response could not be written within the write timeout.
    WriteTimeout,
    /// Framing error on the underlying stream.
    Protocol(rtsp::Error),
    /// Interleaved payload is not a valid RTP packet.
    Rtp(rtsp::rtp::Error),
    /// Payload normalization failed.
    Cleaner(String),
    /// I/O error occurred.
    Io(io::Error),
}

impl Error {
    /// Fatal errors end the connection. Everything else is reported to the
    /// peer through the response status and the connection stays open.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::CSeqMissing
            | Error::InvalidPath
            | Error::LinkedToOtherSession
            | Error::SessionLinkedToOtherConnection
            | Error::SessionNotFound
            | Error::InvalidState { .. }
            | Error::UnsupportedTransport
            | Error::InvalidTrack { .. }
            | Error::SdpInvalid => false,
            Error::TornDown
            | Error::ConnectionClosed
            | Error::Terminated
            | Error::ReadTimeout
            | Error::WriteTimeout
            | Error::Protocol(_)
            | Error::Rtp(_)
            | Error::Cleaner(_)
            | Error::Io(_) => true,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::CSeqMissing => write!(f, "CSeq is missing"),
            Error::InvalidPath => write!(f, "invalid path"),
            Error::LinkedToOtherSession => write!(f, "connection is linked to another session"),
            Error::SessionLinkedToOtherConnection => {
                write!(f, "session is linked to another connection")
            }
            Error::SessionNotFound => write!(f, "session not found"),
            Error::InvalidState { state } => write!(f, "invalid in session state {state}"),
            Error::UnsupportedTransport => write!(f, "transport not supported"),
            Error::InvalidTrack { track_id } => write!(f, "track {track_id} does not exist"),
            Error::SdpInvalid => write!(f, "invalid SDP"),
            Error::TornDown => write!(f, "torn down by client"),
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::Terminated => write!(f, "terminated"),
            Error::ReadTimeout => write!(f, "read timed out"),
            Error::WriteTimeout => write!(f, "write timed out"),
            Error::Protocol(err) => write!(f, "protocol error: {err}"),
            Error::Rtp(err) => write!(f, "{err}"),
            Error::Cleaner(reason) => write!(f, "unable to process packet: {reason}"),
            Error::Io(err) => write!(f, "{err}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Protocol(err) => Some(err),
            Error::Rtp(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<rtsp::Error> for Error {
    fn from(error: rtsp::Error) -> Self {
        match error {
            rtsp::Error::Io(err) => Error::Io(err),
            err => Error::Protocol(err),
        }
    }
}

impl From<rtsp::rtp::Error> for Error {
    fn from(error: rtsp::rtp::Error) -> Self {
        Error::Rtp(error)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::session::SessionState;

    #[test]
    fn validation_errors_are_not_fatal() {
        assert!(!Error::CSeqMissing.is_fatal());
        assert!(!Error::InvalidPath.is_fatal());
        assert!(!Error::LinkedToOtherSession.is_fatal());
        assert!(!Error::InvalidState {
            state: SessionState::Playing
        }
        .is_fatal());
    }

    #[test]
    fn termination_and_io_are_fatal() {
        assert!(Error::Terminated.is_fatal());
        assert!(Error::ReadTimeout.is_fatal());
        assert!(Error::Cleaner("corrupt".to_string()).is_fatal());
        assert!(Error::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_fatal());
    }

    #[test]
    fn protocol_io_error_unwraps() {
        let err = Error::from(strand_rtsp_protocol::Error::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));
        assert!(matches!(err, Error::Io(_)));
    }
}
