use std::error;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// An error occurred decoding the head due to incorrect usage of text
    /// encoding by the sender.
    Encoding,
    /// The request line of the head part is malformed.
    RequestLineMalformed { line: String },
    /// The request line has a method but no target URI.
    UriMissing { line: String },
    /// The request line has a target URI, but it could not be parsed.
    UriMalformed { line: String, uri: String },
    /// The request line has no version, which is the required third part.
    VersionMissing { line: String },
    /// The version should be "RTSP/" followed by a digit, "." and a digit.
    VersionMalformed { line: String, version: String },
    /// Header line is malformed.
    HeaderMalformed { line: String },
    /// The Content-Length header is not an unsigned integer.
    ContentLengthNotInteger { value: String },
    /// The head grew beyond the maximum size without terminating.
    HeadTooLarge { size: usize },
    /// The Content-Length header announces more than the maximum body size.
    BodyTooLarge { size: usize },
    /// Caller tried to turn the parser into a message before it was done.
    NotDone,
    /// Metadata was not parsed for some reason.
    MetadataNotParsed,
    /// Serializing a message that does not have a known version.
    VersionUnknown,
    /// Interleaved frame header does not start with the magic byte.
    InterleavedInvalid,
    /// Interleaved payload does not fit in a 16-bit length.
    InterleavedPayloadTooLarge,
    /// Transport header does not start with the `RTP/AVP` profile.
    TransportProtocolProfileMissing { value: String },
    /// Transport lower protocol is neither `TCP` nor `UDP`.
    TransportLowerUnknown { value: String },
    /// Transport parameter is known but has an unusable value.
    TransportParameterValueInvalid { var: String, val: String },
    /// Transport parameter requires a value but none was given.
    TransportParameterValueMissing { var: String },
    /// Transport channel or port range is malformed.
    TransportRangeInvalid { value: String },
    /// Underlying stream was closed by the peer.
    Shutdown,
    /// I/O error occurred.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Encoding => write!(f, "encoding incorrect"),
            Error::RequestLineMalformed { line } => write!(f, "request line malformed: {line}"),
            Error::UriMissing { line } => write!(f, "uri missing in request line: {line}"),
            Error::UriMalformed { line, uri } => {
                write!(f, "uri malformed: {uri} (in line: {line})")
            }
            Error::VersionMissing { line } => {
                write!(f, "version missing in request line: {line}")
            }
            Error::VersionMalformed { line, version } => {
                write!(f, "version malformed: {version} (in line: {line})")
            }
            Error::HeaderMalformed { line } => write!(f, "header line malformed: {line}"),
            Error::ContentLengthNotInteger { value } => {
                write!(f, "invalid value for Content-Length: {value}")
            }
            Error::HeadTooLarge { size } => write!(f, "head too large ({size} bytes)"),
            Error::BodyTooLarge { size } => write!(f, "body too large ({size} bytes)"),
            Error::NotDone => write!(f, "parser not done yet"),
            Error::MetadataNotParsed => write!(f, "metadata not parsed"),
            Error::VersionUnknown => write!(f, "message has unknown version"),
            Error::InterleavedInvalid => write!(f, "interleaved frame header invalid"),
            Error::InterleavedPayloadTooLarge => write!(f, "interleaved payload too large"),
            Error::TransportProtocolProfileMissing { value } => {
                write!(f, "transport protocol and profile missing: {value}")
            }
            Error::TransportLowerUnknown { value } => {
                write!(f, "transport lower protocol unknown: {value}")
            }
            Error::TransportParameterValueInvalid { var, val } => {
                write!(f, "transport parameter {var} has invalid value: {val}")
            }
            Error::TransportParameterValueMissing { var } => {
                write!(f, "transport parameter {var} requires a value")
            }
            Error::TransportRangeInvalid { value } => {
                write!(f, "transport range invalid: {value}")
            }
            Error::Shutdown => write!(f, "stream closed by peer"),
            Error::Io(err) => write!(f, "{err}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}
