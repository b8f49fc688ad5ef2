use std::fmt;
use std::str::FromStr;

use super::{parse::Parse, serialize::Serialize};

pub use bytes::Bytes;
pub use http::uri::Uri;

pub trait Message: Serialize {
    type Metadata: Parse;

    fn new(metadata: Self::Metadata, headers: Headers, body: Option<Bytes>) -> Self;
}

/// Ordered list of header fields.
///
/// RTSP header names are case-insensitive and a name may occur more than
/// once, which matters for validating fields that must be singular (such as
/// `CSeq`). Insertion order is kept for serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// First value of header `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(var, _)| var.eq_ignore_ascii_case(name))
            .map(|(_, val)| val.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(var, _)| var.eq_ignore_ascii_case(name))
            .map(|(_, val)| val.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set header `name` to `value`, replacing all existing occurrences.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.0.push((name, value.into()));
    }

    /// Add another occurrence of header `name`.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(var, _)| !var.eq_ignore_ascii_case(name));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(var, val)| (var.as_str(), val.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(var, val)| (var.into(), val.into()))
                .collect(),
        )
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Method {
    Describe,
    Announce,
    Setup,
    Play,
    Pause,
    Record,
    Options,
    Redirect,
    Teardown,
    GetParameter,
    SetParameter,
    /// Any method token the server does not know about. These are still
    /// parsed so the server can answer them instead of dropping the
    /// connection.
    Extension(String),
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Method::Describe => write!(f, "DESCRIBE"),
            Method::Announce => write!(f, "ANNOUNCE"),
            Method::Setup => write!(f, "SETUP"),
            Method::Play => write!(f, "PLAY"),
            Method::Pause => write!(f, "PAUSE"),
            Method::Record => write!(f, "RECORD"),
            Method::Options => write!(f, "OPTIONS"),
            Method::Redirect => write!(f, "REDIRECT"),
            Method::Teardown => write!(f, "TEARDOWN"),
            Method::GetParameter => write!(f, "GET_PARAMETER"),
            Method::SetParameter => write!(f, "SET_PARAMETER"),
            Method::Extension(method) => write!(f, "{method}"),
        }
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "DESCRIBE" => Method::Describe,
            "ANNOUNCE" => Method::Announce,
            "SETUP" => Method::Setup,
            "PLAY" => Method::Play,
            "PAUSE" => Method::Pause,
            "RECORD" => Method::Record,
            "OPTIONS" => Method::Options,
            "REDIRECT" => Method::Redirect,
            "TEARDOWN" => Method::Teardown,
            "GET_PARAMETER" => Method::GetParameter,
            "SET_PARAMETER" => Method::SetParameter,
            other => Method::Extension(other.to_string()),
        })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Version {
    #[default]
    V1,
    V2,
    Unknown,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Version::V1 => write!(f, "1.0"),
            Version::V2 => write!(f, "2.0"),
            Version::Unknown => write!(f, "?"),
        }
    }
}

pub type StatusCode = usize;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StatusCategory {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
    Unknown,
}

impl From<StatusCode> for StatusCategory {
    fn from(code: StatusCode) -> Self {
        match code {
            s if s >= 600 => StatusCategory::Unknown,
            s if s >= 500 => StatusCategory::ServerError,
            s if s >= 400 => StatusCategory::ClientError,
            s if s >= 300 => StatusCategory::Redirection,
            s if s >= 200 => StatusCategory::Success,
            s if s >= 100 => StatusCategory::Informational,
            _ => StatusCategory::Unknown,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    SessionNotFound,
    MethodNotValidInThisState,
    UnsupportedTransport,
    InternalServerError,
    NotImplemented,
}

impl Status {
    pub const fn code(self) -> StatusCode {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::SessionNotFound => 454,
            Status::MethodNotValidInThisState => 455,
            Status::UnsupportedTransport => 461,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::SessionNotFound => "Session Not Found",
            Status::MethodNotValidInThisState => "Method Not Valid in This State",
            Status::UnsupportedTransport => "Unsupported Transport",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::{Headers, Method};

    #[test]
    fn headers_lookup_is_case_insensitive() {
        let headers: Headers = [("CSeq", "1"), ("session", "abc")].into_iter().collect();
        assert_eq!(headers.get("cseq"), Some("1"));
        assert_eq!(headers.get("Session"), Some("abc"));
        assert_eq!(headers.get("Transport"), None);
    }

    #[test]
    fn headers_keep_duplicates_until_replaced() {
        let mut headers = Headers::new();
        headers.append("CSeq", "1");
        headers.append("cseq", "2");
        assert_eq!(headers.get_all("CSeq").collect::<Vec<_>>(), vec!["1", "2"]);

        headers.insert("CSeq", "3");
        assert_eq!(headers.get_all("CSeq").collect::<Vec<_>>(), vec!["3"]);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn header_value_outlives_looked_up_name() {
        let headers: Headers = [("Transport", "RTP/AVP/TCP;interleaved=0-1")]
            .into_iter()
            .collect();
        let value = {
            let name = String::from("transport");
            headers.get(&name)
        };
        assert_eq!(value, Some("RTP/AVP/TCP;interleaved=0-1"));
    }

    #[test]
    fn unknown_method_is_extension() {
        assert_eq!("FLY".parse::<Method>().unwrap(), Method::Extension("FLY".to_string()));
        assert_eq!("RECORD".parse::<Method>().unwrap(), Method::Record);
    }
}
