use std::fmt;

use super::{
    message::{Bytes, Headers, Message, Method, Uri, Version},
    transport::Transport,
    url, Error,
};

#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Message for Request {
    type Metadata = RequestMetadata;

    fn new(metadata: RequestMetadata, headers: Headers, body: Option<Bytes>) -> Self {
        Self {
            method: metadata.method,
            uri: metadata.uri,
            version: metadata.version,
            headers,
            body,
        }
    }
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::V1,
            headers: Headers::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, var: impl Into<String>, val: impl Into<String>) -> Self {
        self.headers.append(var, val);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.headers.insert("Content-Length", body.len().to_string());
        self.body = Some(body);
        self
    }

    pub fn path(&self) -> &str {
        self.uri.path().trim_end_matches('/')
    }

    /// The request's CSeq, only if it occurs exactly once.
    pub fn cseq(&self) -> Option<&str> {
        let mut values = self.headers.get_all("CSeq");
        match (values.next(), values.next()) {
            (Some(cseq), None) => Some(cseq),
            _ => None,
        }
    }

    /// Session id carried by the request. The header must occur exactly
    /// once; any `;timeout=` parameter is stripped.
    pub fn session(&self) -> Option<&str> {
        let mut values = self.headers.get_all("Session");
        match (values.next(), values.next()) {
            (Some(session), None) => session.split(';').next().map(str::trim),
            _ => None,
        }
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn transport(&self) -> Result<Vec<Transport>, Error> {
        self.headers.get("Transport").map_or_else(
            || Ok(Vec::new()),
            |value| {
                value
                    .split(',')
                    .map(str::trim)
                    .map(str::parse)
                    .collect::<Result<Vec<_>, _>>()
            },
        )
    }

    /// Path (without leading slash) and query of the request URI, or `None`
    /// if the URI does not carry an absolute path.
    pub fn path_and_query(&self) -> Option<(String, String)> {
        url::path_and_query(&self.uri).map(|path_and_query| {
            let (path, query) = url::split_query(&path_and_query);
            (path.to_string(), query.to_string())
        })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Version: {}, Method: {}, Uri: {}",
            self.version, self.method, self.uri
        )?;

        if !self.headers.is_empty() {
            writeln!(f, "\nHeaders:")?;
            for (var, val) in self.headers.iter() {
                writeln!(f, " - {}: {}", &var, &val)?;
            }
        }

        if let Some(body) = &self.body {
            writeln!(f, "[{} bytes]", body.len())?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct RequestMetadata {
    method: Method,
    uri: Uri,
    version: Version,
}

impl RequestMetadata {
    pub(super) const fn new(method: Method, uri: Uri, version: Version) -> Self {
        Self {
            method,
            uri,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Request;
    use crate::{Lower, Method};

    fn request(method: Method, uri: &str) -> Request {
        Request::new(method, uri.parse().unwrap())
    }

    #[test]
    fn cseq_must_be_singular() {
        let single = request(Method::Options, "*").with_header("CSeq", "3");
        assert_eq!(single.cseq(), Some("3"));

        let missing = request(Method::Options, "*");
        assert_eq!(missing.cseq(), None);

        let double = request(Method::Options, "*")
            .with_header("CSeq", "3")
            .with_header("CSeq", "4");
        assert_eq!(double.cseq(), None);
    }

    #[test]
    fn session_strips_timeout() {
        let request = request(Method::Play, "rtsp://h/s").with_header("Session", "abcd;timeout=60");
        assert_eq!(request.session(), Some("abcd"));
    }

    #[test]
    fn transport_candidates() {
        let request = request(Method::Setup, "rtsp://h/s/trackID=0").with_header(
            "Transport",
            "RTP/AVP/TCP;unicast;interleaved=0-1, RTP/AVP;unicast;client_port=5000-5001",
        );
        let transports = request.transport().unwrap();
        assert_eq!(transports.len(), 2);
        assert_eq!(transports[0].lower_protocol(), Some(&Lower::Tcp));
    }

    #[test]
    fn path_and_query_of_request() {
        let request = request(Method::Describe, "rtsp://h:554/cam/main?token=1");
        assert_eq!(
            request.path_and_query(),
            Some(("cam/main".to_string(), "token=1".to_string()))
        );
    }
}
