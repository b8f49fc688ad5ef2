use std::fmt;

use super::{
    message::{Bytes, Headers, Message, Status, StatusCategory, StatusCode, Version},
    request::Request,
};

#[derive(Clone, Debug)]
pub struct Response {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Message for Response {
    type Metadata = ResponseMetadata;

    fn new(metadata: ResponseMetadata, headers: Headers, body: Option<Bytes>) -> Self {
        Self {
            version: metadata.version,
            status: metadata.status,
            reason: metadata.reason,
            headers,
            body,
        }
    }
}

impl Response {
    pub fn ok() -> ResponseBuilder {
        ResponseBuilder::new(Status::Ok)
    }

    pub fn error(status: Status) -> ResponseBuilder {
        ResponseBuilder::new(status)
    }

    pub fn category(&self) -> StatusCategory {
        self.status.into()
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok.code()
    }

    /// Replace the body, keeping `Content-Length` in sync.
    pub fn set_body(&mut self, body: Bytes) {
        self.headers
            .insert("Content-Length", body.len().to_string());
        self.body = Some(body);
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "Version: {}, Status Code: {}, Reason Phrase: {}",
            self.version, self.status, &self.reason
        )?;

        writeln!(f, "Headers:")?;
        for (var, val) in self.headers.iter() {
            writeln!(f, " - {}: {}", &var, &val)?;
        }

        if let Some(body) = &self.body {
            writeln!(f, "[{} bytes]", body.len())?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ResponseMetadata {
    version: Version,
    status: StatusCode,
    reason: String,
}

impl ResponseMetadata {
    pub(super) fn new(version: Version, status: StatusCode, reason: String) -> Self {
        Self {
            version,
            status,
            reason,
        }
    }
}

pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    fn new(status: Status) -> Self {
        Self {
            response: Response {
                version: Version::default(),
                status: status.code(),
                reason: status.reason().to_string(),
                headers: Headers::new(),
                body: None,
            },
        }
    }

    #[must_use]
    pub fn with_cseq_of(mut self, request: &Request) -> Self {
        if let Some(cseq) = request.cseq() {
            self.response.headers.insert("CSeq", cseq);
        }
        self
    }

    #[must_use]
    pub fn with_header(mut self, var: impl Into<String>, val: impl Into<String>) -> Self {
        self.response.headers.insert(var, val);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.response.set_body(body.into());
        self
    }

    #[must_use]
    pub fn with_sdp(self, contents: impl Into<Bytes>) -> Self {
        self.with_header("Content-Type", "application/sdp")
            .with_body(contents)
    }

    pub fn build(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::Response;
    use crate::{Method, Request, Status, StatusCategory};

    #[test]
    fn builder_sets_status_and_cseq() {
        let request = Request::new(Method::Options, "*".parse().unwrap()).with_header("CSeq", "7");
        let response = Response::error(Status::NotImplemented)
            .with_cseq_of(&request)
            .build();
        assert_eq!(response.status, 501);
        assert_eq!(response.reason, "Not Implemented");
        assert_eq!(response.headers.get("CSeq"), Some("7"));
        assert_eq!(response.category(), StatusCategory::ServerError);
    }

    #[test]
    fn builder_sdp_sets_length_and_type() {
        let response = Response::ok().with_sdp("v=0\r\n").build();
        assert!(response.is_ok());
        assert_eq!(response.headers.get("Content-Type"), Some("application/sdp"));
        assert_eq!(response.headers.get("Content-Length"), Some("5"));
    }
}
