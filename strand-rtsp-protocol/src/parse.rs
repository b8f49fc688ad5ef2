use bytes::{Buf, BytesMut};

use super::{
    error::{Error, Result},
    message::{Bytes, Headers, Message, Method, Uri, Version},
    request::{Request, RequestMetadata},
    response::{Response, ResponseMetadata},
};

pub type RequestParser = Parser<Request>;
pub type ResponseParser = Parser<Response>;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Status {
    Hungry,
    Done,
}

pub struct Parser<M: Message> {
    state: State,
    metadata: Option<M::Metadata>,
    headers: Headers,
    body: Option<Bytes>,
}

impl<M: Message> Parser<M> {
    /// A head that has not terminated after this many bytes is rejected, or
    /// a peer could make us buffer indefinitely.
    pub const MAX_HEAD_SIZE: usize = 64 * 1024;
    /// Largest body a `Content-Length` header may announce.
    pub const MAX_BODY_SIZE: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self {
            state: State::Head,
            metadata: None,
            headers: Headers::new(),
            body: None,
        }
    }

    /// Consume as much of `buffer` as is needed to make progress. Bytes that
    /// belong to the next message are left in the buffer.
    pub fn parse(&mut self, buffer: &mut BytesMut) -> Result<Status> {
        loop {
            match self.state {
                State::Head => match find_head_end(buffer) {
                    Some(head_end) => {
                        let head = buffer.split_to(head_end);
                        self.parse_head(&head)?;
                        self.state = match self.content_length()? {
                            Some(len) if len > 0 => State::Body(len),
                            _ => State::Done,
                        };
                    }
                    None if buffer.len() > Self::MAX_HEAD_SIZE => {
                        return Err(Error::HeadTooLarge {
                            size: buffer.len(),
                        });
                    }
                    None => return Ok(Status::Hungry),
                },
                State::Body(len) => {
                    if buffer.len() < len {
                        return Ok(Status::Hungry);
                    }
                    self.body = Some(buffer.split_to(len).freeze());
                    self.state = State::Done;
                }
                State::Done => return Ok(Status::Done),
            }
        }
    }

    /// Whether the parser has not consumed any bytes of a message yet.
    pub fn is_idle(&self) -> bool {
        self.state == State::Head
    }

    pub fn into_message(self) -> Result<M> {
        match self.state {
            State::Done => Ok(M::new(
                self.metadata.ok_or(Error::MetadataNotParsed)?,
                self.headers,
                self.body,
            )),
            _ => Err(Error::NotDone),
        }
    }

    fn parse_head(&mut self, head: &[u8]) -> Result<()> {
        let head = std::str::from_utf8(head).map_err(|_| Error::Encoding)?;
        let mut lines = head
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .skip_while(|line| line.is_empty());

        let first_line = lines.next().ok_or(Error::MetadataNotParsed)?;
        self.metadata = Some(M::Metadata::parse(first_line)?);

        for line in lines.take_while(|line| !line.is_empty()) {
            let (var, val) = line.split_once(':').ok_or_else(|| Error::HeaderMalformed {
                line: line.to_string(),
            })?;
            let var = var.trim();
            if var.is_empty() {
                return Err(Error::HeaderMalformed {
                    line: line.to_string(),
                });
            }
            self.headers.append(var, val.trim());
        }

        Ok(())
    }

    fn content_length(&self) -> Result<Option<usize>> {
        self.headers
            .get("Content-Length")
            .map(|value| {
                value
                    .parse::<usize>()
                    .map_err(|_| Error::ContentLengthNotInteger {
                        value: value.to_string(),
                    })
                    .and_then(|len| {
                        if len > Self::MAX_BODY_SIZE {
                            Err(Error::BodyTooLarge { size: len })
                        } else {
                            Ok(len)
                        }
                    })
            })
            .transpose()
    }
}

impl<M: Message> Default for Parser<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Head,
    Body(usize),
    Done,
}

/// Position just past the empty line that terminates the head. Empty lines
/// before the request line (keep-alive CRLFs) do not count.
fn find_head_end(buffer: &BytesMut) -> Option<usize> {
    let mut start = 0;
    let mut seen_content = false;
    while let Some(offset) = buffer[start..].iter().position(|b| *b == b'\n') {
        let end = start + offset;
        let line = &buffer[start..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            if seen_content {
                return Some(end + 1);
            }
        } else {
            seen_content = true;
        }
        start = end + 1;
    }
    None
}

/// Drop leading CR/LF bytes some clients send between messages.
pub(crate) fn skip_blank(buffer: &mut BytesMut) {
    let blank = buffer
        .iter()
        .take_while(|b| **b == b'\r' || **b == b'\n')
        .count();
    buffer.advance(blank);
}

pub trait Parse: Sized {
    fn parse(line: &str) -> Result<Self>;
}

impl Parse for RequestMetadata {
    fn parse(line: &str) -> Result<RequestMetadata> {
        let mut parts = line.split(' ').filter(|part| !part.is_empty());

        let method = parts
            .next()
            .ok_or_else(|| Error::RequestLineMalformed {
                line: line.to_string(),
            })?;
        let method = match method.parse::<Method>() {
            Ok(method) => method,
            Err(never) => match never {},
        };

        let uri = parts.next().ok_or_else(|| Error::UriMissing {
            line: line.to_string(),
        })?;
        let uri = uri.parse::<Uri>().map_err(|_| Error::UriMalformed {
            line: line.to_string(),
            uri: uri.to_string(),
        })?;

        let version = parts.next().ok_or_else(|| Error::VersionMissing {
            line: line.to_string(),
        })?;
        let version = parse_version(version, line)?;

        if parts.next().is_some() {
            return Err(Error::RequestLineMalformed {
                line: line.to_string(),
            });
        }

        Ok(RequestMetadata::new(method, uri, version))
    }
}

impl Parse for ResponseMetadata {
    fn parse(line: &str) -> Result<ResponseMetadata> {
        let malformed = || Error::RequestLineMalformed {
            line: line.to_string(),
        };
        let mut parts = line.splitn(3, ' ');
        let version = parse_version(parts.next().ok_or_else(malformed)?, line)?;
        let status = parts
            .next()
            .and_then(|status| status.parse().ok())
            .ok_or_else(malformed)?;
        let reason = parts.next().unwrap_or_default().to_string();

        Ok(ResponseMetadata::new(version, status, reason))
    }
}

fn parse_version(part: &str, line: &str) -> Result<Version> {
    let malformed = || Error::VersionMalformed {
        line: line.to_string(),
        version: part.to_string(),
    };
    match part.strip_prefix("RTSP/").ok_or_else(malformed)? {
        "1.0" => Ok(Version::V1),
        "2.0" => Ok(Version::V2),
        other => {
            let (major, minor) = other.split_once('.').ok_or_else(malformed)?;
            if major.len() == 1
                && minor.len() == 1
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
            {
                Ok(Version::Unknown)
            } else {
                Err(malformed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{Error, RequestParser, Status};
    use crate::{Method, Version};

    const EXAMPLE_REQUEST_RECORD: &[u8] = b"\
RECORD rtsp://example.com/stream/0 RTSP/1.0\r\n\
CSeq: 4\r\n\
Session: 1234abcd\r\n\
Content-Length: 16\r\n\
\r\n\
0123456789abcdef";

    #[test]
    fn parse_record_request() {
        let mut buffer = BytesMut::from(EXAMPLE_REQUEST_RECORD);
        let mut parser = RequestParser::new();
        assert_eq!(parser.parse(&mut buffer).unwrap(), Status::Done);
        assert!(buffer.is_empty());

        let request = parser.into_message().unwrap();
        assert_eq!(request.method, Method::Record);
        assert_eq!(request.uri.to_string(), "rtsp://example.com/stream/0");
        assert_eq!(request.version, Version::V1);
        assert_eq!(request.headers.get("CSeq"), Some("4"));
        assert_eq!(request.session(), Some("1234abcd"));
        assert_eq!(request.body.as_deref(), Some(&b"0123456789abcdef"[..]));
    }

    #[test]
    fn parse_byte_by_byte() {
        let mut buffer = BytesMut::new();
        let mut parser = RequestParser::new();
        let (last, upto_last) = EXAMPLE_REQUEST_RECORD.split_last().unwrap();
        for byte in upto_last {
            buffer.extend_from_slice(&[*byte]);
            assert_eq!(parser.parse(&mut buffer).unwrap(), Status::Hungry);
        }
        buffer.extend_from_slice(&[*last]);
        assert_eq!(parser.parse(&mut buffer).unwrap(), Status::Done);
        assert_eq!(parser.into_message().unwrap().headers.get("Content-Length"), Some("16"));
    }

    #[test]
    fn parse_leaves_next_message_in_buffer() {
        let mut buffer = BytesMut::from(
            &b"OPTIONS * RTSP/1.0\nCSeq: 1\n\n$\x00\x00\x01\xff"[..],
        );
        let mut parser = RequestParser::new();
        assert_eq!(parser.parse(&mut buffer).unwrap(), Status::Done);
        assert_eq!(&buffer[..], b"$\x00\x00\x01\xff");
        assert_eq!(parser.into_message().unwrap().method, Method::Options);
    }

    #[test]
    fn parse_duplicate_headers_are_kept() {
        let mut buffer = BytesMut::from(&b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nCSeq: 2\r\n\r\n"[..]);
        let mut parser = RequestParser::new();
        assert_eq!(parser.parse(&mut buffer).unwrap(), Status::Done);
        let request = parser.into_message().unwrap();
        assert_eq!(request.headers.get_all("CSeq").count(), 2);
    }

    #[test]
    fn parse_unknown_method() {
        let mut buffer = BytesMut::from(&b"FLY rtsp://example.com RTSP/1.0\r\nCSeq: 9\r\n\r\n"[..]);
        let mut parser = RequestParser::new();
        assert_eq!(parser.parse(&mut buffer).unwrap(), Status::Done);
        assert_eq!(
            parser.into_message().unwrap().method,
            Method::Extension("FLY".to_string())
        );
    }

    #[test]
    fn parse_bad_version() {
        let mut buffer = BytesMut::from(&b"OPTIONS * HTTP/1.1\r\n\r\n"[..]);
        let mut parser = RequestParser::new();
        assert!(matches!(
            parser.parse(&mut buffer),
            Err(Error::VersionMalformed { .. })
        ));
    }

    #[test]
    fn parse_bad_content_length() {
        let mut buffer =
            BytesMut::from(&b"ANNOUNCE rtsp://h/s RTSP/1.0\r\nContent-Length: x\r\n\r\n"[..]);
        let mut parser = RequestParser::new();
        assert!(matches!(
            parser.parse(&mut buffer),
            Err(Error::ContentLengthNotInteger { .. })
        ));
    }

    #[test]
    fn parse_head_too_large() {
        let mut buffer = BytesMut::from(&b"OPTIONS * RTSP/1.0\r\nX: "[..]);
        buffer.extend_from_slice(&vec![b'a'; RequestParser::MAX_HEAD_SIZE]);
        let mut parser = RequestParser::new();
        assert!(matches!(
            parser.parse(&mut buffer),
            Err(Error::HeadTooLarge { .. })
        ));
    }

    #[test]
    fn parse_body_too_large() {
        let head = format!(
            "ANNOUNCE rtsp://h/s RTSP/1.0\r\nContent-Length: {}\r\n\r\n",
            RequestParser::MAX_BODY_SIZE + 1
        );
        let mut buffer = BytesMut::from(head.as_bytes());
        let mut parser = RequestParser::new();
        assert!(matches!(
            parser.parse(&mut buffer),
            Err(Error::BodyTooLarge { size }) if size == RequestParser::MAX_BODY_SIZE + 1
        ));
    }
}
