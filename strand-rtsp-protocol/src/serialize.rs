use bytes::{BufMut, BytesMut};

use super::{
    error::{Error, Result},
    message::{Bytes, Headers, Version},
    request::Request,
    response::Response,
};

pub trait Serialize {
    fn serialize(self, dst: &mut BytesMut) -> Result<()>;
}

impl Serialize for Request {
    fn serialize(self, dst: &mut BytesMut) -> Result<()> {
        dst.put(self.method.to_string().as_bytes());
        dst.put_u8(b' ');
        dst.put(self.uri.to_string().as_bytes());
        dst.put_u8(b' ');
        self.version.serialize(dst)?;
        dst.put(&b"\r\n"[..]);
        serialize_headers_and_body(&self.headers, self.body, dst);
        Ok(())
    }
}

impl Serialize for Response {
    fn serialize(self, dst: &mut BytesMut) -> Result<()> {
        self.version.serialize(dst)?;
        dst.put_u8(b' ');
        dst.put(self.status.to_string().as_bytes());
        dst.put_u8(b' ');
        dst.put(self.reason.as_bytes());
        dst.put(&b"\r\n"[..]);
        serialize_headers_and_body(&self.headers, self.body, dst);
        Ok(())
    }
}

fn serialize_headers_and_body(headers: &Headers, body: Option<Bytes>, dst: &mut BytesMut) {
    for (var, val) in headers.iter() {
        dst.put(var.as_bytes());
        dst.put(&b": "[..]);
        dst.put(val.as_bytes());
        dst.put(&b"\r\n"[..]);
    }

    dst.put(&b"\r\n"[..]);

    if let Some(body) = body {
        dst.put(body);
    }
}

impl Serialize for Version {
    fn serialize(self, dst: &mut BytesMut) -> Result<()> {
        let version = match self {
            Version::V1 => &b"RTSP/1.0"[..],
            Version::V2 => &b"RTSP/2.0"[..],
            Version::Unknown => return Err(Error::VersionUnknown),
        };

        dst.put(version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::Serialize;
    use crate::{Method, Request, Response};

    #[test]
    fn serialize_response() {
        let response = Response::ok()
            .with_header("CSeq", "1")
            .with_body("abc")
            .build();
        let mut dst = BytesMut::new();
        response.serialize(&mut dst).unwrap();
        assert_eq!(
            &dst[..],
            b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 3\r\n\r\nabc"
        );
    }

    #[test]
    fn serialize_request() {
        let request = Request::new(Method::Options, "rtsp://example.com/stream".parse().unwrap())
            .with_header("CSeq", "1");
        let mut dst = BytesMut::new();
        request.serialize(&mut dst).unwrap();
        assert_eq!(
            &dst[..],
            b"OPTIONS rtsp://example.com/stream RTSP/1.0\r\nCSeq: 1\r\n\r\n"
        );
    }
}
