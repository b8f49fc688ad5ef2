use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::{
    error::Error,
    interleaved::{InterleavedParser, MaybeInterleaved, MAGIC},
    message::Message,
    parse::{skip_blank, Parser, Status},
    request::Request,
    response::Response,
    serialize::Serialize,
};

pub trait Target {
    type Send: Serialize;
    type Receive: Message;
}

pub struct AsClient;

impl Target for AsClient {
    type Send = Request;
    type Receive = Response;
}

pub struct AsServer;

impl Target for AsServer {
    type Send = Response;
    type Receive = Request;
}

/// Frames an RTSP stream into messages and interleaved binary frames.
pub struct Codec<T: Target> {
    parser: Parser<T::Receive>,
    interleaved: InterleavedParser,
}

impl<T: Target> Codec<T> {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            interleaved: InterleavedParser::new(),
        }
    }
}

impl<T: Target> Default for Codec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Target> Decoder for Codec<T> {
    type Item = MaybeInterleaved<T::Receive>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.interleaved.is_pending() && self.parser.is_idle() {
            skip_blank(src);
            if src.is_empty() {
                return Ok(None);
            }
            if src[0] != MAGIC {
                return self.decode_message(src);
            }
        } else if !self.interleaved.is_pending() {
            return self.decode_message(src);
        }

        self.interleaved
            .parse(src)
            .transpose()
            .map(|frame| frame.map(|(channel, payload)| MaybeInterleaved::Interleaved { channel, payload }))
    }
}

impl<T: Target> Codec<T> {
    fn decode_message(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<MaybeInterleaved<T::Receive>>, Error> {
        Ok(match self.parser.parse(src)? {
            Status::Done => {
                // Swap in a fresh parser; the finished one is consumed into
                // the message.
                let parser = std::mem::replace(&mut self.parser, Parser::<T::Receive>::new());
                Some(MaybeInterleaved::Message(parser.into_message()?))
            }
            Status::Hungry => None,
        })
    }
}

impl<T: Target> Encoder<MaybeInterleaved<T::Send>> for Codec<T> {
    type Error = Error;

    fn encode(
        &mut self,
        item: MaybeInterleaved<T::Send>,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        item.serialize(dst)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{Decoder, FramedRead, FramedWrite};

    use super::{AsClient, AsServer, Codec};
    use crate::{MaybeInterleaved, Method, Request, Response};

    #[test]
    fn decode_request_then_frame_then_request() {
        let mut codec = Codec::<AsServer>::new();
        let mut src = BytesMut::from(
            &b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n\
               $\x01\x00\x02hi\
               \r\nTEARDOWN rtsp://h/s RTSP/1.0\r\nCSeq: 2\r\n\r\n"[..],
        );

        match codec.decode(&mut src).unwrap() {
            Some(MaybeInterleaved::Message(request)) => assert_eq!(request.method, Method::Options),
            _ => panic!("expected request"),
        }
        match codec.decode(&mut src).unwrap() {
            Some(MaybeInterleaved::Interleaved { channel, payload }) => {
                assert_eq!(channel, 1);
                assert_eq!(&payload[..], b"hi");
            }
            _ => panic!("expected frame"),
        }
        match codec.decode(&mut src).unwrap() {
            Some(MaybeInterleaved::Message(request)) => assert_eq!(request.method, Method::Teardown),
            _ => panic!("expected request"),
        }
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn decode_partial_frame() {
        let mut codec = Codec::<AsServer>::new();
        let mut src = BytesMut::from(&b"$\x00\x00\x04ab"[..]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(b"cd");
        assert!(matches!(
            codec.decode(&mut src).unwrap(),
            Some(MaybeInterleaved::Interleaved { channel: 0, .. })
        ));
    }

    #[tokio::test]
    async fn framed_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let mut client_out = FramedWrite::new(client_write, Codec::<AsClient>::new());
        let mut client_in = FramedRead::new(client_read, Codec::<AsClient>::new());
        let mut server_in = FramedRead::new(server_read, Codec::<AsServer>::new());
        let mut server_out = FramedWrite::new(server_write, Codec::<AsServer>::new());

        let request = Request::new(Method::Describe, "rtsp://h/s".parse().unwrap())
            .with_header("CSeq", "5");
        client_out
            .send(MaybeInterleaved::Message(request))
            .await
            .unwrap();

        let received = match server_in.next().await {
            Some(Ok(MaybeInterleaved::Message(request))) => request,
            _ => panic!("expected request"),
        };
        assert_eq!(received.method, Method::Describe);

        let response = Response::ok().with_cseq_of(&received).build();
        server_out
            .send(MaybeInterleaved::Message(response))
            .await
            .unwrap();

        match client_in.next().await {
            Some(Ok(MaybeInterleaved::Message(response))) => {
                assert_eq!(response.status, 200);
                assert_eq!(response.headers.get("CSeq"), Some("5"));
            }
            _ => panic!("expected response"),
        }
    }
}
