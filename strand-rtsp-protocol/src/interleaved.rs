use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    error::{Error, Result},
    request::Request,
    response::Response,
    serialize::Serialize,
};

pub const MAGIC: u8 = 0x24; // $

pub type ChannelId = u8;

pub type RequestMaybeInterleaved = MaybeInterleaved<Request>;
pub type ResponseMaybeInterleaved = MaybeInterleaved<Response>;

/// Unit of an RTSP stream: either a text message or a binary frame that
/// shares the stream with messages.
#[derive(Debug)]
pub enum MaybeInterleaved<M> {
    Message(M),
    Interleaved { channel: ChannelId, payload: Bytes },
}

impl<M: fmt::Display> fmt::Display for MaybeInterleaved<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::Interleaved { channel, payload } => write!(
                f,
                "interleaved payload over channel: {}, size: {}",
                channel,
                payload.len()
            ),
        }
    }
}

impl<M: Serialize> Serialize for MaybeInterleaved<M> {
    fn serialize(self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::Message(message) => message.serialize(dst),
            Self::Interleaved { channel, payload } => {
                let size: u16 = payload
                    .len()
                    .try_into()
                    .map_err(|_| Error::InterleavedPayloadTooLarge)?;
                dst.put_u8(MAGIC);
                dst.put_u8(channel);
                dst.put_u16(size);
                dst.put(payload);

                Ok(())
            }
        }
    }
}

/// Incremental parser for `$ <channel> <u16 size> <payload>` frames.
#[derive(Default)]
pub struct InterleavedParser {
    channel_and_size: Option<(ChannelId, u16)>,
}

impl InterleavedParser {
    pub fn new() -> Self {
        Self {
            channel_and_size: None,
        }
    }

    /// Whether a frame header was consumed and the parser is waiting for
    /// the rest of the payload.
    pub fn is_pending(&self) -> bool {
        self.channel_and_size.is_some()
    }

    pub fn parse(&mut self, buffer: &mut impl Buf) -> Option<Result<(ChannelId, Bytes)>> {
        if let Some((channel, size)) = self.channel_and_size {
            if buffer.remaining() >= size.into() {
                self.channel_and_size = None;
                let payload = buffer.copy_to_bytes(size.into());
                Some(Ok((channel, payload)))
            } else {
                None
            }
        } else if buffer.remaining() >= 4 {
            let header = &buffer.chunk()[..4];
            if header[0] != MAGIC {
                return Some(Err(Error::InterleavedInvalid));
            }

            let channel = header[1];
            let size = u16::from_be_bytes([header[2], header[3]]);

            self.channel_and_size = Some((channel, size));

            buffer.advance(4);

            self.parse(buffer)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::InterleavedParser;
    use crate::Error;

    #[test]
    fn parse_frame_in_pieces() {
        let mut parser = InterleavedParser::new();
        let mut buffer = BytesMut::from(&b"$\x02\x00"[..]);
        assert!(parser.parse(&mut buffer).is_none());
        buffer.extend_from_slice(b"\x03ab");
        assert!(parser.parse(&mut buffer).is_none());
        assert!(parser.is_pending());
        buffer.extend_from_slice(b"cREST");
        let (channel, payload) = parser.parse(&mut buffer).unwrap().unwrap();
        assert_eq!(channel, 2);
        assert_eq!(&payload[..], b"abc");
        assert_eq!(&buffer[..], b"REST");
        assert!(!parser.is_pending());
    }

    #[test]
    fn parse_consecutive_frames() {
        let mut parser = InterleavedParser::new();
        let mut buffer = BytesMut::from(&b"$\x00\x00\x01a$\x01\x00\x01b"[..]);
        assert_eq!(parser.parse(&mut buffer).unwrap().unwrap().0, 0);
        assert_eq!(parser.parse(&mut buffer).unwrap().unwrap().0, 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn parse_invalid_magic() {
        let mut parser = InterleavedParser::new();
        let mut buffer = BytesMut::from(&b"#\x00\x00\x01a"[..]);
        assert!(matches!(
            parser.parse(&mut buffer),
            Some(Err(Error::InterleavedInvalid))
        ));
    }
}
