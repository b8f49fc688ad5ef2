//! RTP packet header decoding as described in
//! [RFC 3550 section 5.1](https://datatracker.ietf.org/doc/html/rfc3550#section-5.1).

use std::error;
use std::fmt;

use bytes::Bytes;

/// The minimum length of an RTP header (no CSRCs or extensions).
const MIN_HEADER_LEN: usize = 12;

/// Decoded RTP packet. The payload shares the buffer it was decoded from.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Packet {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension: Option<(u16, Bytes)>,
    pub payload: Bytes,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `data` into this packet, reusing its allocations. On error the
    /// packet contents are unspecified.
    pub fn unmarshal(&mut self, data: Bytes) -> Result<(), Error> {
        if data.len() < MIN_HEADER_LEN {
            return Err(Error::new("too short"));
        }
        if (data[0] & 0b1100_0000) != 2 << 6 {
            return Err(Error::new("must be version 2"));
        }

        let has_padding = (data[0] & 0b0010_0000) != 0;
        let has_extension = (data[0] & 0b0001_0000) != 0;
        let csrc_count = usize::from(data[0] & 0b0000_1111);

        self.marker = (data[1] & 0b1000_0000) != 0;
        self.payload_type = data[1] & 0b0111_1111;
        self.sequence_number = u16::from_be_bytes([data[2], data[3]]);
        self.timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        self.ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let csrc_end = MIN_HEADER_LEN + 4 * csrc_count;
        if data.len() < csrc_end {
            return Err(Error::new("csrc list is after end of packet"));
        }
        self.csrc.clear();
        self.csrc.extend(
            data[MIN_HEADER_LEN..csrc_end]
                .chunks_exact(4)
                .map(|csrc| u32::from_be_bytes([csrc[0], csrc[1], csrc[2], csrc[3]])),
        );

        let payload_start = if has_extension {
            if data.len() < csrc_end + 4 {
                return Err(Error::new("extension is after end of packet"));
            }
            let profile = u16::from_be_bytes([data[csrc_end], data[csrc_end + 1]]);
            let words = usize::from(u16::from_be_bytes([data[csrc_end + 2], data[csrc_end + 3]]));
            let extension_end = csrc_end + 4 + 4 * words;
            if data.len() < extension_end {
                return Err(Error::new("extension extends beyond end of packet"));
            }
            self.extension = Some((profile, data.slice(csrc_end + 4..extension_end)));
            extension_end
        } else {
            self.extension = None;
            csrc_end
        };

        let payload_end = if has_padding {
            let padding_len = usize::from(data[data.len() - 1]);
            if padding_len == 0 {
                return Err(Error::new("invalid padding length 0"));
            }
            data.len()
                .checked_sub(padding_len)
                .filter(|end| *end >= payload_start)
                .ok_or_else(|| Error::new("bad padding"))?
        } else {
            data.len()
        };

        self.payload = data.slice(payload_start..payload_end);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    reason: &'static str,
}

impl Error {
    const fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid RTP packet: {}", self.reason)
    }
}

impl error::Error for Error {}
