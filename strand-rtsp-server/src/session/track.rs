use std::time::Duration;

use bytes::Bytes;

use strand_rtsp_protocol::rtp;
use strand_rtsp_protocol::ChannelId;

use crate::error::Error;

/// Normalizes the RTP packets of one recorded track before they are handed
/// to the application. A cleaner may buffer, split or merge packets, so one
/// input yields zero or more outputs.
pub trait Cleaner: Send {
    fn process(&mut self, packet: &rtp::Packet) -> Result<Vec<Cleaned>, Error>;
}

#[derive(Debug, Clone)]
pub struct Cleaned {
    pub packet: rtp::Packet,
    pub pts_equals_dts: bool,
    pub h264_nalus: Vec<Bytes>,
    pub h264_pts: Duration,
}

/// Forwards every packet unchanged.
pub struct PassthroughCleaner;

impl Cleaner for PassthroughCleaner {
    fn process(&mut self, packet: &rtp::Packet) -> Result<Vec<Cleaned>, Error> {
        Ok(vec![Cleaned {
            packet: packet.clone(),
            pts_equals_dts: true,
            h264_nalus: Vec::new(),
            h264_pts: Duration::ZERO,
        }])
    }
}

/// A track announced by the client.
#[derive(Debug, Clone)]
pub struct Track {
    /// The `m=` line describing the track.
    pub media: String,
    /// Interleaved channel that carries the track's RTP packets, once set up.
    pub channel: Option<ChannelId>,
}

impl Track {
    pub fn new(media: impl Into<String>) -> Self {
        Self {
            media: media.into(),
            channel: None,
        }
    }

    pub fn is_setup(&self) -> bool {
        self.channel.is_some()
    }
}

/// Tracks described by an SDP body, one per `m=` line.
pub fn tracks_from_sdp(sdp: &[u8]) -> Vec<Track> {
    String::from_utf8_lossy(sdp)
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("m="))
        .map(Track::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{tracks_from_sdp, Cleaner, PassthroughCleaner};
    use strand_rtsp_protocol::rtp;

    #[test]
    fn tracks_from_announced_sdp() {
        let sdp = b"v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=stream\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
m=audio 0 RTP/AVP 97\r\n\
a=rtpmap:97 MPEG4-GENERIC/48000/2\r\n";
        let tracks = tracks_from_sdp(sdp);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].media, "m=video 0 RTP/AVP 96");
        assert!(!tracks[1].is_setup());
    }

    #[test]
    fn passthrough_keeps_packet() {
        let mut packet = rtp::Packet::new();
        packet
            .unmarshal(Bytes::from_static(&[
                0x80, 0x60, 0, 9, 0, 0, 0, 1, 0, 0, 0, 2, 0xaa,
            ]))
            .unwrap();
        let out = PassthroughCleaner.process(&packet).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].packet, packet);
        assert!(out[0].pts_equals_dts);
    }
}
