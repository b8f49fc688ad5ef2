use strand_rtsp_protocol as rtsp;

use crate::error::Error;

/// Negotiated interleaved transport of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleavedSetup {
    pub transport: rtsp::Transport,
    pub rtp_channel: rtsp::ChannelId,
    pub rtcp_channel: rtsp::ChannelId,
}

impl InterleavedSetup {
    /// Pick the first candidate this server can serve. Only unicast RTP over
    /// the RTSP connection itself is supported.
    pub fn from_rtsp_candidate_transports(
        candidate_transports: impl IntoIterator<Item = rtsp::Transport>,
    ) -> Result<Self, Error> {
        let transport = candidate_transports
            .into_iter()
            .find(is_supported)
            .ok_or(Error::UnsupportedTransport)?;
        tracing::trace!(%transport, "selected transport");

        let (rtp_channel, rtcp_channel) = match transport.interleaved_channel() {
            Some(rtsp::Channel::Single(rtp_channel)) => {
                (*rtp_channel, rtp_channel.wrapping_add(1))
            }
            Some(rtsp::Channel::Range(rtp_channel, rtcp_channel)) => (*rtp_channel, *rtcp_channel),
            None => return Err(Error::UnsupportedTransport),
        };

        let mut resolved = rtsp::Transport::new()
            .with_lower_protocol(rtsp::Lower::Tcp)
            .with_parameter(rtsp::Parameter::Unicast)
            .with_parameter(rtsp::Parameter::Interleaved(rtsp::Channel::Range(
                rtp_channel,
                rtcp_channel,
            )));
        if let Some(mode) = transport.mode() {
            resolved = resolved.with_parameter(rtsp::Parameter::Mode(mode.clone()));
        }
        tracing::trace!(transport = %resolved, "resolved transport");

        Ok(Self {
            transport: resolved,
            rtp_channel,
            rtcp_channel,
        })
    }
}

fn is_supported(transport: &rtsp::Transport) -> bool {
    transport.lower_protocol() == Some(&rtsp::Lower::Tcp)
        && transport.interleaved_channel().is_some()
        && !transport.is_multicast()
}

/// Track index addressed by a SETUP URL. Clients address tracks with a
/// trailing `trackID=N` segment; a URL without one refers to the first track.
pub fn track_id_from_path(path: &str) -> Result<usize, Error> {
    match path.rsplit('/').next().and_then(|last| last.strip_prefix("trackID=")) {
        Some(track_id) => track_id.parse().map_err(|_| Error::InvalidPath),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use strand_rtsp_protocol as rtsp;

    use super::{track_id_from_path, InterleavedSetup};
    use crate::error::Error;

    fn candidates(value: &str) -> Vec<rtsp::Transport> {
        value
            .split(',')
            .map(|candidate| candidate.trim().parse().unwrap())
            .collect()
    }

    #[test]
    fn picks_interleaved_candidate() {
        let setup = InterleavedSetup::from_rtsp_candidate_transports(candidates(
            "RTP/AVP;unicast;client_port=5000-5001, RTP/AVP/TCP;unicast;interleaved=2-3;mode=record",
        ))
        .unwrap();
        assert_eq!(setup.rtp_channel, 2);
        assert_eq!(setup.rtcp_channel, 3);
        assert_eq!(
            setup.transport.to_string(),
            "RTP/AVP/TCP;unicast;interleaved=2-3;mode=RECORD"
        );
    }

    #[test]
    fn single_channel_implies_rtcp_channel() {
        let setup = InterleavedSetup::from_rtsp_candidate_transports(candidates(
            "RTP/AVP/TCP;interleaved=4",
        ))
        .unwrap();
        assert_eq!((setup.rtp_channel, setup.rtcp_channel), (4, 5));
    }

    #[test]
    fn udp_only_is_unsupported() {
        assert!(matches!(
            InterleavedSetup::from_rtsp_candidate_transports(candidates(
                "RTP/AVP/UDP;unicast;client_port=5000-5001"
            )),
            Err(Error::UnsupportedTransport)
        ));
    }

    #[test]
    fn track_id() {
        assert_eq!(track_id_from_path("/cam/trackID=1").unwrap(), 1);
        assert_eq!(track_id_from_path("/cam").unwrap(), 0);
        assert!(track_id_from_path("/cam/trackID=x").is_err());
    }
}
