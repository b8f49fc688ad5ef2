use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use strand_rtsp_protocol as rtsp;

use crate::conn::ConnectionHandle;
use crate::error::Error;
use crate::session::track::{Cleaner, PassthroughCleaner};
use crate::session::SessionHandle;

/// Application hooks invoked by connections and sessions.
///
/// Callbacks run on the task that raised them (the connection's reader or
/// dispatcher, or the session actor) and must not block.
pub trait Handler: Send + Sync + 'static {
    fn on_conn_open(&self, _ctx: ConnOpenContext) {}

    fn on_conn_close(&self, _ctx: ConnCloseContext) {}

    fn on_describe(&self, ctx: DescribeContext) -> Described {
        tracing::debug!(path = ctx.path, "no media registered for path");
        Described {
            response: rtsp::Response::error(rtsp::Status::NotFound).build(),
            stream: None,
        }
    }

    fn on_session_open(&self, _ctx: SessionOpenContext) {}

    fn on_session_close(&self, _ctx: SessionCloseContext) {}

    /// Called for every packet a recording session produces, after it went
    /// through the track's cleaner.
    fn on_packet_rtp(&self, _ctx: PacketContext) {}

    /// Create the payload normalization pipeline for an announced track.
    /// `media` is the track's `m=` line.
    fn make_cleaner(&self, _track_id: usize, _media: &str) -> Box<dyn Cleaner> {
        Box::new(PassthroughCleaner)
    }
}

/// Media description returned from DESCRIBE.
pub trait MediaStream: Send + Sync {
    fn sdp(&self) -> Bytes;
}

pub struct ConnOpenContext<'a> {
    pub connection: &'a ConnectionHandle,
}

pub struct ConnCloseContext<'a> {
    pub connection: &'a ConnectionHandle,
    /// `None` when the connection was stopped together with the server.
    pub error: Option<&'a Error>,
}

pub struct DescribeContext<'a> {
    pub connection: &'a ConnectionHandle,
    pub request: &'a rtsp::Request,
    pub path: &'a str,
    pub query: &'a str,
}

pub struct Described {
    pub response: rtsp::Response,
    pub stream: Option<Arc<dyn MediaStream>>,
}

pub struct SessionOpenContext<'a> {
    pub session: &'a SessionHandle,
    pub connection: &'a ConnectionHandle,
    pub request: &'a rtsp::Request,
}

pub struct SessionCloseContext<'a> {
    pub session: &'a SessionHandle,
    pub error: &'a Error,
}

pub struct PacketContext<'a> {
    pub session: &'a SessionHandle,
    pub track_id: usize,
    pub packet: &'a rtsp::rtp::Packet,
    pub pts_equals_dts: bool,
    pub h264_nalus: &'a [Bytes],
    pub h264_pts: Duration,
}
