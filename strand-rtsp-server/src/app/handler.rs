use std::sync::atomic::{AtomicU64, Ordering};

use crate::handler::{
    ConnCloseContext, ConnOpenContext, DescribeContext, Described, Handler, PacketContext,
    SessionCloseContext, SessionOpenContext,
};

/// Handler of the standalone server. Accepts publishers and logs what
/// happens; it does not serve media itself.
#[derive(Default)]
pub struct AppHandler {
    packets: AtomicU64,
}

impl AppHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets_received(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }
}

impl Handler for AppHandler {
    fn on_conn_open(&self, ctx: ConnOpenContext) {
        tracing::info!(
            connection_id = %ctx.connection.id(),
            remote = %ctx.connection.stream().remote,
            "client connected",
        );
    }

    fn on_conn_close(&self, ctx: ConnCloseContext) {
        match ctx.error {
            Some(err) => tracing::info!(
                connection_id = %ctx.connection.id(),
                %err,
                "client disconnected",
            ),
            None => tracing::info!(connection_id = %ctx.connection.id(), "client disconnected"),
        }
    }

    fn on_describe(&self, ctx: DescribeContext) -> Described {
        tracing::debug!(path = ctx.path, query = ctx.query, "describe");
        Described {
            response: strand_rtsp_protocol::Response::error(strand_rtsp_protocol::Status::NotFound)
                .build(),
            stream: None,
        }
    }

    fn on_session_open(&self, ctx: SessionOpenContext) {
        tracing::info!(
            session_id = %ctx.session.id(),
            connection_id = %ctx.connection.id(),
            "session opened",
        );
    }

    fn on_session_close(&self, ctx: SessionCloseContext) {
        tracing::info!(
            session_id = %ctx.session.id(),
            err = %ctx.error,
            packets = self.packets_received(),
            "session closed",
        );
    }

    fn on_packet_rtp(&self, ctx: PacketContext) {
        let packets = self.packets.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(
            session_id = %ctx.session.id(),
            track_id = ctx.track_id,
            sequence_number = ctx.packet.sequence_number,
            packets,
            "received packet",
        );
    }
}
