use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::codec::FramedRead;

use strand_rtsp_protocol::{self as rtsp, rtp, AsServer, Codec, RequestMaybeInterleaved};

use crate::conn::ConnectionHandle;
use crate::error::Error;
use crate::handler::{Handler, PacketContext};
use crate::session::track::Cleaner;
use crate::session::SessionHandle;

/// How the reader interprets the inbound stream.
pub enum ReadStrategy {
    /// Every unit is a request. Binary frames are dropped.
    Standard,
    /// Binary frames are demultiplexed into the session's tracks, requests
    /// are still forwarded.
    Interleaved(Interleaved),
}

impl fmt::Debug for ReadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadStrategy::Standard => write!(f, "Standard"),
            ReadStrategy::Interleaved(interleaved) => {
                write!(f, "Interleaved({:?})", interleaved.session.id())
            }
        }
    }
}

pub struct Interleaved {
    session: SessionHandle,
    /// Interleaved channel to track index.
    channels: HashMap<rtsp::ChannelId, usize>,
    mode: InterleavedMode,
}

impl Interleaved {
    pub fn new(
        session: SessionHandle,
        channels: HashMap<rtsp::ChannelId, usize>,
        mode: InterleavedMode,
    ) -> Self {
        Self {
            session,
            channels,
            mode,
        }
    }
}

pub enum InterleavedMode {
    /// Inbound frames are accepted but not processed.
    Play,
    /// Inbound frames are RTP packets of the announced tracks, one cleaner
    /// per track.
    Record { cleaners: Vec<Box<dyn Cleaner>> },
}

pub enum ReadOutcome {
    /// Continue with another strategy.
    Switch(ReadStrategy),
    /// The reader stops.
    Terminal(Error),
}

/// A request handed to the dispatcher. The reply carries the strategy to
/// switch to, if any. An error reply ends the reader.
pub struct ReadRequest {
    pub request: rtsp::Request,
    pub reply: oneshot::Sender<Result<Option<ReadStrategy>, Error>>,
}

pub(super) struct Reader<R> {
    inbound: FramedRead<R, Codec<AsServer>>,
    connection: ConnectionHandle,
    handler: Arc<dyn Handler>,
    read_request_tx: mpsc::Sender<ReadRequest>,
    read_timeout: Duration,
    packets: PacketPool,
}

impl<R> Reader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        inbound: FramedRead<R, Codec<AsServer>>,
        connection: ConnectionHandle,
        handler: Arc<dyn Handler>,
        read_request_tx: mpsc::Sender<ReadRequest>,
        read_timeout: Duration,
        read_buffer_count: usize,
    ) -> Self {
        Self {
            inbound,
            connection,
            handler,
            read_request_tx,
            read_timeout,
            packets: PacketPool::new(read_buffer_count),
        }
    }

    /// Run strategies until one of them ends the reader, then hand the cause
    /// to the dispatcher.
    pub async fn run(mut self, read_error_tx: mpsc::Sender<Error>) {
        let mut strategy = ReadStrategy::Standard;
        let err = loop {
            let outcome = match strategy {
                ReadStrategy::Standard => self.read_standard().await,
                ReadStrategy::Interleaved(interleaved) => self.read_interleaved(interleaved).await,
            };

            match outcome {
                ReadOutcome::Switch(next) => {
                    tracing::trace!(
                        connection_id = %self.connection.id(),
                        strategy = ?next,
                        "switching read strategy",
                    );
                    strategy = next;
                }
                ReadOutcome::Terminal(err) => break err,
            }
        };

        tracing::trace!(connection_id = %self.connection.id(), %err, "reader stopped");
        select! {
            _ = read_error_tx.send(err) => {},
            _ = self.connection.token.cancelled() => {},
        }
    }

    async fn read_standard(&mut self) -> ReadOutcome {
        loop {
            let item = match self.next_unit(None).await {
                Ok(item) => item,
                Err(err) => return ReadOutcome::Terminal(err),
            };

            match item {
                rtsp::MaybeInterleaved::Message(request) => match self.forward(request).await {
                    Ok(None) => {}
                    Ok(Some(next)) => return ReadOutcome::Switch(next),
                    Err(err) => return ReadOutcome::Terminal(err),
                },
                rtsp::MaybeInterleaved::Interleaved { channel, payload } => {
                    tracing::trace!(
                        connection_id = %self.connection.id(),
                        channel,
                        size = payload.len(),
                        "dropping interleaved frame outside of interleaved transport",
                    );
                }
            }
        }
    }

    async fn read_interleaved(&mut self, mut interleaved: Interleaved) -> ReadOutcome {
        interleaved
            .session
            .writer_started(self.connection.id())
            .await;

        loop {
            let deadline = match interleaved.mode {
                InterleavedMode::Record { .. } => Some(Instant::now() + self.read_timeout),
                InterleavedMode::Play => None,
            };

            let item = select! {
                biased;
                // CANCEL SAFETY: `CancellationToken::cancelled` is cancel safe.
                _ = interleaved.session.token.cancelled() => {
                    // The session is gone, and with it the channel mapping.
                    tracing::debug!(
                        connection_id = %self.connection.id(),
                        session_id = %interleaved.session.id(),
                        "session closed, leaving interleaved transport",
                    );
                    return ReadOutcome::Switch(ReadStrategy::Standard);
                },
                // CANCEL SAFETY: `next_unit` only awaits `FramedRead::next`, which keeps
                // partially read data in its buffer.
                item = self.next_unit(deadline) => item,
            };
            let item = match item {
                Ok(item) => item,
                Err(err) => return ReadOutcome::Terminal(err),
            };

            match item {
                rtsp::MaybeInterleaved::Message(request) => match self.forward(request).await {
                    Ok(None) => {}
                    Ok(Some(next)) => return ReadOutcome::Switch(next),
                    Err(err) => return ReadOutcome::Terminal(err),
                },
                rtsp::MaybeInterleaved::Interleaved { channel, payload } => {
                    // Only frames on channels that were set up are forwarded.
                    let Some(&track_id) = interleaved.channels.get(&channel) else {
                        continue;
                    };

                    if let InterleavedMode::Record { cleaners } = &mut interleaved.mode {
                        if let Err(err) =
                            self.process_rtp(&interleaved.session, cleaners, track_id, payload)
                        {
                            return ReadOutcome::Terminal(err);
                        }
                    }
                }
            }
        }
    }

    fn process_rtp(
        &mut self,
        session: &SessionHandle,
        cleaners: &mut [Box<dyn Cleaner>],
        track_id: usize,
        payload: Bytes,
    ) -> Result<(), Error> {
        let packet = self.packets.next();
        packet.unmarshal(payload)?;

        let cleaner = cleaners
            .get_mut(track_id)
            .ok_or(Error::InvalidTrack { track_id })?;
        for cleaned in cleaner.process(packet)? {
            self.handler.on_packet_rtp(PacketContext {
                session,
                track_id,
                packet: &cleaned.packet,
                pts_equals_dts: cleaned.pts_equals_dts,
                h264_nalus: &cleaned.h264_nalus,
                h264_pts: cleaned.h264_pts,
            });
        }

        Ok(())
    }

    /// Read the next request or frame. Gives up at `deadline` if set.
    async fn next_unit(&mut self, deadline: Option<Instant>) -> Result<RequestMaybeInterleaved, Error> {
        let item = select! {
            item = next_or_deadline(&mut self.inbound, deadline) => item?,
            // CANCEL SAFETY: `FramedRead` keeps partially read data in its buffer.
            _ = self.connection.token.cancelled() => return Err(Error::Terminated),
        };

        match item {
            Some(Ok(item)) => Ok(item),
            Some(Err(err)) => Err(err.into()),
            None => Err(Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof))),
        }
    }

    /// Hand `request` to the dispatcher and wait until it was answered.
    async fn forward(&mut self, request: rtsp::Request) -> Result<Option<ReadStrategy>, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();

        select! {
            permit = self.read_request_tx.reserve() => {
                permit
                    .map_err(|_| Error::Terminated)?
                    .send(ReadRequest {
                        request,
                        reply: reply_tx,
                    });
            },
            _ = self.connection.token.cancelled() => return Err(Error::Terminated),
        }

        select! {
            reply = reply_rx => reply.map_err(|_| Error::Terminated)?,
            _ = self.connection.token.cancelled() => Err(Error::Terminated),
        }
    }
}

async fn next_or_deadline<R: AsyncRead + Unpin>(
    inbound: &mut FramedRead<R, Codec<AsServer>>,
    deadline: Option<Instant>,
) -> Result<Option<Result<RequestMaybeInterleaved, rtsp::Error>>, Error> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, inbound.next())
            .await
            .map_err(|_| Error::ReadTimeout),
        None => Ok(inbound.next().await),
    }
}

/// Ring of packets that inbound RTP is decoded into, so decoding does not
/// allocate for every frame.
struct PacketPool {
    packets: Vec<rtp::Packet>,
    next: usize,
}

impl PacketPool {
    fn new(count: usize) -> Self {
        Self {
            packets: vec![rtp::Packet::new(); count.max(1)],
            next: 0,
        }
    }

    fn next(&mut self) -> &mut rtp::Packet {
        let index = self.next;
        self.next = (self.next + 1) % self.packets.len();
        &mut self.packets[index]
    }
}

#[cfg(test)]
mod tests {
    use super::PacketPool;

    #[test]
    fn packet_pool_wraps_around() {
        let mut pool = PacketPool::new(2);
        pool.next().sequence_number = 1;
        pool.next().sequence_number = 2;
        assert_eq!(pool.next().sequence_number, 1);
        assert_eq!(pool.next().sequence_number, 2);
    }

    #[test]
    fn packet_pool_has_at_least_one_slot() {
        let mut pool = PacketPool::new(0);
        pool.next().sequence_number = 7;
        assert_eq!(pool.next().sequence_number, 7);
    }
}
