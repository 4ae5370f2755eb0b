//! TCP process group: one OS process per rank.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────┐
//!   rank 1 ──┤              │
//!   rank 2 ──┤  rank 0      │  accepts N-1 connections, one per peer
//!     ...  ──┤ (coordinator)│
//!   rank N-1─┤              │
//!            └──────────────┘
//! ```
//!
//! Peers only ever talk to the coordinator. The all-gather collects every
//! scalar on the coordinator and broadcasts the full vector back. The
//! barrier works the same way with empty messages.
//!
//! The async socket work runs on a private current-thread tokio runtime;
//! every `Communicator` call blocks on it until the exchange completes.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::time::Instant;

use super::wire::{decode_f64s, encode_f64s, read_message, write_message, Message, MessageKind};
use super::{check_rank, Communicator, TransportError, COORDINATOR_RANK};

/// Delay between connection attempts while the coordinator is starting up
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// How a rank finds the rest of its group
#[derive(Debug, Clone)]
pub struct TcpGroupConfig {
    /// Address the coordinator listens on and peers connect to
    pub coordinator_address: String,
    /// How long to wait for the whole group to assemble
    pub connect_timeout: Duration,
}

impl Default for TcpGroupConfig {
    fn default() -> Self {
        Self {
            coordinator_address: "127.0.0.1:7878".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// `Communicator` over TCP sockets in a star topology
pub struct TcpCommunicator {
    rank: usize,
    size: usize,
    runtime: Runtime,
    /// Connected streams, indexed by peer rank
    streams: Vec<Option<TcpStream>>,
}

impl TcpCommunicator {
    /// Join the group as `rank` of `size`.
    ///
    /// The coordinator binds and waits for every peer's Hello; peers retry
    /// their connection until the coordinator is up or the timeout expires.
    pub fn connect(config: &TcpGroupConfig, rank: usize, size: usize) -> Result<Self, TransportError> {
        if size == 0 {
            return Err(TransportError::InvalidRank { rank, size });
        }
        check_rank(rank, size)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let streams = runtime.block_on(async {
            if rank == COORDINATOR_RANK {
                accept_peers(config, size).await
            } else {
                connect_to_coordinator(config, rank, size).await
            }
        })?;

        tracing::info!(rank, size, address = %config.coordinator_address, "TCP group assembled");

        Ok(Self {
            rank,
            size,
            runtime,
            streams,
        })
    }

    /// Validate that this topology routes between us and `peer`
    fn route(&self, peer: usize) -> Result<(), TransportError> {
        check_rank(peer, self.size)?;
        let routed = peer != self.rank && (self.rank == COORDINATOR_RANK || peer == COORDINATOR_RANK);
        if !routed {
            return Err(TransportError::UnsupportedRoute { from: self.rank, to: peer });
        }
        Ok(())
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather(&mut self, value: f64) -> Result<Vec<f64>, TransportError> {
        let (rank, size) = (self.rank, self.size);
        let streams = &mut self.streams;

        self.runtime.block_on(async move {
            if rank == COORDINATOR_RANK {
                let mut values = vec![0.0; size];
                values[COORDINATOR_RANK] = value;
                for peer in 1..size {
                    let message = recv_from(streams, peer).await?.expect_kind(MessageKind::Gather)?;
                    values[peer] = decode_f64s(message.payload, 1)?[0];
                }

                let gathered = encode_f64s(&values);
                for peer in 1..size {
                    send_to(streams, peer, MessageKind::GatherResult, rank, &gathered).await?;
                }
                Ok(values)
            } else {
                send_to(streams, COORDINATOR_RANK, MessageKind::Gather, rank, &encode_f64s(&[value])).await?;
                let message = recv_from(streams, COORDINATOR_RANK)
                    .await?
                    .expect_kind(MessageKind::GatherResult)?;
                decode_f64s(message.payload, size)
            }
        })
    }

    fn send(&mut self, dest: usize, payload: Bytes) -> Result<(), TransportError> {
        self.route(dest)?;
        let rank = self.rank;
        let streams = &mut self.streams;
        self.runtime
            .block_on(async move { send_to(streams, dest, MessageKind::Payload, rank, &payload).await })
    }

    fn receive(&mut self, source: usize) -> Result<Bytes, TransportError> {
        self.route(source)?;
        let streams = &mut self.streams;
        let message = self
            .runtime
            .block_on(async move { recv_from(streams, source).await })?
            .expect_kind(MessageKind::Payload)?;
        Ok(message.payload)
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        let (rank, size) = (self.rank, self.size);
        let streams = &mut self.streams;

        self.runtime.block_on(async move {
            if rank == COORDINATOR_RANK {
                for peer in 1..size {
                    recv_from(streams, peer).await?.expect_kind(MessageKind::Barrier)?;
                }
                for peer in 1..size {
                    send_to(streams, peer, MessageKind::Release, rank, &[]).await?;
                }
            } else {
                send_to(streams, COORDINATOR_RANK, MessageKind::Barrier, rank, &[]).await?;
                recv_from(streams, COORDINATOR_RANK)
                    .await?
                    .expect_kind(MessageKind::Release)?;
            }
            Ok(())
        })
    }
}

fn stream_for(streams: &mut [Option<TcpStream>], peer: usize) -> Result<&mut TcpStream, TransportError> {
    streams
        .get_mut(peer)
        .and_then(Option::as_mut)
        .ok_or(TransportError::Disconnected { peer })
}

async fn send_to(
    streams: &mut [Option<TcpStream>],
    peer: usize,
    kind: MessageKind,
    rank: usize,
    payload: &[u8],
) -> Result<(), TransportError> {
    let stream = stream_for(streams, peer)?;
    write_message(stream, kind, rank, payload)
        .await
        .map_err(|e| disconnected_on_eof(e, peer))
}

/// Read the next message from `peer`, checking it claims to come from `peer`
async fn recv_from(streams: &mut [Option<TcpStream>], peer: usize) -> Result<Message, TransportError> {
    let stream = stream_for(streams, peer)?;
    let message = read_message(stream)
        .await
        .map_err(|e| disconnected_on_eof(e, peer))?;
    if message.header.source as usize != peer {
        return Err(TransportError::ProtocolViolation(format!(
            "message on rank {}'s connection claims source {}",
            peer, message.header.source
        )));
    }
    Ok(message)
}

fn disconnected_on_eof(error: TransportError, peer: usize) -> TransportError {
    match error {
        TransportError::Io(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ) =>
        {
            TransportError::Disconnected { peer }
        }
        other => other,
    }
}

fn hello_payload(size: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64_le(size as u64);
    buf.freeze()
}

async fn accept_peers(config: &TcpGroupConfig, size: usize) -> Result<Vec<Option<TcpStream>>, TransportError> {
    let mut streams: Vec<Option<TcpStream>> = (0..size).map(|_| None).collect();
    if size == 1 {
        return Ok(streams);
    }

    let listener = TcpListener::bind(&config.coordinator_address).await?;
    tracing::info!(address = %config.coordinator_address, peers = size - 1, "Coordinator waiting for peers");

    let accept_all = async {
        let mut connected = 0;
        while connected < size - 1 {
            let (mut stream, remote) = listener.accept().await?;
            stream.set_nodelay(true)?;

            let hello = read_message(&mut stream).await?.expect_kind(MessageKind::Hello)?;
            let peer = hello.header.source as usize;
            let mut payload = hello.payload;
            if payload.len() != 8 {
                return Err(TransportError::ProtocolViolation("malformed hello".to_string()));
            }
            let peer_size = payload.get_u64_le() as usize;
            if peer_size != size {
                return Err(TransportError::ProtocolViolation(format!(
                    "rank {} expects a group of {}, coordinator has {}",
                    peer, peer_size, size
                )));
            }
            if peer == COORDINATOR_RANK || peer >= size {
                return Err(TransportError::InvalidRank { rank: peer, size });
            }
            if streams[peer].is_some() {
                return Err(TransportError::ProtocolViolation(format!("rank {} connected twice", peer)));
            }

            tracing::debug!(peer, %remote, "Peer joined");
            streams[peer] = Some(stream);
            connected += 1;
        }
        Ok::<_, TransportError>(())
    };

    tokio::time::timeout(config.connect_timeout, accept_all)
        .await
        .map_err(|_| {
            TransportError::ConnectTimeout(format!(
                "not every peer reached {} within {:?}",
                config.coordinator_address, config.connect_timeout
            ))
        })??;

    Ok(streams)
}

async fn connect_to_coordinator(
    config: &TcpGroupConfig,
    rank: usize,
    size: usize,
) -> Result<Vec<Option<TcpStream>>, TransportError> {
    let deadline = Instant::now() + config.connect_timeout;
    let mut stream = loop {
        match TcpStream::connect(&config.coordinator_address).await {
            Ok(stream) => break stream,
            Err(e) if Instant::now() < deadline => {
                tracing::trace!(rank, error = %e, "Coordinator not ready, retrying");
                tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(TransportError::ConnectTimeout(format!(
                    "rank {} could not reach {}: {}",
                    rank, config.coordinator_address, e
                )))
            }
        }
    };
    stream.set_nodelay(true)?;
    write_message(&mut stream, MessageKind::Hello, rank, &hello_payload(size)).await?;

    let mut streams: Vec<Option<TcpStream>> = (0..size).map(|_| None).collect();
    streams[COORDINATOR_RANK] = Some(stream);
    Ok(streams)
}
