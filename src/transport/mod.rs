//! Transport module for moving distances and frames between ranks.
//!
//! This module provides:
//! - `Communicator`: the narrow collective-channel interface the pipeline uses
//! - `LocalGroup`: an in-process group of ranks connected by channels
//! - `TcpCommunicator`: one OS process per rank, star topology over TCP
//! - `gather_frames`: the coordinator-gathers-from-all image transfer
//!
//! # Ordering
//!
//! The coordinator receives from ranks strictly in increasing rank order,
//! never first-arrived order. Nothing retries: any failure ends the run.

pub mod gather;
pub mod local;
pub mod tcp;
pub mod wire;

pub use gather::{gather_frames, GatheredFrames};
pub use local::{LocalCommunicator, LocalGroup};
pub use tcp::{TcpCommunicator, TcpGroupConfig};
pub use wire::{FrameHeader, MessageKind};

use bytes::Bytes;

/// Rank that gathers frames and produces the final image
pub const COORDINATOR_RANK: usize = 0;

/// Transport error type.
#[derive(Debug)]
pub enum TransportError {
    /// Socket or stream I/O failed
    Io(std::io::Error),
    /// The peer went away before the exchange completed
    Disconnected { peer: usize },
    /// A message arrived that the protocol does not allow here
    ProtocolViolation(String),
    /// A gathered frame did not have exactly the expected length
    SizeMismatch { source: usize, expected: usize, actual: usize },
    /// A rank outside `[0, size)` was addressed
    InvalidRank { rank: usize, size: usize },
    /// This topology cannot route between the two ranks
    UnsupportedRoute { from: usize, to: usize },
    /// The group could not be assembled in time
    ConnectTimeout(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "Transport I/O error: {}", e),
            TransportError::Disconnected { peer } => write!(f, "Rank {} disconnected", peer),
            TransportError::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
            TransportError::SizeMismatch { source, expected, actual } => write!(
                f,
                "Frame from rank {} is {} bytes, expected {}",
                source, actual, expected
            ),
            TransportError::InvalidRank { rank, size } => {
                write!(f, "Rank {} is outside a group of {}", rank, size)
            }
            TransportError::UnsupportedRoute { from, to } => {
                write!(f, "No route from rank {} to rank {}", from, to)
            }
            TransportError::ConnectTimeout(msg) => write!(f, "Connect timeout: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Collective channel shared by every rank in a run.
///
/// All operations block until complete. `all_gather` and `barrier` are
/// collective: every rank must call them, in the same sequence.
pub trait Communicator {
    /// This rank's id in `[0, size)`
    fn rank(&self) -> usize;

    /// Number of ranks in the group
    fn size(&self) -> usize;

    /// Contribute one scalar and receive every rank's scalar, indexed by rank
    fn all_gather(&mut self, value: f64) -> Result<Vec<f64>, TransportError>;

    /// Send one payload to `dest`, blocking until it has been handed off
    fn send(&mut self, dest: usize, payload: Bytes) -> Result<(), TransportError>;

    /// Receive the next payload from `source`
    fn receive(&mut self, source: usize) -> Result<Bytes, TransportError>;

    /// Block until every rank has reached the barrier
    fn barrier(&mut self) -> Result<(), TransportError>;

    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR_RANK
    }
}

pub(crate) fn check_rank(rank: usize, size: usize) -> Result<(), TransportError> {
    if rank >= size {
        return Err(TransportError::InvalidRank { rank, size });
    }
    Ok(())
}
