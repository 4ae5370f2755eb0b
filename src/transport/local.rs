//! In-process process group.
//!
//! Each rank is driven on its own thread and holds a `LocalCommunicator`.
//! Every ordered pair of ranks gets two channels:
//!
//! - control (unbounded): all-gather values and barrier tokens, so
//!   collectives never block on a slow peer's send side
//! - data (rendezvous, capacity 0): point-to-point payloads, so `send`
//!   returns only once the matching `receive` has taken the payload

use bytes::Bytes;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::{check_rank, Communicator, TransportError};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Control {
    Gather(f64),
    Barrier,
}

/// Builder for a fully connected in-process group
pub struct LocalGroup;

impl LocalGroup {
    /// Create `size` communicators, one per rank, indexed by rank.
    pub fn new(size: usize) -> Vec<LocalCommunicator> {
        // Indexed [source][dest]
        let mut control_tx: Vec<Vec<Option<Sender<Control>>>> = vec![vec![None; size]; size];
        let mut control_rx: Vec<Vec<Option<Receiver<Control>>>> = vec![vec![None; size]; size];
        let mut data_tx: Vec<Vec<Option<Sender<Bytes>>>> = vec![vec![None; size]; size];
        let mut data_rx: Vec<Vec<Option<Receiver<Bytes>>>> = vec![vec![None; size]; size];

        for source in 0..size {
            for dest in 0..size {
                if source == dest {
                    continue;
                }
                let (tx, rx) = unbounded();
                control_tx[source][dest] = Some(tx);
                control_rx[dest][source] = Some(rx);

                let (tx, rx) = bounded(0);
                data_tx[source][dest] = Some(tx);
                data_rx[dest][source] = Some(rx);
            }
        }

        control_tx
            .into_iter()
            .zip(control_rx)
            .zip(data_tx.into_iter().zip(data_rx))
            .enumerate()
            .map(|(rank, ((control_tx, control_rx), (data_tx, data_rx)))| LocalCommunicator {
                rank,
                size,
                control_tx,
                control_rx,
                data_tx,
                data_rx,
            })
            .collect()
    }
}

/// One rank's endpoint in a `LocalGroup`
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    /// Indexed by destination rank
    control_tx: Vec<Option<Sender<Control>>>,
    /// Indexed by source rank
    control_rx: Vec<Option<Receiver<Control>>>,
    data_tx: Vec<Option<Sender<Bytes>>>,
    data_rx: Vec<Option<Receiver<Bytes>>>,
}

impl LocalCommunicator {
    fn send_control(&self, dest: usize, message: Control) -> Result<(), TransportError> {
        let tx = self.control_tx[dest]
            .as_ref()
            .ok_or(TransportError::UnsupportedRoute { from: self.rank, to: dest })?;
        tx.send(message)
            .map_err(|_| TransportError::Disconnected { peer: dest })
    }

    fn recv_control(&self, source: usize) -> Result<Control, TransportError> {
        let rx = self.control_rx[source]
            .as_ref()
            .ok_or(TransportError::UnsupportedRoute { from: source, to: self.rank })?;
        rx.recv()
            .map_err(|_| TransportError::Disconnected { peer: source })
    }

    fn peers(&self) -> impl Iterator<Item = usize> {
        let rank = self.rank;
        (0..self.size).filter(move |&r| r != rank)
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather(&mut self, value: f64) -> Result<Vec<f64>, TransportError> {
        for peer in self.peers() {
            self.send_control(peer, Control::Gather(value))?;
        }

        let mut values = vec![0.0; self.size];
        values[self.rank] = value;
        for peer in self.peers() {
            match self.recv_control(peer)? {
                Control::Gather(v) => values[peer] = v,
                other => {
                    return Err(TransportError::ProtocolViolation(format!(
                        "expected gather value from rank {}, got {:?}",
                        peer, other
                    )))
                }
            }
        }
        Ok(values)
    }

    fn send(&mut self, dest: usize, payload: Bytes) -> Result<(), TransportError> {
        check_rank(dest, self.size)?;
        let tx = self.data_tx[dest]
            .as_ref()
            .ok_or(TransportError::UnsupportedRoute { from: self.rank, to: dest })?;
        tx.send(payload)
            .map_err(|_| TransportError::Disconnected { peer: dest })
    }

    fn receive(&mut self, source: usize) -> Result<Bytes, TransportError> {
        check_rank(source, self.size)?;
        let rx = self.data_rx[source]
            .as_ref()
            .ok_or(TransportError::UnsupportedRoute { from: source, to: self.rank })?;
        rx.recv()
            .map_err(|_| TransportError::Disconnected { peer: source })
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        for peer in self.peers() {
            self.send_control(peer, Control::Barrier)?;
        }
        for peer in self.peers() {
            match self.recv_control(peer)? {
                Control::Barrier => {}
                other => {
                    return Err(TransportError::ProtocolViolation(format!(
                        "expected barrier from rank {}, got {:?}",
                        peer, other
                    )))
                }
            }
        }
        Ok(())
    }
}
