//! Gather every rank's frame on the coordinator.
//!
//! Peers send their frame exactly once. The coordinator keeps its own frame
//! in place and receives the others from ranks 1..N-1, in that order, each
//! into a buffer of exactly the agreed size.

use super::{Communicator, TransportError, COORDINATOR_RANK};
use crate::frame::RgbaFrame;
use crate::render::RenderedFrame;

/// Frames held by the coordinator after the gather, indexed by rank
#[derive(Debug, Clone)]
pub struct GatheredFrames {
    frames: Vec<RgbaFrame>,
}

impl GatheredFrames {
    pub fn get(&self, rank: usize) -> Option<&RgbaFrame> {
        self.frames.get(rank)
    }

    pub fn frames(&self) -> &[RgbaFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Move every rank's rendered frame to the coordinator.
///
/// Takes a `RenderedFrame`, which only exists once the local render has
/// completed. Returns `Some` on the coordinator and `None` on every other
/// rank. A payload of the wrong length aborts the gather.
pub fn gather_frames<C>(comm: &mut C, rendered: RenderedFrame) -> Result<Option<GatheredFrames>, TransportError>
where
    C: Communicator + ?Sized,
{
    if rendered.rank() != comm.rank() {
        return Err(TransportError::ProtocolViolation(format!(
            "rank {} tried to transport rank {}'s frame",
            comm.rank(),
            rendered.rank()
        )));
    }

    let local = rendered.into_frame();
    if !comm.is_coordinator() {
        tracing::debug!(
            rank = comm.rank(),
            bytes = RgbaFrame::payload_len(local.width(), local.height()),
            "Sending frame to coordinator"
        );
        comm.send(COORDINATOR_RANK, local.to_payload())?;
        return Ok(None);
    }

    let (width, height) = local.dimensions();
    let expected = RgbaFrame::payload_len(width, height);
    let mut frames = Vec::with_capacity(comm.size());
    frames.push(local);

    for source in 1..comm.size() {
        let payload = comm.receive(source)?;
        let actual = payload.len();
        let frame = RgbaFrame::from_payload(width, height, payload)
            .map_err(|_| TransportError::SizeMismatch { source, expected, actual })?;
        tracing::debug!(source, bytes = actual, "Received frame");
        frames.push(frame);
    }

    Ok(Some(GatheredFrames { frames }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalGroup;
    use bytes::Bytes;
    use std::thread;

    fn filled(rank: usize, width: u32, height: u32) -> RenderedFrame {
        let value = rank as f32 / 10.0;
        let samples = vec![value; RgbaFrame::sample_count(width, height)];
        RenderedFrame::new(rank, RgbaFrame::from_samples(width, height, samples).unwrap())
    }

    #[test]
    fn test_coordinator_receives_every_frame_by_rank() {
        let mut comms = LocalGroup::new(4);
        let mut coordinator = comms.remove(0);

        let peers: Vec<_> = comms
            .into_iter()
            .map(|mut comm| {
                thread::spawn(move || {
                    let rank = comm.rank();
                    gather_frames(&mut comm, filled(rank, 4, 3)).unwrap()
                })
            })
            .collect();

        let gathered = gather_frames(&mut coordinator, filled(0, 4, 3)).unwrap().unwrap();
        assert_eq!(gathered.len(), 4);
        for rank in 0..4 {
            let frame = gathered.get(rank).unwrap();
            assert_eq!(frame.dimensions(), (4, 3));
            assert!(frame.samples().iter().all(|&s| s == rank as f32 / 10.0));
        }

        for peer in peers {
            assert!(peer.join().unwrap().is_none());
        }
    }

    #[test]
    fn test_wrong_size_frame_is_fatal() {
        let mut comms = LocalGroup::new(2);
        let mut coordinator = comms.remove(0);
        let mut peer = comms.remove(0);

        let sender = thread::spawn(move || gather_frames(&mut peer, filled(1, 4, 4)));
        let err = gather_frames(&mut coordinator, filled(0, 4, 3)).unwrap_err();
        assert!(matches!(
            err,
            TransportError::SizeMismatch { source: 1, expected: 192, actual: 256 }
        ));
        assert!(sender.join().unwrap().is_ok());
    }

    #[test]
    fn test_truncated_payload_is_fatal() {
        let mut comms = LocalGroup::new(2);
        let mut coordinator = comms.remove(0);
        let mut peer = comms.remove(0);

        let sender = thread::spawn(move || peer.send(0, Bytes::from(vec![0u8; 10])));
        let err = gather_frames(&mut coordinator, filled(0, 1, 1)).unwrap_err();
        assert!(matches!(err, TransportError::SizeMismatch { source: 1, expected: 16, actual: 10 }));
        sender.join().unwrap().unwrap();
    }

    #[test]
    fn test_frame_must_belong_to_caller() {
        let mut comm = LocalGroup::new(1).remove(0);
        assert!(matches!(
            gather_frames(&mut comm, filled(3, 1, 1)),
            Err(TransportError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_single_rank_gather_uses_local_frame() {
        let mut comm = LocalGroup::new(1).remove(0);
        let gathered = gather_frames(&mut comm, filled(0, 2, 2)).unwrap().unwrap();
        assert_eq!(gathered.len(), 1);
        assert_eq!(gathered.frames()[0].dimensions(), (2, 2));
    }
}
