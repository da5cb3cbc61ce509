//! Rank-addressed message passing between the processes of a group.
//!
//! The migration pass only needs a handful of primitives: blocking
//! point-to-point send/receive, posted receives joined at a single wait point,
//! and an all-gather. Messages between one source and one destination are
//! delivered in send order; a receive for one tag never consumes a message
//! carrying another.

mod local;

pub use local::{LocalGroup, LocalTransport};

use bytemuck::Pod;

use crate::error::{Result, SwarmError};
use crate::Rank;

/// Message channel within a source/destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Per-shadow-cell outgoing particle counts
    ShadowCounts,
    /// Packed particle records for shadow-cell migration
    ShadowParticles,
    /// Group-wide collectives
    Collective,
}

/// Handle for an enqueued send.
#[derive(Debug)]
#[must_use = "send requests must be joined with Transport::wait_all"]
pub struct SendRequest {
    /// Destination rank
    pub dest: Rank,
    /// Message tag
    pub tag: Tag,
    /// Payload length in bytes
    pub len: usize,
}

/// Handle for a posted receive of a known size.
#[derive(Debug)]
#[must_use = "receive requests must be joined with Transport::wait_all"]
pub struct RecvRequest {
    /// Source rank
    pub source: Rank,
    /// Message tag
    pub tag: Tag,
    /// Payload length the sender announced
    pub expected_len: usize,
}

/// A fixed-size group of ranks exchanging byte messages.
pub trait Transport {
    /// This process's rank.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send `payload` to `dest`. Returns once the payload is enqueued.
    fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()>;

    /// Block until the next message from `source` with `tag` arrives.
    fn recv(&self, source: Rank, tag: Tag) -> Result<Vec<u8>>;

    /// Start a send without waiting for delivery.
    fn isend(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<SendRequest> {
        let len = payload.len();
        self.send(dest, tag, payload)?;
        Ok(SendRequest { dest, tag, len })
    }

    /// Post a receive whose size is already known.
    fn irecv(&self, source: Rank, tag: Tag, expected_len: usize) -> RecvRequest {
        RecvRequest {
            source,
            tag,
            expected_len,
        }
    }

    /// Complete one posted receive, checking the payload size.
    fn wait(&self, request: RecvRequest) -> Result<Vec<u8>> {
        let payload = self.recv(request.source, request.tag)?;
        if payload.len() != request.expected_len {
            return Err(SwarmError::CountMismatch {
                rank: self.rank(),
                peer: request.source,
                what: "payload bytes",
                expected: request.expected_len,
                received: payload.len(),
            });
        }
        Ok(payload)
    }

    /// Join every outstanding send and receive. Payloads come back in the
    /// order the receives were posted.
    fn wait_all(&self, sends: Vec<SendRequest>, recvs: Vec<RecvRequest>) -> Result<Vec<Vec<u8>>> {
        drop(sends);
        recvs.into_iter().map(|r| self.wait(r)).collect()
    }

    /// Every rank contributes `payload`; every rank gets all contributions
    /// indexed by rank.
    fn all_gather(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>> {
        let me = self.rank();
        for dest in (0..self.size()).filter(|&r| r != me) {
            self.send(dest, Tag::Collective, payload.to_vec())?;
        }
        (0..self.size())
            .map(|source| {
                if source == me {
                    Ok(payload.to_vec())
                } else {
                    self.recv(source, Tag::Collective)
                }
            })
            .collect()
    }
}

/// Pack plain values into a message payload.
pub fn encode<T: Pod>(values: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// Unpack a payload produced by [`encode`].
pub fn decode<T: Pod>(rank: Rank, payload: &[u8]) -> Result<Vec<T>> {
    let width = std::mem::size_of::<T>();
    if payload.len() % width != 0 {
        return Err(SwarmError::Transport {
            rank,
            detail: format!(
                "payload of {} bytes is not a whole number of {width}-byte values",
                payload.len()
            ),
        });
    }
    Ok(bytemuck::pod_collect_to_vec(payload))
}

/// Gather one `u64` from every rank.
pub fn all_gather_u64(transport: &dyn Transport, value: u64) -> Result<Vec<u64>> {
    let rank = transport.rank();
    transport
        .all_gather(&encode(&[value]))?
        .iter()
        .map(|p| {
            let v = decode::<u64>(rank, p)?;
            v.first().copied().ok_or_else(|| SwarmError::Transport {
                rank,
                detail: "empty gather contribution".to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_counts() {
        let bytes = encode(&[3u32, 0, 17]);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode::<u32>(0, &bytes).unwrap(), vec![3, 0, 17]);
    }

    #[test]
    fn decode_rejects_ragged_payload() {
        assert!(matches!(
            decode::<u32>(2, &[1, 2, 3]),
            Err(SwarmError::Transport { rank: 2, .. })
        ));
    }
}
