//! In-process transport: one thread per rank, one channel per rank pair.

use std::cell::RefCell;
use std::collections::VecDeque;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::{Tag, Transport};
use crate::error::{Result, SwarmError};
use crate::Rank;

#[derive(Debug)]
struct Envelope {
    tag: Tag,
    payload: Vec<u8>,
}

/// A group of in-process ranks wired together with channels.
pub struct LocalGroup {
    transports: Vec<LocalTransport>,
}

impl LocalGroup {
    /// Wire up `size` ranks, each able to reach every other.
    pub fn new(size: usize) -> Self {
        let mut senders: Vec<Vec<Sender<Envelope>>> = (0..size).map(|_| Vec::new()).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> = (0..size).map(|_| Vec::new()).collect();
        // senders[src][dst] feeds inboxes[dst][src]
        for src in 0..size {
            for inbox in inboxes.iter_mut() {
                let (tx, rx) = unbounded();
                senders[src].push(tx);
                inbox.push(rx);
            }
        }
        let transports = senders
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (senders, inboxes))| LocalTransport {
                rank,
                stash: (0..size).map(|_| RefCell::new(VecDeque::new())).collect(),
                senders,
                inboxes,
            })
            .collect();
        Self { transports }
    }

    /// Hand out the per-rank endpoints, indexed by rank.
    pub fn into_transports(self) -> Vec<LocalTransport> {
        self.transports
    }
}

/// One rank's endpoint of a [`LocalGroup`].
///
/// Dropping an endpoint disconnects it; peers blocked on it get a
/// [`SwarmError::Transport`] instead of waiting forever.
pub struct LocalTransport {
    rank: Rank,
    /// Indexed by destination rank.
    senders: Vec<Sender<Envelope>>,
    /// Indexed by source rank.
    inboxes: Vec<Receiver<Envelope>>,
    /// Messages that arrived ahead of a receive for their tag, per source.
    stash: Vec<RefCell<VecDeque<Envelope>>>,
}

impl LocalTransport {
    fn peer_error(&self, peer: Rank, what: &str) -> SwarmError {
        SwarmError::Transport {
            rank: self.rank,
            detail: format!("{what} rank {peer}"),
        }
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()> {
        let sender = self
            .senders
            .get(dest)
            .ok_or_else(|| self.peer_error(dest, "no such"))?;
        sender
            .send(Envelope { tag, payload })
            .map_err(|_| self.peer_error(dest, "send failed, disconnected from"))
    }

    fn recv(&self, source: Rank, tag: Tag) -> Result<Vec<u8>> {
        let inbox = self
            .inboxes
            .get(source)
            .ok_or_else(|| self.peer_error(source, "no such"))?;
        let mut stash = self.stash[source].borrow_mut();
        if let Some(pos) = stash.iter().position(|e| e.tag == tag) {
            if let Some(envelope) = stash.remove(pos) {
                return Ok(envelope.payload);
            }
        }
        loop {
            let envelope = inbox
                .recv()
                .map_err(|_| self.peer_error(source, "receive failed, disconnected from"))?;
            if envelope.tag == tag {
                return Ok(envelope.payload);
            }
            tracing::trace!(
                "rank {} stashing {:?} message from rank {} while waiting for {:?}",
                self.rank,
                envelope.tag,
                source,
                tag
            );
            stash.push_back(envelope);
        }
    }
}
