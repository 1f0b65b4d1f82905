// Point-to-point message channel between the ranks of a pool
//
// Ranks are threads of one process. Each rank owns an inbox; the coordinator
// holds a sender to every worker and each worker holds a sender to the
// coordinator only, so a rank whose peers have all exited sees a disconnect
// instead of blocking forever.
//
// Delivery is FIFO per sender. A receive filtered by source keeps messages
// from other senders in a pending buffer, in arrival order.

use crate::message::Message;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tip_common::{Rank, Result, TipError, COORDINATOR_RANK};

/// Payload as it travels: structured, or encoded to bytes
#[derive(Debug)]
pub enum Wire {
    Plain(Message),
    Encoded(Vec<u8>),
}

#[derive(Debug)]
pub struct Envelope {
    pub source: Rank,
    pub wire: Wire,
}

impl Envelope {
    fn open(self) -> Result<(Message, Rank)> {
        let message = match self.wire {
            Wire::Plain(message) => message,
            Wire::Encoded(bytes) => Message::decode(&bytes)?,
        };
        Ok((message, self.source))
    }
}

/// One rank's view of the pool
#[derive(Debug)]
pub struct Endpoint {
    rank: Rank,
    pool_size: usize,
    routes: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    pending: VecDeque<Envelope>,
}

/// Create the endpoints of a pool; element `r` belongs to rank `r`
pub fn create_pool(pool_size: usize) -> Vec<Endpoint> {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..pool_size).map(|_| unbounded()).unzip();

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| {
            let routes = (0..pool_size)
                .map(|dest| {
                    let linked = if rank == COORDINATOR_RANK {
                        dest != COORDINATOR_RANK
                    } else {
                        dest == COORDINATOR_RANK
                    };
                    linked.then(|| senders[dest].clone())
                })
                .collect();
            Endpoint {
                rank,
                pool_size,
                routes,
                inbox,
                pending: VecDeque::new(),
            }
        })
        .collect()
}

impl Endpoint {
    #[inline]
    pub fn rank(&self) -> Rank {
        self.rank
    }

    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Send `message` to `dest`, encoding it first when `serialize` is set
    pub fn send(&self, dest: Rank, message: Message, serialize: bool) -> Result<()> {
        let route = self
            .routes
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                TipError::protocol(format!("rank {} has no route to rank {}", self.rank, dest))
            })?;

        let name = message.name();
        let wire = if serialize {
            Wire::Encoded(message.encode())
        } else {
            Wire::Plain(message)
        };
        log::trace!("rank {} -> rank {}: {}", self.rank, dest, name);

        route
            .send(Envelope {
                source: self.rank,
                wire,
            })
            .map_err(|_| {
                TipError::protocol(format!(
                    "rank {} is gone, cannot deliver {} from rank {}",
                    dest, name, self.rank
                ))
            })
    }

    /// Send a copy of `message` to every worker; coordinator only
    pub fn broadcast(&self, message: &Message, serialize: bool) -> Result<()> {
        if self.rank != COORDINATOR_RANK {
            return Err(TipError::protocol(format!(
                "rank {} cannot broadcast, only the coordinator can",
                self.rank
            )));
        }
        for dest in 1..self.pool_size {
            self.send(dest, message.clone(), serialize)?;
        }
        Ok(())
    }

    /// Receive the next message, optionally from one `source` only
    ///
    /// Blocks until a message arrives, `timeout` elapses or every sender to
    /// this rank has gone.
    pub fn receive(
        &mut self,
        source: Option<Rank>,
        timeout: Option<Duration>,
    ) -> Result<(Message, Rank)> {
        let wanted = |envelope: &Envelope| source.map_or(true, |s| envelope.source == s);

        if let Some(pos) = self.pending.iter().position(wanted) {
            if let Some(envelope) = self.pending.remove(pos) {
                return envelope.open();
            }
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let envelope = match deadline {
                Some(deadline) => self.inbox.recv_deadline(deadline).map_err(|e| match e {
                    RecvTimeoutError::Timeout => TipError::Timeout {
                        rank: self.rank,
                        secs: timeout.map_or(0, |t| t.as_secs()),
                    },
                    RecvTimeoutError::Disconnected => self.disconnected(),
                })?,
                None => self.inbox.recv().map_err(|_| self.disconnected())?,
            };

            if wanted(&envelope) {
                return envelope.open();
            }
            self.pending.push_back(envelope);
        }
    }

    fn disconnected(&self) -> TipError {
        TipError::protocol(format!(
            "every peer of rank {} has exited while it waited for a message",
            self.rank
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use std::thread;

    #[test]
    fn test_routes_only_link_coordinator_and_workers() {
        let pool = create_pool(3);
        assert!(pool[1].send(2, Message::Abort, false).is_err());
        assert!(pool[1].send(1, Message::Abort, false).is_err());
        assert!(pool[0].send(0, Message::Abort, false).is_err());
        assert!(pool[1].broadcast(&Message::Abort, false).is_err());
        assert!(pool[0].send(2, Message::Abort, false).is_ok());
    }

    #[test]
    fn test_plain_and_encoded_delivery() {
        let mut pool = create_pool(2);
        let mut worker = pool.pop().unwrap();
        let coordinator = pool.pop().unwrap();

        let start = Message::Start {
            phase: Phase::AlignSearch,
            total: 7,
        };
        coordinator.send(1, start.clone(), false).unwrap();
        coordinator.send(1, Message::Abort, true).unwrap();

        assert_eq!(worker.receive(None, None).unwrap(), (start, 0));
        assert_eq!(worker.receive(Some(0), None).unwrap(), (Message::Abort, 0));
    }

    #[test]
    fn test_filtered_receive_keeps_other_sources_in_order() {
        let mut pool = create_pool(3);
        let w2 = pool.pop().unwrap();
        let w1 = pool.pop().unwrap();
        let mut coordinator = pool.pop().unwrap();

        w2.send(0, Message::Ack(Phase::AlignSearch), false).unwrap();
        w2.send(0, Message::Ack(Phase::BuildIndex), false).unwrap();
        w1.send(0, Message::Ack(Phase::FilterUnique), false).unwrap();

        let (msg, src) = coordinator.receive(Some(1), None).unwrap();
        assert_eq!((msg, src), (Message::Ack(Phase::FilterUnique), 1));
        let (msg, _) = coordinator.receive(None, None).unwrap();
        assert_eq!(msg, Message::Ack(Phase::AlignSearch));
        let (msg, _) = coordinator.receive(Some(2), None).unwrap();
        assert_eq!(msg, Message::Ack(Phase::BuildIndex));
    }

    #[test]
    fn test_timeout() {
        let mut pool = create_pool(2);
        let _worker = pool.pop().unwrap();
        let mut coordinator = pool.pop().unwrap();

        let err = coordinator
            .receive(None, Some(Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(err, TipError::Timeout { rank: 0, .. }));
    }

    #[test]
    fn test_exited_peers_are_detected() {
        let mut pool = create_pool(3);
        let w2 = pool.pop().unwrap();
        let w1 = pool.pop().unwrap();
        let mut coordinator = pool.pop().unwrap();

        let handles: Vec<_> = [w1, w2]
            .into_iter()
            .map(|w| thread::spawn(move || drop(w)))
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let err = coordinator.receive(None, None).unwrap_err();
        assert_eq!(err.kind(), tip_common::ErrorKind::Protocol);
        assert!(coordinator.send(1, Message::Abort, false).is_err());
    }
}
