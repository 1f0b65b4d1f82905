// Per-rank execution context passed to every phase function

use crate::channel::Endpoint;
use crate::message::Message;
use crate::partition::{partition_for_rank, Partition};
use std::time::Duration;
use tip_common::{Rank, Result, COORDINATOR_RANK};

/// Rank identity plus the channel endpoint of one pool member
#[derive(Debug)]
pub struct WorkerContext {
    channel: Endpoint,
    timeout: Option<Duration>,
}

impl WorkerContext {
    pub fn new(channel: Endpoint, timeout: Option<Duration>) -> Self {
        WorkerContext { channel, timeout }
    }

    #[inline]
    pub fn rank(&self) -> Rank {
        self.channel.rank()
    }

    #[inline]
    pub fn pool_size(&self) -> usize {
        self.channel.pool_size()
    }

    pub fn num_workers(&self) -> usize {
        self.pool_size().saturating_sub(1)
    }

    /// This rank's slice of `[0, total)`
    pub fn partition(&self, total: u64) -> Result<Partition> {
        partition_for_rank(total, self.pool_size(), self.rank())
    }

    pub fn send_to_coordinator(&self, message: Message, serialize: bool) -> Result<()> {
        self.channel.send(COORDINATOR_RANK, message, serialize)
    }

    pub fn broadcast(&self, message: &Message) -> Result<()> {
        self.channel.broadcast(message, false)
    }

    /// Receive with this rank's timeout; workers wait on the coordinator alone
    pub fn receive(&mut self, source: Option<Rank>) -> Result<(Message, Rank)> {
        self.channel.receive(source, self.timeout)
    }

    /// Receive with no timeout, used by workers idling between phases
    pub fn receive_blocking(&mut self, source: Option<Rank>) -> Result<(Message, Rank)> {
        self.channel.receive(source, None)
    }
}
