// SPDX-License-Identifier: GPL-2.0-or-later

//! Fans a processed sample stream out to every connected client. Wired as the
//! [`SampleSink`] at the tail of a [`nidas_core::pipeline::SamplePipeline`]
//! the same way an archive writer or sync-record builder would be.
//!
//! Each client gets its own bounded queue; a client that can't keep up
//! has samples dropped for it rather than stalling the other clients or
//! the sorter thread feeding this sink (the sorter's own drop/block
//! choice, applied per connection).

use nidas_core::sample::SampleRef;
use nidas_core::sorter::SampleSink;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

pub struct SampleDistributor {
    clients: Mutex<HashMap<u64, SyncSender<SampleRef>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    dropped: AtomicU64,
}

impl SampleDistributor {
    pub fn new(queue_capacity: usize) -> Self {
        SampleDistributor {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            queue_capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a new client, returning its id (for [`Self::unregister`])
    /// and the receiving end of its sample queue.
    pub fn register(&self) -> (u64, Receiver<SampleRef>) {
        let (tx, rx) = sync_channel(self.queue_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        self.clients.lock().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Total samples dropped across all clients because a client's queue
    /// was full, since construction.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SampleSink for SampleDistributor {
    fn distribute(&self, sample: SampleRef) {
        let clients = self.clients.lock();
        for tx in clients.values() {
            if tx.try_send(SampleRef::clone(&sample)).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nidas_core::sample::{SamplePool, SampleType};
    use nidas_core::time::Time;

    fn sample(pool: &std::sync::Arc<SamplePool>, v: i32) -> SampleRef {
        let mut b = pool.allocate(SampleType::Int32, 1);
        b.set_timetag(Time::from_usecs(0));
        b.write_bytes(0, &v.to_ne_bytes());
        b.set_len(1);
        b.freeze()
    }

    #[test]
    fn registered_client_receives_distributed_samples() {
        let pool = SamplePool::new();
        let dist = SampleDistributor::new(4);
        let (id, rx) = dist.register();
        dist.distribute(sample(&pool, 7));
        assert_eq!(rx.recv().unwrap().as_i32(), vec![7]);
        dist.unregister(id);
        assert_eq!(dist.client_count(), 0);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let pool = SamplePool::new();
        let dist = SampleDistributor::new(1);
        let (_id, rx) = dist.register();
        dist.distribute(sample(&pool, 1));
        dist.distribute(sample(&pool, 2)); // queue full, dropped
        assert_eq!(dist.dropped_count(), 1);
        assert_eq!(rx.recv().unwrap().as_i32(), vec![1]);
    }

    #[test]
    fn multiple_clients_each_get_their_own_copy() {
        let pool = SamplePool::new();
        let dist = SampleDistributor::new(4);
        let (_a, rx_a) = dist.register();
        let (_b, rx_b) = dist.register();
        dist.distribute(sample(&pool, 9));
        assert_eq!(rx_a.recv().unwrap().as_i32(), vec![9]);
        assert_eq!(rx_b.recv().unwrap().as_i32(), vec![9]);
    }
}
