//! Packet-mapping pipeline with a bounded worker pool.
//!
//! A packet is a batch of records processed as one unit of work: the whole
//! stage chain runs over a packet on a single worker. With one worker the
//! pipeline is strictly sequential; with more, packets are distributed over
//! a pool fed through bounded channels, so at most a few packets are in
//! flight at once. Order-preserving scheduling buffers completed packets
//! until their turn; relaxed scheduling yields each packet as it completes.

use crossbeam_channel::{bounded, Receiver};
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// One transformation applied to a packet.
pub type Stage<T> = Box<dyn Fn(Vec<T>) -> Vec<T> + Send + Sync>;

/// Runner configuration: pool width and scheduling mode.
#[derive(Debug, Clone)]
pub struct PacketPipeline {
    workers: usize,
    keep_order: bool,
}

impl PacketPipeline {
    /// Create a pipeline with the given worker count, preserving order.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            keep_order: true,
        }
    }

    /// Yield packets as they complete instead of in input order.
    pub fn relaxed_order(mut self) -> Self {
        self.keep_order = false;
        self
    }

    /// Apply the stage chain to every packet.
    pub fn run<T, I>(&self, packets: I, stages: Vec<Stage<T>>) -> PacketStream<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = Vec<T>>,
        I::IntoIter: Send + 'static,
    {
        let packets = packets.into_iter();

        if self.workers == 1 {
            return PacketStream {
                inner: Inner::Sequential {
                    packets: Box::new(packets),
                    stages,
                },
            };
        }

        let stages = Arc::new(stages);
        let capacity = self.workers * 2;
        let (work_tx, work_rx) = bounded::<(u64, Vec<T>)>(capacity);
        let (done_tx, done_rx) = bounded::<(u64, Vec<T>)>(capacity);

        let mut handles = Vec::with_capacity(self.workers + 1);
        handles.push(thread::spawn(move || {
            for (index, packet) in packets.enumerate() {
                if work_tx.send((index as u64, packet)).is_err() {
                    break;
                }
            }
        }));

        for _ in 0..self.workers {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let stages = Arc::clone(&stages);
            handles.push(thread::spawn(move || {
                for (index, mut packet) in work_rx {
                    for stage in stages.iter() {
                        packet = stage(packet);
                    }
                    if done_tx.send((index, packet)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(work_rx);
        drop(done_tx);

        PacketStream {
            inner: Inner::Pooled {
                rx: done_rx,
                pending: BTreeMap::new(),
                next: 0,
                keep_order: self.keep_order,
                handles,
            },
        }
    }
}

enum Inner<T> {
    Sequential {
        packets: Box<dyn Iterator<Item = Vec<T>> + Send>,
        stages: Vec<Stage<T>>,
    },
    Pooled {
        rx: Receiver<(u64, Vec<T>)>,
        pending: BTreeMap<u64, Vec<T>>,
        next: u64,
        keep_order: bool,
        handles: Vec<JoinHandle<()>>,
    },
    Drained,
}

/// Lazily consumable stream of processed packets.
pub struct PacketStream<T> {
    inner: Inner<T>,
}

impl<T> Iterator for PacketStream<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Drained => None,
            Inner::Sequential { packets, stages } => {
                let mut packet = packets.next()?;
                for stage in stages.iter() {
                    packet = stage(packet);
                }
                Some(packet)
            }
            Inner::Pooled {
                rx,
                pending,
                next,
                keep_order,
                ..
            } => {
                if !*keep_order {
                    return rx.recv().ok().map(|(_, packet)| packet);
                }
                loop {
                    if let Some(packet) = pending.remove(next) {
                        *next += 1;
                        return Some(packet);
                    }
                    match rx.recv() {
                        Ok((index, packet)) => {
                            pending.insert(index, packet);
                        }
                        // Pool finished: drain whatever is still buffered.
                        Err(_) => {
                            let (&index, _) = pending.iter().next()?;
                            *next = index + 1;
                            return pending.remove(&index);
                        }
                    }
                }
            }
        }
    }
}

impl<T> Drop for PacketStream<T> {
    fn drop(&mut self) {
        if let Inner::Pooled { rx, handles, .. } = mem::replace(&mut self.inner, Inner::Drained) {
            // Disconnect first so blocked workers see a closed channel.
            drop(rx);
            for handle in handles {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn add_stage(amount: i64) -> Stage<i64> {
        Box::new(move |packet: Vec<i64>| packet.into_iter().map(|v| v + amount).collect())
    }

    fn delay_by_first_stage() -> Stage<i64> {
        Box::new(|packet: Vec<i64>| {
            // Later packets finish sooner, forcing out-of-order completion.
            let delay = 50u64.saturating_sub(packet[0] as u64 * 5);
            thread::sleep(Duration::from_millis(delay));
            packet
        })
    }

    #[test]
    fn test_single_worker_is_sequential_and_ordered() {
        let packets = (0..5).map(|i| vec![i]);
        let pipeline = PacketPipeline::new(1);
        let out: Vec<_> = pipeline
            .run(packets, vec![add_stage(10), add_stage(100)])
            .collect();

        assert_eq!(out, vec![vec![110], vec![111], vec![112], vec![113], vec![114]]);
    }

    #[test]
    fn test_stage_chain_applies_in_order() {
        let double: Stage<i64> =
            Box::new(|packet: Vec<i64>| packet.into_iter().map(|v| v * 2).collect());
        let pipeline = PacketPipeline::new(1);
        let out: Vec<_> = pipeline.run(vec![vec![1, 2]], vec![add_stage(1), double]).collect();

        // (v + 1) * 2, not v * 2 + 1.
        assert_eq!(out, vec![vec![4, 6]]);
    }

    #[test]
    fn test_order_preserved_with_varied_completion_times() {
        let packets: Vec<Vec<i64>> = (0..10).map(|i| vec![i]).collect();
        let pipeline = PacketPipeline::new(4);
        let out: Vec<_> = pipeline
            .run(packets, vec![delay_by_first_stage()])
            .collect();

        let firsts: Vec<i64> = out.iter().map(|p| p[0]).collect();
        assert_eq!(firsts, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_relaxed_order_yields_same_multiset() {
        let packets: Vec<Vec<i64>> = (0..10).map(|i| vec![i]).collect();
        let pipeline = PacketPipeline::new(4).relaxed_order();
        let mut firsts: Vec<i64> = pipeline
            .run(packets, vec![delay_by_first_stage(), add_stage(1)])
            .map(|p| p[0])
            .collect();

        firsts.sort_unstable();
        assert_eq!(firsts, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_early_abandonment_shuts_the_pool_down() {
        let packets: Vec<Vec<i64>> = (0..100).map(|i| vec![i]).collect();
        let pipeline = PacketPipeline::new(4);
        let mut stream = pipeline.run(packets, vec![add_stage(1)]);

        assert!(stream.next().is_some());
        drop(stream);
        // Drop joined the pool; reaching this point means no worker hung.
    }

    #[test]
    fn test_empty_input() {
        let pipeline = PacketPipeline::new(4);
        let out: Vec<Vec<i64>> = pipeline.run(Vec::new(), vec![add_stage(1)]).collect();
        assert!(out.is_empty());
    }
}
