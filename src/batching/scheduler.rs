/*! Bounded worker-pool batch dispatch.

Workers pull batches from a shared queue, so dispatch order is index order
but completion order under a multi-worker pool is not. Positional consumers
must sort by batch index before use; [Scheduler::run_buffered] does that
sort itself, checkpointed runs get it from the shard merger.

Each worker owns at most one lazily constructed model handle for its whole
lifetime: the factory runs once per slot, on the first batch that slot
actually processes, and never again. Handles are never shared between
workers.
!*/
use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use log::{error, info};

use crate::batching::batch::Batch;
use crate::batching::checkpoint::{CheckpointStore, Shardable};
use crate::error::Error;

/// One batch's output, tagged with the batch index for reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult<T> {
    pub index: usize,
    pub data: T,
}

/// A stateful batch processor. One instance lives on one worker slot.
pub trait Worker {
    type Item;
    type Output;

    fn process(&mut self, batch: &Batch<Self::Item>) -> Result<Self::Output, Error>;
}

pub struct Scheduler {
    pool_size: usize,
}

impl Scheduler {
    pub fn new(pool_size: usize) -> Result<Self, Error> {
        if pool_size == 0 {
            return Err(Error::Config("worker pool size must be at least 1".to_string()));
        }
        Ok(Self { pool_size })
    }

    /// Process every batch and return all outputs sorted by batch index.
    pub fn run_buffered<W, F>(
        &self,
        batches: Vec<Batch<W::Item>>,
        init: F,
    ) -> Result<Vec<BatchResult<W::Output>>, Error>
    where
        W: Worker,
        W::Item: Send,
        W::Output: Send,
        F: Fn(usize) -> Result<W, Error> + Sync,
    {
        let skip = |_: usize| false;
        let commit = |_: usize, _: &W::Output| -> Result<(), Error> { Ok(()) };
        let mut results = self.dispatch::<W, _, _, _>(batches, &init, &skip, &commit, true)?;
        results.sort_by_key(|result| result.index);
        Ok(results)
    }

    /// Process only the batches the store does not already hold, committing
    /// each one's shard files as it completes. Outputs are not retained;
    /// memory stays bounded regardless of corpus size.
    pub fn run_checkpointed<W, F>(
        &self,
        batches: Vec<Batch<W::Item>>,
        init: F,
        store: &CheckpointStore,
    ) -> Result<(), Error>
    where
        W: Worker,
        W::Item: Send,
        W::Output: Shardable + Send,
        F: Fn(usize) -> Result<W, Error> + Sync,
    {
        let skip = |index: usize| store.is_complete(index);
        let commit =
            |index: usize, output: &W::Output| store.commit(index, &output.artifacts());
        self.dispatch::<W, _, _, _>(batches, &init, &skip, &commit, false)?;
        Ok(())
    }

    fn dispatch<W, F, S, C>(
        &self,
        batches: Vec<Batch<W::Item>>,
        init: &F,
        skip: &S,
        commit: &C,
        keep: bool,
    ) -> Result<Vec<BatchResult<W::Output>>, Error>
    where
        W: Worker,
        W::Item: Send,
        W::Output: Send,
        F: Fn(usize) -> Result<W, Error> + Sync,
        S: Fn(usize) -> bool + Sync,
        C: Fn(usize, &W::Output) -> Result<(), Error> + Sync,
    {
        let queue = Mutex::new(VecDeque::from(batches));

        if self.pool_size == 1 {
            return worker_loop::<W, _, _, _>(0, &queue, init, skip, commit, keep);
        }

        thread::scope(|scope| {
            let queue = &queue;
            let mut handles = Vec::with_capacity(self.pool_size);
            for slot in 0..self.pool_size {
                handles
                    .push(scope.spawn(move || worker_loop::<W, _, _, _>(slot, queue, init, skip, commit, keep)));
            }

            let mut results = Vec::new();
            let mut first_error = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(mut slot_results)) => results.append(&mut slot_results),
                    Ok(Err(e)) => {
                        error!("worker failed: {:?}", e);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                    Err(_) => {
                        if first_error.is_none() {
                            first_error =
                                Some(Error::Custom("worker thread panicked".to_string()));
                        }
                    }
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(results),
            }
        })
    }
}

fn worker_loop<W, F, S, C>(
    slot: usize,
    queue: &Mutex<VecDeque<Batch<W::Item>>>,
    init: &F,
    skip: &S,
    commit: &C,
    keep: bool,
) -> Result<Vec<BatchResult<W::Output>>, Error>
where
    W: Worker,
    F: Fn(usize) -> Result<W, Error>,
    S: Fn(usize) -> bool,
    C: Fn(usize, &W::Output) -> Result<(), Error>,
{
    let mut worker: Option<W> = None;
    let mut results = Vec::new();
    loop {
        let batch = { queue.lock().unwrap().pop_front() };
        let Some(batch) = batch else { break };

        if skip(batch.index) {
            info!("skipping batch {} (already complete)", batch.index);
            continue;
        }

        if worker.is_none() {
            worker = Some(init(slot)?);
        }
        let active = worker.as_mut().unwrap();

        let started = Instant::now();
        let output = active.process(&batch)?;
        commit(batch.index, &output)?;
        info!(
            "batch {} done on slot {} in {:?}",
            batch.index,
            slot,
            started.elapsed()
        );

        if keep {
            results.push(BatchResult {
                index: batch.index,
                data: output,
            });
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::batching::batch::partition;
    use crate::batching::checkpoint::{ArtifactKind, Stage};
    use tempfile::tempdir;

    struct Doubler;

    impl Worker for Doubler {
        type Item = usize;
        type Output = Vec<usize>;

        fn process(&mut self, batch: &Batch<usize>) -> Result<Vec<usize>, Error> {
            Ok(batch.items.iter().map(|x| x * 2).collect())
        }
    }

    struct LineWorker;

    impl Worker for LineWorker {
        type Item = usize;
        type Output = Lines;

        fn process(&mut self, batch: &Batch<usize>) -> Result<Lines, Error> {
            Ok(Lines(
                batch.items.iter().map(|x| format!("v{}", x)).collect(),
            ))
        }
    }

    struct Lines(Vec<String>);

    impl Shardable for Lines {
        fn artifacts(&self) -> Vec<(ArtifactKind, String)> {
            vec![(ArtifactKind::Aligned, self.0.join("\n"))]
        }
    }

    #[test]
    fn zero_pool_is_config_error() {
        assert!(matches!(Scheduler::new(0), Err(Error::Config(_))));
    }

    #[test]
    fn buffered_results_sorted_by_index() {
        for pool in [1usize, 4] {
            let batches = partition((0..100).collect(), 7).unwrap();
            let scheduler = Scheduler::new(pool).unwrap();
            let results = scheduler
                .run_buffered::<Doubler, _>(batches, |_| Ok(Doubler))
                .unwrap();

            let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
            let expected: Vec<usize> = (1..=15).collect();
            assert_eq!(indices, expected);

            let flat: Vec<usize> = results.into_iter().flat_map(|r| r.data).collect();
            let expected: Vec<usize> = (0..100).map(|x| x * 2).collect();
            assert_eq!(flat, expected);
        }
    }

    #[test]
    fn factory_runs_at_most_once_per_slot() {
        let inits = AtomicUsize::new(0);
        let batches = partition((0..50).collect(), 5).unwrap();
        let scheduler = Scheduler::new(3).unwrap();
        scheduler
            .run_buffered::<Doubler, _>(batches, |_| {
                inits.fetch_add(1, Ordering::SeqCst);
                Ok(Doubler)
            })
            .unwrap();
        let count = inits.load(Ordering::SeqCst);
        assert!(count >= 1 && count <= 3, "got {} inits", count);
    }

    #[test]
    fn checkpointed_run_skips_completed_batches() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "p", "en-de", Stage::Align);

        // batches 2 and 5 are already committed from a previous run
        store
            .commit(2, &[(ArtifactKind::Aligned, "v5\nv6\nv7\nv8\nv9".to_string())])
            .unwrap();
        store
            .commit(
                5,
                &[(ArtifactKind::Aligned, "v20\nv21\nv22\nv23\nv24".to_string())],
            )
            .unwrap();

        let processed = AtomicUsize::new(0);

        struct Counting<'a>(&'a AtomicUsize);
        impl Worker for Counting<'_> {
            type Item = usize;
            type Output = Lines;
            fn process(&mut self, batch: &Batch<usize>) -> Result<Lines, Error> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Lines(
                    batch.items.iter().map(|x| format!("v{}", x)).collect(),
                ))
            }
        }

        let batches = partition((0..30).collect(), 5).unwrap();
        let scheduler = Scheduler::new(2).unwrap();
        scheduler
            .run_checkpointed::<Counting, _>(batches, |_| Ok(Counting(&processed)), &store)
            .unwrap();

        // 6 batches, 2 pre-marked
        assert_eq!(processed.load(Ordering::SeqCst), 4);
        assert_eq!(store.shards(ArtifactKind::Aligned).unwrap().len(), 6);
    }

    #[test]
    fn resumed_run_matches_full_run() {
        let full = tempdir().unwrap();
        let resumed = tempdir().unwrap();
        let full_store = CheckpointStore::new(full.path(), "p", "en-de", Stage::Align);
        let resumed_store = CheckpointStore::new(resumed.path(), "p", "en-de", Stage::Align);

        let scheduler = Scheduler::new(4).unwrap();

        let batches = partition((0..30).collect(), 5).unwrap();
        scheduler
            .run_checkpointed::<LineWorker, _>(batches, |_| Ok(LineWorker), &full_store)
            .unwrap();

        // pre-mark batches 2 and 5, then run the rest
        for index in [2usize, 5] {
            let payload =
                std::fs::read_to_string(full_store.shard_path(ArtifactKind::Aligned, index))
                    .unwrap();
            resumed_store
                .commit(index, &[(ArtifactKind::Aligned, payload)])
                .unwrap();
        }
        let batches = partition((0..30).collect(), 5).unwrap();
        scheduler
            .run_checkpointed::<LineWorker, _>(batches, |_| Ok(LineWorker), &resumed_store)
            .unwrap();

        let full_merged = crate::batching::merger::merge_shards(
            &full_store,
            ArtifactKind::Aligned,
            Some(6),
        )
        .unwrap();
        let resumed_merged = crate::batching::merger::merge_shards(
            &resumed_store,
            ArtifactKind::Aligned,
            Some(6),
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(full_merged).unwrap(),
            std::fs::read_to_string(resumed_merged).unwrap()
        );
    }
}
