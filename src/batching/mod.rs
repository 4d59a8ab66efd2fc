//! Batch-parallel job orchestration.
//!
//! Every model-bound stage goes through the same machinery: the stream is
//! [partitioned](batch::partition) into indexed batches, a bounded
//! [Scheduler](scheduler::Scheduler) dispatches them over a worker pool,
//! each completed batch is either buffered or committed as shard files
//! through the [CheckpointStore](checkpoint::CheckpointStore), and the
//! [merger] reassembles shards into one canonical artifact per stream.
pub mod batch;
pub mod checkpoint;
pub mod device;
pub mod merger;
pub mod scheduler;

pub use batch::{partition, Batch};
pub use checkpoint::{ArtifactKind, CheckpointStore, Shardable, Stage};
pub use device::{assign_device, Device};
pub use merger::merge_shards;
pub use scheduler::{BatchResult, Scheduler, Worker};
