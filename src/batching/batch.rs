//! Stream partitioning.
use crate::error::Error;

/// A contiguous slice of a sentence stream: the unit of parallel dispatch
/// and checkpointing.
///
/// `index` is 1-based and monotonic in stream order. It is the sole sort key
/// for reassembly and the sole key for checkpoint identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    pub index: usize,
    /// 0-based offset of the first item in the stream.
    pub start: usize,
    pub items: Vec<T>,
}

impl<T> Batch<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 1-based stream position of the `i`-th item of this batch.
    pub fn position(&self, i: usize) -> usize {
        self.start + i + 1
    }
}

/// Split `items` into batches of at most `batch_size` items, indexed from 1.
///
/// Batches are contiguous, non-overlapping and cover the stream exactly
/// once; empty input yields no batches.
pub fn partition<T>(items: Vec<T>, batch_size: usize) -> Result<Vec<Batch<T>>, Error> {
    if batch_size == 0 {
        return Err(Error::Config("batch_size must be greater than 0".to_string()));
    }

    let mut batches = Vec::with_capacity((items.len() + batch_size - 1) / batch_size);
    let mut rest = items;
    let mut index = 0;
    let mut start = 0;
    while !rest.is_empty() {
        let tail = rest.split_off(batch_size.min(rest.len()));
        index += 1;
        let len = rest.len();
        batches.push(Batch {
            index,
            start,
            items: rest,
        });
        start += len;
        rest = tail;
    }
    Ok(batches)
}
