//! Word-alignment model interface.
use log::info;

use crate::batching::device::Device;
use crate::error::Error;

/// The alignment model. Returns 0-based `(target, source)` token index
/// pairs for one sentence pair.
pub trait WordAligner {
    fn align(&self, source: &[&str], target: &[&str]) -> Result<Vec<(usize, usize)>, Error>;
}

/// Deterministic diagonal baseline: token `i` aligns to token `i` up to the
/// shorter side's length.
pub struct BaselineAligner;

impl BaselineAligner {
    pub fn new(device: Device) -> Result<Self, Error> {
        info!("initializing baseline aligner on {}", device);
        Ok(Self)
    }
}

impl WordAligner for BaselineAligner {
    fn align(&self, source: &[&str], target: &[&str]) -> Result<Vec<(usize, usize)>, Error> {
        let n = source.len().min(target.len());
        Ok((0..n).map(|i| (i, i)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_up_to_shorter_side() {
        let aligner = BaselineAligner::new(Device::Cpu).unwrap();
        let pairs = aligner
            .align(&["a", "b", "c"], &["x", "y"])
            .unwrap();
        assert_eq!(pairs, vec![(0, 0), (1, 1)]);
    }
}
