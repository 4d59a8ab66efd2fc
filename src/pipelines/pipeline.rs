//! Pipeline trait.
use crate::error::Error;

/// Implemented by every stage; generic over the return type so stages that
/// produce a run report can use the trait as well.
pub trait Pipeline<T> {
    fn run(&self) -> Result<T, Error>;
}
