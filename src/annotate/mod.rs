//! Interfaces to the model inference services.
//!
//! The parser and aligner are external collaborators: expensive to
//! construct, called once per sentence (pair). The baselines here are
//! deterministic stand-ins used by tests and smoke runs.
pub mod aligner;
pub mod parser;

pub use aligner::{BaselineAligner, WordAligner};
pub use parser::{BaselineParser, ParsedSentence, ParsedToken, SentenceParser};
