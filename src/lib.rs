//! # Weft
//!
//! Weft builds annotated parallel-text training corpora: it downloads and
//! validates bitext, fans dependency parsing and word alignment out over a
//! bounded worker pool with checkpointed resume, reassembles per-batch
//! shards into canonical artifact streams, reconciles the streams when
//! sentences have to be dropped, and merges dependency trees with
//! semantic-role frames into the final corpus.
//!
//! The crate can be used as a command line tool (one subcommand per
//! pipeline stage) or as a library.
pub mod annotate;
pub mod batching;
pub mod cli;
pub mod config;
pub mod conllu;
pub mod download;
pub mod error;
pub mod pipelines;
