//! CoNLL-U / CoNLL-U Plus tree model and block-format readers.
//!
//! A tree is an ordered token sequence with a declared column schema, an
//! ordered metadata map and zero or more semantic frames. Files are
//! blank-line-separated blocks of `# key = value` metadata lines followed
//! by one tab-separated row per token.
pub mod column;
pub mod frame;
pub mod reader;
pub mod tree;

pub use column::{conllu_columns, merged_columns, srl_columns, Column, ColumnType};
pub use frame::{Argument, Frame, Predicate};
pub use reader::{parse_tree, Blocks, TreeReader, ZipTrees};
pub use tree::{Token, Tree};
