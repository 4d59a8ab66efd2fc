/*! Merging dependency trees with semantic-role frames.

Reads a dependency `.conllu` stream and a frames-only `.conllup` stream in
lockstep and produces one tree per sentence under the declared merged
schema: structural columns from the dependency tree, metadata from the
dependency tree, frames from the semantic tree.

The two trees of a pair must cover the same token ids in the same order.
Truncating to the shorter tree would misalign every downstream argument
span, so a mismatch is fatal for the pair; in strict mode (the default)
it aborts the whole run and no output file is produced.
!*/
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::conllu::column::{conllu_columns, merged_columns, srl_columns};
use crate::conllu::reader::{TreeReader, ZipTrees};
use crate::conllu::tree::Tree;
use crate::error::Error;
use crate::pipelines::pipeline::Pipeline;

const STRUCTURAL_ATTRIBUTES: [&str; 9] = [
    "FORM", "LEMMA", "UPOS", "XPOS", "FEATS", "HEAD", "DEPREL", "DEPS", "MISC",
];

/// Merge one token-aligned pair into a tree under the merged schema.
pub fn merge_trees(structural: &Tree, frames: &Tree, sentence: usize) -> Result<Tree, Error> {
    let left = structural.token_ids();
    let right = frames.token_ids();
    if left != right {
        return Err(Error::AlignmentMismatch {
            sentence,
            detail: format!(
                "token ids differ: {} structural vs {} semantic tokens",
                left.len(),
                right.len()
            ),
        });
    }

    let mut tree = Tree::new(merged_columns());
    for (key, value) in structural.metadata_entries() {
        tree.add_metadata(key, value);
    }
    for token in structural.tokens() {
        let merged = tree.add_token(token.id())?;
        for name in STRUCTURAL_ATTRIBUTES {
            if let Some(value) = token.attribute(name) {
                merged.set_attribute(name, value);
            }
        }
    }
    for frame in frames.frames() {
        tree.add_frame(frame.clone());
    }
    Ok(tree)
}

pub struct TreeMergeStage {
    input_parsed: PathBuf,
    input_srl: PathBuf,
    output: PathBuf,
    strict: bool,
}

impl TreeMergeStage {
    pub fn new(input_parsed: &Path, input_srl: &Path, output: &Path, strict: bool) -> Self {
        Self {
            input_parsed: input_parsed.to_path_buf(),
            input_srl: input_srl.to_path_buf(),
            output: output.to_path_buf(),
            strict,
        }
    }
}

impl Pipeline<usize> for TreeMergeStage {
    /// Returns the number of merged sentences.
    fn run(&self) -> Result<usize, Error> {
        let structural = File::open(&self.input_parsed).map_err(|e| {
            Error::Config(format!(
                "cannot open {}: {}",
                self.input_parsed.display(),
                e
            ))
        })?;
        let semantic = File::open(&self.input_srl).map_err(|e| {
            Error::Config(format!("cannot open {}: {}", self.input_srl.display(), e))
        })?;

        let pairs = ZipTrees::new(
            TreeReader::new(BufReader::new(structural), conllu_columns()),
            TreeReader::new(BufReader::new(semantic), srl_columns()),
        );

        if let Some(parent) = self.output.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.output.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);

        let result = (|| -> Result<usize, Error> {
            let mut out = BufWriter::new(File::create(&tmp)?);
            let mut written = 0;
            for (sentence, pair) in pairs.enumerate() {
                let (structural, semantic) = pair?;
                match merge_trees(&structural, &semantic, sentence + 1) {
                    Ok(tree) => {
                        written += 1;
                        out.write_all(tree.to_conllup(written == 1).as_bytes())?;
                        out.write_all(b"\n\n")?;
                    }
                    Err(e @ Error::AlignmentMismatch { .. }) => {
                        if self.strict {
                            return Err(e);
                        }
                        error!("{:?}, skipping pair", e);
                    }
                    Err(e) => return Err(e),
                }
            }
            out.flush()?;
            Ok(written)
        })();

        match result {
            Ok(written) => {
                fs::rename(&tmp, &self.output)?;
                info!(
                    "merged {} sentences into {}",
                    written,
                    self.output.display()
                );
                Ok(written)
            }
            Err(e) => {
                // no partial output under the final name
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conllu::frame::{Argument, Frame, Predicate};

    fn structural(token_count: usize) -> Tree {
        let mut tree = Tree::new(conllu_columns());
        tree.add_metadata("sent_id", "1");
        tree.add_metadata("text", "w1 w2 w3 w4");
        for id in 1..=token_count {
            tree.add_token(id)
                .unwrap()
                .set_attribute("FORM", &format!("w{}", id))
                .set_attribute("LEMMA", &format!("w{}", id))
                .set_attribute("UPOS", "X")
                .set_attribute("HEAD", if id == 1 { "0" } else { "1" })
                .set_attribute("DEPREL", if id == 1 { "root" } else { "dep" });
        }
        tree
    }

    fn semantic(token_count: usize) -> Tree {
        let mut tree = Tree::new(srl_columns());
        for id in 1..=token_count {
            tree.add_token(id).unwrap();
        }
        let mut frame = Frame::new(Predicate {
            token: 2,
            sense: "do.01".to_string(),
        });
        frame.add_argument(Argument {
            label: "A1".to_string(),
            head: 4,
            span: None,
        });
        tree.add_frame(frame);
        tree
    }

    #[test]
    fn merges_aligned_pair() {
        let merged = merge_trees(&structural(4), &semantic(4), 1).unwrap();

        assert_eq!(merged.token_ids(), vec![1, 2, 3, 4]);
        assert_eq!(merged.metadata("sent_id"), Some("1"));
        assert_eq!(merged.tokens()[1].attribute("FORM"), Some("w2"));
        assert_eq!(merged.frames().len(), 1);
        assert_eq!(merged.frames()[0].predicate.token, 2);
        assert_eq!(merged.frames()[0].arguments[0].label, "A1");
        assert_eq!(merged.frames()[0].arguments[0].head, 4);
        assert_eq!(merged.columns().len(), 13);
    }

    #[test]
    fn mismatched_token_sets_fail() {
        let result = merge_trees(&structural(4), &semantic(3), 7);
        assert!(matches!(
            result,
            Err(Error::AlignmentMismatch { sentence: 7, .. })
        ));
    }
}
