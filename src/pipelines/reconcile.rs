/*! Cross-stream consistency reconciliation.

Parsing can split one input sentence into several trees (or none),
breaking the positional correspondence between the affected language's
artifacts and every other stream. This stage restores the invariant:

1. scan each language's parsed stream and count the trees derived from
   every sentence position,
2. build per-language drop sets under the configured [DropPolicy] and
   combine them under the configured [CombinePolicy],
3. remove the dropped positions from every artifact stream of the
   pipeline and renumber the survivors contiguously from 1, identically
   in every stream.

Outputs are a fresh generation (`_`-prefixed files next to the
originals); nothing is mutated in place, so a run can be inspected and
safely repeated.
!*/
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{error, info, warn};
use rayon::prelude::*;

use crate::batching::checkpoint::{write_atomic, ArtifactKind, CheckpointStore, Stage};
use crate::config::{CombinePolicy, Config, DropPolicy};
use crate::conllu::reader::Blocks;
use crate::error::Error;
use crate::pipelines::pipeline::Pipeline;

pub struct ReconcileStage {
    data: PathBuf,
    pipeline: String,
    src_lang: String,
    tgt_lang: String,
    drop_policy: DropPolicy,
    combine_policy: CombinePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Positions removed from every stream.
    pub dropped: BTreeSet<usize>,
    /// Stream length before reconciliation.
    pub stream_length: usize,
    /// Stream length after reconciliation.
    pub kept: usize,
}

/// Sentence id carried in a block's leading metadata lines, if any.
fn block_sent_id(block: &[String]) -> Option<usize> {
    for line in block {
        if !line.starts_with('#') {
            break;
        }
        if let Some((key, value)) = line[1..].trim().split_once(" = ") {
            if key == "sent_id" {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

/// Count the trees derived from each sentence position. A block carrying
/// `# sent_id = N` opens position N; a block without one is an extra tree
/// split off the current position.
pub fn derived_tree_counts(path: &Path) -> Result<BTreeMap<usize, usize>, Error> {
    let file = File::open(path)
        .map_err(|e| Error::Shard(format!("cannot read parsed stream {}: {}", path.display(), e)))?;

    let mut counts = BTreeMap::new();
    let mut current = None;
    for block in Blocks::new(BufReader::new(file)) {
        let block = block?;
        match block_sent_id(&block) {
            Some(id) => {
                *counts.entry(id).or_insert(0) += 1;
                current = Some(id);
            }
            None => match current {
                Some(id) => *counts.entry(id).or_insert(0) += 1,
                None => warn!(
                    "tree block before any sent_id in {}, ignoring",
                    path.display()
                ),
            },
        }
    }
    Ok(counts)
}

/// Positions a language marks for removal under `policy`.
pub fn drop_set(
    counts: &BTreeMap<usize, usize>,
    stream_length: usize,
    policy: DropPolicy,
) -> BTreeSet<usize> {
    (1..=stream_length)
        .filter(|position| {
            let count = counts.get(position).copied().unwrap_or(0);
            match policy {
                DropPolicy::SplitOnly => count > 1,
                DropPolicy::NotExactlyOne => count != 1,
            }
        })
        .collect()
}

pub fn combine(
    src: &BTreeSet<usize>,
    tgt: &BTreeSet<usize>,
    policy: CombinePolicy,
) -> BTreeSet<usize> {
    match policy {
        CombinePolicy::Union => src.union(tgt).copied().collect(),
        CombinePolicy::Intersection => src.intersection(tgt).copied().collect(),
    }
}

/// Filter a line-oriented stream. Line `i` (1-based) is dropped when `i`
/// is in the drop set; the survivors' positions are implicit, so removal
/// alone renumbers them.
fn filter_lines(
    input: &Path,
    output: &Path,
    drops: &BTreeSet<usize>,
    expected: usize,
) -> Result<usize, Error> {
    let contents = std::fs::read_to_string(input)
        .map_err(|e| Error::Shard(format!("cannot read stream {}: {}", input.display(), e)))?;
    let lines: Vec<&str> = contents.split('\n').collect();
    if lines.len() != expected {
        return Err(Error::Shard(format!(
            "stream {} has {} entries, expected {}",
            input.display(),
            lines.len(),
            expected
        )));
    }
    let kept: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| !drops.contains(&(i + 1)))
        .map(|(_, line)| *line)
        .collect();
    write_atomic(output, &kept.join("\n"))?;
    Ok(kept.len())
}

/// Filter a block-oriented stream and renumber surviving positions.
///
/// With `keyed`, blocks belong to the position named by their `sent_id`
/// (unnumbered blocks continue the current position); otherwise the k-th
/// block is position k and the count must match the stream length. The
/// n-th surviving position gets `# sent_id = n` rewritten in its first
/// block.
fn filter_blocks(
    input: &Path,
    output: &Path,
    drops: &BTreeSet<usize>,
    expected: usize,
    keyed: bool,
) -> Result<usize, Error> {
    let file = File::open(input)
        .map_err(|e| Error::Shard(format!("cannot read stream {}: {}", input.display(), e)))?;

    let mut grouped: Vec<(usize, Vec<String>)> = Vec::new();
    let mut current = None;
    for block in Blocks::new(BufReader::new(file)) {
        let block = block?;
        let origin = if keyed {
            match block_sent_id(&block).or(current) {
                Some(id) => id,
                None => {
                    return Err(Error::Shard(format!(
                        "tree block before any sent_id in {}",
                        input.display()
                    )))
                }
            }
        } else {
            grouped.len() + 1
        };
        if origin > expected {
            return Err(Error::Shard(format!(
                "stream {} references position {} beyond stream length {}",
                input.display(),
                origin,
                expected
            )));
        }
        current = Some(origin);
        grouped.push((origin, block));
    }
    if !keyed && grouped.len() != expected {
        return Err(Error::Shard(format!(
            "stream {} has {} entries, expected {}",
            input.display(),
            grouped.len(),
            expected
        )));
    }

    let mut out = String::new();
    let mut new_id = 0;
    let mut last_origin = None;
    let mut kept = 0;
    for (origin, mut block) in grouped {
        if drops.contains(&origin) {
            continue;
        }
        let first_of_group = last_origin != Some(origin);
        last_origin = Some(origin);
        if first_of_group {
            new_id += 1;
            kept += 1;
            for line in block.iter_mut() {
                if !line.starts_with('#') {
                    break;
                }
                if line[1..].trim().starts_with("sent_id ") || line[1..].trim().starts_with("sent_id=")
                {
                    *line = format!("# sent_id = {}", new_id);
                    break;
                }
            }
        }
        out.push_str(&block.join("\n"));
        out.push_str("\n\n");
    }
    write_atomic(output, &out)?;
    Ok(kept)
}

enum Job {
    Lines { input: PathBuf, output: PathBuf },
    Blocks {
        input: PathBuf,
        output: PathBuf,
        keyed: bool,
    },
}

impl ReconcileStage {
    pub fn new(data: &Path, pipeline: &str, config: &Config) -> Result<Self, Error> {
        let source = config.source_for(pipeline)?;
        Ok(Self {
            data: data.to_path_buf(),
            pipeline: pipeline.to_string(),
            src_lang: source.src_lang.clone(),
            tgt_lang: source.tgt_lang.clone(),
            drop_policy: config.params.drop_policy,
            combine_policy: config.params.combine_policy,
        })
    }

    fn parse_store(&self, lang: &str) -> CheckpointStore {
        CheckpointStore::new(&self.data, &self.pipeline, lang, Stage::Parse)
    }

    fn align_store(&self) -> CheckpointStore {
        let label = format!("{}-{}", self.src_lang, self.tgt_lang);
        CheckpointStore::new(&self.data, &self.pipeline, &label, Stage::Align)
    }

    fn srl_store(&self, lang: &str) -> CheckpointStore {
        // SRL artifacts share the parse stage's per-language labeling
        CheckpointStore::new(&self.data, &self.pipeline, lang, Stage::Parse)
    }

    fn stream_length(&self, lang: &str) -> Result<usize, Error> {
        let path = self
            .parse_store(lang)
            .canonical_path(ArtifactKind::Tokenized);
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            Error::Shard(format!(
                "cannot read tokenized stream {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(contents.split('\n').count())
    }
}

impl Pipeline<ReconcileReport> for ReconcileStage {
    fn run(&self) -> Result<ReconcileReport, Error> {
        let n = self.stream_length(&self.src_lang)?;
        let n_tgt = self.stream_length(&self.tgt_lang)?;
        if n != n_tgt {
            return Err(Error::Shard(format!(
                "tokenized streams differ in length: {} ({}) vs {} ({})",
                n, self.src_lang, n_tgt, self.tgt_lang
            )));
        }

        let mut drops_by_lang = Vec::new();
        for lang in [&self.src_lang, &self.tgt_lang] {
            let parsed = self.parse_store(lang).canonical_path(ArtifactKind::Parsed);
            let counts = derived_tree_counts(&parsed)?;
            if let Some((max, _)) = counts.iter().next_back() {
                if *max > n {
                    return Err(Error::Shard(format!(
                        "parsed stream {} references position {} beyond stream length {}",
                        parsed.display(),
                        max,
                        n
                    )));
                }
            }
            let drops = drop_set(&counts, n, self.drop_policy);
            info!(
                "[{}/{}] {} positions marked for removal",
                self.pipeline,
                lang,
                drops.len()
            );
            drops_by_lang.push(drops);
        }
        let dropped = combine(&drops_by_lang[0], &drops_by_lang[1], self.combine_policy);
        info!(
            "[{}] dropping {}/{} positions: {}{}",
            self.pipeline,
            dropped.len(),
            n,
            dropped.iter().take(20).format(", "),
            if dropped.len() > 20 { ", ..." } else { "" }
        );

        let mut jobs = Vec::new();
        for lang in [&self.src_lang, &self.tgt_lang] {
            let store = self.parse_store(lang);
            jobs.push(Job::Blocks {
                input: store.canonical_path(ArtifactKind::Parsed),
                output: store.reconciled_path(ArtifactKind::Parsed),
                keyed: true,
            });
            jobs.push(Job::Lines {
                input: store.canonical_path(ArtifactKind::Tokenized),
                output: store.reconciled_path(ArtifactKind::Tokenized),
            });

            let srl = self.srl_store(lang).canonical_path(ArtifactKind::Srl);
            if srl.is_file() {
                jobs.push(Job::Blocks {
                    input: srl,
                    output: self.srl_store(lang).reconciled_path(ArtifactKind::Srl),
                    keyed: false,
                });
            }
        }
        let aligned = self.align_store().canonical_path(ArtifactKind::Aligned);
        if aligned.is_file() {
            jobs.push(Job::Lines {
                input: aligned,
                output: self.align_store().reconciled_path(ArtifactKind::Aligned),
            });
        } else {
            warn!(
                "[{}] no alignment artifact at {}, skipping",
                self.pipeline,
                aligned.display()
            );
        }

        let errors: Vec<Error> = jobs
            .into_par_iter()
            .filter_map(|job| {
                let result = match job {
                    Job::Lines { input, output } => {
                        filter_lines(&input, &output, &dropped, n).map(|_| ())
                    }
                    Job::Blocks {
                        input,
                        output,
                        keyed,
                    } => filter_blocks(&input, &output, &dropped, n, keyed).map(|_| ()),
                };
                result.err()
            })
            .collect();

        if !errors.is_empty() {
            for e in &errors {
                error!("{:?}", e);
            }
            return Err(Error::Shard(
                "errors occurred during reconciliation: see previous messages".to_string(),
            ));
        }

        Ok(ReconcileReport {
            kept: n - dropped.len(),
            stream_length: n,
            dropped,
        })
    }
}
