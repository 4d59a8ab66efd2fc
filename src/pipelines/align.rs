/*! Word alignment of the paired tokenized streams.

Reads both languages' canonical tokenized artifacts, pairs them
positionally and runs the alignment model batch-parallel. One output line
per sentence pair, each line holding space-separated `target-source`
token index pairs.
!*/
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{error, info};

use crate::annotate::aligner::{BaselineAligner, WordAligner};
use crate::batching::batch::{partition, Batch};
use crate::batching::checkpoint::{write_atomic, ArtifactKind, CheckpointStore, Shardable, Stage};
use crate::batching::device::assign_device;
use crate::batching::scheduler::{Scheduler, Worker};
use crate::config::{Config, Params};
use crate::error::Error;
use crate::pipelines::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentencePair {
    pub source: String,
    pub target: String,
}

pub struct AlignStage {
    data: PathBuf,
    pipeline: String,
    src_lang: String,
    tgt_lang: String,
    params: Params,
}

pub struct AlignOutput {
    pub lines: Vec<String>,
}

impl Shardable for AlignOutput {
    fn artifacts(&self) -> Vec<(ArtifactKind, String)> {
        vec![(ArtifactKind::Aligned, self.lines.join("\n"))]
    }
}

pub struct AlignWorker<A> {
    aligner: A,
    pipeline: String,
}

impl<A> AlignWorker<A> {
    pub fn new(aligner: A, pipeline: &str) -> Self {
        Self {
            aligner,
            pipeline: pipeline.to_string(),
        }
    }
}

impl<A: WordAligner> Worker for AlignWorker<A> {
    type Item = SentencePair;
    type Output = AlignOutput;

    fn process(&mut self, batch: &Batch<SentencePair>) -> Result<AlignOutput, Error> {
        let mut lines = Vec::with_capacity(batch.len());
        for (i, pair) in batch.items.iter().enumerate() {
            let position = batch.position(i);
            let source: Vec<&str> = pair.source.split_whitespace().collect();
            let target: Vec<&str> = pair.target.split_whitespace().collect();
            // a failed pair keeps its slot as an empty line
            let line = match self.aligner.align(&source, &target) {
                Ok(pairs) => pairs
                    .iter()
                    .map(|(t, s)| format!("{}-{}", t, s))
                    .join(" "),
                Err(e) => {
                    error!(
                        "[{}] alignment failed for sentence pair {} (batch {}): {:?}",
                        self.pipeline, position, batch.index, e
                    );
                    String::new()
                }
            };
            lines.push(line);
        }
        Ok(AlignOutput { lines })
    }
}

/// Read one canonical tokenized stream. Trailing empty lines are not
/// stripped: position correspondence must stay exact, so an empty line is
/// an empty sentence, not noise.
fn read_stream(path: &Path) -> Result<Vec<String>, Error> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "cannot read tokenized stream {} (run parse / merge-parse first): {}",
            path.display(),
            e
        ))
    })?;
    Ok(contents.split('\n').map(str::to_string).collect())
}

impl AlignStage {
    pub fn new(data: &Path, pipeline: &str, config: &Config) -> Result<Self, Error> {
        let source = config.source_for(pipeline)?;
        Ok(Self {
            data: data.to_path_buf(),
            pipeline: pipeline.to_string(),
            src_lang: source.src_lang.clone(),
            tgt_lang: source.tgt_lang.clone(),
            params: config.params.clone(),
        })
    }

    pub fn pair_label(&self) -> String {
        format!("{}-{}", self.src_lang, self.tgt_lang)
    }

    pub fn store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.data, &self.pipeline, &self.pair_label(), Stage::Align)
    }

    pub fn load_pairs(&self) -> Result<Vec<SentencePair>, Error> {
        let tokenized = |lang: &str| {
            CheckpointStore::new(&self.data, &self.pipeline, lang, Stage::Parse)
                .canonical_path(ArtifactKind::Tokenized)
        };
        let source = read_stream(&tokenized(&self.src_lang))?;
        let target = read_stream(&tokenized(&self.tgt_lang))?;
        if source.len() != target.len() {
            return Err(Error::Shard(format!(
                "tokenized streams differ in length: {} ({}) vs {} ({})",
                source.len(),
                self.src_lang,
                target.len(),
                self.tgt_lang
            )));
        }

        let mut pairs: Vec<SentencePair> = source
            .into_iter()
            .zip(target)
            .map(|(source, target)| SentencePair { source, target })
            .collect();
        if self.params.limit > 0 && pairs.len() > self.params.limit {
            pairs.truncate(self.params.limit);
        }
        Ok(pairs)
    }

    pub fn run_with<A, F>(&self, factory: F) -> Result<(), Error>
    where
        A: WordAligner,
        F: Fn(usize) -> Result<A, Error> + Sync,
    {
        let pairs = self.load_pairs()?;
        info!("[{}] aligning {} sentence pairs", self.pipeline, pairs.len());

        let batches = partition(pairs, self.params.batch_size)?;
        let expected = batches.len();
        let scheduler = Scheduler::new(self.params.processes)?;
        let store = self.store();

        let init = |slot: usize| -> Result<AlignWorker<A>, Error> {
            Ok(AlignWorker::new(factory(slot)?, &self.pipeline))
        };

        if self.params.batch_save {
            scheduler.run_checkpointed::<AlignWorker<A>, _>(batches, init, &store)?;
            info!(
                "[{}] {} batches checkpointed, run merge-align to assemble the canonical artifact",
                self.pipeline, expected
            );
        } else {
            let results = scheduler.run_buffered::<AlignWorker<A>, _>(batches, init)?;
            let lines: Vec<String> = results
                .into_iter()
                .flat_map(|result| result.data.lines)
                .collect();
            write_atomic(
                &store.canonical_path(ArtifactKind::Aligned),
                &lines.join("\n"),
            )?;
            info!("[{}] canonical alignment artifact written", self.pipeline);
        }
        Ok(())
    }
}

impl Pipeline<()> for AlignStage {
    fn run(&self) -> Result<(), Error> {
        assign_device(0, self.params.gpu, self.params.devices)?;

        let gpu = self.params.gpu;
        let devices = self.params.devices;
        self.run_with(|slot| {
            let device = assign_device(slot, gpu, devices)?;
            BaselineAligner::new(device)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::device::Device;

    #[test]
    fn worker_renders_target_source_pairs() {
        let aligner = BaselineAligner::new(Device::Cpu).unwrap();
        let mut worker = AlignWorker::new(aligner, "p");
        let batch = Batch {
            index: 1,
            start: 0,
            items: vec![SentencePair {
                source: "a b c".to_string(),
                target: "x y".to_string(),
            }],
        };
        let output = worker.process(&batch).unwrap();
        assert_eq!(output.lines, vec!["0-0 1-1"]);
    }

    #[test]
    fn failing_pair_becomes_empty_line() {
        struct Broken;
        impl WordAligner for Broken {
            fn align(&self, _: &[&str], _: &[&str]) -> Result<Vec<(usize, usize)>, Error> {
                Err(Error::Custom("no model".to_string()))
            }
        }
        let mut worker = AlignWorker::new(Broken, "p");
        let batch = Batch {
            index: 1,
            start: 0,
            items: vec![SentencePair {
                source: "a".to_string(),
                target: "b".to_string(),
            }],
        };
        let output = worker.process(&batch).unwrap();
        assert_eq!(output.lines, vec![""]);
    }
}
