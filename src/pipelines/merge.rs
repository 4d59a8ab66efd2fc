/*! Shard-merge entry points.

Used after a `batch_save` run: assemble the canonical artifacts from the
`tmp/` shards, in ascending batch-index order. The expected batch count is
recomputed from the same stream the producing stage read, so a missing
tail shard cannot pass silently.
!*/
use std::path::{Path, PathBuf};

use log::info;

use crate::batching::checkpoint::{ArtifactKind, CheckpointStore, Stage};
use crate::batching::merger::merge_shards;
use crate::config::{Config, Params};
use crate::error::Error;
use crate::pipelines::parse::load_stream;
use crate::pipelines::pipeline::Pipeline;

fn expected_batches(count: usize, batch_size: usize) -> usize {
    (count + batch_size - 1) / batch_size
}

pub struct MergeParseStage {
    data: PathBuf,
    pipeline: String,
    src_lang: String,
    tgt_lang: String,
    params: Params,
}

impl MergeParseStage {
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

    fn merge_lang(&self, lang: &str) -> Result<(), Error> {
        let sentences = load_stream(&self.data, &self.pipeline, lang, &self.params)?;
        let expected = expected_batches(sentences.len(), self.params.batch_size);
        let store = CheckpointStore::new(&self.data, &self.pipeline, lang, Stage::Parse);
        for kind in [ArtifactKind::Tokenized, ArtifactKind::Parsed] {
            merge_shards(&store, kind, Some(expected))?;
        }
        Ok(())
    }
}

impl Pipeline<()> for MergeParseStage {
    fn run(&self) -> Result<(), Error> {
        info!("[{}] merging parse shards", self.pipeline);
        self.merge_lang(&self.src_lang)?;
        self.merge_lang(&self.tgt_lang)?;
        Ok(())
    }
}

pub struct MergeAlignStage {
    data: PathBuf,
    pipeline: String,
    src_lang: String,
    tgt_lang: String,
    params: Params,
}

impl MergeAlignStage {
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
}

impl Pipeline<()> for MergeAlignStage {
    fn run(&self) -> Result<(), Error> {
        info!("[{}] merging alignment shards", self.pipeline);

        // pair count: length of the tokenized streams the align stage read
        let tokenized = CheckpointStore::new(&self.data, &self.pipeline, &self.src_lang, Stage::Parse)
            .canonical_path(ArtifactKind::Tokenized);
        let contents = std::fs::read_to_string(&tokenized).map_err(|e| {
            Error::Config(format!(
                "cannot read tokenized stream {}: {}",
                tokenized.display(),
                e
            ))
        })?;
        let mut count = contents.split('\n').count();
        if self.params.limit > 0 && count > self.params.limit {
            count = self.params.limit;
        }

        let label = format!("{}-{}", self.src_lang, self.tgt_lang);
        let store = CheckpointStore::new(&self.data, &self.pipeline, &label, Stage::Align);
        merge_shards(
            &store,
            ArtifactKind::Aligned,
            Some(expected_batches(count, self.params.batch_size)),
        )?;
        Ok(())
    }
}
