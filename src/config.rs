//! Runtime configuration (`config/config.json`).
//!
//! A configuration declares named pipelines, the parallel-corpus sources
//! they draw from, and the shared processing parameters. Unknown pipelines
//! or sources are [Error::Config] and abort before any work starts.
use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use oxilangtag::LanguageTag;
use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pipelines: HashMap<String, PipelineConfig>,
    pub sources: HashMap<String, SourceConfig>,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Name of the source definition this pipeline reads from.
    pub source: String,
    /// Per-dataset sentence caps. 0 (or absent) keeps every sentence.
    #[serde(default)]
    pub sentences: HashMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub src_lang: String,
    pub tgt_lang: String,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub format: DatasetFormat,
    #[serde(default)]
    pub url: Option<String>,
}

/// On-disk layout of a raw parallel dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    /// Two aligned files, one sentence per line, suffixed by language code.
    Moses,
    /// Single tab-separated file with four columns (id, text, id, text).
    Tatoeba,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Worker pool size. 1 processes batches sequentially on the calling thread.
    pub processes: usize,
    pub batch_size: usize,
    /// When true, each batch commits its own shard files and a run can be
    /// resumed; merge-parse / merge-align assemble the canonical artifacts.
    pub batch_save: bool,
    pub gpu: bool,
    /// Number of accelerator devices available on this host.
    pub devices: usize,
    /// Cap on processed sentences. 0 means no limit.
    pub limit: usize,
    pub min_tokens: usize,
    pub max_tokens: usize,
    /// Languages exempt from token-count validation (no whitespace tokens).
    pub excluded_tokens_validation: Vec<String>,
    pub drop_policy: DropPolicy,
    pub combine_policy: CombinePolicy,
    /// Abort a tree-merge run on the first alignment mismatch instead of
    /// skipping the offending pair.
    pub strict_merge: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            processes: 1,
            batch_size: 10_000,
            batch_save: true,
            gpu: false,
            devices: 0,
            limit: 0,
            min_tokens: 2,
            max_tokens: 100,
            excluded_tokens_validation: Vec::new(),
            drop_policy: DropPolicy::NotExactlyOne,
            combine_policy: CombinePolicy::Union,
            strict_merge: true,
        }
    }
}

/// Which sentence positions a language's parsed stream marks for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Only positions that produced more than one tree.
    SplitOnly,
    /// Positions that produced anything other than exactly one tree.
    NotExactlyOne,
}

/// How the per-language drop sets combine into the pipeline-wide one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinePolicy {
    Union,
    Intersection,
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| {
            Error::Config(format!("cannot open configuration {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        for (name, pipeline) in &self.pipelines {
            if !self.sources.contains_key(&pipeline.source) {
                return Err(Error::Config(format!(
                    "pipeline {} references unknown source {}",
                    name, pipeline.source
                )));
            }
        }
        for source in self.sources.values() {
            LanguageTag::parse(source.src_lang.clone())?;
            LanguageTag::parse(source.tgt_lang.clone())?;
        }
        if self.params.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".to_string()));
        }
        if self.params.processes == 0 {
            return Err(Error::Config("processes must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn pipeline(&self, name: &str) -> Result<&PipelineConfig, Error> {
        self.pipelines
            .get(name)
            .ok_or_else(|| Error::Config(format!("pipeline not available: {}", name)))
    }

    /// Source definition backing `pipeline`.
    pub fn source_for(&self, pipeline: &str) -> Result<&SourceConfig, Error> {
        let pipeline = self.pipeline(pipeline)?;
        self.sources
            .get(&pipeline.source)
            .ok_or_else(|| Error::Config(format!("source not available: {}", pipeline.source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        serde_json::from_str(
            r#"{
                "pipelines": { "en-de-200k": { "source": "en-de", "sentences": { "europarl": 200000 } } },
                "sources": {
                    "en-de": {
                        "src_lang": "en",
                        "tgt_lang": "de",
                        "datasets": [ { "name": "europarl", "format": "moses" } ]
                    }
                },
                "params": { "processes": 2, "batch_size": 100 }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn lookup() {
        let config = sample();
        assert!(config.pipeline("en-de-200k").is_ok());
        assert!(matches!(config.pipeline("nope"), Err(Error::Config(_))));
        assert_eq!(config.source_for("en-de-200k").unwrap().tgt_lang, "de");
    }

    #[test]
    fn defaults_fill_missing_params() {
        let config = sample();
        assert_eq!(config.params.min_tokens, 2);
        assert_eq!(config.params.drop_policy, DropPolicy::NotExactlyOne);
        assert_eq!(config.params.combine_policy, CombinePolicy::Union);
        assert!(config.params.strict_merge);
    }

    #[test]
    fn unknown_source_is_config_error() {
        let broken = r#"{
            "pipelines": { "p": { "source": "missing" } },
            "sources": {}
        }"#;
        let config: Config = serde_json::from_str(broken).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
