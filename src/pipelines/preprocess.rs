/*! Raw corpus preprocessing.

Reads the configured parallel datasets, validates each sentence pair and
writes the paired `bitext_raw` streams. The two output streams are equal
length and positionally aligned by construction; every later stage relies
on that.
!*/
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::info;

use crate::batching::checkpoint::write_atomic;
use crate::config::{Config, DatasetConfig, DatasetFormat, Params, PipelineConfig, SourceConfig};
use crate::error::Error;
use crate::pipelines::pipeline::Pipeline;

pub struct PreprocessStage {
    data: PathBuf,
    pipeline: String,
    pipeline_config: PipelineConfig,
    source_name: String,
    source: SourceConfig,
    params: Params,
}

struct Validation {
    seen: HashSet<String>,
    skipped: Vec<String>,
    params: Params,
}

/// Collapse whitespace runs into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// A sentence must carry at least one alphabetic character and no control
/// or replacement characters; those break tokenization downstream.
pub fn validate_alpha(text: &str) -> Result<(), &'static str> {
    if text
        .chars()
        .any(|c| c == '\u{FFFD}' || (c.is_control() && c != '\t'))
    {
        return Err("malformed characters");
    }
    if !text.chars().any(|c| c.is_alphabetic()) {
        return Err("no alphabetic content");
    }
    Ok(())
}

pub fn validate_tokens(text: &str, min: usize, max: usize) -> bool {
    let count = text.split(' ').count();
    count >= min && count <= max
}

impl Validation {
    fn new(params: &Params) -> Self {
        Self {
            seen: HashSet::new(),
            skipped: Vec::new(),
            params: params.clone(),
        }
    }

    /// `Err` carries the skip reason. The duplicate map is shared between
    /// both language sides, like every other check.
    fn validate(&mut self, text: &str, lang: &str) -> Result<(), &'static str> {
        validate_alpha(text)?;
        if !self
            .params
            .excluded_tokens_validation
            .iter()
            .any(|l| l == lang)
            && !validate_tokens(text, self.params.min_tokens, self.params.max_tokens)
        {
            return Err("token count out of range");
        }
        if !self.seen.insert(text.to_string()) {
            return Err("duplicate sentence");
        }
        Ok(())
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, Error> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.split('\n').map(str::to_string).collect())
}

/// Moses format: one file per language side, matched by extension.
fn read_moses(folder: &Path, dataset: &str, lang: &str) -> Result<Vec<String>, Error> {
    let pattern = folder.join(dataset).join(format!("*.{}", lang));
    let pattern = pattern
        .to_str()
        .ok_or_else(|| Error::Custom(format!("non-utf8 dataset pattern: {:?}", pattern)))?
        .to_string();
    let files: Vec<PathBuf> = glob::glob(&pattern)?.collect::<Result<_, _>>()?;
    if files.len() != 1 {
        return Err(Error::Config(format!(
            "expected exactly one file for {}, found {}",
            pattern,
            files.len()
        )));
    }
    read_lines(&files[0])
}

/// Tatoeba format: one tab-separated file, four columns, text in columns
/// 2 and 4.
fn read_tatoeba(folder: &Path, dataset: &str) -> Result<(Vec<String>, Vec<String>), Error> {
    let pattern = folder.join(dataset).join("*");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| Error::Custom(format!("non-utf8 dataset pattern: {:?}", pattern)))?
        .to_string();
    let files: Vec<PathBuf> = glob::glob(&pattern)?.collect::<Result<_, _>>()?;
    if files.len() != 1 {
        return Err(Error::Config(format!(
            "expected exactly one file for {}, found {}",
            pattern,
            files.len()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(&files[0])?;

    let mut src = Vec::new();
    let mut tgt = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() == 4 {
            src.push(record[1].to_string());
            tgt.push(record[3].to_string());
        }
    }
    Ok((src, tgt))
}

impl PreprocessStage {
    pub fn new(data: &Path, pipeline: &str, config: &Config) -> Result<Self, Error> {
        let pipeline_config = config.pipeline(pipeline)?.clone();
        let source = config.source_for(pipeline)?.clone();
        Ok(Self {
            data: data.to_path_buf(),
            pipeline: pipeline.to_string(),
            source_name: pipeline_config.source.clone(),
            pipeline_config,
            source,
            params: config.params.clone(),
        })
    }

    fn read_dataset(&self, dataset: &DatasetConfig) -> Result<(Vec<String>, Vec<String>), Error> {
        let folder = self.data.join("source").join(&self.source_name);
        match dataset.format {
            DatasetFormat::Moses => {
                let src = read_moses(&folder, &dataset.name, &self.source.src_lang)?;
                let tgt = read_moses(&folder, &dataset.name, &self.source.tgt_lang)?;
                if src.len() != tgt.len() {
                    return Err(Error::Config(format!(
                        "dataset {} sides differ in length: {} vs {}",
                        dataset.name,
                        src.len(),
                        tgt.len()
                    )));
                }
                Ok((src, tgt))
            }
            DatasetFormat::Tatoeba => read_tatoeba(&folder, &dataset.name),
        }
    }

    fn process_dataset(
        &self,
        dataset: &DatasetConfig,
        validation: &mut Validation,
    ) -> Result<(Vec<String>, Vec<String>), Error> {
        let (raw_src, raw_tgt) = self.read_dataset(dataset)?;

        let mut src = Vec::new();
        let mut tgt = Vec::new();
        for (counter, (s, t)) in raw_src.iter().zip(raw_tgt.iter()).enumerate() {
            let s = normalize_whitespace(s);
            let t = normalize_whitespace(t);
            let src_check = validation.validate(&s, &self.source.src_lang);
            let tgt_check = validation.validate(&t, &self.source.tgt_lang);
            match (src_check, tgt_check) {
                (Ok(()), Ok(())) => {
                    src.push(s);
                    tgt.push(t);
                }
                (src_result, tgt_result) => {
                    validation.skipped.push(format!(
                        "skipping {} sentence {} / SRC: {} / TGT: {} / SRC MSG: {} / TGT MSG: {}",
                        dataset.name,
                        counter + 1,
                        s,
                        t,
                        src_result.err().unwrap_or(""),
                        tgt_result.err().unwrap_or("")
                    ));
                }
            }
        }

        // per-dataset sentence cap. 0 (or absent) keeps everything.
        let cap = self
            .pipeline_config
            .sentences
            .get(&dataset.name)
            .copied()
            .unwrap_or(0);
        if cap > 0 && src.len() > cap {
            src.truncate(cap);
            tgt.truncate(cap);
        }
        info!(
            "[{}] {} kept {} sentence pairs",
            self.pipeline,
            dataset.name,
            src.len()
        );
        Ok((src, tgt))
    }

    fn raw_path(&self, lang: &str) -> PathBuf {
        self.data
            .join(&self.pipeline)
            .join("bitext_raw")
            .join(format!("{}.{}.txt", self.pipeline, lang))
    }
}

impl Pipeline<()> for PreprocessStage {
    fn run(&self) -> Result<(), Error> {
        let mut validation = Validation::new(&self.params);
        let mut all_src = Vec::new();
        let mut all_tgt = Vec::new();

        for dataset in &self.source.datasets {
            let (mut src, mut tgt) = self.process_dataset(dataset, &mut validation)?;
            all_src.append(&mut src);
            all_tgt.append(&mut tgt);
        }

        write_atomic(&self.raw_path(&self.source.src_lang), &all_src.join("\n"))?;
        write_atomic(&self.raw_path(&self.source.tgt_lang), &all_tgt.join("\n"))?;
        write_atomic(
            &self
                .data
                .join(&self.pipeline)
                .join("bitext_raw")
                .join("preprocess.log"),
            &validation.skipped.join("\n"),
        )?;

        info!(
            "[{}] preprocessing done: {} pairs kept, {} skipped",
            self.pipeline,
            all_src.len(),
            validation.skipped.len()
        );
        Ok(())
    }
}
