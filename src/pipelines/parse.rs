/*! Tokenization and dependency parsing of one language side.

The raw stream is partitioned into batches and run through the parsing
model on a bounded worker pool. Every sentence position yields one
tokenized line and one tree block tagged with its 1-based `sent_id`, so
later stages can reconcile streams positionally.

With `batch_save` on, each batch commits its own shard files and an
interrupted run resumes where it left off; `merge-parse` then assembles
the canonical artifacts. Without it, results are buffered, sorted by batch
index and written directly.
!*/
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{error, info};

use crate::annotate::parser::{BaselineParser, ParsedSentence, SentenceParser};
use crate::batching::batch::{partition, Batch};
use crate::batching::checkpoint::{write_atomic, ArtifactKind, CheckpointStore, Shardable, Stage};
use crate::batching::device::assign_device;
use crate::batching::scheduler::{Scheduler, Worker};
use crate::config::{Config, Params};
use crate::conllu::column::conllu_columns;
use crate::conllu::tree::Tree;
use crate::error::Error;
use crate::pipelines::pipeline::Pipeline;

pub struct ParseStage {
    data: PathBuf,
    pipeline: String,
    lang: String,
    params: Params,
}

/// Per-batch output: one tokenized line and one tree per sentence.
pub struct ParseOutput {
    pub tokenized: Vec<String>,
    pub trees: Vec<Tree>,
}

impl ParseOutput {
    fn parsed_blocks(&self) -> String {
        let mut out = String::new();
        for tree in &self.trees {
            out.push_str(&tree.to_conllup(false));
            out.push_str("\n\n");
        }
        out
    }
}

impl Shardable for ParseOutput {
    fn artifacts(&self) -> Vec<(ArtifactKind, String)> {
        vec![
            (ArtifactKind::Tokenized, self.tokenized.join("\n")),
            (ArtifactKind::Parsed, self.parsed_blocks()),
        ]
    }
}

pub struct ParseWorker<P> {
    parser: P,
    lang: String,
    pipeline: String,
}

impl<P> ParseWorker<P> {
    pub fn new(parser: P, pipeline: &str, lang: &str) -> Self {
        Self {
            parser,
            lang: lang.to_string(),
            pipeline: pipeline.to_string(),
        }
    }
}

impl<P: SentenceParser> Worker for ParseWorker<P> {
    type Item = String;
    type Output = ParseOutput;

    fn process(&mut self, batch: &Batch<String>) -> Result<ParseOutput, Error> {
        let mut tokenized = Vec::with_capacity(batch.len());
        let mut trees = Vec::with_capacity(batch.len());

        for (i, sentence) in batch.items.iter().enumerate() {
            let position = batch.position(i);
            // a single malformed sentence must not fail a batch of
            // thousands: log it and record a sentinel record instead
            let parsed = match self.parser.parse(sentence) {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!(
                        "[{}/{}] parse failed for sentence {} (batch {}): {:?}",
                        self.pipeline, self.lang, position, batch.index, e
                    );
                    ParsedSentence::default()
                }
            };

            let text = parsed.tokens.iter().map(|t| t.form.as_str()).join(" ");
            let mut tree = Tree::new(conllu_columns());
            tree.add_metadata("sent_id", &position.to_string());
            tree.add_metadata("text", &text);
            for (j, token) in parsed.tokens.iter().enumerate() {
                tree.add_token(j + 1)?
                    .set_attribute("FORM", &token.form)
                    .set_attribute("LEMMA", &token.lemma)
                    .set_attribute("UPOS", &token.upos)
                    .set_attribute("HEAD", &token.head.to_string())
                    .set_attribute("DEPREL", &token.deprel);
            }
            tokenized.push(text);
            trees.push(tree);
        }
        Ok(ParseOutput { tokenized, trees })
    }
}

/// Load the sentence stream a parse run operates on: the raw bitext file,
/// restricted by an optional `ids.txt` selection, capped by `limit`.
///
/// Shared with merge-parse, which needs the same count to know how many
/// shards a complete run produces.
pub fn load_stream(
    data: &Path,
    pipeline: &str,
    lang: &str,
    params: &Params,
) -> Result<Vec<String>, Error> {
    let raw = data
        .join(pipeline)
        .join("bitext_raw")
        .join(format!("{}.{}.txt", pipeline, lang));
    let contents = std::fs::read_to_string(&raw).map_err(|e| {
        Error::Config(format!("cannot read raw stream {}: {}", raw.display(), e))
    })?;
    let mut sentences: Vec<String> = contents
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    let ids_path = data.join(pipeline).join("ids.txt");
    if ids_path.is_file() {
        let ids = std::fs::read_to_string(&ids_path)?;
        let mut selected = Vec::new();
        for line in ids.split('\n').filter(|line| !line.is_empty()) {
            let id = line.trim().parse::<usize>().map_err(|_| {
                Error::Config(format!("invalid sentence id in {}: {}", ids_path.display(), line))
            })?;
            if id == 0 || id > sentences.len() {
                return Err(Error::Config(format!(
                    "sentence id {} out of range 1..={}",
                    id,
                    sentences.len()
                )));
            }
            selected.push(sentences[id - 1].clone());
        }
        info!(
            "[{}/{}] restricted to {} selected sentences",
            pipeline,
            lang,
            selected.len()
        );
        sentences = selected;
    }

    if params.limit > 0 && sentences.len() > params.limit {
        sentences.truncate(params.limit);
    }
    Ok(sentences)
}

impl ParseStage {
    pub fn new(data: &Path, pipeline: &str, lang: &str, config: &Config) -> Result<Self, Error> {
        let source = config.source_for(pipeline)?;
        if lang != source.src_lang && lang != source.tgt_lang {
            return Err(Error::Config(format!(
                "language {} is not a side of pipeline {}",
                lang, pipeline
            )));
        }
        Ok(Self {
            data: data.to_path_buf(),
            pipeline: pipeline.to_string(),
            lang: lang.to_string(),
            params: config.params.clone(),
        })
    }

    pub fn store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.data, &self.pipeline, &self.lang, Stage::Parse)
    }

    /// Run with a caller-supplied parser factory. The factory runs at most
    /// once per worker slot, when that slot first receives work.
    pub fn run_with<P, F>(&self, factory: F) -> Result<(), Error>
    where
        P: SentenceParser,
        F: Fn(usize) -> Result<P, Error> + Sync,
    {
        let sentences = load_stream(&self.data, &self.pipeline, &self.lang, &self.params)?;
        info!(
            "[{}/{}] parsing {} sentences",
            self.pipeline,
            self.lang,
            sentences.len()
        );

        let batches = partition(sentences, self.params.batch_size)?;
        let expected = batches.len();
        let scheduler = Scheduler::new(self.params.processes)?;
        let store = self.store();

        let init = |slot: usize| -> Result<ParseWorker<P>, Error> {
            Ok(ParseWorker::new(factory(slot)?, &self.pipeline, &self.lang))
        };

        if self.params.batch_save {
            scheduler.run_checkpointed::<ParseWorker<P>, _>(batches, init, &store)?;
            info!(
                "[{}/{}] {} batches checkpointed, run merge-parse to assemble canonical artifacts",
                self.pipeline, self.lang, expected
            );
        } else {
            let results = scheduler.run_buffered::<ParseWorker<P>, _>(batches, init)?;
            let mut tokenized = Vec::new();
            let mut parsed = String::new();
            for result in results {
                tokenized.extend(result.data.tokenized.iter().cloned());
                parsed.push_str(&result.data.parsed_blocks());
            }
            write_atomic(
                &store.canonical_path(ArtifactKind::Tokenized),
                &tokenized.join("\n"),
            )?;
            write_atomic(&store.canonical_path(ArtifactKind::Parsed), &parsed)?;
            info!("[{}/{}] canonical artifacts written", self.pipeline, self.lang);
        }
        Ok(())
    }
}

impl Pipeline<()> for ParseStage {
    fn run(&self) -> Result<(), Error> {
        // fail fast on device misconfiguration, before any work starts
        assign_device(0, self.params.gpu, self.params.devices)?;

        let gpu = self.params.gpu;
        let devices = self.params.devices;
        let lang = self.lang.clone();
        self.run_with(|slot| {
            let device = assign_device(slot, gpu, devices)?;
            BaselineParser::new(&lang, device)
        })
    }
}
