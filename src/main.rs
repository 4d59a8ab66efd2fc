//! # Weft
//!
//! 🧵 Weft is a pipeline to build annotated parallel-text corpora:
//! dependency parses, word alignments and semantic-role frames over large
//! bitext collections, batch-parallel and resumable.
//!
//! ```sh
//! weft 0.1.0
//! parallel-text corpus generation tool.
//!
//! USAGE:
//!     weft <SUBCOMMAND>
//!
//! SUBCOMMANDS:
//!     download       Download configured source corpora
//!     preprocess     Validate and pair the raw parallel corpora
//!     parse          Tokenize and dependency-parse one language side
//!     align          Word-align the tokenized streams
//!     merge-parse    Assemble canonical parse artifacts from batch shards
//!     merge-align    Assemble the canonical alignment artifact from batch shards
//!     reconcile      Drop inconsistent sentences uniformly across every artifact stream
//!     merge-trees    Merge dependency trees with semantic-role frames
//! ```
use log::{debug, info};
use structopt::StructOpt;

use weft::cli;
use weft::config::Config;
use weft::download::Downloader;
use weft::error::Error;
use weft::pipelines::{
    AlignStage, MergeAlignStage, MergeParseStage, ParseStage, Pipeline, PreprocessStage,
    ReconcileStage, TreeMergeStage,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let opt = cli::Weft::from_args();
    debug!("cli args\n{:#?}", opt);

    match opt {
        cli::Weft::Download(d) => {
            let config = Config::from_path(&d.config)?;
            let downloader = Downloader::from_config(&config, &d.source, &d.data)?;
            downloader.download_all(d.n_tasks.unwrap_or(4)).await?;
        }
        cli::Weft::Preprocess(args) => {
            let config = Config::from_path(&args.config)?;
            PreprocessStage::new(&args.data, &args.pipeline, &config)?.run()?;
        }
        cli::Weft::Parse(args) => {
            let config = Config::from_path(&args.config)?;
            ParseStage::new(&args.data, &args.pipeline, &args.lang, &config)?.run()?;
        }
        cli::Weft::Align(args) => {
            let config = Config::from_path(&args.config)?;
            AlignStage::new(&args.data, &args.pipeline, &config)?.run()?;
        }
        cli::Weft::MergeParse(args) => {
            let config = Config::from_path(&args.config)?;
            MergeParseStage::new(&args.data, &args.pipeline, &config)?.run()?;
        }
        cli::Weft::MergeAlign(args) => {
            let config = Config::from_path(&args.config)?;
            MergeAlignStage::new(&args.data, &args.pipeline, &config)?.run()?;
        }
        cli::Weft::Reconcile(args) => {
            let config = Config::from_path(&args.config)?;
            let report = ReconcileStage::new(&args.data, &args.pipeline, &config)?.run()?;
            info!(
                "reconciled {}: {} of {} positions kept",
                args.pipeline, report.kept, report.stream_length
            );
        }
        cli::Weft::MergeTrees(args) => {
            let stage = TreeMergeStage::new(
                &args.input_parsed,
                &args.input_srl,
                &args.output,
                !args.lenient,
            );
            let merged = stage.run()?;
            info!("merged {} sentences", merged);
        }
    };
    Ok(())
}
