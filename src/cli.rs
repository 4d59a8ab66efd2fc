//! Command line arguments and parameters management/parsing.
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "weft", about = "parallel-text corpus generation tool.")]
/// Holds every command that is callable by the `weft` command.
pub enum Weft {
    #[structopt(about = "Download configured source corpora")]
    Download(Download),
    #[structopt(about = "Validate and pair the raw parallel corpora")]
    Preprocess(StageArgs),
    #[structopt(about = "Tokenize and dependency-parse one language side")]
    Parse(Parse),
    #[structopt(about = "Word-align the tokenized streams")]
    Align(StageArgs),
    #[structopt(about = "Assemble canonical parse artifacts from batch shards")]
    MergeParse(StageArgs),
    #[structopt(about = "Assemble the canonical alignment artifact from batch shards")]
    MergeAlign(StageArgs),
    #[structopt(about = "Drop inconsistent sentences uniformly across every artifact stream")]
    Reconcile(StageArgs),
    #[structopt(about = "Merge dependency trees with semantic-role frames")]
    MergeTrees(MergeTrees),
}

#[derive(Debug, StructOpt)]
pub struct StageArgs {
    #[structopt(help = "pipeline name from the configuration file")]
    pub pipeline: String,
    #[structopt(
        parse(from_os_str),
        long = "config",
        help = "configuration file location",
        default_value = "config/config.json"
    )]
    pub config: PathBuf,
    #[structopt(
        parse(from_os_str),
        long = "data",
        help = "data root",
        default_value = "data"
    )]
    pub data: PathBuf,
}

#[derive(Debug, StructOpt)]
pub struct Parse {
    #[structopt(help = "pipeline name from the configuration file")]
    pub pipeline: String,
    #[structopt(help = "language side to parse")]
    pub lang: String,
    #[structopt(
        parse(from_os_str),
        long = "config",
        help = "configuration file location",
        default_value = "config/config.json"
    )]
    pub config: PathBuf,
    #[structopt(
        parse(from_os_str),
        long = "data",
        help = "data root",
        default_value = "data"
    )]
    pub data: PathBuf,
}

#[derive(Debug, StructOpt)]
/// Download command and parameters.
pub struct Download {
    #[structopt(help = "source definition from the configuration file")]
    pub source: String,
    #[structopt(
        parse(from_os_str),
        long = "config",
        help = "configuration file location",
        default_value = "config/config.json"
    )]
    pub config: PathBuf,
    #[structopt(
        parse(from_os_str),
        long = "data",
        help = "data root",
        default_value = "data"
    )]
    pub data: PathBuf,
    #[structopt(short = "t", help = "number of parallel transfers. Default is 4.")]
    pub n_tasks: Option<usize>,
}

#[derive(Debug, StructOpt)]
pub struct MergeTrees {
    #[structopt(parse(from_os_str), help = "dependency .conllu input")]
    pub input_parsed: PathBuf,
    #[structopt(parse(from_os_str), help = "semantic-role .conllup input")]
    pub input_srl: PathBuf,
    #[structopt(parse(from_os_str), help = "merged .conllup output")]
    pub output: PathBuf,
    #[structopt(
        long = "lenient",
        help = "skip sentence pairs with mismatched token ids instead of aborting"
    )]
    pub lenient: bool,
}
