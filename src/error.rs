//! Error enum
//!
//! Fatal kinds ([Error::Config], [Error::Shard]) propagate up to `main` and
//! abort the run; recoverable per-sentence conditions never become an
//! [Error] at all, they are logged and replaced with sentinel output where
//! they occur.

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Serde(serde_json::Error),
    Glob(glob::GlobError),
    GlobPattern(glob::PatternError),
    Csv(csv::Error),
    LangTag(oxilangtag::LanguageTagParseError),
    Download(reqwest::Error),
    /// Invalid or missing configuration (unknown pipeline, zero batch size,
    /// acceleration without devices). Aborts before any work starts.
    Config(String),
    /// Missing, gapped or unreadable batch shard, or a corrupt canonical
    /// stream. Fatal for the merge that found it.
    Shard(String),
    /// Token id sets differ between two trees being merged.
    AlignmentMismatch { sentence: usize, detail: String },
    /// Malformed block in a tree annotation file.
    TreeFormat(String),
    Custom(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serde(e)
    }
}

impl From<glob::GlobError> for Error {
    fn from(e: glob::GlobError) -> Error {
        Error::Glob(e)
    }
}

impl From<glob::PatternError> for Error {
    fn from(e: glob::PatternError) -> Error {
        Error::GlobPattern(e)
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Error {
        Error::Csv(e)
    }
}

impl From<oxilangtag::LanguageTagParseError> for Error {
    fn from(e: oxilangtag::LanguageTagParseError) -> Error {
        Error::LangTag(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Download(e)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
