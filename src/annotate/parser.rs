//! Tokenizer / dependency-parser interface.
use log::info;

use crate::batching::device::Device;
use crate::error::Error;

/// One token of a parsed sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    pub form: String,
    pub lemma: String,
    pub upos: String,
    /// 1-based id of the head token, 0 for the root.
    pub head: usize,
    pub deprel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedSentence {
    pub tokens: Vec<ParsedToken>,
}

/// The parsing model. Implementations are expected to be expensive to
/// construct (loaded once per worker) and may fail per sentence; callers
/// contain such failures.
pub trait SentenceParser {
    fn parse(&self, text: &str) -> Result<ParsedSentence, Error>;
}

/// Deterministic whitespace baseline: tokens split on whitespace, the first
/// token is the root, everything else attaches to it.
pub struct BaselineParser {
    lang: String,
}

impl BaselineParser {
    pub fn new(lang: &str, device: Device) -> Result<Self, Error> {
        info!("[{}] initializing baseline parser on {}", lang, device);
        Ok(Self {
            lang: lang.to_string(),
        })
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }
}

impl SentenceParser for BaselineParser {
    fn parse(&self, text: &str) -> Result<ParsedSentence, Error> {
        let tokens = text
            .split_whitespace()
            .enumerate()
            .map(|(i, form)| {
                let upos = if form.chars().all(|c| c.is_numeric()) {
                    "NUM"
                } else if form.chars().all(|c| c.is_ascii_punctuation()) {
                    "PUNCT"
                } else {
                    "X"
                };
                ParsedToken {
                    form: form.to_string(),
                    lemma: form.to_lowercase(),
                    upos: upos.to_string(),
                    head: if i == 0 { 0 } else { 1 },
                    deprel: if i == 0 { "root" } else { "dep" }.to_string(),
                }
            })
            .collect();
        Ok(ParsedSentence { tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_is_deterministic() {
        let parser = BaselineParser::new("en", Device::Cpu).unwrap();
        let a = parser.parse("The cat sat .").unwrap();
        let b = parser.parse("The cat sat .").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.tokens.len(), 4);
        assert_eq!(a.tokens[0].head, 0);
        assert_eq!(a.tokens[0].deprel, "root");
        assert_eq!(a.tokens[3].upos, "PUNCT");
    }

    #[test]
    fn empty_sentence_has_no_tokens() {
        let parser = BaselineParser::new("en", Device::Cpu).unwrap();
        assert!(parser.parse("").unwrap().tokens.is_empty());
    }
}
