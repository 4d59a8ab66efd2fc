//! Tree model and CoNLL-U Plus serialization.
use std::collections::HashMap;

use itertools::Itertools;

use crate::conllu::column::{validate_schema, Column, ColumnType};
use crate::conllu::frame::Frame;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    id: usize,
    attributes: HashMap<String, String>,
}

impl Token {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) -> &mut Token {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}

/// An ordered token sequence with a declared column schema, ordered
/// metadata and zero or more semantic frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    columns: Vec<Column>,
    metadata: Vec<(String, String)>,
    tokens: Vec<Token>,
    frames: Vec<Frame>,
}

impl Tree {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            metadata: Vec::new(),
            tokens: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Validate the declared schema. Called once per reader/writer setup.
    pub fn check_schema(&self) -> Result<(), Error> {
        validate_schema(&self.columns)
    }

    pub fn add_metadata(&mut self, key: &str, value: &str) {
        self.metadata.push((key.to_string(), value.to_string()));
    }

    /// Replace the value of `key`, or append it when absent.
    pub fn set_metadata(&mut self, key: &str, value: &str) {
        match self.metadata.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.add_metadata(key, value),
        }
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn metadata_entries(&self) -> &[(String, String)] {
        &self.metadata
    }

    /// Append a token. Ids must be unique within a tree.
    pub fn add_token(&mut self, id: usize) -> Result<&mut Token, Error> {
        if self.tokens.iter().any(|t| t.id == id) {
            return Err(Error::TreeFormat(format!("duplicate token id {}", id)));
        }
        self.tokens.push(Token {
            id,
            attributes: HashMap::new(),
        });
        Ok(self.tokens.last_mut().unwrap())
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token_ids(&self) -> Vec<usize> {
        self.tokens.iter().map(|t| t.id).collect()
    }

    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Render metadata lines, then one row per token with cells in declared
    /// column order. No trailing blank line; writers insert the block
    /// separator.
    pub fn to_conllup(&self, with_header: bool) -> String {
        let mut out = String::new();
        if with_header {
            out.push_str(&format!(
                "# global.columns = {}\n",
                self.columns.iter().map(|c| c.name()).join(" ")
            ));
        }
        for (key, value) in &self.metadata {
            out.push_str(&format!("# {} = {}\n", key, value));
        }
        for token in &self.tokens {
            let row = self
                .columns
                .iter()
                .map(|column| self.render_cell(token, column))
                .join("\t");
            out.push_str(&row);
            out.push('\n');
        }
        // drop the final newline so blocks compose as line groups
        if out.ends_with('\n') {
            out.pop();
        }
        out
    }

    fn render_cell(&self, token: &Token, column: &Column) -> String {
        let entries: Vec<String> = match column.column_type() {
            ColumnType::Id => return token.id.to_string(),
            ColumnType::Basic => {
                return token
                    .attribute(column.name())
                    .unwrap_or("_")
                    .to_string()
            }
            ColumnType::UpPred => self
                .frames
                .iter()
                .enumerate()
                .filter(|(_, frame)| frame.predicate.token == token.id)
                .map(|(k, frame)| format!("{}:{}", k + 1, frame.predicate.sense))
                .collect(),
            ColumnType::UpArgHeads => self
                .frames
                .iter()
                .enumerate()
                .flat_map(|(k, frame)| {
                    frame
                        .arguments
                        .iter()
                        .filter(|arg| arg.head == token.id)
                        .map(move |arg| format!("{}:{}", k + 1, arg.label))
                })
                .collect(),
            ColumnType::UpArgSpans => self
                .frames
                .iter()
                .enumerate()
                .flat_map(|(k, frame)| {
                    frame
                        .arguments
                        .iter()
                        .filter(|arg| arg.head == token.id && arg.span.is_some())
                        .map(move |arg| {
                            let (start, end) = arg.span.unwrap();
                            format!("{}:{}:{}-{}", k + 1, arg.label, start, end)
                        })
                })
                .collect(),
        };
        if entries.is_empty() {
            "_".to_string()
        } else {
            entries.join("|")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conllu::column::{conllu_columns, merged_columns};
    use crate::conllu::frame::{Argument, Predicate};

    #[test]
    fn serializes_metadata_then_rows() {
        let mut tree = Tree::new(conllu_columns());
        tree.add_metadata("sent_id", "1");
        tree.add_metadata("text", "Hello world");
        let token = tree.add_token(1).unwrap();
        token
            .set_attribute("FORM", "Hello")
            .set_attribute("LEMMA", "hello")
            .set_attribute("UPOS", "X")
            .set_attribute("HEAD", "0")
            .set_attribute("DEPREL", "root");
        tree.add_token(2)
            .unwrap()
            .set_attribute("FORM", "world")
            .set_attribute("LEMMA", "world")
            .set_attribute("UPOS", "X")
            .set_attribute("HEAD", "1")
            .set_attribute("DEPREL", "dep");

        let rendered = tree.to_conllup(false);
        let expected = "\
# sent_id = 1
# text = Hello world
1\tHello\thello\tX\t_\t_\t0\troot\t_\t_
2\tworld\tworld\tX\t_\t_\t1\tdep\t_\t_";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn header_lists_declared_columns() {
        let tree = Tree::new(merged_columns());
        let rendered = tree.to_conllup(true);
        assert!(rendered.starts_with(
            "# global.columns = ID FORM LEMMA UPOS XPOS FEATS HEAD DEPREL DEPS MISC \
             UP:PRED UP:ARGHEADS UP:ARGSPANS"
        ));
    }

    #[test]
    fn frames_render_at_their_tokens() {
        let mut tree = Tree::new(merged_columns());
        for id in 1..=4 {
            tree.add_token(id)
                .unwrap()
                .set_attribute("FORM", &format!("w{}", id));
        }
        let mut frame = Frame::new(Predicate {
            token: 2,
            sense: "eat.01".to_string(),
        });
        frame.add_argument(Argument {
            label: "A1".to_string(),
            head: 4,
            span: Some((3, 4)),
        });
        tree.add_frame(frame);

        let rendered = tree.to_conllup(false);
        let rows: Vec<&str> = rendered.lines().collect();
        assert!(rows[1].ends_with("1:eat.01\t_\t_"));
        assert!(rows[3].ends_with("_\t1:A1\t1:A1:3-4"));
    }

    #[test]
    fn duplicate_token_id_is_rejected() {
        let mut tree = Tree::new(conllu_columns());
        tree.add_token(1).unwrap();
        assert!(matches!(tree.add_token(1), Err(Error::TreeFormat(_))));
    }
}
