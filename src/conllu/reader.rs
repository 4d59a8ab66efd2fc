//! Block-format readers.
//!
//! Files are read as blank-line-separated blocks; each block parses into a
//! [Tree] against a declared column schema. [ZipTrees] reads two files in
//! lockstep for merge runs.
use std::collections::BTreeMap;
use std::io::{BufRead, Lines};

use itertools::Itertools;

use crate::conllu::column::{validate_schema, Column, ColumnType};
use crate::conllu::frame::{Argument, Frame, Predicate};
use crate::conllu::tree::Tree;
use crate::error::Error;

/// Iterator over blank-line-separated line groups.
pub struct Blocks<R: BufRead> {
    lines: Lines<R>,
}

impl<R: BufRead> Blocks<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for Blocks<R> {
    type Item = Result<Vec<String>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut block = Vec::new();
        for line in self.lines.by_ref() {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(Error::Io(e))),
            };
            if line.trim().is_empty() {
                if !block.is_empty() {
                    return Some(Ok(block));
                }
                continue;
            }
            block.push(line);
        }
        if block.is_empty() {
            None
        } else {
            Some(Ok(block))
        }
    }
}

/// Parse one block against `columns`.
///
/// Metadata lines are `# key = value`; a `# global.columns` directive, when
/// present, must match the declared schema. Frame columns use
/// `frame:value` entries joined with `|`, reconstructed here into [Frame]s.
pub fn parse_tree(lines: &[String], columns: &[Column]) -> Result<Tree, Error> {
    validate_schema(columns)?;
    let mut tree = Tree::new(columns.to_vec());

    let mut predicates: BTreeMap<usize, Predicate> = BTreeMap::new();
    let mut arguments: BTreeMap<usize, Vec<Argument>> = BTreeMap::new();

    for line in lines {
        if let Some(comment) = line.strip_prefix('#') {
            let comment = comment.trim();
            if let Some((key, value)) = comment.split_once(" = ") {
                if key == "global.columns" {
                    let declared = columns.iter().map(|c| c.name()).join(" ");
                    if value != declared {
                        return Err(Error::TreeFormat(format!(
                            "column header {} does not match declared schema {}",
                            value, declared
                        )));
                    }
                } else {
                    tree.add_metadata(key, value);
                }
            }
            continue;
        }

        let cells: Vec<&str> = line.split('\t').collect();
        if cells.len() != columns.len() {
            return Err(Error::TreeFormat(format!(
                "expected {} columns, found {} in row: {}",
                columns.len(),
                cells.len(),
                line
            )));
        }

        let mut id = None;
        for (column, cell) in columns.iter().zip(&cells) {
            if column.column_type() == ColumnType::Id {
                id = Some(cell.parse::<usize>().map_err(|_| {
                    Error::TreeFormat(format!("invalid token id {} in row: {}", cell, line))
                })?);
            }
        }
        let id = id.expect("schema carries an ID column");
        let token = tree.add_token(id)?;

        for (column, cell) in columns.iter().zip(&cells) {
            match column.column_type() {
                ColumnType::Id => {}
                ColumnType::Basic => {
                    token.set_attribute(column.name(), cell);
                }
                ColumnType::UpPred => {
                    for entry in frame_entries(cell) {
                        let (frame, sense) = split_frame_entry(entry, line)?;
                        predicates.insert(
                            frame,
                            Predicate {
                                token: id,
                                sense: sense.to_string(),
                            },
                        );
                    }
                }
                ColumnType::UpArgHeads => {
                    for entry in frame_entries(cell) {
                        let (frame, label) = split_frame_entry(entry, line)?;
                        arguments.entry(frame).or_default().push(Argument {
                            label: label.to_string(),
                            head: id,
                            span: None,
                        });
                    }
                }
                ColumnType::UpArgSpans => {
                    for entry in frame_entries(cell) {
                        let (frame, rest) = split_frame_entry(entry, line)?;
                        let (label, span) = rest.split_once(':').ok_or_else(|| {
                            Error::TreeFormat(format!("invalid span entry {} in row: {}", entry, line))
                        })?;
                        let (start, end) = span.split_once('-').ok_or_else(|| {
                            Error::TreeFormat(format!("invalid span entry {} in row: {}", entry, line))
                        })?;
                        let span = (
                            start.parse::<usize>().map_err(|_| {
                                Error::TreeFormat(format!("invalid span start in: {}", entry))
                            })?,
                            end.parse::<usize>().map_err(|_| {
                                Error::TreeFormat(format!("invalid span end in: {}", entry))
                            })?,
                        );
                        let args = arguments.entry(frame).or_default();
                        match args
                            .iter_mut()
                            .find(|a| a.head == id && a.label == label && a.span.is_none())
                        {
                            Some(arg) => arg.span = Some(span),
                            None => args.push(Argument {
                                label: label.to_string(),
                                head: id,
                                span: Some(span),
                            }),
                        }
                    }
                }
            }
        }
    }

    for (frame_no, predicate) in predicates {
        let mut frame = Frame::new(predicate);
        if let Some(args) = arguments.remove(&frame_no) {
            frame.arguments = args;
        }
        tree.add_frame(frame);
    }
    if let Some((frame_no, _)) = arguments.iter().next() {
        return Err(Error::TreeFormat(format!(
            "arguments reference frame {} which has no predicate",
            frame_no
        )));
    }

    Ok(tree)
}

fn frame_entries(cell: &str) -> impl Iterator<Item = &str> {
    cell.split('|').filter(|entry| *entry != "_" && !entry.is_empty())
}

fn split_frame_entry<'a>(entry: &'a str, line: &str) -> Result<(usize, &'a str), Error> {
    let (frame, rest) = entry.split_once(':').ok_or_else(|| {
        Error::TreeFormat(format!("invalid frame entry {} in row: {}", entry, line))
    })?;
    let frame = frame.parse::<usize>().map_err(|_| {
        Error::TreeFormat(format!("invalid frame number {} in row: {}", entry, line))
    })?;
    Ok((frame, rest))
}

/// Iterator of [Tree]s over one block file.
pub struct TreeReader<R: BufRead> {
    blocks: Blocks<R>,
    columns: Vec<Column>,
}

impl<R: BufRead> TreeReader<R> {
    pub fn new(reader: R, columns: Vec<Column>) -> Self {
        Self {
            blocks: Blocks::new(reader),
            columns,
        }
    }
}

impl<R: BufRead> Iterator for TreeReader<R> {
    type Item = Result<Tree, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = match self.blocks.next()? {
            Ok(block) => block,
            Err(e) => return Some(Err(e)),
        };
        Some(parse_tree(&block, &self.columns))
    }
}

/// Read two tree streams in lockstep.
///
/// One stream ending before the other is an alignment mismatch: truncating
/// to the shorter stream would misalign every later pair.
pub struct ZipTrees<A: BufRead, B: BufRead> {
    left: TreeReader<A>,
    right: TreeReader<B>,
    sentence: usize,
}

impl<A: BufRead, B: BufRead> ZipTrees<A, B> {
    pub fn new(left: TreeReader<A>, right: TreeReader<B>) -> Self {
        Self {
            left,
            right,
            sentence: 0,
        }
    }
}

impl<A: BufRead, B: BufRead> Iterator for ZipTrees<A, B> {
    type Item = Result<(Tree, Tree), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.sentence += 1;
        match (self.left.next(), self.right.next()) {
            (None, None) => None,
            (Some(left), Some(right)) => match (left, right) {
                (Ok(left), Ok(right)) => Some(Ok((left, right))),
                (Err(e), _) | (_, Err(e)) => Some(Err(e)),
            },
            (Some(_), None) | (None, Some(_)) => Some(Err(Error::AlignmentMismatch {
                sentence: self.sentence,
                detail: "one tree stream ended before the other".to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use super::*;
    use crate::conllu::column::{conllu_columns, srl_columns};

    const UD: &str = "\
# sent_id = 1
# text = He eats an apple
1\tHe\the\tPRON\t_\t_\t2\tnsubj\t_\t_
2\teats\teat\tVERB\t_\t_\t0\troot\t_\t_
3\tan\ta\tDET\t_\t_\t4\tdet\t_\t_
4\tapple\tapple\tNOUN\t_\t_\t2\tobj\t_\t_

# sent_id = 2
# text = Done
1\tDone\tdone\tADJ\t_\t_\t0\troot\t_\t_
";

    #[test]
    fn blocks_split_on_blank_lines() {
        let reader = BufReader::new(UD.as_bytes());
        let blocks: Vec<Vec<String>> = Blocks::new(reader).map(|b| b.unwrap()).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 6);
        assert_eq!(blocks[1].len(), 3);
    }

    #[test]
    fn parses_metadata_tokens_and_attributes() {
        let reader = BufReader::new(UD.as_bytes());
        let trees: Vec<Tree> = TreeReader::new(reader, conllu_columns())
            .map(|t| t.unwrap())
            .collect();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].metadata("sent_id"), Some("1"));
        assert_eq!(trees[0].token_ids(), vec![1, 2, 3, 4]);
        assert_eq!(trees[0].tokens()[1].attribute("LEMMA"), Some("eat"));
        assert_eq!(trees[0].tokens()[3].attribute("DEPREL"), Some("obj"));
    }

    #[test]
    fn frames_round_trip() {
        let srl = "\
# sent_id = 1
1\t_\t_\t_
2\t1:eat.01\t_\t_
3\t_\t_\t_
4\t_\t1:A1\t1:A1:3-4
";
        let reader = BufReader::new(srl.as_bytes());
        let trees: Vec<Tree> = TreeReader::new(reader, srl_columns())
            .map(|t| t.unwrap())
            .collect();
        assert_eq!(trees.len(), 1);
        let frames = trees[0].frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].predicate.token, 2);
        assert_eq!(frames[0].predicate.sense, "eat.01");
        assert_eq!(frames[0].arguments.len(), 1);
        assert_eq!(frames[0].arguments[0].head, 4);
        assert_eq!(frames[0].arguments[0].span, Some((3, 4)));

        let rendered = trees[0].to_conllup(false);
        let reparsed = parse_tree(
            &rendered.lines().map(str::to_string).collect::<Vec<_>>(),
            &srl_columns(),
        )
        .unwrap();
        assert_eq!(reparsed.frames(), trees[0].frames());
    }

    #[test]
    fn row_with_wrong_arity_is_rejected() {
        let bad = vec!["1\tonly\ttwo".to_string()];
        assert!(matches!(
            parse_tree(&bad, &conllu_columns()),
            Err(Error::TreeFormat(_))
        ));
    }

    #[test]
    fn zip_flags_uneven_streams() {
        let left = TreeReader::new(BufReader::new(UD.as_bytes()), conllu_columns());
        let one_block = "# sent_id = 1\n1\tDone\tdone\tADJ\t_\t_\t0\troot\t_\t_\n";
        let right = TreeReader::new(BufReader::new(one_block.as_bytes()), conllu_columns());

        let results: Vec<Result<(Tree, Tree), Error>> = ZipTrees::new(left, right).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(Error::AlignmentMismatch { sentence: 2, .. })
        ));
    }
}
