//! Column schema declarations.
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// The token identifier column. Exactly one per schema.
    Id,
    /// A plain attribute column, rendered from token attributes by name.
    Basic,
    /// Predicate senses of the tree's frames.
    UpPred,
    /// Argument labels anchored at their head tokens.
    UpArgHeads,
    /// Argument labels with token spans.
    UpArgSpans,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
}

impl Column {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }

    pub fn basic(name: &str) -> Self {
        Self::new(name, ColumnType::Basic)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }
}

/// The ten standard CoNLL-U dependency columns.
pub fn conllu_columns() -> Vec<Column> {
    vec![
        Column::new("ID", ColumnType::Id),
        Column::basic("FORM"),
        Column::basic("LEMMA"),
        Column::basic("UPOS"),
        Column::basic("XPOS"),
        Column::basic("FEATS"),
        Column::basic("HEAD"),
        Column::basic("DEPREL"),
        Column::basic("DEPS"),
        Column::basic("MISC"),
    ]
}

/// Columns of a frames-only semantic-role file.
pub fn srl_columns() -> Vec<Column> {
    vec![
        Column::new("ID", ColumnType::Id),
        Column::new("UP:PRED", ColumnType::UpPred),
        Column::new("UP:ARGHEADS", ColumnType::UpArgHeads),
        Column::new("UP:ARGSPANS", ColumnType::UpArgSpans),
    ]
}

/// Declared schema of the merged dependency + semantic-role output.
pub fn merged_columns() -> Vec<Column> {
    let mut columns = conllu_columns();
    columns.push(Column::new("UP:PRED", ColumnType::UpPred));
    columns.push(Column::new("UP:ARGHEADS", ColumnType::UpArgHeads));
    columns.push(Column::new("UP:ARGSPANS", ColumnType::UpArgSpans));
    columns
}

/// A schema must carry exactly one [ColumnType::Id] column.
pub fn validate_schema(columns: &[Column]) -> Result<(), Error> {
    let ids = columns
        .iter()
        .filter(|c| c.column_type() == ColumnType::Id)
        .count();
    if ids != 1 {
        return Err(Error::TreeFormat(format!(
            "schema must declare exactly one ID column, found {}",
            ids
        )));
    }
    Ok(())
}
