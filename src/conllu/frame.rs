//! Semantic frames: one predicate plus its arguments.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Token id of the predicate.
    pub token: usize,
    /// Predicate sense label, e.g. `eat.01`.
    pub sense: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub label: String,
    /// Token id of the argument head.
    pub head: usize,
    /// Optional token span `(start, end)`, inclusive.
    pub span: Option<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub predicate: Predicate,
    pub arguments: Vec<Argument>,
}

impl Frame {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            arguments: Vec::new(),
        }
    }

    pub fn add_argument(&mut self, argument: Argument) {
        self.arguments.push(argument);
    }
}
