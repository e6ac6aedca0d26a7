use std::{fmt::Display, fmt::Formatter};

use serde::{Deserialize, Serialize};
use winnow::{Located, Stateful};

pub mod keywords;

/// Parser input: the located text plus the line index used to turn byte offsets into locations.
pub type Input<'a> = Stateful<Located<&'a str>, &'a SourceMap>;

pub fn input<'a>(text: &'a str, map: &'a SourceMap) -> Input<'a> {
    Stateful {
        input: Located::new(text),
        state: map,
    }
}

pub fn fmt_separated<T: Display, P: Display, I>(
    f: &mut Formatter<'_>,
    args: I,
    pat: P,
) -> std::fmt::Result
where
    I: IntoIterator<Item = T>,
{
    for (i, arg) in args.into_iter().enumerate() {
        if i != 0 {
            write!(f, "{pat}")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ident(Box<str>);

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for Ident {
    fn from(s: String) -> Self {
        Self(s.into_boxed_str())
    }
}

impl Ident {
    pub fn new(s: impl Into<Box<str>>) -> Self {
        Self(s.into())
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A 1-based `line:column` position. Columns count bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Line start offsets of one input buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(text: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self { line_starts }
    }

    pub fn location(&self, offset: usize) -> Location {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let column = offset - self.line_starts[line];
        Location::new(line as u32 + 1, column as u32 + 1)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
