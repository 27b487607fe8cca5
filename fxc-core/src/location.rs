use std::fmt;

/// Position in an effect source file. Lines and columns are 1-based and
/// advance per byte; a `\r\n` pair counts as a single line break.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct Location {
    pub source: String,
    pub line: u32,
    pub column: u32,
}
impl Default for Location {
    fn default() -> Self {
        Location {
            source: String::new(),
            line: 1,
            column: 1,
        }
    }
}
impl Location {
    pub fn new(source: &str, line: u32, column: u32) -> Self {
        Location {
            source: source.to_owned(),
            line,
            column,
        }
    }
}
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({}, {})", self.source, self.line, self.column)
    }
}
