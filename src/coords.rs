//! Source coordinates for diagnostics and AST nodes.

use std::fmt;
use std::rc::Rc;

/// A position in a source file.
///
/// `line` and `column` are 1-based; a zero value means "unknown" and is
/// omitted from the printed form. The file name is shared, since every
/// token of a compilation points at the same one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceCoords {
    pub file_name: Option<Rc<str>>,
    pub line: u32,
    pub column: u32,
}

impl SourceCoords {
    pub fn new(file_name: Option<Rc<str>>, line: u32, column: u32) -> Self {
        SourceCoords {
            file_name,
            line,
            column,
        }
    }

    /// True when every field is known.
    pub fn full(&self) -> bool {
        self.file_name.is_some() && self.line != 0 && self.column != 0
    }
}

/// Prints `filename(line).column`, omitting whatever is unknown.
impl fmt::Display for SourceCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.file_name {
            write!(f, "{}", name)?;
        }
        if self.line != 0 {
            write!(f, "({})", self.line)?;
        }
        if self.column != 0 {
            write!(f, ".{}", self.column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_full() {
        let c = SourceCoords::new(Some("input.scm".into()), 3, 7);
        assert_eq!(c.to_string(), "input.scm(3).7");
    }

    #[test]
    fn test_display_partial() {
        let c = SourceCoords::new(None, 3, 0);
        assert_eq!(c.to_string(), "(3)");
        let c = SourceCoords::default();
        assert_eq!(c.to_string(), "");
        assert!(!c.full());
    }

    #[test]
    fn test_equality_compares_file_names() {
        let a = SourceCoords::new(Some("a.scm".into()), 1, 1);
        let b = SourceCoords::new(Some("b.scm".into()), 1, 1);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
