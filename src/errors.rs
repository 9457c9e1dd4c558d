//! Diagnostic collection.
//!
//! Compilation never stops on a bad program: every stage reports what it
//! found and continues with a recovery value. The reporter accumulates the
//! diagnostics and the driver turns a non-zero count into a failing exit
//! code. Only I/O failures abort, and those never reach the reporter.

use crate::coords::SourceCoords;

/// One diagnostic: where, and what.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub coords: SourceCoords,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(coords: SourceCoords, message: impl Into<String>) -> Self {
        ErrorInfo {
            coords,
            message: message.into(),
        }
    }

    /// `filename(line).column:message`, omitting unknown location fields
    /// and the separating colon when there are none.
    pub fn format_message(&self) -> String {
        let loc = self.coords.to_string();
        if loc.is_empty() {
            self.message.clone()
        } else {
            format!("{}:{}", loc, self.message)
        }
    }
}

/// Accumulates diagnostics for one compilation.
///
/// In echo mode (the CLI driver) each diagnostic is additionally written to
/// stderr as it arrives, up to `max_echoed` lines; counting and collection
/// always continue past the cap.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    errors: Vec<ErrorInfo>,
    echo: bool,
    max_echoed: Option<usize>,
    echoed: usize,
}

impl ErrorReporter {
    /// A silent, collecting reporter (library and test use).
    pub fn new() -> Self {
        ErrorReporter::default()
    }

    /// A reporter that also writes one line per error to stderr.
    pub fn with_stderr(max_echoed: Option<usize>) -> Self {
        ErrorReporter {
            echo: true,
            max_echoed,
            ..ErrorReporter::default()
        }
    }

    pub fn error(&mut self, coords: SourceCoords, message: impl Into<String>) {
        self.report(ErrorInfo::new(coords, message));
    }

    pub fn report(&mut self, info: ErrorInfo) {
        if self.echo && self.max_echoed.map_or(true, |max| self.echoed < max) {
            eprintln!("{}", info.format_message());
            self.echoed += 1;
        }
        self.errors.push(info);
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ErrorInfo> {
        self.errors
    }

    /// The most recent diagnostic, if any.
    pub fn last(&self) -> Option<&ErrorInfo> {
        self.errors.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        let ei = ErrorInfo::new(
            SourceCoords::new(Some("t.scm".into()), 2, 5),
            "Invalid number",
        );
        assert_eq!(ei.format_message(), "t.scm(2).5:Invalid number");

        let ei = ErrorInfo::new(SourceCoords::default(), "Invalid number");
        assert_eq!(ei.format_message(), "Invalid number");
    }

    #[test]
    fn test_collects_in_order() {
        let mut rep = ErrorReporter::new();
        rep.error(SourceCoords::new(None, 1, 1), "first");
        rep.error(SourceCoords::new(None, 2, 1), "second");
        assert_eq!(rep.error_count(), 2);
        assert_eq!(rep.errors()[0].message, "first");
        assert_eq!(rep.last().unwrap().message, "second");
    }
}
