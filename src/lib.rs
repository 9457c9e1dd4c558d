//! smalls compiler front end.
//!
//! Compiles Scheme source text into a typed AST: UTF-8 decoding, lexing,
//! datum reading, and parsing/expansion with hygienic macros. Diagnostics
//! accumulate in an [`ErrorReporter`](errors::ErrorReporter); only I/O
//! failures abort.
//!
//! ```rust
//! let result = smalls::compile_source("(if #t 1 2)", Some("demo.scm"));
//! assert_eq!(result.error_count(), 0);
//! print!("{}", result.dump_ast());
//! ```

pub mod ast;
pub mod config;
pub mod coords;
pub mod errors;
pub mod input;
pub mod lexer;
pub mod parser;
pub mod reader;
pub mod symtab;
pub mod syntax;
pub mod token;
pub mod utf8;

pub use ast::AstModule;
pub use config::CompilerConfig;
pub use coords::SourceCoords;
pub use errors::{ErrorInfo, ErrorReporter};
pub use parser::SchemeParser;
pub use symtab::{Keywords, SymbolTable};
pub use syntax::{Syntax, SyntaxRef};

use crate::input::ByteInput;
use crate::lexer::Lexer;
use crate::reader::SyntaxReader;
use crate::syntax::{ListBuilder, SyntaxKind};
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// The result of one compilation: the AST module, the symbol table it
/// refers to, the top-level datums, and the collected diagnostics.
#[derive(Debug)]
pub struct Compilation {
    pub symtab: SymbolTable,
    pub module: AstModule,
    /// The top-level forms as read, a proper list.
    pub forms: SyntaxRef,
    pub errors: Vec<ErrorInfo>,
}

impl Compilation {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// The human-readable AST dump (snapshot format, not a stable
    /// contract).
    pub fn dump_ast(&self) -> String {
        self.module.dump(&self.symtab)
    }

    /// The parsed top-level datums, one per line, indented.
    pub fn dump_forms(&self) -> String {
        let mut out = String::new();
        let mut cur = &self.forms;
        while let SyntaxKind::Pair { car, cdr, .. } = &cur.kind {
            car.write_indented(&self.symtab, &mut out, 0);
            out.push('\n');
            cur = cdr;
        }
        out
    }
}

/// Compile in-memory source with a silent reporter.
pub fn compile_source(source: &str, file_name: Option<&str>) -> Compilation {
    compile_bytes(
        source.as_bytes().to_vec(),
        file_name.map(Rc::from),
        ErrorReporter::new(),
    )
}

/// Compile a file; diagnostics are echoed to stderr as they occur, capped
/// by `config.max_errors`. Only failing to read the file is an error.
pub fn compile_file(path: &Path, config: &CompilerConfig) -> Result<Compilation, String> {
    let bytes =
        fs::read(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let file_name: Rc<str> = path.display().to_string().into();
    Ok(compile_bytes(
        bytes,
        Some(file_name),
        ErrorReporter::with_stderr(config.max_errors),
    ))
}

fn compile_bytes(
    bytes: Vec<u8>,
    file_name: Option<Rc<str>>,
    mut errors: ErrorReporter,
) -> Compilation {
    let mut symtab = SymbolTable::new();
    let kw = Keywords::new(&mut symtab);

    // Stage 1: read every top-level datum.
    let forms = {
        let mut lexer = Lexer::new(ByteInput::new(bytes), file_name, &mut symtab, &mut errors);
        let mut reader = SyntaxReader::new(&mut lexer, &kw);
        let mut lb = ListBuilder::new();
        loop {
            let datum = reader.parse_datum();
            if datum.is_eof() {
                break;
            }
            lb.push(datum);
        }
        lb.to_list()
    };

    // Stage 2: compile the whole list as the library body.
    let parser = SchemeParser::new(&mut symtab, &kw, &mut errors);
    let module = parser.parse_module(&forms);

    Compilation {
        symtab,
        module,
        forms,
        errors: errors.into_errors(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_literal_programs() {
        let r = compile_source("42", None);
        assert_eq!(r.error_count(), 0);
        assert_eq!(r.dump_ast(), "(DATUM 42)\n");

        let r = compile_source("(if #t 1 2)", None);
        assert_eq!(r.error_count(), 0);
        assert_eq!(r.dump_ast(), "(IF\n    (DATUM #t)\n    (DATUM 1)\n    (DATUM 2))\n");
    }

    #[test]
    fn test_closure_and_application() {
        let r = compile_source("((lambda (x) x) 3)", None);
        assert_eq!(r.error_count(), 0);
        assert_eq!(
            r.dump_ast(),
            "(APPLY (CLOSURE (x:1)\n    (VAR x:1)) (DATUM 3) '())\n"
        );
    }

    #[test]
    fn test_top_level_letrec() {
        let r = compile_source("(define x 1) x", None);
        assert_eq!(r.error_count(), 0);
        assert_eq!(
            r.dump_ast(),
            "(LETREC*\n    (\n        (x:0 (DATUM 1)))\n    (VAR x:0))\n"
        );
    }

    #[test]
    fn test_errors_carry_coordinates() {
        let r = compile_source("nope", Some("prog.scm"));
        assert_eq!(r.error_count(), 1);
        assert_eq!(
            r.errors[0].format_message(),
            "prog.scm(1).1:Undefined variable 'nope'"
        );
    }

    #[test]
    fn test_error_recovery_produces_ast() {
        // Lexical, syntactic and semantic errors in one program; the
        // compilation still yields a module.
        let r = compile_source("(define x 01) (if x . y) unknown", None);
        assert!(r.error_count() >= 3);
        assert!(r.dump_ast().starts_with("(LETREC*"));
    }

    #[test]
    fn test_dump_forms() {
        // The indented dump puts each later list element on its own line.
        let r = compile_source("(a b) 42", None);
        assert_eq!(r.dump_forms(), "(a\n    b)\n42\n");
    }

    #[test]
    fn test_compile_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(define x 1)\nx\n").unwrap();

        let config = CompilerConfig::new();
        let r = compile_file(file.path(), &config).unwrap();
        assert_eq!(r.error_count(), 0);
        assert!(r.dump_ast().starts_with("(LETREC*"));
    }

    #[test]
    fn test_compile_file_missing() {
        let config = CompilerConfig::new();
        let err = compile_file(Path::new("/no/such/file.scm"), &config).unwrap_err();
        assert!(err.contains("Failed to read"));
    }

    #[test]
    fn test_file_name_threads_through_diagnostics() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(\n").unwrap();

        // The unterminated list recovers to an empty list, which the
        // parser then rejects as an empty form: two diagnostics.
        let config = CompilerConfig::new();
        let r = compile_file(file.path(), &config).unwrap();
        assert_eq!(r.error_count(), 2);
        let msg = r.errors[0].format_message();
        assert!(msg.contains("Unterminated list"));
        assert!(msg.contains(&file.path().display().to_string()));
        assert!(r.errors[1].message.contains("Invalid empty form"));
    }
}
