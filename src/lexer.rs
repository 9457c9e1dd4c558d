//! The Scheme lexer.
//!
//! Consumes code points from the UTF-8 decoder and produces tokens. The
//! lexer never fails: every malformed lexeme is reported once and replaced
//! with a best-effort token (or skipped), so the reader always sees a
//! well-formed token stream ending in `Eof`.
//!
//! Strings have C-like escapes and byte-string semantics; numbers support
//! `0x`/`0b` prefixes, `_` digit separators and hex floats; comments come
//! in three flavors (`;`, `//`, nested `/* */`). Nested comments are
//! scanned by re-entering the tokenizer with error reporting suppressed,
//! counting the internal comment-start/comment-end tokens.

use crate::coords::SourceCoords;
use crate::errors::ErrorReporter;
use crate::input::ByteInput;
use crate::symtab::SymbolTable;
use crate::token::{Token, TokenKind};
use crate::utf8::{self, Utf8Decoder, EOF_CHAR};
use std::rc::Rc;

const LF: i32 = b'\n' as i32;
const CR: i32 = b'\r' as i32;
const U_NEXT_LINE: i32 = 0x85;
const U_LINE_SEP: i32 = 0x2028;
const U_PARA_SEP: i32 = 0x2029;

pub struct Lexer<'a> {
    file_name: Option<Rc<str>>,
    symtab: &'a mut SymbolTable,
    errors: &'a mut ErrorReporter,
    decoder: Utf8Decoder,

    /// The current (already consumed) character, or [`EOF_CHAR`].
    cur: i32,

    in_nested_comment: bool,
    /// Set while scanning the interior of a nested comment; all lexer
    /// diagnostics are dropped until it is cleared again.
    suppress_errors: bool,

    line: u32,
    /// Decoder offset of the first character of the current line; columns
    /// are derived from it instead of being counted per character.
    line_offset: u64,
    /// Coordinates of the token being scanned.
    tok_coords: SourceCoords,

    /// Scratch collector for identifiers, strings and number literals.
    buf: Vec<u8>,
}

impl<'a> Lexer<'a> {
    pub fn new(
        input: ByteInput,
        file_name: Option<Rc<str>>,
        symtab: &'a mut SymbolTable,
        errors: &'a mut ErrorReporter,
    ) -> Self {
        let mut lexer = Lexer {
            file_name,
            symtab,
            errors,
            decoder: Utf8Decoder::new(input),
            cur: 0,
            in_nested_comment: false,
            suppress_errors: false,
            line: 1,
            line_offset: 0,
            tok_coords: SourceCoords::default(),
            buf: Vec::new(),
        };
        lexer.next_char();
        lexer
    }

    pub fn symtab(&mut self) -> &mut SymbolTable {
        self.symtab
    }

    /// Report a diagnostic on behalf of the reader.
    pub fn report(&mut self, coords: SourceCoords, message: impl Into<String>) {
        self.errors.error(coords, message);
    }

    // ------------------------------------------------------------------
    // Character input
    // ------------------------------------------------------------------

    /// Read the next character into `cur`, normalising all line endings
    /// (`CR`, `CR LF`, `U+0085`, `U+2028`, `U+2029`) to `LF` and tracking
    /// the line number and line start offset.
    fn next_char(&mut self) {
        self.drain_decoder_errors();
        let mut ch = self.decoder.get();

        match ch {
            CR => {
                if self.decoder.peek() == LF {
                    self.decoder.advance(1);
                }
                ch = LF;
                self.new_line();
            }
            U_NEXT_LINE | U_LINE_SEP | U_PARA_SEP => {
                ch = LF;
                self.new_line();
            }
            LF => self.new_line(),
            _ => {}
        }

        self.drain_decoder_errors();
        self.cur = ch;
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.line_offset = self.decoder.offset();
    }

    fn drain_decoder_errors(&mut self) {
        if self.suppress_errors {
            self.decoder.take_errors();
            return;
        }
        for e in self.decoder.take_errors() {
            let coords = SourceCoords::new(
                self.file_name.clone(),
                self.line,
                self.column_at(0),
            );
            self.errors
                .error(coords, format!("{} at offset {}", e.message, e.offset));
        }
    }

    fn column_at(&self, ofs: i64) -> u32 {
        let col = self.decoder.offset() as i64 - self.line_offset as i64 + ofs;
        col.max(0) as u32
    }

    /// Report at the current position, adjusted by `ofs` columns.
    fn error(&mut self, ofs: i64, message: impl Into<String>) {
        if self.suppress_errors {
            return;
        }
        let coords = SourceCoords::new(self.file_name.clone(), self.line, self.column_at(ofs));
        self.errors.error(coords, message);
    }

    /// Report at the start of the current token.
    fn error_tok(&mut self, message: impl Into<String>) {
        if self.suppress_errors {
            return;
        }
        let coords = self.tok_coords.clone();
        self.errors.error(coords, message);
    }

    fn save_coords(&mut self) {
        self.tok_coords =
            SourceCoords::new(self.file_name.clone(), self.line, self.column_at(0));
    }

    fn validate_code_point(&mut self, cp: i32) -> i32 {
        if !utf8::is_valid_code_point(cp as u32) {
            self.error(0, format!("Invalid Unicode character 0x{:04x}", cp));
            b' ' as i32
        } else {
            cp
        }
    }

    // ------------------------------------------------------------------
    // Character classes
    // ------------------------------------------------------------------

    fn is_whitespace(ch: i32) -> bool {
        matches!(ch, LF | 0x20 | 0x0C | 0x09 | 0x0B)
    }

    fn is_delimiter(ch: i32) -> bool {
        Self::is_whitespace(ch)
            || matches!(
                ch,
                x if x == b'(' as i32
                    || x == b')' as i32
                    || x == b'[' as i32
                    || x == b']' as i32
                    || x == b'"' as i32
                    || x == b';' as i32
                    || x == b'#' as i32
            )
            || ch == EOF_CHAR
    }

    fn is_alpha(ch: i32) -> bool {
        (ch >= b'a' as i32 && ch <= b'z' as i32) || (ch >= b'A' as i32 && ch <= b'Z' as i32)
    }

    fn is_digit(ch: i32) -> bool {
        ch >= b'0' as i32 && ch <= b'9' as i32
    }

    fn is_base_digit(base: u32, ch: i32) -> bool {
        match base {
            2 => ch == b'0' as i32 || ch == b'1' as i32,
            8 => ch >= b'0' as i32 && ch <= b'7' as i32,
            10 => Self::is_digit(ch),
            16 => {
                let lc = ch | 32;
                Self::is_digit(ch) || (lc >= b'a' as i32 && lc <= b'f' as i32)
            }
            _ => unreachable!(),
        }
    }

    /// Digit value in any of the supported bases.
    fn base_digit_to_int(ch: i32) -> u32 {
        let lc = ch | 32;
        if lc <= b'9' as i32 {
            (lc - b'0' as i32) as u32
        } else {
            (lc - (b'a' as i32 - 10)) as u32
        }
    }

    // ------------------------------------------------------------------
    // Tokenizer
    // ------------------------------------------------------------------

    pub fn next_token(&mut self) -> Token {
        let kind = self.scan_token();
        Token {
            kind,
            coords: self.tok_coords.clone(),
        }
    }

    fn scan_token(&mut self) -> TokenKind {
        loop {
            self.save_coords();
            match self.cur {
                EOF_CHAR => return TokenKind::Eof,

                x if x == b'(' as i32 => {
                    self.next_char();
                    return TokenKind::LPar;
                }
                x if x == b')' as i32 => {
                    self.next_char();
                    return TokenKind::RPar;
                }
                x if x == b'[' as i32 => {
                    self.next_char();
                    return TokenKind::LSquare;
                }
                x if x == b']' as i32 => {
                    self.next_char();
                    return TokenKind::RSquare;
                }
                x if x == b'\'' as i32 => {
                    self.next_char();
                    return TokenKind::Apostr;
                }
                x if x == b'`' as i32 => {
                    self.next_char();
                    return TokenKind::Accent;
                }

                // "*/" terminates a nested comment; elsewhere it is an
                // error, and a lone '*' starts an identifier.
                x if x == b'*' as i32 => {
                    self.next_char();
                    if self.cur == b'/' as i32 {
                        self.next_char();
                        if self.in_nested_comment {
                            return TokenKind::NestedCommentEnd;
                        }
                        self.error_tok("Unexpected */");
                    } else {
                        self.buf.clear();
                        self.buf.push(b'*');
                        return self.scan_remaining_identifier();
                    }
                }

                x if x == b',' as i32 => {
                    self.next_char();
                    if self.cur == b'@' as i32 {
                        self.next_char();
                        return TokenKind::CommaAt;
                    }
                    return TokenKind::Comma;
                }

                x if x == b'"' as i32 => {
                    self.next_char();
                    return self.scan_string();
                }

                x if x == b';' as i32 => {
                    self.skip_line_comment();
                }

                x if x == b'/' as i32 => {
                    self.next_char();
                    if self.cur == b'/' as i32 {
                        self.skip_line_comment();
                    } else if self.cur == b'*' as i32 {
                        self.next_char();
                        if self.in_nested_comment {
                            return TokenKind::NestedCommentStart;
                        }
                        self.scan_nested_comment();
                    } else {
                        self.buf.clear();
                        self.buf.push(b'/');
                        return self.scan_remaining_identifier();
                    }
                }

                x if Self::is_digit(x) => return self.scan_number(NumStart::Digit),

                x if x == b'#' as i32 => {
                    self.next_char();
                    match self.cur {
                        c if c == b';' as i32 => {
                            self.next_char();
                            return TokenKind::DatumComment;
                        }
                        c if c == b'(' as i32 => {
                            self.next_char();
                            return TokenKind::HashLPar;
                        }
                        c if c == b'\'' as i32 => {
                            self.next_char();
                            return TokenKind::HashApostr;
                        }
                        c if c == b'`' as i32 => {
                            self.next_char();
                            return TokenKind::HashAccent;
                        }
                        c if c == b',' as i32 => {
                            self.next_char();
                            if self.cur == b'@' as i32 {
                                self.next_char();
                                return TokenKind::HashCommaAt;
                            }
                            return TokenKind::HashComma;
                        }
                        c if (c | 32) == b't' as i32 => {
                            self.next_char();
                            if !Self::is_delimiter(self.cur) {
                                self.error(0, "Bad #x form");
                            }
                            return TokenKind::Bool(true);
                        }
                        c if (c | 32) == b'f' as i32 => {
                            self.next_char();
                            if !Self::is_delimiter(self.cur) {
                                self.error(0, "Bad #x form");
                            }
                            return TokenKind::Bool(false);
                        }
                        c if c == b'"' as i32 => {
                            self.next_char();
                            return self.scan_character_constant();
                        }
                        _ => {
                            let lexeme =
                                format!("#{}", escape_code_point(self.cur));
                            self.error_tok(format!("Illegal lexeme \"{}\"", lexeme));
                            self.next_char();
                        }
                    }
                }

                // <special initial>
                x if matches!(
                    x as u8 as char,
                    '!' | '$' | '%' | '&' | ':' | '<' | '=' | '>' | '?' | '^' | '_' | '~' | '|'
                ) && x < 128 =>
                {
                    self.buf.clear();
                    self.buf.push(x as u8);
                    self.next_char();
                    return self.scan_remaining_identifier();
                }

                // '+' starts a number when followed by a digit or '.'
                x if x == b'+' as i32 => {
                    self.next_char();
                    if Self::is_digit(self.cur) || self.cur == b'.' as i32 {
                        return self.scan_number(NumStart::Plus);
                    }
                    self.buf.clear();
                    self.buf.push(b'+');
                    return self.scan_remaining_identifier();
                }

                x if x == b'-' as i32 => {
                    self.next_char();
                    if Self::is_digit(self.cur) || self.cur == b'.' as i32 {
                        return self.scan_number(NumStart::Minus);
                    }
                    self.buf.clear();
                    self.buf.push(b'-');
                    return self.scan_remaining_identifier();
                }

                // '.' is the dot token before a delimiter, a number before
                // a digit, and an identifier otherwise.
                x if x == b'.' as i32 => {
                    self.next_char();
                    if Self::is_delimiter(self.cur) {
                        return TokenKind::Dot;
                    }
                    if Self::is_digit(self.cur) {
                        return self.scan_number(NumStart::Dot);
                    }
                    self.buf.clear();
                    self.buf.push(b'.');
                    return self.scan_remaining_identifier();
                }

                // <inline hex escape> starts an identifier
                x if x == b'\\' as i32 => {
                    self.buf.clear();
                    return self.scan_remaining_identifier();
                }

                x if Self::is_whitespace(x) => {
                    while Self::is_whitespace(self.cur) {
                        self.next_char();
                    }
                }

                x if Self::is_alpha(x) => {
                    self.buf.clear();
                    utf8::push_utf8(&mut self.buf, x as u32);
                    self.next_char();
                    return self.scan_remaining_identifier();
                }

                x => {
                    self.error(
                        0,
                        format!("\"{}\" cannot start a lexeme", escape_code_point(x)),
                    );
                    self.next_char();
                }
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while self.cur != EOF_CHAR && self.cur != LF {
            self.next_char();
        }
    }

    /// Scan the interior of a `/* ... */` comment by re-entering the
    /// tokenizer with diagnostics suppressed, so strings and identifiers
    /// inside the comment cannot confuse the nesting count.
    fn scan_nested_comment(&mut self) {
        let start = self.tok_coords.clone();
        debug_assert!(!self.in_nested_comment);

        let saved_suppress = self.suppress_errors;
        self.suppress_errors = true;
        self.in_nested_comment = true;

        let mut level = 1u32;
        let at_eof = loop {
            match self.next_token().kind {
                TokenKind::NestedCommentStart => level += 1,
                TokenKind::NestedCommentEnd => {
                    level -= 1;
                    if level == 0 {
                        break false;
                    }
                }
                TokenKind::Eof => break true,
                _ => {}
            }
        };

        self.suppress_errors = saved_suppress;
        self.in_nested_comment = false;

        if at_eof {
            self.error(0, format!("EOF in comment started on line {}", start.line));
        }
    }

    // ------------------------------------------------------------------
    // Strings and character constants
    // ------------------------------------------------------------------

    /// `#"X"` yields the integer value of the single character.
    fn scan_character_constant(&mut self) -> TokenKind {
        if self.cur == b'"' as i32 {
            self.error(0, "Invalid empty character constant");
            self.next_char();
            return TokenKind::Integer(b' ' as i64);
        }

        let value = match self.scan_single_character() {
            CharScan::Byte(b) => b as i32,
            CharScan::Cp(cp) => cp,
            CharScan::Err => b' ' as i32,
            CharScan::Eof => return TokenKind::Integer(b' ' as i64),
        };

        if self.cur != b'"' as i32 {
            self.error(0, "Character constant not closed");
        } else {
            self.next_char();
            if !Self::is_delimiter(self.cur) {
                self.error(0, "Character constant not followed by a delimiter");
            }
        }

        TokenKind::Integer(value as i64)
    }

    fn scan_string(&mut self) -> TokenKind {
        self.buf.clear();

        loop {
            if self.cur == b'"' as i32 {
                self.next_char();
                break;
            }
            match self.scan_single_character() {
                CharScan::Byte(b) => self.buf.push(b),
                CharScan::Cp(cp) => utf8::push_utf8(&mut self.buf, cp as u32),
                CharScan::Eof => break,
                CharScan::Err => {}
            }
        }

        if !Self::is_delimiter(self.cur) {
            self.error(0, "String not followed by a delimiter");
        }

        TokenKind::Str(Rc::from(self.buf.as_slice()))
    }

    /// Scan one string-body character or escape.
    ///
    /// `Byte` is a raw 8-bit value from an octal or `\x` escape; `Cp` is a
    /// validated code point to be UTF-8 encoded; `Eof` means the string is
    /// unterminated and scanning must stop.
    fn scan_single_character(&mut self) -> CharScan {
        loop {
            if self.cur < 0 {
                let msg = format!(
                    "Unterminated string constant at end of input. String started on line {} column {}",
                    self.tok_coords.line, self.tok_coords.column
                );
                self.error(0, msg);
                return CharScan::Eof;
            }
            if self.cur == LF {
                self.error_tok("Unterminated string constant");
                return CharScan::Eof;
            }
            if self.cur != b'\\' as i32 {
                let v = self.cur;
                self.next_char();
                return CharScan::Cp(v);
            }

            self.next_char();
            match self.cur {
                EOF_CHAR => {
                    let msg = format!(
                        "Unterminated string escape at end of input. String started on line {} column {}",
                        self.tok_coords.line, self.tok_coords.column
                    );
                    self.error(0, msg);
                    return CharScan::Eof;
                }
                c if c == b'a' as i32 => {
                    self.next_char();
                    return CharScan::Byte(0x07);
                }
                c if c == b'b' as i32 => {
                    self.next_char();
                    return CharScan::Byte(0x08);
                }
                c if c == b't' as i32 => {
                    self.next_char();
                    return CharScan::Byte(b'\t');
                }
                c if c == b'n' as i32 => {
                    self.next_char();
                    return CharScan::Byte(b'\n');
                }
                c if c == b'v' as i32 => {
                    self.next_char();
                    return CharScan::Byte(0x0B);
                }
                c if c == b'f' as i32 => {
                    self.next_char();
                    return CharScan::Byte(0x0C);
                }
                c if c == b'r' as i32 => {
                    self.next_char();
                    return CharScan::Byte(b'\r');
                }
                c if c == b'"' as i32 => {
                    self.next_char();
                    return CharScan::Byte(b'"');
                }
                c if c == b'\\' as i32 => {
                    self.next_char();
                    return CharScan::Byte(b'\\');
                }
                c if (b'0' as i32..=b'7' as i32).contains(&c) => {
                    return CharScan::Byte(self.scan_octal_escape());
                }
                c if c == b'x' as i32 => {
                    self.next_char();
                    return CharScan::Byte(self.scan_hex_escape());
                }
                c if c == b'u' as i32 => {
                    self.next_char();
                    return CharScan::Cp(self.scan_unicode_escape(4));
                }
                c if c == b'U' as i32 => {
                    self.next_char();
                    return CharScan::Cp(self.scan_unicode_escape(8));
                }
                _ => {
                    // '\' <intraline whitespace> LF <whitespace> folds away
                    while self.cur != LF && Self::is_whitespace(self.cur) {
                        self.next_char();
                    }
                    if self.cur == LF {
                        self.next_char();
                        continue;
                    }
                    if self.cur == EOF_CHAR {
                        let msg = format!(
                            "Unterminated string escape at end of input. String started on line {} column {}",
                            self.tok_coords.line, self.tok_coords.column
                        );
                        self.error(0, msg);
                        return CharScan::Eof;
                    }
                    let msg = format!("Invalid string escape \\{}", escape_code_point(self.cur));
                    self.error(0, msg);
                    self.next_char();
                    return CharScan::Err;
                }
            }
        }
    }

    /// After `\u`/`\U`: exactly `len` hex digits forming a valid code
    /// point. At most eight digits, so the accumulator cannot overflow.
    /// Recovery value is a space.
    fn scan_unicode_escape(&mut self, len: u32) -> i32 {
        let mut result: u32 = 0;
        for _ in 0..len {
            if !Self::is_base_digit(16, self.cur) {
                self.error(0, "Invalid Unicode escape");
                return b' ' as i32;
            }
            result = (result << 4) + Self::base_digit_to_int(self.cur);
            self.next_char();
        }
        self.validate_code_point(result as i32)
    }

    /// After `\x`: exactly two hex digits forming a byte.
    fn scan_hex_escape(&mut self) -> u8 {
        if !Self::is_base_digit(16, self.cur) {
            self.error(0, "Invalid hex escape");
            return b' ';
        }
        let mut res = (Self::base_digit_to_int(self.cur) << 4) as u8;
        self.next_char();
        if !Self::is_base_digit(16, self.cur) {
            self.error(0, "Invalid hex escape");
            return b' ';
        }
        res |= Self::base_digit_to_int(self.cur) as u8;
        self.next_char();
        res
    }

    /// One to three octal digits; the first is already current.
    fn scan_octal_escape(&mut self) -> u8 {
        let mut res: u32 = 0;
        let mut count = 0;
        loop {
            res = (res << 3) + Self::base_digit_to_int(self.cur);
            self.next_char();
            count += 1;
            if count == 3 || !(b'0' as i32..=b'7' as i32).contains(&self.cur) {
                break;
            }
        }
        res as u8
    }

    // ------------------------------------------------------------------
    // Identifiers
    // ------------------------------------------------------------------

    fn scan_remaining_identifier(&mut self) -> TokenKind {
        loop {
            match self.cur {
                x if Self::is_digit(x)
                    || matches!(
                        x as u8 as char,
                        '+' | '-'
                            | '.'
                            | '@'
                            | '!'
                            | '$'
                            | '%'
                            | '&'
                            | '/'
                            | ':'
                            | '<'
                            | '='
                            | '>'
                            | '?'
                            | '^'
                            | '_'
                            | '~'
                            | '|'
                    ) && x < 128 =>
                {
                    self.buf.push(x as u8);
                    self.next_char();
                }

                x if x == b'*' as i32 => {
                    self.next_char();
                    if self.cur != b'/' as i32 {
                        self.buf.push(b'*');
                    } else {
                        self.next_char();
                        if self.in_nested_comment {
                            return TokenKind::NestedCommentEnd;
                        }
                        self.error_tok("Unexpected */");
                    }
                }

                x if x == b'\\' as i32 => {
                    self.next_char();
                    if self.cur == b'u' as i32 {
                        self.next_char();
                        let cp = self.scan_unicode_escape(4);
                        utf8::push_utf8(&mut self.buf, cp as u32);
                    } else if self.cur == b'U' as i32 {
                        self.next_char();
                        let cp = self.scan_unicode_escape(8);
                        utf8::push_utf8(&mut self.buf, cp as u32);
                    } else {
                        // Leave the character for the next iteration.
                        self.error(0, "Invalid escape in an identifier");
                    }
                }

                x if Self::is_alpha(x) => {
                    utf8::push_utf8(&mut self.buf, x as u32);
                    self.next_char();
                }

                _ => break,
            }
        }

        let name = String::from_utf8_lossy(&self.buf).into_owned();

        if !Self::is_delimiter(self.cur) {
            self.error(
                0,
                format!("Identifier \"{}\" not terminated by a delimiter", name),
            );
        }

        TokenKind::Symbol(self.symtab.intern(&name))
    }

    // ------------------------------------------------------------------
    // Numbers
    // ------------------------------------------------------------------

    fn scan_number(&mut self, start: NumStart) -> TokenKind {
        let mut base: u32 = 10;
        let mut real = false;
        let mut err = false;
        let mut nnum = false; // have we seen digits?
        let mut expo = false;

        self.buf.clear();
        if start == NumStart::Minus {
            self.buf.push(b'-');
        }

        let mut had_dot = start == NumStart::Dot;

        if !had_dot {
            if Self::is_digit(self.cur) {
                if self.cur == b'0' as i32 {
                    self.next_char();
                    if (self.cur | 32) == b'x' as i32 {
                        self.next_char();
                        base = 16;
                    } else if (self.cur | 32) == b'b' as i32 {
                        self.next_char();
                        base = 2;
                    } else {
                        nnum = true;
                        self.buf.push(b'0');
                        if !err && (b'0' as i32..=b'7' as i32).contains(&self.cur) {
                            err = true;
                            self.error(-1, "C-style octal numbers are not supported");
                        }
                    }
                }
                nnum |= self.scan_uint(base);
            }

            if self.cur == b'.' as i32 {
                self.next_char();
                had_dot = true;
            }
        }

        if had_dot {
            self.buf.push(b'.');
            real = true;

            if !err && base != 10 && base != 16 {
                err = true;
                self.error_tok("Invalid floating point constant");
            }
            // Reject digit-free forms like "+.e10".
            let frac = self.scan_uint(base);
            if !frac && !nnum && !err {
                err = true;
                self.error_tok("Invalid floating point constant");
            }
        } else if !err && !nnum {
            err = true;
            self.error_tok("Invalid numeric constant");
        }

        if (self.cur | 32) == b'e' as i32 {
            real = true;
            expo = true;
            if !err && base != 10 {
                err = true;
                self.error_tok("Invalid decimal floating point number");
            }
            self.buf.push(b'e');
            self.next_char();
            if self.cur == b'+' as i32 {
                self.next_char();
            } else if self.cur == b'-' as i32 {
                self.buf.push(b'-');
                self.next_char();
            }
            self.scan_uint(10);
        } else if (self.cur | 32) == b'p' as i32 {
            real = true;
            expo = true;
            if !err && base != 16 {
                err = true;
                self.error_tok("Invalid hexadecimal floating point constant");
            }
            self.buf.push(b'p');
            self.next_char();
            if self.cur == b'+' as i32 {
                self.next_char();
            } else if self.cur == b'-' as i32 {
                self.buf.push(b'-');
                self.next_char();
            }
            self.scan_uint(10);
        }

        if !err && real && base == 16 && !expo {
            err = true;
            self.error_tok("Exponent required in hexadecimal floating point constant");
        }

        if !err && !Self::is_delimiter(self.cur) {
            err = true;
            self.error_tok("Invalid number");
        }

        let text = String::from_utf8_lossy(&self.buf).into_owned();

        if !real {
            let mut value = 0i64;
            if !err {
                match i64::from_str_radix(&text, base) {
                    Ok(v) => value = v,
                    Err(_) => {
                        self.error_tok("Integer constant overflow");
                        err = true;
                    }
                }
            }
            TokenKind::Integer(if err { 0 } else { value })
        } else {
            let mut value = f64::NAN;
            if !err {
                let parsed = if base == 16 {
                    parse_hex_float(&text)
                } else {
                    text.parse::<f64>().ok()
                };
                match parsed {
                    Some(v) if v.is_finite() => value = v,
                    _ => {
                        self.error_tok("Floating point constant overflow");
                        err = true;
                    }
                }
            }
            TokenKind::Real(if err { f64::NAN } else { value })
        }
    }

    /// Scan digits of `base` into the collector, skipping `_` separators.
    /// Returns whether any digit was seen.
    fn scan_uint(&mut self, base: u32) -> bool {
        let mut nnum = false;
        loop {
            if self.cur == b'_' as i32 {
                self.next_char();
            } else if Self::is_base_digit(base, self.cur) {
                nnum = true;
                self.buf.push(self.cur as u8);
                self.next_char();
            } else {
                break;
            }
        }
        nnum
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NumStart {
    /// After a consumed '+'.
    Plus,
    /// After a consumed '-'.
    Minus,
    /// At the first digit.
    Digit,
    /// After a consumed '.'.
    Dot,
}

enum CharScan {
    Eof,
    Err,
    Byte(u8),
    Cp(i32),
}

/// Mantissa and binary exponent of a hex float, e.g. `1f.8p-2`.
/// The lexer has already validated the shape; the sign and `0x` prefix are
/// not part of the buffer's mantissa.
fn parse_hex_float(text: &str) -> Option<f64> {
    let (text, neg) = match text.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (text, false),
    };
    let (mantissa, exp_text) = text.split_once(['p', 'P'])?;
    let exp: i32 = if exp_text.is_empty() {
        0
    } else {
        exp_text.parse().ok()?
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa, ""),
    };

    let mut value = 0.0f64;
    for c in int_part.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += c.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }

    let value = value * 2.0f64.powi(exp);
    Some(if neg { -value } else { value })
}

/// Printable form of a code point for diagnostics.
fn escape_code_point(ch: i32) -> String {
    match ch {
        0x20..=0x7E => (ch as u8 as char).to_string(),
        0x07 => "\\a".to_string(),
        0x08 => "\\b".to_string(),
        0x09 => "\\t".to_string(),
        0x0A => "\\n".to_string(),
        0x0B => "\\v".to_string(),
        0x0C => "\\f".to_string(),
        0x0D => "\\r".to_string(),
        _ if ch >= 0 && utf8::is_valid_code_point(ch as u32) => {
            if ch <= 0xFFFF {
                format!("\\u{:04x}", ch)
            } else {
                format!("\\U{:08x}", ch)
            }
        }
        _ => format!("\\x{:x}", ch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        symtab: SymbolTable,
        errors: ErrorReporter,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                symtab: SymbolTable::new(),
                errors: ErrorReporter::new(),
            }
        }

        fn lexer<'a>(&'a mut self, text: &str) -> Lexer<'a> {
            Lexer::new(
                ByteInput::from_str(text),
                Some("input".into()),
                &mut self.symtab,
                &mut self.errors,
            )
        }
    }

    fn tokens_of(text: &str) -> (Vec<TokenKind>, usize) {
        let mut fx = Fixture::new();
        let mut lex = fx.lexer(text);
        let mut out = Vec::new();
        loop {
            let tok = lex.next_token();
            let eof = tok.kind.is_eof();
            out.push(tok.kind);
            if eof {
                break;
            }
        }
        drop(lex);
        (out, fx.errors.error_count())
    }

    fn single_token(text: &str) -> (TokenKind, usize) {
        let (toks, errs) = tokens_of(text);
        assert_eq!(toks.len(), 2, "expected one token from {:?}: {:?}", text, toks);
        (toks[0].clone(), errs)
    }

    fn str_token(text: &str) -> (Vec<u8>, usize) {
        match single_token(text) {
            (TokenKind::Str(s), errs) => (s.to_vec(), errs),
            (other, _) => panic!("expected a string token, got {:?}", other),
        }
    }

    #[test]
    fn test_punctuation() {
        let (toks, errs) = tokens_of("( ) [ ] ' ` , ,@ #( #' #` #, #,@ #;");
        assert_eq!(errs, 0);
        assert_eq!(
            toks,
            vec![
                TokenKind::LPar,
                TokenKind::RPar,
                TokenKind::LSquare,
                TokenKind::RSquare,
                TokenKind::Apostr,
                TokenKind::Accent,
                TokenKind::Comma,
                TokenKind::CommaAt,
                TokenKind::HashLPar,
                TokenKind::HashApostr,
                TokenKind::HashAccent,
                TokenKind::HashComma,
                TokenKind::HashCommaAt,
                TokenKind::DatumComment,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_booleans() {
        assert_eq!(single_token("#t"), (TokenKind::Bool(true), 0));
        assert_eq!(single_token("#F"), (TokenKind::Bool(false), 0));
        // Not delimiter-terminated: reported, token still produced.
        let (toks, errs) = tokens_of("#tq");
        assert_eq!(toks[0], TokenKind::Bool(true));
        assert!(errs >= 1);
    }

    #[test]
    fn test_string_escapes() {
        let (bytes, errs) = str_token("\"\\a\\b\\t\\n\\v\\f\\r\\\"\\\\\"");
        assert_eq!(errs, 0);
        assert_eq!(bytes, b"\x07\x08\t\n\x0B\x0C\r\"\\");
    }

    #[test]
    fn test_string_octal_and_hex_escapes() {
        assert_eq!(str_token("\"\\1\""), (vec![0o1], 0));
        assert_eq!(str_token("\"\\12\""), (vec![0o12], 0));
        assert_eq!(str_token("\"\\123\""), (vec![0o123], 0));
        // Three digits max; the fourth is a plain character.
        assert_eq!(str_token("\"\\1234\""), (vec![0o123, b'4'], 0));
        assert_eq!(str_token("\"\\x12\""), (vec![0x12], 0));
        // Bad escapes are reported but scanning continues.
        assert_eq!(str_token("\"\\8\"").1, 1);
        assert_eq!(str_token("\"\\xt\"").1, 1);
        assert_eq!(str_token("\"\\x0t\"").1, 1);
    }

    #[test]
    fn test_string_unicode_escapes() {
        assert_eq!(str_token("\"\\u0009\""), (vec![9], 0));
        assert_eq!(str_token("\"\\U00000009\""), (vec![9], 0));
        let (bytes, errs) = str_token("\"\\u20ac\"");
        assert_eq!(errs, 0);
        assert_eq!(bytes, "\u{20ac}".as_bytes());
        // Out-of-range and short escapes are reported.
        assert_eq!(str_token("\"\\U0011FFFF\"").1, 1);
        assert_eq!(str_token("\"\\ut\"").1, 1);
        assert_eq!(str_token("\"\\u000t\"").1, 1);
    }

    #[test]
    fn test_string_line_continuation() {
        assert_eq!(str_token("\"aaa\\\nbbb\""), (b"aaabbb".to_vec(), 0));
        assert_eq!(str_token("\"aaa\\  \nccc\""), (b"aaaccc".to_vec(), 0));
    }

    #[test]
    fn test_unterminated_strings() {
        // Raw newline inside a string.
        let (toks, errs) = tokens_of("\"aaa\nbbb\"");
        assert!(matches!(toks[0], TokenKind::Str(_)));
        assert!(errs >= 1);
        // EOF inside a string, and EOF inside an escape.
        assert!(str_token("\"aaa").1 >= 1);
        assert!(str_token("\"aa\\").1 >= 1);
    }

    #[test]
    fn test_character_constants() {
        assert_eq!(single_token("#\"A\""), (TokenKind::Integer(65), 0));
        assert_eq!(single_token("#\"\\n\""), (TokenKind::Integer(10), 0));
        assert_eq!(single_token("#\"\\x41\""), (TokenKind::Integer(0x41), 0));
        let (tok, errs) = single_token("#\"\"");
        assert_eq!(tok, TokenKind::Integer(b' ' as i64));
        assert_eq!(errs, 1);
    }

    #[test]
    fn test_integers() {
        assert_eq!(single_token("0"), (TokenKind::Integer(0), 0));
        assert_eq!(single_token("1234"), (TokenKind::Integer(1234), 0));
        assert_eq!(single_token("-42"), (TokenKind::Integer(-42), 0));
        assert_eq!(single_token("+42"), (TokenKind::Integer(42), 0));
        assert_eq!(single_token("0xff"), (TokenKind::Integer(255), 0));
        assert_eq!(single_token("-0x10"), (TokenKind::Integer(-16), 0));
        assert_eq!(single_token("0b101"), (TokenKind::Integer(5), 0));
        assert_eq!(single_token("1_000_000"), (TokenKind::Integer(1000000), 0));
    }

    #[test]
    fn test_integer_boundaries() {
        assert_eq!(
            single_token("9223372036854775807"),
            (TokenKind::Integer(i64::MAX), 0)
        );
        let (tok, errs) = single_token("9223372036854775808");
        assert_eq!(tok, TokenKind::Integer(0));
        assert_eq!(errs, 1);
    }

    #[test]
    fn test_c_octal_rejected_with_one_error() {
        let (tok, errs) = single_token("01");
        assert_eq!(errs, 1);
        assert!(matches!(tok, TokenKind::Integer(_)));
    }

    #[test]
    fn test_reals() {
        assert_eq!(single_token("1.5"), (TokenKind::Real(1.5), 0));
        assert_eq!(single_token(".5"), (TokenKind::Real(0.5), 0));
        assert_eq!(single_token("-.5"), (TokenKind::Real(-0.5), 0));
        assert_eq!(single_token("2."), (TokenKind::Real(2.0), 0));
        assert_eq!(single_token("1e3"), (TokenKind::Real(1000.0), 0));
        assert_eq!(single_token("1.5e-2"), (TokenKind::Real(0.015), 0));
        assert_eq!(single_token("2e2"), (TokenKind::Real(200.0), 0));
    }

    #[test]
    fn test_hex_floats() {
        assert_eq!(single_token("0x1.0p2"), (TokenKind::Real(4.0), 0));
        assert_eq!(single_token("0x1.8p1"), (TokenKind::Real(3.0), 0));
        assert_eq!(single_token("0xfp0"), (TokenKind::Real(15.0), 0));
        assert_eq!(single_token("-0x1.0p-1"), (TokenKind::Real(-0.5), 0));
        // Hex float without an exponent is rejected.
        let (_, errs) = single_token("0x1.0");
        assert_eq!(errs, 1);
        // "0xp2" has no mantissa digits.
        let (_, errs) = single_token("0xp2");
        assert_eq!(errs, 1);
    }

    #[test]
    fn test_identifiers() {
        let mut fx = Fixture::new();
        let mut lex = fx.lexer("foo set! <=? a->b ... + - -> / * list@2");
        let mut names = Vec::new();
        loop {
            let tok = lex.next_token();
            match tok.kind {
                TokenKind::Symbol(sym) => names.push(lex.symtab().symbol_name(sym).to_string()),
                TokenKind::Eof => break,
                other => panic!("unexpected token {:?}", other),
            }
        }
        drop(lex);
        assert_eq!(fx.errors.error_count(), 0);
        assert_eq!(
            names,
            vec!["foo", "set!", "<=?", "a->b", "...", "+", "-", "->", "/", "*", "list@2"]
        );
    }

    #[test]
    fn test_identifier_interning_is_shared() {
        let (toks, errs) = tokens_of("abc abc");
        assert_eq!(errs, 0);
        assert_eq!(toks[0], toks[1]);
    }

    #[test]
    fn test_identifier_unicode_escape() {
        let mut fx = Fixture::new();
        let mut lex = fx.lexer("a\\u0062c");
        let tok = lex.next_token();
        match tok.kind {
            TokenKind::Symbol(sym) => assert_eq!(lex.symtab().symbol_name(sym), "abc"),
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn test_dot_disambiguation() {
        let (toks, errs) = tokens_of(". .5 .x");
        assert_eq!(errs, 0);
        assert_eq!(toks[0], TokenKind::Dot);
        assert_eq!(toks[1], TokenKind::Real(0.5));
        assert!(matches!(toks[2], TokenKind::Symbol(_)));
    }

    #[test]
    fn test_line_comments() {
        let (toks, errs) = tokens_of("1 ; comment , (\n2 // another\n3");
        assert_eq!(errs, 0);
        assert_eq!(
            toks,
            vec![
                TokenKind::Integer(1),
                TokenKind::Integer(2),
                TokenKind::Integer(3),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_nested_comments() {
        let (toks, errs) = tokens_of("1 /* aaa */ 2 /* a /* b */ c */ 3");
        assert_eq!(errs, 0);
        assert_eq!(
            toks,
            vec![
                TokenKind::Integer(1),
                TokenKind::Integer(2),
                TokenKind::Integer(3),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_nested_comment_hides_strings_and_garbage() {
        // The unterminated string and bad lexemes inside the comment are
        // suppressed; the comment still terminates correctly.
        let (toks, errs) = tokens_of("/*  \"*/\" () */,@ 7");
        assert_eq!(errs, 0);
        assert_eq!(
            toks,
            vec![TokenKind::CommaAt, TokenKind::Integer(7), TokenKind::Eof]
        );
    }

    #[test]
    fn test_eof_in_nested_comment() {
        let mut fx = Fixture::new();
        let mut lex = fx.lexer("1 /* never closed");
        assert_eq!(lex.next_token().kind, TokenKind::Integer(1));
        assert_eq!(lex.next_token().kind, TokenKind::Eof);
        drop(lex);
        assert_eq!(fx.errors.error_count(), 1);
        assert!(fx.errors.errors()[0]
            .message
            .contains("EOF in comment started on line 1"));
    }

    #[test]
    fn test_stray_comment_close() {
        let (toks, errs) = tokens_of("*/ 1");
        assert_eq!(errs, 1);
        assert_eq!(toks, vec![TokenKind::Integer(1), TokenKind::Eof]);
    }

    #[test]
    fn test_line_ending_normalisation() {
        // Every form of line ending advances the line count by one.
        for ending in ["\n", "\r", "\r\n", "\u{0085}", "\u{2028}", "\u{2029}"] {
            let mut fx = Fixture::new();
            let text = format!("a{}b", ending);
            let mut lex = fx.lexer(&text);
            let t1 = lex.next_token();
            let t2 = lex.next_token();
            assert_eq!(t1.coords.line, 1, "ending {:?}", ending);
            assert_eq!(t2.coords.line, 2, "ending {:?}", ending);
            drop(lex);
            assert_eq!(fx.errors.error_count(), 0);
        }
    }

    #[test]
    fn test_token_coords() {
        let mut fx = Fixture::new();
        let mut lex = fx.lexer("ab cd\n  ef");
        let t1 = lex.next_token();
        assert_eq!((t1.coords.line, t1.coords.column), (1, 1));
        let t2 = lex.next_token();
        assert_eq!((t2.coords.line, t2.coords.column), (1, 4));
        let t3 = lex.next_token();
        assert_eq!((t3.coords.line, t3.coords.column), (2, 3));
    }

    #[test]
    fn test_bad_utf8_is_reported_and_skipped() {
        let mut fx = Fixture::new();
        let mut lex = Lexer::new(
            ByteInput::new(vec![b'a', 0xFF, b'b']),
            None,
            &mut fx.symtab,
            &mut fx.errors,
        );
        // The replacement character cannot start a lexeme, so the token
        // stream is "ab"-less-the-garbage: one identifier "a", one "b".
        let t1 = lex.next_token();
        assert!(matches!(t1.kind, TokenKind::Symbol(_)));
        let t2 = lex.next_token();
        assert!(matches!(t2.kind, TokenKind::Symbol(_)));
        assert_eq!(lex.next_token().kind, TokenKind::Eof);
        drop(lex);
        // The decoder diagnostic, "a" not delimiter-terminated (U+FFFD is
        // not a delimiter), and "cannot start a lexeme" for the U+FFFD.
        assert_eq!(fx.errors.error_count(), 3);
        assert!(fx.errors.errors()[0].message.contains("lead byte"));
    }

    #[test]
    fn test_invalid_char_reported_once_per_occurrence() {
        let (toks, errs) = tokens_of("{ 1 }");
        assert_eq!(errs, 2);
        assert_eq!(toks, vec![TokenKind::Integer(1), TokenKind::Eof]);
    }

    #[test]
    fn test_illegal_hash_form() {
        let (toks, errs) = tokens_of("#z 1");
        assert_eq!(errs, 1);
        assert_eq!(toks, vec![TokenKind::Integer(1), TokenKind::Eof]);
    }
}
