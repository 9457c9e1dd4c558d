//! Token stream → syntax datums.
//!
//! `parse_datum` returns one top-level datum per call, an `Eof` node at
//! end of input. Recovery works on terminator sets: when a stray token
//! shows up, it is reported once per contiguous run and either skipped or,
//! if the enclosing context is waiting for exactly that token, turned into
//! a `Nil` so the context can close.

use crate::coords::SourceCoords;
use crate::lexer::Lexer;
use crate::symtab::{Keywords, SymbolId};
use crate::syntax::{ListBuilder, Syntax, SyntaxRef};
use crate::token::{Token, TokenKind};

/// Bit set over token kinds, for terminator tracking.
#[derive(Debug, Clone, Copy)]
struct TermSet(u32);

impl TermSet {
    const EMPTY: TermSet = TermSet(0);

    fn add(self, kind: &TokenKind) -> TermSet {
        TermSet(self.0 | 1 << kind.code())
    }

    fn contains(self, kind: &TokenKind) -> bool {
        self.0 & 1 << kind.code() != 0
    }
}

pub struct SyntaxReader<'r, 'l> {
    lex: &'r mut Lexer<'l>,
    kw: &'r Keywords,
    tok: Token,
}

impl<'r, 'l> SyntaxReader<'r, 'l> {
    pub fn new(lex: &'r mut Lexer<'l>, kw: &'r Keywords) -> Self {
        let tok = lex.next_token();
        SyntaxReader { lex, kw, tok }
    }

    /// Read the next top-level datum, skipping `#;` comments.
    pub fn parse_datum(&mut self) -> SyntaxRef {
        self.read_skip_datum_comments(TermSet::EMPTY.add(&TokenKind::Eof))
    }

    fn next(&mut self) {
        self.tok = self.lex.next_token();
    }

    fn error(&mut self, message: impl Into<String>) {
        let coords = self.tok.coords.clone();
        self.lex.report(coords, message);
    }

    fn read_skip_datum_comments(&mut self, term_set: TermSet) -> SyntaxRef {
        loop {
            let res = self.read(term_set);
            if !res.is_comment() {
                return res;
            }
        }
    }

    fn read(&mut self, term_set: TermSet) -> SyntaxRef {
        let mut in_error = false;

        loop {
            let coords = self.tok.coords.clone();
            match self.tok.kind.clone() {
                TokenKind::Eof => return Syntax::eof(),

                TokenKind::Bool(v) => {
                    self.next();
                    return Syntax::boolean(coords, v);
                }
                TokenKind::Integer(v) => {
                    self.next();
                    return Syntax::integer(coords, v);
                }
                TokenKind::Real(v) => {
                    self.next();
                    return Syntax::real(coords, v);
                }
                TokenKind::Str(s) => {
                    self.next();
                    return Syntax::string(coords, s);
                }
                TokenKind::Symbol(sym) => {
                    self.next();
                    return Syntax::symbol(coords, sym);
                }

                TokenKind::LPar => {
                    self.next();
                    return self.list(coords, TokenKind::RPar, term_set);
                }
                TokenKind::LSquare => {
                    self.next();
                    return self.list(coords, TokenKind::RSquare, term_set);
                }
                TokenKind::HashLPar => {
                    self.next();
                    return self.vector(coords, TokenKind::RPar, term_set);
                }

                TokenKind::Apostr => return self.abbrev(self.kw.quote, term_set),
                TokenKind::Accent => return self.abbrev(self.kw.quasiquote, term_set),
                TokenKind::Comma => return self.abbrev(self.kw.unquote, term_set),
                TokenKind::CommaAt => return self.abbrev(self.kw.unquote_splicing, term_set),
                TokenKind::HashApostr => return self.abbrev(self.kw.syntax, term_set),
                TokenKind::HashAccent => return self.abbrev(self.kw.quasisyntax, term_set),
                TokenKind::HashComma => return self.abbrev(self.kw.unsyntax, term_set),
                TokenKind::HashCommaAt => {
                    return self.abbrev(self.kw.unsyntax_splicing, term_set)
                }

                TokenKind::DatumComment => {
                    self.next();
                    // Read and discard the commented-out datum.
                    self.read(term_set);
                    return Syntax::comment();
                }

                kind => {
                    // Stray '.', ')', ']' and friends: report the first of
                    // a run, then either close the context or skip.
                    if !in_error {
                        self.error(format!("'{}' isn't allowed here", kind.repr()));
                        in_error = true;
                    }
                    if term_set.contains(&kind) {
                        return Syntax::nil(coords);
                    }
                    self.next();
                }
            }
        }
    }

    fn list(
        &mut self,
        coords: SourceCoords,
        terminator: TokenKind,
        term_set: TermSet,
    ) -> SyntaxRef {
        let term_set = term_set.add(&terminator);
        let car_term_set = term_set.add(&TokenKind::Dot);

        let mut lb = ListBuilder::new();
        lb.set_coords(coords);

        loop {
            // Check for end of list; datum comments in between are skipped.
            let car = loop {
                if self.tok.kind == terminator {
                    lb.set_coords(self.tok.coords.clone());
                    self.next();
                    return lb.to_list();
                }
                let car = self.read(car_term_set);
                if !car.is_comment() {
                    break car;
                }
            };

            if car.is_eof() {
                self.error("Unterminated list");
                return lb.to_list();
            }
            lb.push(car);

            if self.tok.kind == TokenKind::Dot {
                self.next();
                let cdr = self.read_skip_datum_comments(term_set);
                if cdr.is_eof() {
                    self.error("Unterminated list");
                    return lb.to_list();
                }

                if self.tok.kind == terminator {
                    self.next();
                } else {
                    self.error(format!("Expected {}", terminator.repr()));
                    // Skip forward to the terminator or an enclosing one.
                    loop {
                        if self.tok.kind == terminator {
                            self.next();
                            break;
                        }
                        if term_set.contains(&self.tok.kind) {
                            break;
                        }
                        self.next();
                    }
                }

                return lb.to_list_with_tail(cdr);
            }
        }
    }

    fn vector(
        &mut self,
        coords: SourceCoords,
        terminator: TokenKind,
        term_set: TermSet,
    ) -> SyntaxRef {
        let term_set = term_set.add(&terminator);
        let mut elems: Vec<SyntaxRef> = Vec::new();

        while self.tok.kind != terminator {
            let elem = self.read(term_set);
            if elem.is_comment() {
                continue;
            }
            if elem.is_eof() {
                self.error("Unterminated vector");
                return Syntax::vector(coords, Vec::new());
            }
            if elems.capacity() == elems.len() {
                elems.reserve((elems.capacity() * 2).max(4) - elems.len());
            }
            elems.push(elem);
        }
        self.next(); // the closing paren

        // Right-size unless the doubled buffer is at least 75% full.
        if elems.len() * 4 < elems.capacity() * 3 {
            elems.shrink_to_fit();
        }
        Syntax::vector(coords, elems)
    }

    /// `'d` and friends expand to a `(sym d)` list.
    fn abbrev(&mut self, sym: SymbolId, term_set: TermSet) -> SyntaxRef {
        let symdat = Syntax::symbol(self.tok.coords.clone(), sym);
        self.next();

        let datum = self.read_skip_datum_comments(term_set);
        if datum.is_eof() {
            self.error("Unterminated abbreviation");
        }

        let inner = Syntax::pair(
            datum.coords.clone(),
            datum.clone(),
            Syntax::nil(datum.coords.clone()),
        );
        Syntax::pair(symdat.coords.clone(), symdat, inner)
    }
}
