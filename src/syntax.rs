//! Syntax datums and hygiene marks.
//!
//! The reader produces trees of `Syntax` nodes; macro expansion decorates
//! them with marks. A mark chain is an immutable shared list threaded from
//! a node toward the root; wrapping a pair or vector just prepends to the
//! chain (O(1)) and the marked view of the children is materialised when
//! they are accessed. Wrapping a symbol interns a mark-variant symbol, so
//! the same source-level identifier resolves differently depending on which
//! expansion introduced it.
//!
//! Concatenating a real mark in front of an anti-mark cancels both: syntax
//! that entered a macro and came back out unchanged ends up unmarked, while
//! syntax the macro synthesised keeps the real mark of the expansion.

use crate::coords::SourceCoords;
use crate::symtab::{BindingId, ScopeId, SymbolId, SymbolTable};
use std::rc::Rc;

pub type SyntaxRef = Rc<Syntax>;
pub type MarkList = Option<Rc<Mark>>;

#[derive(Debug, Clone, PartialEq)]
pub enum MarkKind {
    /// Cancelled by the next real mark; tags use-site syntax.
    Anti,
    /// One macro expansion: the stamp distinguishes expansions, the scope
    /// is the macro's definition environment.
    Real { stamp: u32, scope: ScopeId },
}

#[derive(Debug, Clone)]
pub struct Mark {
    pub kind: MarkKind,
    pub next: MarkList,
}

impl Mark {
    pub fn anti() -> MarkList {
        Some(Rc::new(Mark {
            kind: MarkKind::Anti,
            next: None,
        }))
    }

    pub fn real(stamp: u32, scope: ScopeId) -> MarkList {
        Some(Rc::new(Mark {
            kind: MarkKind::Real { stamp, scope },
            next: None,
        }))
    }

    pub fn is_anti(&self) -> bool {
        matches!(self.kind, MarkKind::Anti)
    }

    pub fn is_real(&self) -> bool {
        matches!(self.kind, MarkKind::Real { .. })
    }
}

/// Structural mark-chain equality.
pub fn marks_equal(a: &MarkList, b: &MarkList) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => {
            (Rc::ptr_eq(x, y)) || (x.kind == y.kind && marks_equal(&x.next, &y.next))
        }
        _ => false,
    }
}

/// Concatenate two mark chains, cancelling a trailing real mark of `first`
/// against a leading anti-mark of `second`. Unchanged suffixes are shared.
pub fn concat_marks(first: &MarkList, second: &MarkList) -> MarkList {
    let f = match first {
        None => return second.clone(),
        Some(f) => f,
    };
    if second.is_none() {
        return first.clone();
    }

    let next = concat_marks(&f.next, second);
    if f.is_real() {
        if let Some(n) = &next {
            if n.is_anti() {
                return n.next.clone();
            }
        }
    }
    let unchanged = match (&next, &f.next) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    };
    if unchanged {
        first.clone()
    } else {
        Some(Rc::new(Mark {
            kind: f.kind.clone(),
            next,
        }))
    }
}

fn marks_to_string(mark: &Rc<Mark>) -> String {
    let mut s = String::from("Mark:");
    let mut cur = Some(mark.clone());
    let mut first = true;
    while let Some(m) = cur {
        if !first {
            s.push(',');
        }
        match m.kind {
            MarkKind::Anti => s.push_str("-1"),
            MarkKind::Real { stamp, .. } => s.push_str(&stamp.to_string()),
        }
        first = false;
        cur = m.next.clone();
    }
    s
}

#[derive(Debug, Clone)]
pub enum SyntaxKind {
    /// End-of-input sentinel returned by the reader.
    Eof,
    /// Result of a `#;` datum comment; discarded by the reader's callers.
    Comment,
    Nil,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Str(Rc<[u8]>),
    Symbol { sym: SymbolId, mark: MarkList },
    /// A pre-resolved binding, used by the parser when it synthesises forms.
    Binding(BindingId),
    Pair {
        car: SyntaxRef,
        cdr: SyntaxRef,
        mark: MarkList,
    },
    Vector {
        elems: Rc<Vec<SyntaxRef>>,
        mark: MarkList,
    },
}

#[derive(Debug, Clone)]
pub struct Syntax {
    pub kind: SyntaxKind,
    pub coords: SourceCoords,
}

impl Syntax {
    pub fn new(kind: SyntaxKind, coords: SourceCoords) -> SyntaxRef {
        Rc::new(Syntax { kind, coords })
    }

    pub fn eof() -> SyntaxRef {
        Syntax::new(SyntaxKind::Eof, SourceCoords::default())
    }

    pub fn comment() -> SyntaxRef {
        Syntax::new(SyntaxKind::Comment, SourceCoords::default())
    }

    pub fn nil(coords: SourceCoords) -> SyntaxRef {
        Syntax::new(SyntaxKind::Nil, coords)
    }

    pub fn boolean(coords: SourceCoords, value: bool) -> SyntaxRef {
        Syntax::new(SyntaxKind::Bool(value), coords)
    }

    pub fn integer(coords: SourceCoords, value: i64) -> SyntaxRef {
        Syntax::new(SyntaxKind::Integer(value), coords)
    }

    pub fn real(coords: SourceCoords, value: f64) -> SyntaxRef {
        Syntax::new(SyntaxKind::Real(value), coords)
    }

    pub fn string(coords: SourceCoords, value: Rc<[u8]>) -> SyntaxRef {
        Syntax::new(SyntaxKind::Str(value), coords)
    }

    pub fn symbol(coords: SourceCoords, sym: SymbolId) -> SyntaxRef {
        Syntax::new(SyntaxKind::Symbol { sym, mark: None }, coords)
    }

    pub fn binding(coords: SourceCoords, bnd: BindingId) -> SyntaxRef {
        Syntax::new(SyntaxKind::Binding(bnd), coords)
    }

    pub fn pair(coords: SourceCoords, car: SyntaxRef, cdr: SyntaxRef) -> SyntaxRef {
        Syntax::new(
            SyntaxKind::Pair {
                car,
                cdr,
                mark: None,
            },
            coords,
        )
    }

    pub fn vector(coords: SourceCoords, elems: Vec<SyntaxRef>) -> SyntaxRef {
        Syntax::new(
            SyntaxKind::Vector {
                elems: Rc::new(elems),
                mark: None,
            },
            coords,
        )
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, SyntaxKind::Eof)
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, SyntaxKind::Comment)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.kind, SyntaxKind::Nil)
    }

    pub fn is_pair(&self) -> bool {
        matches!(self.kind, SyntaxKind::Pair { .. })
    }

    /// Symbol id and mark chain, when this is a symbol.
    pub fn as_symbol(&self) -> Option<(SymbolId, &MarkList)> {
        match &self.kind {
            SyntaxKind::Symbol { sym, mark } => Some((*sym, mark)),
            _ => None,
        }
    }

    pub fn as_binding(&self) -> Option<BindingId> {
        match &self.kind {
            SyntaxKind::Binding(bnd) => Some(*bnd),
            _ => None,
        }
    }

    /// The marked view of the car. Must be a pair.
    pub fn pair_car(&self, st: &mut SymbolTable) -> SyntaxRef {
        match &self.kind {
            SyntaxKind::Pair { car, mark, .. } => match mark {
                None => car.clone(),
                some => wrap_syntax(st, car, some),
            },
            _ => panic!("pair_car on a non-pair"),
        }
    }

    /// The marked view of the cdr. Must be a pair.
    pub fn pair_cdr(&self, st: &mut SymbolTable) -> SyntaxRef {
        match &self.kind {
            SyntaxKind::Pair { cdr, mark, .. } => match mark {
                None => cdr.clone(),
                some => wrap_syntax(st, cdr, some),
            },
            _ => panic!("pair_cdr on a non-pair"),
        }
    }

    pub fn vector_len(&self) -> usize {
        match &self.kind {
            SyntaxKind::Vector { elems, .. } => elems.len(),
            _ => 0,
        }
    }

    /// The marked view of a vector element. Must be a vector.
    pub fn vector_elem(&self, st: &mut SymbolTable, index: usize) -> SyntaxRef {
        match &self.kind {
            SyntaxKind::Vector { elems, mark } => match mark {
                None => elems[index].clone(),
                some => wrap_syntax(st, &elems[index], some),
            },
            _ => panic!("vector_elem on a non-vector"),
        }
    }
}

/// Return a node equivalent to `d` carrying `mark` in addition to its own
/// marks. O(1) for pairs and vectors (the mark is prepended and children
/// stay raw); symbols intern their marked variant.
pub fn wrap_syntax(st: &mut SymbolTable, d: &SyntaxRef, mark: &MarkList) -> SyntaxRef {
    if mark.is_none() {
        return d.clone();
    }
    match &d.kind {
        SyntaxKind::Symbol { sym, mark: own } => {
            let combined = concat_marks(mark, own);
            let new_sym = if combined.is_some() {
                wrap_symbol(st, &combined, *sym)
            } else {
                *sym
            };
            Syntax::new(
                SyntaxKind::Symbol {
                    sym: new_sym,
                    mark: combined,
                },
                d.coords.clone(),
            )
        }
        SyntaxKind::Pair {
            car,
            cdr,
            mark: own,
        } => Syntax::new(
            SyntaxKind::Pair {
                car: car.clone(),
                cdr: cdr.clone(),
                mark: concat_marks(mark, own),
            },
            d.coords.clone(),
        ),
        SyntaxKind::Vector { elems, mark: own } => Syntax::new(
            SyntaxKind::Vector {
                elems: elems.clone(),
                mark: concat_marks(mark, own),
            },
            d.coords.clone(),
        ),
        _ => d.clone(),
    }
}

/// Create the chain of marked symbol variants for a mark chain, outermost
/// mark last. Anti-marks leave the symbol untouched.
fn wrap_symbol(st: &mut SymbolTable, mark: &MarkList, sym: SymbolId) -> SymbolId {
    let m = mark.as_ref().expect("wrap_symbol needs a mark");
    let parent = if m.next.is_some() {
        wrap_symbol(st, &m.next, sym)
    } else {
        sym
    };
    match m.kind {
        MarkKind::Anti => parent,
        MarkKind::Real { stamp, .. } => st.intern_marked(parent, stamp),
    }
}

/// Push all marks down into the leaves and strip them from containers.
/// Non-mutating; unchanged subtrees are shared with the input.
pub fn unwrap_completely(st: &mut SymbolTable, d: &SyntaxRef, mark: &MarkList) -> SyntaxRef {
    match &d.kind {
        SyntaxKind::Pair {
            car,
            cdr,
            mark: own,
        } => {
            let combined = concat_marks(mark, own);
            let new_car = unwrap_completely(st, car, &combined);
            let new_cdr = unwrap_completely(st, cdr, &combined);
            if Rc::ptr_eq(&new_car, car) && Rc::ptr_eq(&new_cdr, cdr) && own.is_none() {
                d.clone()
            } else {
                Syntax::new(
                    SyntaxKind::Pair {
                        car: new_car,
                        cdr: new_cdr,
                        mark: None,
                    },
                    d.coords.clone(),
                )
            }
        }
        SyntaxKind::Vector { elems, mark: own } => {
            let combined = concat_marks(mark, own);
            let mut changed = false;
            let mut new_elems = Vec::with_capacity(elems.len());
            for e in elems.iter() {
                let ne = unwrap_completely(st, e, &combined);
                changed |= !Rc::ptr_eq(&ne, e);
                new_elems.push(ne);
            }
            if !changed && own.is_none() {
                d.clone()
            } else {
                Syntax::new(
                    SyntaxKind::Vector {
                        elems: Rc::new(new_elems),
                        mark: None,
                    },
                    d.coords.clone(),
                )
            }
        }
        _ => wrap_syntax(st, d, mark),
    }
}

/// Structural datum equality: same shape, same interned symbols, same
/// marks. Used by the reader round-trip tests and macro machinery.
pub fn syntax_equal(a: &Syntax, b: &Syntax) -> bool {
    match (&a.kind, &b.kind) {
        (SyntaxKind::Eof, SyntaxKind::Eof) => true,
        (SyntaxKind::Comment, SyntaxKind::Comment) => true,
        (SyntaxKind::Nil, SyntaxKind::Nil) => true,
        (SyntaxKind::Bool(x), SyntaxKind::Bool(y)) => x == y,
        (SyntaxKind::Integer(x), SyntaxKind::Integer(y)) => x == y,
        (SyntaxKind::Real(x), SyntaxKind::Real(y)) => x == y,
        (SyntaxKind::Str(x), SyntaxKind::Str(y)) => x == y,
        (
            SyntaxKind::Symbol { sym: xs, mark: xm },
            SyntaxKind::Symbol { sym: ys, mark: ym },
        ) => xs == ys && marks_equal(xm, ym),
        (SyntaxKind::Binding(x), SyntaxKind::Binding(y)) => x == y,
        (
            SyntaxKind::Pair {
                car: xa,
                cdr: xd,
                mark: xm,
            },
            SyntaxKind::Pair {
                car: ya,
                cdr: yd,
                mark: ym,
            },
        ) => marks_equal(xm, ym) && syntax_equal(xa, ya) && syntax_equal(xd, yd),
        (
            SyntaxKind::Vector {
                elems: xe,
                mark: xm,
            },
            SyntaxKind::Vector {
                elems: ye,
                mark: ym,
            },
        ) => {
            marks_equal(xm, ym)
                && xe.len() == ye.len()
                && xe.iter().zip(ye.iter()).all(|(x, y)| syntax_equal(x, y))
        }
        _ => false,
    }
}

/// Escape a byte string for display inside double quotes.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            0x07 => out.push_str("\\a"),
            0x08 => out.push_str("\\b"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            0x0B => out.push_str("\\v"),
            0x0C => out.push_str("\\f"),
            b'\r' => out.push_str("\\r"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}

impl Syntax {
    /// Single-line printed form. Marks are shown in braces; marked symbols
    /// carry an `@uid` suffix so distinct variants are distinguishable.
    pub fn write(&self, st: &SymbolTable, out: &mut String) {
        match &self.kind {
            SyntaxKind::Eof => out.push_str("#<eof>"),
            SyntaxKind::Comment => out.push_str("#<comment>"),
            SyntaxKind::Nil => out.push_str("()"),
            SyntaxKind::Bool(v) => out.push_str(if *v { "#t" } else { "#f" }),
            SyntaxKind::Integer(v) => out.push_str(&v.to_string()),
            SyntaxKind::Real(v) => out.push_str(&format_real(*v)),
            SyntaxKind::Str(bytes) => {
                out.push('"');
                out.push_str(&escape_bytes(bytes));
                out.push('"');
            }
            SyntaxKind::Symbol { sym, mark } => {
                out.push_str(st.symbol_name(*sym));
                if st.symbol_mark_stamp(*sym) != 0 {
                    out.push('@');
                    out.push_str(&sym.0.to_string());
                }
                if let Some(m) = mark {
                    out.push('{');
                    out.push_str(&marks_to_string(m));
                    out.push('}');
                }
            }
            SyntaxKind::Binding(bnd) => out.push_str(&st.binding_display(*bnd)),
            SyntaxKind::Pair { mark, .. } => {
                out.push('(');
                if let Some(m) = mark {
                    out.push('{');
                    out.push_str(&marks_to_string(m));
                    out.push('}');
                }
                let mut cur = self;
                loop {
                    let (car, cdr) = match &cur.kind {
                        SyntaxKind::Pair { car, cdr, .. } => (car, cdr),
                        _ => unreachable!(),
                    };
                    car.write(st, out);
                    match &cdr.kind {
                        SyntaxKind::Nil => break,
                        SyntaxKind::Pair { .. } => {
                            out.push(' ');
                            cur = cdr.as_ref();
                        }
                        _ => {
                            out.push_str(" . ");
                            cdr.write(st, out);
                            break;
                        }
                    }
                }
                out.push(')');
            }
            SyntaxKind::Vector { elems, mark } => {
                out.push_str("#(");
                if let Some(m) = mark {
                    out.push('{');
                    out.push_str(&marks_to_string(m));
                    out.push('}');
                }
                for (i, e) in elems.iter().enumerate() {
                    if i != 0 {
                        out.push(' ');
                    }
                    e.write(st, out);
                }
                out.push(')');
            }
        }
    }

    pub fn to_display_string(&self, st: &SymbolTable) -> String {
        let mut s = String::new();
        self.write(st, &mut s);
        s
    }

    /// Multi-line form: list elements after the first go on their own
    /// lines, four spaces per nesting level.
    pub fn write_indented(&self, st: &SymbolTable, out: &mut String, indent: usize) {
        match &self.kind {
            SyntaxKind::Nil => out.push_str("()"),
            SyntaxKind::Vector { elems, .. } => {
                out.push_str("#(");
                for (i, e) in elems.iter().enumerate() {
                    if i != 0 {
                        out.push(' ');
                    }
                    e.write_indented(st, out, indent);
                }
                out.push(')');
            }
            SyntaxKind::Pair { .. } => {
                out.push('(');
                let indent = indent + 4;
                let mut cur = self;
                let mut first = true;
                loop {
                    if !first {
                        out.push('\n');
                        out.push_str(&" ".repeat(indent));
                    }
                    let (car, cdr) = match &cur.kind {
                        SyntaxKind::Pair { car, cdr, .. } => (car, cdr),
                        _ => unreachable!(),
                    };
                    car.write_indented(st, out, indent);
                    match &cdr.kind {
                        SyntaxKind::Nil => break,
                        SyntaxKind::Pair { .. } => {
                            first = false;
                            cur = cdr.as_ref();
                        }
                        _ => {
                            out.push_str(" . ");
                            cdr.write_indented(st, out, indent);
                            break;
                        }
                    }
                }
                out.push(')');
            }
            _ => self.write(st, out),
        }
    }
}

fn format_real(v: f64) -> String {
    // Keep a decimal point so the printed form re-lexes as a real.
    if v.is_finite() && v == v.trunc() && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Builds proper or improper lists front to back.
///
/// Pair coordinates default to the coordinates of the element; an explicit
/// `set_coords` applies to the next pair created (the reader seeds it with
/// the open-paren position) or, at the end, to the terminating nil.
#[derive(Debug, Default)]
pub struct ListBuilder {
    items: Vec<(SyntaxRef, Option<SourceCoords>)>,
    pending: Option<SourceCoords>,
}

impl ListBuilder {
    pub fn new() -> Self {
        ListBuilder::default()
    }

    pub fn set_coords(&mut self, coords: SourceCoords) {
        if self.pending.is_none() {
            self.pending = Some(coords);
        }
    }

    pub fn push(&mut self, datum: SyntaxRef) {
        let coords = self.pending.take();
        self.items.push((datum, coords));
    }

    pub fn to_list(self) -> SyntaxRef {
        let nil_coords = self
            .pending
            .clone()
            .or_else(|| self.items.last().map(|(d, _)| d.coords.clone()))
            .unwrap_or_default();
        self.to_list_with_tail(Syntax::nil(nil_coords))
    }

    /// Finish as an improper list ending in `tail`; with no elements the
    /// tail itself is returned.
    pub fn to_list_with_tail(self, tail: SyntaxRef) -> SyntaxRef {
        let mut acc = tail;
        for (datum, coords) in self.items.into_iter().rev() {
            let coords = coords.unwrap_or_else(|| datum.coords.clone());
            acc = Syntax::pair(coords, datum, acc);
        }
        acc
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anti_then(next: MarkList) -> MarkList {
        Some(Rc::new(Mark {
            kind: MarkKind::Anti,
            next,
        }))
    }

    fn real_then(stamp: u32, next: MarkList) -> MarkList {
        Some(Rc::new(Mark {
            kind: MarkKind::Real {
                stamp,
                scope: ScopeId(0),
            },
            next,
        }))
    }

    #[test]
    fn test_concat_cancels_real_before_anti() {
        // [real 1] ++ [anti] => []
        let r = real_then(1, None);
        let a = anti_then(None);
        assert!(concat_marks(&r, &a).is_none());
    }

    #[test]
    fn test_concat_keeps_uncancelled_marks() {
        // [anti] ++ [real 1] => [anti, real 1]
        let a = anti_then(None);
        let r = real_then(1, None);
        let out = concat_marks(&a, &r);
        let expected = anti_then(real_then(1, None));
        assert!(marks_equal(&out, &expected));

        // [real 2] ++ [anti, real 1] => [real 1]
        let out = concat_marks(&real_then(2, None), &expected);
        assert!(marks_equal(&out, &real_then(1, None)));
    }

    #[test]
    fn test_concat_shares_unchanged_suffix() {
        let tail = real_then(3, None);
        let out = concat_marks(&tail, &None);
        assert!(Rc::ptr_eq(out.as_ref().unwrap(), tail.as_ref().unwrap()));
    }

    #[test]
    fn test_wrap_symbol_interns_variant() {
        let mut st = SymbolTable::new();
        let scope = st.new_scope();
        let x = st.intern("x");
        let sx = Syntax::symbol(SourceCoords::default(), x);

        let real = Mark::real(1, scope);
        let wrapped = wrap_syntax(&mut st, &sx, &real);
        let (wsym, wmark) = wrapped.as_symbol().unwrap();
        assert_ne!(wsym, x);
        assert_eq!(st.symbol_parent(wsym), Some(x));
        assert_eq!(st.symbol_mark_stamp(wsym), 1);
        assert!(marks_equal(wmark, &real));

        // Wrapping again with the same stamp yields the same variant.
        let wrapped2 = wrap_syntax(&mut st, &sx, &real);
        assert_eq!(wrapped2.as_symbol().unwrap().0, wsym);
    }

    #[test]
    fn test_anti_mark_leaves_symbol_alone() {
        let mut st = SymbolTable::new();
        let x = st.intern("x");
        let sx = Syntax::symbol(SourceCoords::default(), x);
        let wrapped = wrap_syntax(&mut st, &sx, &Mark::anti());
        let (wsym, wmark) = wrapped.as_symbol().unwrap();
        assert_eq!(wsym, x);
        assert!(wmark.is_some());
    }

    #[test]
    fn test_pair_wrap_is_lazy_and_cancels_on_access() {
        let mut st = SymbolTable::new();
        let scope = st.new_scope();
        let x = st.intern("x");
        let c = SourceCoords::default();
        let pair = Syntax::pair(c.clone(), Syntax::symbol(c.clone(), x), Syntax::nil(c));

        // Anti-wrap, then real-wrap, as macro expansion does for
        // pass-through syntax: the marks cancel on access.
        let anti_wrapped = wrap_syntax(&mut st, &pair, &Mark::anti());
        let real = Mark::real(1, scope);
        let both = wrap_syntax(&mut st, &anti_wrapped, &real);
        let car = both.pair_car(&mut st);
        let (sym, mark) = car.as_symbol().unwrap();
        assert_eq!(sym, x);
        assert!(mark.is_none());
    }

    #[test]
    fn test_unwrap_completely_shares_unmarked_subtrees() {
        let mut st = SymbolTable::new();
        let x = st.intern("x");
        let c = SourceCoords::default();
        let inner = Syntax::pair(c.clone(), Syntax::symbol(c.clone(), x), Syntax::nil(c.clone()));
        let unwrapped = unwrap_completely(&mut st, &inner, &None);
        assert!(Rc::ptr_eq(&inner, &unwrapped));
    }

    #[test]
    fn test_unwrap_completely_pushes_marks_to_leaves() {
        let mut st = SymbolTable::new();
        let scope = st.new_scope();
        let x = st.intern("x");
        let c = SourceCoords::default();
        let pair = Syntax::pair(c.clone(), Syntax::symbol(c.clone(), x), Syntax::nil(c));
        let wrapped = wrap_syntax(&mut st, &pair, &Mark::real(7, scope));
        let unwrapped = unwrap_completely(&mut st, &wrapped, &None);

        match &unwrapped.kind {
            SyntaxKind::Pair { car, mark, .. } => {
                assert!(mark.is_none());
                let (sym, smark) = car.as_symbol().unwrap();
                assert_eq!(st.symbol_mark_stamp(sym), 7);
                assert!(smark.is_some());
            }
            _ => panic!("expected a pair"),
        }
    }

    #[test]
    fn test_list_builder() {
        let mut st = SymbolTable::new();
        let a = st.intern("a");
        let b = st.intern("b");
        let c = SourceCoords::default();

        let mut lb = ListBuilder::new();
        lb.push(Syntax::symbol(c.clone(), a));
        lb.push(Syntax::symbol(c.clone(), b));
        let list = lb.to_list();
        assert_eq!(list.to_display_string(&st), "(a b)");

        let mut lb = ListBuilder::new();
        lb.push(Syntax::symbol(c.clone(), a));
        let dotted = lb.to_list_with_tail(Syntax::symbol(c.clone(), b));
        assert_eq!(dotted.to_display_string(&st), "(a . b)");

        let empty = ListBuilder::new().to_list();
        assert!(empty.is_nil());
    }

    #[test]
    fn test_printing_and_equality() {
        let mut st = SymbolTable::new();
        let a = st.intern("a");
        let c = SourceCoords::default();
        let bytes: Rc<[u8]> = Rc::from(&b"a\x07\xff"[..]);

        let mut lb = ListBuilder::new();
        lb.push(Syntax::symbol(c.clone(), a));
        lb.push(Syntax::integer(c.clone(), 42));
        lb.push(Syntax::real(c.clone(), 4.0));
        lb.push(Syntax::boolean(c.clone(), true));
        lb.push(Syntax::string(c.clone(), bytes));
        let list = lb.to_list();
        assert_eq!(
            list.to_display_string(&st),
            "(a 42 4.0 #t \"a\\a\\xff\")"
        );
        assert!(syntax_equal(&list, &list.clone()));

        let other = Syntax::integer(c, 42);
        assert!(!syntax_equal(&list, &other));
    }
}
