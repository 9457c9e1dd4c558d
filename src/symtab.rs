//! Symbols, scopes and bindings.
//!
//! Symbols are interned: the same name always yields the same `SymbolId`,
//! and the same `(parent, mark-stamp)` pair always yields the same marked
//! variant. Scopes form a tree but are pushed and popped as a strict stack;
//! each symbol keeps a stack of its currently visible bindings, so lookup
//! is O(1) and popping a scope unwinds exactly the bindings it introduced.
//!
//! Everything is held in index-addressed arenas inside the table, which
//! keeps the symbol/scope/binding graph free of ownership cycles.

use crate::ast::VariableId;
use crate::coords::SourceCoords;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub u32);

/// Compiler primitives a symbol can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResWord {
    /// Bound but carrying no primitive meaning yet (`quasiquote` family).
    None,
    Quote,
    Syntax,
    Quasisyntax,
    Unsyntax,
    UnsyntaxSplicing,
    If,
    Begin,
    Lambda,
    Define,
    SetBang,
    Let,
    Letrec,
    LetrecStar,
    /// The synthetic `#unspecified` value.
    Unspecified,
}

/// What a binding means.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindingKind {
    /// Freshly created; the caller assigns the payload right after `bind`.
    None,
    ResWord(ResWord),
    Var(VariableId),
    /// Index into the parser's macro table.
    Macro(usize),
}

#[derive(Debug)]
struct SymbolData {
    name: Rc<str>,
    parent: Option<SymbolId>,
    mark_stamp: u32,
    /// Top of this symbol's active-binding stack.
    top: Option<BindingId>,
}

#[derive(Debug)]
struct ScopeData {
    parent: Option<ScopeId>,
    level: i32,
    active: bool,
    /// Bindings introduced in this scope, in creation order.
    bindings: Vec<BindingId>,
}

#[derive(Debug)]
struct BindingData {
    sym: SymbolId,
    scope: ScopeId,
    kind: BindingKind,
    def_coords: SourceCoords,
    /// Next binding down on the symbol's stack.
    prev: Option<BindingId>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<SymbolData>,
    by_name: HashMap<Rc<str>, SymbolId>,
    by_mark: HashMap<(u32, SymbolId), SymbolId>,
    scopes: Vec<ScopeData>,
    bindings: Vec<BindingData>,
    top_scope: Option<ScopeId>,
    mark_stamp: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    /// Intern a symbol by name.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let name: Rc<str> = name.into();
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(SymbolData {
            name: name.clone(),
            parent: None,
            mark_stamp: 0,
            top: None,
        });
        self.by_name.insert(name, id);
        id
    }

    /// Intern the mark-variant of `parent` for `mark_stamp`. The variant
    /// shares the parent's name but is a distinct symbol.
    pub fn intern_marked(&mut self, parent: SymbolId, mark_stamp: u32) -> SymbolId {
        debug_assert!(mark_stamp != 0);
        if let Some(&id) = self.by_mark.get(&(mark_stamp, parent)) {
            return id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(SymbolData {
            name: self.symbols[parent.0 as usize].name.clone(),
            parent: Some(parent),
            mark_stamp,
            top: None,
        });
        self.by_mark.insert((mark_stamp, parent), id);
        id
    }

    /// Look up an already interned symbol by name.
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn symbol_name(&self, sym: SymbolId) -> &str {
        &self.symbols[sym.0 as usize].name
    }

    pub fn symbol_parent(&self, sym: SymbolId) -> Option<SymbolId> {
        self.symbols[sym.0 as usize].parent
    }

    /// Non-zero iff the symbol is a macro-generated variant.
    pub fn symbol_mark_stamp(&self, sym: SymbolId) -> u32 {
        self.symbols[sym.0 as usize].mark_stamp
    }

    /// A fresh stamp for one macro expansion.
    pub fn next_mark_stamp(&mut self) -> u32 {
        self.mark_stamp += 1;
        self.mark_stamp
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Push a fresh scope on the stack and mark it active. The root scope
    /// has level -1.
    pub fn new_scope(&mut self) -> ScopeId {
        let level = match self.top_scope {
            Some(parent) => self.scopes[parent.0 as usize].level + 1,
            None => -1,
        };
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeData {
            parent: self.top_scope,
            level,
            active: true,
            bindings: Vec::new(),
        });
        self.top_scope = Some(id);
        id
    }

    /// Pop the top scope, unwinding its bindings in LIFO order.
    pub fn pop_scope(&mut self) {
        let top = self.top_scope.expect("scope stack underflow");
        debug_assert!(self.scopes[top.0 as usize].active);

        let count = self.scopes[top.0 as usize].bindings.len();
        for i in (0..count).rev() {
            let bid = self.scopes[top.0 as usize].bindings[i];
            let sym = self.bindings[bid.0 as usize].sym;
            let prev = self.bindings[bid.0 as usize].prev;
            debug_assert_eq!(self.symbols[sym.0 as usize].top, Some(bid));
            self.symbols[sym.0 as usize].top = prev;
        }

        let scope = &mut self.scopes[top.0 as usize];
        scope.active = false;
        self.top_scope = scope.parent;
    }

    /// Pop `scope`, which must be the top of the stack.
    pub fn pop_this_scope(&mut self, scope: ScopeId) {
        assert_eq!(self.top_scope, Some(scope), "scopes must pop in LIFO order");
        self.pop_scope();
    }

    pub fn top_scope(&self) -> Option<ScopeId> {
        self.top_scope
    }

    pub fn scope_level(&self, scope: ScopeId) -> i32 {
        self.scopes[scope.0 as usize].level
    }

    pub fn scope_parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    pub fn scope_is_active(&self, scope: ScopeId) -> bool {
        self.scopes[scope.0 as usize].active
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// The symbol's innermost visible binding.
    pub fn lookup(&self, sym: SymbolId) -> Option<BindingId> {
        self.symbols[sym.0 as usize].top
    }

    /// Bind `sym` in `scope`. Returns the binding and whether it was newly
    /// created; an existing `(symbol, scope)` binding is returned as-is.
    pub fn bind(
        &mut self,
        scope: ScopeId,
        sym: SymbolId,
        def_coords: SourceCoords,
    ) -> (BindingId, bool) {
        if let Some(existing) = self.lookup_only_here(scope, sym) {
            return (existing, false);
        }
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(BindingData {
            sym,
            scope,
            kind: BindingKind::None,
            def_coords,
            prev: self.symbols[sym.0 as usize].top,
        });
        self.symbols[sym.0 as usize].top = Some(id);
        self.scopes[scope.0 as usize].bindings.push(id);
        (id, true)
    }

    /// The binding of `sym` introduced by `scope` itself, if any.
    pub fn lookup_only_here(&self, scope: ScopeId, sym: SymbolId) -> Option<BindingId> {
        let our_level = self.scopes[scope.0 as usize].level;
        let mut cur = self.symbols[sym.0 as usize].top;
        while let Some(bid) = cur {
            let bnd = &self.bindings[bid.0 as usize];
            if bnd.scope == scope {
                return Some(bid);
            }
            if self.scopes[bnd.scope.0 as usize].level <= our_level {
                break;
            }
            cur = bnd.prev;
        }
        None
    }

    /// The innermost binding of `sym` visible from `scope` (which must be
    /// active): bindings in deeper scopes are skipped.
    pub fn lookup_here_and_up(&self, scope: ScopeId, sym: SymbolId) -> Option<BindingId> {
        if !self.scopes[scope.0 as usize].active {
            return None;
        }
        let our_level = self.scopes[scope.0 as usize].level;
        let mut cur = self.symbols[sym.0 as usize].top;
        while let Some(bid) = cur {
            let bnd = &self.bindings[bid.0 as usize];
            if self.scopes[bnd.scope.0 as usize].level <= our_level {
                return Some(bid);
            }
            cur = bnd.prev;
        }
        None
    }

    pub fn binding_symbol(&self, bnd: BindingId) -> SymbolId {
        self.bindings[bnd.0 as usize].sym
    }

    pub fn binding_scope(&self, bnd: BindingId) -> ScopeId {
        self.bindings[bnd.0 as usize].scope
    }

    pub fn binding_kind(&self, bnd: BindingId) -> BindingKind {
        self.bindings[bnd.0 as usize].kind
    }

    pub fn binding_coords(&self, bnd: BindingId) -> &SourceCoords {
        &self.bindings[bnd.0 as usize].def_coords
    }

    pub fn bind_resword(&mut self, bnd: BindingId, word: ResWord) {
        debug_assert_eq!(self.bindings[bnd.0 as usize].kind, BindingKind::None);
        self.bindings[bnd.0 as usize].kind = BindingKind::ResWord(word);
    }

    pub fn bind_var(&mut self, bnd: BindingId, var: VariableId) {
        debug_assert_eq!(self.bindings[bnd.0 as usize].kind, BindingKind::None);
        self.bindings[bnd.0 as usize].kind = BindingKind::Var(var);
    }

    pub fn bind_macro(&mut self, bnd: BindingId, macro_index: usize) {
        debug_assert_eq!(self.bindings[bnd.0 as usize].kind, BindingKind::None);
        self.bindings[bnd.0 as usize].kind = BindingKind::Macro(macro_index);
    }

    /// `name:level` of the defining scope, as used in dumps.
    pub fn binding_display(&self, bnd: BindingId) -> String {
        let b = &self.bindings[bnd.0 as usize];
        format!(
            "{}:{}",
            self.symbol_name(b.sym),
            self.scopes[b.scope.0 as usize].level
        )
    }
}

/// The symbols with fixed spellings the reader and parser need.
#[derive(Debug)]
pub struct Keywords {
    pub quote: SymbolId,
    pub quasiquote: SymbolId,
    pub unquote: SymbolId,
    pub unquote_splicing: SymbolId,
    pub syntax: SymbolId,
    pub quasisyntax: SymbolId,
    pub unsyntax: SymbolId,
    pub unsyntax_splicing: SymbolId,
    pub if_: SymbolId,
    pub begin: SymbolId,
    pub lambda: SymbolId,
    pub define: SymbolId,
    pub setbang: SymbolId,
    pub let_: SymbolId,
    pub letrec: SymbolId,
    pub letrec_star: SymbolId,
}

impl Keywords {
    pub fn new(st: &mut SymbolTable) -> Self {
        Keywords {
            quote: st.intern("quote"),
            quasiquote: st.intern("quasiquote"),
            unquote: st.intern("unquote"),
            unquote_splicing: st.intern("unquote-splicing"),
            syntax: st.intern("syntax"),
            quasisyntax: st.intern("quasisyntax"),
            unsyntax: st.intern("unsyntax"),
            unsyntax_splicing: st.intern("unsyntax-splicing"),
            if_: st.intern("if"),
            begin: st.intern("begin"),
            lambda: st.intern("lambda"),
            define: st.intern("define"),
            setbang: st.intern("set!"),
            let_: st.intern("let"),
            letrec: st.intern("letrec"),
            letrec_star: st.intern("letrec*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_by_name() {
        let mut st = SymbolTable::new();
        let a = st.intern("foo");
        let b = st.intern("foo");
        let c = st.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(st.symbol_name(a), "foo");
    }

    #[test]
    fn test_interning_mark_variants() {
        let mut st = SymbolTable::new();
        let base = st.intern("tmp");
        let m1 = st.intern_marked(base, 1);
        let m1b = st.intern_marked(base, 1);
        let m2 = st.intern_marked(base, 2);
        assert_eq!(m1, m1b);
        assert_ne!(m1, m2);
        assert_ne!(m1, base);
        assert_eq!(st.symbol_name(m1), "tmp");
        assert_eq!(st.symbol_parent(m1), Some(base));
        assert_eq!(st.symbol_mark_stamp(m1), 1);
        // The variant is distinct from the plain symbol of the same name.
        assert_eq!(st.intern("tmp"), base);
    }

    #[test]
    fn test_scope_levels() {
        let mut st = SymbolTable::new();
        let root = st.new_scope();
        let inner = st.new_scope();
        assert_eq!(st.scope_level(root), -1);
        assert_eq!(st.scope_level(inner), 0);
        assert_eq!(st.top_scope(), Some(inner));
        st.pop_this_scope(inner);
        assert_eq!(st.top_scope(), Some(root));
        assert!(!st.scope_is_active(inner));
    }

    #[test]
    fn test_bind_and_shadow() {
        let mut st = SymbolTable::new();
        let x = st.intern("x");
        let outer = st.new_scope();
        let (b_outer, inserted) = st.bind(outer, x, SourceCoords::default());
        assert!(inserted);
        assert_eq!(st.lookup(x), Some(b_outer));

        let inner = st.new_scope();
        let (b_inner, inserted) = st.bind(inner, x, SourceCoords::default());
        assert!(inserted);
        assert_ne!(b_inner, b_outer);
        assert_eq!(st.lookup(x), Some(b_inner));

        // Binding the same (symbol, scope) pair again returns the original.
        let (again, inserted) = st.bind(inner, x, SourceCoords::default());
        assert!(!inserted);
        assert_eq!(again, b_inner);

        st.pop_this_scope(inner);
        assert_eq!(st.lookup(x), Some(b_outer));
        st.pop_this_scope(outer);
        assert_eq!(st.lookup(x), None);
    }

    #[test]
    fn test_scope_pop_restores_visible_set() {
        let mut st = SymbolTable::new();
        let x = st.intern("x");
        let y = st.intern("y");
        let outer = st.new_scope();
        let (bx, _) = st.bind(outer, x, SourceCoords::default());

        let before: Vec<_> = [x, y].iter().map(|&s| st.lookup(s)).collect();
        let inner = st.new_scope();
        st.bind(inner, x, SourceCoords::default());
        st.bind(inner, y, SourceCoords::default());
        st.pop_this_scope(inner);
        let after: Vec<_> = [x, y].iter().map(|&s| st.lookup(s)).collect();

        assert_eq!(before, after);
        assert_eq!(st.lookup(x), Some(bx));
        assert_eq!(st.lookup(y), None);
    }

    #[test]
    fn test_lookup_only_here_and_up() {
        let mut st = SymbolTable::new();
        let x = st.intern("x");
        let outer = st.new_scope();
        let (b_outer, _) = st.bind(outer, x, SourceCoords::default());
        let mid = st.new_scope();
        let inner = st.new_scope();
        let (b_inner, _) = st.bind(inner, x, SourceCoords::default());

        assert_eq!(st.lookup_only_here(inner, x), Some(b_inner));
        assert_eq!(st.lookup_only_here(mid, x), None);
        assert_eq!(st.lookup_only_here(outer, x), Some(b_outer));

        // here-and-up from mid skips the deeper binding.
        assert_eq!(st.lookup_here_and_up(mid, x), Some(b_outer));
        assert_eq!(st.lookup_here_and_up(inner, x), Some(b_inner));

        st.pop_this_scope(inner);
        st.pop_this_scope(mid);
        st.pop_this_scope(outer);
        // Inactive scope: no lookup.
        assert_eq!(st.lookup_here_and_up(mid, x), None);
    }

    #[test]
    fn test_keywords_are_interned_once() {
        let mut st = SymbolTable::new();
        let kw = Keywords::new(&mut st);
        assert_eq!(kw.quote, st.intern("quote"));
        assert_eq!(kw.setbang, st.intern("set!"));
        assert_eq!(kw.letrec_star, st.intern("letrec*"));
    }
}
