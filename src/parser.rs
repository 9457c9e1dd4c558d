//! Syntax → AST: the Scheme parser and macro expander.
//!
//! A body (top level, lambda, let) is walked form by form: `begin` splices,
//! `define`s are deferred, everything else queues as an expression. The
//! deferred definitions become the `letrec*`-style [`AstBody`]. Expressions
//! dispatch on the binding of their head symbol: reserved words compile
//! directly, macros expand and re-enter, anything else is a call.
//!
//! Macro expansion is hygienic: the use-site form is wrapped with an
//! anti-mark, the transformer output with a fresh real mark referencing the
//! macro's definition scope. The two cancel on syntax the user wrote, so
//! only macro-introduced identifiers resolve in the definition scope.
//!
//! Errors never abort: each is reported and the offending position compiles
//! to `Unspecified`.

use crate::ast::{
    Ast, AstBody, AstLet, AstModule, AstSeq, BodyDef, FrameId, Frames, VariableId,
};
use crate::coords::SourceCoords;
use crate::errors::{ErrorInfo, ErrorReporter};
use crate::symtab::{
    BindingId, BindingKind, Keywords, ResWord, ScopeId, SymbolId, SymbolTable,
};
use crate::syntax::{
    unwrap_completely, wrap_syntax, ListBuilder, Mark, MarkKind, MarkList, Syntax, SyntaxKind,
    SyntaxRef,
};
use std::rc::Rc;

/// A macro transformer: syntax in, syntax out. Errors become diagnostics
/// at the use site.
pub trait MacroExpander {
    fn expand(&self, st: &mut SymbolTable, form: &SyntaxRef) -> Result<SyntaxRef, ErrorInfo>;
}

/// A bound macro: its transformer plus the scope it was defined in, which
/// is where macro-introduced identifiers resolve.
pub struct Macro {
    pub scope: ScopeId,
    pub expander: Rc<dyn MacroExpander>,
}

/// Per-body accumulator state.
struct Context {
    scope: ScopeId,
    frame: FrameId,
    /// Deferred definitions: `(binding, init syntax)`. A missing binding
    /// is either a duplicate-define error slot or the synthetic packaging
    /// of preceding top-level expressions.
    defn_list: Vec<(Option<BindingId>, SyntaxRef)>,
    /// Deferred body expressions.
    expr_list: Vec<SyntaxRef>,
}

impl Context {
    fn new(scope: ScopeId, frame: FrameId) -> Self {
        Context {
            scope,
            frame,
            defn_list: Vec::new(),
            expr_list: Vec::new(),
        }
    }
}

pub struct SchemeParser<'a> {
    symtab: &'a mut SymbolTable,
    errors: &'a mut ErrorReporter,
    frames: Frames,
    macros: Vec<Macro>,
    system_scope: ScopeId,
    /// The synthetic `#unspecified` binding.
    unspec: BindingId,
    /// The `begin` binding, needed when packaging deferred expressions.
    bind_begin: BindingId,
}

impl<'a> SchemeParser<'a> {
    pub fn new(
        symtab: &'a mut SymbolTable,
        kw: &Keywords,
        errors: &'a mut ErrorReporter,
    ) -> Self {
        let system_scope = symtab.new_scope();

        bind_keyword(symtab, system_scope, kw.quote, ResWord::Quote);
        bind_keyword(symtab, system_scope, kw.quasiquote, ResWord::None);
        bind_keyword(symtab, system_scope, kw.unquote, ResWord::None);
        bind_keyword(symtab, system_scope, kw.unquote_splicing, ResWord::None);
        bind_keyword(symtab, system_scope, kw.syntax, ResWord::Syntax);
        bind_keyword(symtab, system_scope, kw.quasisyntax, ResWord::Quasisyntax);
        bind_keyword(symtab, system_scope, kw.unsyntax, ResWord::Unsyntax);
        bind_keyword(symtab, system_scope, kw.unsyntax_splicing, ResWord::UnsyntaxSplicing);
        bind_keyword(symtab, system_scope, kw.if_, ResWord::If);
        let bind_begin = bind_keyword(symtab, system_scope, kw.begin, ResWord::Begin);
        bind_keyword(symtab, system_scope, kw.lambda, ResWord::Lambda);
        bind_keyword(symtab, system_scope, kw.define, ResWord::Define);
        bind_keyword(symtab, system_scope, kw.setbang, ResWord::SetBang);
        bind_keyword(symtab, system_scope, kw.let_, ResWord::Let);
        bind_keyword(symtab, system_scope, kw.letrec, ResWord::Letrec);
        bind_keyword(symtab, system_scope, kw.letrec_star, ResWord::LetrecStar);

        let unspec_sym = symtab.intern("#unspecified");
        let unspec = bind_keyword(symtab, system_scope, unspec_sym, ResWord::Unspecified);

        let mut macros = Vec::new();
        let or_sym = symtab.intern("or");
        let (or_bnd, inserted) = symtab.bind(system_scope, or_sym, SourceCoords::default());
        debug_assert!(inserted);
        symtab.bind_macro(or_bnd, macros.len());
        macros.push(Macro {
            scope: system_scope,
            expander: Rc::new(MacroOr),
        });

        SchemeParser {
            symtab,
            errors,
            frames: Frames::new(),
            macros,
            system_scope,
            unspec,
            bind_begin,
        }
    }

    /// Compile a top-level list of forms into a module. The top-level
    /// scope has level 0 and its frame is the level-0 root.
    pub fn parse_module(mut self, forms: &SyntaxRef) -> AstModule {
        let top_frame = self.frames.new_frame(None);
        let scope = self.symtab.new_scope();
        let body = self.compile_body(Context::new(scope, top_frame), forms.clone());
        self.symtab.pop_this_scope(scope);
        self.symtab.pop_this_scope(self.system_scope);

        AstModule {
            frames: self.frames,
            top_frame,
            body,
        }
    }

    fn error(&mut self, at: &SyntaxRef, message: impl Into<String>) {
        self.errors.error(at.coords.clone(), message);
    }

    fn make_unspecified(&self, at: &SyntaxRef) -> AstSeq {
        vec![Ast::Unspecified {
            coords: at.coords.clone(),
        }]
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    fn compile_body(&mut self, mut ctx: Context, datum: SyntaxRef) -> AstBody {
        self.parse_body(&mut ctx, datum);
        self.convert_letrec_star(ctx)
    }

    fn parse_body(&mut self, ctx: &mut Context, mut datum: SyntaxRef) {
        while !datum.is_nil() {
            match self.need_pair("", &datum) {
                Some((car, cdr)) => {
                    self.process_body_form(ctx, car);
                    datum = cdr;
                }
                None => break,
            }
        }
    }

    fn process_body_form(&mut self, ctx: &mut Context, datum: SyntaxRef) {
        let mut datum = datum;
        loop {
            if datum.is_nil() {
                self.error(&datum, "Invalid empty form");
                return;
            }

            if datum.is_pair() {
                let car = datum.pair_car(self.symtab);
                if let Some(bnd) = self.resolve_binding(&car) {
                    match self.symtab.binding_kind(bnd) {
                        BindingKind::Macro(index) => {
                            match self.expand_macro(index, &datum) {
                                Some(expanded) => {
                                    datum = expanded;
                                    continue;
                                }
                                None => return,
                            }
                        }
                        BindingKind::ResWord(ResWord::Begin) => {
                            // Splice the body of (begin ...).
                            let cdr = datum.pair_cdr(self.symtab);
                            self.parse_body(ctx, cdr);
                            return;
                        }
                        BindingKind::ResWord(ResWord::Define) => {
                            self.record_define(ctx, &datum);
                            return;
                        }
                        _ => {}
                    }
                }
            }

            ctx.expr_list.push(datum);
            return;
        }
    }

    fn record_define(&mut self, ctx: &mut Context, form: &SyntaxRef) {
        let top_level = self.symtab.scope_level(ctx.scope) == 0;
        if !top_level && !ctx.expr_list.is_empty() {
            self.error(form, "Definition not allowed here");
            return;
        }

        if !ctx.expr_list.is_empty() {
            // Package the deferred expressions as a synthetic unused
            // definition: (begin expr... #unspecified).
            let coords = ctx.expr_list[0].coords.clone();
            let mut lb = ListBuilder::new();
            lb.push(Syntax::binding(coords.clone(), self.bind_begin));
            for expr in ctx.expr_list.drain(..) {
                lb.push(expr);
            }
            lb.push(Syntax::binding(coords, self.unspec));
            ctx.defn_list.push((None, lb.to_list()));
        }

        let cdr = form.pair_cdr(self.symtab);
        let (params, rest) = match self.need_params_rest("define", &cdr, 1) {
            Some(x) => x,
            None => return,
        };
        let p0 = &params[0];

        let bnd = match p0.as_symbol() {
            Some((sym, _mark)) => {
                let (bnd, inserted) = self.symtab.bind(ctx.scope, sym, p0.coords.clone());
                if inserted {
                    let name = self.symtab.symbol_name(sym).to_string();
                    let var = self.frames.new_variable(ctx.frame, &name, p0.coords.clone());
                    self.symtab.bind_var(bnd, var);
                    Some(bnd)
                } else {
                    let name = self.symtab.symbol_name(sym).to_string();
                    let prev = self.symtab.binding_coords(bnd).to_string();
                    self.error(p0, format!("'{}' already defined at {}", name, prev));
                    None
                }
            }
            None => {
                self.error(p0, "symbol required after \"define\"");
                return;
            }
        };

        let value = if rest.is_nil() {
            Syntax::binding(rest.coords.clone(), self.unspec)
        } else {
            let value = rest.pair_car(self.symtab);
            let tail = rest.pair_cdr(self.symtab);
            if !tail.is_nil() {
                self.error(&tail, "define must specify only one value");
            }
            value
        };

        ctx.defn_list.push((bnd, value));
    }

    /// Turn the accumulated definitions and expressions into the body's
    /// `letrec*` container. All variables are already bound, so the inits
    /// can refer to any of them.
    fn convert_letrec_star(&mut self, mut ctx: Context) -> AstBody {
        let defn_list = std::mem::take(&mut ctx.defn_list);
        let expr_list = std::mem::take(&mut ctx.expr_list);

        let mut defs = Vec::new();
        for (bnd, value) in defn_list {
            let var = bnd.and_then(|b| match self.symtab.binding_kind(b) {
                BindingKind::Var(v) => Some(v),
                _ => None,
            });
            let init = self.compile_expression(&mut ctx, &value);
            defs.push(BodyDef { var, init });
        }

        let mut exprs: AstSeq = Vec::new();
        for expr in expr_list {
            let mut seq = self.compile_expression(&mut ctx, &expr);
            exprs.append(&mut seq);
        }

        if exprs.is_empty() {
            let coords = defs
                .first()
                .and_then(|d| d.init.first())
                .map(ast_coords)
                .unwrap_or_default();
            exprs.push(Ast::Unspecified { coords });
        }

        AstBody { defs, exprs }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn compile_expression(&mut self, ctx: &mut Context, expr: &SyntaxRef) -> AstSeq {
        let mut expr = expr.clone();
        loop {
            // A macro use replaces `expr` and re-enters the loop; every
            // other shape compiles directly.
            if expr.is_pair() {
                let car = expr.pair_car(self.symtab);
                if let Some(bnd) = self.resolve_binding(&car) {
                    match self.symtab.binding_kind(bnd) {
                        BindingKind::Macro(index) => match self.expand_macro(index, &expr) {
                            Some(expanded) => {
                                expr = expanded;
                                continue;
                            }
                            None => return self.make_unspecified(&expr),
                        },
                        BindingKind::ResWord(word) => {
                            return self.compile_res_form(ctx, &expr, &car, word);
                        }
                        _ => {}
                    }
                }
                return self.compile_call(ctx, &expr);
            }

            return match &expr.kind {
                SyntaxKind::Bool(_)
                | SyntaxKind::Integer(_)
                | SyntaxKind::Real(_)
                | SyntaxKind::Str(_) => vec![Ast::Datum {
                    coords: expr.coords.clone(),
                    datum: expr.clone(),
                }],
                SyntaxKind::Vector { .. } => {
                    let datum = unwrap_completely(self.symtab, &expr, &None);
                    vec![Ast::Datum {
                        coords: expr.coords.clone(),
                        datum,
                    }]
                }
                SyntaxKind::Symbol { sym, mark } => {
                    let sym = *sym;
                    let mark = mark.clone();
                    match self.lookup_syntax_symbol(sym, &mark) {
                        Some(bnd) => self.compile_binding(bnd, &expr),
                        None => {
                            let name = self.symtab.symbol_name(sym).to_string();
                            self.error(&expr, format!("Undefined variable '{}'", name));
                            self.make_unspecified(&expr)
                        }
                    }
                }
                SyntaxKind::Binding(bnd) => {
                    let bnd = *bnd;
                    self.compile_binding(bnd, &expr)
                }
                _ => {
                    self.error(&expr, "Invalid expression");
                    self.make_unspecified(&expr)
                }
            };
        }
    }

    fn compile_binding(&mut self, bnd: BindingId, expr: &SyntaxRef) -> AstSeq {
        if bnd != self.unspec {
            if let BindingKind::Var(var) = self.symtab.binding_kind(bnd) {
                return vec![Ast::Var {
                    coords: expr.coords.clone(),
                    var,
                }];
            }
            let name = self.symtab.symbol_name(self.symtab.binding_symbol(bnd)).to_string();
            self.error(expr, format!("Undefined variable '{}'", name));
        }
        self.make_unspecified(expr)
    }

    fn compile_call(&mut self, ctx: &mut Context, pair: &SyntaxRef) -> AstSeq {
        let car = pair.pair_car(self.symtab);
        let target = self.compile_expression(ctx, &car);

        let mut args: Vec<AstSeq> = Vec::new();
        let mut n = pair.pair_cdr(self.symtab);
        while !n.is_nil() {
            match self.need_pair("", &n) {
                Some((arg, cdr)) => {
                    args.push(self.compile_expression(ctx, &arg));
                    n = cdr;
                }
                None => break,
            }
        }

        vec![Ast::Apply {
            coords: pair.coords.clone(),
            target,
            args,
            list_arg: None,
        }]
    }

    fn compile_res_form(
        &mut self,
        ctx: &mut Context,
        pair: &SyntaxRef,
        car: &SyntaxRef,
        word: ResWord,
    ) -> AstSeq {
        match word {
            ResWord::Begin => self.compile_begin(ctx, pair),
            ResWord::SetBang => self.compile_set_bang(ctx, pair, car),
            ResWord::If => self.compile_if(ctx, pair, car),
            ResWord::Lambda => self.compile_lambda(ctx, pair, car),
            ResWord::Let => self.compile_let(ctx, pair, car),
            ResWord::Quote => self.compile_quote(pair),
            // letrec/letrec* and the syntax forms are not implemented.
            _ => {
                self.error(car, "Invalid form");
                self.make_unspecified(pair)
            }
        }
    }

    fn compile_begin(&mut self, ctx: &mut Context, pair: &SyntaxRef) -> AstSeq {
        let mut n = pair.pair_cdr(self.symtab);
        if n.is_nil() {
            return self.make_unspecified(pair);
        }

        let mut result: AstSeq = Vec::new();
        while !n.is_nil() {
            match self.need_pair("", &n) {
                Some((car, cdr)) => {
                    n = cdr;
                    let mut seq = self.compile_expression(ctx, &car);
                    result.append(&mut seq);
                }
                None => {
                    if result.is_empty() {
                        result = self.make_unspecified(pair);
                    }
                    break;
                }
            }
        }
        result
    }

    fn compile_set_bang(
        &mut self,
        ctx: &mut Context,
        pair: &SyntaxRef,
        car: &SyntaxRef,
    ) -> AstSeq {
        let cdr = pair.pair_cdr(self.symtab);
        let ps = match self.need_params_exact("set!", &cdr, 2) {
            Some(ps) => ps,
            None => return self.make_unspecified(pair),
        };

        let bnd = if let Some((sym, mark)) = ps[0].as_symbol() {
            let mark = mark.clone();
            match self.lookup_syntax_symbol(sym, &mark) {
                Some(bnd) => bnd,
                None => {
                    let name = self.symtab.symbol_name(sym).to_string();
                    self.error(&ps[0], format!("Undefined variable '{}'", name));
                    return self.make_unspecified(pair);
                }
            }
        } else if let Some(bnd) = ps[0].as_binding() {
            bnd
        } else {
            self.error(&ps[0], "set! requires a variable");
            return self.make_unspecified(pair);
        };

        let var = match self.symtab.binding_kind(bnd) {
            BindingKind::Var(var) => var,
            _ => {
                let name = self.symtab.symbol_name(self.symtab.binding_symbol(bnd)).to_string();
                self.error(&ps[0], format!("Undefined variable '{}'", name));
                return self.make_unspecified(pair);
            }
        };

        let rvalue = self.compile_expression(ctx, &ps[1]);
        vec![Ast::Set {
            coords: car.coords.clone(),
            target: var,
            rvalue,
        }]
    }

    fn compile_if(&mut self, ctx: &mut Context, pair: &SyntaxRef, car: &SyntaxRef) -> AstSeq {
        let cdr = pair.pair_cdr(self.symtab);
        let (ps, rest) = match self.need_params_rest("if", &cdr, 2) {
            Some(x) => x,
            None => return self.make_unspecified(pair),
        };

        let cond = self.compile_expression(ctx, &ps[0]);
        let then_branch = self.compile_expression(ctx, &ps[1]);

        let else_branch = if rest.is_nil() {
            None
        } else {
            let else_expr = rest.pair_car(self.symtab);
            let seq = self.compile_expression(ctx, &else_expr);
            let tail = rest.pair_cdr(self.symtab);
            if !tail.is_nil() {
                self.error(&tail, "if: form list is too long");
            }
            Some(seq)
        };

        vec![Ast::If {
            coords: car.coords.clone(),
            cond,
            then_branch,
            else_branch,
        }]
    }

    fn compile_quote(&mut self, pair: &SyntaxRef) -> AstSeq {
        let cdr = pair.pair_cdr(self.symtab);
        let ps = match self.need_params_exact("quote", &cdr, 1) {
            Some(ps) => ps,
            None => return self.make_unspecified(pair),
        };
        // Quoted data must not leak macro marks.
        let datum = unwrap_completely(self.symtab, &ps[0], &None);
        vec![Ast::Datum {
            coords: ps[0].coords.clone(),
            datum,
        }]
    }

    fn compile_lambda(
        &mut self,
        ctx: &mut Context,
        pair: &SyntaxRef,
        car: &SyntaxRef,
    ) -> AstSeq {
        let cdr = pair.pair_cdr(self.symtab);
        let (ps, rest) = match self.need_params_rest("lambda", &cdr, 1) {
            Some(x) => x,
            None => return self.make_unspecified(pair),
        };
        let p0 = &ps[0];

        let mut params: Vec<VariableId> = Vec::new();
        let mut list_param: Option<VariableId> = None;

        let param_scope = self.symtab.new_scope();
        let param_frame = self.frames.new_frame(Some(ctx.frame));

        if let Some((sym, _)) = p0.as_symbol() {
            // A lone symbol takes all arguments as a list.
            list_param = Some(self.bind_param(param_scope, param_frame, sym, p0));
        } else if p0.is_pair() {
            let mut cur = p0.clone();
            loop {
                let param = cur.pair_car(self.symtab);
                if let Some((sym, _)) = param.as_symbol() {
                    let var = self.bind_param(param_scope, param_frame, sym, &param);
                    params.push(var);
                } else {
                    self.error(&param, "Lambda parameter is not an identifier");
                }

                let next = cur.pair_cdr(self.symtab);
                if next.is_pair() {
                    cur = next;
                } else {
                    break;
                }
            }

            let tail = cur.pair_cdr(self.symtab);
            if !tail.is_nil() {
                if let Some((sym, _)) = tail.as_symbol() {
                    list_param = Some(self.bind_param(param_scope, param_frame, sym, &tail));
                } else {
                    self.error(&tail, "Lambda parameter is not an identifier");
                }
            }
        } else if p0.is_nil() {
            // No formals.
        } else {
            self.error(p0, "'lambda' requires at least a parameter list and a body");
            self.symtab.pop_this_scope(param_scope);
            return self.make_unspecified(pair);
        }

        let body_scope = self.symtab.new_scope();
        let body_frame = self.frames.new_frame(Some(param_frame));
        let body = if !rest.is_nil() {
            self.compile_body(Context::new(body_scope, body_frame), rest.clone())
        } else {
            self.error(&rest, "lambda requires a body");
            AstBody {
                defs: Vec::new(),
                exprs: self.make_unspecified(&rest),
            }
        };
        self.symtab.pop_this_scope(body_scope);
        self.symtab.pop_this_scope(param_scope);

        vec![Ast::Closure {
            coords: car.coords.clone(),
            enclosing_frame: ctx.frame,
            params,
            list_param,
            param_frame,
            body_frame,
            body: Box::new(body),
        }]
    }

    /// Bind one formal in the parameter scope. A duplicate is reported and
    /// still takes an anonymous slot so positional indices stay correct.
    fn bind_param(
        &mut self,
        scope: ScopeId,
        frame: FrameId,
        sym: SymbolId,
        at: &SyntaxRef,
    ) -> VariableId {
        let (bnd, inserted) = self.symtab.bind(scope, sym, at.coords.clone());
        let name = self.symtab.symbol_name(sym).to_string();
        if inserted {
            let var = self.frames.new_variable(frame, &name, at.coords.clone());
            self.symtab.bind_var(bnd, var);
            var
        } else {
            self.error(at, format!("Duplicated lambda parameter '{}'", name));
            self.frames.new_anonymous(frame, &name, at.coords.clone())
        }
    }

    fn compile_let(&mut self, ctx: &mut Context, pair: &SyntaxRef, car: &SyntaxRef) -> AstSeq {
        let cdr = pair.pair_cdr(self.symtab);
        if cdr.is_pair() {
            let head = cdr.pair_car(self.symtab);
            if head.is_pair() || head.is_nil() {
                return self.compile_basic_let(ctx, pair, car);
            }
            // Named let would go here; it is rejected as a syntax error.
        }

        self.error(&cdr, "Invalid let form");
        self.make_unspecified(pair)
    }

    fn compile_basic_let(
        &mut self,
        ctx: &mut Context,
        pair: &SyntaxRef,
        car: &SyntaxRef,
    ) -> AstSeq {
        let cdr = pair.pair_cdr(self.symtab);
        let (ps, rest) = match self.need_params_rest("let", &cdr, 1) {
            Some(x) => x,
            None => return self.make_unspecified(pair),
        };
        let p0 = &ps[0];

        let mut var_datums: Vec<SyntaxRef> = Vec::new();
        let mut value_datums: Vec<SyntaxRef> = Vec::new();

        if p0.is_nil() {
            // Empty init list.
        } else if p0.is_pair() {
            let mut inits = p0.clone();
            loop {
                let init = inits.pair_car(self.symtab);
                if let Some(dt) = self.need_params_exact("let initialization", &init, 2) {
                    var_datums.push(dt[0].clone());
                    value_datums.push(dt[1].clone());
                }

                let next = inits.pair_cdr(self.symtab);
                if next.is_pair() {
                    inits = next;
                } else if next.is_nil() {
                    break;
                } else {
                    self.error(&next, "let: form must be a proper list");
                    break;
                }
            }
        } else {
            self.error(p0, "'let' requires an initialization list");
            return self.make_unspecified(pair);
        }

        // Init expressions are evaluated in the outer scope.
        let values: Vec<AstSeq> = value_datums
            .iter()
            .map(|expr| self.compile_expression(ctx, expr))
            .collect();

        let param_scope = self.symtab.new_scope();
        let param_frame = self.frames.new_frame(Some(ctx.frame));
        let mut params: Vec<VariableId> = Vec::new();

        for datum in &var_datums {
            if let Some((sym, _)) = datum.as_symbol() {
                let (bnd, inserted) = self.symtab.bind(param_scope, sym, datum.coords.clone());
                let name = self.symtab.symbol_name(sym).to_string();
                if inserted {
                    let var = self.frames.new_variable(param_frame, &name, datum.coords.clone());
                    self.symtab.bind_var(bnd, var);
                    params.push(var);
                } else {
                    self.error(datum, format!("let: duplicated variable '{}'", name));
                    params.push(self.frames.new_anonymous(param_frame, &name, datum.coords.clone()));
                }
            } else {
                self.error(datum, "let: init variable must be an identifier");
            }
        }

        let body_scope = self.symtab.new_scope();
        let body_frame = self.frames.new_frame(Some(param_frame));
        let body = if !rest.is_nil() {
            self.compile_body(Context::new(body_scope, body_frame), rest.clone())
        } else {
            self.error(&rest, "let requires a body");
            AstBody {
                defs: Vec::new(),
                exprs: self.make_unspecified(&rest),
            }
        };
        self.symtab.pop_this_scope(body_scope);
        self.symtab.pop_this_scope(param_scope);

        vec![Ast::Let(AstLet {
            coords: car.coords.clone(),
            enclosing_frame: ctx.frame,
            params,
            values,
            param_frame,
            body_frame,
            body: Box::new(body),
        })]
    }

    // ------------------------------------------------------------------
    // Macro expansion
    // ------------------------------------------------------------------

    /// Hygienic expansion: anti-mark the input, run the transformer, and
    /// real-mark the output with a fresh stamp and the macro's scope.
    fn expand_macro(&mut self, index: usize, pair: &SyntaxRef) -> Option<SyntaxRef> {
        let wrapped = wrap_syntax(self.symtab, pair, &Mark::anti());
        let expander = self.macros[index].expander.clone();
        let scope = self.macros[index].scope;

        match expander.expand(self.symtab, &wrapped) {
            Ok(expanded) => {
                let stamp = self.symtab.next_mark_stamp();
                Some(wrap_syntax(self.symtab, &expanded, &Mark::real(stamp, scope)))
            }
            Err(mut info) => {
                if info.coords == SourceCoords::default() {
                    info.coords = pair.coords.clone();
                }
                self.errors.report(info);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Identifier resolution
    // ------------------------------------------------------------------

    /// The binding of `datum`'s head position, when it is an identifier or
    /// a pre-resolved binding.
    fn resolve_binding(&mut self, datum: &SyntaxRef) -> Option<BindingId> {
        if let Some((sym, mark)) = datum.as_symbol() {
            let mark = mark.clone();
            self.lookup_syntax_symbol(sym, &mark)
        } else {
            datum.as_binding()
        }
    }

    /// The hygiene rule: prefer the symbol's own visible binding, then
    /// walk the mark chain outermost-in, resolving the parent symbol in
    /// each real mark's definition scope.
    fn lookup_syntax_symbol(&self, sym: SymbolId, mark: &MarkList) -> Option<BindingId> {
        if let Some(bnd) = self.symtab.lookup(sym) {
            return Some(bnd);
        }

        let mut symbol = Some(sym);
        let mut cur = mark.clone();
        while let Some(m) = cur {
            if let MarkKind::Real { scope, .. } = m.kind {
                symbol = symbol.and_then(|s| self.symtab.symbol_parent(s));
                if let Some(s) = symbol {
                    if let Some(bnd) = self.symtab.lookup_here_and_up(scope, s) {
                        return Some(bnd);
                    }
                }
            }
            cur = m.next.clone();
        }
        None
    }

    // ------------------------------------------------------------------
    // Form-shape helpers
    // ------------------------------------------------------------------

    fn form_message(form_name: &str, what: &str) -> String {
        if form_name.is_empty() {
            what.to_string()
        } else {
            format!("{}:{}", form_name, what)
        }
    }

    /// Expect a pair; reports "too short" on nil and "must be a proper
    /// list" otherwise. Returns the (marked views of) car and cdr.
    fn need_pair(&mut self, form_name: &str, datum: &SyntaxRef) -> Option<(SyntaxRef, SyntaxRef)> {
        if datum.is_pair() {
            let car = datum.pair_car(self.symtab);
            let cdr = datum.pair_cdr(self.symtab);
            Some((car, cdr))
        } else if datum.is_nil() {
            self.error(datum, Self::form_message(form_name, "form list is too short"));
            None
        } else {
            self.error(
                datum,
                Self::form_message(form_name, "form must be a proper list"),
            );
            None
        }
    }

    /// Exactly `n` parameters and nothing more.
    fn need_params_exact(
        &mut self,
        form_name: &str,
        datum: &SyntaxRef,
        n: usize,
    ) -> Option<Vec<SyntaxRef>> {
        let (params, rest) = self.split_params(form_name, datum, n)?;
        if !rest.is_nil() {
            self.error(&rest, Self::form_message(form_name, "form list is too long"));
            return None;
        }
        Some(params)
    }

    /// At least `n` parameters; the remainder (pair or nil) is returned.
    fn need_params_rest(
        &mut self,
        form_name: &str,
        datum: &SyntaxRef,
        n: usize,
    ) -> Option<(Vec<SyntaxRef>, SyntaxRef)> {
        let (params, rest) = self.split_params(form_name, datum, n)?;
        if rest.is_nil() || rest.is_pair() {
            Some((params, rest))
        } else {
            self.error(
                &rest,
                Self::form_message(form_name, "form must be a proper list"),
            );
            None
        }
    }

    fn split_params(
        &mut self,
        form_name: &str,
        datum: &SyntaxRef,
        n: usize,
    ) -> Option<(Vec<SyntaxRef>, SyntaxRef)> {
        let mut params = Vec::with_capacity(n);
        let mut datum = datum.clone();
        for _ in 0..n {
            if datum.is_pair() {
                params.push(datum.pair_car(self.symtab));
                datum = datum.pair_cdr(self.symtab);
            } else {
                let what = if datum.is_nil() {
                    "form list is too short"
                } else {
                    "form must be a proper list"
                };
                self.error(&datum, Self::form_message(form_name, what));
                return None;
            }
        }
        Some((params, datum))
    }
}

fn bind_keyword(
    symtab: &mut SymbolTable,
    scope: ScopeId,
    sym: SymbolId,
    word: ResWord,
) -> BindingId {
    let (bnd, inserted) = symtab.bind(scope, sym, SourceCoords::default());
    debug_assert!(inserted);
    symtab.bind_resword(bnd, word);
    bnd
}

fn ast_coords(ast: &Ast) -> SourceCoords {
    match ast {
        Ast::Unspecified { coords }
        | Ast::Var { coords, .. }
        | Ast::Datum { coords, .. }
        | Ast::Set { coords, .. }
        | Ast::Apply { coords, .. }
        | Ast::If { coords, .. }
        | Ast::Closure { coords, .. } => coords.clone(),
        Ast::Let(l) | Ast::Fix(l) => l.coords.clone(),
    }
}

// ----------------------------------------------------------------------
// Built-in macros
// ----------------------------------------------------------------------

/// The `or` macro:
///
/// ```text
/// (or)          => #t
/// (or a)        => a
/// (or a b ...)  => (let ((tmp a)) (if tmp tmp (or b ...)))
/// ```
///
/// `tmp`, `let`, `if` and the recursive `or` are written as plain symbols;
/// the hygiene wrap renames them into the macro's definition scope, so a
/// user-level `tmp` is never captured.
struct MacroOr;

impl MacroExpander for MacroOr {
    fn expand(&self, st: &mut SymbolTable, datum: &SyntaxRef) -> Result<SyntaxRef, ErrorInfo> {
        let invalid = |s: &SyntaxRef| ErrorInfo::new(s.coords.clone(), "Invalid macro pattern");

        if !datum.is_pair() {
            return Err(invalid(datum));
        }
        let s = datum.pair_cdr(st);

        if s.is_nil() {
            return Ok(Syntax::boolean(datum.coords.clone(), true));
        }
        if !s.is_pair() {
            return Err(invalid(&s));
        }
        let s1 = s.pair_car(st);
        let s = s.pair_cdr(st);

        if s.is_nil() {
            return Ok(s1);
        }
        if !s.is_pair() {
            return Err(invalid(&s));
        }
        let s2 = s.pair_car(st);
        let rest = s.pair_cdr(st);

        let coords = datum.coords.clone();
        let sym_let = st.intern("let");
        let sym_if = st.intern("if");
        let sym_or = st.intern("or");
        let sym_tmp = st.intern("tmp");

        let mut init1 = ListBuilder::new();
        init1.push(Syntax::symbol(coords.clone(), sym_tmp));
        init1.push(s1);
        let mut init = ListBuilder::new();
        init.push(init1.to_list());

        let mut else_part = ListBuilder::new();
        else_part.push(Syntax::symbol(coords.clone(), sym_or));
        else_part.push(s2);

        let mut if_form = ListBuilder::new();
        if_form.push(Syntax::symbol(coords.clone(), sym_if));
        if_form.push(Syntax::symbol(coords.clone(), sym_tmp));
        if_form.push(Syntax::symbol(coords.clone(), sym_tmp));
        if_form.push(else_part.to_list_with_tail(rest));

        let mut let_form = ListBuilder::new();
        let_form.push(Syntax::symbol(coords.clone(), sym_let));
        let_form.push(init.to_list());
        let_form.push(if_form.to_list());
        Ok(let_form.to_list())
    }
}
