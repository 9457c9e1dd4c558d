//! The typed AST produced by the Scheme parser.
//!
//! Frames describe runtime activation records at compile time: each
//! `lambda`, `let` and the top-level body gets one, and every variable
//! belongs to exactly one frame. AST nodes reference frames and variables
//! by index into the arenas held in [`Frames`], which travels with the
//! module.
//!
//! An `AstSeq` is an ordered sequence of nodes evaluated left to right;
//! the value of the last one is the value of the sequence. Every compile
//! path produces a non-empty sequence, falling back to `Unspecified`.

use crate::coords::SourceCoords;
use crate::symtab::SymbolTable;
use crate::syntax::SyntaxRef;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(pub u32);

#[derive(Debug)]
struct FrameData {
    parent: Option<FrameId>,
    level: u32,
    vars: Vec<VariableId>,
    tmp_count: u32,
}

#[derive(Debug)]
struct VariableData {
    name: Rc<str>,
    frame: FrameId,
    def_coords: SourceCoords,
}

/// Arena of frames and their variables.
#[derive(Debug, Default)]
pub struct Frames {
    frames: Vec<FrameData>,
    vars: Vec<VariableData>,
}

impl Frames {
    pub fn new() -> Self {
        Frames::default()
    }

    /// The root frame has level 0.
    pub fn new_frame(&mut self, parent: Option<FrameId>) -> FrameId {
        let level = match parent {
            Some(p) => self.frames[p.0 as usize].level + 1,
            None => 0,
        };
        let id = FrameId(self.frames.len() as u32);
        self.frames.push(FrameData {
            parent,
            level,
            vars: Vec::new(),
            tmp_count: 0,
        });
        id
    }

    pub fn new_variable(
        &mut self,
        frame: FrameId,
        name: &str,
        def_coords: SourceCoords,
    ) -> VariableId {
        let id = VariableId(self.vars.len() as u32);
        self.vars.push(VariableData {
            name: name.into(),
            frame,
            def_coords,
        });
        self.frames[frame.0 as usize].vars.push(id);
        id
    }

    /// A frame-unique temporary. Variable names need not be unique within
    /// a frame, but distinct names keep the dumps readable.
    pub fn new_anonymous(
        &mut self,
        frame: FrameId,
        info_prefix: &str,
        def_coords: SourceCoords,
    ) -> VariableId {
        self.frames[frame.0 as usize].tmp_count += 1;
        let name = format!(
            "tmp_{}_{}",
            info_prefix, self.frames[frame.0 as usize].tmp_count
        );
        self.new_variable(frame, &name, def_coords)
    }

    pub fn frame_level(&self, frame: FrameId) -> u32 {
        self.frames[frame.0 as usize].level
    }

    pub fn frame_parent(&self, frame: FrameId) -> Option<FrameId> {
        self.frames[frame.0 as usize].parent
    }

    pub fn frame_variables(&self, frame: FrameId) -> &[VariableId] {
        &self.frames[frame.0 as usize].vars
    }

    pub fn variable_name(&self, var: VariableId) -> &str {
        &self.vars[var.0 as usize].name
    }

    pub fn variable_frame(&self, var: VariableId) -> FrameId {
        self.vars[var.0 as usize].frame
    }

    pub fn variable_coords(&self, var: VariableId) -> &SourceCoords {
        &self.vars[var.0 as usize].def_coords
    }

    /// `name:level`, the form variables take in dumps.
    pub fn variable_display(&self, var: VariableId) -> String {
        format!(
            "{}:{}",
            self.variable_name(var),
            self.frame_level(self.variable_frame(var))
        )
    }
}

/// A sequence of nodes evaluated left to right.
pub type AstSeq = Vec<Ast>;

#[derive(Debug, Clone)]
pub enum Ast {
    Unspecified {
        coords: SourceCoords,
    },
    Var {
        coords: SourceCoords,
        var: VariableId,
    },
    /// A literal constant, retained as the syntax datum it came from.
    Datum {
        coords: SourceCoords,
        datum: SyntaxRef,
    },
    Set {
        coords: SourceCoords,
        target: VariableId,
        rvalue: AstSeq,
    },
    Apply {
        coords: SourceCoords,
        target: AstSeq,
        args: Vec<AstSeq>,
        list_arg: Option<AstSeq>,
    },
    If {
        coords: SourceCoords,
        cond: AstSeq,
        then_branch: AstSeq,
        /// Absent else means the unspecified value.
        else_branch: Option<AstSeq>,
    },
    Closure {
        coords: SourceCoords,
        enclosing_frame: FrameId,
        params: Vec<VariableId>,
        list_param: Option<VariableId>,
        param_frame: FrameId,
        body_frame: FrameId,
        body: Box<AstBody>,
    },
    Let(AstLet),
    /// A `Let` whose init values are known closures and whose variables
    /// are never assigned. Produced by a later assignment-analysis pass,
    /// never by the parser.
    Fix(AstLet),
}

#[derive(Debug, Clone)]
pub struct AstLet {
    pub coords: SourceCoords,
    pub enclosing_frame: FrameId,
    pub params: Vec<VariableId>,
    pub values: Vec<AstSeq>,
    pub param_frame: FrameId,
    pub body_frame: FrameId,
    pub body: Box<AstBody>,
}

/// One deferred definition of a body. A missing variable marks the
/// synthetic definition that packages top-level expressions preceding a
/// `define`; it is evaluated for effect only.
#[derive(Debug, Clone)]
pub struct BodyDef {
    pub var: Option<VariableId>,
    pub init: AstSeq,
}

/// The definitions and expressions of a body, with `letrec*` semantics:
/// all variables are bound first, then the inits run in order, then the
/// expressions. Lowering to a `let` with a `set!` chain is the code
/// generator's job.
#[derive(Debug, Clone, Default)]
pub struct AstBody {
    pub defs: Vec<BodyDef>,
    pub exprs: AstSeq,
}

/// A compiled top-level program: the root body plus the frame arena its
/// variables live in.
#[derive(Debug)]
pub struct AstModule {
    pub frames: Frames,
    pub top_frame: FrameId,
    pub body: AstBody,
}

impl AstModule {
    pub fn dump(&self, st: &SymbolTable) -> String {
        let printer = AstPrinter {
            st,
            frames: &self.frames,
        };
        let mut out = String::new();
        printer.write_body(&mut out, &self.body, 0);
        out.push('\n');
        out
    }
}

/// Pretty-printer for AST dumps: four spaces per level, indentation
/// threaded explicitly.
pub struct AstPrinter<'a> {
    pub st: &'a SymbolTable,
    pub frames: &'a Frames,
}

impl AstPrinter<'_> {
    fn pad(out: &mut String, indent: usize) {
        for _ in 0..indent {
            out.push(' ');
        }
    }

    /// A sequence prints as its single element, or as a `(tag ...)` block
    /// with one element per line.
    pub fn write_seq(&self, out: &mut String, seq: &[Ast], indent: usize, tag: &str) {
        match seq.len() {
            0 => {}
            1 => self.write_ast(out, &seq[0], indent),
            _ => {
                out.push('(');
                out.push_str(tag);
                let inner = indent + 4;
                for ast in seq {
                    out.push('\n');
                    Self::pad(out, inner);
                    self.write_ast(out, ast, inner);
                }
                out.push(')');
            }
        }
    }

    pub fn write_body(&self, out: &mut String, body: &AstBody, indent: usize) {
        if body.defs.is_empty() {
            self.write_seq(out, &body.exprs, indent, "BODY");
            return;
        }

        out.push_str("(LETREC*");
        out.push('\n');
        Self::pad(out, indent + 4);
        out.push('(');
        for def in &body.defs {
            out.push('\n');
            Self::pad(out, indent + 8);
            out.push('(');
            match def.var {
                Some(var) => out.push_str(&self.frames.variable_display(var)),
                None => out.push_str("<unused>"),
            }
            out.push(' ');
            self.write_seq(out, &def.init, indent + 8, "begin");
            out.push(')');
        }
        out.push(')');
        for expr in &body.exprs {
            out.push('\n');
            Self::pad(out, indent + 4);
            self.write_ast(out, expr, indent + 4);
        }
        out.push(')');
    }

    pub fn write_ast(&self, out: &mut String, ast: &Ast, indent: usize) {
        match ast {
            Ast::Unspecified { .. } => out.push_str("(UNSPECIFIED)"),
            Ast::Var { var, .. } => {
                out.push_str("(VAR ");
                out.push_str(&self.frames.variable_display(*var));
                out.push(')');
            }
            Ast::Datum { datum, .. } => {
                out.push_str("(DATUM ");
                datum.write(self.st, out);
                out.push(')');
            }
            Ast::Set { target, rvalue, .. } => {
                out.push_str("(SET");
                let inner = indent + 4;
                out.push('\n');
                Self::pad(out, inner);
                out.push_str(&self.frames.variable_display(*target));
                out.push('\n');
                Self::pad(out, inner);
                self.write_seq(out, rvalue, inner, "begin");
                out.push(')');
            }
            Ast::Apply {
                target,
                args,
                list_arg,
                ..
            } => {
                out.push_str("(APPLY ");
                self.write_seq(out, target, indent, "begin");
                for arg in args {
                    out.push(' ');
                    self.write_seq(out, arg, indent, "begin");
                }
                out.push(' ');
                match list_arg {
                    Some(seq) => self.write_seq(out, seq, indent, "begin"),
                    None => out.push_str("'()"),
                }
                out.push(')');
            }
            Ast::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                out.push_str("(IF");
                let inner = indent + 4;
                out.push('\n');
                Self::pad(out, inner);
                self.write_seq(out, cond, inner, "begin");
                out.push('\n');
                Self::pad(out, inner);
                self.write_seq(out, then_branch, inner, "begin");
                if let Some(els) = else_branch {
                    out.push('\n');
                    Self::pad(out, inner);
                    self.write_seq(out, els, inner, "begin");
                }
                out.push(')');
            }
            Ast::Closure {
                params,
                list_param,
                body,
                ..
            } => {
                out.push_str("(CLOSURE (");
                for (i, var) in params.iter().enumerate() {
                    if i != 0 {
                        out.push(' ');
                    }
                    out.push_str(&self.frames.variable_display(*var));
                }
                if let Some(rest) = list_param {
                    if !params.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(". ");
                    out.push_str(&self.frames.variable_display(*rest));
                }
                out.push(')');
                let inner = indent + 4;
                out.push('\n');
                Self::pad(out, inner);
                self.write_body(out, body, inner);
                out.push(')');
            }
            Ast::Let(let_) => self.write_let(out, let_, indent, "LET"),
            Ast::Fix(let_) => self.write_let(out, let_, indent, "FIX"),
        }
    }

    fn write_let(&self, out: &mut String, let_: &AstLet, indent: usize, tag: &str) {
        out.push('(');
        out.push_str(tag);
        let inner = indent + 4;
        out.push('\n');
        Self::pad(out, inner);
        out.push('(');
        for (var, value) in let_.params.iter().zip(let_.values.iter()) {
            out.push('\n');
            Self::pad(out, inner + 4);
            out.push('(');
            out.push_str(&self.frames.variable_display(*var));
            out.push(' ');
            self.write_seq(out, value, inner + 4, "begin");
            out.push(')');
        }
        out.push(')');
        out.push('\n');
        Self::pad(out, inner);
        self.write_body(out, &let_.body, inner);
        out.push(')');
    }
}
