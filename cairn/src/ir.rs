//! The parser state machine intermediate representation.
//!
//! Programs are produced by the [reader], rewritten by value by the passes in
//! [`crate::pass`], and rendered back to text by [pretty].
//!
//! [reader]: crate::reader

use std::fmt;

use crate::symbol::Symbol;

pub mod pretty;
pub mod typing;

/// Name of the state every parser starts in.
pub const START_STATE: &str = "start";
/// Terminal states that can be transitioned to without being declared.
pub const BUILTIN_STATES: &[&str] = &["accept", "reject"];

/// The largest bit width a header or type may declare. Keeping widths within
/// 32 bits keeps every cursor sum well inside `i64`.
pub const MAX_WIDTH: u64 = u32::MAX as u64;

/// Name of the method that consumes a header from the packet.
pub const EXTRACT_METHOD: &str = "extract";
/// Name of the method that peeks at upcoming packet bits.
pub const LOOKAHEAD_METHOD: &str = "lookahead";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub parsers: Vec<Parser>,
}

/// A parser state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parser {
    pub name: Symbol,
    /// Header instances and scalar variables visible in every state.
    pub decls: Vec<Decl>,
    /// States in declaration order.
    pub states: Vec<State>,
}

impl Parser {
    pub fn state(&self, name: Symbol) -> Option<&State> {
        self.states.iter().find(|state| state.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decl {
    /// A header instance with the bit width of its fixed portion, and the
    /// fields that can be assigned to individually.
    Header {
        name: String,
        width: u64,
        fields: Vec<VarDecl>,
    },
    Var(VarDecl),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct State {
    pub name: Symbol,
    /// Statements in execution order.
    pub stmts: Vec<Stmt>,
}

impl State {
    pub fn is_start(&self) -> bool {
        self.name.resolve() == START_STATE
    }
}

/// Insert `stmt` just before the trailing transition of a state, or at the end
/// if the state has no transition.
pub fn insert_before_transition(stmts: &mut Vec<Stmt>, stmt: Stmt) {
    match stmts.last() {
        Some(Stmt::Transition(_)) => stmts.insert(stmts.len() - 1, stmt),
        _ => stmts.push(stmt),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    Decl(VarDecl),
    Assign { target: Expr, source: Expr },
    Call(Call),
    /// A header read from an explicit range of the packet buffer.
    ExtractHeader { header: String, range: BitRange },
    /// Advance the packet cursor to the given offset.
    Move(Offset),
    Transition(Symbol),
}

impl Stmt {
    /// A short name for the kind of statement, used when annotating output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Decl(_) => "VariableDeclaration",
            Stmt::Assign { .. } => "AssignmentStatement",
            Stmt::Call(call) if call.is_method(EXTRACT_METHOD) => "ExtractStatement",
            Stmt::Call(_) => "MethodCallStatement",
            Stmt::ExtractHeader { .. } => "ExtractHeaderStatement",
            Stmt::Move(_) => "MoveStatement",
            Stmt::Transition(_) => "TransitionStatement",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VarDecl {
    pub name: Symbol,
    pub r#type: BitType,
}

/// A fixed-width bit string type: `bit<W>` or `int<W>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitType {
    pub width: u64,
    pub signed: bool,
}

impl fmt::Display for BitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signed {
            true => write!(f, "int<{}>", self.width),
            false => write!(f, "bit<{}>", self.width),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Var(Symbol),
    Member(Box<Expr>, Symbol),
    Const(u64),
    Cast(BitType, Box<Expr>),
    Call(Call),
    /// A read of `packet[lo : hi]`.
    Packet(BitRange),
}

impl Expr {
    pub fn as_var(&self) -> Option<Symbol> {
        match self {
            Expr::Var(name) => Some(*name),
            _ => None,
        }
    }

    /// The variable named by this expression, looking through a single cast.
    pub fn var_through_cast(&self) -> Option<Symbol> {
        match self {
            Expr::Var(name) => Some(*name),
            Expr::Cast(_, expr) => expr.as_var(),
            _ => None,
        }
    }

    /// Replace the variable named by this expression, looking through a single
    /// cast. Other expressions are left alone.
    pub fn rename_through_cast(&mut self, new_name: Symbol) {
        match self {
            Expr::Var(name) => *name = new_name,
            Expr::Cast(_, expr) => expr.rename_through_cast(new_name),
            _ => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let context = pretty::Context::new();
        let doc = context.expr(self);
        write!(f, "{}", doc.pretty(usize::MAX))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub callee: Box<Expr>,
    pub type_args: Vec<BitType>,
    pub args: Vec<Expr>,
}

impl Call {
    /// The method name if the callee is a member access.
    pub fn method(&self) -> Option<Symbol> {
        match self.callee.as_ref() {
            Expr::Member(_, method) => Some(*method),
            _ => None,
        }
    }

    pub fn is_method(&self, name: &str) -> bool {
        self.method().map_or(false, |method| method.resolve() == name)
    }
}

/// An inclusive range of packet bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitRange {
    pub lo: Offset,
    pub hi: Offset,
}

impl BitRange {
    /// The number of bits in the range, when both bounds share their symbolic
    /// terms.
    pub fn fixed_width(&self) -> Option<u64> {
        match self.lo.terms == self.hi.terms {
            true => u64::try_from(self.hi.base - self.lo.base + 1).ok(),
            false => None,
        }
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "packet[{} : {}]", self.lo, self.hi)
    }
}

/// A bit offset: a constant plus the runtime values of some variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Offset {
    pub base: i64,
    pub terms: Vec<Symbol>,
}

impl Offset {
    pub fn constant(base: i64) -> Offset {
        Offset {
            base,
            terms: Vec::new(),
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for term in &self.terms {
            write!(f, "+{term}")?;
        }
        Ok(())
    }
}
