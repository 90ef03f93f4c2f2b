//! Bit widths of the variables and headers referred to by a parser.
//!
//! Programs arrive already type checked, so this only needs to look up the
//! declared types. An environment is built once per parser for each pass and
//! serves every lookup made while that pass rewrites the parser.

use fxhash::FxHashMap;

use crate::ir::{BitType, Decl, Expr, Parser, State, Stmt, LOOKAHEAD_METHOD};
use crate::symbol::Symbol;

pub trait TypeMap {
    /// The declared type of a scalar variable.
    fn var_type(&self, name: Symbol) -> Option<BitType>;

    /// The width of the fixed portion of a header instance.
    fn header_width(&self, name: &str) -> Option<u64>;

    /// The declared type of a header field, named by its full path.
    fn field_type(&self, path: &str) -> Option<BitType>;

    /// The width in bits of the value produced by an expression, if it can be
    /// known statically.
    fn width_of(&self, expr: &Expr) -> Option<u64> {
        match expr {
            Expr::Var(name) => (self.var_type(*name).map(|r#type| r#type.width))
                .or_else(|| self.header_width(name.resolve())),
            Expr::Member(..) => {
                let path = expr.to_string();
                (self.field_type(&path).map(|r#type| r#type.width))
                    .or_else(|| self.header_width(&path))
            }
            Expr::Const(_) => None,
            Expr::Cast(r#type, _) => Some(r#type.width),
            Expr::Call(call) if call.is_method(LOOKAHEAD_METHOD) => {
                call.type_args.first().map(|r#type| r#type.width)
            }
            Expr::Call(_) => None,
            Expr::Packet(range) => range.fixed_width(),
        }
    }
}

/// Types declared at the top of a parser.
pub struct TypeEnv {
    headers: FxHashMap<String, u64>,
    fields: FxHashMap<String, BitType>,
    vars: FxHashMap<Symbol, BitType>,
}

impl TypeEnv {
    pub fn new() -> TypeEnv {
        TypeEnv {
            headers: FxHashMap::default(),
            fields: FxHashMap::default(),
            vars: FxHashMap::default(),
        }
    }

    pub fn for_parser(parser: &Parser) -> TypeEnv {
        let mut env = TypeEnv::new();
        for decl in &parser.decls {
            match decl {
                Decl::Header {
                    name,
                    width,
                    fields,
                } => {
                    env.headers.insert(name.clone(), *width);
                    for field in fields {
                        env.fields.insert(format!("{name}.{}", field.name), field.r#type);
                    }
                }
                Decl::Var(decl) => {
                    env.vars.insert(decl.name, decl.r#type);
                }
            }
        }
        env
    }

    /// Extend the environment with the variables declared in a state.
    pub fn state_scope<'env>(&'env self, state: &State) -> StateScope<'env> {
        let locals = (state.stmts.iter())
            .filter_map(|stmt| match stmt {
                Stmt::Decl(decl) => Some((decl.name, decl.r#type)),
                _ => None,
            })
            .collect();

        StateScope {
            parent: self,
            locals,
        }
    }

    /// Returns true if `name` is already used by a declaration.
    pub fn is_declared(&self, name: &str) -> bool {
        self.headers.contains_key(name) || self.vars.keys().any(|var| var.resolve() == name)
    }
}

impl TypeMap for TypeEnv {
    fn var_type(&self, name: Symbol) -> Option<BitType> {
        self.vars.get(&name).copied()
    }

    fn header_width(&self, name: &str) -> Option<u64> {
        self.headers.get(name).copied()
    }

    fn field_type(&self, path: &str) -> Option<BitType> {
        self.fields.get(path).copied()
    }
}

/// The types visible inside a single parser state.
pub struct StateScope<'env> {
    parent: &'env TypeEnv,
    locals: FxHashMap<Symbol, BitType>,
}

impl<'env> StateScope<'env> {
    /// Returns true if `name` is declared inside the state itself.
    pub fn is_local(&self, name: Symbol) -> bool {
        self.locals.contains_key(&name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.locals.keys().any(|local| local.resolve() == name) || self.parent.is_declared(name)
    }
}

impl<'env> TypeMap for StateScope<'env> {
    fn var_type(&self, name: Symbol) -> Option<BitType> {
        (self.locals.get(&name).copied()).or_else(|| self.parent.var_type(name))
    }

    fn header_width(&self, name: &str) -> Option<u64> {
        self.parent.header_width(name)
    }

    fn field_type(&self, path: &str) -> Option<BitType> {
        self.parent.field_type(path)
    }
}
