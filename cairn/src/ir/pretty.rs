//! A pretty printer for parser state machines.
//!
//! The output uses the same syntax accepted by the [reader], so printed
//! programs can be read back in.
//!
//! Example:
//!
//! ```
//! use cairn::ir::pretty::Context;
//! use cairn::ir::Program;
//!
//! let program = Program { parsers: Vec::new() };
//!
//! let pp = Context::new();
//! let doc = pp.program(&program);
//! assert_eq!(doc.pretty(80).to_string(), "");
//! ```
//!
//! [reader]: crate::reader

use pretty::RcDoc;

use crate::ir::{BitType, Call, Decl, Expr, Offset, Parser, Program, State, Stmt, VarDecl};

const INDENT: isize = 4;

pub struct Context {
    show_ir: bool,
}

impl Context {
    pub fn new() -> Context {
        Context { show_ir: false }
    }

    /// Precede each node with a comment naming its kind.
    pub fn with_ir_annotations(show_ir: bool) -> Context {
        Context { show_ir }
    }

    fn annotation(&self, kind: &'static str) -> RcDoc {
        match self.show_ir {
            true => RcDoc::text("// ").append(kind).append(RcDoc::hardline()),
            false => RcDoc::nil(),
        }
    }

    pub fn program(&self, program: &Program) -> RcDoc {
        RcDoc::intersperse(
            program.parsers.iter().map(|parser| self.parser(parser)),
            RcDoc::hardline().append(RcDoc::hardline()),
        )
    }

    pub fn parser(&self, parser: &Parser) -> RcDoc {
        let decls = parser.decls.iter().map(|decl| self.decl(decl));
        let states = parser.states.iter().map(|state| self.state(state));

        RcDoc::concat([
            self.annotation("ParserStateMachine"),
            RcDoc::text("parser"),
            RcDoc::space(),
            RcDoc::text(parser.name.resolve()),
            RcDoc::space(),
            self.block(decls.chain(states)),
        ])
    }

    fn block<'a>(&'a self, items: impl Iterator<Item = RcDoc<'a>>) -> RcDoc<'a> {
        RcDoc::concat([
            RcDoc::text("{"),
            RcDoc::concat(items.map(|item| RcDoc::hardline().append(item))).nest(INDENT),
            RcDoc::hardline(),
            RcDoc::text("}"),
        ])
    }

    fn decl(&self, decl: &Decl) -> RcDoc {
        match decl {
            Decl::Header {
                name,
                width,
                fields,
            } => RcDoc::concat([
                self.annotation("HeaderDeclaration"),
                RcDoc::text("header"),
                RcDoc::space(),
                RcDoc::text(name.clone()),
                RcDoc::space(),
                RcDoc::text(":"),
                RcDoc::space(),
                RcDoc::text(width.to_string()),
                match fields.as_slice() {
                    [] => RcDoc::text(";"),
                    fields => RcDoc::space().append(self.block(fields.iter().map(|field| {
                        self.annotation("HeaderField")
                            .append(self.var_decl(field))
                    }))),
                },
            ]),
            Decl::Var(decl) => self
                .annotation("VariableDeclaration")
                .append(self.var_decl(decl)),
        }
    }

    fn var_decl(&self, decl: &VarDecl) -> RcDoc {
        RcDoc::concat([
            self.bit_type(&decl.r#type),
            RcDoc::space(),
            RcDoc::text(decl.name.resolve()),
            RcDoc::text(";"),
        ])
    }

    pub fn state(&self, state: &State) -> RcDoc {
        RcDoc::concat([
            self.annotation("ParserState"),
            RcDoc::text("state"),
            RcDoc::space(),
            RcDoc::text(state.name.resolve()),
            RcDoc::space(),
            self.block(state.stmts.iter().map(|stmt| self.stmt(stmt))),
        ])
    }

    pub fn stmt(&self, stmt: &Stmt) -> RcDoc {
        let body = match stmt {
            Stmt::Decl(decl) => self.var_decl(decl),
            Stmt::Assign { target, source } => RcDoc::concat([
                self.expr(target),
                RcDoc::space(),
                RcDoc::text("="),
                RcDoc::space(),
                self.expr(source),
                RcDoc::text(";"),
            ]),
            Stmt::Call(call) => self.call(call).append(";"),
            Stmt::ExtractHeader { header, range } => RcDoc::concat([
                RcDoc::text("ExtractHeader"),
                RcDoc::space(),
                RcDoc::text(format!("{header:?}")),
                RcDoc::space(),
                RcDoc::text(range.to_string()),
                RcDoc::text(";"),
            ]),
            Stmt::Move(offset) => RcDoc::concat([
                RcDoc::text("Move"),
                RcDoc::space(),
                self.offset(offset),
                RcDoc::text(";"),
            ]),
            Stmt::Transition(target) => RcDoc::concat([
                RcDoc::text("transition"),
                RcDoc::space(),
                RcDoc::text(target.resolve()),
                RcDoc::text(";"),
            ]),
        };

        self.annotation(stmt.kind_name()).append(body)
    }

    pub fn expr(&self, expr: &Expr) -> RcDoc {
        match expr {
            Expr::Var(name) => RcDoc::text(name.resolve()),
            Expr::Member(head, label) => RcDoc::concat([
                self.expr(head),
                RcDoc::text("."),
                RcDoc::text(label.resolve()),
            ]),
            Expr::Const(value) => RcDoc::text(value.to_string()),
            Expr::Cast(r#type, expr) => RcDoc::concat([
                RcDoc::text("("),
                self.bit_type(r#type),
                RcDoc::text(")"),
                RcDoc::space(),
                self.expr(expr),
            ]),
            Expr::Call(call) => self.call(call),
            Expr::Packet(range) => RcDoc::text(range.to_string()),
        }
    }

    fn call(&self, call: &Call) -> RcDoc {
        let type_args = match call.type_args.as_slice() {
            [] => RcDoc::nil(),
            type_args => RcDoc::concat([
                RcDoc::text("<"),
                RcDoc::intersperse(
                    type_args.iter().map(|r#type| self.bit_type(r#type)),
                    RcDoc::text(", "),
                ),
                RcDoc::text(">"),
            ]),
        };

        RcDoc::concat([
            self.expr(&call.callee),
            type_args,
            RcDoc::text("("),
            RcDoc::intersperse(call.args.iter().map(|arg| self.expr(arg)), RcDoc::text(", ")),
            RcDoc::text(")"),
        ])
    }

    fn bit_type(&self, r#type: &BitType) -> RcDoc {
        RcDoc::text(r#type.to_string())
    }

    fn offset(&self, offset: &Offset) -> RcDoc {
        RcDoc::text(offset.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    fn render(stmt: &Stmt) -> String {
        Context::new().stmt(stmt).pretty(80).to_string()
    }

    #[test]
    fn lowered_statements() {
        let range = crate::ir::BitRange {
            lo: Offset::constant(112),
            hi: Offset {
                base: 271,
                terms: vec![Symbol::intern("x")],
            },
        };
        let extract = Stmt::ExtractHeader {
            header: "hdr.ipv4".to_owned(),
            range,
        };
        assert_eq!(
            render(&extract),
            r#"ExtractHeader "hdr.ipv4" packet[112 : 271+x];"#
        );

        let r#move = Stmt::Move(Offset {
            base: 272,
            terms: vec![Symbol::intern("x")],
        });
        assert_eq!(render(&r#move), "Move 272+x;");
    }

    #[test]
    fn method_calls() {
        let packet = Box::new(Expr::Var(Symbol::intern("packet")));
        let lookahead = Expr::Call(Call {
            callee: Box::new(Expr::Member(packet, Symbol::intern("lookahead"))),
            type_args: vec![BitType {
                width: 8,
                signed: false,
            }],
            args: Vec::new(),
        });
        let assign = Stmt::Assign {
            target: Expr::Var(Symbol::intern("x")),
            source: lookahead,
        };
        assert_eq!(render(&assign), "x = packet.lookahead<bit<8>>();");
    }

    #[test]
    fn header_fields() {
        let field = VarDecl {
            name: Symbol::intern("ty"),
            r#type: BitType {
                width: 16,
                signed: false,
            },
        };
        let header = |fields| Decl::Header {
            name: "hdr.eth".to_owned(),
            width: 112,
            fields,
        };

        let context = Context::new();
        let doc = context.decl(&header(Vec::new()));
        assert_eq!(doc.pretty(80).to_string(), "header hdr.eth : 112;");

        let context = Context::with_ir_annotations(true);
        let doc = context.decl(&header(vec![field]));
        assert_eq!(
            doc.pretty(80).to_string(),
            "// HeaderDeclaration\nheader hdr.eth : 112 {\n    // HeaderField\n    bit<16> ty;\n}",
        );
    }

    #[test]
    fn annotated_state() {
        let state = State {
            name: Symbol::intern("start"),
            stmts: vec![Stmt::Transition(Symbol::intern("accept"))],
        };
        let context = Context::with_ir_annotations(true);
        let doc = context.state(&state);
        assert_eq!(
            doc.pretty(80).to_string(),
            "// ParserState\nstate start {\n    // TransitionStatement\n    transition accept;\n}",
        );
    }
}
