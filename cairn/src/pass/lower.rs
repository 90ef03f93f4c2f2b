//! Lowering of `extract` and `lookahead` calls to explicit packet bit ranges.
//!
//! A single cursor is threaded through the states of a parser in declaration
//! order. Fixed-width reads advance its constant part, and reads whose length
//! is only known at runtime add the length variable to its symbolic suffix.
//! Transitions are not followed, so offsets are only exact for parsers that
//! run their states in declaration order.

use crate::ir::typing::{TypeEnv, TypeMap};
use crate::ir::{self, BitRange, Call, Expr, Offset, Parser, State, Stmt};
use crate::pass::Pass;
use crate::symbol::Symbol;

pub struct LowerExtracts;

impl Pass for LowerExtracts {
    fn name(&self) -> &'static str {
        "lower-extracts"
    }

    fn run(&self, parser: Parser) -> Parser {
        let env = TypeEnv::for_parser(&parser);
        let mut cursor = Cursor::default();

        let states = (parser.states.into_iter())
            .map(|state| cursor.lower_state(&env, state))
            .collect();

        Parser { states, ..parser }
    }
}

/// The position of the next unread packet bit.
#[derive(Default)]
struct Cursor {
    /// Bits consumed by reads of a statically known width. Never exceeds
    /// `i64::MAX`, so it converts to an offset losslessly.
    bits: u64,
    /// Variables holding the lengths of variable-width reads, in read order.
    suffix: Vec<Symbol>,
}

impl Cursor {
    /// Returns true if the next `width` bits end at a representable offset.
    fn fits(&self, width: u64) -> bool {
        (self.bits.checked_add(width)).map_or(false, |end| i64::try_from(end).is_ok())
    }

    fn offset(&self, delta: i64) -> Offset {
        Offset {
            base: self.bits as i64 + delta,
            terms: self.suffix.clone(),
        }
    }

    /// The range covering the next `width` bits, plus `length` more bits when
    /// the read has a runtime length.
    fn range(&self, width: u64, length: Option<Symbol>) -> BitRange {
        let mut hi = self.offset(width as i64 - 1);
        hi.terms.extend(length);

        BitRange {
            lo: self.offset(0),
            hi,
        }
    }

    fn lower_state(&mut self, env: &TypeEnv, state: State) -> State {
        let scope = env.state_scope(&state);
        let is_start = state.is_start();

        let mut stmts = (state.stmts.into_iter())
            .map(|stmt| self.lower_stmt(&scope, stmt))
            .collect::<Vec<_>>();

        if is_start {
            let offset = self.offset(0);
            log::debug!("moving cursor to {offset} at the end of `{}`", state.name);
            ir::insert_before_transition(&mut stmts, Stmt::Move(offset));
        }

        State {
            name: state.name,
            stmts,
        }
    }

    fn lower_stmt(&mut self, types: &impl TypeMap, stmt: Stmt) -> Stmt {
        match stmt {
            Stmt::Assign {
                target,
                source: Expr::Call(call),
            } if call.is_method(ir::LOOKAHEAD_METHOD) => {
                let source = Expr::Call(call);
                match (types.width_of(&target), types.width_of(&source)) {
                    (Some(_), Some(width)) if self.fits(width) => {
                        let range = self.range(width, None);
                        log::trace!("lowered lookahead into `{target}` to {range}");
                        Stmt::Assign {
                            target,
                            source: Expr::Packet(range),
                        }
                    }
                    (Some(_), Some(width)) => {
                        log::warn!(
                            "leaving lookahead of {width} bits into `{target}`: offset overflows"
                        );
                        Stmt::Assign { target, source }
                    }
                    _ => {
                        log::debug!("leaving lookahead into `{target}` with an unresolved type");
                        Stmt::Assign { target, source }
                    }
                }
            }
            Stmt::Call(call) if call.is_method(ir::EXTRACT_METHOD) => {
                match extract_operands(types, &call) {
                    Some((header, width, length)) if self.fits(width) => {
                        let range = self.range(width, length);
                        log::trace!("lowered extract of `{header}` to {range}");

                        self.bits += width;
                        self.suffix.extend(length);
                        Stmt::ExtractHeader { header, range }
                    }
                    Some((header, width, _)) => {
                        log::warn!(
                            "leaving extract of {width} bits from `{header}`: offset overflows"
                        );
                        Stmt::Call(call)
                    }
                    None => Stmt::Call(call),
                }
            }
            stmt => stmt,
        }
    }
}

/// The name and fixed width of the header being extracted, and the variable
/// holding its runtime length if it has one.
fn extract_operands(types: &impl TypeMap, call: &Call) -> Option<(String, u64, Option<Symbol>)> {
    let (header, length) = match call.args.as_slice() {
        [header] => (header, None),
        [header, length] => match length.var_through_cast() {
            Some(length) => (header, Some(length)),
            None => {
                log::warn!("leaving extract of `{header}` with unsupported length `{length}`");
                return None;
            }
        },
        args => panic!(
            "`{}` expects one or two arguments, found {}",
            ir::EXTRACT_METHOD,
            args.len(),
        ),
    };

    match types.width_of(header) {
        Some(width) => Some((header.to_string(), width, length)),
        None => {
            log::debug!("leaving extract of `{header}` with an unresolved width");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pretty::Context;
    use crate::ir::Decl;
    use crate::pass::tests::run_passes;
    use crate::pass::{PassKind, PassManager};
    use crate::reader;

    fn lower(source: &str) -> String {
        run_passes(&[PassKind::Lower], source)
    }

    #[test]
    fn fixed_and_variable_width_extracts() {
        assert_eq!(
            lower(
                "parser ParserImpl {
                    header hdr.eth : 112;
                    header hdr.ipv4 : 160;
                    bit<8> x;
                    state start {
                        packet.extract(hdr.eth);
                        x = packet.lookahead<bit<8>>();
                        packet.extract(hdr.ipv4, x);
                        transition accept;
                    }
                }"
            ),
            "parser ParserImpl {
    header hdr.eth : 112;
    header hdr.ipv4 : 160;
    bit<8> x;
    state start {
        ExtractHeader \"hdr.eth\" packet[0 : 111];
        x = packet[112 : 119];
        ExtractHeader \"hdr.ipv4\" packet[112 : 271+x];
        Move 272+x;
        transition accept;
    }
}"
        );
    }

    #[test]
    fn lookahead_does_not_consume() {
        assert_eq!(
            lower(
                "parser P {
                    header hdr.h : 16;
                    bit<4> x;
                    state start {
                        x = packet.lookahead<bit<4>>();
                        packet.extract(hdr.h);
                        transition accept;
                    }
                }"
            ),
            "parser P {
    header hdr.h : 16;
    bit<4> x;
    state start {
        x = packet[0 : 3];
        ExtractHeader \"hdr.h\" packet[0 : 15];
        Move 16;
        transition accept;
    }
}"
        );
    }

    #[test]
    fn suffix_accumulates() {
        assert_eq!(
            lower(
                "parser P {
                    header hdr.a : 8;
                    header hdr.b : 8;
                    header hdr.c : 8;
                    bit<32> x;
                    bit<32> y;
                    state start {
                        packet.extract(hdr.a, x);
                        packet.extract(hdr.b, (bit<32>) y);
                        packet.extract(hdr.c);
                        transition accept;
                    }
                }"
            ),
            "parser P {
    header hdr.a : 8;
    header hdr.b : 8;
    header hdr.c : 8;
    bit<32> x;
    bit<32> y;
    state start {
        ExtractHeader \"hdr.a\" packet[0 : 7+x];
        ExtractHeader \"hdr.b\" packet[8+x : 15+x+y];
        ExtractHeader \"hdr.c\" packet[16+x+y : 23+x+y];
        Move 24+x+y;
        transition accept;
    }
}"
        );
    }

    #[test]
    fn unresolved_types_are_left_alone() {
        let source = "parser P {
    header hdr.h : 8;
    state start {
        hdr.h.missing = packet.lookahead<bit<8>>();
        y = packet.lookahead<bit<8>>();
        packet.extract(hdr.unknown);
        packet.extract(hdr.h, 8);
        Move 0;
        transition accept;
    }
}";
        // Only the `Move` is new, and it matches the one already there.
        let expected = source.replace("Move 0;", "Move 0;\n        Move 0;");
        assert_eq!(lower(source), expected);
    }

    #[test]
    fn lookahead_into_header_field() {
        assert_eq!(
            lower(
                "parser P {
                    header hdr.eth : 112 {
                        bit<16> ty;
                    }
                    state start {
                        packet.extract(hdr.eth);
                        hdr.eth.ty = packet.lookahead<bit<16>>();
                        transition accept;
                    }
                }"
            ),
            "parser P {
    header hdr.eth : 112 {
        bit<16> ty;
    }
    state start {
        ExtractHeader \"hdr.eth\" packet[0 : 111];
        hdr.eth.ty = packet[112 : 127];
        Move 112;
        transition accept;
    }
}"
        );
    }

    #[test]
    fn overflowing_widths_are_left_alone() {
        let mut program = reader::read_program(
            0,
            "parser P {
                header big : 8;
                header h : 8;
                bit<8> x;
                state start {
                    packet.extract(big);
                    packet.extract(h);
                    x = packet.lookahead<bit<8>>();
                }
            }",
        )
        .unwrap();
        // Wider than the reader accepts, as a program built in memory could be
        match &mut program.parsers[0].decls[0] {
            Decl::Header { width, .. } => *width = u64::MAX,
            decl => panic!("unexpected declaration: {decl:?}"),
        }

        let program = PassManager::from_kinds(&[PassKind::Lower]).run(program);
        assert_eq!(
            Context::new().program(&program).pretty(80).to_string(),
            "parser P {
    header big : 18446744073709551615;
    header h : 8;
    bit<8> x;
    state start {
        packet.extract(big);
        ExtractHeader \"h\" packet[0 : 7];
        x = packet[8 : 15];
        Move 8;
    }
}"
        );

        let mut cursor = Cursor {
            bits: i64::MAX as u64 - 8,
            suffix: Vec::new(),
        };
        assert!(cursor.fits(8));
        assert!(!cursor.fits(9));
        cursor.bits = 0;
        assert!(!cursor.fits(u64::MAX));
    }

    #[test]
    fn move_only_in_start() {
        assert_eq!(
            lower(
                "parser P {
                    header hdr.h : 8;
                    state parse_h {
                        packet.extract(hdr.h);
                        transition accept;
                    }
                    state start {
                        transition parse_h;
                    }
                }"
            ),
            "parser P {
    header hdr.h : 8;
    state parse_h {
        ExtractHeader \"hdr.h\" packet[0 : 7];
        transition accept;
    }
    state start {
        Move 8;
        transition parse_h;
    }
}"
        );
    }

    #[test]
    fn move_appended_without_transition() {
        assert_eq!(
            lower("parser P { header h : 4; state start { packet.extract(h); } }"),
            "parser P {
    header h : 4;
    state start {
        ExtractHeader \"h\" packet[0 : 3];
        Move 4;
    }
}"
        );
    }

    /// The cursor follows declaration order rather than transitions, so states
    /// on different paths are placed one after another.
    #[test]
    fn cursor_carries_across_states_in_declaration_order() {
        assert_eq!(
            lower(
                "parser P {
                    header hdr.eth : 112;
                    header hdr.ipv4 : 160;
                    header hdr.ipv6 : 320;
                    state start {
                        packet.extract(hdr.eth);
                        transition parse_ipv4;
                    }
                    state parse_ipv4 {
                        packet.extract(hdr.ipv4);
                        transition accept;
                    }
                    state parse_ipv6 {
                        packet.extract(hdr.ipv6);
                        transition accept;
                    }
                }"
            ),
            "parser P {
    header hdr.eth : 112;
    header hdr.ipv4 : 160;
    header hdr.ipv6 : 320;
    state start {
        ExtractHeader \"hdr.eth\" packet[0 : 111];
        Move 112;
        transition parse_ipv4;
    }
    state parse_ipv4 {
        ExtractHeader \"hdr.ipv4\" packet[112 : 271];
        transition accept;
    }
    state parse_ipv6 {
        ExtractHeader \"hdr.ipv6\" packet[272 : 591];
        transition accept;
    }
}"
        );
    }

    #[test]
    fn cursor_resets_per_parser() {
        let output = lower(
            "parser A { header h : 8; state start { packet.extract(h); } }
             parser B { header h : 8; state start { packet.extract(h); } }",
        );
        assert_eq!(output.matches("packet[0 : 7]").count(), 2);
        assert_eq!(output.matches("Move 8;").count(), 2);
    }

    #[test]
    fn state_local_lookahead_targets() {
        assert_eq!(
            lower(
                "parser P {
                    state start {
                        int<16> tmp;
                        tmp = packet.lookahead<int<16>>();
                        transition accept;
                    }
                }"
            ),
            "parser P {
    state start {
        int<16> tmp;
        tmp = packet[0 : 15];
        Move 0;
        transition accept;
    }
}"
        );
    }

    #[test]
    #[should_panic(expected = "`extract` expects one or two arguments, found 3")]
    fn malformed_extract() {
        let program = reader::read_program(
            0,
            "parser P { header h : 8; state start { packet.extract(h, x, y); } }",
        )
        .unwrap();

        let mut passes = PassManager::new();
        passes.add_pass(LowerExtracts);
        passes.run(program);
    }
}
