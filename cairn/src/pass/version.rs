//! Versioning of scalar variables that are overwritten between reads.
//!
//! Within each state, a variable that is written and later read gets a fresh
//! copy per write that some later read depends on. Reads are redirected to
//! the copy holding the most recent write, and the final copy is assigned back
//! to the original variable at the end of the state:
//!
//! ```text
//! x = A();                 new_x0 = A();
//! packet.extract(h1, x);   packet.extract(h1, new_x0);
//! x = B();           =>    new_x1 = B();
//! packet.extract(h2, x);   packet.extract(h2, new_x1);
//!                          x = new_x1;
//! ```
//!
//! Writes are assignments to a variable, and reads are arguments of method
//! calls, either the variable itself or a cast of it. Any other use, such as
//! the source of `y = x;`, is not a read: it is neither counted nor redirected,
//! and keeps seeing the original variable.

use fxhash::{FxHashMap, FxHashSet};

use crate::ir::typing::{StateScope, TypeEnv, TypeMap};
use crate::ir::{self, BitType, Expr, Parser, State, Stmt, VarDecl};
use crate::pass::Pass;
use crate::symbol::Symbol;

const COPY_PREFIX: &str = "new_";

pub struct VersionVariables;

impl Pass for VersionVariables {
    fn name(&self) -> &'static str {
        "version-variables"
    }

    fn run(&self, parser: Parser) -> Parser {
        let env = TypeEnv::for_parser(&parser);

        let states = (parser.states.into_iter())
            .map(|state| version_state(&env, state))
            .collect();

        Parser { states, ..parser }
    }
}

/// Where a variable is written and read within a state.
struct Occurrences {
    name: Symbol,
    r#type: BitType,
    writes: Vec<usize>,
    reads: Vec<usize>,
    /// Writes and reads of the variable share one sequence of positions.
    next_position: usize,
}

impl Occurrences {
    fn new(name: Symbol, r#type: BitType) -> Occurrences {
        Occurrences {
            name,
            r#type,
            writes: Vec::new(),
            reads: Vec::new(),
            next_position: 0,
        }
    }

    fn record_write(&mut self) {
        self.writes.push(self.next_position);
        self.next_position += 1;
    }

    fn record_read(&mut self) {
        self.reads.push(self.next_position);
        self.next_position += 1;
    }

    /// The number of copies needed: each write claims the first unclaimed
    /// read that comes after it.
    fn copy_count(&self) -> usize {
        let mut reads = self.reads.iter().peekable();
        let mut count = 0;

        for write in &self.writes {
            while reads.next_if(|read| *read <= write).is_some() {}
            if reads.next().is_some() {
                count += 1;
            }
        }

        count
    }
}

/// Occurrences of every versionable variable in a state, in order of first
/// occurrence.
#[derive(Default)]
struct OccurrenceTable {
    indices: FxHashMap<Symbol, usize>,
    entries: Vec<Occurrences>,
}

impl OccurrenceTable {
    fn collect(scope: &StateScope<'_>, stmts: &[Stmt]) -> OccurrenceTable {
        let mut table = OccurrenceTable::default();

        for stmt in stmts {
            match stmt {
                Stmt::Assign {
                    target: Expr::Var(name),
                    ..
                } => {
                    if let Some(entry) = table.entry(scope, *name) {
                        entry.record_write();
                    }
                }
                Stmt::Call(call) => {
                    for name in call.args.iter().filter_map(Expr::var_through_cast) {
                        if let Some(entry) = table.entry(scope, name) {
                            entry.record_read();
                        }
                    }
                }
                _ => {}
            }
        }

        table
    }

    /// The entry for a variable, if it is a scalar declared outside the state.
    /// Variables declared inside the state, including copies made by an
    /// earlier run, are never versioned.
    fn entry(&mut self, scope: &StateScope<'_>, name: Symbol) -> Option<&mut Occurrences> {
        if scope.is_local(name) {
            return None;
        }
        let r#type = scope.var_type(name)?;

        let entries = &mut self.entries;
        let index = *self.indices.entry(name).or_insert_with(|| {
            entries.push(Occurrences::new(name, r#type));
            entries.len() - 1
        });

        self.entries.get_mut(index)
    }
}

/// The copies of one variable and which of them holds its current value.
struct Versions {
    copies: Vec<Symbol>,
    /// The first copy that has not been written yet.
    next: usize,
    /// The copy holding the most recent write.
    current: Option<usize>,
    /// Set when the current copy has been written but not read since.
    pending: bool,
}

impl Versions {
    fn new(copies: Vec<Symbol>) -> Versions {
        Versions {
            copies,
            next: 0,
            current: None,
            pending: false,
        }
    }

    /// The copy to write to. Writes with no read in between share a copy, and
    /// once every copy is in use the last one is reused.
    fn write(&mut self) -> Symbol {
        let index = match self.current {
            Some(index) if self.pending || self.next == self.copies.len() => index,
            _ => {
                self.next += 1;
                self.next - 1
            }
        };
        self.current = Some(index);
        self.pending = true;
        self.copies[index]
    }

    /// The copy to read from, or `None` if the variable has not been written
    /// in this state.
    fn read(&mut self) -> Option<Symbol> {
        self.pending = false;
        self.current.map(|index| self.copies[index])
    }

    fn last_written(&self) -> Option<Symbol> {
        self.current.map(|index| self.copies[index])
    }
}

fn version_state(env: &TypeEnv, state: State) -> State {
    let scope = env.state_scope(&state);
    let table = OccurrenceTable::collect(&scope, &state.stmts);

    let mut decls = Vec::new();
    let mut versions = FxHashMap::default();
    let mut order = Vec::new();
    let mut created = FxHashSet::default();

    for entry in &table.entries {
        let count = entry.copy_count();
        if count == 0 {
            continue;
        }
        log::debug!(
            "versioning `{}` in state `{}` with {count} copies",
            entry.name,
            state.name,
        );

        let copies = (0..count)
            .map(|index| {
                let base = format!("{}{index}", entry.name);
                let copy = Symbol::fresh(COPY_PREFIX, &base, |name| {
                    scope.is_declared(name) || created.contains(name)
                });
                created.insert(copy.resolve());
                decls.push(Stmt::Decl(VarDecl {
                    name: copy,
                    r#type: entry.r#type,
                }));
                copy
            })
            .collect();

        versions.insert(entry.name, Versions::new(copies));
        order.push(entry.name);
    }

    if versions.is_empty() {
        return state;
    }

    let mut stmts = decls;
    for stmt in state.stmts {
        stmts.push(rewrite_stmt(&mut versions, stmt));
    }

    for name in order {
        let last_written = versions.get(&name).and_then(Versions::last_written);
        if let Some(copy) = last_written {
            let reconcile = Stmt::Assign {
                target: Expr::Var(name),
                source: Expr::Var(copy),
            };
            ir::insert_before_transition(&mut stmts, reconcile);
        }
    }

    State {
        name: state.name,
        stmts,
    }
}

fn rewrite_stmt(versions: &mut FxHashMap<Symbol, Versions>, stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Assign {
            target: Expr::Var(name),
            source,
        } => {
            let target = match versions.get_mut(&name) {
                Some(entry) => {
                    let copy = entry.write();
                    log::trace!("redirecting write of `{name}` to `{copy}`");
                    copy
                }
                None => name,
            };
            Stmt::Assign {
                target: Expr::Var(target),
                source,
            }
        }
        Stmt::Call(mut call) => {
            for arg in &mut call.args {
                let copy = match arg.var_through_cast() {
                    Some(name) => versions.get_mut(&name).and_then(Versions::read),
                    None => None,
                };
                if let Some(copy) = copy {
                    log::trace!("redirecting read of `{arg}` to `{copy}`");
                    arg.rename_through_cast(copy);
                }
            }
            Stmt::Call(call)
        }
        stmt => stmt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::tests::run_passes;
    use crate::pass::PassKind;

    fn version(source: &str) -> String {
        run_passes(&[PassKind::Version], source)
    }

    fn occurrences(kinds: &str) -> Occurrences {
        let mut occurrences = Occurrences::new(
            Symbol::intern("x"),
            BitType {
                width: 8,
                signed: false,
            },
        );
        for kind in kinds.chars() {
            match kind {
                'w' => occurrences.record_write(),
                'r' => occurrences.record_read(),
                _ => unreachable!(),
            }
        }
        occurrences
    }

    #[test]
    fn copy_counts() {
        assert_eq!(occurrences("").copy_count(), 0);
        assert_eq!(occurrences("w").copy_count(), 0);
        assert_eq!(occurrences("r").copy_count(), 0);
        assert_eq!(occurrences("rw").copy_count(), 0);
        assert_eq!(occurrences("wr").copy_count(), 1);
        assert_eq!(occurrences("wrwr").copy_count(), 2);
        assert_eq!(occurrences("wwr").copy_count(), 1);
        assert_eq!(occurrences("wrr").copy_count(), 1);
        assert_eq!(occurrences("rwrw").copy_count(), 1);
        assert_eq!(occurrences("wrwwr").copy_count(), 2);
    }

    #[test]
    fn versions_follow_writes() {
        let copies = vec![Symbol::intern("new_x0"), Symbol::intern("new_x1")];
        let mut versions = Versions::new(copies.clone());

        assert_eq!(versions.read(), None);
        assert_eq!(versions.write(), copies[0]);
        assert_eq!(versions.write(), copies[0]);
        assert_eq!(versions.read(), Some(copies[0]));
        assert_eq!(versions.write(), copies[1]);
        assert_eq!(versions.read(), Some(copies[1]));
        assert_eq!(versions.write(), copies[1]);
        assert_eq!(versions.last_written(), Some(copies[1]));
    }

    const TWO_WRITES: &str = "parser P {
    header h1 : 8;
    header h2 : 8;
    bit<32> x;
    state start {
        x = A();
        packet.extract(h1, x);
        x = B();
        packet.extract(h2, x);
        transition accept;
    }
}";

    #[test]
    fn read_after_write() {
        assert_eq!(
            version(TWO_WRITES),
            "parser P {
    header h1 : 8;
    header h2 : 8;
    bit<32> x;
    state start {
        bit<32> new_x0;
        bit<32> new_x1;
        new_x0 = A();
        packet.extract(h1, new_x0);
        new_x1 = B();
        packet.extract(h2, new_x1);
        x = new_x1;
        transition accept;
    }
}"
        );
    }

    #[test]
    fn versioning_is_idempotent() {
        let once = version(TWO_WRITES);
        assert_eq!(version(&once), once);
    }

    #[test]
    fn reads_before_writes_keep_the_original() {
        assert_eq!(
            version(
                "parser P {
                    header h : 8;
                    int<16> x;
                    state start {
                        packet.extract(h, (bit<32>) x);
                        x = packet.lookahead<int<16>>();
                        packet.extract(h, (bit<32>) x);
                        transition accept;
                    }
                }"
            ),
            "parser P {
    header h : 8;
    int<16> x;
    state start {
        int<16> new_x0;
        packet.extract(h, (bit<32>) x);
        new_x0 = packet.lookahead<int<16>>();
        packet.extract(h, (bit<32>) new_x0);
        x = new_x0;
        transition accept;
    }
}"
        );
    }

    #[test]
    fn unread_writes_are_untouched() {
        let source = "parser P {
    header h : 8;
    bit<8> x;
    state start {
        packet.extract(h, x);
        x = 1;
        x = 2;
        transition accept;
    }
}";
        assert_eq!(version(source), source);
    }

    #[test]
    fn counts_are_per_variable() {
        assert_eq!(
            version(
                "parser P {
                    header h : 8;
                    bit<8> x;
                    bit<8> y;
                    state start {
                        y = 1;
                        x = 2;
                        packet.extract(h, x);
                        packet.extract(h, y);
                        y = 3;
                        packet.extract(h, y);
                    }
                }"
            ),
            "parser P {
    header h : 8;
    bit<8> x;
    bit<8> y;
    state start {
        bit<8> new_y0;
        bit<8> new_y1;
        bit<8> new_x0;
        new_y0 = 1;
        new_x0 = 2;
        packet.extract(h, new_x0);
        packet.extract(h, new_y0);
        new_y1 = 3;
        packet.extract(h, new_y1);
        y = new_y1;
        x = new_x0;
    }
}"
        );
    }

    #[test]
    fn states_are_versioned_separately() {
        let output = version(
            "parser P {
                header h : 8;
                bit<8> x;
                state start {
                    x = 1;
                    packet.extract(h, x);
                    transition next;
                }
                state next {
                    packet.extract(h, x);
                    transition accept;
                }
            }",
        );
        assert_eq!(
            output,
            "parser P {
    header h : 8;
    bit<8> x;
    state start {
        bit<8> new_x0;
        new_x0 = 1;
        packet.extract(h, new_x0);
        x = new_x0;
        transition next;
    }
    state next {
        packet.extract(h, x);
        transition accept;
    }
}"
        );
    }

    #[test]
    fn copy_names_avoid_declared_names() {
        assert_eq!(
            version(
                "parser P {
                    header h : 8;
                    bit<8> x;
                    bit<8> new_x0;
                    state start {
                        x = 1;
                        packet.extract(h, x);
                        transition accept;
                    }
                }"
            ),
            "parser P {
    header h : 8;
    bit<8> x;
    bit<8> new_x0;
    state start {
        bit<8> new_new_x0;
        new_new_x0 = 1;
        packet.extract(h, new_new_x0);
        x = new_new_x0;
        transition accept;
    }
}"
        );
    }

    #[test]
    fn headers_and_locals_are_not_versioned() {
        let source = "parser P {
    header h : 8;
    state start {
        bit<8> len;
        len = 1;
        packet.extract(h, len);
        len = 2;
        packet.extract(h, len);
        transition accept;
    }
}";
        assert_eq!(version(source), source);
    }

    #[test]
    fn undeclared_variables_are_skipped() {
        let source = "parser P {
    header h : 8;
    state start {
        y = 1;
        packet.extract(h, y);
        y = 2;
        packet.extract(h, (bit<32>) y);
        transition accept;
    }
}";
        assert_eq!(version(source), source);
    }

    #[test]
    fn assignment_sources_are_not_reads() {
        let source = "parser P {
    header h : 8;
    bit<8> x;
    bit<8> y;
    state start {
        x = 1;
        y = x;
        x = 2;
        transition accept;
    }
}";
        assert_eq!(version(source), source);
    }
}
