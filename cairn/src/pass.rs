//! Rewrites over parser state machines.
//!
//! - [`LowerExtracts`] replaces `extract` and `lookahead` calls with reads of
//!   explicit packet bit ranges.
//! - [`VersionVariables`] renames scalar variables that are overwritten
//!   between reads, so that every read sees the value most recently written
//!   before it.

use crate::ir::{Parser, Program};

mod lower;
mod version;

pub use self::lower::LowerExtracts;
pub use self::version::VersionVariables;

/// A rewrite of a single parser.
///
/// Parsers are independent of each other, so passes keep no state between
/// calls to [`Pass::run`].
pub trait Pass {
    /// Name of the pass, used when logging.
    fn name(&self) -> &'static str;

    /// Rewrite a parser, returning its replacement.
    fn run(&self, parser: Parser) -> Parser;
}

/// The passes that can be selected from the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum PassKind {
    /// Lower extracts and lookaheads to packet bit ranges
    Lower,
    /// Version variables that are overwritten between reads
    Version,
}

impl PassKind {
    pub const DEFAULT: &'static [PassKind] = &[PassKind::Lower, PassKind::Version];

    pub fn to_pass(self) -> Box<dyn Pass> {
        match self {
            PassKind::Lower => Box::new(LowerExtracts),
            PassKind::Version => Box::new(VersionVariables),
        }
    }
}

/// Runs a sequence of passes over every parser in a program.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> PassManager {
        PassManager { passes: Vec::new() }
    }

    pub fn from_kinds(kinds: &[PassKind]) -> PassManager {
        PassManager {
            passes: kinds.iter().map(|kind| kind.to_pass()).collect(),
        }
    }

    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn run(&self, program: Program) -> Program {
        let parsers = (program.parsers.into_iter())
            .map(|parser| self.run_parser(parser))
            .collect();

        Program { parsers }
    }

    pub fn run_parser(&self, parser: Parser) -> Parser {
        self.passes.iter().fold(parser, |parser, pass| {
            log::debug!("running `{}` on parser `{}`", pass.name(), parser.name);
            pass.run(parser)
        })
    }
}

impl Default for PassManager {
    fn default() -> PassManager {
        PassManager::from_kinds(PassKind::DEFAULT)
    }
}
