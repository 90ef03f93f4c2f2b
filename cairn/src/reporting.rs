//! Diagnostic messages produced while reading parser state machines.
//!
//! These can be converted to [`Diagnostic`]s in order to present them to the user.
//!
//! [`Diagnostic`]: codespan_reporting::diagnostic::Diagnostic

use codespan_reporting::diagnostic::{Diagnostic, Label};
use itertools::Itertools;

use crate::reader::lexer;
use crate::source::{ByteRange, FileId};
use crate::symbol::Symbol;

#[derive(Debug, Clone)]
pub enum Message {
    Lexer(lexer::Error),
    UnexpectedEof {
        range: ByteRange,
        expected: &'static [&'static str],
    },
    UnexpectedToken {
        range: ByteRange,
        token: &'static str,
        expected: &'static [&'static str],
    },
    InvalidNumber {
        range: ByteRange,
    },
    WidthOutOfRange {
        range: ByteRange,
        max: u64,
    },
    /// A range read from something other than the packet buffer.
    RangeOnNonPacket {
        range: ByteRange,
    },
    DuplicateState {
        range: ByteRange,
        first_range: ByteRange,
        name: Symbol,
    },
    MissingStartState {
        range: ByteRange,
        parser: Symbol,
    },
    UnknownState {
        range: ByteRange,
        name: Symbol,
        suggestion: Option<Symbol>,
    },
}

impl From<lexer::Error> for Message {
    fn from(error: lexer::Error) -> Message {
        Message::Lexer(error)
    }
}

impl Message {
    pub fn range(&self) -> ByteRange {
        match self {
            Message::Lexer(error) => error.range(),
            Message::UnexpectedEof { range, .. }
            | Message::UnexpectedToken { range, .. }
            | Message::InvalidNumber { range }
            | Message::WidthOutOfRange { range, .. }
            | Message::RangeOnNonPacket { range }
            | Message::DuplicateState { range, .. }
            | Message::MissingStartState { range, .. }
            | Message::UnknownState { range, .. } => *range,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<FileId> {
        let primary_label = |range: &ByteRange| Label::primary(range.file_id(), *range);
        let secondary_label = |range: &ByteRange| Label::secondary(range.file_id(), *range);

        match self {
            Message::Lexer(error) => error.to_diagnostic(),
            Message::UnexpectedEof { range, expected } => Diagnostic::error()
                .with_message("unexpected end of file")
                .with_labels(vec![primary_label(range).with_message("unexpected end of file")])
                .with_notes(format_expected(*expected).map_or(Vec::new(), |message| vec![message])),
            Message::UnexpectedToken {
                range,
                token,
                expected,
            } => Diagnostic::error()
                .with_message(format!("unexpected token {token}"))
                .with_labels(vec![primary_label(range).with_message("unexpected token")])
                .with_notes(format_expected(*expected).map_or(Vec::new(), |message| vec![message])),
            Message::InvalidNumber { range } => Diagnostic::error()
                .with_message("invalid number literal")
                .with_labels(vec![primary_label(range)])
                .with_notes(vec!["expected a decimal or `0x` prefixed number".to_owned()]),
            Message::WidthOutOfRange { range, max } => Diagnostic::error()
                .with_message("bit width is too large")
                .with_labels(vec![primary_label(range)])
                .with_notes(vec![format!("widths can be at most {max} bits")]),
            Message::RangeOnNonPacket { range } => Diagnostic::error()
                .with_message("bit ranges can only be taken from `packet`")
                .with_labels(vec![primary_label(range)]),
            Message::DuplicateState {
                range,
                first_range,
                name,
            } => Diagnostic::error()
                .with_message(format!("state `{name}` is defined multiple times"))
                .with_labels(vec![
                    primary_label(range).with_message("redefined here"),
                    secondary_label(first_range).with_message("first definition"),
                ]),
            Message::MissingStartState { range, parser } => Diagnostic::error()
                .with_message(format!("parser `{parser}` has no `start` state"))
                .with_labels(vec![primary_label(range)]),
            Message::UnknownState {
                range,
                name,
                suggestion,
            } => Diagnostic::error()
                .with_message(format!("cannot find state `{name}`"))
                .with_labels(vec![primary_label(range).with_message("unknown state")])
                .with_notes(suggestion.map_or(Vec::new(), |suggestion| {
                    vec![format!("help: a state with a similar name exists: `{suggestion}`")]
                })),
        }
    }
}

fn format_expected(expected: &[impl std::fmt::Display]) -> Option<String> {
    expected.split_last().map(|items| match items {
        (last, []) => format!("expected {last}"),
        (last, expected) => format!("expected {} or {last}", expected.iter().format(", ")),
    })
}
