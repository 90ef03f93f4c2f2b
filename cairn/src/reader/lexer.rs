use codespan_reporting::diagnostic::{Diagnostic, Label};
use logos::Logos;

use crate::source::{BytePos, ByteRange, FileId};

#[derive(Clone, Debug, PartialEq, Eq, Logos)]
pub enum Token<'source> {
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Name(&'source str),
    #[regex(r#""([^"\\]|\\.)*""#, |lex| &lex.slice()[1..(lex.slice().len() - 1)])]
    StringLiteral(&'source str),
    #[regex(r"[0-9][a-zA-Z0-9_]*")]
    NumberLiteral(&'source str),

    #[token("bit")]
    KeywordBit,
    #[token("ExtractHeader")]
    KeywordExtractHeader,
    #[token("header")]
    KeywordHeader,
    #[token("int")]
    KeywordInt,
    #[token("Move")]
    KeywordMove,
    #[token("parser")]
    KeywordParser,
    #[token("state")]
    KeywordState,
    #[token("transition")]
    KeywordTransition,

    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token(".")]
    FullStop,
    #[token(">")]
    Greater,
    #[token("<")]
    Less,
    #[token("-")]
    Minus,
    #[token("+")]
    Plus,
    #[token(";")]
    Semicolon,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,

    #[error]
    #[regex(r"\p{Whitespace}", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    Error,
}

pub type Spanned<Tok, Loc> = (Loc, Tok, Loc);

#[derive(Clone, Debug)]
pub enum Error {
    UnexpectedCharacter { range: ByteRange },
}

impl Error {
    pub fn range(&self) -> ByteRange {
        match self {
            Error::UnexpectedCharacter { range } => *range,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<FileId> {
        match self {
            Error::UnexpectedCharacter { range } => Diagnostic::error()
                .with_message("unexpected character")
                .with_labels(vec![Label::primary(range.file_id(), *range)]),
        }
    }
}

pub fn tokens(
    file_id: FileId,
    source: &str,
) -> impl Iterator<Item = Result<Spanned<Token<'_>, BytePos>, Error>> {
    assert!(
        source.len() <= u32::MAX as usize,
        "`source` must be less than 4GiB in length"
    );

    Token::lexer(source)
        .spanned()
        .map(move |(token, range)| {
            let start = range.start as BytePos;
            let end = range.end as BytePos;
            match token {
                Token::Error => Err(Error::UnexpectedCharacter {
                    range: ByteRange::new(file_id, start, end),
                }),
                token => Ok((start, token, end)),
            }
        })
}

impl<'source> Token<'source> {
    pub fn description(&self) -> &'static str {
        match self {
            Token::Name(_) => "name",
            Token::StringLiteral(_) => "string literal",
            Token::NumberLiteral(_) => "number literal",
            Token::KeywordBit => "bit",
            Token::KeywordExtractHeader => "ExtractHeader",
            Token::KeywordHeader => "header",
            Token::KeywordInt => "int",
            Token::KeywordMove => "Move",
            Token::KeywordParser => "parser",
            Token::KeywordState => "state",
            Token::KeywordTransition => "transition",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Equals => "=",
            Token::FullStop => ".",
            Token::Greater => ">",
            Token::Less => "<",
            Token::Minus => "-",
            Token::Plus => "+",
            Token::Semicolon => ";",
            Token::OpenBrace => "{",
            Token::CloseBrace => "}",
            Token::OpenBracket => "[",
            Token::CloseBracket => "]",
            Token::OpenParen => "(",
            Token::CloseParen => ")",
            Token::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token<'_>> {
        tokens(0, source)
            .map(|result| result.map(|(_, token, _)| token).unwrap())
            .collect()
    }

    #[test]
    fn keywords_take_priority_over_names() {
        assert_eq!(
            lex("state start transition bits"),
            vec![
                Token::KeywordState,
                Token::Name("start"),
                Token::KeywordTransition,
                Token::Name("bits"),
            ],
        );
    }

    #[test]
    fn nested_type_arguments() {
        assert_eq!(
            lex("lookahead<bit<8>>()"),
            vec![
                Token::Name("lookahead"),
                Token::Less,
                Token::KeywordBit,
                Token::Less,
                Token::NumberLiteral("8"),
                Token::Greater,
                Token::Greater,
                Token::OpenParen,
                Token::CloseParen,
            ],
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            lex("// a comment\nMove 272+x; //~ ignore = true"),
            vec![
                Token::KeywordMove,
                Token::NumberLiteral("272"),
                Token::Plus,
                Token::Name("x"),
                Token::Semicolon,
            ],
        );
    }

    #[test]
    fn string_literals_drop_quotes() {
        assert_eq!(lex(r#""hdr.eth""#), vec![Token::StringLiteral("hdr.eth")]);
    }

    #[test]
    fn unexpected_character() {
        let errors = tokens(0, "x = 1 $ 2").filter_map(Result::err).collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].range(), ByteRange::new(0, 6, 7));
    }
}
