//! Reader for the textual form of parser state machines.
//!
//! The input is an already type-annotated dump: every header instance and
//! variable carries its declared width, so no inference happens here.

use fxhash::FxHashMap;

use crate::ir::{
    BitRange, BitType, Call, Decl, Expr, Offset, Parser, Program, State, Stmt, VarDecl,
    BUILTIN_STATES, MAX_WIDTH, START_STATE,
};
use crate::reporting::Message;
use crate::source::{BytePos, ByteRange, FileId};
use crate::symbol::Symbol;

pub mod lexer;

use self::lexer::{Spanned, Token};

/// Read a program, returning every problem found if it could not be read.
pub fn read_program(file_id: FileId, source: &str) -> Result<Program, Vec<Message>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for result in lexer::tokens(file_id, source) {
        match result {
            Ok(token) => tokens.push(token),
            Err(error) => errors.push(Message::from(error)),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut reader = Reader {
        file_id,
        tokens,
        pos: 0,
        eof: source.len() as BytePos,
        messages: Vec::new(),
    };
    match reader.program() {
        Ok(program) if reader.messages.is_empty() => Ok(program),
        Ok(_) => Err(reader.messages),
        Err(message) => {
            reader.messages.push(message);
            Err(reader.messages)
        }
    }
}

struct Reader<'source> {
    file_id: FileId,
    tokens: Vec<Spanned<Token<'source>, BytePos>>,
    pos: usize,
    eof: BytePos,
    /// Problems that do not stop the rest of the program from being read.
    messages: Vec<Message>,
}

/// Names referred to by a parser, checked once the whole parser is read.
struct StateNames {
    defined: FxHashMap<Symbol, ByteRange>,
    transitions: Vec<(ByteRange, Symbol)>,
}

impl<'source> Reader<'source> {
    fn peek(&self) -> Option<&Token<'source>> {
        self.tokens.get(self.pos).map(|(_, token, _)| token)
    }

    fn next_token(&mut self) -> Option<(ByteRange, Token<'source>)> {
        let (start, token, end) = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some((ByteRange::new(self.file_id, start, end), token))
    }

    fn peek_range(&self) -> ByteRange {
        match self.tokens.get(self.pos) {
            Some((start, _, end)) => ByteRange::new(self.file_id, *start, *end),
            None => ByteRange::new(self.file_id, self.eof, self.eof),
        }
    }

    fn unexpected(&self, expected: &'static [&'static str]) -> Message {
        let range = self.peek_range();
        match self.peek() {
            Some(token) => Message::UnexpectedToken {
                range,
                token: token.description(),
                expected,
            },
            None => Message::UnexpectedEof { range, expected },
        }
    }

    fn expect(
        &mut self,
        token: Token<'static>,
        expected: &'static [&'static str],
    ) -> Result<ByteRange, Message> {
        let range = self.peek_range();
        match self.eat(token) {
            true => Ok(range),
            false => Err(self.unexpected(expected)),
        }
    }

    fn eat(&mut self, token: Token<'static>) -> bool {
        match self.peek() {
            Some(next) if *next == token => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn name(&mut self) -> Result<(ByteRange, Symbol), Message> {
        match self.peek() {
            Some(Token::Name(_)) => match self.next_token() {
                Some((range, Token::Name(name))) => Ok((range, Symbol::intern(name))),
                _ => Err(self.unexpected(&["name"])),
            },
            _ => Err(self.unexpected(&["name"])),
        }
    }

    fn number(&mut self) -> Result<u64, Message> {
        match self.peek() {
            Some(Token::NumberLiteral(_)) => match self.next_token() {
                Some((range, Token::NumberLiteral(literal))) => {
                    parse_number(literal).ok_or(Message::InvalidNumber { range })
                }
                _ => Err(self.unexpected(&["number literal"])),
            },
            _ => Err(self.unexpected(&["number literal"])),
        }
    }

    fn width(&mut self) -> Result<u64, Message> {
        let range = self.peek_range();
        match self.number()? {
            width if width > MAX_WIDTH => Err(Message::WidthOutOfRange {
                range,
                max: MAX_WIDTH,
            }),
            width => Ok(width),
        }
    }

    fn program(&mut self) -> Result<Program, Message> {
        let mut parsers = Vec::new();
        while self.peek().is_some() {
            parsers.push(self.parser()?);
        }
        Ok(Program { parsers })
    }

    fn parser(&mut self) -> Result<Parser, Message> {
        self.expect(Token::KeywordParser, &["parser"])?;
        let (name_range, name) = self.name()?;
        self.expect(Token::OpenBrace, &["{"])?;

        let mut decls = Vec::new();
        let mut states = Vec::new();
        let mut names = StateNames {
            defined: FxHashMap::default(),
            transitions: Vec::new(),
        };

        loop {
            match self.peek() {
                Some(Token::CloseBrace) => break,
                Some(Token::KeywordHeader) => decls.push(self.header_decl()?),
                Some(Token::KeywordBit | Token::KeywordInt) => {
                    decls.push(Decl::Var(self.var_decl()?));
                }
                Some(Token::KeywordState) => states.push(self.state(&mut names)?),
                _ => return Err(self.unexpected(&["header", "bit", "int", "state", "}"])),
            }
        }
        self.expect(Token::CloseBrace, &["}"])?;

        self.check_state_names(name_range, name, names);

        Ok(Parser {
            name,
            decls,
            states,
        })
    }

    fn check_state_names(&mut self, name_range: ByteRange, parser: Symbol, names: StateNames) {
        if !names.defined.contains_key(&Symbol::intern_static(START_STATE)) {
            self.messages.push(Message::MissingStartState {
                range: name_range,
                parser,
            });
        }

        for (range, name) in names.transitions {
            if names.defined.contains_key(&name) || BUILTIN_STATES.contains(&name.resolve()) {
                continue;
            }
            let suggestion = (names.defined.keys())
                .map(|state| (levenshtein::levenshtein(state.resolve(), name.resolve()), *state))
                .filter(|(distance, _)| *distance <= 2)
                .min_by_key(|(distance, state)| (*distance, state.resolve()))
                .map(|(_, state)| state);

            self.messages.push(Message::UnknownState {
                range,
                name,
                suggestion,
            });
        }
    }

    fn header_decl(&mut self) -> Result<Decl, Message> {
        self.expect(Token::KeywordHeader, &["header"])?;
        let (_, path) = self.path()?;
        self.expect(Token::Colon, &[":"])?;
        let width = self.width()?;

        let mut fields = Vec::new();
        if self.eat(Token::OpenBrace) {
            while !self.eat(Token::CloseBrace) {
                fields.push(self.var_decl()?);
            }
        } else {
            self.expect(Token::Semicolon, &[";", "{"])?;
        }

        Ok(Decl::Header {
            name: path.to_string(),
            width,
            fields,
        })
    }

    fn var_decl(&mut self) -> Result<VarDecl, Message> {
        let r#type = self.bit_type()?;
        let (_, name) = self.name()?;
        self.expect(Token::Semicolon, &[";"])?;

        Ok(VarDecl { name, r#type })
    }

    fn bit_type(&mut self) -> Result<BitType, Message> {
        let signed = match self.peek() {
            Some(Token::KeywordBit) => false,
            Some(Token::KeywordInt) => true,
            _ => return Err(self.unexpected(&["bit", "int"])),
        };
        self.pos += 1;
        self.expect(Token::Less, &["<"])?;
        let width = self.width()?;
        self.expect(Token::Greater, &[">"])?;

        Ok(BitType { width, signed })
    }

    fn state(&mut self, names: &mut StateNames) -> Result<State, Message> {
        self.expect(Token::KeywordState, &["state"])?;
        let (range, name) = self.name()?;
        match names.defined.get(&name) {
            Some(first_range) => self.messages.push(Message::DuplicateState {
                range,
                first_range: *first_range,
                name,
            }),
            None => {
                names.defined.insert(name, range);
            }
        }
        self.expect(Token::OpenBrace, &["{"])?;

        let mut stmts = Vec::new();
        while !self.eat(Token::CloseBrace) {
            stmts.push(self.stmt(names)?);
        }

        Ok(State { name, stmts })
    }

    fn stmt(&mut self, names: &mut StateNames) -> Result<Stmt, Message> {
        match self.peek() {
            Some(Token::KeywordBit | Token::KeywordInt) => Ok(Stmt::Decl(self.var_decl()?)),
            Some(Token::KeywordTransition) => {
                self.pos += 1;
                let (range, target) = self.name()?;
                self.expect(Token::Semicolon, &[";"])?;
                names.transitions.push((range, target));
                Ok(Stmt::Transition(target))
            }
            Some(Token::KeywordExtractHeader) => {
                self.pos += 1;
                let header = match self.peek() {
                    Some(Token::StringLiteral(header)) => header.to_string(),
                    _ => return Err(self.unexpected(&["string literal"])),
                };
                self.pos += 1;
                let (packet_range, packet) = self.name()?;
                if packet.resolve() != "packet" {
                    return Err(Message::RangeOnNonPacket {
                        range: packet_range,
                    });
                }
                let range = self.range()?;
                self.expect(Token::Semicolon, &[";"])?;
                Ok(Stmt::ExtractHeader { header, range })
            }
            Some(Token::KeywordMove) => {
                self.pos += 1;
                let offset = self.offset()?;
                self.expect(Token::Semicolon, &[";"])?;
                Ok(Stmt::Move(offset))
            }
            Some(Token::Name(_)) => {
                let (_, path) = self.path()?;
                let stmt = match self.peek() {
                    Some(Token::Equals) => {
                        self.pos += 1;
                        let source = self.expr()?;
                        Stmt::Assign {
                            target: path,
                            source,
                        }
                    }
                    Some(Token::Less | Token::OpenParen) => Stmt::Call(self.call(path)?),
                    _ => return Err(self.unexpected(&["=", "<", "("])),
                };
                self.expect(Token::Semicolon, &[";"])?;
                Ok(stmt)
            }
            _ => Err(self.unexpected(&[
                "bit",
                "int",
                "transition",
                "ExtractHeader",
                "Move",
                "name",
                "}",
            ])),
        }
    }

    fn path(&mut self) -> Result<(ByteRange, Expr), Message> {
        let (start_range, head) = self.name()?;
        let mut range = start_range;
        let mut expr = Expr::Var(head);
        while self.eat(Token::FullStop) {
            let (label_range, label) = self.name()?;
            range = range.merge(&label_range).unwrap_or(range);
            expr = Expr::Member(Box::new(expr), label);
        }
        Ok((range, expr))
    }

    fn expr(&mut self) -> Result<Expr, Message> {
        match self.peek() {
            Some(Token::OpenParen) => {
                self.pos += 1;
                let r#type = self.bit_type()?;
                self.expect(Token::CloseParen, &[")"])?;
                let expr = self.expr()?;
                Ok(Expr::Cast(r#type, Box::new(expr)))
            }
            Some(Token::NumberLiteral(_)) => Ok(Expr::Const(self.number()?)),
            Some(Token::Name(_)) => {
                let (range, path) = self.path()?;
                match self.peek() {
                    Some(Token::Less | Token::OpenParen) => Ok(Expr::Call(self.call(path)?)),
                    Some(Token::OpenBracket) => match path {
                        Expr::Var(name) if name.resolve() == "packet" => {
                            Ok(Expr::Packet(self.range()?))
                        }
                        _ => Err(Message::RangeOnNonPacket { range }),
                    },
                    _ => Ok(path),
                }
            }
            _ => Err(self.unexpected(&["(", "number literal", "name"])),
        }
    }

    fn call(&mut self, callee: Expr) -> Result<Call, Message> {
        let mut type_args = Vec::new();
        if self.eat(Token::Less) {
            loop {
                type_args.push(self.bit_type()?);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::Greater, &[",", ">"])?;
        }

        self.expect(Token::OpenParen, &["("])?;
        let mut args = Vec::new();
        if !self.eat(Token::CloseParen) {
            loop {
                args.push(self.expr()?);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::CloseParen, &[",", ")"])?;
        }

        Ok(Call {
            callee: Box::new(callee),
            type_args,
            args,
        })
    }

    fn range(&mut self) -> Result<BitRange, Message> {
        self.expect(Token::OpenBracket, &["["])?;
        let lo = self.offset()?;
        self.expect(Token::Colon, &[":"])?;
        let hi = self.offset()?;
        self.expect(Token::CloseBracket, &["]"])?;

        Ok(BitRange { lo, hi })
    }

    fn offset(&mut self) -> Result<Offset, Message> {
        let negative = self.eat(Token::Minus);
        let range = self.peek_range();
        let magnitude = self.number()?;
        let magnitude = i64::try_from(magnitude).map_err(|_| Message::InvalidNumber { range })?;
        let base = if negative { -magnitude } else { magnitude };

        let mut terms = Vec::new();
        while self.eat(Token::Plus) {
            let (_, term) = self.name()?;
            terms.push(term);
        }

        Ok(Offset { base, terms })
    }
}

fn parse_number(literal: &str) -> Option<u64> {
    match literal.strip_prefix("0x") {
        Some(digits) => u64::from_str_radix(digits, 16).ok(),
        None => literal.parse().ok(),
    }
}
