//! Assembler for the `.hbc` text format.
//!
//! A file holds one module: enum definitions, functions and tests, each with a
//! body of one instruction per line. Parsing runs in three sweeps over the
//! token stream so that types and values can refer to enums and functions
//! declared anywhere in the file: enums first, then function headers, then
//! bodies.

use std::collections::HashMap;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::ast::{EnumDef, EnumMember, Function, Module, Param, Span};
use crate::bytecode::{Bytecode, Data, Op, OperandKind};
use crate::cache::SymbolicBindings;
use crate::lexer::{self, LexError, Token};
use crate::types::ConcreteType;
use crate::value::{Bits, Value};
use crate::vm::builtins::Builtin;

mod assembly;
pub use assembly::{Assembly, AssemblyEmitter, Listing};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub code: &'static str,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Lexes and parses `source` into an assembled module.
pub fn assemble(source: &str) -> std::result::Result<Assembly, AssembleError> {
    let tokens = lexer::lex(source)?
        .into_iter()
        .map(|(t, r)| (t, Span::from(r)))
        .collect();
    Ok(parse(tokens, source.len())?)
}

/// Parses a single value written in assembly syntax, resolving enum and
/// function names against `module`.
pub fn parse_value_text(text: &str, module: &Rc<Module>) -> std::result::Result<Value, AssembleError> {
    let tokens = lexer::lex(text)?
        .into_iter()
        .map(|(t, r)| (t, Span::from(r)))
        .collect();
    let mut parser = Parser::new(tokens, text.len());
    let value = parser.parse_value(module)?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of value").into());
    }
    Ok(value)
}

pub fn parse(tokens: Vec<(Token, Span)>, source_len: usize) -> Result<Assembly> {
    Parser::new(tokens, source_len).parse_assembly()
}

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    eof: Span,
}

struct Header {
    function: Function,
    body_start: usize,
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>, source_len: usize) -> Self {
        Parser { tokens, pos: 0, eof: Span::new(source_len, source_len) }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens.get(self.pos).map(|(_, s)| *s).unwrap_or(self.eof)
    }

    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |(_, s)| s.end)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError { code, span: self.peek_span(), message, hint: None }
    }

    fn error_at(&self, code: &'static str, span: Span, message: String) -> ParseError {
        ParseError { code, span, message, hint: None }
    }

    fn unexpected(&self, wanted: &str) -> ParseError {
        match self.peek() {
            Some(tok) => self.error("HVM-P003", format!("expected {wanted}, got {tok}")),
            None => self.error("HVM-P004", format!("expected {wanted}, got end of input")),
        }
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        if self.peek() == Some(expected) {
            let span = self.peek_span();
            self.advance();
            Ok(span)
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span)> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                let span = self.peek_span();
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn expect_int(&mut self) -> Result<(String, Span)> {
        match self.peek().cloned() {
            Some(Token::Int(text)) => {
                let span = self.peek_span();
                self.advance();
                Ok((text, span))
            }
            _ => Err(self.unexpected("an integer")),
        }
    }

    fn parse_assembly(&mut self) -> Result<Assembly> {
        if self.peek() != Some(&Token::Module) {
            return Err(self.error("HVM-P001", "file must start with `module <name>`".to_string()));
        }
        self.advance();
        let (module_name, _) = self.expect_ident()?;
        let items_start = self.pos;

        let mut enums: Vec<Rc<EnumDef>> = Vec::new();
        while !self.at_end() {
            match self.peek() {
                Some(Token::Enum) => {
                    let (def, span) = self.parse_enum(&enums)?;
                    if enums.iter().any(|e| e.name == def.name) {
                        return Err(self.error_at("HVM-P010", span, format!("enum `{}` is defined twice", def.name)));
                    }
                    enums.push(Rc::new(def));
                }
                Some(Token::Fn) | Some(Token::Test) => self.skip_item()?,
                Some(_) => return Err(self.top_level_error()),
                None => break,
            }
        }

        self.pos = items_start;
        let mut headers: Vec<Header> = Vec::new();
        while !self.at_end() {
            let header = match self.peek() {
                Some(Token::Enum) => {
                    self.skip_item()?;
                    continue;
                }
                Some(Token::Fn) => self.parse_fn_header(&module_name, &enums)?,
                Some(Token::Test) => self.parse_test_header(&module_name)?,
                _ => return Err(self.top_level_error()),
            };
            if headers.iter().any(|h| h.function.name == header.function.name) {
                return Err(self.error_at(
                    "HVM-P010",
                    header.function.span,
                    format!("`{}` is defined twice", header.function.name),
                ));
            }
            headers.push(header);
        }

        let body_starts: Vec<usize> = headers.iter().map(|h| h.body_start).collect();
        let module = Rc::new(Module {
            name: module_name,
            functions: headers.into_iter().map(|h| Rc::new(h.function)).collect(),
            enums,
        });

        let mut bodies = HashMap::new();
        for (function, start) in module.functions.iter().zip(body_starts) {
            self.pos = start;
            let body = self.parse_body(&module)?;
            bodies.insert(function.name.clone(), body);
        }
        Ok(Assembly::new(module, bodies))
    }

    fn top_level_error(&self) -> ParseError {
        let mut err = self.unexpected("`enum`, `fn` or `test`");
        err.code = "HVM-P002";
        err
    }

    /// Skips an item's header and its brace-delimited body.
    fn skip_item(&mut self) -> Result<()> {
        while !self.eat(&Token::LBrace) {
            if self.advance().is_none() {
                return Err(self.unexpected("`{`"));
            }
        }
        self.skip_block()
    }

    /// Skips to just past the `}` matching an already consumed `{`.
    fn skip_block(&mut self) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance() {
                Some(Token::LBrace) => depth += 1,
                Some(Token::RBrace) => depth -= 1,
                Some(_) => {}
                None => return Err(self.unexpected("`}`")),
            }
        }
        Ok(())
    }

    fn parse_enum(&mut self, enums: &[Rc<EnumDef>]) -> Result<(EnumDef, Span)> {
        let start = self.expect(&Token::Enum)?;
        let (name, name_span) = self.expect_ident()?;
        self.expect(&Token::Colon)?;
        let ty_span = self.peek_span();
        let (signed, width) = match self.parse_type(enums)? {
            ConcreteType::Bits { signed, width } => (signed, width),
            other => {
                return Err(self.error_at(
                    "HVM-P006",
                    ty_span,
                    format!("enum `{name}` must have a bits underlying type, not {other}"),
                ));
            }
        };
        self.expect(&Token::LBrace)?;

        let mut members: Vec<EnumMember> = Vec::new();
        while !self.eat(&Token::RBrace) {
            let (member, member_span) = self.expect_ident()?;
            self.expect(&Token::Assign)?;
            let (text, span) = self.expect_int()?;
            let value = self.bits_literal(&text, signed, width, span)?;
            if members.iter().any(|m| m.name == member) {
                return Err(self.error_at(
                    "HVM-P010",
                    member_span,
                    format!("`{name}::{member}` is defined twice"),
                ));
            }
            members.push(EnumMember { name: member, value });
            if !self.eat(&Token::Comma) && self.peek() != Some(&Token::RBrace) {
                return Err(self.unexpected("`,` or `}`"));
            }
        }
        Ok((EnumDef { name, signed, width, members }, start.merge(name_span)))
    }

    fn parse_fn_header(&mut self, module: &str, enums: &[Rc<EnumDef>]) -> Result<Header> {
        let start = self.expect(&Token::Fn)?;
        let (name, name_span) = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        while !self.eat(&Token::RParen) {
            let (param, _) = self.expect_ident()?;
            self.expect(&Token::Colon)?;
            let ty = self.parse_type(enums)?;
            params.push(Param { name: param, ty });
            if !self.eat(&Token::Comma) && self.peek() != Some(&Token::RParen) {
                return Err(self.unexpected("`,` or `)`"));
            }
        }
        let return_type = if self.eat(&Token::Arrow) { Some(self.parse_type(enums)?) } else { None };
        self.expect(&Token::LBrace)?;
        let body_start = self.pos;
        self.skip_block()?;
        Ok(Header {
            function: Function {
                module: module.to_string(),
                name,
                params,
                return_type,
                is_test: false,
                span: start.merge(name_span),
            },
            body_start,
        })
    }

    fn parse_test_header(&mut self, module: &str) -> Result<Header> {
        let start = self.expect(&Token::Test)?;
        let (name, name_span) = self.expect_ident()?;
        self.expect(&Token::LBrace)?;
        let body_start = self.pos;
        self.skip_block()?;
        Ok(Header {
            function: Function {
                module: module.to_string(),
                name,
                params: Vec::new(),
                return_type: None,
                is_test: true,
                span: start.merge(name_span),
            },
            body_start,
        })
    }

    fn parse_type(&mut self, enums: &[Rc<EnumDef>]) -> Result<ConcreteType> {
        let mut ty = if self.eat(&Token::LParen) {
            let mut members = Vec::new();
            while !self.eat(&Token::RParen) {
                members.push(self.parse_type(enums)?);
                if !self.eat(&Token::Comma) && self.peek() != Some(&Token::RParen) {
                    return Err(self.unexpected("`,` or `)`"));
                }
            }
            ConcreteType::Tuple(members)
        } else {
            let (name, span) = self.expect_ident()?;
            match name.as_str() {
                "bool" => ConcreteType::ubits(1),
                "token" => ConcreteType::Token,
                _ => match self.bits_type_at(&name, span)? {
                    Some((signed, width)) => ConcreteType::Bits { signed, width },
                    None => match enums.iter().find(|e| e.name == name) {
                        Some(def) => ConcreteType::Enum(def.clone()),
                        None => {
                            let mut err = self.error_at("HVM-P006", span, format!("unknown type `{name}`"));
                            err.hint = Some("types are uN, sN, bool, token, tuples, arrays or a declared enum".to_string());
                            return Err(err);
                        }
                    },
                },
            }
        };
        while self.eat(&Token::LBracket) {
            let size = self.parse_usize()?;
            let close = self.expect(&Token::RBracket)?;
            ty = ConcreteType::array(ty, size);
            if ty.total_bit_count().is_none() {
                return Err(self.error_at("HVM-P008", close, format!("type `{ty}` has too many bits")));
            }
        }
        if ty.total_bit_count().is_none() {
            return Err(self.error("HVM-P008", format!("type `{ty}` has too many bits")));
        }
        Ok(ty)
    }

    /// Resolves a `uN`/`sN` name, rejecting widths above [`MAX_BITS_WIDTH`].
    fn bits_type_at(&self, name: &str, span: Span) -> Result<Option<(bool, usize)>> {
        match bits_type(name) {
            None => Ok(None),
            Some((signed, Some(width))) => Ok(Some((signed, width))),
            Some((_, None)) => Err(self.error_at(
                "HVM-P008",
                span,
                format!("`{name}` is wider than the {MAX_BITS_WIDTH}-bit limit"),
            )),
        }
    }

    fn parse_usize(&mut self) -> Result<usize> {
        let (text, span) = self.expect_int()?;
        text.replace('_', "")
            .parse::<usize>()
            .map_err(|_| self.error_at("HVM-P008", span, format!("`{text}` is not a valid count or index")))
    }

    fn parse_offset(&mut self) -> Result<isize> {
        let (text, span) = self.expect_int()?;
        let cleaned = text.replace('_', "");
        cleaned
            .strip_prefix('+')
            .unwrap_or(&cleaned)
            .parse::<isize>()
            .map_err(|_| self.error_at("HVM-P008", span, format!("`{text}` is not a valid jump offset")))
    }

    fn parse_bindings(&mut self) -> Result<SymbolicBindings> {
        self.expect(&Token::LBrace)?;
        let mut bindings = Vec::new();
        while !self.eat(&Token::RBrace) {
            let (name, _) = self.expect_ident()?;
            self.expect(&Token::Colon)?;
            let (text, span) = self.expect_int()?;
            let cleaned = text.replace('_', "");
            let value = cleaned
                .strip_prefix('+')
                .unwrap_or(&cleaned)
                .parse::<i64>()
                .map_err(|_| self.error_at("HVM-P008", span, format!("binding `{name}` value `{text}` is out of range")))?;
            bindings.push((name, value));
            if !self.eat(&Token::Comma) && self.peek() != Some(&Token::RBrace) {
                return Err(self.unexpected("`,` or `}`"));
            }
        }
        Ok(SymbolicBindings::new(bindings))
    }

    fn parse_body(&mut self, module: &Rc<Module>) -> Result<Vec<Bytecode>> {
        let mut body = Vec::new();
        while !self.eat(&Token::RBrace) {
            body.push(self.parse_instruction(module)?);
        }
        Ok(body)
    }

    fn parse_instruction(&mut self, module: &Rc<Module>) -> Result<Bytecode> {
        let (name, start) = self.expect_ident()?;
        let Some(op) = Op::from_name(&name) else {
            let mut err = self.error_at("HVM-P007", start, format!("unknown opcode `{name}`"));
            if Builtin::from_name(&name).is_some() {
                err.hint = Some(format!("builtins are called with `literal builtin:{name}` followed by `call`"));
            }
            return Err(err);
        };
        let data = match op.operand() {
            OperandKind::None => None,
            OperandKind::Value => Some(Data::Value(self.parse_value(module)?)),
            OperandKind::NumElements => Some(Data::NumElements(self.parse_usize()?)),
            OperandKind::SlotIndex => Some(Data::SlotIndex(self.parse_usize()?)),
            OperandKind::JumpTarget => Some(Data::JumpTarget(self.parse_offset()?)),
            OperandKind::Type => Some(Data::Type(self.parse_type(&module.enums)?)),
            OperandKind::OptionalBindings => {
                if self.peek() == Some(&Token::LBrace) {
                    Some(Data::Bindings(self.parse_bindings()?))
                } else {
                    None
                }
            }
        };
        Ok(Bytecode { span: Span::new(start.start, self.prev_end()), op, data })
    }

    fn parse_value_list(&mut self, module: &Rc<Module>, close: &Token) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        while !self.eat(close) {
            values.push(self.parse_value(module)?);
            if !self.eat(&Token::Comma) && self.peek() != Some(close) {
                return Err(self.unexpected(&format!("`,` or {close}")));
            }
        }
        Ok(values)
    }

    fn parse_value(&mut self, module: &Rc<Module>) -> Result<Value> {
        match self.peek().cloned() {
            Some(Token::LBracket) => {
                self.advance();
                Ok(Value::Array(self.parse_value_list(module, &Token::RBracket)?))
            }
            Some(Token::LParen) => {
                self.advance();
                Ok(Value::Tuple(self.parse_value_list(module, &Token::RParen)?))
            }
            Some(Token::Fn) => {
                self.advance();
                self.expect(&Token::Colon)?;
                let (module_name, module_span) = self.expect_ident()?;
                self.expect(&Token::PathSep)?;
                let (name, span) = self.expect_ident()?;
                if module_name != module.name {
                    return Err(self.error_at("HVM-P009", module_span, format!("unknown module `{module_name}`")));
                }
                let function = module
                    .get_function(&name)
                    .ok_or_else(|| self.error_at("HVM-P009", span, format!("unknown function `{module_name}::{name}`")))?;
                Ok(Value::user_fn(module.clone(), function.clone()))
            }
            Some(Token::Ident(name)) => {
                let span = self.peek_span();
                self.advance();
                self.parse_named_value(module, &name, span)
            }
            _ => Err(self.unexpected("a value")),
        }
    }

    fn parse_named_value(&mut self, module: &Rc<Module>, name: &str, span: Span) -> Result<Value> {
        if name == "token" {
            return Ok(Value::Token);
        }
        if name == "builtin" {
            self.expect(&Token::Colon)?;
            let (builtin, span) = self.expect_ident()?;
            return Builtin::from_name(&builtin)
                .map(Value::builtin)
                .ok_or_else(|| self.error_at("HVM-P009", span, format!("unknown builtin `{builtin}`")));
        }
        let bits_ty = if name == "bool" { Some((false, 1)) } else { self.bits_type_at(name, span)? };
        if let Some((signed, width)) = bits_ty {
            self.expect(&Token::Colon)?;
            let (text, span) = self.expect_int()?;
            return Ok(Value::from_bits(signed, self.bits_literal(&text, signed, width, span)?));
        }
        let Some(def) = module.get_enum(name) else {
            return Err(self.error_at("HVM-P009", span, format!("`{name}` does not start a value")));
        };
        if self.eat(&Token::PathSep) {
            let (member, member_span) = self.expect_ident()?;
            let bits = def.member(&member).cloned().ok_or_else(|| {
                self.error_at("HVM-P009", member_span, format!("enum `{name}` has no member `{member}`"))
            })?;
            return Ok(Value::Enum { def: def.clone(), bits });
        }
        self.expect(&Token::Colon)?;
        let (text, span) = self.expect_int()?;
        let bits = self.bits_literal(&text, def.signed, def.width, span)?;
        Ok(Value::Enum { def: def.clone(), bits })
    }

    /// Decimal literals must fit the type's range; hex and binary literals
    /// are raw patterns and only need to fit the width.
    fn bits_literal(&self, text: &str, signed: bool, width: usize, span: Span) -> Result<Bits> {
        let (n, pattern) = parse_int_literal(text)
            .ok_or_else(|| self.error_at("HVM-P008", span, format!("`{text}` is not a valid integer")))?;
        let limit = BigInt::one() << width;
        let fits = if pattern || !signed {
            !n.is_negative() && n < limit
        } else if width == 0 {
            n.is_zero()
        } else {
            let half = BigInt::one() << (width - 1);
            n >= -&half && n < half
        };
        if !fits {
            let prefix = if signed { 's' } else { 'u' };
            return Err(self.error_at("HVM-P008", span, format!("{text} does not fit in {prefix}{width}")));
        }
        Ok(Bits::from_bigint(width, &n))
    }
}

/// Widest bits type the assembler accepts.
pub const MAX_BITS_WIDTH: usize = 1 << 24;

/// `u8` -> (false, Some(8)), `s32` -> (true, Some(32)). The width is `None`
/// when it exceeds [`MAX_BITS_WIDTH`].
fn bits_type(name: &str) -> Option<(bool, Option<usize>)> {
    let signed = match name.as_bytes().first()? {
        b'u' => false,
        b's' => true,
        _ => return None,
    };
    let digits = &name[1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let width = digits.parse::<usize>().ok().filter(|w| *w <= MAX_BITS_WIDTH);
    Some((signed, width))
}

fn parse_int_literal(text: &str) -> Option<(BigInt, bool)> {
    let cleaned = text.replace('_', "");
    if let Some(hex) = cleaned.strip_prefix("0x") {
        return BigInt::parse_bytes(hex.as_bytes(), 16).map(|n| (n, true));
    }
    if let Some(bin) = cleaned.strip_prefix("0b") {
        return BigInt::parse_bytes(bin.as_bytes(), 2).map(|n| (n, true));
    }
    cleaned
        .strip_prefix('+')
        .unwrap_or(&cleaned)
        .parse::<BigInt>()
        .ok()
        .map(|n| (n, false))
}
