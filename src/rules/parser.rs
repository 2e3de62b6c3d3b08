//! Recursive-descent parser producing the rule syntax tree.

use super::lexer::{hex_value, tokenize, Spanned, Token};
use crate::error::{Result, TriageError};

#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub nocase: bool,
    pub wide: bool,
    pub ascii: bool,
    pub fullword: bool,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexToken {
    /// A byte compared under `mask`; `0x00` mask is a full wildcard.
    Byte { value: u8, mask: u8 },
    Jump { min: u32, max: Option<u32> },
    Alternatives(Vec<Vec<HexToken>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Text(Vec<u8>),
    Hex(Vec<HexToken>),
    Regex {
        pattern: String,
        nocase: bool,
        dotall: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringDecl {
    /// Identifier without `$`; empty for anonymous strings.
    pub id: String,
    pub line: usize,
    pub pattern: Pattern,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
    None,
    AtLeast(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringSet {
    Them,
    /// Identifiers, each optionally ending in `*`.
    Patterns(Vec<String>),
}

/// Integer read function, e.g. `uint16be(off)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFn {
    pub bytes: usize,
    pub signed: bool,
    pub big_endian: bool,
}

impl ReadFn {
    fn from_name(name: &str) -> Option<Self> {
        let (signed, rest) = if let Some(rest) = name.strip_prefix("uint") {
            (false, rest)
        } else if let Some(rest) = name.strip_prefix("int") {
            (true, rest)
        } else {
            return None;
        };
        let (width, big_endian) = match rest.strip_suffix("be") {
            Some(w) => (w, true),
            None => (rest, false),
        };
        let bytes = match width {
            "8" => 1,
            "16" => 2,
            "32" => 4,
            _ => return None,
        };
        Some(ReadFn {
            bytes,
            signed,
            big_endian,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    Filesize,
    /// `$a`
    Matched(String),
    /// `#a`
    Count(String),
    /// `$a at N`
    At(String, Box<Expr>),
    /// `$a in (A..B)`
    In(String, Box<Expr>, Box<Expr>),
    Read(ReadFn, Box<Expr>),
    /// Reference to an earlier rule.
    Rule(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Of(Quantifier, StringSet),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecl {
    pub name: String,
    pub line: usize,
    pub private: bool,
    pub global: bool,
    pub tags: Vec<String>,
    pub meta: Vec<(String, MetaValue)>,
    pub strings: Vec<StringDecl>,
    pub condition: Expr,
}

/// Parse a complete rule source document.
pub fn parse(source: &str) -> Result<Vec<RuleDecl>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut rules = Vec::new();
    while !parser.at_end() {
        rules.push(parser.rule()?);
    }
    Ok(rules)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn error(&self, message: impl Into<String>) -> TriageError {
        TriageError::rule_compilation(self.line(), message)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|s| s.token.clone())
            .ok_or_else(|| self.error("unexpected end of rule source"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        match self.peek() {
            Some(t) if *t == expected => {
                self.pos += 1;
                Ok(())
            }
            other => Err(self.error(format!("expected {}, found {}", what, describe(other)))),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            other => Err(self.error(format!("expected {}, found {}", what, describe(other)))),
        }
    }

    fn rule(&mut self) -> Result<RuleDecl> {
        if self.is_keyword("import") || self.is_keyword("include") {
            return Err(self.error("import and include statements are not supported"));
        }
        let mut private = false;
        let mut global = false;
        loop {
            if self.eat_keyword("private") {
                private = true;
            } else if self.eat_keyword("global") {
                global = true;
            } else {
                break;
            }
        }
        let line = self.line();
        if !self.eat_keyword("rule") {
            return Err(self.error(format!("expected 'rule', found {}", describe(self.peek()))));
        }
        let name = self.ident("rule name")?;
        if is_reserved(&name) {
            return Err(self.error(format!("'{}' is a reserved word", name)));
        }

        let mut tags = Vec::new();
        if self.peek() == Some(&Token::Colon) {
            self.pos += 1;
            while let Some(Token::Ident(tag)) = self.peek() {
                tags.push(tag.clone());
                self.pos += 1;
            }
            if tags.is_empty() {
                return Err(self.error("expected at least one tag after ':'"));
            }
        }

        self.expect(Token::LBrace, "'{'")?;
        let mut meta = Vec::new();
        let mut strings = Vec::new();
        if self.section("meta")? {
            meta = self.meta_entries()?;
        }
        if self.section("strings")? {
            strings = self.string_decls()?;
        }
        if !self.section("condition")? {
            return Err(self.error(format!("rule '{}' has no condition", name)));
        }
        let condition = self.or_expr()?;
        self.expect(Token::RBrace, "'}'")?;

        Ok(RuleDecl {
            name,
            line,
            private,
            global,
            tags,
            meta,
            strings,
            condition,
        })
    }

    /// Consume `keyword :` when present.
    fn section(&mut self, keyword: &str) -> Result<bool> {
        if self.is_keyword(keyword) && self.peek_at(1) == Some(&Token::Colon) {
            self.pos += 2;
            return Ok(true);
        }
        Ok(false)
    }

    fn meta_entries(&mut self) -> Result<Vec<(String, MetaValue)>> {
        let mut out = Vec::new();
        while matches!(self.peek(), Some(Token::Ident(_)))
            && self.peek_at(1) == Some(&Token::Assign)
        {
            let key = self.ident("meta key")?;
            self.expect(Token::Assign, "'='")?;
            let value = match self.next()? {
                Token::Text(bytes) => MetaValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
                Token::Int(n) => MetaValue::Int(n),
                Token::Minus => match self.next()? {
                    Token::Int(n) => MetaValue::Int(-n),
                    _ => return Err(self.error("expected integer after '-'")),
                },
                Token::Ident(s) if s == "true" => MetaValue::Bool(true),
                Token::Ident(s) if s == "false" => MetaValue::Bool(false),
                other => {
                    return Err(self.error(format!(
                        "invalid meta value {}",
                        describe(Some(&other))
                    )))
                }
            };
            out.push((key, value));
        }
        Ok(out)
    }

    fn string_decls(&mut self) -> Result<Vec<StringDecl>> {
        let mut out = Vec::new();
        while let Some(Token::StringId(id)) = self.peek() {
            let id = id.clone();
            let line = self.line();
            if id.ends_with('*') {
                return Err(self.error("wildcard not allowed in string declaration"));
            }
            self.pos += 1;
            self.expect(Token::Assign, "'='")?;
            let pattern = match self.next()? {
                Token::Text(bytes) => Pattern::Text(bytes),
                Token::Hex(body) => Pattern::Hex(parse_hex(&body, line)?),
                Token::Regex {
                    pattern,
                    nocase,
                    dotall,
                } => Pattern::Regex {
                    pattern,
                    nocase,
                    dotall,
                },
                other => {
                    return Err(self.error(format!(
                        "expected string value, found {}",
                        describe(Some(&other))
                    )))
                }
            };
            let mut modifiers = Modifiers::default();
            loop {
                let flag = match self.peek() {
                    Some(Token::Ident(s)) => match s.as_str() {
                        "nocase" => &mut modifiers.nocase,
                        "wide" => &mut modifiers.wide,
                        "ascii" => &mut modifiers.ascii,
                        "fullword" => &mut modifiers.fullword,
                        "private" => &mut modifiers.private,
                        "xor" | "base64" | "base64wide" => {
                            return Err(self.error(format!("modifier '{}' is not supported", s)))
                        }
                        _ => break,
                    },
                    _ => break,
                };
                if *flag {
                    return Err(self.error("duplicate string modifier"));
                }
                *flag = true;
                self.pos += 1;
            }
            if !id.is_empty() && out.iter().any(|s: &StringDecl| s.id == id) {
                return Err(TriageError::rule_compilation(
                    line,
                    format!("duplicate string identifier ${}", id),
                ));
            }
            out.push(StringDecl {
                id,
                line,
                pattern,
                modifiers,
            });
        }
        if out.is_empty() {
            return Err(self.error("empty strings section"));
        }
        Ok(out)
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat_keyword("or") {
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.not_expr()?;
        while self.eat_keyword("and") {
            let rhs = self.not_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.cmp_expr()
    }

    fn cmp_expr(&mut self) -> Result<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.primary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.primary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next()? {
            Token::LParen => {
                let inner = self.or_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Int(n) => {
                if self.eat_keyword("of") {
                    return Ok(Expr::Of(Quantifier::AtLeast(n), self.string_set()?));
                }
                Ok(Expr::Int(n))
            }
            Token::Minus => match self.next()? {
                Token::Int(n) => Ok(Expr::Int(-n)),
                _ => Err(self.error("expected integer after '-'")),
            },
            Token::StringCount(id) => Ok(Expr::Count(id)),
            Token::StringId(id) => {
                if id.is_empty() || id.ends_with('*') {
                    return Err(self.error("anonymous or wildcard string outside a set"));
                }
                if self.eat_keyword("at") {
                    let offset = self.additive()?;
                    return Ok(Expr::At(id, Box::new(offset)));
                }
                if self.eat_keyword("in") {
                    self.expect(Token::LParen, "'('")?;
                    let lo = self.additive()?;
                    self.expect(Token::DotDot, "'..'")?;
                    let hi = self.additive()?;
                    self.expect(Token::RParen, "')'")?;
                    return Ok(Expr::In(id, Box::new(lo), Box::new(hi)));
                }
                Ok(Expr::Matched(id))
            }
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "filesize" => Ok(Expr::Filesize),
                "any" | "all" | "none" => {
                    let quantifier = match word.as_str() {
                        "any" => Quantifier::Any,
                        "all" => Quantifier::All,
                        _ => Quantifier::None,
                    };
                    if !self.eat_keyword("of") {
                        return Err(self.error(format!("expected 'of' after '{}'", word)));
                    }
                    Ok(Expr::Of(quantifier, self.string_set()?))
                }
                _ => {
                    if let Some(read) = ReadFn::from_name(&word) {
                        self.expect(Token::LParen, "'('")?;
                        let offset = self.or_expr()?;
                        self.expect(Token::RParen, "')'")?;
                        return Ok(Expr::Read(read, Box::new(offset)));
                    }
                    if is_reserved(&word) {
                        return Err(self.error(format!("unexpected keyword '{}'", word)));
                    }
                    Ok(Expr::Rule(word))
                }
            },
            other => Err(self.error(format!(
                "unexpected {} in condition",
                describe(Some(&other))
            ))),
        }
    }

    fn string_set(&mut self) -> Result<StringSet> {
        if self.eat_keyword("them") {
            return Ok(StringSet::Them);
        }
        self.expect(Token::LParen, "'(' or 'them'")?;
        let mut ids = Vec::new();
        loop {
            match self.next()? {
                Token::StringId(id) if !id.is_empty() => ids.push(id),
                other => {
                    return Err(self.error(format!(
                        "expected string identifier, found {}",
                        describe(Some(&other))
                    )))
                }
            }
            match self.next()? {
                Token::Comma => continue,
                Token::RParen => break,
                other => {
                    return Err(self.error(format!(
                        "expected ',' or ')', found {}",
                        describe(Some(&other))
                    )))
                }
            }
        }
        Ok(StringSet::Patterns(ids))
    }
}

const RESERVED: &[&str] = &[
    "all", "and", "any", "at", "condition", "false", "filesize", "global", "import", "in",
    "include", "meta", "none", "not", "of", "or", "private", "rule", "strings", "them", "true",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

fn describe(token: Option<&Token>) -> String {
    match token {
        None => "end of input".to_string(),
        Some(Token::Ident(s)) => format!("'{}'", s),
        Some(Token::StringId(s)) => format!("'${}'", s),
        Some(Token::StringCount(s)) => format!("'#{}'", s),
        Some(Token::Int(n)) => format!("'{}'", n),
        Some(Token::Text(_)) => "text string".to_string(),
        Some(Token::Hex(_)) => "hex string".to_string(),
        Some(Token::Regex { .. }) => "regular expression".to_string(),
        Some(other) => format!("{:?}", other),
    }
}

/// Parse the body of a `{ ... }` hex string.
pub fn parse_hex(body: &str, line: usize) -> Result<Vec<HexToken>> {
    let chars: Vec<u8> = body.bytes().filter(|c| !c.is_ascii_whitespace()).collect();
    let mut pos = 0;
    let tokens = hex_sequence(&chars, &mut pos, line, false)?;
    if pos != chars.len() {
        return Err(TriageError::rule_compilation(line, "unbalanced ')' in hex string"));
    }
    if !tokens.iter().any(|t| matches!(t, HexToken::Byte { .. } | HexToken::Alternatives(_))) {
        return Err(TriageError::rule_compilation(line, "empty hex string"));
    }
    if matches!(tokens.first(), Some(HexToken::Jump { .. }))
        || matches!(tokens.last(), Some(HexToken::Jump { .. }))
    {
        return Err(TriageError::rule_compilation(
            line,
            "hex string cannot start or end with a jump",
        ));
    }
    Ok(tokens)
}

fn hex_sequence(chars: &[u8], pos: &mut usize, line: usize, nested: bool) -> Result<Vec<HexToken>> {
    let err = |msg: &str| TriageError::rule_compilation(line, msg.to_string());
    let mut out = Vec::new();
    while *pos < chars.len() {
        match chars[*pos] {
            b'|' | b')' if nested => break,
            b'(' => {
                *pos += 1;
                let mut branches = vec![hex_sequence(chars, pos, line, true)?];
                while chars.get(*pos) == Some(&b'|') {
                    *pos += 1;
                    branches.push(hex_sequence(chars, pos, line, true)?);
                }
                if chars.get(*pos) != Some(&b')') {
                    return Err(err("unterminated alternative in hex string"));
                }
                *pos += 1;
                out.push(HexToken::Alternatives(branches));
            }
            b'[' => {
                let end = chars[*pos..]
                    .iter()
                    .position(|&c| c == b']')
                    .map(|i| *pos + i)
                    .ok_or_else(|| err("unterminated jump in hex string"))?;
                let range = std::str::from_utf8(&chars[*pos + 1..end])
                    .map_err(|_| err("invalid jump in hex string"))?;
                out.push(parse_jump(range).ok_or_else(|| err("invalid jump in hex string"))?);
                *pos = end + 1;
            }
            hi => {
                let lo = chars
                    .get(*pos + 1)
                    .copied()
                    .ok_or_else(|| err("odd number of hex digits"))?;
                let (hv, hm) = nibble(hi).ok_or_else(|| err("invalid hex digit"))?;
                let (lv, lm) = nibble(lo).ok_or_else(|| err("invalid hex digit"))?;
                out.push(HexToken::Byte {
                    value: hv << 4 | lv,
                    mask: hm << 4 | lm,
                });
                *pos += 2;
            }
        }
    }
    Ok(out)
}

fn nibble(c: u8) -> Option<(u8, u8)> {
    if c == b'?' {
        Some((0, 0))
    } else {
        hex_value(c).map(|v| (v, 0x0F))
    }
}

fn parse_jump(range: &str) -> Option<HexToken> {
    match range.split_once('-') {
        None => {
            let n = range.parse().ok()?;
            Some(HexToken::Jump {
                min: n,
                max: Some(n),
            })
        }
        Some((lo, hi)) => {
            let min = if lo.is_empty() { 0 } else { lo.parse().ok()? };
            let max = if hi.is_empty() {
                None
            } else {
                Some(hi.parse().ok()?)
            };
            if max.is_some_and(|m| m < min) {
                return None;
            }
            Some(HexToken::Jump { min, max })
        }
    }
}
