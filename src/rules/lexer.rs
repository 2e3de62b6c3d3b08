//! Tokenizer for rule source.
//!
//! Hex strings and regular expressions are only recognized directly after an
//! `=` token, which is the one place they can appear; elsewhere `{` and `/`
//! keep their structural meaning.

use crate::error::{Result, TriageError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    /// `$name`, `$name*` or bare `$`; the name excludes the sigil.
    StringId(String),
    /// `#name`
    StringCount(String),
    Int(i64),
    Text(Vec<u8>),
    /// Raw body between the braces of a hex string.
    Hex(String),
    Regex {
        pattern: String,
        nocase: bool,
        dotall: bool,
    },
    LBrace,
    RBrace,
    LParen,
    RParen,
    Colon,
    Comma,
    DotDot,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>> {
    let mut lexer = Lexer {
        src: source.as_bytes(),
        pos: 0,
        line: 1,
    };
    let mut out: Vec<Spanned> = Vec::new();
    loop {
        lexer.skip_trivia()?;
        let Some(c) = lexer.peek() else { break };
        let line = lexer.line;
        let after_assign = matches!(out.last(), Some(Spanned { token: Token::Assign, .. }));
        let token = match c {
            b'{' if after_assign => lexer.hex_string()?,
            b'/' if after_assign => lexer.regex()?,
            b'"' => lexer.text()?,
            b'$' | b'#' => lexer.string_ref(c)?,
            b'0'..=b'9' => lexer.number()?,
            c if c.is_ascii_alphabetic() || c == b'_' => lexer.ident(),
            _ => lexer.punct()?,
        };
        out.push(Spanned { token, line });
    }
    Ok(out)
}

impl Lexer<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> TriageError {
        TriageError::rule_compilation(self.line, message)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.line;
                    self.pos += 2;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(TriageError::rule_compilation(
                                    start,
                                    "unterminated block comment",
                                ))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn ident(&mut self) -> Token {
        Token::Ident(self.word())
    }

    fn string_ref(&mut self, sigil: u8) -> Result<Token> {
        self.pos += 1;
        let mut name = self.word();
        if sigil == b'$' {
            if self.peek() == Some(b'*') {
                self.pos += 1;
                name.push('*');
            }
            Ok(Token::StringId(name))
        } else if name.is_empty() {
            Err(self.error("expected string identifier after '#'"))
        } else {
            Ok(Token::StringCount(name))
        }
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        let value = if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits = self.word();
            i64::from_str_radix(&digits, 16)
                .map_err(|_| self.error(format!("invalid hex literal 0x{}", digits)))?
        } else {
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
            let digits = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            digits
                .parse::<i64>()
                .map_err(|_| self.error(format!("invalid integer literal {}", digits)))?
        };
        let multiplier = match (self.peek(), self.peek_at(1)) {
            (Some(b'K'), Some(b'B')) => 1024,
            (Some(b'M'), Some(b'B')) => 1024 * 1024,
            _ => 1,
        };
        if multiplier != 1 {
            self.pos += 2;
        }
        value
            .checked_mul(multiplier)
            .map(Token::Int)
            .ok_or_else(|| self.error("integer literal overflows"))
    }

    fn text(&mut self) -> Result<Token> {
        let line = self.line;
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => {
                    return Err(TriageError::rule_compilation(line, "unterminated text string"))
                }
                Some(b'"') => return Ok(Token::Text(out)),
                Some(b'\\') => match self.bump() {
                    Some(b'"') => out.push(b'"'),
                    Some(b'\\') => out.push(b'\\'),
                    Some(b'n') => out.push(b'\n'),
                    Some(b'r') => out.push(b'\r'),
                    Some(b't') => out.push(b'\t'),
                    Some(b'x') => {
                        let hi = self.bump().and_then(hex_value);
                        let lo = self.bump().and_then(hex_value);
                        match (hi, lo) {
                            (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                            _ => return Err(self.error("invalid \\x escape")),
                        }
                    }
                    _ => return Err(self.error("unknown escape sequence")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn hex_string(&mut self) -> Result<Token> {
        self.pos += 1;
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated hex string")),
                Some(b'}') => break,
                Some(_) => {
                    self.bump();
                }
            }
        }
        let body = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        self.pos += 1;
        Ok(Token::Hex(body))
    }

    fn regex(&mut self) -> Result<Token> {
        let line = self.line;
        self.pos += 1;
        let mut raw = Vec::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => {
                    return Err(TriageError::rule_compilation(
                        line,
                        "unterminated regular expression",
                    ))
                }
                Some(b'/') => break,
                Some(b'\\') if self.peek() == Some(b'/') => {
                    self.bump();
                    raw.push(b'/');
                }
                Some(b'\\') => {
                    raw.push(b'\\');
                    if let Some(c) = self.bump() {
                        raw.push(c);
                    }
                }
                Some(c) => raw.push(c),
            }
        }
        let pattern = String::from_utf8_lossy(&raw).into_owned();
        let (mut nocase, mut dotall) = (false, false);
        while let Some(c) = self.peek() {
            match c {
                b'i' => nocase = true,
                b's' => dotall = true,
                _ => break,
            }
            self.pos += 1;
        }
        if pattern.is_empty() {
            return Err(self.error("empty regular expression"));
        }
        Ok(Token::Regex {
            pattern,
            nocase,
            dotall,
        })
    }

    fn punct(&mut self) -> Result<Token> {
        let c = self.peek().unwrap_or(0);
        let next = self.peek_at(1);
        let (token, width) = match (c, next) {
            (b'.', Some(b'.')) => (Token::DotDot, 2),
            (b'=', Some(b'=')) => (Token::Eq, 2),
            (b'!', Some(b'=')) => (Token::Ne, 2),
            (b'<', Some(b'=')) => (Token::Le, 2),
            (b'>', Some(b'=')) => (Token::Ge, 2),
            (b'=', _) => (Token::Assign, 1),
            (b'<', _) => (Token::Lt, 1),
            (b'>', _) => (Token::Gt, 1),
            (b'{', _) => (Token::LBrace, 1),
            (b'}', _) => (Token::RBrace, 1),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            (b':', _) => (Token::Colon, 1),
            (b',', _) => (Token::Comma, 1),
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            _ => {
                return Err(self.error(format!("unexpected character {:?}", c as char)));
            }
        };
        self.pos += width;
        Ok(token)
    }
}

pub(crate) fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
