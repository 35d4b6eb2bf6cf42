//! Tokenizer for solc's normalized Yul IR output.
//!
//! solc's `--ir`/`--ir-optimized` output is always this one dialect (objects wrapping
//! a `code` block, plus nested `data`/`object` children) rather than general-purpose
//! Yul, so the lexer only needs to cover what that emitter actually produces: a small
//! fixed set of keywords, identifiers (including solc's `$`/`.`-containing mangled
//! names), decimal and hex number literals, double-quoted and `hex"..."` string
//! literals, and `{ } ( ) , :=` punctuation.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Identifier(String),
    Number(String),
    HexNumber(String),
    StringLiteral(String),
    HexStringLiteral(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    ColonEquals,
    Arrow,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "identifier {s:?}"),
            Self::Number(s) => write!(f, "number {s}"),
            Self::HexNumber(s) => write!(f, "hex number {s}"),
            Self::StringLiteral(s) => write!(f, "string {s:?}"),
            Self::HexStringLiteral(s) => write!(f, "hex string {s:?}"),
            Self::LBrace => write!(f, "'{{'"),
            Self::RBrace => write!(f, "'}}'"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::Comma => write!(f, "','"),
            Self::Colon => write!(f, "':'"),
            Self::ColonEquals => write!(f, "':='"),
            Self::Arrow => write!(f, "'->'"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

/// A token plus its byte offset in the source, for error messages and source maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub token: Token,
    pub offset: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, (usize, String)> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            let offset = self.pos;
            let Some(c) = self.peek() else {
                out.push(SpannedToken { token: Token::Eof, offset });
                break;
            };
            let token = match c {
                b'{' => self.advance_with(Token::LBrace),
                b'}' => self.advance_with(Token::RBrace),
                b'(' => self.advance_with(Token::LParen),
                b')' => self.advance_with(Token::RParen),
                b',' => self.advance_with(Token::Comma),
                b':' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Token::ColonEquals
                    } else {
                        Token::Colon
                    }
                }
                b'-' if self.bytes.get(self.pos + 1) == Some(&b'>') => {
                    self.pos += 2;
                    Token::Arrow
                }
                b'"' => self.lex_string(offset)?,
                b'0'..=b'9' => self.lex_number(),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => self.lex_identifier_or_hex_literal(offset)?,
                other => {
                    return Err((offset, format!("unexpected byte {:?}", other as char)));
                }
            };
            out.push(SpannedToken { token, offset });
        }
        Ok(out)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance_with(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.pos += 1,
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    self.pos += 2;
                    while self.pos < self.bytes.len() && !self.src[self.pos..].starts_with("*/") {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.bytes.len());
                }
                _ => break,
            }
        }
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        if self.src[self.pos..].starts_with("0x") || self.src[self.pos..].starts_with("0X") {
            self.pos += 2;
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            return Token::HexNumber(self.src[start..self.pos].to_string());
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        Token::Number(self.src[start..self.pos].to_string())
    }

    fn lex_identifier_or_hex_literal(&mut self, offset: usize) -> Result<Token, (usize, String)> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.'))
        {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        if word == "hex" && self.peek() == Some(b'"') {
            let Token::StringLiteral(body) = self.lex_string(offset)? else {
                unreachable!()
            };
            return Ok(Token::HexStringLiteral(body));
        }
        Ok(Token::Identifier(word.to_string()))
    }

    fn lex_string(&mut self, offset: usize) -> Result<Token, (usize, String)> {
        debug_assert_eq!(self.peek(), Some(b'"'));
        self.pos += 1;
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err((offset, "unterminated string literal".to_string())),
                Some(b'\\') => self.pos += 2,
                Some(b'"') => break,
                Some(_) => self.pos += 1,
            }
        }
        let body = self.src[start..self.pos].to_string();
        self.pos += 1;
        Ok(Token::StringLiteral(body))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn lexes_assignment() {
        let toks = tokens("let x := add(1, 2)");
        assert_eq!(
            toks,
            vec![
                Token::Identifier("let".into()),
                Token::Identifier("x".into()),
                Token::ColonEquals,
                Token::Identifier("add".into()),
                Token::LParen,
                Token::Number("1".into()),
                Token::Comma,
                Token::Number("2".into()),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_hex_string_literal() {
        let toks = tokens(r#"hex"deadbeef""#);
        assert_eq!(toks, vec![Token::HexStringLiteral("deadbeef".into()), Token::Eof]);
    }

    #[test]
    fn skips_comments() {
        let toks = tokens("// comment\nlet x := 1 /* inline */ ");
        assert_eq!(
            toks,
            vec![
                Token::Identifier("let".into()),
                Token::Identifier("x".into()),
                Token::ColonEquals,
                Token::Number("1".into()),
                Token::Eof,
            ]
        );
    }

    proptest::proptest! {
        /// Any sequence of space-separated mangled-style identifiers lexes back into
        /// the same identifiers, in order, regardless of how they're packed together.
        #[test]
        fn identifier_sequences_round_trip(words in proptest::collection::vec("[a-zA-Z_][a-zA-Z0-9_$]{0,9}", 1..8)) {
            let src = words.join(" ");
            let toks = tokens(&src);
            let expected: Vec<Token> = words.into_iter().map(Token::Identifier).chain(std::iter::once(Token::Eof)).collect();
            proptest::prop_assert_eq!(toks, expected);
        }
    }
}
