//! Streaming tokenizer for the record wire format
//!
//! Single pass over a character stream, yielding typed symbols sufficient to
//! reconstruct a record without building an intermediate tree. Numeric
//! literals are classified here, once, for the whole system: a fractional
//! part or exponent makes a double; otherwise the literal is an int if it
//! fits in 32 bits signed and a long if it fits in 64.

use shelf_core::{Error, Result};
use std::iter::Peekable;
use std::str::CharIndices;

/// A single wire-format symbol
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `{`
    ObjectStart,
    /// `}`
    ObjectEnd,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// String literal
    Str(String),
    /// Integer literal fitting in 32 bits signed
    Int(i32),
    /// Integer literal needing 64 bits
    Long(i64),
    /// Literal with a fractional part or exponent
    Double(f64),
    /// `true` or `false`
    Bool(bool),
    /// `null`
    Null,
    /// End of input
    Eof,
}

impl Token {
    /// Human-readable description used in expected/found parse errors
    pub fn describe(&self) -> String {
        match self {
            Token::ObjectStart => "'{'".to_string(),
            Token::ObjectEnd => "'}'".to_string(),
            Token::ArrayStart => "'['".to_string(),
            Token::ArrayEnd => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Str(s) => format!("string {s:?}"),
            Token::Int(i) => format!("int {i}"),
            Token::Long(l) => format!("long {l}"),
            Token::Double(d) => format!("double {d}"),
            Token::Bool(b) => format!("bool {b}"),
            Token::Null => "null".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// Streaming tokenizer over a wire-format string
pub struct Tokenizer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
    token_offset: usize,
}

impl<'a> Tokenizer<'a> {
    /// Tokenize `src` from the beginning
    pub fn new(src: &'a str) -> Self {
        Tokenizer {
            src,
            chars: src.char_indices().peekable(),
            token_offset: 0,
        }
    }

    /// Byte offset of the most recently produced token
    pub fn offset(&self) -> usize {
        self.token_offset
    }

    fn error(&self, expected: impl Into<String>, found: impl Into<String>) -> Error {
        Error::Parse {
            expected: expected.into(),
            found: found.into(),
            offset: self.token_offset,
        }
    }

    /// Produce the next token
    ///
    /// # Errors
    /// Fails with `Error::Parse` on any malformed symbol, naming the
    /// expected and found input at the failure offset.
    pub fn next_token(&mut self) -> Result<Token> {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }

        let Some(&(offset, c)) = self.chars.peek() else {
            self.token_offset = self.src.len();
            return Ok(Token::Eof);
        };
        self.token_offset = offset;

        match c {
            '{' => {
                self.chars.next();
                Ok(Token::ObjectStart)
            }
            '}' => {
                self.chars.next();
                Ok(Token::ObjectEnd)
            }
            '[' => {
                self.chars.next();
                Ok(Token::ArrayStart)
            }
            ']' => {
                self.chars.next();
                Ok(Token::ArrayEnd)
            }
            ',' => {
                self.chars.next();
                Ok(Token::Comma)
            }
            ':' => {
                self.chars.next();
                Ok(Token::Colon)
            }
            '"' => self.read_string(),
            '-' | '0'..='9' => self.read_number(),
            't' | 'f' | 'n' => self.read_keyword(),
            other => Err(self.error("a wire-format symbol", format!("'{other}'"))),
        }
    }

    fn read_keyword(&mut self) -> Result<Token> {
        let start = self.token_offset;
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_ascii_alphabetic() {
                end = idx + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        match &self.src[start..end] {
            "true" => Ok(Token::Bool(true)),
            "false" => Ok(Token::Bool(false)),
            "null" => Ok(Token::Null),
            other => Err(self.error("'true', 'false' or 'null'", format!("'{other}'"))),
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.token_offset;
        let mut end = start;
        let mut fractional = false;
        while let Some(&(idx, c)) = self.chars.peek() {
            match c {
                '0'..='9' | '-' | '+' => {}
                '.' | 'e' | 'E' => fractional = true,
                _ => break,
            }
            end = idx + c.len_utf8();
            self.chars.next();
        }
        let literal = &self.src[start..end];

        if fractional {
            let value: f64 = literal
                .parse()
                .map_err(|_| self.error("a numeric literal", format!("'{literal}'")))?;
            return Ok(Token::Double(value));
        }

        let value: i64 = literal
            .parse()
            .map_err(|_| self.error("a 64-bit integer literal", format!("'{literal}'")))?;
        match i32::try_from(value) {
            Ok(int) => Ok(Token::Int(int)),
            Err(_) => Ok(Token::Long(value)),
        }
    }

    fn read_string(&mut self) -> Result<Token> {
        self.chars.next(); // opening quote
        let mut out = String::new();
        loop {
            let Some((_, c)) = self.chars.next() else {
                return Err(self.error("closing '\"'", "end of input"));
            };
            match c {
                '"' => return Ok(Token::Str(out)),
                '\\' => out.push(self.read_escape()?),
                _ => out.push(c),
            }
        }
    }

    fn read_escape(&mut self) -> Result<char> {
        let Some((_, c)) = self.chars.next() else {
            return Err(self.error("an escape character", "end of input"));
        };
        match c {
            '"' => Ok('"'),
            '\\' => Ok('\\'),
            '/' => Ok('/'),
            'b' => Ok('\u{0008}'),
            'f' => Ok('\u{000C}'),
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            'u' => self.read_unicode_escape(),
            other => Err(self.error("a valid escape character", format!("'\\{other}'"))),
        }
    }

    fn read_hex4(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            let Some((_, c)) = self.chars.next() else {
                return Err(self.error("four hex digits", "end of input"));
            };
            let digit = c
                .to_digit(16)
                .ok_or_else(|| self.error("a hex digit", format!("'{c}'")))?;
            value = value * 16 + digit;
        }
        Ok(value)
    }

    fn read_unicode_escape(&mut self) -> Result<char> {
        let high = self.read_hex4()?;
        if (0xD800..0xDC00).contains(&high) {
            // High surrogate: a low surrogate escape must follow
            if self.chars.next().map(|(_, c)| c) != Some('\\')
                || self.chars.next().map(|(_, c)| c) != Some('u')
            {
                return Err(self.error("a low surrogate escape", "other input"));
            }
            let low = self.read_hex4()?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err(self.error("a low surrogate escape", format!("'\\u{low:04x}'")));
            }
            let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            return char::from_u32(combined)
                .ok_or_else(|| self.error("a valid unicode escape", "invalid surrogate pair"));
        }
        char::from_u32(high)
            .ok_or_else(|| self.error("a valid unicode escape", format!("'\\u{high:04x}'")))
    }
}
