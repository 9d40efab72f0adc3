//! Byte stream to token stream.
//!
//! Whitespace (space, tab, CR) is insignificant; newline is a statement
//! delimiter equivalent to `,`. Line comments start with `#`.

use crate::error::{Position, ReflexError, ReflexResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),

    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Dot,
    Eq,
    Comma,
    Bang,
    Caret,
    Ancestor, // `^^`
    At,
    ColonEq,   // `:=`
    LArrow,    // `<-`
    Question,
    Colon,
    Newline,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> ReflexResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn skip_insignificant(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => {
                    self.bump();
                }
                Some(b'#') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> ReflexResult<Token> {
        self.skip_insignificant();
        let position = self.here();
        let Some(b) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, position });
        };

        let kind = match b {
            b'\n' => {
                self.bump();
                TokenKind::Newline
            }
            b'{' => {
                self.bump();
                TokenKind::LBrace
            }
            b'}' => {
                self.bump();
                TokenKind::RBrace
            }
            b'[' => {
                self.bump();
                TokenKind::LBracket
            }
            b']' => {
                self.bump();
                TokenKind::RBracket
            }
            b'(' => {
                self.bump();
                TokenKind::LParen
            }
            b')' => {
                self.bump();
                TokenKind::RParen
            }
            b'.' => {
                self.bump();
                TokenKind::Dot
            }
            b',' => {
                self.bump();
                TokenKind::Comma
            }
            b'!' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            b'@' => {
                self.bump();
                TokenKind::At
            }
            b'?' => {
                self.bump();
                TokenKind::Question
            }
            b':' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::ColonEq
                } else {
                    TokenKind::Colon
                }
            }
            b'^' => {
                self.bump();
                if self.peek() == Some(b'^') {
                    self.bump();
                    TokenKind::Ancestor
                } else {
                    TokenKind::Caret
                }
            }
            b'=' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            b'+' => {
                self.bump();
                TokenKind::Plus
            }
            b'*' => {
                self.bump();
                TokenKind::Star
            }
            b'/' => {
                self.bump();
                TokenKind::Slash
            }
            b'%' => {
                self.bump();
                TokenKind::Percent
            }
            b'<' => {
                self.bump();
                if self.peek() == Some(b'-') {
                    self.bump();
                    TokenKind::LArrow
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            b'&' if self.peek2() == Some(b'&') => {
                self.bump();
                self.bump();
                TokenKind::AndAnd
            }
            b'|' if self.peek2() == Some(b'|') => {
                self.bump();
                self.bump();
                TokenKind::OrOr
            }
            b'-' => {
                self.bump();
                TokenKind::Minus
            }
            b'0'..=b'9' => self.lex_int()?,
            b'"' | b'\'' => self.lex_string(b)?,
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.lex_ident(),
            other => {
                return Err(ReflexError::Lex {
                    message: format!("unexpected byte {:?}", other as char),
                    position,
                });
            }
        };

        Ok(Token { kind, position })
    }

    /// Scans an unsigned decimal digit run. The grammar's `-?[0-9]+` sign is
    /// folded in by the parser (`Minus` immediately before a primary `Int`),
    /// not here — that keeps this lexer context-free: `-` is always a single
    /// `Minus` token, so `x - 5` and `-5` never depend on lookahead here.
    fn lex_int(&mut self) -> ReflexResult<TokenKind> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("ascii digits are valid utf8");
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| ReflexError::Lex {
                message: format!("integer literal out of range: {text}"),
                position: self.here(),
            })
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("ascii identifier is valid utf8");
        TokenKind::Ident(text.to_owned())
    }

    fn lex_string(&mut self, quote: u8) -> ReflexResult<TokenKind> {
        let position = self.here();
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ReflexError::Lex {
                        message: "unterminated string literal".to_owned(),
                        position,
                    });
                }
                Some(b) if b == quote => break,
                Some(b'\\') => {
                    let escaped = self.bump().ok_or_else(|| ReflexError::Lex {
                        message: "unterminated string literal".to_owned(),
                        position,
                    })?;
                    out.push(match escaped {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        b'\\' => '\\',
                        b'"' => '"',
                        b'\'' => '\'',
                        other => {
                            return Err(ReflexError::Lex {
                                message: format!("invalid escape sequence \\{}", other as char),
                                position,
                            });
                        }
                    });
                }
                Some(b) => {
                    // Collect the full UTF-8 sequence for this byte.
                    let len = utf8_len(b);
                    let start = self.pos - 1;
                    for _ in 1..len {
                        self.bump();
                    }
                    let slice = &self.src[start..self.pos];
                    out.push_str(std::str::from_utf8(slice).map_err(|_| ReflexError::Lex {
                        message: "invalid utf-8 in string literal".to_owned(),
                        position,
                    })?);
                }
            }
        }
        Ok(TokenKind::Str(out))
    }
}

fn utf8_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_basic_punctuation() {
        assert_eq!(
            kinds("a.b[c=1]!"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Dot,
                TokenKind::Ident("b".into()),
                TokenKind::LBracket,
                TokenKind::Ident("c".into()),
                TokenKind::Eq,
                TokenKind::Int(1),
                TokenKind::RBracket,
                TokenKind::Bang,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_caret_ancestor_and_assign_forms() {
        assert_eq!(
            kinds("^^.f, ^.g, x := 1, y <- z"),
            vec![
                TokenKind::Ancestor,
                TokenKind::Dot,
                TokenKind::Ident("f".into()),
                TokenKind::Comma,
                TokenKind::Caret,
                TokenKind::Dot,
                TokenKind::Ident("g".into()),
                TokenKind::Comma,
                TokenKind::Ident("x".into()),
                TokenKind::ColonEq,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Ident("y".into()),
                TokenKind::LArrow,
                TokenKind::Ident("z".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_newlines() {
        assert_eq!(
            kinds("a = 1 # comment\nb = 2"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Eq,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Ident("b".into()),
                TokenKind::Eq,
                TokenKind::Int(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#" "a\nb" "#), vec![TokenKind::Str("a\nb".into()), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        assert!(Lexer::new("\"abc").tokenize().is_err());
    }

    #[test]
    fn minus_is_always_its_own_token() {
        assert_eq!(kinds("-42"), vec![TokenKind::Minus, TokenKind::Int(42), TokenKind::Eof]);
        assert_eq!(
            kinds("x - 5"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Minus,
                TokenKind::Int(5),
                TokenKind::Eof,
            ]
        );
    }
}
