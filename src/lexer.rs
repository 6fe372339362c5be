//! Scans JMESPath source text into a stream of tokens.

use std::fmt;

use crate::errors::SyntaxError;

/// The closed set of token kinds the compiler dispatches on.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    QuotedIdentifier(String),
    Literal(serde_json::Value),
    Number(i32),
    Dot,
    Star,
    Lbracket,
    Rbracket,
    Lbrace,
    Rbrace,
    Colon,
    Comma,
    Pipe,
    Or,
    And,
    Not,
    Ampersand,
    Lparen,
    Rparen,
    Filter,
    Flatten,
    Function(String),
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    At,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An immutable `{type, value, position}` record produced by the lexer.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, position: usize) -> Token {
        Token { kind, position }
    }

    /// Left-binding precedence used by the Pratt loop. Lower binds tighter.
    pub fn lbp(&self) -> usize {
        use TokenKind::*;
        match self.kind {
            Flatten | Rbracket | Rbrace | Comma | Rparen | Or => 1,
            Pipe => 2,
            _ => 0,
        }
    }
}

/// Scans `expr` into a vector of tokens terminated by exactly one `Eof`.
pub fn tokenize(expr: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(expr).run()
}

struct Lexer<'a> {
    expr: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(expr: &'a str) -> Lexer<'a> {
        Lexer {
            expr,
            chars: expr.chars().collect(),
            pos: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let c = match self.peek() {
                None => {
                    tokens.push(Token::new(TokenKind::Eof, start));
                    break;
                }
                Some(c) => c,
            };
            let kind = match c {
                '.' => {
                    self.advance();
                    TokenKind::Dot
                }
                '*' => {
                    self.advance();
                    TokenKind::Star
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }
                ':' => {
                    self.advance();
                    TokenKind::Colon
                }
                '{' => {
                    self.advance();
                    TokenKind::Lbrace
                }
                '}' => {
                    self.advance();
                    TokenKind::Rbrace
                }
                '(' => {
                    self.advance();
                    TokenKind::Lparen
                }
                ')' => {
                    self.advance();
                    TokenKind::Rparen
                }
                '@' => {
                    self.advance();
                    TokenKind::At
                }
                '[' => self.consume_lbracket(start)?,
                '|' => {
                    self.advance();
                    if self.peek() == Some('|') {
                        self.advance();
                        TokenKind::Or
                    } else {
                        TokenKind::Pipe
                    }
                }
                '&' => {
                    self.advance();
                    if self.peek() == Some('&') {
                        self.advance();
                        TokenKind::And
                    } else {
                        TokenKind::Ampersand
                    }
                }
                '!' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Ne
                    } else {
                        TokenKind::Not
                    }
                }
                '=' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Eq
                    } else {
                        return Err(self.err(start, "unexpected '=', did you mean '=='?"));
                    }
                }
                '<' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Lte
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Gte
                    } else {
                        TokenKind::Gt
                    }
                }
                '"' => self.consume_quoted_identifier(start)?,
                '\'' => self.consume_raw_string(start)?,
                '`' => self.consume_literal(start)?,
                '-' | '0'..='9' => self.consume_number(start)?,
                c if is_ident_start(c) => self.consume_identifier(start),
                c => return Err(self.err(start, &format!("unexpected character '{}'", c))),
            };
            tokens.push(Token::new(kind, start));
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn consume_lbracket(&mut self, _start: usize) -> Result<TokenKind, SyntaxError> {
        self.advance();
        match self.peek() {
            Some(']') => {
                self.advance();
                Ok(TokenKind::Flatten)
            }
            Some('?') => {
                self.advance();
                Ok(TokenKind::Filter)
            }
            _ => Ok(TokenKind::Lbracket),
        }
    }

    fn consume_identifier(&mut self, start: usize) -> TokenKind {
        while let Some(c) = self.peek() {
            if is_ident_char(c) {
                self.advance();
            } else {
                break;
            }
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        if self.peek() == Some('(') {
            TokenKind::Function(name)
        } else {
            TokenKind::Identifier(name)
        }
    }

    fn consume_number(&mut self, start: usize) -> Result<TokenKind, SyntaxError> {
        if self.peek() == Some('-') {
            self.advance();
        }
        let digits_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == digits_start {
            return Err(self.err(start, "expected a number"));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<i32>()
            .map(TokenKind::Number)
            .map_err(|_| self.err(start, "number out of range"))
    }

    fn consume_quoted_identifier(&mut self, start: usize) -> Result<TokenKind, SyntaxError> {
        let raw = self.consume_delimited('"', start)?;
        let decoded: String = serde_json::from_str(&format!("\"{}\"", raw))
            .map_err(|_| self.err(start, "invalid quoted identifier"))?;
        Ok(TokenKind::QuotedIdentifier(decoded))
    }

    fn consume_raw_string(&mut self, start: usize) -> Result<TokenKind, SyntaxError> {
        self.advance();
        let mut buf = String::new();
        loop {
            match self.advance() {
                None => return Err(self.err(start, "unterminated raw string literal")),
                Some('\'') => break,
                Some('\\') if self.peek() == Some('\'') => {
                    self.advance();
                    buf.push('\'');
                }
                Some(c) => buf.push(c),
            }
        }
        Ok(TokenKind::Literal(serde_json::Value::String(buf)))
    }

    fn consume_literal(&mut self, start: usize) -> Result<TokenKind, SyntaxError> {
        let raw = self.consume_delimited('`', start)?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|_| self.err(start, "invalid JSON literal"))?;
        Ok(TokenKind::Literal(value))
    }

    /// Consumes characters up to and including the next unescaped `delim`,
    /// returning the raw text between the delimiters (escapes kept as-is).
    fn consume_delimited(&mut self, delim: char, start: usize) -> Result<String, SyntaxError> {
        self.advance();
        let inner_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.err(start, "unterminated literal")),
                Some(c) if c == delim => {
                    let raw: String = self.chars[inner_start..self.pos].iter().collect();
                    self.advance();
                    return Ok(raw);
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn err(&self, pos: usize, msg: &str) -> SyntaxError {
        SyntaxError::new(self.expr, pos, msg, "")
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(expr: &str) -> Vec<TokenKind> {
        tokenize(expr).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_dotted_path() {
        assert_eq!(
            kinds("a.b"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Dot,
                TokenKind::Identifier("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_function_call() {
        assert_eq!(
            kinds("length(@)"),
            vec![
                TokenKind::Function("length".into()),
                TokenKind::Lparen,
                TokenKind::At,
                TokenKind::Rparen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_flatten_and_filter() {
        assert_eq!(
            kinds("a[][?b]"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Flatten,
                TokenKind::Filter,
                TokenKind::Identifier("b".into()),
                TokenKind::Rbracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_comparators_and_logic() {
        assert_eq!(
            kinds("a==b && c!=d || !e"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Eq,
                TokenKind::Identifier("b".into()),
                TokenKind::And,
                TokenKind::Identifier("c".into()),
                TokenKind::Ne,
                TokenKind::Identifier("d".into()),
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Identifier("e".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_backtick_literal() {
        assert_eq!(
            kinds("`1`"),
            vec![
                TokenKind::Literal(serde_json::json!(1)),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_unterminated_literal() {
        assert!(tokenize("`1").is_err());
    }
}
