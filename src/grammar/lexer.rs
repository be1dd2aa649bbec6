//! Grammar text lexer.
//!
//! Tokenizes grammar sources like `reg: ADD(reg, CONST) = 2 => add_imm;` and
//! the expression-tree notation used on the command line.

use crate::diagnostic::Location;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Directive(String), // %term, %start
    Separator,         // %%
    LParen,
    RParen,
    LBracket, // [
    RBracket, // ]
    Comma,
    Colon,
    Semicolon,
    Equals,
    Arrow, // =>
    Unknown(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub location: Location,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(ch)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.pos - self.line_start + 1)
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.advance();
                }
                b'#' => self.skip_line(),
                b'/' if self.peek_at(1) == Some(b'/') => self.skip_line(),
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_while(&mut self, pred: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn is_ident_start(ch: u8) -> bool {
        ch.is_ascii_alphabetic() || ch == b'_'
    }

    fn is_ident_char(ch: u8) -> bool {
        ch.is_ascii_alphanumeric() || ch == b'_'
    }

    pub fn tokenize(&mut self) -> Vec<Spanned> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia();
            let location = self.location();
            let Some(ch) = self.peek() else { break };

            let token = match ch {
                b'(' => {
                    self.advance();
                    Token::LParen
                }
                b')' => {
                    self.advance();
                    Token::RParen
                }
                b'[' => {
                    self.advance();
                    Token::LBracket
                }
                b']' => {
                    self.advance();
                    Token::RBracket
                }
                b',' => {
                    self.advance();
                    Token::Comma
                }
                b':' => {
                    self.advance();
                    Token::Colon
                }
                b';' => {
                    self.advance();
                    Token::Semicolon
                }
                b'=' => {
                    self.advance();
                    if self.peek() == Some(b'>') {
                        self.advance();
                        Token::Arrow
                    } else {
                        Token::Equals
                    }
                }
                b'%' => {
                    self.advance();
                    if self.peek() == Some(b'%') {
                        self.advance();
                        Token::Separator
                    } else {
                        Token::Directive(self.read_while(Self::is_ident_char))
                    }
                }
                _ if Self::is_ident_start(ch) => Token::Ident(self.read_while(Self::is_ident_char)),
                _ if ch.is_ascii_digit()
                    || (ch == b'-' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) =>
                {
                    let negative = ch == b'-';
                    if negative {
                        self.advance();
                    }
                    let digits = self.read_while(|c| c.is_ascii_digit());
                    match digits.parse::<i64>() {
                        Ok(n) if negative => Token::Int(-n),
                        Ok(n) => Token::Int(n),
                        Err(_) => Token::Unknown(ch as char),
                    }
                }
                _ => {
                    self.advance();
                    Token::Unknown(ch as char)
                }
            };
            tokens.push(Spanned { token, location });
        }

        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_lexer_rule() {
        assert_eq!(
            kinds("reg: ADD(reg, CONST) = 2 => add;"),
            vec![
                Token::Ident("reg".into()),
                Token::Colon,
                Token::Ident("ADD".into()),
                Token::LParen,
                Token::Ident("reg".into()),
                Token::Comma,
                Token::Ident("CONST".into()),
                Token::RParen,
                Token::Equals,
                Token::Int(2),
                Token::Arrow,
                Token::Ident("add".into()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_lexer_directives() {
        assert_eq!(
            kinds("%term CONST ADD=7\n%start stmt\n%%"),
            vec![
                Token::Directive("term".into()),
                Token::Ident("CONST".into()),
                Token::Ident("ADD".into()),
                Token::Equals,
                Token::Int(7),
                Token::Directive("start".into()),
                Token::Ident("stmt".into()),
                Token::Separator,
            ]
        );
    }

    #[test]
    fn test_lexer_comments_are_skipped() {
        assert_eq!(
            kinds("# header\nreg // trailing\n: x"),
            vec![
                Token::Ident("reg".into()),
                Token::Colon,
                Token::Ident("x".into()),
            ]
        );
    }

    #[test]
    fn test_lexer_locations() {
        let tokens = Lexer::new("a:\n  B(c);").tokenize();
        assert_eq!(tokens[0].location, Location::new(1, 1));
        assert_eq!(tokens[1].location, Location::new(1, 2));
        assert_eq!(tokens[2].location, Location::new(2, 3));
        assert_eq!(tokens[4].location, Location::new(2, 5));
    }

    #[test]
    fn test_lexer_negative_and_payload() {
        assert_eq!(
            kinds("CONST[-12]"),
            vec![
                Token::Ident("CONST".into()),
                Token::LBracket,
                Token::Int(-12),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_lexer_unknown_char() {
        assert_eq!(kinds("@"), vec![Token::Unknown('@')]);
    }
}
