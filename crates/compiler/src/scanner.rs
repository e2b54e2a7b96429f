//! Converts source text into a stream of tokens, one `scan_token` call at a
//! time. Per spec.md §4.1: no block comments, line comments run `//` to
//! end-of-line, an unterminated string or an unrecognized character
//! produces a `TokenKind::Error` token rather than a scanner panic.

use crate::token::{keyword_kind, NumberBase, Token, TokenKind};

pub struct Scanner<'src> {
    source: &'src str,
    start: usize,
    current: usize,
    line: u32,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Scanner {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    /// Produce the next token. Past the end of input this returns
    /// `TokenKind::Eof` forever, per spec.md §4.1.
    pub fn scan_token(&mut self) -> Token<'src> {
        self.skip_whitespace_and_comments();
        self.start = self.current;

        if self.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.advance();

        if is_alpha(c) {
            return self.identifier();
        }
        if c.is_ascii_digit() {
            return self.number();
        }

        match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            '.' => self.make_token(TokenKind::Dot),
            ',' => self.make_token(TokenKind::Comma),
            ':' => self.make_token(TokenKind::Colon),
            ';' => self.make_token(TokenKind::Semicolon),
            '+' => self.make_token(TokenKind::Plus),
            '-' => self.make_token(TokenKind::Minus),
            '*' => self.make_token(TokenKind::Star),
            '/' => self.make_token(TokenKind::Slash),
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::BangEqual)
                } else {
                    self.make_token(TokenKind::Bang)
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.make_token(TokenKind::Equal)
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }
            '"' => self.string(),
            _ => self.error_token("Unexpected character."),
        }
    }

    fn identifier(&mut self) -> Token<'src> {
        while is_alpha(self.peek()) || self.peek().is_ascii_digit() {
            self.advance();
        }
        let lexeme = &self.source[self.start..self.current];
        let kind = keyword_kind(lexeme).unwrap_or(TokenKind::Identifier);
        self.make_token(kind)
    }

    fn number(&mut self) -> Token<'src> {
        let prev = if self.start > 0 {
            self.source.as_bytes()[self.start]
        } else {
            0
        };
        let base = if prev == b'0' {
            match self.peek() {
                'b' => {
                    self.advance();
                    Some(NumberBase::Binary)
                }
                'o' => {
                    self.advance();
                    Some(NumberBase::Octal)
                }
                'x' => {
                    self.advance();
                    Some(NumberBase::Hex)
                }
                _ => None,
            }
        } else {
            None
        };

        let base = base.unwrap_or(NumberBase::Decimal);
        let digit_ok: fn(char) -> bool = match base {
            NumberBase::Binary => |c| c == '0' || c == '1',
            NumberBase::Octal => |c| ('0'..='7').contains(&c),
            NumberBase::Hex => |c| c.is_ascii_hexdigit(),
            NumberBase::Decimal => |c| c.is_ascii_digit(),
        };
        while digit_ok(self.peek()) {
            self.advance();
        }

        let mut token = self.make_token(TokenKind::Number);
        token.number_base = base;
        token
    }

    fn string(&mut self) -> Token<'src> {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                break;
            }
            self.advance();
        }
        if self.is_at_end() || self.peek() != '"' {
            return self.error_token("Unterminated string.");
        }
        self.advance(); // closing quote
        // Lexeme includes both quote characters; the compiler strips them.
        self.make_token(TokenKind::String)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '\n' => {
                    self.line += 1;
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current..].chars().next().unwrap();
        self.current += c.len_utf8();
        c
    }

    fn peek(&self) -> char {
        self.source[self.current..].chars().next().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        let mut chars = self.source[self.current..].chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() != expected {
            return false;
        }
        self.advance();
        true
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token::new(kind, &self.source[self.start..self.current], self.line)
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        Token::new(TokenKind::Error, message, self.line)
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        loop {
            let token = scanner.scan_token();
            let done = token.kind == TokenKind::Eof;
            out.push(token.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scans_operators_longest_match_first() {
        assert_eq!(
            kinds("== = != ! <= < >= >"),
            vec![
                TokenKind::EqualEqual,
                TokenKind::Equal,
                TokenKind::BangEqual,
                TokenKind::Bang,
                TokenKind::LessEqual,
                TokenKind::Less,
                TokenKind::GreaterEqual,
                TokenKind::Greater,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert_eq!(
            kinds("let mut print while"),
            vec![
                TokenKind::Let,
                TokenKind::Mut,
                TokenKind::Print,
                TokenKind::While,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_comment_runs_to_eol() {
        let mut scanner = Scanner::new("1 // two\n3");
        let a = scanner.scan_token();
        let b = scanner.scan_token();
        assert_eq!(a.lexeme, "1");
        assert_eq!(b.lexeme, "3");
        assert_eq!(b.line, 2);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let mut scanner = Scanner::new("\"abc");
        let t = scanner.scan_token();
        assert_eq!(t.kind, TokenKind::Error);
    }

    #[test]
    fn eof_repeats() {
        let mut scanner = Scanner::new("");
        assert_eq!(scanner.scan_token().kind, TokenKind::Eof);
        assert_eq!(scanner.scan_token().kind, TokenKind::Eof);
    }

    #[test]
    fn integer_bases_are_tagged() {
        let mut scanner = Scanner::new("0b101 0o17 0xFF 42");
        let a = scanner.scan_token();
        let b = scanner.scan_token();
        let c = scanner.scan_token();
        let d = scanner.scan_token();
        assert_eq!(a.number_base, NumberBase::Binary);
        assert_eq!(b.number_base, NumberBase::Octal);
        assert_eq!(c.number_base, NumberBase::Hex);
        assert_eq!(d.number_base, NumberBase::Decimal);
    }
}
