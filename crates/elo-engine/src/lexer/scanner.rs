//! The scanner that produces tokens from source text.

use super::{Span, Token, TokenKind};
use crate::runtime::value::parse_number;
use unicode_xid::UnicodeXID;

/// A scanner that tokenizes elo source code.
///
/// Newlines are not tokens. A newline that follows a token which can end
/// a statement (see [`TokenKind::ends_statement`]) becomes a `Semicolon`,
/// unless the scanner is inside parentheses or brackets.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: u32,
    insert_semicolon: bool,
    nesting: Vec<char>,
    pending_error: Option<String>,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            insert_semicolon: false,
            nesting: Vec::new(),
            pending_error: None,
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        let newline_line = self.line;
        let crossed_newline = self.skip_whitespace_and_comments();
        if let Some(message) = self.pending_error.take() {
            let pos = self.current_pos;
            return Token::new(TokenKind::Invalid(message), Span::new(pos, pos), self.line);
        }
        if crossed_newline && self.insert_semicolon {
            self.insert_semicolon = false;
            let pos = self.current_pos;
            return Token::new(TokenKind::Semicolon, Span::new(pos, pos), newline_line);
        }

        let start = self.current_pos;
        let line = self.line;

        let Some((_pos, ch)) = self.advance() else {
            if std::mem::take(&mut self.insert_semicolon) {
                return Token::new(TokenKind::Semicolon, Span::new(start, start), line);
            }
            return Token::new(TokenKind::Eof, Span::new(start, start), line);
        };

        let kind = match ch {
            // Single-character tokens
            '{' | '(' | '[' => {
                self.nesting.push(ch);
                match ch {
                    '{' => TokenKind::LeftBrace,
                    '(' => TokenKind::LeftParen,
                    _ => TokenKind::LeftBracket,
                }
            }
            '}' | ')' | ']' => {
                self.nesting.pop();
                match ch {
                    '}' => TokenKind::RightBrace,
                    ')' => TokenKind::RightParen,
                    _ => TokenKind::RightBracket,
                }
            }
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '?' => TokenKind::Question,
            '~' => TokenKind::Tilde,

            // Multi-character tokens
            '.' => self.scan_dot(start),
            ':' => self.either('=', TokenKind::ColonEqual, TokenKind::Colon),
            '+' => self.scan_doubled('+', TokenKind::PlusPlus, TokenKind::PlusEqual, TokenKind::Plus),
            '-' => self.scan_doubled('-', TokenKind::MinusMinus, TokenKind::MinusEqual, TokenKind::Minus),
            '*' => self.scan_doubled('*', TokenKind::StarStar, TokenKind::StarEqual, TokenKind::Star),
            '&' => self.scan_doubled(
                '&',
                TokenKind::AmpersandAmpersand,
                TokenKind::AmpersandEqual,
                TokenKind::Ampersand,
            ),
            '|' => self.scan_doubled('|', TokenKind::PipePipe, TokenKind::PipeEqual, TokenKind::Pipe),
            '<' => self.scan_doubled('<', TokenKind::LessLess, TokenKind::LessEqual, TokenKind::Less),
            '>' => self.scan_doubled(
                '>',
                TokenKind::GreaterGreater,
                TokenKind::GreaterEqual,
                TokenKind::Greater,
            ),
            '/' => self.either('=', TokenKind::SlashEqual, TokenKind::Slash),
            '%' => self.either('=', TokenKind::PercentEqual, TokenKind::Percent),
            '^' => self.either('=', TokenKind::CaretEqual, TokenKind::Caret),
            '!' => self.either('=', TokenKind::BangEqual, TokenKind::Bang),
            '=' => match self.peek() {
                Some('=') => {
                    self.advance();
                    TokenKind::EqualEqual
                }
                Some('>') => {
                    self.advance();
                    TokenKind::Arrow
                }
                _ => TokenKind::Equal,
            },

            // String literals
            '"' | '\'' => self.scan_string(ch),

            // Numbers
            '0'..='9' => self.scan_number(start),

            // Identifiers and keywords
            _ if is_id_start(ch) => self.scan_identifier(start),

            _ => TokenKind::Invalid(format!("illegal character {:?}", ch)),
        };

        self.insert_semicolon = kind.ends_statement();
        Token::new(kind, Span::new(start, self.current_pos), line)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = pos + ch.len_utf8();
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, ch)| ch)
    }

    fn newline_significant(&self) -> bool {
        !matches!(self.nesting.last(), Some('(' | '['))
    }

    /// Skips blanks and comments. Returns true if a significant newline
    /// was crossed.
    fn skip_whitespace_and_comments(&mut self) -> bool {
        let mut crossed_newline = false;
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') => {
                    if self.insert_semicolon && self.newline_significant() {
                        self.advance();
                        self.line += 1;
                        return true;
                    }
                    self.advance();
                    self.line += 1;
                }
                Some('/') => match self.peek_next() {
                    Some('/') => {
                        while let Some(ch) = self.peek() {
                            if ch == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('*') => {
                        self.advance();
                        self.advance();
                        let mut prev = ' ';
                        let mut closed = false;
                        while let Some((_, ch)) = self.advance() {
                            if ch == '\n' {
                                self.line += 1;
                                crossed_newline = true;
                            }
                            if prev == '*' && ch == '/' {
                                closed = true;
                                break;
                            }
                            prev = ch;
                        }
                        if !closed {
                            self.pending_error = Some("comment not terminated".to_string());
                            return false;
                        }
                        if crossed_newline && self.insert_semicolon && self.newline_significant() {
                            return true;
                        }
                    }
                    _ => break,
                },
                _ => break,
            }
        }
        false
    }

    fn either(&mut self, next: char, matched: TokenKind, otherwise: TokenKind) -> TokenKind {
        if self.peek() == Some(next) {
            self.advance();
            matched
        } else {
            otherwise
        }
    }

    /// Scans `cc`, `c=` or `c` after the first `c`.
    fn scan_doubled(
        &mut self,
        ch: char,
        doubled: TokenKind,
        assign: TokenKind,
        single: TokenKind,
    ) -> TokenKind {
        match self.peek() {
            Some(c) if c == ch => {
                self.advance();
                doubled
            }
            Some('=') => {
                self.advance();
                assign
            }
            _ => single,
        }
    }

    fn scan_dot(&mut self, start: usize) -> TokenKind {
        match self.peek() {
            Some('.') => {
                self.advance();
                if self.peek() == Some('.') {
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Invalid("unexpected '..'".to_string())
                }
            }
            Some('0'..='9') => {
                self.scan_digits();
                self.scan_exponent();
                self.number_from(start)
            }
            _ => TokenKind::Dot,
        }
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();

        loop {
            match self.advance() {
                None | Some((_, '\n')) => {
                    return TokenKind::Invalid("string literal not terminated".to_string());
                }
                Some((_, ch)) if ch == quote => break,
                Some((_, '\\')) => match self.scan_escape(quote) {
                    Ok(ch) => value.push(ch),
                    Err(message) => return TokenKind::Invalid(message),
                },
                Some((_, ch)) => value.push(ch),
            }
        }

        TokenKind::String(value)
    }

    fn scan_escape(&mut self, quote: char) -> Result<char, String> {
        let Some((_, escaped)) = self.advance() else {
            return Err("escape sequence not terminated".to_string());
        };
        let (digits, radix) = match escaped {
            'a' => return Ok('\u{07}'),
            'b' => return Ok('\u{08}'),
            'f' => return Ok('\u{0c}'),
            'n' => return Ok('\n'),
            'r' => return Ok('\r'),
            't' => return Ok('\t'),
            'v' => return Ok('\u{0b}'),
            '\\' => return Ok('\\'),
            c if c == quote => return Ok(c),
            'x' => (2, 16),
            'u' => (4, 16),
            'U' => (8, 16),
            '0'..='7' => (3, 8),
            _ => return Err("unknown escape sequence".to_string()),
        };

        let mut code: u32 = 0;
        let mut remaining = digits;
        if radix == 8 {
            code = escaped.to_digit(8).unwrap_or(0);
            remaining -= 1;
        }
        for _ in 0..remaining {
            let digit = self
                .peek()
                .and_then(|c| c.to_digit(radix))
                .ok_or_else(|| "illegal character in escape sequence".to_string())?;
            self.advance();
            code = code * radix + digit;
        }
        if radix == 8 && code > 255 {
            return Err("octal escape value out of range".to_string());
        }
        char::from_u32(code).ok_or_else(|| "escape sequence is invalid Unicode code point".to_string())
    }

    fn scan_number(&mut self, start: usize) -> TokenKind {
        if self.source[start..].starts_with('0') && matches!(self.peek(), Some('x' | 'X')) {
            self.advance();
            let mut any = false;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.advance();
                any = true;
            }
            if !any {
                return TokenKind::Invalid("illegal hexadecimal number".to_string());
            }
            return self.number_from(start);
        }

        self.scan_digits();
        if self.peek() == Some('.') && self.peek_next() != Some('.') {
            self.advance();
            self.scan_digits();
        }
        self.scan_exponent();
        self.number_from(start)
    }

    fn scan_digits(&mut self) {
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }
    }

    fn scan_exponent(&mut self) {
        if matches!(self.peek(), Some('e' | 'E')) {
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            self.scan_digits();
        }
    }

    fn number_from(&self, start: usize) -> TokenKind {
        let text = &self.source[start..self.current_pos];
        match parse_number(text) {
            Some(n) => TokenKind::Number(n),
            None => TokenKind::Invalid(format!("malformed number '{}'", text)),
        }
    }

    fn scan_identifier(&mut self, start: usize) -> TokenKind {
        while matches!(self.peek(), Some(c) if is_id_continue(c)) {
            self.advance();
        }
        let name = &self.source[start..self.current_pos];
        TokenKind::keyword(name).unwrap_or_else(|| TokenKind::Identifier(name.to_string()))
    }
}

fn is_id_start(ch: char) -> bool {
    ch == '_' || UnicodeXID::is_xid_start(ch)
}

fn is_id_continue(ch: char) -> bool {
    UnicodeXID::is_xid_continue(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let token = scanner.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            out.push(token.kind);
        }
        out
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a := b ** 2 << 1 && c != d"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::ColonEqual,
                TokenKind::Identifier("b".into()),
                TokenKind::StarStar,
                TokenKind::Number(2.0),
                TokenKind::LessLess,
                TokenKind::Number(1.0),
                TokenKind::AmpersandAmpersand,
                TokenKind::Identifier("c".into()),
                TokenKind::BangEqual,
                TokenKind::Identifier("d".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_keywords_and_reserved() {
        let tokens = kinds("func for in not try panic");
        assert_eq!(tokens[0], TokenKind::Func);
        assert_eq!(tokens[1], TokenKind::For);
        assert_eq!(tokens[2], TokenKind::In);
        assert_eq!(tokens[3], TokenKind::Not);
        assert!(tokens[4].is_reserved());
        assert!(tokens[5].is_reserved());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.5 .5 1e3 0xff"),
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(3.5),
                TokenKind::Number(0.5),
                TokenKind::Number(1000.0),
                TokenKind::Number(255.0),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\tb\x41é\101" 'it\'s'"#),
            vec![
                TokenKind::String("a\tbA\u{e9}A".into()),
                TokenKind::String("it's".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(kinds("\"abc")[0], TokenKind::Invalid(_)));
    }

    #[test]
    fn test_newline_inserts_semicolon() {
        assert_eq!(
            kinds("x := 1\ny++\n"),
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::ColonEqual,
                TokenKind::Number(1.0),
                TokenKind::Semicolon,
                TokenKind::Identifier("y".into()),
                TokenKind::PlusPlus,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_no_semicolon_inside_parens() {
        assert_eq!(
            kinds("f(a,\n b\n)"),
            vec![
                TokenKind::Identifier("f".into()),
                TokenKind::LeftParen,
                TokenKind::Identifier("a".into()),
                TokenKind::Comma,
                TokenKind::Identifier("b".into()),
                TokenKind::RightParen,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_no_semicolon_after_operator() {
        assert_eq!(
            kinds("a +\n b"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Plus,
                TokenKind::Identifier("b".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_comments_and_lines() {
        let mut scanner = Scanner::new("// note\nx /* a\nb */ y");
        let x = scanner.next_token();
        assert_eq!(x.kind, TokenKind::Identifier("x".into()));
        assert_eq!(x.line, 2);
        assert_eq!(scanner.next_token().kind, TokenKind::Semicolon);
        let y = scanner.next_token();
        assert_eq!(y.kind, TokenKind::Identifier("y".into()));
        assert_eq!(y.line, 3);
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(
            kinds("x /* never closed"),
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::Invalid("comment not terminated".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_unicode_identifier() {
        assert_eq!(kinds("größe")[0], TokenKind::Identifier("größe".into()));
    }
}
