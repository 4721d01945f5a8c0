use crate::diagnostic::Diagnostic;
use crate::span::{Span, Spanned};
use crate::token::Token;

/// Hand-written tokenizer over a byte slice. `has_more` skips whitespace and
/// comments and reports whether a token remains; `advance` scans it. Calling
/// `advance` is only valid after a `has_more` that returned true.
pub struct Tokenizer<'src> {
    source: &'src [u8],
    pos: usize,
    /// 1-based source line, incremented on every newline seen.
    line: u32,
}

impl<'src> Tokenizer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    /// Current source line, for diagnostics.
    pub fn current_line(&self) -> u32 {
        self.line
    }

    /// Current byte offset into the source.
    pub fn offset(&self) -> u32 {
        self.pos as u32
    }

    /// Skip whitespace and comments, then report whether a token remains.
    /// An unterminated block comment consumes the rest of the input.
    pub fn has_more(&mut self) -> bool {
        while self.pos < self.source.len() {
            match self.source[self.pos] {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b'/' if self.peek_at(self.pos + 1) == Some(b'/') => {
                    self.pos += 2;
                    while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(self.pos + 1) == Some(b'*') => {
                    self.pos += 2;
                    loop {
                        if self.pos >= self.source.len() {
                            break;
                        }
                        if self.source[self.pos] == b'*'
                            && self.peek_at(self.pos + 1) == Some(b'/')
                        {
                            self.pos += 2;
                            break;
                        }
                        if self.source[self.pos] == b'\n' {
                            self.line += 1;
                        }
                        self.pos += 1;
                    }
                }
                _ => return true,
            }
        }
        false
    }

    /// Scan the next token. Only valid after `has_more` returned true.
    pub fn advance(&mut self) -> Result<Spanned<Token>, Diagnostic> {
        let start = self.pos;
        let ch = self.source[self.pos];

        if let Some(token) = symbol_token(ch) {
            self.pos += 1;
            return Ok(self.make_token(token, start));
        }

        if ch == b'"' {
            return self.scan_string();
        }

        if is_ident_start(ch) {
            return Ok(self.scan_ident_or_keyword());
        }

        if ch.is_ascii_digit() {
            return self.scan_number();
        }

        self.pos += 1;
        Err(Diagnostic::error(
            format!(
                "unexpected character '{}' (U+{:04X}) on line {}",
                ch as char, ch, self.line
            ),
            Span::new(start as u32, self.pos as u32),
        )
        .with_help("this character is not part of Jack syntax".to_string()))
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<Token> {
        let start = self.pos;
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        let token = Token::from_keyword(text).unwrap_or_else(|| Token::Ident(text.to_string()));
        self.make_token(token, start)
    }

    fn scan_number(&mut self) -> Result<Spanned<Token>, Diagnostic> {
        let start = self.pos;
        while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        match text.parse::<u32>() {
            Ok(n) if n <= 32767 => Ok(self.make_token(Token::IntConst(n as u16), start)),
            _ => Err(Diagnostic::error(
                format!(
                    "integer literal '{}' is out of range on line {}",
                    text, self.line
                ),
                Span::new(start as u32, self.pos as u32),
            )
            .with_help("integer constants must lie in 0..=32767".to_string())),
        }
    }

    /// Scan a string literal. The bytes between the quotes are opaque: comment
    /// markers inside a string are not special. There are no escape sequences;
    /// the first '"' ends the literal.
    fn scan_string(&mut self) -> Result<Spanned<Token>, Diagnostic> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let content_start = self.pos;
        loop {
            if self.pos >= self.source.len() {
                return Err(Diagnostic::error(
                    format!("unterminated string literal on line {}", self.line),
                    Span::new(start as u32, self.pos as u32),
                )
                .with_help("add a closing '\"' before the end of the file".to_string()));
            }
            match self.source[self.pos] {
                b'"' => break,
                b'\n' => {
                    return Err(Diagnostic::error(
                        format!("string literal spans a newline on line {}", self.line),
                        Span::new(start as u32, self.pos as u32),
                    )
                    .with_help(
                        "Jack strings cannot contain newlines; close the string before the line break"
                            .to_string(),
                    ));
                }
                0x20..=0x7e => self.pos += 1,
                other => {
                    return Err(Diagnostic::error(
                        format!(
                            "non-printable character (U+{:04X}) in string literal on line {}",
                            other, self.line
                        ),
                        Span::new(self.pos as u32, self.pos as u32 + 1),
                    ));
                }
            }
        }
        let text = std::str::from_utf8(&self.source[content_start..self.pos])
            .unwrap()
            .to_string();
        self.pos += 1; // closing quote
        Ok(self.make_token(Token::StrConst(text), start))
    }

    fn peek_at(&self, pos: usize) -> Option<u8> {
        if pos < self.source.len() {
            Some(self.source[pos])
        } else {
            None
        }
    }

    fn make_token(&self, token: Token, start: usize) -> Spanned<Token> {
        Spanned::new(token, Span::new(start as u32, self.pos as u32))
    }
}

fn symbol_token(ch: u8) -> Option<Token> {
    match ch {
        b'{' => Some(Token::LBrace),
        b'}' => Some(Token::RBrace),
        b'(' => Some(Token::LParen),
        b')' => Some(Token::RParen),
        b'[' => Some(Token::LBracket),
        b']' => Some(Token::RBracket),
        b'.' => Some(Token::Dot),
        b',' => Some(Token::Comma),
        b';' => Some(Token::Semicolon),
        b'+' => Some(Token::Plus),
        b'-' => Some(Token::Minus),
        b'*' => Some(Token::Star),
        b'/' => Some(Token::Slash),
        b'&' => Some(Token::Amp),
        b'|' => Some(Token::Pipe),
        b'<' => Some(Token::Lt),
        b'>' => Some(Token::Gt),
        b'=' => Some(Token::Eq),
        b'~' => Some(Token::Tilde),
        _ => None,
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        let mut tokenizer = Tokenizer::new(source);
        let mut tokens = Vec::new();
        while tokenizer.has_more() {
            tokens.push(tokenizer.advance().expect("unexpected lexical error").node);
        }
        tokens
    }

    fn lex_err(source: &str) -> Diagnostic {
        let mut tokenizer = Tokenizer::new(source);
        while tokenizer.has_more() {
            if let Err(diag) = tokenizer.advance() {
                return diag;
            }
        }
        panic!("expected a lexical error in {:?}", source);
    }

    #[test]
    fn test_keywords() {
        let tokens = lex("class constructor function method int char boolean void");
        assert_eq!(
            tokens,
            vec![
                Token::Class,
                Token::Constructor,
                Token::Function,
                Token::Method,
                Token::Int,
                Token::Char,
                Token::Boolean,
                Token::Void,
            ]
        );
    }

    #[test]
    fn test_statement_keywords() {
        let tokens = lex("var static field let do if else while return true false null this");
        assert_eq!(
            tokens,
            vec![
                Token::Var,
                Token::Static,
                Token::Field,
                Token::Let,
                Token::Do,
                Token::If,
                Token::Else,
                Token::While,
                Token::Return,
                Token::True,
                Token::False,
                Token::Null,
                Token::This,
            ]
        );
    }

    #[test]
    fn test_symbols() {
        let tokens = lex("{ } ( ) [ ] . , ; + - * / & | < > = ~");
        assert_eq!(
            tokens,
            vec![
                Token::LBrace,
                Token::RBrace,
                Token::LParen,
                Token::RParen,
                Token::LBracket,
                Token::RBracket,
                Token::Dot,
                Token::Comma,
                Token::Semicolon,
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::Amp,
                Token::Pipe,
                Token::Lt,
                Token::Gt,
                Token::Eq,
                Token::Tilde,
            ]
        );
    }

    #[test]
    fn test_identifiers_maximal_munch() {
        let tokens = lex("foo bar_baz x1 _tmp classy");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("foo".into()),
                Token::Ident("bar_baz".into()),
                Token::Ident("x1".into()),
                Token::Ident("_tmp".into()),
                Token::Ident("classy".into()),
            ]
        );
    }

    #[test]
    fn test_integers() {
        let tokens = lex("0 1 42 32767");
        assert_eq!(
            tokens,
            vec![
                Token::IntConst(0),
                Token::IntConst(1),
                Token::IntConst(42),
                Token::IntConst(32767),
            ]
        );
    }

    #[test]
    fn test_integer_out_of_range() {
        let diag = lex_err("32768");
        assert!(
            diag.message.contains("out of range"),
            "got: {}",
            diag.message
        );
        assert!(diag.help.is_some());
    }

    #[test]
    fn test_string_constant() {
        let tokens = lex("\"hello world\"");
        assert_eq!(tokens, vec![Token::StrConst("hello world".into())]);
    }

    #[test]
    fn test_empty_string() {
        let tokens = lex("\"\"");
        assert_eq!(tokens, vec![Token::StrConst("".into())]);
    }

    #[test]
    fn test_comment_markers_inside_string_are_opaque() {
        let tokens = lex("\"a // b /* c */ d\"");
        assert_eq!(tokens, vec![Token::StrConst("a // b /* c */ d".into())]);
    }

    #[test]
    fn test_unterminated_string() {
        let diag = lex_err("\"abc");
        assert!(
            diag.message.contains("unterminated string"),
            "got: {}",
            diag.message
        );
    }

    #[test]
    fn test_string_with_newline() {
        let diag = lex_err("\"abc\ndef\"");
        assert!(
            diag.message.contains("spans a newline"),
            "got: {}",
            diag.message
        );
    }

    #[test]
    fn test_line_comment() {
        let tokens = lex("let // the rest is ignored\nx");
        assert_eq!(tokens, vec![Token::Let, Token::Ident("x".into())]);
    }

    #[test]
    fn test_block_comment() {
        let tokens = lex("let /* ignored\nstill ignored */ x");
        assert_eq!(tokens, vec![Token::Let, Token::Ident("x".into())]);
    }

    #[test]
    fn test_slash_is_division_operator() {
        let tokens = lex("a / b");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Slash,
                Token::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn test_line_counting() {
        let mut tokenizer = Tokenizer::new("a\nb\n/* c\nd */\ne");
        let mut lines = Vec::new();
        while tokenizer.has_more() {
            tokenizer.advance().unwrap();
            lines.push(tokenizer.current_line());
        }
        assert_eq!(lines, vec![1, 2, 5]);
    }

    #[test]
    fn test_unterminated_block_comment_consumes_input() {
        let tokens = lex("a /* never closed");
        assert_eq!(tokens, vec![Token::Ident("a".into())]);
    }

    #[test]
    fn test_unexpected_character() {
        let diag = lex_err("let $x;");
        assert!(
            diag.message.contains("unexpected character '$'"),
            "got: {}",
            diag.message
        );
        assert!(diag.help.is_some());
    }

    fn surface(token: &Token) -> String {
        match token {
            Token::IntConst(n) => n.to_string(),
            Token::StrConst(s) => format!("\"{}\"", s),
            Token::Ident(s) => s.clone(),
            Token::Eof => String::new(),
            other => other.description().trim_matches('\'').to_string(),
        }
    }

    #[test]
    fn test_round_trip_through_lexemes() {
        let source = "class Main { function void main() { \
                      do Output.printString(\"ok // not a comment\"); \
                      let a[i] = 3 / 2; return; } }";
        let tokens = lex(source);
        let rejoined = tokens.iter().map(surface).collect::<Vec<_>>().join(" ");
        assert_eq!(lex(&rejoined), tokens);
    }

    #[test]
    fn test_no_space_between_tokens() {
        let tokens = lex("x[i]=y.f(3);");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("x".into()),
                Token::LBracket,
                Token::Ident("i".into()),
                Token::RBracket,
                Token::Eq,
                Token::Ident("y".into()),
                Token::Dot,
                Token::Ident("f".into()),
                Token::LParen,
                Token::IntConst(3),
                Token::RParen,
                Token::Semicolon,
            ]
        );
    }
}
