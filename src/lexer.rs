use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

/// Hand-written scanner. Whitespace and `//` line comments are consumed
/// between tokens, never inside identifier or literal lexemes.
pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.node == Lexeme::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn next_token(&mut self) -> Spanned<Lexeme> {
        loop {
            self.skip_whitespace_and_comments();

            if self.pos >= self.source.len() {
                return self.make_token(Lexeme::Eof, self.pos, self.pos);
            }

            let start = self.pos;
            let ch = self.source[self.pos];

            if is_ident_start(ch) {
                return self.scan_ident_or_keyword();
            }

            if ch.is_ascii_digit() {
                return self.scan_number();
            }

            if ch == b'"' {
                return self.scan_string();
            }

            if let Some(tok) = self.scan_symbol(start) {
                return tok;
            }
            // scan_symbol returned None: error was recorded, try again
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }

            // Line comment: `//` to end of line
            if self.pos + 1 < self.source.len()
                && self.source[self.pos] == b'/'
                && self.source[self.pos + 1] == b'/'
            {
                while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }

            break;
        }
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        // Identifiers admit apostrophes after the first character
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        let token = Lexeme::from_keyword(&text).unwrap_or(Lexeme::Ident(text));
        self.make_token(token, start, self.pos)
    }

    fn scan_number(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        if text.parse::<u64>().is_err() {
            self.diagnostics.push(
                Diagnostic::error(
                    ErrorKind::Parse,
                    format!("integer literal '{}' is too large", text),
                )
                .with_span(Span::new(start as u32, self.pos as u32))
                .with_help(format!("maximum integer value is {}", u64::MAX)),
            );
            return self.make_token(Lexeme::Integer("0".to_string()), start, self.pos);
        }
        self.make_token(Lexeme::Integer(text), start, self.pos)
    }

    /// Scan a quoted string. The token keeps the surrounding quotes; escape
    /// sequences are processed later, when the global constant is built.
    fn scan_string(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        self.pos += 1; // opening quote
        while self.pos < self.source.len() && self.source[self.pos] != b'"' {
            self.pos += 1;
        }
        if self.pos >= self.source.len() {
            self.diagnostics.push(
                Diagnostic::error(ErrorKind::Parse, "unterminated string literal")
                    .with_span(Span::new(start as u32, self.pos as u32))
                    .with_help("string literals must end with a closing '\"' on the same line or later"),
            );
            let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
            return self.make_token(Lexeme::Str(text), start, self.pos);
        }
        self.pos += 1; // closing quote
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        self.make_token(Lexeme::Str(text), start, self.pos)
    }

    fn scan_symbol(&mut self, start: usize) -> Option<Spanned<Lexeme>> {
        let ch = self.source[self.pos];
        self.pos += 1;

        let token = match ch {
            b'(' => Lexeme::LParen,
            b')' => Lexeme::RParen,
            b'{' => Lexeme::LBrace,
            b'}' => Lexeme::RBrace,
            b';' => Lexeme::Semicolon,
            b',' => Lexeme::Comma,
            b'+' => Lexeme::Plus,
            b'-' => Lexeme::Minus,
            b'*' => Lexeme::Star,
            // a lone '/' is division; '//' was already taken by the skipper
            b'/' => Lexeme::Slash,
            b'%' => Lexeme::Percent,
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.pos += 1;
                    Lexeme::Shr
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::Ge
                } else {
                    Lexeme::Gt
                }
            }
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.pos += 1;
                    Lexeme::Shl
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::Le
                } else {
                    Lexeme::Lt
                }
            }
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::EqEq
                } else {
                    Lexeme::Assign
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::Ne
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(ErrorKind::Parse, "unexpected '!'")
                            .with_span(Span::new(start as u32, self.pos as u32))
                            .with_help("'!' only appears in the '!=' comparison operator"),
                    );
                    return None;
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.pos += 1;
                    Lexeme::OrOr
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(ErrorKind::Parse, "unexpected '|'")
                            .with_span(Span::new(start as u32, self.pos as u32))
                            .with_help("'|' only appears in the '||' operator"),
                    );
                    return None;
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.pos += 1;
                    Lexeme::AndAnd
                } else {
                    Lexeme::Amp
                }
            }
            _ => {
                self.diagnostics.push(
                    Diagnostic::error(
                        ErrorKind::Parse,
                        format!("unexpected character '{}' (U+{:04X})", ch as char, ch),
                    )
                    .with_span(Span::new(start as u32, self.pos as u32))
                    .with_help("this character is not part of Marklar syntax"),
                );
                return None;
            }
        };

        Some(self.make_token(token, start, self.pos))
    }

    fn peek(&self) -> Option<u8> {
        if self.pos < self.source.len() {
            Some(self.source[self.pos])
        } else {
            None
        }
    }

    fn make_token(&self, token: Lexeme, start: usize, end: usize) -> Spanned<Lexeme> {
        Spanned::new(token, Span::new(start as u32, end as u32))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'\''
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Lexeme> {
        let (tokens, diags) = Lexer::new(source).tokenize();
        assert!(diags.is_empty(), "unexpected errors: {:?}", diags);
        tokens.into_iter().map(|t| t.node).collect()
    }

    fn lex_with_errors(source: &str) -> (Vec<Lexeme>, Vec<Diagnostic>) {
        let (tokens, diags) = Lexer::new(source).tokenize();
        let lexemes = tokens.into_iter().map(|t| t.node).collect();
        (lexemes, diags)
    }

    #[test]
    fn test_keywords() {
        let tokens = lex("return if else while type");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Return,
                Lexeme::If,
                Lexeme::Else,
                Lexeme::While,
                Lexeme::Type,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_punctuation() {
        let tokens = lex("( ) { } ; , =");
        assert_eq!(
            tokens,
            vec![
                Lexeme::LParen,
                Lexeme::RParen,
                Lexeme::LBrace,
                Lexeme::RBrace,
                Lexeme::Semicolon,
                Lexeme::Comma,
                Lexeme::Assign,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_longest_match() {
        let tokens = lex(">> << >= <= != == || && + - < > % / * &");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Shr,
                Lexeme::Shl,
                Lexeme::Ge,
                Lexeme::Le,
                Lexeme::Ne,
                Lexeme::EqEq,
                Lexeme::OrOr,
                Lexeme::AndAnd,
                Lexeme::Plus,
                Lexeme::Minus,
                Lexeme::Lt,
                Lexeme::Gt,
                Lexeme::Percent,
                Lexeme::Slash,
                Lexeme::Star,
                Lexeme::Amp,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_adjacent_operators() {
        // ">>" must win over "> >" even without whitespace around it
        let tokens = lex("a>>b==c");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Ident("a".into()),
                Lexeme::Shr,
                Lexeme::Ident("b".into()),
                Lexeme::EqEq,
                Lexeme::Ident("c".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers() {
        let tokens = lex("foo bar_baz x1 _underscore a'b");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Ident("foo".into()),
                Lexeme::Ident("bar_baz".into()),
                Lexeme::Ident("x1".into()),
                Lexeme::Ident("_underscore".into()),
                Lexeme::Ident("a'b".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_integers_keep_text() {
        let tokens = lex("0 5 42 007");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Integer("0".into()),
                Lexeme::Integer("5".into()),
                Lexeme::Integer("42".into()),
                Lexeme::Integer("007".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_string_keeps_quotes() {
        let tokens = lex("\"test\"");
        assert_eq!(
            tokens,
            vec![Lexeme::Str("\"test\"".into()), Lexeme::Eof]
        );
    }

    #[test]
    fn test_string_keeps_raw_escape() {
        // `\n` stays two characters until the global constant is built
        let tokens = lex(r#""a\nb""#);
        assert_eq!(
            tokens,
            vec![Lexeme::Str("\"a\\nb\"".into()), Lexeme::Eof]
        );
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = lex("foo // this is a comment\nbar");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Ident("foo".into()),
                Lexeme::Ident("bar".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_comment_at_eof() {
        let tokens = lex("foo // no trailing newline");
        assert_eq!(tokens, vec![Lexeme::Ident("foo".into()), Lexeme::Eof]);
    }

    #[test]
    fn test_simple_program() {
        let tokens = lex("i32 main() {\n  return 3;\n}");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Ident("i32".into()),
                Lexeme::Ident("main".into()),
                Lexeme::LParen,
                Lexeme::RParen,
                Lexeme::LBrace,
                Lexeme::Return,
                Lexeme::Integer("3".into()),
                Lexeme::Semicolon,
                Lexeme::RBrace,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_error_unexpected_character() {
        let (_tokens, diags) = lex_with_errors("@");
        assert!(!diags.is_empty(), "should produce an error for '@'");
        assert!(
            diags[0].message.contains("unexpected character '@'"),
            "error should name the character, got: {}",
            diags[0].message
        );
        assert!(diags[0].help.is_some());
    }

    #[test]
    fn test_error_stray_pipe() {
        let (_tokens, diags) = lex_with_errors("a | b");
        assert!(!diags.is_empty(), "should produce an error for '|'");
        assert!(diags[0].message.contains("unexpected '|'"));
    }

    #[test]
    fn test_error_stray_bang() {
        let (_tokens, diags) = lex_with_errors("a ! b");
        assert!(!diags.is_empty(), "should produce an error for '!'");
        assert!(diags[0].message.contains("unexpected '!'"));
    }

    #[test]
    fn test_error_unterminated_string() {
        let (_tokens, diags) = lex_with_errors("\"no closing quote");
        assert!(!diags.is_empty());
        assert!(diags[0].message.contains("unterminated string literal"));
    }

    #[test]
    fn test_error_integer_too_large() {
        let (tokens, diags) = lex_with_errors("99999999999999999999999");
        assert!(!diags.is_empty());
        assert!(diags[0].message.contains("too large"));
        assert_eq!(tokens[0], Lexeme::Integer("0".into()));
    }
}
