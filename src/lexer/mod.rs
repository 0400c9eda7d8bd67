//! Lexical analysis for TML source files.
//!
//! The lexer is a hand-driven scanner over a single file's bytes. It
//! produces a finite token sequence terminated by [`TokenKind::Eof`] and
//! records every malformed construct as a diagnostic in the session. It is
//! restartable on error: one code point is skipped, an
//! [`TokenKind::Error`] token is emitted, and scanning continues, so the
//! parser always sees a complete stream.
//!
//! String interpolation is handled here: `"a ${x} b"` lexes as
//! `StringPart("a ") InterpStart … InterpEnd StringPart(" b")`, with the
//! tokens of the hole expression lexed in between. A stack of brace depths
//! tracks nested interpolations so `${ when x { _ -> 1 } }` closes at the
//! right brace.

mod token;

pub use token::*;

use crate::diagnostics::Diagnostic;
use crate::session::Session;
use crate::source::{FileId, Span};

pub struct Lexer<'a> {
    session: &'a Session,
    file: FileId,
    src: &'a str,
    position: usize,
    tokens: Vec<Token>,
    /// One entry per string interpolation we are inside; the value is the
    /// depth of plain `{`/`}` pairs opened inside the hole.
    interp: Vec<u32>,
}

impl<'a> Lexer<'a> {
    pub fn new(session: &'a Session, file: FileId) -> Self {
        let src = &session.source_map.file(file).src;
        Lexer {
            session,
            file,
            src,
            position: 0,
            tokens: vec![],
            interp: vec![],
        }
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(self.file, start as u32, self.position as u32)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.position..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.position..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn rest(&self) -> &str {
        &self.src[self.position..]
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let span = self.span_from(start);
        self.tokens.push(Token::new(kind, span));
    }

    fn push_value(&mut self, kind: TokenKind, start: usize, value: TokenValue) {
        let span = self.span_from(start);
        self.tokens.push(Token::with_value(kind, span, value));
    }

    fn error(&mut self, code: &str, message: impl Into<String>, start: usize) {
        let span = self.span_from(start);
        self.session.emit(Diagnostic::error(code, message, span));
        self.tokens.push(Token::new(TokenKind::Error, span));
    }

    /// Lex the whole file. Always returns a stream ending in `Eof`.
    pub fn lex(mut self) -> Vec<Token> {
        loop {
            self.eat_trivia();
            let start = self.position;
            let Some(c) = self.peek() else {
                self.push(TokenKind::Eof, start);
                break;
            };

            match c {
                c if c.is_ascii_alphabetic() || c == '_' => self.lex_ident_or_keyword(),
                c if c.is_ascii_digit() => self.lex_number(),
                '"' => {
                    self.bump();
                    self.lex_string_body(start, false);
                }
                'r' if self.peek_second() == Some('"') => self.lex_raw_string(),
                '\'' => self.lex_char(),
                '}' if !self.interp.is_empty() => {
                    let depth = self.interp.last_mut().expect("checked non-empty");
                    if *depth == 0 {
                        self.interp.pop();
                        self.bump();
                        self.push(TokenKind::InterpEnd, start);
                        // Resume the enclosing string right after the hole.
                        let resume = self.position;
                        self.lex_string_body(resume, true);
                    } else {
                        *depth -= 1;
                        self.bump();
                        self.push(TokenKind::RBrace, start);
                    }
                }
                _ => self.lex_symbol(),
            }
        }
        self.tokens
    }

    fn eat_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    if self.rest().starts_with("// @ai:") || self.rest().starts_with("//@ai:") {
                        self.lex_ai_directive();
                    } else {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    let start = self.position;
                    self.bump();
                    self.bump();
                    let mut depth = 1u32;
                    loop {
                        if self.rest().starts_with("/*") {
                            self.bump();
                            self.bump();
                            depth += 1;
                        } else if self.rest().starts_with("*/") {
                            self.bump();
                            self.bump();
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        } else if self.bump().is_none() {
                            let span = self.span_from(start);
                            self.session.emit(Diagnostic::error(
                                "E0005",
                                "unterminated block comment",
                                span,
                            ));
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// `// @ai: directive-name "payload"` — captured as a token so the
    /// parser can attach it to the next declaration.
    fn lex_ai_directive(&mut self) {
        let start = self.position;
        // Consume up to and including `@ai:`.
        while self.peek() != Some(':') {
            self.bump();
        }
        self.bump();
        while self.peek() == Some(' ') {
            self.bump();
        }

        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }

        while self.peek() == Some(' ') {
            self.bump();
        }

        let mut payload = String::new();
        if self.eat('"') {
            loop {
                match self.bump() {
                    Some('"') | None => break,
                    Some('\\') => {
                        if let Some(escaped) = self.bump() {
                            payload.push(escaped);
                        }
                    }
                    Some('\n') => break,
                    Some(c) => payload.push(c),
                }
            }
        }

        // Drop the remainder of the comment line.
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }

        self.push_value(
            TokenKind::AiDirective,
            start,
            TokenValue::Directive { name, payload },
        );
    }

    fn lex_ident_or_keyword(&mut self) {
        let start = self.position;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.position];
        match KEYWORDS.get(text) {
            Some(kind) => self.push(*kind, start),
            None => self.push_value(TokenKind::Ident, start, TokenValue::Ident(text.to_string())),
        }
    }

    fn lex_number(&mut self) {
        let start = self.position;
        let base = if self.rest().starts_with("0x") || self.rest().starts_with("0X") {
            self.bump();
            self.bump();
            Base::Hexadecimal
        } else if self.rest().starts_with("0o") || self.rest().starts_with("0O") {
            self.bump();
            self.bump();
            Base::Octal
        } else if self.rest().starts_with("0b") || self.rest().starts_with("0B") {
            self.bump();
            self.bump();
            Base::Binary
        } else {
            Base::Decimal
        };

        let digits_start = self.position;
        self.eat_digits(base);
        let mut is_float = false;
        let mut float_end = self.position;

        if base == Base::Decimal
            && self.peek() == Some('.')
            && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.bump();
            self.eat_digits(Base::Decimal);
            if matches!(self.peek(), Some('e' | 'E'))
                && matches!(self.peek_second(), Some(c) if c.is_ascii_digit() || c == '+' || c == '-')
            {
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.eat_digits(Base::Decimal);
            }
            float_end = self.position;
        }

        let digits: String = self.src[digits_start..float_end]
            .chars()
            .filter(|c| *c != '_')
            .collect();

        // Whatever alphanumeric tail remains is a suffix candidate.
        let suffix_start = self.position;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let suffix_text = &self.src[suffix_start..self.position];

        let suffix = if suffix_text.is_empty() {
            None
        } else if suffix_text.starts_with(|c: char| c.is_ascii_digit()) {
            self.error(
                "E0004",
                format!(
                    "invalid digit `{}` for base-{} literal",
                    &suffix_text[..1],
                    base.radix()
                ),
                start,
            );
            return;
        } else {
            match NumSuffix::parse(suffix_text) {
                Some(suffix) => Some(suffix),
                None => {
                    self.error(
                        "E0007",
                        format!("unknown numeric suffix `{suffix_text}`"),
                        start,
                    );
                    return;
                }
            }
        };

        if digits.is_empty() {
            self.error("E0004", "numeric literal has no digits", start);
            return;
        }

        if is_float || suffix.is_some_and(|s| s.is_float()) {
            if base != Base::Decimal {
                self.error("E0004", "float literals must be written in decimal", start);
                return;
            }
            let value: f64 = match digits.parse() {
                Ok(value) => value,
                Err(_) => {
                    self.error("E0004", "malformed float literal", start);
                    return;
                }
            };
            self.push_value(TokenKind::FloatLit, start, TokenValue::Float { value, suffix });
        } else {
            let value = match u128::from_str_radix(&digits, base.radix()) {
                Ok(value) => value,
                Err(_) => {
                    self.error("E0006", "integer literal is too large", start);
                    return;
                }
            };
            self.push_value(
                TokenKind::IntLit,
                start,
                TokenValue::Int {
                    value,
                    base,
                    suffix,
                },
            );
        }
    }

    fn eat_digits(&mut self, base: Base) {
        while let Some(c) = self.peek() {
            if c == '_' || c.is_digit(base.radix()) {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Scan a (possibly interpolated) string body. The opening quote has
    /// already been consumed; `continuing` is true when we are resuming
    /// after an `InterpEnd`, in which case every chunk (including the
    /// final one) is emitted as `StringPart`.
    fn lex_string_body(&mut self, start: usize, continuing: bool) {
        let mut decoded = String::new();
        let chunk_start = start;

        loop {
            match self.peek() {
                None => {
                    self.error("E0002", "unterminated string literal", chunk_start);
                    return;
                }
                Some('"') => {
                    self.bump();
                    let kind = if continuing {
                        TokenKind::StringPart
                    } else {
                        TokenKind::StrLit
                    };
                    self.push_value(kind, chunk_start, TokenValue::Str(decoded));
                    return;
                }
                Some('$') if self.peek_second() == Some('{') => {
                    let part_end = self.position;
                    self.bump();
                    self.bump();
                    let span = Span::new(self.file, chunk_start as u32, part_end as u32);
                    self.tokens.push(Token::with_value(
                        TokenKind::StringPart,
                        span,
                        TokenValue::Str(std::mem::take(&mut decoded)),
                    ));
                    self.tokens.push(Token::new(
                        TokenKind::InterpStart,
                        Span::new(self.file, part_end as u32, self.position as u32),
                    ));
                    self.interp.push(0);
                    // The hole's tokens are produced by the main loop; the
                    // matching `}` re-enters string scanning.
                    return;
                }
                Some('\\') => {
                    let escape_start = self.position;
                    self.bump();
                    match self.decode_escape(escape_start) {
                        Some(c) => decoded.push(c),
                        None => { /* diagnostic already recorded */ }
                    }
                }
                Some(c) => {
                    decoded.push(c);
                    self.bump();
                }
            }
        }
    }

    fn lex_raw_string(&mut self) {
        let start = self.position;
        self.bump(); // r
        self.bump(); // "
        let mut decoded = String::new();
        loop {
            match self.bump() {
                None => {
                    self.error("E0002", "unterminated raw string literal", start);
                    return;
                }
                Some('"') => break,
                Some(c) => decoded.push(c),
            }
        }
        self.push_value(TokenKind::StrLit, start, TokenValue::Str(decoded));
    }

    fn lex_char(&mut self) {
        let start = self.position;
        self.bump(); // '
        let value = match self.peek() {
            None | Some('\n') => {
                self.error("E0006", "unterminated character literal", start);
                return;
            }
            Some('\'') => {
                self.bump();
                self.error("E0006", "empty character literal", start);
                return;
            }
            Some('\\') => {
                let escape_start = self.position;
                self.bump();
                match self.decode_escape(escape_start) {
                    Some(c) => c,
                    None => return,
                }
            }
            Some(c) => {
                self.bump();
                c
            }
        };
        if !self.eat('\'') {
            self.error(
                "E0006",
                "character literal must contain exactly one character",
                start,
            );
            return;
        }
        self.push_value(TokenKind::CharLit, start, TokenValue::Char(value));
    }

    /// Decode one escape sequence; the backslash is already consumed.
    fn decode_escape(&mut self, escape_start: usize) -> Option<char> {
        let c = match self.bump() {
            Some(c) => c,
            None => {
                self.error("E0002", "unterminated string literal", escape_start);
                return None;
            }
        };
        match c {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '\\' => Some('\\'),
            '"' => Some('"'),
            '\'' => Some('\''),
            '0' => Some('\0'),
            '$' => Some('$'),
            'x' => {
                let mut value = 0u32;
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(16)) {
                        Some(digit) => {
                            value = value * 16 + digit;
                            self.bump();
                        }
                        None => {
                            self.error(
                                "E0003",
                                "`\\x` escape needs two hex digits",
                                escape_start,
                            );
                            return None;
                        }
                    }
                }
                char::from_u32(value)
            }
            'u' => {
                if !self.eat('{') {
                    self.error("E0003", "`\\u` escape needs braces: `\\u{…}`", escape_start);
                    return None;
                }
                let mut value = 0u32;
                let mut digits = 0;
                while let Some(digit) = self.peek().and_then(|c| c.to_digit(16)) {
                    value = value * 16 + digit;
                    digits += 1;
                    self.bump();
                    if digits > 6 {
                        break;
                    }
                }
                if !self.eat('}') || digits == 0 || digits > 6 {
                    self.error(
                        "E0003",
                        "`\\u` escape needs one to six hex digits in braces",
                        escape_start,
                    );
                    return None;
                }
                match char::from_u32(value) {
                    Some(c) => Some(c),
                    None => {
                        self.error(
                            "E0003",
                            format!("`\\u{{{value:x}}}` is not a valid code point"),
                            escape_start,
                        );
                        None
                    }
                }
            }
            other => {
                self.error("E0003", format!("unknown escape `\\{other}`"), escape_start);
                None
            }
        }
    }

    fn lex_symbol(&mut self) {
        let start = self.position;
        let c = self.bump().expect("caller checked a character is present");
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => {
                if let Some(depth) = self.interp.last_mut() {
                    *depth += 1;
                }
                TokenKind::LBrace
            }
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => {
                if self.eat(':') {
                    TokenKind::PathSep
                } else {
                    TokenKind::Colon
                }
            }
            '.' => {
                if self.eat('.') {
                    if self.eat('=') {
                        TokenKind::DotDotEq
                    } else {
                        TokenKind::DotDot
                    }
                } else {
                    TokenKind::Dot
                }
            }
            '@' => {
                self.push(TokenKind::At, start);
                // A stable-ID annotation may start with a digit; lex the
                // hex run as an identifier so `@12abcdef` does not fall
                // into the number path.
                let run: String = self
                    .rest()
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect();
                let is_hex_run = (8..=12).contains(&run.len())
                    && run
                        .chars()
                        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
                    && run.chars().next().is_some_and(|c| c.is_ascii_digit());
                if is_hex_run {
                    let run_start = self.position;
                    self.position += run.len();
                    self.push_value(TokenKind::Ident, run_start, TokenValue::Ident(run));
                }
                return;
            }
            '?' => TokenKind::Question,
            '+' => {
                if self.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('>') {
                    TokenKind::Arrow
                } else if self.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.eat('*') {
                    if self.eat('=') {
                        TokenKind::StarStarAssign
                    } else {
                        TokenKind::StarStar
                    }
                } else if self.eat('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.eat('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.eat('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            '=' => {
                if self.eat('=') {
                    TokenKind::EqEq
                } else if self.eat('>') {
                    TokenKind::FatArrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.eat('<') {
                    if self.eat('=') {
                        TokenKind::ShlAssign
                    } else {
                        TokenKind::Shl
                    }
                } else if self.eat('=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('>') {
                    if self.eat('=') {
                        TokenKind::ShrAssign
                    } else {
                        TokenKind::Shr
                    }
                } else if self.eat('=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.eat('=') {
                    TokenKind::AmpAssign
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                if self.eat('=') {
                    TokenKind::PipeAssign
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => {
                if self.eat('=') {
                    TokenKind::CaretAssign
                } else {
                    TokenKind::Caret
                }
            }
            '~' => TokenKind::Tilde,
            other => {
                let span = self.span_from(start);
                self.session.emit(Diagnostic::error(
                    "E0001",
                    format!("unexpected character `{other}`"),
                    span,
                ));
                self.tokens.push(Token::new(TokenKind::Error, span));
                return;
            }
        };
        self.push(kind, start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn lex(src: &str) -> (Session, Vec<Token>) {
        let mut session = Session::default();
        let file = session.source_map.add_file("test.tml", src);
        let tokens = Lexer::new(&session, file).lex();
        (session, tokens)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_keywords_and_idents() {
        let (session, tokens) = lex("func add let letter");
        assert!(!session.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Func,
                TokenKind::Ident,
                TokenKind::Let,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[1].ident(), "add");
        assert_eq!(tokens[3].ident(), "letter");
    }

    #[test]
    fn test_lex_integer_bases() {
        let (session, tokens) = lex("1337 0xff 0o17 0b1010 1_000_000");
        assert!(!session.has_errors());
        let values: Vec<u128> = tokens
            .iter()
            .filter_map(|t| match &t.value {
                TokenValue::Int { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![1337, 255, 15, 10, 1_000_000]);
    }

    #[test]
    fn test_lex_integer_suffix() {
        let (_, tokens) = lex("42u8 7i64");
        assert_eq!(
            tokens[0].value,
            TokenValue::Int {
                value: 42,
                base: Base::Decimal,
                suffix: Some(NumSuffix::U8),
            }
        );
        assert_eq!(
            tokens[1].value,
            TokenValue::Int {
                value: 7,
                base: Base::Decimal,
                suffix: Some(NumSuffix::I64),
            }
        );
    }

    #[test]
    fn test_lex_invalid_digit_for_base() {
        let (session, tokens) = lex("0b102");
        assert!(session.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Error);
    }

    #[test]
    fn test_lex_float_and_suffix() {
        let (session, tokens) = lex("3.25 1.0e3 2f32");
        assert!(!session.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::FloatLit);
        assert_eq!(
            tokens[1].value,
            TokenValue::Float {
                value: 1000.0,
                suffix: None,
            }
        );
        assert_eq!(
            tokens[2].value,
            TokenValue::Float {
                value: 2.0,
                suffix: Some(NumSuffix::F32),
            }
        );
    }

    #[test]
    fn test_lex_string_escapes() {
        let (session, tokens) = lex(r#""a\tb\u{1F600}\x41""#);
        assert!(!session.has_errors());
        assert_eq!(tokens[0].value, TokenValue::Str("a\tb😀A".to_string()));
    }

    #[test]
    fn test_lex_raw_string_keeps_backslashes() {
        let (session, tokens) = lex(r#"r"a\nb""#);
        assert!(!session.has_errors());
        assert_eq!(tokens[0].value, TokenValue::Str("a\\nb".to_string()));
    }

    #[test]
    fn test_lex_interpolation_parts() {
        let (session, tokens) = lex(r#""x = ${x + 1}!""#);
        assert!(!session.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::StringPart,
                TokenKind::InterpStart,
                TokenKind::Ident,
                TokenKind::Plus,
                TokenKind::IntLit,
                TokenKind::InterpEnd,
                TokenKind::StringPart,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[0].value, TokenValue::Str("x = ".to_string()));
        assert_eq!(tokens[6].value, TokenValue::Str("!".to_string()));
    }

    #[test]
    fn test_lex_interpolation_with_braces_inside() {
        let (session, tokens) = lex(r#""${ when x { _ -> 1 } }""#);
        assert!(!session.has_errors());
        let ks = kinds(&tokens);
        assert_eq!(ks[0], TokenKind::StringPart);
        assert_eq!(ks[1], TokenKind::InterpStart);
        assert!(ks.contains(&TokenKind::When));
        assert_eq!(ks[ks.len() - 3], TokenKind::InterpEnd);
        assert_eq!(ks[ks.len() - 2], TokenKind::StringPart);
    }

    #[test]
    fn test_lex_unterminated_string_recovers() {
        let (session, tokens) = lex("\"abc\nlet x = 1;");
        assert!(session.has_errors());
        // The lexer keeps going after the error token.
        assert!(kinds(&tokens).contains(&TokenKind::Let));
    }

    #[test]
    fn test_lex_nested_block_comment() {
        let (session, tokens) = lex("/* outer /* inner */ still outer */ 42");
        assert!(!session.has_errors());
        assert_eq!(kinds(&tokens), vec![TokenKind::IntLit, TokenKind::Eof]);
    }

    #[test]
    fn test_lex_ai_directive() {
        let (session, tokens) = lex("// @ai: intent \"fast path\"\nfunc f() {}");
        assert!(!session.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::AiDirective);
        assert_eq!(
            tokens[0].value,
            TokenValue::Directive {
                name: "intent".to_string(),
                payload: "fast path".to_string(),
            }
        );
    }

    #[test]
    fn test_plain_comment_does_not_survive() {
        let (session, tokens) = lex("// just a note\n1");
        assert!(!session.has_errors());
        assert_eq!(kinds(&tokens), vec![TokenKind::IntLit, TokenKind::Eof]);
    }

    #[test]
    fn test_lex_operators_longest_match() {
        let (session, tokens) = lex("a **= b << c <= d ..= e");
        assert!(!session.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Ident,
                TokenKind::StarStarAssign,
                TokenKind::Ident,
                TokenKind::Shl,
                TokenKind::Ident,
                TokenKind::LtEq,
                TokenKind::Ident,
                TokenKind::DotDotEq,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_stray_character_recovers() {
        let (session, tokens) = lex("let § x");
        assert!(session.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Let,
                TokenKind::Error,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_char_literals() {
        let (session, tokens) = lex(r"'a' '\n' '\u{41}'");
        assert!(!session.has_errors());
        let values: Vec<char> = tokens
            .iter()
            .filter_map(|t| match t.value {
                TokenValue::Char(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec!['a', '\n', 'A']);
    }
}
