//! Configuration-sensitive Scanner.
//!
//! A hand-rolled char-Vec lexer (`input: Vec<char>`, `current`/`peek`/
//! `advance`, a `next_token` match) implementing base-aware number lexing,
//! the fixed operator-word table, the context-sensitive minus sign, and
//! operator-continuation folding.

use crate::conf::Config;
use crate::errors::{IvyError, IvyResult, Span};

/// The fixed set of alphabetic operator words. Lexed as `Token::Operator`,
/// never `Token::Identifier`, regardless of input base.
pub const OPERATOR_WORDS: &[&str] = &[
    "abs", "ceil", "iota", "rho", "take", "drop", "rev", "flip", "up", "down",
    "log", "sin", "cos", "tan", "asin", "acos", "atan", "sqrt", "floor",
    "not", "and", "or", "nand", "nor", "xor", "min", "max", "mod", "div",
    "imod", "idiv", "char", "code", "text", "float", "in", "sel", "fill",
    "encode", "decode", "grade", "ivy",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Eof,
    Newline,
    Semicolon,
    Assign,
    Char(char),
    /// Raw numeral text, interpreted against `Config.ibase` by the parser.
    Number(String),
    /// `a/b` with no surrounding space: numerator then denominator text.
    Rational(String, String),
    Str(String),
    Identifier(String),
    /// Operator text, already folded with any `/ \ /% \% . @` continuation.
    Operator(String),
    LeftBrack,
    RightBrack,
    LeftParen,
    RightParen,
    Op,
    /// A `)`-prefixed special command and the remainder of its line, e.g.
    /// `Command("base".into(), "16".into())`.
    Command(String, String),
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    /// True at the start of a line or right after whitespace following a
    /// token that cannot end an operand — used for both the minus-sign rule
    /// and `)`-at-line-start command detection.
    at_line_start: bool,
    /// Tracks whether the previous significant token can end an operand
    /// (identifier, number, `)`, `]`); if not, a following `-` begins a
    /// signed number literal rather than the subtraction operator.
    prev_ends_operand: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            input: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            at_line_start: true,
            prev_ends_operand: false,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn span(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(start_line, start_col)
    }

    fn skip_spaces_and_comments(&mut self) {
        loop {
            match self.current() {
                Some(c) if c == ' ' || c == '\t' => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn tokenize(mut self, cfg: &Config) -> IvyResult<Vec<(Token, Span)>> {
        let mut out = Vec::new();
        loop {
            let (tok, span) = self.next_token(cfg)?;
            let done = matches!(tok, Token::Eof);
            out.push((tok, span));
            if done {
                break;
            }
        }
        Ok(out)
    }

    pub fn next_token(&mut self, cfg: &Config) -> IvyResult<(Token, Span)> {
        self.skip_spaces_and_comments();

        let start_line = self.line;
        let start_col = self.col;

        let Some(c) = self.current() else {
            return Ok((Token::Eof, self.span(start_line, start_col)));
        };

        // A ')' at the start of a line introduces a special command, not
        // the ordinary right-paren token.
        if c == ')' && self.at_line_start {
            self.advance();
            return self.read_command(start_line, start_col);
        }

        if c == '\n' {
            self.advance();
            self.at_line_start = true;
            self.prev_ends_operand = false;
            return Ok((Token::Newline, self.span(start_line, start_col)));
        }

        self.at_line_start = false;

        let tok = match c {
            ';' => {
                self.advance();
                Token::Semicolon
            }
            '(' => {
                self.advance();
                Token::LeftParen
            }
            ')' => {
                self.advance();
                Token::RightParen
            }
            '[' => {
                self.advance();
                Token::LeftBrack
            }
            ']' => {
                self.advance();
                Token::RightBrack
            }
            '=' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    self.fold_operator("==".to_string())
                } else {
                    Token::Assign
                }
            }
            '\'' | '"' => self.read_string(c, start_line, start_col)?,
            '`' => self.read_raw_string(start_line, start_col)?,
            '-' if !self.prev_ends_operand => self.read_number(cfg, start_line, start_col)?,
            c if c.is_ascii_digit() => self.read_number(cfg, start_line, start_col)?,
            c if is_operator_char(c) => self.read_punct_operator(),
            c if c.is_alphabetic() || c == '_' => self.read_word(cfg),
            other => {
                return Err(IvyError::parse(
                    format!("unexpected character '{}'", other),
                    self.span(start_line, start_col),
                ))
            }
        };

        self.prev_ends_operand = matches!(
            tok,
            Token::Identifier(_) | Token::Number(_) | Token::Rational(_, _) | Token::RightParen | Token::RightBrack | Token::Char(_) | Token::Str(_)
        );

        Ok((tok, self.span(start_line, start_col)))
    }

    fn read_command(&mut self, line: u32, col: u32) -> IvyResult<(Token, Span)> {
        let mut name = String::new();
        while let Some(c) = self.current() {
            if c.is_alphabetic() {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        while self.current() == Some(' ') {
            self.advance();
        }
        let mut rest = String::new();
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            rest.push(c);
            self.advance();
        }
        Ok((Token::Command(name, rest.trim().to_string()), self.span(line, col)))
    }

    /// Base-aware number lexing: `Config.ibase` decides whether a run of
    /// alphanumerics is a number (e.g. base 16's `abe`) rather than an
    /// identifier. `a/b` with no surrounding space lexes as one Rational
    /// token, distinct from the division operator.
    fn read_number(&mut self, cfg: &Config, line: u32, col: u32) -> IvyResult<Token> {
        let mut text = String::new();
        if self.current() == Some('-') {
            text.push('-');
            self.advance();
        }

        if cfg.ibase == 0 && self.current() == Some('0') {
            match self.peek_at(1) {
                Some('x') | Some('X') => {
                    text.push(self.advance().unwrap());
                    text.push(self.advance().unwrap());
                    while matches!(self.current(), Some(c) if c.is_ascii_hexdigit()) {
                        text.push(self.advance().unwrap());
                    }
                    return Ok(Token::Number(text));
                }
                Some('o') | Some('O') => {
                    text.push(self.advance().unwrap());
                    text.push(self.advance().unwrap());
                    while matches!(self.current(), Some(c) if ('0'..='7').contains(&c)) {
                        text.push(self.advance().unwrap());
                    }
                    return Ok(Token::Number(text));
                }
                Some('b') | Some('B') => {
                    text.push(self.advance().unwrap());
                    text.push(self.advance().unwrap());
                    while matches!(self.current(), Some('0') | Some('1')) {
                        text.push(self.advance().unwrap());
                    }
                    return Ok(Token::Number(text));
                }
                _ => {}
            }
        }

        while matches!(self.current(), Some(c) if is_digit_in_base(c, cfg.ibase.max(10))) {
            text.push(self.advance().unwrap());
        }

        // Rational literal: INT/INT, no surrounding space.
        if self.current() == Some('/') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.advance();
            let mut denom = String::new();
            while matches!(self.current(), Some(c) if is_digit_in_base(c, cfg.ibase.max(10))) {
                denom.push(self.advance().unwrap());
            }
            return Ok(Token::Rational(text, denom));
        }

        if self.current() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
            while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
        }

        if matches!(self.current(), Some('e') | Some('E')) {
            let save = self.pos;
            let mut exp = String::new();
            exp.push(self.advance().unwrap());
            if matches!(self.current(), Some('+') | Some('-')) {
                exp.push(self.advance().unwrap());
            }
            if matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                    exp.push(self.advance().unwrap());
                }
                text.push_str(&exp);
            } else {
                self.pos = save;
            }
        }

        let _ = line;
        let _ = col;
        Ok(Token::Number(text))
    }

    fn read_word(&mut self, cfg: &Config) -> Token {
        let mut text = String::new();
        while matches!(self.current(), Some(c) if c.is_alphanumeric() || c == '_') {
            text.push(self.advance().unwrap());
        }

        if text == "op" {
            return Token::Op;
        }

        // `o` followed directly by `.` is reserved for the outer-product
        // prefix, never an identifier/operator word on its own.
        if text == "o" && self.current() == Some('.') {
            self.advance();
            return Token::Operator("o.".to_string());
        }

        if OPERATOR_WORDS.contains(&text.as_str()) {
            return self.fold_operator(text);
        }

        // Configuration-sensitive lexing: above base 10, a run of letters
        // that are all valid digits in the current base (e.g. `abe` in
        // base 16) is a number, not an identifier.
        if cfg.ibase > 10 && text.chars().all(|c| is_digit_in_base(c, cfg.ibase)) {
            return Token::Number(text);
        }

        Token::Identifier(text)
    }

    fn read_punct_operator(&mut self) -> Token {
        let mut text = String::new();
        text.push(self.advance().unwrap());
        // Two-character comparison/power operators.
        match (text.as_str(), self.current()) {
            ("<", Some('=')) | (">", Some('=')) | ("!", Some('=')) | ("*", Some('*')) | ("<", Some('<')) | (">", Some('>')) => {
                text.push(self.advance().unwrap());
            }
            _ => {}
        }
        self.fold_operator(text)
    }

    /// After scanning a binary-capable operator, fold a trailing `/ \ /% \%
    /// . @` (reduce/scan/inner-product/each marker) into the same token, and
    /// fold `LHS.RHS` where both are binary-capable words into one
    /// inner-product token.
    fn fold_operator(&mut self, mut text: String) -> Token {
        match self.current() {
            Some('/') => {
                text.push(self.advance().unwrap());
                if self.current() == Some('%') {
                    text.push(self.advance().unwrap());
                }
            }
            Some('\\') => {
                text.push(self.advance().unwrap());
                if self.current() == Some('%') {
                    text.push(self.advance().unwrap());
                }
            }
            Some('@') => {
                text.push(self.advance().unwrap());
                if self.current() == Some('@') {
                    text.push(self.advance().unwrap());
                }
            }
            Some('.') => {
                // Inner product: LHS.RHS, both binary-capable operators —
                // RHS may be an operator word (`and.or`) or a punctuation
                // operator run (`+.*`).
                let save = self.pos;
                self.advance();
                let mut rhs = String::new();
                if matches!(self.current(), Some(c) if c.is_alphanumeric()) {
                    while matches!(self.current(), Some(c) if c.is_alphanumeric()) {
                        rhs.push(self.advance().unwrap());
                    }
                } else if matches!(self.current(), Some(c) if is_operator_char(c)) {
                    while matches!(self.current(), Some(c) if is_operator_char(c)) {
                        rhs.push(self.advance().unwrap());
                    }
                }
                if !rhs.is_empty() {
                    text.push('.');
                    text.push_str(&rhs);
                } else {
                    self.pos = save;
                }
            }
            _ => {}
        }
        Token::Operator(text)
    }

    fn read_string(&mut self, quote: char, line: u32, col: u32) -> IvyResult<Token> {
        self.advance();
        let mut s = String::new();
        loop {
            match self.current() {
                None | Some('\n') => {
                    return Err(IvyError::parse("unterminated string literal", self.span(line, col)))
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('\\') => s.push('\\'),
                        Some('"') => s.push('"'),
                        Some('\'') => s.push('\''),
                        Some('x') => s.push(self.read_hex_escape(2)?),
                        Some('u') => s.push(self.read_hex_escape(4)?),
                        Some('U') => s.push(self.read_hex_escape(8)?),
                        Some(other) => s.push(other),
                        None => return Err(IvyError::parse("unterminated escape", self.span(line, col))),
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
        if s.chars().count() == 1 {
            Ok(Token::Char(s.chars().next().unwrap()))
        } else {
            Ok(Token::Str(s))
        }
    }

    fn read_hex_escape(&mut self, digits: usize) -> IvyResult<char> {
        let mut hex = String::new();
        for _ in 0..digits {
            match self.current() {
                Some(c) if c.is_ascii_hexdigit() => hex.push(self.advance().unwrap()),
                _ => break,
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| IvyError::parse("invalid unicode escape", Span::default()))
    }

    fn read_raw_string(&mut self, line: u32, col: u32) -> IvyResult<Token> {
        self.advance();
        let mut s = String::new();
        loop {
            match self.current() {
                None => return Err(IvyError::parse("unterminated raw string literal", self.span(line, col))),
                Some('`') => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
        if s.chars().count() == 1 {
            Ok(Token::Char(s.chars().next().unwrap()))
        } else {
            Ok(Token::Str(s))
        }
    }
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/' | '\\' | '<' | '>' | '!' | '@' | ',' | '?' | '&' | '|' | '~' | ':' | '^')
}

fn is_digit_in_base(c: char, base: u32) -> bool {
    c.to_digit(base.clamp(2, 36)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(ibase: u32) -> Config {
        Config {
            ibase,
            obase: 10,
            origin: 1,
            float_prec: 256,
            maxbits: 1_000_000,
            maxdigits: 1_000_000,
            maxstack: 100_000,
            format: String::new(),
            prompt: String::new(),
            debug: vec![],
        }
    }

    fn toks(src: &str, ibase: u32) -> Vec<Token> {
        Lexer::new(src).tokenize(&cfg(ibase)).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_number() {
        assert_eq!(toks("42", 10), vec![Token::Number("42".into()), Token::Eof]);
    }

    #[test]
    fn test_base16_number_is_alpha_digits() {
        assert_eq!(toks("abe", 16), vec![Token::Number("abe".into()), Token::Eof]);
    }

    #[test]
    fn test_rational_literal() {
        assert_eq!(toks("1/3", 10), vec![Token::Rational("1".into(), "3".into()), Token::Eof]);
    }

    #[test]
    fn test_operator_word() {
        assert_eq!(toks("iota 3", 10), vec![
            Token::Operator("iota".into()),
            Token::Number("3".into()),
            Token::Eof,
        ]);
    }

    #[test]
    fn test_reduce_continuation_folds() {
        assert_eq!(toks("+/", 10), vec![Token::Operator("+/".into()), Token::Eof]);
    }

    #[test]
    fn test_first_axis_reduce_continuation() {
        assert_eq!(toks("+/%", 10), vec![Token::Operator("+/%".into()), Token::Eof]);
    }

    #[test]
    fn test_outer_product_prefix() {
        assert_eq!(toks("o.+", 10), vec![Token::Operator("o.".into()), Token::Operator("+".into()), Token::Eof]);
    }

    #[test]
    fn test_string() {
        assert_eq!(toks("\"hi\"", 10), vec![Token::Str("hi".into()), Token::Eof]);
    }

    #[test]
    fn test_single_char_string_is_char() {
        assert_eq!(toks("\"x\"", 10), vec![Token::Char('x'), Token::Eof]);
    }

    #[test]
    fn test_identifier() {
        assert_eq!(toks("foo", 10), vec![Token::Identifier("foo".into()), Token::Eof]);
    }

    #[test]
    fn test_command_at_line_start() {
        assert_eq!(toks(")base 16", 10), vec![Token::Command("base".into(), "16".into()), Token::Eof]);
    }

    #[test]
    fn test_minus_after_number_is_operator() {
        assert_eq!(
            toks("3-2", 10),
            vec![Token::Number("3".into()), Token::Operator("-".into()), Token::Number("2".into()), Token::Eof]
        );
    }

    #[test]
    fn test_leading_minus_is_signed_number() {
        assert_eq!(toks("-2", 10), vec![Token::Number("-2".into()), Token::Eof]);
    }
}
