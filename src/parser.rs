//! Right-to-left, single-precedence Parser.
//!
//! Reuses the teacher's token-buffer/error-reporting mechanics (`axm/src/
//! parser.rs`'s `Parser { tokens, ... }` shape and `peek`/`expect` idiom) but
//! not its grammar: that parser is a classic precedence-climbing descent
//! (`parse_equality -> parse_comparison -> parse_term -> ...`), which is the
//! wrong shape for this spec's single right-to-left precedence level.

use std::collections::HashSet;

use crate::ast::{Expr, Line, OpDef};
use crate::errors::{IvyError, IvyResult, Span};
use crate::lexer::{Lexer, Token};
use crate::value::{Scalar, Value};

/// What the parser needs from the execution context to classify an
/// identifier as an operator call vs. a variable reference (spec.md §4.8:
/// "parsing is not purely lexical").
pub trait OpLookup {
    fn is_unary_op(&self, name: &str) -> bool;
    fn is_binary_op(&self, name: &str) -> bool;
}

/// A no-op lookup for contexts that parse without a live Context (tests).
pub struct NoOps;
impl OpLookup for NoOps {
    fn is_unary_op(&self, _name: &str) -> bool {
        false
    }
    fn is_binary_op(&self, _name: &str) -> bool {
        false
    }
}

pub enum Item {
    Line(Line),
    OpDef(OpDef),
    Command(String, String),
    Eof,
}

pub struct Parser<'a> {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    ops: &'a dyn OpLookup,
    /// Argument names of the op definition currently being parsed (locals
    /// shadow operator names of the same spelling); a stack to allow
    /// (rare) nested `op` syntax errors to still recover sensibly.
    locals: Vec<HashSet<String>>,
    in_op_body: bool,
    /// `Config.ibase` at construction time — `Token::Number` text is
    /// base-sensitive (spec.md §4.7) and literals are converted against
    /// this base rather than always assuming decimal.
    ibase: u32,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, cfg: &crate::conf::Config, ops: &'a dyn OpLookup) -> IvyResult<Self> {
        let tokens = Lexer::new(source).tokenize(cfg)?;
        Ok(Parser { tokens, pos: 0, ops, locals: vec![], in_op_body: false, ibase: cfg.ibase })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|(t, _)| t).unwrap_or(&Token::Eof)
    }

    fn peek_span(&self) -> Span {
        self.tokens.get(self.pos).map(|(_, s)| *s).unwrap_or_default()
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).map(|(t, _)| t.clone()).unwrap_or(Token::Eof);
        if !matches!(t, Token::Eof) {
            self.pos += 1;
        }
        t
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.last().is_some_and(|s| s.contains(name))
    }

    /// Reads one top-level item: an `op` definition, a `)`-command, or an
    /// ordinary line of `;`/newline-separated statements.
    pub fn next_item(&mut self) -> IvyResult<Item> {
        while matches!(self.peek(), Token::Newline) {
            self.advance();
        }
        match self.peek().clone() {
            Token::Eof => Ok(Item::Eof),
            Token::Command(name, rest) => {
                self.advance();
                Ok(Item::Command(name, rest))
            }
            Token::Op => {
                self.advance();
                Ok(Item::OpDef(self.parse_op_def()?))
            }
            _ => Ok(Item::Line(self.parse_line()?)),
        }
    }

    fn parse_line(&mut self) -> IvyResult<Line> {
        let mut statements = Vec::new();
        loop {
            if matches!(self.peek(), Token::Eof | Token::Newline) {
                break;
            }
            statements.push(self.parse_expr()?);
            if matches!(self.peek(), Token::Semicolon) {
                self.advance();
                continue;
            }
            break;
        }
        let eof = matches!(self.peek(), Token::Eof);
        if matches!(self.peek(), Token::Newline) {
            self.advance();
        }
        Ok(Line { statements, eof })
    }

    /// `op NAME ARG = BODY` / `op LARG NAME RARG = BODY`; `op NAME ARG` with
    /// no `=` is a forward declaration.
    fn parse_op_def(&mut self) -> IvyResult<OpDef> {
        let span = self.peek_span();
        let first = self.expect_identifier()?;

        let (name, left_arg, right_arg) = if self.looks_like_identifier() {
            // `op NAME ARG`
            let arg = self.expect_identifier()?;
            (first, None, arg)
        } else {
            // `op LARG NAME RARG`
            let name = self.expect_identifier()?;
            let right = self.expect_identifier()?;
            (name, Some(first), right)
        };

        let mut locals = HashSet::new();
        locals.insert(right_arg.clone());
        if let Some(l) = &left_arg {
            locals.insert(l.clone());
        }
        self.locals.push(locals);
        let prev_in_body = self.in_op_body;
        self.in_op_body = true;

        let has_body = matches!(self.peek(), Token::Assign);
        let mut body = Vec::new();
        if has_body {
            self.advance();
            loop {
                if matches!(self.peek(), Token::Newline) {
                    self.advance();
                    if matches!(self.peek(), Token::Newline | Token::Eof) {
                        break;
                    }
                    continue;
                }
                if matches!(self.peek(), Token::Eof) {
                    break;
                }
                body.push(self.parse_expr()?);
                if matches!(self.peek(), Token::Semicolon) {
                    self.advance();
                }
            }
        }

        self.in_op_body = prev_in_body;
        self.locals.pop();

        Ok(OpDef { name, left_arg, right_arg, body, span, has_body })
    }

    fn looks_like_identifier(&self) -> bool {
        matches!(self.peek(), Token::Identifier(_))
    }

    fn expect_identifier(&mut self) -> IvyResult<String> {
        match self.advance() {
            Token::Identifier(s) => Ok(s),
            other => Err(IvyError::parse(format!("expected identifier, found {:?}", other), self.peek_span())),
        }
    }

    // -- right-to-left single-precedence expression grammar ------------

    /// `expr := operand (binaryOp expr)?` — a binary operator binds to the
    /// single operand on its left and to the *entire remaining expression*
    /// on its right, which is what makes evaluation right-to-left.
    pub fn parse_expr(&mut self) -> IvyResult<Expr> {
        let left = self.parse_operand()?;
        self.parse_binary_tail(left)
    }

    fn parse_binary_tail(&mut self, left: Expr) -> IvyResult<Expr> {
        // Outer product `L o.C R`: "o." lexes as its own token; the
        // combining operator C is the following token, stitched together
        // here at the parser level into one synthetic operator name.
        if let Token::Operator(op) = self.peek().clone() {
            if op == "o." {
                let span = self.peek_span();
                self.advance();
                let combine = match self.advance() {
                    Token::Operator(c) => c,
                    other => return Err(IvyError::parse(format!("expected operator after 'o.', found {:?}", other), span)),
                };
                let right = self.parse_expr()?;
                return Ok(Expr::Binary {
                    op: format!("o.{}", combine),
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                });
            }
        }
        match self.peek().clone() {
            Token::Assign => {
                let span = self.peek_span();
                self.advance();
                let right = self.parse_expr()?;
                Ok(Expr::Binary { op: "=".to_string(), left: Box::new(left), right: Box::new(right), span })
            }
            Token::Operator(op) if self.is_binary_capable(&op) => {
                let span = self.peek_span();
                self.advance();
                let right = self.parse_expr()?;
                if op == ":" {
                    if !self.in_op_body {
                        return Err(IvyError::parse("':' conditional only valid inside an op body", span));
                    }
                    Ok(Expr::Conditional { cond: Box::new(left), result: Box::new(right), span })
                } else {
                    Ok(Expr::Binary { op, left: Box::new(left), right: Box::new(right), span })
                }
            }
            _ => Ok(left),
        }
    }

    /// An operand is either a unary-operator application (binding to
    /// everything to its right) or a primary/vector-literal chain.
    fn parse_operand(&mut self) -> IvyResult<Expr> {
        if let Token::Operator(op) = self.peek().clone() {
            if self.is_unary_capable(&op) {
                let span = self.peek_span();
                self.advance();
                let right = self.parse_expr()?;
                return Ok(Expr::Unary { op, right: Box::new(right), span });
            }
        }
        self.parse_primary_chain()
    }

    /// Juxtaposed bare literals/variable refs with no operator between form
    /// a Vector literal; a single atom returns unwrapped.
    fn parse_primary_chain(&mut self) -> IvyResult<Expr> {
        let span = self.peek_span();
        let mut atoms = vec![self.parse_indexed_primary()?];
        while self.starts_atom() {
            atoms.push(self.parse_indexed_primary()?);
        }
        if atoms.len() == 1 {
            Ok(atoms.pop().unwrap())
        } else {
            Ok(Expr::VectorLiteral(atoms, span))
        }
    }

    fn starts_atom(&self) -> bool {
        matches!(
            self.peek(),
            Token::Number(_) | Token::Rational(_, _) | Token::Char(_) | Token::Str(_) | Token::Identifier(_) | Token::LeftParen
        )
    }

    fn parse_indexed_primary(&mut self) -> IvyResult<Expr> {
        let mut expr = self.parse_primary()?;
        while matches!(self.peek(), Token::LeftBrack) {
            let span = self.peek_span();
            self.advance();
            let mut indices = Vec::new();
            loop {
                if matches!(self.peek(), Token::Semicolon) {
                    indices.push(None);
                    self.advance();
                    continue;
                }
                if matches!(self.peek(), Token::RightBrack) {
                    if indices.is_empty() {
                        indices.push(None);
                    }
                    break;
                }
                indices.push(Some(self.parse_expr()?));
                if matches!(self.peek(), Token::Semicolon) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(Token::RightBrack)?;
            expr = Expr::Index { target: Box::new(expr), indices, span };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> IvyResult<Expr> {
        let span = self.peek_span();
        match self.advance() {
            Token::Number(text) => Ok(Expr::Literal(parse_number_literal(&text, self.ibase), span)),
            Token::Rational(num, den) => Ok(Expr::Literal(parse_rational_literal(&num, &den, span)?, span)),
            Token::Char(c) => Ok(Expr::Literal(Value::Scalar(Scalar::Char(c)), span)),
            Token::Str(s) => {
                let v = Value::Vector(s.chars().map(Scalar::Char).collect());
                Ok(Expr::Literal(v, span))
            }
            Token::Identifier(name) => Ok(Expr::VariableRef(name, span)),
            Token::LeftParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            other => Err(IvyError::parse(format!("unexpected token {:?}", other), span)),
        }
    }

    fn expect(&mut self, expected: Token) -> IvyResult<()> {
        let span = self.peek_span();
        let found = self.advance();
        if std::mem::discriminant(&found) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(IvyError::parse(format!("expected {:?}, found {:?}", expected, found), span))
        }
    }

    fn is_unary_capable(&self, op: &str) -> bool {
        if self.is_local(op) {
            return false;
        }
        self.ops.is_unary_op(op)
    }

    fn is_binary_capable(&self, op: &str) -> bool {
        if op == "=" {
            return true;
        }
        if self.is_local(op) {
            return false;
        }
        self.ops.is_binary_op(op)
    }
}

/// Converts raw numeral text from the scanner into a `Value`. `ibase` is
/// `Config.ibase` at parse time (spec.md §4.7): above base 10 a run of
/// letter-digits (`abe` at base 16) is interpreted in that base rather than
/// assumed decimal; `0x`/`0o`/`0b`-prefixed text (only emitted by the
/// scanner when `ibase == 0`, C-style parsing) picks its base from the
/// prefix instead. A fractional part or exponent suffix is always decimal —
/// only integer digit runs are base-sensitive.
fn parse_number_literal(text: &str, ibase: u32) -> Value {
    let (neg, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        return int_literal(neg, hex, 16);
    }
    if let Some(oct) = body.strip_prefix("0o").or_else(|| body.strip_prefix("0O")) {
        return int_literal(neg, oct, 8);
    }
    if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        return int_literal(neg, bin, 2);
    }

    let has_fraction = body.contains('.');
    let has_exponent = ibase <= 10 && (body.contains('e') || body.contains('E'));
    if has_fraction || has_exponent {
        let f: f64 = text.parse().unwrap_or(0.0);
        return Value::Scalar(Scalar::Real(crate::value::RealNum::BigFloat(astro_float::BigFloat::from_f64(
            f,
            crate::value::DEFAULT_PREC,
        ))));
    }

    let radix = if ibase == 0 { 10 } else { ibase };
    int_literal(neg, body, radix)
}

/// Parses `digits` (no sign) as an integer in `radix`, widening to `BigInt`
/// when it overflows `i64`.
fn int_literal(neg: bool, digits: &str, radix: u32) -> Value {
    if let Ok(n) = i64::from_str_radix(digits, radix) {
        return Value::int(if neg { -n } else { n });
    }
    if let Some(n) = num_bigint::BigInt::parse_bytes(digits.as_bytes(), radix) {
        let n = if neg { -n } else { n };
        return Value::Scalar(Scalar::Real(crate::value::RealNum::BigInt(n)));
    }
    Value::int(0)
}

fn parse_rational_literal(num: &str, den: &str, span: Span) -> IvyResult<Value> {
    let n: num_bigint::BigInt = num.parse().map_err(|_| IvyError::parse("invalid rational numerator", span))?;
    let d: num_bigint::BigInt = den.parse().map_err(|_| IvyError::parse("invalid rational denominator", span))?;
    if d == num_bigint::BigInt::from(0) {
        return Err(IvyError::domain("zero denominator in rational literal", span));
    }
    let r = num_rational::BigRational::new(n, d);
    Ok(Value::Scalar(crate::value::RealNum::BigRat(r).shrink().into()))
}

impl From<crate::value::RealNum> for Scalar {
    fn from(r: crate::value::RealNum) -> Self {
        Scalar::Real(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllOps;
    impl OpLookup for AllOps {
        fn is_unary_op(&self, name: &str) -> bool {
            matches!(name, "iota" | "-" | "rho" | "not")
        }
        fn is_binary_op(&self, name: &str) -> bool {
            matches!(name, "+" | "-" | "*" | "/" | ":" | "rho")
        }
    }

    fn cfg() -> crate::conf::Config {
        crate::conf::Config {
            ibase: 10,
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

    fn parse_one(src: &str) -> Expr {
        let cfg = cfg();
        let ops = AllOps;
        let mut p = Parser::new(src, &cfg, &ops).unwrap();
        match p.next_item().unwrap() {
            Item::Line(line) => line.statements.into_iter().next().unwrap(),
            _ => panic!("expected a line"),
        }
    }

    #[test]
    fn base16_digit_word_parses_as_a_number() {
        let mut c = cfg();
        c.ibase = 16;
        let ops = AllOps;
        let mut p = Parser::new("abe", &c, &ops).unwrap();
        let line = match p.next_item().unwrap() {
            Item::Line(line) => line,
            _ => panic!("expected a line"),
        };
        match &line.statements[0] {
            Expr::Literal(v, _) => assert_eq!(*v, Value::int(0xabe)),
            other => panic!("expected a literal, got {:?}", other),
        }
    }

    #[test]
    fn right_to_left_binary_chain() {
        // 2*3+4 should parse as 2 * (3 + 4)
        let e = parse_one("2*3+4");
        match e {
            Expr::Binary { op, right, .. } => {
                assert_eq!(op, "*");
                assert!(matches!(*right, Expr::Binary { ref op, .. } if op == "+"));
            }
            _ => panic!("expected binary"),
        }
    }

    #[test]
    fn unary_binds_to_entire_right_side() {
        // iota 3+2 should parse as iota (3+2)
        let e = parse_one("iota 3+2");
        match e {
            Expr::Unary { op, right, .. } => {
                assert_eq!(op, "iota");
                assert!(matches!(*right, Expr::Binary { .. }));
            }
            _ => panic!("expected unary"),
        }
    }

    #[test]
    fn bare_literal_juxtaposition_is_vector_literal() {
        let e = parse_one("1 2 3");
        assert!(matches!(e, Expr::VectorLiteral(items, _) if items.len() == 3));
    }

    #[test]
    fn index_binds_tighter_than_operators() {
        let e = parse_one("x[1]+2");
        match e {
            Expr::Binary { left, .. } => assert!(matches!(*left, Expr::Index { .. })),
            _ => panic!("expected binary"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let e = parse_one("x=y=5");
        match e {
            Expr::Binary { op, right, .. } => {
                assert_eq!(op, "=");
                assert!(matches!(*right, Expr::Binary { ref op, .. } if op == "="));
            }
            _ => panic!("expected assignment"),
        }
    }
}
