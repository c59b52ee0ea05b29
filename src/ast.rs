//! Span-carrying expression AST.
//!
//! Every variant carries a `span`, with a single `span()` accessor matching
//! each arm (Literal/VariableRef/Unary/Binary/Index/VectorLiteral/
//! Conditional).

use crate::errors::Span;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value, Span),
    VariableRef(String, Span),
    Unary { op: String, right: Box<Expr>, span: Span },
    Binary { op: String, left: Box<Expr>, right: Box<Expr>, span: Span },
    /// `target[indexExprs...]`; `None` entries are elided axes ("all of
    /// it").
    Index { target: Box<Expr>, indices: Vec<Option<Expr>>, span: Span },
    VectorLiteral(Vec<Expr>, Span),
    /// The binary `:` operator, valid only inside user-op bodies.
    Conditional { cond: Box<Expr>, result: Box<Expr>, span: Span },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, s) => *s,
            Expr::VariableRef(_, s) => *s,
            Expr::Unary { span, .. } => *span,
            Expr::Binary { span, .. } => *span,
            Expr::Index { span, .. } => *span,
            Expr::VectorLiteral(_, s) => *s,
            Expr::Conditional { span, .. } => *span,
        }
    }

    /// True for assignment `Binary` nodes — whose left must be a
    /// VariableRef or Index, per the data model.
    pub fn is_assignment(&self) -> bool {
        matches!(self, Expr::Binary { op, .. } if op == "=")
    }
}

/// A single top-level line: the list of statements it held, plus whether
/// this line was the last before end of input.
#[derive(Debug, Clone)]
pub struct Line {
    pub statements: Vec<Expr>,
    pub eof: bool,
}

/// A unary or binary user-operator definition (`op NAME ARG = BODY` /
/// `op LARG NAME RARG = BODY`).
#[derive(Debug, Clone)]
pub struct OpDef {
    pub name: String,
    pub left_arg: Option<String>,
    pub right_arg: String,
    pub body: Vec<Expr>,
    pub span: Span,
    /// `None` for a forward declaration (`op NAME ARG` with no body).
    pub has_body: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_detected() {
        let e = Expr::Binary {
            op: "=".to_string(),
            left: Box::new(Expr::VariableRef("x".into(), Span::default())),
            right: Box::new(Expr::Literal(Value::int(1), Span::default())),
            span: Span::default(),
        };
        assert!(e.is_assignment());
    }

    #[test]
    fn span_accessor_covers_every_variant() {
        let s = Span::new(4, 2);
        let lit = Expr::Literal(Value::int(1), s);
        assert_eq!(lit.span(), s);
    }
}
