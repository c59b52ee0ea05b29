//! Higher-order combinators: reduce, scan, inner/outer product, each.
//!
//! Each combinator is an array-shape transformation built on top of the
//! scalar dispatch in `ops.rs`, not a pointwise scalar primitive itself.

use rayon::prelude::*;

use crate::conf::Config;
use crate::errors::{IvyError, IvyResult, Span};
use crate::ops::{self, BinOp};
use crate::value::{RealNum, Scalar, Value};

/// Identity element for the empty-vector reduction cases this language
/// defines (`+/()` = 0, `*/()` = 1, `max/()`/`min/()` = sentinels); every other
/// operator over an empty vector has no identity and is an error.
fn empty_identity(op: BinOp) -> Option<Scalar> {
    match op {
        BinOp::Add => Some(Scalar::int(0)),
        BinOp::Mul => Some(Scalar::int(1)),
        BinOp::Max => Some(Scalar::Real(RealNum::BigFloat(astro_float::BigFloat::min_value(crate::value::DEFAULT_PREC)))),
        BinOp::Min => Some(Scalar::Real(RealNum::BigFloat(astro_float::BigFloat::max_value(crate::value::DEFAULT_PREC)))),
        _ => None,
    }
}

fn reduce_slice(op: BinOp, xs: &[Scalar], cfg: &Config, span: Span) -> IvyResult<Scalar> {
    if xs.is_empty() {
        return empty_identity(op).ok_or_else(|| IvyError::domain("reduce over empty vector has no identity", span));
    }
    // Right fold: X0 B (X1 B (X2 B ...)) — evaluated right-to-left like the
    // rest of the language.
    let mut it = xs.iter().rev();
    let mut acc = it.next().unwrap().clone();
    for x in it {
        acc = ops::scalar_binop(op, x, &acc, cfg, span)?;
    }
    Ok(acc)
}

/// `B/ X` — reduce along the last axis.
pub fn reduce_last(op: BinOp, x: &Value, cfg: &Config, span: Span) -> IvyResult<Value> {
    match x {
        Value::Scalar(_) => Ok(x.clone()),
        Value::Vector(xs) => Ok(Value::Scalar(reduce_slice(op, xs, cfg, span)?)),
        Value::Matrix { shape, data } => {
            let trailing = *shape.last().unwrap();
            let leading = &shape[..shape.len() - 1];
            let rows: IvyResult<Vec<Scalar>> =
                data.chunks(trailing).map(|row| reduce_slice(op, row, cfg, span)).collect();
            let rows = rows?;
            shape_result(leading, rows)
        }
    }
}

/// `B/% X` — reduce along the first axis.
pub fn reduce_first(op: BinOp, x: &Value, cfg: &Config, span: Span) -> IvyResult<Value> {
    match x {
        Value::Scalar(_) | Value::Vector(_) => reduce_last(op, x, cfg, span),
        Value::Matrix { shape, data } => {
            let first = shape[0];
            let trailing: usize = shape[1..].iter().product();
            let mut out = Vec::with_capacity(trailing);
            for col in 0..trailing {
                let column: Vec<Scalar> = (0..first).map(|row| data[row * trailing + col].clone()).collect();
                out.push(reduce_slice(op, &column, cfg, span)?);
            }
            shape_result(&shape[1..], out)
        }
    }
}

fn shape_result(shape: &[usize], data: Vec<Scalar>) -> IvyResult<Value> {
    match shape.len() {
        0 => Ok(Value::Scalar(data.into_iter().next().unwrap())),
        1 => Ok(Value::Vector(data)),
        _ => Value::matrix(shape.to_vec(), data).map_err(|m| IvyError::shape(m, Span::default())),
    }
}

fn scan_slice(op: BinOp, xs: &[Scalar], cfg: &Config, span: Span) -> IvyResult<Vec<Scalar>> {
    let mut out = Vec::with_capacity(xs.len());
    for i in 0..xs.len() {
        out.push(reduce_slice(op, &xs[..=i], cfg, span)?);
    }
    Ok(out)
}

/// `B\ X` — scan along the last axis; output has the same shape as X.
pub fn scan_last(op: BinOp, x: &Value, cfg: &Config, span: Span) -> IvyResult<Value> {
    match x {
        Value::Scalar(_) => Ok(x.clone()),
        Value::Vector(xs) => Ok(Value::Vector(scan_slice(op, xs, cfg, span)?)),
        Value::Matrix { shape, data } => {
            let trailing = *shape.last().unwrap();
            let mut out = Vec::with_capacity(data.len());
            for row in data.chunks(trailing) {
                out.extend(scan_slice(op, row, cfg, span)?);
            }
            Ok(Value::Matrix { shape: shape.clone(), data: out })
        }
    }
}

/// `B\% X` — scan along the first axis.
pub fn scan_first(op: BinOp, x: &Value, cfg: &Config, span: Span) -> IvyResult<Value> {
    match x {
        Value::Scalar(_) | Value::Vector(_) => scan_last(op, x, cfg, span),
        Value::Matrix { shape, data } => {
            let first = shape[0];
            let trailing: usize = shape[1..].iter().product();
            let mut out = data.clone();
            for col in 0..trailing {
                let column: Vec<Scalar> = (0..first).map(|row| data[row * trailing + col].clone()).collect();
                let scanned = scan_slice(op, &column, cfg, span)?;
                for (row, v) in scanned.into_iter().enumerate() {
                    out[row * trailing + col] = v;
                }
            }
            Ok(Value::Matrix { shape: shape.clone(), data: out })
        }
    }
}

/// `L o.C R` — outer product: shape(result) = shape(L) ++ shape(R); every
/// pairing of elements combined with C.
pub fn outer_product(op: BinOp, l: &Value, r: &Value, cfg: &Config, span: Span) -> IvyResult<Value> {
    let ls = l.ravel();
    let rs = r.ravel();
    let mut data = Vec::with_capacity(ls.len() * rs.len());
    for a in &ls {
        for b in &rs {
            data.push(ops::scalar_binop(op, a, b, cfg, span)?);
        }
    }
    let mut shape = l.shape();
    shape.extend(r.shape());
    match shape.len() {
        0 => Ok(Value::Scalar(data.into_iter().next().unwrap_or_else(|| Scalar::int(0)))),
        1 => Ok(Value::Vector(data)),
        _ => Value::matrix(shape, data).map_err(|m| IvyError::shape(m, span)),
    }
}

/// `L B.C R` — inner product: `(L B.C R) = B/ (L C R)` along matched axes.
/// Last axis of L must match first axis of R.
pub fn inner_product(reduce_op: BinOp, combine_op: BinOp, l: &Value, r: &Value, cfg: &Config, span: Span) -> IvyResult<Value> {
    match (l, r) {
        (Value::Vector(ls), Value::Vector(rs)) => {
            if ls.len() != rs.len() {
                return Err(IvyError::shape("inner product: length mismatch", span));
            }
            let products: IvyResult<Vec<Scalar>> =
                ls.iter().zip(rs.iter()).map(|(a, b)| ops::scalar_binop(combine_op, a, b, cfg, span)).collect();
            Ok(Value::Scalar(reduce_slice(reduce_op, &products?, cfg, span)?))
        }
        (Value::Matrix { shape: sl, data: dl }, Value::Matrix { shape: sr, data: dr }) if sl.len() == 2 && sr.len() == 2 => {
            let (m, k) = (sl[0], sl[1]);
            let (k2, n) = (sr[0], sr[1]);
            if k != k2 {
                return Err(IvyError::shape("inner product: axis mismatch", span));
            }
            let mut out = Vec::with_capacity(m * n);
            for i in 0..m {
                for j in 0..n {
                    let row: Vec<Scalar> = (0..k).map(|t| dl[i * k + t].clone()).collect();
                    let col: Vec<Scalar> = (0..k).map(|t| dr[t * n + j].clone()).collect();
                    let products: IvyResult<Vec<Scalar>> =
                        row.iter().zip(col.iter()).map(|(a, b)| ops::scalar_binop(combine_op, a, b, cfg, span)).collect();
                    out.push(reduce_slice(reduce_op, &products?, cfg, span)?);
                }
            }
            shape_result(&[m, n], out)
        }
        (Value::Matrix { shape: sl, data: dl }, Value::Vector(rs)) if sl.len() == 2 => {
            let (m, k) = (sl[0], sl[1]);
            if k != rs.len() {
                return Err(IvyError::shape("inner product: axis mismatch", span));
            }
            let mut out = Vec::with_capacity(m);
            for i in 0..m {
                let row: Vec<Scalar> = (0..k).map(|t| dl[i * k + t].clone()).collect();
                let products: IvyResult<Vec<Scalar>> =
                    row.iter().zip(rs.iter()).map(|(a, b)| ops::scalar_binop(combine_op, a, b, cfg, span)).collect();
                out.push(reduce_slice(reduce_op, &products?, cfg, span)?);
            }
            shape_result(&[m], out)
        }
        _ => Err(IvyError::shape("inner product: unsupported shapes", span)),
    }
}

/// `B@ X` — each, unary form: apply B to every element independently.
pub fn each_unary(f: impl Fn(&Scalar) -> IvyResult<Scalar> + Sync, x: &Value) -> IvyResult<Value>
where
{
    match x {
        Value::Scalar(s) => Ok(Value::Scalar(f(s)?)),
        Value::Vector(xs) => {
            let out: IvyResult<Vec<Scalar>> = xs.iter().map(|s| f(s)).collect();
            Ok(Value::Vector(out?))
        }
        Value::Matrix { shape, data } => {
            let out: IvyResult<Vec<Scalar>> = data.iter().map(|s| f(s)).collect();
            Ok(Value::Matrix { shape: shape.clone(), data: out? })
        }
    }
}

/// `L B@ R` — each, binary form.
pub fn each_binary(op: BinOp, l: &Value, r: &Value, cfg: &Config, span: Span) -> IvyResult<Value> {
    let ls = l.ravel();
    let rs = r.ravel();
    if ls.len() != rs.len() {
        return Err(IvyError::shape("each: length mismatch", span));
    }
    let out: IvyResult<Vec<Scalar>> =
        ls.iter().zip(rs.iter()).map(|(a, b)| ops::scalar_binop(op, a, b, cfg, span)).collect();
    let data = out?;
    match l.shape().len() {
        0 => Ok(Value::Scalar(data.into_iter().next().unwrap())),
        _ => Ok(Value::Vector(data)),
    }
}

/// Opt-in parallel map over large vectors, dispatched across worker
/// threads via `rayon`. Used only where the REPL/config flags it on;
/// shared state (the RNG, in particular) is never touched from here.
pub fn par_each_unary(f: impl Fn(&Scalar) -> IvyResult<Scalar> + Sync, x: &Value) -> IvyResult<Value> {
    match x {
        Value::Scalar(s) => Ok(Value::Scalar(f(s)?)),
        Value::Vector(xs) => {
            let out: Result<Vec<Scalar>, IvyError> = xs.par_iter().map(|s| f(s)).collect();
            Ok(Value::Vector(out?))
        }
        Value::Matrix { shape, data } => {
            let out: Result<Vec<Scalar>, IvyError> = data.par_iter().map(|s| f(s)).collect();
            Ok(Value::Matrix { shape: shape.clone(), data: out? })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
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

    fn sp() -> Span {
        Span::new(1, 1)
    }

    #[test]
    fn reduce_add_over_vector() {
        let v = Value::Vector((1..=100).map(Scalar::int).collect());
        let r = reduce_last(BinOp::Add, &v, &cfg(), sp()).unwrap();
        assert_eq!(r, Value::int(5050));
    }

    #[test]
    fn reduce_empty_add_is_zero() {
        let v = Value::Vector(vec![]);
        let r = reduce_last(BinOp::Add, &v, &cfg(), sp()).unwrap();
        assert_eq!(r, Value::int(0));
    }

    #[test]
    fn reduce_empty_mul_is_one() {
        let v = Value::Vector(vec![]);
        let r = reduce_last(BinOp::Mul, &v, &cfg(), sp()).unwrap();
        assert_eq!(r, Value::int(1));
    }

    #[test]
    fn scan_last_final_element_equals_reduce() {
        let v = Value::Vector(vec![Scalar::int(1), Scalar::int(2), Scalar::int(3)]);
        let scanned = scan_last(BinOp::Add, &v, &cfg(), sp()).unwrap();
        let reduced = reduce_last(BinOp::Add, &v, &cfg(), sp()).unwrap();
        if let Value::Vector(xs) = scanned {
            assert_eq!(Value::Scalar(xs.last().unwrap().clone()), reduced);
        } else {
            panic!("expected vector");
        }
    }

    #[test]
    fn outer_product_shape_is_concatenation() {
        let l = Value::Vector(vec![Scalar::int(1), Scalar::int(2)]);
        let r = Value::Vector(vec![Scalar::int(1), Scalar::int(2), Scalar::int(3)]);
        let m = outer_product(BinOp::Mul, &l, &r, &cfg(), sp()).unwrap();
        assert_eq!(m.shape(), vec![2, 3]);
    }

    #[test]
    fn inner_product_dot() {
        let l = Value::Vector(vec![Scalar::int(1), Scalar::int(2), Scalar::int(3)]);
        let r = Value::Vector(vec![Scalar::int(4), Scalar::int(5), Scalar::int(6)]);
        let dot = inner_product(BinOp::Add, BinOp::Mul, &l, &r, &cfg(), sp()).unwrap();
        assert_eq!(dot, Value::int(32));
    }
}
