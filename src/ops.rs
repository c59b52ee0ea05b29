//! Scalar arithmetic/relational primitives, and the rank-polymorphic
//! adapter that lifts each one to Vector and Matrix operands.
//!
//! Every binary numeric primitive is defined once per scalar type
//! combination (via [`RealNum::join`]); `apply_binary`/`apply_unary` are the
//! single generic adapters that produce the array behaviors described in
//! the array-dispatch rules, grounded on the teacher's own "one native
//! function, many call sites" registration idiom in `runtime.rs`.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::conf::Config;
use crate::errors::{IvyError, IvyResult, Span};
use crate::value::{Complex, Level, RealNum, Scalar, Value, DEFAULT_PREC};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
    IDiv,
    IMod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Min,
    Max,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Abs,
    Floor,
    Ceil,
    Not,
    Sqrt,
    Log,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
}

fn check_bits(n: &RealNum, cfg: &Config, span: Span) -> IvyResult<()> {
    if n.bit_width() > cfg.maxbits {
        return Err(IvyError::resource(
            format!("integer result exceeds maxbits ({} bits)", cfg.maxbits),
            span,
        ));
    }
    Ok(())
}

/// Scalar-level binary arithmetic/relational/logical dispatch.
pub fn scalar_binop(op: BinOp, l: &Scalar, r: &Scalar, cfg: &Config, span: Span) -> IvyResult<Scalar> {
    use BinOp::*;

    // Equality short-circuits over Char without attempting promotion.
    if matches!(op, Eq | Ne) {
        if matches!(l, Scalar::Char(_)) != matches!(r, Scalar::Char(_)) {
            return Ok(bool_scalar(op == Ne));
        }
        if let (Scalar::Char(a), Scalar::Char(b)) = (l, r) {
            let eq = a == b;
            return Ok(bool_scalar(if op == Eq { eq } else { !eq }));
        }
    }

    if matches!(l, Scalar::Char(_)) || matches!(r, Scalar::Char(_)) {
        return Err(IvyError::type_err("arithmetic on Char", span));
    }

    match (l, r) {
        (Scalar::Complex(a), _) | (_, Scalar::Complex(a)) if matches!(op, Lt | Le | Gt | Ge) => {
            let _ = a;
            // Resolved Open Question: Complex compares via (re, im)
            // lexicographically, same rule used for `==`.
            let ord = l.partial_cmp(r).ok_or_else(|| IvyError::domain("incomparable values", span))?;
            Ok(bool_scalar(match op {
                Lt => ord.is_lt(),
                Le => ord.is_le(),
                Gt => ord.is_gt(),
                Ge => ord.is_ge(),
                _ => unreachable!(),
            }))
        }
        (Scalar::Complex(_), _) | (_, Scalar::Complex(_)) => complex_binop(op, l, r, span),
        (Scalar::Real(a), Scalar::Real(b)) => real_binop(op, a.clone(), b.clone(), cfg, span),
    }
}

fn bool_scalar(b: bool) -> Scalar {
    Scalar::int(if b { 1 } else { 0 })
}

fn as_complex(s: &Scalar) -> Complex {
    match s {
        Scalar::Complex(c) => c.clone(),
        Scalar::Real(r) => Complex::new(r.clone(), RealNum::Int(0)),
        Scalar::Char(_) => unreachable!("char excluded before complex_binop"),
    }
}

fn complex_binop(op: BinOp, l: &Scalar, r: &Scalar, span: Span) -> IvyResult<Scalar> {
    use BinOp::*;
    let a = as_complex(l);
    let b = as_complex(r);
    let result = match op {
        Add => Complex::new(add_real(a.re, b.re), add_real(a.im, b.im)),
        Sub => Complex::new(sub_real(a.re, b.re), sub_real(a.im, b.im)),
        Mul => {
            // (a+bi)(c+di) = (ac-bd) + (ad+bc)i
            let ac = mul_real(a.re.clone(), b.re.clone());
            let bd = mul_real(a.im.clone(), b.im.clone());
            let ad = mul_real(a.re, b.im.clone());
            let bc = mul_real(a.im, b.re);
            Complex::new(sub_real(ac, bd), add_real(ad, bc))
        }
        Div => {
            // (a+bi)/(c+di) = ((ac+bd) + (bc-ad)i) / (c^2+d^2), multiplying
            // through by the conjugate of the divisor.
            if b.re.is_zero() && b.im.is_zero() {
                return Err(IvyError::domain("division by zero", span));
            }
            let denom = add_real(mul_real(b.re.clone(), b.re.clone()), mul_real(b.im.clone(), b.im.clone()));
            let ac = mul_real(a.re.clone(), b.re.clone());
            let bd = mul_real(a.im.clone(), b.im.clone());
            let bc = mul_real(a.im.clone(), b.re.clone());
            let ad = mul_real(a.re.clone(), b.im.clone());
            let re_num = add_real(ac, bd);
            let im_num = sub_real(bc, ad);
            let re = div_real(re_num, denom.clone(), span)?;
            let im = div_real(im_num, denom, span)?;
            Complex::new(re, im)
        }
        Eq | Ne => {
            let eq = a == b;
            return Ok(bool_scalar(if op == Eq { eq } else { !eq }));
        }
        _ => return Err(IvyError::domain("unsupported Complex operation", span)),
    };
    Ok(result.shrink())
}

fn div_real(a: RealNum, b: RealNum, span: Span) -> IvyResult<RealNum> {
    if b.is_zero() {
        return Err(IvyError::domain("division by zero", span));
    }
    let ra = a.to_big_rat();
    let rb = b.to_big_rat();
    Ok(RealNum::BigRat(ra / rb).shrink())
}

fn add_real(a: RealNum, b: RealNum) -> RealNum {
    let (a, b, level) = RealNum::join(a, b);
    apply_level(level, a, b, |x, y| x + y, |x, y| x + y, |x, y| x + y, |x, y| x.add(&y, DEFAULT_PREC, astro_float::RoundingMode::ToEven))
        .shrink()
}

fn sub_real(a: RealNum, b: RealNum) -> RealNum {
    let (a, b, level) = RealNum::join(a, b);
    apply_level(level, a, b, |x, y| x - y, |x, y| x - y, |x, y| x - y, |x, y| x.sub(&y, DEFAULT_PREC, astro_float::RoundingMode::ToEven))
        .shrink()
}

fn mul_real(a: RealNum, b: RealNum) -> RealNum {
    let (a, b, level) = RealNum::join(a, b);
    apply_level(level, a, b, |x, y| x * y, |x, y| x * y, |x, y| x * y, |x, y| x.mul(&y, DEFAULT_PREC, astro_float::RoundingMode::ToEven))
        .shrink()
}

#[allow(clippy::too_many_arguments)]
fn apply_level(
    level: Level,
    a: RealNum,
    b: RealNum,
    int_op: fn(i64, i64) -> i64,
    bigint_op: fn(BigInt, BigInt) -> BigInt,
    bigrat_op: fn(BigRational, BigRational) -> BigRational,
    bigfloat_op: fn(astro_float::BigFloat, astro_float::BigFloat) -> astro_float::BigFloat,
) -> RealNum {
    match (level, a, b) {
        (Level::Int, RealNum::Int(x), RealNum::Int(y)) => RealNum::Int(int_op(x, y)),
        (Level::BigInt, RealNum::BigInt(x), RealNum::BigInt(y)) => RealNum::BigInt(bigint_op(x, y)),
        (Level::BigRat, RealNum::BigRat(x), RealNum::BigRat(y)) => RealNum::BigRat(bigrat_op(x, y)),
        (Level::BigFloat, RealNum::BigFloat(x), RealNum::BigFloat(y)) => RealNum::BigFloat(bigfloat_op(x, y)),
        _ => unreachable!("join guarantees matching levels"),
    }
}

fn real_binop(op: BinOp, a: RealNum, b: RealNum, cfg: &Config, span: Span) -> IvyResult<Scalar> {
    use BinOp::*;
    match op {
        Add => {
            let r = add_real(a, b);
            check_bits(&r, cfg, span)?;
            Ok(Scalar::Real(r))
        }
        Sub => {
            let r = sub_real(a, b);
            check_bits(&r, cfg, span)?;
            Ok(Scalar::Real(r))
        }
        Mul => {
            let r = mul_real(a, b);
            check_bits(&r, cfg, span)?;
            Ok(Scalar::Real(r))
        }
        Div => {
            // Division always promotes to at least BigRat.
            if b.is_zero() {
                return Err(IvyError::domain("division by zero", span));
            }
            let ra = a.to_big_rat();
            let rb = b.to_big_rat();
            Ok(Scalar::Real(RealNum::BigRat(ra / rb).shrink()))
        }
        IDiv => {
            if b.is_zero() {
                return Err(IvyError::domain("division by zero", span));
            }
            let ia = a.to_big_int();
            let ib = b.to_big_int();
            Ok(Scalar::Real(RealNum::BigInt(ia / ib).shrink()))
        }
        Mod | IMod => {
            if b.is_zero() {
                return Err(IvyError::domain("modulus by zero", span));
            }
            let ia = a.to_big_int();
            let ib = b.to_big_int();
            let m = ((ia % ib.clone()) + ib.clone()) % ib;
            Ok(Scalar::Real(RealNum::BigInt(m).shrink()))
        }
        Pow => pow_real(a, b, cfg, span),
        Lt | Le | Gt | Ge => {
            let ord = a.partial_cmp(&b).ok_or_else(|| IvyError::domain("incomparable values", span))?;
            Ok(bool_scalar(match op {
                Lt => ord.is_lt(),
                Le => ord.is_le(),
                Gt => ord.is_gt(),
                Ge => ord.is_ge(),
                _ => unreachable!(),
            }))
        }
        Eq => Ok(bool_scalar(a == b)),
        Ne => Ok(bool_scalar(a != b)),
        And => Ok(bool_scalar(!a.is_zero() && !b.is_zero())),
        Or => Ok(bool_scalar(!a.is_zero() || !b.is_zero())),
        Nand => Ok(bool_scalar(!(!a.is_zero() && !b.is_zero()))),
        Nor => Ok(bool_scalar(!(!a.is_zero() || !b.is_zero()))),
        Xor => Ok(bool_scalar(!a.is_zero() != !b.is_zero())),
        Min => Ok(Scalar::Real(if a <= b { a } else { b })),
        Max => Ok(Scalar::Real(if a >= b { a } else { b })),
        Shl | Shr => {
            let ia = a.to_big_int();
            let n = b
                .to_big_int()
                .to_i64()
                .ok_or_else(|| IvyError::domain("shift amount out of range", span))?;
            let n = if op == Shl { n } else { -n };
            let shifted = if n >= 0 { ia << (n as usize) } else { ia >> ((-n) as usize) };
            let r = RealNum::BigInt(shifted).shrink();
            check_bits(&r, cfg, span)?;
            Ok(Scalar::Real(r))
        }
    }
}

fn pow_real(a: RealNum, b: RealNum, cfg: &Config, span: Span) -> IvyResult<Scalar> {
    // Integer exponent on an integer/rational base stays exact; anything
    // else promotes to BigFloat (or Complex for a negative base with a
    // fractional exponent, which is out of scope for a first cut and
    // reported as a domain error instead of silently producing NaN).
    if let RealNum::Int(e) = &b {
        if *e >= 0 {
            match a {
                RealNum::Int(base) => {
                    let r = BigInt::from(base).pow(*e as u32);
                    check_bits(&RealNum::BigInt(r.clone()), cfg, span)?;
                    return Ok(Scalar::Real(RealNum::BigInt(r).shrink()));
                }
                RealNum::BigInt(base) => {
                    let r = base.pow(*e as u32);
                    check_bits(&RealNum::BigInt(r.clone()), cfg, span)?;
                    return Ok(Scalar::Real(RealNum::BigInt(r).shrink()));
                }
                RealNum::BigRat(ref base) => {
                    let num = base.numer().pow(*e as u32);
                    let den = base.denom().pow(*e as u32);
                    return Ok(Scalar::Real(RealNum::BigRat(BigRational::new(num, den)).shrink()));
                }
                RealNum::BigFloat(_) => {}
            }
        }
    }
    let bf_a = a.to_big_float(cfg.float_prec as usize);
    let bf_b = b.to_big_float(cfg.float_prec as usize);
    if bf_a.is_negative() && !bf_b.is_zero() {
        // Non-integer power of a negative base: would be complex. A real
        // first-cut implementation reports this as a domain error rather
        // than guessing a branch cut.
        return Err(IvyError::domain("non-integer power of negative base", span));
    }
    let r = bf_a.pow(&bf_b, cfg.float_prec as usize, astro_float::RoundingMode::ToEven);
    Ok(Scalar::Real(RealNum::BigFloat(r)))
}

/// Unary scalar dispatch. Transcendentals always produce BigFloat (or
/// Complex when the real result would be complex, e.g. `sqrt -1`).
pub fn scalar_unop(op: UnOp, v: &Scalar, cfg: &Config, span: Span) -> IvyResult<Scalar> {
    use UnOp::*;
    let r = match v {
        Scalar::Char(_) => return Err(IvyError::type_err("arithmetic on Char", span)),
        Scalar::Complex(c) => return complex_unop(op, c, cfg, span),
        Scalar::Real(r) => r.clone(),
    };
    match op {
        Neg => Ok(Scalar::Real(sub_real(RealNum::Int(0), r))),
        Abs => Ok(Scalar::Real(if r.is_negative() { sub_real(RealNum::Int(0), r) } else { r })),
        Floor => Ok(floor_or_ceil(r, true)),
        Ceil => Ok(floor_or_ceil(r, false)),
        Not => Ok(bool_scalar(r.is_zero())),
        Sqrt => {
            if r.is_negative() {
                let bf = r.to_big_float(cfg.float_prec as usize);
                let mag = bf.abs();
                let root = mag.sqrt(cfg.float_prec as usize, astro_float::RoundingMode::ToEven);
                return Ok(Complex::new(RealNum::Int(0), RealNum::BigFloat(root)).shrink());
            }
            let bf = r.to_big_float(cfg.float_prec as usize);
            Ok(Scalar::Real(RealNum::BigFloat(bf.sqrt(cfg.float_prec as usize, astro_float::RoundingMode::ToEven))))
        }
        Log => {
            if r.is_zero() || r.is_negative() {
                return Err(IvyError::domain("log of non-positive value", span));
            }
            let bf = r.to_big_float(cfg.float_prec as usize);
            Ok(Scalar::Real(RealNum::BigFloat(bf.ln(cfg.float_prec as usize, astro_float::RoundingMode::ToEven))))
        }
        Sin | Cos | Tan | Asin | Acos | Atan => {
            let x = r.to_f64();
            let y = match op {
                Sin => x.sin(),
                Cos => x.cos(),
                Tan => x.tan(),
                Asin => x.asin(),
                Acos => x.acos(),
                Atan => x.atan(),
                _ => unreachable!(),
            };
            Ok(Scalar::Real(RealNum::BigFloat(astro_float::BigFloat::from_f64(y, cfg.float_prec as usize))))
        }
    }
}

fn complex_unop(op: UnOp, c: &Complex, cfg: &Config, span: Span) -> IvyResult<Scalar> {
    use UnOp::*;
    match op {
        Neg => Ok(Complex::new(
            sub_real(RealNum::Int(0), c.re.clone()),
            sub_real(RealNum::Int(0), c.im.clone()),
        )
        .shrink()),
        Abs => {
            let re = c.re.to_big_float(cfg.float_prec as usize);
            let im = c.im.to_big_float(cfg.float_prec as usize);
            let sumsq = re.mul(&re, cfg.float_prec as usize, astro_float::RoundingMode::ToEven)
                .add(&im.mul(&im, cfg.float_prec as usize, astro_float::RoundingMode::ToEven), cfg.float_prec as usize, astro_float::RoundingMode::ToEven);
            Ok(Scalar::Real(RealNum::BigFloat(sumsq.sqrt(cfg.float_prec as usize, astro_float::RoundingMode::ToEven))))
        }
        _ => Err(IvyError::domain("operation undefined on Complex", span)),
    }
}

fn floor_or_ceil(r: RealNum, floor: bool) -> Scalar {
    match r {
        RealNum::Int(n) => Scalar::Real(RealNum::Int(n)),
        RealNum::BigInt(n) => Scalar::Real(RealNum::BigInt(n)),
        RealNum::BigRat(rat) => {
            let (num, den) = (rat.numer().clone(), rat.denom().clone());
            let q = &num / &den;
            let has_rem = &num % &den != BigInt::zero();
            let q = if has_rem && ((num.is_negative()) == floor) { q.clone() - 1 } else { q };
            Scalar::Real(RealNum::BigInt(q).shrink())
        }
        RealNum::BigFloat(bf) => {
            let f = bf.to_f64();
            let v = if floor { f.floor() } else { f.ceil() };
            Scalar::Real(RealNum::BigInt(BigInt::from(v as i64)).shrink())
        }
    }
}

/// The rank-polymorphic adapter: lifts `scalar_binop` across scalar,
/// vector, and matrix operands per the six dispatch rules.
pub fn apply_binary(op: BinOp, l: &Value, r: &Value, cfg: &Config, span: Span) -> IvyResult<Value> {
    match (l, r) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(scalar_binop(op, a, b, cfg, span)?)),
        (Value::Scalar(a), Value::Vector(bs)) => {
            let out: IvyResult<Vec<Scalar>> = bs.iter().map(|b| scalar_binop(op, a, b, cfg, span)).collect();
            Ok(Value::Vector(out?))
        }
        (Value::Vector(as_), Value::Scalar(b)) => {
            let out: IvyResult<Vec<Scalar>> = as_.iter().map(|a| scalar_binop(op, a, b, cfg, span)).collect();
            Ok(Value::Vector(out?))
        }
        (Value::Vector(as_), Value::Vector(bs)) => {
            if as_.len() != bs.len() {
                return Err(IvyError::shape("length mismatch", span));
            }
            let out: IvyResult<Vec<Scalar>> =
                as_.iter().zip(bs.iter()).map(|(a, b)| scalar_binop(op, a, b, cfg, span)).collect();
            Ok(Value::Vector(out?))
        }
        (Value::Scalar(a), Value::Matrix { shape, data }) => {
            let out: IvyResult<Vec<Scalar>> = data.iter().map(|b| scalar_binop(op, a, b, cfg, span)).collect();
            Ok(Value::Matrix { shape: shape.clone(), data: out? })
        }
        (Value::Matrix { shape, data }, Value::Scalar(b)) => {
            let out: IvyResult<Vec<Scalar>> = data.iter().map(|a| scalar_binop(op, a, b, cfg, span)).collect();
            Ok(Value::Matrix { shape: shape.clone(), data: out? })
        }
        (Value::Matrix { shape: sa, data: da }, Value::Matrix { shape: sb, data: db }) => {
            if sa != sb {
                return Err(IvyError::shape("rank/shape mismatch", span));
            }
            let out: IvyResult<Vec<Scalar>> =
                da.iter().zip(db.iter()).map(|(a, b)| scalar_binop(op, a, b, cfg, span)).collect();
            Ok(Value::Matrix { shape: sa.clone(), data: out? })
        }
        (Value::Vector(vs), Value::Matrix { shape, data }) | (Value::Matrix { shape, data }, Value::Vector(vs)) => {
            let trailing = *shape.last().unwrap_or(&0);
            if vs.len() != trailing {
                return Err(IvyError::shape("vector/matrix axis mismatch", span));
            }
            let out: IvyResult<Vec<Scalar>> = data
                .chunks(trailing)
                .flat_map(|chunk| chunk.iter().zip(vs.iter()))
                .map(|(a, b)| scalar_binop(op, a, b, cfg, span))
                .collect();
            Ok(Value::Matrix { shape: shape.clone(), data: out? })
        }
    }
}

/// Pointwise unary dispatch, preserving shape.
pub fn apply_unary(op: UnOp, v: &Value, cfg: &Config, span: Span) -> IvyResult<Value> {
    match v {
        Value::Scalar(s) => Ok(Value::Scalar(scalar_unop(op, s, cfg, span)?)),
        Value::Vector(vs) => {
            let out: IvyResult<Vec<Scalar>> = vs.iter().map(|s| scalar_unop(op, s, cfg, span)).collect();
            Ok(Value::Vector(out?))
        }
        Value::Matrix { shape, data } => {
            let out: IvyResult<Vec<Scalar>> = data.iter().map(|s| scalar_unop(op, s, cfg, span)).collect();
            Ok(Value::Matrix { shape: shape.clone(), data: out? })
        }
    }
}

// ---------------------------------------------------------------------
// Array-shaping built-ins (operator words from the scanner's fixed table)
// ---------------------------------------------------------------------

pub fn iota(n: i64, origin: u32, span: Span) -> IvyResult<Value> {
    if n < 0 {
        return Err(IvyError::domain("iota of negative count", span));
    }
    let start = origin as i64;
    Ok(Value::Vector((0..n).map(|i| Scalar::int(start + i)).collect()))
}

pub fn rho_unary(v: &Value) -> Value {
    Value::Vector(v.shape().into_iter().map(|d| Scalar::int(d as i64)).collect())
}

pub fn rho_binary(shape_v: &Value, data_v: &Value, span: Span) -> IvyResult<Value> {
    let shape: Vec<usize> = shape_v
        .ravel()
        .iter()
        .map(|s| match s {
            Scalar::Real(RealNum::Int(n)) if *n >= 0 => Ok(*n as usize),
            _ => Err(IvyError::domain("reshape shape must be non-negative integers", span)),
        })
        .collect::<IvyResult<_>>()?;
    let total: usize = shape.iter().product();
    let src = data_v.ravel();
    if src.is_empty() && total > 0 {
        return Err(IvyError::domain("cannot reshape from empty data", span));
    }
    let data: Vec<Scalar> = if src.is_empty() {
        vec![]
    } else {
        (0..total).map(|i| src[i % src.len()].clone()).collect()
    };
    match shape.len() {
        0 => Err(IvyError::shape("matrix made with zero-rank shape", span)),
        1 => Ok(Value::Vector(data)),
        _ => Value::matrix(shape, data).map_err(|m| IvyError::shape(m, span)),
    }
}

/// `take`/`drop` overflow policy (Open Question, resolved in DESIGN.md):
/// pad with the identity element rather than wrapping.
pub fn take(n: i64, v: &Value) -> Value {
    let data = v.ravel();
    let len = data.len();
    let count = n.unsigned_abs() as usize;
    let mut out = Vec::with_capacity(count);
    if n >= 0 {
        for i in 0..count {
            out.push(data.get(i).cloned().unwrap_or_else(pad_for));
        }
    } else {
        let start = len.saturating_sub(count);
        let have = len - start;
        for _ in 0..(count - have) {
            out.push(pad_for_from(&data));
        }
        out.extend(data[start..].iter().cloned());
    }
    Value::Vector(out)
}

pub fn drop(n: i64, v: &Value) -> Value {
    let data = v.ravel();
    let len = data.len();
    let count = (n.unsigned_abs() as usize).min(len);
    let out = if n >= 0 {
        data[count..].to_vec()
    } else {
        data[..len - count].to_vec()
    };
    Value::Vector(out)
}

fn pad_for() -> Scalar {
    Scalar::int(0)
}

fn pad_for_from(data: &[Scalar]) -> Scalar {
    if data.iter().all(|s| matches!(s, Scalar::Char(_))) && !data.is_empty() {
        Scalar::Char(' ')
    } else {
        pad_for()
    }
}

pub fn rev(v: &Value) -> Value {
    let mut data = v.ravel();
    data.reverse();
    Value::Vector(data)
}

pub fn flip(v: &Value, span: Span) -> IvyResult<Value> {
    match v {
        Value::Matrix { shape, data } if shape.len() == 2 => {
            let (rows, cols) = (shape[0], shape[1]);
            let mut out = vec![Scalar::int(0); rows * cols];
            for r in 0..rows {
                for c in 0..cols {
                    out[c * rows + r] = data[r * cols + c].clone();
                }
            }
            Ok(Value::Matrix { shape: vec![cols, rows], data: out })
        }
        Value::Vector(_) | Value::Scalar(_) => Ok(v.clone()),
        _ => Err(IvyError::shape("flip requires rank-2 matrix", span)),
    }
}

/// Grade-up: the permutation of indices that would sort the array
/// non-decreasing under the total order.
pub fn grade_up(v: &Value, origin: u32) -> Value {
    grade(v, origin, false)
}

pub fn grade_down(v: &Value, origin: u32) -> Value {
    grade(v, origin, true)
}

fn grade(v: &Value, origin: u32, descending: bool) -> Value {
    let data = v.ravel();
    let mut idx: Vec<usize> = (0..data.len()).collect();
    idx.sort_by(|&a, &b| {
        let ord = data[a].partial_cmp(&data[b]).unwrap_or(std::cmp::Ordering::Equal);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    Value::Vector(idx.into_iter().map(|i| Scalar::int(i as i64 + origin as i64)).collect())
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
    fn add_scalars() {
        let r = scalar_binop(BinOp::Add, &Scalar::int(2), &Scalar::int(2), &cfg(), sp()).unwrap();
        assert_eq!(r, Scalar::int(4));
    }

    #[test]
    fn div_promotes_to_bigrat() {
        let r = scalar_binop(BinOp::Div, &Scalar::int(1), &Scalar::int(3), &cfg(), sp()).unwrap();
        assert!(matches!(r, Scalar::Real(RealNum::BigRat(_))));
    }

    #[test]
    fn scalar_plus_vector_broadcasts() {
        let v = Value::Vector(vec![Scalar::int(1), Scalar::int(2), Scalar::int(3)]);
        let r = apply_binary(BinOp::Add, &Value::int(3), &v, &cfg(), sp()).unwrap();
        assert_eq!(r, Value::Vector(vec![Scalar::int(4), Scalar::int(5), Scalar::int(6)]));
    }

    #[test]
    fn vector_length_mismatch_errors() {
        let a = Value::Vector(vec![Scalar::int(1), Scalar::int(2)]);
        let b = Value::Vector(vec![Scalar::int(1)]);
        assert!(apply_binary(BinOp::Add, &a, &b, &cfg(), sp()).is_err());
    }

    #[test]
    fn char_arithmetic_is_type_error() {
        let a = Value::Scalar(Scalar::Char('a'));
        let b = Value::int(1);
        assert!(apply_binary(BinOp::Add, &a, &b, &cfg(), sp()).is_err());
    }

    #[test]
    fn char_equality_short_circuits() {
        let r = scalar_binop(BinOp::Eq, &Scalar::Char('a'), &Scalar::int(1), &cfg(), sp()).unwrap();
        assert_eq!(r, Scalar::int(0));
    }

    #[test]
    fn complex_division_recovers_exact_real_quotient() {
        // (4+0i) / (2+0i) == 2, demoted back to a plain real.
        let a = Scalar::Complex(Complex::new(RealNum::Int(4), RealNum::Int(0)));
        let b = Scalar::Complex(Complex::new(RealNum::Int(2), RealNum::Int(0)));
        let r = scalar_binop(BinOp::Div, &a, &b, &cfg(), sp()).unwrap();
        assert_eq!(r, Scalar::int(2));
    }

    #[test]
    fn complex_division_by_zero_errors() {
        let a = Scalar::Complex(Complex::new(RealNum::Int(1), RealNum::Int(1)));
        let zero = Scalar::Complex(Complex::new(RealNum::Int(0), RealNum::Int(0)));
        assert!(scalar_binop(BinOp::Div, &a, &zero, &cfg(), sp()).is_err());
    }

    #[test]
    fn shl_doubles_per_bit() {
        let r = scalar_binop(BinOp::Shl, &Scalar::int(1), &Scalar::int(4), &cfg(), sp()).unwrap();
        assert_eq!(r, Scalar::int(16));
    }

    #[test]
    fn shr_undoes_shl() {
        let shifted = scalar_binop(BinOp::Shl, &Scalar::int(5), &Scalar::int(3), &cfg(), sp()).unwrap();
        let back = scalar_binop(BinOp::Shr, &shifted, &Scalar::int(3), &cfg(), sp()).unwrap();
        assert_eq!(back, Scalar::int(5));
    }

    #[test]
    fn iota_generates_from_origin() {
        let v = iota(3, 1, sp()).unwrap();
        assert_eq!(v, Value::Vector(vec![Scalar::int(1), Scalar::int(2), Scalar::int(3)]));
    }

    #[test]
    fn take_pads_on_overflow() {
        let v = Value::Vector(vec![Scalar::int(1), Scalar::int(2)]);
        let t = take(4, &v);
        assert_eq!(t, Value::Vector(vec![Scalar::int(1), Scalar::int(2), Scalar::int(0), Scalar::int(0)]));
    }

    #[test]
    fn grade_up_is_sort_permutation() {
        let v = Value::Vector(vec![Scalar::int(3), Scalar::int(1), Scalar::int(2)]);
        let g = grade_up(&v, 0);
        assert_eq!(g, Value::Vector(vec![Scalar::int(1), Scalar::int(2), Scalar::int(0)]));
    }
}
