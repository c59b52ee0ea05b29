//! The Value model: tagged numeric/array variants, the promotion/shrink
//! lattice, total ordering, and printing.
//!
//! Shaped after the teacher's `AxValue` (tagged union with `as_*` accessor
//! methods, a `type_name`, and a `display` method) but the variant set and
//! the promotion machinery are specific to this spec: Char never promotes,
//! numerics climb `Int -> BigInt -> BigRat -> BigFloat`, and Complex wraps a
//! pair of non-Complex reals rather than being folded into the ladder
//! itself.

use std::cmp::Ordering;
use std::fmt;

use astro_float::{BigFloat, RoundingMode};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::conf::Config;

/// Mantissa bit count used whenever a `BigFloat` is constructed without an
/// explicit precision (tests, defaults). Real evaluation always threads
/// `Config.float_prec` through instead.
pub const DEFAULT_PREC: usize = 256;

const ROUNDING: RoundingMode = RoundingMode::ToEven;

/// A real (non-complex) number at one of the four promotion levels.
#[derive(Debug, Clone)]
pub enum RealNum {
    Int(i64),
    BigInt(BigInt),
    BigRat(BigRational),
    BigFloat(BigFloat),
}

/// The four promotion levels, used to compute the "lowest common type" of
/// a binary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Int,
    BigInt,
    BigRat,
    BigFloat,
}

impl RealNum {
    pub fn level(&self) -> Level {
        match self {
            RealNum::Int(_) => Level::Int,
            RealNum::BigInt(_) => Level::BigInt,
            RealNum::BigRat(_) => Level::BigRat,
            RealNum::BigFloat(_) => Level::BigFloat,
        }
    }

    pub fn to_big_int(&self) -> BigInt {
        match self {
            RealNum::Int(n) => BigInt::from(*n),
            RealNum::BigInt(n) => n.clone(),
            RealNum::BigRat(r) => r.to_integer(),
            RealNum::BigFloat(f) => BigInt::from(f.to_i64().unwrap_or(0)),
        }
    }

    pub fn to_big_rat(&self) -> BigRational {
        match self {
            RealNum::Int(n) => BigRational::from_integer(BigInt::from(*n)),
            RealNum::BigInt(n) => BigRational::from_integer(n.clone()),
            RealNum::BigRat(r) => r.clone(),
            RealNum::BigFloat(f) => {
                BigRational::from_float(f.to_f64()).unwrap_or_else(BigRational::zero)
            }
        }
    }

    pub fn to_big_float(&self, prec: usize) -> BigFloat {
        match self {
            RealNum::Int(n) => BigFloat::from_i64(*n, prec),
            RealNum::BigInt(n) => BigFloat::from_f64(n.to_f64().unwrap_or(0.0), prec),
            RealNum::BigRat(r) => {
                BigFloat::from_f64(r.numer().to_f64().unwrap_or(0.0), prec)
                    .div(&BigFloat::from_f64(r.denom().to_f64().unwrap_or(1.0), prec), prec, ROUNDING)
            }
            RealNum::BigFloat(f) => f.clone(),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            RealNum::Int(n) => *n as f64,
            RealNum::BigInt(n) => n.to_f64().unwrap_or(f64::NAN),
            RealNum::BigRat(r) => r.to_f64().unwrap_or(f64::NAN),
            RealNum::BigFloat(f) => f.to_f64(),
        }
    }

    /// "Shrink": demote to the narrowest variant representing the same
    /// mathematical value, per the invariant that equal values always share
    /// one representation.
    pub fn shrink(self) -> RealNum {
        match self {
            RealNum::BigInt(n) => {
                if let Some(i) = n.to_i64() {
                    RealNum::Int(i)
                } else {
                    RealNum::BigInt(n)
                }
            }
            RealNum::BigRat(r) => {
                if r.is_integer() {
                    RealNum::BigInt(r.to_integer()).shrink()
                } else {
                    RealNum::BigRat(r)
                }
            }
            other => other,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            RealNum::Int(n) => *n == 0,
            RealNum::BigInt(n) => n.is_zero(),
            RealNum::BigRat(r) => r.is_zero(),
            RealNum::BigFloat(f) => f.is_zero(),
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            RealNum::Int(n) => *n < 0,
            RealNum::BigInt(n) => n.is_negative(),
            RealNum::BigRat(r) => r.is_negative(),
            RealNum::BigFloat(f) => f.is_negative(),
        }
    }

    /// Lift both operands to the higher of their two levels.
    pub fn join(a: RealNum, b: RealNum) -> (RealNum, RealNum, Level) {
        let level = a.level().max(b.level());
        (a.at_level(level), b.at_level(level), level)
    }

    pub fn at_level(self, level: Level) -> RealNum {
        if self.level() >= level {
            return self;
        }
        match level {
            Level::Int => self,
            Level::BigInt => RealNum::BigInt(self.to_big_int()),
            Level::BigRat => RealNum::BigRat(self.to_big_rat()),
            Level::BigFloat => RealNum::BigFloat(self.to_big_float(DEFAULT_PREC)),
        }
    }

    /// Bit width used to enforce `Config.maxbits` on integer results.
    pub fn bit_width(&self) -> u64 {
        match self {
            RealNum::Int(n) => 64 - (n.unsigned_abs().leading_zeros() as u64).min(64),
            RealNum::BigInt(n) => n.bits(),
            _ => 0,
        }
    }
}

impl PartialEq for RealNum {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for RealNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let (a, b, level) = RealNum::join(self.clone(), other.clone());
        Some(match level {
            Level::Int => match (a, b) {
                (RealNum::Int(x), RealNum::Int(y)) => x.cmp(&y),
                _ => unreachable!(),
            },
            Level::BigInt => match (a, b) {
                (RealNum::BigInt(x), RealNum::BigInt(y)) => x.cmp(&y),
                _ => unreachable!(),
            },
            Level::BigRat => match (a, b) {
                (RealNum::BigRat(x), RealNum::BigRat(y)) => x.cmp(&y),
                _ => unreachable!(),
            },
            Level::BigFloat => a.to_f64().partial_cmp(&b.to_f64())?,
        })
    }
}

impl fmt::Display for RealNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealNum::Int(n) => write!(f, "{}", n),
            RealNum::BigInt(n) => write!(f, "{}", n),
            RealNum::BigRat(r) => {
                if r.is_integer() {
                    write!(f, "{}", r.to_integer())
                } else {
                    write!(f, "{}/{}", r.numer(), r.denom())
                }
            }
            // `BigFloat`'s own `Display` renders the full mantissa precision
            // the value was computed at; routing through `to_f64()` first
            // would truncate it to ~17 significant digits regardless of
            // `Config.float_prec`.
            RealNum::BigFloat(bf) => write!(f, "{}", bf),
        }
    }
}

/// A Complex value: real and imaginary parts, each a non-Complex scalar.
#[derive(Debug, Clone)]
pub struct Complex {
    pub re: RealNum,
    pub im: RealNum,
}

impl Complex {
    pub fn new(re: RealNum, im: RealNum) -> Self {
        Complex { re, im }
    }

    /// Demote to a plain real if the imaginary part is exactly zero.
    pub fn shrink(self) -> Scalar {
        if self.im.is_zero() {
            Scalar::Real(self.re.shrink())
        } else {
            Scalar::Complex(self)
        }
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}j{}", self.re, self.im)
    }
}

impl PartialEq for Complex {
    fn eq(&self, other: &Self) -> bool {
        self.re == other.re && self.im == other.im
    }
}

/// A single scalar value: Char, a real number, or a Complex pair.
#[derive(Debug, Clone)]
pub enum Scalar {
    Char(char),
    Real(RealNum),
    Complex(Complex),
}

impl Scalar {
    pub fn int(n: i64) -> Scalar {
        Scalar::Real(RealNum::Int(n))
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Scalar::Char(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Char(_) => "Char",
            Scalar::Real(RealNum::Int(_)) => "Int",
            Scalar::Real(RealNum::BigInt(_)) => "BigInt",
            Scalar::Real(RealNum::BigRat(_)) => "BigRat",
            Scalar::Real(RealNum::BigFloat(_)) => "BigFloat",
            Scalar::Complex(_) => "Complex",
        }
    }

    /// True if this scalar is non-zero, for conditional tests (`:` and the
    /// boolean-truthiness asked for by reductions over `and`/`or`).
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Char(c) => *c != '\0',
            Scalar::Real(r) => !r.is_zero(),
            Scalar::Complex(c) => !(c.re.is_zero() && c.im.is_zero()),
        }
    }

    pub fn display(&self, cfg: &Config) -> String {
        match self {
            Scalar::Char(c) => c.to_string(),
            Scalar::Real(r) => format_real(r, cfg),
            Scalar::Complex(c) => format!("{}j{}", format_real(&c.re, cfg), format_real(&c.im, cfg)),
        }
    }
}

fn format_real(r: &RealNum, cfg: &Config) -> String {
    if !cfg.format.is_empty() {
        return printf_style(&cfg.format, r.to_f64());
    }
    match r {
        RealNum::Int(n) => format_radix_int(&BigInt::from(*n), cfg.obase),
        RealNum::BigInt(n) => {
            if digit_count(n) as u64 > cfg.maxdigits {
                printf_style("%g", r.to_f64())
            } else {
                format_radix_int(n, cfg.obase)
            }
        }
        RealNum::BigRat(rat) => {
            if rat.is_integer() {
                format_radix_int(&rat.to_integer(), cfg.obase)
            } else {
                format!(
                    "{}/{}",
                    format_radix_int(rat.numer(), cfg.obase),
                    format_radix_int(rat.denom(), cfg.obase)
                )
            }
        }
        // Print the BigFloat itself, not an f64 round-trip of it — `bf` can
        // carry far more significant digits than f64's ~17 (`Config.float_prec`
        // defaults to 256 bits and is user-settable via `)prec`).
        RealNum::BigFloat(bf) => bf.to_string(),
    }
}

fn digit_count(n: &BigInt) -> usize {
    n.to_string().trim_start_matches('-').len()
}

fn format_radix_int(n: &BigInt, base: u32) -> String {
    // Base 0 ()base 0) means "C-style decimal", same as base 10 for output
    // purposes; num-bigint's `to_str_radix` only accepts 2..=36 and panics
    // outside that range.
    if base == 10 || base == 0 {
        return n.to_string();
    }
    n.to_str_radix(base)
}

/// Minimal printf-style formatter covering `%g`, `%f`, `%.Nf`, `%e` — the
/// subset `Config.format`/`-format`/`-g` actually need.
fn printf_style(spec: &str, value: f64) -> String {
    if spec.ends_with('g') {
        format!("{}", value)
    } else if let Some(rest) = spec.strip_suffix('f') {
        if let Some(prec) = rest.rsplit('.').next().and_then(|p| p.parse::<usize>().ok()) {
            format!("{:.*}", prec, value)
        } else {
            format!("{}", value)
        }
    } else if spec.ends_with('e') {
        format!("{:e}", value)
    } else {
        format!("{}", value)
    }
}

/// An array or scalar value. Vector/Matrix elements are always `Scalar`:
/// the spec forbids nesting arrays directly (a Vector of Vectors becomes a
/// regular Matrix, or is rejected if irregular).
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(Scalar),
    Vector(Vec<Scalar>),
    Matrix { shape: Vec<usize>, data: Vec<Scalar> },
}

impl Value {
    pub fn scalar(s: Scalar) -> Value {
        Value::Scalar(s)
    }

    pub fn int(n: i64) -> Value {
        Value::Scalar(Scalar::int(n))
    }

    /// Shape: empty for scalars, `[len]` for vectors, the stored shape for
    /// matrices.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Value::Scalar(_) => vec![],
            Value::Vector(v) => vec![v.len()],
            Value::Matrix { shape, .. } => shape.clone(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(v) => v.len(),
            Value::Matrix { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Vector(v) if v.is_empty())
    }

    /// Flat element access regardless of array kind ("ravel").
    pub fn ravel(&self) -> Vec<Scalar> {
        match self {
            Value::Scalar(s) => vec![s.clone()],
            Value::Vector(v) => v.clone(),
            Value::Matrix { data, .. } => data.clone(),
        }
    }

    /// Build a Matrix from a shape and flat data, validating the
    /// shape/data-length invariant and rejecting zero-rank shapes.
    pub fn matrix(shape: Vec<usize>, data: Vec<Scalar>) -> Result<Value, String> {
        if shape.len() < 2 {
            return Err("matrix shape must have rank >= 2".to_string());
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(format!(
                "reshape total size mismatch: shape wants {} elements, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Value::Matrix { shape, data })
    }

    pub fn display(&self, cfg: &Config) -> String {
        match self {
            Value::Scalar(s) => s.display(cfg),
            Value::Vector(v) => {
                if v.iter().all(|s| matches!(s, Scalar::Char(_))) && !v.is_empty() {
                    v.iter()
                        .map(|s| s.display(cfg))
                        .collect::<Vec<_>>()
                        .join("")
                } else {
                    v.iter().map(|s| s.display(cfg)).collect::<Vec<_>>().join(" ")
                }
            }
            Value::Matrix { shape, data } => display_matrix(shape, data, cfg),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(s) => s.type_name(),
            Value::Vector(_) => "Vector",
            Value::Matrix { .. } => "Matrix",
        }
    }
}

fn display_matrix(shape: &[usize], data: &[Scalar], cfg: &Config) -> String {
    if shape.len() == 2 {
        let (rows, cols) = (shape[0], shape[1]);
        let mut lines = Vec::with_capacity(rows);
        for r in 0..rows {
            let row = &data[r * cols..(r + 1) * cols];
            lines.push(row.iter().map(|s| s.display(cfg)).collect::<Vec<_>>().join(" "));
        }
        lines.join("\n")
    } else {
        // Higher rank: print successive 2-D sub-matrices separated by a
        // blank line per additional dimension.
        let sub_len: usize = shape[1..].iter().product();
        let sub_shape = &shape[1..];
        let mut blocks = Vec::with_capacity(shape[0]);
        for i in 0..shape[0] {
            let slice = &data[i * sub_len..(i + 1) * sub_len];
            blocks.push(display_matrix(sub_shape, slice, cfg));
        }
        blocks.join("\n\n")
    }
}

/// Total order over all values: Char < numerics; among numerics, by
/// mathematical value (Complex nonzero-imaginary compares greater than any
/// real, then lexicographically by (re, im)); Vector > scalar, Matrix >
/// Vector; same-kind arrays compare by length then elementwise.
impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use Scalar::*;
        match (self, other) {
            (Char(a), Char(b)) => a.partial_cmp(b),
            (Char(_), _) => Some(Ordering::Less),
            (_, Char(_)) => Some(Ordering::Greater),
            (Real(a), Real(b)) => a.partial_cmp(b),
            (Real(a), Complex(b)) => {
                if b.im.is_zero() {
                    a.partial_cmp(&b.re)
                } else {
                    Some(Ordering::Less)
                }
            }
            (Complex(a), Real(b)) => {
                if a.im.is_zero() {
                    a.re.partial_cmp(b)
                } else {
                    Some(Ordering::Greater)
                }
            }
            (Complex(a), Complex(b)) => match a.re.partial_cmp(&b.re) {
                Some(Ordering::Equal) => a.im.partial_cmp(&b.im),
                other => other,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        fn kind_rank(v: &Value) -> u8 {
            match v {
                Value::Scalar(_) => 0,
                Value::Vector(_) => 1,
                Value::Matrix { .. } => 2,
            }
        }
        match kind_rank(self).cmp(&kind_rank(other)) {
            Ordering::Equal => {}
            other => return Some(other),
        }
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => a.partial_cmp(b),
            (Value::Vector(a), Value::Vector(b)) => match a.len().cmp(&b.len()) {
                Ordering::Equal => a.iter().partial_cmp(b.iter()),
                other => Some(other),
            },
            (Value::Matrix { shape: sa, data: da }, Value::Matrix { shape: sb, data: db }) => {
                let pa: usize = sa.iter().product();
                let pb: usize = sb.iter().product();
                match pa.cmp(&pb) {
                    Ordering::Equal => da.iter().partial_cmp(db.iter()),
                    other => Some(other),
                }
            }
            _ => None,
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

    #[test]
    fn bigint_shrinks_to_int_when_it_fits() {
        let v = RealNum::BigInt(BigInt::from(42)).shrink();
        assert!(matches!(v, RealNum::Int(42)));
    }

    #[test]
    fn bigrat_with_denom_one_shrinks() {
        let r = BigRational::from_integer(BigInt::from(6));
        let v = RealNum::BigRat(r).shrink();
        assert!(matches!(v, RealNum::Int(6)));
    }

    #[test]
    fn complex_with_zero_imaginary_demotes() {
        let c = Complex::new(RealNum::Int(5), RealNum::Int(0));
        let s = c.shrink();
        assert!(matches!(s, Scalar::Real(RealNum::Int(5))));
    }

    #[test]
    fn char_orders_below_numerics() {
        assert!(Scalar::Char('a') < Scalar::int(0));
    }

    #[test]
    fn vector_orders_above_scalar() {
        let s = Value::int(5);
        let v = Value::Vector(vec![Scalar::int(1)]);
        assert!(s < v);
    }

    #[test]
    fn display_plain_int_uses_obase() {
        assert_eq!(Scalar::int(42).display(&cfg()), "42");
    }

    #[test]
    fn vector_of_chars_prints_as_string() {
        let v = Value::Vector("hi".chars().map(Scalar::Char).collect());
        assert_eq!(v.display(&cfg()), "hi");
    }

    #[test]
    fn matrix_rejects_rank_below_two() {
        assert!(Value::matrix(vec![3], vec![Scalar::int(1); 3]).is_err());
    }

    #[test]
    fn matrix_rejects_size_mismatch() {
        assert!(Value::matrix(vec![2, 2], vec![Scalar::int(1); 3]).is_err());
    }
}
