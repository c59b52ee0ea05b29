//! The line-at-a-time REPL loop.
//!
//! Grounded on the teacher's `main.rs` `run(cli)` dispatch shape (read,
//! evaluate, print, loop; catch at the top, print a positioned message,
//! resume): spec.md §1 calls the REPL loop an external collaborator, but a
//! crate with no entry point is not a deliverable, so this is the minimal,
//! real version spec.md §4.9/§2.1 describes.
//!
//! Parser/Context coupling (spec.md §9, "the parser must read the
//! Context's op tables while parsing"): each logical chunk of input is
//! parsed with a short-lived snapshot of the current op tables, evaluated
//! against `&mut Context` (which may itself register new ops), then the
//! next chunk is parsed against the updated tables. This mirrors the
//! snapshot pattern already used by `runtime.rs`'s own tests.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::Path;

use crate::ast::OpDef;
use crate::errors::{IvyError, IvyResult};
use crate::parser::{Item, OpLookup, Parser};
use crate::persist;
use crate::runtime::Context;
use crate::value::Value;

/// A snapshot of the op names registered on a `Context`, taken immediately
/// before parsing one chunk so the `Parser`'s `OpLookup` borrow never
/// overlaps the `&mut Context` used to evaluate that chunk.
struct OpSnapshot {
    unary: HashSet<String>,
    binary: HashSet<String>,
}

impl OpSnapshot {
    fn of(ctx: &Context) -> Self {
        // `Context` already implements `OpLookup` directly; re-deriving the
        // membership sets here (rather than borrowing `ctx` across the
        // parse) is what lets the snapshot outlive the mutable borrow used
        // to evaluate the parsed item.
        OpSnapshot {
            unary: KNOWN_UNARY.iter().map(|s| s.to_string()).filter(|n| ctx.is_unary_op(n)).collect(),
            binary: KNOWN_BINARY.iter().map(|s| s.to_string()).filter(|n| ctx.is_binary_op(n)).collect(),
        }
    }
}

// The fixed spelling set a snapshot needs to probe; user-defined names are
// already covered separately via `ctx.definitions`.
const KNOWN_UNARY: &[&str] = &[
    "-", "abs", "ceil", "floor", "not", "sqrt", "log", "sin", "cos", "tan", "asin", "acos", "atan", "iota", "rho",
    "rev", "flip", "up", "down", "char", "code",
];
const KNOWN_BINARY: &[&str] = &[
    "+", "-", "*", "/", "**", "mod", "div", "idiv", "imod", "<", "<=", ">", ">=", "==", "!=", "and", "or", "nand",
    "nor", "xor", "min", "max", "rho", "take", "drop", ":", "<<", ">>",
];

impl OpLookup for OpSnapshot {
    fn is_unary_op(&self, name: &str) -> bool {
        self.unary.contains(name) || crate::runtime::Combinator::parse(name).is_some()
    }
    fn is_binary_op(&self, name: &str) -> bool {
        self.binary.contains(name) || crate::runtime::Combinator::parse(name).is_some()
    }
}

impl OpSnapshot {
    fn full(ctx: &Context) -> Self {
        let mut s = OpSnapshot::of(ctx);
        for name in &ctx.definitions {
            if ctx.user_unary_op(name).is_some() {
                s.unary.insert(name.clone());
            }
            if ctx.user_binary_op(name).is_some() {
                s.binary.insert(name.clone());
            }
        }
        s
    }
}

/// Splits `source` into logical chunks: most lines stand alone, but a line
/// beginning `op` whose `=` is immediately followed by a newline (spec.md
/// §4.5 "multi-line: the `=` is followed immediately by a newline") pulls
/// in every following line up to and including the next blank line.
fn split_chunks(source: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut lines = source.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "op" || trimmed.starts_with("op ") {
            let mut chunk = String::from(line);
            if trimmed.trim_end().ends_with('=') {
                chunk.push('\n');
                while let Some(next) = lines.peek() {
                    if next.trim().is_empty() {
                        lines.next();
                        break;
                    }
                    chunk.push_str(next);
                    chunk.push('\n');
                    lines.next();
                }
            }
            chunks.push(chunk);
        } else {
            chunks.push(line.to_string());
        }
    }
    chunks
}

/// Parses and evaluates one logical chunk of source against `ctx`.
/// Returns the printable result of a `Line` item, if any.
fn eval_chunk(ctx: &mut Context, chunk: &str) -> IvyResult<Option<Value>> {
    let item = {
        let snapshot = OpSnapshot::full(ctx);
        let mut p = Parser::new(chunk, &ctx.cfg, &snapshot)?;
        p.next_item()?
    };
    match item {
        Item::Eof => Ok(None),
        Item::Line(line) => {
            let mut last = None;
            for stmt in &line.statements {
                last = Some(ctx.eval(stmt)?);
            }
            Ok(last)
        }
        Item::OpDef(def) => {
            run_op_def(ctx, def)?;
            Ok(None)
        }
        Item::Command(name, rest) => execute_command(ctx, &name, rest.trim()),
    }
}

fn run_op_def(ctx: &mut Context, def: OpDef) -> IvyResult<()> {
    ctx.define_op(def)
}

/// Runs an entire source text (a `)get`-loaded file) against `ctx`,
/// stopping at the first error (errors unwind, per spec.md §7).
pub fn run_source(ctx: &mut Context, source: &str) -> IvyResult<()> {
    for chunk in split_chunks(source) {
        eval_chunk(ctx, &chunk)?;
    }
    Ok(())
}

/// Evaluates a single expression (the `-e` CLI flag) and returns its value.
pub fn eval_expression(ctx: &mut Context, source: &str) -> IvyResult<Value> {
    let mut last = Value::Vector(vec![]);
    for chunk in split_chunks(source) {
        if let Some(v) = eval_chunk(ctx, &chunk)? {
            last = v;
        }
    }
    Ok(last)
}

/// `)`-command dispatch: bare numeric/string settings round-trip through
/// `ConfigStore`; `)save`/`)get`/`)op`/`)help` have their own handling.
fn execute_command(ctx: &mut Context, name: &str, rest: &str) -> IvyResult<Option<Value>> {
    match name {
        "help" => Ok(Some(Value::Vector(help_text().chars().map(crate::value::Scalar::Char).collect()))),
        "base" => {
            if rest.is_empty() {
                let ibase = ctx.store.get("ibase").unwrap_or("10").to_string();
                return Ok(Some(string_value(&ibase)));
            }
            set_base(ctx, rest)?;
            Ok(None)
        }
        "ibase" | "obase" | "origin" | "prec" | "maxbits" | "maxdigits" | "maxstack" | "format" | "prompt" | "seed"
        | "debug" => {
            if rest.is_empty() {
                let v = ctx.store.get(name).unwrap_or("").to_string();
                return Ok(Some(string_value(&v)));
            }
            ctx.set_config_property(name, rest).map_err(|m| IvyError::name(m, crate::errors::Span::default()))?;
            Ok(None)
        }
        "op" => {
            if rest.is_empty() {
                Ok(Some(string_value(&ctx.definitions.join(" "))))
            } else {
                let mut out = String::new();
                if let Some(op) = ctx.user_unary_op(rest) {
                    out.push_str(&persist::op_signature(op));
                    out.push('\n');
                }
                if let Some(op) = ctx.user_binary_op(rest) {
                    out.push_str(&persist::op_signature(op));
                }
                Ok(Some(string_value(out.trim_end())))
            }
        }
        "save" => {
            persist::save(ctx, Path::new(rest))?;
            Ok(None)
        }
        "get" => {
            persist::get(ctx, Path::new(rest))?;
            Ok(None)
        }
        "demo" | "cpu" => Ok(Some(string_value(&format!("'){}' is not implemented", name)))),
        other => Err(IvyError::parse(format!("unknown command '){}'", other), crate::errors::Span::default())),
    }
}

fn string_value(s: &str) -> Value {
    Value::Vector(s.chars().map(crate::value::Scalar::Char).collect())
}

fn set_base(ctx: &mut Context, rest: &str) -> IvyResult<()> {
    let n: u32 = rest
        .parse()
        .map_err(|_| IvyError::domain(format!("invalid base '{}'", rest), crate::errors::Span::default()))?;
    if n != 0 && !(2..=36).contains(&n) {
        return Err(IvyError::domain("base must be 0 or in 2..36", crate::errors::Span::default()));
    }
    ctx.set_config_property("ibase", rest).map_err(|m| IvyError::name(m, crate::errors::Span::default()))?;
    ctx.set_config_property("obase", rest).map_err(|m| IvyError::name(m, crate::errors::Span::default()))?;
    Ok(())
}

fn help_text() -> String {
    "Ivy: an APL-derived array calculator.\n\
     Special commands: )help )base )ibase )obase )origin )prec )maxbits \
     )maxdigits )maxstack )format )prompt )seed )debug )op )save )get"
        .to_string()
}

/// The interactive loop: prompt, read one logical chunk, evaluate, print
/// the result or a positioned error, repeat until EOF. Unlike
/// `run_source`, an error here is caught, printed, and does not stop the
/// loop (spec.md §7: "discards the current Line and prompts again").
pub struct Repl {
    pub ctx: Context,
}

impl Repl {
    pub fn new() -> Self {
        Repl { ctx: Context::new() }
    }

    pub fn run_interactive<R: BufRead, W: Write>(&mut self, input: &mut R, out: &mut W) -> std::io::Result<i32> {
        let mut exit_code = 0;
        loop {
            if !self.ctx.cfg.prompt.is_empty() {
                write!(out, "{}", self.ctx.cfg.prompt)?;
                out.flush()?;
            }
            let Some(chunk) = read_chunk(input)? else {
                break;
            };
            if chunk.trim().is_empty() {
                continue;
            }
            match eval_chunk(&mut self.ctx, &chunk) {
                Ok(Some(value)) => {
                    let debug_types = self.ctx.cfg.debug_enabled("types");
                    if debug_types {
                        writeln!(out, "{}", value.type_name())?;
                    }
                    writeln!(out, "{}", value.display(&self.ctx.cfg))?;
                }
                Ok(None) => {}
                Err(e) => {
                    writeln!(out, "{}", e)?;
                    exit_code = 1;
                }
            }
        }
        Ok(exit_code)
    }

    /// Runs a whole file or stdin non-interactively, behaving like
    /// `run_interactive` but without prompts, exiting 1 on first uncaught
    /// error (spec.md §6: "Non-interactive runs exit with status 1 on
    /// first uncaught error").
    pub fn run_batch<W: Write>(&mut self, source: &str, out: &mut W) -> std::io::Result<i32> {
        for chunk in split_chunks(source) {
            match eval_chunk(&mut self.ctx, &chunk) {
                Ok(Some(value)) => {
                    if self.ctx.cfg.debug_enabled("types") {
                        writeln!(out, "{}", value.type_name())?;
                    }
                    writeln!(out, "{}", value.display(&self.ctx.cfg))?;
                }
                Ok(None) => {}
                Err(e) => {
                    writeln!(out, "{}", e)?;
                    return Ok(1);
                }
            }
        }
        Ok(0)
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads one logical chunk from `input`: a single line, or — when it opens
/// an `op ... =` multi-line body — every line up to and including the next
/// blank line. Returns `None` at EOF with nothing read.
fn read_chunk<R: BufRead>(input: &mut R) -> std::io::Result<Option<String>> {
    let mut first = String::new();
    if input.read_line(&mut first)? == 0 {
        return Ok(None);
    }
    let trimmed = first.trim_end();
    if (trimmed == "op" || trimmed.starts_with("op ")) && trimmed.trim_end().ends_with('=') {
        loop {
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            let is_blank = line.trim().is_empty();
            first.push_str(&line);
            if is_blank {
                break;
            }
        }
    }
    Ok(Some(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_split_on_blank_lines_after_multiline_op() {
        let src = "op double n =\nn*2\n\ndouble 5\n";
        let chunks = split_chunks(src);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("op double n ="));
        assert_eq!(chunks[1], "double 5");
    }

    #[test]
    fn eval_expression_returns_final_value() {
        let mut ctx = Context::new();
        let v = eval_expression(&mut ctx, "2+2").unwrap();
        assert_eq!(v, Value::int(4));
    }

    #[test]
    fn batch_mode_stops_on_first_error() {
        let mut repl = Repl::new();
        let mut out = Vec::new();
        let code = repl.run_batch("1 + \"x\"\n2+2\n", &mut out).unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn command_sets_and_reads_back_origin() {
        let mut ctx = Context::new();
        eval_chunk(&mut ctx, ")origin 0").unwrap();
        assert_eq!(ctx.cfg.origin, 0);
    }
}
