//! Ivy — an interactive calculator/interpreter for an APL-derived array
//! language.
//!
//! Module layout:
//!   - conf        — process-wide evaluation settings (`Config`/`ConfigStore`)
//!   - errors      — `Span`-carrying `IvyError`, rendered via `miette`
//!   - value       — the `Value`/`Scalar` tagged union, promotion, printing
//!   - ops         — scalar primitives + rank-polymorphic array adapters
//!   - combinators — reduce/scan (both axes), inner/outer product, each
//!   - ast         — span-carrying expression tree
//!   - lexer       — configuration-sensitive Scanner
//!   - parser      — right-to-left, single-precedence Parser
//!   - runtime     — `Context`: globals, call frames, dispatch, user ops
//!   - persist     — `)save`/`)get` workspace file format
//!   - repl        — the line-at-a-time REPL loop

pub mod ast;
pub mod combinators;
pub mod conf;
pub mod errors;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod persist;
pub mod repl;
pub mod runtime;
pub mod value;

pub use conf::Config;
pub use errors::{IvyError, IvyResult, Span};
pub use parser::Parser;
pub use repl::Repl;
pub use runtime::Context;
pub use value::{Scalar, Value};
