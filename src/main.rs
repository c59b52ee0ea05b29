//! Ivy CLI: flag parsing, worker-thread stack sizing, exit codes.
//!
//! Grounded on the teacher's `main.rs` (`Cli` deriving `clap::Parser`, a
//! `STACK_SIZE` constant plus `std::thread::Builder::new().stack_size(..)`
//! worker thread, top-level `miette::Result`): a tree-walking, strictly
//! right-to-left evaluator recurses once per nested expression and per
//! user-op call frame, so the same enlarged-stack precaution applies here.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::Parser as ClapParser;
use ivy::repl::Repl;

// 64 MB stack, same budget the teacher reserves for its own deeply
// recursive programs.
const STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(ClapParser)]
#[command(name = "ivy", version, about = "An interactive calculator/interpreter for an APL-derived array language")]
struct Cli {
    /// Evaluate ARG as an expression and exit instead of reading input.
    #[arg(short = 'e', value_name = "EXPR")]
    eval: Option<String>,

    /// printf-style number format overriding base-driven printing.
    #[arg(long = "format", value_name = "SPEC")]
    format: Option<String>,

    /// Shorthand for `--format "%.12g"`.
    #[arg(short = 'g')]
    g: bool,

    /// Index of the first element of a vector (0 or 1).
    #[arg(long = "origin", value_name = "N")]
    origin: Option<u32>,

    /// REPL prompt string.
    #[arg(long = "prompt", value_name = "STR")]
    prompt: Option<String>,

    /// Maximum bit width of an integer result before an overflow error.
    #[arg(long = "maxbits", value_name = "N")]
    maxbits: Option<u64>,

    /// Maximum decimal digit count before floating-format printing.
    #[arg(long = "maxdigits", value_name = "N")]
    maxdigits: Option<u64>,

    /// Comma list of debug trace flags (e.g. "types").
    #[arg(long = "debug", value_name = "FLAGS")]
    debug: Option<String>,

    /// Source files to run; `-` reads stdin. With none given and no `-e`,
    /// starts an interactive session on stdin/stdout.
    files: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let result = std::thread::Builder::new()
        .name("ivy-worker".into())
        .stack_size(STACK_SIZE)
        .spawn(move || std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(cli))))
        .expect("failed to spawn ivy worker thread")
        .join();

    let code = match result {
        Ok(Ok(code)) => code,
        Ok(Err(payload)) | Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unexpected panic in ivy runtime".to_string()
            };
            eprintln!("ivy: internal error: {}", msg);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> i32 {
    let mut repl = Repl::new();

    if let Some(format) = cli.format.or(cli.g.then(|| "%.12g".to_string())) {
        let _ = repl.ctx.set_config_property("format", &format);
    }
    if let Some(origin) = cli.origin {
        let _ = repl.ctx.set_config_property("origin", &origin.to_string());
    }
    if let Some(prompt) = cli.prompt {
        let _ = repl.ctx.set_config_property("prompt", &prompt);
    }
    if let Some(maxbits) = cli.maxbits {
        let _ = repl.ctx.set_config_property("maxbits", &maxbits.to_string());
    }
    if let Some(maxdigits) = cli.maxdigits {
        let _ = repl.ctx.set_config_property("maxdigits", &maxdigits.to_string());
    }
    if let Some(debug) = cli.debug {
        let _ = repl.ctx.set_config_property("debug", &debug);
    }

    if let Some(expr) = cli.eval {
        return match ivy::repl::eval_expression(&mut repl.ctx, &expr) {
            Ok(value) => {
                println!("{}", value.display(&repl.ctx.cfg));
                0
            }
            Err(e) => {
                eprintln!("{}", e);
                1
            }
        };
    }

    if cli.files.is_empty() {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut input = stdin.lock();
        let mut out = stdout.lock();
        if stdin.is_terminal() {
            return repl.run_interactive(&mut input, &mut out).unwrap_or_else(|e| {
                eprintln!("ivy: {}", e);
                1
            });
        }
        let mut source = String::new();
        if let Err(e) = input.read_to_string(&mut source) {
            eprintln!("ivy: {}", e);
            return 1;
        }
        return repl.run_batch(&source, &mut out).unwrap_or_else(|e| {
            eprintln!("ivy: {}", e);
            1
        });
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for path in &cli.files {
        let source = if path.as_os_str() == "-" {
            let mut s = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut s) {
                eprintln!("ivy: cannot read stdin: {}", e);
                return 1;
            }
            s
        } else {
            match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("ivy: cannot read '{}': {}", path.display(), e);
                    return 1;
                }
            }
        };
        match repl.run_batch(&source, &mut out) {
            Ok(0) => {}
            Ok(code) => return code,
            Err(e) => {
                eprintln!("ivy: {}", e);
                return 1;
            }
        }
    }
    let _ = out.flush();
    0
}
