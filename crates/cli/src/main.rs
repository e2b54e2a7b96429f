//! `clockwork` — the entry-point driver for the Clockwork scripting
//! language: argument parsing, the REPL line loop, and batch file
//! execution. Per spec.md §6, this is the one "external collaborator"
//! that talks to the core through `Vm::interpret` and nothing else.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

use clockwork_vm::{InterpretResult, Vm};
use tracing::{debug, info};

/// clox's sysexits.h convention (spec.md §8 AMBIENT note): a compile
/// error exits 65 (`EX_DATAERR`), a runtime error exits 70
/// (`EX_SOFTWARE`). `spec.md` §6 only promises "nonzero"; these are the
/// specific nonzero codes this implementation uses.
const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.len() {
        1 => {
            info!("starting REPL");
            repl();
            ExitCode::SUCCESS
        }
        2 => run_file(Path::new(&args[1])),
        _ => {
            eprintln!("Usage: clockwork <path>");
            ExitCode::SUCCESS
        }
    }
}

/// Prompt `"> "`, read one line at a time from stdin, interpret it, and
/// discard the result — the same `Vm` persists across lines so a global
/// declared on one line is visible on the next (spec.md §6).
fn repl() {
    let mut vm = Vm::new();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return;
        }
        line.clear();
        // "up to 1023 bytes + NUL" (spec.md §6) describes a fixed C
        // buffer; `read_line` has no such cap, which is an equivalent
        // generalization for a growable Rust string.
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return, // EOF
            Ok(_) => {
                vm.interpret(&line);
            }
            Err(_) => return,
        }
    }
}

/// Read `path` fully into memory, interpret it once, and map the result
/// to an exit code (spec.md §6/§8).
fn run_file(path: &Path) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Could not read file \"{}\": {}", path.display(), e);
            return ExitCode::from(EX_SOFTWARE);
        }
    };
    debug!(path = %path.display(), bytes = source.len(), "running script");

    let mut vm = Vm::new();
    match vm.interpret(&source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError(errors) => {
            for error in &errors {
                eprintln!("{error}");
            }
            ExitCode::from(EX_DATAERR)
        }
        InterpretResult::RuntimeError(error) => {
            eprintln!("{error}");
            ExitCode::from(EX_SOFTWARE)
        }
    }
}
