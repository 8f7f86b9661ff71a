//! WebAssembly driver (spec.md §6 CLI shape): `wcc -eEXPORT[,EXPORT…]
//! [-o OUT.wasm] [--stack-size=N] [--verbose] INPUT…`.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use xcc_codegen::ast::TopLevel;
use xcc_codegen::context::CompilerContext;
use xcc_codegen::isa::wasm;
use xcc_codegen::settings::{Flags, Target};

#[derive(Parser, Debug)]
#[command(name = "wcc", version, about)]
struct Args {
    /// Input translation units, each a JSON-encoded `Vec<TopLevel>`.
    inputs: Vec<PathBuf>,

    /// Output file; defaults to `a.wasm`.
    #[arg(short = 'o', value_name = "OUT.wasm")]
    output: Option<PathBuf>,

    /// Comma-separated function names to export. Omit to export every
    /// non-static function (this back-end's default).
    #[arg(short = 'e', value_delimiter = ',')]
    exports: Vec<String>,

    /// Linear memory reserved for the shadow stack, in bytes. Accepted
    /// for CLI-shape parity; this back-end has no shadow stack (every
    /// addressable value gets a fixed compile-time offset), so it is
    /// unused.
    #[arg(long = "stack-size", value_name = "N")]
    stack_size: Option<u32>,

    #[arg(long)]
    verbose: bool,
}

fn run() -> Result<()> {
    let args = Args::parse();
    if let Some(n) = args.stack_size {
        log::debug!("--stack-size={n} accepted but unused by this back-end");
    }

    if args.inputs.is_empty() {
        bail!("no input files");
    }

    let flags = Flags::new(Target::Wasm32);
    let mut decls: Vec<TopLevel> = Vec::new();
    let mut ctx = CompilerContext::new(flags);

    for input in &args.inputs {
        let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
        let mut unit: Vec<TopLevel> =
            serde_json::from_str(&text).with_context(|| format!("parsing AST from {}", input.display()))?;
        decls.append(&mut unit);
    }

    for decl in &decls {
        if let TopLevel::Variable(var) = decl {
            ctx.global_scope.insert(var.clone());
        }
    }

    let exports = if args.exports.is_empty() { None } else { Some(args.exports.as_slice()) };
    let module = wasm::compile_module(&mut ctx, &decls, exports);

    for diag in &ctx.diagnostics {
        log::warn!("{diag}");
        if args.verbose {
            eprintln!("wcc: {diag}");
        }
    }
    if ctx.should_abort_frontend() {
        bail!("too many errors");
    }

    let output = args.output.unwrap_or_else(|| PathBuf::from("a.wasm"));
    fs::write(&output, module).with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("wcc: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
