//! Native-target driver (spec.md §6 CLI shape): `xcc [-o OUTPUT] [-S]
//! [-Idir…] [--target=ARCH] INPUT…`.
//!
//! Argument parsing and process exit codes live here; every compile
//! decision is made by `xcc_codegen`, so the library stays independently
//! testable without a process boundary.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use xcc_codegen::ast::TopLevel;
use xcc_codegen::context::CompilerContext;
use xcc_codegen::isa;
use xcc_codegen::settings::{AsmSyntax, Flags, OptLevel, Target};

/// Compiles a type-checked C translation unit (given as JSON, standing in
/// for the external front-end's in-memory AST) to native assembly.
#[derive(Parser, Debug)]
#[command(name = "xcc", version, about)]
struct Args {
    /// Input translation units, each a JSON-encoded `Vec<TopLevel>`.
    inputs: Vec<PathBuf>,

    /// Output file; defaults to stdout.
    #[arg(short = 'o', value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Emit assembly (the only output this back-end produces; accepted
    /// for CLI-shape parity with a driver that can also stop at an
    /// object file).
    #[arg(short = 'S')]
    assembly_only: bool,

    /// Header search paths, forwarded opaquely — this crate never opens
    /// them, since the front-end that would need them is out of scope.
    #[arg(short = 'I', value_name = "dir")]
    include_dirs: Vec<String>,

    /// Target architecture: x86_64, aarch64, or riscv64.
    #[arg(long = "target", default_value = "x86_64")]
    target: String,

    /// Enable the peephole-level "speed" optimization tier (spec.md §2
    /// ambient note; no SSA optimizer).
    #[arg(short = 'O', long)]
    opt_speed: bool,

    /// Emit position-independent data addressing.
    #[arg(long)]
    pic: bool,
}

fn parse_target(name: &str) -> Result<Target> {
    match name {
        "x86_64" | "x86-64" => Ok(Target::X86_64),
        "aarch64" | "arm64" => Ok(Target::Aarch64),
        "riscv64" | "riscv64gc" => Ok(Target::Riscv64),
        other => bail!("unrecognized --target `{other}` (expected x86_64, aarch64, or riscv64)"),
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let _ = args.assembly_only; // this back-end only ever produces assembly text

    let target = parse_target(&args.target)?;
    let mut flags = Flags::new(target);
    flags.include_dirs = args.include_dirs;
    flags.pic = args.pic;
    if args.opt_speed {
        flags.opt_level = OptLevel::Speed;
    }
    if cfg!(target_os = "macos") {
        flags.asm_syntax = AsmSyntax::Apple;
    }

    let isa = isa::make_isa(&flags).context("no native back-end for the selected target")?;

    if args.inputs.is_empty() {
        bail!("no input files");
    }

    let mut assembly = String::new();
    for input in &args.inputs {
        let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
        let decls: Vec<TopLevel> =
            serde_json::from_str(&text).with_context(|| format!("parsing AST from {}", input.display()))?;

        let mut ctx = CompilerContext::new(flags.clone());
        let unit_asm = xcc_codegen::compile_native(&mut ctx, &decls, isa.as_ref())
            .with_context(|| format!("compiling {}", input.display()))?;
        report_diagnostics(&ctx, input);
        if ctx.should_abort_frontend() {
            bail!("too many errors in {}", input.display());
        }
        assembly.push_str(&unit_asm);
    }

    match args.output {
        Some(path) => fs::write(&path, assembly).with_context(|| format!("writing {}", path.display()))?,
        None => print!("{assembly}"),
    }
    Ok(())
}

fn report_diagnostics(ctx: &CompilerContext, input: &std::path::Path) {
    for diag in &ctx.diagnostics {
        log::warn!("{}: {diag}", input.display());
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("xcc: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
