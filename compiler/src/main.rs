use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use arcc::analyze::{self, Compilation};
use arcc::error::CliError;
use arcc::logging::{self, LogLevel};
use arcc::symbol::{Resolver, ScopeId, ScopeTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// IR as a tree
    Ir,
    /// IR as JSON
    Json,
    /// Scope tree with resolved types
    Symbols,
    /// Parsed AST
    Ast,
}

#[derive(Parser, Debug)]
#[command(
    name = "arcc",
    version,
    about = "Arc compiler front end: checks .arc programs and emits their dataflow IR"
)]
struct Cli {
    /// Input .arc source file
    source: PathBuf,

    /// JSON manifest of external channels
    #[arg(long)]
    channels: Option<PathBuf>,

    /// What to emit on success
    #[arg(long, value_enum, default_value_t = EmitStage::Ir)]
    emit: EmitStage,

    /// Write output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level, cli.log_json);
    if let Err(err) = run(&cli) {
        if !matches!(err, CliError::Compile(_)) {
            eprintln!("arcc: error: {err}");
        }
        std::process::exit(err.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let resolver: Option<Arc<dyn Resolver>> = match &cli.channels {
        Some(path) => {
            let resolver = arcc::manifest::load(path)?;
            if cli.verbose {
                eprintln!("arcc: {} channels from {}", resolver.len(), path.display());
            }
            Some(Arc::new(resolver))
        }
        None => None,
    };

    let source = std::fs::read_to_string(&cli.source).map_err(|source| CliError::Io {
        path: cli.source.clone(),
        source,
    })?;

    let compilation = analyze::compile(&source, resolver);
    if cli.verbose {
        for (phase, elapsed) in &compilation.timings {
            eprintln!(
                "arcc: {phase} complete, {:.1}ms",
                elapsed.as_secs_f64() * 1000.0
            );
        }
    }

    for diag in &compilation.diagnostics {
        let (line, col) = analyze::position(&source, diag.span);
        eprintln!("{}:{line}:{col}: {diag}", cli.source.display());
    }
    let errors = compilation.diagnostics.errors().count();
    if errors > 0 {
        return Err(CliError::Compile(errors));
    }

    let text = render(cli.emit, &compilation)?;
    match &cli.output {
        Some(path) => write_file(path, &text),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn render(emit: EmitStage, compilation: &Compilation) -> Result<String, CliError> {
    let text = match emit {
        EmitStage::Ir => compilation
            .ir
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        EmitStage::Json => match &compilation.ir {
            Some(ir) => serde_json::to_string_pretty(ir)? + "\n",
            None => String::new(),
        },
        EmitStage::Symbols => compilation
            .analysis
            .as_ref()
            .map(|a| symbols(&a.scopes))
            .unwrap_or_default(),
        EmitStage::Ast => compilation
            .program
            .as_ref()
            .map(|p| format!("{p:#?}\n"))
            .unwrap_or_default(),
    };
    Ok(text)
}

fn symbols(scopes: &ScopeTree) -> String {
    fn walk(out: &mut String, scopes: &ScopeTree, id: ScopeId, depth: usize) {
        for child in scopes.children(id) {
            let indent = "  ".repeat(depth);
            let symbol = &child.symbol;
            if symbol.is_named() {
                let _ = writeln!(out, "{indent}{} {}: {}", symbol.kind, symbol.name, symbol.ty);
            } else {
                let _ = writeln!(out, "{indent}{}", symbol.kind);
            }
            walk(out, scopes, child.id, depth + 1);
        }
    }
    let mut out = String::new();
    walk(&mut out, scopes, scopes.root(), 0);
    out
}

fn write_file(path: &Path, text: &str) -> Result<(), CliError> {
    std::fs::write(path, text).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}
