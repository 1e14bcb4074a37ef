//! The Vellum Command-Line Interface.
//!
//! `vellum render` prints a rendered template; `vellum check` only compiles
//! it. Failures print as miette reports on stderr and exit with status 1.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use miette::Report;

use crate::cache::FileLoader;
use crate::cli::args::{Command, EngineArgs, VellumArgs};
use crate::config::EngineConfig;
use crate::diagnostics::TemplateError;
use crate::engine::Engine;
use crate::err_msg;
use crate::runtime::{Context, IoSink};

pub mod args;

/// The main entry point for the CLI.
pub fn run() {
    let args = VellumArgs::parse();
    setup_logging(args.verbose);

    let result = match &args.command {
        Command::Render {
            template,
            context,
            strict,
        } => handle_render(template, context.as_deref(), *strict, &args.engine),
        Command::Check { template } => handle_check(template, &args.engine),
    };

    if let Err(e) = result {
        eprintln!("{:?}", Report::new(e));
        process::exit(1);
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

/// Builds an engine from the config file and `--root` directories.
fn build_engine(args: &EngineArgs, strict: bool) -> Result<Engine, TemplateError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if strict {
        config.strict_references = true;
    }
    let mut builder = Engine::builder(config);
    if !args.roots.is_empty() {
        builder = builder.loader(Arc::new(FileLoader::new(args.roots.iter().cloned())));
    }
    builder.build()
}

/// Handles the `render` subcommand.
fn handle_render(
    template: &str,
    context: Option<&std::path::Path>,
    strict: bool,
    args: &EngineArgs,
) -> Result<(), TemplateError> {
    let engine = build_engine(args, strict)?;
    let mut ctx = match context {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| err_msg!(Io, "cannot read {}: {}", path.display(), e))?;
            let json = serde_json::from_str(&text)
                .map_err(|e| err_msg!(Config, "invalid JSON in {}: {}", path.display(), e))?;
            Context::from_json(json)?
        }
        None => Context::new(),
    };

    let stdout = io::stdout();
    let mut sink = IoSink(stdout.lock());
    let rendered = engine.render_to(template, &mut ctx, &mut sink);
    sink.0
        .flush()
        .map_err(|e| err_msg!(Io, "cannot flush output: {}", e))?;
    rendered
}

/// Handles the `check` subcommand.
fn handle_check(template: &str, args: &EngineArgs) -> Result<(), TemplateError> {
    let engine = build_engine(args, false)?;
    let compiled = engine.template(template)?;
    println!(
        "{}: ok ({} macro{})",
        compiled.name(),
        compiled.macros().len(),
        if compiled.macros().len() == 1 { "" } else { "s" }
    );
    Ok(())
}
