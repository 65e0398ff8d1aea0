/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `vtl` - render Velocity templates from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quarto_vtl::{Context, Engine, FileResourceLoader, RuntimeConfig, Value};

#[derive(Parser, Debug)]
#[command(name = "vtl")]
#[command(about = "Render Velocity templates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a template to stdout
    Render {
        /// Template name, resolved against the template path
        template: String,

        /// JSON file whose top-level object becomes the context
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Template directory (can be specified multiple times)
        #[arg(short, long = "path", value_name = "DIR")]
        paths: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarto_vtl=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Render {
            template,
            context,
            config,
            paths,
        } => render(&template, context, config, paths),
    }
}

fn render(
    template: &str,
    context: Option<PathBuf>,
    config: Option<PathBuf>,
    paths: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => RuntimeConfig::from_file(&path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if !paths.is_empty() {
        config.file_resource_loader_path = paths;
    }

    let loader = FileResourceLoader::from_config(&config);
    let engine = Engine::builder()
        .config(config)
        .loader(Arc::new(loader))
        .build()?;

    let mut ctx = Context::new();
    if let Some(path) = context {
        load_context(&mut ctx, &path)?;
    }

    let output = engine
        .merge_template(template, &mut ctx)
        .with_context(|| format!("rendering {template}"))?;
    print!("{output}");
    Ok(())
}

fn load_context(ctx: &mut Context, path: &PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading context {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing context {}", path.display()))?;
    let Some(Value::Map(map)) = Value::from_json(&json) else {
        anyhow::bail!("context file {} must hold a JSON object", path.display());
    };
    for (key, value) in map.read().iter() {
        ctx.put(key.clone(), value.clone());
    }
    Ok(())
}
