mod report;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use emmy_ty::LuaSettings;
use report::{FileReport, KeyReport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

#[derive(Parser)]
#[command(
    name = "emmy-check",
    about = "Infer and print the types of top-level declarations in Lua files"
)]
struct Cli {
    /// Lua files or directories to analyze
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// JSON settings file
    #[arg(short, long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    format: Format,

    /// Dump the symbol index keys
    #[arg(short, long)]
    keys: bool,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EMMY_LOG").unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.settings {
        Some(path) => LuaSettings::load(path).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), error = %err, "failed to load settings, using defaults");
            LuaSettings::default()
        }),
        None => LuaSettings::default(),
    };

    let project = report::load_project(&cli.paths, settings)?;
    let files = report::project_reports(&project);
    let keys = if cli.keys {
        report::key_reports(&project)
    } else {
        Vec::new()
    };

    match cli.format {
        Format::Json => display_json(&files, &keys)?,
        Format::Pretty => display_pretty(&files, &keys, cli.verbose),
    }

    if files.iter().any(|f| !f.diagnostics.is_empty()) {
        std::process::exit(1);
    }

    Ok(())
}

fn display_pretty(files: &[FileReport], keys: &[KeyReport], verbose: bool) {
    println!("\n{}", "Inferring Lua types...".bold().cyan());
    println!("{}", "=".repeat(60).cyan());

    for file in files {
        println!(
            "\n{} {}",
            file.path.display().to_string().bright_white().bold(),
            format!("({})", file.module).dimmed()
        );

        for decl in &file.declarations {
            let ty = match &decl.ty {
                Some(ty) => ty.green(),
                None => "?".yellow(),
            };
            if verbose {
                println!("  {} {}: {}", format!("{:>4}", decl.line).dimmed(), decl.name.cyan(), ty);
            } else {
                println!("  {}: {}", decl.name.cyan(), ty);
            }
        }

        if let Some(returns) = &file.returns {
            println!("  {} {}", "returns".bold(), returns.green());
        }

        for diagnostic in &file.diagnostics {
            println!(
                "  {} {}:{}: {}",
                "error:".red().bold(),
                diagnostic.line.to_string().yellow(),
                diagnostic.column.to_string().yellow(),
                diagnostic.message.white()
            );
        }
    }

    if !keys.is_empty() {
        println!("\n{}", "Index Keys:".bold().cyan());
        println!("{}", "-".repeat(60).cyan());
        for key in keys {
            println!("  {} {}", format!("{}:", key.key).bold(), key.names.len());
            for name in &key.names {
                println!("    {} {}", "→".dimmed(), name);
            }
        }
    }

    let declarations: usize = files.iter().map(|f| f.declarations.len()).sum();
    let unresolved = files
        .iter()
        .flat_map(|f| &f.declarations)
        .filter(|d| d.ty.is_none())
        .count();
    println!(
        "\n{} {} files, {} declarations, {} unresolved",
        "✓".green().bold(),
        files.len(),
        declarations,
        unresolved
    );
}

fn display_json(files: &[FileReport], keys: &[KeyReport]) -> Result<()> {
    use serde_json::json;

    let mut result = json!({
        "files": files,
        "file_count": files.len(),
    });
    if !keys.is_empty() {
        result["keys"] = json!(keys);
    }

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
