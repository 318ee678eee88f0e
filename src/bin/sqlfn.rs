//! sqlfn: inspect and run annotated SQL statements.
//!
//! # Usage
//!
//! ```bash
//! # List every statement in a directory
//! sqlfn check sql/users
//!
//! # Show the SQL of one statement
//! sqlfn show user_for_id sql/users
//!
//! # Run a statement
//! sqlfn run user_for_id sql/users -p user_id=42 --database-url sqlite://app.db
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use sqlfn::prelude::*;
use sqlfn::{Params, RawResult};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlfn")]
#[command(version)]
#[command(about = "Annotated SQL files as named statements", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlfn check sql/users
    sqlfn show find_by_usernames sql/users
    sqlfn run find_by_usernames sql/users -p 'usernames=[oscar,dottie]'")]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true, env = "SQLFN_DATABASE_URL")]
    database_url: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Read files as Latin-1 instead of UTF-8
    #[arg(long, global = true)]
    latin1: bool,

    /// Leave out the generated header comment
    #[arg(long, global = true)]
    no_header: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load directories and list their statements
    Check {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Show one statement and its SQL
    Show {
        name: String,
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Execute one statement
    Run {
        name: String,
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
        /// Named parameter, `key=value`; `key=[a,b]` binds a list
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SQLFN_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if cli.latin1 {
        config.loader.encoding = Encoding::Latin1;
    }
    if cli.no_header {
        config.loader.header_comments = false;
    }
    if cli.database_url.is_some() {
        config.database.url = cli.database_url.clone();
    }

    match &cli.command {
        Commands::Check { dirs } => check(dirs, &config),
        Commands::Show { name, dirs } => show(name, dirs, &config),
        Commands::Run { name, dirs, params } => {
            execute(name, dirs, params, &config, cli.format).await
        }
    }
}

fn check(dirs: &[PathBuf], config: &Config) -> Result<()> {
    let module = Module::load_with(dirs, &config.loader)?;
    for statement in module.statements() {
        let file = statement
            .filename()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("  {} {}", statement.to_string().white(), file.dimmed());
    }
    println!();
    println!(
        "{} {} statement(s) loaded",
        "✓".green(),
        module.len().to_string().cyan()
    );
    Ok(())
}

fn show(name: &str, dirs: &[PathBuf], config: &Config) -> Result<()> {
    let module = Module::load_with(dirs, &config.loader)?;
    let statement = module.statement(name)?;

    println!("{} {}", "Statement:".dimmed(), statement.to_string().cyan());
    if let Some(file) = statement.filename() {
        println!("{} {}", "File:".dimmed(), file.display());
    }
    if let Some(doc) = statement.doc() {
        println!("{} {}", "Doc:".dimmed(), doc);
    }
    println!();
    println!("{}", statement.sql().white());
    Ok(())
}

async fn execute(
    name: &str,
    dirs: &[PathBuf],
    params: &[String],
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let module = Module::load_with(dirs, &config.loader)?;
    let url = config
        .database
        .url
        .as_deref()
        .context("No database URL. Use --database-url or set SQLFN_DATABASE_URL")?;
    module.connect_with(url, &config.database).await?;

    let args = parse_params(params)?;
    let output = module.call(name, Args::from(args)).await?;
    print_output(output, format);
    Ok(())
}

fn parse_params(params: &[String]) -> Result<Params> {
    params
        .iter()
        .map(|param| {
            let (key, value) = param
                .split_once('=')
                .with_context(|| format!("expected key=value, got '{}'", param))?;
            Ok((key.trim().to_string(), parse_value(value.trim())))
        })
        .collect()
}

/// Numbers, booleans and `null` are typed; `[a,b]` is a list.
fn parse_value(raw: &str) -> Value {
    if let Some(items) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return Value::list(
            items
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(parse_value),
        );
    }
    if let Ok(n) = raw.parse::<i64>() {
        Value::Int(n)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else if raw == "true" || raw == "false" {
        Value::Bool(raw == "true")
    } else if raw == "null" {
        Value::Null
    } else {
        Value::from(raw)
    }
}

fn print_output(output: Output, format: OutputFormat) {
    match output {
        Output::Row(row) => print_rows(row.into_iter().collect(), format),
        Output::Rows(rows) => print_rows(rows.collect(), format),
        Output::Affected(n) => match format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "rows_affected": n })),
            OutputFormat::Table => println!("{} {} rows affected", "✓".green(), n),
        },
        Output::Scalar(value) => {
            let value = value.unwrap_or(Value::Null);
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string(&value).unwrap_or_default())
                }
                OutputFormat::Table => println!("{}", value),
            }
        }
        Output::Raw(raw) => print_raw(raw, format),
    }
}

fn print_raw(raw: RawResult, format: OutputFormat) {
    let affected = raw.rows_affected;
    if raw.columns.is_empty() {
        return print_output(Output::Affected(affected), format);
    }
    print_rows(ResultKind::Rows.transform(raw).into_rows().into_iter().flatten().collect(), format);
}

fn print_rows(rows: Vec<Row>, format: OutputFormat) {
    if let OutputFormat::Json = format {
        let json: Vec<serde_json::Value> = rows.iter().map(Row::to_json).collect();
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }

    let Some(first) = rows.first() else {
        println!("{}", "(no results)".dimmed());
        return;
    };

    let columns = first.columns();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.values().iter().map(ToString::to_string).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:width$}", c, width = w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:width$}", cell, width = w))
            .collect();
        println!("{}", line.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", rows.len().to_string().cyan());
}
