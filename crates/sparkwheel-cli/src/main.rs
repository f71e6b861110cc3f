//! Sparkwheel CLI - resolve, check, and diff configurations.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sparkwheel::{Config, Settings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sparkwheel")]
#[command(version)]
#[command(about = "Declarative configuration engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a config id and print the value
    Resolve {
        /// Config file(s), merged in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Id to resolve (defaults to the whole config)
        #[arg(long, default_value = "")]
        id: String,

        /// Override strings ([~|=]key=value)
        #[arg(short = 's', long = "set")]
        overrides: Vec<String>,

        /// Skip component instantiation
        #[arg(long)]
        raw: bool,

        /// Print JSON instead of the flow-style rendering
        #[arg(long)]
        json: bool,
    },

    /// Print the raw (unresolved) value at an id
    Get {
        /// Config file(s), merged in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Id to read
        #[arg(long, default_value = "")]
        id: String,
    },

    /// Check a configuration for unresolvable references and cycles
    Check {
        /// Config file(s), merged in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two configurations
    Diff {
        /// First config file
        a: PathBuf,

        /// Second config file
        b: PathBuf,

        /// Output format (tree, unified, json)
        #[arg(long, default_value = "tree")]
        format: String,

        /// Leaf keys to ignore
        #[arg(long)]
        ignore: Vec<String>,
    },

    /// List all config ids, grouped by section
    Ids {
        /// Config file(s), merged in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sparkwheel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<sparkwheel::Error>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Resolve {
            files,
            id,
            overrides,
            raw,
            json,
        } => {
            let mut config = load(files)?;
            config.apply_overrides(&overrides)?;
            let value = if raw {
                config.resolve_raw(&id)?
            } else {
                config.resolve(&id)?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&value.to_json_lossy())?);
            } else {
                println!("{value}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Get { files, id } => {
            let config = load(files)?;
            match config.get(&id) {
                Some(node) => {
                    println!("{node}");
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("error: id `{id}` not found");
                    Ok(ExitCode::from(2))
                }
            }
        }

        Commands::Check {
            files,
            strict,
            json,
        } => {
            let mut config = load(files)?;
            let report = config.check(strict)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for warning in &report.warnings {
                    println!("warning: {warning}");
                }
                for error in &report.errors {
                    println!("error: {error}");
                }
                println!("{}", report.summary());
            }
            if report.is_valid() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }

        Commands::Diff {
            a,
            b,
            format,
            ignore,
        } => {
            let first = load(vec![a])?;
            let second = load(vec![b])?;
            let diff = sparkwheel::diff_configs(first.tree(), second.tree(), &ignore);
            let rendered = match format.as_str() {
                "tree" => sparkwheel::format_tree(&diff),
                "unified" => sparkwheel::format_unified(&diff),
                "json" => sparkwheel::format_json(&diff),
                other => anyhow::bail!("unknown diff format `{other}` (expected tree, unified, or json)"),
            };
            print!("{rendered}");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Ids { files } => {
            let mut config = load(files)?;
            for (section, ids) in config.keys_by_section()? {
                println!("{section}:");
                for id in ids {
                    println!("  {id}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load(files: Vec<PathBuf>) -> Result<Config> {
    Ok(Config::load_with(files, Settings::from_env())?)
}
