use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "kassabok", version, about = "Bank-export import and categorization")]
struct Cli {
    /// SQLite database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Extra bank-profile JSON files merged over the built-in base profile
    #[arg(long = "profile", global = true)]
    profiles: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect layout and schema for pasted export text; commits nothing
    Preview {
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Parse and commit an export, then auto-categorize the new rows
    Import {
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,

        /// Manual schema JSON (column indices) bypassing detection
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Skip the auto-categorization pass after committing
        #[arg(long)]
        no_auto_categorize: bool,
    },

    /// Set a category on transactions by id; teaches their signatures
    Categorize {
        /// Transaction ids
        #[arg(long, required = true, num_args = 1..)]
        ids: Vec<i64>,

        /// Category key, e.g. "groceries"
        #[arg(long)]
        category: String,
    },

    /// List the most recent transactions
    List {
        #[arg(long, default_value_t = 25)]
        limit: i64,
    },

    /// Signature maintenance
    Signatures {
        #[command(subcommand)]
        command: SignatureCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SignatureCommand {
    /// Delete auto-sourced, note-less signatures with no linked transactions
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kassabok=info,warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(&cli.profiles)?;

    match cli.command {
        Command::Preview { file } => {
            let raw = read_input(file.as_deref())?;
            commands::preview(&cli.db, &config, &raw).await?;
        }
        Command::Import {
            file,
            schema,
            no_auto_categorize,
        } => {
            let raw = read_input(file.as_deref())?;
            let manual = schema
                .map(|path| commands::load_manual_schema(&path))
                .transpose()?;
            commands::import(&cli.db, &config, &raw, manual.as_ref(), !no_auto_categorize).await?;
        }
        Command::Categorize { ids, category } => {
            commands::categorize(&cli.db, &ids, &category).await?;
        }
        Command::List { limit } => {
            commands::list(&cli.db, limit).await?;
        }
        Command::Signatures { command } => match command {
            SignatureCommand::Cleanup => {
                commands::cleanup_signatures(&cli.db).await?;
            }
        },
    }

    Ok(())
}

fn read_input(file: Option<&std::path::Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            use std::io::Read;
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading stdin")?;
            Ok(buffer)
        }
    }
}
