mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sightline-cli",
    about = "Index PDFs, text and images, then ask questions about them",
    version
)]
struct Cli {
    /// Use a specific config file (default: the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the knowledge base with a PDF's text and images
    Index {
        /// Path to the PDF
        pdf: PathBuf,
    },

    /// Replace the knowledge base with a plain text file ("-" reads stdin)
    IndexText {
        file: String,
    },

    /// Replace the knowledge base with a single image
    IndexImage {
        /// Path to a PNG, JPEG or other raster image
        file: PathBuf,
    },

    /// Show the fragments nearest to a query
    Search {
        query: String,
        /// Number of results (default: configured top-k)
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a question from the indexed content
    Ask {
        question: String,
        /// Number of fragments to retrieve (default: configured top-k)
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show knowledge base statistics
    Stats,

    /// Remove every fragment and image
    Clear,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    let app = app::App::new(cli.config.as_deref())?;

    match cli.command {
        Command::Index { pdf } => {
            commands::index::run_pdf(&app, &pdf, &cli.format, use_color)?;
        }
        Command::IndexText { file } => {
            commands::index::run_text(&app, &file, &cli.format, use_color)?;
        }
        Command::IndexImage { file } => {
            commands::index::run_image(&app, &file, &cli.format, use_color)?;
        }
        Command::Search { query, k } => {
            commands::search::run(&app, &query, k, &cli.format, use_color)?;
        }
        Command::Ask { question, k } => {
            commands::ask::run(&app, &question, k, &cli.format, use_color)?;
        }
        Command::Stats => {
            commands::stats::run(&app, &cli.format)?;
        }
        Command::Clear => {
            commands::clear::run(&app, &cli.format)?;
        }
    }

    Ok(())
}
