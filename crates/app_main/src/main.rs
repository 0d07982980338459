//! wsfs - workspace file system inspector
//!
//! Thin command-line front end over the file system service. Every command
//! prints JSON on stdout.

mod app;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Inspect and modify a workspace through its file system service
#[derive(Parser)]
#[command(name = "wsfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Workspace root (defaults to the configured root, then the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `app_fs=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show metadata of an entry
    Stat {
        path: String,
        /// Include the directory's children
        #[arg(long)]
        expand: bool,
    },
    /// Print a file's decoded content
    Cat {
        path: String,
        #[arg(long)]
        encoding: Option<String>,
    },
    /// Replace a file's content, creating it if missing
    Write {
        path: String,
        text: String,
        #[arg(long)]
        encoding: Option<String>,
    },
    /// Detect a file's encoding
    Encoding { path: String },
    /// Create a directory and any missing parents
    Mkdir { path: String },
    /// Create an empty file or bump its modification time
    Touch { path: String },
    /// Delete a file or directory tree
    Rm { path: String },
    /// Move or rename an entry
    Mv {
        source: String,
        target: String,
        /// Replace an existing target of the same kind
        #[arg(long)]
        overwrite: bool,
    },
    /// Copy an entry
    Cp { source: String, target: String },
    /// Show the workspace root and its children
    Root,
    /// Print change batches until Ctrl-C
    Watch,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match app::run(cli.root, cli.config, cli.log_level, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let (code, message) = app::describe_error(&e);
            println!("{}", serde_json::json!({ "error": code, "message": message }));
            ExitCode::FAILURE
        }
    }
}
