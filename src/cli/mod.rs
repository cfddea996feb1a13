pub mod run;
pub mod servers;

use crate::actions::{ActionKind, SelectionRange};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A3S LSP - Semantic code actions through language servers
#[derive(Debug, Parser)]
#[command(name = "a3s-lsp", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one action against a file and print the JSON result
    Run {
        /// Action name (e.g. "definition", "rename", "organize_imports")
        action: ActionKind,

        /// Target source file
        file: PathBuf,

        /// 1-based line number
        #[arg(long)]
        line: Option<u32>,

        /// 0-based UTF-16 column
        #[arg(long)]
        character: Option<u32>,

        /// New symbol name for `rename`
        #[arg(long)]
        new_name: Option<String>,

        /// Apply returned edits to disk
        #[arg(long)]
        apply_edits: bool,

        /// Selection for `code_action`, as LINE:CHAR-LINE:CHAR
        #[arg(long)]
        range: Option<SelectionRange>,

        /// Code action kind filter (repeatable)
        #[arg(long)]
        only: Vec<String>,
    },

    /// List configured language servers
    Servers,
}
