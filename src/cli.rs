use std::path::PathBuf;

use clap::Parser;

use crate::config::TableConfig;

#[derive(Parser, Debug)]
#[command(name = "treeburg", version, about = "BURS instruction-selection table generator")]
pub struct Args {
    /// Grammar file to compile
    pub grammar: PathBuf,

    /// Path to configuration file (default: ./treeburg.yml if present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format [default: text, or `format` from the config]
    #[arg(short, long, value_parser = ["text", "json"])]
    pub format: Option<String>,

    /// Write the compiled tables as JSON to FILE
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Label an expression tree such as `ADD(CONST[4], REG)` and print its cover (repeatable)
    #[arg(short, long = "tree", value_name = "EXPR")]
    pub trees: Vec<String>,

    /// Goal nonterminal for --tree (default: the start symbol)
    #[arg(short, long, value_name = "NAME")]
    pub goal: Option<String>,

    /// Print the compiled rule table, then exit
    #[arg(long)]
    pub list_rules: bool,

    /// Exit non-zero when the grammar has warnings
    #[arg(long)]
    pub deny_warnings: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Command-line format, else the config's, else text.
    pub fn output_format(&self, config: &TableConfig) -> String {
        self.format
            .clone()
            .or_else(|| config.format.clone())
            .unwrap_or_else(|| "text".to_string())
    }

    /// Either the flag or the config turns warnings into failures.
    pub fn deny_warnings(&self, config: &TableConfig) -> bool {
        self.deny_warnings || config.deny_warnings
    }
}
