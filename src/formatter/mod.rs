pub mod json;
pub mod text;

use std::io::Write;

use serde::Serialize;

use crate::diagnostic::Diagnostic;
use crate::grammar::CostExpr;
use crate::query::Cover;
use crate::tables::{CompiledTables, RuleEntry};

/// Result of labeling one `--tree` expression.
#[derive(Debug, Clone, Serialize)]
pub struct TreeReport {
    pub input: String,
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<Cover>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything one run has to say about a grammar.
pub struct Report<'a> {
    /// Grammar path as given on the command line.
    pub grammar: &'a str,
    pub diagnostics: &'a [Diagnostic],
    /// `None` when the grammar was rejected.
    pub tables: Option<&'a CompiledTables>,
    pub trees: &'a [TreeReport],
}

impl Report<'_> {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.len() - self.error_count()
    }
}

pub trait Formatter {
    fn format_to(&self, report: &Report, out: &mut dyn Write);

    /// The compiled rule table, for `--list-rules`.
    fn format_rules(&self, tables: &CompiledTables, out: &mut dyn Write);

    fn print(&self, report: &Report) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        self.format_to(report, &mut lock);
    }

    fn print_rules(&self, tables: &CompiledTables) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        self.format_rules(tables, &mut lock);
    }
}

pub fn create_formatter(format: &str) -> Box<dyn Formatter> {
    match format {
        "json" => Box::new(json::JsonFormatter),
        // "text" and any unknown value
        _ => Box::new(text::TextFormatter),
    }
}

/// `7`, or the cost function's name for a dynamic cost.
fn cost_label(tables: &CompiledTables, rule: &RuleEntry) -> String {
    match rule.cost {
        CostExpr::Const(c) => c.to_string(),
        CostExpr::Dynamic(id) => tables
            .cost_functions
            .get(id.0 as usize)
            .cloned()
            .unwrap_or_else(|| format!("#{}", id.0)),
    }
}

fn action_name(tables: &CompiledTables, rule: &RuleEntry) -> Option<String> {
    rule.action
        .map(|id| tables.actions.get(id.0 as usize).cloned().unwrap_or_else(|| format!("#{}", id.0)))
}
