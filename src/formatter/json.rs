use std::io::Write;

use serde::Serialize;

use crate::formatter::{Formatter, Report, TreeReport, action_name, cost_label};
use crate::grammar::RuleId;
use crate::tables::CompiledTables;

pub struct JsonFormatter;

#[derive(Serialize)]
struct JsonOutput<'a> {
    metadata: Metadata<'a>,
    diagnostics: Vec<JsonDiagnostic>,
    trees: &'a [TreeReport],
}

#[derive(Serialize)]
struct Metadata<'a> {
    grammar: &'a str,
    accepted: bool,
    rule_count: usize,
    error_count: usize,
    warning_count: usize,
}

#[derive(Serialize)]
struct JsonDiagnostic {
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    column: Option<usize>,
    severity: String,
    message: String,
}

#[derive(Serialize)]
struct JsonRule {
    id: RuleId,
    lhs: String,
    text: String,
    cost: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<String>,
}

impl Formatter for JsonFormatter {
    fn format_to(&self, report: &Report, out: &mut dyn Write) {
        let output = JsonOutput {
            metadata: Metadata {
                grammar: report.grammar,
                accepted: report.tables.is_some(),
                rule_count: report.tables.map_or(0, |t| t.rules.len()),
                error_count: report.error_count(),
                warning_count: report.warning_count(),
            },
            diagnostics: report
                .diagnostics
                .iter()
                .map(|d| JsonDiagnostic {
                    line: d.location.map(|l| l.line),
                    column: d.location.map(|l| l.column),
                    severity: d.severity().letter().to_string(),
                    message: d.message(),
                })
                .collect(),
            trees: report.trees,
        };
        // Safe to unwrap: our types always serialize successfully
        let _ = writeln!(out, "{}", serde_json::to_string_pretty(&output).unwrap());
    }

    fn format_rules(&self, tables: &CompiledTables, out: &mut dyn Write) {
        let rules: Vec<JsonRule> = tables
            .rules
            .iter()
            .map(|rule| JsonRule {
                id: rule.id,
                lhs: tables.nonterm(rule.lhs).name.clone(),
                text: rule.text.clone(),
                cost: cost_label(tables, rule),
                action: action_name(tables, rule),
            })
            .collect();
        let _ = writeln!(out, "{}", serde_json::to_string_pretty(&rules).unwrap());
    }
}
