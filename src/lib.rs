pub mod cli;
pub mod config;
pub mod diagnostic;
pub mod formatter;
pub mod grammar;
pub mod ir;
pub mod logging;
pub mod matcher;
pub mod query;
pub mod tables;

#[cfg(test)]
pub mod testutil;

use anyhow::{Context, Result};

use cli::Args;
use config::{TableConfig, load_config};
use formatter::{Report, TreeReport, create_formatter};
use grammar::parse_grammar;
use ir::ExprTree;
use matcher::{CostFunctions, MatchError, Matcher};
use query::cover;
use tables::{CompiledTables, save_tables_json};

/// Compile a grammar and optionally label trees with it. Returns the exit
/// code: 0 = success, 1 = grammar errors, failed trees, or denied warnings.
pub fn run(args: Args) -> Result<i32> {
    logging::init(args.debug);

    let config = load_config(args.config.as_deref())?;
    match config.source() {
        Some(path) => log::debug!("config loaded from: {}", path.display()),
        None => log::debug!("no config file found"),
    }

    let grammar_name = args.grammar.display().to_string();
    let text = std::fs::read_to_string(&args.grammar)
        .with_context(|| format!("failed to read grammar {grammar_name}"))?;
    let formatter = create_formatter(&args.output_format(&config));

    let build_start = std::time::Instant::now();
    let mut builder = parse_grammar(&text);
    config.apply(&mut builder);
    let validated = match builder.finalize() {
        Ok(validated) => validated,
        Err(errors) => {
            let mut diagnostics = errors.diagnostics;
            diagnostics.sort_by_key(|d| d.sort_key());
            formatter.print(&Report {
                grammar: &grammar_name,
                diagnostics: &diagnostics,
                tables: None,
                trees: &[],
            });
            return Ok(1);
        }
    };
    let tables = validated.compile();
    log::debug!("grammar compiled in {:.0?}", build_start.elapsed());

    if let Some(path) = &args.output {
        save_tables_json(path, &tables)
            .with_context(|| format!("failed to write tables to {}", path.display()))?;
        log::debug!("tables written to {}", path.display());
    }

    if args.list_rules {
        formatter.print_rules(&tables);
        return Ok(0);
    }

    let trees = label_trees(&tables, &config, &args)?;
    let mut warnings = validated.warnings;
    warnings.sort_by_key(|d| d.sort_key());
    formatter.print(&Report {
        grammar: &grammar_name,
        diagnostics: &warnings,
        tables: Some(&tables),
        trees: &trees,
    });

    let failed = trees.iter().any(|t| t.error.is_some());
    let denied = args.deny_warnings(&config) && !warnings.is_empty();
    Ok(if failed || denied { 1 } else { 0 })
}

/// Parse, label and cover every `--tree` expression. Dynamic costs are
/// replaced by the constants under `costs:` in the config.
fn label_trees(tables: &CompiledTables, config: &TableConfig, args: &Args) -> Result<Vec<TreeReport>> {
    if args.trees.is_empty() {
        return Ok(Vec::new());
    }
    let goal = match &args.goal {
        Some(name) => tables
            .nonterm_by_name(name)
            .with_context(|| format!("unknown goal nonterminal {name}"))?,
        None => tables.start,
    };

    let mut costs = CostFunctions::<ExprTree>::new();
    for (name, &value) in &config.costs {
        costs.register(name, move |_, _| value);
    }
    let matcher = Matcher::new(tables, &costs)
        .context("dynamic costs need constant values under `costs:` in the config")?;

    let parsed: Vec<_> = args.trees.iter().map(|input| ExprTree::parse(input, tables)).collect();
    let jobs: Vec<_> = parsed
        .iter()
        .filter_map(|p| p.as_ref().ok().map(|(tree, root)| (tree, *root)))
        .collect();
    let mut labeled = matcher.label_many(&jobs, goal).into_iter();

    let goal_name = tables.nonterm(goal).name.clone();
    let reports = args
        .trees
        .iter()
        .zip(&parsed)
        .map(|(input, parsed)| {
            let outcome = match parsed {
                Err(e) => Err(e.to_string()),
                Ok((tree, root)) => labeled
                    .next()
                    .unwrap_or(Err(MatchError::Unlabeled))
                    .and_then(|labeling| cover(tables, &labeling, tree, *root, goal))
                    .map_err(|e| e.to_string()),
            };
            let (cover, error) = match outcome {
                Ok(cover) => (Some(cover), None),
                Err(error) => (None, Some(error)),
            };
            TreeReport {
                input: input.clone(),
                goal: goal_name.clone(),
                cover,
                error,
            }
        })
        .collect();
    Ok(reports)
}
