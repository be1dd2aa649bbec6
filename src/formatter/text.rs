use std::io::Write;

use crate::formatter::{Formatter, Report, action_name, cost_label};
use crate::query::Cover;
use crate::tables::CompiledTables;

pub struct TextFormatter;

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn write_cover(out: &mut dyn Write, cover: &Cover, depth: usize) {
    let _ = writeln!(
        out,
        "{:indent$}{} {}  (cost {})",
        "",
        cover.rule,
        cover.text,
        cover.cost,
        indent = depth * 2
    );
    for kid in &cover.kids {
        write_cover(out, kid, depth + 1);
    }
}

impl Formatter for TextFormatter {
    fn format_to(&self, report: &Report, out: &mut dyn Write) {
        for d in report.diagnostics {
            if d.location.is_some() {
                let _ = writeln!(out, "{}:{d}", report.grammar);
            } else {
                let _ = writeln!(out, "{}: {d}", report.grammar);
            }
        }
        for tree in report.trees {
            let _ = writeln!(out, "{} => {}", tree.input, tree.goal);
            if let Some(cover) = &tree.cover {
                write_cover(out, cover, 1);
            }
            if let Some(error) = &tree.error {
                let _ = writeln!(out, "  error: {error}");
            }
        }

        let head = match report.tables {
            Some(tables) => format!("{} compiled", plural(tables.rules.len(), "rule")),
            None => "grammar rejected".to_string(),
        };
        let _ = writeln!(
            out,
            "\n{head}, {}, {}",
            plural(report.error_count(), "error"),
            plural(report.warning_count(), "warning")
        );
    }

    fn format_rules(&self, tables: &CompiledTables, out: &mut dyn Write) {
        let _ = writeln!(out, "terminals:");
        for op in &tables.ops {
            let arity = op.arity.map_or("-".to_string(), |a| a.to_string());
            let _ = writeln!(out, "  {}={}/{arity}", op.name, op.id.0);
        }
        let start = &tables.nonterm(tables.start).name;
        let _ = writeln!(out, "nonterminals (start {start}):");
        for nt in &tables.nonterms {
            let _ = writeln!(out, "  {} ({})", nt.name, plural(nt.decode.len() - 1, "rule"));
        }
        let _ = writeln!(out, "rules:");
        for rule in &tables.rules {
            let mut line = format!("  {:<4} {}  cost {}", rule.id.to_string(), rule.text, cost_label(tables, rule));
            if let Some(action) = action_name(tables, rule) {
                line.push_str(&format!("  => {action}"));
            }
            let _ = writeln!(out, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::TreeReport;
    use crate::formatter::tests::sample_diagnostics;
    use crate::grammar::RuleId;
    use crate::testutil::compile_text;

    fn render(report: &Report) -> String {
        let mut buf = Vec::new();
        TextFormatter.format_to(report, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn rejected_grammar() {
        let diagnostics = sample_diagnostics();
        let out = render(&Report {
            grammar: "isa.brg",
            diagnostics: &diagnostics,
            tables: None,
            trees: &[],
        });
        assert_eq!(
            out,
            "isa.brg:4:9: E: changed arity of terminal ADD from 2 to 1\n\
             isa.brg: W: unused terminal NOP\n\
             \ngrammar rejected, 1 error, 1 warning\n"
        );
    }

    #[test]
    fn cover_is_indented() {
        let tables = compile_text("%term C A\nr: C = 1;\nr: A(r, r) = 2;");
        let leaf = Cover {
            nonterm: "r".to_string(),
            rule: RuleId(1),
            text: "r: C".to_string(),
            cost: 1,
            op: "C".to_string(),
            kids: vec![],
        };
        let trees = vec![
            TreeReport {
                input: "A(C, C)".to_string(),
                goal: "r".to_string(),
                cover: Some(Cover {
                    nonterm: "r".to_string(),
                    rule: RuleId(2),
                    text: "r: A(r, r)".to_string(),
                    cost: 4,
                    op: "A".to_string(),
                    kids: vec![leaf.clone(), leaf],
                }),
                error: None,
            },
            TreeReport {
                input: "B".to_string(),
                goal: "r".to_string(),
                cover: None,
                error: Some("unknown operator B".to_string()),
            },
        ];
        let out = render(&Report {
            grammar: "g.brg",
            diagnostics: &[],
            tables: Some(&tables),
            trees: &trees,
        });
        assert_eq!(
            out,
            "A(C, C) => r\n  R2 r: A(r, r)  (cost 4)\n    R1 r: C  (cost 1)\n    R1 r: C  (cost 1)\n\
             B => r\n  error: unknown operator B\n\
             \n2 rules compiled, 0 errors, 0 warnings\n"
        );
    }

    #[test]
    fn rule_listing() {
        let tables = compile_text("%term C A=5 N\nr: C = 1 => li;\nr: A(r, r) cost fold;");
        let mut buf = Vec::new();
        TextFormatter.format_rules(&tables, &mut buf);
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("  A=5/2\n"), "{out}");
        assert!(out.contains("  N=2/-\n"), "{out}");
        assert!(out.contains("nonterminals (start r):\n  r (2 rules)\n"), "{out}");
        assert!(out.contains("  R1   r: C  cost 1  => li\n"), "{out}");
        assert!(out.contains("  R2   r: A(r, r)  cost fold\n"), "{out}");
    }
}
