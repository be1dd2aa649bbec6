use std::collections::HashMap;

use proptest::prelude::*;

use crate::grammar::{Cost, CostExpr, GrammarBuilder, NonTermId, Pattern, RuleId, Tree, load_grammar};
use crate::ir::{ExprTree, IrTree, NodeId};
use crate::tables::CompiledTables;

/// Compile grammar text that is expected to be valid.
pub fn compile_text(text: &str) -> CompiledTables {
    match load_grammar(text) {
        Ok(validated) => validated.compile(),
        Err(errors) => {
            let lines: Vec<String> = errors.diagnostics.iter().map(|d| d.to_string()).collect();
            panic!("test grammar failed to load:\n{}", lines.join("\n"))
        }
    }
}

/// Pattern shape over the fixed random alphabet: terminals `L0 L1` (leaves),
/// `U` (unary), `B` (binary), and nonterminals `n0 n1 n2`.
#[derive(Debug, Clone)]
pub enum PatShape {
    Nt(usize),
    L0,
    L1,
    U(Box<PatShape>),
    B(Box<PatShape>, Box<PatShape>),
}

#[derive(Debug, Clone)]
pub enum TreeShape {
    L0,
    L1,
    U(Box<TreeShape>),
    B(Box<TreeShape>, Box<TreeShape>),
}

fn pattern_shape() -> impl Strategy<Value = PatShape> {
    prop_oneof![
        (0..3usize).prop_map(PatShape::Nt),
        Just(PatShape::L0),
        Just(PatShape::L1),
    ]
    .prop_recursive(2, 8, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|p| PatShape::U(Box::new(p))),
            (inner.clone(), inner).prop_map(|(l, r)| PatShape::B(Box::new(l), Box::new(r))),
        ]
    })
}

fn tree_shape() -> impl Strategy<Value = TreeShape> {
    prop_oneof![Just(TreeShape::L0), Just(TreeShape::L1)].prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| TreeShape::U(Box::new(t))),
            (inner.clone(), inner).prop_map(|(l, r)| TreeShape::B(Box::new(l), Box::new(r))),
        ]
    })
}

fn build_pattern(b: &mut GrammarBuilder, shape: &PatShape) -> Pattern {
    match shape {
        PatShape::Nt(k) => b.leaf(&format!("n{k}"), None),
        PatShape::L0 => b.op("L0", vec![], None),
        PatShape::L1 => b.op("L1", vec![], None),
        PatShape::U(kid) => {
            let kid = build_pattern(b, kid);
            b.op("U", vec![kid], None)
        }
        PatShape::B(l, r) => {
            let l = build_pattern(b, l);
            let r = build_pattern(b, r);
            b.op("B", vec![l, r], None)
        }
    }
}

/// A valid grammar: fixed base rules so every nonterminal has one, then up
/// to ten random rules. Chain rules only point from `n{i}` to `n{j}` with
/// `j > i`, which keeps the chain graph acyclic.
pub fn random_grammar() -> impl Strategy<Value = CompiledTables> {
    prop::collection::vec((0..3usize, pattern_shape(), 0..5u32), 0..10).prop_map(|extra| {
        let mut b = GrammarBuilder::new();
        for name in ["L0", "L1", "U", "B"] {
            b.declare_term(name, None, None);
        }
        for k in 0..3 {
            b.nonterm(&format!("n{k}"), None);
        }
        b.start("n0", None);
        for k in 0..3usize {
            let p = b.op(if k % 2 == 0 { "L0" } else { "L1" }, vec![], None);
            b.rule(&format!("n{k}"), p, Cost::Const(k as u32 + 1), None, None);
        }
        let n2 = b.leaf("n2", None);
        let p = b.op("U", vec![n2], None);
        b.rule("n2", p, Cost::Const(3), None, None);
        let (l, r) = (b.leaf("n2", None), b.leaf("n1", None));
        let p = b.op("B", vec![l, r], None);
        b.rule("n2", p, Cost::Const(2), None, None);

        for (lhs, shape, cost) in extra {
            if let PatShape::Nt(target) = shape {
                if target <= lhs {
                    continue;
                }
            }
            let p = build_pattern(&mut b, &shape);
            b.rule(&format!("n{lhs}"), p, Cost::Const(cost), None, None);
        }
        match b.finalize() {
            Ok(validated) => validated.compile(),
            Err(errors) => panic!("random grammar rejected: {errors}"),
        }
    })
}

fn build_tree(tree: &mut ExprTree, tables: &CompiledTables, shape: &TreeShape) -> NodeId {
    let term = |name: &str| tables.term_by_name(name).expect("random alphabet terminal");
    match shape {
        TreeShape::L0 => tree.leaf(term("L0")),
        TreeShape::L1 => tree.leaf(term("L1")),
        TreeShape::U(kid) => {
            let kid = build_tree(tree, tables, kid);
            tree.unary(term("U"), kid)
        }
        TreeShape::B(l, r) => {
            let l = build_tree(tree, tables, l);
            let r = build_tree(tree, tables, r);
            tree.binary(term("B"), l, r)
        }
    }
}

/// A random grammar with a random tree over its alphabet.
pub fn random_case() -> impl Strategy<Value = (CompiledTables, ExprTree, NodeId)> {
    (random_grammar(), tree_shape()).prop_map(|(tables, shape)| {
        let mut tree = ExprTree::new();
        let root = build_tree(&mut tree, &tables, &shape);
        (tables, tree, root)
    })
}

pub type Memo = HashMap<(NodeId, NonTermId), Option<(u32, RuleId)>>;

/// Cheapest derivation of `nt` at `node` by exhaustive search over every
/// rule, ties going to the lowest rule id. Constant costs only.
pub fn brute_force_best(
    tables: &CompiledTables,
    tree: &ExprTree,
    node: NodeId,
    nt: NonTermId,
    memo: &mut Memo,
) -> Option<(u32, RuleId)> {
    if let Some(&hit) = memo.get(&(node, nt)) {
        return hit;
    }
    let mut best: Option<(u32, RuleId)> = None;
    for rule in tables.rules.iter().filter(|r| r.lhs == nt) {
        let CostExpr::Const(own) = rule.cost else {
            continue;
        };
        if let Some(below) = brute_force_pattern(tables, tree, node, &rule.pattern, memo) {
            let candidate = (below + own, rule.id);
            if best.is_none_or(|b| candidate < b) {
                best = Some(candidate);
            }
        }
    }
    memo.insert((node, nt), best);
    best
}

fn brute_force_pattern(
    tables: &CompiledTables,
    tree: &ExprTree,
    node: NodeId,
    pattern: &Tree,
    memo: &mut Memo,
) -> Option<u32> {
    match pattern {
        Tree::Leaf(nt) => brute_force_best(tables, tree, node, *nt, memo).map(|(c, _)| c),
        Tree::Op(term, ..) => {
            if tree.op(node) != *term {
                return None;
            }
            let mut total = 0;
            for (index, sub) in pattern.children().enumerate() {
                let kid = tree.child(node, index)?;
                total += brute_force_pattern(tables, tree, kid, sub, memo)?;
            }
            Some(total)
        }
    }
}
