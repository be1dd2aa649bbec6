//! Labeling: bottom-up dynamic programming over an IR tree.
//!
//! One post-order pass computes, for every node and every nonterminal, the
//! cheapest rule application that reduces the node's subtree to that
//! nonterminal:
//!
//! 1. children are labeled first (an explicit stack, not recursion);
//! 2. each rule indexed under the node's operator is tried: its pattern must
//!    match the node's operator shape down to the nonterminal leaves, and its
//!    cost is the rule's own cost plus the already-known leaf costs;
//! 3. every improvement of a nonterminal is pushed through the chain rules
//!    that read it (closure), recursively.
//!
//! A candidate replaces the current winner when it is strictly cheaper, or
//! equally cheap with a lower rule id, so ties always go to the rule declared
//! first no matter in which order candidates are found.

use std::collections::HashMap;
use std::hash::Hash;

use rayon::prelude::*;
use thiserror::Error;

use crate::grammar::{CostExpr, NonTermId, RuleId, Tree};
use crate::ir::IrTree;
use crate::tables::{CompiledTables, OpEntry};

/// Returned by a dynamic cost function to say "this rule does not apply here".
pub const INFINITE_COST: u32 = u32::MAX;

pub type CostFn<T> = dyn Fn(&T, <T as IrTree>::Node) -> u32 + Send + Sync;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("no cover for goal {goal}: nothing matches the {op} node")]
    NoCover { goal: String, op: String },
    #[error("unknown operator number {0}")]
    UnknownOperator(u32),
    #[error("operator {op} takes {arity} operand(s) but operand {index} is missing")]
    MissingChild { op: String, arity: u8, index: usize },
    #[error("cost function {0} is not registered")]
    UnboundCostFunction(String),
    #[error("action {0} is not registered")]
    UnboundAction(String),
    #[error("unknown goal nonterminal {0}")]
    UnknownGoal(String),
    #[error("node was not labeled")]
    Unlabeled,
    #[error("rule number {0} is not in the tables")]
    UnknownRule(u32),
    #[error("action {action} failed for rule `{rule}`: {message}")]
    ActionFailed {
        action: String,
        rule: String,
        message: String,
    },
}

/// Named dynamic cost functions, bound to a grammar's callback ids when a
/// `Matcher` is created.
pub struct CostFunctions<T: IrTree> {
    fns: Vec<Box<CostFn<T>>>,
    index: HashMap<String, usize>,
}

impl<T: IrTree> Default for CostFunctions<T> {
    fn default() -> Self {
        Self {
            fns: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: IrTree> CostFunctions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, replacing any earlier registration.
    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&T, T::Node) -> u32 + Send + Sync + 'static,
    {
        match self.index.get(name) {
            Some(&idx) => self.fns[idx] = Box::new(f),
            None => {
                self.index.insert(name.to_string(), self.fns.len());
                self.fns.push(Box::new(f));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&CostFn<T>> {
        self.index.get(name).map(|&idx| &*self.fns[idx])
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

/// Per-node result: best cost and rule for every nonterminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    cost: Vec<u32>,
    rule: Vec<RuleId>,
}

impl MatchState {
    fn new(nonterms: usize) -> Self {
        Self {
            cost: vec![INFINITE_COST; nonterms],
            rule: vec![RuleId::NONE; nonterms],
        }
    }

    pub fn cost(&self, nt: NonTermId) -> Option<u32> {
        self.cost
            .get(nt.index())
            .copied()
            .filter(|&c| c != INFINITE_COST)
    }

    /// `RuleId::NONE` when `nt` was never matched here.
    pub fn rule(&self, nt: NonTermId) -> RuleId {
        self.rule.get(nt.index()).copied().unwrap_or(RuleId::NONE)
    }

    /// Matched nonterminals with their cost and rule.
    pub fn matched(&self) -> impl Iterator<Item = (NonTermId, u32, RuleId)> + '_ {
        self.cost
            .iter()
            .zip(&self.rule)
            .enumerate()
            .filter(|(_, (c, _))| **c != INFINITE_COST)
            .map(|(i, (&c, &r))| (NonTermId(i as u32), c, r))
    }

    pub fn is_empty(&self) -> bool {
        self.cost.iter().all(|&c| c == INFINITE_COST)
    }
}

/// States for every node of one labeled tree, in post-order.
#[derive(Debug, Clone)]
pub struct Labeling<N> {
    root: N,
    order: Vec<N>,
    states: Vec<MatchState>,
    index: HashMap<N, usize>,
}

impl<N: Copy + Eq + Hash> Labeling<N> {
    fn new(root: N) -> Self {
        Self {
            root,
            order: Vec::new(),
            states: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn insert(&mut self, node: N, state: MatchState) {
        self.index.insert(node, self.states.len());
        self.order.push(node);
        self.states.push(state);
    }

    pub fn root(&self) -> N {
        self.root
    }

    pub fn state(&self, node: N) -> Option<&MatchState> {
        self.index.get(&node).map(|&i| &self.states[i])
    }

    pub fn root_state(&self) -> Option<&MatchState> {
        self.state(self.root)
    }

    /// Best rule for `goal` at `node`.
    pub fn rule(&self, node: N, goal: NonTermId) -> Result<RuleId, MatchError> {
        let state = self.state(node).ok_or(MatchError::Unlabeled)?;
        Ok(crate::query::rule_for(state, goal))
    }

    /// Nodes and states in post-order.
    pub fn iter(&self) -> impl Iterator<Item = (N, &MatchState)> {
        self.order.iter().copied().zip(&self.states)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Labels trees against one set of compiled tables. Cheap to share: it only
/// borrows the tables and the cost functions.
pub struct Matcher<'a, T: IrTree> {
    tables: &'a CompiledTables,
    costs: Vec<&'a CostFn<T>>,
}

impl<'a, T: IrTree> Matcher<'a, T> {
    /// Bind every cost function the tables name; missing ones are an error.
    pub fn new(tables: &'a CompiledTables, functions: &'a CostFunctions<T>) -> Result<Self, MatchError> {
        let costs = tables
            .cost_functions
            .iter()
            .map(|name| {
                functions
                    .get(name)
                    .ok_or_else(|| MatchError::UnboundCostFunction(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tables, costs })
    }

    pub fn tables(&self) -> &'a CompiledTables {
        self.tables
    }

    /// Label `root` and require a cover for the start nonterminal.
    pub fn label(&self, tree: &T, root: T::Node) -> Result<Labeling<T::Node>, MatchError> {
        self.label_for(tree, root, self.tables.start)
    }

    /// Label `root` and require a cover for `goal`.
    pub fn label_for(&self, tree: &T, root: T::Node, goal: NonTermId) -> Result<Labeling<T::Node>, MatchError> {
        if goal.index() >= self.tables.num_nonterms() {
            return Err(MatchError::UnknownGoal(format!("#{}", goal.0)));
        }
        let labeling = self.label_nodes(tree, root)?;
        let covered = labeling.root_state().is_some_and(|s| s.cost(goal).is_some());
        if !covered {
            // Blame the first node (post-order) nothing matched, else the root.
            let culprit = labeling
                .iter()
                .find(|(_, state)| state.is_empty())
                .map_or(root, |(node, _)| node);
            return Err(MatchError::NoCover {
                goal: self.tables.nonterm(goal).name.clone(),
                op: self.tables.term_name(tree.op(culprit)),
            });
        }
        Ok(labeling)
    }

    /// Label every node without checking any goal at the root.
    pub fn label_nodes(&self, tree: &T, root: T::Node) -> Result<Labeling<T::Node>, MatchError> {
        let mut labeling = Labeling::new(root);
        self.label_tree(tree, root, &mut labeling)?;
        Ok(labeling)
    }

    /// Label several trees for `goal` in parallel; the tables are shared
    /// read-only. Results come back in job order.
    pub fn label_many(
        &self,
        jobs: &[(&T, T::Node)],
        goal: NonTermId,
    ) -> Vec<Result<Labeling<T::Node>, MatchError>>
    where
        T: Sync,
        T::Node: Send + Sync,
    {
        let results: Vec<_> = jobs
            .par_iter()
            .map(|&(tree, root)| self.label_for(tree, root, goal))
            .collect();
        log::debug!(
            "labeled {} trees, {} failed",
            results.len(),
            results.iter().filter(|r| r.is_err()).count()
        );
        results
    }

    /// Post-order walk with an explicit stack, so tree depth is not limited
    /// by the thread's stack.
    fn label_tree(&self, tree: &T, root: T::Node, out: &mut Labeling<T::Node>) -> Result<(), MatchError> {
        // (node, operands already queued)
        let mut work = vec![(root, false)];
        while let Some((node, expanded)) = work.pop() {
            if out.index.contains_key(&node) {
                // Shared subtree of a DAG, already labeled.
                continue;
            }
            let op = tree.op(node);
            let entry = self.tables.op(op).ok_or(MatchError::UnknownOperator(op.0))?;
            if expanded {
                let state = self.label_node(tree, node, entry, out);
                out.insert(node, state);
                continue;
            }
            let arity = entry.arity.unwrap_or(0);
            let mut kids = Vec::with_capacity(arity as usize);
            for index in 0..arity as usize {
                let child = tree.child(node, index).ok_or_else(|| MatchError::MissingChild {
                    op: entry.name.clone(),
                    arity,
                    index,
                })?;
                kids.push((child, false));
            }
            work.push((node, true));
            work.extend(kids.into_iter().rev());
        }
        Ok(())
    }

    /// Try every rule rooted at `entry` against `node`; its operands are
    /// already labeled.
    fn label_node(&self, tree: &T, node: T::Node, entry: &OpEntry, out: &Labeling<T::Node>) -> MatchState {
        let mut state = MatchState::new(self.tables.num_nonterms());
        for &id in &entry.rules {
            let rule = &self.tables.rules[id.index()];
            let Some(below) = self.pattern_cost(tree, node, &rule.pattern, out) else {
                continue;
            };
            let cost = below.saturating_add(self.eval(rule.cost, tree, node));
            self.record(tree, node, &mut state, rule.lhs, cost, id);
        }
        state
    }

    /// Sum of leaf costs if `pattern` matches at `node`.
    fn pattern_cost(&self, tree: &T, node: T::Node, pattern: &Tree, out: &Labeling<T::Node>) -> Option<u32> {
        match pattern {
            Tree::Leaf(nt) => out.state(node)?.cost(*nt),
            Tree::Op(term, ..) => {
                if tree.op(node) != *term {
                    return None;
                }
                let mut total = 0u32;
                for (index, sub) in pattern.children().enumerate() {
                    let child = tree.child(node, index)?;
                    total = total.saturating_add(self.pattern_cost(tree, child, sub, out)?);
                }
                Some(total)
            }
        }
    }

    fn eval(&self, cost: CostExpr, tree: &T, node: T::Node) -> u32 {
        match cost {
            CostExpr::Const(c) => c,
            CostExpr::Dynamic(id) => (self.costs[id.0 as usize])(tree, node),
        }
    }

    fn record(&self, tree: &T, node: T::Node, state: &mut MatchState, nt: NonTermId, cost: u32, rule: RuleId) {
        if cost == INFINITE_COST {
            return;
        }
        let i = nt.index();
        let better = cost < state.cost[i] || (cost == state.cost[i] && rule < state.rule[i]);
        if !better {
            return;
        }
        state.cost[i] = cost;
        state.rule[i] = rule;

        // The chain graph is acyclic, so this recursion is bounded by the
        // number of nonterminals.
        for &chain_id in &self.tables.nonterms[i].chain {
            let chain = &self.tables.rules[chain_id.index()];
            let total = cost.saturating_add(self.eval(chain.cost, tree, node));
            self.record(tree, node, state, chain.lhs, total, chain_id);
        }
    }
}
