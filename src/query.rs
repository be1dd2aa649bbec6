//! Reading a labeling back: best rule per goal, operand nodes of a rule,
//! and the top-down reduction that drives emit actions.

use std::collections::HashMap;

use serde::Serialize;

use crate::grammar::{NonTermId, RuleId, Tree};
use crate::ir::IrTree;
use crate::matcher::{Labeling, MatchError, MatchState};
use crate::tables::CompiledTables;

/// Best rule deriving `goal` in `state`, or `RuleId::NONE`.
pub fn rule_for(state: &MatchState, goal: NonTermId) -> RuleId {
    state.rule(goal)
}

/// The IR nodes sitting under the nonterminal leaves of `rule`'s pattern
/// when it is applied at `node`, left-to-right depth-first. They line up
/// with `tables.nts(rule)`. A chain rule yields `node` itself.
pub fn kids_for<T: IrTree>(
    tables: &CompiledTables,
    tree: &T,
    node: T::Node,
    rule: RuleId,
) -> Result<Vec<T::Node>, MatchError> {
    let mut kids = Vec::new();
    if let Some(entry) = tables.rule(rule) {
        collect_kids(tables, tree, node, &entry.pattern, &mut kids)?;
    }
    Ok(kids)
}

fn collect_kids<T: IrTree>(
    tables: &CompiledTables,
    tree: &T,
    node: T::Node,
    pattern: &Tree,
    out: &mut Vec<T::Node>,
) -> Result<(), MatchError> {
    match pattern {
        Tree::Leaf(_) => out.push(node),
        Tree::Op(term, ..) => {
            for (index, sub) in pattern.children().enumerate() {
                let child = tree.child(node, index).ok_or_else(|| MatchError::MissingChild {
                    op: tables.term_name(*term),
                    arity: pattern.arity() as u8,
                    index,
                })?;
                collect_kids(tables, tree, child, sub, out)?;
            }
        }
    }
    Ok(())
}

/// Host action run when a rule is emitted: gets the caller's context, the
/// node the rule was applied at, and the rule's operand nodes.
pub type ActionFn<T, C> =
    dyn Fn(&mut C, &T, <T as IrTree>::Node, &[<T as IrTree>::Node]) -> anyhow::Result<()> + Send + Sync;

/// Named emit actions, bound to a grammar's action ids by `Emitter::new`.
pub struct Actions<T: IrTree, C> {
    fns: Vec<Box<ActionFn<T, C>>>,
    index: HashMap<String, usize>,
}

impl<T: IrTree, C> Default for Actions<T, C> {
    fn default() -> Self {
        Self {
            fns: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: IrTree, C> Actions<T, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut C, &T, T::Node, &[T::Node]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        match self.index.get(name) {
            Some(&idx) => self.fns[idx] = Box::new(f),
            None => {
                self.index.insert(name.to_string(), self.fns.len());
                self.fns.push(Box::new(f));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ActionFn<T, C>> {
        self.index.get(name).map(|&idx| &*self.fns[idx])
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

/// Dispatches rule actions. Rules declared without an action emit nothing.
pub struct Emitter<'a, T: IrTree, C> {
    tables: &'a CompiledTables,
    actions: Vec<&'a ActionFn<T, C>>,
}

impl<'a, T: IrTree, C> Emitter<'a, T, C> {
    pub fn new(tables: &'a CompiledTables, registry: &'a Actions<T, C>) -> Result<Self, MatchError> {
        let actions = tables
            .actions
            .iter()
            .map(|name| registry.get(name).ok_or_else(|| MatchError::UnboundAction(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tables, actions })
    }

    /// Run `rule`'s action at `node`.
    pub fn emit(&self, rule: RuleId, tree: &T, node: T::Node, ctx: &mut C) -> Result<(), MatchError> {
        if self.tables.rule(rule).is_none() {
            return Err(MatchError::UnknownRule(rule.0));
        }
        let kids = kids_for(self.tables, tree, node, rule)?;
        self.emit_with(rule, tree, node, &kids, ctx)
    }

    fn emit_with(
        &self,
        rule: RuleId,
        tree: &T,
        node: T::Node,
        kids: &[T::Node],
        ctx: &mut C,
    ) -> Result<(), MatchError> {
        let Some(action) = self.tables.rule(rule).and_then(|r| r.action) else {
            return Ok(());
        };
        let f = self.actions[action.0 as usize];
        f(ctx, tree, node, kids).map_err(|e| MatchError::ActionFailed {
            action: self.tables.actions[action.0 as usize].clone(),
            rule: self.tables.rule_string(rule).to_string(),
            message: format!("{e:#}"),
        })
    }

    /// Reduce `root` to `goal`: operands are reduced (to the nonterminals
    /// the chosen rule expects) before the rule itself is emitted.
    pub fn reduce(
        &self,
        labeling: &Labeling<T::Node>,
        tree: &T,
        root: T::Node,
        goal: NonTermId,
        ctx: &mut C,
    ) -> Result<(), MatchError> {
        enum Step<N> {
            Reduce(N, NonTermId),
            Emit(RuleId, N, Vec<N>),
        }

        let mut work = vec![Step::Reduce(root, goal)];
        while let Some(step) = work.pop() {
            match step {
                Step::Reduce(node, goal) => {
                    let rule = labeling.rule(node, goal)?;
                    if rule.is_none() {
                        return Err(MatchError::NoCover {
                            goal: self.tables.nonterm(goal).name.clone(),
                            op: self.tables.term_name(tree.op(node)),
                        });
                    }
                    let kids = kids_for(self.tables, tree, node, rule)?;
                    let operands: Vec<_> = kids
                        .iter()
                        .copied()
                        .zip(self.tables.nts(rule).iter().copied())
                        .map(|(kid, nt)| Step::Reduce(kid, nt))
                        .collect();
                    work.push(Step::Emit(rule, node, kids));
                    // Leftmost operand on top.
                    work.extend(operands.into_iter().rev());
                }
                Step::Emit(rule, node, kids) => self.emit_with(rule, tree, node, &kids, ctx)?,
            }
        }
        Ok(())
    }
}

/// The derivation chosen for one goal at one node, with the derivations of
/// its operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cover {
    pub nonterm: String,
    pub rule: RuleId,
    pub text: String,
    pub cost: u32,
    pub op: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kids: Vec<Cover>,
}

impl Cover {
    /// Rules in emission order (operands first).
    pub fn emit_order(&self) -> Vec<RuleId> {
        let mut out = Vec::new();
        self.walk(&mut out);
        out
    }

    fn walk(&self, out: &mut Vec<RuleId>) {
        for kid in &self.kids {
            kid.walk(out);
        }
        out.push(self.rule);
    }
}

pub fn cover<T: IrTree>(
    tables: &CompiledTables,
    labeling: &Labeling<T::Node>,
    tree: &T,
    node: T::Node,
    goal: NonTermId,
) -> Result<Cover, MatchError> {
    let state = labeling.state(node).ok_or(MatchError::Unlabeled)?;
    let rule = rule_for(state, goal);
    let (Some(cost), Some(entry)) = (state.cost(goal), tables.rule(rule)) else {
        return Err(MatchError::NoCover {
            goal: tables.nonterm(goal).name.clone(),
            op: tables.term_name(tree.op(node)),
        });
    };
    let kids = kids_for(tables, tree, node, rule)?
        .into_iter()
        .zip(&entry.nts)
        .map(|(kid, &nt)| cover(tables, labeling, tree, kid, nt))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Cover {
        nonterm: tables.nonterm(goal).name.clone(),
        rule,
        text: entry.text.clone(),
        cost,
        op: tables.term_name(tree.op(node)),
        kids,
    })
}
