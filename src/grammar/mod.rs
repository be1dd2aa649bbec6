//! Grammar model: terminals, nonterminals, patterns and rules.
//!
//! A `Grammar` only exists after `GrammarBuilder::finalize()` accepted it, so
//! everything reachable from here already satisfies the arity, numbering,
//! start-symbol and chain-acyclicity checks. The model is plain data; the
//! table compiler and matcher read it but never mutate it.

pub mod builder;
pub mod lexer;
pub mod parser;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostic::Location;

pub use builder::{Cost, GrammarBuilder, Pattern, Validated};
pub use parser::{load_grammar, parse_grammar};

/// Terminal number: the operator tag an IR node reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub u32);

/// Dense nonterminal index, in order of first reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NonTermId(pub u32);

impl NonTermId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Rule number, 1-based in declaration order. `RuleId::NONE` means "no rule".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u32);

impl RuleId {
    pub const NONE: RuleId = RuleId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Position in a rule vector. Must not be called on `NONE`.
    pub fn index(self) -> usize {
        debug_assert!(!self.is_none());
        self.0 as usize - 1
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Index into the grammar's cost-function name table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub u32);

/// Index into the grammar's action name table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostExpr {
    Const(u32),
    /// Evaluated against the matched node at label time.
    Dynamic(CallbackId),
}

/// A rule pattern. `Op` carries a left child iff the operator's arity is at
/// least 1 and a right child iff it is 2.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tree {
    Leaf(NonTermId),
    Op(TermId, Option<Box<Tree>>, Option<Box<Tree>>),
}

impl Tree {
    /// Sub-patterns of an `Op`, left to right.
    pub fn children(&self) -> impl Iterator<Item = &Tree> {
        let (left, right) = match self {
            Tree::Leaf(_) => (None, None),
            Tree::Op(_, l, r) => (l.as_deref(), r.as_deref()),
        };
        left.into_iter().chain(right)
    }

    pub fn arity(&self) -> usize {
        self.children().count()
    }

    /// Nonterminal leaves in left-to-right depth-first order.
    pub fn leaves(&self) -> Vec<NonTermId> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<NonTermId>) {
        match self {
            Tree::Leaf(nt) => out.push(*nt),
            Tree::Op(..) => {
                for child in self.children() {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// The referenced nonterminal if this is a chain pattern.
    pub fn chain_target(&self) -> Option<NonTermId> {
        match self {
            Tree::Leaf(nt) => Some(*nt),
            Tree::Op(..) => None,
        }
    }

    pub fn root_term(&self) -> Option<TermId> {
        match self {
            Tree::Leaf(_) => None,
            Tree::Op(t, ..) => Some(*t),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Term {
    pub name: String,
    pub id: TermId,
    pub arity: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonTerm {
    pub name: String,
    pub id: NonTermId,
    /// Rules with this nonterminal as lhs, declaration order.
    pub rules: Vec<RuleId>,
    /// Chain rules `A: <this>`, i.e. the rules closure must revisit when this
    /// nonterminal's cost improves.
    pub chain: Vec<RuleId>,
    pub reached: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    pub lhs: NonTermId,
    pub pattern: Tree,
    pub cost: CostExpr,
    pub action: Option<ActionId>,
    pub location: Option<Location>,
}

#[derive(Clone, Debug)]
pub struct Grammar {
    pub(crate) terms: Vec<Term>,
    pub(crate) nonterms: Vec<NonTerm>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) start: NonTermId,
    pub(crate) cost_functions: Vec<String>,
    pub(crate) actions: Vec<String>,
}

impl Grammar {
    /// Terminals in declaration order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn nonterms(&self) -> &[NonTerm] {
        &self.nonterms
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn start(&self) -> NonTermId {
        self.start
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn nonterm(&self, id: NonTermId) -> &NonTerm {
        &self.nonterms[id.index()]
    }

    pub fn term(&self, id: TermId) -> Option<&Term> {
        self.terms.iter().find(|t| t.id == id)
    }

    pub fn term_by_name(&self, name: &str) -> Option<&Term> {
        self.terms.iter().find(|t| t.name == name)
    }

    pub fn nonterm_by_name(&self, name: &str) -> Option<&NonTerm> {
        self.nonterms.iter().find(|n| n.name == name)
    }

    pub fn cost_functions(&self) -> &[String] {
        &self.cost_functions
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// `ADD(reg, CONST)` style rendering of a pattern.
    pub fn pattern_string(&self, tree: &Tree) -> String {
        match tree {
            Tree::Leaf(nt) => self.nonterm(*nt).name.clone(),
            Tree::Op(t, ..) => {
                let name = self
                    .term(*t)
                    .map(|term| term.name.clone())
                    .unwrap_or_else(|| format!("#{}", t.0));
                let kids: Vec<String> = tree.children().map(|c| self.pattern_string(c)).collect();
                if kids.is_empty() {
                    name
                } else {
                    format!("{name}({})", kids.join(", "))
                }
            }
        }
    }

    /// `reg: ADD(reg, reg)`
    pub fn rule_string(&self, rule: &Rule) -> String {
        format!(
            "{}: {}",
            self.nonterm(rule.lhs).name,
            self.pattern_string(&rule.pattern)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(t: u32, l: Option<Tree>, r: Option<Tree>) -> Tree {
        Tree::Op(TermId(t), l.map(Box::new), r.map(Box::new))
    }

    #[test]
    fn leaves_are_depth_first_left_to_right() {
        // ADD(a, MUL(b, c))
        let tree = op(
            1,
            Some(Tree::Leaf(NonTermId(0))),
            Some(op(
                2,
                Some(Tree::Leaf(NonTermId(1))),
                Some(Tree::Leaf(NonTermId(2))),
            )),
        );
        assert_eq!(tree.leaves(), vec![NonTermId(0), NonTermId(1), NonTermId(2)]);
        assert_eq!(tree.arity(), 2);
        assert_eq!(tree.root_term(), Some(TermId(1)));
    }

    #[test]
    fn leaf_pattern_is_chain() {
        let tree = Tree::Leaf(NonTermId(4));
        assert_eq!(tree.chain_target(), Some(NonTermId(4)));
        assert_eq!(tree.leaves(), vec![NonTermId(4)]);
        assert_eq!(tree.arity(), 0);
        assert!(op(3, None, None).chain_target().is_none());
        assert!(op(3, None, None).leaves().is_empty());
    }

    #[test]
    fn rule_id_none() {
        assert!(RuleId::NONE.is_none());
        assert!(!RuleId(1).is_none());
        assert_eq!(RuleId(1).index(), 0);
        assert_eq!(RuleId(7).to_string(), "R7");
    }
}
