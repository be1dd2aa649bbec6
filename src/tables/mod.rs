//! Table compiler.
//!
//! Flattens a validated `Grammar` into the lookup tables the matcher and the
//! query API consume:
//!
//! - `ops`: one entry per terminal, sorted by terminal number; arity plus the
//!   rules whose pattern is rooted at that terminal (so labeling a node only
//!   tries those rules). Numbers may be sparse, so lookup is a binary search.
//! - `nonterms`: per nonterminal decode array (index 0 = no rule, index i =
//!   the i-th rule declared for it) and chain list
//! - `rules`: per rule pattern, nonterminal-leaf sequence, cost descriptor
//!   and action id
//!
//! Tables are plain data: immutable after `compile()`, `Send + Sync`, and
//! serializable (see `io`).

pub mod io;

use serde::{Deserialize, Serialize};

use crate::grammar::{ActionId, CostExpr, Grammar, NonTermId, RuleId, TermId, Tree};

pub use io::{digest, load_tables_json, load_tables_json_bytes, save_tables_json, TablesError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpEntry {
    pub id: TermId,
    pub name: String,
    /// `None` for a terminal no pattern ever used.
    pub arity: Option<u8>,
    /// Rules whose pattern root is this terminal, declaration order.
    pub rules: Vec<RuleId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonTermEntry {
    pub name: String,
    /// `decode[0]` is `RuleId::NONE`; `decode[i]` is the i-th rule for this nonterminal.
    pub decode: Vec<RuleId>,
    /// Chain rules `A: <this>`.
    pub chain: Vec<RuleId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub id: RuleId,
    pub lhs: NonTermId,
    /// Position of this rule in its lhs decode array.
    pub local: u32,
    pub pattern: Tree,
    /// Nonterminal leaves of `pattern`, left-to-right depth-first.
    pub nts: Vec<NonTermId>,
    pub cost: CostExpr,
    pub action: Option<ActionId>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledTables {
    pub ops: Vec<OpEntry>,
    pub nonterms: Vec<NonTermEntry>,
    pub rules: Vec<RuleEntry>,
    pub start: NonTermId,
    pub cost_functions: Vec<String>,
    pub actions: Vec<String>,
}

pub fn compile(grammar: &Grammar) -> CompiledTables {
    let mut ops: Vec<OpEntry> = grammar
        .terms()
        .iter()
        .map(|term| OpEntry {
            id: term.id,
            name: term.name.clone(),
            arity: term.arity,
            rules: Vec::new(),
        })
        .collect();
    ops.sort_by_key(|op| op.id);
    for rule in grammar.rules() {
        if let Some(term) = rule.pattern.root_term() {
            if let Ok(slot) = ops.binary_search_by_key(&term, |op| op.id) {
                ops[slot].rules.push(rule.id);
            }
        }
    }

    let nonterms: Vec<NonTermEntry> = grammar
        .nonterms()
        .iter()
        .map(|nt| NonTermEntry {
            name: nt.name.clone(),
            decode: std::iter::once(RuleId::NONE)
                .chain(nt.rules.iter().copied())
                .collect(),
            chain: nt.chain.clone(),
        })
        .collect();

    let rules: Vec<RuleEntry> = grammar
        .rules()
        .iter()
        .map(|rule| {
            let local = grammar
                .nonterm(rule.lhs)
                .rules
                .iter()
                .position(|&r| r == rule.id)
                .map_or(0, |p| p as u32 + 1);
            RuleEntry {
                id: rule.id,
                lhs: rule.lhs,
                local,
                pattern: rule.pattern.clone(),
                nts: rule.pattern.leaves(),
                cost: rule.cost,
                action: rule.action,
                text: grammar.rule_string(rule),
            }
        })
        .collect();

    log::debug!(
        "tables: {} operators, {} nonterminals, {} rules, {} cost functions, {} actions",
        ops.len(),
        nonterms.len(),
        rules.len(),
        grammar.cost_functions().len(),
        grammar.actions().len()
    );

    CompiledTables {
        ops,
        nonterms,
        rules,
        start: grammar.start(),
        cost_functions: grammar.cost_functions().to_vec(),
        actions: grammar.actions().to_vec(),
    }
}

impl CompiledTables {
    pub fn op(&self, term: TermId) -> Option<&OpEntry> {
        self.ops
            .binary_search_by_key(&term, |op| op.id)
            .ok()
            .map(|slot| &self.ops[slot])
    }

    pub fn arity(&self, term: TermId) -> Option<u8> {
        self.op(term).and_then(|op| op.arity)
    }

    pub fn rule(&self, id: RuleId) -> Option<&RuleEntry> {
        if id.is_none() {
            return None;
        }
        self.rules.get(id.index())
    }

    pub fn nonterm(&self, id: NonTermId) -> &NonTermEntry {
        &self.nonterms[id.index()]
    }

    pub fn num_nonterms(&self) -> usize {
        self.nonterms.len()
    }

    /// Map a per-nonterminal rule index back to the global rule id.
    pub fn decode(&self, nt: NonTermId, local: u32) -> RuleId {
        self.nonterms
            .get(nt.index())
            .and_then(|entry| entry.decode.get(local as usize))
            .copied()
            .unwrap_or(RuleId::NONE)
    }

    /// Nonterminal leaf sequence of a rule; empty for `NONE`.
    pub fn nts(&self, rule: RuleId) -> &[NonTermId] {
        self.rule(rule).map(|r| r.nts.as_slice()).unwrap_or(&[])
    }

    pub fn term_by_name(&self, name: &str) -> Option<TermId> {
        self.ops.iter().find(|op| op.name == name).map(|op| op.id)
    }

    pub fn nonterm_by_name(&self, name: &str) -> Option<NonTermId> {
        self.nonterms
            .iter()
            .position(|nt| nt.name == name)
            .map(|i| NonTermId(i as u32))
    }

    pub fn term_name(&self, term: TermId) -> String {
        self.op(term)
            .map(|op| op.name.clone())
            .unwrap_or_else(|| format!("#{}", term.0))
    }

    pub fn rule_string(&self, id: RuleId) -> &str {
        self.rule(id).map_or("<none>", |r| r.text.as_str())
    }

    /// Cross-check every id the tables hold. `compile()` output always
    /// passes; tables read from disk are checked before a matcher indexes
    /// into them.
    pub fn check(&self) -> Result<(), String> {
        let nonterm_ok = |nt: NonTermId| nt.index() < self.nonterms.len();
        if !nonterm_ok(self.start) {
            return Err(format!("start nonterminal #{} does not exist", self.start.0));
        }
        for pair in self.ops.windows(2) {
            if pair[0].id >= pair[1].id {
                return Err(format!("operator {} is out of order or duplicated", pair[1].name));
            }
        }
        for op in &self.ops {
            if op.arity.is_some_and(|a| a > 2) {
                return Err(format!("operator {} has arity above 2", op.name));
            }
            for &id in &op.rules {
                let rule = self.rule(id).ok_or_else(|| format!("operator {} lists unknown rule {id}", op.name))?;
                if rule.pattern.root_term() != Some(op.id) {
                    return Err(format!("operator {} lists rule {id}, which is not rooted there", op.name));
                }
            }
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.id != RuleId(i as u32 + 1) {
                return Err(format!("rule at position {} is numbered {}", i + 1, rule.id));
            }
            if !nonterm_ok(rule.lhs) || !rule.nts.iter().all(|&nt| nonterm_ok(nt)) {
                return Err(format!("rule {} names an unknown nonterminal", rule.id));
            }
            if rule.nts != rule.pattern.leaves() {
                return Err(format!("rule {} operand list does not match its pattern", rule.id));
            }
            self.check_pattern(&rule.pattern)
                .map_err(|message| format!("rule {}: {message}", rule.id))?;
            if let CostExpr::Dynamic(f) = rule.cost {
                if f.0 as usize >= self.cost_functions.len() {
                    return Err(format!("rule {} names unknown cost function #{}", rule.id, f.0));
                }
            }
            if rule.action.is_some_and(|a| a.0 as usize >= self.actions.len()) {
                return Err(format!("rule {} names an unknown action", rule.id));
            }
        }
        for (i, nt) in self.nonterms.iter().enumerate() {
            let here = NonTermId(i as u32);
            if nt.decode.first() != Some(&RuleId::NONE) {
                return Err(format!("decode array of {} does not start with the empty rule", nt.name));
            }
            for (local, &id) in nt.decode.iter().enumerate().skip(1) {
                match self.rule(id) {
                    Some(rule) if rule.lhs == here && rule.local as usize == local => {}
                    _ => return Err(format!("decode array of {} is inconsistent at {local}", nt.name)),
                }
            }
            for &id in &nt.chain {
                match self.rule(id) {
                    Some(rule) if rule.pattern.chain_target() == Some(here) => {}
                    _ => return Err(format!("chain list of {} names rule {id}, which does not read it", nt.name)),
                }
            }
        }
        Ok(())
    }

    fn check_pattern(&self, pattern: &Tree) -> Result<(), String> {
        match pattern {
            Tree::Leaf(nt) if nt.index() < self.nonterms.len() => Ok(()),
            Tree::Leaf(nt) => Err(format!("unknown nonterminal #{}", nt.0)),
            Tree::Op(term, ..) => {
                let op = self.op(*term).ok_or_else(|| format!("unknown operator #{}", term.0))?;
                if op.arity != Some(pattern.arity() as u8) {
                    return Err(format!("operator {} used with {} operand(s)", op.name, pattern.arity()));
                }
                pattern.children().try_for_each(|kid| self.check_pattern(kid))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::load_grammar;

    const GRAMMAR: &str = "
        %term CONST ADD MEM NOP
        %start stmt
        stmt: reg = 0;
        reg:  CONST = 1;
        reg:  ADD(reg, reg) = 2;
        reg:  MEM(ADD(reg, imm)) = 3;
        imm:  CONST = 0;
        reg:  imm = 1;
        stmt: MEM(reg) = 1;
    ";

    fn tables() -> CompiledTables {
        load_grammar(GRAMMAR).unwrap().compile()
    }

    #[test]
    fn arity_table_indexed_by_number() {
        let t = tables();
        assert!(t.op(TermId(0)).is_none());
        assert_eq!(t.ops.len(), 4);
        assert_eq!(t.arity(TermId(1)), Some(0));
        assert_eq!(t.arity(TermId(2)), Some(2));
        assert_eq!(t.arity(TermId(3)), Some(1));
        assert_eq!(t.arity(TermId(4)), None);
        assert_eq!(t.op(TermId(99)), None);
        assert_eq!(t.term_by_name("MEM"), Some(TermId(3)));
        assert_eq!(t.term_name(TermId(42)), "#42");
    }

    #[test]
    fn rules_indexed_by_root_terminal() {
        let t = tables();
        assert_eq!(t.op(TermId(1)).unwrap().rules, vec![RuleId(2), RuleId(5)]);
        assert_eq!(t.op(TermId(2)).unwrap().rules, vec![RuleId(3)]);
        assert_eq!(t.op(TermId(3)).unwrap().rules, vec![RuleId(4), RuleId(7)]);
        assert!(t.op(TermId(4)).unwrap().rules.is_empty());
    }

    #[test]
    fn decode_arrays_are_one_based() {
        let t = tables();
        let reg = t.nonterm_by_name("reg").unwrap();
        let stmt = t.nonterm_by_name("stmt").unwrap();
        assert_eq!(
            t.nonterm(reg).decode,
            vec![RuleId::NONE, RuleId(2), RuleId(3), RuleId(4), RuleId(6)]
        );
        assert_eq!(t.decode(stmt, 2), RuleId(7));
        assert_eq!(t.decode(stmt, 0), RuleId::NONE);
        assert_eq!(t.decode(stmt, 9), RuleId::NONE);
        assert_eq!(t.rule(RuleId(6)).unwrap().local, 4);
    }

    #[test]
    fn every_reachable_nonterm_has_rules() {
        let t = tables();
        for nt in &t.nonterms {
            assert!(nt.decode.len() > 1, "{} has an empty decode array", nt.name);
        }
    }

    #[test]
    fn nonterm_leaf_sequences() {
        let t = tables();
        let reg = t.nonterm_by_name("reg").unwrap();
        let imm = t.nonterm_by_name("imm").unwrap();
        assert_eq!(t.nts(RuleId(3)), &[reg, reg]);
        assert_eq!(t.nts(RuleId(4)), &[reg, imm]);
        assert_eq!(t.nts(RuleId(2)), &[] as &[NonTermId]);
        assert_eq!(t.nts(RuleId(6)), &[imm]);
        assert_eq!(t.nts(RuleId::NONE), &[] as &[NonTermId]);
    }

    #[test]
    fn chain_lists_and_strings() {
        let t = tables();
        let reg = t.nonterm_by_name("reg").unwrap();
        let imm = t.nonterm_by_name("imm").unwrap();
        assert_eq!(t.nonterm(reg).chain, vec![RuleId(1)]);
        assert_eq!(t.nonterm(imm).chain, vec![RuleId(6)]);
        assert_eq!(t.rule_string(RuleId(4)), "reg: MEM(ADD(reg, imm))");
        assert_eq!(t.rule_string(RuleId::NONE), "<none>");
        assert!(t.rule(RuleId(8)).is_none());
    }

    #[test]
    fn sparse_terminal_numbers() {
        let t = load_grammar("%term C=4000000000 NEG=7\nr: C = 1;\nr: NEG(r) = 1;")
            .unwrap()
            .compile();
        assert_eq!(t.ops.len(), 2);
        assert_eq!(t.ops[0].name, "NEG");
        assert_eq!(t.term_by_name("C"), Some(TermId(4_000_000_000)));
        assert_eq!(t.op(TermId(4_000_000_000)).unwrap().rules, vec![RuleId(1)]);
        assert_eq!(t.arity(TermId(7)), Some(1));
        assert!(t.op(TermId(8)).is_none());
        assert_eq!(t.check(), Ok(()));
    }

    #[test]
    fn check_catches_inconsistent_ids() {
        let good = tables();
        assert_eq!(good.check(), Ok(()));

        let mut t = good.clone();
        t.rules[0].lhs = NonTermId(99);
        assert!(t.check().unwrap_err().contains("unknown nonterminal"));

        let mut t = good.clone();
        t.ops[0].rules.push(RuleId(42));
        assert!(t.check().unwrap_err().contains("unknown rule R42"));

        let mut t = good.clone();
        t.ops.swap(0, 1);
        assert!(t.check().is_err());

        let mut t = good.clone();
        let reg = t.nonterm_by_name("reg").unwrap();
        t.nonterms[reg.index()].chain.push(RuleId(2));
        assert!(t.check().unwrap_err().contains("chain list of reg"));

        let mut t = good;
        t.rules[2].cost = CostExpr::Dynamic(crate::grammar::CallbackId(0));
        assert!(t.check().unwrap_err().contains("unknown cost function"));
    }

    mod prop_tests {
        use super::*;
        use crate::testutil::random_grammar;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_rule_is_indexed(t in random_grammar()) {
                prop_assert_eq!(t.check(), Ok(()));
                for nt in &t.nonterms {
                    prop_assert!(nt.decode.len() > 1, "{} has an empty decode array", nt.name);
                }
                for rule in &t.rules {
                    prop_assert_eq!(t.decode(rule.lhs, rule.local), rule.id);
                    match (rule.pattern.root_term(), rule.pattern.chain_target()) {
                        (Some(term), _) => {
                            prop_assert!(t.op(term).unwrap().rules.contains(&rule.id));
                        }
                        (None, Some(target)) => {
                            prop_assert!(t.nonterm(target).chain.contains(&rule.id));
                        }
                        (None, None) => {
                            prop_assert!(false, "rule {} has neither root nor target", rule.id);
                        }
                    }
                }
            }
        }
    }
}
