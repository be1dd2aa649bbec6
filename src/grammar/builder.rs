//! Incremental grammar construction and validation.
//!
//! Terminals and nonterminals are created lazily the first time a pattern or
//! rule mentions them. Problems found while building are recorded rather
//! than returned, and `finalize()` reports everything at once.

use std::collections::{HashMap, HashSet};

use crate::diagnostic::{Diagnostic, GrammarError, GrammarErrors, GrammarWarning, Location};
use crate::tables::CompiledTables;

use super::{ActionId, CallbackId, CostExpr, Grammar, NonTerm, NonTermId, Rule, RuleId, Term, TermId, Tree};

/// Cost as written in a rule declaration; dynamic costs are named here and
/// interned into `CallbackId`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cost {
    Const(u32),
    Dynamic(String),
}

impl Default for Cost {
    fn default() -> Self {
        Cost::Const(0)
    }
}

/// A pattern under construction. Terminals are referenced by builder slot
/// because their numbers are only fixed by `finalize()`.
#[derive(Debug, Clone)]
pub struct Pattern {
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Leaf(NonTermId),
    Op { term: usize, kids: Vec<Pattern> },
}

#[derive(Debug)]
struct TermDecl {
    name: String,
    number: Option<u32>,
    arity: Option<u8>,
    location: Option<Location>,
}

#[derive(Debug)]
struct NonTermDecl {
    name: String,
    location: Option<Location>,
}

#[derive(Debug)]
struct RuleDecl {
    lhs: NonTermId,
    pattern: Pattern,
    cost: CostExpr,
    action: Option<ActionId>,
    location: Option<Location>,
}

/// A grammar that passed validation, plus the warnings it produced.
#[derive(Debug, Clone)]
pub struct Validated {
    pub grammar: Grammar,
    pub warnings: Vec<Diagnostic>,
}

impl Validated {
    pub fn compile(&self) -> CompiledTables {
        crate::tables::compile(&self.grammar)
    }
}

#[derive(Debug, Default)]
pub struct GrammarBuilder {
    terms: Vec<TermDecl>,
    term_index: HashMap<String, usize>,
    nonterms: Vec<NonTermDecl>,
    nonterm_index: HashMap<String, NonTermId>,
    rules: Vec<RuleDecl>,
    start: Option<NonTermId>,
    cost_functions: Vec<String>,
    cost_index: HashMap<String, u32>,
    actions: Vec<String>,
    action_index: HashMap<String, u32>,
    conflicts: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a terminal. Re-declaring an existing terminal with a number
    /// replaces its number; without a number it is a no-op.
    pub fn declare_term(&mut self, name: &str, number: Option<u32>, location: Option<Location>) {
        let slot = self.term_slot(name, location);
        if number.is_some() {
            self.terms[slot].number = number;
        }
    }

    pub fn is_term(&self, name: &str) -> bool {
        self.term_index.contains_key(name)
    }

    /// Declare the start nonterminal explicitly. The last declaration wins.
    pub fn start(&mut self, name: &str, location: Option<Location>) {
        let id = self.nonterm(name, location);
        self.start = Some(id);
    }

    pub fn nonterm(&mut self, name: &str, location: Option<Location>) -> NonTermId {
        if let Some(&id) = self.nonterm_index.get(name) {
            return id;
        }
        if self.term_index.contains_key(name) {
            self.report_conflict(name, location);
        }
        let id = NonTermId(self.nonterms.len() as u32);
        self.nonterms.push(NonTermDecl {
            name: name.to_string(),
            location,
        });
        self.nonterm_index.insert(name.to_string(), id);
        id
    }

    /// A nonterminal placeholder.
    pub fn leaf(&mut self, name: &str, location: Option<Location>) -> Pattern {
        let id = self.nonterm(name, location);
        Pattern {
            kind: PatternKind::Leaf(id),
        }
    }

    /// An operator node. The first use fixes the terminal's arity.
    pub fn op(&mut self, name: &str, kids: Vec<Pattern>, location: Option<Location>) -> Pattern {
        let slot = self.term_slot(name, location);
        if kids.len() > 2 {
            self.diagnostics.push(Diagnostic::error(
                GrammarError::MalformedPattern(format!(
                    "operator {name} has {} operands (at most 2 are supported)",
                    kids.len()
                )),
                location,
            ));
        } else {
            let arity = kids.len() as u8;
            let term = &mut self.terms[slot];
            match term.arity {
                None => term.arity = Some(arity),
                Some(prev) if prev != arity => {
                    let error = GrammarError::ArityConflict {
                        term: term.name.clone(),
                        from: prev as usize,
                        to: arity as usize,
                    };
                    self.diagnostics.push(Diagnostic::error(error, location));
                }
                Some(_) => {}
            }
        }
        Pattern {
            kind: PatternKind::Op { term: slot, kids },
        }
    }

    pub fn rule(
        &mut self,
        lhs: &str,
        pattern: Pattern,
        cost: Cost,
        action: Option<&str>,
        location: Option<Location>,
    ) -> RuleId {
        let lhs = self.nonterm(lhs, location);
        let cost = match cost {
            Cost::Const(c) => CostExpr::Const(c),
            Cost::Dynamic(name) => CostExpr::Dynamic(CallbackId(intern(
                &mut self.cost_functions,
                &mut self.cost_index,
                &name,
            ))),
        };
        let action = action.map(|name| ActionId(intern(&mut self.actions, &mut self.action_index, name)));
        self.rules.push(RuleDecl {
            lhs,
            pattern,
            cost,
            action,
            location,
        });
        RuleId(self.rules.len() as u32)
    }

    /// Record a diagnostic found outside the builder (e.g. a syntax error).
    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }

    fn term_slot(&mut self, name: &str, location: Option<Location>) -> usize {
        if let Some(&slot) = self.term_index.get(name) {
            return slot;
        }
        if self.nonterm_index.contains_key(name) {
            self.report_conflict(name, location);
        }
        let slot = self.terms.len();
        self.terms.push(TermDecl {
            name: name.to_string(),
            number: None,
            arity: None,
            location,
        });
        self.term_index.insert(name.to_string(), slot);
        slot
    }

    fn report_conflict(&mut self, name: &str, location: Option<Location>) {
        if self.conflicts.insert(name.to_string()) {
            self.diagnostics.push(Diagnostic::error(
                GrammarError::MalformedPattern(format!(
                    "{name} is used both as a terminal and as a nonterminal"
                )),
                location,
            ));
        }
    }

    /// Validate and freeze the grammar.
    pub fn finalize(self) -> Result<Validated, GrammarErrors> {
        let GrammarBuilder {
            terms: term_decls,
            nonterms: nonterm_decls,
            rules: rule_decls,
            start,
            cost_functions,
            actions,
            mut diagnostics,
            ..
        } = self;

        let numbers = assign_term_numbers(&term_decls, &mut diagnostics);
        let terms: Vec<Term> = term_decls
            .iter()
            .zip(&numbers)
            .map(|(decl, &number)| Term {
                name: decl.name.clone(),
                id: TermId(number),
                arity: decl.arity,
            })
            .collect();

        let mut nonterms: Vec<NonTerm> = nonterm_decls
            .iter()
            .enumerate()
            .map(|(i, decl)| NonTerm {
                name: decl.name.clone(),
                id: NonTermId(i as u32),
                rules: Vec::new(),
                chain: Vec::new(),
                reached: false,
            })
            .collect();

        let rules: Vec<Rule> = rule_decls
            .into_iter()
            .enumerate()
            .map(|(i, decl)| Rule {
                id: RuleId(i as u32 + 1),
                lhs: decl.lhs,
                pattern: resolve(&decl.pattern, &numbers),
                cost: decl.cost,
                action: decl.action,
                location: decl.location,
            })
            .collect();

        for rule in &rules {
            nonterms[rule.lhs.index()].rules.push(rule.id);
            if let Some(target) = rule.pattern.chain_target() {
                nonterms[target.index()].chain.push(rule.id);
            }
        }

        for (nt, decl) in nonterms.iter().zip(&nonterm_decls) {
            if nt.rules.is_empty() {
                diagnostics.push(Diagnostic::error(
                    GrammarError::NonTermWithoutRules(nt.name.clone()),
                    decl.location,
                ));
            }
        }

        let start = if rules.is_empty() {
            diagnostics.push(Diagnostic::error(GrammarError::NoStartSymbol, None));
            None
        } else {
            start.or_else(|| (!nonterms.is_empty()).then_some(NonTermId(0)))
        };

        if let Some(start) = start {
            mark_reached(start, &mut nonterms, &rules);
            for (nt, decl) in nonterms.iter().zip(&nonterm_decls) {
                if !nt.reached {
                    diagnostics.push(Diagnostic::warning(
                        GrammarWarning::UnreachableNonTerm(nt.name.clone()),
                        decl.location,
                    ));
                }
            }
        }

        for decl in &term_decls {
            if decl.arity.is_none() {
                diagnostics.push(Diagnostic::warning(
                    GrammarWarning::UnusedTerminal(decl.name.clone()),
                    decl.location,
                ));
            }
        }

        if let Some(path) = find_chain_cycle(&nonterms, &rules) {
            // The rule closing the cycle: `path[n-2]: path[0]`.
            let closing = path[path.len() - 2];
            let location = rules
                .iter()
                .find(|r| r.lhs == closing && r.pattern.chain_target() == Some(path[0]))
                .and_then(|r| r.location);
            let names = path.iter().map(|nt| nonterms[nt.index()].name.clone()).collect();
            diagnostics.push(Diagnostic::error(GrammarError::ChainCycle { path: names }, location));
        }

        if diagnostics.iter().any(|d| d.is_error()) {
            return Err(GrammarErrors { diagnostics });
        }

        let Some(start) = start else {
            return Err(GrammarErrors { diagnostics });
        };

        log::debug!(
            "grammar: {} terminals, {} nonterminals, {} rules, start {}",
            terms.len(),
            nonterms.len(),
            rules.len(),
            nonterms[start.index()].name
        );

        Ok(Validated {
            grammar: Grammar {
                terms,
                nonterms,
                rules,
                start,
                cost_functions,
                actions,
            },
            warnings: diagnostics,
        })
    }
}

fn intern(names: &mut Vec<String>, index: &mut HashMap<String, u32>, name: &str) -> u32 {
    if let Some(&id) = index.get(name) {
        return id;
    }
    let id = names.len() as u32;
    names.push(name.to_string());
    index.insert(name.to_string(), id);
    id
}

/// Explicit numbers are kept; the rest get the lowest unused positive number
/// in declaration order.
fn assign_term_numbers(decls: &[TermDecl], diagnostics: &mut Vec<Diagnostic>) -> Vec<u32> {
    let mut owner: HashMap<u32, usize> = HashMap::new();
    for (slot, decl) in decls.iter().enumerate() {
        let Some(number) = decl.number else { continue };
        if let Some(&first) = owner.get(&number) {
            diagnostics.push(Diagnostic::error(
                GrammarError::DuplicateTermId {
                    id: number,
                    first: decls[first].name.clone(),
                    second: decl.name.clone(),
                },
                decl.location,
            ));
        } else {
            owner.insert(number, slot);
        }
    }

    let mut next = 1u32;
    decls
        .iter()
        .map(|decl| match decl.number {
            Some(number) => number,
            None => {
                while owner.contains_key(&next) {
                    next += 1;
                }
                let number = next;
                owner.insert(number, usize::MAX);
                number
            }
        })
        .collect()
}

fn resolve(pattern: &Pattern, numbers: &[u32]) -> Tree {
    match &pattern.kind {
        PatternKind::Leaf(nt) => Tree::Leaf(*nt),
        PatternKind::Op { term, kids } => {
            let mut kids = kids.iter().map(|k| Box::new(resolve(k, numbers)));
            Tree::Op(TermId(numbers[*term]), kids.next(), kids.next())
        }
    }
}

fn mark_reached(start: NonTermId, nonterms: &mut [NonTerm], rules: &[Rule]) {
    let mut work = vec![start];
    nonterms[start.index()].reached = true;
    while let Some(nt) = work.pop() {
        for &rid in &nonterms[nt.index()].rules.clone() {
            for leaf in rules[rid.index()].pattern.leaves() {
                let target = &mut nonterms[leaf.index()];
                if !target.reached {
                    target.reached = true;
                    work.push(leaf);
                }
            }
        }
    }
}

/// Returns the nonterminals of one chain cycle, first element repeated at the end.
fn find_chain_cycle(nonterms: &[NonTerm], rules: &[Rule]) -> Option<Vec<NonTermId>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    // Edge lhs -> rhs for every chain rule `lhs: rhs`.
    let mut edges: Vec<Vec<NonTermId>> = vec![Vec::new(); nonterms.len()];
    for rule in rules {
        if let Some(target) = rule.pattern.chain_target() {
            edges[rule.lhs.index()].push(target);
        }
    }

    fn visit(
        nt: NonTermId,
        edges: &[Vec<NonTermId>],
        marks: &mut [Mark],
        stack: &mut Vec<NonTermId>,
    ) -> Option<Vec<NonTermId>> {
        marks[nt.index()] = Mark::Active;
        stack.push(nt);
        for &next in &edges[nt.index()] {
            match marks[next.index()] {
                Mark::Active => {
                    let from = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut path = stack[from..].to_vec();
                    path.push(next);
                    return Some(path);
                }
                Mark::New => {
                    if let Some(path) = visit(next, edges, marks, stack) {
                        return Some(path);
                    }
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks[nt.index()] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::New; nonterms.len()];
    let mut stack = Vec::new();
    for nt in nonterms {
        if marks[nt.id.index()] == Mark::New {
            if let Some(path) = visit(nt.id, &edges, &mut marks, &mut stack) {
                return Some(path);
            }
        }
    }
    None
}
