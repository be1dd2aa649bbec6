use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn letter(&self) -> char {
        match self {
            Severity::Warning => 'W',
            Severity::Error => 'E',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    /// 1-indexed line number
    pub line: usize,
    /// 1-indexed column
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Fatal grammar problems. Any of these stops `finalize()` from producing a grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("changed arity of terminal {term} from {from} to {to}")]
    ArityConflict { term: String, from: usize, to: usize },
    #[error("duplicate terminal id {id} ({first} and {second})")]
    DuplicateTermId {
        id: u32,
        first: String,
        second: String,
    },
    #[error("no start symbol")]
    NoStartSymbol,
    #[error("chain rule cycle: {}", .path.join(" -> "))]
    ChainCycle { path: Vec<String> },
    #[error("nonterminal {0} has no rules")]
    NonTermWithoutRules(String),
    #[error("malformed pattern: {0}")]
    MalformedPattern(String),
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// Non-fatal findings; they are reported next to a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarWarning {
    #[error("unreachable nonterm {0}")]
    UnreachableNonTerm(String),
    #[error("unused terminal {0}")]
    UnusedTerminal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error(GrammarError),
    Warning(GrammarWarning),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub location: Option<Location>,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn error(error: GrammarError, location: Option<Location>) -> Self {
        Self {
            location,
            kind: DiagnosticKind::Error(error),
        }
    }

    pub fn warning(warning: GrammarWarning, location: Option<Location>) -> Self {
        Self {
            location,
            kind: DiagnosticKind::Warning(warning),
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            DiagnosticKind::Error(_) => Severity::Error,
            DiagnosticKind::Warning(_) => Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    pub fn message(&self) -> String {
        match &self.kind {
            DiagnosticKind::Error(e) => e.to_string(),
            DiagnosticKind::Warning(w) => w.to_string(),
        }
    }

    /// Diagnostics without a location sort after located ones.
    pub fn sort_key(&self) -> (bool, Option<Location>) {
        (self.location.is_none(), self.location)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{}: {}: {}", loc, self.severity(), self.message()),
            None => write!(f, "{}: {}", self.severity(), self.message()),
        }
    }
}

/// Every diagnostic collected by a failed `finalize()`, warnings included.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("grammar has {} error(s)", .diagnostics.iter().filter(|d| d.is_error()).count())]
pub struct GrammarErrors {
    pub diagnostics: Vec<Diagnostic>,
}

impl GrammarErrors {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &GrammarError> {
        self.diagnostics.iter().filter_map(|d| match &d.kind {
            DiagnosticKind::Error(e) => Some(e),
            DiagnosticKind::Warning(_) => None,
        })
    }
}
