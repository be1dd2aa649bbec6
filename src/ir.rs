//! Host tree adapter and a small arena expression tree.
//!
//! The matcher only needs to ask a node for its operator number and its
//! children, so any IR can be labeled by implementing `IrTree` for it.
//! `ExprTree` is the implementation used by the command line and the tests;
//! it reads the notation `ADD(CONST[3], LOAD(REG))`, where `[n]` attaches an
//! integer payload that dynamic cost functions can inspect.

use std::fmt::Debug;
use std::hash::Hash;

use thiserror::Error;

use crate::diagnostic::Location;
use crate::grammar::TermId;
use crate::grammar::lexer::{Lexer, Spanned, Token};
use crate::tables::CompiledTables;

pub trait IrTree {
    type Node: Copy + Eq + Hash + Debug;

    fn op(&self, node: Self::Node) -> TermId;

    /// The `index`-th operand; only asked for `index < arity(op(node))`.
    fn child(&self, node: Self::Node, index: usize) -> Option<Self::Node>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprNode {
    pub op: TermId,
    pub kids: Vec<NodeId>,
    pub value: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ExprTree {
    nodes: Vec<ExprNode>,
}

/// Deepest operand nesting the text notation accepts. Deeper trees can still
/// be built through the `ExprTree` builder methods.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeParseError {
    #[error("{location}: unknown operator {name}")]
    UnknownOperator { name: String, location: Location },
    #[error("{location}: operator {name} takes {expected} operand(s), found {found}")]
    ArityMismatch {
        name: String,
        expected: u8,
        found: usize,
        location: Location,
    },
    #[error("{location}: {message}")]
    Syntax { message: String, location: Location },
    #[error("{location}: operands nested deeper than {max}", max = MAX_NESTING)]
    TooDeep { location: Location },
    #[error("empty tree")]
    Empty,
}

impl ExprTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: TermId, kids: Vec<NodeId>, value: Option<i64>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ExprNode { op, kids, value });
        id
    }

    pub fn leaf(&mut self, op: TermId) -> NodeId {
        self.push(op, Vec::new(), None)
    }

    pub fn leaf_with(&mut self, op: TermId, value: i64) -> NodeId {
        self.push(op, Vec::new(), Some(value))
    }

    pub fn unary(&mut self, op: TermId, kid: NodeId) -> NodeId {
        self.push(op, vec![kid], None)
    }

    pub fn binary(&mut self, op: TermId, left: NodeId, right: NodeId) -> NodeId {
        self.push(op, vec![left, right], None)
    }

    pub fn node(&self, id: NodeId) -> &ExprNode {
        &self.nodes[id.0 as usize]
    }

    pub fn value(&self, id: NodeId) -> Option<i64> {
        self.node(id).value
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parse the text notation, resolving operator names against `tables`.
    /// Returns the tree and its root.
    pub fn parse(text: &str, tables: &CompiledTables) -> Result<(ExprTree, NodeId), TreeParseError> {
        let tokens = Lexer::new(text).tokenize();
        let mut parser = TreeParser {
            tokens,
            pos: 0,
            depth: 0,
            tables,
            tree: ExprTree::new(),
        };
        let root = parser.parse_node()?;
        if let Some(extra) = parser.tokens.get(parser.pos) {
            return Err(TreeParseError::Syntax {
                message: "unexpected trailing input".to_string(),
                location: extra.location,
            });
        }
        Ok((parser.tree, root))
    }

    /// Render a subtree back to the text notation.
    pub fn render(&self, id: NodeId, tables: &CompiledTables) -> String {
        let node = self.node(id);
        let mut out = tables.term_name(node.op);
        if let Some(v) = node.value {
            out.push_str(&format!("[{v}]"));
        }
        if !node.kids.is_empty() {
            let kids: Vec<String> = node.kids.iter().map(|&k| self.render(k, tables)).collect();
            out.push_str(&format!("({})", kids.join(", ")));
        }
        out
    }
}

impl IrTree for ExprTree {
    type Node = NodeId;

    fn op(&self, node: NodeId) -> TermId {
        self.node(node).op
    }

    fn child(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.node(node).kids.get(index).copied()
    }
}

struct TreeParser<'t> {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    tables: &'t CompiledTables,
    tree: ExprTree,
}

impl TreeParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn location(&self) -> Location {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(Location::new(1, 1), |s| s.location)
    }

    fn syntax<T>(&self, message: &str) -> Result<T, TreeParseError> {
        Err(TreeParseError::Syntax {
            message: message.to_string(),
            location: self.location(),
        })
    }

    fn expect(&mut self, token: Token, message: &str) -> Result<(), TreeParseError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            self.syntax(message)
        }
    }

    fn parse_node(&mut self) -> Result<NodeId, TreeParseError> {
        let location = self.location();
        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            None if self.tokens.is_empty() => return Err(TreeParseError::Empty),
            _ => return self.syntax("expected an operator name"),
        };
        self.pos += 1;
        let op = self
            .tables
            .term_by_name(&name)
            .ok_or_else(|| TreeParseError::UnknownOperator {
                name: name.clone(),
                location,
            })?;

        let mut value = None;
        if self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            match self.peek() {
                Some(&Token::Int(n)) => {
                    self.pos += 1;
                    value = Some(n);
                }
                _ => return self.syntax("expected an integer payload"),
            }
            self.expect(Token::RBracket, "expected `]`")?;
        }

        let mut kids = Vec::new();
        if self.peek() == Some(&Token::LParen) {
            if self.depth == MAX_NESTING {
                return Err(TreeParseError::TooDeep { location });
            }
            self.pos += 1;
            self.depth += 1;
            kids.push(self.parse_node()?);
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                kids.push(self.parse_node()?);
            }
            self.expect(Token::RParen, "expected `)` or `,`")?;
            self.depth -= 1;
        }

        if let Some(expected) = self.tables.arity(op) {
            if kids.len() != expected as usize {
                return Err(TreeParseError::ArityMismatch {
                    name,
                    expected,
                    found: kids.len(),
                    location,
                });
            }
        }
        Ok(self.tree.push(op, kids, value))
    }
}
