//! Grammar text parser.
//!
//! Drives a `GrammarBuilder` from a token stream. Syntax errors become
//! diagnostics on the builder and parsing resumes at the next `;` or
//! directive, so one run reports as many problems as possible.

use crate::diagnostic::{Diagnostic, GrammarError, GrammarErrors, Location};

use super::builder::{Cost, GrammarBuilder, Pattern, Validated};
use super::lexer::{Lexer, Spanned, Token};

/// Parse grammar text into a builder. The builder may already hold syntax
/// errors; `finalize()` reports them together with validation problems.
pub fn parse_grammar(source: &str) -> GrammarBuilder {
    let mut builder = GrammarBuilder::new();
    parse_into(source, &mut builder);
    builder
}

/// Parse into an existing builder (e.g. one with predeclared terminals).
pub fn parse_into(source: &str, builder: &mut GrammarBuilder) {
    let tokens = Lexer::new(source).tokenize();
    let mut parser = Parser {
        tokens,
        pos: 0,
        builder,
    };
    parser.parse();
}

/// Parse and validate in one step.
pub fn load_grammar(source: &str) -> Result<Validated, GrammarErrors> {
    parse_grammar(source).finalize()
}

type ParseResult<T> = Result<T, Diagnostic>;

struct Parser<'b> {
    tokens: Vec<Spanned>,
    pos: usize,
    builder: &'b mut GrammarBuilder,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    /// A rule starts with `name :`; anything else in a `%term` list is a terminal.
    fn at_rule_start(&self) -> bool {
        matches!(self.peek(), Some(Token::Ident(_))) && self.peek_at(1) == Some(&Token::Colon)
    }

    fn location(&self) -> Option<Location> {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.location)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        Some(tok)
    }

    fn error<T>(&self, message: String) -> ParseResult<T> {
        Err(Diagnostic::error(GrammarError::Syntax(message), self.location()))
    }

    fn expect(&mut self, expected: Token, what: &str) -> ParseResult<()> {
        if self.peek() == Some(&expected) {
            self.advance();
            Ok(())
        } else {
            self.error(format!("expected {what}, found {}", self.describe()))
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<(String, Location)> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                let Some(Spanned {
                    token: Token::Ident(name),
                    location,
                }) = self.advance()
                else {
                    unreachable!("peeked an identifier")
                };
                Ok((name, location))
            }
            _ => self.error(format!("expected {what}, found {}", self.describe())),
        }
    }

    fn expect_number(&mut self, what: &str) -> ParseResult<u32> {
        match self.peek() {
            Some(&Token::Int(n)) => match u32::try_from(n) {
                Ok(n) => {
                    self.advance();
                    Ok(n)
                }
                Err(_) => self.error(format!("{what} out of range: {n}")),
            },
            _ => self.error(format!("expected {what}, found {}", self.describe())),
        }
    }

    fn describe(&self) -> String {
        match self.peek() {
            None => "end of input".to_string(),
            Some(Token::Ident(s)) => format!("`{s}`"),
            Some(Token::Int(n)) => format!("`{n}`"),
            Some(Token::Directive(d)) => format!("`%{d}`"),
            Some(Token::Separator) => "`%%`".to_string(),
            Some(Token::LParen) => "`(`".to_string(),
            Some(Token::RParen) => "`)`".to_string(),
            Some(Token::LBracket) => "`[`".to_string(),
            Some(Token::RBracket) => "`]`".to_string(),
            Some(Token::Comma) => "`,`".to_string(),
            Some(Token::Colon) => "`:`".to_string(),
            Some(Token::Semicolon) => "`;`".to_string(),
            Some(Token::Equals) => "`=`".to_string(),
            Some(Token::Arrow) => "`=>`".to_string(),
            Some(Token::Unknown(c)) => format!("`{c}`"),
        }
    }

    fn parse(&mut self) {
        while let Some(tok) = self.peek() {
            let result = match tok {
                Token::Separator => {
                    self.advance();
                    Ok(())
                }
                Token::Directive(_) => self.parse_directive(),
                Token::Ident(_) => self.parse_rule(),
                _ => self.error(format!("expected a rule or directive, found {}", self.describe())),
            };
            if let Err(diagnostic) = result {
                self.builder.report(diagnostic);
                self.recover();
            }
        }
    }

    /// Skip past the next `;`, or up to the next directive.
    fn recover(&mut self) {
        while let Some(tok) = self.peek() {
            match tok {
                Token::Semicolon => {
                    self.advance();
                    return;
                }
                Token::Directive(_) | Token::Separator => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_directive(&mut self) -> ParseResult<()> {
        let location = self.location();
        let Some(Spanned {
            token: Token::Directive(name),
            ..
        }) = self.advance()
        else {
            return self.error("expected a directive".to_string());
        };
        match name.as_str() {
            "term" => {
                while matches!(self.peek(), Some(Token::Ident(_))) && !self.at_rule_start() {
                    let (term, loc) = self.expect_ident("terminal name")?;
                    let number = if self.peek() == Some(&Token::Equals) {
                        self.advance();
                        Some(self.expect_number("terminal number")?)
                    } else {
                        None
                    };
                    self.builder.declare_term(&term, number, Some(loc));
                    if self.peek() == Some(&Token::Comma) {
                        self.advance();
                    }
                }
                if self.peek() == Some(&Token::Semicolon) {
                    self.advance();
                }
                Ok(())
            }
            "start" => {
                let (nt, loc) = self.expect_ident("start nonterminal")?;
                self.builder.start(&nt, Some(loc));
                Ok(())
            }
            other => Err(Diagnostic::error(
                GrammarError::Syntax(format!("unknown directive %{other}")),
                location,
            )),
        }
    }

    fn parse_rule(&mut self) -> ParseResult<()> {
        let (lhs, location) = self.expect_ident("rule name")?;
        self.expect(Token::Colon, "`:`")?;
        // Referencing the lhs before the pattern makes the first rule's lhs the
        // default start symbol.
        self.builder.nonterm(&lhs, Some(location));
        let pattern = self.parse_pattern()?;

        let mut constant = None;
        if self.peek() == Some(&Token::Equals) {
            self.advance();
            constant = Some(self.expect_number("cost")?);
        }
        let mut dynamic = None;
        if matches!(self.peek(), Some(Token::Ident(kw)) if kw == "cost") {
            self.advance();
            dynamic = Some(self.expect_ident("cost function name")?.0);
        }
        let cost = match (constant, dynamic) {
            (Some(_), Some(_)) => {
                return Err(Diagnostic::error(
                    GrammarError::MalformedPattern(format!(
                        "rule for {lhs} has both a constant and a dynamic cost"
                    )),
                    Some(location),
                ));
            }
            (Some(c), None) => Cost::Const(c),
            (None, Some(name)) => Cost::Dynamic(name),
            (None, None) => Cost::default(),
        };

        let action = if self.peek() == Some(&Token::Arrow) {
            self.advance();
            Some(self.expect_ident("action name")?.0)
        } else {
            None
        };
        self.expect(Token::Semicolon, "`;`")?;

        self.builder
            .rule(&lhs, pattern, cost, action.as_deref(), Some(location));
        Ok(())
    }

    fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        let (name, location) = self.expect_ident("pattern")?;
        if self.peek() != Some(&Token::LParen) {
            return Ok(if self.builder.is_term(&name) {
                self.builder.op(&name, Vec::new(), Some(location))
            } else {
                self.builder.leaf(&name, Some(location))
            });
        }

        self.advance();
        let mut kids = vec![self.parse_pattern()?];
        while self.peek() == Some(&Token::Comma) {
            self.advance();
            kids.push(self.parse_pattern()?);
        }
        self.expect(Token::RParen, "`)` or `,`")?;
        Ok(self.builder.op(&name, kids, Some(location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticKind;
    use crate::grammar::{CostExpr, TermId, Tree};

    const SAMPLE: &str = "
        %term CONST ADD=7 LOAD
        %start stmt
        %%
        stmt: reg;
        reg:  CONST = 1;
        reg:  ADD(reg, reg) = 2 => add;
        reg:  LOAD(ADD(reg, CONST)) cost disp => load_disp;
    ";

    #[test]
    fn test_parse_sample_grammar() {
        let v = load_grammar(SAMPLE).unwrap();
        let g = &v.grammar;
        assert!(v.warnings.is_empty(), "{:?}", v.warnings);
        assert_eq!(g.nonterm(g.start()).name, "stmt");
        assert_eq!(g.rules().len(), 4);
        assert_eq!(g.term_by_name("ADD").unwrap().id, TermId(7));
        assert_eq!(g.term_by_name("CONST").unwrap().id, TermId(1));
        assert_eq!(g.term_by_name("LOAD").unwrap().id, TermId(2));
        assert_eq!(g.rules()[0].pattern, Tree::Leaf(g.nonterm_by_name("reg").unwrap().id));
        assert_eq!(g.rules()[1].cost, CostExpr::Const(1));
        assert_eq!(g.rule_string(&g.rules()[3]), "reg: LOAD(ADD(reg, CONST))");
        assert_eq!(g.cost_functions(), &["disp".to_string()]);
        assert_eq!(g.actions(), &["add".to_string(), "load_disp".to_string()]);
    }

    #[test]
    fn test_rule_right_after_term_line() {
        let v = load_grammar("%term C\nr: C = 1;").unwrap();
        let g = &v.grammar;
        assert!(v.warnings.is_empty(), "{:?}", v.warnings);
        assert_eq!(g.terms().len(), 1);
        assert_eq!(g.nonterm(g.start()).name, "r");
        assert_eq!(g.rules()[0].cost, CostExpr::Const(1));
    }

    #[test]
    fn test_term_list_spans_lines_until_a_rule() {
        let v = load_grammar("%term A=40,\n  B\nr: A = 1;\nr: B(r);").unwrap();
        let g = &v.grammar;
        assert_eq!(g.term_by_name("A").unwrap().id, TermId(40));
        assert_eq!(g.term_by_name("B").unwrap().arity, Some(1));
        assert!(g.nonterm_by_name("r").is_some());
        assert!(g.term_by_name("r").is_none());
    }

    #[test]
    fn test_term_list_may_end_with_semicolon() {
        let v = load_grammar("%term C;\nr: C;").unwrap();
        assert_eq!(v.grammar.rules().len(), 1);
    }

    #[test]
    fn test_missing_cost_is_zero() {
        let v = load_grammar("%term C\nr: C;").unwrap();
        assert_eq!(v.grammar.rules()[0].cost, CostExpr::Const(0));
    }

    #[test]
    fn test_first_lhs_is_default_start() {
        let v = load_grammar("%term C\nstmt: r;\nr: C = 1;").unwrap();
        assert_eq!(v.grammar.nonterm(v.grammar.start()).name, "stmt");
    }

    #[test]
    fn test_undeclared_operator_with_operands_becomes_terminal() {
        let v = load_grammar("%term C\nr: C = 1;\nr: NEG(r) = 1;").unwrap();
        assert_eq!(v.grammar.term_by_name("NEG").unwrap().arity, Some(1));
    }

    #[test]
    fn test_syntax_errors_recover_and_accumulate() {
        let src = "%term C\nr: C = ;\nr: C(r = 1;\nr: C = 1;";
        let err = load_grammar(src).unwrap_err();
        let syntax: Vec<_> = err
            .diagnostics
            .iter()
            .filter(|d| matches!(d.kind, DiagnosticKind::Error(GrammarError::Syntax(_))))
            .collect();
        assert_eq!(syntax.len(), 2);
        assert_eq!(syntax[0].location, Some(Location::new(2, 8)));
        assert_eq!(syntax[0].message(), "syntax error: expected cost, found `;`");
        assert_eq!(syntax[1].location.map(|l| l.line), Some(3));
    }

    #[test]
    fn test_both_costs_is_malformed() {
        let err = load_grammar("%term C\nr: C = 1 cost f;").unwrap_err();
        assert!(
            err.errors()
                .any(|e| matches!(e, GrammarError::MalformedPattern(m) if m.contains("both")))
        );
    }

    #[test]
    fn test_unknown_directive() {
        let err = load_grammar("%frobnicate x\n%term C\nr: C;").unwrap_err();
        assert_eq!(
            err.errors().cloned().collect::<Vec<_>>(),
            vec![GrammarError::Syntax("unknown directive %frobnicate".into())]
        );
    }

    #[test]
    fn test_arity_conflict_location_from_text() {
        let err = load_grammar("%term C\nr: C = 1;\nr: NEG(r);\nr: NEG(r, r);").unwrap_err();
        let d = err.diagnostics.iter().find(|d| d.is_error()).unwrap();
        assert_eq!(d.location, Some(Location::new(4, 4)));
        assert_eq!(d.message(), "changed arity of terminal NEG from 1 to 2");
    }

    #[test]
    fn test_parse_into_predeclared_builder() {
        let mut b = GrammarBuilder::new();
        b.declare_term("C", Some(40), None);
        parse_into("r: C = 1;", &mut b);
        let g = b.finalize().unwrap().grammar;
        assert_eq!(g.terms()[0].id, TermId(40));
        assert_eq!(g.terms()[0].arity, Some(0));
    }
}
