//! Token stream to surface AST. Builds directly into the shared node graph
//! rather than a separate tree type, since AST and runtime value share one
//! representation.

use std::rc::Rc;

use crate::{
    error::{Position, ReflexError, ReflexResult},
    intern::{AttrId, Interner},
    lexer::{Lexer, Token, TokenKind},
    node::{BinOp, Defs, Graph, NodeId, NodeKind},
};

pub fn parse_module(src: &str, graph: &mut Graph, interner: &mut Interner) -> ReflexResult<NodeId> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0, graph, interner };
    let position = parser.here();
    let defs = parser.parse_defs(false, &TokenKind::Eof)?;
    parser.expect(&TokenKind::Eof)?;
    Ok(parser.graph.alloc(NodeKind::Block(defs), position))
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    graph: &'a mut Graph,
    interner: &'a mut Interner,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn here(&self) -> Position {
        self.peek().position
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: &TokenKind) -> ReflexResult<Token> {
        if &self.peek().kind == kind {
            Ok(self.bump())
        } else {
            Err(ReflexError::Parse {
                message: format!("expected {kind:?}, found {:?}", self.peek().kind),
                position: self.here(),
            })
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline | TokenKind::Comma) {
            self.bump();
        }
    }

    /// `defs := (def (',' | NEWLINE)*)*`, stopping at `terminator`.
    /// `allow_eager` gates `:=` — only true inside a `Call`'s argument list.
    fn parse_defs(&mut self, allow_eager: bool, terminator: &TokenKind) -> ReflexResult<Defs> {
        let mut defs = Defs::new();
        self.skip_separators();
        while &self.peek().kind != terminator {
            let (attr, attr_name, value) = self.parse_def(allow_eager)?;
            if defs.contains_key(&attr) {
                return Err(ReflexError::Parse {
                    message: format!("duplicate attribute `{attr_name}` in one block"),
                    position: self.here(),
                });
            }
            defs.insert(attr, value);
            self.skip_separators();
        }
        Ok(defs)
    }

    fn parse_def(&mut self, allow_eager: bool) -> ReflexResult<(AttrId, String, NodeId)> {
        let position = self.here();
        let name = match self.bump().kind {
            TokenKind::Ident(name) => name,
            other => {
                return Err(ReflexError::Parse {
                    message: format!("expected an attribute name, found {other:?}"),
                    position,
                });
            }
        };
        let attr = self.interner.intern(&name);

        let value = match self.bump().kind {
            TokenKind::Eq => self.parse_expr()?,
            TokenKind::ColonEq => {
                if !allow_eager {
                    return Err(ReflexError::Parse {
                        message: "eager definition (`:=`) is only allowed inside a call's arguments".to_owned(),
                        position,
                    });
                }
                let inner = self.parse_expr()?;
                self.graph.alloc(NodeKind::Eager(inner), position)
            }
            TokenKind::LArrow => {
                let target_position = self.here();
                match self.bump().kind {
                    TokenKind::Ident(target) => {
                        let target_attr = self.interner.intern(&target);
                        self.graph.alloc(NodeKind::CloneAttr(target_attr), position)
                    }
                    other => {
                        return Err(ReflexError::Parse {
                            message: format!("`<-` must be followed by a bare attribute name, found {other:?}"),
                            position: target_position,
                        });
                    }
                }
            }
            other => {
                return Err(ReflexError::Parse {
                    message: format!("expected `=`, `:=`, or `<-` after `{name}`, found {other:?}"),
                    position,
                });
            }
        };
        Ok((attr, name, value))
    }

    fn parse_expr(&mut self) -> ReflexResult<NodeId> {
        self.parse_ternary()
    }

    /// `ternary := binary ('?' expr ':' expr)?`
    fn parse_ternary(&mut self) -> ReflexResult<NodeId> {
        let position = self.here();
        let cond = self.parse_binary(0)?;
        if self.peek().kind == TokenKind::Question {
            self.bump();
            let then_branch = self.parse_expr()?;
            self.expect(&TokenKind::Colon)?;
            let else_branch = self.parse_expr()?;
            Ok(self.graph.alloc(NodeKind::Conditional { cond, then_branch, else_branch }, position))
        } else {
            Ok(cond)
        }
    }

    /// Precedence-climbing binary parse. `binary := postfix (OP binary)*`,
    /// all operators left-associative.
    fn parse_binary(&mut self, min_prec: u8) -> ReflexResult<NodeId> {
        let position = self.here();
        let mut left = self.parse_postfix()?;
        while let Some((op, prec)) = binop_of(&self.peek().kind) {
            if prec < min_prec {
                break;
            }
            self.bump();
            let right = self.parse_binary(prec + 1)?;
            left = self.graph.alloc(NodeKind::BinaryOp { left, op, right }, position);
        }
        Ok(left)
    }

    /// `postfix := primary ( '.' (IDENT | '^') | '!' | '[' defs ']' | '(' defs ')' )*`
    fn parse_postfix(&mut self) -> ReflexResult<NodeId> {
        let (mut current, mut parent_depth) = self.parse_primary()?;
        loop {
            let position = self.here();
            match &self.peek().kind {
                TokenKind::Dot => {
                    self.bump();
                    match &self.peek().kind {
                        TokenKind::Caret => {
                            self.bump();
                            let Some(depth) = parent_depth else {
                                return Err(ReflexError::Parse {
                                    message: "`^` used outside a chain".to_owned(),
                                    position,
                                });
                            };
                            current = self.graph.alloc(NodeKind::Parent(depth + 1), position);
                            parent_depth = Some(depth + 1);
                        }
                        TokenKind::Ident(_) => {
                            let TokenKind::Ident(name) = self.bump().kind else { unreachable!() };
                            let attr = self.interner.intern(&name);
                            current = self.graph.alloc(NodeKind::Access { base: current, attr }, position);
                            parent_depth = None;
                        }
                        other => {
                            return Err(ReflexError::Parse {
                                message: format!("expected an attribute name or `^` after `.`, found {other:?}"),
                                position,
                            });
                        }
                    }
                }
                TokenKind::Bang => {
                    self.bump();
                    let attr = self.interner.intern("result");
                    current = self.graph.alloc(NodeKind::Access { base: current, attr }, position);
                    parent_depth = None;
                }
                TokenKind::LBracket => {
                    self.bump();
                    let defs = self.parse_defs(false, &TokenKind::RBracket)?;
                    self.expect(&TokenKind::RBracket)?;
                    current = self.graph.alloc(NodeKind::Override { base: current, defs }, position);
                    parent_depth = None;
                }
                TokenKind::LParen => {
                    self.bump();
                    let defs = self.parse_defs(true, &TokenKind::RParen)?;
                    self.expect(&TokenKind::RParen)?;
                    current = self.graph.alloc(NodeKind::Call { base: current, defs }, position);
                    parent_depth = None;
                }
                _ => break,
            }
        }
        Ok(current)
    }

    /// `primary := INT | STRING | '{' defs '}' | '@' | '^' | '^^' '.' IDENT | IDENT | '(' expr ')'`
    ///
    /// Returns the parsed node plus, when it is exactly an un-suffixed
    /// `Parent(d)`, its depth — `parse_postfix` needs that to validate a
    /// following `.^` chain.
    fn parse_primary(&mut self) -> ReflexResult<(NodeId, Option<u32>)> {
        let position = self.here();
        let id = match self.bump().kind {
            TokenKind::Int(n) => self.graph.alloc(NodeKind::IntLit(n), position),
            TokenKind::Minus => {
                let value_position = self.here();
                match self.bump().kind {
                    TokenKind::Int(n) => self.graph.alloc(NodeKind::IntLit(-n), value_position),
                    other => {
                        return Err(ReflexError::Parse {
                            message: format!("expected an integer literal after unary `-`, found {other:?}"),
                            position: value_position,
                        });
                    }
                }
            }
            TokenKind::Str(s) => self.graph.alloc(NodeKind::StringLit(Rc::from(s)), position),
            TokenKind::LBrace => {
                let defs = self.parse_defs(false, &TokenKind::RBrace)?;
                self.expect(&TokenKind::RBrace)?;
                self.graph.alloc(NodeKind::Block(defs), position)
            }
            TokenKind::At => self.graph.alloc(NodeKind::SelfRef, position),
            TokenKind::Caret => {
                let id = self.graph.alloc(NodeKind::Parent(0), position);
                return Ok((id, Some(0)));
            }
            TokenKind::Ancestor => {
                self.expect(&TokenKind::Dot)?;
                let name_position = self.here();
                match self.bump().kind {
                    TokenKind::Ident(name) => {
                        let attr = self.interner.intern(&name);
                        self.graph.alloc(NodeKind::AncestorLookup(attr), position)
                    }
                    other => {
                        return Err(ReflexError::Parse {
                            message: format!("expected an attribute name after `^^.`, found {other:?}"),
                            position: name_position,
                        });
                    }
                }
            }
            TokenKind::Ident(name) => {
                let attr = self.interner.intern(&name);
                self.graph.alloc(NodeKind::Identifier(attr), position)
            }
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                inner
            }
            other => {
                return Err(ReflexError::Parse {
                    message: format!("unexpected token {other:?}"),
                    position,
                });
            }
        };
        Ok((id, None))
    }
}

/// Maps an operator token to its `BinOp` tag and precedence, per the table
/// in the grammar (higher binds tighter; all left-associative).
fn binop_of(kind: &TokenKind) -> Option<(BinOp, u8)> {
    Some(match kind {
        TokenKind::OrOr => (BinOp::Or, 3),
        TokenKind::AndAnd => (BinOp::And, 4),
        TokenKind::EqEq => (BinOp::Eq, 5),
        TokenKind::NotEq => (BinOp::Ne, 5),
        TokenKind::Lt => (BinOp::Lt, 7),
        TokenKind::Gt => (BinOp::Gt, 7),
        TokenKind::Le => (BinOp::Le, 7),
        TokenKind::Ge => (BinOp::Ge, 7),
        TokenKind::Plus => (BinOp::Add, 10),
        TokenKind::Minus => (BinOp::Sub, 10),
        TokenKind::Star => (BinOp::Mul, 20),
        TokenKind::Slash => (BinOp::Div, 20),
        TokenKind::Percent => (BinOp::Mod, 20),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (Graph, Interner, NodeId) {
        let mut graph = Graph::new();
        let mut interner = Interner::new();
        let root = parse_module(src, &mut graph, &mut interner).unwrap();
        (graph, interner, root)
    }

    #[test]
    fn parses_a_simple_binary_access_chain() {
        let (mut graph, _interner, root) = parse("result = 2.add[y=3].result");
        match graph.kind(root) {
            NodeKind::Block(defs) => assert_eq!(defs.len(), 1),
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_attribute_is_a_parse_error() {
        let mut graph = Graph::new();
        let mut interner = Interner::new();
        assert!(parse_module("a = 1, a = 2", &mut graph, &mut interner).is_err());
    }

    #[test]
    fn eager_definition_outside_call_is_a_parse_error() {
        let mut graph = Graph::new();
        let mut interner = Interner::new();
        assert!(parse_module("a := 1", &mut graph, &mut interner).is_err());
    }

    #[test]
    fn eager_definition_inside_call_is_accepted() {
        let mut graph = Graph::new();
        let mut interner = Interner::new();
        assert!(parse_module("result = foo(a := 1).result", &mut graph, &mut interner).is_ok());
    }

    #[test]
    fn bare_caret_outside_a_chain_after_dot_is_a_parse_error() {
        let mut graph = Graph::new();
        let mut interner = Interner::new();
        // `x.^` — `.^` right after an attribute access, not after another `^`.
        assert!(parse_module("result = x.^", &mut graph, &mut interner).is_err());
    }

    #[test]
    fn chained_parent_carets_increase_depth() {
        let (mut graph, _interner, root) = parse("result = ^.^");
        match graph.kind(root) {
            NodeKind::Block(defs) => {
                let value = *defs.values().next().unwrap();
                match graph.kind(value) {
                    NodeKind::Parent(depth) => assert_eq!(*depth, 1),
                    other => panic!("expected Parent, got {other:?}"),
                }
            }
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn ternary_desugars_to_conditional() {
        let (mut graph, _interner, root) = parse("result = 1 ? 2 : 3");
        match graph.kind(root) {
            NodeKind::Block(defs) => {
                let value = *defs.values().next().unwrap();
                assert!(matches!(graph.kind(value), NodeKind::Conditional { .. }));
            }
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn clone_attr_requires_a_bare_identifier() {
        let mut graph = Graph::new();
        let mut interner = Interner::new();
        assert!(parse_module("a <- 1", &mut graph, &mut interner).is_err());
        assert!(parse_module("a = 1, b <- a", &mut graph, &mut interner).is_ok());
    }

    #[test]
    fn minus_before_int_literal_in_primary_position_folds_into_a_negative_literal() {
        let (mut graph, _interner, root) = parse("result = -42");
        match graph.kind(root) {
            NodeKind::Block(defs) => {
                let value = *defs.values().next().unwrap();
                assert!(matches!(graph.kind(value), NodeKind::IntLit(-42)));
            }
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn binary_minus_is_still_subtraction() {
        let (mut graph, _interner, root) = parse("result = x - 5");
        match graph.kind(root) {
            NodeKind::Block(defs) => {
                let value = *defs.values().next().unwrap();
                assert!(matches!(graph.kind(value), NodeKind::BinaryOp { op: BinOp::Sub, .. }));
            }
            other => panic!("expected Block, got {other:?}"),
        }
    }
}
