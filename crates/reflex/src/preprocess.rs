//! Resolves lexical surface references into direct back-edges, wraps bare
//! literals into their method-exposing primitive blocks, and desugars
//! binary/ternary surface forms into plain `Access`/`Call` chains.
//!
//! Runs once over the freshly parsed graph, in place: every surface node is
//! rewritten via `Graph::set_kind` at its own id, so any back-edge already
//! pointing at it keeps working once it becomes its resolved form.

use crate::{
    error::{ReflexError, ReflexResult},
    intern::{AttrId, Interner, WellKnown},
    node::{BinOp, Defs, Graph, NodeId, NodeKind},
};

pub fn preprocess(graph: &mut Graph, interner: &mut Interner, wk: &WellKnown, root: NodeId) -> ReflexResult<()> {
    let mut stack = Vec::new();
    preprocess_node(graph, interner, wk, root, &mut stack)
}

fn preprocess_node(
    graph: &mut Graph,
    interner: &mut Interner,
    wk: &WellKnown,
    id: NodeId,
    stack: &mut Vec<NodeId>,
) -> ReflexResult<()> {
    let position = graph.position(id);
    let kind = graph.kind(id).clone();

    match kind {
        NodeKind::Block(defs) => {
            let defs = preprocess_scope(graph, interner, wk, id, defs, stack)?;
            graph.set_kind(id, NodeKind::Block(defs));
        }
        NodeKind::Override { base, defs } => {
            preprocess_node(graph, interner, wk, base, stack)?;
            let defs = preprocess_scope(graph, interner, wk, id, defs, stack)?;
            graph.set_kind(id, NodeKind::Override { base, defs });
        }
        NodeKind::Call { base, mut defs } => {
            preprocess_node(graph, interner, wk, base, stack)?;
            for value in defs.values_mut() {
                preprocess_node(graph, interner, wk, *value, stack)?;
            }
            graph.set_kind(id, NodeKind::Call { base, defs });
        }
        NodeKind::Access { base, .. } => {
            preprocess_node(graph, interner, wk, base, stack)?;
        }
        NodeKind::Eager(inner) => {
            preprocess_node(graph, interner, wk, inner, stack)?;
        }
        NodeKind::CloneAttr(_) | NodeKind::BackEdge(_) | NodeKind::Builtin { .. } => {
            // Atomic, or never produced by the parser in the first place.
        }

        NodeKind::IntLit(value) => {
            crate::builtins::wrap_int_literal_in_place(graph, id, value, wk, position);
        }
        NodeKind::StringLit(value) => {
            crate::builtins::wrap_string_literal_in_place(graph, id, value, wk, position);
        }

        NodeKind::Identifier(name) => {
            let self_ref = graph.alloc(NodeKind::SelfRef, position);
            graph.set_kind(id, NodeKind::Access { base: self_ref, attr: name });
            preprocess_node(graph, interner, wk, self_ref, stack)?;
        }
        NodeKind::SelfRef => {
            let &innermost = stack.last().ok_or_else(|| ReflexError::Invariant {
                attr: String::new(),
                message: "`@` used with no enclosing block".to_owned(),
            })?;
            graph.set_kind(id, NodeKind::BackEdge(innermost));
        }
        NodeKind::Parent(depth) => {
            // Distance `depth + 1` from the end of the stack: `stack.len() - 1`
            // is self (distance 0), so distance `depth + 1` sits at
            // `stack.len() - 1 - (depth + 1) = stack.len() - depth - 2`.
            let depth = depth as usize;
            let index = stack.len().checked_sub(depth + 2).ok_or_else(|| ReflexError::Reference {
                message: format!("`^` depth {depth} exceeds the enclosing scope depth"),
                position: Some(position),
            })?;
            graph.set_kind(id, NodeKind::BackEdge(stack[index]));
        }
        NodeKind::AncestorLookup(name) => {
            let found = stack[..stack.len().saturating_sub(1)]
                .iter()
                .rev()
                .find(|&&scope| scope_defines(graph, scope, name));
            let Some(&scope) = found else {
                return Err(ReflexError::Reference {
                    message: format!("no ancestor defines `{}`", interner.resolve(name)),
                    position: Some(position),
                });
            };
            let back_edge = graph.alloc(NodeKind::BackEdge(scope), position);
            graph.set_kind(id, NodeKind::Access { base: back_edge, attr: name });
        }

        NodeKind::BinaryOp { left, op, right } => {
            desugar_binary_op(graph, interner, wk, id, left, op, right, position)?;
            preprocess_node(graph, interner, wk, left, stack)?;
            preprocess_node(graph, interner, wk, right, stack)?;
        }
        NodeKind::Conditional { cond, then_branch, else_branch } => {
            desugar_conditional(graph, wk, id, cond, then_branch, else_branch, position);
            preprocess_node(graph, interner, wk, cond, stack)?;
            preprocess_node(graph, interner, wk, then_branch, stack)?;
            preprocess_node(graph, interner, wk, else_branch, stack)?;
        }
    }
    Ok(())
}

/// Pushes `scope_id` as the innermost ancestor, preprocesses every def
/// value against the extended stack, then pops it back off. `scope_id`'s
/// stored kind in `graph` is left untouched until the caller commits the
/// updated `defs` via `set_kind` — that is what lets a sibling's
/// ancestor-lookup see this scope's keys while its own values are still
/// being resolved.
fn preprocess_scope(
    graph: &mut Graph,
    interner: &mut Interner,
    wk: &WellKnown,
    scope_id: NodeId,
    mut defs: Defs,
    stack: &mut Vec<NodeId>,
) -> ReflexResult<Defs> {
    stack.push(scope_id);
    for value in defs.values_mut() {
        if let Err(err) = preprocess_node(graph, interner, wk, *value, stack) {
            stack.pop();
            return Err(err);
        }
    }
    stack.pop();
    Ok(defs)
}

fn scope_defines(graph: &mut Graph, scope: NodeId, attr: AttrId) -> bool {
    match graph.kind(scope) {
        NodeKind::Block(defs) | NodeKind::Override { defs, .. } => defs.contains_key(&attr),
        _ => false,
    }
}

/// `BinaryOp(x, op, y)` -> `Access(Call(Access(x, method_of(op)), {y}), "result")`.
fn desugar_binary_op(
    graph: &mut Graph,
    interner: &mut Interner,
    wk: &WellKnown,
    id: NodeId,
    left: NodeId,
    op: BinOp,
    right: NodeId,
    position: crate::error::Position,
) -> ReflexResult<()> {
    let method_attr = interner.intern(crate::builtins::method_of(op));
    let method_access = graph.alloc(NodeKind::Access { base: left, attr: method_attr }, position);
    let mut call_defs = Defs::new();
    call_defs.insert(wk.y, right);
    let call = graph.alloc(NodeKind::Call { base: method_access, defs: call_defs }, position);
    graph.set_kind(id, NodeKind::Access { base: call, attr: wk.result });
    Ok(())
}

/// `Conditional(cond, a, b)` -> `Access(Call(Access(cond, "select"), {true: a, false: b}), "result")`.
fn desugar_conditional(
    graph: &mut Graph,
    wk: &WellKnown,
    id: NodeId,
    cond: NodeId,
    then_branch: NodeId,
    else_branch: NodeId,
    position: crate::error::Position,
) {
    let select_access = graph.alloc(NodeKind::Access { base: cond, attr: wk.select }, position);
    let mut call_defs = Defs::new();
    call_defs.insert(wk.r#true, then_branch);
    call_defs.insert(wk.r#false, else_branch);
    let call = graph.alloc(NodeKind::Call { base: select_access, defs: call_defs }, position);
    graph.set_kind(id, NodeKind::Access { base: call, attr: wk.result });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    fn setup(src: &str) -> (Graph, Interner, WellKnown, NodeId) {
        let mut graph = Graph::new();
        let mut interner = Interner::new();
        let wk = WellKnown::intern(&mut interner);
        let root = parse_module(src, &mut graph, &mut interner).unwrap();
        (graph, interner, wk, root)
    }

    #[test]
    fn identifier_resolves_to_a_self_access() {
        let (mut graph, mut interner, wk, root) = setup("x = 1, result = x");
        preprocess(&mut graph, &mut interner, &wk, root).unwrap();
        let result_attr = interner.intern("result");
        let result_id = graph.block_get(root, result_attr, "result").unwrap();
        assert!(matches!(graph.kind(result_id), NodeKind::Access { .. }));
    }

    #[test]
    fn undefined_ancestor_lookup_is_a_reference_error() {
        let (mut graph, mut interner, wk, root) = setup("result = { inner = ^^.missing }");
        assert!(preprocess(&mut graph, &mut interner, &wk, root).is_err());
    }

    #[test]
    fn parent_depth_overflow_is_a_reference_error() {
        let (mut graph, mut interner, wk, root) = setup("result = ^");
        assert!(preprocess(&mut graph, &mut interner, &wk, root).is_err());
    }

    #[test]
    fn binary_op_desugars_to_access_of_call_result() {
        let (mut graph, mut interner, wk, root) = setup("result = 1 + 2");
        preprocess(&mut graph, &mut interner, &wk, root).unwrap();
        let result_attr = interner.intern("result");
        let result_id = graph.block_get(root, result_attr, "result").unwrap();
        match graph.kind(result_id) {
            NodeKind::Access { attr, .. } => assert_eq!(*attr, wk.result),
            other => panic!("expected Access, got {other:?}"),
        }
    }

    #[test]
    fn preprocessing_a_graph_with_no_surface_nodes_is_idempotent() {
        let (mut graph, mut interner, wk, root) = setup("result = 2.add[y=3].result");
        preprocess(&mut graph, &mut interner, &wk, root).unwrap();
        let before = format!("{:?}", graph.kind(root));
        preprocess(&mut graph, &mut interner, &wk, root).unwrap();
        let after = format!("{:?}", graph.kind(root));
        assert_eq!(before, after);
    }
}
