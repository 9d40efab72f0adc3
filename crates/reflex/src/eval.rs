//! The evaluator: a non-recursive reduction loop over the graph built by
//! [`crate::parser`] and resolved by [`crate::preprocess`].
//!
//! Deeply nested expressions (a recursive fibonacci, a long override chain)
//! would blow the native call stack if each `Access`/`Call`/`Builtin`
//! recursed directly into the next. Instead every reduction step pushes a
//! [`Frame`] describing what to do with the value once it's ready and
//! resumes from an explicit `Vec<Frame>` continuation stack, driven by
//! node kinds rather than opcodes.

use std::collections::VecDeque;

use crate::{
    builtins::{self, BuiltinKind, Prim},
    error::{Position, ReflexError, ReflexResult},
    intern::{AttrId, Interner, WellKnown},
    node::{CloneTable, Defs, Graph, NodeId, NodeKind},
    resource::ResourceTracker,
};

/// What the loop does next: reduce `Descend(e)` further, or hand the
/// already-reduced `Ascend(v)` up to whatever frame is waiting for it.
enum Mode {
    Descend(NodeId),
    Ascend(NodeId),
}

/// A suspended continuation: what to do once the value currently being
/// reduced comes back up.
enum Frame {
    /// Resume an `Access { base, attr }`: project `attr` out of the
    /// now-reduced base block.
    AccessAfterBase { attr: AttrId },
    /// Resume an `Override`/`Call`: clone the reduced base and merge in
    /// `defs`. Both desugar to the same resume step once their defs are in
    /// hand — `Call`'s only surface difference, `:=`, was already turned
    /// into an `Eager` wrapper by the parser.
    OverrideAfterBase { defs: Defs },
    /// Resume one of a builtin's eagerly-fetched arguments: record it and
    /// either fetch the next or compose the result.
    FetchBuiltinArg {
        kind: BuiltinKind,
        remaining: VecDeque<NodeId>,
        collected: Vec<Prim>,
        position: Position,
    },
    /// Resume `select`'s condition: redirect to whichever branch it picked.
    SelectAfterCond { context: NodeId, position: Position },
    /// Resume `logical_and`/`logical_or`'s `x`: short-circuit, or go fetch
    /// `y`.
    LogicalOpAfterX { context: NodeId, is_and: bool, position: Position },
    /// Resume `logical_and`/`logical_or`'s `y`: wrap its raw value.
    LogicalOpAfterY { position: Position },
    /// Resume one eagerly-defined attribute's value: store it into the
    /// clone, then move on to the next pending key (if any).
    EagerEval {
        clone: NodeId,
        remaining: VecDeque<(AttrId, NodeId)>,
        current_key: AttrId,
    },
}

impl Frame {
    fn collect_roots(&self, out: &mut Vec<NodeId>) {
        match self {
            Frame::AccessAfterBase { .. } | Frame::LogicalOpAfterY { .. } => {}
            Frame::OverrideAfterBase { defs } => out.extend(defs.values().copied()),
            Frame::FetchBuiltinArg { remaining, .. } => out.extend(remaining.iter().copied()),
            Frame::SelectAfterCond { context, .. } | Frame::LogicalOpAfterX { context, .. } => out.push(*context),
            Frame::EagerEval { clone, remaining, .. } => {
                out.push(*clone);
                out.extend(remaining.iter().map(|(_, id)| *id));
            }
        }
    }
}

/// Reduces `root` to normal form: a `Block` with no pending `Eager`/`CloneAttr`
/// definitions left at its top level.
pub fn evaluate(
    graph: &mut Graph,
    interner: &Interner,
    wk: &WellKnown,
    tracker: &mut dyn ResourceTracker,
    root: NodeId,
) -> ReflexResult<NodeId> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut mode = Mode::Descend(root);
    loop {
        tracker.step()?;

        if graph.should_gc() {
            let mut roots = Vec::new();
            for frame in &frames {
                frame.collect_roots(&mut roots);
            }
            roots.push(match mode {
                Mode::Descend(id) | Mode::Ascend(id) => id,
            });
            graph.gc(&roots);
        }

        mode = match mode {
            Mode::Descend(e) => step_descend(graph, wk, &mut frames, e)?,
            Mode::Ascend(v) => match frames.pop() {
                None => return Ok(v),
                Some(frame) => step_ascend(graph, interner, wk, &mut frames, frame, v)?,
            },
        };
    }
}

fn step_descend(graph: &mut Graph, wk: &WellKnown, frames: &mut Vec<Frame>, e: NodeId) -> ReflexResult<Mode> {
    let position = graph.position(e);
    match graph.kind(e).clone() {
        NodeKind::Access { base, attr } => {
            frames.push(Frame::AccessAfterBase { attr });
            Ok(Mode::Descend(base))
        }
        NodeKind::Override { base, defs } | NodeKind::Call { base, defs } => {
            frames.push(Frame::OverrideAfterBase { defs });
            Ok(Mode::Descend(base))
        }
        NodeKind::BackEdge(target) => Ok(Mode::Descend(target)),
        NodeKind::Eager(inner) => Ok(Mode::Descend(inner)),
        NodeKind::Builtin { kind, context } => begin_builtin(graph, wk, frames, kind, context, position),
        NodeKind::Block(defs) => dispatch_block(graph, frames, e, defs),

        NodeKind::IntLit(_) | NodeKind::StringLit(_) => Ok(Mode::Ascend(e)),

        NodeKind::CloneAttr(_) => Err(ReflexError::Invariant {
            attr: String::new(),
            message: "a clone-attr alias was reduced directly instead of through its owning block".to_owned(),
        }),
        surface @ (NodeKind::Identifier(_)
        | NodeKind::SelfRef
        | NodeKind::Parent(_)
        | NodeKind::AncestorLookup(_)
        | NodeKind::BinaryOp { .. }
        | NodeKind::Conditional { .. }) => Err(ReflexError::Invariant {
            attr: String::new(),
            message: format!("a surface-only node ({}) survived preprocessing", surface.kind_name()),
        }),
    }
}

fn step_ascend(
    graph: &mut Graph,
    interner: &Interner,
    wk: &WellKnown,
    frames: &mut Vec<Frame>,
    frame: Frame,
    v: NodeId,
) -> ReflexResult<Mode> {
    match frame {
        Frame::AccessAfterBase { attr } => {
            let attr_name = interner.resolve(attr);
            let child = graph.block_get(v, attr, attr_name)?;
            Ok(Mode::Descend(child))
        }
        Frame::OverrideAfterBase { defs } => {
            let clone = resume_override(graph, v, defs)?;
            Ok(Mode::Descend(clone))
        }
        Frame::FetchBuiltinArg { kind, mut remaining, mut collected, position } => {
            collected.push(builtins::prim_of(graph, v)?);
            if let Some(next) = remaining.pop_front() {
                frames.push(Frame::FetchBuiltinArg { kind, remaining, collected, position });
                Ok(Mode::Descend(next))
            } else {
                let result_kind = builtins::compose(kind, &collected)?;
                Ok(Mode::Descend(wrap_primitive(graph, wk, result_kind, position)))
            }
        }
        Frame::SelectAfterCond { context, position } => {
            let cond = builtins::prim_of(graph, v)?.as_int("cond")?;
            let attr = if cond != 0 { wk.r#true } else { wk.r#false };
            let branch = graph.alloc(NodeKind::Access { base: context, attr }, position);
            Ok(Mode::Descend(branch))
        }
        Frame::LogicalOpAfterX { context, is_and, position } => {
            let x = builtins::prim_of(graph, v)?.as_int("x")?;
            let decisive = if is_and { x == 0 } else { x != 0 };
            if decisive {
                Ok(Mode::Descend(builtins::int_block(graph, x, wk, position)))
            } else {
                frames.push(Frame::LogicalOpAfterY { position });
                let y_access = two_hop_access(graph, wk, context, wk.y, position);
                Ok(Mode::Descend(y_access))
            }
        }
        Frame::LogicalOpAfterY { position } => {
            let y = builtins::prim_of(graph, v)?.as_int("y")?;
            Ok(Mode::Descend(builtins::int_block(graph, y, wk, position)))
        }
        Frame::EagerEval { clone, mut remaining, current_key } => {
            let mut kind = graph.kind(clone).clone();
            let defs = block_defs_mut(&mut kind)?;
            defs.insert(current_key, v);
            graph.set_kind(clone, kind);
            if let Some((next_key, next_inner)) = remaining.pop_front() {
                frames.push(Frame::EagerEval { clone, remaining, current_key: next_key });
                Ok(Mode::Descend(next_inner))
            } else {
                Ok(Mode::Descend(clone))
            }
        }
    }
}

/// `Block` is where eager/clone-attr definitions actually get resolved.
/// Everything else that reaches [`Mode::Ascend`] (literals, an unapplied
/// builtin reached by mistake) has no further work to do.
fn dispatch_block(graph: &mut Graph, frames: &mut Vec<Frame>, block_id: NodeId, defs: Defs) -> ReflexResult<Mode> {
    let clone_attrs: Vec<(AttrId, AttrId)> = defs
        .iter()
        .filter_map(|(&k, &v)| match graph.kind(v) {
            NodeKind::CloneAttr(target) => Some((k, *target)),
            _ => None,
        })
        .collect();

    if !clone_attrs.is_empty() {
        let clone = graph.lazy_clone(block_id, &CloneTable::new());
        let mut kind = graph.kind(clone).clone();
        let target_defs = block_defs_mut(&mut kind)?;
        for (k, target) in clone_attrs {
            let v = target_defs.get(&target).copied().ok_or_else(|| ReflexError::Reference {
                message: "`<-` aliases an attribute that does not exist in this block".to_owned(),
                position: None,
            })?;
            target_defs.insert(k, v);
        }
        graph.set_kind(clone, kind);
        return Ok(Mode::Descend(clone));
    }

    let has_eager = defs.values().any(|&v| matches!(graph.kind(v), NodeKind::Eager(_)));
    if has_eager {
        let clone = graph.lazy_clone(block_id, &CloneTable::new());
        let clone_defs = match graph.kind(clone) {
            NodeKind::Block(d) | NodeKind::Override { defs: d, .. } => d.clone(),
            other => {
                return Err(ReflexError::Invariant {
                    attr: String::new(),
                    message: format!("lazy-cloning a block produced a {}", other.kind_name()),
                })
            }
        };
        let mut eager: VecDeque<(AttrId, NodeId)> = VecDeque::new();
        for (&k, &v) in &clone_defs {
            if let NodeKind::Eager(inner) = graph.kind(v) {
                eager.push_back((k, *inner));
            }
        }
        // `has_eager` was computed from the pre-clone defs; the clone always
        // carries the same eagerly-wrapped keys (cloning an `Eager` node
        // keeps it an `Eager` node, just with its inner expression rewired).
        let (current_key, first_inner) = eager.pop_front().expect("has_eager implies a non-empty queue");
        frames.push(Frame::EagerEval { clone, remaining: eager, current_key });
        return Ok(Mode::Descend(first_inner));
    }

    Ok(Mode::Ascend(block_id))
}

fn block_defs_mut(kind: &mut NodeKind) -> ReflexResult<&mut Defs> {
    match kind {
        NodeKind::Block(defs) | NodeKind::Override { defs, .. } => Ok(defs),
        other => Err(ReflexError::Invariant {
            attr: String::new(),
            message: format!("expected a block, found {}", other.kind_name()),
        }),
    }
}

/// Clones `resolved_base`, then merges `defs` into the clone: every value is
/// lazy-cloned under `{resolved_base -> clone}` so that any back-edge inside
/// it pointing at the old base now points at the override instead.
fn resume_override(graph: &mut Graph, resolved_base: NodeId, defs: Defs) -> ReflexResult<NodeId> {
    if !matches!(graph.kind(resolved_base), NodeKind::Block(_) | NodeKind::Override { .. }) {
        return Err(ReflexError::Invariant {
            attr: String::new(),
            message: "overrode something other than a block".to_owned(),
        });
    }

    let clone = graph.lazy_clone(resolved_base, &CloneTable::new());
    let mut overrides = CloneTable::new();
    overrides.insert(resolved_base, clone);

    let mut kind = graph.kind(clone).clone();
    let target_defs = block_defs_mut(&mut kind)?;
    for (k, v) in defs {
        let v = graph.lazy_clone(v, &overrides);
        target_defs.insert(k, v);
    }
    graph.set_kind(clone, kind);
    Ok(clone)
}

fn begin_builtin(
    graph: &mut Graph,
    wk: &WellKnown,
    frames: &mut Vec<Frame>,
    kind: BuiltinKind,
    context: NodeId,
    position: Position,
) -> ReflexResult<Mode> {
    match kind {
        BuiltinKind::Select => {
            frames.push(Frame::SelectAfterCond { context, position });
            Ok(Mode::Descend(two_hop_access(graph, wk, context, wk.cond, position)))
        }
        BuiltinKind::IntLogicalAnd | BuiltinKind::IntLogicalOr => {
            frames.push(Frame::LogicalOpAfterX { context, is_and: matches!(kind, BuiltinKind::IntLogicalAnd), position });
            Ok(Mode::Descend(two_hop_access(graph, wk, context, wk.x, position)))
        }
        _ => {
            let mut exprs: VecDeque<NodeId> = builtins::eager_arg_names(kind)
                .iter()
                .map(|name| match name {
                    Some(name) => {
                        let attr = interner_free_intern(wk, name);
                        two_hop_access(graph, wk, context, attr, position)
                    }
                    None => graph.alloc(NodeKind::Access { base: context, attr: wk.inner }, position),
                })
                .collect();
            let first = exprs.pop_front().expect("every eager builtin reads at least one argument");
            frames.push(Frame::FetchBuiltinArg { kind, remaining: exprs, collected: Vec::new(), position });
            Ok(Mode::Descend(first))
        }
    }
}

/// Maps one of the fixed argument names `eager_arg_names` hands back
/// (`"x"`, `"y"`, `"start"`, `"end"`) to its pre-interned [`AttrId`] — every
/// such name was interned once into `WellKnown` at startup, so this never
/// needs a live `Interner`.
fn interner_free_intern(wk: &WellKnown, name: &str) -> AttrId {
    match name {
        "x" => wk.x,
        "y" => wk.y,
        "start" => wk.start,
        "end" => wk.end,
        other => unreachable!("eager_arg_names produced an unexpected argument name `{other}`"),
    }
}

/// `Access(Access(context, name), "_inner")`: the two hops needed to read a
/// primitive argument out of a method block's named attribute.
fn two_hop_access(graph: &mut Graph, wk: &WellKnown, context: NodeId, name: AttrId, position: Position) -> NodeId {
    let named = graph.alloc(NodeKind::Access { base: context, attr: name }, position);
    graph.alloc(NodeKind::Access { base: named, attr: wk.inner }, position)
}

fn wrap_primitive(graph: &mut Graph, wk: &WellKnown, kind: NodeKind, position: Position) -> NodeId {
    match kind {
        NodeKind::IntLit(v) => builtins::int_block(graph, v, wk, position),
        NodeKind::StringLit(s) => builtins::string_block(graph, s, wk, position),
        other => unreachable!("builtins::compose only ever returns a primitive literal, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::parse_module, preprocess::preprocess, resource::NoLimitTracker};

    fn run(src: &str) -> ReflexResult<(Graph, Interner, WellKnown, NodeId)> {
        let mut graph = Graph::new();
        let mut interner = Interner::new();
        let wk = WellKnown::intern(&mut interner);
        let root = parse_module(src, &mut graph, &mut interner).unwrap();
        preprocess(&mut graph, &mut interner, &wk, root).unwrap();
        let mut tracker = NoLimitTracker;
        let value = evaluate(&mut graph, &interner, &wk, &mut tracker, root)?;
        Ok((graph, interner, wk, value))
    }

    /// Every attribute name used in these fixtures was already interned
    /// while parsing; re-interning just returns the existing id.
    fn attr(interner: &mut Interner, name: &str) -> AttrId {
        interner.intern(name)
    }

    /// Projects `name` out of the (already-normal-form) top-level block and
    /// reduces it the rest of the way — mirrors what `run_source` does with
    /// the designated `result` attribute, just parameterised over the name
    /// so these tests can also inspect sibling attributes.
    fn eval_attr(graph: &mut Graph, interner: &Interner, wk: &WellKnown, root: NodeId, attr: AttrId, name: &str) -> NodeId {
        let raw = graph.block_get(root, attr, name).unwrap();
        let mut tracker = NoLimitTracker;
        evaluate(graph, interner, wk, &mut tracker, raw).unwrap()
    }

    fn int_inner(graph: &mut Graph, wk: &WellKnown, value: NodeId) -> i64 {
        let inner = graph.block_get(value, wk.inner, "_inner").unwrap();
        match graph.kind(inner) {
            NodeKind::IntLit(v) => *v,
            other => panic!("expected an int literal, got {other:?}"),
        }
    }

    fn str_inner(graph: &mut Graph, wk: &WellKnown, value: NodeId) -> String {
        let inner = graph.block_get(value, wk.inner, "_inner").unwrap();
        match graph.kind(inner) {
            NodeKind::StringLit(s) => s.to_string(),
            other => panic!("expected a string literal, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_call_reduces_to_a_primitive_int() {
        let (mut graph, interner, wk, root) = run("result = 2.add[y=3].result").unwrap();
        let value = eval_attr(&mut graph, &interner, &wk, root, wk.result, "result");
        assert_eq!(int_inner(&mut graph, &wk, value), 5);
    }

    #[test]
    fn string_concatenation_reduces_to_a_primitive_string() {
        let (mut graph, interner, wk, root) = run(r#"result = "foo".cat[y="bar"].result"#).unwrap();
        let value = eval_attr(&mut graph, &interner, &wk, root, wk.result, "result");
        assert_eq!(str_inner(&mut graph, &wk, value), "foobar");
    }

    #[test]
    fn substr_is_code_point_indexed() {
        let (mut graph, interner, wk, root) = run(r#"result = "hello".substr[start=1, end=4].result"#).unwrap();
        let value = eval_attr(&mut graph, &interner, &wk, root, wk.result, "result");
        assert_eq!(str_inner(&mut graph, &wk, value), "ell");
    }

    #[test]
    fn logical_and_short_circuits_without_touching_an_undefined_y() {
        let (mut graph, interner, wk, root) = run("result = 0.logical_and[y=missing].result").unwrap();
        let value = eval_attr(&mut graph, &interner, &wk, root, wk.result, "result");
        assert_eq!(int_inner(&mut graph, &wk, value), 0);
    }

    #[test]
    fn override_is_independent_of_its_base() {
        let (mut graph, mut interner, wk, root) =
            run("base = { x = 1 }, overridden = base[x=2], result = base.x, other = overridden.x").unwrap();
        let other_attr = attr(&mut interner, "other");
        let result = eval_attr(&mut graph, &interner, &wk, root, wk.result, "result");
        let other = eval_attr(&mut graph, &interner, &wk, root, other_attr, "other");
        assert_eq!(int_inner(&mut graph, &wk, result), 1);
        assert_eq!(int_inner(&mut graph, &wk, other), 2);
    }
}
