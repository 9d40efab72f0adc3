//! Primitive built-ins and the int/string block shapes that expose them as
//! attributes.
//!
//! Operators are a tagged enum dispatched through one function rather than
//! closures stored on nodes, so that every node stays `Clone`.

use std::rc::Rc;

use num_integer::Integer;

use crate::{
    error::{ReflexError, ReflexResult},
    intern::WellKnown,
    node::{BinOp, Defs, Graph, NodeId, NodeKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum IntOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum StrCmpKind {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

/// Tag identifying which primitive operation a `Builtin` node performs.
/// Each one's `context` (stored alongside, not here) is a back-edge into
/// the method-argument block that supplies `x`/`y`/`start`/`end`/etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    IntOp(IntOpKind),
    IntLogicalAnd,
    IntLogicalOr,
    Select,
    IntStr,
    IntChr,
    StrCat,
    StrComparison(StrCmpKind),
    StrLen,
    StrSubstr,
}

/// Names (not yet interned) of the attributes each eager builtin reads off
/// its context, in fetch order.
#[must_use]
pub fn eager_arg_names(kind: BuiltinKind) -> &'static [Option<&'static str>] {
    match kind {
        BuiltinKind::IntOp(_) => &[Some("x"), Some("y")],
        BuiltinKind::StrCat => &[Some("x"), Some("y")],
        BuiltinKind::StrComparison(_) => &[Some("x"), Some("y")],
        BuiltinKind::IntStr | BuiltinKind::IntChr => &[None],
        BuiltinKind::StrLen => &[Some("x")],
        BuiltinKind::StrSubstr => &[Some("x"), Some("start"), Some("end")],
        BuiltinKind::Select | BuiltinKind::IntLogicalAnd | BuiltinKind::IntLogicalOr => &[],
    }
}

/// A reduced primitive argument, read out of some node's `_inner`.
#[derive(Debug, Clone)]
pub enum Prim {
    Int(i64),
    Str(Rc<str>),
}

impl Prim {
    pub fn as_int(&self, field: &str) -> ReflexResult<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Str(_) => Err(ReflexError::Type {
                attr: field.to_owned(),
                message: "expected an integer, found a string".to_owned(),
            }),
        }
    }

    pub fn as_str(&self, field: &str) -> ReflexResult<&str> {
        match self {
            Self::Str(s) => Ok(s),
            Self::Int(_) => Err(ReflexError::Type {
                attr: field.to_owned(),
                message: "expected a string, found an integer".to_owned(),
            }),
        }
    }
}

/// Extracts a `Prim` from an already-reduced `_inner` node.
pub fn prim_of(graph: &mut Graph, id: NodeId) -> ReflexResult<Prim> {
    match graph.kind(id) {
        NodeKind::IntLit(v) => Ok(Prim::Int(*v)),
        NodeKind::StringLit(s) => Ok(Prim::Str(Rc::clone(s))),
        other => Err(ReflexError::Invariant {
            attr: "_inner".to_owned(),
            message: format!("expected a primitive literal, found {}", other.kind_name()),
        }),
    }
}

/// Computes the result of one of the eager, args-then-compose built-ins and
/// returns the `NodeKind` to allocate for it (always `IntLit`/`StringLit`;
/// the evaluator wraps it back into a full block).
pub fn compose(kind: BuiltinKind, args: &[Prim]) -> ReflexResult<NodeKind> {
    match kind {
        BuiltinKind::IntOp(op) => {
            let x = args[0].as_int("x")?;
            let y = args[1].as_int("y")?;
            Ok(NodeKind::IntLit(int_op(op, x, y)?))
        }
        BuiltinKind::StrCat => {
            let x = args[0].as_str("x")?;
            let y = args[1].as_str("y")?;
            Ok(NodeKind::StringLit(Rc::from(format!("{x}{y}"))))
        }
        BuiltinKind::StrComparison(op) => {
            let x = args[0].as_str("x")?;
            let y = args[1].as_str("y")?;
            Ok(NodeKind::IntLit(i64::from(str_cmp(op, x, y))))
        }
        BuiltinKind::IntStr => {
            let x = args[0].as_int("_inner")?;
            Ok(NodeKind::StringLit(Rc::from(x.to_string())))
        }
        BuiltinKind::IntChr => {
            let x = args[0].as_int("_inner")?;
            let cp = u32::try_from(x).map_err(|_| ReflexError::Type {
                attr: "_inner".to_owned(),
                message: format!("{x} is not a valid code point"),
            })?;
            let ch = char::from_u32(cp).ok_or_else(|| ReflexError::Type {
                attr: "_inner".to_owned(),
                message: format!("{x} is not a valid code point"),
            })?;
            Ok(NodeKind::StringLit(Rc::from(ch.to_string())))
        }
        BuiltinKind::StrLen => {
            let x = args[0].as_str("x")?;
            let len = i64::try_from(x.chars().count()).expect("string longer than i64::MAX chars");
            Ok(NodeKind::IntLit(len))
        }
        BuiltinKind::StrSubstr => {
            let x = args[0].as_str("x")?;
            let start = args[1].as_int("start")?;
            let end = args[2].as_int("end")?;
            Ok(NodeKind::StringLit(Rc::from(substr(x, start, end))))
        }
        BuiltinKind::Select | BuiltinKind::IntLogicalAnd | BuiltinKind::IntLogicalOr => {
            unreachable!("control-flow builtins are handled directly by the evaluator")
        }
    }
}

/// Floor division (`div`) and floor-division-sign remainder (`mod`),
/// via `num_integer::Integer::div_floor`/`mod_floor` rather than a
/// hand-rolled sign fixup.
fn int_op(op: IntOpKind, x: i64, y: i64) -> ReflexResult<i64> {
    let div_by_zero = || ReflexError::Type {
        attr: "y".to_owned(),
        message: format!("division by zero in `{}`", <&'static str>::from(op)),
    };
    Ok(match op {
        IntOpKind::Add => x.wrapping_add(y),
        IntOpKind::Sub => x.wrapping_sub(y),
        IntOpKind::Mul => x.wrapping_mul(y),
        IntOpKind::Div => {
            if y == 0 {
                return Err(div_by_zero());
            }
            x.div_floor(&y)
        }
        IntOpKind::Mod => {
            if y == 0 {
                return Err(div_by_zero());
            }
            x.mod_floor(&y)
        }
        IntOpKind::Eq => i64::from(x == y),
        IntOpKind::Ne => i64::from(x != y),
        IntOpKind::Lt => i64::from(x < y),
        IntOpKind::Gt => i64::from(x > y),
        IntOpKind::Le => i64::from(x <= y),
        IntOpKind::Ge => i64::from(x >= y),
        IntOpKind::BitAnd => x & y,
        IntOpKind::BitOr => x | y,
        IntOpKind::BitXor => x ^ y,
    })
}

fn str_cmp(op: StrCmpKind, x: &str, y: &str) -> bool {
    match op {
        StrCmpKind::Eq => x == y,
        StrCmpKind::Ne => x != y,
        StrCmpKind::Lt => x < y,
        StrCmpKind::Gt => x > y,
        StrCmpKind::Le => x <= y,
        StrCmpKind::Ge => x >= y,
    }
}

/// Code-point-indexed, half-open substring. Out-of-range bounds clamp
/// rather than error, matching slice semantics over an index error.
fn substr(s: &str, start: i64, end: i64) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = i64::try_from(chars.len()).expect("string longer than i64::MAX chars");
    let clamp = |v: i64| usize::try_from(v.clamp(0, len)).expect("clamped into range");
    let start = clamp(start);
    let end = clamp(end).max(start);
    chars[start..end].iter().collect()
}

/// Builds `{x: BackEdge(base), result: IntOp(op)}`-shaped binary method
/// blocks, used by both `int_block` and `string_block`.
fn binary_method_block(graph: &mut Graph, base: NodeId, op_builtin: BuiltinKind, wk: &WellKnown) -> NodeId {
    let method = graph.alloc(NodeKind::Block(Defs::new()), graph_pos(graph, base));
    let x = graph.alloc(NodeKind::BackEdge(base), graph_pos(graph, base));
    let method_backedge = graph.alloc(NodeKind::BackEdge(method), graph_pos(graph, base));
    let result = graph.alloc(
        NodeKind::Builtin { kind: op_builtin, context: method_backedge },
        graph_pos(graph, base),
    );
    let mut defs = Defs::new();
    defs.insert(wk.x, x);
    defs.insert(wk.result, result);
    graph.set_kind(method, NodeKind::Block(defs));
    method
}

fn graph_pos(graph: &Graph, id: NodeId) -> crate::error::Position {
    graph.position(id)
}

/// Wraps an `i64` into a full int block: `_inner` plus one attribute per
/// integer operation, allocating a fresh node for the block.
pub fn int_block(graph: &mut Graph, value: i64, wk: &WellKnown, position: crate::error::Position) -> NodeId {
    let block = graph.alloc(NodeKind::Block(Defs::new()), position);
    populate_int_block(graph, block, value, wk, position);
    block
}

/// Same as [`int_block`], but builds the block into an already-allocated
/// node rather than a fresh one — used by the preprocessor to turn a bare
/// literal into its block form without disturbing the literal's identity
/// (anything with a back-edge to it must keep pointing at the same node).
pub fn wrap_int_literal_in_place(graph: &mut Graph, target: NodeId, value: i64, wk: &WellKnown, position: crate::error::Position) {
    populate_int_block(graph, target, value, wk, position);
}

fn populate_int_block(graph: &mut Graph, block: NodeId, value: i64, wk: &WellKnown, position: crate::error::Position) {
    let inner = graph.alloc(NodeKind::IntLit(value), position);

    let mut defs = Defs::new();
    defs.insert(wk.inner, inner);
    for (&attr, op) in &[
        (&wk.add, IntOpKind::Add),
        (&wk.sub, IntOpKind::Sub),
        (&wk.mul, IntOpKind::Mul),
        (&wk.div, IntOpKind::Div),
        (&wk.r#mod, IntOpKind::Mod),
        (&wk.eq, IntOpKind::Eq),
        (&wk.ne, IntOpKind::Ne),
        (&wk.lt, IntOpKind::Lt),
        (&wk.gt, IntOpKind::Gt),
        (&wk.le, IntOpKind::Le),
        (&wk.ge, IntOpKind::Ge),
        (&wk.band, IntOpKind::BitAnd),
        (&wk.bor, IntOpKind::BitOr),
        (&wk.bxor, IntOpKind::BitXor),
    ] {
        let method = binary_method_block(graph, block, BuiltinKind::IntOp(*op), wk);
        defs.insert(attr, method);
    }

    // `str`/`chr` are direct unary built-ins carrying a back-edge to the
    // int block itself, not a nested method block.
    let self_edge_for_str = graph.alloc(NodeKind::BackEdge(block), position);
    let str_attr = graph.alloc(NodeKind::Builtin { kind: BuiltinKind::IntStr, context: self_edge_for_str }, position);
    defs.insert(wk.str, str_attr);
    let self_edge_for_chr = graph.alloc(NodeKind::BackEdge(block), position);
    let chr_attr = graph.alloc(NodeKind::Builtin { kind: BuiltinKind::IntChr, context: self_edge_for_chr }, position);
    defs.insert(wk.chr, chr_attr);

    // `logical_and`/`logical_or`: binary method blocks whose `result` is
    // the short-circuiting builtin.
    let and_method = binary_method_block(graph, block, BuiltinKind::IntLogicalAnd, wk);
    defs.insert(wk.logical_and, and_method);
    let or_method = binary_method_block(graph, block, BuiltinKind::IntLogicalOr, wk);
    defs.insert(wk.logical_or, or_method);

    // `select`: `{cond: BackEdge(int_block), result: Select(...)}`.
    let select_method = graph.alloc(NodeKind::Block(Defs::new()), position);
    let cond_edge = graph.alloc(NodeKind::BackEdge(block), position);
    let select_method_edge = graph.alloc(NodeKind::BackEdge(select_method), position);
    let select_result = graph.alloc(NodeKind::Builtin { kind: BuiltinKind::Select, context: select_method_edge }, position);
    let mut select_defs = Defs::new();
    select_defs.insert(wk.cond, cond_edge);
    select_defs.insert(wk.result, select_result);
    graph.set_kind(select_method, NodeKind::Block(select_defs));
    defs.insert(wk.select, select_method);

    graph.set_kind(block, NodeKind::Block(defs));
}

/// Wraps a `String` into a full string block: `cat`, `add`
/// (alias for `cat`), `eq`/`ne`/`lt`/`le`/`gt`/`ge`, `len`, `substr`,
/// allocating a fresh node for the block.
pub fn string_block(graph: &mut Graph, value: Rc<str>, wk: &WellKnown, position: crate::error::Position) -> NodeId {
    let block = graph.alloc(NodeKind::Block(Defs::new()), position);
    populate_string_block(graph, block, value, wk, position);
    block
}

/// Same as [`string_block`], but builds into an already-allocated node; see
/// [`wrap_int_literal_in_place`].
pub fn wrap_string_literal_in_place(graph: &mut Graph, target: NodeId, value: Rc<str>, wk: &WellKnown, position: crate::error::Position) {
    populate_string_block(graph, target, value, wk, position);
}

fn populate_string_block(graph: &mut Graph, block: NodeId, value: Rc<str>, wk: &WellKnown, position: crate::error::Position) {
    let inner = graph.alloc(NodeKind::StringLit(value), position);

    let mut defs = Defs::new();
    defs.insert(wk.inner, inner);

    let cat_method = binary_method_block(graph, block, BuiltinKind::StrCat, wk);
    defs.insert(wk.cat, cat_method);
    // `add` is an alias for `cat`, wired with `CloneAttr` so it shares
    // identity with the `cat` attribute rather than duplicating the block.
    defs.insert(wk.add, graph.alloc(NodeKind::CloneAttr(wk.cat), position));

    for (&attr, op) in &[
        (&wk.eq, StrCmpKind::Eq),
        (&wk.ne, StrCmpKind::Ne),
        (&wk.lt, StrCmpKind::Lt),
        (&wk.gt, StrCmpKind::Gt),
        (&wk.le, StrCmpKind::Le),
        (&wk.ge, StrCmpKind::Ge),
    ] {
        let method = binary_method_block(graph, block, BuiltinKind::StrComparison(*op), wk);
        defs.insert(attr, method);
    }

    // `len` is a method block like the binary ops, not a direct builtin:
    // `x.len.result` (spec §4.4/§4.5) needs a `result` attribute to land on.
    let len_method = binary_method_block(graph, block, BuiltinKind::StrLen, wk);
    defs.insert(wk.len, len_method);

    // `substr[start, end]`: `x` defaults to the string itself, `start`
    // defaults to 0, `end` defaults to `x.len.result`.
    let substr_method = graph.alloc(NodeKind::Block(Defs::new()), position);
    let x_edge = graph.alloc(NodeKind::BackEdge(block), position);
    let start_default = graph.alloc(NodeKind::IntLit(0), position);
    let substr_self_edge = graph.alloc(NodeKind::BackEdge(substr_method), position);
    let x_access_for_len = graph.alloc(NodeKind::Access { base: substr_self_edge, attr: wk.x }, position);
    let len_access = graph.alloc(NodeKind::Access { base: x_access_for_len, attr: wk.len }, position);
    let end_default = graph.alloc(NodeKind::Access { base: len_access, attr: wk.result }, position);
    let substr_method_edge = graph.alloc(NodeKind::BackEdge(substr_method), position);
    let substr_result = graph.alloc(
        NodeKind::Builtin { kind: BuiltinKind::StrSubstr, context: substr_method_edge },
        position,
    );
    let mut substr_defs = Defs::new();
    substr_defs.insert(wk.x, x_edge);
    substr_defs.insert(wk.start, start_default);
    substr_defs.insert(wk.end, end_default);
    substr_defs.insert(wk.result, substr_result);
    graph.set_kind(substr_method, NodeKind::Block(substr_defs));
    defs.insert(wk.substr, substr_method);

    graph.set_kind(block, NodeKind::Block(defs));
}

/// Maps a surface `BinOp` token to the attribute name its desugaring calls
/// (the desugaring's method-name table).
#[must_use]
pub fn method_of(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Mod => "mod",
        BinOp::Eq => "eq",
        BinOp::Ne => "ne",
        BinOp::Lt => "lt",
        BinOp::Gt => "gt",
        BinOp::Le => "le",
        BinOp::Ge => "ge",
        BinOp::And => "logical_and",
        BinOp::Or => "logical_or",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_matches_floor_semantics() {
        assert_eq!(int_op(IntOpKind::Div, -7, 2).unwrap(), -4);
        assert_eq!(int_op(IntOpKind::Mod, -7, 2).unwrap(), 1);
    }

    #[test]
    fn division_by_zero_is_a_type_error() {
        assert!(int_op(IntOpKind::Div, 1, 0).is_err());
    }

    #[test]
    fn substr_clamps_out_of_range_bounds() {
        assert_eq!(substr("hello", -5, 100), "hello");
        assert_eq!(substr("hello", 1, 4), "ell");
        assert_eq!(substr("hello", 4, 1), "");
    }

    #[test]
    fn chr_roundtrips_through_ascii() {
        let ch = char::from_u32(65).unwrap();
        assert_eq!(ch.to_string(), "A");
    }
}
