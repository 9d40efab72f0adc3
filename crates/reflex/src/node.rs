//! The data model: a single arena holding every `Node` — source AST,
//! preprocessed graph, and runtime values all share the same representation.
//! Also home to the lazy-clone/override-propagation protocol, which is what
//! lets `Block` overrides share structure instead of deep-copying on every
//! `[...]`/`(...)`.
//!
//! A slot arena (`Vec<Option<Slot>>`) with a free list, addressed by a small
//! `Copy` id (`NodeId`) instead of `Rc`/`Weak` handles.

use ahash::AHashSet;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    builtins::BuiltinKind,
    error::{Position, ReflexError, ReflexResult},
    intern::AttrId,
};

/// Index into the `Graph` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("more live nodes than fit in u32"))
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Ordered, unique-key attribute map. `IndexMap` preserves insertion order
/// and gives O(1) lookup.
pub type Defs = IndexMap<AttrId, NodeId>;

/// A pending-clone table: `from-old-node -> to-new-node`. Conceptually a
/// weakly-keyed map; since nodes are addressed by arena index here, a plain
/// `IndexMap` already behaves like one — stale entries pointing at freed
/// slots are inert and are pruned wholesale by the next `Graph::gc`.
pub type CloneTable = IndexMap<NodeId, NodeId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
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
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Block(Defs),
    Override { base: NodeId, defs: Defs },
    Call { base: NodeId, defs: Defs },
    Access { base: NodeId, attr: AttrId },
    BackEdge(NodeId),
    Eager(NodeId),
    CloneAttr(AttrId),

    IntLit(i64),
    StringLit(std::rc::Rc<str>),

    Builtin { kind: BuiltinKind, context: NodeId },

    // Surface-only; must not survive preprocessing.
    Identifier(AttrId),
    SelfRef,
    Parent(u32),
    AncestorLookup(AttrId),
    BinaryOp { left: NodeId, op: BinOp, right: NodeId },
    Conditional { cond: NodeId, then_branch: NodeId, else_branch: NodeId },
}

impl NodeKind {
    /// Name used in error messages and the "other leaf" dispatch.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Block(_) => "block",
            Self::Override { .. } => "override",
            Self::Call { .. } => "call",
            Self::Access { .. } => "access",
            Self::BackEdge(_) => "back-edge",
            Self::Eager(_) => "eager",
            Self::CloneAttr(_) => "clone-attr",
            Self::IntLit(_) => "int literal",
            Self::StringLit(_) => "string literal",
            Self::Builtin { .. } => "builtin",
            Self::Identifier(_) => "identifier",
            Self::SelfRef => "self",
            Self::Parent(_) => "parent",
            Self::AncestorLookup(_) => "ancestor lookup",
            Self::BinaryOp { .. } => "binary op",
            Self::Conditional { .. } => "conditional",
        }
    }

    /// Atomic nodes are returned unchanged by `lazy_clone`: they carry no
    /// children for override back-edges to ever reach through.
    fn is_atomic(&self) -> bool {
        matches!(
            self,
            Self::IntLit(_)
                | Self::StringLit(_)
                | Self::CloneAttr(_)
                | Self::Identifier(_)
                | Self::SelfRef
                | Self::Parent(_)
                | Self::AncestorLookup(_)
        )
    }

    /// Only Block/Override identities are worth aliasing in a clone table —
    /// a BackEdge can point at one of these, never at a Call.
    fn participates_in_backedges(&self) -> bool {
        matches!(self, Self::Block(_) | Self::Override { .. })
    }
}

struct Slot {
    kind: NodeKind,
    /// The pending-clone table. `None` means "already materialised" — every
    /// observable `Block` is kept free of a pending table.
    pending: Option<CloneTable>,
    position: Position,
}

/// The arena backing every `Node` in a single evaluation.
pub struct Graph {
    slots: Vec<Option<Slot>>,
    free_list: Vec<NodeId>,
    allocations_since_gc: usize,
}

/// Sweeps roughly this often, tuned for the small graphs a single reflex
/// program builds.
const GC_INTERVAL: usize = 4096;

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            allocations_since_gc: 0,
        }
    }

    pub fn alloc(&mut self, kind: NodeKind, position: Position) -> NodeId {
        let slot = Slot { kind, pending: None, position };
        self.allocations_since_gc += 1;
        if let Some(id) = self.free_list.pop() {
            self.slots[id.index()] = Some(slot);
            id
        } else {
            let id = NodeId::new(self.slots.len());
            self.slots.push(Some(slot));
            id
        }
    }

    fn slot(&self, id: NodeId) -> &Slot {
        self.slots[id.index()].as_ref().expect("Graph::slot: use of freed node")
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        self.slots[id.index()].as_mut().expect("Graph::slot_mut: use of freed node")
    }

    #[must_use]
    pub fn position(&self, id: NodeId) -> Position {
        self.slot(id).position
    }

    /// Reads a node's kind. Panics if the node still has a pending clone
    /// table — callers must `propagate_clone` first.
    pub fn kind(&mut self, id: NodeId) -> &NodeKind {
        self.propagate_clone(id);
        &self.slot(id).kind
    }

    /// Replaces a node's kind in place without touching its pending table.
    /// Used by the preprocessor, which rewrites surface nodes before any
    /// cloning has happened.
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.slot_mut(id).kind = kind;
    }

    /// Attribute projection with no cloning of the returned child. The
    /// target must already be a plain `Block`: by
    /// construction an `Override`/`Call` is always reduced away before its
    /// value is inspected (the evaluator always turns them into a fresh
    /// clone first), so anything else here is an evaluator bug, not a
    /// language-level error.
    pub fn block_get(&mut self, id: NodeId, attr: AttrId, attr_name: &str) -> ReflexResult<NodeId> {
        self.propagate_clone(id);
        match &self.slot(id).kind {
            NodeKind::Block(defs) => defs.get(&attr).copied().ok_or_else(|| ReflexError::Reference {
                message: format!("no attribute `{attr_name}`"),
                position: Some(self.slot(id).position),
            }),
            other => Err(ReflexError::Invariant {
                attr: attr_name.to_owned(),
                message: format!("attribute access on non-block node ({})", other.kind_name()),
            }),
        }
    }

    /// Shallow-copies `id`, unioning `overrides` into the new pending table.
    /// Atomic nodes are returned unchanged.
    pub fn lazy_clone(&mut self, id: NodeId, overrides: &CloneTable) -> NodeId {
        if self.slot(id).kind.is_atomic() {
            return id;
        }
        let kind = self.slot(id).kind.clone();
        let position = self.slot(id).position;
        let existing = self.slot(id).pending.clone().unwrap_or_default();

        let mut table = union_collapsed(overrides, &existing);
        let new_id = self.alloc(kind, position);
        if self.slot(id).kind.participates_in_backedges() {
            let mut singleton = CloneTable::new();
            singleton.insert(id, new_id);
            table = union_collapsed(&table, &singleton);
        }
        self.slot_mut(new_id).pending = if table.is_empty() { None } else { Some(table) };
        new_id
    }

    /// Materialises a node's pending clone table one level deeper (spec
    /// §4.3). A no-op if the table is empty or absent.
    pub fn propagate_clone(&mut self, id: NodeId) {
        let Some(table) = self.slot_mut(id).pending.take() else {
            return;
        };
        if table.is_empty() {
            return;
        }
        let kind = self.slot(id).kind.clone();
        let new_kind = match kind {
            NodeKind::Block(mut defs) => {
                for v in defs.values_mut() {
                    *v = self.lazy_clone(*v, &table);
                }
                NodeKind::Block(defs)
            }
            NodeKind::Override { base, mut defs } => {
                let base = self.lazy_clone(base, &table);
                for v in defs.values_mut() {
                    *v = self.lazy_clone(*v, &table);
                }
                NodeKind::Override { base, defs }
            }
            NodeKind::Call { base, mut defs } => {
                let base = self.lazy_clone(base, &table);
                for v in defs.values_mut() {
                    *v = self.lazy_clone(*v, &table);
                }
                NodeKind::Call { base, defs }
            }
            NodeKind::Access { base, attr } => NodeKind::Access {
                base: self.lazy_clone(base, &table),
                attr,
            },
            NodeKind::Eager(inner) => NodeKind::Eager(self.lazy_clone(inner, &table)),
            NodeKind::Builtin { kind, context } => NodeKind::Builtin {
                kind,
                context: self.lazy_clone(context, &table),
            },
            NodeKind::BackEdge(target) => {
                let mut current = target;
                let mut seen = AHashSet::new();
                while let Some(&next) = table.get(&current) {
                    if !seen.insert(current) {
                        break;
                    }
                    current = next;
                }
                NodeKind::BackEdge(current)
            }
            // Atomic kinds never receive a pending table in the first
            // place (lazy_clone returns them unchanged), but surface-only
            // nodes can appear here only before preprocessing runs, when
            // nothing has been cloned yet either. Pass through either way.
            other => other,
        };
        self.slot_mut(id).kind = new_kind;
    }

    /// Every `NodeId` directly reachable from `kind`, for GC root-walking.
    fn children(kind: &NodeKind, out: &mut SmallVec<[NodeId; 4]>) {
        match kind {
            NodeKind::Block(defs) => out.extend(defs.values().copied()),
            NodeKind::Override { base, defs } | NodeKind::Call { base, defs } => {
                out.push(*base);
                out.extend(defs.values().copied());
            }
            NodeKind::Access { base, .. } => out.push(*base),
            NodeKind::BackEdge(target) => out.push(*target),
            NodeKind::Eager(inner) => out.push(*inner),
            NodeKind::Builtin { context, .. } => out.push(*context),
            NodeKind::BinaryOp { left, right, .. } => {
                out.push(*left);
                out.push(*right);
            }
            NodeKind::Conditional { cond, then_branch, else_branch } => {
                out.push(*cond);
                out.push(*then_branch);
                out.push(*else_branch);
            }
            NodeKind::IntLit(_)
            | NodeKind::StringLit(_)
            | NodeKind::CloneAttr(_)
            | NodeKind::Identifier(_)
            | NodeKind::SelfRef
            | NodeKind::Parent(_)
            | NodeKind::AncestorLookup(_) => {}
        }
    }

    /// Mark-sweep reclamation of everything unreachable from `roots`. Not
    /// required for correctness (stale pending-table entries are inert,
    /// see [`CloneTable`]'s docs) but bounds memory for override-heavy
    /// programs.
    pub fn gc(&mut self, roots: &[NodeId]) {
        let mut reachable = vec![false; self.slots.len()];
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            let idx = id.index();
            if reachable[idx] {
                continue;
            }
            reachable[idx] = true;
            let Some(slot) = &self.slots[idx] else { continue };
            let mut out = SmallVec::<[NodeId; 4]>::new();
            Self::children(&slot.kind, &mut out);
            stack.extend(out);
            if let Some(table) = &slot.pending {
                for (&k, &v) in table {
                    stack.push(k);
                    stack.push(v);
                }
            }
        }
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some() && !reachable[idx] {
                *slot = None;
                self.free_list.push(NodeId::new(idx));
            }
        }
        self.allocations_since_gc = 0;
    }

    #[must_use]
    pub fn should_gc(&self) -> bool {
        self.allocations_since_gc >= GC_INTERVAL
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// Unions `extra` into `base` (later entries win on key conflicts), then
/// collapses any `a -> b -> c` chain down to `a -> c`, dropping the `b -> c`
/// entry. Without this, a long chain of overrides on the same lineage would
/// grow its clone table by one entry per generation indefinitely.
fn union_collapsed(base: &CloneTable, extra: &CloneTable) -> CloneTable {
    let mut merged = base.clone();
    for (&k, &v) in extra {
        merged.insert(k, v);
    }
    loop {
        let mut rewrite = None;
        for (&a, &b) in &merged {
            if a == b {
                continue;
            }
            if let Some(&c) = merged.get(&b) {
                if b != c {
                    rewrite = Some((a, b, c));
                    break;
                }
            }
        }
        let Some((a, b, c)) = rewrite else { break };
        merged.insert(a, c);
        merged.swap_remove(&b);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::new(1, 1)
    }

    #[test]
    fn lazy_clone_of_atomic_node_is_identity() {
        let mut graph = Graph::new();
        let lit = graph.alloc(NodeKind::IntLit(5), pos());
        let overrides = CloneTable::new();
        assert_eq!(graph.lazy_clone(lit, &overrides), lit);
    }

    #[test]
    fn cloning_a_block_gives_it_fresh_identity() {
        let mut graph = Graph::new();
        let block = graph.alloc(NodeKind::Block(Defs::new()), pos());
        let overrides = CloneTable::new();
        let clone = graph.lazy_clone(block, &overrides);
        assert_ne!(block, clone);
    }

    #[test]
    fn propagate_clone_rewrites_a_backedge_into_the_clone() {
        let mut graph = Graph::new();
        let block = graph.alloc(NodeKind::Block(Defs::new()), pos());
        let backedge = graph.alloc(NodeKind::BackEdge(block), pos());
        let new_block = graph.alloc(NodeKind::Block(Defs::new()), pos());
        let mut table = CloneTable::new();
        table.insert(block, new_block);
        let cloned_backedge = graph.lazy_clone(backedge, &table);
        graph.propagate_clone(cloned_backedge);
        match graph.kind(cloned_backedge) {
            NodeKind::BackEdge(target) => assert_eq!(*target, new_block),
            other => panic!("expected BackEdge, got {other:?}"),
        }
    }

    #[test]
    fn chain_collapse_keeps_tables_bounded() {
        let a = NodeId::new(0);
        let b = NodeId::new(1);
        let c = NodeId::new(2);
        let mut base = CloneTable::new();
        base.insert(a, b);
        let mut extra = CloneTable::new();
        extra.insert(b, c);
        let merged = union_collapsed(&base, &extra);
        assert_eq!(merged.get(&a), Some(&c));
        assert!(!merged.contains_key(&b) || merged.get(&b) == Some(&c));
    }
}
