//! Interning for attribute names.
//!
//! Attribute names are compared and hashed constantly (block lookups,
//! back-edge resolution, pending-clone tables), so they are interned to a
//! small `Copy` id rather than carried around as owned `String`s.

use ahash::AHashMap;

/// Index into the `Interner`'s storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrId(u32);

impl AttrId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Maps attribute-name strings to small integer ids and back.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    ids: AHashMap<Box<str>, AttrId>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> AttrId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = AttrId(u32::try_from(self.strings.len()).expect("more attribute names than fit in u32"));
        self.strings.push(name.into());
        self.ids.insert(name.into(), id);
        id
    }

    #[must_use]
    pub fn resolve(&self, id: AttrId) -> &str {
        &self.strings[id.index()]
    }
}

/// The fixed vocabulary of attribute names the evaluator and primitive
/// library reach for by name — interned once up front so every later
/// lookup is a cheap `Copy` comparison instead of a fresh `intern()` call.
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub inner: AttrId,
    pub result: AttrId,
    pub x: AttrId,
    pub y: AttrId,
    pub cond: AttrId,
    pub r#true: AttrId,
    pub r#false: AttrId,
    pub start: AttrId,
    pub end: AttrId,

    pub add: AttrId,
    pub sub: AttrId,
    pub mul: AttrId,
    pub div: AttrId,
    pub r#mod: AttrId,
    pub eq: AttrId,
    pub ne: AttrId,
    pub lt: AttrId,
    pub gt: AttrId,
    pub le: AttrId,
    pub ge: AttrId,
    pub band: AttrId,
    pub bor: AttrId,
    pub bxor: AttrId,
    pub logical_and: AttrId,
    pub logical_or: AttrId,
    pub str: AttrId,
    pub chr: AttrId,
    pub select: AttrId,

    pub cat: AttrId,
    pub len: AttrId,
    pub substr: AttrId,
}

impl WellKnown {
    pub fn intern(interner: &mut Interner) -> Self {
        Self {
            inner: interner.intern("_inner"),
            result: interner.intern("result"),
            x: interner.intern("x"),
            y: interner.intern("y"),
            cond: interner.intern("cond"),
            r#true: interner.intern("true"),
            r#false: interner.intern("false"),
            start: interner.intern("start"),
            end: interner.intern("end"),

            add: interner.intern("add"),
            sub: interner.intern("sub"),
            mul: interner.intern("mul"),
            div: interner.intern("div"),
            r#mod: interner.intern("mod"),
            eq: interner.intern("eq"),
            ne: interner.intern("ne"),
            lt: interner.intern("lt"),
            gt: interner.intern("gt"),
            le: interner.intern("le"),
            ge: interner.intern("ge"),
            band: interner.intern("band"),
            bor: interner.intern("bor"),
            bxor: interner.intern("bxor"),
            logical_and: interner.intern("logical_and"),
            logical_or: interner.intern("logical_or"),
            str: interner.intern("str"),
            chr: interner.intern("chr"),
            select: interner.intern("select"),

            cat: interner.intern("cat"),
            len: interner.intern("len"),
            substr: interner.intern("substr"),
        }
    }
}
