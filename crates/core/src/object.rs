//! Heap-allocated objects.
//!
//! `Obj` is the polymorphic header spec.md §3 describes — a type
//! discriminator over a payload, with `String` as the only subtype today.
//! Objects live in a [`Heap`], a bump arena owned by the VM; dropping the
//! `Heap` frees every object at once, which is the arena alternative to an
//! intrusive free-list that spec.md §9 explicitly allows ("a
//! re-implementation may choose arena allocation... which preserves
//! observable semantics since the core has no explicit free").

use std::ptr::NonNull;

use bumpalo::Bump;

use crate::intern::fnv1a_hash;

/// A heap object. The only subtype today is an interned string.
#[derive(Debug)]
pub enum Obj {
    Str(ObjString),
}

/// A handle to an arena-allocated [`Obj`]. Valid for the lifetime of the
/// [`Heap`] it was allocated from. `Copy` so it can live inside [`Value`]
/// (`crate::value::Value`) the same way a raw `Obj*` would in C.
pub type ObjHandle = NonNull<Obj>;

/// An immutable, interned byte string.
///
/// Two `ObjString`s with identical bytes never coexist in the same VM: all
/// construction goes through [`Heap::intern`], which canonicalizes against
/// the VM's string table before allocating anything new.
///
/// `bytes` points into the arena `Obj` itself lives in (see
/// [`Heap::alloc_string`]), not a separate `Box` allocation: the `'static`
/// lifetime is a lie enforced by convention rather than the type system,
/// the same lifetime-erasure `ObjHandle` (`NonNull<Obj>`, with no lifetime
/// parameter at all) already relies on. It's only ever read through a
/// handle while the owning `Heap` is alive.
#[derive(Debug)]
pub struct ObjString {
    bytes: &'static str,
    pub hash: u32,
}

impl ObjString {
    pub fn as_str(&self) -> &str {
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Owns the arena every heap object is allocated from.
///
/// `Heap` does not itself deduplicate strings — that's
/// [`crate::table::Interner`]'s job — it only owns the memory. Dropping a
/// `Heap` invalidates every [`ObjHandle`] allocated from it; the VM holds
/// exactly one `Heap` for its whole lifetime, so this only happens at
/// teardown.
pub struct Heap {
    arena: Bump,
}

impl Heap {
    pub fn new() -> Self {
        Heap { arena: Bump::new() }
    }

    /// Allocate a new (not-yet-interned) string object and return a handle
    /// to it. Callers that want interning semantics should go through
    /// [`crate::table::Interner::intern`] instead.
    ///
    /// The bytes are copied straight into the arena via `alloc_str`, not
    /// boxed separately: `bumpalo::Bump` never runs `Drop` glue for values
    /// handed to it, so anything reachable only through an ordinary heap
    /// allocation stored *inside* an arena-allocated value would leak when
    /// the arena is dropped. Copying the bytes themselves into the arena is
    /// what makes "freed en bloc at teardown" (spec.md §9) actually true.
    pub fn alloc_string(&self, s: &str) -> ObjHandle {
        let hash = fnv1a_hash(s.as_bytes());
        let bytes: &str = self.arena.alloc_str(s);
        // SAFETY: `bytes` borrows from `self.arena`, which this `Obj` is
        // about to be allocated into and which outlives every `ObjHandle`
        // derived from it for as long as the owning `Heap` is alive — the
        // same contract `ObjHandle` itself (a lifetime-erased `NonNull`)
        // already depends on callers upholding.
        let bytes: &'static str = unsafe { std::mem::transmute::<&str, &'static str>(bytes) };
        let obj = self.arena.alloc(Obj::Str(ObjString { bytes, hash }));
        NonNull::from(obj)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_roundtrips_bytes() {
        let heap = Heap::new();
        let handle = heap.alloc_string("hello");
        let Obj::Str(s) = unsafe { handle.as_ref() };
        assert_eq!(s.as_str(), "hello");
    }

    #[test]
    fn distinct_allocations_get_distinct_handles() {
        let heap = Heap::new();
        let a = heap.alloc_string("same");
        let b = heap.alloc_string("same");
        assert_ne!(a.as_ptr(), b.as_ptr());
    }
}
