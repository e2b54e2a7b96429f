//! FNV-1a hashing and the string interner built on top of [`crate::table`].

use crate::object::{Heap, Obj, ObjHandle};
use crate::table::Table;

/// FNV-1a, 32-bit, over raw bytes. Per spec.md §4.4.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Canonicalizes strings so that byte-equal strings share one heap object.
///
/// Backed by a [`Table<()>`]-shaped open-addressing set (spec.md §4.4):
/// `find_by_bytes` probes without allocating, and `intern` only asks the
/// `Heap` for new memory on an actual miss.
pub struct Interner {
    table: Table<()>,
}

impl Interner {
    pub fn new() -> Self {
        Interner {
            table: Table::new(),
        }
    }

    /// Intern `s`, allocating a new `ObjString` in `heap` only if an
    /// identical string isn't already interned. Always returns a handle to
    /// the single canonical object for `s`'s bytes.
    pub fn intern(&mut self, heap: &Heap, s: &str) -> ObjHandle {
        let hash = fnv1a_hash(s.as_bytes());
        if let Some(existing) = self.find_by_bytes(s.as_bytes(), hash) {
            return existing;
        }
        let handle = heap.alloc_string(s);
        self.table.set(handle, ());
        handle
    }

    /// Probe for a string with these exact bytes and hash without
    /// constructing a new object first, per spec.md §4.4.
    pub fn find_by_bytes(&self, bytes: &[u8], hash: u32) -> Option<ObjHandle> {
        self.table.find_key_by_bytes(bytes, hash)
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn obj_hash(handle: ObjHandle) -> u32 {
    match unsafe { handle.as_ref() } {
        Obj::Str(s) => s.hash,
    }
}

pub(crate) fn obj_bytes_eq(handle: ObjHandle, bytes: &[u8]) -> bool {
    match unsafe { handle.as_ref() } {
        Obj::Str(s) => s.as_bytes() == bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_intern_to_one_object() {
        let heap = Heap::new();
        let mut interner = Interner::new();
        let a = interner.intern(&heap, "hello");
        let b = interner.intern(&heap, "hello");
        assert_eq!(a.as_ptr(), b.as_ptr());
    }

    #[test]
    fn different_bytes_intern_to_different_objects() {
        let heap = Heap::new();
        let mut interner = Interner::new();
        let a = interner.intern(&heap, "hello");
        let b = interner.intern(&heap, "world");
        assert_ne!(a.as_ptr(), b.as_ptr());
    }

    #[test]
    fn fnv1a_is_deterministic() {
        assert_eq!(fnv1a_hash(b"abc"), fnv1a_hash(b"abc"));
        assert_ne!(fnv1a_hash(b"abc"), fnv1a_hash(b"abd"));
    }
}
