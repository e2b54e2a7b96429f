//! Open-addressing hash table shared by the string interner and the VM's
//! globals table, per spec.md §3/§4.4.
//!
//! Power-of-two capacity, linear probing, tombstone deletes, resize at a
//! load factor above 0.75. Keys are always interned string handles, so
//! ordinary lookups compare by pointer; interning itself needs a separate
//! byte-comparing probe ([`Table::find_key_by_bytes`]) since it runs
//! *before* a handle for the candidate string exists.

use crate::intern::{obj_bytes_eq, obj_hash};
use crate::object::ObjHandle;

const INITIAL_CAPACITY: usize = 8;
const MAX_LOAD: f64 = 0.75;

enum Slot<V> {
    Empty,
    Tombstone,
    Occupied(ObjHandle, V),
}

pub struct Table<V> {
    entries: Vec<Slot<V>>,
    /// Count of entries ever inserted since the last resize (occupied +
    /// tombstones). Spec.md §4.4: "Size is not decremented" on removal;
    /// this is what the 0.75 load-factor check is computed against.
    size: usize,
}

impl<V> Table<V> {
    pub fn new() -> Self {
        Table {
            entries: Vec::new(),
            size: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn ensure_capacity(&mut self) {
        if self.entries.is_empty() {
            self.grow();
            return;
        }
        if (self.size + 1) as f64 > self.capacity() as f64 * MAX_LOAD {
            self.grow();
        }
    }

    fn grow(&mut self) {
        let new_cap = if self.entries.is_empty() {
            INITIAL_CAPACITY
        } else {
            self.capacity() * 2
        };
        let mut new_entries: Vec<Slot<V>> = (0..new_cap).map(|_| Slot::Empty).collect();
        let mut live = 0;
        for slot in std::mem::take(&mut self.entries) {
            if let Slot::Occupied(key, value) = slot {
                let mut idx = (obj_hash(key) as usize) % new_cap;
                while !matches!(new_entries[idx], Slot::Empty) {
                    idx = (idx + 1) % new_cap;
                }
                new_entries[idx] = Slot::Occupied(key, value);
                live += 1;
            }
        }
        self.entries = new_entries;
        self.size = live;
    }

    /// Insert or overwrite `key`'s value. Returns `true` if this created a
    /// new entry (used by `DEF_GLOBAL`'s caller to distinguish redeclaration
    /// from first declaration, and by `SET_GLOBAL` to detect "undefined
    /// variable").
    pub fn set(&mut self, key: ObjHandle, value: V) -> bool {
        self.ensure_capacity();
        let cap = self.capacity();
        let mut idx = (obj_hash(key) as usize) % cap;
        let mut tombstone_idx: Option<usize> = None;
        loop {
            match &self.entries[idx] {
                Slot::Empty => {
                    let is_new = tombstone_idx.is_none();
                    let target = tombstone_idx.unwrap_or(idx);
                    if is_new {
                        self.size += 1;
                    }
                    self.entries[target] = Slot::Occupied(key, value);
                    return is_new;
                }
                Slot::Tombstone => {
                    if tombstone_idx.is_none() {
                        tombstone_idx = Some(idx);
                    }
                }
                Slot::Occupied(k, _) if k.as_ptr() == key.as_ptr() => {
                    self.entries[idx] = Slot::Occupied(key, value);
                    return false;
                }
                Slot::Occupied(_, _) => {}
            }
            idx = (idx + 1) % cap;
        }
    }

    pub fn get(&self, key: ObjHandle) -> Option<&V> {
        if self.entries.is_empty() {
            return None;
        }
        let cap = self.capacity();
        let mut idx = (obj_hash(key) as usize) % cap;
        loop {
            match &self.entries[idx] {
                Slot::Empty => return None,
                Slot::Occupied(k, v) if k.as_ptr() == key.as_ptr() => return Some(v),
                _ => {}
            }
            idx = (idx + 1) % cap;
        }
    }

    /// Replace `key`'s entry with a tombstone. Returns `true` if `key` was
    /// present. Size is not decremented, per spec.md §4.4.
    pub fn delete(&mut self, key: ObjHandle) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let cap = self.capacity();
        let mut idx = (obj_hash(key) as usize) % cap;
        loop {
            match &self.entries[idx] {
                Slot::Empty => return false,
                Slot::Occupied(k, _) if k.as_ptr() == key.as_ptr() => {
                    self.entries[idx] = Slot::Tombstone;
                    return true;
                }
                _ => {}
            }
            idx = (idx + 1) % cap;
        }
    }

    /// Probe for an already-interned key matching these exact bytes and
    /// hash, without constructing a candidate object first. Non-tombstone
    /// entries only; stops at the first `Empty` slot.
    pub fn find_key_by_bytes(&self, bytes: &[u8], hash: u32) -> Option<ObjHandle> {
        if self.entries.is_empty() {
            return None;
        }
        let cap = self.capacity();
        let mut idx = (hash as usize) % cap;
        loop {
            match &self.entries[idx] {
                Slot::Empty => return None,
                Slot::Occupied(k, _) if obj_hash(*k) == hash && obj_bytes_eq(*k, bytes) => {
                    return Some(*k);
                }
                _ => {}
            }
            idx = (idx + 1) % cap;
        }
    }
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Heap;

    #[test]
    fn set_get_delete_roundtrip() {
        let heap = Heap::new();
        let mut table: Table<i32> = Table::new();
        let key = heap.alloc_string("answer");
        assert!(table.set(key, 42));
        assert_eq!(table.get(key), Some(&42));
        assert!(table.delete(key));
        assert_eq!(table.get(key), None);
    }

    #[test]
    fn set_on_existing_key_returns_false() {
        let heap = Heap::new();
        let mut table: Table<i32> = Table::new();
        let key = heap.alloc_string("x");
        assert!(table.set(key, 1));
        assert!(!table.set(key, 2));
        assert_eq!(table.get(key), Some(&2));
    }

    #[test]
    fn grows_past_load_factor() {
        let heap = Heap::new();
        let mut table: Table<i32> = Table::new();
        let mut keys = Vec::new();
        for i in 0..100 {
            let key = heap.alloc_string(&format!("k{i}"));
            table.set(key, i);
            keys.push(key);
        }
        for (i, key) in keys.into_iter().enumerate() {
            assert_eq!(table.get(key), Some(&(i as i32)));
        }
    }

    #[test]
    fn tombstones_do_not_block_lookups_past_them() {
        let heap = Heap::new();
        let mut table: Table<i32> = Table::new();
        let a = heap.alloc_string("a");
        let b = heap.alloc_string("b");
        table.set(a, 1);
        table.set(b, 2);
        table.delete(a);
        assert_eq!(table.get(b), Some(&2));
    }
}
