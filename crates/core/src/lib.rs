//! Clockwork Core: the value model, object heap, string intern table and
//! bytecode chunk shared by the compiler and the VM.
//!
//! Key design principles:
//! - `Value`: what Clockwork programs talk about (null, bool, number,
//!   object handle).
//! - `Obj`/`Heap`: heap objects, arena-allocated so the VM can free the
//!   whole graph in one `Drop` instead of walking an intrusive list.
//! - `Table`/`Interner`: the open-addressing hash table spec.md §4.4
//!   describes, reused for both string interning and the VM's globals.
//! - `Chunk`: a flat bytecode buffer with parallel line metadata and a
//!   256-entry constant pool.
//!
//! # Modules
//!
//! - `value`: the tagged `Value` enum and its equality/falsiness rules.
//! - `object`: heap objects and the arena they live in.
//! - `intern`: FNV-1a hashing and the string interner.
//! - `table`: the generic open-addressing hash table backing both of the
//!   above.
//! - `chunk`: bytecode buffer, opcodes, and the constants pool.

pub mod chunk;
pub mod intern;
pub mod object;
pub mod table;
pub mod value;

pub use chunk::{Chunk, OpCode, MAX_CONSTANTS};
pub use intern::{fnv1a_hash, Interner};
pub use object::{Heap, Obj, ObjHandle, ObjString};
pub use table::Table;
pub use value::Value;
