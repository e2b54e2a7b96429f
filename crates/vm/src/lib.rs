//! Clockwork VM: the fetch-decode-execute loop that runs a compiled
//! [`Chunk`](clockwork_core::Chunk).
//!
//! # Modules
//!
//! - `vm`: the stack machine itself — dispatch loop, globals table,
//!   arithmetic/logic/print semantics.
//! - `error`: `RuntimeError`/`InterpretResult`, the three-way outcome of
//!   `Vm::interpret`.

mod vm;

pub mod error;

pub use error::{InterpretResult, RuntimeError};
pub use vm::Vm;
