//! Compile-time diagnostics.
//!
//! The core's contract (spec.md §1) is the `interpret` API and the wire
//! format for compile errors (§6/§7); pretty-printing those errors on
//! stderr is the driver's job, not the compiler's. `CompileError` carries
//! exactly the fields the wire format needs and implements `Display` to
//! produce it, so `clockwork-cli` doesn't have to re-derive the format
//! itself — the hand-rolled-enum-plus-manual-`Display` style the whole
//! corpus uses for error types instead of reaching for `thiserror`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    AtLexeme(String),
    AtEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: u32,
    pub at: ErrorLocation,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.at {
            ErrorLocation::AtEnd => {
                write!(f, "[line {}] Error at end: {}", self.line, self.message)
            }
            ErrorLocation::AtLexeme(lexeme) => write!(
                f,
                "[line {}] Error at '{}': {}",
                self.line, lexeme, self.message
            ),
        }
    }
}

impl std::error::Error for CompileError {}
