//! A compiler for Abstract Syntax Description Language (ASDL) schemas.
//!
//! Schemas are [parsed][surface::Module::parse], [validated][surface::validation]
//! and [resolved][surface::elaboration] into a [`core::TypeLookup`], which the
//! [code generators][pass] and the [OHeap encoder][core::binary] read from.

// Supporting modules
mod files;
mod source;

// Intermediate languages
pub mod core;
pub mod surface;

// Code generation
pub mod pass;

// Top level API
mod driver;

pub use crate::driver::{Driver, Status};
pub use crate::files::{FileId, Files};
pub use crate::source::{ByteRange, BytePos, Ranged};

/// Added to the notes of diagnostics for internal errors.
pub const BUG_REPORT_NOTE: &str =
    "this is a bug in asdl, please report it along with the schema that triggered it";
