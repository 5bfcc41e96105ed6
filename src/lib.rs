//! A dependency-free-of-PDF-parsers PDF merge core: given already-parsed
//! source documents (collaborators implement [`core::scanner::SourceScanner`]
//! and [`core::scanner::Catalog`]), concatenates their page trees into one
//! output file, deduplicating byte-identical indirect objects along the way.
//!
//! Parsing, xref resolution, encryption key derivation and filter decoding
//! are all out of scope here; see [`merge::merge_documents`] for the single
//! entry point this crate exposes.

pub mod core;
pub mod error;
pub mod merge;

pub use error::MergeError;
pub use merge::{merge_documents, MergeInput};
