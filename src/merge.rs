//! The public entry point: merges a sequence of source documents into one
//! output PDF. Thin on purpose — no file I/O, no catalog parsing, no page
//! selection UI. Callers supply already-parsed catalogs and scanners; this
//! module only wires `DedupWriter` + `PageTreeAssembler` together.

use std::io::{Read, Seek, Write};

use log::info;

use crate::core::page_tree::PageTreeAssembler;
use crate::core::scanner::{Catalog, SourceScanner};
use crate::core::serializer::Version;
use crate::core::writer::DedupWriter;
use crate::error::MergeError;

/// One source document to fold into the merge: its catalog and scanner
/// collaborators, its declared PDF version, and an optional 1-based page
/// selection (`None` copies every page).
pub struct MergeInput<'a, C: Catalog, S: SourceScanner> {
    pub catalog: &'a C,
    pub scanner: &'a S,
    pub version: Version,
    pub pages: Option<&'a [u32]>,
}

impl<'a, C: Catalog, S: SourceScanner> MergeInput<'a, C, S> {
    pub fn new(catalog: &'a C, scanner: &'a S, version: Version) -> Self {
        MergeInput { catalog, scanner, version, pages: None }
    }

    pub fn with_pages(mut self, pages: &'a [u32]) -> Self {
        self.pages = Some(pages);
        self
    }
}

/// Merge `inputs`, in order, into `sink`. Fails with
/// [`MergeError::EmptyDocument`] if the combined page count is zero, or
/// with [`MergeError::EncryptedSourceRejected`] on the first source whose
/// catalog reports an `/Encrypt` trailer entry.
pub fn merge_documents<W: Write + Seek + Read, C: Catalog, S: SourceScanner>(
    inputs: &[MergeInput<'_, C, S>],
    sink: &mut W,
) -> Result<(), MergeError> {
    info!("merging {} source document(s)", inputs.len());
    let mut writer = DedupWriter::new();
    let mut assembler = PageTreeAssembler::new(&mut writer);
    for input in inputs {
        assembler.add_document(input.catalog, input.scanner, input.version, input.pages)?;
    }
    assembler.finalize(sink)
}
