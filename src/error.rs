use thiserror::Error;

use crate::core::token::Reference;

/// Errors surfaced by the merge core. All are fatal to the current merge;
/// nothing here is retried and partial output is not rolled back.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("source document {0:?} is encrypted and cannot be merged")]
    EncryptedSourceRejected(String),

    #[error("merge produced no pages")]
    EmptyDocument,

    #[error("catalog reference {0:?} was never written")]
    CatalogMissing(Reference),

    #[error("object numbers are not contiguous: min={min}, max={max}, count={count}")]
    FragmentedObjectRange { min: u32, max: u32, count: u32 },

    #[error("object number {0} is not reserved")]
    NotReserved(u32),

    #[error("flush attempted with {0} unbound reservation(s)")]
    ReservedNotBound(usize),

    #[error("GraphCopier received a top-level Object token, which is not a valid copy input")]
    UnexpectedObjectWrapper,

    #[error("resolver returned a reference chained to another reference: {0:?}")]
    ChainedReference(Reference),

    #[error("output sink returned fewer bytes than expected while reading back")]
    SourceShortRead,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("source scanner error: {0}")]
    Scanner(String),
}
