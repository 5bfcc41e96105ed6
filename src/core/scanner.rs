//! The external-collaborator boundary: traits a parsed source document must
//! implement for this crate to merge pages out of it. Parsing, xref
//! resolution, encryption handling, and filter decoding all live on the
//! other side of this boundary.

use crate::core::token::{Reference, Token};
use crate::error::MergeError;

/// Resolves an indirect reference in one source document to its concrete
/// token. Implementations may parse on demand.
pub trait SourceScanner {
    fn resolve(&self, reference: Reference) -> Result<Token, MergeError>;
}

/// A page-tree node: either a `Page` leaf or an intermediate `Pages` node.
#[derive(Debug, Clone)]
pub struct PageTreeNode {
    pub dict: Token,
    pub parent: Option<Reference>,
    pub is_page: bool,
}

/// A source document's catalog, as needed to walk its page tree.
pub trait Catalog {
    /// Look up the page leaf node at a 1-based page index.
    fn page_node(&self, one_based_index: u32) -> Result<PageTreeNode, MergeError>;

    fn page_count(&self) -> u32;

    /// Whether the source trailer carried an `/Encrypt` entry.
    fn is_encrypted(&self) -> bool {
        false
    }

    /// A caller-facing label for error messages (e.g. a file path).
    fn label(&self) -> String {
        String::from("<source>")
    }
}
