//! The PDF token data model shared by every component of the merge core.

use indexmap::IndexMap;

/// A `(object number, generation)` pair naming an indirect object.
///
/// Equality is pairwise. Every reference this crate *produces* carries
/// generation 0; references with a non-zero generation may still appear on
/// the *input* side (source documents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub number: u32,
    pub generation: u16,
}

impl Reference {
    pub fn new(number: u32, generation: u16) -> Self {
        Reference { number, generation }
    }

    /// A fresh-generation reference, as produced by this crate's writer.
    pub fn fresh(number: u32) -> Self {
        Reference { number, generation: 0 }
    }
}

/// A numeric token: PDF distinguishes integers from reals at the syntax
/// level (integers never carry a decimal point).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Real(f64),
}

/// A decoded PDF string. Strings are modelled as UTF-16 code units rather
/// than bytes so the serializer can apply the Latin-1-vs-UTF-16BE heuristic
/// (`§4.1`) uniformly regardless of how the source parser decoded them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString(pub Vec<u16>);

impl PdfString {
    pub fn from_latin1(bytes: &[u8]) -> Self {
        PdfString(bytes.iter().map(|&b| b as u16).collect())
    }

    pub fn from_str(s: &str) -> Self {
        PdfString(s.encode_utf16().collect())
    }
}

/// An ordered dictionary: PDF requires reproducible byte output, so
/// insertion order must be preserved by the container.
pub type Dictionary = IndexMap<String, Token>;

/// Any PDF token the core may encounter while copying a source graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Null,
    Boolean(bool),
    Numeric(Numeric),
    /// A `/Name` identifier, stored without its leading slash and without
    /// `#HH` escaping — escaping is a serialization concern.
    Name(String),
    String(PdfString),
    /// Bytes rendered between `<` and `>`.
    Hex(Vec<u8>),
    Array(Vec<Token>),
    Dictionary(Dictionary),
    Stream(Dictionary, Vec<u8>),
    Comment(String),
    IndirectReference(Reference),
    /// A top-level numbered container holding another token at a byte
    /// offset. Produced only by a parser; `GraphCopier` rejects it with
    /// `MergeError::UnexpectedObjectWrapper`.
    Object {
        reference: Reference,
        value: Box<Token>,
    },
}

impl Token {
    pub fn name(s: impl Into<String>) -> Token {
        Token::Name(s.into())
    }

    pub fn integer(v: i64) -> Token {
        Token::Numeric(Numeric::Integer(v))
    }

    pub fn real(v: f64) -> Token {
        Token::Numeric(Numeric::Real(v))
    }

    pub fn reference(r: Reference) -> Token {
        Token::IndirectReference(r)
    }

    pub fn dict(entries: impl IntoIterator<Item = (String, Token)>) -> Token {
        Token::Dictionary(entries.into_iter().collect())
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Token::Dictionary(d) => Some(d),
            Token::Stream(d, _) => Some(d),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<Reference> {
        match self {
            Token::IndirectReference(r) => Some(*r),
            _ => None,
        }
    }
}
