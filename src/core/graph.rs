//! `GraphCopier`: deep-copies a token graph from a source document into a
//! `DedupWriter`, rewriting indirect references exactly once per distinct
//! source reference while tolerating arbitrary reference cycles.
//!
//! The writer is threaded through as a parameter rather than stored on the
//! copier, since a caller (`PageTreeAssembler`) typically needs its own
//! direct access to the same `DedupWriter` interleaved with copy calls.

use std::collections::HashMap;

use crate::core::scanner::SourceScanner;
use crate::core::token::{Reference, Token};
use crate::core::writer::DedupWriter;
use crate::error::MergeError;

pub struct GraphCopier<'a, S: SourceScanner> {
    scanner: &'a S,
    /// Already-finalized source-reference -> output-reference translations,
    /// scoped to this source document.
    global_map: HashMap<Reference, Reference>,
}

/// `None` marks a reference whose body is still being built further up the
/// recursion stack (started but target unknown); `Some` is a concrete
/// reservation minted the second time that reference was revisited.
type Pending = HashMap<Reference, Option<Reference>>;

impl<'a, S: SourceScanner> GraphCopier<'a, S> {
    pub fn new(scanner: &'a S) -> Self {
        GraphCopier {
            scanner,
            global_map: HashMap::new(),
        }
    }

    /// Deep-copy `token` into `writer`. The returned token, once
    /// serialized, contains no source-document references.
    pub fn copy(&mut self, writer: &mut DedupWriter, token: &Token) -> Result<Token, MergeError> {
        let mut pending = Pending::new();
        self.copy_inner(writer, token, &mut pending)
    }

    fn copy_inner(
        &mut self,
        writer: &mut DedupWriter,
        token: &Token,
        pending: &mut Pending,
    ) -> Result<Token, MergeError> {
        match token {
            Token::Null
            | Token::Boolean(_)
            | Token::Numeric(_)
            | Token::Name(_)
            | Token::String(_)
            | Token::Hex(_)
            | Token::Comment(_) => Ok(token.clone()),
            Token::Array(items) => {
                let mut copied = Vec::with_capacity(items.len());
                for item in items {
                    copied.push(self.copy_inner(writer, item, pending)?);
                }
                Ok(Token::Array(copied))
            }
            Token::Dictionary(dict) => {
                let mut copied = indexmap::IndexMap::with_capacity(dict.len());
                for (key, value) in dict {
                    copied.insert(key.clone(), self.copy_inner(writer, value, pending)?);
                }
                Ok(Token::Dictionary(copied))
            }
            Token::Stream(dict, payload) => {
                let mut copied = indexmap::IndexMap::with_capacity(dict.len());
                for (key, value) in dict {
                    copied.insert(key.clone(), self.copy_inner(writer, value, pending)?);
                }
                Ok(Token::Stream(copied, payload.clone()))
            }
            Token::Object { .. } => Err(MergeError::UnexpectedObjectWrapper),
            Token::IndirectReference(r) => {
                self.resolve(writer, *r, pending).map(Token::IndirectReference)
            }
        }
    }

    fn resolve(
        &mut self,
        writer: &mut DedupWriter,
        r: Reference,
        pending: &mut Pending,
    ) -> Result<Reference, MergeError> {
        if let Some(&output) = self.global_map.get(&r) {
            return Ok(output);
        }

        match pending.get(&r).copied() {
            Some(None) => {
                let reservation = writer.reserve_reference();
                pending.insert(r, Some(reservation));
                self.global_map.insert(r, reservation);
                return Ok(reservation);
            }
            Some(Some(reservation)) => return Ok(reservation),
            None => {}
        }

        pending.insert(r, None);
        let source_token = self.scanner.resolve(r)?;
        if matches!(source_token, Token::IndirectReference(_)) {
            return Err(MergeError::ChainedReference(r));
        }
        let copied = self.copy_inner(writer, &source_token, pending)?;

        let result = match pending.get(&r).copied().flatten() {
            Some(reservation) => writer.write_reserved(reservation.number, &copied)?,
            None => {
                let fresh = writer.write_token(&copied);
                self.global_map.insert(r, fresh);
                fresh
            }
        };
        Ok(result)
    }
}
