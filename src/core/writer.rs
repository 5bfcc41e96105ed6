//! `DedupWriter`: assigns output object numbers, content-addresses
//! serialized bodies to coalesce byte-identical duplicates, supports
//! forward reservations, and flushes the final file.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom, Write};

use indexmap::IndexMap;
use log::trace;

use crate::core::serializer::{TokenSerializer, Version};
use crate::core::token::{Reference, Token};
use crate::error::MergeError;

/// Deterministic content hash used to bucket serialized bodies before a
/// full-byte equality check. A 32-bit FNV-1a is sufficient; collisions are
/// resolved by the bucket's linear scan in `write_token`.
fn fnv1a(bytes: &[u8]) -> u32 {
    const PRIME: u32 = 16_777_619;
    let mut hash: u32 = 2_166_136_261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub struct DedupWriter {
    next_object_number: u32,
    reserved: HashSet<u32>,
    bodies: IndexMap<Reference, Vec<u8>>,
    by_content: HashMap<u32, Vec<(Vec<u8>, Reference)>>,
    serializer: TokenSerializer,
}

impl DedupWriter {
    pub fn new() -> Self {
        DedupWriter {
            next_object_number: 1,
            reserved: HashSet::new(),
            bodies: IndexMap::new(),
            by_content: HashMap::new(),
            serializer: TokenSerializer::new(),
        }
    }

    /// Hand out an object number for forward use; the caller must later
    /// bind it with `write_reserved`.
    pub fn reserve_number(&mut self) -> u32 {
        let n = self.next_object_number;
        self.next_object_number += 1;
        self.reserved.insert(n);
        n
    }

    pub fn reserve_reference(&mut self) -> Reference {
        Reference::fresh(self.reserve_number())
    }

    /// Serialize `token`; if its bytes already match a stored body, return
    /// that body's reference (dedup). Otherwise allocate a fresh number and
    /// store the new body.
    pub fn write_token(&mut self, token: &Token) -> Reference {
        let bytes = self.serializer.serialize(token);
        let hash = fnv1a(&bytes);
        if let Some(bucket) = self.by_content.get(&hash) {
            if let Some((_, reference)) = bucket.iter().find(|(stored, _)| stored == &bytes) {
                trace!("dedup hit for object {}", reference.number);
                return *reference;
            }
        }

        let number = self.next_object_number;
        self.next_object_number += 1;
        let reference = Reference::fresh(number);
        self.bodies.insert(reference, bytes.clone());
        self.by_content.entry(hash).or_default().push((bytes, reference));
        reference
    }

    /// Bind `number` (previously returned by `reserve_number`) to `token`'s
    /// serialized body. Reserved bindings never dedupe: they occupy their
    /// pre-assigned number verbatim so that parent references captured
    /// before serialization remain valid.
    pub fn write_reserved(&mut self, number: u32, token: &Token) -> Result<Reference, MergeError> {
        if !self.reserved.remove(&number) {
            return Err(MergeError::NotReserved(number));
        }
        let bytes = self.serializer.serialize(token);
        let reference = Reference::fresh(number);
        let hash = fnv1a(&bytes);
        self.by_content.entry(hash).or_default().push((bytes.clone(), reference));
        self.bodies.insert(reference, bytes);
        Ok(reference)
    }

    /// Write the header, every stored body (capturing its byte offset),
    /// then the cross-reference table and trailer.
    ///
    /// Per the output interface's "position query, seek, read-back,
    /// sequential write" contract, the freshly written span is read back
    /// and its length checked against what was written; a short read
    /// surfaces as [`MergeError::SourceShortRead`] rather than producing a
    /// silently truncated file. The sink is left positioned after `%%EOF`,
    /// matching the documented exit state.
    pub fn flush<W: Write + Seek + Read>(
        &mut self,
        sink: &mut W,
        version: Version,
        catalog: Reference,
        info: Option<Reference>,
    ) -> Result<(), MergeError> {
        if !self.reserved.is_empty() {
            return Err(MergeError::ReservedNotBound(self.reserved.len()));
        }
        if !self.bodies.contains_key(&catalog) {
            return Err(MergeError::CatalogMissing(catalog));
        }

        let start = sink.stream_position()?;

        self.serializer.write_header(sink, version)?;

        let mut offsets: Vec<(Reference, u64)> = Vec::with_capacity(self.bodies.len());
        for (reference, body) in &self.bodies {
            let offset = sink.stream_position()?;
            self.serializer.write_object_record(sink, *reference, body)?;
            offsets.push((*reference, offset));
        }
        offsets.sort_by_key(|(reference, _)| reference.number);

        self.serializer
            .write_xref_and_trailer(sink, &offsets, catalog, info)?;

        let end = sink.stream_position()?;
        let expected = (end - start) as usize;

        sink.seek(SeekFrom::Start(start))?;
        let mut read_back = vec![0u8; expected];
        let mut total_read = 0;
        loop {
            let n = sink.read(&mut read_back[total_read..])?;
            if n == 0 {
                break;
            }
            total_read += n;
            if total_read == expected {
                break;
            }
        }
        sink.seek(SeekFrom::Start(end))?;
        if total_read < expected {
            return Err(MergeError::SourceShortRead);
        }

        Ok(())
    }

    /// Number of distinct bodies stored so far (post-dedup).
    pub fn object_count(&self) -> usize {
        self.bodies.len()
    }
}

impl Default for DedupWriter {
    fn default() -> Self {
        Self::new()
    }
}
