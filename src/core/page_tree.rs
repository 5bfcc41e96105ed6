//! `PageTreeAssembler`: walks selected pages of each source catalog, copies
//! each page, groups pages under synthetic intermediate page-tree nodes
//! respecting a fan-out cap and resource-collision rule, then builds the
//! root pages node and catalog.

use std::io::{Read, Seek, Write};

use log::{debug, trace, warn};

use crate::core::graph::GraphCopier;
use crate::core::scanner::{Catalog, SourceScanner};
use crate::core::serializer::Version;
use crate::core::token::{Dictionary, Reference, Token};
use crate::core::writer::DedupWriter;
use crate::error::MergeError;

/// Maximum number of page leaves under one intermediate `/Pages` node.
const FAN_OUT_CAP: usize = 100;

pub struct PageTreeAssembler<'a> {
    writer: &'a mut DedupWriter,
    root_pages_ref: Reference,
    current_group: Vec<Token>,
    current_resources: Dictionary,
    current_parent_ref: Reference,
    group_refs: Vec<Reference>,
    page_count: u32,
    max_version: Version,
}

impl<'a> PageTreeAssembler<'a> {
    pub fn new(writer: &'a mut DedupWriter) -> Self {
        let root_pages_ref = writer.reserve_reference();
        let current_parent_ref = writer.reserve_reference();
        PageTreeAssembler {
            writer,
            root_pages_ref,
            current_group: Vec::new(),
            current_resources: Dictionary::new(),
            current_parent_ref,
            group_refs: Vec::new(),
            page_count: 0,
            max_version: Version::default(),
        }
    }

    /// Copy the selected pages (or all pages, if `pages` is `None`) of one
    /// source document into the working page tree.
    pub fn add_document<S: SourceScanner, C: Catalog>(
        &mut self,
        catalog: &C,
        scanner: &S,
        version: Version,
        pages: Option<&[u32]>,
    ) -> Result<(), MergeError> {
        if catalog.is_encrypted() {
            return Err(MergeError::EncryptedSourceRejected(catalog.label()));
        }
        if version > self.max_version {
            self.max_version = version;
        }

        let indices: Vec<u32> = match pages {
            Some(p) => p.to_vec(),
            None => (1..=catalog.page_count()).collect(),
        };
        debug!("merging {} page(s) from {:?}", indices.len(), catalog.label());

        let mut copier = GraphCopier::new(scanner);

        for index in indices {
            let node = catalog.page_node(index)?;
            let inherited = find_inherited_resources(scanner, node.parent)?;
            let incoming_resources = match inherited {
                Some(dict) => copy_resources(&mut copier, self.writer, &dict)?,
                None => Dictionary::new(),
            };

            if self.current_group.len() >= FAN_OUT_CAP
                || collides(&self.current_resources, &incoming_resources)
            {
                if !self.current_group.is_empty() {
                    if self.current_group.len() >= FAN_OUT_CAP {
                        trace!("closing page-tree group at fan-out cap {}", FAN_OUT_CAP);
                    } else {
                        warn!("resource-name collision forced a new page-tree group");
                    }
                    self.close_group()?;
                }
                self.current_parent_ref = self.writer.reserve_reference();
            }

            merge_into(&mut self.current_resources, incoming_resources);

            let page_ref = self.copy_page(&mut copier, &node)?;
            self.current_group.push(Token::reference(page_ref));
        }

        Ok(())
    }

    fn copy_page<S: SourceScanner>(
        &mut self,
        copier: &mut GraphCopier<S>,
        node: &crate::core::scanner::PageTreeNode,
    ) -> Result<Reference, MergeError> {
        let source_dict = node
            .dict
            .as_dictionary()
            .ok_or_else(|| MergeError::Scanner("page node is not a dictionary".to_string()))?;

        let mut copied = Dictionary::with_capacity(source_dict.len() + 1);
        let mut saw_parent = false;
        for (key, value) in source_dict {
            if key == "Parent" {
                saw_parent = true;
                copied.insert(key.clone(), Token::reference(self.current_parent_ref));
            } else {
                copied.insert(key.clone(), copier.copy(self.writer, value)?);
            }
        }
        if !saw_parent {
            copied.insert("Parent".to_string(), Token::reference(self.current_parent_ref));
        }

        Ok(self.writer.write_token(&Token::Dictionary(copied)))
    }

    fn close_group(&mut self) -> Result<(), MergeError> {
        let count = self.current_group.len();
        let kids = std::mem::take(&mut self.current_group);

        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Token::name("Pages"));
        dict.insert("Kids".to_string(), Token::Array(kids));
        dict.insert("Count".to_string(), Token::integer(count as i64));
        dict.insert("Parent".to_string(), Token::reference(self.root_pages_ref));
        if !self.current_resources.is_empty() {
            let resources = std::mem::take(&mut self.current_resources);
            dict.insert("Resources".to_string(), Token::Dictionary(resources));
        }

        let reference = self
            .writer
            .write_reserved(self.current_parent_ref.number, &Token::Dictionary(dict))?;
        self.group_refs.push(reference);
        self.page_count += count as u32;
        Ok(())
    }

    /// Close any outstanding group, build the root pages node and catalog,
    /// and flush the whole file to `sink`.
    pub fn finalize<W: Write + Seek + Read>(mut self, sink: &mut W) -> Result<(), MergeError> {
        if !self.current_group.is_empty() {
            self.close_group()?;
        }
        if self.group_refs.is_empty() {
            return Err(MergeError::EmptyDocument);
        }

        let kids: Vec<Token> = self.group_refs.iter().map(|r| Token::reference(*r)).collect();
        let root_pages = Token::dict([
            ("Type".to_string(), Token::name("Pages")),
            ("Kids".to_string(), Token::Array(kids)),
            ("Count".to_string(), Token::integer(self.page_count as i64)),
        ]);
        self.writer
            .write_reserved(self.root_pages_ref.number, &root_pages)?;

        let catalog_dict = Token::dict([
            ("Type".to_string(), Token::name("Catalog")),
            ("Pages".to_string(), Token::reference(self.root_pages_ref)),
        ]);
        let catalog_ref = self.writer.write_token(&catalog_dict);

        self.writer.flush(sink, self.max_version, catalog_ref, None)
    }
}

fn copy_resources<S: SourceScanner>(
    copier: &mut GraphCopier<S>,
    writer: &mut DedupWriter,
    resources: &Dictionary,
) -> Result<Dictionary, MergeError> {
    let mut copied = Dictionary::with_capacity(resources.len());
    for (key, value) in resources {
        copied.insert(key.clone(), copier.copy(writer, value)?);
    }
    Ok(copied)
}

fn collides(current: &Dictionary, incoming: &Dictionary) -> bool {
    incoming.keys().any(|key| current.contains_key(key))
}

fn merge_into(current: &mut Dictionary, incoming: Dictionary) {
    for (key, value) in incoming {
        current.insert(key, value);
    }
}

/// Resolve `token` to a concrete dictionary, following a single indirect
/// reference if present.
fn as_concrete_dictionary<S: SourceScanner>(
    scanner: &S,
    token: &Token,
) -> Result<Option<Dictionary>, MergeError> {
    let resolved = match token {
        Token::IndirectReference(r) => scanner.resolve(*r)?,
        other => other.clone(),
    };
    Ok(resolved.as_dictionary().cloned())
}

/// Walk from `start_parent` towards the root, returning the first
/// `/Resources` dictionary encountered (standard PDF attribute
/// inheritance: nearest ancestor wins, values are not merged across
/// levels). `Rotate`/`CropBox`/`MediaBox` inheritance is intentionally not
/// resolved here; see the design notes.
fn find_inherited_resources<S: SourceScanner>(
    scanner: &S,
    start_parent: Option<Reference>,
) -> Result<Option<Dictionary>, MergeError> {
    let mut current = start_parent;
    while let Some(r) = current {
        let node_token = scanner.resolve(r)?;
        let node_dict = node_token
            .as_dictionary()
            .ok_or_else(|| MergeError::Scanner(format!("page-tree node {:?} is not a dictionary", r)))?;

        if let Some(resources_token) = node_dict.get("Resources") {
            if let Some(resources) = as_concrete_dictionary(scanner, resources_token)? {
                return Ok(Some(resources));
            }
        }

        current = node_dict.get("Parent").and_then(Token::as_reference);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::PageTreeNode;
    use std::collections::HashMap as StdHashMap;
    use std::io::Cursor;

    struct FakeDoc {
        objects: StdHashMap<Reference, Token>,
        pages: Vec<Reference>,
        encrypted: bool,
    }

    impl SourceScanner for FakeDoc {
        fn resolve(&self, reference: Reference) -> Result<Token, MergeError> {
            self.objects
                .get(&reference)
                .cloned()
                .ok_or_else(|| MergeError::Scanner(format!("no object {:?}", reference)))
        }
    }

    impl Catalog for FakeDoc {
        fn page_node(&self, one_based_index: u32) -> Result<PageTreeNode, MergeError> {
            let reference = self.pages[(one_based_index - 1) as usize];
            let dict = self.objects.get(&reference).cloned().unwrap();
            let parent = dict
                .as_dictionary()
                .and_then(|d| d.get("Parent"))
                .and_then(Token::as_reference);
            Ok(PageTreeNode { dict, parent, is_page: true })
        }

        fn page_count(&self) -> u32 {
            self.pages.len() as u32
        }

        fn is_encrypted(&self) -> bool {
            self.encrypted
        }
    }

    fn media_box_page(parent: Reference) -> Token {
        let mut d = Dictionary::new();
        d.insert("Type".to_string(), Token::name("Page"));
        d.insert("Parent".to_string(), Token::reference(parent));
        d.insert(
            "MediaBox".to_string(),
            Token::Array(vec![
                Token::integer(0),
                Token::integer(0),
                Token::integer(612),
                Token::integer(792),
            ]),
        );
        Token::Dictionary(d)
    }

    fn root_pages_node() -> Token {
        // No /Resources, no /Parent: terminates the inheritance walk.
        Token::Dictionary(Dictionary::from_iter([(
            "Type".to_string(),
            Token::name("Pages"),
        )]))
    }

    #[test]
    fn two_single_page_documents_with_identical_pages_dedup_to_four_objects() {
        let parent_marker = Reference::new(99, 0);
        let mut objects = StdHashMap::new();
        let page_a = Reference::new(1, 0);
        let page_b = Reference::new(1, 0); // same numbering space is fine: separate FakeDoc instances
        objects.insert(page_a, media_box_page(parent_marker));
        objects.insert(parent_marker, root_pages_node());
        let doc_a = FakeDoc { objects: objects.clone(), pages: vec![page_a], encrypted: false };
        let mut objects_b = StdHashMap::new();
        objects_b.insert(page_b, media_box_page(parent_marker));
        objects_b.insert(parent_marker, root_pages_node());
        let doc_b = FakeDoc { objects: objects_b, pages: vec![page_b], encrypted: false };

        let mut writer = DedupWriter::new();
        let mut sink = Cursor::new(Vec::new());
        {
            let mut assembler = PageTreeAssembler::new(&mut writer);
            assembler
                .add_document(&doc_a, &doc_a, Version(1, 4), None)
                .unwrap();
            assembler
                .add_document(&doc_b, &doc_b, Version(1, 4), None)
                .unwrap();
            assembler.finalize(&mut sink).unwrap();
        }

        // catalog + root pages + one intermediate group + one page body:
        // page_a and page_b serialize to byte-identical dictionaries (same
        // Parent reservation, same inline MediaBox), so the second write
        // dedups against the first instead of allocating a new body.
        assert_eq!(writer.object_count(), 4);
    }

    #[test]
    fn empty_input_fails_with_empty_document() {
        let mut writer = DedupWriter::new();
        let assembler = PageTreeAssembler::new(&mut writer);
        let mut sink = Cursor::new(Vec::new());
        let err = assembler.finalize(&mut sink).unwrap_err();
        assert!(matches!(err, MergeError::EmptyDocument));
    }

    #[test]
    fn encrypted_source_is_rejected() {
        let doc = FakeDoc { objects: StdHashMap::new(), pages: vec![], encrypted: true };
        let mut writer = DedupWriter::new();
        let mut assembler = PageTreeAssembler::new(&mut writer);
        let err = assembler
            .add_document(&doc, &doc, Version(1, 4), None)
            .unwrap_err();
        assert!(matches!(err, MergeError::EncryptedSourceRejected(_)));
    }

    #[test]
    fn resource_name_collision_forces_a_new_group() {
        // Page 1's parent carries /Resources << /Font << /F1 .. >> >>,
        // page 2's parent carries /Resources << /Font << /F2 .. >> >>.
        // Both define the name /Font, so they must not share a group.
        let mut objects = StdHashMap::new();

        let parent1 = Reference::new(10, 0);
        let parent2 = Reference::new(11, 0);
        let page1 = Reference::new(1, 0);
        let page2 = Reference::new(2, 0);

        let mut font1 = Dictionary::new();
        font1.insert("F1".to_string(), Token::name("Helvetica"));
        let mut res1 = Dictionary::new();
        res1.insert("Font".to_string(), Token::Dictionary(font1));
        let mut parent1_dict = Dictionary::new();
        parent1_dict.insert("Type".to_string(), Token::name("Pages"));
        parent1_dict.insert("Resources".to_string(), Token::Dictionary(res1));
        objects.insert(parent1, Token::Dictionary(parent1_dict));

        let mut font2 = Dictionary::new();
        font2.insert("F2".to_string(), Token::name("Times"));
        let mut res2 = Dictionary::new();
        res2.insert("Font".to_string(), Token::Dictionary(font2));
        let mut parent2_dict = Dictionary::new();
        parent2_dict.insert("Type".to_string(), Token::name("Pages"));
        parent2_dict.insert("Resources".to_string(), Token::Dictionary(res2));
        objects.insert(parent2, Token::Dictionary(parent2_dict));

        let mut p1 = Dictionary::new();
        p1.insert("Type".to_string(), Token::name("Page"));
        p1.insert("Parent".to_string(), Token::reference(parent1));
        objects.insert(page1, Token::Dictionary(p1));

        let mut p2 = Dictionary::new();
        p2.insert("Type".to_string(), Token::name("Page"));
        p2.insert("Parent".to_string(), Token::reference(parent2));
        objects.insert(page2, Token::Dictionary(p2));

        let doc = FakeDoc { objects, pages: vec![page1, page2], encrypted: false };

        let mut writer = DedupWriter::new();
        let mut sink = Cursor::new(Vec::new());
        {
            let mut assembler = PageTreeAssembler::new(&mut writer);
            assembler.add_document(&doc, &doc, Version(1, 4), None).unwrap();
            // Page 1's group was already closed by the collision; page 2
            // sits in a fresh, still-open group.
            assert_eq!(assembler.group_refs.len(), 1);
            assert_eq!(assembler.current_group.len(), 1);
            assembler.finalize(&mut sink).unwrap();
        }
    }
}
