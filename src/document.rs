//! The document: owner of one node graph.
//!
//! A [`Document`] is the only owning object of the layer. Handles into its
//! tree are plain references that are re-validated on use; dropping the
//! document frees its orphans and then every node of its graph, which
//! destroys every wrapper and leaves outstanding handles dangling.
//!
//! ```
//! use oxdom::Document;
//!
//! let mut doc = Document::parse_str("<root><a/></root>")?;
//! let root = doc.root_mut()?;
//! root.children().push_back_element("b")?;
//! assert_eq!(doc.to_xml_string()?, "<?xml version=\"1.0\"?>\n<root><a/><b/></root>\n");
//! # Ok::<(), oxdom::Error>(())
//! ```

use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;

use tracing::debug;

use crate::children::{self, ChildList};
use crate::encoding;
use crate::engine::{Engine, NodeId};
use crate::error::{Error, Result};
use crate::handle::{Access, Comment, Element, Handle, Mutable, NodeType, ReadOnly, Text};
use crate::namespace;
use crate::orphans;
use crate::parser::{self, ParseOptions};
use crate::registry::Registry;
use crate::runtime::{self, Runtime};
use crate::serial::{self, SerializeOptions};
use crate::util::qname::{check_nc_name, check_qname, check_uri, split_qname};

/// Identifies a document without owning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId {
    node: NodeId,
    generation: u64,
}

impl DocumentId {
    pub(crate) fn new(node: NodeId, generation: u64) -> Self {
        Self { node, generation }
    }

    /// Resolves to the document node if it still exists.
    pub(crate) fn node_id(self, rt: &Runtime) -> Result<NodeId> {
        rt.check_generation(self.generation)?;
        if rt.engine.is_live(self.node) {
            Ok(self.node)
        } else {
            Err(Error::DanglingHandle)
        }
    }
}

/// An XML document.
#[derive(Debug)]
pub struct Document {
    node: NodeId,
    generation: u64,
    marker: PhantomData<*const ()>,
}

impl Document {
    fn wrap(rt: &Runtime, node: NodeId) -> Self {
        Self {
            node,
            generation: rt.generation(),
            marker: PhantomData,
        }
    }

    /// Creates an empty document (no root element) with version `1.0`.
    ///
    /// # Errors
    ///
    /// Fails only if the runtime is unusable on this thread.
    pub fn new() -> Result<Self> {
        runtime::with(|rt| {
            let node = rt.engine.new_document("1.0")?;
            debug!(doc = node.into_raw(), "created document");
            Ok(Self::wrap(rt, node))
        })
    }

    /// Parses a document from a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the input is not well-formed.
    pub fn parse_str(text: &str) -> Result<Self> {
        Self::parse_str_with_options(text, &ParseOptions::default())
    }

    /// Parses a document from a string with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the input is not well-formed or breaks a
    /// limit set in `options`.
    pub fn parse_str_with_options(text: &str, options: &ParseOptions) -> Result<Self> {
        runtime::with(|rt| {
            let node = parser::parse_into(&mut rt.engine, text, options)?;
            Ok(Self::wrap(rt, node))
        })
    }

    /// Parses a document from raw bytes, detecting the encoding from a
    /// byte order mark or the XML declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the bytes cannot be decoded, or
    /// [`Error::Parse`] if the text is not well-formed.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        let text = encoding::decode_to_utf8(bytes)?;
        Self::parse_str(&text)
    }

    /// Reads and parses a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as for
    /// [`parse_bytes`](Self::parse_bytes).
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse_bytes(&bytes)
    }

    /// Reads a reader to its end and parses the bytes.
    ///
    /// # Errors
    ///
    /// As for [`parse_file`](Self::parse_file).
    pub fn parse_reader(mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::parse_bytes(&bytes)
    }

    /// Returns the identity of this document.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        DocumentId::new(self.node, self.generation)
    }

    fn node_id(&self, rt: &Runtime) -> Result<NodeId> {
        self.id().node_id(rt)
    }

    /// Returns the XML version.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn version(&self) -> Result<String> {
        runtime::with(|rt| {
            let node = self.node_id(rt)?;
            Ok(rt
                .engine
                .doc_info(node)
                .map_or_else(|| "1.0".to_string(), |i| i.version.clone()))
        })
    }

    /// Returns the declared encoding.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn encoding(&self) -> Result<Option<String>> {
        runtime::with(|rt| {
            let node = self.node_id(rt)?;
            Ok(rt.engine.doc_info(node).and_then(|i| i.encoding.clone()))
        })
    }

    /// Sets (or with `None` removes) the declared encoding. It is written in
    /// the declaration and used by [`save_to_file`](Self::save_to_file).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] for a label no encoder knows.
    pub fn set_encoding(&mut self, label: Option<&str>) -> Result<()> {
        if let Some(label) = label {
            encoding::encode_from_utf8("", label)?;
        }
        runtime::with(|rt| {
            let node = self.node_id(rt)?;
            if let Some(info) = rt.engine.doc_info_mut(node) {
                info.encoding = label.map(str::to_string);
            }
            Ok(())
        })
    }

    /// Returns the standalone flag of the declaration.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn standalone(&self) -> Result<Option<bool>> {
        runtime::with(|rt| {
            let node = self.node_id(rt)?;
            Ok(rt.engine.doc_info(node).and_then(|i| i.standalone))
        })
    }

    /// Returns the root element, or an empty handle if there is none.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn root(&self) -> Result<Handle<Element, ReadOnly>> {
        runtime::with(|rt| {
            let node = self.node_id(rt)?;
            Handle::from_node(rt, rt.engine.root_element(node))
        })
    }

    /// Returns the root element for modification, or an empty handle.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn root_mut(&mut self) -> Result<Handle<Element>> {
        self.root().map(Handle::const_cast)
    }

    /// Replaces the root element with a new, empty element `name`. The old
    /// root and its subtree are freed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if `name` is not an NCName.
    pub fn reset_root(&mut self, name: &str) -> Result<Handle<Element>> {
        check_nc_name(name)?;
        self.reset_root_ns(name, "")
    }

    /// Replaces the root element with a new element `qname` in namespace
    /// `uri`, declaring the binding (prefixed or default) on the new root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for a malformed name or URI, or
    /// for a prefix without a URI.
    pub fn reset_root_ns(&mut self, qname: &str, uri: &str) -> Result<Handle<Element>> {
        check_qname(qname)?;
        if !uri.is_empty() {
            check_uri(uri)?;
        }
        let (prefix, local) = split_qname(qname);
        if let (Some(p), true) = (prefix, uri.is_empty()) {
            return Err(Error::invalid(format!("undeclared namespace prefix {p:?}")));
        }
        if prefix == Some("xmlns") {
            return Err(Error::invalid("the xmlns prefix cannot name an element"));
        }
        runtime::with(|rt| {
            let doc = self.node_id(rt)?;
            let elem = rt.engine.new_element(doc, local)?;
            // Bind while still unlinked so a failure leaves the old root in place.
            let placed = bind_new_root(&mut rt.engine, elem, prefix, uri)
                .and_then(|()| Ok(rt.engine.set_root_element(doc, elem)?));
            let old = match placed {
                Ok(old) => old,
                Err(e) => {
                    rt.engine.free_node(elem);
                    return Err(e);
                }
            };
            if let Some(old) = old {
                rt.engine.free_node(old);
            }
            debug!(doc = doc.into_raw(), root = qname, "reset root element");
            Handle::from_node(rt, Some(elem))
        })
    }

    /// Replaces the root element with a deep copy of `src`, which may come
    /// from any document (including this one's current tree).
    ///
    /// # Errors
    ///
    /// Fails if `src` is empty or dangling.
    pub fn reset_root_clone<B: Access>(
        &mut self,
        src: Handle<Element, B>,
    ) -> Result<Handle<Element>> {
        runtime::with(|rt| {
            let doc = self.node_id(rt)?;
            let src = src.node_id(rt)?;
            let copy = rt.engine.copy_node(src, doc)?;
            let old = rt.engine.set_root_element(doc, copy)?;
            namespace::reconcile(&mut rt.engine, copy)?;
            if let Some(old) = old {
                rt.engine.free_node(old);
            }
            Handle::from_node(rt, Some(copy))
        })
    }

    /// Makes `elem` the root element, moving it from wherever it is. The
    /// old root is freed unless `elem` is the old root itself.
    ///
    /// # Errors
    ///
    /// Fails if `elem` is empty or dangling.
    pub fn reset_root_adopt(&mut self, elem: Handle<Element>) -> Result<Handle<Element>> {
        runtime::with(|rt| {
            let doc = self.node_id(rt)?;
            let id = elem.node_id(rt)?;
            let from = rt.engine.doc_of(id);
            let old = rt.engine.set_root_element(doc, id)?;
            if let Some(from) = from {
                rt.engine.observer_mut().orphans.forget_node(from, id);
            }
            namespace::reconcile(&mut rt.engine, id)?;
            if let Some(old) = old {
                rt.engine.free_node(old);
            }
            Ok(elem)
        })
    }

    /// Returns the top-level children: the root element plus any comments
    /// and instructions around it.
    #[must_use]
    pub fn children(&self) -> ChildList<ReadOnly> {
        ChildList::of_document(self.node, self.generation)
    }

    /// Returns the top-level children for modification.
    #[must_use]
    pub fn children_mut(&mut self) -> ChildList<Mutable> {
        ChildList::of_document(self.node, self.generation)
    }

    /// Returns the number of top-level children.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn len(&self) -> Result<usize> {
        self.children().len()
    }

    /// Returns `true` if the document has no top-level children.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn is_empty(&self) -> Result<bool> {
        self.children().is_empty()
    }

    /// Frees the whole tree and every unlinked node made through
    /// [`make_element`](Self::make_element) and friends.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn clear(&mut self) -> Result<()> {
        runtime::with(|rt| {
            let doc = self.node_id(rt)?;
            let list = rt.engine.observer_mut().orphans.take(doc);
            for id in list.nodes {
                if rt.engine.is_live(id)
                    && rt.engine.parent(id).is_none()
                    && rt.engine.doc_of(id) == Some(doc)
                {
                    rt.engine.free_node(id);
                }
            }
            for ns in list.namespaces {
                rt.engine.observer_mut().orphans.add_ns(doc, ns);
            }
            let top: Vec<NodeId> = rt.engine.children(doc).collect();
            for child in top {
                rt.engine.free_node(child);
            }
            Ok(())
        })
    }

    /// Serializes the document with default options.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn to_xml_string(&self) -> Result<String> {
        self.to_xml_string_with(&SerializeOptions::default())
    }

    /// Serializes the document.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn to_xml_string_with(&self, options: &SerializeOptions) -> Result<String> {
        runtime::with(|rt| {
            let doc = self.node_id(rt)?;
            Ok(serial::document_to_string(&rt.engine, doc, options))
        })
    }

    /// Writes the document to `path`, encoded in its declared encoding
    /// (UTF-8 if none is declared).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the text cannot be encoded and
    /// [`Error::Io`] if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = self.to_xml_string()?;
        let bytes = match self.encoding()? {
            Some(label) => encoding::encode_from_utf8(&text, &label)?,
            None => text.into_bytes(),
        };
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Deep-copies the document. The copy has its own wrappers; no handle
    /// into this document refers to it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn try_clone(&self) -> Result<Self> {
        runtime::with(|rt| {
            let doc = self.node_id(rt)?;
            let copy = rt.engine.copy_document(doc)?;
            debug!(src = doc.into_raw(), copy = copy.into_raw(), "cloned document");
            Ok(Self::wrap(rt, copy))
        })
    }

    fn make(&mut self, create: impl FnOnce(&mut Runtime, NodeId) -> Result<NodeId>) -> Result<NodeId> {
        runtime::with(|rt| {
            let doc = self.node_id(rt)?;
            let id = create(rt, doc)?;
            rt.engine.observer_mut().orphans.add_node(doc, id);
            Ok(id)
        })
    }

    fn handle<T: NodeType>(id: NodeId) -> Result<Handle<T>> {
        runtime::with(|rt| Handle::from_node(rt, Some(id)))
    }

    /// Creates an unlinked element owned by this document. It is freed with
    /// the document unless it is inserted somewhere first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if `name` is not an NCName.
    pub fn make_element(&mut self, name: &str) -> Result<Handle<Element>> {
        check_nc_name(name)?;
        let id = self.make(|rt, doc| Ok(rt.engine.new_element(doc, name)?))?;
        Self::handle(id)
    }

    /// Creates an unlinked text node owned by this document.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn make_text(&mut self, value: &str) -> Result<Handle<Text>> {
        let id = self.make(|rt, doc| Ok(rt.engine.new_text(doc, value)?))?;
        Self::handle(id)
    }

    /// Creates an unlinked CDATA section owned by this document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if `value` contains `]]>`.
    pub fn make_cdata(&mut self, value: &str) -> Result<Handle<Text>> {
        children::check_cdata(value)?;
        let id = self.make(|rt, doc| Ok(rt.engine.new_cdata(doc, value)?))?;
        Self::handle(id)
    }

    /// Creates an unlinked comment owned by this document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for content that cannot appear in
    /// a comment.
    pub fn make_comment(&mut self, value: &str) -> Result<Handle<Comment>> {
        children::check_comment(value)?;
        let id = self.make(|rt, doc| Ok(rt.engine.new_comment(doc, value)?))?;
        Self::handle(id)
    }

    /// Returns the number of objects the document keeps outside its tree:
    /// unlinked nodes made through it and namespace declarations that
    /// outlived their element.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn orphan_count(&self) -> Result<usize> {
        runtime::with(|rt| {
            let doc = self.node_id(rt)?;
            Ok(rt.engine.observer().orphans.count(doc))
        })
    }

    /// Returns a fresh prefix of the form `nsN`, unique within this
    /// document's counter.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown.
    pub fn next_namespace_prefix(&mut self) -> Result<String> {
        runtime::with(|rt| {
            let doc = self.node_id(rt)?;
            Ok(namespace::next_prefix(&mut rt.engine, doc, None))
        })
    }
}

/// Declares the namespace of a new, still unlinked root element.
fn bind_new_root(
    engine: &mut Engine<Registry>,
    elem: NodeId,
    prefix: Option<&str>,
    uri: &str,
) -> Result<()> {
    if !uri.is_empty() {
        let (ns, _) = namespace::declare(engine, elem, prefix.unwrap_or(""), uri)?;
        engine.set_ns(elem, Some(ns));
    }
    Ok(())
}

impl Drop for Document {
    fn drop(&mut self) {
        let node = self.node;
        runtime::with_generation(self.generation, |rt| {
            if rt.engine.is_live(node) {
                orphans::release_document(&mut rt.engine, node);
                debug!(doc = node.into_raw(), "dropped document");
            }
        });
    }
}
