//! Arena-based XML tree engine.
//!
//! This is the low-level node store the object layer is built on. Every node
//! of every document on the current thread lives in one arena owned by an
//! [`Engine`], and is referenced by `NodeId`, a slot index plus generation.
//! Namespace declarations live in a second arena addressed by [`NsId`].
//!
//! The engine knows nothing about wrappers or handles. It exposes raw
//! structural primitives (create, link, unlink, copy, free) and reports node
//! construction and destruction to a [`NodeObserver`], which may attach one
//! opaque [`UserData`] value to each node or namespace.
//!
//! # Architecture
//!
//! Navigation links (parent, first\_child, last\_child, next, prev) are arena
//! indices. Freed slots go on a free list and are handed out again with a
//! bumped generation, so a stale id can always be told apart from a live one
//! with [`Engine::is_live`]. A slot whose generation would wrap is retired.
//!
//! Attributes are nodes too. They hang off their element through the
//! `properties` chain and use `next`/`prev` among themselves, with `parent`
//! pointing back at the element.

mod copy;
mod ns;
mod text;

use std::num::{NonZeroU128, NonZeroU32};

pub use ns::XML_NAMESPACE;

/// Errors reported by engine primitives.
///
/// These never describe caller mistakes: the object layer validates its
/// input before calling into the engine, so an `EngineError` reaching the
/// public API means an internal invariant did not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The arena cannot address any more nodes or namespaces.
    #[error("engine arena exhausted")]
    Exhausted,
    /// A primitive was applied to a node of the wrong kind.
    #[error("{op}: unsupported on {kind:?} node")]
    Unsupported {
        /// The primitive that was called.
        op: &'static str,
        /// The kind of node it was called on.
        kind: RawKind,
    },
    /// A structural link would have created a cycle or a detached target.
    #[error("{0}")]
    BadLink(&'static str),
    /// Namespace reconciliation could not find a free prefix.
    #[error("no free prefix to redeclare namespace {0}")]
    PrefixExhausted(String),
}

/// A typed index into the engine's node arena.
///
/// Slots are reused once freed. The generation tells a node apart from
/// earlier occupants of the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: NonZeroU32,
    gen: u32,
}

impl NodeId {
    fn new(index: u32, gen: u32) -> Option<Self> {
        NonZeroU32::new(index).map(|index| Self { index, gen })
    }

    fn as_index(self) -> usize {
        self.index.get() as usize
    }

    /// Converts this `NodeId` to its raw slot number. The value is never
    /// zero, and a freed node shares it with the next occupant of the slot.
    #[must_use]
    pub fn into_raw(self) -> u32 {
        self.index.get()
    }
}

/// A typed index into the engine's namespace arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NsId {
    index: NonZeroU32,
    gen: u32,
}

impl NsId {
    fn new(index: u32, gen: u32) -> Option<Self> {
        NonZeroU32::new(index).map(|index| Self { index, gen })
    }

    fn as_index(self) -> usize {
        self.index.get() as usize
    }

    /// Converts this `NsId` to its raw slot number. The value is never zero.
    #[must_use]
    pub fn into_raw(self) -> u32 {
        self.index.get()
    }
}

/// The opaque per-node slot available to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct UserData(NonZeroU128);

impl UserData {
    /// Wraps a raw non-zero value.
    #[must_use]
    pub fn from_raw(raw: NonZeroU128) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub fn into_raw(self) -> NonZeroU128 {
        self.0
    }
}

/// The node type tag, corresponding to libxml2's `xmlElementType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKind {
    /// The document node.
    Document,
    /// An element.
    Element,
    /// An attribute, linked through its element's `properties` chain.
    Attribute,
    /// Character data.
    Text,
    /// A CDATA section.
    CData,
    /// A comment.
    Comment,
    /// A processing instruction.
    Instruction,
}

impl RawKind {
    /// Returns `true` for text and CDATA.
    #[must_use]
    pub fn is_text(self) -> bool {
        matches!(self, Self::Text | Self::CData)
    }
}

/// Document-level metadata, present only on `RawKind::Document` nodes.
#[derive(Debug, Clone)]
pub struct DocInfo {
    /// XML version from the declaration.
    pub version: String,
    /// Declared encoding, if any.
    pub encoding: Option<String>,
    /// Standalone flag, if declared.
    pub standalone: Option<bool>,
    /// The implicit `xml` prefix binding of this document.
    pub xml_ns: Option<NsId>,
    /// Counter behind generated namespace prefixes.
    pub prefix_counter: u32,
}

/// Storage for a single node in the arena.
#[derive(Debug, Clone)]
pub struct RawNode {
    /// The node type tag.
    pub kind: RawKind,
    /// Local name for elements and attributes, target for instructions.
    pub name: String,
    /// Character data, comment text, instruction data or attribute value.
    pub content: String,
    /// Owning document.
    pub doc: Option<NodeId>,
    /// Parent node. For attributes, the owning element.
    pub parent: Option<NodeId>,
    /// First child node.
    pub first_child: Option<NodeId>,
    /// Last child node (for O(1) append).
    pub last_child: Option<NodeId>,
    /// Next sibling.
    pub next: Option<NodeId>,
    /// Previous sibling.
    pub prev: Option<NodeId>,
    /// First attribute of an element.
    pub properties: Option<NodeId>,
    /// The namespace this node's name resolves under.
    pub ns: Option<NsId>,
    /// First namespace declared on this element.
    pub ns_def: Option<NsId>,
    /// Observer slot.
    pub user_data: Option<UserData>,
    /// Document metadata (document nodes only).
    pub doc_info: Option<Box<DocInfo>>,
    freed: bool,
}

impl RawNode {
    fn new(kind: RawKind, doc: Option<NodeId>, name: String, content: String) -> Self {
        Self {
            kind,
            name,
            content,
            doc,
            parent: None,
            first_child: None,
            last_child: None,
            next: None,
            prev: None,
            properties: None,
            ns: None,
            ns_def: None,
            user_data: None,
            doc_info: None,
            freed: false,
        }
    }

    fn tombstone() -> Self {
        let mut node = Self::new(RawKind::Text, None, String::new(), String::new());
        node.freed = true;
        node
    }
}

/// A namespace binding declared on an element.
#[derive(Debug, Clone)]
pub struct RawNs {
    /// The prefix, `None` for the default namespace.
    pub prefix: Option<String>,
    /// The namespace URI.
    pub href: String,
    /// Next declaration on the same element.
    pub next: Option<NsId>,
    /// The declaring element. `None` for the document's `xml` binding and
    /// for declarations that outlived their element.
    pub owner: Option<NodeId>,
    /// Owning document.
    pub doc: Option<NodeId>,
    /// Number of nodes whose `ns` points here.
    pub refs: u32,
    /// Observer slot.
    pub user_data: Option<UserData>,
    detached: bool,
    freed: bool,
}

/// Receives construction and destruction notifications from the engine.
///
/// The value returned from a `*_constructed` call is stored in the new
/// object's `user_data` slot and handed back on destruction.
pub trait NodeObserver {
    /// A node was allocated.
    fn node_constructed(&mut self, id: NodeId, kind: RawKind, doc: Option<NodeId>)
        -> Option<UserData>;
    /// A node was freed. The slot is already cleared.
    fn node_destructed(&mut self, id: NodeId, doc: Option<NodeId>, data: Option<UserData>);
    /// A namespace declaration was allocated.
    fn ns_constructed(&mut self, id: NsId, doc: Option<NodeId>) -> Option<UserData>;
    /// A namespace declaration was freed.
    fn ns_destructed(&mut self, id: NsId, doc: Option<NodeId>, data: Option<UserData>);
    /// A declaration lost its element while other nodes still referenced it.
    fn ns_orphaned(&mut self, id: NsId, doc: Option<NodeId>);
}

impl NodeObserver for () {
    fn node_constructed(&mut self, _: NodeId, _: RawKind, _: Option<NodeId>) -> Option<UserData> {
        None
    }
    fn node_destructed(&mut self, _: NodeId, _: Option<NodeId>, _: Option<UserData>) {}
    fn ns_constructed(&mut self, _: NsId, _: Option<NodeId>) -> Option<UserData> {
        None
    }
    fn ns_destructed(&mut self, _: NsId, _: Option<NodeId>, _: Option<UserData>) {}
    fn ns_orphaned(&mut self, _: NsId, _: Option<NodeId>) {}
}

/// The node store.
#[derive(Debug)]
pub struct Engine<H> {
    /// Index 0 is a tombstone placeholder (ids use `NonZeroU32`).
    nodes: Vec<RawNode>,
    node_gens: Vec<u32>,
    vacant_nodes: Vec<u32>,
    live: usize,
    namespaces: Vec<RawNs>,
    ns_gens: Vec<u32>,
    vacant_ns: Vec<u32>,
    observer: H,
}

impl<H: NodeObserver> Engine<H> {
    /// Creates an empty engine reporting to `observer`.
    pub fn new(observer: H) -> Self {
        let placeholder_ns = RawNs {
            prefix: None,
            href: String::new(),
            next: None,
            owner: None,
            doc: None,
            refs: 0,
            user_data: None,
            detached: false,
            freed: true,
        };
        Self {
            nodes: vec![RawNode::tombstone()],
            node_gens: vec![0],
            vacant_nodes: Vec::new(),
            live: 0,
            namespaces: vec![placeholder_ns],
            ns_gens: vec![0],
            vacant_ns: Vec::new(),
            observer,
        }
    }

    /// Returns the observer.
    pub fn observer(&self) -> &H {
        &self.observer
    }

    /// Returns the observer mutably.
    pub fn observer_mut(&mut self) -> &mut H {
        &mut self.observer
    }

    /// Returns the storage for a node.
    ///
    /// Ids are only minted by this engine and slots are never removed, so
    /// indexing cannot go out of bounds. Freed nodes read as tombstones.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &RawNode {
        let slot = id.as_index();
        if self.node_gens.get(slot) == Some(&id.gen) {
            &self.nodes[slot]
        } else {
            &self.nodes[0]
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut RawNode {
        debug_assert_eq!(self.node_gens.get(id.as_index()), Some(&id.gen));
        &mut self.nodes[id.as_index()]
    }

    /// Returns the storage for a namespace declaration. Freed declarations
    /// read as an empty, unbound placeholder.
    #[must_use]
    pub fn ns(&self, id: NsId) -> &RawNs {
        let slot = id.as_index();
        if self.ns_gens.get(slot) == Some(&id.gen) {
            &self.namespaces[slot]
        } else {
            &self.namespaces[0]
        }
    }

    fn ns_mut(&mut self, id: NsId) -> &mut RawNs {
        debug_assert_eq!(self.ns_gens.get(id.as_index()), Some(&id.gen));
        &mut self.namespaces[id.as_index()]
    }

    /// Returns `true` if `id` has not been freed.
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.node_gens.get(id.as_index()) == Some(&id.gen) && !self.nodes[id.as_index()].freed
    }

    /// Returns `true` if the namespace `id` has not been freed.
    #[must_use]
    pub fn is_ns_live(&self, id: NsId) -> bool {
        self.ns_gens.get(id.as_index()) == Some(&id.gen) && !self.namespaces[id.as_index()].freed
    }

    /// Returns `true` if the namespace lost its declaring element.
    #[must_use]
    pub fn is_ns_detached(&self, id: NsId) -> bool {
        self.ns(id).detached
    }

    /// Returns the number of live nodes of every document.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.live
    }

    /// Returns the number of node slots ever allocated, free ones included.
    #[must_use]
    pub fn node_capacity(&self) -> usize {
        self.nodes.len() - 1
    }

    // --- Allocation ---

    fn alloc(&mut self, mut node: RawNode) -> Result<NodeId, EngineError> {
        let id = match self.vacant_nodes.pop() {
            Some(slot) => NodeId::new(slot, self.node_gens[slot as usize]),
            None => u32::try_from(self.nodes.len())
                .ok()
                .and_then(|slot| NodeId::new(slot, 0)),
        }
        .ok_or(EngineError::Exhausted)?;
        if node.kind == RawKind::Document {
            node.doc = Some(id);
        }
        let (kind, doc) = (node.kind, node.doc);
        if id.as_index() == self.nodes.len() {
            self.nodes.push(node);
            self.node_gens.push(id.gen);
        } else {
            self.nodes[id.as_index()] = node;
        }
        self.live += 1;
        let data = self.observer.node_constructed(id, kind, doc);
        self.node_mut(id).user_data = data;
        Ok(id)
    }

    fn alloc_ns(&mut self, ns: RawNs) -> Result<NsId, EngineError> {
        let id = match self.vacant_ns.pop() {
            Some(slot) => NsId::new(slot, self.ns_gens[slot as usize]),
            None => u32::try_from(self.namespaces.len())
                .ok()
                .and_then(|slot| NsId::new(slot, 0)),
        }
        .ok_or(EngineError::Exhausted)?;
        let doc = ns.doc;
        if id.as_index() == self.namespaces.len() {
            self.namespaces.push(ns);
            self.ns_gens.push(id.gen);
        } else {
            self.namespaces[id.as_index()] = ns;
        }
        let data = self.observer.ns_constructed(id, doc);
        self.ns_mut(id).user_data = data;
        Ok(id)
    }

    /// Tombstones a node slot and makes it available again.
    fn release_node(&mut self, id: NodeId) {
        let slot = id.as_index();
        self.nodes[slot] = RawNode::tombstone();
        self.live = self.live.saturating_sub(1);
        if let Some(gen) = self.node_gens[slot].checked_add(1) {
            self.node_gens[slot] = gen;
            self.vacant_nodes.push(id.into_raw());
        }
    }

    fn release_ns(&mut self, id: NsId) {
        let slot = id.as_index();
        if let Some(gen) = self.ns_gens[slot].checked_add(1) {
            self.ns_gens[slot] = gen;
            self.vacant_ns.push(id.into_raw());
        }
    }

    /// Creates a new document node with the given XML version.
    pub fn new_document(&mut self, version: &str) -> Result<NodeId, EngineError> {
        let mut node = RawNode::new(RawKind::Document, None, String::new(), String::new());
        node.doc_info = Some(Box::new(DocInfo {
            version: version.to_string(),
            encoding: None,
            standalone: None,
            xml_ns: None,
            prefix_counter: 0,
        }));
        let doc = self.alloc(node)?;
        let xml_ns = self.alloc_ns(RawNs {
            prefix: Some("xml".to_string()),
            href: XML_NAMESPACE.to_string(),
            next: None,
            owner: None,
            doc: Some(doc),
            refs: 0,
            user_data: None,
            detached: false,
            freed: false,
        })?;
        if let Some(info) = self.node_mut(doc).doc_info.as_mut() {
            info.xml_ns = Some(xml_ns);
        }
        Ok(doc)
    }

    /// Creates an unlinked element in `doc`.
    pub fn new_element(&mut self, doc: NodeId, name: &str) -> Result<NodeId, EngineError> {
        self.alloc(RawNode::new(RawKind::Element, Some(doc), name.to_string(), String::new()))
    }

    /// Creates an unlinked text node in `doc`.
    pub fn new_text(&mut self, doc: NodeId, content: &str) -> Result<NodeId, EngineError> {
        self.alloc(RawNode::new(RawKind::Text, Some(doc), String::new(), content.to_string()))
    }

    /// Creates an unlinked CDATA section in `doc`.
    pub fn new_cdata(&mut self, doc: NodeId, content: &str) -> Result<NodeId, EngineError> {
        self.alloc(RawNode::new(RawKind::CData, Some(doc), String::new(), content.to_string()))
    }

    /// Creates an unlinked comment in `doc`.
    pub fn new_comment(&mut self, doc: NodeId, content: &str) -> Result<NodeId, EngineError> {
        self.alloc(RawNode::new(RawKind::Comment, Some(doc), String::new(), content.to_string()))
    }

    /// Creates an unlinked processing instruction in `doc`.
    pub fn new_pi(&mut self, doc: NodeId, target: &str, data: &str) -> Result<NodeId, EngineError> {
        self.alloc(RawNode::new(
            RawKind::Instruction,
            Some(doc),
            target.to_string(),
            data.to_string(),
        ))
    }

    /// Creates an attribute and appends it to `elem`'s attribute chain.
    pub fn new_attribute(
        &mut self,
        elem: NodeId,
        ns: Option<NsId>,
        name: &str,
        value: &str,
    ) -> Result<NodeId, EngineError> {
        if self.node(elem).kind != RawKind::Element {
            return Err(EngineError::Unsupported {
                op: "new_attribute",
                kind: self.node(elem).kind,
            });
        }
        let doc = self.node(elem).doc;
        let attr = self.alloc(RawNode::new(
            RawKind::Attribute,
            doc,
            name.to_string(),
            value.to_string(),
        ))?;
        self.link_property(elem, attr);
        self.set_ns(attr, ns);
        Ok(attr)
    }

    // --- Navigation ---

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Returns the first child of a node.
    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    /// Returns the last child of a node.
    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    /// Returns the next sibling of a node (or the next attribute).
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    /// Returns the previous sibling of a node (or the previous attribute).
    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    /// Returns the kind of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> RawKind {
        self.node(id).kind
    }

    /// Returns the document a node belongs to.
    #[must_use]
    pub fn doc_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).doc
    }

    /// Returns the metadata of a document node.
    #[must_use]
    pub fn doc_info(&self, doc: NodeId) -> Option<&DocInfo> {
        self.node(doc).doc_info.as_deref()
    }

    /// Returns the metadata of a document node mutably.
    pub fn doc_info_mut(&mut self, doc: NodeId) -> Option<&mut DocInfo> {
        self.node_mut(doc).doc_info.as_deref_mut()
    }

    /// Returns the first element child of a document.
    #[must_use]
    pub fn root_element(&self, doc: NodeId) -> Option<NodeId> {
        self.children(doc)
            .find(|&id| self.kind(id) == RawKind::Element)
    }

    /// Returns an iterator over the children of a node.
    pub fn children(&self, id: NodeId) -> Siblings<'_, H> {
        Siblings {
            engine: self,
            next: self.node(id).first_child,
        }
    }

    /// Returns an iterator over the attributes of an element.
    pub fn properties(&self, id: NodeId) -> Siblings<'_, H> {
        Siblings {
            engine: self,
            next: self.node(id).properties,
        }
    }

    /// Returns an iterator over a node and its ancestors.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_, H> {
        Ancestors {
            engine: self,
            next: Some(id),
        }
    }

    /// Returns an iterator over all descendants of a node (depth-first).
    pub fn descendants(&self, id: NodeId) -> Descendants<'_, H> {
        Descendants {
            engine: self,
            root: id,
            next: self.first_child(id),
        }
    }

    /// Returns `true` if `ancestor` is `id` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    // --- Linking ---

    fn link_last(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(child).parent = Some(parent);
        if let Some(last) = self.node(parent).last_child {
            self.node_mut(last).next = Some(child);
            self.node_mut(child).prev = Some(last);
            self.node_mut(parent).last_child = Some(child);
        } else {
            self.node_mut(parent).first_child = Some(child);
            self.node_mut(parent).last_child = Some(child);
        }
    }

    fn link_before(&mut self, reference: NodeId, parent: NodeId, new_child: NodeId) {
        self.node_mut(new_child).parent = Some(parent);
        if let Some(prev) = self.node(reference).prev {
            self.node_mut(prev).next = Some(new_child);
            self.node_mut(new_child).prev = Some(prev);
        } else {
            self.node_mut(parent).first_child = Some(new_child);
        }
        self.node_mut(new_child).next = Some(reference);
        self.node_mut(reference).prev = Some(new_child);
    }

    fn link_property(&mut self, elem: NodeId, attr: NodeId) {
        self.node_mut(attr).parent = Some(elem);
        match self.properties(elem).last() {
            Some(last) => {
                self.node_mut(last).next = Some(attr);
                self.node_mut(attr).prev = Some(last);
            }
            None => self.node_mut(elem).properties = Some(attr),
        }
    }

    /// Detaches a node from its parent (or an attribute from its element)
    /// without freeing it.
    pub fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        let prev = self.node(id).prev;
        let next = self.node(id).next;
        let is_attr = self.node(id).kind == RawKind::Attribute;

        match prev {
            Some(p) => self.node_mut(p).next = next,
            None if is_attr => self.node_mut(parent).properties = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None if is_attr => {}
            None => self.node_mut(parent).last_child = prev,
        }

        let node = self.node_mut(id);
        node.parent = None;
        node.prev = None;
        node.next = None;
    }

    fn check_link(&self, parent: NodeId, cur: NodeId) -> Result<(), EngineError> {
        if self.is_ancestor_or_self(cur, parent) {
            return Err(EngineError::BadLink("cannot link a node under itself"));
        }
        if self.node(cur).kind == RawKind::Document {
            return Err(EngineError::BadLink("cannot link a document node"));
        }
        Ok(())
    }

    fn adopt_into(&mut self, cur: NodeId, parent: NodeId) {
        self.unlink(cur);
        let target_doc = self.node(parent).doc;
        if self.node(cur).doc != target_doc {
            if let Some(doc) = target_doc {
                self.set_tree_doc(cur, doc);
            }
        }
    }

    /// Appends `cur` to `parent`'s children, unlinking it first.
    ///
    /// Text is coalesced the libxml2 way: if `cur` is text or CDATA and the
    /// current last child is of the same kind, `cur`'s content is appended to
    /// that node and `cur` is freed. Returns the node that now holds the
    /// content. Attributes are appended to the attribute chain instead.
    pub fn add_child(&mut self, parent: NodeId, cur: NodeId) -> Result<NodeId, EngineError> {
        self.check_link(parent, cur)?;
        self.adopt_into(cur, parent);

        if self.node(cur).kind == RawKind::Attribute {
            self.link_property(parent, cur);
            return Ok(cur);
        }

        let kind = self.node(cur).kind;
        if kind.is_text() {
            if let Some(last) = self.node(parent).last_child {
                if self.node(last).kind == kind {
                    let content = std::mem::take(&mut self.node_mut(cur).content);
                    self.node_mut(last).content.push_str(&content);
                    self.free_node(cur);
                    return Ok(last);
                }
            }
        }

        self.link_last(parent, cur);
        Ok(cur)
    }

    /// Inserts `cur` immediately before `next`, unlinking it first.
    ///
    /// Coalesces text with `next` (prepending) or with `next`'s previous
    /// sibling (appending) when they are of the same kind as `cur`.
    pub fn add_prev_sibling(&mut self, next: NodeId, cur: NodeId) -> Result<NodeId, EngineError> {
        let parent = self
            .node(next)
            .parent
            .ok_or(EngineError::BadLink("reference node has no parent"))?;
        if cur == next {
            return Err(EngineError::BadLink("cannot insert a node before itself"));
        }
        self.check_link(parent, cur)?;
        self.adopt_into(cur, parent);

        let kind = self.node(cur).kind;
        if kind.is_text() {
            if self.node(next).kind == kind {
                let content = std::mem::take(&mut self.node_mut(cur).content);
                self.node_mut(next).content.insert_str(0, &content);
                self.free_node(cur);
                return Ok(next);
            }
            if let Some(prev) = self.node(next).prev {
                if self.node(prev).kind == kind {
                    let content = std::mem::take(&mut self.node_mut(cur).content);
                    self.node_mut(prev).content.push_str(&content);
                    self.free_node(cur);
                    return Ok(prev);
                }
            }
        }

        self.link_before(next, parent, cur);
        Ok(cur)
    }

    /// Replaces the root element of `doc` with `elem`. Returns the previous
    /// root element, now unlinked, if there was one.
    pub fn set_root_element(
        &mut self,
        doc: NodeId,
        elem: NodeId,
    ) -> Result<Option<NodeId>, EngineError> {
        let old = self.root_element(doc);
        match old {
            Some(old) if old == elem => return Ok(None),
            Some(old) => {
                self.add_prev_sibling(old, elem)?;
                self.unlink(old);
            }
            None => {
                self.add_child(doc, elem)?;
            }
        }
        Ok(old)
    }

    fn set_tree_doc(&mut self, root: NodeId, doc: NodeId) {
        let old_xml = self
            .node(root)
            .doc
            .and_then(|d| self.doc_info(d))
            .and_then(|info| info.xml_ns);
        let new_xml = self.doc_info(doc).and_then(|info| info.xml_ns);

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            self.node_mut(id).doc = Some(doc);
            if old_xml.is_some() && self.node(id).ns == old_xml {
                self.set_ns(id, new_xml);
            }
            let defs: Vec<NsId> = self.ns_defs(id).collect();
            for ns in defs {
                self.ns_mut(ns).doc = Some(doc);
            }
            stack.extend(self.properties(id));
            stack.extend(self.children(id));
        }
    }

    // --- Freeing ---

    /// Unlinks and frees a node and its whole subtree, notifying the
    /// observer for every node and namespace released.
    pub fn free_node(&mut self, id: NodeId) {
        if !self.is_live(id) {
            return;
        }
        self.unlink(id);
        self.free_subtree(id);
    }

    /// Frees a document node and everything it owns.
    pub fn free_document(&mut self, doc: NodeId) {
        if !self.is_live(doc) || self.node(doc).kind != RawKind::Document {
            return;
        }
        self.free_subtree(doc);
    }

    fn free_subtree(&mut self, root: NodeId) {
        // Post-order: a node is released after its children and attributes,
        // so their namespace references are gone when its declarations go.
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                self.free_one(id);
                continue;
            }
            stack.push((id, true));
            let attrs: Vec<NodeId> = self.properties(id).collect();
            stack.extend(attrs.into_iter().rev().map(|a| (a, false)));
            let children: Vec<NodeId> = self.children(id).collect();
            stack.extend(children.into_iter().rev().map(|c| (c, false)));
        }
    }

    fn free_one(&mut self, id: NodeId) {
        self.set_ns(id, None);

        let doc = self.node(id).doc;
        let defs: Vec<NsId> = self.ns_defs(id).collect();
        for ns in defs {
            if self.ns(ns).refs == 0 {
                self.free_ns(ns);
            } else {
                let raw = self.ns_mut(ns);
                raw.owner = None;
                raw.next = None;
                raw.detached = true;
                self.observer.ns_orphaned(ns, doc);
            }
        }

        let xml_ns = self.doc_info(id).and_then(|info| info.xml_ns);
        if let Some(ns) = xml_ns {
            self.free_ns(ns);
        }

        let data = self.node_mut(id).user_data.take();
        self.release_node(id);
        self.observer.node_destructed(id, doc, data);
    }

    /// Frees a namespace declaration regardless of outstanding references.
    pub fn free_ns(&mut self, id: NsId) {
        if !self.is_ns_live(id) {
            return;
        }
        let raw = self.ns_mut(id);
        raw.freed = true;
        raw.href.clear();
        raw.prefix = None;
        raw.next = None;
        raw.owner = None;
        raw.refs = 0;
        let data = raw.user_data.take();
        let doc = raw.doc;
        self.release_ns(id);
        self.observer.ns_destructed(id, doc, data);
    }
}

// --- Iterators ---

/// Iterator over a sibling chain (children or attributes).
pub struct Siblings<'a, H> {
    engine: &'a Engine<H>,
    next: Option<NodeId>,
}

impl<H: NodeObserver> Iterator for Siblings<'_, H> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.engine.node(current).next;
        Some(current)
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a, H> {
    engine: &'a Engine<H>,
    next: Option<NodeId>,
}

impl<H: NodeObserver> Iterator for Ancestors<'_, H> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.engine.node(current).parent;
        Some(current)
    }
}

/// Depth-first iterator over all descendants of a node.
pub struct Descendants<'a, H> {
    engine: &'a Engine<H>,
    root: NodeId,
    next: Option<NodeId>,
}

impl<H: NodeObserver> Iterator for Descendants<'_, H> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;

        if let Some(child) = self.engine.first_child(current) {
            self.next = Some(child);
            return Some(current);
        }

        if let Some(sibling) = self.engine.next_sibling(current) {
            self.next = Some(sibling);
            return Some(current);
        }

        let mut ancestor = self.engine.parent(current);
        while let Some(anc) = ancestor {
            if anc == self.root {
                self.next = None;
                return Some(current);
            }
            if let Some(sibling) = self.engine.next_sibling(anc) {
                self.next = Some(sibling);
                return Some(current);
            }
            ancestor = self.engine.parent(anc);
        }

        self.next = None;
        Some(current)
    }
}
