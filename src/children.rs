//! The child list of an element or document.
//!
//! A [`ChildList`] is a view: it owns nothing and reads the owner's sibling
//! chain on every call. Positions are [`SiblingIter`]s; a position belongs to
//! a list when its node's parent is the list's owner, and every mutating
//! call that takes a position checks that first.
//!
//! Document-owned lists hold at most one element and never hold text.

use std::fmt;

use tracing::trace;

use crate::engine::{Engine, NodeId, RawKind};
use crate::error::{Error, Result};
use crate::handle::{
    Access, ChildNode, Comment, Element, Extends, Handle, Instruction, Mutable, NodeType, Text,
};
use crate::iter::SiblingIter;
use crate::namespace;
use crate::registry::Registry;
use crate::runtime::{self, Runtime};
use crate::transfer;
use crate::util::qname::{check_name, check_qname, check_uri, split_qname};

enum Owner<A: Access> {
    Element(Handle<Element, A>),
    Document { node: NodeId, generation: u64 },
}

impl<A: Access> Clone for Owner<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Access> Copy for Owner<A> {}

/// Where a new child goes.
enum At {
    Back,
    Front,
    Before(Handle<ChildNode>),
}

/// The ordered children of one element or document.
pub struct ChildList<A: Access = Mutable> {
    owner: Owner<A>,
}

impl<A: Access> Clone for ChildList<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Access> Copy for ChildList<A> {}

impl<A: Access> fmt::Debug for ChildList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner {
            Owner::Element(owner) => f.debug_tuple("ChildList").field(&owner).finish(),
            Owner::Document { node, .. } => f
                .debug_struct("ChildList")
                .field("document", &node.into_raw())
                .finish(),
        }
    }
}

fn document_of(engine: &Engine<Registry>, parent: NodeId) -> Result<NodeId> {
    engine
        .doc_of(parent)
        .ok_or_else(|| Error::InternalConsistency("child list owner without document".to_string()))
}

/// Rejects content a document cannot hold. `moving` is the node being
/// relinked, which may already be the root.
fn check_placement(
    engine: &Engine<Registry>,
    parent: NodeId,
    kind: RawKind,
    moving: Option<NodeId>,
) -> Result<()> {
    if engine.kind(parent) != RawKind::Document {
        return Ok(());
    }
    if kind.is_text() {
        return Err(Error::invalid("a document cannot hold text"));
    }
    if kind == RawKind::Element
        && engine
            .root_element(parent)
            .is_some_and(|root| Some(root) != moving)
    {
        return Err(Error::invalid("the document already has a root element"));
    }
    Ok(())
}

fn check_owned(engine: &Engine<Registry>, parent: NodeId, id: NodeId) -> Result<()> {
    if engine.parent(id) == Some(parent) {
        Ok(())
    } else {
        Err(Error::invalid("the position does not belong to this child list"))
    }
}

fn anchor(rt: &Runtime, parent: NodeId, at: At) -> Result<Option<NodeId>> {
    match at {
        At::Back => Ok(None),
        At::Front => Ok(rt.engine.first_child(parent)),
        At::Before(pos) if pos.is_null() => Ok(None),
        At::Before(pos) => {
            let id = pos.node_id(rt)?;
            check_owned(&rt.engine, parent, id)?;
            Ok(Some(id))
        }
    }
}

/// Binds a freshly created element to its namespace.
fn bind_element(engine: &mut Engine<Registry>, elem: NodeId, prefix: Option<&str>, uri: &str) -> Result<()> {
    match (prefix, uri.is_empty()) {
        (None, true) => {}
        (None, false) => namespace::set_uri(engine, elem, elem, uri)?,
        (Some(p), true) => {
            let ns = engine.search_ns(elem, Some(p));
            engine.set_ns(elem, ns);
        }
        (Some(p), false) => {
            let ns = match engine.search_ns(elem, Some(p)) {
                Some(ns) if engine.ns(ns).href == uri => ns,
                _ => namespace::declare(engine, elem, p, uri)?.0,
            };
            engine.set_ns(elem, Some(ns));
        }
    }
    Ok(())
}

impl<A: Access> ChildList<A> {
    pub(crate) fn of_element(owner: Handle<Element, A>) -> Self {
        Self {
            owner: Owner::Element(owner),
        }
    }

    pub(crate) fn of_document(node: NodeId, generation: u64) -> Self {
        Self {
            owner: Owner::Document { node, generation },
        }
    }

    fn owner_id(&self, rt: &Runtime) -> Result<NodeId> {
        match self.owner {
            Owner::Element(owner) => owner.node_id(rt),
            Owner::Document { node, generation } => {
                rt.check_generation(generation)?;
                if rt.engine.is_live(node) {
                    Ok(node)
                } else {
                    Err(Error::DanglingHandle)
                }
            }
        }
    }

    /// Returns the number of children.
    ///
    /// # Errors
    ///
    /// Fails if the owner is gone.
    pub fn len(&self) -> Result<usize> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            Ok(rt.engine.children(parent).count())
        })
    }

    /// Returns `true` if there are no children.
    ///
    /// # Errors
    ///
    /// Fails if the owner is gone.
    pub fn is_empty(&self) -> Result<bool> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            Ok(rt.engine.first_child(parent).is_none())
        })
    }

    /// Returns a position at the first child (the end if there is none).
    ///
    /// # Errors
    ///
    /// Fails if the owner is gone.
    pub fn begin(&self) -> Result<SiblingIter<ChildNode, A>> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            Handle::from_node(rt, rt.engine.first_child(parent)).map(SiblingIter::from)
        })
    }

    /// Returns the end position.
    #[must_use]
    pub fn end(&self) -> SiblingIter<ChildNode, A> {
        SiblingIter::end()
    }

    /// Same as [`begin`](Self::begin); reads better in `for` loops.
    ///
    /// # Errors
    ///
    /// Fails if the owner is gone.
    pub fn iter(&self) -> Result<SiblingIter<ChildNode, A>> {
        self.begin()
    }

    /// Returns the first child.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the list is empty.
    pub fn front(&self) -> Result<Handle<ChildNode, A>> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            let first = rt
                .engine
                .first_child(parent)
                .ok_or_else(|| Error::invalid("front() called on an empty child list"))?;
            Handle::from_node(rt, Some(first))
        })
    }

    /// Returns the last child.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the list is empty.
    pub fn back(&self) -> Result<Handle<ChildNode, A>> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            let last = rt
                .engine
                .last_child(parent)
                .ok_or_else(|| Error::invalid("back() called on an empty child list"))?;
            Handle::from_node(rt, Some(last))
        })
    }
}

impl ChildList<Mutable> {
    fn place_leaf<T: NodeType>(
        &self,
        at: At,
        kind: RawKind,
        create: impl FnOnce(&mut Engine<Registry>, NodeId) -> Result<NodeId>,
    ) -> Result<Handle<T>> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            check_placement(&rt.engine, parent, kind, None)?;
            let anchor = anchor(rt, parent, at)?;
            let doc = document_of(&rt.engine, parent)?;
            let node = create(&mut rt.engine, doc)?;
            let placed = match transfer::link(&mut rt.engine, parent, anchor, node) {
                Ok(placed) => placed,
                Err(e) => {
                    rt.engine.free_node(node);
                    return Err(e);
                }
            };
            Handle::from_node(rt, Some(placed))
        })
    }

    fn place_element(&self, at: At, qname: &str, uri: &str) -> Result<Handle<Element>> {
        check_qname(qname)?;
        if !uri.is_empty() {
            check_uri(uri)?;
        }
        let (prefix, local) = split_qname(qname);
        if prefix == Some("xmlns") {
            return Err(Error::invalid("the xmlns prefix cannot name an element"));
        }
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            check_placement(&rt.engine, parent, RawKind::Element, None)?;
            if let (Some(p), true) = (prefix, uri.is_empty()) {
                if rt.engine.search_ns(parent, Some(p)).is_none() {
                    return Err(Error::invalid(format!("undeclared namespace prefix {p:?}")));
                }
            }
            let anchor = anchor(rt, parent, at)?;
            let doc = document_of(&rt.engine, parent)?;
            let elem = rt.engine.new_element(doc, local)?;
            let bound = transfer::link(&mut rt.engine, parent, anchor, elem)
                .and_then(|_| bind_element(&mut rt.engine, elem, prefix, uri));
            if let Err(e) = bound {
                rt.engine.free_node(elem);
                return Err(e);
            }
            namespace::reconcile(&mut rt.engine, elem)?;
            Handle::from_node(rt, Some(elem))
        })
    }

    fn place_clone<T: Extends<ChildNode>, B: Access>(
        &self,
        at: At,
        node: Handle<T, B>,
    ) -> Result<Handle<ChildNode>> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            let src = node.node_id(rt)?;
            check_placement(&rt.engine, parent, rt.engine.kind(src), None)?;
            let anchor = anchor(rt, parent, at)?;
            let doc = document_of(&rt.engine, parent)?;
            let placed = transfer::clone_into(&mut rt.engine, src, doc, parent, anchor)?;
            if rt.engine.kind(placed) == RawKind::Element {
                namespace::reconcile(&mut rt.engine, placed)?;
            }
            Handle::from_node(rt, Some(placed))
        })
    }

    fn place_adopt<T: Extends<ChildNode>>(
        &self,
        at: At,
        node: Handle<T>,
    ) -> Result<Handle<ChildNode>> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            let id = node.node_id(rt)?;
            if rt.engine.is_ancestor_or_self(id, parent) {
                return Err(Error::invalid(
                    "cannot adopt a node into itself or one of its descendants",
                ));
            }
            check_placement(&rt.engine, parent, rt.engine.kind(id), Some(id))?;
            let anchor = anchor(rt, parent, at)?;
            if anchor == Some(id) {
                return Handle::from_node(rt, Some(id));
            }
            let placed = transfer::adopt(&mut rt.engine, parent, anchor, id)?;
            if rt.engine.kind(placed) == RawKind::Element {
                namespace::reconcile(&mut rt.engine, placed)?;
            }
            Handle::from_node(rt, Some(placed))
        })
    }

    /// Appends a new element named `qname`. A prefix in `qname` must be in
    /// scope at the owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for a malformed name, an
    /// undeclared prefix, or a second root element in a document.
    pub fn push_back_element(&self, qname: &str) -> Result<Handle<Element>> {
        self.place_element(At::Back, qname, "")
    }

    /// Appends a new element named `qname` in namespace `uri`.
    ///
    /// A prefixed `qname` binds that prefix to `uri`, declaring it on the
    /// new element unless an ancestor already does. An unprefixed one reuses
    /// any visible declaration of `uri` or declares a generated prefix.
    ///
    /// # Errors
    ///
    /// As for [`push_back_element`](Self::push_back_element), plus a
    /// malformed `uri`.
    pub fn push_back_element_ns(&self, qname: &str, uri: &str) -> Result<Handle<Element>> {
        self.place_element(At::Back, qname, uri)
    }

    /// Prepends a new element named `qname`.
    ///
    /// # Errors
    ///
    /// As for [`push_back_element`](Self::push_back_element).
    pub fn push_front_element(&self, qname: &str) -> Result<Handle<Element>> {
        self.place_element(At::Front, qname, "")
    }

    /// Prepends a new element named `qname` in namespace `uri`.
    ///
    /// # Errors
    ///
    /// As for [`push_back_element_ns`](Self::push_back_element_ns).
    pub fn push_front_element_ns(&self, qname: &str, uri: &str) -> Result<Handle<Element>> {
        self.place_element(At::Front, qname, uri)
    }

    /// Inserts a new element before `pos` (at the end for the end position).
    ///
    /// # Errors
    ///
    /// As for [`push_back_element`](Self::push_back_element), plus a
    /// position from another list.
    pub fn insert_element(&self, pos: SiblingIter<ChildNode>, qname: &str) -> Result<Handle<Element>> {
        self.place_element(At::Before(pos.get()), qname, "")
    }

    /// Inserts a new element in namespace `uri` before `pos`.
    ///
    /// # Errors
    ///
    /// As for [`insert_element`](Self::insert_element), plus a malformed
    /// `uri`.
    pub fn insert_element_ns(
        &self,
        pos: SiblingIter<ChildNode>,
        qname: &str,
        uri: &str,
    ) -> Result<Handle<Element>> {
        self.place_element(At::Before(pos.get()), qname, uri)
    }

    /// Appends a text node. Text merges into an adjacent text node, whose
    /// handle is returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] on a document-owned list.
    pub fn push_back_text(&self, value: &str) -> Result<Handle<Text>> {
        self.place_leaf(At::Back, RawKind::Text, |e, doc| Ok(e.new_text(doc, value)?))
    }

    /// Prepends a text node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] on a document-owned list.
    pub fn push_front_text(&self, value: &str) -> Result<Handle<Text>> {
        self.place_leaf(At::Front, RawKind::Text, |e, doc| Ok(e.new_text(doc, value)?))
    }

    /// Inserts a text node before `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] on a document-owned list or for a
    /// position from another list.
    pub fn insert_text(&self, pos: SiblingIter<ChildNode>, value: &str) -> Result<Handle<Text>> {
        self.place_leaf(At::Before(pos.get()), RawKind::Text, |e, doc| {
            Ok(e.new_text(doc, value)?)
        })
    }

    /// Appends a CDATA section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if `value` contains `]]>` or the
    /// list is document-owned.
    pub fn push_back_cdata(&self, value: &str) -> Result<Handle<Text>> {
        check_cdata(value)?;
        self.place_leaf(At::Back, RawKind::CData, |e, doc| Ok(e.new_cdata(doc, value)?))
    }

    /// Prepends a CDATA section.
    ///
    /// # Errors
    ///
    /// As for [`push_back_cdata`](Self::push_back_cdata).
    pub fn push_front_cdata(&self, value: &str) -> Result<Handle<Text>> {
        check_cdata(value)?;
        self.place_leaf(At::Front, RawKind::CData, |e, doc| Ok(e.new_cdata(doc, value)?))
    }

    /// Inserts a CDATA section before `pos`.
    ///
    /// # Errors
    ///
    /// As for [`push_back_cdata`](Self::push_back_cdata), plus a position
    /// from another list.
    pub fn insert_cdata(&self, pos: SiblingIter<ChildNode>, value: &str) -> Result<Handle<Text>> {
        check_cdata(value)?;
        self.place_leaf(At::Before(pos.get()), RawKind::CData, |e, doc| {
            Ok(e.new_cdata(doc, value)?)
        })
    }

    /// Appends a comment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if `value` contains `--` or ends
    /// with `-`.
    pub fn push_back_comment(&self, value: &str) -> Result<Handle<Comment>> {
        check_comment(value)?;
        self.place_leaf(At::Back, RawKind::Comment, |e, doc| {
            Ok(e.new_comment(doc, value)?)
        })
    }

    /// Prepends a comment.
    ///
    /// # Errors
    ///
    /// As for [`push_back_comment`](Self::push_back_comment).
    pub fn push_front_comment(&self, value: &str) -> Result<Handle<Comment>> {
        check_comment(value)?;
        self.place_leaf(At::Front, RawKind::Comment, |e, doc| {
            Ok(e.new_comment(doc, value)?)
        })
    }

    /// Inserts a comment before `pos`.
    ///
    /// # Errors
    ///
    /// As for [`push_back_comment`](Self::push_back_comment), plus a
    /// position from another list.
    pub fn insert_comment(&self, pos: SiblingIter<ChildNode>, value: &str) -> Result<Handle<Comment>> {
        check_comment(value)?;
        self.place_leaf(At::Before(pos.get()), RawKind::Comment, |e, doc| {
            Ok(e.new_comment(doc, value)?)
        })
    }

    /// Appends a processing instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if `target` is not a name or is
    /// `xml` in any case, or if `data` contains `?>`.
    pub fn push_back_instruction(&self, target: &str, data: &str) -> Result<Handle<Instruction>> {
        check_instruction(target, data)?;
        self.place_leaf(At::Back, RawKind::Instruction, |e, doc| {
            Ok(e.new_pi(doc, target, data)?)
        })
    }

    /// Prepends a processing instruction.
    ///
    /// # Errors
    ///
    /// As for [`push_back_instruction`](Self::push_back_instruction).
    pub fn push_front_instruction(&self, target: &str, data: &str) -> Result<Handle<Instruction>> {
        check_instruction(target, data)?;
        self.place_leaf(At::Front, RawKind::Instruction, |e, doc| {
            Ok(e.new_pi(doc, target, data)?)
        })
    }

    /// Inserts a processing instruction before `pos`.
    ///
    /// # Errors
    ///
    /// As for [`push_back_instruction`](Self::push_back_instruction), plus a
    /// position from another list.
    pub fn insert_instruction(
        &self,
        pos: SiblingIter<ChildNode>,
        target: &str,
        data: &str,
    ) -> Result<Handle<Instruction>> {
        check_instruction(target, data)?;
        self.place_leaf(At::Before(pos.get()), RawKind::Instruction, |e, doc| {
            Ok(e.new_pi(doc, target, data)?)
        })
    }

    /// Appends a deep copy of `node`, which may live in any document.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling `node`, or when the copy would break a
    /// document's single-root rule.
    pub fn push_back_clone<T: Extends<ChildNode>, B: Access>(
        &self,
        node: Handle<T, B>,
    ) -> Result<Handle<ChildNode>> {
        self.place_clone(At::Back, node)
    }

    /// Prepends a deep copy of `node`.
    ///
    /// # Errors
    ///
    /// As for [`push_back_clone`](Self::push_back_clone).
    pub fn push_front_clone<T: Extends<ChildNode>, B: Access>(
        &self,
        node: Handle<T, B>,
    ) -> Result<Handle<ChildNode>> {
        self.place_clone(At::Front, node)
    }

    /// Inserts a deep copy of `node` before `pos`.
    ///
    /// # Errors
    ///
    /// As for [`push_back_clone`](Self::push_back_clone), plus a position
    /// from another list.
    pub fn insert_clone<T: Extends<ChildNode>, B: Access>(
        &self,
        pos: SiblingIter<ChildNode>,
        node: Handle<T, B>,
    ) -> Result<Handle<ChildNode>> {
        self.place_clone(At::Before(pos.get()), node)
    }

    /// Moves `node` (from any document) to the end of this list. The handle
    /// stays valid and now refers to the moved node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when `node` is the owner or one
    /// of its ancestors.
    pub fn push_back_adopt<T: Extends<ChildNode>>(&self, node: Handle<T>) -> Result<Handle<ChildNode>> {
        self.place_adopt(At::Back, node)
    }

    /// Moves `node` to the front of this list.
    ///
    /// # Errors
    ///
    /// As for [`push_back_adopt`](Self::push_back_adopt).
    pub fn push_front_adopt<T: Extends<ChildNode>>(&self, node: Handle<T>) -> Result<Handle<ChildNode>> {
        self.place_adopt(At::Front, node)
    }

    /// Moves `node` to just before `pos`.
    ///
    /// # Errors
    ///
    /// As for [`push_back_adopt`](Self::push_back_adopt), plus a position
    /// from another list.
    pub fn insert_adopt<T: Extends<ChildNode>>(
        &self,
        pos: SiblingIter<ChildNode>,
        node: Handle<T>,
    ) -> Result<Handle<ChildNode>> {
        self.place_adopt(At::Before(pos.get()), node)
    }

    /// Frees the last child.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the list is empty.
    pub fn pop_back(&self) -> Result<()> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            let last = rt
                .engine
                .last_child(parent)
                .ok_or_else(|| Error::invalid("pop_back() called on an empty child list"))?;
            rt.engine.free_node(last);
            Ok(())
        })
    }

    /// Frees the first child.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the list is empty.
    pub fn pop_front(&self) -> Result<()> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            let first = rt
                .engine
                .first_child(parent)
                .ok_or_else(|| Error::invalid("pop_front() called on an empty child list"))?;
            rt.engine.free_node(first);
            Ok(())
        })
    }

    /// Frees the child at `pos` with its subtree and returns the position
    /// that followed it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for the end position or a
    /// position from another list.
    pub fn erase(&self, pos: SiblingIter<ChildNode>) -> Result<SiblingIter<ChildNode>> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            let next = erase_one(rt, parent, pos.get())?;
            Handle::from_node(rt, next).map(SiblingIter::from)
        })
    }

    /// Frees every child in `[first, last)` and returns `last`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if either position belongs to
    /// another list or `last` does not follow `first`. Nothing is freed in
    /// that case.
    pub fn erase_range(
        &self,
        first: SiblingIter<ChildNode>,
        last: SiblingIter<ChildNode>,
    ) -> Result<SiblingIter<ChildNode>> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            let start = match first.get() {
                h if h.is_null() => None,
                h => Some(h.node_id(rt)?),
            };
            let stop = match last.get() {
                h if h.is_null() => None,
                h => Some(h.node_id(rt)?),
            };
            for id in start.iter().chain(stop.iter()) {
                check_owned(&rt.engine, parent, *id)?;
            }

            let mut doomed = Vec::new();
            let mut cur = start;
            while cur != stop {
                let Some(id) = cur else {
                    return Err(Error::invalid("the range end does not follow its start"));
                };
                doomed.push(id);
                cur = rt.engine.next_sibling(id);
            }
            for id in &doomed {
                rt.engine.free_node(*id);
            }
            trace!(parent = parent.into_raw(), erased = doomed.len(), "erased child range");
            Ok(last)
        })
    }

    /// Frees every child.
    ///
    /// # Errors
    ///
    /// Fails if the owner is gone.
    pub fn clear(&self) -> Result<()> {
        runtime::with(|rt| {
            let parent = self.owner_id(rt)?;
            let children: Vec<NodeId> = rt.engine.children(parent).collect();
            for child in children {
                rt.engine.free_node(child);
            }
            Ok(())
        })
    }
}

fn erase_one(rt: &mut Runtime, parent: NodeId, pos: Handle<ChildNode>) -> Result<Option<NodeId>> {
    if pos.is_null() {
        return Err(Error::invalid("the position to erase must not be the end"));
    }
    let id = pos.node_id(rt)?;
    check_owned(&rt.engine, parent, id)?;
    let next = rt.engine.next_sibling(id);
    rt.engine.free_node(id);
    Ok(next)
}

pub(crate) fn check_cdata(value: &str) -> Result<()> {
    if value.contains("]]>") {
        return Err(Error::invalid("CDATA content must not contain \"]]>\""));
    }
    Ok(())
}

pub(crate) fn check_comment(value: &str) -> Result<()> {
    if value.contains("--") || value.ends_with('-') {
        return Err(Error::invalid("comment content must not contain \"--\" or end with \"-\""));
    }
    Ok(())
}

fn check_instruction(target: &str, data: &str) -> Result<()> {
    check_name(target)?;
    if target.eq_ignore_ascii_case("xml") {
        return Err(Error::invalid("\"xml\" is a reserved instruction target"));
    }
    if data.contains("?>") {
        return Err(Error::invalid("instruction data must not contain \"?>\""));
    }
    Ok(())
}
