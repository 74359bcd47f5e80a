//! Operations shared by every node kind.

use std::fmt;

use tracing::trace;

use crate::document::DocumentId;
use crate::engine::RawKind;
use crate::error::{Error, Result};
use crate::handle::{Access, ChildNode, Element, Extends, Handle, Mutable, Node};
use crate::runtime;
use crate::serial;

/// The kind of a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// An element.
    Element,
    /// An attribute.
    Attribute,
    /// Character data.
    Text,
    /// A CDATA section.
    CData,
    /// A comment.
    Comment,
    /// A processing instruction.
    Instruction,
    /// A namespace declaration.
    Xmlns,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Element => "element",
            Self::Attribute => "attribute",
            Self::Text => "text",
            Self::CData => "cdata",
            Self::Comment => "comment",
            Self::Instruction => "instruction",
            Self::Xmlns => "xmlns",
        };
        f.write_str(name)
    }
}

impl<T: Extends<Node>, A: Access> Handle<T, A> {
    /// Returns the kind of the node.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn kind(self) -> Result<NodeKind> {
        runtime::with(|rt| self.wrapper_kind(rt))
    }

    /// Returns the node name: the local name of elements and attributes,
    /// the target of instructions, `#text` for text and CDATA, `#comment`
    /// for comments.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn name(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(rt.engine.node_name(id))
        })
    }

    /// Returns the text content. For elements this is the concatenated text
    /// of every descendant text and CDATA node.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn content(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(rt.engine.get_content(id))
        })
    }

    /// Returns an XPath location of the node, such as `/root/a[2]/@id`.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn path(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(rt.engine.node_path(id))
        })
    }

    /// Serializes the node and its subtree.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn to_xml_string(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(serial::node_to_string(&rt.engine, id))
        })
    }

    /// Returns the parent element. The root element and unlinked nodes have
    /// none, so the result is an empty handle for them.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn parent(self) -> Result<Handle<Element, A>> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let parent = rt
                .engine
                .parent(id)
                .filter(|&p| rt.engine.kind(p) == RawKind::Element);
            Handle::from_node(rt, parent)
        })
    }

    /// Returns `true` if the node is not linked into any tree.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn is_orphan(self) -> Result<bool> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(rt.engine.parent(id).is_none())
        })
    }

    /// Returns the document that owns the node.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn document_id(self) -> Result<DocumentId> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            rt.engine
                .doc_of(id)
                .map(|doc| DocumentId::new(doc, rt.generation()))
                .ok_or_else(|| Error::InternalConsistency("node without document".to_string()))
        })
    }
}

impl<T: Extends<Node>> Handle<T, Mutable> {
    /// Replaces the content of the node.
    ///
    /// On an element every child is destroyed and replaced by one text node.
    /// On an attribute this sets the value.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn set_content(self, content: &str) -> Result<()> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            rt.engine.set_content(id, content)?;
            Ok(())
        })
    }

    /// Unlinks and frees the node together with its subtree.
    ///
    /// Every handle to a freed node dangles afterwards.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn delete(self) -> Result<()> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            trace!(node = id.into_raw(), "deleting node");
            rt.engine.free_node(id);
            Ok(())
        })
    }
}

impl<T: Extends<ChildNode>, A: Access> Handle<T, A> {
    /// Returns the previous node in the parent's child list.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn prev_sibling(self) -> Result<Handle<ChildNode, A>> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Handle::from_node(rt, rt.engine.prev_sibling(id))
        })
    }

    /// Returns the next node in the parent's child list.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn next_sibling(self) -> Result<Handle<ChildNode, A>> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Handle::from_node(rt, rt.engine.next_sibling(id))
        })
    }
}

/// Maps the engine's kind tag to the wrapper kind. Documents have no wrapper.
pub(crate) fn kind_of(kind: RawKind) -> Option<NodeKind> {
    match kind {
        RawKind::Element => Some(NodeKind::Element),
        RawKind::Attribute => Some(NodeKind::Attribute),
        RawKind::Text => Some(NodeKind::Text),
        RawKind::CData => Some(NodeKind::CData),
        RawKind::Comment => Some(NodeKind::Comment),
        RawKind::Instruction => Some(NodeKind::Instruction),
        RawKind::Document => None,
    }
}
