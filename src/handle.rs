//! Typed, non-owning node handles.
//!
//! A [`Handle`] names one wrapper in the registry, or nothing. It is a plain
//! `Copy` value: it neither owns nor keeps alive the node it refers to, and
//! every operation re-validates it. A handle whose node has been freed fails
//! with [`Error::DanglingHandle`]; an empty handle fails with
//! [`Error::NullReference`].
//!
//! The first type parameter is a kind marker. Markers form a small hierarchy
//! expressed through [`Extends`]:
//!
//! ```text
//! Node ── ChildNode ─┬─ Element
//!    │               ├─ Text        (text and CDATA)
//!    │               ├─ Comment
//!    │               └─ Instruction
//!    └── Attribute
//! Xmlns                            (namespace declarations, not nodes)
//! ```
//!
//! The second parameter selects mutable or read-only access. Read operations
//! are available on both; mutating operations only on [`Mutable`] handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::engine::{NodeId, NsId};
use crate::error::{Error, Result};
use crate::node::NodeKind;
use crate::registry::{self, Target, WrapperKey};
use crate::runtime::{self, Runtime};

mod sealed {
    pub trait Sealed {}
}

/// A node kind marker.
pub trait NodeType: sealed::Sealed + 'static {
    /// Lowercase name used in error messages.
    const NAME: &'static str;

    /// Returns `true` if a wrapper of `kind` may be viewed as this type.
    fn accepts(kind: NodeKind) -> bool;
}

/// Compile-time subtyping between kind markers.
///
/// `T: Extends<U>` means every `T` is also a `U`, so a `Handle<T>` may be
/// widened to a `Handle<U>` without a runtime check.
pub trait Extends<U: NodeType>: NodeType {}

/// An access marker.
pub trait Access: sealed::Sealed + 'static {}

/// Any node: element, attribute, text, comment or instruction.
#[derive(Debug)]
pub enum Node {}
/// A node that can appear in a child list.
#[derive(Debug)]
pub enum ChildNode {}
/// An element.
#[derive(Debug)]
pub enum Element {}
/// An attribute.
#[derive(Debug)]
pub enum Attribute {}
/// A text node or CDATA section.
#[derive(Debug)]
pub enum Text {}
/// A comment.
#[derive(Debug)]
pub enum Comment {}
/// A processing instruction.
#[derive(Debug)]
pub enum Instruction {}
/// A namespace declaration.
#[derive(Debug)]
pub enum Xmlns {}

/// Full access.
#[derive(Debug)]
pub enum Mutable {}
/// Read-only access.
#[derive(Debug)]
pub enum ReadOnly {}

macro_rules! node_type {
    ($marker:ty, $name:literal, |$kind:ident| $accepts:expr) => {
        impl sealed::Sealed for $marker {}
        impl NodeType for $marker {
            const NAME: &'static str = $name;
            fn accepts($kind: NodeKind) -> bool {
                $accepts
            }
        }
    };
}

node_type!(Node, "node", |kind| kind != NodeKind::Xmlns);
node_type!(ChildNode, "child node", |kind| !matches!(
    kind,
    NodeKind::Attribute | NodeKind::Xmlns
));
node_type!(Element, "element", |kind| kind == NodeKind::Element);
node_type!(Attribute, "attribute", |kind| kind == NodeKind::Attribute);
node_type!(Text, "text", |kind| matches!(kind, NodeKind::Text | NodeKind::CData));
node_type!(Comment, "comment", |kind| kind == NodeKind::Comment);
node_type!(Instruction, "instruction", |kind| kind == NodeKind::Instruction);
node_type!(Xmlns, "xmlns", |kind| kind == NodeKind::Xmlns);

impl sealed::Sealed for Mutable {}
impl sealed::Sealed for ReadOnly {}
impl Access for Mutable {}
impl Access for ReadOnly {}

impl<T: NodeType> Extends<T> for T {}
impl Extends<Node> for ChildNode {}
impl Extends<Node> for Attribute {}
impl Extends<ChildNode> for Element {}
impl Extends<Node> for Element {}
impl Extends<ChildNode> for Text {}
impl Extends<Node> for Text {}
impl Extends<ChildNode> for Comment {}
impl Extends<Node> for Comment {}
impl Extends<ChildNode> for Instruction {}
impl Extends<Node> for Instruction {}

/// A non-owning, possibly empty reference to a wrapper.
///
/// Handles are neither `Send` nor `Sync`: the nodes they name live in the
/// creating thread's runtime.
pub struct Handle<T: NodeType, A: Access = Mutable> {
    key: Option<WrapperKey>,
    marker: PhantomData<(fn() -> T, fn() -> A, *const ())>,
}

/// Handle to any node.
pub type NodeHandle = Handle<Node>;
/// Handle to a node of a child list.
pub type ChildHandle = Handle<ChildNode>;
/// Handle to an element.
pub type ElementHandle = Handle<Element>;
/// Handle to an attribute.
pub type AttributeHandle = Handle<Attribute>;
/// Handle to a text node or CDATA section.
pub type TextHandle = Handle<Text>;
/// Handle to a comment.
pub type CommentHandle = Handle<Comment>;
/// Handle to a processing instruction.
pub type InstructionHandle = Handle<Instruction>;
/// Handle to a namespace declaration.
pub type XmlnsHandle = Handle<Xmlns>;
/// Read-only handle to any node.
pub type ConstNodeHandle = Handle<Node, ReadOnly>;
/// Read-only handle to a node of a child list.
pub type ConstChildHandle = Handle<ChildNode, ReadOnly>;
/// Read-only handle to an element.
pub type ConstElementHandle = Handle<Element, ReadOnly>;
/// Read-only handle to an attribute.
pub type ConstAttributeHandle = Handle<Attribute, ReadOnly>;
/// Read-only handle to a text node or CDATA section.
pub type ConstTextHandle = Handle<Text, ReadOnly>;
/// Read-only handle to a comment.
pub type ConstCommentHandle = Handle<Comment, ReadOnly>;
/// Read-only handle to a processing instruction.
pub type ConstInstructionHandle = Handle<Instruction, ReadOnly>;
/// Read-only handle to a namespace declaration.
pub type ConstXmlnsHandle = Handle<Xmlns, ReadOnly>;

impl<T: NodeType, A: Access> Handle<T, A> {
    /// Returns the empty handle.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            key: None,
            marker: PhantomData,
        }
    }

    pub(crate) fn from_key(key: Option<WrapperKey>) -> Self {
        Self {
            key,
            marker: PhantomData,
        }
    }

    pub(crate) fn key(self) -> Option<WrapperKey> {
        self.key
    }

    /// Returns `true` if the handle refers to nothing.
    #[must_use]
    pub fn is_null(self) -> bool {
        self.key.is_none()
    }

    /// Returns `true` if the handle refers to something.
    ///
    /// The referenced node may have been freed since.
    #[must_use]
    pub fn is_some(self) -> bool {
        self.key.is_some()
    }

    /// Returns `None` for an empty handle.
    #[must_use]
    pub fn non_null(self) -> Option<Self> {
        self.key.map(|_| self)
    }

    /// Widens the handle to a supertype.
    #[must_use]
    pub fn static_cast<U: NodeType>(self) -> Handle<U, A>
    where
        T: Extends<U>,
    {
        Handle::from_key(self.key)
    }

    /// Narrows the handle to a subtype without checking the node kind.
    ///
    /// The kind is still verified on every use, so a wrong downcast fails
    /// with [`Error::WrongKind`] instead of misbehaving.
    #[must_use]
    pub fn static_downcast<U: NodeType>(self) -> Handle<U, A>
    where
        U: Extends<T>,
    {
        Handle::from_key(self.key)
    }

    /// Returns a read-only view of the same node.
    #[must_use]
    pub fn as_const(self) -> Handle<T, ReadOnly> {
        Handle::from_key(self.key)
    }

    /// Returns a mutable view of the same node.
    #[must_use]
    pub fn const_cast(self) -> Handle<T, Mutable> {
        Handle::from_key(self.key)
    }

    /// Converts to `U` after checking the node's actual kind.
    ///
    /// Returns the empty handle if the node is not a `U`, if it no longer
    /// exists, or if `self` is empty. Never fails.
    #[must_use]
    pub fn dynamic_cast<U: NodeType>(self) -> Handle<U, A> {
        let Some(key) = self.key else {
            return Handle::null();
        };
        let accepted = runtime::with(|rt| Ok(rt.registry().get(key).is_ok_and(|w| U::accepts(w.kind))));
        if matches!(accepted, Ok(true)) {
            Handle::from_key(Some(key))
        } else {
            Handle::null()
        }
    }

    /// Returns `true` if the referenced wrapper still exists.
    #[must_use]
    pub fn is_alive(self) -> bool {
        let Some(key) = self.key else {
            return false;
        };
        runtime::with(|rt| Ok(rt.registry().get(key).is_ok())).unwrap_or(false)
    }

    fn wrapper_target(self, rt: &Runtime) -> Result<(NodeKind, Target)> {
        let key = self.key.ok_or(Error::NullReference)?;
        let wrapper = rt.registry().get(key)?;
        if !T::accepts(wrapper.kind) {
            return Err(Error::WrongKind {
                expected: T::NAME,
                found: wrapper.kind,
            });
        }
        Ok((wrapper.kind, wrapper.target))
    }

    /// Resolves the handle to its engine node.
    pub(crate) fn node_id(self, rt: &Runtime) -> Result<NodeId> {
        match self.wrapper_target(rt)? {
            (_, Target::Node(id)) => Ok(id),
            (kind, Target::Ns(_)) => Err(Error::WrongKind {
                expected: T::NAME,
                found: kind,
            }),
        }
    }

    /// Resolves the handle to its engine namespace declaration.
    pub(crate) fn ns_id(self, rt: &Runtime) -> Result<NsId> {
        match self.wrapper_target(rt)? {
            (_, Target::Ns(id)) => Ok(id),
            (kind, Target::Node(_)) => Err(Error::WrongKind {
                expected: T::NAME,
                found: kind,
            }),
        }
    }

    /// Returns the kind of the referenced wrapper.
    pub(crate) fn wrapper_kind(self, rt: &Runtime) -> Result<NodeKind> {
        self.wrapper_target(rt).map(|(kind, _)| kind)
    }

    /// Bridges an engine node to a handle, checking that it is a `T`.
    pub(crate) fn from_node(rt: &Runtime, id: Option<NodeId>) -> Result<Self> {
        let key = registry::bridge(&rt.engine, id)?;
        Self::checked(rt, key)
    }

    /// Bridges an engine namespace declaration to a handle.
    pub(crate) fn from_ns(rt: &Runtime, id: Option<NsId>) -> Result<Self> {
        let key = registry::bridge_ns(&rt.engine, id)?;
        Self::checked(rt, key)
    }

    fn checked(rt: &Runtime, key: Option<WrapperKey>) -> Result<Self> {
        if let Some(key) = key {
            let kind = rt.registry().get(key)?.kind;
            if !T::accepts(kind) {
                return Err(Error::WrongKind {
                    expected: T::NAME,
                    found: kind,
                });
            }
        }
        Ok(Self::from_key(key))
    }
}

impl<T: NodeType, A: Access> Clone for Handle<T, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: NodeType, A: Access> Copy for Handle<T, A> {}

impl<T: NodeType, A: Access> Default for Handle<T, A> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: NodeType, A: Access> fmt::Debug for Handle<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key {
            Some(key) => write!(f, "Handle<{}>({key:?})", T::NAME),
            None => write!(f, "Handle<{}>(null)", T::NAME),
        }
    }
}

impl<T: NodeType, A: Access, U: NodeType, B: Access> PartialEq<Handle<U, B>> for Handle<T, A> {
    fn eq(&self, other: &Handle<U, B>) -> bool {
        self.key == other.key
    }
}

impl<T: NodeType, A: Access> Eq for Handle<T, A> {}

impl<T: NodeType, A: Access> Hash for Handle<T, A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T: NodeType> From<Handle<T, Mutable>> for Handle<T, ReadOnly> {
    fn from(handle: Handle<T, Mutable>) -> Self {
        handle.as_const()
    }
}
