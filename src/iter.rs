//! Bidirectional cursors over sibling chains.
//!
//! A [`SiblingIter`] is a position in a chain of siblings: the children of
//! one parent, the attributes of one element, or the namespace declarations
//! of one element. The end position is the empty handle, which is also what
//! [`Default`] produces. Moving off either end is a checked error:
//!
//! - incrementing the end position fails;
//! - decrementing the end position fails;
//! - decrementing the first position fails.
//!
//! Incrementing the last position yields the end position.
//!
//! Both iterator types also implement [`Iterator`], yielding the current
//! handle and advancing, so they work with `for` loops and adapters. A
//! cursor whose current node was freed ends the iteration there (logged at
//! debug level); `increment` reports the same situation as
//! [`Error::DanglingHandle`].

use std::fmt;

use tracing::debug;

use crate::engine::RawKind;
use crate::error::{Error, Result};
use crate::handle::{Access, Attribute, ChildNode, Element, Handle, Mutable, NodeType, ReadOnly, Xmlns};
use crate::registry::{self, Target, WrapperKey};
use crate::runtime::{self, Runtime};

/// Kind markers whose siblings are all of the same kind.
pub trait Chain: NodeType {}

impl Chain for ChildNode {}
impl Chain for Attribute {}
impl Chain for Xmlns {}

fn step(rt: &Runtime, key: WrapperKey, forward: bool) -> Result<Option<WrapperKey>> {
    match rt.registry().get(key)?.target {
        Target::Node(id) => {
            let next = if forward {
                rt.engine.next_sibling(id)
            } else {
                rt.engine.prev_sibling(id)
            };
            registry::bridge(&rt.engine, next)
        }
        Target::Ns(id) => {
            let next = if forward {
                rt.engine.ns(id).next
            } else {
                rt.engine
                    .ns(id)
                    .owner
                    .and_then(|owner| rt.engine.ns_defs(owner).take_while(|&n| n != id).last())
            };
            registry::bridge_ns(&rt.engine, next)
        }
    }
}

fn step_element(rt: &Runtime, key: WrapperKey, forward: bool) -> Result<Option<WrapperKey>> {
    let Target::Node(id) = rt.registry().get(key)?.target else {
        return Err(Error::InternalConsistency(
            "element cursor on a namespace declaration".to_string(),
        ));
    };
    let mut cur = id;
    loop {
        let next = if forward {
            rt.engine.next_sibling(cur)
        } else {
            rt.engine.prev_sibling(cur)
        };
        match next {
            Some(n) if rt.engine.kind(n) == RawKind::Element => {
                return registry::bridge(&rt.engine, Some(n));
            }
            Some(n) => cur = n,
            None => return Ok(None),
        }
    }
}

/// A position in a sibling chain.
pub struct SiblingIter<T: Chain, A: Access = Mutable> {
    current: Handle<T, A>,
}

impl<T: Chain, A: Access> SiblingIter<T, A> {
    /// Returns the end position.
    #[must_use]
    pub fn end() -> Self {
        Self {
            current: Handle::null(),
        }
    }

    /// Returns the handle at this position (empty at the end).
    #[must_use]
    pub fn get(&self) -> Handle<T, A> {
        self.current
    }

    /// Returns `true` at the end position.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.current.is_null()
    }

    /// Moves to the next sibling, or to the end after the last one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIterator`] at the end position, or
    /// [`Error::DanglingHandle`] if the current node was freed.
    pub fn increment(&mut self) -> Result<()> {
        let key = self
            .current
            .key()
            .ok_or(Error::InvalidIterator("increment called at the end position"))?;
        let next = runtime::with(|rt| step(rt, key, true))?;
        self.current = Handle::from_key(next);
        Ok(())
    }

    /// Moves to the previous sibling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIterator`] at the end position or at the
    /// first sibling, or [`Error::DanglingHandle`] if the current node was
    /// freed.
    pub fn decrement(&mut self) -> Result<()> {
        let key = self
            .current
            .key()
            .ok_or(Error::InvalidIterator("decrement called at the end position"))?;
        let prev = runtime::with(|rt| step(rt, key, false))?
            .ok_or(Error::InvalidIterator("decrement called at the first position"))?;
        self.current = Handle::from_key(Some(prev));
        Ok(())
    }

    /// Returns a read-only cursor at the same position.
    #[must_use]
    pub fn as_const(self) -> SiblingIter<T, ReadOnly> {
        SiblingIter {
            current: self.current.as_const(),
        }
    }
}

impl<T: Chain, A: Access> From<Handle<T, A>> for SiblingIter<T, A> {
    fn from(current: Handle<T, A>) -> Self {
        Self { current }
    }
}

impl<T: Chain> From<SiblingIter<T, Mutable>> for SiblingIter<T, ReadOnly> {
    fn from(iter: SiblingIter<T, Mutable>) -> Self {
        iter.as_const()
    }
}

fn end_on_error(step: Result<Option<WrapperKey>>) -> Option<WrapperKey> {
    step.unwrap_or_else(|e| {
        debug!(error = %e, "sibling iteration stopped");
        None
    })
}

impl<T: Chain, A: Access> Iterator for SiblingIter<T, A> {
    type Item = Handle<T, A>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.non_null()?;
        let next = current
            .key()
            .and_then(|key| end_on_error(runtime::with(|rt| step(rt, key, true))));
        self.current = Handle::from_key(next);
        Some(current)
    }
}

impl<T: Chain, A: Access> Clone for SiblingIter<T, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Chain, A: Access> Copy for SiblingIter<T, A> {}

impl<T: Chain, A: Access> Default for SiblingIter<T, A> {
    fn default() -> Self {
        Self::end()
    }
}

impl<T: Chain, A: Access, B: Access> PartialEq<SiblingIter<T, B>> for SiblingIter<T, A> {
    fn eq(&self, other: &SiblingIter<T, B>) -> bool {
        self.current == other.current
    }
}

impl<T: Chain, A: Access> Eq for SiblingIter<T, A> {}

impl<T: Chain, A: Access> fmt::Debug for SiblingIter<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SiblingIter").field(&self.current).finish()
    }
}

/// A position among the child elements of one parent, skipping every other
/// kind of node.
pub struct ElementIter<A: Access = Mutable> {
    current: Handle<Element, A>,
}

impl<A: Access> ElementIter<A> {
    pub(crate) fn at(current: Handle<Element, A>) -> Self {
        Self { current }
    }

    /// Returns the end position.
    #[must_use]
    pub fn end() -> Self {
        Self::at(Handle::null())
    }

    /// Returns the element at this position (empty at the end).
    #[must_use]
    pub fn get(&self) -> Handle<Element, A> {
        self.current
    }

    /// Returns `true` at the end position.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.current.is_null()
    }

    /// Moves to the next sibling element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIterator`] at the end position.
    pub fn increment(&mut self) -> Result<()> {
        let key = self
            .current
            .key()
            .ok_or(Error::InvalidIterator("increment called at the end position"))?;
        let next = runtime::with(|rt| step_element(rt, key, true))?;
        self.current = Handle::from_key(next);
        Ok(())
    }

    /// Moves to the previous sibling element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIterator`] at the end position or at the
    /// first element.
    pub fn decrement(&mut self) -> Result<()> {
        let key = self
            .current
            .key()
            .ok_or(Error::InvalidIterator("decrement called at the end position"))?;
        let prev = runtime::with(|rt| step_element(rt, key, false))?
            .ok_or(Error::InvalidIterator("decrement called at the first position"))?;
        self.current = Handle::from_key(Some(prev));
        Ok(())
    }
}

impl<A: Access> Iterator for ElementIter<A> {
    type Item = Handle<Element, A>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.non_null()?;
        let next = current
            .key()
            .and_then(|key| end_on_error(runtime::with(|rt| step_element(rt, key, true))));
        self.current = Handle::from_key(next);
        Some(current)
    }
}

impl<A: Access> Clone for ElementIter<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Access> Copy for ElementIter<A> {}

impl<A: Access> Default for ElementIter<A> {
    fn default() -> Self {
        Self::end()
    }
}

impl<A: Access, B: Access> PartialEq<ElementIter<B>> for ElementIter<A> {
    fn eq(&self, other: &ElementIter<B>) -> bool {
        self.current == other.current
    }
}

impl<A: Access> fmt::Debug for ElementIter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ElementIter").field(&self.current).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::handle::ChildHandle;

    #[test]
    fn test_end_iterator_rejects_movement() {
        let mut end: SiblingIter<ChildNode> = SiblingIter::default();
        assert!(matches!(end.increment(), Err(Error::InvalidIterator(_))));
        assert!(matches!(end.decrement(), Err(Error::InvalidIterator(_))));
        assert_eq!(end.next(), None);
    }

    #[test]
    fn test_walk_forward_and_back() {
        let Ok(mut doc) = Document::parse_str("<r><a/><b/><c/></r>") else {
            panic!("parse failed");
        };
        let Ok(root) = doc.root_mut() else {
            panic!("no root");
        };
        let Ok(mut it) = root.children().begin() else {
            panic!("begin failed");
        };
        assert!(matches!(it.decrement(), Err(Error::InvalidIterator(_))));
        assert!(it.increment().is_ok());
        assert!(it.increment().is_ok());
        assert_eq!(it.get().name().ok().as_deref(), Some("c"));
        assert!(it.decrement().is_ok());
        assert_eq!(it.get().name().ok().as_deref(), Some("b"));
        assert!(it.increment().is_ok());
        assert!(it.increment().is_ok());
        assert!(it.is_end());
        assert_eq!(it, root.children().end());
        assert!(matches!(it.increment(), Err(Error::InvalidIterator(_))));
    }

    #[test]
    fn test_const_conversion_compares_equal() {
        let Ok(mut doc) = Document::parse_str("<r><a/></r>") else {
            panic!("parse failed");
        };
        let Ok(root) = doc.root_mut() else {
            panic!("no root");
        };
        let Ok(it) = root.children().begin() else {
            panic!("begin failed");
        };
        let cit: SiblingIter<ChildNode, ReadOnly> = it.into();
        assert_eq!(cit, it);
    }

    #[test]
    fn test_iterator_adapter() {
        let Ok(mut doc) = Document::parse_str("<r><a/>x<b/></r>") else {
            panic!("parse failed");
        };
        let Ok(root) = doc.root_mut() else {
            panic!("no root");
        };
        let Ok(begin) = root.children().begin() else {
            panic!("begin failed");
        };
        let all: Vec<ChildHandle> = begin.collect();
        assert_eq!(all.len(), 3);
        let Ok(elements) = root.child_elements() else {
            panic!("child_elements failed");
        };
        let elems: Vec<String> = elements.filter_map(|e| e.name().ok()).collect();
        assert_eq!(elems, vec!["a", "b"]);
    }

    #[test]
    fn test_iteration_ends_at_a_freed_node() {
        let Ok(mut doc) = Document::parse_str("<r><a/><b/><c/></r>") else {
            panic!("parse failed");
        };
        let Ok(root) = doc.root_mut() else {
            panic!("no root");
        };
        let (Ok(mut it), Ok(b)) = (root.children().begin(), root.find_elem_by_name("b")) else {
            panic!("lookup failed");
        };
        assert!(it.increment().is_ok());
        assert!(b.delete().is_ok());

        let mut stuck = it;
        assert!(matches!(stuck.increment(), Err(Error::DanglingHandle)));
        assert!(it.next().is_some());
        assert_eq!(it.next(), None);
        assert!(it.is_end());
    }

    #[test]
    fn test_element_iter_skips_other_nodes() {
        let Ok(mut doc) = Document::parse_str("<r>t<a/><!--c--><b/>u</r>") else {
            panic!("parse failed");
        };
        let Ok(root) = doc.root_mut() else {
            panic!("no root");
        };
        let Ok(mut it) = root.child_elements() else {
            panic!("child_elements failed");
        };
        assert_eq!(it.get().name().ok().as_deref(), Some("a"));
        assert!(it.increment().is_ok());
        assert_eq!(it.get().name().ok().as_deref(), Some("b"));
        assert!(it.decrement().is_ok());
        assert!(matches!(it.decrement(), Err(Error::InvalidIterator(_))));
        assert!(it.increment().is_ok());
        assert!(it.increment().is_ok());
        assert!(it.is_end());
    }

    #[test]
    fn test_attribute_and_xmlns_chains() {
        let Ok(mut doc) = Document::parse_str(r#"<r xmlns:a="urn:a" xmlns:b="urn:b" x="1" y="2"/>"#)
        else {
            panic!("parse failed");
        };
        let Ok(root) = doc.root_mut() else {
            panic!("no root");
        };
        let Ok(attrs) = root.attrs().begin() else {
            panic!("begin failed");
        };
        let names: Vec<String> = attrs.filter_map(|a| a.name().ok()).collect();
        assert_eq!(names, vec!["x", "y"]);

        let Ok(mut decls) = root.xmlns_declarations() else {
            panic!("xmlns_declarations failed");
        };
        assert_eq!(decls.get().prefix().ok().as_deref(), Some("a"));
        assert!(decls.increment().is_ok());
        assert_eq!(decls.get().prefix().ok().as_deref(), Some("b"));
        assert!(decls.decrement().is_ok());
        assert_eq!(decls.get().prefix().ok().as_deref(), Some("a"));
    }
}
