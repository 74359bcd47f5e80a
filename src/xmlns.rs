//! Namespace declaration wrappers.
//!
//! An `Xmlns` handle names one `prefix → uri` binding. Declarations are owned
//! by the element they were made on; the document's implicit `xml` binding
//! has no owner.

use crate::document::DocumentId;
use crate::engine::{Engine, NsId};
use crate::error::{Error, Result};
use crate::handle::{Access, Element, Handle, Xmlns};
use crate::registry::Registry;
use crate::runtime;
use crate::serial;

/// Serializes a declaration as it appears in a start tag.
pub(crate) fn declaration_string(engine: &Engine<Registry>, ns: NsId) -> String {
    let raw = engine.ns(ns);
    let href = serial::escape_attr(&raw.href);
    match raw.prefix.as_deref() {
        Some(prefix) => format!("xmlns:{prefix}=\"{href}\""),
        None => format!("xmlns=\"{href}\""),
    }
}

impl<A: Access> Handle<Xmlns, A> {
    /// Returns the prefix, empty for the default namespace.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn prefix(self) -> Result<String> {
        runtime::with(|rt| {
            let ns = self.ns_id(rt)?;
            Ok(rt.engine.ns(ns).prefix.clone().unwrap_or_default())
        })
    }

    /// Returns the namespace URI.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn uri(self) -> Result<String> {
        runtime::with(|rt| {
            let ns = self.ns_id(rt)?;
            Ok(rt.engine.ns(ns).href.clone())
        })
    }

    /// Returns the element the declaration was made on. The result is empty
    /// for the implicit `xml` binding and for a declaration whose element
    /// has been freed.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn owner(self) -> Result<Handle<Element, A>> {
        runtime::with(|rt| {
            let ns = self.ns_id(rt)?;
            Handle::from_node(rt, rt.engine.ns(ns).owner)
        })
    }

    /// Returns `true` if the element that made the declaration is gone.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn is_orphan(self) -> Result<bool> {
        runtime::with(|rt| {
            let ns = self.ns_id(rt)?;
            Ok(rt.engine.is_ns_detached(ns))
        })
    }

    /// Returns the document the declaration belongs to.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn document_id(self) -> Result<DocumentId> {
        runtime::with(|rt| {
            let ns = self.ns_id(rt)?;
            rt.engine
                .ns(ns)
                .doc
                .map(|doc| DocumentId::new(doc, rt.generation()))
                .ok_or_else(|| Error::InternalConsistency("declaration without document".to_string()))
        })
    }

    /// Serializes the declaration as `xmlns:prefix="uri"`.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn to_xml_string(self) -> Result<String> {
        runtime::with(|rt| {
            let ns = self.ns_id(rt)?;
            Ok(declaration_string(&rt.engine, ns))
        })
    }

    /// Returns the previous declaration made on the same element.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn prev_declaration(self) -> Result<Self> {
        runtime::with(|rt| {
            let ns = self.ns_id(rt)?;
            let prev = rt
                .engine
                .ns(ns)
                .owner
                .and_then(|owner| rt.engine.ns_defs(owner).take_while(|&n| n != ns).last());
            Handle::from_ns(rt, prev)
        })
    }

    /// Returns the next declaration made on the same element.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn next_declaration(self) -> Result<Self> {
        runtime::with(|rt| {
            let ns = self.ns_id(rt)?;
            Handle::from_ns(rt, rt.engine.ns(ns).next)
        })
    }
}
