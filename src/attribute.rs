//! Attribute wrappers.

use crate::element::{prefix_of, uri_of};
use crate::error::{Error, Result};
use crate::handle::{Access, Attribute, Handle, Mutable, Xmlns};
use crate::namespace;
use crate::runtime;
use crate::util::qname::check_nc_name;

impl<A: Access> Handle<Attribute, A> {
    /// Returns the namespace URI, or an empty string.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn uri(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(uri_of(&rt.engine, id))
        })
    }

    /// Returns the namespace prefix, or an empty string.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn prefix(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(prefix_of(&rt.engine, id))
        })
    }

    /// Returns `prefix:name`, or the local name without a prefix.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn qname(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(rt.engine.qualified_name(id))
        })
    }

    /// Returns the attribute value.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn value(self) -> Result<String> {
        self.content()
    }

    /// Returns the declaration this attribute's name is bound to (empty if
    /// it is in no namespace).
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn xmlns(self) -> Result<Handle<Xmlns, A>> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let ns = rt.engine.node(id).ns.filter(|&ns| rt.engine.is_ns_live(ns));
            Handle::from_ns(rt, ns)
        })
    }

    /// Returns the previous attribute of the owner element.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn prev_attribute(self) -> Result<Self> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Handle::from_node(rt, rt.engine.prev_sibling(id))
        })
    }

    /// Returns the next attribute of the owner element.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn next_attribute(self) -> Result<Self> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Handle::from_node(rt, rt.engine.next_sibling(id))
        })
    }
}

impl Handle<Attribute, Mutable> {
    /// Replaces the attribute value.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn set_value(self, value: &str) -> Result<()> {
        self.set_content(value)
    }

    /// Renames the attribute, keeping its namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if `name` is not an `NCName`, or
    /// is `xmlns`.
    pub fn set_name(self, name: &str) -> Result<()> {
        check_nc_name(name)?;
        if name == "xmlns" {
            return Err(Error::invalid("namespace declarations are not attributes"));
        }
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            rt.engine.set_name(id, name);
            Ok(())
        })
    }

    /// Binds the attribute's name to `xmlns` and reconciles the owner
    /// element, redeclaring the binding there if it is not in scope.
    /// An empty handle takes the attribute out of its namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for a default namespace
    /// declaration, which never applies to attributes.
    pub fn set_xmlns<B: Access>(self, xmlns: Handle<Xmlns, B>) -> Result<()> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let ns = if xmlns.is_null() {
                None
            } else {
                let ns = xmlns.ns_id(rt)?;
                if rt.engine.ns(ns).prefix.is_none() {
                    return Err(Error::invalid(
                        "attributes cannot be bound to the default namespace",
                    ));
                }
                Some(ns)
            };
            rt.engine.set_ns(id, ns);
            match rt.engine.parent(id) {
                Some(owner) => namespace::reconcile(&mut rt.engine, owner).map(drop),
                None => Ok(()),
            }
        })
    }
}
