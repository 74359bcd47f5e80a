//! Namespace declaration, lookup and reconciliation.
//!
//! Every element and attribute may point at one namespace declaration. The
//! pointer must always name a declaration visible from the node: made on
//! the node's element or on one of its ancestors, and not shadowed by a
//! nearer declaration of the same prefix. Structural mutations (insert,
//! clone, adopt, declare) can break that, so each of them ends with a call
//! to [`reconcile`] over the subtree they touched.
//!
//! A default declaration made on an element does not move unqualified
//! descendants that already exist into that namespace: they keep their
//! empty namespace pointer, and their serialized form will then read as
//! belonging to the default namespace. Callers that declare a default
//! namespace over existing content should set the URI of that content
//! explicitly.

use tracing::debug;

use crate::engine::{Engine, NodeId, NsId, RawKind, XML_NAMESPACE};
use crate::error::{Error, Result};
use crate::handle::{Access, Element, Handle, Mutable, Xmlns};
use crate::iter::SiblingIter;
use crate::registry::Registry;
use crate::runtime;
use crate::util::qname::{check_nc_name, check_uri};

/// Returns the next generated prefix of `doc` that is not in scope at
/// `scope`.
pub(crate) fn next_prefix(engine: &mut Engine<Registry>, doc: NodeId, scope: Option<NodeId>) -> String {
    loop {
        let counter = match engine.doc_info_mut(doc) {
            Some(info) => {
                info.prefix_counter = info.prefix_counter.wrapping_add(1);
                info.prefix_counter
            }
            None => 0,
        };
        let prefix = format!("ns{counter}");
        if scope.map_or(true, |s| engine.search_ns(s, Some(&prefix)).is_none()) {
            return prefix;
        }
    }
}

fn as_prefix(prefix: &str) -> Option<&str> {
    if prefix.is_empty() {
        None
    } else {
        Some(prefix)
    }
}

/// Declares `prefix` (empty for the default namespace) → `uri` on `elem`.
///
/// Returns the declaration and `true` if it was created, or the existing
/// declaration of `prefix` on `elem` and `false`.
pub(crate) fn declare(
    engine: &mut Engine<Registry>,
    elem: NodeId,
    prefix: &str,
    uri: &str,
) -> Result<(NsId, bool)> {
    let prefix = as_prefix(prefix);
    if let Some(p) = prefix {
        check_nc_name(p)?;
        if p == "xmlns" {
            return Err(Error::invalid("the xmlns prefix cannot be declared"));
        }
    }
    check_uri(uri)?;
    if prefix == Some("xml") {
        let xml = engine.doc_of(elem).and_then(|doc| engine.xml_ns(doc));
        return match xml {
            Some(ns) if uri == XML_NAMESPACE => Ok((ns, false)),
            _ => Err(Error::invalid("the xml prefix is bound to the XML namespace")),
        };
    }
    if uri == XML_NAMESPACE {
        return Err(Error::invalid("the XML namespace can only be bound to the xml prefix"));
    }

    if let Some(existing) = engine
        .ns_defs(elem)
        .find(|&ns| engine.ns(ns).prefix.as_deref() == prefix)
    {
        return Ok((existing, false));
    }
    let created = engine
        .new_ns(elem, uri, prefix)?
        .ok_or_else(|| Error::InternalConsistency("namespace declaration refused".to_string()))?;
    reconcile(engine, elem)?;
    Ok((created, true))
}

/// Puts the name of `node` in namespace `uri`, reusing a visible
/// declaration of `uri` or declaring one with a generated prefix on `elem`.
/// An empty `uri` takes the node out of any namespace.
pub(crate) fn set_uri(engine: &mut Engine<Registry>, node: NodeId, elem: NodeId, uri: &str) -> Result<()> {
    if uri.is_empty() {
        engine.set_ns(node, None);
        return Ok(());
    }
    check_uri(uri)?;
    let ns = match engine.search_ns_by_href(node, uri) {
        Some(ns) => ns,
        None => {
            let doc = engine
                .doc_of(elem)
                .ok_or_else(|| Error::InternalConsistency("element without document".to_string()))?;
            let prefix = next_prefix(engine, doc, Some(elem));
            engine
                .new_ns(elem, uri, Some(&prefix))?
                .ok_or_else(|| Error::InternalConsistency("namespace declaration refused".to_string()))?
        }
    };
    engine.set_ns(node, Some(ns));
    Ok(())
}

/// Rebinds every namespace pointer in the subtree of `elem` that no longer
/// resolves to a visible declaration. Returns the number of declarations
/// created.
pub(crate) fn reconcile(engine: &mut Engine<Registry>, elem: NodeId) -> Result<usize> {
    if engine.kind(elem) != RawKind::Element {
        return Ok(0);
    }
    let declared = engine
        .reconcile_ns(elem)
        .map_err(|e| Error::InternalConsistency(format!("namespace reconciliation failed: {e}")))?;
    if declared > 0 {
        debug!(element = elem.into_raw(), declared, "reconciled namespaces");
    }
    Ok(declared)
}

impl<A: Access> Handle<Element, A> {
    /// Returns the declaration this element's name is bound to (empty if
    /// the element is in no namespace).
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

    /// Returns a cursor at the first namespace declared on this element.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn xmlns_declarations(self) -> Result<SiblingIter<Xmlns, A>> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Handle::from_ns(rt, rt.engine.node(id).ns_def).map(SiblingIter::from)
        })
    }

    /// Finds the nearest declaration of `prefix` (empty for the default
    /// namespace) on this element or its ancestors. Returns an empty handle
    /// if there is none.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn find_xmlns_by_prefix(self, prefix: &str) -> Result<Handle<Xmlns, A>> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Handle::from_ns(rt, rt.engine.search_ns(id, as_prefix(prefix)))
        })
    }

    /// Finds the nearest declaration of `uri` in scope whose prefix is not
    /// shadowed. Returns an empty handle if there is none.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn find_xmlns_by_uri(self, uri: &str) -> Result<Handle<Xmlns, A>> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Handle::from_ns(rt, rt.engine.search_ns_by_href(id, uri))
        })
    }
}

impl Handle<Element, Mutable> {
    /// Declares `prefix` → `uri` on this element.
    ///
    /// If `prefix` is already declared here the existing declaration is
    /// returned with `false` and nothing changes. Otherwise the subtree is
    /// reconciled against the new declaration and `true` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for a malformed prefix or URI, or
    /// for an attempt to rebind `xml` or `xmlns`.
    pub fn declare_xmlns(self, prefix: &str, uri: &str) -> Result<(Handle<Xmlns>, bool)> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let (ns, created) = declare(&mut rt.engine, id, prefix, uri)?;
            Ok((Handle::from_ns(rt, Some(ns))?, created))
        })
    }

    /// Declares `prefix` → `uri` on this element and puts the element in
    /// that namespace.
    ///
    /// # Errors
    ///
    /// As for [`declare_xmlns`](Self::declare_xmlns). Also fails if `prefix`
    /// is already bound to a different URI on this element.
    pub fn set_xmlns(self, prefix: &str, uri: &str) -> Result<Handle<Xmlns>> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let (ns, _) = declare(&mut rt.engine, id, prefix, uri)?;
            if rt.engine.ns(ns).href != uri {
                return Err(Error::invalid(format!(
                    "prefix {prefix:?} is already bound to {:?} on this element",
                    rt.engine.ns(ns).href
                )));
            }
            rt.engine.set_ns(id, Some(ns));
            Handle::from_ns(rt, Some(ns))
        })
    }

    /// Puts the element in namespace `uri`, reusing a visible declaration
    /// or declaring one with a generated prefix. An empty `uri` takes the
    /// element out of its namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for a malformed URI.
    pub fn set_uri(self, uri: &str) -> Result<()> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            set_uri(&mut rt.engine, id, id, uri)
        })
    }

    /// Reconciles the namespace pointers of this element's subtree.
    /// Returns the number of declarations created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalConsistency`] if reconciliation fails.
    pub fn reconcile_xmlns(self) -> Result<usize> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            reconcile(&mut rt.engine, id)
        })
    }
}
