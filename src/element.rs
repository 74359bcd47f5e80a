//! Element wrappers: names, namespaces, attributes and child lookup.

use crate::attributes::AttributeMap;
use crate::children::ChildList;
use crate::engine::{Engine, NodeId, RawKind};
use crate::error::Result;
use crate::handle::{Access, Element, Handle, Mutable};
use crate::iter::ElementIter;
use crate::registry::Registry;
use crate::runtime;
use crate::util::qname::check_nc_name;

/// Returns the namespace URI of `id`'s name, empty if it has none.
pub(crate) fn uri_of(engine: &Engine<Registry>, id: NodeId) -> String {
    engine
        .node(id)
        .ns
        .filter(|&ns| engine.is_ns_live(ns))
        .map(|ns| engine.ns(ns).href.clone())
        .unwrap_or_default()
}

/// Returns the namespace prefix of `id`'s name, empty if it has none.
pub(crate) fn prefix_of(engine: &Engine<Registry>, id: NodeId) -> String {
    engine
        .node(id)
        .ns
        .filter(|&ns| engine.is_ns_live(ns))
        .and_then(|ns| engine.ns(ns).prefix.clone())
        .unwrap_or_default()
}

fn child_elements(engine: &Engine<Registry>, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    engine
        .children(id)
        .filter(move |&c| engine.kind(c) == RawKind::Element)
}

fn find_by_path(engine: &Engine<Registry>, id: NodeId, path: &str) -> Option<NodeId> {
    match path.split_once('/') {
        None => child_elements(engine, id).find(|&c| engine.node(c).name == path),
        Some((step, rest)) => child_elements(engine, id)
            .filter(|&c| engine.node(c).name == step)
            .find_map(|c| find_by_path(engine, c, rest)),
    }
}

fn adjacent_text(engine: &Engine<Registry>, id: NodeId, forward: bool) -> String {
    let mut parts = Vec::new();
    let mut cur = id;
    loop {
        let next = if forward {
            engine.next_sibling(cur)
        } else {
            engine.prev_sibling(cur)
        };
        match next {
            Some(n) if engine.kind(n).is_text() => {
                parts.push(engine.node(n).content.as_str());
                cur = n;
            }
            _ => break,
        }
    }
    if !forward {
        parts.reverse();
    }
    parts.concat()
}

impl<A: Access> Handle<Element, A> {
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

    /// Returns the name in Clark notation: `{uri}name`, or the local name
    /// when the element is in no namespace.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn tag(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let uri = uri_of(&rt.engine, id);
            let name = &rt.engine.node(id).name;
            Ok(if uri.is_empty() {
                name.clone()
            } else {
                format!("{{{uri}}}{name}")
            })
        })
    }

    /// Returns the text and CDATA immediately before the start tag, up to
    /// the previous non-text sibling.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn head(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(adjacent_text(&rt.engine, id, false))
        })
    }

    /// Returns the text and CDATA immediately after the end tag, up to the
    /// next non-text sibling.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn tail(self) -> Result<String> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(adjacent_text(&rt.engine, id, true))
        })
    }

    /// Returns the value of the attribute `name`. A prefixed name is
    /// resolved through the declarations in scope here.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle, or for an undeclared prefix.
    pub fn attr(self, name: &str) -> Result<Option<String>> {
        self.attrs().get(name)
    }

    /// Returns the value of the attribute `name` in namespace `uri`.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn attr_ns(self, name: &str, uri: &str) -> Result<Option<String>> {
        self.attrs().get_ns(name, uri)
    }

    /// Returns the attribute map of this element.
    #[must_use]
    pub fn attrs(self) -> AttributeMap<A> {
        AttributeMap::new(self)
    }

    /// Returns the child list of this element.
    #[must_use]
    pub fn children(self) -> ChildList<A> {
        ChildList::of_element(self)
    }

    /// Returns a cursor at the first child element.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn child_elements(self) -> Result<ElementIter<A>> {
        self.find_first_elem().map(ElementIter::at)
    }

    /// Returns the first child element, or an empty handle.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn find_first_elem(self) -> Result<Self> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let found = child_elements(&rt.engine, id).next();
            Handle::from_node(rt, found)
        })
    }

    /// Returns the last child element, or an empty handle.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn find_last_elem(self) -> Result<Self> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let found = child_elements(&rt.engine, id).last();
            Handle::from_node(rt, found)
        })
    }

    /// Returns the first child element with local name `name`, in any
    /// namespace.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn find_elem_by_name(self, name: &str) -> Result<Self> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let found = child_elements(&rt.engine, id).find(|&c| rt.engine.node(c).name == name);
            Handle::from_node(rt, found)
        })
    }

    /// Follows a `/`-separated path of local names down the tree.
    ///
    /// When several children match a step, each is tried in document order
    /// until the rest of the path matches below one of them.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn find_elem_by_path(self, path: &str) -> Result<Self> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Handle::from_node(rt, find_by_path(&rt.engine, id, path))
        })
    }

    /// Returns the first child element with local name `name` in namespace
    /// `uri` (empty for no namespace).
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn find_elem(self, name: &str, uri: &str) -> Result<Self> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let engine = &rt.engine;
            let found = child_elements(engine, id)
                .find(|&c| engine.node(c).name == name && uri_of(engine, c) == uri);
            Handle::from_node(rt, found)
        })
    }

    /// Returns the nearest preceding sibling element, or an empty handle.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn prev_sibling_elem(self) -> Result<Self> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let mut cur = rt.engine.prev_sibling(id);
            while let Some(n) = cur.filter(|&n| rt.engine.kind(n) != RawKind::Element) {
                cur = rt.engine.prev_sibling(n);
            }
            Handle::from_node(rt, cur)
        })
    }

    /// Returns the nearest following sibling element, or an empty handle.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn next_sibling_elem(self) -> Result<Self> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            let mut cur = rt.engine.next_sibling(id);
            while let Some(n) = cur.filter(|&n| rt.engine.kind(n) != RawKind::Element) {
                cur = rt.engine.next_sibling(n);
            }
            Handle::from_node(rt, cur)
        })
    }
}

impl Handle<Element, Mutable> {
    /// Renames the element, keeping its namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`](crate::Error::InvalidOperation)
    /// if `name` is not an `NCName`.
    pub fn set_name(self, name: &str) -> Result<()> {
        check_nc_name(name)?;
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            rt.engine.set_name(id, name);
            Ok(())
        })
    }

    /// Sets the attribute `name`, creating it if needed. A prefix must be
    /// declared in scope.
    ///
    /// # Errors
    ///
    /// As for [`AttributeMap::set`].
    pub fn set_attr(self, name: &str, value: &str) -> Result<()> {
        self.attrs().set(name, value).map(drop)
    }

    /// Sets the attribute `name` in namespace `uri`, creating it (and a
    /// declaration for `uri` if none is in scope) if needed.
    ///
    /// # Errors
    ///
    /// As for [`AttributeMap::set_ns`].
    pub fn set_attr_ns(self, name: &str, uri: &str, value: &str) -> Result<()> {
        self.attrs().set_ns(name, uri, value).map(drop)
    }
}
