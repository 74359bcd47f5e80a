//! The attribute map of an element.
//!
//! Attributes are keyed by local name and namespace URI; the prefix is only
//! how the binding happens to be spelled. A qualified name such as `p:a` is
//! resolved through the declarations in scope at the owner element before
//! it is compared. Creating an attribute in a namespace by URI reuses a
//! prefixed declaration of that URI in scope, or declares one with a
//! generated prefix on the owner element.

use std::fmt;

use crate::element::uri_of;
use crate::engine::{Engine, NodeId, NsId};
use crate::error::{Error, Result};
use crate::handle::{Access, Attribute, Element, Handle, Mutable};
use crate::iter::SiblingIter;
use crate::namespace;
use crate::registry::Registry;
use crate::runtime::{self, Runtime};
use crate::util::qname::{check_nc_name, check_qname, check_uri, split_qname};

const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

fn declaration_error() -> Error {
    Error::invalid("namespace declarations are made with declare_xmlns, not as attributes")
}

/// How a caller names an attribute.
#[derive(Debug, Clone, Copy)]
enum AttrName<'n> {
    /// `local` or `prefix:local`.
    Qualified(&'n str),
    /// A local name and a namespace URI, empty for none.
    Expanded(&'n str, &'n str),
}

/// An attribute name resolved at its owner element.
struct Key<'n> {
    local: &'n str,
    uri: String,
    /// The declaration a qualified name was spelled with.
    ns: Option<NsId>,
}

impl<'n> AttrName<'n> {
    /// Resolves the name at `elem`. A prefix must be declared in scope.
    fn resolve(self, engine: &Engine<Registry>, elem: NodeId) -> Result<Key<'n>> {
        let qname = match self {
            Self::Expanded(local, uri) => {
                return Ok(Key {
                    local,
                    uri: uri.to_string(),
                    ns: None,
                })
            }
            Self::Qualified(qname) => qname,
        };
        let (Some(prefix), local) = split_qname(qname) else {
            return Ok(Key {
                local: qname,
                uri: String::new(),
                ns: None,
            });
        };
        check_qname(qname)?;
        if prefix == "xmlns" {
            return Err(declaration_error());
        }
        let ns = engine
            .search_ns(elem, Some(prefix))
            .ok_or_else(|| Error::invalid(format!("undeclared namespace prefix {prefix:?}")))?;
        Ok(Key {
            local,
            uri: engine.ns(ns).href.clone(),
            ns: Some(ns),
        })
    }
}

/// Finds the attribute of `elem` with local name `name` in namespace `uri`
/// (empty for none).
fn find_attribute(engine: &Engine<Registry>, elem: NodeId, name: &str, uri: &str) -> Option<NodeId> {
    engine
        .properties(elem)
        .find(|&a| engine.node(a).name == name && uri_of(engine, a) == uri)
}

fn lookup(engine: &Engine<Registry>, elem: NodeId, name: AttrName<'_>) -> Result<Option<NodeId>> {
    let key = name.resolve(engine, elem)?;
    Ok(find_attribute(engine, elem, key.local, &key.uri))
}

fn check_attribute(key: &Key<'_>) -> Result<()> {
    check_nc_name(key.local)?;
    if key.local == "xmlns" || key.uri == XMLNS_NAMESPACE {
        return Err(declaration_error());
    }
    if !key.uri.is_empty() {
        check_uri(&key.uri)?;
    }
    Ok(())
}

fn create_attribute(
    engine: &mut Engine<Registry>,
    elem: NodeId,
    key: &Key<'_>,
    value: &str,
) -> Result<NodeId> {
    let attr = engine.new_attribute(elem, key.ns, key.local, value)?;
    if key.ns.is_none() && !key.uri.is_empty() {
        if let Err(e) = namespace::set_uri(engine, attr, elem, &key.uri) {
            engine.free_node(attr);
            return Err(e);
        }
    }
    Ok(attr)
}

/// The attributes of one element.
pub struct AttributeMap<A: Access = Mutable> {
    owner: Handle<Element, A>,
}

impl<A: Access> Clone for AttributeMap<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Access> Copy for AttributeMap<A> {}

impl<A: Access> fmt::Debug for AttributeMap<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeMap").field(&self.owner).finish()
    }
}

impl<A: Access> AttributeMap<A> {
    pub(crate) fn new(owner: Handle<Element, A>) -> Self {
        Self { owner }
    }

    /// Returns the number of attributes.
    ///
    /// # Errors
    ///
    /// Fails if the owner element is gone.
    pub fn len(&self) -> Result<usize> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            Ok(rt.engine.properties(elem).count())
        })
    }

    /// Returns `true` if the element has no attributes.
    ///
    /// # Errors
    ///
    /// Fails if the owner element is gone.
    pub fn is_empty(&self) -> Result<bool> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            Ok(rt.engine.node(elem).properties.is_none())
        })
    }

    /// Returns a position at the first attribute.
    ///
    /// # Errors
    ///
    /// Fails if the owner element is gone.
    pub fn begin(&self) -> Result<SiblingIter<Attribute, A>> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            Handle::from_node(rt, rt.engine.node(elem).properties).map(SiblingIter::from)
        })
    }

    /// Returns the end position.
    #[must_use]
    pub fn end(&self) -> SiblingIter<Attribute, A> {
        SiblingIter::end()
    }

    /// Same as [`begin`](Self::begin).
    ///
    /// # Errors
    ///
    /// Fails if the owner element is gone.
    pub fn iter(&self) -> Result<SiblingIter<Attribute, A>> {
        self.begin()
    }

    /// Returns the first attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if there are no attributes.
    pub fn front(&self) -> Result<Handle<Attribute, A>> {
        let first = self.begin()?.get();
        if first.is_null() {
            return Err(Error::invalid("front() called on an empty attribute map"));
        }
        Ok(first)
    }

    /// Returns the value of `name`. A prefixed name is resolved through
    /// the declarations in scope at the owner; an unprefixed name is in no
    /// namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for an undeclared prefix. Fails
    /// if the owner element is gone.
    pub fn get(&self, name: &str) -> Result<Option<String>> {
        self.value_of(AttrName::Qualified(name))
    }

    /// Returns the value of `name` in namespace `uri`.
    ///
    /// # Errors
    ///
    /// Fails if the owner element is gone.
    pub fn get_ns(&self, name: &str, uri: &str) -> Result<Option<String>> {
        self.value_of(AttrName::Expanded(name, uri))
    }

    /// Returns the position of `name`, or the end. Prefixes resolve as for
    /// [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub fn find(&self, name: &str) -> Result<SiblingIter<Attribute, A>> {
        self.position_of(AttrName::Qualified(name))
    }

    /// Returns the position of `name` in namespace `uri`, or the end.
    ///
    /// # Errors
    ///
    /// Fails if the owner element is gone.
    pub fn find_ns(&self, name: &str, uri: &str) -> Result<SiblingIter<Attribute, A>> {
        self.position_of(AttrName::Expanded(name, uri))
    }

    fn value_of(&self, name: AttrName<'_>) -> Result<Option<String>> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            Ok(lookup(&rt.engine, elem, name)?.map(|attr| rt.engine.node(attr).content.clone()))
        })
    }

    fn position_of(&self, name: AttrName<'_>) -> Result<SiblingIter<Attribute, A>> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            let found = lookup(&rt.engine, elem, name)?;
            Handle::from_node(rt, found).map(SiblingIter::from)
        })
    }
}

impl AttributeMap<Mutable> {
    /// Adds `name` = `value` unless it exists. Returns the attribute and
    /// whether it was created; an existing value is kept. A prefixed name is
    /// bound to the declaration of that prefix in scope at the owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for a malformed name, for
    /// `xmlns` or `xmlns:*`, or for an undeclared prefix.
    pub fn insert(&self, name: &str, value: &str) -> Result<(Handle<Attribute>, bool)> {
        self.place(AttrName::Qualified(name), value, false)
    }

    /// Adds `name` = `value` in namespace `uri` unless it exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for a malformed name or `uri`,
    /// or for the `xmlns` namespace.
    pub fn insert_ns(&self, name: &str, uri: &str, value: &str) -> Result<(Handle<Attribute>, bool)> {
        self.place(AttrName::Expanded(name, uri), value, false)
    }

    /// Sets `name` to `value`, creating it if needed, and returns it.
    ///
    /// # Errors
    ///
    /// As for [`insert`](Self::insert).
    pub fn update(&self, name: &str, value: &str) -> Result<Handle<Attribute>> {
        self.place(AttrName::Qualified(name), value, true).map(|(attr, _)| attr)
    }

    /// Sets `name` in namespace `uri` to `value`, creating it if needed.
    ///
    /// # Errors
    ///
    /// As for [`insert_ns`](Self::insert_ns).
    pub fn update_ns(&self, name: &str, uri: &str, value: &str) -> Result<Handle<Attribute>> {
        self.place(AttrName::Expanded(name, uri), value, true).map(|(attr, _)| attr)
    }

    /// Sets `name` to `value`.
    ///
    /// # Errors
    ///
    /// As for [`insert`](Self::insert).
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        self.update(name, value).map(drop)
    }

    /// Sets `name` in namespace `uri` to `value`.
    ///
    /// # Errors
    ///
    /// As for [`insert_ns`](Self::insert_ns).
    pub fn set_ns(&self, name: &str, uri: &str, value: &str) -> Result<()> {
        self.update_ns(name, uri, value).map(drop)
    }

    fn place(&self, name: AttrName<'_>, value: &str, overwrite: bool) -> Result<(Handle<Attribute>, bool)> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            let key = name.resolve(&rt.engine, elem)?;
            check_attribute(&key)?;
            let (attr, created) = match find_attribute(&rt.engine, elem, key.local, &key.uri) {
                Some(existing) => {
                    if overwrite {
                        rt.engine.set_content(existing, value)?;
                    }
                    (existing, false)
                }
                None => (create_attribute(&mut rt.engine, elem, &key, value)?, true),
            };
            Ok((Handle::from_node(rt, Some(attr))?, created))
        })
    }

    /// Frees the attribute at `pos` and returns the following position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for the end position or an
    /// attribute of another element.
    pub fn erase(&self, pos: SiblingIter<Attribute>) -> Result<SiblingIter<Attribute>> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            let next = erase_one(rt, elem, pos.get())?;
            Handle::from_node(rt, next).map(SiblingIter::from)
        })
    }

    /// Frees every attribute in `[first, last)` and returns `last`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if either position belongs to
    /// another element or `last` does not follow `first`. Nothing is freed
    /// in that case.
    pub fn erase_range(
        &self,
        first: SiblingIter<Attribute>,
        last: SiblingIter<Attribute>,
    ) -> Result<SiblingIter<Attribute>> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            let mut ends = [None, None];
            for (slot, pos) in ends.iter_mut().zip([first.get(), last.get()]) {
                if pos.is_some() {
                    let id = pos.node_id(rt)?;
                    check_owned(&rt.engine, elem, id)?;
                    *slot = Some(id);
                }
            }
            let [start, stop] = ends;
            let mut doomed = Vec::new();
            let mut cur = start;
            while cur != stop {
                let Some(id) = cur else {
                    return Err(Error::invalid("the range end does not follow its start"));
                };
                doomed.push(id);
                cur = rt.engine.next_sibling(id);
            }
            for id in doomed {
                rt.engine.free_node(id);
            }
            Ok(last)
        })
    }

    /// Frees `name`, resolving a prefix as [`get`](AttributeMap::get)
    /// does. Returns the number of attributes removed (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for an undeclared prefix. Fails
    /// if the owner element is gone.
    pub fn remove(&self, name: &str) -> Result<usize> {
        self.remove_named(AttrName::Qualified(name))
    }

    /// Frees `name` in namespace `uri`. Returns the number of attributes
    /// removed (0 or 1).
    ///
    /// # Errors
    ///
    /// Fails if the owner element is gone.
    pub fn remove_ns(&self, name: &str, uri: &str) -> Result<usize> {
        self.remove_named(AttrName::Expanded(name, uri))
    }

    fn remove_named(&self, name: AttrName<'_>) -> Result<usize> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            Ok(match lookup(&rt.engine, elem, name)? {
                Some(attr) => {
                    rt.engine.free_node(attr);
                    1
                }
                None => 0,
            })
        })
    }

    /// Frees every attribute.
    ///
    /// # Errors
    ///
    /// Fails if the owner element is gone.
    pub fn clear(&self) -> Result<()> {
        runtime::with(|rt| {
            let elem = self.owner.node_id(rt)?;
            let attrs: Vec<NodeId> = rt.engine.properties(elem).collect();
            for attr in attrs {
                rt.engine.free_node(attr);
            }
            Ok(())
        })
    }
}

fn check_owned(engine: &Engine<Registry>, elem: NodeId, attr: NodeId) -> Result<()> {
    if engine.parent(attr) == Some(elem) {
        Ok(())
    } else {
        Err(Error::invalid("the position does not belong to this attribute map"))
    }
}

fn erase_one(rt: &mut Runtime, elem: NodeId, pos: Handle<Attribute>) -> Result<Option<NodeId>> {
    if pos.is_null() {
        return Err(Error::invalid("the position to erase must not be the end"));
    }
    let id = pos.node_id(rt)?;
    check_owned(&rt.engine, elem, id)?;
    let next = rt.engine.next_sibling(id);
    rt.engine.free_node(id);
    Ok(next)
}
