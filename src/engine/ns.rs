//! Namespace declarations, lookup and reconciliation.
//!
//! Lookup follows libxml2's `xmlSearchNs` / `xmlSearchNsByHref`: walk from
//! the node through its ancestors and inspect the declarations of every
//! element on the way. The `xml` prefix always resolves to the document's
//! implicit binding.

use super::{Engine, EngineError, NodeId, NodeObserver, NsId, RawKind, RawNs};

/// The namespace URI permanently bound to the `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Upper bound on generated-prefix attempts during reconciliation.
const MAX_PREFIX_ATTEMPTS: u32 = 1000;

/// Iterator over the declarations of one element, in declaration order.
pub struct NsDefs<'a, H> {
    engine: &'a Engine<H>,
    next: Option<NsId>,
}

impl<H: NodeObserver> Iterator for NsDefs<'_, H> {
    type Item = NsId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.engine.ns(current).next;
        Some(current)
    }
}

impl<H: NodeObserver> Engine<H> {
    /// Returns the declarations made on `elem`.
    pub fn ns_defs(&self, elem: NodeId) -> NsDefs<'_, H> {
        NsDefs {
            engine: self,
            next: self.node(elem).ns_def,
        }
    }

    /// Returns the document's implicit `xml` binding.
    #[must_use]
    pub fn xml_ns(&self, doc: NodeId) -> Option<NsId> {
        self.doc_info(doc).and_then(|info| info.xml_ns)
    }

    /// Declares `prefix` → `href` on `elem`.
    ///
    /// Returns `None` without side effects if `elem` already declares
    /// `prefix` or if `prefix` is the reserved `xml`.
    pub fn new_ns(
        &mut self,
        elem: NodeId,
        href: &str,
        prefix: Option<&str>,
    ) -> Result<Option<NsId>, EngineError> {
        if self.kind(elem) != RawKind::Element {
            return Err(EngineError::Unsupported {
                op: "new_ns",
                kind: self.kind(elem),
            });
        }
        if prefix == Some("xml") {
            return Ok(None);
        }
        if self
            .ns_defs(elem)
            .any(|ns| self.ns(ns).prefix.as_deref() == prefix)
        {
            return Ok(None);
        }

        let last = self.ns_defs(elem).last();
        let id = self.alloc_ns(RawNs {
            prefix: prefix.map(str::to_string),
            href: href.to_string(),
            next: None,
            owner: Some(elem),
            doc: self.node(elem).doc,
            refs: 0,
            user_data: None,
            detached: false,
            freed: false,
        })?;
        match last {
            Some(last) => self.ns_mut(last).next = Some(id),
            None => self.node_mut(elem).ns_def = Some(id),
        }
        Ok(Some(id))
    }

    /// Points `node`'s name at `ns`, maintaining reference counts.
    ///
    /// A detached declaration whose last reference goes away is freed.
    pub fn set_ns(&mut self, node: NodeId, ns: Option<NsId>) {
        let old = self.node(node).ns;
        if old == ns {
            return;
        }
        if let Some(new) = ns {
            self.ns_mut(new).refs += 1;
        }
        self.node_mut(node).ns = ns;
        if let Some(old) = old.filter(|&old| self.is_ns_live(old)) {
            let raw = self.ns_mut(old);
            raw.refs = raw.refs.saturating_sub(1);
            if raw.refs == 0 && raw.detached {
                self.free_ns(old);
            }
        }
    }

    /// Removes declarations on `elem` that repeat a (prefix, URI) binding
    /// already visible from its parent element. Nodes of the subtree that
    /// used a removed declaration are pointed at the inherited one. Returns
    /// the number of declarations removed.
    pub fn drop_redundant_ns(&mut self, elem: NodeId) -> usize {
        let Some(parent) = self
            .parent(elem)
            .filter(|&p| self.kind(p) == RawKind::Element)
        else {
            return 0;
        };
        let defs: Vec<NsId> = self.ns_defs(elem).collect();
        let mut dropped = 0;
        for ns in defs {
            let Some(inherited) = self
                .search_ns(parent, self.ns(ns).prefix.as_deref())
                .filter(|&found| self.ns(found).href == self.ns(ns).href)
            else {
                continue;
            };
            let users: Vec<NodeId> = std::iter::once(elem)
                .chain(self.descendants(elem))
                .filter(|&id| self.kind(id) == RawKind::Element)
                .flat_map(|id| std::iter::once(id).chain(self.properties(id)))
                .filter(|&id| self.node(id).ns == Some(ns))
                .collect();
            for id in users {
                self.set_ns(id, Some(inherited));
            }
            self.unlink_ns(elem, ns);
            self.free_ns(ns);
            dropped += 1;
        }
        dropped
    }

    fn unlink_ns(&mut self, elem: NodeId, ns: NsId) {
        let next = self.ns(ns).next;
        match self.ns_defs(elem).find(|&d| self.ns(d).next == Some(ns)) {
            Some(prev) => self.ns_mut(prev).next = next,
            None => self.node_mut(elem).ns_def = next,
        }
        let raw = self.ns_mut(ns);
        raw.next = None;
        raw.owner = None;
    }

    /// Finds the declaration of `prefix` in scope at `node`.
    ///
    /// `None` looks up the default namespace.
    #[must_use]
    pub fn search_ns(&self, node: NodeId, prefix: Option<&str>) -> Option<NsId> {
        if prefix == Some("xml") {
            return self.doc_of(node).and_then(|doc| self.xml_ns(doc));
        }
        self.ancestors(node)
            .filter(|&id| self.kind(id) == RawKind::Element)
            .find_map(|id| {
                self.ns_defs(id)
                    .find(|&ns| self.ns(ns).prefix.as_deref() == prefix)
            })
    }

    /// Finds a declaration of `href` in scope at `node` whose prefix is not
    /// shadowed by a nearer declaration.
    ///
    /// For attributes only prefixed declarations qualify, because an
    /// unprefixed attribute is never in a namespace.
    #[must_use]
    pub fn search_ns_by_href(&self, node: NodeId, href: &str) -> Option<NsId> {
        if href == XML_NAMESPACE {
            return self.doc_of(node).and_then(|doc| self.xml_ns(doc));
        }
        let is_attr = self.kind(node) == RawKind::Attribute;
        self.ancestors(node)
            .filter(|&id| self.kind(id) == RawKind::Element)
            .find_map(|id| {
                self.ns_defs(id).find(|&ns| {
                    let raw = self.ns(ns);
                    raw.href == href
                        && !(is_attr && raw.prefix.is_none())
                        && self.search_ns(node, raw.prefix.as_deref()) == Some(ns)
                })
            })
    }

    /// Returns `true` if `node`'s namespace pointer resolves to a
    /// declaration visible from `node`.
    #[must_use]
    pub fn ns_is_visible(&self, node: NodeId) -> bool {
        match self.node(node).ns {
            None => true,
            Some(ns) => {
                self.is_ns_live(ns) && self.search_ns(node, self.ns(ns).prefix.as_deref()) == Some(ns)
            }
        }
    }

    /// Rebinds every namespace pointer in the subtree rooted at `tree` that
    /// no longer resolves to a visible declaration.
    ///
    /// An equivalent visible declaration is preferred (same prefix and URI,
    /// then any unshadowed declaration of the URI). When none exists the
    /// binding is redeclared on `tree`, keeping the old prefix if it is free
    /// there and otherwise generating `prefixN`. Default bindings are
    /// redeclared as `default` (then `defaultN`). Returns the number of
    /// declarations created.
    pub fn reconcile_ns(&mut self, tree: NodeId) -> Result<usize, EngineError> {
        if self.kind(tree) != RawKind::Element {
            return Err(EngineError::Unsupported {
                op: "reconcile_ns",
                kind: self.kind(tree),
            });
        }

        let mut elements = vec![tree];
        elements.extend(
            self.descendants(tree)
                .filter(|&id| self.kind(id) == RawKind::Element),
        );

        let mut declared = 0;
        for elem in elements {
            let mut targets = vec![elem];
            targets.extend(self.properties(elem));
            for target in targets {
                let Some(ns) = self.node(target).ns else {
                    continue;
                };
                if self.ns_is_visible(target) {
                    continue;
                }
                let prefix = self.ns(ns).prefix.clone();
                let href = self.ns(ns).href.clone();
                let replacement = match self.find_equivalent(target, prefix.as_deref(), &href) {
                    Some(found) => found,
                    None => {
                        declared += 1;
                        self.declare_reconciled(tree, prefix.as_deref(), &href)?
                    }
                };
                self.set_ns(target, Some(replacement));
            }
        }
        Ok(declared)
    }

    fn find_equivalent(&self, node: NodeId, prefix: Option<&str>, href: &str) -> Option<NsId> {
        if let Some(found) = self.search_ns(node, prefix) {
            let raw = self.ns(found);
            let usable = self.kind(node) != RawKind::Attribute || raw.prefix.is_some();
            if raw.href == href && usable {
                return Some(found);
            }
        }
        self.search_ns_by_href(node, href)
    }

    /// Declares `href` on `tree` under `prefix`, or under a generated prefix
    /// if `prefix` is already in scope there.
    pub(crate) fn declare_reconciled(
        &mut self,
        tree: NodeId,
        prefix: Option<&str>,
        href: &str,
    ) -> Result<NsId, EngineError> {
        if href == XML_NAMESPACE {
            if let Some(xml) = self.doc_of(tree).and_then(|doc| self.xml_ns(doc)) {
                return Ok(xml);
            }
        }
        let base = prefix.unwrap_or("default");
        let mut candidate = base.to_string();
        for counter in 1..=MAX_PREFIX_ATTEMPTS {
            if self.search_ns(tree, Some(&candidate)).is_none() {
                if let Some(ns) = self.new_ns(tree, href, Some(&candidate))? {
                    return Ok(ns);
                }
            }
            candidate = format!("{base}{counter}");
        }
        Err(EngineError::PrefixExhausted(href.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::engine_with_doc;
    use super::*;

    fn declare(engine: &mut Engine<impl NodeObserver>, elem: NodeId, p: Option<&str>, href: &str) -> NsId {
        let Ok(Some(ns)) = engine.new_ns(elem, href, p) else {
            panic!("declaration failed");
        };
        ns
    }

    #[test]
    fn test_new_ns_rejects_duplicate_prefix() {
        let (mut engine, doc) = engine_with_doc();
        let Ok(e) = engine.new_element(doc, "e") else {
            panic!("element allocation failed");
        };
        let first = declare(&mut engine, e, Some("x"), "urn:a");
        assert_eq!(engine.new_ns(e, "urn:b", Some("x")), Ok(None));
        assert_eq!(engine.new_ns(e, "urn:b", Some("xml")), Ok(None));
        assert_eq!(engine.ns_defs(e).collect::<Vec<_>>(), vec![first]);
    }

    #[test]
    fn test_search_ns_shadowing() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(root), Ok(a), Ok(b)) = (
            engine.new_element(doc, "root"),
            engine.new_element(doc, "a"),
            engine.new_element(doc, "b"),
        ) else {
            panic!("element allocation failed");
        };
        let _ = engine.add_child(doc, root);
        let _ = engine.add_child(root, a);
        let _ = engine.add_child(a, b);
        let u1 = declare(&mut engine, root, Some("x"), "U1");
        let u2 = declare(&mut engine, a, Some("x"), "U2");

        assert_eq!(engine.search_ns(b, Some("x")), Some(u2));
        assert_eq!(engine.search_ns(root, Some("x")), Some(u1));
        assert_eq!(engine.search_ns(b, Some("y")), None);
        assert_eq!(engine.search_ns(b, Some("xml")), engine.xml_ns(doc));
        // U1 is bound to a shadowed prefix at b.
        assert_eq!(engine.search_ns_by_href(b, "U1"), None);
        assert_eq!(engine.search_ns_by_href(b, "U2"), Some(u2));
    }

    #[test]
    fn test_attribute_skips_default_namespace_by_href() {
        let (mut engine, doc) = engine_with_doc();
        let Ok(e) = engine.new_element(doc, "e") else {
            panic!("element allocation failed");
        };
        let _ = declare(&mut engine, e, None, "urn:d");
        let Ok(attr) = engine.new_attribute(e, None, "k", "v") else {
            panic!("attribute allocation failed");
        };
        assert!(engine.search_ns_by_href(e, "urn:d").is_some());
        assert_eq!(engine.search_ns_by_href(attr, "urn:d"), None);
    }

    #[test]
    fn test_reconcile_after_move_redeclares() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(src), Ok(dst), Ok(child)) = (
            engine.new_element(doc, "src"),
            engine.new_element(doc, "dst"),
            engine.new_element(doc, "child"),
        ) else {
            panic!("element allocation failed");
        };
        let ns = declare(&mut engine, src, Some("p"), "urn:p");
        let _ = engine.add_child(src, child);
        engine.set_ns(child, Some(ns));

        let _ = engine.add_child(dst, child);
        assert!(!engine.ns_is_visible(child));
        assert_eq!(engine.reconcile_ns(child), Ok(1));

        let rebound = engine.node(child).ns;
        assert!(rebound.is_some_and(|n| n != ns));
        assert!(engine.ns_is_visible(child));
        let Some(rebound) = rebound else { unreachable!() };
        assert_eq!(engine.ns(rebound).prefix.as_deref(), Some("p"));
        assert_eq!(engine.ns(rebound).href, "urn:p");
        assert_eq!(engine.ns(ns).refs, 0);
    }

    #[test]
    fn test_reconcile_prefers_visible_equivalent() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(src), Ok(dst), Ok(child)) = (
            engine.new_element(doc, "src"),
            engine.new_element(doc, "dst"),
            engine.new_element(doc, "child"),
        ) else {
            panic!("element allocation failed");
        };
        let old = declare(&mut engine, src, Some("p"), "urn:p");
        let target = declare(&mut engine, dst, Some("q"), "urn:p");
        let _ = engine.add_child(src, child);
        engine.set_ns(child, Some(old));
        let _ = engine.add_child(dst, child);

        assert_eq!(engine.reconcile_ns(child), Ok(0));
        assert_eq!(engine.node(child).ns, Some(target));
    }

    #[test]
    fn test_reconcile_generates_prefix_when_taken() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(src), Ok(dst), Ok(child)) = (
            engine.new_element(doc, "src"),
            engine.new_element(doc, "dst"),
            engine.new_element(doc, "child"),
        ) else {
            panic!("element allocation failed");
        };
        let old = declare(&mut engine, src, Some("p"), "urn:one");
        let _ = declare(&mut engine, dst, Some("p"), "urn:two");
        let _ = engine.add_child(src, child);
        engine.set_ns(child, Some(old));
        let _ = engine.add_child(dst, child);

        assert_eq!(engine.reconcile_ns(child), Ok(1));
        let Some(rebound) = engine.node(child).ns else {
            panic!("namespace pointer lost");
        };
        assert_eq!(engine.ns(rebound).prefix.as_deref(), Some("p1"));
        assert_eq!(engine.ns(rebound).href, "urn:one");
    }

    #[test]
    fn test_default_namespace_is_redeclared_prefixed() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(src), Ok(dst), Ok(child)) = (
            engine.new_element(doc, "src"),
            engine.new_element(doc, "dst"),
            engine.new_element(doc, "child"),
        ) else {
            panic!("element allocation failed");
        };
        let old = declare(&mut engine, src, None, "urn:d");
        let _ = engine.add_child(src, child);
        engine.set_ns(child, Some(old));
        let _ = engine.add_child(dst, child);

        assert_eq!(engine.reconcile_ns(child), Ok(1));
        let Some(rebound) = engine.node(child).ns else {
            panic!("namespace pointer lost");
        };
        assert_eq!(engine.ns(rebound).prefix.as_deref(), Some("default"));
    }

    #[test]
    fn test_freeing_owner_orphans_referenced_namespace() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(owner), Ok(user)) = (
            engine.new_element(doc, "owner"),
            engine.new_element(doc, "user"),
        ) else {
            panic!("element allocation failed");
        };
        let ns = declare(&mut engine, owner, Some("p"), "urn:p");
        let _ = engine.add_child(owner, user);
        engine.set_ns(user, Some(ns));
        engine.unlink(user);

        engine.free_node(owner);
        assert!(engine.is_ns_live(ns));
        assert!(engine.is_ns_detached(ns));
        assert_eq!(engine.observer().ns_orphaned, vec![ns]);

        engine.set_ns(user, None);
        assert!(!engine.is_ns_live(ns));
        assert_eq!(engine.observer().ns_destructed, vec![ns]);
    }

    #[test]
    fn test_redundant_declarations_are_dropped() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(outer), Ok(inner), Ok(leaf)) = (
            engine.new_element(doc, "outer"),
            engine.new_element(doc, "inner"),
            engine.new_element(doc, "leaf"),
        ) else {
            panic!("element allocation failed");
        };
        let p = declare(&mut engine, outer, Some("p"), "urn:p");
        let _ = engine.add_child(outer, inner);
        let _ = engine.add_child(inner, leaf);
        let dup = declare(&mut engine, inner, Some("p"), "urn:p");
        let q = declare(&mut engine, inner, Some("q"), "urn:q");
        engine.set_ns(inner, Some(dup));
        engine.set_ns(leaf, Some(dup));
        let Ok(attr) = engine.new_attribute(leaf, Some(dup), "k", "v") else {
            panic!("attribute allocation failed");
        };

        assert_eq!(engine.drop_redundant_ns(inner), 1);
        assert!(!engine.is_ns_live(dup));
        assert_eq!(engine.ns_defs(inner).collect::<Vec<_>>(), vec![q]);
        assert_eq!(engine.node(inner).ns, Some(p));
        assert_eq!(engine.node(leaf).ns, Some(p));
        assert_eq!(engine.node(attr).ns, Some(p));
        assert_eq!(engine.ns(p).refs, 3);
    }

    #[test]
    fn test_declaration_with_another_uri_is_kept() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(outer), Ok(inner)) = (engine.new_element(doc, "outer"), engine.new_element(doc, "inner"))
        else {
            panic!("element allocation failed");
        };
        declare(&mut engine, outer, Some("p"), "urn:p");
        let _ = engine.add_child(outer, inner);
        let own = declare(&mut engine, inner, Some("p"), "urn:other");
        engine.set_ns(inner, Some(own));

        assert_eq!(engine.drop_redundant_ns(inner), 0);
        assert_eq!(engine.node(inner).ns, Some(own));
        assert_eq!(engine.drop_redundant_ns(outer), 0);
    }

    #[test]
    fn test_reconcile_rejects_non_element() {
        let (mut engine, doc) = engine_with_doc();
        assert!(engine.reconcile_ns(doc).is_err());
    }
}
