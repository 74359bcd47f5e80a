//! Deep copies of nodes and documents.
//!
//! A copied subtree is self-contained: namespace pointers are resolved
//! against declarations copied along with the subtree, and bindings that
//! came from outside it are redeclared on the copy's top node (the
//! `xmlStaticCopyNode` strategy).

use super::{Engine, EngineError, NodeId, NodeObserver, NsId, RawKind, RawNode, XML_NAMESPACE};

impl<H: NodeObserver> Engine<H> {
    /// Deep-copies `src` (attributes, declarations and children) into
    /// `doc`. The copy is unlinked.
    pub fn copy_node(&mut self, src: NodeId, doc: NodeId) -> Result<NodeId, EngineError> {
        match self.kind(src) {
            RawKind::Document | RawKind::Attribute => Err(EngineError::Unsupported {
                op: "copy_node",
                kind: self.kind(src),
            }),
            _ => self.copy_tree(src, doc),
        }
    }

    /// Copies a whole document, metadata included.
    pub fn copy_document(&mut self, src: NodeId) -> Result<NodeId, EngineError> {
        let Some(info) = self.doc_info(src).cloned() else {
            return Err(EngineError::Unsupported {
                op: "copy_document",
                kind: self.kind(src),
            });
        };
        let doc = self.new_document(&info.version)?;
        if let Some(new_info) = self.doc_info_mut(doc) {
            new_info.encoding = info.encoding;
            new_info.standalone = info.standalone;
            new_info.prefix_counter = info.prefix_counter;
        }
        let children: Vec<NodeId> = self.children(src).collect();
        for child in children {
            let copy = self.copy_tree(child, doc)?;
            self.link_last(doc, copy);
        }
        Ok(doc)
    }

    fn copy_tree(&mut self, src: NodeId, doc: NodeId) -> Result<NodeId, EngineError> {
        let mut top = None;
        let mut stack = vec![(src, None)];
        while let Some((src, parent)) = stack.pop() {
            let copy = match self.copy_one(src, doc, parent, top) {
                Ok(copy) => copy,
                Err(e) => {
                    if let Some(top) = top {
                        self.free_node(top);
                    }
                    return Err(e);
                }
            };
            top.get_or_insert(copy);
            if self.kind(copy) == RawKind::Element {
                let children: Vec<NodeId> = self.children(src).collect();
                stack.extend(children.into_iter().rev().map(|c| (c, Some(copy))));
            }
        }
        top.ok_or(EngineError::BadLink("nothing to copy"))
    }

    /// Copies one node, appending it to `parent`. Elements bring their
    /// declarations and attributes along.
    fn copy_one(
        &mut self,
        src: NodeId,
        doc: NodeId,
        parent: Option<NodeId>,
        root: Option<NodeId>,
    ) -> Result<NodeId, EngineError> {
        let (kind, name, content) = {
            let raw = self.node(src);
            (raw.kind, raw.name.clone(), raw.content.clone())
        };
        let copy = self.alloc(RawNode::new(kind, Some(doc), name, content))?;
        if let Some(parent) = parent {
            self.link_last(parent, copy);
        }
        if kind != RawKind::Element {
            return Ok(copy);
        }
        let parts = self.copy_element_parts(src, copy, root.unwrap_or(copy));
        if parts.is_err() && parent.is_none() {
            self.free_node(copy);
        }
        parts.map(|()| copy)
    }

    fn copy_element_parts(&mut self, src: NodeId, copy: NodeId, root: NodeId) -> Result<(), EngineError> {
        let defs: Vec<(Option<String>, String)> = self
            .ns_defs(src)
            .map(|ns| (self.ns(ns).prefix.clone(), self.ns(ns).href.clone()))
            .collect();
        for (prefix, href) in defs {
            self.new_ns(copy, &href, prefix.as_deref())?;
        }
        if let Some(ns) = self.node(src).ns {
            let target = self.resolve_copied_ns(copy, root, ns)?;
            self.set_ns(copy, Some(target));
        }

        let attrs: Vec<NodeId> = self.properties(src).collect();
        for attr in attrs {
            let (name, value, ns) = {
                let raw = self.node(attr);
                (raw.name.clone(), raw.content.clone(), raw.ns)
            };
            let target = match ns {
                Some(ns) => Some(self.resolve_copied_ns(copy, root, ns)?),
                None => None,
            };
            self.new_attribute(copy, target, &name, &value)?;
        }
        Ok(())
    }

    /// Finds the copy's counterpart of the source binding `ns`, redeclaring
    /// it on `root` if it was declared outside the copied subtree.
    fn resolve_copied_ns(
        &mut self,
        node: NodeId,
        root: NodeId,
        ns: NsId,
    ) -> Result<NsId, EngineError> {
        let prefix = self.ns(ns).prefix.clone();
        let href = self.ns(ns).href.clone();
        if href == XML_NAMESPACE {
            if let Some(xml) = self.doc_of(node).and_then(|doc| self.xml_ns(doc)) {
                return Ok(xml);
            }
        }
        if let Some(found) = self.search_ns(node, prefix.as_deref()) {
            if self.ns(found).href == href {
                return Ok(found);
            }
        }
        if let Some(same) = self
            .ns_defs(root)
            .find(|&d| self.ns(d).href == href && self.ns(d).prefix == prefix)
        {
            return Ok(same);
        }
        match self.new_ns(root, &href, prefix.as_deref())? {
            Some(declared) => Ok(declared),
            None => self.declare_reconciled(root, prefix.as_deref(), &href),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::engine_with_doc;
    use super::*;

    #[test]
    fn test_copy_is_independent() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(a), Ok(b)) = (engine.new_element(doc, "a"), engine.new_element(doc, "b")) else {
            panic!("element allocation failed");
        };
        let _ = engine.add_child(a, b);
        let _ = engine.new_attribute(a, None, "x", "1");

        let Ok(copy) = engine.copy_node(a, doc) else {
            panic!("copy failed");
        };
        engine.set_name(a, "z");

        assert_ne!(copy, a);
        assert_eq!(engine.node(copy).name, "a");
        assert_eq!(engine.parent(copy), None);
        let Some(child) = engine.first_child(copy) else {
            panic!("child not copied");
        };
        assert_ne!(child, b);
        assert_eq!(engine.node(child).name, "b");
        let attrs: Vec<NodeId> = engine.properties(copy).collect();
        assert_eq!(attrs.len(), 1);
        assert_eq!(engine.node(attrs[0]).content, "1");
    }

    #[test]
    fn test_copy_redeclares_external_namespace() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(outer), Ok(inner)) = (
            engine.new_element(doc, "outer"),
            engine.new_element(doc, "inner"),
        ) else {
            panic!("element allocation failed");
        };
        let Ok(Some(ns)) = engine.new_ns(outer, "urn:p", Some("p")) else {
            panic!("declaration failed");
        };
        let _ = engine.add_child(outer, inner);
        engine.set_ns(inner, Some(ns));

        let Ok(copy) = engine.copy_node(inner, doc) else {
            panic!("copy failed");
        };
        let Some(copied_ns) = engine.node(copy).ns else {
            panic!("namespace lost");
        };
        assert_ne!(copied_ns, ns);
        assert_eq!(engine.ns(copied_ns).owner, Some(copy));
        assert_eq!(engine.ns(copied_ns).href, "urn:p");
        assert!(engine.ns_is_visible(copy));
    }

    #[test]
    fn test_copy_internal_namespace_is_remapped() {
        let (mut engine, doc) = engine_with_doc();
        let (Ok(a), Ok(b)) = (engine.new_element(doc, "a"), engine.new_element(doc, "b")) else {
            panic!("element allocation failed");
        };
        let Ok(Some(ns)) = engine.new_ns(a, "urn:p", Some("p")) else {
            panic!("declaration failed");
        };
        let _ = engine.add_child(a, b);
        engine.set_ns(b, Some(ns));

        let Ok(copy) = engine.copy_node(a, doc) else {
            panic!("copy failed");
        };
        let Some(copy_b) = engine.first_child(copy) else {
            panic!("child not copied");
        };
        let copy_defs: Vec<NsId> = engine.ns_defs(copy).collect();
        assert_eq!(copy_defs.len(), 1);
        assert_eq!(engine.node(copy_b).ns, Some(copy_defs[0]));
        assert_eq!(engine.ns(ns).refs, 1);
    }

    #[test]
    fn test_copy_document_keeps_metadata() {
        let (mut engine, doc) = engine_with_doc();
        if let Some(info) = engine.doc_info_mut(doc) {
            info.encoding = Some("UTF-8".to_string());
        }
        let Ok(root) = engine.new_element(doc, "root") else {
            panic!("element allocation failed");
        };
        let _ = engine.add_child(doc, root);

        let Ok(copy) = engine.copy_document(doc) else {
            panic!("copy failed");
        };
        assert_ne!(copy, doc);
        assert_eq!(
            engine.doc_info(copy).and_then(|i| i.encoding.clone()),
            Some("UTF-8".to_string())
        );
        let Some(copied_root) = engine.root_element(copy) else {
            panic!("root not copied");
        };
        assert_eq!(engine.doc_of(copied_root), Some(copy));
        assert_eq!(engine.node(copied_root).name, "root");
    }

    #[test]
    fn test_deep_tree_copies_without_recursion() {
        let (mut engine, doc) = engine_with_doc();
        let Ok(top) = engine.new_element(doc, "d") else {
            panic!("element allocation failed");
        };
        let mut parent = top;
        for _ in 0..100_000 {
            let Ok(child) = engine.new_element(doc, "d") else {
                panic!("element allocation failed");
            };
            engine.link_last(parent, child);
            parent = child;
        }

        let Ok(copy) = engine.copy_node(top, doc) else {
            panic!("copy failed");
        };
        assert_eq!(engine.descendants(copy).count(), 100_000);
        assert_eq!(engine.live_nodes(), 200_003);
        engine.free_node(copy);
        assert_eq!(engine.live_nodes(), 100_002);
    }
}
