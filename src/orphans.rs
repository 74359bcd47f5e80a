//! Per-document bookkeeping of objects that belong to a document without
//! being reachable from its tree.
//!
//! Two kinds of entries are tracked:
//!
//! - nodes created unlinked through the document (`make_element` and
//!   friends), which the document must free if they are never inserted;
//! - namespace declarations whose element was freed while some node still
//!   pointed at them. The engine keeps such a declaration alive until its
//!   last reference goes away, and the document frees whatever is left when
//!   it is dropped.
//!
//! Entries are removed as soon as the engine reports the object freed, so a
//! list never names a dead object.

use std::collections::HashMap;

use tracing::trace;

use crate::engine::{Engine, NodeId, NsId};
use crate::registry::Registry;

/// The orphans of one document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct OrphanList {
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) namespaces: Vec<NsId>,
}

impl OrphanList {
    fn len(&self) -> usize {
        self.nodes.len() + self.namespaces.len()
    }
}

/// Orphan lists keyed by document node.
#[derive(Debug, Default)]
pub(crate) struct OrphanTracker {
    lists: HashMap<NodeId, OrphanList>,
}

impl OrphanTracker {
    /// Records an unlinked node created through `doc`.
    pub(crate) fn add_node(&mut self, doc: NodeId, id: NodeId) {
        let list = self.lists.entry(doc).or_default();
        if !list.nodes.contains(&id) {
            list.nodes.push(id);
        }
    }

    /// Records a namespace declaration that outlived its element.
    pub(crate) fn add_ns(&mut self, doc: NodeId, id: NsId) {
        let list = self.lists.entry(doc).or_default();
        if !list.namespaces.contains(&id) {
            list.namespaces.push(id);
        }
    }

    pub(crate) fn forget_node(&mut self, doc: NodeId, id: NodeId) {
        if let Some(list) = self.lists.get_mut(&doc) {
            list.nodes.retain(|&n| n != id);
        }
    }

    pub(crate) fn forget_ns(&mut self, doc: NodeId, id: NsId) {
        if let Some(list) = self.lists.get_mut(&doc) {
            list.namespaces.retain(|&n| n != id);
        }
    }

    /// Returns the number of tracked orphans of `doc`.
    pub(crate) fn count(&self, doc: NodeId) -> usize {
        self.lists.get(&doc).map_or(0, OrphanList::len)
    }

    /// Removes and returns the list of `doc`.
    pub(crate) fn take(&mut self, doc: NodeId) -> OrphanList {
        self.lists.remove(&doc).unwrap_or_default()
    }

    pub(crate) fn remove_document(&mut self, doc: NodeId) {
        self.lists.remove(&doc);
    }
}

/// Frees a document together with every orphan it still owns.
///
/// Tracked nodes are freed only if they are still unlinked members of `doc`;
/// a node that was inserted somewhere (or moved to another document) belongs
/// to that tree now. Namespace declarations left over after the tree is gone
/// are freed last.
pub(crate) fn release_document(engine: &mut Engine<Registry>, doc: NodeId) {
    let list = engine.observer_mut().orphans.take(doc);
    let mut swept = 0usize;
    for id in list.nodes {
        if engine.is_live(id) && engine.parent(id).is_none() && engine.doc_of(id) == Some(doc) {
            engine.free_node(id);
            swept += 1;
        }
    }
    engine.free_document(doc);
    for ns in list.namespaces {
        if engine.is_ns_live(ns) {
            engine.free_ns(ns);
            swept += 1;
        }
    }
    trace!(doc = doc.into_raw(), swept, "released document orphans");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Engine<Registry>, NodeId) {
        let mut engine = Engine::new(Registry::default());
        let Ok(doc) = engine.new_document("1.0") else {
            panic!("document allocation failed");
        };
        (engine, doc)
    }

    #[test]
    fn test_add_and_forget() {
        let (mut engine, doc) = setup();
        let Ok(e) = engine.new_element(doc, "e") else {
            panic!("element allocation failed");
        };
        let tracker = &mut engine.observer_mut().orphans;
        tracker.add_node(doc, e);
        tracker.add_node(doc, e);
        assert_eq!(tracker.count(doc), 1);
        tracker.forget_node(doc, e);
        assert_eq!(tracker.count(doc), 0);
    }

    #[test]
    fn test_freed_node_leaves_the_list() {
        let (mut engine, doc) = setup();
        let Ok(e) = engine.new_element(doc, "e") else {
            panic!("element allocation failed");
        };
        engine.observer_mut().orphans.add_node(doc, e);
        engine.free_node(e);
        assert_eq!(engine.observer().orphans.count(doc), 0);
    }

    #[test]
    fn test_release_sweeps_unlinked_orphans_only() {
        let (mut engine, doc) = setup();
        let (Ok(root), Ok(loose), Ok(placed)) = (
            engine.new_element(doc, "root"),
            engine.new_element(doc, "loose"),
            engine.new_element(doc, "placed"),
        ) else {
            panic!("element allocation failed");
        };
        let _ = engine.add_child(doc, root);
        engine.observer_mut().orphans.add_node(doc, loose);
        engine.observer_mut().orphans.add_node(doc, placed);
        let _ = engine.add_child(root, placed);

        release_document(&mut engine, doc);
        assert_eq!(engine.live_nodes(), 0);
        assert_eq!(engine.observer().live_wrappers(), 0);
    }

    #[test]
    fn test_orphaned_namespace_is_tracked_until_freed() {
        let (mut engine, doc) = setup();
        let (Ok(owner), Ok(user)) = (engine.new_element(doc, "owner"), engine.new_element(doc, "user"))
        else {
            panic!("element allocation failed");
        };
        let Ok(Some(ns)) = engine.new_ns(owner, "urn:p", Some("p")) else {
            panic!("declaration failed");
        };
        engine.set_ns(user, Some(ns));
        engine.free_node(owner);

        assert_eq!(engine.observer().orphans.count(doc), 1);
        assert!(engine.is_ns_live(ns));

        engine.set_ns(user, None);
        assert_eq!(engine.observer().orphans.count(doc), 0);
        assert!(!engine.is_ns_live(ns));
    }

    #[test]
    fn test_release_frees_lingering_namespaces() {
        let (mut engine, doc) = setup();
        let Ok(other) = engine.new_document("1.0") else {
            panic!("document allocation failed");
        };
        let (Ok(owner), Ok(user)) = (engine.new_element(doc, "owner"), engine.new_element(other, "user"))
        else {
            panic!("element allocation failed");
        };
        let Ok(Some(ns)) = engine.new_ns(owner, "urn:p", Some("p")) else {
            panic!("declaration failed");
        };
        // A node of another document still points at the declaration.
        engine.set_ns(user, Some(ns));
        engine.free_node(owner);

        release_document(&mut engine, doc);
        assert!(!engine.is_ns_live(ns));
        assert!(engine.is_live(user));
    }
}
