//! Wrapper identity tests.
//!
//! Every engine node has exactly one wrapper for as long as it lives, so
//! every path that reaches a node must hand back an equal handle, and
//! freeing nodes must release their wrappers.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use oxdom::handle::{ChildNode, Element, Node};
use oxdom::{runtime, Document, Handle};

// ---------------------------------------------------------------------------
// One wrapper per node
// ---------------------------------------------------------------------------

#[test]
fn every_path_to_a_node_yields_the_same_handle() {
    let mut doc = Document::parse_str("<root><a/>text<b><c/></b></root>").unwrap();
    let root = doc.root_mut().unwrap();

    let via_find = root.find_elem_by_name("b").unwrap();
    let via_last = root.find_last_elem().unwrap();
    let via_back = root.children().back().unwrap();
    let via_parent = root.find_elem_by_path("b/c").unwrap().parent().unwrap();
    let via_iter = root.child_elements().unwrap().nth(1).unwrap();

    assert_eq!(via_find, via_last);
    assert_eq!(via_find, via_back);
    assert_eq!(via_find, via_parent);
    assert_eq!(via_find, via_iter);
}

#[test]
fn handles_compare_equal_across_kinds_and_access() {
    let mut doc = Document::parse_str("<root><a/></root>").unwrap();
    let root = doc.root_mut().unwrap();
    let a = root.find_first_elem().unwrap();

    let as_child: Handle<ChildNode> = a.static_cast();
    let as_node: Handle<Node> = a.static_cast();
    assert_eq!(a, as_child);
    assert_eq!(as_child, as_node);
    assert_eq!(a.as_const(), a);
    assert_eq!(doc.root().unwrap(), root);
}

#[test]
fn handles_hash_by_identity() {
    let mut doc = Document::parse_str("<root><a/><a/><a/></root>").unwrap();
    let root = doc.root_mut().unwrap();

    let mut seen = HashSet::new();
    for _ in 0..3 {
        for child in root.children().iter().unwrap() {
            seen.insert(child);
        }
    }
    assert_eq!(seen.len(), 3);
}

#[test]
fn wrapper_count_follows_the_node_count() {
    let before = runtime::live_wrappers().unwrap();
    let mut doc = Document::parse_str(r#"<root x="1"><a/>t<!--c--></root>"#).unwrap();
    // The implicit xml binding, root, x, a, t and c.
    assert_eq!(runtime::live_wrappers().unwrap(), before + 6);

    let root = doc.root_mut().unwrap();
    root.children().clear().unwrap();
    assert_eq!(runtime::live_wrappers().unwrap(), before + 3);

    drop(doc);
    assert_eq!(runtime::live_wrappers().unwrap(), before);
}

#[test]
fn namespace_declarations_are_wrapped_once() {
    let mut doc = Document::parse_str(r#"<root xmlns:p="urn:p"><p:a/><p:b/></root>"#).unwrap();
    let root = doc.root_mut().unwrap();
    let a = root.find_first_elem().unwrap();
    let b = root.find_last_elem().unwrap();

    let decl = root.xmlns_declarations().unwrap().get();
    assert_eq!(a.xmlns().unwrap(), decl);
    assert_eq!(b.xmlns().unwrap(), decl);
    assert_eq!(root.find_xmlns_by_prefix("p").unwrap(), decl);
    assert_eq!(root.find_xmlns_by_uri("urn:p").unwrap(), decl);
}

// ---------------------------------------------------------------------------
// Identity survives mutation
// ---------------------------------------------------------------------------

#[test]
fn moved_node_keeps_its_handle() {
    let mut doc = Document::parse_str("<root><a><x/></a><b/></root>").unwrap();
    let root = doc.root_mut().unwrap();
    let x = root.find_elem_by_path("a/x").unwrap();
    let b = root.find_last_elem().unwrap();

    let moved = b.children().push_back_adopt(x).unwrap();
    assert_eq!(moved, x);
    assert_eq!(x.parent().unwrap(), b);
    assert_eq!(b.find_first_elem().unwrap(), x);
}

#[test]
fn rename_through_one_handle_is_seen_through_every_other() {
    let mut doc = Document::parse_str("<root><a/></root>").unwrap();
    let root = doc.root_mut().unwrap();
    let a = root.find_first_elem().unwrap();
    let same: Handle<Element> = root.children().front().unwrap().dynamic_cast();

    same.set_name("renamed").unwrap();
    assert_eq!(a.name().unwrap(), "renamed");
}

#[test]
fn freed_slots_never_alias_new_nodes() {
    let mut doc = Document::parse_str("<root><a/></root>").unwrap();
    let root = doc.root_mut().unwrap();
    let a = root.find_first_elem().unwrap();
    a.delete().unwrap();

    let fresh = root.children().push_back_element("fresh").unwrap();
    assert_ne!(fresh, a);
    assert!(!a.is_alive());
    assert!(fresh.is_alive());
}
