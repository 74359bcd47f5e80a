//! Namespace resolution and reconciliation tests.
//!
//! After every mutation each element and attribute must point at a
//! declaration that is visible from it, so moving nodes between scopes and
//! documents has to keep URIs stable and produce re-parseable output.

#![allow(clippy::unwrap_used)]

use oxdom::{Document, ElementHandle, Error};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Serializes `elem` and parses the result back, returning the new root's
/// namespace URI.
fn reparsed_uri(elem: ElementHandle) -> String {
    let text = elem.to_xml_string().unwrap();
    let doc = Document::parse_str(&text).unwrap();
    doc.root().unwrap().uri().unwrap()
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[test]
fn declare_never_duplicates_a_prefix() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let root = doc.root_mut().unwrap();

    let (first, created) = root.declare_xmlns("p", "urn:p").unwrap();
    assert!(created);
    let (again, created) = root.declare_xmlns("p", "urn:other").unwrap();
    assert!(!created);
    assert_eq!(again, first);
    assert_eq!(again.uri().unwrap(), "urn:p");
    assert_eq!(root.xmlns_declarations().unwrap().count(), 1);

    assert!(matches!(root.set_xmlns("p", "urn:other"), Err(Error::InvalidOperation(_))));
    let bound = root.set_xmlns("p", "urn:p").unwrap();
    assert_eq!(bound, first);
    assert_eq!(root.qname().unwrap(), "p:r");
}

#[test]
fn reserved_prefixes_are_guarded() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let root = doc.root_mut().unwrap();

    let (xml, created) = root.declare_xmlns("xml", XML_NS).unwrap();
    assert!(!created);
    assert!(xml.owner().unwrap().is_null());
    assert!(matches!(root.declare_xmlns("xml", "urn:x"), Err(Error::InvalidOperation(_))));
    assert!(matches!(root.declare_xmlns("xmlns", "urn:x"), Err(Error::InvalidOperation(_))));
    assert!(matches!(root.declare_xmlns("p", XML_NS), Err(Error::InvalidOperation(_))));
    assert!(matches!(root.declare_xmlns("1p", "urn:x"), Err(Error::InvalidOperation(_))));
}

#[test]
fn set_uri_reuses_or_generates_a_binding() {
    let mut doc = Document::parse_str(r#"<r xmlns:p="urn:p"><a/><b/></r>"#).unwrap();
    let root = doc.root_mut().unwrap();
    let a = root.find_first_elem().unwrap();
    let b = root.find_last_elem().unwrap();

    a.set_uri("urn:p").unwrap();
    assert_eq!(a.qname().unwrap(), "p:a");
    assert!(a.xmlns_declarations().unwrap().is_end());

    b.set_uri("urn:new").unwrap();
    let prefix = b.prefix().unwrap();
    assert!(prefix.starts_with("ns"), "{prefix}");
    assert_eq!(b.xmlns().unwrap().owner().unwrap(), b);

    b.set_uri("").unwrap();
    assert_eq!(b.uri().unwrap(), "");
    assert_eq!(b.qname().unwrap(), "b");
}

#[test]
fn generated_prefixes_skip_names_in_scope() {
    let mut doc = Document::parse_str(r#"<r xmlns:ns1="urn:taken"><a/></r>"#).unwrap();
    let root = doc.root_mut().unwrap();
    let a = root.find_first_elem().unwrap();
    a.set_uri("urn:fresh").unwrap();
    assert_ne!(a.prefix().unwrap(), "ns1");
    assert_eq!(reparsed_uri(a), "urn:fresh");
}

#[test]
fn default_declaration_leaves_existing_children_alone() {
    let mut doc = Document::parse_str("<r><a/></r>").unwrap();
    let root = doc.root_mut().unwrap();
    let a = root.find_first_elem().unwrap();

    root.declare_xmlns("", "urn:d").unwrap();
    assert_eq!(root.uri().unwrap(), "");
    assert_eq!(a.uri().unwrap(), "");
}

// ---------------------------------------------------------------------------
// Reconciliation after moves
// ---------------------------------------------------------------------------

#[test]
fn shadowed_prefix_keeps_the_inner_uri_after_a_move() {
    let mut doc =
        Document::parse_str(r#"<r xmlns:p="urn:1"><a xmlns:p="urn:2"><p:x/></a></r>"#).unwrap();
    let root = doc.root_mut().unwrap();
    let x = root.find_elem_by_path("a/x").unwrap();
    assert_eq!(x.uri().unwrap(), "urn:2");

    root.children().push_back_adopt(x).unwrap();
    assert_eq!(x.uri().unwrap(), "urn:2");
    assert_eq!(x.xmlns().unwrap().owner().unwrap(), x);
    assert_eq!(root.find_xmlns_by_prefix("p").unwrap().uri().unwrap(), "urn:1");
    assert_eq!(reparsed_uri(x), "urn:2");
}

#[test]
fn moved_node_reuses_an_equivalent_binding_at_the_destination() {
    let mut doc =
        Document::parse_str(r#"<r xmlns:p="urn:p"><a xmlns:q="urn:p"><q:x/></a></r>"#).unwrap();
    let root = doc.root_mut().unwrap();
    let x = root.find_elem_by_path("a/x").unwrap();

    root.children().push_back_adopt(x).unwrap();
    assert_eq!(x.qname().unwrap(), "p:x");
    assert!(x.xmlns_declarations().unwrap().is_end());
}

#[test]
fn default_namespace_is_redeclared_with_a_prefix() {
    let mut doc = Document::parse_str(r#"<r><a xmlns="urn:d"><b/></a></r>"#).unwrap();
    let root = doc.root_mut().unwrap();
    let b = root.find_elem_by_path("a/b").unwrap();
    assert_eq!(b.uri().unwrap(), "urn:d");

    root.children().push_back_adopt(b).unwrap();
    assert_eq!(b.uri().unwrap(), "urn:d");
    assert_eq!(b.prefix().unwrap(), "default");
    assert_eq!(reparsed_uri(b), "urn:d");
}

#[test]
fn attribute_bindings_follow_their_element_across_documents() {
    let mut src =
        Document::parse_str(r#"<r xmlns:p="urn:p"><e p:id="1" plain="2"/></r>"#).unwrap();
    let e = src.root_mut().unwrap().find_first_elem().unwrap();

    let mut dst = Document::new().unwrap();
    let target = dst.reset_root("t").unwrap();
    target.children().push_back_adopt(e).unwrap();

    assert_eq!(e.document_id().unwrap(), dst.id());
    assert_eq!(e.attr_ns("id", "urn:p").unwrap().as_deref(), Some("1"));
    let decl = e.attrs().front().unwrap().xmlns().unwrap();
    assert_eq!(decl.document_id().unwrap(), dst.id());
    assert_eq!(decl.owner().unwrap(), e);

    let reparsed = Document::parse_str(&dst.to_xml_string().unwrap()).unwrap();
    let t = reparsed.root().unwrap();
    let e2 = t.find_first_elem().unwrap();
    assert_eq!(e2.attr_ns("id", "urn:p").unwrap().as_deref(), Some("1"));
}

#[test]
fn reconcile_is_idempotent() {
    let mut doc = Document::parse_str(r#"<r xmlns:p="urn:p"><p:a><p:b/></p:a></r>"#).unwrap();
    let root = doc.root_mut().unwrap();
    assert_eq!(root.reconcile_xmlns().unwrap(), 0);

    let a = root.find_first_elem().unwrap();
    let mut other = Document::new().unwrap();
    let t = other.reset_root("t").unwrap();
    t.children().push_back_adopt(a).unwrap();
    assert_eq!(t.reconcile_xmlns().unwrap(), 0);
    assert_eq!(a.find_first_elem().unwrap().uri().unwrap(), "urn:p");
}
