//! Clone and adopt tests, within a document and across documents.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;

use oxdom::handle::Element;
use oxdom::{Document, Error, Handle, NodeKind, SerializeOptions};

fn body(doc: &Document) -> String {
    doc.to_xml_string_with(&SerializeOptions::default().declaration(false))
        .unwrap()
}

// ---------------------------------------------------------------------------
// Clone
// ---------------------------------------------------------------------------

#[test]
fn clone_is_independent_of_its_source() {
    let mut src = Document::parse_str(r#"<r><a x="1"><b/></a></r>"#).unwrap();
    let a = src.root_mut().unwrap().find_first_elem().unwrap();

    let mut dst = Document::new().unwrap();
    let t = dst.reset_root("t").unwrap();
    let copy: Handle<Element> = t.children().push_back_clone(a).unwrap().dynamic_cast();

    assert_ne!(copy, a);
    a.set_name("z").unwrap();
    a.set_attr("x", "changed").unwrap();
    a.children().clear().unwrap();

    assert_eq!(copy.name().unwrap(), "a");
    assert_eq!(copy.attr("x").unwrap().as_deref(), Some("1"));
    assert_eq!(body(&dst), "<t><a x=\"1\"><b/></a></t>\n");
}

#[test]
fn clone_within_the_same_parent() {
    let mut doc = Document::parse_str("<r><a>text</a></r>").unwrap();
    let root = doc.root_mut().unwrap();
    let a = root.find_first_elem().unwrap();

    root.children().push_back_clone(a).unwrap();
    root.children().push_front_clone(a.as_const()).unwrap();
    assert_eq!(body(&doc), "<r><a>text</a><a>text</a><a>text</a></r>\n");
    assert_eq!(a.prev_sibling_elem().unwrap().content().unwrap(), "text");
}

#[test]
fn clone_redeclares_namespaces_from_outside_the_subtree() {
    let mut src = Document::parse_str(r#"<r xmlns:p="urn:p"><p:a><p:b p:k="v"/></p:a></r>"#)
        .unwrap();
    let a = src.root_mut().unwrap().find_first_elem().unwrap();

    let mut dst = Document::new().unwrap();
    let t = dst.reset_root("t").unwrap();
    let copy = t.children().push_back_clone(a).unwrap().dynamic_cast::<Element>();

    assert_eq!(copy.uri().unwrap(), "urn:p");
    assert_eq!(copy.xmlns().unwrap().owner().unwrap(), copy);
    assert_eq!(
        body(&dst),
        "<t><p:a xmlns:p=\"urn:p\"><p:b p:k=\"v\"/></p:a></t>\n"
    );
}

#[test]
fn clone_reuses_bindings_already_in_scope_at_the_destination() {
    let mut src = Document::parse_str(r#"<r xmlns:p="urn:p"><p:a p:k="v"><p:b/></p:a></r>"#).unwrap();
    let a = src.root_mut().unwrap().find_first_elem().unwrap();

    let mut dst = Document::parse_str(r#"<t xmlns:p="urn:p"><u xmlns:p="urn:other"/></t>"#).unwrap();
    let t = dst.root_mut().unwrap();
    let same = t.children().push_back_clone(a).unwrap().dynamic_cast::<Element>();
    assert!(same.xmlns_declarations().unwrap().is_end());
    assert_eq!(same.xmlns().unwrap(), t.find_xmlns_by_prefix("p").unwrap());

    // Under a different binding of the prefix the copy keeps its own.
    let u = t.find_first_elem().unwrap();
    let own = u.children().push_back_clone(a).unwrap().dynamic_cast::<Element>();
    assert_eq!(own.xmlns().unwrap().owner().unwrap(), own);

    assert_eq!(
        body(&dst),
        "<t xmlns:p=\"urn:p\"><u xmlns:p=\"urn:other\"><p:a xmlns:p=\"urn:p\" p:k=\"v\"><p:b/></p:a></u><p:a p:k=\"v\"><p:b/></p:a></t>\n"
    );
}

#[test]
fn clone_of_text_merges_at_the_destination() {
    let mut doc = Document::parse_str("<r>left<a>right</a></r>").unwrap();
    let root = doc.root_mut().unwrap();
    let inner = root.find_first_elem().unwrap().children().front().unwrap();

    let placed = root.children().push_front_clone(inner).unwrap();
    assert_eq!(placed.kind().unwrap(), NodeKind::Text);
    assert_eq!(placed.content().unwrap(), "rightleft");
}

#[test]
fn whole_document_copy() {
    let src = Document::parse_str(r#"<?xml version="1.0" encoding="UTF-8"?><!--c--><r a="1"/>"#)
        .unwrap();
    let copy = src.try_clone().unwrap();
    assert_ne!(copy.id(), src.id());
    assert_eq!(copy.to_xml_string().unwrap(), src.to_xml_string().unwrap());
    assert_ne!(copy.root().unwrap(), src.root().unwrap());
}

// ---------------------------------------------------------------------------
// Adopt
// ---------------------------------------------------------------------------

#[test]
fn adopt_across_documents_is_exclusive() {
    let mut one = Document::parse_str("<one><item/><keep/></one>").unwrap();
    let mut two = Document::parse_str("<two/>").unwrap();
    let item = one.root_mut().unwrap().find_first_elem().unwrap();
    let two_root = two.root_mut().unwrap();

    two_root.children().push_back_adopt(item).unwrap();
    assert_eq!(body(&one), "<one><keep/></one>\n");
    assert_eq!(body(&two), "<two><item/></two>\n");
    assert_eq!(item.document_id().unwrap(), two.id());

    // The node goes with its new document.
    drop(two);
    assert!(matches!(item.name(), Err(Error::DanglingHandle)));
    assert_eq!(one.root().unwrap().children().len().unwrap(), 1);
}

#[test]
fn made_nodes_are_tracked_until_placed() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let loose = doc.make_element("loose").unwrap();
    let text = doc.make_text("t").unwrap();
    let cdata = doc.make_cdata("raw").unwrap();
    assert!(cdata.is_cdata().unwrap());
    assert_eq!(doc.orphan_count().unwrap(), 3);
    assert!(loose.is_orphan().unwrap());

    let root = doc.root_mut().unwrap();
    root.children().push_back_adopt(loose).unwrap();
    assert_eq!(doc.orphan_count().unwrap(), 2);
    assert!(!loose.is_orphan().unwrap());

    doc.clear().unwrap();
    assert_eq!(doc.orphan_count().unwrap(), 0);
    assert!(!text.is_alive());
    assert!(!cdata.is_alive());
    assert!(doc.is_empty().unwrap());
}

#[test]
fn orphan_from_another_document_can_be_adopted() {
    let mut src = Document::new().unwrap();
    let loose = src.make_element("loose").unwrap();
    loose.set_attr("k", "v").unwrap();

    let mut dst = Document::parse_str("<r/>").unwrap();
    dst.root_mut().unwrap().children().push_back_adopt(loose).unwrap();
    assert_eq!(src.orphan_count().unwrap(), 0);

    drop(src);
    assert_eq!(loose.attr("k").unwrap().as_deref(), Some("v"));
    assert_eq!(body(&dst), "<r><loose k=\"v\"/></r>\n");
}

// ---------------------------------------------------------------------------
// Root replacement
// ---------------------------------------------------------------------------

#[test]
fn reset_root_variants() {
    let mut doc = Document::parse_str("<old><child/></old>").unwrap();
    let child = doc.root_mut().unwrap().find_first_elem().unwrap();

    let adopted = doc.reset_root_adopt(child).unwrap();
    assert_eq!(adopted, child);
    assert_eq!(body(&doc), "<child/>\n");

    let other = Document::parse_str(r#"<p:src xmlns:p="urn:p"><p:x/></p:src>"#).unwrap();
    let cloned = doc.reset_root_clone(other.root().unwrap()).unwrap();
    assert!(!child.is_alive());
    assert_eq!(cloned.uri().unwrap(), "urn:p");

    let fresh = doc.reset_root_ns("q:new", "urn:q").unwrap();
    assert_eq!(fresh.tag().unwrap(), "{urn:q}new");
    assert_eq!(body(&doc), "<q:new xmlns:q=\"urn:q\"/>\n");
    assert!(matches!(doc.reset_root_ns("q:bad", ""), Err(Error::InvalidOperation(_))));
    assert_eq!(doc.root().unwrap(), fresh);
}

#[test]
fn failed_root_binding_keeps_the_old_root() {
    let mut doc = Document::parse_str(r#"<old a="1"><child/></old>"#).unwrap();
    let old = doc.root_mut().unwrap();
    let before = oxdom::runtime::live_nodes().unwrap();

    let xml_uri = "http://www.w3.org/XML/1998/namespace";
    assert!(matches!(doc.reset_root_ns("p:new", xml_uri), Err(Error::InvalidOperation(_))));
    assert!(matches!(doc.reset_root_ns("xml:new", "urn:x"), Err(Error::InvalidOperation(_))));

    assert_eq!(doc.root().unwrap(), old);
    assert_eq!(oxdom::runtime::live_nodes().unwrap(), before);
    assert_eq!(body(&doc), "<old a=\"1\"><child/></old>\n");
}
