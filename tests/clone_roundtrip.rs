//! Property tests: a deep copy of any generated subtree, placed in another
//! document, matches its source node for node while sharing no wrapper
//! with it.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use oxdom::handle::{Element, ReadOnly};
use oxdom::{ConstChildHandle, ConstElementHandle, Document, ElementHandle, Handle};

#[derive(Debug, Clone)]
enum Tree {
    Element {
        name: String,
        uri: String,
        attrs: Vec<(String, String)>,
        children: Vec<Tree>,
    },
    Text(String),
    Comment(String),
}

fn element(children: impl Strategy<Value = Vec<Tree>>) -> impl Strategy<Value = Tree> {
    (
        prop::sample::select(vec!["a", "b", "item"]),
        prop::sample::select(vec!["", "urn:x", "urn:y"]),
        prop::collection::btree_map("k[0-3]", "[a-z]{0,4}", 0..3),
        children,
    )
        .prop_map(|(name, uri, attrs, children)| Tree::Element {
            name: name.to_string(),
            uri: uri.to_string(),
            attrs: attrs.into_iter().collect(),
            children,
        })
}

fn tree() -> impl Strategy<Value = Tree> {
    let leaf = prop_oneof![
        "[a-z ]{1,8}".prop_map(Tree::Text),
        "[a-z]{0,6}".prop_map(Tree::Comment),
    ];
    leaf.prop_recursive(4, 48, 4, |inner| element(prop::collection::vec(inner, 0..4)))
}

fn build(parent: ElementHandle, tree: &Tree) {
    let children = parent.children();
    match tree {
        Tree::Element {
            name,
            uri,
            attrs,
            children: nested,
        } => {
            let elem = children.push_back_element_ns(name, uri).unwrap();
            for (key, value) in attrs {
                elem.set_attr(key, value).unwrap();
            }
            for child in nested {
                build(elem, child);
            }
        }
        Tree::Text(text) => {
            children.push_back_text(text).unwrap();
        }
        Tree::Comment(text) => {
            children.push_back_comment(text).unwrap();
        }
    }
}

fn attributes(elem: ConstElementHandle) -> Vec<(String, String, String)> {
    elem.attrs()
        .iter()
        .unwrap()
        .map(|a| (a.name().unwrap(), a.uri().unwrap(), a.value().unwrap()))
        .collect()
}

fn assert_same(src: ConstChildHandle, copy: ConstChildHandle) -> Result<(), TestCaseError> {
    prop_assert_ne!(src, copy);
    prop_assert_eq!(src.kind().unwrap(), copy.kind().unwrap());
    prop_assert_eq!(src.name().unwrap(), copy.name().unwrap());

    let (a, b): (Handle<Element, ReadOnly>, Handle<Element, ReadOnly>) =
        (src.dynamic_cast(), copy.dynamic_cast());
    if a.is_null() {
        prop_assert_eq!(src.content().unwrap(), copy.content().unwrap());
        return Ok(());
    }
    prop_assert_eq!(a.uri().unwrap(), b.uri().unwrap());
    prop_assert_eq!(attributes(a), attributes(b));

    let left: Vec<ConstChildHandle> = a.children().iter().unwrap().collect();
    let right: Vec<ConstChildHandle> = b.children().iter().unwrap().collect();
    prop_assert_eq!(left.len(), right.len());
    for (x, y) in left.into_iter().zip(right) {
        assert_same(x, y)?;
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn clone_matches_source(tree in element(prop::collection::vec(tree(), 0..4))) {
        let mut src = Document::new().unwrap();
        let src_root = src.reset_root("src").unwrap();
        build(src_root, &tree);
        let original = src_root.children().front().unwrap();

        let mut dst = Document::new().unwrap();
        let dst_root = dst.reset_root("dst").unwrap();
        let copy = dst_root.children().push_back_clone(original).unwrap();

        assert_same(original.as_const(), copy.as_const())?;
        prop_assert_eq!(copy.document_id().unwrap(), dst.id());

        // The copy survives its source.
        let before = copy.to_xml_string().unwrap();
        drop(src);
        prop_assert_eq!(copy.to_xml_string().unwrap(), before);
    }
}
