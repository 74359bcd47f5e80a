//! Serialization boundary.
//!
//! Turns engine nodes back into XML text: whole documents (with an optional
//! declaration and pretty-printing) and single subtrees for the
//! `to_xml_string` family of wrapper methods.

pub mod xml;

pub(crate) use xml::{document_to_string, escape_attr, node_to_string};
pub use xml::SerializeOptions;
