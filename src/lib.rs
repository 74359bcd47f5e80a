//! # oxdom
//!
//! A typed object layer over an arena XML tree. Every engine node has
//! exactly one wrapper for as long as it lives; client code reaches wrappers
//! through small `Copy` handles that are re-validated on every use, moves
//! and copies subtrees between documents, and relies on the layer to keep
//! every namespace reference resolvable after each mutation.
//!
//! ## Quick Start
//!
//! ```
//! use oxdom::Document;
//!
//! let mut doc = Document::parse_str(r#"<root xmlns:x="urn:x"><x:item/></root>"#)?;
//! let root = doc.root_mut()?;
//! let item = root.find_first_elem()?;
//! assert_eq!(item.tag()?, "{urn:x}item");
//!
//! // The same node always comes back as the same handle.
//! assert_eq!(root.children().front()?, item);
//!
//! // Moving a node keeps its identity and its namespace.
//! let mut other = Document::new()?;
//! let target = other.reset_root("target")?;
//! target.children().push_back_adopt(item)?;
//! assert_eq!(item.uri()?, "urn:x");
//! assert!(root.children().is_empty()?);
//! # Ok::<(), oxdom::Error>(())
//! ```

pub mod attributes;
pub mod children;
pub mod document;
pub mod encoding;
pub mod error;
pub mod handle;
pub mod iter;
pub mod node;
pub mod parser;
pub mod runtime;
pub mod serial;
pub mod util;
pub mod xpath;

mod attribute;
mod content;
mod element;
mod engine;
mod namespace;
mod orphans;
mod registry;
mod transfer;
mod xmlns;

// Re-export primary types at the crate root for convenience.
pub use attributes::AttributeMap;
pub use children::ChildList;
pub use document::{Document, DocumentId};
pub use error::{Error, Result};
pub use handle::{
    AttributeHandle, ChildHandle, CommentHandle, ConstAttributeHandle, ConstChildHandle,
    ConstCommentHandle, ConstElementHandle, ConstInstructionHandle, ConstNodeHandle,
    ConstTextHandle, ConstXmlnsHandle, ElementHandle, Handle, InstructionHandle, NodeHandle,
    TextHandle, XmlnsHandle,
};
pub use iter::{ElementIter, SiblingIter};
pub use node::NodeKind;
pub use parser::ParseOptions;
pub use serial::SerializeOptions;
