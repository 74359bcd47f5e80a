//! Query boundary.
//!
//! The layer does not interpret `XPath`. A caller-supplied [`XPathEngine`]
//! compiles the expression text of an [`XPath`] and evaluates it against an
//! [`XPathContext`]: the document, an optional context node and the
//! prefix bindings registered on the expression. The result comes back as
//! an [`XPathValue`] whose node-set members are ordinary read-only handles.
//!
//! ```
//! use oxdom::xpath::{XPath, XPathContext, XPathEngine, XPathError, XPathValue};
//! use oxdom::{Document, handle::Node};
//!
//! /// Selects the root element for `/*` and nothing else.
//! struct RootOnly;
//!
//! impl XPathEngine for RootOnly {
//!     type Compiled = ();
//!
//!     fn compile(&self, expr: &str) -> Result<(), XPathError> {
//!         match expr {
//!             "/*" => Ok(()),
//!             other => Err(XPathError::InvalidExpression { message: other.to_string() }),
//!         }
//!     }
//!
//!     fn evaluate(&self, _: &(), ctx: &XPathContext<'_>) -> Result<XPathValue, XPathError> {
//!         let root = ctx.root()?;
//!         Ok(XPathValue::NodeSet(vec![root.static_cast::<Node>()]))
//!     }
//! }
//!
//! let doc = Document::parse_str("<root/>")?;
//! let found = doc.select_nodes(&RootOnly, &XPath::new("/*"))?;
//! assert_eq!(found.len(), 1);
//! assert!(doc.select_nodes(&RootOnly, &XPath::new("//x")).is_err());
//! # Ok::<(), oxdom::Error>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;

use tracing::trace;

use crate::document::{Document, DocumentId};
use crate::error::{Error, Result};
use crate::handle::{Access, Element, Handle, Mutable, Node, ReadOnly};
use crate::runtime;

/// An expression together with the namespace prefixes it may use.
///
/// ```
/// use oxdom::xpath::XPath;
///
/// let xpath = XPath::new("/a:root").with_xmlns("a", "urn:a");
/// assert_eq!(xpath.as_str(), "/a:root");
/// assert_eq!(xpath.namespaces().get("a").map(String::as_str), Some("urn:a"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    expr: String,
    namespaces: BTreeMap<String, String>,
}

impl XPath {
    /// Creates an expression with no registered prefixes.
    #[must_use]
    pub fn new(expr: &str) -> Self {
        Self {
            expr: expr.to_string(),
            namespaces: BTreeMap::new(),
        }
    }

    /// Registers `prefix` for `uri`, replacing an earlier binding.
    #[must_use]
    pub fn with_xmlns(mut self, prefix: &str, uri: &str) -> Self {
        self.register_xmlns(prefix, uri);
        self
    }

    /// Registers `prefix` for `uri` in place.
    pub fn register_xmlns(&mut self, prefix: &str, uri: &str) {
        self.namespaces.insert(prefix.to_string(), uri.to_string());
    }

    /// The expression text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// The registered prefix bindings.
    #[must_use]
    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }
}

/// What an evaluation runs against.
#[derive(Debug, Clone, Copy)]
pub struct XPathContext<'a> {
    document: DocumentId,
    node: Option<Handle<Node, ReadOnly>>,
    namespaces: &'a BTreeMap<String, String>,
}

impl<'a> XPathContext<'a> {
    /// The document being queried.
    #[must_use]
    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// The context node, or `None` when the query runs against the
    /// document itself.
    #[must_use]
    pub fn node(&self) -> Option<Handle<Node, ReadOnly>> {
        self.node
    }

    /// Looks up a prefix registered on the expression.
    #[must_use]
    pub fn namespace_uri(&self, prefix: &str) -> Option<&'a str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    /// The registered prefix bindings.
    #[must_use]
    pub fn namespaces(&self) -> &'a BTreeMap<String, String> {
        self.namespaces
    }

    /// The document's root element, or an empty handle.
    ///
    /// # Errors
    ///
    /// Fails if the document no longer exists.
    pub fn root(&self) -> Result<Handle<Element, ReadOnly>> {
        runtime::with(|rt| {
            let doc = self.document.node_id(rt)?;
            Handle::from_node(rt, rt.engine.root_element(doc))
        })
    }
}

/// A compiler and evaluator for query expressions.
///
/// Evaluation runs outside of any layer operation, so an engine may freely
/// navigate the tree through handles while it evaluates.
pub trait XPathEngine {
    /// A compiled expression.
    type Compiled;

    /// Compiles expression text.
    ///
    /// # Errors
    ///
    /// Returns [`XPathError::InvalidExpression`] for malformed text.
    fn compile(&self, expr: &str) -> Result<Self::Compiled, XPathError>;

    /// Evaluates a compiled expression.
    ///
    /// # Errors
    ///
    /// Any evaluation failure. It reaches the caller unchanged as
    /// [`Error::XPath`].
    fn evaluate(
        &self,
        compiled: &Self::Compiled,
        ctx: &XPathContext<'_>,
    ) -> Result<XPathValue, XPathError>;
}

/// A query result.
#[derive(Debug, Clone)]
pub enum XPathValue {
    /// Nodes in document order.
    NodeSet(Vec<Handle<Node, ReadOnly>>),
    /// A boolean.
    Boolean(bool),
    /// An IEEE 754 double.
    Number(f64),
    /// A string.
    String(String),
}

impl XPathValue {
    /// Converts to a boolean: non-zero numbers, non-empty strings and
    /// non-empty node sets are `true`.
    #[must_use]
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::NodeSet(nodes) => !nodes.is_empty(),
        }
    }

    /// Converts to a number. A node set converts through the string value
    /// of its first node; anything unparseable becomes NaN.
    ///
    /// # Errors
    ///
    /// Fails if the first node of a node set no longer exists.
    pub fn to_number(&self) -> Result<f64> {
        Ok(match self {
            Self::Number(n) => *n,
            Self::Boolean(b) => f64::from(u8::from(*b)),
            Self::String(s) => parse_xpath_number(s),
            Self::NodeSet(_) => parse_xpath_number(&self.to_xpath_string()?),
        })
    }

    /// Converts to a string as the `string()` function does. A node set
    /// yields the content of its first node, or `""` when empty.
    ///
    /// # Errors
    ///
    /// Fails if the first node of a node set no longer exists.
    pub fn to_xpath_string(&self) -> Result<String> {
        Ok(match self {
            Self::String(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => format_xpath_number(*n),
            Self::NodeSet(nodes) => match nodes.first() {
                Some(first) => first.content()?,
                None => String::new(),
            },
        })
    }

    /// Returns the node set, or `None` for other result types.
    #[must_use]
    pub fn as_node_set(&self) -> Option<&[Handle<Node, ReadOnly>]> {
        match self {
            Self::NodeSet(nodes) => Some(nodes),
            _ => None,
        }
    }

    /// The type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::NodeSet(_) => "node-set",
        }
    }
}

impl fmt::Display for XPathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_xpath_number(*n)),
            Self::String(s) => f.write_str(s),
            Self::NodeSet(nodes) => write!(f, "<node-set of {} nodes>", nodes.len()),
        }
    }
}

impl PartialEq for XPathValue {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::NodeSet(a), Self::NodeSet(b)) => a == b,
            _ => false,
        }
    }
}

/// Formats a number the way `string()` does: `NaN`, `Infinity`, integers
/// without a decimal point, and `0` for negative zero.
#[must_use]
pub fn format_xpath_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n.is_sign_positive() {
            "Infinity".to_owned()
        } else {
            "-Infinity".to_owned()
        };
    }
    if n == 0.0 {
        return "0".to_owned();
    }
    #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
    if n.fract() == 0.0 && n.abs() < 1e18 {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

fn parse_xpath_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// An error reported by a query engine, or a result this layer could not
/// accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XPathError {
    /// The result had the wrong type, e.g. a string where a node set was
    /// required.
    #[error("type error: expected {expected}, found {found}")]
    TypeError {
        /// The type that was expected.
        expected: String,
        /// The type that was actually found.
        found: String,
    },
    /// A variable reference has no binding.
    #[error("undefined variable: ${name}")]
    UndefinedVariable {
        /// The variable name without `$`.
        name: String,
    },
    /// A function name is unknown to the engine.
    #[error("undefined function: {name}()")]
    UndefinedFunction {
        /// The function name.
        name: String,
    },
    /// A function was called with the wrong number of arguments.
    #[error("invalid argument count for {function}(): expected {expected}, found {found}")]
    InvalidArgCount {
        /// The function name.
        function: String,
        /// The number of arguments expected.
        expected: usize,
        /// The number of arguments provided.
        found: usize,
    },
    /// The expression could not be compiled.
    #[error("invalid XPath expression: {message}")]
    InvalidExpression {
        /// A description of the problem.
        message: String,
    },
    /// The result names a node outside the queried document.
    #[error("node set contains a node of another document")]
    ForeignNode,
    /// Evaluation failed for another reason.
    #[error("internal XPath error: {message}")]
    InternalError {
        /// A description of the failure.
        message: String,
    },
}

impl From<Error> for XPathError {
    fn from(err: Error) -> Self {
        match err {
            Error::XPath(inner) => inner,
            other => Self::InternalError {
                message: other.to_string(),
            },
        }
    }
}

fn run<E: XPathEngine>(
    engine: &E,
    xpath: &XPath,
    document: DocumentId,
    node: Option<Handle<Node, ReadOnly>>,
) -> Result<XPathValue> {
    let compiled = engine.compile(xpath.as_str())?;
    let ctx = XPathContext {
        document,
        node,
        namespaces: &xpath.namespaces,
    };
    let value = engine.evaluate(&compiled, &ctx)?;
    trace!(expr = xpath.as_str(), result = value.type_name(), "evaluated xpath");
    Ok(value)
}

fn into_nodes<A: Access>(value: XPathValue, document: DocumentId) -> Result<Vec<Handle<Node, A>>> {
    let XPathValue::NodeSet(nodes) = value else {
        return Err(XPathError::TypeError {
            expected: "node-set".to_string(),
            found: value.type_name().to_string(),
        }
        .into());
    };
    nodes
        .into_iter()
        .map(|node| {
            if node.document_id()? != document {
                return Err(XPathError::ForeignNode.into());
            }
            Ok(Handle::from_key(node.key()))
        })
        .collect()
}

impl<A: Access> Handle<Element, A> {
    /// Evaluates `xpath` with this element as the context node.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle, or with [`Error::XPath`] when
    /// the engine fails.
    pub fn evaluate<E: XPathEngine>(self, engine: &E, xpath: &XPath) -> Result<XPathValue> {
        let document = self.document_id()?;
        run(engine, xpath, document, Some(self.static_cast::<Node>().as_const()))
    }

    /// Selects nodes with this element as the context node.
    ///
    /// # Errors
    ///
    /// As for [`evaluate`](Self::evaluate); a result that is not a node set
    /// fails with [`XPathError::TypeError`].
    pub fn select_nodes<E: XPathEngine>(self, engine: &E, xpath: &XPath) -> Result<Vec<Handle<Node, A>>> {
        let document = self.document_id()?;
        let value = run(engine, xpath, document, Some(self.static_cast::<Node>().as_const()))?;
        into_nodes(value, document)
    }
}

impl Document {
    /// Evaluates `xpath` against the document.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DanglingHandle`] after a runtime teardown, or
    /// with [`Error::XPath`] when the engine fails.
    pub fn evaluate<E: XPathEngine>(&self, engine: &E, xpath: &XPath) -> Result<XPathValue> {
        let document = self.live_id()?;
        run(engine, xpath, document, None)
    }

    /// Selects nodes of the document.
    ///
    /// # Errors
    ///
    /// As for [`evaluate`](Self::evaluate); a result that is not a node set
    /// fails with [`XPathError::TypeError`].
    pub fn select_nodes<E: XPathEngine>(
        &self,
        engine: &E,
        xpath: &XPath,
    ) -> Result<Vec<Handle<Node, ReadOnly>>> {
        let document = self.live_id()?;
        into_nodes(run(engine, xpath, document, None)?, document)
    }

    /// Selects nodes of the document for modification.
    ///
    /// # Errors
    ///
    /// As for [`select_nodes`](Self::select_nodes).
    pub fn select_nodes_mut<E: XPathEngine>(
        &mut self,
        engine: &E,
        xpath: &XPath,
    ) -> Result<Vec<Handle<Node, Mutable>>> {
        let document = self.live_id()?;
        into_nodes(run(engine, xpath, document, None)?, document)
    }

    fn live_id(&self) -> Result<DocumentId> {
        let id = self.id();
        runtime::with(|rt| id.node_id(rt).map(|_| id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Understands `name/name/...` child paths, `prefix:name` steps, and
    /// `string(path)`.
    struct PathEngine;

    enum Compiled {
        Path(Vec<String>),
        String(Vec<String>),
    }

    fn steps(path: &str) -> Result<Vec<String>, XPathError> {
        if path.is_empty() || path.split('/').any(str::is_empty) {
            return Err(XPathError::InvalidExpression {
                message: format!("bad path: {path}"),
            });
        }
        Ok(path.split('/').map(str::to_string).collect())
    }

    impl XPathEngine for PathEngine {
        type Compiled = Compiled;

        fn compile(&self, expr: &str) -> Result<Compiled, XPathError> {
            match expr.strip_prefix("string(").and_then(|e| e.strip_suffix(')')) {
                Some(inner) => Ok(Compiled::String(steps(inner)?)),
                None => Ok(Compiled::Path(steps(expr)?)),
            }
        }

        fn evaluate(&self, compiled: &Compiled, ctx: &XPathContext<'_>) -> Result<XPathValue, XPathError> {
            let (Compiled::Path(steps) | Compiled::String(steps)) = compiled;
            let mut current: Vec<Handle<Element, ReadOnly>> = match ctx.node() {
                Some(node) => vec![node.dynamic_cast::<Element>()],
                None => vec![ctx.root()?],
            };
            for (i, step) in steps.iter().enumerate() {
                let (uri, local) = match step.split_once(':') {
                    Some((prefix, local)) => match ctx.namespace_uri(prefix) {
                        Some(uri) => (uri, local),
                        None => {
                            return Err(XPathError::InternalError {
                                message: format!("unbound prefix {prefix}"),
                            })
                        }
                    },
                    None => ("", step.as_str()),
                };
                let mut next = Vec::new();
                for elem in current {
                    // The first step of a document query names the root itself.
                    if ctx.node().is_none() && i == 0 {
                        if elem.name()? == local && elem.uri()? == uri {
                            next.push(elem);
                        }
                        continue;
                    }
                    for child in elem.child_elements()? {
                        if child.name()? == local && child.uri()? == uri {
                            next.push(child);
                        }
                    }
                }
                current = next;
            }
            let nodes = current.into_iter().map(Handle::static_cast).collect();
            Ok(match compiled {
                Compiled::Path(_) => XPathValue::NodeSet(nodes),
                Compiled::String(_) => XPathValue::String(XPathValue::NodeSet(nodes).to_xpath_string()?),
            })
        }
    }

    fn sample() -> Document {
        let Ok(doc) = Document::parse_str(
            r#"<root xmlns:x="urn:x"><a>1</a><a>2</a><x:b><a>3</a></x:b></root>"#,
        ) else {
            panic!("parse failed");
        };
        doc
    }

    #[test]
    fn test_document_select_nodes() {
        let doc = sample();
        let Ok(found) = doc.select_nodes(&PathEngine, &XPath::new("root/a")) else {
            panic!("select failed");
        };
        let contents: Vec<String> = found.iter().filter_map(|n| n.content().ok()).collect();
        assert_eq!(contents, vec!["1", "2"]);
    }

    #[test]
    fn test_prefixes_come_from_the_expression() {
        let doc = sample();
        let xpath = XPath::new("root/y:b/a").with_xmlns("y", "urn:x");
        let Ok(found) = doc.select_nodes(&PathEngine, &xpath) else {
            panic!("select failed");
        };
        assert_eq!(found.len(), 1);
        assert!(matches!(
            doc.select_nodes(&PathEngine, &XPath::new("root/y:b")),
            Err(Error::XPath(XPathError::InternalError { .. }))
        ));
    }

    #[test]
    fn test_element_context_and_identity() {
        let mut doc = sample();
        let Ok(root) = doc.root_mut() else {
            panic!("no root");
        };
        let Ok(found) = root.select_nodes(&PathEngine, &XPath::new("a")) else {
            panic!("select failed");
        };
        let Ok(first) = root.children().front() else {
            panic!("no child");
        };
        assert_eq!(found.first().copied(), Some(first.static_cast::<Node>()));
        let Some(elem) = found.first().map(|n| n.dynamic_cast::<Element>()) else {
            panic!("empty result");
        };
        assert!(elem.set_name("renamed").is_ok());
        assert_eq!(first.dynamic_cast::<Element>().name().ok().as_deref(), Some("renamed"));
    }

    #[test]
    fn test_non_node_set_is_a_type_error() {
        let doc = sample();
        let xpath = XPath::new("string(root/a)");
        assert!(matches!(
            doc.evaluate(&PathEngine, &xpath),
            Ok(XPathValue::String(s)) if s == "1"
        ));
        assert!(matches!(
            doc.select_nodes(&PathEngine, &xpath),
            Err(Error::XPath(XPathError::TypeError { .. }))
        ));
    }

    #[test]
    fn test_compile_errors_pass_through() {
        let doc = sample();
        assert!(matches!(
            doc.select_nodes(&PathEngine, &XPath::new("root//a")),
            Err(Error::XPath(XPathError::InvalidExpression { .. }))
        ));
    }

    #[test]
    fn test_foreign_nodes_are_rejected() {
        struct Other(Handle<Node, ReadOnly>);
        impl XPathEngine for Other {
            type Compiled = ();
            fn compile(&self, _: &str) -> Result<(), XPathError> {
                Ok(())
            }
            fn evaluate(&self, _: &(), _: &XPathContext<'_>) -> Result<XPathValue, XPathError> {
                Ok(XPathValue::NodeSet(vec![self.0]))
            }
        }

        let doc = sample();
        let other = sample();
        let Ok(root) = other.root() else {
            panic!("no root");
        };
        assert!(matches!(
            doc.select_nodes(&Other(root.static_cast()), &XPath::new(".")),
            Err(Error::XPath(XPathError::ForeignNode))
        ));
    }

    #[test]
    fn test_value_conversions() {
        assert!(XPathValue::Number(2.0).to_boolean());
        assert!(!XPathValue::Number(f64::NAN).to_boolean());
        assert!(!XPathValue::NodeSet(Vec::new()).to_boolean());
        assert_eq!(XPathValue::Boolean(true).to_number().ok(), Some(1.0));
        assert!(XPathValue::String("x".into()).to_number().is_ok_and(f64::is_nan));
        assert_eq!(XPathValue::Number(3.0).to_xpath_string().ok().as_deref(), Some("3"));
        assert_eq!(XPathValue::Number(-0.0).to_string(), "0");
        assert_eq!(format_xpath_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_xpath_number(0.5), "0.5");
        assert_eq!(XPathValue::NodeSet(Vec::new()).type_name(), "node-set");
    }
}
