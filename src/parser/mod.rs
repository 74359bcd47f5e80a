//! Parsing boundary.
//!
//! Well-formedness checking, entity expansion and namespace resolution are
//! delegated to `roxmltree`. This module walks the resulting read-only tree
//! and rebuilds it in the engine arena, so that every node gets its wrapper
//! through the engine's construction hook like any other node.
//!
//! Prefixes, namespace declarations, CDATA sections and the XML
//! declaration are recovered from the source text (see [`source`]).

pub(crate) mod source;

use tracing::debug;

use crate::engine::{Engine, NodeId};
use crate::error::{Error, ParseError, Result, SourceLocation};
use crate::namespace;
use crate::registry::Registry;

use source::Segment;

/// Parse options controlling parser behavior and limits.
///
/// Use the builder pattern to configure options:
///
/// ```
/// use oxdom::parser::ParseOptions;
///
/// let opts = ParseOptions::default()
///     .no_blanks(true)
///     .allow_dtd(true)
///     .nodes_limit(10_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Drop text nodes that contain only whitespace.
    pub no_blanks: bool,
    /// Accept a document type declaration. Entities it declares are
    /// expanded in place.
    pub allow_dtd: bool,
    /// Upper bound on the number of nodes the parser may produce.
    pub nodes_limit: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            no_blanks: false,
            allow_dtd: false,
            nodes_limit: u32::MAX,
        }
    }
}

impl ParseOptions {
    /// Enables or disables stripping of blank text nodes.
    #[must_use]
    pub fn no_blanks(mut self, yes: bool) -> Self {
        self.no_blanks = yes;
        self
    }

    /// Allows or rejects a `<!DOCTYPE ...>` declaration.
    #[must_use]
    pub fn allow_dtd(mut self, yes: bool) -> Self {
        self.allow_dtd = yes;
        self
    }

    /// Sets the maximum number of nodes in the parsed tree.
    #[must_use]
    pub fn nodes_limit(mut self, max: u32) -> Self {
        self.nodes_limit = max;
        self
    }
}

fn location(text: &str, pos: roxmltree::TextPos) -> SourceLocation {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(pos.row.saturating_sub(1) as usize)
        .map(str::len)
        .sum();
    let byte_offset = text[line_start..]
        .char_indices()
        .nth(pos.col.saturating_sub(1) as usize)
        .map_or(text.len(), |(i, _)| line_start + i);
    SourceLocation {
        line: pos.row,
        column: pos.col,
        byte_offset,
    }
}

/// Parses `text` into a new document of `engine`.
///
/// On failure nothing is left behind in the arena.
pub(crate) fn parse_into(
    engine: &mut Engine<Registry>,
    text: &str,
    options: &ParseOptions,
) -> Result<NodeId> {
    let mut opts = roxmltree::ParsingOptions::default();
    opts.allow_dtd = options.allow_dtd;
    opts.nodes_limit = options.nodes_limit;
    let tree = roxmltree::Document::parse_with_options(text, opts).map_err(|e| {
        Error::Parse(ParseError {
            message: e.to_string(),
            location: location(text, e.pos()),
        })
    })?;

    let decl = source::xml_declaration(text).unwrap_or_default();
    let doc = engine.new_document(decl.version.as_deref().unwrap_or("1.0"))?;
    if let Some(info) = engine.doc_info_mut(doc) {
        info.encoding = decl.encoding;
        info.standalone = decl.standalone;
    }

    let mut builder = Builder {
        engine,
        text,
        options,
        doc,
        nodes: 0,
    };
    if let Err(e) = builder.children(doc, tree.root()) {
        builder.engine.free_document(doc);
        return Err(e);
    }
    debug!(doc = doc.into_raw(), nodes = builder.nodes, "parsed document");
    Ok(doc)
}

struct Builder<'e, 't> {
    engine: &'e mut Engine<Registry>,
    text: &'t str,
    options: &'t ParseOptions,
    doc: NodeId,
    nodes: usize,
}

impl<'t> Builder<'_, 't> {
    fn children(&mut self, parent: NodeId, node: roxmltree::Node<'_, 't>) -> Result<()> {
        for child in node.children() {
            match child.node_type() {
                roxmltree::NodeType::Element => self.element(parent, child)?,
                roxmltree::NodeType::Text => self.text(parent, child)?,
                roxmltree::NodeType::Comment => {
                    let id = self
                        .engine
                        .new_comment(self.doc, child.text().unwrap_or_default())?;
                    self.link(parent, id)?;
                }
                roxmltree::NodeType::PI => {
                    if let Some(pi) = child.pi() {
                        let id = self
                            .engine
                            .new_pi(self.doc, pi.target, pi.value.unwrap_or_default())?;
                        self.link(parent, id)?;
                    }
                }
                roxmltree::NodeType::Root => {}
            }
        }
        Ok(())
    }

    fn link(&mut self, parent: NodeId, id: NodeId) -> Result<NodeId> {
        self.nodes += 1;
        Ok(self.engine.add_child(parent, id)?)
    }

    fn element(&mut self, parent: NodeId, node: roxmltree::Node<'_, 't>) -> Result<()> {
        let text = self.text;
        let tag = source::start_tag(&text[node.range().start..]);
        let elem = self.engine.new_element(self.doc, node.tag_name().name())?;
        self.link(parent, elem)?;

        for prefix in tag.declarations() {
            let uri = node.lookup_namespace_uri(prefix).unwrap_or_default();
            // `xmlns=""` undeclares the default namespace; unqualified names
            // below simply get no namespace.
            if !uri.is_empty() {
                self.engine.new_ns(elem, uri, prefix)?;
            }
        }

        if let Some(uri) = node.tag_name().namespace() {
            let prefix = tag.qname.split_once(':').map(|(p, _)| p);
            match self.engine.search_ns(elem, prefix) {
                Some(ns) if self.engine.ns(ns).href == uri => self.engine.set_ns(elem, Some(ns)),
                _ => namespace::set_uri(self.engine, elem, elem, uri)?,
            }
        }

        for attr in node.attributes() {
            let ns = match attr.namespace() {
                None => None,
                Some(uri) => {
                    let prefix = tag.attribute_prefix(attr.name(), uri, |p| {
                        node.lookup_namespace_uri(Some(p))
                    });
                    prefix
                        .and_then(|p| self.engine.search_ns(elem, Some(p)))
                        .or_else(|| self.engine.search_ns_by_href(elem, uri))
                }
            };
            self.engine.new_attribute(elem, ns, attr.name(), attr.value())?;
            self.nodes += 1;
        }

        self.children(elem, node)
    }

    fn text(&mut self, parent: NodeId, node: roxmltree::Node<'_, 't>) -> Result<()> {
        let content = node.text().unwrap_or_default();
        if self.options.no_blanks && content.trim().is_empty() {
            return Ok(());
        }
        for segment in self.split_cdata(node, content) {
            let id = match segment {
                Segment::Text(s) => self.engine.new_text(self.doc, &s)?,
                Segment::CData(s) => self.engine.new_cdata(self.doc, &s)?,
            };
            self.link(parent, id)?;
        }
        Ok(())
    }

    /// roxmltree merges CDATA into neighbouring text. The raw span runs from
    /// the node's start to the next sibling (or the parent's end tag); if
    /// re-reading it reproduces the merged text, its runs are used instead.
    fn split_cdata(&self, node: roxmltree::Node<'_, 't>, content: &str) -> Vec<Segment> {
        let whole = || vec![Segment::Text(content.to_string())];
        let start = node.range().start;
        let end = match node.next_sibling() {
            Some(next) => next.range().start,
            None => match node.parent() {
                Some(parent) if parent.is_element() => {
                    let span = &self.text[..parent.range().end];
                    match span.rfind("</") {
                        Some(end) => end,
                        None => return whole(),
                    }
                }
                _ => return whole(),
            },
        };
        let Some(raw) = self.text.get(start..end) else {
            return whole();
        };
        if !raw.contains("<![CDATA[") {
            return whole();
        }
        match source::segments(raw) {
            Some(runs) if concat(&runs) == content => runs,
            _ => whole(),
        }
    }
}

fn concat(runs: &[Segment]) -> String {
    runs.iter()
        .map(|s| match s {
            Segment::Text(t) | Segment::CData(t) => t.as_str(),
        })
        .collect()
}
