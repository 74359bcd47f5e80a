//! XML serializer.
//!
//! Writes engine nodes back to well-formed XML text. Namespace declarations
//! are emitted from each element's declaration chain, ahead of its
//! attributes, so the output re-parses to the same bindings.

use std::fmt::Write;

use crate::engine::{Engine, NodeId, NodeObserver, RawKind};

/// Options controlling XML serialization output.
///
/// # Examples
///
/// ```
/// use oxdom::serial::SerializeOptions;
///
/// let opts = SerializeOptions::default()
///     .indent(true)
///     .indent_str("\t")
///     .declaration(false);
/// assert!(opts.indent);
/// ```
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// Whether to produce indented (pretty-printed) output.
    /// Defaults to `false`.
    pub indent: bool,
    /// The indentation string used for each level when `indent` is `true`.
    /// Defaults to two spaces.
    pub indent_str: String,
    /// Whether documents start with an `<?xml ...?>` declaration.
    /// Defaults to `true`.
    pub declaration: bool,
    /// Encoding named in the declaration instead of the document's own.
    pub encoding: Option<String>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            indent: false,
            indent_str: "  ".to_string(),
            declaration: true,
            encoding: None,
        }
    }
}

impl SerializeOptions {
    /// Enables or disables indented (pretty-printed) output.
    ///
    /// Only element-only content is indented; an element that holds
    /// non-blank text is written as is.
    #[must_use]
    pub fn indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    /// Sets the indentation string used for each nesting level.
    #[must_use]
    pub fn indent_str(mut self, s: &str) -> Self {
        self.indent_str = s.to_string();
        self
    }

    /// Enables or disables the XML declaration.
    #[must_use]
    pub fn declaration(mut self, yes: bool) -> Self {
        self.declaration = yes;
        self
    }

    /// Overrides the encoding named in the declaration.
    #[must_use]
    pub fn encoding(mut self, label: &str) -> Self {
        self.encoding = Some(label.to_string());
        self
    }
}

/// Serializes a document node.
pub(crate) fn document_to_string<H: NodeObserver>(
    engine: &Engine<H>,
    doc: NodeId,
    options: &SerializeOptions,
) -> String {
    let mut out = String::new();
    if options.declaration {
        let info = engine.doc_info(doc);
        let version = info.map_or("1.0", |i| i.version.as_str());
        let _ = write!(out, "<?xml version=\"{version}\"");
        let encoding = options
            .encoding
            .as_deref()
            .or_else(|| info.and_then(|i| i.encoding.as_deref()));
        if let Some(encoding) = encoding {
            let _ = write!(out, " encoding=\"{encoding}\"");
        }
        if let Some(standalone) = info.and_then(|i| i.standalone) {
            let _ = write!(out, " standalone=\"{}\"", if standalone { "yes" } else { "no" });
        }
        out.push_str("?>\n");
    }
    let mut writer = Writer {
        engine,
        options,
        out,
    };
    for child in engine.children(doc) {
        writer.node(child, 0, false);
        writer.out.push('\n');
    }
    writer.out
}

/// Serializes one node and its subtree without a declaration.
pub(crate) fn node_to_string<H: NodeObserver>(engine: &Engine<H>, id: NodeId) -> String {
    let options = SerializeOptions::default();
    let mut writer = Writer {
        engine,
        options: &options,
        out: String::new(),
    };
    if engine.kind(id) == RawKind::Attribute {
        writer.attribute(id);
        return writer.out;
    }
    writer.node(id, 0, false);
    writer.out
}

struct Writer<'a, H> {
    engine: &'a Engine<H>,
    options: &'a SerializeOptions,
    out: String,
}

impl<H: NodeObserver> Writer<'_, H> {
    fn pad(&mut self, depth: usize, pretty: bool) {
        if pretty {
            for _ in 0..depth {
                self.out.push_str(&self.options.indent_str);
            }
        }
    }

    fn newline(&mut self, pretty: bool) {
        if pretty {
            self.out.push('\n');
        }
    }

    /// Returns `true` if the element holds elements and blank text only.
    fn is_element_only(&self, id: NodeId) -> bool {
        let mut has_element = false;
        for child in self.engine.children(id) {
            let raw = self.engine.node(child);
            match raw.kind {
                RawKind::Element => has_element = true,
                RawKind::Text if raw.content.trim().is_empty() => {}
                RawKind::Text | RawKind::CData => return false,
                _ => {}
            }
        }
        has_element
    }

    fn attribute(&mut self, id: NodeId) {
        let name = self.engine.qualified_name(id);
        let value = escape_attr(&self.engine.node(id).content);
        let _ = write!(self.out, "{name}=\"{value}\"");
    }

    fn node(&mut self, id: NodeId, depth: usize, pretty: bool) {
        let engine = self.engine;
        let raw = engine.node(id);
        match raw.kind {
            RawKind::Element => self.element(id, depth, pretty),
            RawKind::Text => escape_text_into(&mut self.out, &raw.content),
            RawKind::CData => {
                self.out.push_str("<![CDATA[");
                self.out.push_str(&raw.content);
                self.out.push_str("]]>");
            }
            RawKind::Comment => {
                self.pad(depth, pretty);
                let _ = write!(self.out, "<!--{}-->", raw.content);
                self.newline(pretty);
            }
            RawKind::Instruction => {
                self.pad(depth, pretty);
                if raw.content.is_empty() {
                    let _ = write!(self.out, "<?{}?>", raw.name);
                } else {
                    let _ = write!(self.out, "<?{} {}?>", raw.name, raw.content);
                }
                self.newline(pretty);
            }
            RawKind::Attribute => self.attribute(id),
            RawKind::Document => {
                for child in engine.children(id) {
                    self.node(child, depth, pretty);
                }
            }
        }
    }

    fn element(&mut self, id: NodeId, depth: usize, pretty: bool) {
        let engine = self.engine;
        let name = engine.qualified_name(id);
        self.pad(depth, pretty);
        self.out.push('<');
        self.out.push_str(&name);
        for ns in engine.ns_defs(id) {
            let raw = engine.ns(ns);
            let href = escape_attr(&raw.href);
            match raw.prefix.as_deref() {
                Some(prefix) => {
                    let _ = write!(self.out, " xmlns:{prefix}=\"{href}\"");
                }
                None => {
                    let _ = write!(self.out, " xmlns=\"{href}\"");
                }
            }
        }
        for attr in engine.properties(id) {
            self.out.push(' ');
            self.attribute(attr);
        }

        if engine.first_child(id).is_none() {
            self.out.push_str("/>");
            self.newline(pretty);
            return;
        }
        self.out.push('>');
        let element_only = self.options.indent && self.is_element_only(id);
        self.newline(element_only);
        for child in engine.children(id) {
            let raw = engine.node(child);
            if element_only && raw.kind == RawKind::Text && raw.content.trim().is_empty() {
                continue;
            }
            self.node(child, depth + 1, element_only);
        }
        self.pad(depth, element_only);
        let _ = write!(self.out, "</{name}>");
        self.newline(pretty);
    }
}

/// Escapes character data.
fn escape_text_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            '\t' | '\n' => out.push(ch),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "&#x{:X};", c as u32);
            }
            c => out.push(c),
        }
    }
}

/// Escapes a value for a double-quoted attribute.
pub(crate) fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "&#x{:X};", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
