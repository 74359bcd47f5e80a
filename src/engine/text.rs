//! Names, content and node paths.

use std::fmt::Write;

use super::{Engine, EngineError, NodeId, NodeObserver, RawKind};

impl<H: NodeObserver> Engine<H> {
    /// Returns the node name: the local name of elements and attributes, the
    /// target of instructions, and `#text` (text and CDATA), `#comment` or
    /// `#document` otherwise.
    #[must_use]
    pub fn node_name(&self, id: NodeId) -> String {
        let raw = self.node(id);
        match raw.kind {
            RawKind::Element | RawKind::Attribute | RawKind::Instruction => raw.name.clone(),
            RawKind::Text | RawKind::CData => "#text".to_string(),
            RawKind::Comment => "#comment".to_string(),
            RawKind::Document => "#document".to_string(),
        }
    }

    /// Returns `prefix:name`, or the bare name when the node has no prefixed
    /// namespace.
    #[must_use]
    pub fn qualified_name(&self, id: NodeId) -> String {
        let raw = self.node(id);
        match raw.ns.and_then(|ns| self.ns(ns).prefix.as_deref()) {
            Some(prefix) => format!("{prefix}:{}", raw.name),
            None => raw.name.clone(),
        }
    }

    /// Renames an element, attribute or instruction.
    pub fn set_name(&mut self, id: NodeId, name: &str) {
        self.node_mut(id).name = name.to_string();
    }

    /// Returns the text content of a node, like `xmlNodeGetContent`.
    ///
    /// Elements and documents concatenate the text of all descendant text
    /// and CDATA nodes.
    #[must_use]
    pub fn get_content(&self, id: NodeId) -> String {
        let raw = self.node(id);
        match raw.kind {
            RawKind::Element | RawKind::Document => {
                let mut buf = String::new();
                for desc in self.descendants(id) {
                    let node = self.node(desc);
                    if node.kind.is_text() {
                        buf.push_str(&node.content);
                    }
                }
                buf
            }
            _ => raw.content.clone(),
        }
    }

    /// Replaces the content of a node.
    ///
    /// For an element every child is freed and replaced by a single text
    /// node (none if `content` is empty). Documents have no settable content.
    pub fn set_content(&mut self, id: NodeId, content: &str) -> Result<(), EngineError> {
        match self.kind(id) {
            RawKind::Document => Err(EngineError::Unsupported {
                op: "set_content",
                kind: RawKind::Document,
            }),
            RawKind::Element => {
                let children: Vec<NodeId> = self.children(id).collect();
                for child in children {
                    self.free_node(child);
                }
                if !content.is_empty() {
                    let doc = self.node(id).doc.unwrap_or(id);
                    let text = self.new_text(doc, content)?;
                    self.add_child(id, text)?;
                }
                Ok(())
            }
            _ => {
                self.node_mut(id).content = content.to_string();
                Ok(())
            }
        }
    }

    /// Returns an XPath-like location of the node, like `xmlGetNodePath`.
    ///
    /// Steps get a `[n]` position only when the parent has more than one
    /// sibling matching the same step.
    #[must_use]
    pub fn node_path(&self, id: NodeId) -> String {
        let mut steps = Vec::new();
        let mut cur = Some(id);
        while let Some(node) = cur {
            let raw = self.node(node);
            let step = match raw.kind {
                RawKind::Document => break,
                RawKind::Attribute => format!("@{}", self.qualified_name(node)),
                RawKind::Element => {
                    let name = self.qualified_name(node);
                    self.indexed_step(node, name, |engine, other| {
                        engine.kind(other) == RawKind::Element
                            && engine.qualified_name(other) == engine.qualified_name(node)
                    })
                }
                RawKind::Text | RawKind::CData => {
                    self.indexed_step(node, "text()".to_string(), |engine, other| {
                        engine.kind(other).is_text()
                    })
                }
                RawKind::Comment => {
                    self.indexed_step(node, "comment()".to_string(), |engine, other| {
                        engine.kind(other) == RawKind::Comment
                    })
                }
                RawKind::Instruction => {
                    let step = format!("processing-instruction('{}')", raw.name);
                    self.indexed_step(node, step, |engine, other| {
                        engine.kind(other) == RawKind::Instruction
                            && engine.node(other).name == engine.node(node).name
                    })
                }
            };
            steps.push(step);
            cur = raw.parent;
        }

        let mut path = String::new();
        for step in steps.iter().rev() {
            path.push('/');
            path.push_str(step);
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    fn indexed_step(
        &self,
        node: NodeId,
        mut step: String,
        same: impl Fn(&Self, NodeId) -> bool,
    ) -> String {
        let Some(parent) = self.parent(node) else {
            return step;
        };
        let mut position = 0;
        let mut total = 0;
        for sibling in self.children(parent) {
            if same(self, sibling) {
                total += 1;
                if sibling == node {
                    position = total;
                }
            }
        }
        if total > 1 {
            let _ = write!(step, "[{position}]");
        }
        step
    }
}
