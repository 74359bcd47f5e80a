//! Text, comment and processing-instruction wrappers.

use crate::engine::RawKind;
use crate::error::Result;
use crate::handle::{Access, Handle, Instruction, Mutable, Text};
use crate::runtime;

impl<A: Access> Handle<Text, A> {
    /// Returns `true` for a CDATA section.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn is_cdata(self) -> Result<bool> {
        runtime::with(|rt| {
            let id = self.node_id(rt)?;
            Ok(rt.engine.kind(id) == RawKind::CData)
        })
    }
}

impl<A: Access> Handle<Instruction, A> {
    /// Returns the instruction target.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn target(self) -> Result<String> {
        self.name()
    }

    /// Returns the instruction data.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn data(self) -> Result<String> {
        self.content()
    }
}

impl Handle<Instruction, Mutable> {
    /// Replaces the instruction data.
    ///
    /// # Errors
    ///
    /// Fails on an empty or dangling handle.
    pub fn set_data(self, data: &str) -> Result<()> {
        self.set_content(data)
    }
}
