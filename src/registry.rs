//! The identity bridge between engine nodes and wrapper objects.
//!
//! The [`Registry`] is the engine's [`NodeObserver`]. Every time the engine
//! constructs an element, attribute, text, comment, instruction or namespace
//! declaration, the registry allocates exactly one [`Wrapper`] in a slab and
//! returns its key, which the engine stores in the object's `user_data` slot.
//! When the engine frees the object the wrapper is released. Document nodes
//! are not wrapped.
//!
//! Keys carry a 64-bit stamp drawn from a process-wide counter, so a key
//! that outlived its wrapper (or its whole runtime) does not alias a newer
//! wrapper that happens to reuse the slab slot. Wrapping the counter would
//! take centuries at any realistic allocation rate.

use std::num::NonZeroU128;
use std::sync::atomic::{AtomicU64, Ordering};

use slab::Slab;
use tracing::trace;

use crate::engine::{Engine, NodeId, NodeObserver, NsId, RawKind, UserData};
use crate::error::{Error, Result};
use crate::node::{self, NodeKind};
use crate::orphans::OrphanTracker;

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

fn next_stamp() -> u64 {
    loop {
        let stamp = NEXT_STAMP.fetch_add(1, Ordering::Relaxed);
        if stamp != 0 {
            return stamp;
        }
    }
}

/// Identifies one wrapper object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrapperKey {
    slot: u32,
    stamp: u64,
}

impl WrapperKey {
    fn to_user_data(self) -> Option<UserData> {
        let raw = (u128::from(self.stamp) << 32) | u128::from(self.slot);
        NonZeroU128::new(raw).map(UserData::from_raw)
    }

    fn from_user_data(data: UserData) -> Self {
        let raw = data.into_raw().get();
        #[allow(clippy::cast_possible_truncation)]
        Self {
            slot: raw as u32,
            stamp: (raw >> 32) as u64,
        }
    }
}

/// What a wrapper stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Node(NodeId),
    Ns(NsId),
}

/// The per-node host object.
///
/// Wrappers hold no structure of their own; everything is read through the
/// engine node they point at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Wrapper {
    stamp: u64,
    pub(crate) kind: NodeKind,
    pub(crate) target: Target,
}

/// Wrapper storage plus per-document orphan bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    wrappers: Slab<Wrapper>,
    pub(crate) orphans: OrphanTracker,
    documents: usize,
}

impl Registry {
    fn insert(&mut self, kind: NodeKind, target: Target) -> Option<UserData> {
        let stamp = next_stamp();
        let entry = self.wrappers.vacant_entry();
        let slot = u32::try_from(entry.key()).ok()?;
        entry.insert(Wrapper { stamp, kind, target });
        trace!(slot, stamp, ?kind, "wrapper created");
        WrapperKey { slot, stamp }.to_user_data()
    }

    fn remove(&mut self, data: Option<UserData>) {
        let Some(data) = data else {
            return;
        };
        let key = WrapperKey::from_user_data(data);
        let slot = key.slot as usize;
        if self.wrappers.get(slot).is_some_and(|w| w.stamp == key.stamp) {
            let wrapper = self.wrappers.remove(slot);
            trace!(slot, stamp = key.stamp, kind = ?wrapper.kind, "wrapper destroyed");
        }
    }

    /// Looks up a wrapper by key.
    pub(crate) fn get(&self, key: WrapperKey) -> Result<&Wrapper> {
        self.wrappers
            .get(key.slot as usize)
            .filter(|w| w.stamp == key.stamp)
            .ok_or(Error::DanglingHandle)
    }

    /// Returns the number of live wrappers.
    pub(crate) fn live_wrappers(&self) -> usize {
        self.wrappers.len()
    }

    /// Returns the number of live documents.
    pub(crate) fn document_count(&self) -> usize {
        self.documents
    }
}

impl NodeObserver for Registry {
    fn node_constructed(
        &mut self,
        id: NodeId,
        kind: RawKind,
        _doc: Option<NodeId>,
    ) -> Option<UserData> {
        match node::kind_of(kind) {
            Some(kind) => self.insert(kind, Target::Node(id)),
            None => {
                self.documents += 1;
                None
            }
        }
    }

    fn node_destructed(&mut self, id: NodeId, doc: Option<NodeId>, data: Option<UserData>) {
        if doc == Some(id) {
            self.documents = self.documents.saturating_sub(1);
            self.orphans.remove_document(id);
            return;
        }
        self.remove(data);
        if let Some(doc) = doc {
            self.orphans.forget_node(doc, id);
        }
    }

    fn ns_constructed(&mut self, id: NsId, _doc: Option<NodeId>) -> Option<UserData> {
        self.insert(NodeKind::Xmlns, Target::Ns(id))
    }

    fn ns_destructed(&mut self, id: NsId, doc: Option<NodeId>, data: Option<UserData>) {
        self.remove(data);
        if let Some(doc) = doc {
            self.orphans.forget_ns(doc, id);
        }
    }

    fn ns_orphaned(&mut self, id: NsId, doc: Option<NodeId>) {
        if let Some(doc) = doc {
            trace!(ns = id.into_raw(), "namespace orphaned");
            self.orphans.add_ns(doc, id);
        }
    }
}

/// Maps an engine node to its wrapper key.
///
/// A missing node maps to `None`. A node without a wrapper means the bridge
/// lost synchronization with the engine.
pub(crate) fn bridge(engine: &Engine<Registry>, id: Option<NodeId>) -> Result<Option<WrapperKey>> {
    let Some(id) = id else {
        return Ok(None);
    };
    match engine.node(id).user_data {
        Some(data) => Ok(Some(WrapperKey::from_user_data(data))),
        None => Err(Error::InternalConsistency(format!(
            "node {} has no wrapper",
            id.into_raw()
        ))),
    }
}

/// Maps an engine namespace declaration to its wrapper key.
pub(crate) fn bridge_ns(engine: &Engine<Registry>, id: Option<NsId>) -> Result<Option<WrapperKey>> {
    let Some(id) = id else {
        return Ok(None);
    };
    match engine.ns(id).user_data {
        Some(data) => Ok(Some(WrapperKey::from_user_data(data))),
        None => Err(Error::InternalConsistency(format!(
            "namespace {} has no wrapper",
            id.into_raw()
        ))),
    }
}
