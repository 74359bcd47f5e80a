//! Clone and adopt: the two ways a subtree enters a child list.
//!
//! A clone is a deep copy made in the destination document; the source is
//! untouched and the copy shares nothing with it. Adopting moves the node
//! itself, so its wrapper and every handle to it stay valid. Both leave the
//! namespace reconciliation of the placed subtree to the caller.

use tracing::trace;

use crate::engine::{Engine, NodeId, RawKind};
use crate::error::Result;
use crate::registry::Registry;

/// Links `node` under `parent`, before `anchor` or at the end.
///
/// Returns the node that ends up in the list, which differs from `node`
/// when text was merged into a neighbour.
pub(crate) fn link(
    engine: &mut Engine<Registry>,
    parent: NodeId,
    anchor: Option<NodeId>,
    node: NodeId,
) -> Result<NodeId> {
    let placed = match anchor {
        Some(next) => engine.add_prev_sibling(next, node)?,
        None => engine.add_child(parent, node)?,
    };
    Ok(placed)
}

/// Deep-copies `src` into `doc` and links the copy. A copy that cannot be
/// linked is freed again. Declarations the copy made for bindings its new
/// parent already has in scope are dropped.
pub(crate) fn clone_into(
    engine: &mut Engine<Registry>,
    src: NodeId,
    doc: NodeId,
    parent: NodeId,
    anchor: Option<NodeId>,
) -> Result<NodeId> {
    let copy = engine.copy_node(src, doc)?;
    let placed = match link(engine, parent, anchor, copy) {
        Ok(placed) => placed,
        Err(e) => {
            engine.free_node(copy);
            return Err(e);
        }
    };
    if placed == copy && engine.kind(copy) == RawKind::Element {
        engine.drop_redundant_ns(copy);
    }
    trace!(
        src = src.into_raw(),
        copy = placed.into_raw(),
        parent = parent.into_raw(),
        "cloned subtree"
    );
    Ok(placed)
}

/// Moves `node` (from any document) under `parent`.
///
/// A node created unlinked through its document stops being that
/// document's orphan once it is placed.
pub(crate) fn adopt(
    engine: &mut Engine<Registry>,
    parent: NodeId,
    anchor: Option<NodeId>,
    node: NodeId,
) -> Result<NodeId> {
    let from = engine.doc_of(node);
    let placed = link(engine, parent, anchor, node)?;
    if let Some(from) = from {
        engine.observer_mut().orphans.forget_node(from, node);
    }
    trace!(
        node = node.into_raw(),
        from = from.map(NodeId::into_raw),
        to = engine.doc_of(parent).map(NodeId::into_raw),
        "adopted subtree"
    );
    Ok(placed)
}
