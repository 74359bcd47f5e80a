//! Thread-wide engine state.
//!
//! The engine, its wrapper registry and the orphan bookkeeping live in one
//! thread-local [`Runtime`]. Its lifecycle is an explicit state machine:
//!
//! ```text
//! Uninitialized --ensure_initialized--> Active --teardown--> TornDown
//!                                         ^                     |
//!                                         +--ensure_initialized-+
//! ```
//!
//! Every public entry point goes through [`with`], which initializes (or
//! rebuilds) the runtime on demand. Each build gets a new generation number;
//! documents and handles from an earlier generation are inert.

use std::cell::RefCell;

use tracing::debug;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::registry::Registry;

/// Lifecycle state of the thread's runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Never initialized on this thread.
    Uninitialized,
    /// Initialized and usable.
    Active,
    /// Torn down; the next entry point rebuilds it.
    TornDown,
}

/// The live engine plus the generation it belongs to.
#[derive(Debug)]
pub(crate) struct Runtime {
    pub(crate) engine: Engine<Registry>,
    generation: u64,
}

impl Runtime {
    fn new(generation: u64) -> Self {
        Self {
            engine: Engine::new(Registry::default()),
            generation,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn registry(&self) -> &Registry {
        self.engine.observer()
    }

    /// Fails with `DanglingHandle` unless `generation` is the current one.
    pub(crate) fn check_generation(&self, generation: u64) -> Result<()> {
        if generation == self.generation {
            Ok(())
        } else {
            Err(Error::DanglingHandle)
        }
    }
}

struct Slot {
    state: State,
    runtime: Option<Runtime>,
    generation: u64,
}

impl Slot {
    fn activate(&mut self) -> &mut Runtime {
        let generation = self.generation + 1;
        let state = &mut self.state;
        let counter = &mut self.generation;
        self.runtime.get_or_insert_with(|| {
            debug!(generation, previous = ?*state, "initializing runtime");
            *state = State::Active;
            *counter = generation;
            Runtime::new(generation)
        })
    }
}

thread_local! {
    static RUNTIME: RefCell<Slot> = const {
        RefCell::new(Slot {
            state: State::Uninitialized,
            runtime: None,
            generation: 0,
        })
    };
}

fn reentrant() -> Error {
    Error::InternalConsistency("re-entrant call into the object layer".to_string())
}

fn thread_exiting() -> Error {
    Error::InternalConsistency("runtime accessed during thread teardown".to_string())
}

/// Runs `f` against the active runtime, building it first if needed.
pub(crate) fn with<R>(f: impl FnOnce(&mut Runtime) -> Result<R>) -> Result<R> {
    RUNTIME
        .try_with(|cell| {
            let mut slot = cell.try_borrow_mut().map_err(|_| reentrant())?;
            f(slot.activate())
        })
        .unwrap_or_else(|_| Err(thread_exiting()))
}

/// Runs `f` only if the runtime of `generation` is still the active one.
///
/// Used from `Drop` impls, which must neither rebuild the runtime nor fail.
pub(crate) fn with_generation(generation: u64, f: impl FnOnce(&mut Runtime)) {
    let _ = RUNTIME.try_with(|cell| {
        if let Ok(mut slot) = cell.try_borrow_mut() {
            if let Some(rt) = slot.runtime.as_mut().filter(|rt| rt.generation == generation) {
                f(rt);
            }
        }
    });
}

/// Initializes the runtime of the current thread if it is not active.
///
/// Returns the active generation.
///
/// # Errors
///
/// Returns [`Error::InternalConsistency`] if called while another operation
/// of this layer is in progress on the same thread.
pub fn ensure_initialized() -> Result<u64> {
    with(|rt| Ok(rt.generation))
}

/// Tears the runtime down, releasing every node of every document.
///
/// Documents and handles created before the teardown become inert: their
/// operations fail with [`Error::DanglingHandle`]. Returns the number of
/// documents that were still alive.
///
/// # Errors
///
/// Returns [`Error::InternalConsistency`] if called while another operation
/// of this layer is in progress on the same thread.
pub fn teardown() -> Result<usize> {
    RUNTIME
        .try_with(|cell| {
            let mut slot = cell.try_borrow_mut().map_err(|_| reentrant())?;
            let Some(rt) = slot.runtime.take() else {
                return Ok(0);
            };
            let live = rt.registry().document_count();
            debug!(generation = rt.generation, live_documents = live, "tearing down runtime");
            slot.state = State::TornDown;
            drop(rt);
            Ok(live)
        })
        .unwrap_or_else(|_| Err(thread_exiting()))
}

/// Returns the lifecycle state of the current thread's runtime.
#[must_use]
pub fn state() -> State {
    RUNTIME
        .try_with(|cell| cell.try_borrow().map_or(State::Active, |slot| slot.state))
        .unwrap_or(State::TornDown)
}

/// Returns the generation of the active runtime, or `None` if there is none.
#[must_use]
pub fn generation() -> Option<u64> {
    RUNTIME
        .try_with(|cell| {
            cell.try_borrow()
                .ok()
                .and_then(|slot| slot.runtime.as_ref().map(|rt| rt.generation))
        })
        .ok()
        .flatten()
}

/// Returns the number of live wrapper objects on this thread.
///
/// # Errors
///
/// Returns [`Error::InternalConsistency`] on re-entrant use.
pub fn live_wrappers() -> Result<usize> {
    with(|rt| Ok(rt.registry().live_wrappers()))
}

/// Returns the number of live engine nodes on this thread, document nodes
/// included.
///
/// # Errors
///
/// Returns [`Error::InternalConsistency`] on re-entrant use.
pub fn live_nodes() -> Result<usize> {
    with(|rt| Ok(rt.engine.live_nodes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test runs on its own thread, so the thread-local starts fresh.

    #[test]
    fn test_lifecycle_state_machine() {
        assert_eq!(state(), State::Uninitialized);
        assert_eq!(generation(), None);

        let Ok(first) = ensure_initialized() else {
            panic!("initialization failed");
        };
        assert_eq!(state(), State::Active);
        assert_eq!(ensure_initialized().ok(), Some(first));

        assert_eq!(teardown().ok(), Some(0));
        assert_eq!(state(), State::TornDown);
        assert_eq!(generation(), None);

        let Ok(second) = ensure_initialized() else {
            panic!("rebuild failed");
        };
        assert!(second > first);
        assert_eq!(state(), State::Active);
    }

    #[test]
    fn test_reentrant_use_is_rejected() {
        let nested = with(|_| Ok(ensure_initialized()));
        let Ok(inner) = nested else {
            panic!("outer call failed");
        };
        assert!(matches!(inner, Err(Error::InternalConsistency(_))));
    }

    #[test]
    fn test_teardown_without_runtime_is_noop() {
        assert_eq!(teardown().ok(), Some(0));
        assert_eq!(state(), State::Uninitialized);
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let Ok(first) = ensure_initialized() else {
            panic!("initialization failed");
        };
        let _ = teardown();
        let _ = ensure_initialized();
        let mut called = false;
        with_generation(first, |_| called = true);
        assert!(!called);
    }
}
