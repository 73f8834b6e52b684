//=========================================================================
// Scene System
//=========================================================================
//
// One orchestrator per scope (scene). It owns every connector in that
// scope, the scope's registry and its entity index, and drives the frame
// phases.
//
// Architecture:
//   SceneOrchestrator
//     ├─ statics:  Vec<ConnectorRef>    (declared up front, sorted)
//     ├─ dynamics: Vec<ConnectorRef>    (spawned at runtime, sorted insert)
//     ├─ index:    SceneEntityIndex
//     ├─ registry: ServiceRegistry      (child of the project registry)
//     └─ pending:  crossbeam channel of SceneCommand
//
// Flow (per frame phase):
//   apply pending → iterating = true → statics, dynamics → iterating = false
//   → apply pending
//
// Nodes reach the orchestrator only through a `SceneHandle`. Requests
// raised while a pass is running travel through the pending channel and
// are applied after the pass.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};

//=== Module Declarations =================================================

mod builder;
mod orchestrator;
mod scene_handle;

//=== Public API ==========================================================

pub use builder::SceneBuilder;
pub use orchestrator::SceneOrchestrator;
pub use scene_handle::SceneHandle;

//=== Internal Dependencies ===============================================

use crate::core::connector::ConnectorRef;

//=== Scene Key Trait =====================================================

/// Marker trait for scene identifiers.
///
/// Typically implemented by game-specific enums and used by
/// [`Engine`](crate::Engine) to address loaded scenes.
pub trait SceneKey: Clone + Copy + Eq + Hash + Debug + 'static {}

//=== ScopeId =============================================================

/// Process-unique identity of one scene scope.
///
/// Connectors remember the scope that declared them static so a scene
/// never registers its own statics as dynamic connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

static NEXT_SCOPE: AtomicU32 = AtomicU32::new(1);

impl ScopeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

//=== Scene Commands ======================================================

/// Mutation request deferred until the current dispatch pass ends.
pub(crate) enum SceneCommand {
    Register(ConnectorRef),
    Unregister(ConnectorRef),
}
