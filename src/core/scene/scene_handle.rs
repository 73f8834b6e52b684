//=========================================================================
// Scene Handle
//=========================================================================
//
// Cloneable link from connectors and nodes back to their scene.
//
// Spawn and despawn requests go through the handle. While the scene is
// in a dispatch pass they are queued on the scene's pending channel and
// applied when the pass ends; otherwise they apply immediately.
//
// The handle holds the scene weakly: once the scene is gone every
// request is silently dropped.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::rc::{Rc, Weak};

//=== Internal Dependencies ===============================================

use super::orchestrator::SceneCore;
use super::ScopeId;
use crate::core::connector::{compare_connectors, ConnectorRef};
use crate::core::index::SceneEntityIndex;
use crate::core::registry::ServiceRegistry;

//=== SceneHandle =========================================================

#[derive(Clone)]
pub struct SceneHandle {
    core: Weak<SceneCore>,
    scope: ScopeId,
    name: Rc<str>,
}

impl SceneHandle {
    pub(crate) fn new(core: Weak<SceneCore>, scope: ScopeId, name: Rc<str>) -> Self {
        Self { core, scope, name }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the scene has executed and is still alive.
    pub fn is_ready(&self) -> bool {
        self.core.upgrade().is_some_and(|core| core.is_ready())
    }

    /// Whether the scene is inside a dispatch pass right now.
    pub fn is_iterating(&self) -> bool {
        self.core.upgrade().is_some_and(|core| core.is_iterating())
    }

    pub fn registry(&self) -> Option<Rc<ServiceRegistry>> {
        self.core.upgrade().and_then(|core| core.registry())
    }

    pub fn index(&self) -> Option<Rc<SceneEntityIndex>> {
        self.core.upgrade().map(|core| core.index())
    }

    //--- Spawning ---------------------------------------------------------

    /// Registers and executes a runtime connector.
    pub fn register_and_execute(&self, connector: &ConnectorRef) {
        if let Some(core) = self.core.upgrade() {
            core.register_and_execute(connector);
        }
    }

    /// Alias of [`register_and_execute`](Self::register_and_execute).
    pub fn spawn(&self, connector: &ConnectorRef) {
        self.register_and_execute(connector);
    }

    /// Registers a batch in canonical connector order.
    pub fn spawn_all(&self, connectors: impl IntoIterator<Item = ConnectorRef>) {
        let mut batch: Vec<ConnectorRef> = connectors.into_iter().collect();
        batch.sort_by(|a, b| compare_connectors(a, b));

        for connector in &batch {
            self.register_and_execute(connector);
        }
    }

    pub fn unregister(&self, connector: &ConnectorRef) {
        if let Some(core) = self.core.upgrade() {
            core.unregister(connector);
        }
    }

    /// Destroys a connector: disposes it, which also unregisters it.
    pub fn despawn(&self, connector: &ConnectorRef) {
        connector.dispose();
    }
}

impl std::fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneHandle")
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("alive", &(self.core.strong_count() > 0))
            .finish()
    }
}
