//=========================================================================
// Node Context
//=========================================================================
//
// Passed to `bind` and `construct`. Gives a node its scope registry and
// the connector that owns it, plus shortcuts to the scene services.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::rc::{Rc, Weak};

//=== Internal Dependencies ===============================================

use crate::core::connector::{ConnectorRef, EntityConnector};
use crate::core::index::SceneEntityIndex;
use crate::core::registry::ServiceRegistry;
use crate::core::scene::SceneHandle;
use crate::error::RegistryError;

//=== NodeContext =========================================================

pub struct NodeContext<'a> {
    registry: &'a Rc<ServiceRegistry>,
    connector: &'a ConnectorRef,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(registry: &'a Rc<ServiceRegistry>, connector: &'a ConnectorRef) -> Self {
        Self { registry, connector }
    }

    /// The registry the connector was executed with.
    pub fn registry(&self) -> &Rc<ServiceRegistry> {
        self.registry
    }

    pub fn connector(&self) -> &ConnectorRef {
        self.connector
    }

    /// Weak handle for nodes that keep a reference to their owner.
    pub fn connector_weak(&self) -> Weak<EntityConnector> {
        Rc::downgrade(self.connector)
    }

    pub fn get<T: 'static>(&self) -> Result<Rc<T>, RegistryError> {
        self.registry.get::<T>()
    }

    pub fn try_get<T: 'static>(&self) -> Option<Rc<T>> {
        self.registry.try_get::<T>()
    }

    /// Spawn/despawn handle of the scene this connector belongs to.
    pub fn scene(&self) -> Option<SceneHandle> {
        self.connector
            .scene()
            .or_else(|| self.registry.try_get::<SceneHandle>().map(|h| (*h).clone()))
    }

    pub fn index(&self) -> Option<Rc<SceneEntityIndex>> {
        self.registry.try_get::<SceneEntityIndex>()
    }
}
