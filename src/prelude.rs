//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use aetheric_nodes::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Engine facade
pub use crate::engine::{Engine, EngineBuilder};

// Config and errors
pub use crate::config::FrameworkConfig;
pub use crate::error::{Error, IndexError, RegistryError};

// Services
pub use crate::core::project::{AppLifecycle, ProjectContext};
pub use crate::core::registry::ServiceRegistry;

// Nodes
pub use crate::core::node::{
    node, node_as, node_as_mut, Attachment, Capabilities, Node, NodeContext, NodeRef, NodeRefExt,
    PauseOwner, TypeKey,
};

// Connectors
pub use crate::core::connector::{ConnectorKind, ConnectorRef, EntityConnector};

// Scenes
pub use crate::core::index::SceneEntityIndex;
pub use crate::core::scene::{SceneBuilder, SceneHandle, SceneKey, SceneOrchestrator};
