//=========================================================================
// Scene Builder
//=========================================================================

//=== Internal Dependencies ===============================================

use super::SceneOrchestrator;
use crate::config::FrameworkConfig;
use crate::core::connector::ConnectorRef;

//=== SceneBuilder ========================================================

/// Declares the content of one scene before it executes.
///
/// * statics: connectors authored with the scene. They are pre-registered
///   and executed in sorted order during bootstrap, and their manual ids
///   are reserved before any dynamic allocation.
/// * unbaked: connectors present in the scene but not declared static.
///   Active ones are registered as dynamic connectors at bootstrap unless
///   auto-registration is turned off. Inactive ones are linked to the
///   scene and register themselves when activated.
///
/// # Example
///
/// ```
/// use aetheric_nodes::core::connector::EntityConnector;
/// use aetheric_nodes::core::scene::SceneBuilder;
///
/// let scene = SceneBuilder::new("Level1")
///     .with_static(EntityConnector::builder("Player").entity_id(1).tag("Hero").build())
///     .with_static(EntityConnector::builder("Camera").order(-10).build())
///     .build();
///
/// scene.execute(None);
/// assert!(scene.index().try_get_by_id(1).is_some());
/// ```
pub struct SceneBuilder {
    name: String,
    statics: Vec<ConnectorRef>,
    unbaked: Vec<ConnectorRef>,
    auto_register_unbaked: Option<bool>,
    config: Option<FrameworkConfig>,
}

impl SceneBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statics: Vec::new(),
            unbaked: Vec::new(),
            auto_register_unbaked: None,
            config: None,
        }
    }

    pub fn with_static(mut self, connector: ConnectorRef) -> Self {
        self.statics.push(connector);
        self
    }

    pub fn with_statics(mut self, connectors: impl IntoIterator<Item = ConnectorRef>) -> Self {
        self.statics.extend(connectors);
        self
    }

    pub fn with_unbaked(mut self, connector: ConnectorRef) -> Self {
        self.unbaked.push(connector);
        self
    }

    /// Overrides `FrameworkConfig::auto_register_unbaked_connectors`.
    pub fn auto_register_unbaked(mut self, enabled: bool) -> Self {
        self.auto_register_unbaked = Some(enabled);
        self
    }

    /// Scene-local config. Without one the scene uses the config found in
    /// the parent registry, or the defaults.
    pub fn config(mut self, config: FrameworkConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> SceneOrchestrator {
        SceneOrchestrator::new(
            self.name,
            self.statics,
            self.unbaked,
            self.auto_register_unbaked,
            self.config,
        )
    }
}
