//=========================================================================
// Aetheric Nodes Engine
//
// Host-facing facade over the project scope and the loaded scenes.
//
// Architecture:
// ```text
//     EngineBuilder  ──build()──>  Engine<S>
//         │                          │
//         ├─ with_config()           ├─ ProjectContext (root registry)
//         ├─ with_config_file()      └─ one SceneOrchestrator per key
//         └─ with_project_root()        (child registry of the project)
// ```
//
// The host owns the loop and forwards Tick/FixedTick/LateTick, pause and
// application notifications. Scenes are driven in load order.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::marker::PhantomData;
use std::path::Path;
use std::rc::Rc;

use log::{info, warn};

//=== Internal Dependencies ===============================================

use crate::config::FrameworkConfig;
use crate::core::connector::ConnectorRef;
use crate::core::node::PauseOwner;
use crate::core::project::{AppLifecycle, ProjectContext};
use crate::core::registry::ServiceRegistry;
use crate::core::scene::{SceneBuilder, SceneKey, SceneOrchestrator};
use crate::error::ConfigError;

//=== EngineBuilder =======================================================

/// Builder for configuring and constructing an [`Engine`].
///
/// # Default Values
///
/// - **Config**: [`FrameworkConfig::default`]
/// - **Project root**: none
///
/// # Examples
///
/// ```
/// use aetheric_nodes::EngineBuilder;
/// use aetheric_nodes::core::connector::EntityConnector;
/// use aetheric_nodes::core::scene::{SceneBuilder, SceneKey};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum GameScene { Main }
/// impl SceneKey for GameScene {}
///
/// let mut engine = EngineBuilder::<GameScene>::new().build();
/// engine.load_scene(
///     GameScene::Main,
///     SceneBuilder::new("Main").with_static(EntityConnector::builder("Player").build()),
/// );
///
/// engine.tick(1.0 / 60.0);
/// engine.shutdown();
/// ```
pub struct EngineBuilder<S: SceneKey> {
    config: FrameworkConfig,
    project_root: Option<ConnectorRef>,
    _phantom: PhantomData<S>,
}

impl<S: SceneKey> EngineBuilder<S> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: FrameworkConfig::default(),
            project_root: None,
            _phantom: PhantomData,
        }
    }

    pub fn with_config(mut self, config: FrameworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads the config from a TOML file.
    pub fn with_config_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.config = FrameworkConfig::load_from_file(path)?;
        Ok(self)
    }

    /// Connector executed against the project registry when the engine is
    /// built. Its nodes typically install project-wide services.
    pub fn with_project_root(mut self, root: ConnectorRef) -> Self {
        self.project_root = Some(root);
        self
    }

    /// Builds the engine, creating the project scope.
    pub fn build(self) -> Engine<S> {
        if self.config.should_log_boot() {
            info!(
                "Building engine (project root: {})",
                self.project_root.as_ref().map_or("none", |root| root.name())
            );
        }

        Engine {
            scenes: Vec::new(),
            project: ProjectContext::new(self.config, self.project_root),
        }
    }
}

impl<S: SceneKey> Default for EngineBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

//=== Engine ==============================================================

/// Aetheric Nodes runtime.
///
/// # Architecture
///
/// ```text
/// Engine
///   ├─► ProjectContext (FrameworkConfig, AppLifecycle, root connector)
///   └─► SceneOrchestrator × N (keyed by S, driven in load order)
///         └─► EntityConnector → Node
/// ```
pub struct Engine<S: SceneKey> {
    // Scenes go first so they are torn down before the project scope.
    scenes: Vec<(S, SceneOrchestrator)>,
    project: ProjectContext,
}

impl<S: SceneKey> Engine<S> {
    //--- Scenes -----------------------------------------------------------

    /// Builds and executes a scene under `key`.
    ///
    /// A scene already loaded under the same key is disposed and replaced.
    pub fn load_scene(&mut self, key: S, builder: SceneBuilder) -> &SceneOrchestrator {
        if self.unload_scene(key) {
            warn!("scene {:?} was already loaded, replacing it", key);
        }

        let scene = builder.build();
        if self.project.config().should_log_boot() {
            info!("Loading scene {:?} ({})", key, scene.name());
        }
        scene.execute(Some(self.project.registry()));

        self.scenes.push((key, scene));
        let index = self.scenes.len() - 1;
        &self.scenes[index].1
    }

    /// Disposes the scene loaded under `key`. Returns `false` if none was.
    pub fn unload_scene(&mut self, key: S) -> bool {
        let Some(position) = self.scenes.iter().position(|(k, _)| *k == key) else {
            return false;
        };

        let (_, scene) = self.scenes.remove(position);
        if self.project.config().should_log_boot() {
            info!("Unloading scene {:?} ({})", key, scene.name());
        }
        scene.dispose();
        true
    }

    pub fn scene(&self, key: S) -> Option<&SceneOrchestrator> {
        self.scenes
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, scene)| scene)
    }

    pub fn is_loaded(&self, key: S) -> bool {
        self.scene(key).is_some()
    }

    /// Loaded keys in load order.
    pub fn loaded_scenes(&self) -> Vec<S> {
        self.scenes.iter().map(|(key, _)| *key).collect()
    }

    //--- Frame Dispatch ---------------------------------------------------

    pub fn tick(&self, dt: f32) {
        for (_, scene) in &self.scenes {
            scene.tick(dt);
        }
    }

    pub fn fixed_tick(&self, dt: f32) {
        for (_, scene) in &self.scenes {
            scene.fixed_tick(dt);
        }
    }

    pub fn late_tick(&self, dt: f32) {
        for (_, scene) in &self.scenes {
            scene.late_tick(dt);
        }
    }

    //--- Pause ------------------------------------------------------------

    /// Pauses every loaded scene on behalf of `owner`.
    pub fn pause(&self, owner: PauseOwner) {
        for (_, scene) in &self.scenes {
            scene.pause(owner);
        }
    }

    pub fn resume(&self, owner: PauseOwner) {
        for (_, scene) in &self.scenes {
            scene.resume(owner);
        }
    }

    //--- Application Notifications ----------------------------------------

    pub fn notify_focus(&self, has_focus: bool) {
        self.project.lifecycle().raise_focus_changed(has_focus, Some("Engine"));
    }

    pub fn notify_pause(&self, is_paused: bool) {
        self.project.lifecycle().raise_pause_changed(is_paused, Some("Engine"));
    }

    pub fn notify_quit(&self) {
        self.project.lifecycle().raise_quit(Some("Engine"));
    }

    //--- Accessors --------------------------------------------------------

    pub fn project(&self) -> &ProjectContext {
        &self.project
    }

    pub fn registry(&self) -> &Rc<ServiceRegistry> {
        self.project.registry()
    }

    pub fn config(&self) -> &Rc<FrameworkConfig> {
        self.project.config()
    }

    pub fn lifecycle(&self) -> &Rc<AppLifecycle> {
        self.project.lifecycle()
    }

    //--- Shutdown ---------------------------------------------------------

    /// Unloads every scene, most recently loaded first.
    pub fn shutdown(&mut self) {
        while let Some((key, scene)) = self.scenes.pop() {
            if self.project.config().should_log_boot() {
                info!("Unloading scene {:?} ({})", key, scene.name());
            }
            scene.dispose();
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
