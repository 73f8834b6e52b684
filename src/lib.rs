//=========================================================================
// Aetheric Nodes: Library Root
//
// Entity/node lifecycle framework for a frame-driven host.
//
// Responsibilities:
// - Resolve services through a chain of scoped registries
// - Drive each entity's nodes through Bind → Construct → Init phases,
//   cached per-frame dispatch, pause and teardown
// - Index live entities by id, tag and type within a scene
// - Orchestrate a scene's entities with deferred mutation during passes
//
// Typical usage:
// ```
// use aetheric_nodes::prelude::*;
//
// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
// enum Scenes { Main }
// impl SceneKey for Scenes {}
//
// let mut engine = EngineBuilder::<Scenes>::new().build();
// engine.load_scene(Scenes::Main, SceneBuilder::new("Main"));
// engine.tick(1.0 / 60.0);
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` holds the framework subsystems (registry, connectors, index,
// scenes). `config` and `error` are shared by all of them.
//
pub mod config;
pub mod core;
pub mod error;
pub mod prelude;

//--- Internal Modules ----------------------------------------------------
//
// `engine` defines the host-facing facade.
//
mod engine;

//--- Public Exports ------------------------------------------------------

pub use config::{FrameworkConfig, LogLevel};
pub use engine::{Engine, EngineBuilder};
pub use error::{ConfigError, Error, IndexError, RegistryError};
