//=========================================================================
// Core Systems
//
// Building blocks of the node framework, from the bottom up:
//
//   registry   → typed service lookup with parent delegation
//   node       → the Node trait, capabilities, host attachment tree
//   connector  → per-entity node aggregate and its lifecycle
//   index      → id / tag / type lookup over one scope
//   scene      → scope orchestration and deferred mutation
//   project    → project scope and application lifecycle
//
// Everything here is single-threaded: handles are `Rc`/`Weak` and
// mutation goes through `Cell`/`RefCell`.
//
//=========================================================================

pub mod connector;
pub mod index;
pub mod node;
pub mod project;
pub mod registry;
pub mod scene;
