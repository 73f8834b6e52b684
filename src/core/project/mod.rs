//=========================================================================
// Project Module
//=========================================================================

mod lifecycle;
mod project_context;

pub use lifecycle::{AppLifecycle, ListenerId};
pub use project_context::ProjectContext;
