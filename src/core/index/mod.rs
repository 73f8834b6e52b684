//=========================================================================
// Index Module
//=========================================================================

mod scene_entity_index;
mod type_buckets;

pub use scene_entity_index::{RegisterOutcome, SceneEntityIndex};
