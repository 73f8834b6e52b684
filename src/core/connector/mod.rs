//=========================================================================
// Connector Module
//=========================================================================
//
// Per-entity aggregate that owns, sorts and drives its nodes.
//
// Lifecycle:
//   Uninitialized ──execute()──→ Executed ──dispose()──→ Disposed
//
// No reverse transitions. `execute` and `dispose` are idempotent, and
// frame dispatch is a no-op outside the Executed state.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::TypeId;
use std::cmp::Ordering;
use std::rc::Rc;

//=== Submodules ==========================================================

mod builder;
mod entity_connector;

pub use builder::ConnectorBuilder;
pub use entity_connector::{ConnectorState, EntityConnector};

//=== Internal Dependencies ===============================================

use crate::core::node::TypeKey;

/// Shared handle to a connector.
pub type ConnectorRef = Rc<EntityConnector>;

//=== ConnectorKind =======================================================

/// Marker for a category of connector that can be queried by type.
///
/// Every kind is assignable to [`EntityConnector`], so a derived query for
/// `EntityConnector` returns connectors of every kind.
///
/// ```
/// use aetheric_nodes::core::connector::{ConnectorKind, EntityConnector};
/// use aetheric_nodes::core::node::TypeKey;
///
/// struct Actor;
/// impl ConnectorKind for Actor {}
///
/// struct Player;
/// impl ConnectorKind for Player {
///     fn base_kinds() -> Vec<TypeKey> {
///         vec![TypeKey::of::<Actor>()]
///     }
/// }
///
/// let player = EntityConnector::builder("Player").kind::<Player>().build();
/// assert!(player.is_kind::<Actor>());
/// assert!(player.is_kind::<EntityConnector>());
/// ```
pub trait ConnectorKind: 'static {
    fn base_kinds() -> Vec<TypeKey> {
        Vec::new()
    }
}

impl ConnectorKind for EntityConnector {}

/// Resolved kind of one connector: its own key plus every assignable base.
#[derive(Debug, Clone)]
pub(crate) struct KindInfo {
    pub(crate) key: TypeKey,
    pub(crate) bases: Vec<TypeKey>,
}

impl KindInfo {
    pub(crate) fn of<K: ConnectorKind>() -> Self {
        let key = TypeKey::of::<K>();
        let mut bases = K::base_kinds();
        let root = TypeKey::of::<EntityConnector>();

        if key != root && !bases.contains(&root) {
            bases.push(root);
        }

        Self { key, bases }
    }

    pub(crate) fn is(&self, target: TypeId) -> bool {
        self.key.id == target || self.bases.iter().any(|base| base.id == target)
    }
}

//=== Ordering ============================================================

/// Canonical dispatch order: `order` ascending, then name.
pub fn compare_connectors(a: &EntityConnector, b: &EntityConnector) -> Ordering {
    a.order()
        .cmp(&b.order())
        .then_with(|| a.name().cmp(b.name()))
}

pub(crate) fn same_connector(a: &EntityConnector, b: &EntityConnector) -> bool {
    std::ptr::eq(a, b)
}
