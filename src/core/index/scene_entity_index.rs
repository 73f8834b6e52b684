//=========================================================================
// Scene Entity Index
//=========================================================================
//
// Multi-key lookup over the connectors registered in one scope.
//
// Views:
//   ids:        u32 → connector              (unique)
//   tags:       tag → [connector]            (insertion order)
//   connectors: connector kind → [connector] (plus derived kinds)
//   nodes:      node type → [node]           (plus declared base types)
//
// Every entry is weak. A connector that was dropped or disposed without
// being unregistered is skipped and pruned by the next read that meets
// it; it is never an error.
//
// Removal works from the record captured at registration, so it stays
// complete even if the connector's tag, id or nodes changed since.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use log::warn;

//=== Internal Dependencies ===============================================

use super::type_buckets::{BucketEntry, TypeBuckets};
use crate::core::connector::{ConnectorKind, ConnectorRef, EntityConnector};
use crate::core::node::{same_weak_node, NodeRef, WeakNodeRef};
use crate::core::scene::ScopeId;
use crate::error::IndexError;

//=== Entries =============================================================

impl BucketEntry for Weak<EntityConnector> {
    type Handle = ConnectorRef;

    fn resolve(&self) -> Option<ConnectorRef> {
        self.upgrade().filter(|connector| !connector.is_disposed())
    }
}

#[derive(Clone)]
struct NodeEntry {
    node: WeakNodeRef,
    owner: Weak<EntityConnector>,
}

impl BucketEntry for NodeEntry {
    type Handle = NodeRef;

    fn resolve(&self) -> Option<NodeRef> {
        self.owner.resolve()?;
        self.node.upgrade()
    }
}

/// What the index stored for one connector.
struct Registration {
    connector: Weak<EntityConnector>,
    id: u32,
    tag: Option<String>,
    kind: TypeId,
    nodes: Vec<(TypeId, WeakNodeRef)>,
}

//=== RegisterOutcome =====================================================

/// Result of [`SceneEntityIndex::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Newly registered under `id`.
    Registered { id: u32 },

    /// The connector was already a member. Nothing changed.
    AlreadyRegistered,

    /// Every id is reserved. The connector was not registered.
    IdSpaceExhausted,

    /// The requested id belonged to another live connector, so the
    /// newcomer received a fresh one.
    IdReassigned { requested: u32, assigned: u32 },
}

impl RegisterOutcome {
    pub fn id(self) -> Option<u32> {
        match self {
            RegisterOutcome::Registered { id } => Some(id),
            RegisterOutcome::IdReassigned { assigned, .. } => Some(assigned),
            RegisterOutcome::AlreadyRegistered | RegisterOutcome::IdSpaceExhausted => None,
        }
    }
}

//=== IndexState ==========================================================

struct IndexState {
    registered: HashMap<usize, Registration>,
    ids: HashMap<u32, Weak<EntityConnector>>,
    tags: HashMap<String, Vec<Weak<EntityConnector>>>,
    connectors: TypeBuckets<Weak<EntityConnector>>,
    nodes: TypeBuckets<NodeEntry>,
    reserved: HashSet<u32>,
    next_id: u32,
}

impl IndexState {
    fn new() -> Self {
        Self {
            registered: HashMap::new(),
            ids: HashMap::new(),
            tags: HashMap::new(),
            connectors: TypeBuckets::new(),
            nodes: TypeBuckets::new(),
            reserved: HashSet::new(),
            next_id: 1,
        }
    }

    /// Scans upward from the cursor, wrapping past `u32::MAX` back to 1.
    /// Ids taken or reserved are skipped, so wrapping never reuses one.
    fn allocate_id(&mut self) -> Option<u32> {
        let start = self.next_id.max(1);
        let mut candidate = start;

        while self.ids.contains_key(&candidate) || self.reserved.contains(&candidate) {
            candidate = candidate.checked_add(1).unwrap_or(1);
            if candidate == start {
                return None;
            }
        }

        self.reserved.insert(candidate);
        self.next_id = candidate.checked_add(1).unwrap_or(1);
        Some(candidate)
    }

    /// Live, non-disposed holder of `id` other than `connector`.
    fn conflicting_holder(&self, id: u32, connector: &Weak<EntityConnector>) -> Option<ConnectorRef> {
        self.ids
            .get(&id)
            .filter(|holder| !Weak::ptr_eq(holder, connector))
            .and_then(BucketEntry::resolve)
    }

    fn remove(&mut self, record: Registration) {
        let Registration { connector, id, tag, kind, nodes } = record;

        if self.ids.get(&id).is_some_and(|holder| Weak::ptr_eq(holder, &connector)) {
            self.ids.remove(&id);
        }

        if let Some(tag) = tag {
            if let Some(list) = self.tags.get_mut(&tag) {
                list.retain(|entry| !Weak::ptr_eq(entry, &connector));
                if list.is_empty() {
                    self.tags.remove(&tag);
                }
            }
        }

        self.connectors
            .remove(kind, |entry| Weak::ptr_eq(entry, &connector));

        for (key, node) in &nodes {
            self.nodes
                .remove(*key, |entry| same_weak_node(&entry.node, node));
        }
    }
}

fn address(connector: &EntityConnector) -> usize {
    connector as *const EntityConnector as usize
}

fn normalize(tag: &str) -> Option<&str> {
    let trimmed = tag.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

//=== SceneEntityIndex ====================================================

/// Multi-key registry of the connectors and nodes of one scope.
///
/// Registered in the scope's [`ServiceRegistry`](crate::core::registry::ServiceRegistry)
/// by the scene orchestrator, so nodes resolve it in `bind`/`construct`.
pub struct SceneEntityIndex {
    state: RefCell<IndexState>,
}

impl SceneEntityIndex {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(IndexState::new()),
        }
    }

    //--- Ids --------------------------------------------------------------

    /// Returns the smallest free id at or after the cursor and reserves it.
    /// `None` once every id is reserved.
    pub fn allocate_id(&self) -> Option<u32> {
        self.state.borrow_mut().allocate_id()
    }

    /// Reserves the manual ids of the connectors declared static for
    /// `scope` and moves the cursor past the largest one.
    pub fn prime_reserved_ids(&self, connectors: &[ConnectorRef], scope: ScopeId) {
        let mut state = self.state.borrow_mut();
        let mut max = 0;

        for connector in connectors {
            if !connector.is_static_for(scope) {
                continue;
            }
            if let Some(id) = connector.entity_id() {
                state.reserved.insert(id);
                max = max.max(id);
            }
        }

        // With `u32::MAX` reserved the cursor stays put; allocation skips it.
        if let Some(next) = max.checked_add(1) {
            if max > 0 && state.next_id <= max {
                state.next_id = next;
            }
        }
    }

    //--- Registration -----------------------------------------------------

    /// Adds a connector to every view. Idempotent.
    ///
    /// A connector without an id receives a fresh one. A manual id already
    /// held by another live connector stays with that connector; the
    /// newcomer is given a fresh id and the conflict is logged.
    pub fn register(&self, connector: &ConnectorRef) -> RegisterOutcome {
        let key = address(connector);
        let weak = Rc::downgrade(connector);
        let slots = connector.node_slots();
        let kind = connector.kind_info().clone();
        let tag = connector.tag();

        let mut state = self.state.borrow_mut();
        if state.registered.contains_key(&key) {
            return RegisterOutcome::AlreadyRegistered;
        }

        let outcome = match connector.entity_id() {
            None => match state.allocate_id() {
                Some(id) => RegisterOutcome::Registered { id },
                None => RegisterOutcome::IdSpaceExhausted,
            },
            Some(requested) => match state.conflicting_holder(requested, &weak) {
                None => {
                    state.reserved.insert(requested);
                    RegisterOutcome::Registered { id: requested }
                }
                Some(holder) => {
                    let Some(assigned) = state.allocate_id() else {
                        warn!(
                            "duplicate entity id {} on '{}' and no free id left",
                            requested,
                            connector.name()
                        );
                        return RegisterOutcome::IdSpaceExhausted;
                    };
                    warn!(
                        "duplicate entity id {} on '{}' (held by '{}'), reassigned to {}",
                        requested,
                        connector.name(),
                        holder.name(),
                        assigned
                    );
                    RegisterOutcome::IdReassigned { requested, assigned }
                }
            },
        };

        let Some(id) = outcome.id() else {
            warn!("entity id space exhausted, '{}' not registered", connector.name());
            return outcome;
        };
        connector.assign_entity_id(id);
        state.ids.insert(id, weak.clone());

        if let Some(tag) = &tag {
            state.tags.entry(tag.clone()).or_default().push(weak.clone());
        }

        state.connectors.insert(kind.key, &kind.bases, weak.clone());

        let mut nodes = Vec::with_capacity(slots.len());
        for slot in slots {
            if slot.node.strong_count() == 0 {
                continue;
            }
            state.nodes.insert(
                slot.key,
                &slot.bases,
                NodeEntry { node: slot.node.clone(), owner: weak.clone() },
            );
            nodes.push((slot.key.id, slot.node));
        }

        state.registered.insert(
            key,
            Registration { connector: weak, id, tag, kind: kind.key.id, nodes },
        );

        outcome
    }

    /// Removes a connector from every view. Returns `false` if it was not
    /// registered.
    pub fn unregister(&self, connector: &EntityConnector) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(record) = state.registered.remove(&address(connector)) else {
            return false;
        };
        state.remove(record);
        true
    }

    /// Rebuilds the entries of a registered connector after its tag, id or
    /// nodes changed. Unregistered connectors are left alone.
    pub fn refresh(&self, connector: &ConnectorRef) -> bool {
        if !self.unregister(connector) {
            return false;
        }
        self.register(connector);
        true
    }

    pub fn is_registered(&self, connector: &EntityConnector) -> bool {
        self.state.borrow().registered.contains_key(&address(connector))
    }

    //--- Id / Tag Queries -------------------------------------------------

    pub fn try_get_by_id(&self, id: u32) -> Option<ConnectorRef> {
        if id == 0 {
            return None;
        }

        let mut state = self.state.borrow_mut();
        let (resolved, dropped) = {
            let entry = state.ids.get(&id)?;
            (entry.resolve(), entry.strong_count() == 0)
        };

        if dropped {
            state.ids.remove(&id);
        }
        resolved
    }

    pub fn get_by_id(&self, id: u32) -> Result<ConnectorRef, IndexError> {
        self.try_get_by_id(id).ok_or(IndexError::IdNotFound(id))
    }

    /// Earliest-registered live holder of `tag`.
    pub fn try_get_first_by_tag(&self, tag: &str) -> Option<ConnectorRef> {
        let tag = normalize(tag)?;
        let mut state = self.state.borrow_mut();
        let list = state.tags.get_mut(tag)?;

        while let Some(entry) = list.first() {
            match entry.resolve() {
                Some(connector) => return Some(connector),
                None => {
                    list.remove(0);
                }
            }
        }
        None
    }

    pub fn get_first_by_tag(&self, tag: &str) -> Result<ConnectorRef, IndexError> {
        self.try_get_first_by_tag(tag)
            .ok_or_else(|| IndexError::TagNotFound(tag.trim().to_string()))
    }

    /// Every live holder of `tag`, in registration order.
    pub fn get_all_by_tag(&self, tag: &str) -> Vec<ConnectorRef> {
        let Some(tag) = normalize(tag) else {
            return Vec::new();
        };
        let mut state = self.state.borrow_mut();
        let Some(list) = state.tags.get_mut(tag) else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(list.len());
        list.retain(|entry| match entry.resolve() {
            Some(connector) => {
                out.push(connector);
                true
            }
            None => false,
        });
        out
    }

    //--- Type Queries -----------------------------------------------------

    /// First connector of kind `K`; with `include_derived`, also of any kind
    /// assignable to `K`.
    pub fn try_get_first_connector<K: ConnectorKind>(&self, include_derived: bool) -> Option<ConnectorRef> {
        self.state
            .borrow_mut()
            .connectors
            .first(TypeId::of::<K>(), include_derived)
    }

    pub fn get_first_connector<K: ConnectorKind>(&self) -> Result<ConnectorRef, IndexError> {
        self.try_get_first_connector::<K>(true)
            .ok_or(IndexError::ConnectorNotFound(type_name::<K>()))
    }

    pub fn get_connectors<K: ConnectorKind>(&self, include_derived: bool) -> Vec<ConnectorRef> {
        self.state
            .borrow_mut()
            .connectors
            .all(TypeId::of::<K>(), include_derived)
    }

    /// First node of type `T`; with `include_derived`, also nodes listing
    /// `T` among their base types.
    pub fn try_get_first_node<T: 'static>(&self, include_derived: bool) -> Option<NodeRef> {
        self.state
            .borrow_mut()
            .nodes
            .first(TypeId::of::<T>(), include_derived)
    }

    pub fn get_first_node<T: 'static>(&self) -> Result<NodeRef, IndexError> {
        self.try_get_first_node::<T>(true)
            .ok_or(IndexError::NodeNotFound(type_name::<T>()))
    }

    pub fn get_nodes<T: 'static>(&self, include_derived: bool) -> Vec<NodeRef> {
        self.state
            .borrow_mut()
            .nodes
            .all(TypeId::of::<T>(), include_derived)
    }

    /// A `T` node of the connector registered under `id`.
    pub fn try_get_node_in_connector<T: 'static>(&self, id: u32) -> Option<NodeRef> {
        self.try_get_by_id(id)?.find_node::<T>()
    }

    /// A `T` node of the first connector tagged `tag`.
    pub fn try_get_node_in_first_by_tag<T: 'static>(&self, tag: &str) -> Option<NodeRef> {
        self.try_get_first_by_tag(tag)?.find_node::<T>()
    }

    //--- Maintenance ------------------------------------------------------

    /// Fully unregisters every connector that was dropped or disposed, and
    /// drops every dead entry. Returns the number of connectors removed.
    pub fn prune_dead(&self) -> usize {
        let mut state = self.state.borrow_mut();

        let dead: Vec<usize> = state
            .registered
            .iter()
            .filter(|(_, record)| record.connector.resolve().is_none())
            .map(|(key, _)| *key)
            .collect();

        for key in &dead {
            if let Some(record) = state.registered.remove(key) {
                state.remove(record);
            }
        }

        state.ids.retain(|_, entry| entry.strong_count() > 0);
        state.tags.retain(|_, list| {
            list.retain(|entry| entry.strong_count() > 0);
            !list.is_empty()
        });
        state.connectors.prune();
        state.nodes.prune();

        dead.len()
    }

    /// Drops every entry. Reserved ids and the id cursor are kept.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.registered.clear();
        state.ids.clear();
        state.tags.clear();
        state.connectors.clear();
        state.nodes.clear();
    }

    //--- Counters ---------------------------------------------------------

    pub fn registered_count(&self) -> usize {
        self.state.borrow().registered.len()
    }

    pub fn id_count(&self) -> usize {
        self.state.borrow().ids.len()
    }

    pub fn tag_count(&self) -> usize {
        self.state.borrow().tags.len()
    }

    pub fn connector_kind_count(&self) -> usize {
        self.state.borrow().connectors.bucket_count()
    }

    pub fn node_type_count(&self) -> usize {
        self.state.borrow().nodes.bucket_count()
    }

    pub fn reserved_count(&self) -> usize {
        self.state.borrow().reserved.len()
    }
}

impl Default for SceneEntityIndex {
    fn default() -> Self {
        Self::new()
    }
}

//=== Dump ================================================================

const MAX_ROWS: usize = 40;
const MAX_TAG_MEMBERS: usize = 12;

fn connector_name(entry: &Weak<EntityConnector>) -> String {
    entry
        .upgrade()
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| "<dropped>".to_string())
}

impl fmt::Display for SceneEntityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();

        writeln!(f, "SceneEntityIndex")?;
        writeln!(f, "Registered: {}", state.registered.len())?;
        writeln!(f, "Ids: {}", state.ids.len())?;
        writeln!(f, "Tags: {}", state.tags.len())?;
        writeln!(f, "ConnectorKinds: {}", state.connectors.bucket_count())?;
        writeln!(f, "NodeTypes: {}", state.nodes.bucket_count())?;

        if !state.ids.is_empty() {
            writeln!(f, "\nIdMap:")?;
            let mut ids: Vec<_> = state.ids.iter().collect();
            ids.sort_by_key(|(id, _)| **id);

            for (id, entry) in ids.iter().take(MAX_ROWS) {
                writeln!(f, "  {} -> {}", id, connector_name(entry))?;
            }
            if ids.len() > MAX_ROWS {
                writeln!(f, "  ... +{} more", ids.len() - MAX_ROWS)?;
            }
        }

        if !state.tags.is_empty() {
            writeln!(f, "\nTagMap:")?;
            let mut tags: Vec<_> = state.tags.iter().collect();
            tags.sort_by(|a, b| a.0.cmp(b.0));

            for (tag, list) in tags.iter().take(MAX_ROWS) {
                let names: Vec<String> = list.iter().take(MAX_TAG_MEMBERS).map(connector_name).collect();
                let more = if list.len() > MAX_TAG_MEMBERS { " ..." } else { "" };
                writeln!(f, "  {} [{}]: {}{}", tag, list.len(), names.join(", "), more)?;
            }
            if tags.len() > MAX_ROWS {
                writeln!(f, "  ... +{} more", tags.len() - MAX_ROWS)?;
            }
        }

        for (title, rows) in [
            ("ConnectorKinds", state.connectors.summary()),
            ("NodeTypes", state.nodes.summary()),
        ] {
            if rows.is_empty() {
                continue;
            }
            writeln!(f, "\n{}:", title)?;
            for (name, count) in rows.iter().take(MAX_ROWS) {
                writeln!(f, "  {} -> {}", name, count)?;
            }
            if rows.len() > MAX_ROWS {
                writeln!(f, "  ... +{} more", rows.len() - MAX_ROWS)?;
            }
        }

        Ok(())
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::{Node, NodeRefExt, TypeKey};
    use std::any::Any;

    struct Mover {
        speed: f32,
    }
    impl Node for Mover {}

    struct Runner {
        mover: Mover,
    }
    impl Node for Runner {
        fn base_types(&self) -> Vec<TypeKey> {
            vec![TypeKey::of::<Mover>()]
        }

        fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
            (target == TypeId::of::<Mover>()).then_some(&self.mover as &dyn Any)
        }
    }

    struct Health;
    impl Node for Health {}

    struct Enemy;
    impl ConnectorKind for Enemy {}

    struct Boss;
    impl ConnectorKind for Boss {
        fn base_kinds() -> Vec<TypeKey> {
            vec![TypeKey::of::<Enemy>()]
        }
    }

    fn plain(name: &str) -> ConnectorRef {
        EntityConnector::builder(name).build()
    }

    #[test]
    fn allocated_ids_are_positive_and_distinct() {
        let index = SceneEntityIndex::new();
        let mut seen = HashSet::new();

        for i in 0..20 {
            let connector = plain(&format!("c{i}"));
            let outcome = index.register(&connector);
            let id = connector.entity_id().unwrap();
            assert!(id > 0);
            assert_eq!(outcome, RegisterOutcome::Registered { id });
            assert!(seen.insert(id));

            if i % 3 == 0 {
                index.unregister(&connector);
            }
        }

        // Bare allocation reserves too.
        let a = index.allocate_id().unwrap();
        let b = index.allocate_id().unwrap();
        assert_ne!(a, b);
        assert!(!seen.contains(&a) && !seen.contains(&b));
    }

    #[test]
    fn duplicate_manual_id_keeps_first_registrant() {
        let index = SceneEntityIndex::new();
        let first = EntityConnector::builder("first").entity_id(7).build();
        let second = EntityConnector::builder("second").entity_id(7).build();

        assert_eq!(index.register(&first), RegisterOutcome::Registered { id: 7 });
        let outcome = index.register(&second);

        let assigned = second.entity_id().unwrap();
        assert_eq!(outcome, RegisterOutcome::IdReassigned { requested: 7, assigned });
        assert!(assigned > 0 && assigned != 7);
        assert!(Rc::ptr_eq(&index.get_by_id(7).unwrap(), &first));
        assert!(Rc::ptr_eq(&index.get_by_id(assigned).unwrap(), &second));
    }

    #[test]
    fn register_is_idempotent() {
        let index = SceneEntityIndex::new();
        let connector = EntityConnector::builder("solo").tag("Hero").node(Health).build();

        index.register(&connector);
        assert_eq!(index.register(&connector), RegisterOutcome::AlreadyRegistered);

        assert_eq!(index.get_all_by_tag("Hero").len(), 1);
        assert_eq!(index.get_nodes::<Health>(false).len(), 1);
        assert_eq!(index.registered_count(), 1);
    }

    #[test]
    fn tag_lookup_follows_registration_order() {
        let index = SceneEntityIndex::new();
        let a = EntityConnector::builder("A").tag("Hero").build();
        let b = EntityConnector::builder("B").tag("Hero").build();

        index.register(&a);
        index.register(&b);

        let all = index.get_all_by_tag("Hero");
        assert_eq!(all.len(), 2);
        assert!(Rc::ptr_eq(&all[0], &a));
        assert!(Rc::ptr_eq(&all[1], &b));
        assert!(Rc::ptr_eq(&index.try_get_first_by_tag(" Hero ").unwrap(), &a));
        assert!(index.try_get_first_by_tag("").is_none());
    }

    #[test]
    fn unregister_removes_every_view_and_is_idempotent() {
        let index = SceneEntityIndex::new();
        let connector = EntityConnector::builder("gone")
            .entity_id(3)
            .tag("Hero")
            .kind::<Enemy>()
            .node(Health)
            .build();

        index.register(&connector);
        assert!(index.unregister(&connector));
        assert!(!index.unregister(&connector));

        assert!(index.try_get_by_id(3).is_none());
        assert!(index.get_all_by_tag("Hero").is_empty());
        assert!(index.try_get_first_connector::<Enemy>(true).is_none());
        assert!(index.try_get_first_node::<Health>(true).is_none());
        assert_eq!(index.tag_count(), 0);
        assert_eq!(index.connector_kind_count(), 0);
        assert_eq!(index.node_type_count(), 0);
    }

    #[test]
    fn refresh_moves_connector_between_tags() {
        let index = SceneEntityIndex::new();
        let connector = EntityConnector::builder("mover").tag("A").build();
        index.register(&connector);

        // Tag changes outside of a scene do not refresh on their own.
        connector.set_tag("B");
        assert!(index.try_get_first_by_tag("A").is_some());

        assert!(index.refresh(&connector));
        assert!(index.try_get_first_by_tag("A").is_none());
        assert!(index.try_get_first_by_tag("B").is_some());

        let stranger = plain("stranger");
        assert!(!index.refresh(&stranger));
        assert!(!index.is_registered(&stranger));
    }

    #[test]
    fn derived_node_queries_respect_the_flag() {
        let index = SceneEntityIndex::new();
        let base = EntityConnector::builder("base").node(Mover { speed: 1.0 }).build();
        let derived = EntityConnector::builder("derived")
            .node(Runner { mover: Mover { speed: 5.0 } })
            .build();
        index.register(&derived);
        index.register(&base);

        let exact = index.get_nodes::<Mover>(false);
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].read::<Mover, _>(|m| m.speed), Some(1.0));

        let all = index.get_nodes::<Mover>(true);
        let speeds: Vec<f32> = all.iter().filter_map(|n| n.read::<Mover, _>(|m| m.speed)).collect();
        assert_eq!(speeds, vec![1.0, 5.0]);

        assert!(index.try_get_first_node::<Runner>(false).is_some());
    }

    #[test]
    fn derived_only_match_requires_the_flag() {
        let index = SceneEntityIndex::new();
        let derived = EntityConnector::builder("derived")
            .node(Runner { mover: Mover { speed: 5.0 } })
            .build();
        index.register(&derived);

        assert!(index.try_get_first_node::<Mover>(false).is_none());
        let node = index.get_first_node::<Mover>().unwrap();
        assert_eq!(node.read::<Mover, _>(|m| m.speed), Some(5.0));
    }

    #[test]
    fn connector_kinds_support_derived_queries() {
        let index = SceneEntityIndex::new();
        let grunt = EntityConnector::builder("grunt").kind::<Enemy>().build();
        let boss = EntityConnector::builder("boss").kind::<Boss>().build();
        let prop = plain("prop");
        index.register(&grunt);
        index.register(&boss);
        index.register(&prop);

        assert_eq!(index.get_connectors::<Enemy>(false).len(), 1);
        assert_eq!(index.get_connectors::<Enemy>(true).len(), 2);
        assert_eq!(index.get_connectors::<EntityConnector>(true).len(), 3);
        assert!(Rc::ptr_eq(&index.get_first_connector::<Boss>().unwrap(), &boss));
        assert!(Rc::ptr_eq(&index.try_get_first_connector::<Enemy>(false).unwrap(), &grunt));
    }

    #[test]
    fn dropped_and_disposed_connectors_are_skipped() {
        let index = SceneEntityIndex::new();
        let dropped = EntityConnector::builder("dropped").entity_id(1).tag("T").node(Health).build();
        let disposed = EntityConnector::builder("disposed").entity_id(2).tag("T").build();
        let alive = EntityConnector::builder("alive").entity_id(3).tag("T").build();

        index.register(&dropped);
        index.register(&disposed);
        index.register(&alive);

        drop(dropped);
        disposed.dispose();

        assert!(index.try_get_by_id(1).is_none());
        assert!(index.try_get_by_id(2).is_none());
        assert!(Rc::ptr_eq(&index.try_get_first_by_tag("T").unwrap(), &alive));
        assert_eq!(index.get_all_by_tag("T").len(), 1);
        assert!(index.try_get_first_node::<Health>(true).is_none());

        assert_eq!(index.prune_dead(), 2);
        assert_eq!(index.registered_count(), 1);
    }

    #[test]
    fn primed_ids_are_skipped_by_allocation() {
        let index = SceneEntityIndex::new();
        let scope = ScopeId::next();
        let statics: Vec<ConnectorRef> = [1, 2, 5]
            .into_iter()
            .map(|id| {
                let c = EntityConnector::builder(format!("s{id}")).entity_id(id).build();
                c.mark_static(scope);
                c
            })
            .collect();

        index.prime_reserved_ids(&statics, scope);
        assert_eq!(index.allocate_id(), Some(6));

        // Connectors from another scope are ignored.
        let foreign = EntityConnector::builder("foreign").entity_id(50).build();
        index.prime_reserved_ids(&[foreign], scope);
        assert_eq!(index.allocate_id(), Some(7));
    }

    #[test]
    fn max_manual_id_does_not_overflow_the_cursor() {
        let index = SceneEntityIndex::new();
        let scope = ScopeId::next();
        let top = EntityConnector::builder("top").entity_id(u32::MAX).build();
        top.mark_static(scope);

        index.prime_reserved_ids(&[Rc::clone(&top)], scope);
        assert_eq!(index.register(&top), RegisterOutcome::Registered { id: u32::MAX });

        let dynamic = plain("dynamic");
        assert_eq!(index.register(&dynamic), RegisterOutcome::Registered { id: 1 });
        assert!(Rc::ptr_eq(&index.get_by_id(u32::MAX).unwrap(), &top));
    }

    #[test]
    fn allocation_wraps_past_the_top_without_reuse() {
        let index = SceneEntityIndex::new();
        let low = EntityConnector::builder("low").entity_id(1).build();
        let high = EntityConnector::builder("high").entity_id(u32::MAX - 1).build();
        index.register(&low);
        index.register(&high);

        index.state.borrow_mut().next_id = u32::MAX - 1;
        assert_eq!(index.allocate_id(), Some(u32::MAX));
        assert_eq!(index.allocate_id(), Some(2));
    }

    #[test]
    fn or_error_variants_report_what_was_missing() {
        let index = SceneEntityIndex::new();
        assert_eq!(index.get_by_id(4).unwrap_err(), IndexError::IdNotFound(4));
        assert_eq!(
            index.get_first_by_tag(" Boss ").unwrap_err(),
            IndexError::TagNotFound("Boss".to_string())
        );
        assert!(matches!(
            index.get_first_node::<Health>(),
            Err(IndexError::NodeNotFound(_))
        ));
        assert!(matches!(
            index.get_first_connector::<Enemy>(),
            Err(IndexError::ConnectorNotFound(_))
        ));
    }

    #[test]
    fn node_lookup_through_connector_and_tag() {
        let index = SceneEntityIndex::new();
        let hero = EntityConnector::builder("hero").entity_id(1).tag("Hero").node(Health).build();
        index.register(&hero);

        assert!(index.try_get_node_in_connector::<Health>(1).is_some());
        assert!(index.try_get_node_in_connector::<Mover>(1).is_none());
        assert!(index.try_get_node_in_first_by_tag::<Health>("Hero").is_some());
        assert!(index.try_get_node_in_first_by_tag::<Health>("Villain").is_none());
    }

    #[test]
    fn dump_lists_every_view() {
        let index = SceneEntityIndex::new();
        let hero = EntityConnector::builder("Player").entity_id(1).tag("Hero").node(Health).build();
        index.register(&hero);

        let dump = index.to_string();
        assert!(dump.contains("Registered: 1"));
        assert!(dump.contains("1 -> Player"));
        assert!(dump.contains("Hero [1]: Player"));
        assert!(dump.contains("EntityConnector -> 1"));
        assert!(dump.contains("Health -> 1"));
    }
}
