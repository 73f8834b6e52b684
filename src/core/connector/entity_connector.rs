//=========================================================================
// Entity Connector
//=========================================================================
//
// Owns the node list of one entity and runs its lifecycle.
//
// Architecture:
//   Attachment tree (strong) ──collect_nodes()──→ NodeSlot list (weak)
//                                                      ↓ execute()
//                                   bind → construct → before_init → init → after_init
//                                                      ↓
//                                   DispatchCache { tick, fixed_tick, late_tick }
//                                                      ↓ every frame
//                                   tick(dt) / fixed_tick(dt) / late_tick(dt)
//
// Every phase runs over ALL nodes before the next phase starts, so a
// node's construct can rely on services any sibling registered in bind.
//
// All methods take `&self`: nodes call back into their own connector
// (dispose, set_tag, pause) while a dispatch is running. RefCell borrows
// are never held across a node call.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::TypeId;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, info, trace, warn};

//=== Internal Dependencies ===============================================

use super::builder::ConnectorBuilder;
use super::{ConnectorKind, ConnectorRef, KindInfo};
use crate::config::FrameworkConfig;
use crate::core::node::{
    same_node, Attachment, Capabilities, Node, NodeContext, NodeRef, PauseOwner, TypeKey,
    WeakNodeRef,
};
use crate::core::registry::ServiceRegistry;
use crate::core::scene::{SceneHandle, ScopeId};

//=== ConnectorState ======================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Uninitialized,
    Executed,
    Disposed,
}

//=== NodeSlot ============================================================

/// One discovered node with the metadata read at discovery.
#[derive(Clone)]
pub(crate) struct NodeSlot {
    pub(crate) node: WeakNodeRef,
    pub(crate) key: TypeKey,
    pub(crate) bases: Vec<TypeKey>,
    order: i32,
    caps: Capabilities,
    /// Set at execute; only entered nodes receive `dispose`.
    entered: Rc<Cell<bool>>,
}

impl NodeSlot {
    fn read(node: &NodeRef, entered: Rc<Cell<bool>>) -> Option<Self> {
        let guard = node.try_borrow().ok()?;
        Some(Self {
            node: Rc::downgrade(node),
            key: guard.node_type(),
            bases: guard.base_types(),
            order: guard.order(),
            caps: guard.capabilities(),
            entered,
        })
    }

    pub(crate) fn is(&self, target: TypeId) -> bool {
        self.key.id == target || self.bases.iter().any(|base| base.id == target)
    }
}

fn compare_slots(a: &NodeSlot, b: &NodeSlot) -> std::cmp::Ordering {
    a.order
        .cmp(&b.order)
        .then_with(|| a.key.name.cmp(b.key.name))
}

//=== DispatchCache =======================================================

#[derive(Default)]
struct DispatchCache {
    tick: Vec<WeakNodeRef>,
    fixed_tick: Vec<WeakNodeRef>,
    late_tick: Vec<WeakNodeRef>,
}

impl DispatchCache {
    fn list(&self, phase: FramePhase) -> &[WeakNodeRef] {
        match phase {
            FramePhase::Tick => &self.tick,
            FramePhase::FixedTick => &self.fixed_tick,
            FramePhase::LateTick => &self.late_tick,
        }
    }

    fn clear(&mut self) {
        self.tick.clear();
        self.fixed_tick.clear();
        self.late_tick.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramePhase {
    Tick,
    FixedTick,
    LateTick,
}

impl FramePhase {
    fn label(self) -> &'static str {
        match self {
            FramePhase::Tick => "tick",
            FramePhase::FixedTick => "fixed_tick",
            FramePhase::LateTick => "late_tick",
        }
    }
}

//=== EntityConnector =====================================================

pub struct EntityConnector {
    name: String,
    kind: KindInfo,
    order: Cell<i32>,
    entity_id: Cell<u32>,
    tag: RefCell<Option<String>>,

    enabled_ticks: Cell<bool>,
    active: Cell<bool>,

    attachment: RefCell<Attachment>,
    nodes: RefCell<Vec<NodeSlot>>,
    cache: RefCell<DispatchCache>,

    pause_owners: RefCell<HashSet<PauseOwner>>,
    paused: Cell<bool>,

    state: Cell<ConnectorState>,
    static_scope: Cell<Option<ScopeId>>,
    dynamic_registered: Cell<bool>,
    scene: RefCell<Option<SceneHandle>>,
    config: RefCell<Option<Rc<FrameworkConfig>>>,

    self_ref: Weak<EntityConnector>,
    dispatch_depth: Cell<u32>,
    deferred_teardown: RefCell<Vec<NodeRef>>,
}

impl EntityConnector {
    pub fn builder(name: impl Into<String>) -> ConnectorBuilder {
        ConnectorBuilder::new(name)
    }

    pub(super) fn from_builder(builder: ConnectorBuilder) -> ConnectorRef {
        Rc::new_cyclic(|self_ref| Self {
            name: builder.name,
            kind: builder.kind,
            order: Cell::new(builder.order),
            entity_id: Cell::new(builder.entity_id),
            tag: RefCell::new(builder.tag),
            enabled_ticks: Cell::new(builder.enabled_ticks),
            active: Cell::new(builder.active),
            attachment: RefCell::new(builder.attachment),
            nodes: RefCell::new(Vec::new()),
            cache: RefCell::new(DispatchCache::default()),
            pause_owners: RefCell::new(HashSet::new()),
            paused: Cell::new(false),
            state: Cell::new(ConnectorState::Uninitialized),
            static_scope: Cell::new(None),
            dynamic_registered: Cell::new(false),
            scene: RefCell::new(None),
            config: RefCell::new(None),
            self_ref: self_ref.clone(),
            dispatch_depth: Cell::new(0),
            deferred_teardown: RefCell::new(Vec::new()),
        })
    }

    //--- Discovery --------------------------------------------------------

    /// Re-discovers nodes from the attachment tree.
    ///
    /// The list is only replaced when its content changed. Nodes that were
    /// already known keep their lifecycle state. Returns whether the list
    /// changed.
    pub fn collect_nodes(&self) -> bool {
        let mut found = Vec::new();
        self.attachment.borrow().collect(&mut found);

        let mut next = Vec::with_capacity(found.len());
        {
            let current = self.nodes.borrow();
            for node in &found {
                let known = current
                    .iter()
                    .find(|slot| slot.node.upgrade().is_some_and(|n| same_node(&n, node)));

                let entered = known
                    .map(|slot| Rc::clone(&slot.entered))
                    .unwrap_or_default();

                match NodeSlot::read(node, entered) {
                    Some(slot) => next.push(slot),
                    None => match known {
                        Some(slot) => next.push(slot.clone()),
                        None => warn!(
                            "connector '{}': node is busy during discovery, skipped",
                            self.name
                        ),
                    },
                }
            }
        }
        next.sort_by(compare_slots);

        if self.same_nodes(&next) {
            return false;
        }

        *self.nodes.borrow_mut() = next;

        if self.state.get() == ConnectorState::Executed {
            self.rebuild_caches();
        }
        self.refresh_index();
        true
    }

    fn same_nodes(&self, next: &[NodeSlot]) -> bool {
        let current = self.nodes.borrow();
        current.len() == next.len()
            && current
                .iter()
                .zip(next)
                .all(|(a, b)| Weak::ptr_eq(&a.node, &b.node) && a.node.strong_count() > 0)
    }

    fn prune_missing_nodes(&self) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        let before = nodes.len();
        nodes.retain(|slot| slot.node.strong_count() > 0);
        before - nodes.len()
    }

    fn sort_nodes(&self) {
        let mut nodes = self.nodes.borrow_mut();
        for slot in nodes.iter_mut() {
            if let Some(order) = slot
                .node
                .upgrade()
                .and_then(|node| node.try_borrow().ok().map(|guard| guard.order()))
            {
                slot.order = order;
            }
        }
        nodes.sort_by(compare_slots);
    }

    fn rebuild_caches(&self) {
        let nodes = self.nodes.borrow();
        let mut cache = self.cache.borrow_mut();
        cache.clear();

        for slot in nodes.iter() {
            if slot.caps.contains(Capabilities::TICK) {
                cache.tick.push(slot.node.clone());
            }
            if slot.caps.contains(Capabilities::FIXED_TICK) {
                cache.fixed_tick.push(slot.node.clone());
            }
            if slot.caps.contains(Capabilities::LATE_TICK) {
                cache.late_tick.push(slot.node.clone());
            }
        }
    }

    //--- Execute ----------------------------------------------------------

    /// Runs the one-shot phases. A no-op once executed or disposed.
    ///
    /// `sender` names the caller in diagnostics.
    pub fn execute(&self, registry: &Rc<ServiceRegistry>, sender: Option<&str>) {
        if self.state.get() != ConnectorState::Uninitialized {
            return;
        }
        let Some(this) = self.self_ref.upgrade() else {
            return;
        };

        self.state.set(ConnectorState::Executed);

        let config = registry.try_get::<FrameworkConfig>();
        let log_phases = config.as_ref().is_some_and(|c| c.should_log_node_phases());
        if config.as_ref().is_some_and(|c| c.should_log_connector_execute()) {
            info!("connector execute: {} -> {}", self.name, sender.unwrap_or("none"));
        }
        *self.config.borrow_mut() = config;

        let pruned = self.prune_missing_nodes();
        if pruned > 0 {
            debug!("connector '{}': pruned {} missing nodes", self.name, pruned);
        }
        self.sort_nodes();
        self.rebuild_caches();

        // Every node present at execute is owed a teardown.
        for slot in self.nodes.borrow().iter() {
            if slot.node.strong_count() > 0 {
                slot.entered.set(true);
            }
        }

        let ctx = NodeContext::new(registry, &this);

        self.enter_dispatch();
        self.run_phase(Capabilities::BIND, "bind", log_phases, |node| node.bind(&ctx));
        self.run_phase(Capabilities::CONSTRUCT, "construct", log_phases, |node| {
            node.construct(&ctx)
        });
        self.run_phase(Capabilities::BEFORE_INIT, "before_init", log_phases, |node| {
            node.before_init()
        });
        self.run_phase(Capabilities::INIT, "init", log_phases, |node| node.init());
        self.run_phase(Capabilities::AFTER_INIT, "after_init", log_phases, |node| {
            node.after_init()
        });
        self.leave_dispatch();
    }

    fn run_phase(
        &self,
        capability: Capabilities,
        label: &str,
        log_phases: bool,
        mut call: impl FnMut(&mut dyn Node),
    ) {
        let mut i = 0;
        loop {
            if self.is_disposed() {
                break;
            }

            let slot = match self.nodes.borrow().get(i) {
                Some(slot) => slot.clone(),
                None => break,
            };
            i += 1;

            if !slot.caps.contains(capability) {
                continue;
            }
            let Some(node) = slot.node.upgrade() else {
                continue;
            };

            match node.try_borrow_mut() {
                Ok(mut guard) => {
                    if log_phases {
                        debug!("{}: {} -> {}", label, self.name, slot.key.name);
                    }
                    call(&mut *guard);
                }
                Err(_) => warn!(
                    "connector '{}': node {} is busy, skipped {}",
                    self.name, slot.key.name, label
                ),
            };
        }
    }

    //--- Frame Dispatch ---------------------------------------------------

    pub fn tick(&self, dt: f32) {
        self.dispatch(FramePhase::Tick, dt);
    }

    pub fn fixed_tick(&self, dt: f32) {
        self.dispatch(FramePhase::FixedTick, dt);
    }

    pub fn late_tick(&self, dt: f32) {
        self.dispatch(FramePhase::LateTick, dt);
    }

    fn dispatch(&self, phase: FramePhase, dt: f32) {
        if self.state.get() != ConnectorState::Executed
            || !self.enabled_ticks.get()
            || self.paused.get()
        {
            return;
        }

        if self
            .config
            .borrow()
            .as_ref()
            .is_some_and(|c| c.should_log_tick(&self.name))
        {
            trace!("{}: {}", phase.label(), self.name);
        }

        self.enter_dispatch();

        let mut i = 0;
        loop {
            if self.is_disposed() {
                break;
            }

            let node = match self.cache.borrow().list(phase).get(i) {
                Some(weak) => weak.upgrade(),
                None => break,
            };
            i += 1;

            let Some(node) = node else {
                continue;
            };
            let Ok(mut guard) = node.try_borrow_mut() else {
                warn!(
                    "connector '{}': node is busy, skipped {}",
                    self.name,
                    phase.label()
                );
                continue;
            };

            if !guard.is_enabled() && !guard.run_when_disabled() {
                continue;
            }

            match phase {
                FramePhase::Tick => guard.tick(dt),
                FramePhase::FixedTick => guard.fixed_tick(dt),
                FramePhase::LateTick => guard.late_tick(dt),
            }
        }

        self.leave_dispatch();
    }

    fn enter_dispatch(&self) {
        self.dispatch_depth.set(self.dispatch_depth.get() + 1);
    }

    fn leave_dispatch(&self) {
        let depth = self.dispatch_depth.get().saturating_sub(1);
        self.dispatch_depth.set(depth);

        if depth == 0 {
            self.flush_deferred_teardown();
        }
    }

    fn flush_deferred_teardown(&self) {
        let pending = std::mem::take(&mut *self.deferred_teardown.borrow_mut());
        for node in pending {
            match node.try_borrow_mut() {
                Ok(mut guard) => guard.dispose(),
                Err(_) => warn!("connector '{}': node still busy, teardown skipped", self.name),
            };
        }
    }

    //--- Pause ------------------------------------------------------------

    /// Pauses frame dispatch. Takes effect on the first owner.
    pub fn pause(&self, owner: PauseOwner) {
        if self.is_disposed() {
            return;
        }

        {
            let mut owners = self.pause_owners.borrow_mut();
            if !owners.insert(owner) || owners.len() != 1 {
                return;
            }
        }

        self.paused.set(true);
        self.forward_pause(owner, true);
    }

    /// Drops `owner`. Dispatch resumes once no owner remains.
    pub fn resume(&self, owner: PauseOwner) {
        if self.is_disposed() {
            return;
        }

        {
            let mut owners = self.pause_owners.borrow_mut();
            if !owners.remove(&owner) || !owners.is_empty() {
                return;
            }
        }

        self.forward_pause(owner, false);
        self.paused.set(false);
    }

    fn forward_pause(&self, owner: PauseOwner, pause: bool) {
        let label = if pause { "on_pause" } else { "on_resume" };
        self.enter_dispatch();
        self.run_phase(Capabilities::PAUSE, label, false, |node| {
            if pause {
                node.on_pause(owner)
            } else {
                node.on_resume(owner)
            }
        });
        self.leave_dispatch();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    pub fn pause_owner_count(&self) -> usize {
        self.pause_owners.borrow().len()
    }

    //--- Dispose ----------------------------------------------------------

    /// Unregisters from the scene and tears down every node that was
    /// attached when the connector executed. Idempotent.
    ///
    /// A node disposing its own connector is torn down after its current
    /// call returns.
    pub fn dispose(&self) {
        if self.is_disposed() {
            return;
        }

        self.state.set(ConnectorState::Disposed);
        self.unregister_from_scene(true);
        self.teardown_nodes();

        self.pause_owners.borrow_mut().clear();
        self.paused.set(false);
        self.cache.borrow_mut().clear();
    }

    fn teardown_nodes(&self) {
        let slots: Vec<NodeSlot> = self.nodes.borrow().clone();

        for slot in slots {
            if !slot.caps.contains(Capabilities::DISPOSE) || !slot.entered.get() {
                continue;
            }
            let Some(node) = slot.node.upgrade() else {
                continue;
            };

            match node.try_borrow_mut() {
                Ok(mut guard) => guard.dispose(),
                Err(_) if self.dispatch_depth.get() > 0 => {
                    self.deferred_teardown.borrow_mut().push(Rc::clone(&node));
                }
                Err(_) => warn!(
                    "connector '{}': node {} is busy, teardown skipped",
                    self.name, slot.key.name
                ),
            };
        }
    }

    fn unregister_from_scene(&self, force: bool) {
        if !force && !self.dynamic_registered.get() {
            return;
        }

        let scene = self.scene();
        self.dynamic_registered.set(false);

        // A scene that is tearing down clears its own lists.
        let Some(scene) = scene.filter(SceneHandle::is_ready) else {
            return;
        };
        if let Some(this) = self.self_ref.upgrade() {
            scene.unregister(&this);
        }
    }

    //--- Host Hooks -------------------------------------------------------

    /// Host-side activation.
    ///
    /// Activating a connector linked to a running scene executes it (static
    /// or already-registered) or registers it as a new dynamic connector.
    /// Deactivating a dynamic connector unregisters it.
    pub fn set_active(&self, active: bool) {
        if self.active.get() == active {
            return;
        }
        self.active.set(active);

        if self.is_disposed() {
            return;
        }
        let Some(scene) = self.scene() else {
            return;
        };
        if !scene.is_ready() {
            return;
        }

        if !active {
            self.unregister_from_scene(false);
            return;
        }

        if self.is_static_for(scene.scope()) || self.dynamic_registered.get() {
            if let Some(registry) = scene.registry() {
                self.execute(&registry, Some(scene.name()));
            }
            return;
        }

        if let Some(this) = self.self_ref.upgrade() {
            scene.register_and_execute(&this);
            self.dynamic_registered.set(true);
        }
    }

    /// Sets or clears (`""`) the tag, refreshing the scene index.
    pub fn set_tag(&self, tag: &str) {
        let normalized = normalize_tag(tag);
        if *self.tag.borrow() == normalized {
            return;
        }

        *self.tag.borrow_mut() = normalized;
        self.refresh_index();
    }

    /// Sets a manual id. `0` clears it. Refreshes the scene index.
    pub fn set_entity_id(&self, id: u32) {
        if self.entity_id.get() == id {
            return;
        }

        self.entity_id.set(id);
        self.refresh_index();
    }

    pub fn set_enabled_ticks(&self, enabled: bool) {
        self.enabled_ticks.set(enabled);
    }

    fn refresh_index(&self) {
        let Some(index) = self.scene().and_then(|scene| scene.index()) else {
            return;
        };
        if let Some(this) = self.self_ref.upgrade() {
            index.refresh(&this);
        }
    }

    //--- Scene Link -------------------------------------------------------

    pub(crate) fn link_scene(&self, scene: SceneHandle) {
        *self.scene.borrow_mut() = Some(scene);
    }

    pub(crate) fn mark_static(&self, scope: ScopeId) {
        self.static_scope.set(Some(scope));
    }

    pub(crate) fn set_dynamic_registered(&self, value: bool) {
        self.dynamic_registered.set(value);
    }

    pub(crate) fn assign_entity_id(&self, id: u32) {
        self.entity_id.set(id);
    }

    pub fn scene(&self) -> Option<SceneHandle> {
        self.scene.borrow().clone()
    }

    pub fn is_static_for(&self, scope: ScopeId) -> bool {
        self.static_scope.get() == Some(scope)
    }

    pub fn is_dynamic_registered(&self) -> bool {
        self.dynamic_registered.get()
    }

    //--- Accessors --------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> i32 {
        self.order.get()
    }

    /// `None` until an id is assigned manually or by the scene index.
    pub fn entity_id(&self) -> Option<u32> {
        match self.entity_id.get() {
            0 => None,
            id => Some(id),
        }
    }

    pub fn tag(&self) -> Option<String> {
        self.tag.borrow().clone()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.borrow().as_deref() == Some(tag.trim())
    }

    pub fn kind(&self) -> TypeKey {
        self.kind.key
    }

    pub fn is_kind<K: ConnectorKind>(&self) -> bool {
        self.kind.is(TypeId::of::<K>())
    }

    pub(crate) fn kind_info(&self) -> &KindInfo {
        &self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn enabled_ticks(&self) -> bool {
        self.enabled_ticks.get()
    }

    /// Whether frame phases would currently reach the nodes.
    pub fn effective_ticks(&self) -> bool {
        self.enabled_ticks.get() && !self.paused.get()
    }

    pub fn state(&self) -> ConnectorState {
        self.state.get()
    }

    pub fn is_executed(&self) -> bool {
        self.state.get() == ConnectorState::Executed
    }

    pub fn is_disposed(&self) -> bool {
        self.state.get() == ConnectorState::Disposed
    }

    pub fn attachment(&self) -> Ref<'_, Attachment> {
        self.attachment.borrow()
    }

    /// Mutable access to the host tree. Call
    /// [`collect_nodes`](Self::collect_nodes) after attaching new nodes.
    pub fn attachment_mut(&self) -> RefMut<'_, Attachment> {
        self.attachment.borrow_mut()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Live nodes in dispatch order.
    pub fn nodes(&self) -> Vec<NodeRef> {
        self.nodes
            .borrow()
            .iter()
            .filter_map(|slot| slot.node.upgrade())
            .collect()
    }

    pub(crate) fn node_slots(&self) -> Vec<NodeSlot> {
        self.nodes.borrow().clone()
    }

    /// First node that is a `T`, exactly or through its declared bases.
    pub fn find_node<T: 'static>(&self) -> Option<NodeRef> {
        let target = TypeId::of::<T>();
        self.nodes
            .borrow()
            .iter()
            .filter(|slot| slot.is(target))
            .find_map(|slot| slot.node.upgrade())
    }
}

impl Drop for EntityConnector {
    fn drop(&mut self) {
        // Dropped without an explicit dispose: still honour teardown.
        if self.state.get() == ConnectorState::Executed {
            self.state.set(ConnectorState::Disposed);
            self.teardown_nodes();
        }
    }
}

impl fmt::Debug for EntityConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityConnector")
            .field("name", &self.name)
            .field("kind", &self.kind.key.name)
            .field("order", &self.order.get())
            .field("entity_id", &self.entity_id())
            .field("tag", &self.tag.borrow())
            .field("state", &self.state.get())
            .field("nodes", &self.node_count())
            .finish()
    }
}

pub(crate) fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

//=========================================================================
// Tests
//=========================================================================
