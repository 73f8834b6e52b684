//=========================================================================
// Node Module
//=========================================================================
//
// Behavior units attached to an entity.
//
// A node implements `Node` and advertises the lifecycle phases it cares
// about through `capabilities()`. The owning connector reads the
// capability set once when it builds its dispatch caches, never per
// frame.
//
// Phase order driven by the connector:
//   bind → construct → before_init → init → after_init   (once, at execute)
//   tick / fixed_tick / late_tick                          (every frame)
//   on_pause / on_resume                                   (owner-counted)
//   dispose                                                (once)
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

//=== Submodules ==========================================================

mod attachment;
mod context;

pub use attachment::Attachment;
pub use context::NodeContext;

//=== Type Identity =======================================================

/// Object-safe access to `Any` for trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A `TypeId` paired with a readable name.
///
/// Names are the last path segment (`game::Mover` → `Mover`) and are used
/// for deterministic tie-breaks and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name(type_name::<T>()),
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Strips the module path, keeping generic arguments intact.
pub fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

//=== Capabilities ========================================================

bitflags! {
    /// Lifecycle phases a node participates in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        const BIND        = 1 << 0;
        const CONSTRUCT   = 1 << 1;
        const BEFORE_INIT = 1 << 2;
        const INIT        = 1 << 3;
        const AFTER_INIT  = 1 << 4;
        const TICK        = 1 << 5;
        const FIXED_TICK  = 1 << 6;
        const LATE_TICK   = 1 << 7;
        const PAUSE       = 1 << 8;
        const DISPOSE     = 1 << 9;

        /// Every one-shot phase run by `execute`.
        const PHASES = Self::BIND.bits()
            | Self::CONSTRUCT.bits()
            | Self::BEFORE_INIT.bits()
            | Self::INIT.bits()
            | Self::AFTER_INIT.bits();

        /// Every per-frame phase.
        const TICKS = Self::TICK.bits() | Self::FIXED_TICK.bits() | Self::LATE_TICK.bits();
    }
}

//=== PauseOwner ==========================================================

/// Opaque token identifying who requested a pause.
///
/// Pause takes effect on the first owner and lifts when the last owner
/// resumes. Repeating a request with the same owner is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PauseOwner(u64);

static NEXT_PAUSE_OWNER: AtomicU64 = AtomicU64::new(1);

impl PauseOwner {
    /// Returns a process-unique owner token.
    pub fn new() -> Self {
        Self(NEXT_PAUSE_OWNER.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Default for PauseOwner {
    fn default() -> Self {
        Self::new()
    }
}

//=== Node Trait ==========================================================

/// A behavior unit owned by one [`EntityConnector`](crate::core::connector::EntityConnector).
///
/// Every method has a no-op default. A phase method is only called when
/// the matching flag is present in [`capabilities`](Node::capabilities).
///
/// Derived-type queries are opt-in: a node that embeds a base value lists
/// the base in [`base_types`](Node::base_types) and returns it from
/// [`upcast`](Node::upcast).
pub trait Node: AsAny {
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Lower runs first. Ties are broken by type name.
    fn order(&self) -> i32 {
        0
    }

    /// Identity of the concrete node type. Not meant to be overridden.
    fn node_type(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    /// Types this node can be queried as, besides its own.
    fn base_types(&self) -> Vec<TypeKey> {
        Vec::new()
    }

    /// Returns the embedded value for a type listed in `base_types`.
    fn upcast(&self, _target: TypeId) -> Option<&dyn Any> {
        None
    }

    fn upcast_mut(&mut self, _target: TypeId) -> Option<&mut dyn Any> {
        None
    }

    /// Per-node enabled flag checked before every frame dispatch.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Dispatch frame phases even while `is_enabled` is false.
    fn run_when_disabled(&self) -> bool {
        false
    }

    //--- One-shot phases --------------------------------------------------

    fn bind(&mut self, _ctx: &NodeContext<'_>) {}

    fn construct(&mut self, _ctx: &NodeContext<'_>) {}

    fn before_init(&mut self) {}

    fn init(&mut self) {}

    fn after_init(&mut self) {}

    //--- Frame phases -----------------------------------------------------

    fn tick(&mut self, _dt: f32) {}

    fn fixed_tick(&mut self, _dt: f32) {}

    fn late_tick(&mut self, _dt: f32) {}

    //--- Pause / Teardown -------------------------------------------------

    fn on_pause(&mut self, _owner: PauseOwner) {}

    fn on_resume(&mut self, _owner: PauseOwner) {}

    fn dispose(&mut self) {}
}

//=== Handles =============================================================

/// Shared handle to a node. The connector's attachment tree owns the
/// strong references; dispatch caches and the scene index hold weak ones.
pub type NodeRef = Rc<RefCell<dyn Node>>;
pub type WeakNodeRef = Weak<RefCell<dyn Node>>;

/// Wraps a node into a [`NodeRef`].
pub fn node<N: Node>(value: N) -> NodeRef {
    Rc::new(RefCell::new(value))
}

/// Views a node as `T`, either exactly or through its declared upcast.
pub fn node_as<T: 'static>(node: &dyn Node) -> Option<&T> {
    if let Some(exact) = node.as_any().downcast_ref::<T>() {
        return Some(exact);
    }
    node.upcast(TypeId::of::<T>())?.downcast_ref::<T>()
}

pub fn node_as_mut<T: 'static>(node: &mut dyn Node) -> Option<&mut T> {
    if (*node).as_any().is::<T>() {
        return node.as_any_mut().downcast_mut::<T>();
    }
    node.upcast_mut(TypeId::of::<T>())?.downcast_mut::<T>()
}

/// Whether the node is a `T`, exactly or through `base_types`.
pub fn node_is<T: 'static>(node: &dyn Node) -> bool {
    let target = TypeId::of::<T>();
    node.node_type().id == target || node.base_types().iter().any(|base| base.id == target)
}

/// Typed access helpers over [`NodeRef`].
pub trait NodeRefExt {
    /// Runs `f` on the node viewed as `T`. Returns `None` when the node is
    /// not a `T` or is currently borrowed.
    fn read<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R>;

    fn write<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R>;
}

impl NodeRefExt for NodeRef {
    fn read<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.try_borrow().ok()?;
        node_as::<T>(&*guard).map(f)
    }

    fn write<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.try_borrow_mut().ok()?;
        node_as_mut::<T>(&mut *guard).map(f)
    }
}

pub(crate) fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

pub(crate) fn same_weak_node(a: &WeakNodeRef, b: &WeakNodeRef) -> bool {
    std::ptr::eq(a.as_ptr() as *const (), b.as_ptr() as *const ())
}

//=========================================================================
// Tests
//=========================================================================
