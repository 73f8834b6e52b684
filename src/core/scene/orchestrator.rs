//=========================================================================
// Scene Orchestrator
//=========================================================================
//
// Owns every connector of one scope and drives their lifecycle.
//
// Bootstrap (`execute`, once):
//   1. create the scope registry (child of the parent registry)
//   2. register index, scene handle and config into it
//   3. mark statics, prime reserved ids, pre-register statics
//   4. execute every active static in sorted order
//   5. register active connectors that were not declared static
//
// Mutation while a pass is running is never applied in place: requests
// go to the pending channel and are replayed strictly outside the pass.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

//=== Internal Dependencies ===============================================

use super::{SceneCommand, SceneHandle, ScopeId};
use crate::config::FrameworkConfig;
use crate::core::connector::{compare_connectors, same_connector, ConnectorRef, EntityConnector};
use crate::core::index::SceneEntityIndex;
use crate::core::node::PauseOwner;
use crate::core::registry::ServiceRegistry;

//=== SceneCore ===========================================================

/// Shared state behind [`SceneOrchestrator`] and every [`SceneHandle`].
pub(crate) struct SceneCore {
    name: Rc<str>,
    scope: ScopeId,

    statics: RefCell<Vec<ConnectorRef>>,
    unbaked: RefCell<Vec<ConnectorRef>>,
    dynamics: RefCell<Vec<ConnectorRef>>,
    dynamic_set: RefCell<HashSet<usize>>,

    index: Rc<SceneEntityIndex>,
    registry: RefCell<Option<Rc<ServiceRegistry>>>,
    config: RefCell<Option<Rc<FrameworkConfig>>>,
    auto_register_unbaked: Option<bool>,

    pending_tx: Sender<SceneCommand>,
    pending_rx: Receiver<SceneCommand>,

    pause_owners: RefCell<Vec<PauseOwner>>,

    executed: Cell<bool>,
    initialized: Cell<bool>,
    iterating: Cell<bool>,
    disposed: Cell<bool>,
}

fn key_of(connector: &EntityConnector) -> usize {
    connector as *const EntityConnector as usize
}

impl SceneCore {
    fn handle(self: &Rc<Self>) -> SceneHandle {
        SceneHandle::new(Rc::downgrade(self), self.scope, Rc::clone(&self.name))
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.executed.get() && !self.disposed.get() && self.registry.borrow().is_some()
    }

    pub(crate) fn is_iterating(&self) -> bool {
        self.iterating.get()
    }

    pub(crate) fn registry(&self) -> Option<Rc<ServiceRegistry>> {
        self.registry.borrow().clone()
    }

    pub(crate) fn index(&self) -> Rc<SceneEntityIndex> {
        Rc::clone(&self.index)
    }

    fn config(&self) -> Rc<FrameworkConfig> {
        self.config.borrow().clone().unwrap_or_default()
    }

    //--- Registration -----------------------------------------------------

    pub(crate) fn register_and_execute(self: &Rc<Self>, connector: &ConnectorRef) {
        if !self.is_ready() {
            return;
        }
        if connector.is_static_for(self.scope) {
            return;
        }
        if connector.is_disposed() {
            debug!("scene '{}': ignoring disposed connector '{}'", self.name, connector.name());
            return;
        }

        connector.link_scene(self.handle());

        if self.iterating.get() {
            self.send(SceneCommand::Register(Rc::clone(connector)));
            return;
        }

        self.register_internal(connector);
    }

    pub(crate) fn unregister(&self, connector: &ConnectorRef) {
        if !self.is_ready() {
            return;
        }

        if self.iterating.get() {
            self.send(SceneCommand::Unregister(Rc::clone(connector)));
            return;
        }

        self.unregister_internal(connector);
    }

    fn send(&self, command: SceneCommand) {
        if self.pending_tx.send(command).is_err() {
            warn!("scene '{}': pending channel closed, request dropped", self.name);
        }
    }

    fn register_internal(&self, connector: &ConnectorRef) {
        if self.dynamic_set.borrow().contains(&key_of(connector)) {
            return;
        }
        let Some(registry) = self.registry() else {
            return;
        };

        if self.config().should_log_boot() {
            info!("scene '{}': runtime register '{}'", self.name, connector.name());
        }

        self.index.register(connector);

        if connector.is_active() {
            connector.execute(&registry, Some(&*self.name));
        }

        // A node may have destroyed its own connector during execute.
        if connector.is_disposed() {
            self.index.unregister(connector);
            return;
        }

        let owners = self.pause_owners.borrow().clone();
        for owner in owners {
            connector.pause(owner);
        }

        {
            let mut dynamics = self.dynamics.borrow_mut();
            let pos = dynamics.partition_point(|existing| {
                compare_connectors(existing, connector) != std::cmp::Ordering::Greater
            });
            dynamics.insert(pos, Rc::clone(connector));
        }
        self.dynamic_set.borrow_mut().insert(key_of(connector));
        connector.set_dynamic_registered(true);
    }

    fn unregister_internal(&self, connector: &ConnectorRef) {
        self.index.unregister(connector);
        connector.set_dynamic_registered(false);

        if !self.dynamic_set.borrow_mut().remove(&key_of(connector)) {
            return;
        }

        self.dynamics
            .borrow_mut()
            .retain(|existing| !same_connector(existing, connector));
    }

    /// Replays deferred requests: removals first, then additions.
    fn apply_pending(&self) {
        let mut adds: Vec<ConnectorRef> = Vec::new();
        let mut removes: Vec<ConnectorRef> = Vec::new();

        for command in self.pending_rx.try_iter() {
            let (queue, connector) = match command {
                SceneCommand::Register(c) => (&mut adds, c),
                SceneCommand::Unregister(c) => (&mut removes, c),
            };
            if !queue.iter().any(|queued| same_connector(queued, &connector)) {
                queue.push(connector);
            }
        }

        for connector in &removes {
            self.unregister_internal(connector);
        }
        for connector in &adds {
            self.register_internal(connector);
        }

        self.statics.borrow_mut().retain(|c| !c.is_disposed());
    }

    //--- Dispatch ---------------------------------------------------------

    fn run_pass(&self, mut dispatch: impl FnMut(&EntityConnector)) {
        if !self.initialized.get() || self.disposed.get() {
            return;
        }

        self.apply_pending();

        self.iterating.set(true);
        for list in [&self.statics, &self.dynamics] {
            let mut i = 0;
            loop {
                let connector = match list.borrow().get(i) {
                    Some(c) => Rc::clone(c),
                    None => break,
                };
                i += 1;

                if connector.is_active() {
                    dispatch(&connector);
                }
            }
        }
        self.iterating.set(false);

        self.apply_pending();
    }

    fn all_connectors(&self) -> Vec<ConnectorRef> {
        let mut all = self.statics.borrow().clone();
        all.extend(self.dynamics.borrow().iter().cloned());
        all
    }
}

//=== SceneOrchestrator ===================================================

/// Per-scope driver of connectors. Built with
/// [`SceneBuilder`](super::SceneBuilder).
///
/// Dropping the orchestrator disposes the scope.
pub struct SceneOrchestrator {
    core: Rc<SceneCore>,
}

impl SceneOrchestrator {
    pub(crate) fn new(
        name: String,
        statics: Vec<ConnectorRef>,
        unbaked: Vec<ConnectorRef>,
        auto_register_unbaked: Option<bool>,
        config: Option<FrameworkConfig>,
    ) -> Self {
        let (pending_tx, pending_rx) = crossbeam_channel::unbounded();

        let core = SceneCore {
            name: Rc::from(name),
            scope: ScopeId::next(),
            statics: RefCell::new(statics),
            unbaked: RefCell::new(unbaked),
            dynamics: RefCell::new(Vec::new()),
            dynamic_set: RefCell::new(HashSet::new()),
            index: Rc::new(SceneEntityIndex::new()),
            registry: RefCell::new(None),
            config: RefCell::new(config.map(Rc::new)),
            auto_register_unbaked,
            pending_tx,
            pending_rx,
            pause_owners: RefCell::new(Vec::new()),
            executed: Cell::new(false),
            initialized: Cell::new(false),
            iterating: Cell::new(false),
            disposed: Cell::new(false),
        };

        Self { core: Rc::new(core) }
    }

    //--- Bootstrap --------------------------------------------------------

    /// Bootstraps the scope. Runs once; later calls are ignored.
    pub fn execute(&self, parent: Option<&Rc<ServiceRegistry>>) {
        let core = &self.core;
        if core.executed.get() || core.disposed.get() {
            return;
        }
        core.executed.set(true);

        let registry = Rc::new(match parent {
            Some(parent) => ServiceRegistry::child_of(parent),
            None => ServiceRegistry::new(),
        });

        let config = match core.config.borrow().clone() {
            Some(config) => config,
            None => registry.try_get::<FrameworkConfig>().unwrap_or_default(),
        };
        if registry.try_get::<FrameworkConfig>().is_none() || core.config.borrow().is_some() {
            registry.add(Rc::clone(&config));
        }
        *core.config.borrow_mut() = Some(Rc::clone(&config));

        let handle = core.handle();
        registry.add(Rc::clone(&core.index));
        registry.add(Rc::new(handle.clone()));
        *core.registry.borrow_mut() = Some(Rc::clone(&registry));

        if config.should_log_boot() {
            info!("scene execute: {} (scope {})", core.name, core.scope.raw());
        }

        let statics = {
            let mut statics = core.statics.borrow_mut();
            statics.retain(|c| !c.is_disposed());
            statics.sort_by(|a, b| compare_connectors(a, b));
            statics.clone()
        };

        for connector in &statics {
            connector.mark_static(core.scope);
            connector.link_scene(handle.clone());
        }

        core.index.prime_reserved_ids(&statics, core.scope);

        // Requests raised by nodes during bootstrap wait until it ends.
        core.iterating.set(true);

        for connector in &statics {
            core.index.register(connector);
        }

        for connector in &statics {
            if connector.is_active() {
                if config.should_log_boot() {
                    debug!("scene '{}': static connector '{}'", core.name, connector.name());
                }
                connector.execute(&registry, Some(&*core.name));
            }
        }

        let auto_register = core
            .auto_register_unbaked
            .unwrap_or(config.auto_register_unbaked_connectors);

        let unbaked = {
            let mut unbaked = core.unbaked.borrow_mut();
            unbaked.sort_by(|a, b| compare_connectors(a, b));
            std::mem::take(&mut *unbaked)
        };

        for connector in &unbaked {
            if connector.is_static_for(core.scope) {
                continue;
            }
            connector.link_scene(handle.clone());

            if auto_register && connector.is_active() {
                core.register_internal(connector);
            }
        }

        core.iterating.set(false);
        core.initialized.set(true);
        core.apply_pending();
    }

    //--- Runtime Registration ---------------------------------------------

    /// Registers a runtime connector, executing it if active.
    ///
    /// Deferred to the end of the pass when called during dispatch.
    pub fn register_and_execute(&self, connector: &ConnectorRef) {
        self.core.register_and_execute(connector);
    }

    /// Registers a batch in canonical connector order.
    pub fn register_all(&self, connectors: impl IntoIterator<Item = ConnectorRef>) {
        self.handle().spawn_all(connectors);
    }

    /// Removes a connector from the index and the dynamic list.
    ///
    /// Deferred to the end of the pass when called during dispatch.
    pub fn unregister(&self, connector: &ConnectorRef) {
        self.core.unregister(connector);
    }

    //--- Frame Phases -----------------------------------------------------

    pub fn tick(&self, dt: f32) {
        self.core.run_pass(|c| c.tick(dt));
    }

    pub fn fixed_tick(&self, dt: f32) {
        self.core.run_pass(|c| c.fixed_tick(dt));
    }

    pub fn late_tick(&self, dt: f32) {
        self.core.run_pass(|c| c.late_tick(dt));
    }

    //--- Pause ------------------------------------------------------------

    /// Pauses every connector of the scope on behalf of `owner`.
    ///
    /// Connectors registered later inherit every active owner.
    pub fn pause(&self, owner: PauseOwner) {
        let core = &self.core;
        if !core.initialized.get() || core.disposed.get() {
            return;
        }

        {
            let mut owners = core.pause_owners.borrow_mut();
            if owners.contains(&owner) {
                return;
            }
            owners.push(owner);
        }

        for connector in core.all_connectors() {
            connector.pause(owner);
        }
    }

    pub fn resume(&self, owner: PauseOwner) {
        let core = &self.core;
        if !core.initialized.get() || core.disposed.get() {
            return;
        }

        {
            let mut owners = core.pause_owners.borrow_mut();
            let Some(pos) = owners.iter().position(|o| *o == owner) else {
                return;
            };
            owners.remove(pos);
        }

        for connector in core.all_connectors() {
            connector.resume(owner);
        }
    }

    pub fn is_paused(&self) -> bool {
        !self.core.pause_owners.borrow().is_empty()
    }

    //--- Teardown ---------------------------------------------------------

    /// Disposes every connector and clears the scope. Idempotent.
    pub fn dispose(&self) {
        let core = &self.core;
        if core.disposed.get() {
            return;
        }
        core.disposed.set(true);

        if !core.executed.get() {
            return;
        }

        if core.config().should_log_boot() {
            info!("scene dispose: {}", core.name);
        }

        for connector in core.all_connectors() {
            connector.dispose();
        }

        core.statics.borrow_mut().clear();
        core.dynamics.borrow_mut().clear();
        core.dynamic_set.borrow_mut().clear();
        core.pause_owners.borrow_mut().clear();

        while core.pending_rx.try_recv().is_ok() {}

        core.index.clear();
        if let Some(registry) = core.registry.borrow_mut().take() {
            registry.clear();
        }
    }

    //--- Accessors --------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn scope(&self) -> ScopeId {
        self.core.scope
    }

    pub fn handle(&self) -> SceneHandle {
        self.core.handle()
    }

    /// The scope registry. `None` before `execute` and after `dispose`.
    pub fn registry(&self) -> Option<Rc<ServiceRegistry>> {
        self.core.registry()
    }

    pub fn index(&self) -> Rc<SceneEntityIndex> {
        self.core.index()
    }

    pub fn is_executed(&self) -> bool {
        self.core.executed.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.core.initialized.get()
    }

    pub fn is_iterating(&self) -> bool {
        self.core.iterating.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.disposed.get()
    }

    pub fn static_connectors(&self) -> Vec<ConnectorRef> {
        self.core.statics.borrow().clone()
    }

    pub fn dynamic_connectors(&self) -> Vec<ConnectorRef> {
        self.core.dynamics.borrow().clone()
    }

    /// Static then dynamic connectors, in dispatch order.
    pub fn connectors(&self) -> Vec<ConnectorRef> {
        self.core.all_connectors()
    }

    pub fn pending_count(&self) -> usize {
        self.core.pending_rx.len()
    }
}

impl Drop for SceneOrchestrator {
    fn drop(&mut self) {
        self.dispose();
    }
}

//=========================================================================
// Tests
//=========================================================================
