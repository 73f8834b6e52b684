//=========================================================================
// Project Context
//=========================================================================
//
// The outermost scope. Everything resolved through parent delegation
// ends up here.
//
//   ProjectContext
//     registry: FrameworkConfig, AppLifecycle, root connector services
//       └─ scene registry (one per SceneOrchestrator)
//
//=========================================================================

//=== External Dependencies ===============================================

use std::rc::Rc;

use log::info;

//=== Internal Dependencies ===============================================

use super::AppLifecycle;
use crate::config::FrameworkConfig;
use crate::core::connector::ConnectorRef;
use crate::core::registry::ServiceRegistry;

//=== ProjectContext ======================================================

/// Owns the project registry and the optional project root connector.
///
/// The root connector is executed against the project registry right
/// away, so its nodes can install project-wide services in `bind`. It is
/// disposed when the context is dropped.
pub struct ProjectContext {
    registry: Rc<ServiceRegistry>,
    config: Rc<FrameworkConfig>,
    lifecycle: Rc<AppLifecycle>,
    root: Option<ConnectorRef>,
}

impl ProjectContext {
    pub fn new(config: FrameworkConfig, root: Option<ConnectorRef>) -> Self {
        let registry = Rc::new(ServiceRegistry::new());
        let config = Rc::new(config);
        let lifecycle = Rc::new(AppLifecycle::new());

        registry.add(Rc::clone(&config));
        registry.add(Rc::clone(&lifecycle));

        if let Some(root) = &root {
            if config.should_log_boot() {
                info!("project root execute: {}", root.name());
            }
            root.execute(&registry, Some("ProjectContext"));
        }

        Self { registry, config, lifecycle, root }
    }

    pub fn registry(&self) -> &Rc<ServiceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Rc<FrameworkConfig> {
        &self.config
    }

    pub fn lifecycle(&self) -> &Rc<AppLifecycle> {
        &self.lifecycle
    }

    pub fn root(&self) -> Option<&ConnectorRef> {
        self.root.as_ref()
    }
}

impl Drop for ProjectContext {
    fn drop(&mut self) {
        if let Some(root) = self.root.take() {
            root.dispose();
        }
        self.registry.clear();
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connector::EntityConnector;
    use crate::core::node::{Capabilities, Node, NodeContext};
    use std::cell::RefCell;

    struct Settings {
        volume: f32,
    }

    struct Installer {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Node for Installer {
        fn capabilities(&self) -> Capabilities {
            Capabilities::BIND | Capabilities::DISPOSE
        }

        fn bind(&mut self, ctx: &NodeContext) {
            ctx.registry().add(Rc::new(Settings { volume: 0.5 }));
            self.log.borrow_mut().push("bind".into());
        }

        fn dispose(&mut self) {
            self.log.borrow_mut().push("dispose".into());
        }
    }

    #[test]
    fn registers_config_and_lifecycle() {
        let project = ProjectContext::new(FrameworkConfig::default(), None);

        assert!(project.registry().contains::<FrameworkConfig>());
        assert!(project.registry().contains::<AppLifecycle>());
        assert!(Rc::ptr_eq(
            &project.registry().get::<AppLifecycle>().unwrap(),
            project.lifecycle()
        ));
        assert!(project.root().is_none());
    }

    #[test]
    fn root_connector_installs_project_services() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let root = EntityConnector::builder("ProjectRoot")
            .node(Installer { log: Rc::clone(&log) })
            .build();

        let project = ProjectContext::new(FrameworkConfig::default(), Some(Rc::clone(&root)));
        assert!(root.is_executed());

        let child = ServiceRegistry::child_of(project.registry());
        assert_eq!(child.get::<Settings>().unwrap().volume, 0.5);

        drop(project);
        assert!(root.is_disposed());
        assert_eq!(*log.borrow(), vec!["bind", "dispose"]);
    }
}
