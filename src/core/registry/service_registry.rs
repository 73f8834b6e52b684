//=========================================================================
// Service Registry
//=========================================================================
//
// Hierarchical type- and tag-keyed service lookup.
//
// Architecture:
//   ProjectContext registry (root)
//        ↑ parent
//   Scene registry ──→ add<T>() / add_tagged<T>()   (always local)
//        ↓
//   try_get<T>() → local map → parent → parent ... → None
//
// Scopes form a tree: each registry holds an optional strong reference
// to its parent, never to its children.
//
// Single-threaded. All operations take `&self` so nodes can register
// services through a shared handle while the scope is being bootstrapped.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

//=== Internal Dependencies ===============================================

use crate::error::RegistryError;

//=== ServiceRegistry =====================================================

type ServiceMap = HashMap<TypeId, Rc<dyn Any>>;
type TaggedServiceMap = HashMap<TypeId, HashMap<String, Rc<dyn Any>>>;

/// A scope of type-keyed and (type, tag)-keyed services.
pub struct ServiceRegistry {
    parent: Option<Rc<ServiceRegistry>>,
    services: RefCell<ServiceMap>,
    tagged: RefCell<TaggedServiceMap>,
}

impl ServiceRegistry {
    /// Creates a root scope with no parent.
    pub fn new() -> Self {
        Self {
            parent: None,
            services: RefCell::new(HashMap::new()),
            tagged: RefCell::new(HashMap::new()),
        }
    }

    /// Creates a scope whose misses delegate to `parent`.
    pub fn child_of(parent: &Rc<ServiceRegistry>) -> Self {
        Self {
            parent: Some(Rc::clone(parent)),
            ..Self::new()
        }
    }

    pub fn parent(&self) -> Option<&Rc<ServiceRegistry>> {
        self.parent.as_ref()
    }

    //--- Typed Services ---------------------------------------------------

    /// Stores `value` as the local `T`, replacing any previous one.
    pub fn add<T: 'static>(&self, value: Rc<T>) {
        self.services
            .borrow_mut()
            .insert(TypeId::of::<T>(), value as Rc<dyn Any>);
    }

    /// Stores `value` only if no local `T` exists yet.
    pub fn add_exclusive<T: 'static>(&self, value: Rc<T>) -> Result<(), RegistryError> {
        let mut services = self.services.borrow_mut();
        let key = TypeId::of::<T>();

        if services.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered {
                type_name: type_name::<T>(),
            });
        }

        services.insert(key, value as Rc<dyn Any>);
        Ok(())
    }

    /// Removes the local `T`. Returns whether something was removed.
    pub fn remove<T: 'static>(&self) -> bool {
        self.services.borrow_mut().remove(&TypeId::of::<T>()).is_some()
    }

    /// Removes the local `T` only if it is the same allocation as `expected`.
    pub fn remove_if_same<T: 'static>(&self, expected: &Rc<T>) -> bool {
        let mut services = self.services.borrow_mut();
        let key = TypeId::of::<T>();

        let same = services
            .get(&key)
            .map(|stored| same_allocation(stored, expected))
            .unwrap_or(false);

        if same {
            services.remove(&key);
        }
        same
    }

    /// Looks up `T` locally, then through the parent chain.
    pub fn try_get<T: 'static>(&self) -> Option<Rc<T>> {
        let local = self
            .services
            .borrow()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok());

        match local {
            Some(service) => Some(service),
            None => self.parent.as_ref().and_then(|parent| parent.try_get::<T>()),
        }
    }

    /// Like [`try_get`](Self::try_get), failing with `NotFound` on a miss.
    pub fn get<T: 'static>(&self) -> Result<Rc<T>, RegistryError> {
        self.try_get::<T>().ok_or(RegistryError::NotFound {
            type_name: type_name::<T>(),
        })
    }

    /// Local-only presence check.
    pub fn contains<T: 'static>(&self) -> bool {
        self.services.borrow().contains_key(&TypeId::of::<T>())
    }

    //--- Tagged Services --------------------------------------------------

    /// Stores `value` under `(T, tag)`. Tags are trimmed before use.
    ///
    /// With `overwrite == false` an existing local entry is an error.
    pub fn add_tagged<T: 'static>(
        &self,
        tag: &str,
        value: Rc<T>,
        overwrite: bool,
    ) -> Result<(), RegistryError> {
        let tag = normalize_tag(tag)?;
        let mut tagged = self.tagged.borrow_mut();
        let bucket = tagged.entry(TypeId::of::<T>()).or_default();

        if !overwrite && bucket.contains_key(tag) {
            return Err(RegistryError::TaggedAlreadyRegistered {
                type_name: type_name::<T>(),
                tag: tag.to_string(),
            });
        }

        bucket.insert(tag.to_string(), value as Rc<dyn Any>);
        Ok(())
    }

    /// Removes the local `(T, tag)` entry. Returns whether something was removed.
    pub fn remove_tagged<T: 'static>(&self, tag: &str) -> bool {
        let Ok(tag) = normalize_tag(tag) else {
            return false;
        };

        let mut tagged = self.tagged.borrow_mut();
        let key = TypeId::of::<T>();

        let Some(bucket) = tagged.get_mut(&key) else {
            return false;
        };

        let removed = bucket.remove(tag).is_some();
        if bucket.is_empty() {
            tagged.remove(&key);
        }
        removed
    }

    /// Looks up `(T, tag)` locally, then through the parent chain.
    pub fn try_get_tagged<T: 'static>(&self, tag: &str) -> Option<Rc<T>> {
        let tag = normalize_tag(tag).ok()?;

        let local = self
            .tagged
            .borrow()
            .get(&TypeId::of::<T>())
            .and_then(|bucket| bucket.get(tag))
            .cloned()
            .and_then(|service| service.downcast::<T>().ok());

        match local {
            Some(service) => Some(service),
            None => self
                .parent
                .as_ref()
                .and_then(|parent| parent.try_get_tagged::<T>(tag)),
        }
    }

    pub fn get_tagged<T: 'static>(&self, tag: &str) -> Result<Rc<T>, RegistryError> {
        let normalized = normalize_tag(tag)?;
        self.try_get_tagged::<T>(normalized)
            .ok_or_else(|| RegistryError::TaggedNotFound {
                type_name: type_name::<T>(),
                tag: normalized.to_string(),
            })
    }

    /// Local-only presence check for `(T, tag)`.
    pub fn contains_tagged<T: 'static>(&self, tag: &str) -> bool {
        let Ok(tag) = normalize_tag(tag) else {
            return false;
        };

        self.tagged
            .borrow()
            .get(&TypeId::of::<T>())
            .map(|bucket| bucket.contains_key(tag))
            .unwrap_or(false)
    }

    //--- Maintenance ------------------------------------------------------

    /// Drops every local entry. The parent scope is untouched.
    pub fn clear(&self) {
        // Take the maps first so services dropping here can re-enter.
        let services = std::mem::take(&mut *self.services.borrow_mut());
        let tagged = std::mem::take(&mut *self.tagged.borrow_mut());
        drop(services);
        drop(tagged);
    }

    /// Number of local entries, typed and tagged.
    pub fn len(&self) -> usize {
        let tagged: usize = self.tagged.borrow().values().map(HashMap::len).sum();
        self.services.borrow().len() + tagged
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//=== Helpers =============================================================

fn normalize_tag(tag: &str) -> Result<&str, RegistryError> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        Err(RegistryError::EmptyTag)
    } else {
        Ok(trimmed)
    }
}

fn same_allocation<T: 'static>(stored: &Rc<dyn Any>, expected: &Rc<T>) -> bool {
    std::ptr::eq(
        Rc::as_ptr(stored) as *const (),
        Rc::as_ptr(expected) as *const (),
    )
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Score(u32);

    #[derive(Debug, PartialEq)]
    struct Spawner(&'static str);

    #[test]
    fn add_then_get_returns_same_instance() {
        let registry = ServiceRegistry::new();
        let score = Rc::new(Score(10));
        registry.add(Rc::clone(&score));

        let resolved = registry.get::<Score>().unwrap();
        assert!(Rc::ptr_eq(&resolved, &score));
        assert!(registry.contains::<Score>());
    }

    #[test]
    fn add_overwrites_previous_value() {
        let registry = ServiceRegistry::new();
        registry.add(Rc::new(Score(1)));
        registry.add(Rc::new(Score(2)));
        assert_eq!(*registry.get::<Score>().unwrap(), Score(2));
    }

    #[test]
    fn add_exclusive_rejects_duplicates() {
        let registry = ServiceRegistry::new();
        registry.add_exclusive(Rc::new(Score(1))).unwrap();

        let err = registry.add_exclusive(Rc::new(Score(2))).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
        assert_eq!(*registry.get::<Score>().unwrap(), Score(1));
    }

    #[test]
    fn missing_service_is_not_found() {
        let registry = ServiceRegistry::new();
        assert!(registry.try_get::<Score>().is_none());
        assert!(matches!(
            registry.get::<Score>(),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn lookups_delegate_to_parent_but_writes_stay_local() {
        let root = Rc::new(ServiceRegistry::new());
        root.add(Rc::new(Score(5)));

        let child = ServiceRegistry::child_of(&root);
        assert_eq!(*child.get::<Score>().unwrap(), Score(5));
        assert!(!child.contains::<Score>());

        child.add(Rc::new(Score(9)));
        assert_eq!(*child.get::<Score>().unwrap(), Score(9));
        assert_eq!(*root.get::<Score>().unwrap(), Score(5));

        child.clear();
        assert_eq!(*child.get::<Score>().unwrap(), Score(5));
        assert!(root.contains::<Score>());
    }

    #[test]
    fn remove_if_same_ignores_replaced_instances() {
        let registry = ServiceRegistry::new();
        let first = Rc::new(Score(1));
        let second = Rc::new(Score(2));

        registry.add(Rc::clone(&first));
        registry.add(Rc::clone(&second));

        assert!(!registry.remove_if_same(&first));
        assert!(registry.contains::<Score>());

        assert!(registry.remove_if_same(&second));
        assert!(!registry.contains::<Score>());
        assert!(!registry.remove::<Score>());
    }

    #[test]
    fn tagged_entries_are_trimmed_and_delegated() {
        let root = Rc::new(ServiceRegistry::new());
        root.add_tagged("  Hero ", Rc::new(Spawner("hero")), false).unwrap();

        let child = ServiceRegistry::child_of(&root);
        assert_eq!(*child.get_tagged::<Spawner>("Hero").unwrap(), Spawner("hero"));
        assert!(child.try_get_tagged::<Spawner>("Enemy").is_none());
        assert!(!child.contains_tagged::<Spawner>("Hero"));
        assert!(root.contains_tagged::<Spawner>("Hero"));
    }

    #[test]
    fn tagged_overwrite_flag_is_honoured() {
        let registry = ServiceRegistry::new();
        registry.add_tagged("a", Rc::new(Spawner("one")), false).unwrap();

        let err = registry
            .add_tagged("a", Rc::new(Spawner("two")), false)
            .unwrap_err();
        assert!(matches!(err, RegistryError::TaggedAlreadyRegistered { .. }));

        registry.add_tagged("a", Rc::new(Spawner("two")), true).unwrap();
        assert_eq!(*registry.get_tagged::<Spawner>("a").unwrap(), Spawner("two"));
    }

    #[test]
    fn empty_tags_are_rejected() {
        let registry = ServiceRegistry::new();
        assert_eq!(
            registry.add_tagged("   ", Rc::new(Spawner("x")), true),
            Err(RegistryError::EmptyTag)
        );
        assert!(registry.try_get_tagged::<Spawner>("").is_none());
        assert!(!registry.remove_tagged::<Spawner>(""));
    }

    #[test]
    fn remove_tagged_drops_only_that_entry() {
        let registry = ServiceRegistry::new();
        registry.add_tagged("a", Rc::new(Spawner("a")), false).unwrap();
        registry.add_tagged("b", Rc::new(Spawner("b")), false).unwrap();
        assert_eq!(registry.len(), 2);

        assert!(registry.remove_tagged::<Spawner>("a"));
        assert!(!registry.remove_tagged::<Spawner>("a"));
        assert!(registry.contains_tagged::<Spawner>("b"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn typed_and_tagged_maps_are_independent() {
        let registry = ServiceRegistry::new();
        registry.add(Rc::new(Spawner("plain")));
        registry.add_tagged("x", Rc::new(Spawner("tagged")), false).unwrap();

        assert_eq!(*registry.get::<Spawner>().unwrap(), Spawner("plain"));
        assert_eq!(*registry.get_tagged::<Spawner>("x").unwrap(), Spawner("tagged"));

        registry.clear();
        assert!(registry.is_empty());
    }
}
