//=========================================================================
// App Lifecycle
//=========================================================================
//
// Application-level notifications raised by the host:
//
//   focus  → listeners(has_focus, sender)
//   pause  → listeners(is_paused, sender)
//   quit   → listeners(sender)
//
// Focus and pause only notify on an actual state change. Listeners may
// subscribe or unsubscribe from inside a notification; the change is
// seen by the next notification.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::debug;

//=== Listener Types ======================================================

type StateListener = Rc<dyn Fn(bool, Option<&str>)>;
type QuitListener = Rc<dyn Fn(Option<&str>)>;

/// Handle returned by the `on_*` methods, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

//=== AppLifecycle ========================================================

/// Project-scope service carrying focus, pause and quit notifications.
///
/// Registered in the project registry by
/// [`ProjectContext`](super::ProjectContext), so any node can resolve it
/// during `bind` and subscribe.
pub struct AppLifecycle {
    focused: Cell<bool>,
    paused_by_system: Cell<bool>,
    next_id: Cell<u64>,

    focus_listeners: RefCell<Vec<(ListenerId, StateListener)>>,
    pause_listeners: RefCell<Vec<(ListenerId, StateListener)>>,
    quit_listeners: RefCell<Vec<(ListenerId, QuitListener)>>,
}

impl AppLifecycle {
    pub fn new() -> Self {
        Self {
            focused: Cell::new(true),
            paused_by_system: Cell::new(false),
            next_id: Cell::new(1),
            focus_listeners: RefCell::new(Vec::new()),
            pause_listeners: RefCell::new(Vec::new()),
            quit_listeners: RefCell::new(Vec::new()),
        }
    }

    fn next_id(&self) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        ListenerId(id)
    }

    //--- State ------------------------------------------------------------

    pub fn is_focused(&self) -> bool {
        self.focused.get()
    }

    pub fn is_paused_by_system(&self) -> bool {
        self.paused_by_system.get()
    }

    //--- Subscriptions ----------------------------------------------------

    pub fn on_focus_changed(&self, listener: impl Fn(bool, Option<&str>) + 'static) -> ListenerId {
        let id = self.next_id();
        self.focus_listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn on_pause_changed(&self, listener: impl Fn(bool, Option<&str>) + 'static) -> ListenerId {
        let id = self.next_id();
        self.pause_listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn on_quit(&self, listener: impl Fn(Option<&str>) + 'static) -> ListenerId {
        let id = self.next_id();
        self.quit_listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    /// Removes a listener of any kind. Returns `false` for unknown ids.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        fn remove<L>(list: &RefCell<Vec<(ListenerId, L)>>, id: ListenerId) -> bool {
            let mut list = list.borrow_mut();
            let before = list.len();
            list.retain(|(entry, _)| *entry != id);
            list.len() != before
        }

        remove(&self.focus_listeners, id)
            || remove(&self.pause_listeners, id)
            || remove(&self.quit_listeners, id)
    }

    pub fn listener_count(&self) -> usize {
        self.focus_listeners.borrow().len()
            + self.pause_listeners.borrow().len()
            + self.quit_listeners.borrow().len()
    }

    //--- Notifications ----------------------------------------------------

    pub fn raise_focus_changed(&self, has_focus: bool, sender: Option<&str>) {
        if self.focused.replace(has_focus) == has_focus {
            return;
        }
        debug!("app focus changed: {}", has_focus);

        let listeners: Vec<StateListener> = snapshot(&self.focus_listeners);
        for listener in listeners {
            listener(has_focus, sender);
        }
    }

    pub fn raise_pause_changed(&self, is_paused: bool, sender: Option<&str>) {
        if self.paused_by_system.replace(is_paused) == is_paused {
            return;
        }
        debug!("app pause changed: {}", is_paused);

        let listeners: Vec<StateListener> = snapshot(&self.pause_listeners);
        for listener in listeners {
            listener(is_paused, sender);
        }
    }

    /// Quit is not deduplicated; every call notifies.
    pub fn raise_quit(&self, sender: Option<&str>) {
        debug!("app quit");

        let listeners: Vec<QuitListener> = snapshot(&self.quit_listeners);
        for listener in listeners {
            listener(sender);
        }
    }
}

fn snapshot<L: Clone>(list: &RefCell<Vec<(ListenerId, L)>>) -> Vec<L> {
    list.borrow().iter().map(|(_, listener)| listener.clone()).collect()
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn starts_focused_and_unpaused() {
        let lifecycle = AppLifecycle::new();
        assert!(lifecycle.is_focused());
        assert!(!lifecycle.is_paused_by_system());
    }

    #[test]
    fn repeated_states_notify_once() {
        let lifecycle = AppLifecycle::new();
        let log = recorder();

        let sink = Rc::clone(&log);
        lifecycle.on_focus_changed(move |focus, _| sink.borrow_mut().push(format!("focus:{focus}")));
        let sink = Rc::clone(&log);
        lifecycle.on_pause_changed(move |paused, _| sink.borrow_mut().push(format!("pause:{paused}")));

        lifecycle.raise_focus_changed(true, None);
        lifecycle.raise_focus_changed(false, None);
        lifecycle.raise_focus_changed(false, None);
        lifecycle.raise_pause_changed(true, None);
        lifecycle.raise_pause_changed(true, None);
        lifecycle.raise_pause_changed(false, None);

        assert_eq!(*log.borrow(), vec!["focus:false", "pause:true", "pause:false"]);
        assert!(!lifecycle.is_focused());
    }

    #[test]
    fn quit_passes_the_sender() {
        let lifecycle = AppLifecycle::new();
        let log = recorder();

        let sink = Rc::clone(&log);
        lifecycle.on_quit(move |sender| sink.borrow_mut().push(sender.unwrap_or("-").to_string()));

        lifecycle.raise_quit(Some("host"));
        lifecycle.raise_quit(None);

        assert_eq!(*log.borrow(), vec!["host", "-"]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let lifecycle = AppLifecycle::new();
        let log = recorder();

        let sink = Rc::clone(&log);
        let id = lifecycle.on_focus_changed(move |_, _| sink.borrow_mut().push("hit".into()));
        assert_eq!(lifecycle.listener_count(), 1);

        assert!(lifecycle.unsubscribe(id));
        assert!(!lifecycle.unsubscribe(id));
        lifecycle.raise_focus_changed(false, None);

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn listener_may_subscribe_during_notification() {
        let lifecycle = Rc::new(AppLifecycle::new());
        let weak = Rc::downgrade(&lifecycle);

        lifecycle.on_quit(move |_| {
            if let Some(lifecycle) = weak.upgrade() {
                lifecycle.on_quit(|_| {});
            }
        });

        lifecycle.raise_quit(None);
        assert_eq!(lifecycle.listener_count(), 2);
    }
}
