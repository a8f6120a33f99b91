//! Listener registration and notification.
//!
//! Listeners are snapshotted before notification, so a listener may add or
//! remove listeners from inside its callback.

use std::sync::{Arc, RwLock};

use contact_sync_core::{AttributeMutation, ContactData, TagGroupsMutation};

/// Called with exactly the attribute mutations that were uploaded while the
/// contact was anonymous.
pub trait AttributeListener: Send + Sync {
    fn on_attribute_mutations_uploaded(&self, mutations: &[AttributeMutation]);
}

impl<F> AttributeListener for F
where
    F: Fn(&[AttributeMutation]) + Send + Sync,
{
    fn on_attribute_mutations_uploaded(&self, mutations: &[AttributeMutation]) {
        self(mutations)
    }
}

/// Called with exactly the tag group mutations that were uploaded while the
/// contact was anonymous.
pub trait TagGroupListener: Send + Sync {
    fn on_tag_group_mutations_uploaded(&self, mutations: &[TagGroupsMutation]);
}

impl<F> TagGroupListener for F
where
    F: Fn(&[TagGroupsMutation]) + Send + Sync,
{
    fn on_tag_group_mutations_uploaded(&self, mutations: &[TagGroupsMutation]) {
        self(mutations)
    }
}

/// Called after the current contact id changed.
pub trait ContactChangeListener: Send + Sync {
    fn on_contact_changed(&self);
}

impl<F> ContactChangeListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_contact_changed(&self) {
        self()
    }
}

/// Data accrued on an anonymous contact that lost to a different contact.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictEvent {
    pub anonymous_data: ContactData,
    pub named_user_id: Option<String>,
}

/// Called when anonymous data would otherwise be lost.
pub trait ConflictListener: Send + Sync {
    fn on_conflict(&self, event: &ConflictEvent);
}

impl<F> ConflictListener for F
where
    F: Fn(&ConflictEvent) + Send + Sync,
{
    fn on_conflict(&self, event: &ConflictEvent) {
        self(event)
    }
}

/// A copy-on-notify list of listeners.
pub struct ListenerList<T: ?Sized> {
    listeners: RwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> Default for ListenerList<T> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> ListenerList<T> {
    pub fn add(&self, listener: Arc<T>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Remove a listener previously added. Compares by allocation.
    pub fn remove(&self, listener: &Arc<T>) {
        let target = Arc::as_ptr(listener) as *const ();
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|l| Arc::as_ptr(l) as *const () != target);
    }

    /// The listeners registered right now.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All listener lists of one engine.
#[derive(Default)]
pub struct Listeners {
    pub attributes: ListenerList<dyn AttributeListener>,
    pub tag_groups: ListenerList<dyn TagGroupListener>,
    pub contact_changes: ListenerList<dyn ContactChangeListener>,
    pub conflicts: ListenerList<dyn ConflictListener>,
}

impl Listeners {
    pub(crate) fn notify_attributes(&self, mutations: &[AttributeMutation]) {
        if mutations.is_empty() {
            return;
        }
        for listener in self.attributes.snapshot() {
            listener.on_attribute_mutations_uploaded(mutations);
        }
    }

    pub(crate) fn notify_tag_groups(&self, mutations: &[TagGroupsMutation]) {
        if mutations.is_empty() {
            return;
        }
        for listener in self.tag_groups.snapshot() {
            listener.on_tag_group_mutations_uploaded(mutations);
        }
    }

    pub(crate) fn notify_contact_changed(&self) {
        for listener in self.contact_changes.snapshot() {
            listener.on_contact_changed();
        }
    }

    pub(crate) fn notify_conflict(&self, event: &ConflictEvent) {
        for listener in self.conflicts.snapshot() {
            listener.on_conflict(event);
        }
    }
}
