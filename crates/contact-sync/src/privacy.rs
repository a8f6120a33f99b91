//! Privacy feature flags.
//!
//! Contact calls are gated on two features. Disabling them at runtime is
//! observed through change listeners so that data tied to a named contact
//! can be reset.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use contact_sync_engine::ListenerList;

/// A feature the user may opt out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    /// Contact identification and channel registration.
    Contacts,
    /// Tags, attributes and subscription lists.
    TagsAndAttributes,
}

impl Feature {
    pub const ALL: [Feature; 2] = [Feature::Contacts, Feature::TagsAndAttributes];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Contacts => f.write_str("CONTACTS"),
            Feature::TagsAndAttributes => f.write_str("TAGS_AND_ATTRIBUTES"),
        }
    }
}

/// Called after the enabled feature set changed.
pub trait PrivacyListener: Send + Sync {
    fn on_enabled_features_changed(&self);
}

impl<F> PrivacyListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_enabled_features_changed(&self) {
        self()
    }
}

/// The set of enabled features, shared between components.
pub struct PrivacyManager {
    enabled: RwLock<BTreeSet<Feature>>,
    listeners: ListenerList<dyn PrivacyListener>,
}

impl PrivacyManager {
    pub fn new(enabled: impl IntoIterator<Item = Feature>) -> Arc<Self> {
        Arc::new(Self {
            enabled: RwLock::new(enabled.into_iter().collect()),
            listeners: ListenerList::default(),
        })
    }

    /// A manager with every feature enabled.
    pub fn all_enabled() -> Arc<Self> {
        Self::new(Feature::ALL)
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.enabled
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&feature)
    }

    /// True only if every listed feature is enabled.
    pub fn are_enabled(&self, features: &[Feature]) -> bool {
        let enabled = self.enabled.read().unwrap_or_else(|e| e.into_inner());
        features.iter().all(|f| enabled.contains(f))
    }

    pub fn enable(&self, features: &[Feature]) {
        self.update(|enabled| enabled.extend(features.iter().copied()));
    }

    pub fn disable(&self, features: &[Feature]) {
        self.update(|enabled| enabled.retain(|f| !features.contains(f)));
    }

    /// Replace the enabled set.
    pub fn set_enabled(&self, features: &[Feature]) {
        self.update(|enabled| *enabled = features.iter().copied().collect());
    }

    pub fn add_listener(&self, listener: Arc<dyn PrivacyListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn PrivacyListener>) {
        self.listeners.remove(listener);
    }

    fn update(&self, f: impl FnOnce(&mut BTreeSet<Feature>)) {
        let changed = {
            let mut enabled = self.enabled.write().unwrap_or_else(|e| e.into_inner());
            let before = enabled.clone();
            f(&mut enabled);
            *enabled != before
        };
        if changed {
            for listener in self.listeners.snapshot() {
                listener.on_enabled_features_changed();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listeners_only_see_real_changes() {
        let privacy = PrivacyManager::all_enabled();
        let changes = Arc::new(AtomicUsize::new(0));
        let c = changes.clone();
        privacy.add_listener(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        privacy.enable(&[Feature::Contacts]);
        assert_eq!(changes.load(Ordering::SeqCst), 0);

        privacy.disable(&[Feature::Contacts]);
        assert_eq!(changes.load(Ordering::SeqCst), 1);
        assert!(!privacy.is_enabled(Feature::Contacts));
        assert!(!privacy.are_enabled(&Feature::ALL));
        assert!(privacy.is_enabled(Feature::TagsAndAttributes));

        privacy.set_enabled(&Feature::ALL);
        assert!(privacy.are_enabled(&Feature::ALL));
        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }
}
