//! The device channel the contact is attached to.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Access to the local channel registration.
pub trait ChannelProvider: Send + Sync {
    /// The channel id, once the channel has been created.
    fn channel_id(&self) -> Option<String>;

    /// Ask the channel to re-register, e.g. after the contact changed.
    fn update_registration(&self);
}

/// A fixed channel. For tests.
#[derive(Debug, Default)]
pub struct StaticChannel {
    channel_id: RwLock<Option<String>>,
    registration_updates: AtomicUsize,
}

impl StaticChannel {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: RwLock::new(Some(channel_id.into())),
            registration_updates: AtomicUsize::new(0),
        }
    }

    /// A channel that has not been created yet.
    pub fn unregistered() -> Self {
        Self::default()
    }

    pub fn set_channel_id(&self, channel_id: Option<String>) {
        *self.channel_id.write().unwrap_or_else(|e| e.into_inner()) = channel_id;
    }

    /// How many times a registration refresh was requested.
    pub fn registration_updates(&self) -> usize {
        self.registration_updates.load(Ordering::SeqCst)
    }
}

impl ChannelProvider for StaticChannel {
    fn channel_id(&self) -> Option<String> {
        self.channel_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn update_registration(&self) {
        self.registration_updates.fetch_add(1, Ordering::SeqCst);
    }
}
