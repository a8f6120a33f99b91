//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use contact_sync::{Contact, ContactConfig, ContactServices, Feature, JobResult};
use contact_sync_engine::{
    ManualClock, MemoryContactService, RecordingDispatcher, StaticChannel, ACTION_UPDATE_CONTACT,
};
use contact_sync_store::MemoryStore;

/// A contact over the fixture's in-memory collaborators.
pub type TestContact = Contact<Arc<MemoryStore>, MemoryContactService>;

/// Upper bound on jobs run by [`TestFixture::drain`].
const MAX_JOBS: usize = 64;

/// Default channel id of a fixture.
pub const CHANNEL_ID: &str = "channel-1";

/// In-memory store, remote service, scheduler, channel and clock.
///
/// The store outlives any contact built from the fixture, so building a
/// second contact simulates an app restart.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub service: Arc<MemoryContactService>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub channel: Arc<StaticChannel>,
    pub clock: Arc<ManualClock>,
    pub features: Vec<Feature>,
}

impl TestFixture {
    /// A fixture with a registered channel and every feature enabled.
    pub fn new() -> Self {
        Self::with_features(&Feature::ALL)
    }

    pub fn with_features(features: &[Feature]) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            service: MemoryContactService::new(),
            dispatcher: Arc::new(RecordingDispatcher::new()),
            channel: Arc::new(StaticChannel::new(CHANNEL_ID)),
            clock: Arc::new(ManualClock::new(1_700_000_000_000)),
            features: features.to_vec(),
        }
    }

    pub fn services(&self) -> ContactServices {
        ContactServices::new(self.dispatcher.clone(), self.channel.clone())
            .with_clock(self.clock.clone())
    }

    /// Build and initialize a contact over the shared store.
    pub fn contact(&self) -> Arc<TestContact> {
        let config = ContactConfig {
            enabled_features: self.features.clone(),
            ..ContactConfig::default()
        };
        let contact = Contact::new(
            self.store.clone(),
            self.service.clone(),
            self.services(),
            config,
        );
        contact.init();
        contact
    }

    /// Run jobs the way a scheduler would until the log is empty or a job
    /// asks to be retried. Returns the last job result.
    pub async fn drain(&self, contact: &TestContact) -> JobResult {
        let mut result = JobResult::Finished;
        for _ in 0..MAX_JOBS {
            match contact.pending_operations() {
                Ok(ops) if ops.is_empty() => break,
                Ok(_) => {}
                Err(_) => return JobResult::Retry,
            }
            result = contact.perform_job(ACTION_UPDATE_CONTACT).await;
            if result == JobResult::Retry {
                break;
            }
        }
        result
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
