//! The contact engine: owned state plus its collaborators.
//!
//! Execution lives in [`driver`](crate::driver) and subscription list
//! lookups in [`subscriptions`](crate::subscriptions); this module holds
//! construction, enqueueing, and the read-side queries over the log.

use std::sync::Arc;

use contact_sync_core::{
    AttributeMutation, ContactIdentity, Operation, ScopedSubscriptionListMutation,
    SubscriptionLists, TagGroupsMutation,
};
use contact_sync_store::KeyValueStore;
use tracing::{error, warn};

use crate::api::ContactApiClient;
use crate::cache::CachedValue;
use crate::channel::ChannelProvider;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::dispatcher::{ConflictStrategy, JobDispatcher, JobRequest};
use crate::listener::Listeners;
use crate::state::ContactState;

/// Client-side contact identity sync engine.
///
/// One instance owns one contact's persisted state. Public mutation calls
/// append to the operation log and request a background job; the job calls
/// [`perform_next_operation`](Self::perform_next_operation) to drain the log
/// one unit at a time.
pub struct ContactEngine<S, A: ?Sized> {
    pub(crate) state: ContactState<S>,
    pub(crate) api: Arc<A>,
    pub(crate) dispatcher: Arc<dyn JobDispatcher>,
    pub(crate) channel: Arc<dyn ChannelProvider>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) listeners: Listeners,
    pub(crate) subscription_cache: CachedValue<(String, SubscriptionLists)>,
    pub(crate) config: SyncConfig,
}

impl<S, A> ContactEngine<S, A>
where
    S: KeyValueStore,
    A: ContactApiClient + ?Sized,
{
    /// Create an engine using the system clock.
    pub fn new(
        store: S,
        api: Arc<A>,
        dispatcher: Arc<dyn JobDispatcher>,
        channel: Arc<dyn ChannelProvider>,
        config: SyncConfig,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            state: ContactState::new(store),
            api,
            dispatcher,
            channel,
            subscription_cache: CachedValue::new(clock.clone()),
            clock,
            listeners: Listeners::default(),
            config,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.subscription_cache = CachedValue::new(clock.clone());
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &ContactState<S> {
        &self.state
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn channel(&self) -> &Arc<dyn ChannelProvider> {
        &self.channel
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Enqueueing
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an operation and request a job.
    pub fn enqueue(&self, operation: Operation) {
        self.enqueue_all(vec![operation]);
    }

    /// Append operations in order and request a job.
    ///
    /// A store failure is logged and the operations are lost; the caller is
    /// never blocked or failed.
    pub fn enqueue_all(&self, operations: Vec<Operation>) {
        if let Err(e) = self.state.append_all(operations) {
            error!(error = %e, "failed to persist contact operation");
            return;
        }
        self.dispatch(ConflictStrategy::Keep);
    }

    /// Request the contact job to run.
    pub fn dispatch(&self, conflict_strategy: ConflictStrategy) {
        self.dispatcher
            .dispatch(JobRequest::new(self.config.job_action.clone(), conflict_strategy));
    }

    /// Forget that the identity was refreshed, forcing a `Resolve` to run.
    pub fn mark_identity_stale(&self) {
        self.state.set_contact_id_refreshed(false);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    fn pending_operations(&self) -> Vec<Operation> {
        self.state.operations().unwrap_or_else(|e| {
            warn!(error = %e, "failed to read contact operations");
            Vec::new()
        })
    }

    pub fn last_identity(&self) -> Option<ContactIdentity> {
        self.state.last_identity()
    }

    /// Contact id attached to channel registration payloads.
    pub fn contact_id_for_registration(&self) -> Option<String> {
        self.last_identity().map(|identity| identity.contact_id)
    }

    fn identity_and_pending(&self) -> Option<(Option<ContactIdentity>, Vec<Operation>)> {
        self.state
            .identity_and_operations()
            .map_err(|e| warn!(error = %e, "failed to read contact operations"))
            .ok()
    }

    /// The contact id, if no pending operation is about to change it.
    pub fn current_contact_id(&self) -> Option<String> {
        let (identity, pending) = self.identity_and_pending()?;
        let identity = identity?;
        let superseded = pending.iter().any(|op| match op {
            Operation::Reset => true,
            Operation::Identify { identifier } => {
                identity.named_user_id.as_deref() != Some(identifier.as_str())
            }
            _ => false,
        });
        if superseded {
            None
        } else {
            Some(identity.contact_id)
        }
    }

    /// The named user id of the newest pending `Identify`, or of the last
    /// known identity.
    pub fn named_user_id(&self) -> Option<String> {
        let Some((identity, pending)) = self.identity_and_pending() else {
            return self.last_identity().and_then(|i| i.named_user_id);
        };
        let newest = pending.into_iter().rev().find_map(|op| match op {
            Operation::Identify { identifier } => Some(identifier),
            _ => None,
        });
        newest.or_else(|| identity.and_then(|i| i.named_user_id))
    }

    /// Collapsed tag group mutations still waiting to be uploaded.
    pub fn pending_tag_updates(&self) -> Vec<TagGroupsMutation> {
        let all: Vec<_> = self
            .pending_updates()
            .flat_map(|update| update.tags)
            .collect();
        TagGroupsMutation::collapse(&all)
    }

    /// Collapsed attribute mutations still waiting to be uploaded.
    pub fn pending_attribute_updates(&self) -> Vec<AttributeMutation> {
        let all: Vec<_> = self
            .pending_updates()
            .flat_map(|update| update.attributes)
            .collect();
        AttributeMutation::collapse(&all)
    }

    /// Collapsed subscription list mutations still waiting to be uploaded.
    pub fn pending_subscription_list_updates(&self) -> Vec<ScopedSubscriptionListMutation> {
        let all: Vec<_> = self
            .pending_updates()
            .flat_map(|update| update.subscriptions)
            .collect();
        ScopedSubscriptionListMutation::collapse(&all)
    }

    fn pending_updates(&self) -> impl Iterator<Item = contact_sync_core::UpdatePayload> {
        self.pending_operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::Update(update) => Some(update),
                _ => None,
            })
    }

    pub fn invalidate_subscription_cache(&self) {
        self.subscription_cache.invalidate();
    }
}
