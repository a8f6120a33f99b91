//! The Contact: unified API over the sync engine.
//!
//! Every public call is gated on the privacy features it needs, appends to
//! the operation log, and asks the scheduler to run the contact job. None of
//! them wait on the network.

use std::sync::{Arc, Weak};

use contact_sync_core::{
    AttributeMutation, ChannelType, ContactIdentity, EmailRegistrationOptions,
    OpenChannelRegistrationOptions, Operation, ScopedSubscriptionListMutation,
    SmsRegistrationOptions, SubscriptionLists, TagGroupsMutation, UpdatePayload,
};
use contact_sync_engine::{
    AttributeListener, ChannelProvider, Clock, ConflictListener, ConflictStrategy,
    ContactApiClient, ContactChangeListener, ContactEngine, JobDispatcher, JobResult, SyncConfig,
    SystemClock, TagGroupListener,
};
use contact_sync_store::KeyValueStore;
use tracing::{debug, error, info, warn};

use crate::editor::{AttributeEditor, SubscriptionListEditor, TagGroupsEditor};
use crate::error::{ContactError, Result};
use crate::legacy;
use crate::privacy::{Feature, PrivacyManager};

/// Longest accepted named user id, in characters.
pub const MAX_NAMED_USER_ID_LENGTH: usize = 128;

/// Configuration for a [`Contact`].
#[derive(Debug, Clone)]
pub struct ContactConfig {
    /// Engine configuration.
    pub sync: SyncConfig,
    /// Privacy features enabled at startup.
    pub enabled_features: Vec<Feature>,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            enabled_features: Feature::ALL.to_vec(),
        }
    }
}

/// Platform services a contact depends on.
#[derive(Clone)]
pub struct ContactServices {
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub channel: Arc<dyn ChannelProvider>,
    pub clock: Arc<dyn Clock>,
}

impl ContactServices {
    pub fn new(dispatcher: Arc<dyn JobDispatcher>, channel: Arc<dyn ChannelProvider>) -> Self {
        Self {
            dispatcher,
            channel,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// The contact associated with this device's channel.
pub struct Contact<S, A: ?Sized> {
    engine: ContactEngine<S, A>,
    privacy: Arc<PrivacyManager>,
}

impl<S, A> Contact<S, A>
where
    S: KeyValueStore + 'static,
    A: ContactApiClient + ?Sized + 'static,
{
    /// Create a contact. Call [`init`](Self::init) once the host is ready to
    /// schedule jobs.
    pub fn new(
        store: S,
        api: Arc<A>,
        services: ContactServices,
        config: ContactConfig,
    ) -> Arc<Self> {
        let engine = ContactEngine::new(
            store,
            api,
            services.dispatcher,
            services.channel,
            config.sync,
        )
        .with_clock(services.clock);

        let contact = Arc::new(Self {
            engine,
            privacy: PrivacyManager::new(config.enabled_features),
        });

        let weak: Weak<Self> = Arc::downgrade(&contact);
        contact.privacy.add_listener(Arc::new(move || {
            if let Some(contact) = weak.upgrade() {
                contact.check_privacy();
            }
        }));
        contact
    }

    pub fn engine(&self) -> &ContactEngine<S, A> {
        &self.engine
    }

    /// The shared privacy manager. Changes take effect immediately.
    pub fn privacy(&self) -> &Arc<PrivacyManager> {
        &self.privacy
    }

    fn require(&self, features: &[Feature], action: &str) -> bool {
        if self.privacy.are_enabled(features) {
            return true;
        }
        debug!(action, "contact feature disabled, ignoring");
        false
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Migrate legacy data, apply the privacy state, and request a job.
    pub fn init(&self) {
        if let Err(e) = self.migrate_legacy() {
            error!(error = %e, "failed to migrate legacy named user");
        }
        self.check_privacy();
        self.engine.dispatch(ConflictStrategy::Keep);
    }

    fn migrate_legacy(&self) -> Result<()> {
        let store = self.engine.state().store();
        if self.privacy.is_enabled(Feature::Contacts) {
            let include_mutations = self.privacy.is_enabled(Feature::TagsAndAttributes);
            match legacy::read(store, include_mutations) {
                Ok(Some(legacy)) => {
                    info!(named_user_id = %legacy.named_user_id, "migrating legacy named user");
                    self.identify(&legacy.named_user_id);
                    if let Some(update) = legacy.update {
                        self.engine.enqueue(Operation::update(update));
                    }
                }
                Ok(None) => {}
                Err(e) => error!(error = %e, "dropping unreadable legacy named user"),
            }
        }
        legacy::clear(store)
    }

    /// Reconcile with the enabled feature set.
    fn check_privacy(&self) {
        if !self.privacy.are_enabled(&Feature::ALL) {
            self.engine.invalidate_subscription_cache();
        }

        if self.privacy.is_enabled(Feature::Contacts) {
            return;
        }
        let Some(identity) = self.engine.last_identity() else {
            return;
        };
        if !identity.is_anonymous || self.engine.state().anonymous_data().is_some() {
            info!("contacts disabled, resetting contact");
            self.engine.enqueue(Operation::Reset);
        }
    }

    /// Job entry point for the host scheduler.
    pub async fn perform_job(&self, action: &str) -> JobResult {
        if action != self.engine.config().job_action {
            debug!(action, "ignoring unknown contact job");
            return JobResult::Finished;
        }
        self.engine.perform_next_operation().await
    }

    /// Re-resolve when the app comes to the foreground and the last resolve
    /// is older than the configured interval.
    pub fn on_foreground(&self) {
        if !self.privacy.is_enabled(Feature::Contacts) {
            return;
        }
        let now = self.engine.clock().now_millis();
        let interval = self.engine.config().foreground_resolve_interval.as_millis() as i64;
        let stale = match self.engine.state().last_resolved_at() {
            Some(last) => now.saturating_sub(last) >= interval,
            None => true,
        };
        if stale {
            self.resolve();
        }
    }

    /// The device channel was created; the contact can now be resolved.
    pub fn on_channel_created(&self) {
        if self.privacy.is_enabled(Feature::Contacts) {
            self.resolve();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────────────────

    /// Associate the contact with a named user id.
    pub fn identify(&self, named_user_id: &str) {
        if !self.require(&[Feature::Contacts], "identify") {
            return;
        }
        if let Err(e) = validate_named_user_id(named_user_id) {
            warn!(error = %e, "ignoring identify");
            return;
        }
        self.engine.mark_identity_stale();
        self.engine.enqueue(Operation::identify(named_user_id));
    }

    /// Detach the channel from its contact and start a new anonymous one.
    pub fn reset(&self) {
        if !self.require(&[Feature::Contacts], "reset") {
            return;
        }
        self.engine.mark_identity_stale();
        self.engine.enqueue(Operation::Reset);
    }

    /// Force a fresh identity fetch.
    pub fn resolve(&self) {
        if !self.require(&[Feature::Contacts], "resolve") {
            return;
        }
        self.engine.mark_identity_stale();
        self.engine.enqueue(Operation::Resolve);
    }

    /// The named user id, including a pending identify.
    pub fn named_user_id(&self) -> Option<String> {
        self.engine.named_user_id()
    }

    /// The contact id, unless a pending operation is about to change it.
    pub fn current_contact_id(&self) -> Option<String> {
        self.engine.current_contact_id()
    }

    pub fn last_identity(&self) -> Option<ContactIdentity> {
        self.engine.last_identity()
    }

    /// Contact id to attach to channel registration.
    pub fn contact_id_for_registration(&self) -> Option<String> {
        self.engine.contact_id_for_registration()
    }

    pub fn pending_operations(&self) -> Result<Vec<Operation>> {
        Ok(self.engine.state().operations()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Editing
    // ─────────────────────────────────────────────────────────────────────────

    fn enqueue_update(&self, update: UpdatePayload, action: &str) {
        if !self.require(&[Feature::Contacts, Feature::TagsAndAttributes], action) {
            return;
        }
        if update.is_empty() {
            return;
        }
        self.engine
            .enqueue_all(vec![Operation::Resolve, Operation::update(update)]);
    }

    pub fn edit_tag_groups(&self) -> TagGroupsEditor<'_> {
        TagGroupsEditor::new(move |mutations| {
            self.enqueue_update(UpdatePayload::tags(mutations), "tag edit")
        })
    }

    pub fn edit_attributes(&self) -> AttributeEditor<'_> {
        AttributeEditor::new(self.engine.clock().clone(), move |mutations| {
            self.enqueue_update(UpdatePayload::attributes(mutations), "attribute edit")
        })
    }

    pub fn edit_subscription_lists(&self) -> SubscriptionListEditor<'_> {
        SubscriptionListEditor::new(self.engine.clock().clone(), move |mutations| {
            self.enqueue_update(
                UpdatePayload::subscriptions(mutations),
                "subscription list edit",
            )
        })
    }

    pub fn pending_tag_updates(&self) -> Vec<TagGroupsMutation> {
        self.engine.pending_tag_updates()
    }

    pub fn pending_attribute_updates(&self) -> Vec<AttributeMutation> {
        self.engine.pending_attribute_updates()
    }

    pub fn pending_subscription_list_updates(&self) -> Vec<ScopedSubscriptionListMutation> {
        self.engine.pending_subscription_list_updates()
    }

    /// Subscription lists of the current contact, optionally with pending
    /// edits applied.
    pub async fn subscription_lists(&self, include_pending: bool) -> Option<SubscriptionLists> {
        if !self.require(&Feature::ALL, "subscription list fetch") {
            return None;
        }
        self.engine.subscription_lists(include_pending).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────────

    fn enqueue_channel(&self, operation: Operation) {
        if !self.require(&[Feature::Contacts], "channel registration") {
            return;
        }
        self.engine.enqueue_all(vec![Operation::Resolve, operation]);
    }

    pub fn register_email(&self, address: &str, options: EmailRegistrationOptions) {
        self.enqueue_channel(Operation::RegisterEmail {
            address: address.to_string(),
            options,
        });
    }

    pub fn register_sms(&self, msisdn: &str, options: SmsRegistrationOptions) {
        self.enqueue_channel(Operation::RegisterSms {
            msisdn: msisdn.to_string(),
            options,
        });
    }

    pub fn register_open_channel(&self, address: &str, options: OpenChannelRegistrationOptions) {
        self.enqueue_channel(Operation::RegisterOpenChannel {
            address: address.to_string(),
            options,
        });
    }

    pub fn associate_channel(&self, channel_id: &str, channel_type: ChannelType) {
        self.enqueue_channel(Operation::AssociateChannel {
            channel_id: channel_id.to_string(),
            channel_type,
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_attribute_listener(&self, listener: Arc<dyn AttributeListener>) {
        self.engine.listeners().attributes.add(listener);
    }

    pub fn add_tag_group_listener(&self, listener: Arc<dyn TagGroupListener>) {
        self.engine.listeners().tag_groups.add(listener);
    }

    pub fn remove_attribute_listener(&self, listener: &Arc<dyn AttributeListener>) {
        self.engine.listeners().attributes.remove(listener);
    }

    pub fn remove_tag_group_listener(&self, listener: &Arc<dyn TagGroupListener>) {
        self.engine.listeners().tag_groups.remove(listener);
    }

    pub fn add_contact_change_listener(&self, listener: Arc<dyn ContactChangeListener>) {
        self.engine.listeners().contact_changes.add(listener);
    }

    pub fn remove_contact_change_listener(&self, listener: &Arc<dyn ContactChangeListener>) {
        self.engine.listeners().contact_changes.remove(listener);
    }

    pub fn add_conflict_listener(&self, listener: Arc<dyn ConflictListener>) {
        self.engine.listeners().conflicts.add(listener);
    }

    pub fn remove_conflict_listener(&self, listener: &Arc<dyn ConflictListener>) {
        self.engine.listeners().conflicts.remove(listener);
    }
}

fn validate_named_user_id(named_user_id: &str) -> Result<()> {
    if named_user_id.trim().is_empty() {
        return Err(ContactError::InvalidInput("named user id is empty".into()));
    }
    if named_user_id.chars().count() > MAX_NAMED_USER_ID_LENGTH {
        return Err(ContactError::InvalidInput(format!(
            "named user id is longer than {MAX_NAMED_USER_ID_LENGTH} characters"
        )));
    }
    Ok(())
}
