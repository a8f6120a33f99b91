//! Sync driver: executes one planned operation per job run.
//!
//! ## Outcomes
//!
//! | Observed | Log | Job result |
//! |---|---|---|
//! | no channel yet, or nothing to do | untouched | `Finished` |
//! | transport error, 5xx, 429 | untouched | `Retry` |
//! | missing identity | head dropped, `Replace` dispatched | `Finished` |
//! | any other response | head removed, `Replace` dispatched | `Finished` |
//!
//! Response side effects are applied only for 2xx responses.

use contact_sync_core::{
    AssociatedChannel, ContactIdentity, Operation, OperationKind, UpdatePayload,
};
use contact_sync_store::KeyValueStore;
use tracing::{debug, error, info, warn};

use crate::api::{ApiResponse, ContactApiClient};
use crate::dispatcher::{ConflictStrategy, JobResult};
use crate::engine::ContactEngine;
use crate::error::{Result, SyncError};
use crate::listener::ConflictEvent;

/// Whether the executed operation is done with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Completed,
    Retry,
}

impl Step {
    fn of<T>(response: &ApiResponse<T>, operation: &Operation) -> Self {
        if response.should_retry() {
            warn!(%operation, status = response.status, "contact operation will be retried");
            Step::Retry
        } else {
            if !response.is_successful() {
                warn!(%operation, status = response.status, "contact operation rejected");
            }
            Step::Completed
        }
    }
}

impl<S, A> ContactEngine<S, A>
where
    S: KeyValueStore,
    A: ContactApiClient + ?Sized,
{
    /// Job entry point: run the next planned operation.
    pub async fn perform_next_operation(&self) -> JobResult {
        let Some(channel_id) = self.channel.channel_id() else {
            debug!("no channel yet, deferring contact operations");
            return JobResult::Finished;
        };

        let operation = match self.state.prepare_next_operation() {
            Ok(Some(operation)) => operation,
            Ok(None) => return JobResult::Finished,
            Err(e) => {
                warn!(error = %e, "failed to plan contact operation");
                return JobResult::Retry;
            }
        };

        debug!(%operation, "performing contact operation");
        match self.execute(&channel_id, &operation).await {
            Ok(Step::Retry) => JobResult::Retry,
            Ok(Step::Completed) => self.complete_head(),
            Err(e) if e.is_retryable() => {
                warn!(%operation, error = %e, "contact operation failed, will retry");
                JobResult::Retry
            }
            Err(e) => {
                error!(%operation, error = %e, "dropping contact operation");
                self.complete_head()
            }
        }
    }

    fn complete_head(&self) -> JobResult {
        if let Err(e) = self.state.remove_head() {
            warn!(error = %e, "failed to remove completed contact operation");
            return JobResult::Retry;
        }
        self.dispatch(ConflictStrategy::Replace);
        JobResult::Finished
    }

    async fn execute(&self, channel_id: &str, operation: &Operation) -> Result<Step> {
        // Snapshot the identity before the call. All processing is relative to
        // the contact the request was made for.
        let identity = self.state.last_identity();
        let require = |kind: OperationKind| {
            identity
                .as_ref()
                .ok_or(SyncError::MissingIdentity(kind))
        };

        match operation {
            Operation::Resolve => {
                let response = self.api.resolve(channel_id).await?;
                let step = Step::of(&response, operation);
                if let Some(resolved) = response.into_success() {
                    self.process_identity(resolved, identity.as_ref())?;
                    self.state.set_last_resolved_at(self.clock.now_millis())?;
                }
                Ok(step)
            }

            Operation::Identify { identifier } => {
                let anonymous_contact_id = identity
                    .as_ref()
                    .filter(|i| i.is_anonymous)
                    .map(|i| i.contact_id.as_str());
                let response = self
                    .api
                    .identify(identifier, channel_id, anonymous_contact_id)
                    .await?;
                let step = Step::of(&response, operation);
                if let Some(resolved) = response.into_success() {
                    self.process_identity(resolved, identity.as_ref())?;
                }
                Ok(step)
            }

            Operation::Reset => {
                let response = self.api.reset(channel_id).await?;
                let step = Step::of(&response, operation);
                if let Some(resolved) = response.into_success() {
                    self.process_identity(resolved, identity.as_ref())?;
                }
                Ok(step)
            }

            Operation::Update(update) => {
                let current = require(OperationKind::Update)?;
                let response = self
                    .api
                    .update(
                        &current.contact_id,
                        &update.tags,
                        &update.attributes,
                        &update.subscriptions,
                    )
                    .await?;
                let step = Step::of(&response, operation);
                if response.is_successful() {
                    self.process_update(update, current)?;
                }
                Ok(step)
            }

            Operation::RegisterEmail { address, options } => {
                let current = require(OperationKind::RegisterEmail)?;
                let response = self
                    .api
                    .register_email(&current.contact_id, address, options)
                    .await?;
                self.finish_channel(response, operation, current)
            }

            Operation::RegisterSms { msisdn, options } => {
                let current = require(OperationKind::RegisterSms)?;
                let response = self
                    .api
                    .register_sms(&current.contact_id, msisdn, options)
                    .await?;
                self.finish_channel(response, operation, current)
            }

            Operation::RegisterOpenChannel { address, options } => {
                let current = require(OperationKind::RegisterOpenChannel)?;
                let response = self
                    .api
                    .register_open_channel(&current.contact_id, address, options)
                    .await?;
                self.finish_channel(response, operation, current)
            }

            Operation::AssociateChannel {
                channel_id: associated,
                channel_type,
            } => {
                let current = require(OperationKind::AssociateChannel)?;
                let response = self
                    .api
                    .associate_channel(&current.contact_id, associated, *channel_type)
                    .await?;
                self.finish_channel(response, operation, current)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Response processing
    // ─────────────────────────────────────────────────────────────────────────

    fn process_identity(
        &self,
        resolved: ContactIdentity,
        previous: Option<&ContactIdentity>,
    ) -> Result<()> {
        match previous {
            Some(previous) if previous.contact_id == resolved.contact_id => {
                let merged = previous.merged_with(&resolved);
                self.state.set_last_identity(&merged)?;
                if !merged.is_anonymous {
                    self.state.set_anonymous_data(None)?;
                }
            }
            _ => {
                info!(
                    contact_id = %resolved.contact_id,
                    anonymous = resolved.is_anonymous,
                    "contact changed"
                );
                if previous.is_some_and(|p| p.is_anonymous) {
                    self.notify_conflict(&resolved);
                }
                self.subscription_cache.invalidate();
                self.state.set_last_identity(&resolved)?;
                self.state.set_anonymous_data(None)?;
                self.channel.update_registration();
                self.listeners.notify_contact_changed();
            }
        }

        self.state.set_contact_id_refreshed(true);
        Ok(())
    }

    fn notify_conflict(&self, resolved: &ContactIdentity) {
        let Some(anonymous_data) = self.state.anonymous_data().filter(|d| !d.is_empty()) else {
            return;
        };
        debug!(
            named_user_id = ?resolved.named_user_id,
            "anonymous contact data conflicts with resolved contact"
        );
        self.listeners.notify_conflict(&ConflictEvent {
            anonymous_data,
            named_user_id: resolved.named_user_id.clone(),
        });
    }

    fn process_update(&self, update: &UpdatePayload, identity: &ContactIdentity) -> Result<()> {
        if identity.is_anonymous {
            self.state
                .update_anonymous_data(|data| data.apply_update(update))?;
            self.listeners.notify_attributes(&update.attributes);
            self.listeners.notify_tag_groups(&update.tags);
        }
        if !update.subscriptions.is_empty() {
            self.subscription_cache.invalidate();
        }
        Ok(())
    }

    fn finish_channel(
        &self,
        response: ApiResponse<AssociatedChannel>,
        operation: &Operation,
        identity: &ContactIdentity,
    ) -> Result<Step> {
        let step = Step::of(&response, operation);
        if let Some(channel) = response.into_success() {
            if identity.is_anonymous {
                self.state
                    .update_anonymous_data(|data| data.add_channel(channel))?;
            }
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use contact_sync_core::{
        AttributeMutation, ChannelType, ContactData, Scope, ScopedSubscriptionListMutation,
        TagGroupsMutation,
    };
    use contact_sync_store::MemoryStore;

    use super::*;
    use crate::api::memory::{ApiCall, Failure, MemoryContactService};
    use crate::channel::StaticChannel;
    use crate::config::SyncConfig;
    use crate::dispatcher::RecordingDispatcher;

    struct Harness {
        engine: ContactEngine<MemoryStore, MemoryContactService>,
        service: Arc<MemoryContactService>,
        dispatcher: Arc<RecordingDispatcher>,
        channel: Arc<StaticChannel>,
    }

    fn harness() -> Harness {
        let service = MemoryContactService::new();
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let channel = Arc::new(StaticChannel::new("channel"));
        let engine = ContactEngine::new(
            MemoryStore::new(),
            service.clone(),
            dispatcher.clone(),
            channel.clone(),
            SyncConfig::default(),
        );
        Harness {
            engine,
            service,
            dispatcher,
            channel,
        }
    }

    impl Harness {
        async fn drain(&self) {
            for _ in 0..32 {
                if self.engine.state().operations().unwrap().is_empty() {
                    return;
                }
                assert_eq!(
                    self.engine.perform_next_operation().await,
                    JobResult::Finished
                );
            }
            panic!("operation log did not drain");
        }
    }

    fn attributes(name: &str, value: &str) -> Operation {
        Operation::update(UpdatePayload::attributes(vec![AttributeMutation::set(
            name, value, 0,
        )]))
    }

    #[tokio::test]
    async fn test_no_channel_defers() {
        let h = harness();
        h.channel.set_channel_id(None);
        h.engine.enqueue(Operation::Resolve);

        assert_eq!(h.engine.perform_next_operation().await, JobResult::Finished);
        assert_eq!(h.engine.state().operations().unwrap().len(), 1);
        assert_eq!(h.service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_records_identity() {
        let h = harness();
        h.engine.enqueue(Operation::Resolve);
        h.drain().await;

        let identity = h.engine.last_identity().unwrap();
        assert!(identity.is_anonymous);
        assert!(h.engine.state().is_contact_id_refreshed());
        assert!(h.engine.state().last_resolved_at().is_some());
        assert_eq!(h.channel.registration_updates(), 1);
        assert_eq!(
            h.dispatcher.strategies().last(),
            Some(&ConflictStrategy::Replace)
        );
    }

    #[tokio::test]
    async fn test_server_error_leaves_state_untouched() {
        let h = harness();
        h.engine.enqueue(Operation::Resolve);
        h.drain().await;
        let identity = h.engine.last_identity();

        h.engine.enqueue(attributes("a", "b"));
        h.service.fail_next(Failure::Status(500));
        assert_eq!(h.engine.perform_next_operation().await, JobResult::Retry);
        h.service.fail_next(Failure::Status(429));
        assert_eq!(h.engine.perform_next_operation().await, JobResult::Retry);
        h.service.fail_next(Failure::Transport);
        assert_eq!(h.engine.perform_next_operation().await, JobResult::Retry);

        assert_eq!(h.engine.state().operations().unwrap(), vec![attributes("a", "b")]);
        assert_eq!(h.engine.last_identity(), identity);
        assert_eq!(h.engine.state().anonymous_data(), None);

        h.drain().await;
        assert!(h.engine.state().anonymous_data().is_some());
    }

    #[tokio::test]
    async fn test_update_without_identity_is_dropped() {
        let h = harness();
        h.engine.enqueue(attributes("a", "b"));

        assert_eq!(h.engine.perform_next_operation().await, JobResult::Finished);
        assert!(h.engine.state().operations().unwrap().is_empty());
        assert_eq!(h.service.call_count(), 0);
        assert_eq!(
            h.dispatcher.strategies(),
            vec![ConflictStrategy::Keep, ConflictStrategy::Replace]
        );
    }

    #[tokio::test]
    async fn test_client_error_drops_operation() {
        let h = harness();
        h.engine
            .state()
            .set_last_identity(&ContactIdentity::anonymous("gone"))
            .unwrap();
        h.engine.enqueue(attributes("a", "b"));

        assert_eq!(h.engine.perform_next_operation().await, JobResult::Finished);
        assert!(h.engine.state().operations().unwrap().is_empty());
        assert_eq!(h.engine.state().anonymous_data(), None);
    }

    #[tokio::test]
    async fn test_anonymous_update_accrues_and_notifies() {
        let h = harness();
        let uploaded = Arc::new(Mutex::new(Vec::new()));
        let sink = uploaded.clone();
        h.engine
            .listeners()
            .attributes
            .add(Arc::new(move |m: &[AttributeMutation]| {
                sink.lock().unwrap().extend_from_slice(m);
            }));

        h.engine.enqueue(Operation::Resolve);
        h.engine.enqueue(attributes("a", "1"));
        h.engine.enqueue(Operation::update(UpdatePayload::tags(vec![
            TagGroupsMutation::add("g", ["t"]),
        ])));
        h.drain().await;

        let data = h.engine.state().anonymous_data().unwrap();
        assert_eq!(data.attributes["a"], "1");
        assert!(data.tag_groups["g"].contains("t"));
        assert_eq!(*uploaded.lock().unwrap(), vec![AttributeMutation::set("a", "1", 0)]);

        let updates = h
            .service
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::Update { .. }))
            .count();
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn test_named_update_does_not_accrue() {
        let h = harness();
        h.engine.enqueue(Operation::identify("alice"));
        h.engine.enqueue(attributes("a", "1"));
        h.drain().await;

        assert_eq!(h.engine.state().anonymous_data(), None);
        let contact_id = h.engine.last_identity().unwrap().contact_id;
        assert_eq!(h.service.contact(&contact_id).unwrap().attributes["a"], "1");
    }

    #[tokio::test]
    async fn test_conflict_fires_once_and_clears() {
        let h = harness();
        let conflicts = Arc::new(Mutex::new(Vec::new()));
        let sink = conflicts.clone();
        h.engine
            .listeners()
            .conflicts
            .add(Arc::new(move |e: &ConflictEvent| {
                sink.lock().unwrap().push(e.clone());
            }));

        h.engine.enqueue(Operation::Resolve);
        h.engine.enqueue(attributes("a", "1"));
        h.drain().await;
        let anonymous = h.engine.state().anonymous_data().unwrap();

        h.service.seed_named_user("bob");
        h.engine.enqueue(Operation::identify("bob"));
        h.drain().await;

        let conflicts = conflicts.lock().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].anonymous_data, anonymous);
        assert_eq!(conflicts[0].named_user_id.as_deref(), Some("bob"));
        assert_eq!(h.engine.state().anonymous_data(), None);
    }

    #[tokio::test]
    async fn test_resolve_to_different_contact_reports_conflict() {
        let h = harness();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        h.engine
            .listeners()
            .conflicts
            .add(Arc::new(move |_: &ConflictEvent| {
                c.fetch_add(1, Ordering::SeqCst);
            }));

        let mut data = ContactData::new();
        data.add_channel(AssociatedChannel::new("sms", ChannelType::Sms));
        h.engine
            .state()
            .set_last_identity(&ContactIdentity::anonymous("stale"))
            .unwrap();
        h.engine.state().set_anonymous_data(Some(&data)).unwrap();

        h.engine.enqueue(Operation::Resolve);
        h.drain().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(h.engine.state().anonymous_data(), None);
        assert_ne!(h.engine.last_identity().unwrap().contact_id, "stale");
    }

    #[tokio::test]
    async fn test_identify_merges_anonymous_contact_without_conflict() {
        let h = harness();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        h.engine
            .listeners()
            .conflicts
            .add(Arc::new(move |_: &ConflictEvent| {
                c.fetch_add(1, Ordering::SeqCst);
            }));

        h.engine.enqueue(Operation::Resolve);
        h.engine.enqueue(attributes("a", "1"));
        h.drain().await;
        let anon_id = h.engine.last_identity().unwrap().contact_id;

        h.engine.enqueue(Operation::identify("alice"));
        h.drain().await;

        let identity = h.engine.last_identity().unwrap();
        assert_eq!(identity.contact_id, anon_id);
        assert_eq!(identity.named_user_id.as_deref(), Some("alice"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(h.engine.state().anonymous_data(), None);
        assert!(h.service.calls().contains(&ApiCall::Identify {
            identifier: "alice".into(),
            channel_id: "channel".into(),
            contact_id: Some(anon_id),
        }));
    }

    #[tokio::test]
    async fn test_reset_while_clean_anonymous_is_skipped() {
        let h = harness();
        h.engine.enqueue(Operation::Resolve);
        h.drain().await;
        let calls = h.service.call_count();

        h.engine.enqueue(Operation::Reset);
        h.drain().await;
        assert_eq!(h.service.call_count(), calls);
    }

    #[tokio::test]
    async fn test_identify_collapse_executes_last_only() {
        let h = harness();
        h.engine.enqueue(Operation::identify("zed"));
        h.drain().await;

        h.engine.enqueue(Operation::identify("alice"));
        h.engine.enqueue(Operation::identify("bob"));
        h.drain().await;

        let identifies: Vec<_> = h
            .service
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Identify { identifier, .. } => Some(identifier),
                _ => None,
            })
            .collect();
        assert_eq!(identifies, vec!["zed", "bob"]);
        assert_eq!(h.engine.named_user_id().as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_anonymous_registration_accrues_channel() {
        let h = harness();
        h.engine.enqueue(Operation::Resolve);
        h.engine.enqueue(Operation::AssociateChannel {
            channel_id: "other".into(),
            channel_type: ChannelType::Open,
        });
        h.drain().await;

        let data = h.engine.state().anonymous_data().unwrap();
        assert_eq!(
            data.associated_channels,
            vec![AssociatedChannel::new("other", ChannelType::Open)]
        );
    }

    #[tokio::test]
    async fn test_subscription_update_invalidates_cache() {
        let h = harness();
        h.engine.enqueue(Operation::identify("alice"));
        h.drain().await;
        h.engine.subscription_cache.set(
            Default::default(),
            std::time::Duration::from_secs(600),
        );

        h.engine.enqueue(Operation::update(UpdatePayload::subscriptions(vec![
            ScopedSubscriptionListMutation::subscribe("news", Scope::Email, 0),
        ])));
        h.drain().await;
        assert_eq!(h.engine.subscription_cache.get(), None);
    }

    #[test]
    fn test_concurrent_producers_and_driver() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 25;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let h = harness();
        h.engine.enqueue(Operation::Resolve);
        runtime.block_on(h.drain());
        let anonymous = h.engine.current_contact_id().unwrap();
        let bob = h.service.seed_named_user("bob");
        h.engine.enqueue(Operation::identify("bob"));

        let producers_done = AtomicUsize::new(0);
        let drained = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|scope| {
            for t in 0..PRODUCERS {
                let engine = &h.engine;
                let producers_done = &producers_done;
                scope.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        engine.enqueue(attributes(&format!("attr-{t}-{i:02}"), "v"));
                    }
                    producers_done.fetch_add(1, Ordering::SeqCst);
                });
            }

            scope.spawn(|| {
                while !drained.load(Ordering::SeqCst) {
                    if let Some(contact_id) = h.engine.current_contact_id() {
                        assert_ne!(contact_id, anonymous, "superseded contact id returned");
                    }
                }
            });

            runtime.block_on(async {
                loop {
                    let finished = producers_done.load(Ordering::SeqCst) == PRODUCERS;
                    if finished && h.engine.state().operations().unwrap().is_empty() {
                        break;
                    }
                    assert_eq!(h.engine.perform_next_operation().await, JobResult::Finished);
                    std::thread::yield_now();
                }
            });
            drained.store(true, Ordering::SeqCst);
        });

        assert_eq!(h.engine.current_contact_id(), Some(bob.clone()));

        let mut uploaded = Vec::new();
        for call in h.service.calls() {
            if let ApiCall::Update { contact_id, update } = call {
                assert_eq!(contact_id, bob);
                uploaded.extend(update.attributes.iter().map(|m| m.name().to_string()));
            }
        }
        assert_eq!(uploaded.len(), PRODUCERS * PER_PRODUCER);
        let unique: std::collections::BTreeSet<_> = uploaded.iter().collect();
        assert_eq!(unique.len(), uploaded.len());

        // Each producer's operations keep their relative order.
        for t in 0..PRODUCERS {
            let prefix = format!("attr-{t}-");
            let own: Vec<_> = uploaded.iter().filter(|n| n.starts_with(&prefix)).collect();
            let mut sorted = own.clone();
            sorted.sort();
            assert_eq!(own, sorted);
        }
    }
}
