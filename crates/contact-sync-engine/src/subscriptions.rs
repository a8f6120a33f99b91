//! Subscription list lookups with a short-lived cache and a pending
//! mutation overlay.

use contact_sync_core::SubscriptionLists;
use contact_sync_store::KeyValueStore;
use tracing::{debug, warn};

use crate::api::ContactApiClient;
use crate::engine::ContactEngine;

impl<S, A> ContactEngine<S, A>
where
    S: KeyValueStore,
    A: ContactApiClient + ?Sized,
{
    /// The current contact's subscription lists.
    ///
    /// Returns `None` when the contact id is not known yet or the fetch
    /// fails. With `include_pending`, mutations still in the log are applied
    /// on top of the remote snapshot.
    pub async fn subscription_lists(&self, include_pending: bool) -> Option<SubscriptionLists> {
        let contact_id = self.current_contact_id()?;

        let mut lists = match self.cached_subscription_lists(&contact_id) {
            Some(lists) => lists,
            None => self.fetch_subscription_lists(&contact_id).await?,
        };

        if include_pending {
            for mutation in self.pending_subscription_list_updates() {
                mutation.apply(&mut lists);
            }
        }
        Some(lists)
    }

    fn cached_subscription_lists(&self, contact_id: &str) -> Option<SubscriptionLists> {
        self.subscription_cache
            .get()
            .filter(|(cached_for, _)| cached_for == contact_id)
            .map(|(_, lists)| lists)
    }

    async fn fetch_subscription_lists(&self, contact_id: &str) -> Option<SubscriptionLists> {
        match self.api.get_subscription_lists(contact_id).await {
            Ok(response) if response.is_successful() => {
                let lists = response.value.unwrap_or_default();
                debug!(contact_id, count = lists.len(), "fetched subscription lists");
                self.subscription_cache.set(
                    (contact_id.to_string(), lists.clone()),
                    self.config.subscription_cache_lifetime,
                );
                Some(lists)
            }
            Ok(response) => {
                warn!(contact_id, status = response.status, "failed to fetch subscription lists");
                None
            }
            Err(e) => {
                warn!(contact_id, error = %e, "failed to fetch subscription lists");
                None
            }
        }
    }
}
