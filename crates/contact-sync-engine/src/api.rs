//! Remote contact API abstraction.
//!
//! The engine talks to the identity service only through
//! [`ContactApiClient`]. Implementations may use HTTP, gRPC, or anything
//! else; the engine only cares about the status code and the decoded body.

use async_trait::async_trait;
use thiserror::Error;

use contact_sync_core::{
    AssociatedChannel, AttributeMutation, ChannelType, ContactIdentity, EmailRegistrationOptions,
    OpenChannelRegistrationOptions, ScopedSubscriptionListMutation, SmsRegistrationOptions,
    SubscriptionLists, TagGroupsMutation,
};

/// A failure before any response was received.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("undecodable response: {0}")]
    Decode(String),
}

/// A response from the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    /// HTTP-style status code.
    pub status: u16,
    /// Decoded body, present on success.
    pub value: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(value: T) -> Self {
        Self {
            status: 200,
            value: Some(value),
        }
    }

    /// A response with no body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            value: None,
        }
    }

    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn is_too_many_requests(&self) -> bool {
        self.status == 429
    }

    /// Whether the scheduler should retry this request later.
    pub fn should_retry(&self) -> bool {
        self.is_server_error() || self.is_too_many_requests()
    }

    /// The body, only when the response is successful.
    pub fn into_success(self) -> Option<T> {
        if self.is_successful() {
            self.value
        } else {
            None
        }
    }
}

/// Result type for API calls.
pub type ApiResult<T> = std::result::Result<ApiResponse<T>, ApiError>;

/// The remote identity service.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ContactApiClient: Send + Sync {
    /// Resolve the contact currently associated with a channel.
    async fn resolve(&self, channel_id: &str) -> ApiResult<ContactIdentity>;

    /// Name the contact. `contact_id` is passed when the current contact is
    /// anonymous so the service can merge it into the named contact.
    async fn identify(
        &self,
        identifier: &str,
        channel_id: &str,
        contact_id: Option<&str>,
    ) -> ApiResult<ContactIdentity>;

    /// Detach the channel and start a new anonymous contact.
    async fn reset(&self, channel_id: &str) -> ApiResult<ContactIdentity>;

    /// Upload mutations to a contact.
    async fn update(
        &self,
        contact_id: &str,
        tags: &[TagGroupsMutation],
        attributes: &[AttributeMutation],
        subscriptions: &[ScopedSubscriptionListMutation],
    ) -> ApiResult<()>;

    async fn register_email(
        &self,
        contact_id: &str,
        address: &str,
        options: &EmailRegistrationOptions,
    ) -> ApiResult<AssociatedChannel>;

    async fn register_sms(
        &self,
        contact_id: &str,
        msisdn: &str,
        options: &SmsRegistrationOptions,
    ) -> ApiResult<AssociatedChannel>;

    async fn register_open_channel(
        &self,
        contact_id: &str,
        address: &str,
        options: &OpenChannelRegistrationOptions,
    ) -> ApiResult<AssociatedChannel>;

    async fn associate_channel(
        &self,
        contact_id: &str,
        channel_id: &str,
        channel_type: ChannelType,
    ) -> ApiResult<AssociatedChannel>;

    /// Fetch the contact's subscription lists.
    async fn get_subscription_lists(&self, contact_id: &str) -> ApiResult<SubscriptionLists>;
}

/// A simple in-memory contact service for testing.
///
/// Keeps a small model of the remote service: channels map to contacts,
/// named users map to contacts, and identifying an anonymous contact names
/// it in place unless the named user already belongs to another contact.
pub mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use contact_sync_core::{TagGroups, UpdatePayload};
    use serde_json::Value;

    /// An injected failure for the next call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Failure {
        /// Respond with this status and no body.
        Status(u16),
        /// Fail without a response.
        Transport,
    }

    /// A call observed by the service.
    #[derive(Debug, Clone, PartialEq)]
    pub enum ApiCall {
        Resolve {
            channel_id: String,
        },
        Identify {
            identifier: String,
            channel_id: String,
            contact_id: Option<String>,
        },
        Reset {
            channel_id: String,
        },
        Update {
            contact_id: String,
            update: UpdatePayload,
        },
        RegisterEmail {
            contact_id: String,
            address: String,
        },
        RegisterSms {
            contact_id: String,
            msisdn: String,
        },
        RegisterOpenChannel {
            contact_id: String,
            address: String,
        },
        AssociateChannel {
            contact_id: String,
            channel_id: String,
            channel_type: ChannelType,
        },
        GetSubscriptionLists {
            contact_id: String,
        },
    }

    /// Server-side view of one contact.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct RemoteContact {
        pub named_user_id: Option<String>,
        pub attributes: BTreeMap<String, Value>,
        pub tag_groups: TagGroups,
        pub subscription_lists: SubscriptionLists,
        pub channels: Vec<AssociatedChannel>,
    }

    #[derive(Default)]
    struct ServiceState {
        contacts: HashMap<String, RemoteContact>,
        channel_contacts: HashMap<String, String>,
        named_users: HashMap<String, String>,
        failures: VecDeque<Failure>,
        calls: Vec<ApiCall>,
    }

    impl ServiceState {
        fn identity_of(&self, contact_id: &str) -> ContactIdentity {
            let named = self
                .contacts
                .get(contact_id)
                .and_then(|c| c.named_user_id.clone());
            ContactIdentity {
                contact_id: contact_id.to_string(),
                is_anonymous: named.is_none(),
                named_user_id: named,
            }
        }

        fn new_contact(&mut self, named_user_id: Option<String>) -> String {
            let contact_id = format!("contact-{:016x}", rand::random::<u64>());
            if let Some(named) = &named_user_id {
                self.named_users.insert(named.clone(), contact_id.clone());
            }
            self.contacts.insert(
                contact_id.clone(),
                RemoteContact {
                    named_user_id,
                    ..RemoteContact::default()
                },
            );
            contact_id
        }

        fn attach_channel(
            &mut self,
            contact_id: &str,
            channel_id: String,
            channel_type: ChannelType,
        ) -> ApiResponse<AssociatedChannel> {
            match self.contacts.get_mut(contact_id) {
                Some(contact) => {
                    let channel = AssociatedChannel::new(channel_id, channel_type);
                    contact.channels.push(channel.clone());
                    ApiResponse::ok(channel)
                }
                None => ApiResponse::status(404),
            }
        }
    }

    /// In-memory contact service.
    #[derive(Default)]
    pub struct MemoryContactService {
        state: Mutex<ServiceState>,
    }

    impl MemoryContactService {
        /// Create a new service.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn lock(&self) -> MutexGuard<'_, ServiceState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Queue a failure for the next call. Failures are consumed in order.
        pub fn fail_next(&self, failure: Failure) {
            self.lock().failures.push_back(failure);
        }

        /// All calls observed so far, in order.
        pub fn calls(&self) -> Vec<ApiCall> {
            self.lock().calls.clone()
        }

        pub fn call_count(&self) -> usize {
            self.lock().calls.len()
        }

        /// Create a named contact ahead of time, as if another device had
        /// already identified it.
        pub fn seed_named_user(&self, named_user_id: &str) -> String {
            self.lock().new_contact(Some(named_user_id.to_string()))
        }

        /// Replace a contact's subscription lists.
        pub fn set_subscription_lists(&self, contact_id: &str, lists: SubscriptionLists) {
            if let Some(contact) = self.lock().contacts.get_mut(contact_id) {
                contact.subscription_lists = lists;
            }
        }

        /// Snapshot of a contact.
        pub fn contact(&self, contact_id: &str) -> Option<RemoteContact> {
            self.lock().contacts.get(contact_id).cloned()
        }

        /// The contact a channel is attached to.
        pub fn contact_for_channel(&self, channel_id: &str) -> Option<String> {
            self.lock().channel_contacts.get(channel_id).cloned()
        }

        /// Record the call and consume an injected failure, if any.
        fn begin<T>(&self, call: ApiCall) -> Option<ApiResult<T>> {
            let mut state = self.lock();
            state.calls.push(call);
            state.failures.pop_front().map(|failure| match failure {
                Failure::Status(status) => Ok(ApiResponse::status(status)),
                Failure::Transport => Err(ApiError::Transport("injected failure".into())),
            })
        }
    }

    fn new_channel_id() -> String {
        format!("{:016x}", rand::random::<u64>())
    }

    #[async_trait]
    impl ContactApiClient for MemoryContactService {
        async fn resolve(&self, channel_id: &str) -> ApiResult<ContactIdentity> {
            if let Some(failed) = self.begin(ApiCall::Resolve {
                channel_id: channel_id.to_string(),
            }) {
                return failed;
            }

            let mut state = self.lock();
            let contact_id = match state.channel_contacts.get(channel_id) {
                Some(existing) => existing.clone(),
                None => {
                    let created = state.new_contact(None);
                    state
                        .channel_contacts
                        .insert(channel_id.to_string(), created.clone());
                    created
                }
            };
            Ok(ApiResponse::ok(state.identity_of(&contact_id)))
        }

        async fn identify(
            &self,
            identifier: &str,
            channel_id: &str,
            contact_id: Option<&str>,
        ) -> ApiResult<ContactIdentity> {
            if let Some(failed) = self.begin(ApiCall::Identify {
                identifier: identifier.to_string(),
                channel_id: channel_id.to_string(),
                contact_id: contact_id.map(str::to_string),
            }) {
                return failed;
            }

            let mut state = self.lock();
            let existing_named = state.named_users.get(identifier).cloned();
            let mergeable_anon = contact_id
                .filter(|id| {
                    state
                        .contacts
                        .get(*id)
                        .is_some_and(|c| c.named_user_id.is_none())
                })
                .map(str::to_string);

            let resolved = match (existing_named, mergeable_anon) {
                (Some(named), _) => named,
                (None, Some(anon)) => {
                    if let Some(contact) = state.contacts.get_mut(&anon) {
                        contact.named_user_id = Some(identifier.to_string());
                    }
                    state
                        .named_users
                        .insert(identifier.to_string(), anon.clone());
                    anon
                }
                (None, None) => state.new_contact(Some(identifier.to_string())),
            };

            state
                .channel_contacts
                .insert(channel_id.to_string(), resolved.clone());
            Ok(ApiResponse::ok(state.identity_of(&resolved)))
        }

        async fn reset(&self, channel_id: &str) -> ApiResult<ContactIdentity> {
            if let Some(failed) = self.begin(ApiCall::Reset {
                channel_id: channel_id.to_string(),
            }) {
                return failed;
            }

            let mut state = self.lock();
            let created = state.new_contact(None);
            state
                .channel_contacts
                .insert(channel_id.to_string(), created.clone());
            Ok(ApiResponse::ok(state.identity_of(&created)))
        }

        async fn update(
            &self,
            contact_id: &str,
            tags: &[TagGroupsMutation],
            attributes: &[AttributeMutation],
            subscriptions: &[ScopedSubscriptionListMutation],
        ) -> ApiResult<()> {
            if let Some(failed) = self.begin(ApiCall::Update {
                contact_id: contact_id.to_string(),
                update: UpdatePayload {
                    tags: tags.to_vec(),
                    attributes: attributes.to_vec(),
                    subscriptions: subscriptions.to_vec(),
                },
            }) {
                return failed;
            }

            let mut state = self.lock();
            let Some(contact) = state.contacts.get_mut(contact_id) else {
                return Ok(ApiResponse::status(400));
            };
            for mutation in tags {
                mutation.apply(&mut contact.tag_groups);
            }
            for mutation in attributes {
                mutation.apply(&mut contact.attributes);
            }
            for mutation in subscriptions {
                mutation.apply(&mut contact.subscription_lists);
            }
            Ok(ApiResponse::status(200))
        }

        async fn register_email(
            &self,
            contact_id: &str,
            address: &str,
            _options: &EmailRegistrationOptions,
        ) -> ApiResult<AssociatedChannel> {
            if let Some(failed) = self.begin(ApiCall::RegisterEmail {
                contact_id: contact_id.to_string(),
                address: address.to_string(),
            }) {
                return failed;
            }
            Ok(self
                .lock()
                .attach_channel(contact_id, new_channel_id(), ChannelType::Email))
        }

        async fn register_sms(
            &self,
            contact_id: &str,
            msisdn: &str,
            _options: &SmsRegistrationOptions,
        ) -> ApiResult<AssociatedChannel> {
            if let Some(failed) = self.begin(ApiCall::RegisterSms {
                contact_id: contact_id.to_string(),
                msisdn: msisdn.to_string(),
            }) {
                return failed;
            }
            Ok(self
                .lock()
                .attach_channel(contact_id, new_channel_id(), ChannelType::Sms))
        }

        async fn register_open_channel(
            &self,
            contact_id: &str,
            address: &str,
            _options: &OpenChannelRegistrationOptions,
        ) -> ApiResult<AssociatedChannel> {
            if let Some(failed) = self.begin(ApiCall::RegisterOpenChannel {
                contact_id: contact_id.to_string(),
                address: address.to_string(),
            }) {
                return failed;
            }
            Ok(self
                .lock()
                .attach_channel(contact_id, new_channel_id(), ChannelType::Open))
        }

        async fn associate_channel(
            &self,
            contact_id: &str,
            channel_id: &str,
            channel_type: ChannelType,
        ) -> ApiResult<AssociatedChannel> {
            if let Some(failed) = self.begin(ApiCall::AssociateChannel {
                contact_id: contact_id.to_string(),
                channel_id: channel_id.to_string(),
                channel_type,
            }) {
                return failed;
            }
            Ok(self
                .lock()
                .attach_channel(contact_id, channel_id.to_string(), channel_type))
        }

        async fn get_subscription_lists(&self, contact_id: &str) -> ApiResult<SubscriptionLists> {
            if let Some(failed) = self.begin(ApiCall::GetSubscriptionLists {
                contact_id: contact_id.to_string(),
            }) {
                return failed;
            }
            match self.lock().contacts.get(contact_id) {
                Some(contact) => Ok(ApiResponse::ok(contact.subscription_lists.clone())),
                None => Ok(ApiResponse::status(404)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{Failure, MemoryContactService};
    use super::*;

    #[test]
    fn test_response_classification() {
        assert!(ApiResponse::<()>::status(204).is_successful());
        assert!(ApiResponse::<()>::status(503).should_retry());
        assert!(ApiResponse::<()>::status(429).should_retry());
        assert!(!ApiResponse::<()>::status(400).should_retry());
        assert!(ApiResponse::<()>::status(403).is_client_error());
        assert_eq!(ApiResponse::<u8>::status(500).into_success(), None);
    }

    #[tokio::test]
    async fn test_resolve_is_stable_per_channel() {
        let service = MemoryContactService::new();
        let first = service.resolve("channel").await.unwrap().into_success().unwrap();
        let second = service.resolve("channel").await.unwrap().into_success().unwrap();
        assert_eq!(first.contact_id, second.contact_id);
        assert!(first.is_anonymous);
    }

    #[tokio::test]
    async fn test_identify_names_anonymous_contact_in_place() {
        let service = MemoryContactService::new();
        let anon = service.resolve("channel").await.unwrap().into_success().unwrap();
        let named = service
            .identify("alice", "channel", Some(&anon.contact_id))
            .await
            .unwrap()
            .into_success()
            .unwrap();
        assert_eq!(named.contact_id, anon.contact_id);
        assert_eq!(named.named_user_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_identify_existing_named_user_moves_channel() {
        let service = MemoryContactService::new();
        let existing = service.seed_named_user("bob");
        let anon = service.resolve("channel").await.unwrap().into_success().unwrap();
        let named = service
            .identify("bob", "channel", Some(&anon.contact_id))
            .await
            .unwrap()
            .into_success()
            .unwrap();
        assert_eq!(named.contact_id, existing);
        assert_eq!(service.contact_for_channel("channel"), Some(existing));
    }

    #[tokio::test]
    async fn test_injected_failures_consumed_in_order() {
        let service = MemoryContactService::new();
        service.fail_next(Failure::Status(500));
        service.fail_next(Failure::Transport);

        assert_eq!(service.resolve("c").await.unwrap().status, 500);
        assert!(service.resolve("c").await.is_err());
        assert!(service.resolve("c").await.unwrap().is_successful());
        assert_eq!(service.call_count(), 3);
    }
}
