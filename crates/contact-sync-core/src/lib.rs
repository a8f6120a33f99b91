//! # Contact Sync Core
//!
//! Pure data model for the contact sync engine: operations, mutations,
//! identities, and the anonymous data accumulated before a contact is named.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! plain data plus the rules for collapsing and applying mutations.
//!
//! ## Key Types
//!
//! - [`Operation`] - A pending identity mutation, one entry of the operation log
//! - [`OperationKind`] - Stable discriminator for an operation
//! - [`ContactIdentity`] - The last known resolved identity
//! - [`ContactData`] - Attributes, tags, channels and lists accrued while anonymous
//! - [`AttributeMutation`], [`TagGroupsMutation`], [`ScopedSubscriptionListMutation`]
//!
//! ## Persistence
//!
//! Every type round-trips through `serde_json`. Operations are adjacently
//! tagged (`{"type": "...", "payload": {...}}`) so a record with an unknown
//! type fails to decode on its own without poisoning its neighbours. See
//! [`operation::decode_operations`].

pub mod contact_data;
pub mod error;
pub mod identity;
pub mod mutation;
pub mod operation;
pub mod types;

pub use contact_data::ContactData;
pub use error::{CoreError, Result};
pub use identity::{AssociatedChannel, ContactIdentity};
pub use mutation::{
    AttributeMutation, ScopedSubscriptionListMutation, SubscriptionAction, SubscriptionLists,
    TagGroups, TagGroupsMutation,
};
pub use operation::{
    decode_operations, encode_operations, EmailRegistrationOptions, OpenChannelRegistrationOptions,
    Operation, OperationKind, SmsRegistrationOptions, UpdatePayload,
};
pub use types::{ChannelType, Scope};
