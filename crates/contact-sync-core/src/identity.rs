//! Contact identity and associated channel records.

use serde::{Deserialize, Serialize};

use crate::types::ChannelType;

/// The last known identity of the current contact, as reported by the
/// remote identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactIdentity {
    /// Remote contact identifier.
    pub contact_id: String,

    /// Whether the contact has never been named.
    pub is_anonymous: bool,

    /// The named user (external) id, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_user_id: Option<String>,
}

impl ContactIdentity {
    /// An anonymous identity.
    pub fn anonymous(contact_id: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            is_anonymous: true,
            named_user_id: None,
        }
    }

    /// A named identity.
    pub fn named(contact_id: impl Into<String>, named_user_id: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            is_anonymous: false,
            named_user_id: Some(named_user_id.into()),
        }
    }

    /// Merge a response identity for the same contact id into this one.
    ///
    /// Everything comes from `response` except the named user id, which is
    /// kept from `self` when the response does not carry one.
    pub fn merged_with(&self, response: &ContactIdentity) -> ContactIdentity {
        ContactIdentity {
            contact_id: response.contact_id.clone(),
            is_anonymous: response.is_anonymous,
            named_user_id: response
                .named_user_id
                .clone()
                .or_else(|| self.named_user_id.clone()),
        }
    }
}

/// A channel that has been associated with a contact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociatedChannel {
    pub channel_id: String,
    pub channel_type: ChannelType,
}

impl AssociatedChannel {
    pub fn new(channel_id: impl Into<String>, channel_type: ChannelType) -> Self {
        Self {
            channel_id: channel_id.into(),
            channel_type,
        }
    }
}
