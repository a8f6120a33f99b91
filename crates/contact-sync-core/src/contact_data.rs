//! Data accrued on an anonymous contact.
//!
//! While the current contact is anonymous, every successful update and
//! channel registration is folded in here. If the anonymous contact later
//! turns out to conflict with a named contact, this is what gets handed to
//! the conflict listener so the application can replay it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::identity::AssociatedChannel;
use crate::mutation::{SubscriptionLists, TagGroups};
use crate::operation::UpdatePayload;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactData {
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    #[serde(default)]
    pub tag_groups: TagGroups,

    #[serde(default)]
    pub associated_channels: Vec<AssociatedChannel>,

    #[serde(default)]
    pub subscription_lists: SubscriptionLists,
}

impl ContactData {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing has been accrued.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.tag_groups.is_empty()
            && self.associated_channels.is_empty()
            && self.subscription_lists.is_empty()
    }

    /// Fold an uploaded update into the accrued data, in mutation order.
    pub fn apply_update(&mut self, update: &UpdatePayload) {
        for mutation in &update.attributes {
            mutation.apply(&mut self.attributes);
        }
        for mutation in &update.tags {
            mutation.apply(&mut self.tag_groups);
        }
        for mutation in &update.subscriptions {
            mutation.apply(&mut self.subscription_lists);
        }
    }

    /// Record a channel associated while anonymous.
    pub fn add_channel(&mut self, channel: AssociatedChannel) {
        self.associated_channels.push(channel);
    }
}
