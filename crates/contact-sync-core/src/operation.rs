//! Operations: entries of the pending operation log.
//!
//! An operation is a closed tagged union. Its JSON form is adjacently tagged:
//!
//! ```text
//! {"type": "IDENTIFY", "payload": {"identifier": "alice"}}
//! {"type": "RESET"}
//! {"type": "UPDATE", "payload": {"tags": [...], "attributes": [...], "subscriptions": [...]}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::mutation::{AttributeMutation, ScopedSubscriptionListMutation, TagGroupsMutation};
use crate::types::ChannelType;

/// Options for registering an email channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailRegistrationOptions {
    /// Transactional opt-in time (Unix ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactional_opted_in: Option<i64>,

    /// Commercial opt-in time (Unix ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commercial_opted_in: Option<i64>,

    /// Free-form properties attached to the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,

    #[serde(default)]
    pub double_opt_in: bool,
}

/// Options for registering an SMS channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRegistrationOptions {
    pub sender_id: String,
}

/// Options for registering an open channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenChannelRegistrationOptions {
    pub platform_name: String,

    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
}

/// Mutations carried by an `Update` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    #[serde(default)]
    pub tags: Vec<TagGroupsMutation>,

    #[serde(default)]
    pub attributes: Vec<AttributeMutation>,

    #[serde(default)]
    pub subscriptions: Vec<ScopedSubscriptionListMutation>,
}

impl UpdatePayload {
    pub fn tags(tags: Vec<TagGroupsMutation>) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    pub fn attributes(attributes: Vec<AttributeMutation>) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    pub fn subscriptions(subscriptions: Vec<ScopedSubscriptionListMutation>) -> Self {
        Self {
            subscriptions,
            ..Self::default()
        }
    }

    /// Append `later`'s mutations after this payload's own.
    pub fn merge(&mut self, later: UpdatePayload) {
        self.tags.extend(later.tags);
        self.attributes.extend(later.attributes);
        self.subscriptions.extend(later.subscriptions);
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.attributes.is_empty() && self.subscriptions.is_empty()
    }
}

/// A pending identity mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Name the contact.
    Identify { identifier: String },

    /// Detach the channel from its contact and start a new anonymous one.
    Reset,

    /// Fetch the current identity.
    Resolve,

    /// Upload tag, attribute and subscription list mutations.
    Update(UpdatePayload),

    RegisterEmail {
        address: String,
        options: EmailRegistrationOptions,
    },

    RegisterSms {
        msisdn: String,
        options: SmsRegistrationOptions,
    },

    RegisterOpenChannel {
        address: String,
        options: OpenChannelRegistrationOptions,
    },

    AssociateChannel {
        channel_id: String,
        channel_type: ChannelType,
    },
}

impl Operation {
    pub fn identify(identifier: impl Into<String>) -> Self {
        Self::Identify {
            identifier: identifier.into(),
        }
    }

    pub fn update(update: UpdatePayload) -> Self {
        Self::Update(update)
    }

    /// The stable discriminator of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Identify { .. } => OperationKind::Identify,
            Self::Reset => OperationKind::Reset,
            Self::Resolve => OperationKind::Resolve,
            Self::Update(_) => OperationKind::Update,
            Self::RegisterEmail { .. } => OperationKind::RegisterEmail,
            Self::RegisterSms { .. } => OperationKind::RegisterSms,
            Self::RegisterOpenChannel { .. } => OperationKind::RegisterOpenChannel,
            Self::AssociateChannel { .. } => OperationKind::AssociateChannel,
        }
    }

    /// Decode one persisted record.
    ///
    /// An unknown type tag is reported as [`CoreError::UnknownOperation`]
    /// rather than a generic decoding error.
    pub fn from_json(value: Value) -> Result<Self> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Malformed("operation has no type tag".into()))?;
        tag.parse::<OperationKind>()?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identify { identifier } => write!(f, "IDENTIFY({identifier})"),
            Self::Update(update) => write!(
                f,
                "UPDATE(tags={}, attributes={}, subscriptions={})",
                update.tags.len(),
                update.attributes.len(),
                update.subscriptions.len()
            ),
            Self::AssociateChannel {
                channel_id,
                channel_type,
            } => write!(f, "ASSOCIATE_CHANNEL({channel_id}, {channel_type})"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

/// Stable discriminator for [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationKind {
    Update = 0,
    Identify = 1,
    Resolve = 2,
    Reset = 3,
    RegisterEmail = 4,
    RegisterSms = 5,
    RegisterOpenChannel = 6,
    AssociateChannel = 7,
}

impl OperationKind {
    /// Ordinal used for compact representations.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from an ordinal.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Update),
            1 => Some(Self::Identify),
            2 => Some(Self::Resolve),
            3 => Some(Self::Reset),
            4 => Some(Self::RegisterEmail),
            5 => Some(Self::RegisterSms),
            6 => Some(Self::RegisterOpenChannel),
            7 => Some(Self::AssociateChannel),
            _ => None,
        }
    }

    /// The JSON type tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "UPDATE",
            Self::Identify => "IDENTIFY",
            Self::Resolve => "RESOLVE",
            Self::Reset => "RESET",
            Self::RegisterEmail => "REGISTER_EMAIL",
            Self::RegisterSms => "REGISTER_SMS",
            Self::RegisterOpenChannel => "REGISTER_OPEN_CHANNEL",
            Self::AssociateChannel => "ASSOCIATE_CHANNEL",
        }
    }

    /// Whether executing this kind needs an already resolved identity.
    pub fn requires_identity(self) -> bool {
        !matches!(self, Self::Identify | Self::Reset | Self::Resolve)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        (0..=7)
            .filter_map(Self::from_u8)
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::UnknownOperation(s.to_string()))
    }
}

/// Decode a persisted operation log.
///
/// Each record is decoded on its own so one corrupt entry never takes the
/// rest of the log with it. A value that is not an array yields a single
/// error; `null` (nothing stored) yields an empty log.
pub fn decode_operations(value: Value) -> Vec<Result<Operation>> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(Operation::from_json).collect(),
        other => vec![Err(CoreError::Malformed(format!(
            "operation log is not an array: {other}"
        )))],
    }
}

/// Encode an operation log as a JSON array.
pub fn encode_operations(operations: &[Operation]) -> Result<Value> {
    Ok(serde_json::to_value(operations)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unit_variants_have_no_payload() {
        let json = Operation::Reset.to_json().unwrap();
        assert_eq!(json, json!({"type": "RESET"}));
        assert_eq!(Operation::from_json(json).unwrap(), Operation::Reset);
    }

    #[test]
    fn test_identify_json_shape() {
        let json = Operation::identify("alice").to_json().unwrap();
        assert_eq!(
            json,
            json!({"type": "IDENTIFY", "payload": {"identifier": "alice"}})
        );
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let err = Operation::from_json(json!({"type": "TELEPORT", "payload": {}})).unwrap_err();
        assert!(matches!(err, CoreError::UnknownOperation(ref t) if t == "TELEPORT"));
    }

    #[test]
    fn test_payload_shape_mismatch_is_decoding_error() {
        let err = Operation::from_json(json!({"type": "IDENTIFY", "payload": {"nope": 1}}))
            .unwrap_err();
        assert!(matches!(err, CoreError::Decoding(_)));
    }

    #[test]
    fn test_decode_operations_drops_only_corrupt_entries() {
        let log = json!([
            {"type": "RESOLVE"},
            {"type": "IDENTIFY"},
            "garbage",
            {"type": "IDENTIFY", "payload": {"identifier": "bob"}},
        ]);
        let decoded = decode_operations(log);
        assert_eq!(decoded.len(), 4);
        let ok: Vec<_> = decoded.into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(ok, vec![Operation::Resolve, Operation::identify("bob")]);
    }

    #[test]
    fn test_decode_null_is_empty() {
        assert!(decode_operations(Value::Null).is_empty());
    }

    #[test]
    fn test_kind_ordinals_are_stable() {
        for ordinal in 0..=7u8 {
            let kind = OperationKind::from_u8(ordinal).unwrap();
            assert_eq!(kind.to_u8(), ordinal);
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert!(OperationKind::from_u8(8).is_none());
    }

    #[test]
    fn test_update_merge_concatenates_in_order() {
        let mut first = UpdatePayload::attributes(vec![AttributeMutation::set("a", 1, 1)]);
        first.merge(UpdatePayload::attributes(vec![AttributeMutation::set("b", 2, 2)]));
        assert_eq!(first.attributes[0].name(), "a");
        assert_eq!(first.attributes[1].name(), "b");
    }

    #[test]
    fn test_serde_kind_matches_as_str() {
        let ops = vec![
            Operation::Resolve,
            Operation::update(UpdatePayload::default()),
            Operation::RegisterSms {
                msisdn: "15035556789".into(),
                options: SmsRegistrationOptions {
                    sender_id: "28855".into(),
                },
            },
            Operation::AssociateChannel {
                channel_id: "c".into(),
                channel_type: ChannelType::Open,
            },
        ];
        for op in ops {
            let json = op.to_json().unwrap();
            assert_eq!(json["type"], op.kind().as_str());
        }
    }
}
