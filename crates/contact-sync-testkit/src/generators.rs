//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::Value;

use contact_sync_core::{
    AttributeMutation, ChannelType, Operation, Scope, ScopedSubscriptionListMutation,
    TagGroupsMutation, UpdatePayload,
};

/// A named user id from a small alphabet, so generated logs repeat ids.
pub fn named_user_id() -> impl Strategy<Value = String> {
    "[a-c]{1,2}".prop_map(String::from)
}

/// A reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=1_700_000_000_000i64
}

pub fn scope() -> impl Strategy<Value = Scope> {
    prop_oneof![
        Just(Scope::App),
        Just(Scope::Web),
        Just(Scope::Email),
        Just(Scope::Sms),
    ]
}

pub fn channel_type() -> impl Strategy<Value = ChannelType> {
    prop_oneof![
        Just(ChannelType::Email),
        Just(ChannelType::Sms),
        Just(ChannelType::Open),
    ]
}

fn attribute_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ]
}

pub fn attribute_mutation() -> impl Strategy<Value = AttributeMutation> {
    ("[a-d]", any::<bool>(), attribute_value(), timestamp()).prop_map(
        |(name, set, value, ts)| {
            if set {
                AttributeMutation::set(name, value, ts)
            } else {
                AttributeMutation::remove(name, ts)
            }
        },
    )
}

pub fn tag_mutation() -> impl Strategy<Value = TagGroupsMutation> {
    let tags = prop::collection::btree_set("[a-d]", 0..3);
    (0u8..3, "g[12]", tags).prop_map(|(kind, group, tags)| match kind {
        0 => TagGroupsMutation::Add { group, tags },
        1 => TagGroupsMutation::Remove { group, tags },
        _ => TagGroupsMutation::Set { group, tags },
    })
}

pub fn subscription_mutation() -> impl Strategy<Value = ScopedSubscriptionListMutation> {
    ("l[1-3]", scope(), any::<bool>(), timestamp()).prop_map(|(list, scope, subscribe, ts)| {
        if subscribe {
            ScopedSubscriptionListMutation::subscribe(list, scope, ts)
        } else {
            ScopedSubscriptionListMutation::unsubscribe(list, scope, ts)
        }
    })
}

pub fn update_payload() -> impl Strategy<Value = UpdatePayload> {
    (
        prop::collection::vec(tag_mutation(), 0..3),
        prop::collection::vec(attribute_mutation(), 0..3),
        prop::collection::vec(subscription_mutation(), 0..3),
    )
        .prop_map(|(tags, attributes, subscriptions)| UpdatePayload {
            tags,
            attributes,
            subscriptions,
        })
}

/// Any operation a caller can enqueue.
pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => named_user_id().prop_map(Operation::identify),
        1 => Just(Operation::Reset),
        2 => Just(Operation::Resolve),
        3 => update_payload().prop_map(Operation::update),
        1 => (channel_type(), "[a-z]{4}").prop_map(|(channel_type, channel_id)| {
            Operation::AssociateChannel {
                channel_id,
                channel_type,
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use contact_sync_core::{decode_operations, encode_operations, SubscriptionLists};
    use std::collections::BTreeMap;

    proptest! {
        #[test]
        fn test_attribute_collapse_preserves_effect(
            mutations in prop::collection::vec(attribute_mutation(), 0..10),
        ) {
            let mut direct = BTreeMap::new();
            for m in &mutations {
                m.apply(&mut direct);
            }

            let mut collapsed = BTreeMap::new();
            for m in AttributeMutation::collapse(&mutations) {
                m.apply(&mut collapsed);
            }

            prop_assert_eq!(direct, collapsed);
        }

        #[test]
        fn test_subscription_collapse_preserves_effect(
            mutations in prop::collection::vec(subscription_mutation(), 0..10),
        ) {
            let mut direct = SubscriptionLists::new();
            for m in &mutations {
                m.apply(&mut direct);
            }

            let mut collapsed = SubscriptionLists::new();
            for m in ScopedSubscriptionListMutation::collapse(&mutations) {
                m.apply(&mut collapsed);
            }

            prop_assert_eq!(direct, collapsed);
        }

        #[test]
        fn test_generated_logs_decode(ops in prop::collection::vec(operation(), 0..8)) {
            let encoded = encode_operations(&ops).unwrap();
            let decoded: Vec<_> = decode_operations(encoded)
                .into_iter()
                .collect::<Result<_, _>>()
                .unwrap();
            prop_assert_eq!(decoded, ops);
        }
    }
}
