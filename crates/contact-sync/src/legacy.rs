//! Migration of data left behind by the named-user API.
//!
//! Older installs stored a named user id and queued tag/attribute
//! mutations under their own keys. On first start they are converted into
//! an `Identify` and an `Update`, and the old keys are removed.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use contact_sync_core::{AttributeMutation, TagGroupsMutation, UpdatePayload};
use contact_sync_engine::keys;
use contact_sync_store::{KeyValueStore, KeyValueStoreExt};

use crate::error::Result;

/// What was found under the legacy keys.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LegacyNamedUser {
    pub named_user_id: String,
    /// Collapsed pending mutations, if any were stored and requested.
    pub update: Option<UpdatePayload>,
}

/// Read legacy named-user data without removing it.
pub(crate) fn read<S: KeyValueStore + ?Sized>(
    store: &S,
    include_mutations: bool,
) -> Result<Option<LegacyNamedUser>> {
    let Some(named_user_id) = store.get_string(keys::LEGACY_NAMED_USER_ID)? else {
        return Ok(None);
    };

    let update = if include_mutations {
        let attributes: Vec<AttributeMutation> =
            read_mutations(store, keys::LEGACY_ATTRIBUTE_MUTATIONS);
        let tags: Vec<TagGroupsMutation> = read_mutations(store, keys::LEGACY_TAG_GROUP_MUTATIONS);
        let update = UpdatePayload {
            tags: TagGroupsMutation::collapse(&tags),
            attributes: AttributeMutation::collapse(&attributes),
            subscriptions: Vec::new(),
        };
        (!update.is_empty()).then_some(update)
    } else {
        None
    };

    Ok(Some(LegacyNamedUser {
        named_user_id,
        update,
    }))
}

/// Remove every legacy key.
pub(crate) fn clear<S: KeyValueStore + ?Sized>(store: &S) -> Result<()> {
    store.remove(keys::LEGACY_TAG_GROUP_MUTATIONS)?;
    store.remove(keys::LEGACY_ATTRIBUTE_MUTATIONS)?;
    store.remove(keys::LEGACY_NAMED_USER_ID)?;
    Ok(())
}

/// Decode a stored mutation list. Batches may be nested one level deep;
/// entries that do not decode are dropped.
fn read_mutations<S, T>(store: &S, key: &str) -> Vec<T>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    let raw = match store.get_json(key) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(key, error = %e, "ignoring unreadable legacy mutations");
            return Vec::new();
        }
    };

    let Value::Array(items) = raw else {
        return Vec::new();
    };

    items
        .into_iter()
        .flat_map(|item| match item {
            Value::Array(batch) => batch,
            single => vec![single],
        })
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(mutation) => Some(mutation),
            Err(e) => {
                warn!(key, error = %e, "dropping legacy mutation");
                None
            }
        })
        .collect()
}
