//! Tag, attribute and subscription list mutations.
//!
//! Each mutation family knows how to apply itself to a local snapshot and how
//! to collapse a sequence of mutations into the shortest equivalent sequence.
//! Collapsing is what lets editors and the pending-update views report the
//! net effect of many edits.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::types::Scope;

/// Tag groups: group name to the set of tags in that group.
pub type TagGroups = BTreeMap<String, BTreeSet<String>>;

/// Subscription lists: list id to the scopes subscribed to.
pub type SubscriptionLists = BTreeMap<String, BTreeSet<Scope>>;

// ─────────────────────────────────────────────────────────────────────────────
// Attributes
// ─────────────────────────────────────────────────────────────────────────────

/// A single attribute edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AttributeMutation {
    Set {
        name: String,
        value: Value,
        timestamp: i64,
    },
    Remove {
        name: String,
        timestamp: i64,
    },
}

impl AttributeMutation {
    pub fn set(name: impl Into<String>, value: impl Into<Value>, timestamp: i64) -> Self {
        Self::Set {
            name: name.into(),
            value: value.into(),
            timestamp,
        }
    }

    pub fn remove(name: impl Into<String>, timestamp: i64) -> Self {
        Self::Remove {
            name: name.into(),
            timestamp,
        }
    }

    /// The attribute this mutation targets.
    pub fn name(&self) -> &str {
        match self {
            Self::Set { name, .. } | Self::Remove { name, .. } => name,
        }
    }

    /// Apply this mutation to a local attribute map.
    pub fn apply(&self, attributes: &mut BTreeMap<String, Value>) {
        match self {
            Self::Set { name, value, .. } => {
                attributes.insert(name.clone(), value.clone());
            }
            Self::Remove { name, .. } => {
                attributes.remove(name);
            }
        }
    }

    /// Collapse to the last mutation per attribute name, keeping the
    /// relative order of the survivors.
    pub fn collapse(mutations: &[AttributeMutation]) -> Vec<AttributeMutation> {
        let mut seen = HashSet::new();
        let mut collapsed: Vec<AttributeMutation> = mutations
            .iter()
            .rev()
            .filter(|m| seen.insert(m.name().to_string()))
            .cloned()
            .collect();
        collapsed.reverse();
        collapsed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tag groups
// ─────────────────────────────────────────────────────────────────────────────

/// A single tag group edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TagGroupsMutation {
    Add { group: String, tags: BTreeSet<String> },
    Remove { group: String, tags: BTreeSet<String> },
    Set { group: String, tags: BTreeSet<String> },
}

/// Net effect of a run of tag mutations on one group.
enum GroupFold {
    Set(BTreeSet<String>),
    Delta {
        add: BTreeSet<String>,
        remove: BTreeSet<String>,
    },
}

impl TagGroupsMutation {
    pub fn add<I, S>(group: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Add {
            group: group.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remove<I, S>(group: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Remove {
            group: group.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn set<I, S>(group: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set {
            group: group.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn group(&self) -> &str {
        match self {
            Self::Add { group, .. } | Self::Remove { group, .. } | Self::Set { group, .. } => group,
        }
    }

    /// Apply this mutation to local tag groups. Groups left empty are removed.
    pub fn apply(&self, tag_groups: &mut TagGroups) {
        match self {
            Self::Add { group, tags } => {
                if tags.is_empty() {
                    return;
                }
                tag_groups
                    .entry(group.clone())
                    .or_default()
                    .extend(tags.iter().cloned());
            }
            Self::Remove { group, tags } => {
                if let Some(existing) = tag_groups.get_mut(group) {
                    existing.retain(|t| !tags.contains(t));
                    if existing.is_empty() {
                        tag_groups.remove(group);
                    }
                }
            }
            Self::Set { group, tags } => {
                if tags.is_empty() {
                    tag_groups.remove(group);
                } else {
                    tag_groups.insert(group.clone(), tags.clone());
                }
            }
        }
    }

    /// Collapse a sequence of tag mutations into at most one `Set`, or one
    /// `Add` and one `Remove`, per group. Output is ordered by group name.
    pub fn collapse(mutations: &[TagGroupsMutation]) -> Vec<TagGroupsMutation> {
        let mut folds: BTreeMap<String, GroupFold> = BTreeMap::new();

        for mutation in mutations {
            let fold = folds
                .entry(mutation.group().to_string())
                .or_insert_with(|| GroupFold::Delta {
                    add: BTreeSet::new(),
                    remove: BTreeSet::new(),
                });

            match (mutation, fold) {
                (Self::Set { tags, .. }, fold) => {
                    *fold = GroupFold::Set(tags.clone());
                }
                (Self::Add { tags, .. }, GroupFold::Set(set)) => {
                    set.extend(tags.iter().cloned());
                }
                (Self::Remove { tags, .. }, GroupFold::Set(set)) => {
                    set.retain(|t| !tags.contains(t));
                }
                (Self::Add { tags, .. }, GroupFold::Delta { add, remove }) => {
                    for tag in tags {
                        remove.remove(tag);
                        add.insert(tag.clone());
                    }
                }
                (Self::Remove { tags, .. }, GroupFold::Delta { add, remove }) => {
                    for tag in tags {
                        add.remove(tag);
                        remove.insert(tag.clone());
                    }
                }
            }
        }

        let mut collapsed = Vec::new();
        for (group, fold) in folds {
            match fold {
                GroupFold::Set(tags) => collapsed.push(Self::Set { group, tags }),
                GroupFold::Delta { add, remove } => {
                    if !add.is_empty() {
                        collapsed.push(Self::Add {
                            group: group.clone(),
                            tags: add,
                        });
                    }
                    if !remove.is_empty() {
                        collapsed.push(Self::Remove {
                            group,
                            tags: remove,
                        });
                    }
                }
            }
        }
        collapsed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription lists
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

/// A subscribe or unsubscribe of one list in one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedSubscriptionListMutation {
    pub action: SubscriptionAction,
    pub list_id: String,
    pub scope: Scope,
    pub timestamp: i64,
}

impl ScopedSubscriptionListMutation {
    pub fn subscribe(list_id: impl Into<String>, scope: Scope, timestamp: i64) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            list_id: list_id.into(),
            scope,
            timestamp,
        }
    }

    pub fn unsubscribe(list_id: impl Into<String>, scope: Scope, timestamp: i64) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            list_id: list_id.into(),
            scope,
            timestamp,
        }
    }

    /// Apply to a local snapshot. Lists left with no scopes are removed.
    pub fn apply(&self, lists: &mut SubscriptionLists) {
        match self.action {
            SubscriptionAction::Subscribe => {
                lists
                    .entry(self.list_id.clone())
                    .or_default()
                    .insert(self.scope);
            }
            SubscriptionAction::Unsubscribe => {
                if let Some(scopes) = lists.get_mut(&self.list_id) {
                    scopes.remove(&self.scope);
                    if scopes.is_empty() {
                        lists.remove(&self.list_id);
                    }
                }
            }
        }
    }

    /// Collapse to the last mutation per (list, scope), keeping the relative
    /// order of the survivors.
    pub fn collapse(
        mutations: &[ScopedSubscriptionListMutation],
    ) -> Vec<ScopedSubscriptionListMutation> {
        let mut seen = HashSet::new();
        let mut collapsed: Vec<_> = mutations
            .iter()
            .rev()
            .filter(|m| seen.insert((m.list_id.clone(), m.scope)))
            .cloned()
            .collect();
        collapsed.reverse();
        collapsed
    }
}
