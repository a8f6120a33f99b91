//! Builder-style editors for tags, attributes and subscription lists.
//!
//! An editor records mutations and hands the collapsed list to its sink on
//! [`apply`](TagGroupsEditor::apply). Dropping an editor without applying
//! it discards the edits.

use std::sync::Arc;

use contact_sync_core::{
    AttributeMutation, Scope, ScopedSubscriptionListMutation, TagGroupsMutation,
};
use contact_sync_engine::Clock;
use serde_json::Value;

type Sink<'a, T> = Box<dyn FnOnce(Vec<T>) + Send + 'a>;

/// Records tag group edits.
#[must_use = "edits are discarded unless applied"]
pub struct TagGroupsEditor<'a> {
    mutations: Vec<TagGroupsMutation>,
    sink: Sink<'a, TagGroupsMutation>,
}

impl<'a> TagGroupsEditor<'a> {
    pub fn new(sink: impl FnOnce(Vec<TagGroupsMutation>) + Send + 'a) -> Self {
        Self {
            mutations: Vec::new(),
            sink: Box::new(sink),
        }
    }

    pub fn add_tag(self, group: &str, tag: &str) -> Self {
        self.add_tags(group, [tag])
    }

    pub fn add_tags<I, S>(mut self, group: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(TagGroupsMutation::add(group, tags));
        self
    }

    pub fn remove_tag(self, group: &str, tag: &str) -> Self {
        self.remove_tags(group, [tag])
    }

    pub fn remove_tags<I, S>(mut self, group: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(TagGroupsMutation::remove(group, tags));
        self
    }

    /// Replace the group's tags. An empty set clears the group.
    pub fn set_tags<I, S>(mut self, group: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group = group.trim();
        if !group.is_empty() {
            self.mutations.push(TagGroupsMutation::set(group, tags));
        }
        self
    }

    /// Add and remove edits with an empty group or no tags are no-ops.
    fn push(&mut self, mutation: TagGroupsMutation) {
        let noop = matches!(
            &mutation,
            TagGroupsMutation::Add { group, tags } | TagGroupsMutation::Remove { group, tags }
                if group.trim().is_empty() || tags.is_empty()
        );
        if !noop {
            self.mutations.push(mutation);
        }
    }

    pub fn apply(self) {
        (self.sink)(TagGroupsMutation::collapse(&self.mutations));
    }
}

/// Records attribute edits, stamped with the time of each call.
#[must_use = "edits are discarded unless applied"]
pub struct AttributeEditor<'a> {
    mutations: Vec<AttributeMutation>,
    clock: Arc<dyn Clock>,
    sink: Sink<'a, AttributeMutation>,
}

impl<'a> AttributeEditor<'a> {
    pub fn new(
        clock: Arc<dyn Clock>,
        sink: impl FnOnce(Vec<AttributeMutation>) + Send + 'a,
    ) -> Self {
        Self {
            mutations: Vec::new(),
            clock,
            sink: Box::new(sink),
        }
    }

    pub fn set_string(self, name: &str, value: &str) -> Self {
        self.set_value(name, value)
    }

    pub fn set_i64(self, name: &str, value: i64) -> Self {
        self.set_value(name, value)
    }

    /// Non-finite numbers cannot be represented and are ignored.
    pub fn set_f64(self, name: &str, value: f64) -> Self {
        match serde_json::Number::from_f64(value) {
            Some(number) => self.set_value(name, Value::Number(number)),
            None => self,
        }
    }

    pub fn set_bool(self, name: &str, value: bool) -> Self {
        self.set_value(name, value)
    }

    pub fn set_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        if !name.trim().is_empty() {
            let timestamp = self.clock.now_millis();
            self.mutations.push(AttributeMutation::set(name, value, timestamp));
        }
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        if !name.trim().is_empty() {
            let timestamp = self.clock.now_millis();
            self.mutations.push(AttributeMutation::remove(name, timestamp));
        }
        self
    }

    pub fn apply(self) {
        (self.sink)(AttributeMutation::collapse(&self.mutations));
    }
}

/// Records scoped subscription list edits.
#[must_use = "edits are discarded unless applied"]
pub struct SubscriptionListEditor<'a> {
    mutations: Vec<ScopedSubscriptionListMutation>,
    clock: Arc<dyn Clock>,
    sink: Sink<'a, ScopedSubscriptionListMutation>,
}

impl<'a> SubscriptionListEditor<'a> {
    pub fn new(
        clock: Arc<dyn Clock>,
        sink: impl FnOnce(Vec<ScopedSubscriptionListMutation>) + Send + 'a,
    ) -> Self {
        Self {
            mutations: Vec::new(),
            clock,
            sink: Box::new(sink),
        }
    }

    pub fn subscribe(self, list_id: &str, scope: Scope) -> Self {
        self.mutate(list_id, [scope], true)
    }

    pub fn unsubscribe(self, list_id: &str, scope: Scope) -> Self {
        self.mutate(list_id, [scope], false)
    }

    /// Subscribe or unsubscribe one list in several scopes.
    pub fn mutate(
        mut self,
        list_id: &str,
        scopes: impl IntoIterator<Item = Scope>,
        subscribe: bool,
    ) -> Self {
        let list_id = list_id.trim();
        if list_id.is_empty() {
            return self;
        }
        let timestamp = self.clock.now_millis();
        for scope in scopes {
            self.mutations.push(if subscribe {
                ScopedSubscriptionListMutation::subscribe(list_id, scope, timestamp)
            } else {
                ScopedSubscriptionListMutation::unsubscribe(list_id, scope, timestamp)
            });
        }
        self
    }

    pub fn apply(self) {
        (self.sink)(ScopedSubscriptionListMutation::collapse(&self.mutations));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contact_sync_engine::ManualClock;
    use std::sync::Mutex;

    #[test]
    fn test_tag_editor_collapses_and_ignores_empty_edits() {
        let applied = Mutex::new(None);
        TagGroupsEditor::new(|m| *applied.lock().unwrap() = Some(m))
            .add_tag("group", "a")
            .add_tags("group", Vec::<String>::new())
            .add_tag("  ", "b")
            .remove_tag("group", "a")
            .apply();

        let applied = applied.into_inner().unwrap().unwrap();
        assert_eq!(applied, vec![TagGroupsMutation::remove("group", ["a"])]);
    }

    #[test]
    fn test_attribute_editor_last_write_wins() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(7));
        let applied = Mutex::new(Vec::new());
        AttributeEditor::new(clock, |m| *applied.lock().unwrap() = m)
            .set_string("name", "a")
            .set_i64("age", 3)
            .set_f64("bad", f64::NAN)
            .remove("name")
            .apply();

        assert_eq!(
            applied.into_inner().unwrap(),
            vec![
                AttributeMutation::set("age", 3, 7),
                AttributeMutation::remove("name", 7),
            ]
        );
    }

    #[test]
    fn test_subscription_editor_multi_scope() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1));
        let applied = Mutex::new(Vec::new());
        SubscriptionListEditor::new(clock, |m| *applied.lock().unwrap() = m)
            .mutate("news", [Scope::App, Scope::Web], true)
            .unsubscribe("news", Scope::App)
            .apply();

        assert_eq!(
            applied.into_inner().unwrap(),
            vec![
                ScopedSubscriptionListMutation::subscribe("news", Scope::Web, 1),
                ScopedSubscriptionListMutation::unsubscribe("news", Scope::App, 1),
            ]
        );
    }
}
