//! End-to-end contact flows against the in-memory identity service.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use contact_sync::engine::api::memory::Failure;
use contact_sync::engine::{ConflictStrategy, ACTION_UPDATE_CONTACT};
use contact_sync::{
    AttributeMutation, ChannelType, ConflictEvent, Contact, ContactConfig,
    EmailRegistrationOptions, Feature, JobResult, Operation, Scope, SubscriptionLists,
};
use contact_sync_testkit::fixtures::CHANNEL_ID;
use contact_sync_testkit::TestFixture;
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn test_anonymous_data_reported_on_conflict() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    let contact = fixture.contact();

    let conflicts: Arc<Mutex<Vec<ConflictEvent>>> = Arc::default();
    let sink = conflicts.clone();
    contact.add_conflict_listener(Arc::new(move |event: &ConflictEvent| {
        sink.lock().unwrap().push(event.clone());
    }));

    let uploaded: Arc<Mutex<Vec<AttributeMutation>>> = Arc::default();
    let sink = uploaded.clone();
    contact.add_attribute_listener(Arc::new(move |mutations: &[AttributeMutation]| {
        sink.lock().unwrap().extend_from_slice(mutations);
    }));

    contact
        .edit_attributes()
        .set_string("favorite_color", "green")
        .apply();
    assert_eq!(fixture.drain(&contact).await, JobResult::Finished);

    let anonymous = contact.last_identity().expect("resolved");
    assert!(anonymous.is_anonymous);
    assert_eq!(uploaded.lock().unwrap().len(), 1);

    // Another device already owns this named user.
    let named_contact = fixture.service.seed_named_user("alice");
    contact.identify("alice");
    assert_eq!(fixture.drain(&contact).await, JobResult::Finished);

    let identity = contact.last_identity().expect("identified");
    assert_eq!(identity.contact_id, named_contact);
    assert_eq!(identity.named_user_id.as_deref(), Some("alice"));

    let conflicts = conflicts.lock().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].named_user_id.as_deref(), Some("alice"));
    assert_eq!(
        conflicts[0].anonymous_data.attributes.get("favorite_color"),
        Some(&json!("green"))
    );
    Ok(())
}

#[tokio::test]
async fn test_identify_merges_fresh_anonymous_contact() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    let contact = fixture.contact();

    let conflicts = Arc::new(AtomicUsize::new(0));
    let counter = conflicts.clone();
    contact.add_conflict_listener(Arc::new(move |_: &ConflictEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    contact.edit_tag_groups().add_tag("interests", "cats").apply();
    fixture.drain(&contact).await;
    let anonymous_id = contact.current_contact_id().expect("resolved");

    contact.identify("bob");
    assert_eq!(contact.named_user_id().as_deref(), Some("bob"));
    assert_eq!(contact.current_contact_id(), None);
    fixture.drain(&contact).await;

    assert_eq!(contact.current_contact_id(), Some(anonymous_id.clone()));
    assert_eq!(conflicts.load(Ordering::SeqCst), 0);

    let remote = fixture.service.contact(&anonymous_id).expect("remote contact");
    assert_eq!(remote.named_user_id.as_deref(), Some("bob"));
    assert!(remote.tag_groups["interests"].contains("cats"));
    Ok(())
}

#[tokio::test]
async fn test_contact_change_listener_sees_reset() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    let contact = fixture.contact();

    contact.identify("carol");
    fixture.drain(&contact).await;
    let named = contact.current_contact_id().expect("identified");

    let changes = Arc::new(AtomicUsize::new(0));
    let counter = changes.clone();
    contact.add_contact_change_listener(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    contact.reset();
    fixture.drain(&contact).await;

    let identity = contact.last_identity().expect("reset");
    assert!(identity.is_anonymous);
    assert_ne!(identity.contact_id, named);
    assert_eq!(contact.named_user_id(), None);
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert!(fixture.channel.registration_updates() >= 1);
    Ok(())
}

#[tokio::test]
async fn test_transient_failures_are_retried() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    let contact = fixture.contact();

    contact.identify("dave");
    fixture.service.fail_next(Failure::Status(503));
    assert_eq!(fixture.drain(&contact).await, JobResult::Retry);
    assert_eq!(
        contact.pending_operations()?,
        vec![Operation::identify("dave")]
    );

    fixture.service.fail_next(Failure::Transport);
    assert_eq!(fixture.drain(&contact).await, JobResult::Retry);

    assert_eq!(fixture.drain(&contact).await, JobResult::Finished);
    assert!(contact.pending_operations()?.is_empty());
    assert_eq!(contact.named_user_id().as_deref(), Some("dave"));
    Ok(())
}

#[tokio::test]
async fn test_rejected_operation_is_dropped() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    let contact = fixture.contact();

    contact.resolve();
    fixture.drain(&contact).await;
    fixture.dispatcher.clear();

    contact.edit_attributes().set_i64("age", 30).apply();
    fixture.service.fail_next(Failure::Status(400));
    assert_eq!(fixture.drain(&contact).await, JobResult::Finished);
    assert!(contact.pending_operations()?.is_empty());
    assert!(contact.pending_attribute_updates().is_empty());

    // The follow-up job replaces whatever was scheduled.
    assert_eq!(
        fixture.dispatcher.strategies().last(),
        Some(&ConflictStrategy::Replace)
    );
    Ok(())
}

#[tokio::test]
async fn test_channel_registration_waits_for_channel() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.channel.set_channel_id(None);
    let contact = fixture.contact();

    contact.register_email("ada@example.com", EmailRegistrationOptions::default());
    contact.associate_channel("sms-channel", ChannelType::Sms);

    assert_eq!(fixture.drain(&contact).await, JobResult::Finished);
    assert_eq!(fixture.service.call_count(), 0);
    assert_eq!(contact.pending_operations()?.len(), 4);

    fixture.channel.set_channel_id(Some(CHANNEL_ID.to_string()));
    contact.on_channel_created();
    fixture.drain(&contact).await;

    let contact_id = contact.current_contact_id().expect("resolved");
    let remote = fixture.service.contact(&contact_id).expect("remote contact");
    assert_eq!(remote.channels.len(), 2);

    let anonymous = contact.engine().state().anonymous_data().expect("anon data");
    assert_eq!(anonymous.associated_channels.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_subscription_lists_overlay_pending_edits() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    let contact = fixture.contact();

    contact.resolve();
    fixture.drain(&contact).await;
    let contact_id = contact.current_contact_id().expect("resolved");
    let mut remote = SubscriptionLists::new();
    remote.insert("weekly".to_string(), BTreeSet::from([Scope::Email]));
    fixture.service.set_subscription_lists(&contact_id, remote);

    contact
        .edit_subscription_lists()
        .subscribe("offers", Scope::Sms)
        .apply();

    let lists = contact.subscription_lists(true).await.expect("lists");
    assert!(lists["weekly"].contains(&Scope::Email));
    assert!(lists["offers"].contains(&Scope::Sms));

    let remote_only = contact.subscription_lists(false).await.expect("lists");
    assert!(!remote_only.contains_key("offers"));

    contact.privacy().disable(&[Feature::TagsAndAttributes]);
    assert_eq!(contact.subscription_lists(true).await, None);
    Ok(())
}

#[tokio::test]
async fn test_disabling_contacts_resets_named_user() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    let contact = fixture.contact();

    contact.identify("erin");
    fixture.drain(&contact).await;
    let named = contact.current_contact_id().expect("identified");

    contact.privacy().disable(&[Feature::Contacts]);
    contact.identify("frank");
    assert_eq!(contact.pending_operations()?, vec![Operation::Reset]);

    fixture.drain(&contact).await;
    let identity = contact.last_identity().expect("reset");
    assert!(identity.is_anonymous);
    assert_ne!(identity.contact_id, named);
    Ok(())
}

#[tokio::test]
async fn test_foreground_resolve_is_throttled() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    let contact = fixture.contact();

    contact.on_foreground();
    fixture.drain(&contact).await;
    let resolves = fixture.service.call_count();

    contact.on_foreground();
    assert!(contact.pending_operations()?.is_empty());

    fixture
        .clock
        .advance(std::time::Duration::from_secs(24 * 60 * 60 + 1));
    contact.on_foreground();
    fixture.drain(&contact).await;
    assert_eq!(fixture.service.call_count(), resolves + 1);
    Ok(())
}

#[tokio::test]
async fn test_pending_operations_survive_restart() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("contact.db");
    let fixture = TestFixture::new();

    {
        let store = contact_sync::store::SqliteStore::open(&path)?;
        let contact = Contact::new(
            store,
            fixture.service.clone(),
            fixture.services(),
            ContactConfig::default(),
        );
        contact.init();
        contact.identify("grace");
        contact
            .edit_attributes()
            .set_bool("vip", true)
            .apply();

        fixture.service.fail_next(Failure::Transport);
        let result = contact.perform_job(ACTION_UPDATE_CONTACT).await;
        assert_eq!(result, JobResult::Retry);
    }

    let store = contact_sync::store::SqliteStore::open(&path)?;
    let contact = Contact::new(
        store,
        fixture.service.clone(),
        fixture.services(),
        ContactConfig::default(),
    );
    contact.init();
    assert_eq!(contact.named_user_id().as_deref(), Some("grace"));
    assert_eq!(contact.pending_attribute_updates().len(), 1);

    for _ in 0..8 {
        if contact.pending_operations()?.is_empty() {
            break;
        }
        contact.perform_job(ACTION_UPDATE_CONTACT).await;
    }

    let contact_id = contact.current_contact_id().expect("identified");
    let remote = fixture.service.contact(&contact_id).expect("remote contact");
    assert_eq!(remote.named_user_id.as_deref(), Some("grace"));
    assert_eq!(remote.attributes.get("vip"), Some(&json!(true)));
    Ok(())
}
