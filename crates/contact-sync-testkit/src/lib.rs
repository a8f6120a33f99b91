//! # Contact Sync Testkit
//!
//! Testing utilities for contact sync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a contact wired to in-memory collaborators, plus a helper
//!   that runs scheduled jobs until the log drains
//! - **Generators**: proptest strategies for operations and mutations
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use contact_sync_testkit::fixtures::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let contact = fixture.contact();
//!     contact.identify("alice");
//!     fixture.drain(&contact).await;
//!     assert_eq!(contact.named_user_id().as_deref(), Some("alice"));
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use contact_sync_testkit::generators::operation;
//!
//! proptest! {
//!     #[test]
//!     fn log_survives_restart(ops in prop::collection::vec(operation(), 0..10)) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{TestContact, TestFixture};
