//! # Contact Sync Engine
//!
//! Durable, ordered, coalescing sync of one contact's identity operations
//! against a remote identity service.
//!
//! ## Overview
//!
//! Callers append [`Operation`](contact_sync_core::Operation)s to a
//! persisted log and request a background job. The job runs
//! [`ContactEngine::perform_next_operation`], which:
//!
//! 1. Plans the next unit of work, discarding satisfied operations and
//!    coalescing adjacent updates and identifies.
//! 2. Executes it against a [`ContactApiClient`].
//! 3. Removes it from the log once a final response was observed, or leaves
//!    it in place and asks for a retry.
//!
//! ## Key Properties
//!
//! - **Durable**: every accepted operation survives a restart
//! - **Ordered**: operations run in log order, apart from planned coalescing
//! - **Non-blocking**: enqueueing never waits on the network
//! - **Conflict-aware**: data accrued on an anonymous contact is handed to a
//!   conflict listener before it would be lost
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use contact_sync_core::Operation;
//! use contact_sync_engine::{
//!     ContactEngine, MemoryContactService, RecordingDispatcher, StaticChannel, SyncConfig,
//! };
//! use contact_sync_store::MemoryStore;
//!
//! async fn example() {
//!     let engine = ContactEngine::new(
//!         MemoryStore::new(),
//!         MemoryContactService::new(),
//!         Arc::new(RecordingDispatcher::new()),
//!         Arc::new(StaticChannel::new("channel")),
//!         SyncConfig::default(),
//!     );
//!
//!     engine.enqueue(Operation::identify("alice"));
//!     let _result = engine.perform_next_operation().await;
//! }
//! ```

pub mod api;
pub mod cache;
pub mod channel;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod engine;
pub mod error;
pub mod listener;
pub mod planner;
pub mod state;
pub mod subscriptions;

pub use api::{
    memory::MemoryContactService, ApiError, ApiResponse, ApiResult, ContactApiClient,
};
pub use cache::CachedValue;
pub use channel::{ChannelProvider, StaticChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SyncConfig, ACTION_UPDATE_CONTACT};
pub use dispatcher::{ConflictStrategy, JobDispatcher, JobRequest, JobResult, RecordingDispatcher};
pub use engine::ContactEngine;
pub use error::{Result, SyncError};
pub use listener::{
    AttributeListener, ConflictEvent, ConflictListener, ContactChangeListener, ListenerList,
    Listeners, TagGroupListener,
};
pub use planner::{plan, should_skip, Plan, PlanContext};
pub use state::{keys, ContactState};
