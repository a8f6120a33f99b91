//! Operation planning.
//!
//! Given the pending log and what is currently known about the contact,
//! decide which operation runs next and what the log looks like afterwards.
//! Planning is pure: it reads nothing and writes nothing, so the caller is
//! responsible for holding the operation lock and persisting the result.
//!
//! ## Rules
//!
//! - Operations at the head that are already satisfied are discarded.
//! - A head `Update` absorbs every directly following `Update`, in order.
//! - A head `Identify` is replaced by a directly following `Identify`, but
//!   only once the identity has been refreshed and is not anonymous. An
//!   anonymous contact must be identified as-is so the service can merge it.

use std::collections::VecDeque;

use contact_sync_core::{ContactData, ContactIdentity, Operation};
use tracing::debug;

/// What the planner knows about the contact.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanContext<'a> {
    pub identity: Option<&'a ContactIdentity>,
    pub anonymous_data: Option<&'a ContactData>,
    pub contact_id_refreshed: bool,
}

impl PlanContext<'_> {
    fn has_anonymous_data(&self) -> bool {
        self.anonymous_data.is_some_and(|data| !data.is_empty())
    }
}

/// The outcome of planning.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// The operation to execute, if any.
    pub next: Option<Operation>,
    /// The log to persist: `next` at the head followed by the untouched tail.
    pub log: Vec<Operation>,
}

/// Whether `op` can be discarded without executing it.
pub fn should_skip(op: &Operation, is_head: bool, ctx: &PlanContext<'_>) -> bool {
    match op {
        Operation::Update(_)
        | Operation::RegisterEmail { .. }
        | Operation::RegisterSms { .. }
        | Operation::RegisterOpenChannel { .. }
        | Operation::AssociateChannel { .. } => false,

        Operation::Identify { identifier } => ctx.identity.is_some_and(|identity| {
            ctx.contact_id_refreshed
                && identity.named_user_id.as_deref() == Some(identifier.as_str())
        }),

        // Only a head reset can be skipped. A queued reset behind other work
        // may still be needed once that work changes the identity.
        Operation::Reset => ctx.identity.is_some_and(|identity| {
            is_head && identity.is_anonymous && !ctx.has_anonymous_data()
        }),

        Operation::Resolve => ctx.contact_id_refreshed,
    }
}

/// Plan the next operation.
pub fn plan(operations: Vec<Operation>, ctx: &PlanContext<'_>) -> Plan {
    let mut queue: VecDeque<Operation> = operations.into();

    let mut next = loop {
        match queue.pop_front() {
            None => {
                return Plan {
                    next: None,
                    log: Vec::new(),
                }
            }
            Some(op) if should_skip(&op, true, ctx) => {
                debug!(operation = %op, "skipping operation");
            }
            Some(op) => break op,
        }
    };

    match &mut next {
        Operation::Update(merged) => loop {
            match queue.front() {
                Some(op) if should_skip(op, false, ctx) => {
                    debug!(operation = %op, "skipping operation");
                    queue.pop_front();
                }
                Some(Operation::Update(_)) => {
                    if let Some(Operation::Update(later)) = queue.pop_front() {
                        merged.merge(later);
                    }
                }
                _ => break,
            }
        },
        Operation::Identify { identifier }
            if ctx.contact_id_refreshed
                && ctx.identity.map_or(true, |identity| !identity.is_anonymous) =>
        {
            loop {
                match queue.front() {
                    Some(op) if should_skip(op, false, ctx) => {
                        debug!(operation = %op, "skipping operation");
                        queue.pop_front();
                    }
                    Some(Operation::Identify { .. }) => {
                        if let Some(Operation::Identify { identifier: later }) = queue.pop_front()
                        {
                            debug!(from = %identifier, to = %later, "collapsing identify");
                            *identifier = later;
                        }
                    }
                    _ => break,
                }
            }
        }
        _ => {}
    }

    let mut log = Vec::with_capacity(queue.len() + 1);
    log.push(next.clone());
    log.extend(queue);

    Plan {
        next: Some(next),
        log,
    }
}
