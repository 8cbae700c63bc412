//! Change-notification bus for the triage pipeline
//!
//! Every persisted mutation is published as a [`DatabaseChange`] and fanned
//! out synchronously to registered listeners. Listeners are keyed by
//! `type:action` (either side may be a wildcard), by organization, or fully
//! wildcard. Delivery is at-most-once, in-process, and non-durable: a
//! listener registered after an `emit` never sees that event. If
//! cross-process fan-out is ever required the `emit`/`subscribe` surface
//! stays unchanged and the backing transport is swapped for a broker.
//!
//! Listeners run on the emitting call's execution context, so anything that
//! does I/O (e.g. pushing to a live SSE connection) should enqueue and
//! return rather than block.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, Weak},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity type a change refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeType {
    Customer,
    Conversation,
    Communication,
    LastCommunication,
    ActionPlan,
    ActionItem,
    BoardCard,
}

impl ChangeType {
    /// String form used in event keys and over the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Customer => "customer",
            ChangeType::Conversation => "conversation",
            ChangeType::Communication => "communication",
            ChangeType::LastCommunication => "lastCommunication",
            ChangeType::ActionPlan => "actionPlan",
            ChangeType::ActionItem => "actionItem",
            ChangeType::BoardCard => "boardCard",
        }
    }

    /// Parse the wire form back into a type (used by subscription filters)
    pub fn parse(s: &str) -> Option<ChangeType> {
        match s {
            "customer" => Some(ChangeType::Customer),
            "conversation" => Some(ChangeType::Conversation),
            "communication" => Some(ChangeType::Communication),
            "lastCommunication" => Some(ChangeType::LastCommunication),
            "actionPlan" => Some(ChangeType::ActionPlan),
            "actionItem" => Some(ChangeType::ActionItem),
            "boardCard" => Some(ChangeType::BoardCard),
            _ => None,
        }
    }
}

/// Mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<ChangeAction> {
        match s {
            "created" => Some(ChangeAction::Created),
            "updated" => Some(ChangeAction::Updated),
            "deleted" => Some(ChangeAction::Deleted),
            _ => None,
        }
    }
}

/// Immutable, fire-and-forget notification of one entity mutation
///
/// Exists only on the bus; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseChange {
    /// Entity type that changed
    pub change_type: ChangeType,
    /// What happened to it
    pub action: ChangeAction,
    /// Owning organization
    pub org_id: Uuid,
    /// Entity id
    pub id: Uuid,
    /// Optional payload (entity snapshot or delta)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// When the change was emitted
    pub timestamp: DateTime<Utc>,
}

impl DatabaseChange {
    pub fn new(
        change_type: ChangeType,
        action: ChangeAction,
        org_id: Uuid,
        id: Uuid,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            change_type,
            action,
            org_id,
            id,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Event key, e.g. `customer:created`
    pub fn key(&self) -> String {
        format!("{}:{}", self.change_type.as_str(), self.action.as_str())
    }
}

/// Boxed listener invoked synchronously on emit
pub type Listener = Arc<dyn Fn(&DatabaseChange) + Send + Sync>;

/// Subscription key: either a `type:action` pattern or an organization
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SubKey {
    /// `type:action` with `None` meaning wildcard on that side
    Pattern(Option<ChangeType>, Option<ChangeAction>),
    /// All changes for one organization
    Org(Uuid),
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<SubKey, HashMap<u64, Listener>>,
}

impl Registry {
    fn insert(&mut self, key: SubKey, listener: Listener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.entry(key).or_default().insert(id, listener);
        id
    }

    fn remove(&mut self, key: &SubKey, id: u64) {
        if let Some(set) = self.listeners.get_mut(key) {
            set.remove(&id);
            // Drop the key's map once empty so the registry does not grow
            // without bound as clients connect and disconnect.
            if set.is_empty() {
                self.listeners.remove(key);
            }
        }
    }

    fn collect(&self, key: &SubKey, out: &mut Vec<Listener>) {
        if let Some(set) = self.listeners.get(key) {
            out.extend(set.values().cloned());
        }
    }
}

/// In-process publish/subscribe bus for [`DatabaseChange`] events
///
/// Constructed once per process and passed by reference (it is cheap to
/// clone) to ingestion handlers; tests construct isolated instances.
#[derive(Clone)]
pub struct ChangeBus {
    registry: Arc<Mutex<Registry>>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Subscribe to changes matching a `type:action` pattern
    ///
    /// `None` on either side is a wildcard; `subscribe(None, None, ..)` sees
    /// every change. Dropping the returned [`Subscription`] (or calling
    /// [`Subscription::unsubscribe`]) removes the listener.
    pub fn subscribe(
        &self,
        change_type: Option<ChangeType>,
        action: Option<ChangeAction>,
        listener: Listener,
    ) -> Subscription {
        self.subscribe_key(SubKey::Pattern(change_type, action), listener)
    }

    /// Subscribe to every change for one organization
    pub fn subscribe_to_org(&self, org_id: Uuid, listener: Listener) -> Subscription {
        self.subscribe_key(SubKey::Org(org_id), listener)
    }

    fn subscribe_key(&self, key: SubKey, listener: Listener) -> Subscription {
        let id = self
            .registry
            .lock()
            .expect("bus registry poisoned")
            .insert(key.clone(), listener);

        Subscription {
            registry: Arc::downgrade(&self.registry),
            key,
            id,
        }
    }

    /// Emit a change to all matching listeners, synchronously
    ///
    /// Delivery order: exact `type:action`, partial patterns (`type:*`,
    /// `*:action`), the change's organization, then full wildcard. A
    /// panicking listener is caught and logged; it never prevents delivery
    /// to the remaining listeners or corrupts bus state.
    pub fn emit(&self, change: DatabaseChange) {
        let matched = {
            let registry = self.registry.lock().expect("bus registry poisoned");
            let mut out = Vec::new();
            registry.collect(
                &SubKey::Pattern(Some(change.change_type), Some(change.action)),
                &mut out,
            );
            registry.collect(&SubKey::Pattern(Some(change.change_type), None), &mut out);
            registry.collect(&SubKey::Pattern(None, Some(change.action)), &mut out);
            registry.collect(&SubKey::Org(change.org_id), &mut out);
            registry.collect(&SubKey::Pattern(None, None), &mut out);
            out
        };

        tracing::debug!(
            key = %change.key(),
            org_id = %change.org_id,
            listeners = matched.len(),
            "Emitting change"
        );

        for listener in matched {
            if catch_unwind(AssertUnwindSafe(|| listener(&change))).is_err() {
                tracing::error!(key = %change.key(), "Change listener panicked; continuing delivery");
            }
        }
    }

    /// Number of registered listeners across all keys (debugging/tests)
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .expect("bus registry poisoned")
            .listeners
            .values()
            .map(|set| set.len())
            .sum()
    }

    /// Number of live registry keys (debugging/tests)
    pub fn key_count(&self) -> usize {
        self.registry
            .lock()
            .expect("bus registry poisoned")
            .listeners
            .len()
    }
}

/// Handle for one registered listener; unsubscribes on drop
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    key: SubKey,
    id: u64,
}

impl Subscription {
    /// Explicitly remove the listener (equivalent to dropping)
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .expect("bus registry poisoned")
                .remove(&self.key, self.id);
        }
    }
}
