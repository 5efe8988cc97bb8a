//! Change notification
//!
//! Subscribers are called explicitly after every session method that
//! changed something. There is no implicit dependency tracking: a
//! subscriber re-reads whatever it needs from the session.

use std::fmt;

use keytrack_core::InstanceId;
use serde::Serialize;
use tracing::trace;

/// What caused a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Edit,
    Undo,
    Redo,
    Load,
    Selection,
}

/// One notification sent to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeNotice {
    pub kind: ChangeKind,
    /// Instances whose state may differ from before, in id order
    pub instances: Vec<InstanceId>,
}

impl ChangeNotice {
    pub fn new(kind: ChangeKind, instances: impl IntoIterator<Item = InstanceId>) -> Self {
        ChangeNotice {
            kind,
            instances: instances.into_iter().collect(),
        }
    }

    pub fn touches(&self, id: &InstanceId) -> bool {
        self.instances.contains(id)
    }
}

/// Handle returned by [`Subscribers::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

type Callback = Box<dyn FnMut(&ChangeNotice) + Send>;

/// Registered change callbacks, called in subscription order
#[derive(Default)]
pub struct Subscribers {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

impl Subscribers {
    pub fn new() -> Self {
        Subscribers::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ChangeNotice) + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let len = self.callbacks.len();
        self.callbacks.retain(|(sub, _)| *sub != id);
        self.callbacks.len() != len
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn notify(&mut self, notice: &ChangeNotice) {
        trace!(kind = ?notice.kind, instances = notice.instances.len(), subscribers = self.callbacks.len(), "notify");
        for (_, callback) in &mut self.callbacks {
            callback(notice);
        }
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.callbacks.len())
            .finish()
    }
}
