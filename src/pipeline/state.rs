//! Ordered work list and its two flags.
//!
//! [`QueueState`] is owned by the scheduler task and never shared, so no
//! lock guards it.  Its methods enforce the single-slot rule: at most one
//! item is `Processing` or `Playing` at a time, tracked by `current`.

use serde::Serialize;
use uuid::Uuid;

use super::item::{InsertPosition, ItemSource, ItemStatus, RequestItem};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One row of [`QueueSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemView {
    pub id: Uuid,
    pub text: String,
    pub alias: String,
    pub status: ItemStatus,
    pub error: Option<String>,
    pub username: Option<String>,
    pub block_reason: Option<String>,
    pub source: ItemSource,
}

impl From<&RequestItem> for QueueItemView {
    fn from(item: &RequestItem) -> Self {
        Self {
            id: item.id,
            text: item.text.clone(),
            alias: item.alias.clone(),
            status: item.status,
            error: item.error.clone(),
            username: item.username.clone(),
            block_reason: item.block_reason.clone(),
            source: item.source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub items: Vec<QueueItemView>,
    pub is_processing: bool,
    pub is_paused: bool,
    pub current_id: Option<Uuid>,
    pub is_lingering: bool,
}

// ---------------------------------------------------------------------------
// QueueState
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct QueueState {
    items: Vec<RequestItem>,
    current: Option<Uuid>,
    paused: bool,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item`; returns its 1-based position in the list.
    pub fn push(&mut self, item: RequestItem) -> usize {
        self.items.push(item);
        self.items.len()
    }

    /// Insert `item` at `position`.  `Front` places it before the first
    /// queued item, behind anything already playing, lingering or held.
    pub fn insert(&mut self, item: RequestItem, position: InsertPosition) {
        let index = match position {
            InsertPosition::Back => None,
            InsertPosition::Front => self
                .items
                .iter()
                .position(|i| i.status == ItemStatus::Queued),
        };
        match index {
            Some(index) => self.items.insert(index, item),
            None => self.items.push(item),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&RequestItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut RequestItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn remove(&mut self, id: Uuid) -> Option<RequestItem> {
        let index = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn items(&self) -> &[RequestItem] {
        &self.items
    }

    /// First item still waiting its turn.
    pub fn next_queued(&self) -> Option<Uuid> {
        self.items
            .iter()
            .find(|i| i.status == ItemStatus::Queued)
            .map(|i| i.id)
    }

    /// Claim the processing slot for `id`.  Fails when the slot is taken or
    /// the item is not queued.
    pub fn begin_processing(&mut self, id: Uuid) -> bool {
        if self.current.is_some() {
            return false;
        }
        match self.get_mut(id) {
            Some(item) if item.status == ItemStatus::Queued => {
                item.status = ItemStatus::Processing;
                self.current = Some(id);
                true
            }
            _ => false,
        }
    }

    /// Release the slot if `id` holds it.
    pub fn finish_processing(&mut self, id: Uuid) {
        if self.current == Some(id) {
            self.current = None;
        }
    }

    pub fn current(&self) -> Option<Uuid> {
        self.current
    }

    pub fn is_processing(&self) -> bool {
        self.current.is_some()
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Remove every queued or held item, in list order.
    pub fn drain_waiting(&mut self) -> Vec<RequestItem> {
        let (waiting, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|i| i.status.is_waiting());
        self.items = kept;
        waiting
    }

    pub fn snapshot(&self, is_lingering: bool) -> QueueSnapshot {
        QueueSnapshot {
            items: self.items.iter().map(QueueItemView::from).collect(),
            is_processing: self.is_processing(),
            is_paused: self.paused,
            current_id: self.current,
            is_lingering,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
