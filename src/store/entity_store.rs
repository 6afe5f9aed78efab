//! Event-sourced present store
//!
//! Holds the current state of every present and folds classified events into
//! it. Events are applied in chain order `(block_number, log_index)` and each
//! `(present_id, event_kind)` pair changes state at most once, so replaying or
//! re-indexing an overlapping range leaves the store untouched.
//!
//! ```text
//! Wrapped     absent  -> create Active (+ best-effort snapshot enrichment)
//!             present -> no-op
//! Unwrapped   Active  -> Unwrapped
//! TakenBack   Active  -> TakenBack
//!             terminal or unknown -> no-op
//! ```

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::chain::PresentReader;
use crate::events::{ChainEvent, EventKind, PresentEvent};
use crate::store::{Present, PresentDetails, PresentId, PresentStatus, Provenance};

/// Outcome of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// `Wrapped` created a new present
    Created,
    /// A status event moved an Active present to a terminal status
    Transitioned(PresentStatus),
    /// The event was already applied (or the present already exists)
    Duplicate,
    /// The present is already Unwrapped or TakenBack
    AlreadyTerminal,
    /// Status event for a present whose `Wrapped` was never seen
    UnknownPresent,
}

impl ApplyOutcome {
    pub fn changed_state(&self) -> bool {
        matches!(self, ApplyOutcome::Created | ApplyOutcome::Transitioned(_))
    }
}

/// Summary of one applied batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub created: usize,
    pub transitioned: usize,
    pub skipped: usize,
    pub unknown: usize,
    pub enrichment_failures: usize,
    /// Highest block among the batch's events
    pub max_block: Option<u64>,
}

/// Indexing status as reported to readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub is_indexing: bool,
    pub last_processed_block: u64,
    pub total_entities: usize,
    pub total_events_applied: u64,
}

/// One page of presents in insertion order
#[derive(Debug, Clone)]
pub struct PresentPage {
    pub items: Vec<Present>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Default)]
struct StoreInner {
    presents: HashMap<PresentId, Present>,
    /// Insertion order, for stable pagination
    order: Vec<PresentId>,
    /// Dedup ledger of state-changing events
    applied: HashSet<(PresentId, EventKind)>,
    events_applied: u64,
    last_processed_block: u64,
    is_indexing: bool,
}

/// In-memory event-sourced store of presents
#[derive(Default)]
pub struct EntityStore {
    inner: RwLock<StoreInner>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single event
    ///
    /// `details` is only consulted when a `Wrapped` event creates a present.
    pub async fn apply(&self, event: &ChainEvent, details: Option<PresentDetails>) -> ApplyOutcome {
        let mut inner = self.inner.write().await;
        inner.apply(event, details, Utc::now().timestamp())
    }

    /// Sort a batch into chain order and fold it into the store
    ///
    /// New presents are enriched through `reader` when one is given. A failed
    /// snapshot read leaves the present with event-only fields; it is picked up
    /// again by [`EntityStore::pending_enrichment`].
    pub async fn apply_batch(
        &self,
        mut events: Vec<ChainEvent>,
        reader: Option<&dyn PresentReader>,
    ) -> BatchSummary {
        events.sort_by_key(|e| e.position);

        let mut summary = BatchSummary {
            received: events.len(),
            max_block: events.last().map(|e| e.block_number()),
            ..Default::default()
        };

        for event in &events {
            let lookup = match (&event.event, reader) {
                (PresentEvent::Wrapped { present_id, .. }, Some(reader)) => {
                    (!self.contains(present_id).await).then_some((present_id, reader))
                }
                _ => None,
            };

            let details = match lookup {
                Some((present_id, reader)) => {
                    match reader.present_details(present_id).await {
                        Ok(Some(details)) => Some(details),
                        Ok(None) => {
                            tracing::warn!(present_id = %present_id, "Contract returned no details for present");
                            summary.enrichment_failures += 1;
                            None
                        }
                        Err(e) => {
                            tracing::warn!(
                                present_id = %present_id,
                                error = %e,
                                "Enrichment failed, keeping event-only fields"
                            );
                            summary.enrichment_failures += 1;
                            None
                        }
                    }
                }
                _ => None,
            };

            match self.apply(event, details).await {
                ApplyOutcome::Created => summary.created += 1,
                ApplyOutcome::Transitioned(_) => summary.transitioned += 1,
                ApplyOutcome::UnknownPresent => {
                    summary.unknown += 1;
                    summary.skipped += 1;
                }
                ApplyOutcome::Duplicate | ApplyOutcome::AlreadyTerminal => summary.skipped += 1,
            }
        }

        summary
    }

    pub async fn get(&self, id: &PresentId) -> Option<Present> {
        self.inner.read().await.presents.get(id).cloned()
    }

    pub async fn contains(&self, id: &PresentId) -> bool {
        self.inner.read().await.presents.contains_key(id)
    }

    /// Page through presents in insertion order (`page` is 1-indexed)
    pub async fn list(&self, page: usize, page_size: usize) -> PresentPage {
        let inner = self.inner.read().await;
        let page = page.max(1);
        let start = (page - 1).saturating_mul(page_size);

        let items = inner
            .order
            .iter()
            .skip(start)
            .take(page_size)
            .filter_map(|id| inner.presents.get(id).cloned())
            .collect();

        PresentPage {
            items,
            total: inner.order.len(),
            page,
            page_size,
        }
    }

    /// All presents in insertion order
    pub async fn all(&self) -> Vec<Present> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.presents.get(id).cloned())
            .collect()
    }

    pub async fn status(&self) -> StoreStatus {
        let inner = self.inner.read().await;
        StoreStatus {
            is_indexing: inner.is_indexing,
            last_processed_block: inner.last_processed_block,
            total_entities: inner.presents.len(),
            total_events_applied: inner.events_applied,
        }
    }

    pub async fn last_processed_block(&self) -> u64 {
        self.inner.read().await.last_processed_block
    }

    /// Move the cursor forward; never moves it back. Returns the new cursor.
    pub async fn advance_cursor(&self, block: u64) -> u64 {
        let mut inner = self.inner.write().await;
        inner.last_processed_block = inner.last_processed_block.max(block);
        inner.last_processed_block
    }

    /// Rewind the cursor for an explicit reindex
    pub async fn reset_cursor(&self, block: u64) {
        self.inner.write().await.last_processed_block = block;
    }

    pub async fn set_indexing(&self, indexing: bool) {
        self.inner.write().await.is_indexing = indexing;
    }

    /// Presents still missing a successful snapshot read, oldest first
    pub async fn pending_enrichment(&self, limit: usize) -> Vec<PresentId> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter(|id| inner.presents.get(*id).is_some_and(|p| !p.enriched))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Merge a late snapshot read into an existing present
    pub async fn enrich(&self, id: &PresentId, details: PresentDetails) -> bool {
        let mut inner = self.inner.write().await;
        match inner.presents.get_mut(id) {
            Some(present) => {
                present.enrich(details, Utc::now().timestamp());
                true
            }
            None => false,
        }
    }
}

impl StoreInner {
    fn apply(&mut self, chain_event: &ChainEvent, details: Option<PresentDetails>, now: i64) -> ApplyOutcome {
        let event = &chain_event.event;
        let id = event.present_id();
        let kind = event.kind();
        let provenance = Provenance {
            event: kind,
            block_number: chain_event.block_number(),
            transaction_hash: chain_event.transaction_hash.clone(),
        };

        if self.applied.contains(&(id.clone(), kind)) {
            return ApplyOutcome::Duplicate;
        }

        let outcome = match event {
            PresentEvent::Wrapped { sender, .. } => {
                if self.presents.contains_key(id) {
                    return ApplyOutcome::Duplicate;
                }
                let mut present = Present::from_event(id.clone(), sender.clone(), now);
                if let Some(details) = details {
                    present.enrich(details, now);
                }
                present.provenance = Some(provenance);
                self.presents.insert(id.clone(), present);
                self.order.push(id.clone());
                tracing::debug!(present_id = %id, sender = %sender, "Indexed new present");
                ApplyOutcome::Created
            }
            PresentEvent::Unwrapped { .. } | PresentEvent::TakenBack { .. } => {
                let Some(present) = self.presents.get_mut(id) else {
                    tracing::warn!(
                        present_id = %id,
                        event = %kind,
                        block = chain_event.block_number(),
                        "Status event for unknown present, Wrapped event missing"
                    );
                    return ApplyOutcome::UnknownPresent;
                };
                if present.status.is_terminal() {
                    return ApplyOutcome::AlreadyTerminal;
                }
                let next = match kind {
                    EventKind::Unwrapped => PresentStatus::Unwrapped,
                    _ => PresentStatus::TakenBack,
                };
                present.status = next;
                present.updated_at = now;
                present.provenance = Some(provenance);
                tracing::debug!(present_id = %id, status = %next, actor = %event.actor(), "Present status changed");
                ApplyOutcome::Transitioned(next)
            }
        };

        self.applied.insert((id.clone(), kind));
        self.events_applied += 1;
        outcome
    }
}
