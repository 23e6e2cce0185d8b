//! Reconciliation store.
//!
//! Merges snapshot base records and streamed price overlays into one entry per
//! token id. Every method is synchronous; the runtime owns the store inside a
//! single task and feeds it `StoreEvent`s one at a time, so nothing here locks.

use crate::errors::AppError;
use crate::models::{PriceDelta, ReadModel, Token};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Everything that can change the store, in arrival order.
#[derive(Debug)]
pub enum StoreEvent {
    SnapshotStarted {
        source: &'static str,
        seq: u64,
    },
    SnapshotReady {
        source: &'static str,
        seq: u64,
        tokens: Vec<Token>,
    },
    SnapshotFailed {
        source: &'static str,
        seq: u64,
        error: AppError,
    },
    Deltas(Vec<PriceDelta>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Live,
    Fallback,
}

#[derive(Debug, Clone)]
struct Entry {
    base: Token,
    /// Most recent streamed price; shown instead of `base.price` while set.
    overlay: Option<f64>,
    origin: Origin,
    /// Source of the last base write; `None` for fallback records.
    owner: Option<&'static str>,
    /// Consecutive applied snapshots from `owner` that did not include this id.
    missed: u32,
}

impl Entry {
    fn view(&self) -> Token {
        let mut token = self.base.clone();
        if let Some(price) = self.overlay {
            token.price = price;
        }
        token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A newer result from the same source already landed.
    Stale,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaStats {
    pub applied: usize,
    pub unknown: usize,
}

pub struct ReconciliationStore {
    entries: HashMap<String, Entry>,
    fallback: Vec<Token>,
    last_seq: HashMap<&'static str, u64>,
    /// Earlier sources win ids claimed by several; unlisted sources rank last.
    priority: Vec<&'static str>,
    in_flight: usize,
    loading: bool,
    persistent_failure: bool,
    last_error: Option<String>,
    evict_after_missed: Option<u32>,
}

impl ReconciliationStore {
    /// `fallback` is activated when no live record is available.
    pub fn new(fallback: Vec<Token>, evict_after_missed: Option<u32>) -> Self {
        Self {
            entries: HashMap::new(),
            fallback,
            last_seq: HashMap::new(),
            priority: Vec::new(),
            in_flight: 0,
            loading: true,
            persistent_failure: false,
            last_error: None,
            evict_after_missed,
        }
    }

    /// Rank sources for ids that more than one of them returns. A base write
    /// from a lower-ranked source leaves an id owned by a higher-ranked one
    /// untouched.
    pub fn with_priority(mut self, sources: &[&'static str]) -> Self {
        self.priority = sources.to_vec();
        self
    }

    fn rank(&self, source: &str) -> usize {
        self.priority
            .iter()
            .position(|s| *s == source)
            .unwrap_or(usize::MAX)
    }

    pub fn fallback_active(&self) -> bool {
        self.entries.values().any(|e| e.origin == Origin::Fallback)
    }

    /// Dispatch one event to the matching merge function.
    pub fn apply(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::SnapshotStarted { source, seq } => self.begin_fetch(source, seq),
            StoreEvent::SnapshotReady {
                source,
                seq,
                tokens,
            } => {
                self.finish_fetch();
                self.apply_snapshot(source, seq, tokens);
            }
            StoreEvent::SnapshotFailed { source, seq, error } => {
                self.finish_fetch();
                self.record_failure(source, seq, &error);
            }
            StoreEvent::Deltas(deltas) => {
                self.apply_deltas(&deltas);
            }
        }
    }

    pub fn begin_fetch(&mut self, source: &'static str, seq: u64) {
        self.in_flight += 1;
        debug!(source, seq, in_flight = self.in_flight, "[STORE] fetch started");
    }

    fn finish_fetch(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Results must be strictly newer than the last accepted one per source.
    fn accept_seq(&mut self, source: &'static str, seq: u64) -> bool {
        match self.last_seq.get(source) {
            Some(&last) if seq <= last => false,
            _ => {
                self.last_seq.insert(source, seq);
                true
            }
        }
    }

    /// Base write. Replaces the whole record for every id in `tokens`; ids not
    /// in `tokens` keep theirs. An existing overlay keeps precedence for price.
    pub fn apply_snapshot(
        &mut self,
        source: &'static str,
        seq: u64,
        tokens: Vec<Token>,
    ) -> ApplyOutcome {
        if !self.accept_seq(source, seq) {
            debug!(source, seq, "[STORE] stale snapshot dropped");
            return ApplyOutcome::Stale;
        }
        self.loading = false;

        if tokens.is_empty() {
            warn!(source, seq, "[STORE] empty snapshot");
            if self.entries.is_empty() {
                self.activate_fallback();
            }
            return ApplyOutcome::Applied;
        }

        self.persistent_failure = false;
        self.last_error = None;

        for entry in self.entries.values_mut() {
            if entry.owner == Some(source) {
                entry.missed = entry.missed.saturating_add(1);
            }
        }
        let rank = self.rank(source);
        let mut yielded = 0usize;
        let count = tokens.len();
        for token in tokens {
            let outranked = self
                .entries
                .get(&token.id)
                .and_then(|e| e.owner)
                .is_some_and(|owner| self.rank(owner) < rank);
            if outranked {
                yielded += 1;
                continue;
            }
            match self.entries.get_mut(&token.id) {
                Some(entry) => {
                    entry.base = token;
                    entry.origin = Origin::Live;
                    entry.owner = Some(source);
                    entry.missed = 0;
                }
                None => {
                    self.entries.insert(
                        token.id.clone(),
                        Entry {
                            base: token,
                            overlay: None,
                            origin: Origin::Live,
                            owner: Some(source),
                            missed: 0,
                        },
                    );
                }
            }
        }
        self.evict_missing(source);

        debug!(
            source,
            seq,
            count,
            yielded,
            total = self.entries.len(),
            "[STORE] snapshot applied"
        );
        ApplyOutcome::Applied
    }

    /// Only entries owned by `source` are candidates.
    fn evict_missing(&mut self, source: &'static str) {
        let Some(limit) = self.evict_after_missed else {
            return;
        };
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.owner != Some(source) || e.missed < limit);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            info!(source, evicted, limit, "[STORE] evicted ids missing from refreshes");
        }
    }

    /// Overlay write. Price only, and only for ids that already have a record.
    pub fn apply_deltas(&mut self, deltas: &[PriceDelta]) -> DeltaStats {
        let mut stats = DeltaStats::default();
        for delta in deltas {
            match self.entries.get_mut(&delta.id) {
                Some(entry) => {
                    entry.overlay = Some(delta.price);
                    stats.applied += 1;
                }
                None => stats.unknown += 1,
            }
        }
        if stats.unknown > 0 {
            debug!(unknown = stats.unknown, "[STORE] deltas for unknown ids ignored");
        }
        stats
    }

    /// A fetch exhausted its retries. Sets the persistent-failure flag and
    /// brings in the fallback records if nothing live is held.
    pub fn record_failure(
        &mut self,
        source: &'static str,
        seq: u64,
        error: &AppError,
    ) -> ApplyOutcome {
        if !self.accept_seq(source, seq) {
            debug!(source, seq, "[STORE] stale failure dropped");
            return ApplyOutcome::Stale;
        }
        warn!(source, seq, error = %error, "[STORE] snapshot unavailable");
        self.loading = false;
        self.persistent_failure = true;
        self.last_error = Some(error.to_string());
        if self.entries.is_empty() {
            self.activate_fallback();
        }
        ApplyOutcome::Applied
    }

    /// Insert every fallback record whose id is not already held.
    pub fn activate_fallback(&mut self) {
        let mut added = 0usize;
        for token in &self.fallback {
            if self.entries.contains_key(&token.id) {
                continue;
            }
            self.entries.insert(
                token.id.clone(),
                Entry {
                    base: token.clone(),
                    overlay: None,
                    origin: Origin::Fallback,
                    owner: None,
                    missed: 0,
                },
            );
            added += 1;
        }
        if added > 0 {
            info!(added, "[STORE] fallback dataset activated");
        }
    }

    pub fn token(&self, id: &str) -> Option<Token> {
        self.entries.get(id).map(Entry::view)
    }

    pub fn origin(&self, id: &str) -> Option<Origin> {
        self.entries.get(id).map(|e| e.origin)
    }

    /// Current view with overlay prices substituted.
    pub fn read_model(&self) -> ReadModel {
        ReadModel {
            tokens: self
                .entries
                .iter()
                .map(|(id, e)| (id.clone(), e.view()))
                .collect(),
            loading: self.loading,
            persistent_failure: self.persistent_failure,
            refreshing: self.in_flight > 0,
            fallback_active: self.fallback_active(),
            last_error: self.last_error.clone(),
        }
    }
}
