use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::models::AvailabilityResponse;

const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub organisation_id: Uuid,
    pub start_date: NaiveDate,
    /// Inclusive.
    pub end_date: NaiveDate,
}

impl CacheKey {
    fn intersects(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start_date <= to && from <= self.end_date
    }
}

struct CacheEntry {
    response: AvailabilityResponse,
    stored_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    generations: HashMap<Uuid, u64>,
}

/// Short-lived availability results keyed by organisation and date range.
///
/// Writes bump a per-organisation generation. A result computed under an
/// older generation is dropped by `put`, so a read that raced a booking can
/// never repopulate the cache with the pre-booking view.
pub struct AvailabilityCache {
    ttl: Duration,
    max_entries: usize,
    state: RwLock<CacheState>,
}

impl AvailabilityCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub async fn get(&self, key: &CacheKey) -> Option<AvailabilityResponse> {
        if !self.is_enabled() {
            return None;
        }

        let state = self.state.read().await;
        let entry = state.entries.get(key)?;
        if entry.stored_at.elapsed() >= self.ttl {
            return None;
        }

        debug!("Availability cache hit for organisation {}", key.organisation_id);
        Some(entry.response.clone())
    }

    /// Generation to pass back to `put` once the result is computed.
    pub async fn generation(&self, organisation_id: Uuid) -> u64 {
        self.state
            .read()
            .await
            .generations
            .get(&organisation_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn put(&self, key: CacheKey, response: AvailabilityResponse, generation: u64) {
        if !self.is_enabled() {
            return;
        }

        let mut state = self.state.write().await;
        let current = state.generations.get(&key.organisation_id).copied().unwrap_or(0);
        if current != generation {
            debug!(
                "Discarding availability for organisation {} computed before a write",
                key.organisation_id
            );
            return;
        }

        if state.entries.len() >= self.max_entries && !state.entries.contains_key(&key) {
            let ttl = self.ttl;
            state.entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);

            if state.entries.len() >= self.max_entries {
                let oldest = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(key, _)| *key);
                if let Some(oldest) = oldest {
                    state.entries.remove(&oldest);
                }
            }
        }

        state.entries.insert(key, CacheEntry { response, stored_at: Instant::now() });
    }

    /// Drops every cached window of the organisation touching `[from, to]`
    /// and retires in-flight reads.
    pub async fn invalidate(&self, organisation_id: Uuid, from: NaiveDate, to: NaiveDate) {
        let mut state = self.state.write().await;
        *state.generations.entry(organisation_id).or_insert(0) += 1;

        let before = state.entries.len();
        state
            .entries
            .retain(|key, _| key.organisation_id != organisation_id || !key.intersects(from, to));

        debug!(
            "Invalidated {} cached availability windows for organisation {}",
            before - state.entries.len(),
            organisation_id
        );
    }
}
