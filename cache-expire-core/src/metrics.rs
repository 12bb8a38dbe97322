//  Copyright 2026 Cache Expire Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Engine-wide counters, grounded on the `self.state.metrics.<counter>
/// .fetch_add(1, Ordering::Relaxed)` idiom used throughout
/// `foyer-memory/src/generic.rs`. Each counter also mirrors its value
/// into the process-wide `metrics` registry under `cache_expire_*` so it
/// can be scraped the way any other `foyer`-family crate exposes metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Handles admitted via `Insert`/`Inject`.
    pub inserted: AtomicUsize,
    /// Handles rearmed (`Rearm` observed a changed wake time).
    pub rearmed: AtomicUsize,
    /// Handles moved to the tail of their LRU by `Touch`.
    pub lru_moved: AtomicUsize,
    /// Handles forcibly reclaimed by `NukeOne`.
    pub lru_nuked: AtomicUsize,
    /// Handles reaped by the expiry thread's deadline poll.
    pub expired: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc_inserted(&self) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_expire_inserted_total").increment(1);
    }

    pub(crate) fn inc_rearmed(&self) {
        self.rearmed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_expire_rearmed_total").increment(1);
    }

    pub(crate) fn inc_lru_moved(&self) {
        self.lru_moved.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_expire_lru_moved_total").increment(1);
    }

    pub(crate) fn inc_lru_nuked(&self) {
        self.lru_nuked.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_expire_lru_nuked_total").increment(1);
    }

    pub(crate) fn inc_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_expire_expired_total").increment(1);
    }
}
