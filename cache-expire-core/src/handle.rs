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

use std::sync::{
    atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering},
    Arc, Weak,
};

use parking_lot::Mutex;

use crate::{flags::Flags, lru::Lru};

/// Sentinel `timer_idx` meaning "not currently in the heap", matching the
/// original's `BINHEAP_NOIDX`.
pub const NO_IDX: usize = usize::MAX;

/// The expiry attributes of a cached object: `t_origin`, `ttl`, `grace` and
/// `keep`, in seconds. See `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exp {
    pub t_origin: f64,
    pub ttl: f64,
    pub grace: f64,
    pub keep: f64,
}

impl Exp {
    pub fn new(t_origin: f64, ttl: f64, grace: f64, keep: f64) -> Self {
        Self { t_origin, ttl, grace, keep }
    }

    /// Marks the object "never cached": negative TTL, no grace or keep, and
    /// a zeroed reference time.
    pub fn clear(&mut self) {
        self.ttl = -1.0;
        self.grace = 0.0;
        self.keep = 0.0;
        self.t_origin = 0.0;
    }

    /// The absolute time at which the object should next be woken up by the
    /// expiry thread: `t_origin + ttl + grace + keep`.
    ///
    /// # Panics
    ///
    /// Panics if the result is not finite. A corrupt object that would
    /// yield NaN or infinity is an invariant violation, not a condition the
    /// engine can recover from.
    pub fn wake_when(&self) -> f64 {
        let when = self.t_origin + self.ttl + self.grace + self.keep;
        assert!(when.is_finite(), "exp_when produced a non-finite wake time: {when}");
        when
    }

    /// The effective TTL deadline for a request, taking an optional
    /// positive per-request override into account: `t_origin +
    /// min(ttl, req_ttl)` when `req_ttl` is `Some` and positive and smaller
    /// than `ttl`, else `t_origin + ttl`.
    pub fn effective_ttl(&self, req_ttl: Option<f64>) -> f64 {
        let mut r = self.ttl;
        if let Some(d) = req_ttl {
            if d > 0.0 && d < r {
                r = d;
            }
        }
        self.t_origin + r
    }
}

#[derive(Debug)]
struct LruLinks {
    prev: Option<Weak<ObjCore>>,
    next: Option<Arc<ObjCore>>,
}

impl Default for LruLinks {
    fn default() -> Self {
        Self { prev: None, next: None }
    }
}

/// The engine's per-object descriptor (the spec's "handle", C1).
///
/// Carries expiry metadata, flag bits, LRU linkage and the heap index. The
/// back pointer to the underlying object and its hash bucket is, in this
/// out-of-scope-collaborator rewrite, reduced to an opaque `id` used only
/// for log correlation (see `SPEC_FULL.md` §3 "Identity").
#[derive(Debug)]
pub struct ObjCore {
    pub id: u64,

    pub exp: Mutex<Exp>,

    refcnt: AtomicUsize,
    timer_when: AtomicU64,
    timer_idx: AtomicUsize,
    last_lru: AtomicU64,
    flags: AtomicU8,

    lru: Mutex<Weak<Lru>>,
    links: Mutex<LruLinks>,

    /// Stand-in for the hash store's per-bucket mutex (out of scope; see
    /// `hashstore.rs`). Real Varnish buckets cover many objects, but since
    /// the hash store here is a minimal stand-in, one mutex per handle is
    /// an acceptable simplification — noted in DESIGN.md.
    pub(crate) bucket: Mutex<()>,
}

impl ObjCore {
    /// Creates a new handle with `refcnt == 1` (the engine's own reference,
    /// per invariant 4) and `OFFLRU` set (it is not yet linked anywhere).
    pub fn new(id: u64, exp: Exp, lru: Weak<Lru>) -> Arc<Self> {
        Arc::new(Self {
            id,
            exp: Mutex::new(exp),
            refcnt: AtomicUsize::new(1),
            timer_when: AtomicU64::new(0),
            timer_idx: AtomicUsize::new(NO_IDX),
            last_lru: AtomicU64::new(0),
            flags: AtomicU8::new(Flags::OFFLRU.bits()),
            lru: Mutex::new(lru),
            links: Mutex::new(LruLinks::default()),
            bucket: Mutex::new(()),
        })
    }

    pub fn lru(&self) -> Option<Arc<Lru>> {
        self.lru.lock().upgrade()
    }

    pub(crate) fn set_lru(&self, lru: Weak<Lru>) {
        *self.lru.lock() = lru;
    }

    pub fn flags(&self) -> Flags {
        Flags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Sets and clears bits in one step, returning the flags as observed
    /// just before the update (mirrors a C `flags = oc->flags; oc->flags
    /// |= set; oc->flags &= ~clear;` sequence). Callers are expected to
    /// already hold the owning LRU's mutex; see the module docs on
    /// `Flags`.
    pub(crate) fn set_flags(&self, set: Flags, clear: Flags) -> Flags {
        let mut cur = self.flags.load(Ordering::Acquire);
        loop {
            let next = (cur | set.bits()) & !clear.bits();
            match self.flags.compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Flags::from_bits_truncate(cur),
                Err(observed) => cur = observed,
            }
        }
    }

    pub fn timer_when(&self) -> f64 {
        f64::from_bits(self.timer_when.load(Ordering::Acquire))
    }

    pub(crate) fn set_timer_when(&self, when: f64) {
        self.timer_when.store(when.to_bits(), Ordering::Release);
    }

    pub fn timer_idx(&self) -> usize {
        self.timer_idx.load(Ordering::Acquire)
    }

    pub(crate) fn set_timer_idx(&self, idx: usize) {
        self.timer_idx.store(idx, Ordering::Release);
    }

    pub fn is_in_heap(&self) -> bool {
        self.timer_idx() != NO_IDX
    }

    pub fn last_lru(&self) -> f64 {
        f64::from_bits(self.last_lru.load(Ordering::Acquire))
    }

    pub(crate) fn set_last_lru(&self, now: f64) {
        self.last_lru.store(now.to_bits(), Ordering::Release);
    }

    pub fn refcnt(&self) -> usize {
        self.refcnt.load(Ordering::Acquire)
    }

    /// Acquires one more reference. Mirrors `HSH_Ref`.
    pub(crate) fn inc_refcnt(&self) -> usize {
        self.refcnt.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Releases one reference. Mirrors `HSH_DerefObjCore`; returns `true`
    /// if this was the last reference.
    pub(crate) fn dec_refcnt(&self) -> bool {
        self.refcnt.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn link_prev(&self) -> Option<Weak<ObjCore>> {
        self.links.lock().prev.clone()
    }

    pub(crate) fn link_next(&self) -> Option<Arc<ObjCore>> {
        self.links.lock().next.clone()
    }

    pub(crate) fn set_link_prev(&self, prev: Option<Weak<ObjCore>>) {
        self.links.lock().prev = prev;
    }

    pub(crate) fn set_link_next(&self, next: Option<Arc<ObjCore>>) {
        self.links.lock().next = next;
    }

    pub(crate) fn clear_links(&self) {
        let mut links = self.links.lock();
        links.prev = None;
        links.next = None;
    }
}
