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
    atomic::{AtomicUsize, Ordering},
    Arc, Weak,
};

use parking_lot::Mutex;

use crate::{flags::Flags, handle::ObjCore, metrics::Metrics};

struct LruInner {
    head: Option<Arc<ObjCore>>,
    tail: Option<Weak<ObjCore>>,
}

/// A per-storage partition's LRU list (C2): a mutex-guarded,
/// insertion-ordered doubly linked list of live, on-list handles.
///
/// Nodes are linked intrusively on [`ObjCore`] itself (a forward strong
/// `Arc` and a backward `Weak`), so splicing a known node out is O(1): no
/// traversal is needed given the handle itself.
#[derive(Debug)]
pub struct Lru {
    inner: Mutex<LruInner>,
    /// Handles this LRU is responsible for, whether currently linked or
    /// temporarily off-list pending inbox processing. Distinct from the
    /// linked-list length: an admitted-but-not-yet-relinked handle counts
    /// here before it is ever spliced in.
    n_objcore: AtomicUsize,
    /// Disables the `Touch` fast path, for storage backends (e.g.
    /// persistent ones) that do not benefit from recency reordering.
    dontmove: bool,
}

impl std::fmt::Debug for LruInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruInner")
            .field("head", &self.head.as_ref().map(|h| h.id))
            .finish()
    }
}

impl Lru {
    pub fn new(dontmove: bool) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(LruInner { head: None, tail: None }),
            n_objcore: AtomicUsize::new(0),
            dontmove,
        })
    }

    pub fn dontmove(&self) -> bool {
        self.dontmove
    }

    /// Number of handles this LRU is responsible for (on-list or
    /// temporarily off-list), mirroring the original's `lru->n_objcore`.
    pub fn n_objcore(&self) -> usize {
        self.n_objcore.load(Ordering::Acquire)
    }

    /// Iterates the linked list head-to-tail, mainly for tests and
    /// diagnostics. Not used on any hot path.
    pub fn ids(&self) -> Vec<u64> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        let mut cur = inner.head.clone();
        while let Some(node) = cur {
            out.push(node.id);
            cur = node.link_next();
        }
        out
    }

    /// Admits a handle to this LRU: takes the LRU mutex, bumps
    /// `n_objcore`, and sets `set` flags (always including `OFFLRU`) on
    /// the handle — all under the same critical section, matching
    /// `EXP_Insert`/`EXP_Inject`'s `Lck_Lock(&lru->mtx); lru->n_objcore++;
    /// oc->flags |= ...; Lck_Unlock(...)`.
    pub(crate) fn admit(&self, oc: &ObjCore, set: Flags) {
        let _guard = self.inner.lock();
        self.n_objcore.fetch_add(1, Ordering::AcqRel);
        oc.set_flags(set | Flags::OFFLRU, Flags::empty());
    }

    /// Links a handle at the tail. The caller must hold no other lock on
    /// this LRU and the handle must not already be linked.
    pub(crate) fn insert_tail(&self, oc: &Arc<ObjCore>) {
        let mut inner = self.inner.lock();
        self.insert_tail_locked(&mut inner, oc);
    }

    fn insert_tail_locked(&self, inner: &mut LruInner, oc: &Arc<ObjCore>) {
        oc.set_link_prev(inner.tail.clone());
        oc.set_link_next(None);
        match inner.tail.as_ref().and_then(Weak::upgrade) {
            Some(old_tail) => old_tail.set_link_next(Some(oc.clone())),
            None => inner.head = Some(oc.clone()),
        }
        inner.tail = Some(Arc::downgrade(oc));
    }

    /// Splices a known, currently-linked node out. O(1): no traversal.
    pub(crate) fn unlink(&self, oc: &Arc<ObjCore>) {
        let mut inner = self.inner.lock();
        self.unlink_locked(&mut inner, oc);
    }

    fn unlink_locked(&self, inner: &mut LruInner, oc: &Arc<ObjCore>) {
        let prev = oc.link_prev().and_then(|w| w.upgrade());
        let next = oc.link_next();
        match (prev, next) {
            (Some(p), Some(n)) => {
                p.set_link_next(Some(n.clone()));
                n.set_link_prev(Some(Arc::downgrade(&p)));
            }
            (Some(p), None) => {
                p.set_link_next(None);
                inner.tail = Some(Arc::downgrade(&p));
            }
            (None, Some(n)) => {
                n.set_link_prev(None);
                inner.head = Some(n);
            }
            (None, None) => {
                inner.head = None;
                inner.tail = None;
            }
        }
        oc.clear_links();
    }

    /// Marks a handle as permanently released from this LRU's bookkeeping
    /// once the expiry thread has finished dereferencing it. The single
    /// place `n_objcore` is decremented.
    pub(crate) fn forget(&self) {
        let _guard = self.inner.lock();
        self.n_objcore.fetch_sub(1, Ordering::AcqRel);
    }

    /// Drains the inbox-processing flags off a handle and, unless it is
    /// `DYING`, relinks it at the tail. Mirrors the first step of
    /// `exp_inbox`: snapshot flags, clear `INSERT | MOVE | OFFLRU`, update
    /// `last_lru`, relink if still live — all under one critical section.
    /// Returns the flags as observed before the clear, so the caller knows
    /// which heap operation to apply.
    pub(crate) fn drain_inbox_flags(&self, oc: &Arc<ObjCore>, now: f64) -> Flags {
        let mut inner = self.inner.lock();
        let flags = oc.set_flags(Flags::empty(), Flags::INSERT | Flags::MOVE | Flags::OFFLRU);
        debug_assert!(flags.contains(Flags::OFFLRU), "handle {} reached the inbox without OFFLRU set", oc.id);
        oc.set_last_lru(now);
        if !flags.contains(Flags::DYING) {
            self.insert_tail_locked(&mut inner, oc);
        }
        flags
    }

    /// Marks a handle `DYING` (or `MOVE`) for `Rearm`, unlinking it from
    /// this LRU if it is the one taking ownership. Returns whether the
    /// caller now owns mailing the handle: `false` means another in-flight
    /// operation already claimed it (`OFFLRU` was already set), and the
    /// newly set flag will be picked up whenever that operation's inbox
    /// entry is processed. Mirrors the locked section of `EXP_Rearm`.
    pub(crate) fn claim_for_rearm(&self, oc: &Arc<ObjCore>, set: Flags) -> bool {
        let mut inner = self.inner.lock();
        let prev = oc.set_flags(set, Flags::empty());
        if prev.contains(Flags::OFFLRU) {
            false
        } else {
            oc.set_flags(Flags::OFFLRU, Flags::empty());
            self.unlink_locked(&mut inner, oc);
            true
        }
    }

    /// Marks the heap root `DYING` and unlinks it, unless another path has
    /// already taken it off this LRU. Mirrors the locked section of
    /// `exp_expire`'s reclaim step. Returns whether the caller now owns
    /// the handle.
    pub(crate) fn claim_for_expiry(&self, oc: &Arc<ObjCore>) -> bool {
        let mut inner = self.inner.lock();
        let prev = oc.set_flags(Flags::DYING, Flags::empty());
        if prev.contains(Flags::OFFLRU) {
            false
        } else {
            oc.set_flags(Flags::OFFLRU, Flags::empty());
            self.unlink_locked(&mut inner, oc);
            true
        }
    }

    /// Walks head-to-tail picking the first handle satisfying `¬DYING`,
    /// `¬BUSY`, `refcnt == 1`, and whose bucket lock is free, marks it
    /// `DYING | OFFLRU`, bumps its reference count (the nuker needs its
    /// own reference while freeing storage), and unlinks it. Mirrors the
    /// walk-and-claim section of `EXP_NukeOne`.
    pub(crate) fn find_and_mark_dying<HS: crate::hashstore::HashStore>(&self, hash_store: &HS) -> Option<Arc<ObjCore>> {
        let mut inner = self.inner.lock();
        let mut cur = inner.head.clone();
        while let Some(node) = cur {
            debug_assert!(!node.flags().contains(Flags::DYING), "DYING handle {} still linked on LRU", node.id);
            let skip = node.flags().contains(Flags::BUSY) || node.refcnt() > 1;
            if !skip {
                if let Some(_bucket) = hash_store.bucket_try_lock(&node) {
                    if node.refcnt() == 1 {
                        node.set_flags(Flags::DYING | Flags::OFFLRU, Flags::empty());
                        node.inc_refcnt();
                        self.unlink_locked(&mut inner, &node);
                        return Some(node);
                    }
                }
            }
            cur = node.link_next();
        }
        None
    }

    /// Takes the LRU's internal lock, for tests exercising `Touch`'s
    /// try-lock contention path.
    #[cfg(test)]
    pub(crate) fn lock_for_test(&self) -> parking_lot::MutexGuard<'_, LruInner> {
        self.inner.lock()
    }

    /// Best-effort promotion to the tail, mirroring `EXP_Touch`.
    ///
    /// The try-lock is deliberate: contention with bulk nukes or inbox
    /// processing must not slow down request threads. Returns `false`
    /// when the move was skipped (either `DONTMOVE` is set, or the lock
    /// was contended); returns `true` whenever the lock was acquired,
    /// whether or not the handle actually needed moving (it may currently
    /// be `OFFLRU`, owned by another in-flight operation).
    pub fn touch(&self, oc: &Arc<ObjCore>, metrics: &Metrics) -> bool {
        if self.dontmove {
            return false;
        }
        let Some(mut inner) = self.inner.try_lock() else {
            return false;
        };
        if !oc.flags().contains(Flags::OFFLRU) {
            self.unlink_locked(&mut inner, oc);
            self.insert_tail_locked(&mut inner, oc);
            metrics.inc_lru_moved();
        }
        true
    }
}
