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

//! The expiry thread (C5) and the five request-facing operations
//! (`Insert`/`Inject`/`Touch`/`Rearm`/`NukeOne`). This is the module that
//! ties C1-C4 together; see `spec.md` §4.5/§4.6.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use cache_expire_common::Clock;

use crate::{
    backend::{Backend, NullBackend},
    flags::Flags,
    handle::{Exp, ObjCore},
    hashstore::{HashStore, InProcessHashStore},
    heap::TimerHeap,
    lru::Lru,
    metrics::Metrics,
};

/// The idle sleep the expiry thread takes when the heap is empty. An
/// arbitrary moderate value in `[1, 10]` seconds; `355/113` (an
/// approximation of pi) is kept because the source uses it and nothing
/// about it is load-bearing — see `SPEC_FULL.md` §4.6 and `DESIGN.md`.
const IDLE_SLEEP_SECS: f64 = 355.0 / 113.0;

/// Retry delay when the heap root is `BUSY`: the object is still being
/// populated and cannot be expired yet.
const BUSY_RETRY_SECS: f64 = 0.01;

/// Retry delay when `process_expiry` loses a race to claim the heap root
/// (another path already set `OFFLRU`).
const OFFLRU_RACE_RETRY_SECS: f64 = 1e-3;

/// Tunables for the background expiry thread. All three retry/sleep
/// values have `Default` impls matching the constants above; exposed so
/// tests can shrink them without touching engine logic.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub idle_sleep: Duration,
    pub busy_retry: Duration,
    pub offlru_race_retry: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_secs_f64(IDLE_SLEEP_SECS),
            busy_retry: Duration::from_secs_f64(BUSY_RETRY_SECS),
            offlru_race_retry: Duration::from_secs_f64(OFFLRU_RACE_RETRY_SECS),
        }
    }
}

/// The outcome of `NukeOne`. Collapses the source's three-way
/// `{1, 0, -1}` return into two cases: see `SPEC_FULL.md` §7 for why
/// `0`/"didn't" and `-1`/"can't" are not kept distinct here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NukeOutcome {
    Nuked,
    NoCandidate,
}

/// The expiry and LRU engine (C5), generic over its three out-of-scope
/// collaborators so tests can substitute fakes without touching engine
/// logic, the way `foyer_memory::GenericCache` is generic over its
/// `Indexer`/`Eviction`/`Listener` type parameters.
pub struct Engine<H = InProcessHashStore, B = NullBackend, C = cache_expire_common::SystemClock>
where
    H: HashStore,
    B: Backend,
    C: Clock,
{
    config: EngineConfig,
    hash_store: H,
    backend: B,
    clock: C,
    inbox: crate::inbox::Inbox,
    metrics: Metrics,
    next_id: AtomicU64,
    shutdown: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<H, B, C> fmt::Debug for Engine<H, B, C>
where
    H: HashStore,
    B: Backend,
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("config", &self.config).field("metrics", &self.metrics).finish()
    }
}

impl<H, B, C> Engine<H, B, C>
where
    H: HashStore,
    B: Backend,
    C: Clock,
{
    /// Builds an engine without starting its background thread. Mainly
    /// useful for tests that drive `process_inbox`/`process_expiry`
    /// directly against an explicit `TimerHeap`.
    pub fn new(config: EngineConfig, hash_store: H, backend: B, clock: C) -> Arc<Self> {
        Arc::new(Self {
            config,
            hash_store,
            backend,
            clock,
            inbox: crate::inbox::Inbox::new(),
            metrics: Metrics::new(),
            next_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            thread: Mutex::new(None),
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn inbox(&self) -> &crate::inbox::Inbox {
        &self.inbox
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Admits a newly fetched object into the engine. Mirrors
    /// `EXP_Insert(o, now)`.
    ///
    /// `now` is caller-supplied (not read from the engine's clock) so that
    /// a caller already holding a fresh timestamp doesn't pay for a second
    /// one, matching the source's signature.
    pub fn insert(&self, exp: Exp, lru: &Arc<Lru>, now: f64) -> Arc<ObjCore> {
        assert!(exp.t_origin != 0.0 && exp.t_origin.is_finite(), "t_origin must be finite and non-zero on insert");

        // `ObjCore::new` already sets `refcnt = 1`, the engine's sole
        // reference (invariant 4). Unlike a real hash store's `Ref`, which
        // would be handing a *new* reference to a caller, nothing here
        // hands the handle to anyone else yet, so there is nothing to
        // `ref_` — matching `inject`, which also does not re-ref.
        let oc = ObjCore::new(self.alloc_id(), exp, Arc::downgrade(lru));

        oc.set_last_lru(now);
        lru.admit(&oc, Flags::INSERT);

        let when = exp.wake_when();
        oc.set_timer_when(when);
        self.backend.persist_metadata(&oc);

        self.metrics.inc_inserted();
        self.inbox.mail(oc.clone());
        oc
    }

    /// Admits a handle the caller already owns a reference to, with a
    /// caller-supplied wake time. Mirrors `EXP_Inject(oc, lru, when)`. Does
    /// not call `hash_store.ref_`: unlike `Insert`, the caller is handing
    /// ownership over, not asking the engine to share it.
    pub fn inject(&self, oc: Arc<ObjCore>, lru: &Arc<Lru>, when: f64, now: f64) -> Arc<ObjCore> {
        oc.set_lru(Arc::downgrade(lru));
        oc.set_last_lru(now);
        lru.admit(&oc, Flags::INSERT);
        oc.set_timer_when(when);

        self.metrics.inc_inserted();
        self.inbox.mail(oc.clone());
        oc
    }

    /// Best-effort promotion to the tail of the handle's owning LRU.
    /// Mirrors `EXP_Touch`.
    pub fn touch(&self, oc: &Arc<ObjCore>) -> bool {
        let Some(lru) = oc.lru() else { return false };
        lru.touch(oc, &self.metrics)
    }

    /// Re-evaluates a handle's wake time after its expiry attributes
    /// changed. Mirrors `EXP_Rearm`.
    pub fn rearm(&self, oc: &Arc<ObjCore>) {
        let when = oc.exp.lock().wake_when();
        if when == oc.timer_when() {
            return;
        }

        let Some(lru) = oc.lru() else {
            tracing::trace!(target: "cache_expire", handle = oc.id, "rearm: handle has no owning LRU, ignoring");
            return;
        };

        let set = if when < 0.0 { Flags::DYING } else { Flags::MOVE };
        oc.set_timer_when(when);

        let owned = lru.claim_for_rearm(oc, set);
        tracing::trace!(target: "cache_expire", handle = oc.id, when, owned, flags = ?oc.flags(), "rearm");
        if owned {
            if set == Flags::MOVE {
                self.metrics.inc_rearmed();
            }
            self.inbox.mail(oc.clone());
        }
    }

    /// Attempts to reclaim one handle from `lru` to free space. Mirrors
    /// `EXP_NukeOne`.
    pub fn nuke_one(&self, lru: &Arc<Lru>) -> NukeOutcome {
        let Some(victim) = lru.find_and_mark_dying(&self.hash_store) else {
            tracing::trace!(target: "cache_expire", "nuke_one: no candidate in LRU");
            return NukeOutcome::NoCandidate;
        };

        self.backend.free_storage(&victim);
        self.inbox.mail(victim.clone());
        tracing::debug!(target: "cache_expire", handle = victim.id, "nuke_one: nuked");
        self.hash_store.deref(&victim);
        self.metrics.inc_lru_nuked();
        NukeOutcome::Nuked
    }

    /// Applies one inbox entry's intent to the heap. Mirrors
    /// `exp_inbox`/the body of the expiry thread's non-idle branch.
    fn process_inbox(&self, heap: &mut TimerHeap, oc: Arc<ObjCore>, now: f64) {
        let Some(lru) = oc.lru() else {
            panic!("process_inbox: handle {} has no owning LRU", oc.id);
        };

        let flags = lru.drain_inbox_flags(&oc, now);
        tracing::trace!(target: "cache_expire", handle = oc.id, when = oc.timer_when(), ?flags, "EXP_INBOX");

        if flags.contains(Flags::DYING) {
            debug_assert!(oc.is_in_heap(), "DYING handle {} missing from the heap", oc.id);
            heap.delete(oc.timer_idx());
            self.hash_store.deref(&oc);
            lru.forget();
            return;
        }

        if flags.contains(Flags::MOVE) {
            let when = oc.exp.lock().wake_when();
            oc.set_timer_when(when);
            self.backend.persist_metadata(&oc);
        }
        tracing::trace!(target: "cache_expire", handle = oc.id, when = oc.timer_when(), "EXP_WHEN");

        if flags.contains(Flags::INSERT) {
            heap.insert(oc);
        } else if flags.contains(Flags::MOVE) {
            heap.reorder(oc.timer_idx());
        } else {
            unreachable!("handle {} reached the inbox with neither INSERT, MOVE nor DYING set", oc.id);
        }
    }

    /// Services the heap root, if due. Mirrors `exp_expire`. Returns the
    /// next wall-clock time the caller should sleep until (`0.0` meaning
    /// "poll again immediately").
    fn process_expiry(&self, heap: &mut TimerHeap, now: f64) -> f64 {
        let Some(oc) = heap.root() else {
            return now + self.config.idle_sleep.as_secs_f64();
        };
        if oc.timer_when() > now {
            return oc.timer_when();
        }
        if oc.flags().contains(Flags::BUSY) {
            return now + self.config.busy_retry.as_secs_f64();
        }

        self.metrics.inc_expired();

        let Some(lru) = oc.lru() else {
            panic!("process_expiry: handle {} has no owning LRU", oc.id);
        };
        if !lru.claim_for_expiry(&oc) {
            return now + self.config.offlru_race_retry.as_secs_f64();
        }

        heap.delete(oc.timer_idx());

        let age = now - oc.exp.lock().effective_ttl(None);
        tracing::debug!(target: "cache_expire", handle = oc.id, age, "ExpKill");

        self.hash_store.deref(&oc);
        lru.forget();
        0.0
    }

    /// The expiry thread's body: drains the inbox one entry at a time,
    /// falling back to servicing the heap root when the inbox is empty.
    /// Mirrors the loop in `exp_thread`.
    fn run(self: Arc<Self>) {
        let mut heap = TimerHeap::new();
        let mut t = 0.0_f64;
        let mut tnext = 0.0_f64;

        while !self.shutdown.load(Ordering::Acquire) {
            let oc = if tnext > t {
                let sleep = (tnext - t).clamp(0.0, 10.0);
                self.inbox.recv_until(Instant::now() + Duration::from_secs_f64(sleep))
            } else {
                self.inbox.try_recv()
            };

            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            t = self.clock.now();
            match oc {
                Some(oc) => {
                    self.process_inbox(&mut heap, oc, t);
                    tnext = 0.0;
                }
                None => tnext = self.process_expiry(&mut heap, t),
            }
        }
    }

    /// Requests the background thread stop and blocks until it has. Not
    /// required by the core contract (`spec.md` §5: "cancellation: none"),
    /// but a real process wants clean teardown in its own test suite and
    /// on `Drop`, so it's added as an operational nicety rather than a
    /// behavior the documented operations depend on.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.inbox.wake();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl<H, B, C> Engine<H, B, C>
where
    H: HashStore + Send + Sync + 'static,
    B: Backend + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Builds an engine and starts its background expiry thread.
    pub fn start(config: EngineConfig, hash_store: H, backend: B, clock: C) -> Arc<Self> {
        let engine = Self::new(config, hash_store, backend, clock);
        let bg = Arc::clone(&engine);
        let handle = thread::Builder::new()
            .name("cache-expire".into())
            .spawn(move || bg.run())
            .expect("failed to spawn the expiry thread");
        *engine.thread.lock() = Some(handle);
        engine
    }
}

impl<H, B, C> Drop for Engine<H, B, C>
where
    H: HashStore,
    B: Backend,
    C: Clock,
{
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.inbox.wake();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{backend::NullBackend, hashstore::InProcessHashStore};

    /// A clock whose value is set explicitly by the test, so scenarios
    /// from `spec.md` §8 can be driven at exact wall-clock instants
    /// without sleeping.
    #[derive(Debug, Clone, Default)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn at(now: f64) -> Self {
            let c = Self(Arc::new(AtomicU64::new(0)));
            c.set(now);
            c
        }

        fn set(&self, now: f64) {
            self.0.store(now.to_bits(), Ordering::Release);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> f64 {
            f64::from_bits(self.0.load(Ordering::Acquire))
        }
    }

    fn engine() -> Arc<Engine<InProcessHashStore, NullBackend, ManualClock>> {
        Engine::new(EngineConfig::default(), InProcessHashStore, NullBackend, ManualClock::at(1000.0))
    }

    #[test_log::test]
    fn basic_expiry_fires_at_the_computed_wake_time() {
        let engine = engine();
        let lru = Lru::new(false);
        let mut heap = TimerHeap::new();

        let a = engine.insert(Exp::new(1000.0, 5.0, 0.0, 0.0), &lru, 1000.0);
        let oc = engine.inbox.try_recv().unwrap();
        assert_eq!(oc.id, a.id);
        engine.process_inbox(&mut heap, oc, 1000.0);

        assert_eq!(engine.process_expiry(&mut heap, 1004.9), 1005.0);
        assert_eq!(engine.metrics().expired.load(Ordering::Relaxed), 0);

        assert_eq!(engine.process_expiry(&mut heap, 1005.0), 0.0);
        assert_eq!(engine.metrics().expired.load(Ordering::Relaxed), 1);
        assert_eq!(a.refcnt(), 0);
        assert!(heap.is_empty());
    }

    #[test_log::test]
    fn rearm_shortens_the_wake_time_and_reorders_the_heap() {
        let engine = engine();
        let lru = Lru::new(false);
        let mut heap = TimerHeap::new();

        let a = engine.insert(Exp::new(1000.0, 100.0, 0.0, 0.0), &lru, 1000.0);
        assert_eq!(a.timer_when(), 1100.0);
        engine.process_inbox(&mut heap, engine.inbox.try_recv().unwrap(), 1000.0);

        *a.exp.lock() = Exp::new(1000.0, 50.0, 0.0, 0.0);
        engine.rearm(&a);
        assert_eq!(a.timer_when(), 1050.0);

        let mailed = engine.inbox.try_recv().unwrap();
        assert_eq!(mailed.id, a.id);
        engine.process_inbox(&mut heap, mailed, 1001.0);

        assert_eq!(engine.process_expiry(&mut heap, 1049.9), 1050.0);
        assert_eq!(engine.process_expiry(&mut heap, 1050.0), 0.0);
    }

    #[test_log::test]
    fn dying_handles_jump_the_inbox_queue() {
        let engine = engine();
        let lru = Lru::new(false);

        let a = engine.insert(Exp::new(1000.0, 100.0, 0.0, 0.0), &lru, 1000.0);
        let b = engine.insert(Exp::new(1000.0, 200.0, 0.0, 0.0), &lru, 1000.0);
        assert_eq!(engine.inbox.try_recv().unwrap().id, a.id);

        let c = engine.insert(Exp::new(1000.0, -1.0, 0.0, 0.0), &lru, 1000.0);
        let c_mail = engine.inbox.try_recv().unwrap();
        c_mail.set_flags(Flags::DYING, Flags::empty());
        engine.inbox.mail(c_mail);

        assert_eq!(engine.inbox.try_recv().unwrap().id, c.id);
        assert_eq!(engine.inbox.try_recv().unwrap().id, b.id);
    }

    #[test_log::test]
    fn nuke_one_picks_the_head_of_the_lru() {
        let engine = engine();
        let lru = Lru::new(false);
        let mut heap = TimerHeap::new();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let h = engine.insert(Exp::new(1000.0, 50.0, 0.0, 0.0), &lru, 1000.0);
            engine.process_inbox(&mut heap, engine.inbox.try_recv().unwrap(), 1000.0);
            handles.push(h);
        }
        assert_eq!(lru.ids(), vec![handles[0].id, handles[1].id, handles[2].id]);

        assert_eq!(engine.nuke_one(&lru), NukeOutcome::Nuked);
        assert_eq!(lru.ids(), vec![handles[1].id, handles[2].id]);

        assert_eq!(engine.nuke_one(&lru), NukeOutcome::Nuked);
        assert_eq!(lru.ids(), vec![handles[2].id]);
        assert_eq!(engine.metrics().lru_nuked.load(Ordering::Relaxed), 2);
    }

    #[test_log::test]
    fn nuke_one_skips_a_busy_handle() {
        let engine = engine();
        let lru = Lru::new(false);
        let mut heap = TimerHeap::new();

        let a = engine.insert(Exp::new(1000.0, 50.0, 0.0, 0.0), &lru, 1000.0);
        engine.process_inbox(&mut heap, engine.inbox.try_recv().unwrap(), 1000.0);
        a.set_flags(Flags::BUSY, Flags::empty());

        let b = engine.insert(Exp::new(1000.0, 50.0, 0.0, 0.0), &lru, 1000.0);
        engine.process_inbox(&mut heap, engine.inbox.try_recv().unwrap(), 1000.0);

        assert_eq!(engine.nuke_one(&lru), NukeOutcome::Nuked);
        assert_eq!(lru.ids(), vec![a.id]);
    }

    #[test_log::test]
    fn nuke_one_returns_no_candidate_on_an_empty_lru() {
        let engine = engine();
        let lru = Lru::new(false);
        assert_eq!(engine.nuke_one(&lru), NukeOutcome::NoCandidate);
    }

    #[test_log::test]
    fn touch_is_rate_limited_by_contention() {
        let engine = engine();
        let lru = Lru::new(false);
        let mut heap = TimerHeap::new();

        let a = engine.insert(Exp::new(1000.0, 50.0, 0.0, 0.0), &lru, 1000.0);
        engine.process_inbox(&mut heap, engine.inbox.try_recv().unwrap(), 1000.0);

        let guard = lru.lock_for_test();
        assert!(!engine.touch(&a));
        drop(guard);
        assert!(engine.touch(&a));
    }

    #[test_log::test]
    fn insert_then_dying_rearm_removes_and_derefs_exactly_once() {
        let engine = engine();
        let lru = Lru::new(false);
        let mut heap = TimerHeap::new();

        let a = engine.insert(Exp::new(1000.0, 50.0, 0.0, 0.0), &lru, 1000.0);
        engine.process_inbox(&mut heap, engine.inbox.try_recv().unwrap(), 1000.0);
        assert_eq!(a.refcnt(), 1);

        // `t_origin = 0` (i.e. `Exp::clear`'s sentinel) makes `wake_when()`
        // negative regardless of `ttl`, taking `rearm`'s `DYING` branch
        // rather than `MOVE`.
        *a.exp.lock() = Exp::new(0.0, -1.0, 0.0, 0.0);
        engine.rearm(&a);
        let mailed = engine.inbox.try_recv().unwrap();
        assert!(mailed.flags().contains(Flags::DYING));
        engine.process_inbox(&mut heap, mailed, 1001.0);

        assert_eq!(a.refcnt(), 0);
        assert!(!a.is_in_heap());
        assert!(engine.inbox.try_recv().is_none());
    }

    #[test_log::test]
    fn zero_ttl_object_expires_on_the_next_poll_not_during_insert() {
        let engine = engine();
        let lru = Lru::new(false);
        let mut heap = TimerHeap::new();

        let a = engine.insert(Exp::new(1000.0, 0.0, 0.0, 0.0), &lru, 1000.0);
        assert_eq!(a.refcnt(), 1);
        engine.process_inbox(&mut heap, engine.inbox.try_recv().unwrap(), 1000.0);
        assert_eq!(a.refcnt(), 1);

        assert_eq!(engine.process_expiry(&mut heap, 1000.0), 0.0);
        assert_eq!(a.refcnt(), 0);
    }

    #[test_log::test]
    fn background_thread_expires_a_short_lived_handle() {
        let clock = ManualClock::at(1000.0);
        let mut config = EngineConfig::default();
        config.idle_sleep = Duration::from_millis(20);
        let engine = Engine::start(config, InProcessHashStore, NullBackend, clock.clone());
        let lru = Lru::new(false);

        let a = engine.insert(Exp::new(1000.0, 0.01, 0.0, 0.0), &lru, 1000.0);

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            clock.set(1000.02);
            if engine.metrics().expired.load(Ordering::Relaxed) >= 1 {
                break;
            }
            assert!(Instant::now() < deadline, "background thread never expired the handle");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(a.refcnt(), 0);
        engine.shutdown();
    }
}
