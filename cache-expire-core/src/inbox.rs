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

use std::{collections::VecDeque, sync::Arc, time::Duration, time::Instant};

use parking_lot::{Condvar, Mutex};

use crate::{flags::Flags, handle::ObjCore};

/// The single global FIFO serializing heap-level mutations into the
/// expiry thread (C4). Dying handles jump the queue: they're inserted at
/// the head instead of the tail, expediting reclamation.
#[derive(Debug, Default)]
pub struct Inbox {
    queue: Mutex<VecDeque<Arc<ObjCore>>>,
    condvar: Condvar,
}

impl Inbox {
    pub fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()), condvar: Condvar::new() }
    }

    /// Posts a handle to the inbox. The handle must already be `OFFLRU`
    /// (the caller has taken it off its LRU and flagged its intent before
    /// mailing it).
    pub fn mail(&self, oc: Arc<ObjCore>) {
        debug_assert!(oc.flags().contains(Flags::OFFLRU), "mailed a handle that is still on its LRU");
        let mut queue = self.queue.lock();
        if oc.flags().contains(Flags::DYING) {
            queue.push_front(oc);
        } else {
            queue.push_back(oc);
        }
        self.condvar.notify_one();
    }

    /// Dequeues the head of the inbox, if any, without blocking.
    pub fn try_recv(&self) -> Option<Arc<ObjCore>> {
        self.queue.lock().pop_front()
    }

    /// Waits for either a handle to arrive, or `deadline` to pass,
    /// whichever comes first. Returns the handle if one arrived.
    ///
    /// Mirrors the original's `Lck_CondWait(&ep->condvar, &ep->mtx, &ts)`
    /// absolute-deadline wait.
    pub fn recv_until(&self, deadline: Instant) -> Option<Arc<ObjCore>> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(oc) = queue.pop_front() {
                return Some(oc);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let timeout = deadline - now;
            let result = self.condvar.wait_for(&mut queue, timeout.min(Duration::from_secs(10)));
            if result.timed_out() && Instant::now() >= deadline {
                return queue.pop_front();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Wakes a thread parked in [`Self::recv_until`] without enqueueing
    /// anything. Used only to unstick the expiry thread on shutdown.
    pub(crate) fn wake(&self) {
        let _guard = self.queue.lock();
        self.condvar.notify_all();
    }
}
