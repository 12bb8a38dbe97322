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

use std::sync::Arc;

use crate::handle::{ObjCore, NO_IDX};

/// The single global time-ordered min-heap (C3), keyed by each handle's
/// `timer_when`. Touched only by the expiry thread — no internal locking
/// is needed, mirroring the original's single-threaded `binheap`.
///
/// Backed by a growable `Vec` rather than the original's manually
/// doubled/halved C array (`binheap_new`'s growth factor): `Vec`'s
/// amortized-O(1) push/pop already gives the same asymptotic behaviour,
/// see `SPEC_FULL.md` §4.7.
#[derive(Debug, Default)]
pub struct TimerHeap {
    entries: Vec<Arc<ObjCore>>,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Peeks the handle with the smallest `timer_when`, without removing
    /// it.
    pub fn root(&self) -> Option<Arc<ObjCore>> {
        self.entries.first().cloned()
    }

    /// Inserts a handle not currently in the heap.
    ///
    /// # Panics
    ///
    /// Panics (debug builds) if the handle claims to already be in the
    /// heap; this is an invariant violation, not an operational race
    /// (§8 invariant 1).
    pub fn insert(&mut self, oc: Arc<ObjCore>) {
        debug_assert!(!oc.is_in_heap(), "heap.insert on a handle already in the heap");
        let idx = self.entries.len();
        oc.set_timer_idx(idx);
        self.entries.push(oc);
        self.sift_up(idx);
    }

    /// Removes the handle at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range, or doesn't actually point back at
    /// the handle stored there — both are invariant violations.
    pub fn delete(&mut self, idx: usize) {
        assert!(idx < self.entries.len(), "heap.delete index {idx} out of range");
        let last = self.entries.len() - 1;
        self.entries[idx].set_timer_idx(NO_IDX);
        if idx != last {
            self.entries.swap(idx, last);
            self.entries[idx].set_timer_idx(idx);
        }
        self.entries.pop();
        if idx < self.entries.len() {
            // The element now at `idx` may need to move either way.
            self.sift_down(idx);
            self.sift_up(idx);
        }
    }

    /// Re-establishes heap order for the handle at `idx` after its key
    /// (`timer_when`) changed externally. O(log n): moves only along the
    /// path from `idx` to the root or a leaf.
    pub fn reorder(&mut self, idx: usize) {
        assert!(idx < self.entries.len(), "heap.reorder index {idx} out of range");
        let moved_up = self.sift_up(idx);
        if !moved_up {
            self.sift_down(idx);
        }
    }

    fn sift_up(&mut self, mut idx: usize) -> bool {
        let start = idx;
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.entries[idx].timer_when() < self.entries[parent].timer_when() {
                self.entries.swap(idx, parent);
                self.entries[idx].set_timer_idx(idx);
                self.entries[parent].set_timer_idx(parent);
                idx = parent;
            } else {
                break;
            }
        }
        idx != start
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;
            if left < len && self.entries[left].timer_when() < self.entries[smallest].timer_when() {
                smallest = left;
            }
            if right < len && self.entries[right].timer_when() < self.entries[smallest].timer_when() {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.entries.swap(idx, smallest);
            self.entries[idx].set_timer_idx(idx);
            self.entries[smallest].set_timer_idx(smallest);
            idx = smallest;
        }
    }

    #[cfg(test)]
    fn assert_heap_property(&self) {
        for (i, e) in self.entries.iter().enumerate() {
            assert_eq!(e.timer_idx(), i, "timer_idx out of sync at {i}");
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            if left < self.entries.len() {
                assert!(e.timer_when() <= self.entries[left].timer_when());
            }
            if right < self.entries.len() {
                assert!(e.timer_when() <= self.entries[right].timer_when());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::handle::Exp;

    fn handle(id: u64, when: f64) -> Arc<ObjCore> {
        let oc = ObjCore::new(id, Exp::new(when, 0.0, 0.0, 0.0), Weak::new());
        oc.set_timer_when(when);
        oc
    }

    #[test_log::test]
    fn root_is_always_the_minimum() {
        let mut heap = TimerHeap::new();
        for (id, when) in [(1, 1100.0), (2, 1005.0), (3, 1200.0), (4, 1000.0), (5, 1050.0)] {
            heap.insert(handle(id, when));
        }
        heap.assert_heap_property();
        assert_eq!(heap.root().unwrap().id, 4);
    }

    #[test_log::test]
    fn delete_maintains_heap_property() {
        let mut heap = TimerHeap::new();
        let handles: Vec<_> = [1100.0, 1005.0, 1200.0, 1000.0, 1050.0, 1003.0]
            .into_iter()
            .enumerate()
            .map(|(i, w)| handle(i as u64, w))
            .collect();
        for h in &handles {
            heap.insert(h.clone());
        }
        let victim_idx = handles[2].timer_idx();
        heap.delete(victim_idx);
        heap.assert_heap_property();
        assert_eq!(heap.len(), 5);
        assert!(!handles[2].is_in_heap());
    }

    #[test_log::test]
    fn reorder_after_key_decrease_moves_toward_root() {
        let mut heap = TimerHeap::new();
        for (id, when) in [(1, 1100.0), (2, 1005.0), (3, 1200.0)] {
            heap.insert(handle(id, when));
        }
        let root_before = heap.root().unwrap();
        assert_eq!(root_before.id, 2);

        let h3 = heap.entries.iter().find(|e| e.id == 3).unwrap().clone();
        h3.set_timer_when(900.0);
        heap.reorder(h3.timer_idx());
        heap.assert_heap_property();
        assert_eq!(heap.root().unwrap().id, 3);
    }

    #[test_log::test]
    fn reorder_after_key_increase_moves_away_from_root() {
        let mut heap = TimerHeap::new();
        for (id, when) in [(1, 1000.0), (2, 1100.0), (3, 1200.0)] {
            heap.insert(handle(id, when));
        }
        let h1 = heap.entries.iter().find(|e| e.id == 1).unwrap().clone();
        h1.set_timer_when(1500.0);
        heap.reorder(h1.timer_idx());
        heap.assert_heap_property();
        assert_eq!(heap.root().unwrap().id, 2);
    }
}
