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

use bitflags::bitflags;

bitflags! {
    /// Per-handle state bits. Mutations always happen while holding the
    /// handle's owning [`crate::lru::Lru`] mutex (see `lru.rs`); the bits
    /// themselves are stored in an `AtomicU8` only so that [`ObjCore`] can
    /// be shared behind an `Arc` across threads, not because the bits are
    /// independently synchronized.
    ///
    /// [`ObjCore`]: crate::handle::ObjCore
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        /// Not linked into any LRU list right now.
        const OFFLRU = 1 << 0;
        /// Pending first heap insertion.
        const INSERT = 1 << 1;
        /// Wake time changed; heap position needs reordering.
        const MOVE   = 1 << 2;
        /// Must be removed from the heap and dereferenced.
        const DYING  = 1 << 3;
        /// Object body is still being populated; must not be evicted or expired.
        const BUSY   = 1 << 4;
    }
}
