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

//! The expiry and LRU engine: a time-ordered heap of cached-object
//! handles (C1), per-storage LRU lists (C2), a global min-heap of wake
//! times (C3), a single-consumer inbox (C4), and the background expiry
//! thread that drains them (C5).

pub mod backend;
pub mod engine;
pub mod flags;
pub mod handle;
pub mod hashstore;
pub mod heap;
pub mod inbox;
pub mod lru;
pub mod metrics;

pub use backend::{Backend, NullBackend};
pub use engine::{Engine, EngineConfig, NukeOutcome};
pub use flags::Flags;
pub use handle::{Exp, ObjCore, NO_IDX};
pub use hashstore::{BucketGuard, HashStore, InProcessHashStore};
pub use heap::TimerHeap;
pub use inbox::Inbox;
pub use lru::Lru;
pub use metrics::Metrics;
