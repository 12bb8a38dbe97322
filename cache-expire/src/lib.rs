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

//! `cache-expire` re-exports the workspace's public surface in one place,
//! the way the teacher's top-level `foyer` crate wires `foyer-common`,
//! `foyer-memory` and `foyer-storage` together behind a single facade.
//!
//! The expiry and LRU engine (C1-C5) lives in [`cache_expire_core`]; the
//! shared clock/error types live in [`cache_expire_common`]; the
//! out-of-scope HTTP/1 backend fetch glue lives in [`cache_expire_fetch`].

pub use cache_expire_common::{Clock, Error, Result, SystemClock};
pub use cache_expire_core::{
    Backend, BucketGuard, Engine, EngineConfig, Exp, Flags, HashStore, InProcessHashStore, Inbox, Lru, Metrics,
    NukeOutcome, NullBackend, ObjCore, TimerHeap, NO_IDX,
};
pub use cache_expire_fetch::{fetch_and_admit, FetchConfig, Fetched};
