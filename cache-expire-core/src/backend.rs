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

//! The storage backend is an out-of-scope external collaborator
//! (`spec.md` §1): it owns the object's bytes. `get_lru`/`get_object` from
//! `spec.md` §6 are, in this rewrite, plain accessors on [`ObjCore`]
//! itself rather than a trait round-trip — see `SPEC_FULL.md` §6.

use std::sync::Arc;

use crate::handle::ObjCore;

/// Persistence hooks the engine delegates to, per `spec.md` §6
/// ("Consumed (from storage backend)").
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Pushes the handle's current `timer_when` to the backing store.
    /// Mirrors `oc_updatemeta`.
    fn persist_metadata(&self, oc: &Arc<ObjCore>);

    /// Releases the storage extents backing this object. Mirrors
    /// `STV_Freestore`.
    fn free_storage(&self, oc: &Arc<ObjCore>);
}

/// A backend that does nothing, for tests and the end-to-end demo binary
/// where there is no real storage tier to persist to or free.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn persist_metadata(&self, _oc: &Arc<ObjCore>) {}
    fn free_storage(&self, _oc: &Arc<ObjCore>) {}
}
