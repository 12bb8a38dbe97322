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

//! The object hash store is an out-of-scope external collaborator
//! (`spec.md` §1): it owns reference counting and per-bucket locking. The
//! engine only ever calls through the [`HashStore`] trait, never a
//! concrete type, so a real hash store can be swapped in without touching
//! `engine.rs`.

use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::handle::ObjCore;

/// Held while a handle's bucket lock is taken. Dropping it releases the
/// lock, mirroring `Lck_Unlock(&oh->mtx)`.
pub struct BucketGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// External reference-counting and bucket-locking primitives the engine
/// relies on, per `spec.md` §6 ("Consumed (from hash store)").
pub trait HashStore: Send + Sync + std::fmt::Debug {
    /// Acquires one reference. Mirrors `HSH_Ref`.
    fn ref_(&self, oc: &Arc<ObjCore>);

    /// Releases one reference, destroying the object if it was the last
    /// one. Mirrors `HSH_DerefObjCore`.
    fn deref(&self, oc: &Arc<ObjCore>);

    /// Attempts to take the handle's bucket lock without blocking.
    /// Mirrors `Lck_Trylock(&oh->mtx)`.
    fn bucket_try_lock<'a>(&self, oc: &'a Arc<ObjCore>) -> Option<BucketGuard<'a>>;
}

/// A minimal, in-process stand-in for a real hash store, sufficient to
/// exercise the engine end to end. Reference counting and bucket locking
/// are delegated straight to the fields [`ObjCore`] already carries for
/// them; see `handle.rs`'s note on why one mutex per handle is an
/// acceptable simplification here.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessHashStore;

impl HashStore for InProcessHashStore {
    fn ref_(&self, oc: &Arc<ObjCore>) {
        oc.inc_refcnt();
    }

    fn deref(&self, oc: &Arc<ObjCore>) {
        oc.dec_refcnt();
    }

    fn bucket_try_lock<'a>(&self, oc: &'a Arc<ObjCore>) -> Option<BucketGuard<'a>> {
        oc.bucket.try_lock().map(|guard| BucketGuard { _guard: guard })
    }
}
