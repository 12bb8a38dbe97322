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

//! Shared primitives used by every `cache-expire-*` crate: the typed error
//! enum and the wall-clock abstraction that lets the engine and its tests
//! agree on what time it is without actually sleeping.

pub mod clock;
pub mod error;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
