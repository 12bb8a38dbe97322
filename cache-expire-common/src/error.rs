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

use std::io;

/// Errors surfaced by external collaborators (the hash store, the storage
/// backend, the HTTP/1 fetch glue).
///
/// The expiry engine itself never returns this type: its request-facing
/// operations are infallible once their preconditions hold (see
/// `cache-expire-core`'s module docs), and precondition violations are
/// programming errors that panic rather than propagate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("backend fetch failed: {0}")]
    Fetch(#[from] io::Error),

    #[error("object admitted with a non-finite or zero t_origin")]
    InvalidOrigin,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
