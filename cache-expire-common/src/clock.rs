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

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

/// A source of wall-clock seconds, abstracted so the expiry engine's
/// background thread can be driven by a fake clock in tests instead of
/// real time.
///
/// All times in this workspace are `f64` seconds, matching the original's
/// use of `double` throughout `cache_expire.c` (`VTIM_real()` returns a
/// `double`).
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time, in seconds. Not required to be monotonic
    /// across processes, but must never go backwards within one `Clock`
    /// instance (the engine does not defend against a clock that does).
    fn now(&self) -> f64;
}

/// The real wall clock, backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before the Unix epoch")
            .as_secs_f64()
    }
}

impl Clock for Arc<dyn Clock> {
    fn now(&self) -> f64 {
        self.as_ref().now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn system_clock_reports_plausible_unix_seconds() {
        let now = SystemClock.now();
        // 2020-01-01T00:00:00Z, a sanity floor well below any real run.
        assert!(now > 1_577_836_800.0);
    }

    #[test_log::test]
    fn arc_dyn_clock_forwards_to_the_wrapped_clock() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        assert!(clock.now() > 0.0);
    }
}
