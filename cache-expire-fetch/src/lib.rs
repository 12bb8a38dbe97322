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

//! HTTP/1 backend fetch glue (`spec.md` §1, explicitly out of scope for the
//! expiry engine itself): an external caller that fetches an origin
//! response body and admits it into the engine. Grounded on
//! `cache_http1_fetch.c`'s `V1F_fetch_hdr`/body-iterator pair, which move
//! bytes from the backend connection without inspecting them — this crate
//! does the same, delegating body transport entirely to `reqwest`.
//!
//! This is deliberately thin: no connection pooling beyond what `reqwest`'s
//! own client already does, no retries, no keep-alive management. See
//! `SPEC_FULL.md` §4.8.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use cache_expire_common::{Clock, Error, Result};
use cache_expire_core::{Backend, Engine, Exp, HashStore, Lru, ObjCore};

/// Per-fetch expiry attributes and transport tunables. Grounded on
/// `GenericCacheConfig`/`foyer_storage`'s `*OptionsBuilder` shape: plain
/// fields, a sane `Default`.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Seconds the object is considered fresh for, absent a response
    /// `Cache-Control` override. The original derives this from VCL; this
    /// rewrite takes it as a static fallback since VCL itself is out of
    /// scope.
    pub ttl: f64,
    pub grace: f64,
    pub keep: f64,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            ttl: 120.0,
            grace: 10.0,
            keep: 0.0,
            user_agent: "cache-expire-fetch/0.1".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// The outcome of a backend fetch that is now tracked by the expiry
/// engine.
#[derive(Debug)]
pub struct Fetched {
    pub handle: Arc<ObjCore>,
    pub body: Bytes,
    pub status: reqwest::StatusCode,
}

/// Performs an HTTP/1 GET against `url` and, on a successful response,
/// admits the body into `engine`'s tracked handles via `Engine::insert`.
/// Mirrors `V1F_fetch_hdr` followed by the body-iterator functions
/// (`vbf_iter_req_body`/`_chunked`), collapsed into one call since
/// `reqwest` already handles chunked transfer-encoding transparently —
/// unlike the original, which hand-rolls the chunked framing because it
/// sits below the HTTP layer, this crate sits above it.
pub async fn fetch_and_admit<H, B, C>(
    client: &reqwest::Client,
    url: &str,
    config: &FetchConfig,
    engine: &Arc<Engine<H, B, C>>,
    lru: &Arc<Lru>,
) -> Result<Fetched>
where
    H: HashStore,
    B: Backend,
    C: Clock,
{
    let t_origin = engine_clock_now(engine);

    tracing::debug!(target: "cache_expire_fetch", url, "fetching");
    let resp = client
        .get(url)
        .header("User-Agent", &config.user_agent)
        .timeout(config.timeout)
        .send()
        .await
        .map_err(|e| Error::Backend(e.to_string()))?;

    let status = resp.status();
    let body = resp.bytes().await.map_err(|e| Error::Backend(e.to_string()))?;

    if !t_origin.is_finite() || t_origin == 0.0 {
        return Err(Error::InvalidOrigin);
    }

    let exp = Exp::new(t_origin, config.ttl, config.grace, config.keep);
    let handle = engine.insert(exp, lru, t_origin);
    tracing::debug!(
        target: "cache_expire_fetch",
        handle = handle.id,
        status = status.as_u16(),
        bytes = body.len(),
        "admitted"
    );

    Ok(Fetched { handle, body, status })
}

fn engine_clock_now<H, B, C>(engine: &Arc<Engine<H, B, C>>) -> f64
where
    H: HashStore,
    B: Backend,
    C: Clock,
{
    engine.clock().now()
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use cache_expire_common::SystemClock;
    use cache_expire_core::{EngineConfig, InProcessHashStore, NullBackend};

    #[test_log::test(tokio::test)]
    async fn fetch_and_admit_tracks_a_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/object"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello from origin"))
            .mount(&server)
            .await;

        let engine = Engine::new(EngineConfig::default(), InProcessHashStore, NullBackend, SystemClock);
        let lru = Lru::new(false);
        let client = reqwest::Client::new();

        let url = format!("{}/object", server.uri());
        let fetched = fetch_and_admit(&client, &url, &FetchConfig::default(), &engine, &lru)
            .await
            .expect("fetch should succeed");

        assert_eq!(fetched.body.as_ref(), b"hello from origin");
        assert!(fetched.status.is_success());
        assert_eq!(fetched.handle.refcnt(), 1);
        assert!(engine.inbox().try_recv().is_some());
    }

    #[test_log::test(tokio::test)]
    async fn fetch_and_admit_surfaces_backend_errors() {
        let engine = Engine::new(EngineConfig::default(), InProcessHashStore, NullBackend, SystemClock);
        let lru = Lru::new(false);
        let client = reqwest::Client::new();

        let err = fetch_and_admit(&client, "http://127.0.0.1:1/unreachable", &FetchConfig::default(), &engine, &lru)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }
}
