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

//! End-to-end example: starts the expiry engine's background thread,
//! fetches a URL passed on the command line, admits the response into the
//! engine, and reports when the background thread reaps it.

use std::{env, time::Duration};

use cache_expire::{fetch_and_admit, Engine, EngineConfig, FetchConfig, InProcessHashStore, Lru, NullBackend, SystemClock};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let url = env::args().nth(1).unwrap_or_else(|| "https://example.com".to_string());

    let engine = Engine::start(EngineConfig::default(), InProcessHashStore, NullBackend, SystemClock);
    let lru = Lru::new(false);
    let client = reqwest::Client::new();

    let fetched = match fetch_and_admit(&client, &url, &FetchConfig::default(), &engine, &lru).await {
        Ok(f) => f,
        Err(e) => {
            eprintln!("fetch failed: {e}");
            engine.shutdown();
            std::process::exit(1);
        }
    };

    println!(
        "admitted handle {} ({} bytes, status {})",
        fetched.handle.id,
        fetched.body.len(),
        fetched.status
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
    while fetched.handle.refcnt() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    println!(
        "metrics: inserted={} expired={} lru_nuked={}",
        engine.metrics().inserted.load(std::sync::atomic::Ordering::Relaxed),
        engine.metrics().expired.load(std::sync::atomic::Ordering::Relaxed),
        engine.metrics().lru_nuked.load(std::sync::atomic::Ordering::Relaxed),
    );

    engine.shutdown();
}
