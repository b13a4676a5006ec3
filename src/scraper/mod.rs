// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod extractor;

use crate::domain::models::crowd_data::{CrowdLevelData, ScrapingResult};
use crate::infrastructure::serp_client::SerpClient;
use crate::proxy::ProxyManager;
use crate::utils::errors::ScrapeError;
use crate::utils::retry_policy::RetryPolicy;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Fixed query qualifier appended to every search so the SERP
/// provider renders the busyness widget.
const QUERY_QUALIFIER: &str = "popular times";

/// Scraper configuration, runtime-adjustable via `update_config`.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// SERP provider credential
    pub api_key: String,
    /// SERP provider endpoint
    pub base_url: String,
    /// Per-call timeout
    pub timeout: Duration,
    /// Number of retries after the first failed attempt
    pub retry_attempts: u32,
    /// Base delay for exponential retry backoff
    pub retry_delay: Duration,
    /// Default chunk size for batch processing
    pub batch_size: usize,
    /// Fixed pause between batch chunks
    pub batch_pause: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            batch_size: 5,
            batch_pause: Duration::from_secs(2),
        }
    }
}

/// Partial configuration update; `None` fields keep their current value.
#[derive(Debug, Default, Clone)]
pub struct ScraperConfigUpdate {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub batch_size: Option<usize>,
    pub batch_pause: Option<Duration>,
}

/// Crowd-level scraper.
///
/// Turns a restaurant name (and optional location) into a normalized
/// crowd-level reading by querying the external SERP data provider for
/// rendered markup and extracting the popular-times signal from it.
/// The whole operation is wrapped in retry-with-backoff; an optional
/// proxy manager supplies rotating egress identities and rate limiting.
pub struct CrowdScraper {
    config: RwLock<ScraperConfig>,
    client: RwLock<SerpClient>,
    proxy_manager: Option<Arc<ProxyManager>>,
}

impl CrowdScraper {
    pub fn new(
        config: ScraperConfig,
        proxy_manager: Option<Arc<ProxyManager>>,
    ) -> Result<Self, ScrapeError> {
        let client = SerpClient::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.timeout,
        )?;
        Ok(Self {
            config: RwLock::new(config),
            client: RwLock::new(client),
            proxy_manager,
        })
    }

    /// Merge new settings; rebuilds the provider client when endpoint,
    /// credential or timeout changed.
    pub fn update_config(&self, update: ScraperConfigUpdate) -> Result<(), ScrapeError> {
        let mut config = self.config.write();
        let mut rebuild = false;

        if let Some(api_key) = update.api_key {
            config.api_key = api_key;
            rebuild = true;
        }
        if let Some(base_url) = update.base_url {
            config.base_url = base_url;
            rebuild = true;
        }
        if let Some(timeout) = update.timeout {
            config.timeout = timeout;
            rebuild = true;
        }
        if let Some(retry_attempts) = update.retry_attempts {
            config.retry_attempts = retry_attempts;
        }
        if let Some(retry_delay) = update.retry_delay {
            config.retry_delay = retry_delay;
        }
        if let Some(batch_size) = update.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(batch_pause) = update.batch_pause {
            config.batch_pause = batch_pause;
        }

        if rebuild {
            *self.client.write() = SerpClient::new(
                config.api_key.clone(),
                config.base_url.clone(),
                config.timeout,
            )?;
        }
        Ok(())
    }

    /// Scrape one restaurant and return the outcome envelope.
    ///
    /// Credential check through extraction runs inside the retry helper;
    /// `retry_count` on the returned result is the number of additional
    /// attempts beyond the first. Non-retryable errors (missing
    /// credentials) surface immediately as a failed result.
    pub async fn extract_crowd_level_data(
        &self,
        restaurant_name: &str,
        location: Option<&str>,
    ) -> ScrapingResult {
        let (policy, query) = {
            let config = self.config.read();
            (
                RetryPolicy::with_base(config.retry_attempts, config.retry_delay),
                build_query(restaurant_name, location),
            )
        };

        let mut retries: u32 = 0;
        loop {
            let attempt = retries + 1;
            match self.attempt_scrape(&query, restaurant_name).await {
                Ok(data) => {
                    info!(
                        "Scrape succeeded for '{}' after {} retries",
                        restaurant_name, retries
                    );
                    return ScrapingResult::ok(data, retries);
                }
                Err(e) => {
                    if e.is_retryable() && policy.should_retry(retries) {
                        let backoff = policy.calculate_backoff(attempt);
                        warn!(
                            "Scrape attempt {} for '{}' failed: {}; retrying in {:?}",
                            attempt, restaurant_name, e, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        retries += 1;
                    } else {
                        warn!(
                            "Scrape failed for '{}' after {} retries: {}",
                            restaurant_name, retries, e
                        );
                        return ScrapingResult::err(e.to_string(), retries);
                    }
                }
            }
        }
    }

    /// One scrape attempt: rate limit, egress selection, provider call,
    /// extraction. `Ok(None)` means the page carried no popular-times
    /// widget, which is a successful scrape with no signal.
    async fn attempt_scrape(
        &self,
        query: &str,
        restaurant_name: &str,
    ) -> Result<Option<CrowdLevelData>, ScrapeError> {
        let client = self.client.read().clone();

        let proxy = match &self.proxy_manager {
            Some(manager) => {
                manager.apply_rate_limit().await;
                manager.get_proxy().await
            }
            None => None,
        };

        let started = Instant::now();
        let outcome = client.fetch_rendered(query, proxy.as_ref()).await;

        if let (Some(manager), Some(p)) = (&self.proxy_manager, &proxy) {
            match &outcome {
                Ok(_) => manager
                    .report_proxy_success(p, Some(started.elapsed().as_millis() as u64)),
                Err(e) => manager.report_proxy_failure(p, &e.to_string()),
            }
        }

        let html = outcome?;
        let data = extractor::extract_crowd_data_from_page(&html, Some(restaurant_name));
        if data.is_none() {
            debug!("No popular-times widget for '{}'", restaurant_name);
        }
        Ok(data)
    }

    /// Process many restaurants with bounded concurrency.
    ///
    /// Input is partitioned into chunks of `concurrency` (falling back
    /// to the configured batch size); members of a chunk run
    /// concurrently and a fixed pause separates chunks to avoid
    /// bursting the provider. Per-name results are independent. While
    /// the batch runs, the proxy pool caps per-proxy usage.
    pub async fn batch_process(
        &self,
        names: &[String],
        location: Option<&str>,
        concurrency: Option<usize>,
    ) -> HashMap<String, ScrapingResult> {
        let (chunk_size, batch_pause) = {
            let config = self.config.read();
            (
                concurrency.unwrap_or(config.batch_size).max(1),
                config.batch_pause,
            )
        };
        if let Some(manager) = &self.proxy_manager {
            manager.begin_batch();
        }
        let mut results = HashMap::new();

        let chunks: Vec<&[String]> = names.chunks(chunk_size).collect();
        let total_chunks = chunks.len();

        for (i, chunk) in chunks.into_iter().enumerate() {
            info!(
                "Processing batch chunk {}/{} ({} restaurants)",
                i + 1,
                total_chunks,
                chunk.len()
            );

            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|name| self.extract_crowd_level_data(name, location)),
            )
            .await;

            for (name, outcome) in chunk.iter().zip(outcomes) {
                results.insert(name.clone(), outcome);
            }

            if i + 1 < total_chunks {
                tokio::time::sleep(batch_pause).await;
            }
        }

        if let Some(manager) = &self.proxy_manager {
            manager.end_batch();
        }

        results
    }
}

/// Build the provider query: name, optional location, fixed qualifier.
fn build_query(restaurant_name: &str, location: Option<&str>) -> String {
    match location {
        Some(loc) if !loc.is_empty() => {
            format!("{} {} {}", restaurant_name, loc, QUERY_QUALIFIER)
        }
        _ => format!("{} {}", restaurant_name, QUERY_QUALIFIER),
    }
}
