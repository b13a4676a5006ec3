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

use crowdrs::config::settings::Settings;
use crowdrs::domain::repositories::crowd_data_repository::CrowdDataRepository;
use crowdrs::infrastructure::memory_repository::MemoryCrowdRepository;
use crowdrs::infrastructure::proxy_provider::ProxyProviderClient;
use crowdrs::proxy::ProxyManager;
use crowdrs::scheduler::JobScheduler;
use crowdrs::scraper::CrowdScraper;
use crowdrs::utils::telemetry;
use std::sync::Arc;
use tracing::{info, warn};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动调度器
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting crowdrs...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    // 3. Initialize proxy pool
    let proxy_manager = if settings.proxy.enabled {
        let provider = match (&settings.proxy.api_key, &settings.proxy.base_url) {
            (Some(key), Some(url)) => Some(ProxyProviderClient::new(key.clone(), url.clone())),
            _ => None,
        };
        let manager = Arc::new(ProxyManager::new(provider, settings.proxy_config()));
        if let Err(e) = manager.initialize().await {
            warn!("Proxy pool initialization failed, continuing without pool: {}", e);
        }
        Some(manager)
    } else {
        None
    };
    info!(
        "Proxy pool {}",
        if proxy_manager.is_some() { "enabled" } else { "disabled" }
    );

    // 4. Initialize scraper
    let scraper = Arc::new(CrowdScraper::new(
        settings.scraper_config(),
        proxy_manager.clone(),
    )?);
    info!("Scraper initialized");

    // 5. Initialize crowd data repository
    let repository: Option<Arc<dyn CrowdDataRepository>> = if settings.repository.enabled {
        Some(Arc::new(MemoryCrowdRepository::new(
            chrono::Duration::minutes(settings.repository.ttl_minutes),
        )))
    } else {
        None
    };

    // 6. Start scheduler
    let scheduler = Arc::new(JobScheduler::new(
        settings.scheduler_config(),
        scraper,
        repository,
    ));
    scheduler.start();
    info!("Scheduler started");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping scheduler");
    scheduler.stop();

    Ok(())
}
