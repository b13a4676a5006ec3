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

use crate::proxy::ProxyManagerConfig;
use crate::scheduler::SchedulerConfig;
use crate::scraper::ScraperConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含抓取、调度、代理池和数据仓库等所有配置项
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 抓取器配置
    pub scraper: ScraperSettings,
    /// 调度器配置
    pub scheduler: SchedulerSettings,
    /// 代理池配置
    pub proxy: ProxySettings,
    /// 数据仓库配置
    pub repository: RepositorySettings,
}

/// 抓取器配置设置
#[derive(Debug, Deserialize)]
pub struct ScraperSettings {
    /// SERP 提供商 API 密钥
    pub api_key: String,
    /// SERP 提供商端点
    pub base_url: String,
    /// 单次请求超时时间（秒）
    pub timeout: u64,
    /// 单个作业内的最大重试次数
    pub retry_attempts: u32,
    /// 重试退避基础延迟（毫秒）
    pub retry_delay_ms: u64,
    /// 批处理默认分片大小
    pub batch_size: usize,
    /// 批处理分片之间的停顿（毫秒）
    pub batch_pause_ms: u64,
}

/// 调度器配置设置
#[derive(Debug, Deserialize)]
pub struct SchedulerSettings {
    /// 全局并发作业上限
    pub max_concurrent_jobs: usize,
    /// 作业级最大重试次数
    pub max_retries: u32,
    /// 作业重试退避基础延迟（秒）
    pub retry_delay: u64,
    /// 高优先级队列排水间隔（秒）
    pub high_interval: u64,
    /// 中优先级队列排水间隔（秒）
    pub medium_interval: u64,
    /// 低优先级队列排水间隔（秒）
    pub low_interval: u64,
    /// 热门餐厅重提交周期（秒）
    pub popular_interval: u64,
}

/// 代理池配置设置
#[derive(Debug, Deserialize)]
pub struct ProxySettings {
    /// 是否启用代理池
    pub enabled: bool,
    /// 代理提供商 API 密钥
    pub api_key: Option<String>,
    /// 代理提供商端点
    pub base_url: Option<String>,
    /// 单代理轮换阈值（请求数）
    pub rotation_threshold: u32,
    /// 连续失败停用阈值
    pub max_fail_count: u32,
    /// 单批次内同一代理的最大使用次数
    pub max_usage_per_batch: u32,
    /// 代理池刷新周期（秒）
    pub refresh_interval: u64,
    /// 抓取前的限速延迟（毫秒）
    pub rate_limit_delay_ms: u64,
}

/// 数据仓库配置设置
#[derive(Debug, Deserialize)]
pub struct RepositorySettings {
    /// 是否启用抓取前的新鲜度检查
    pub enabled: bool,
    /// 记录视为新鲜的存活时间（分钟）
    pub ttl_minutes: i64,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Default Scraper settings
            .set_default("scraper.api_key", "")?
            .set_default("scraper.base_url", "")?
            .set_default("scraper.timeout", 30)?
            .set_default("scraper.retry_attempts", 3)?
            .set_default("scraper.retry_delay_ms", 1000)?
            .set_default("scraper.batch_size", 5)?
            .set_default("scraper.batch_pause_ms", 2000)?
            // Default Scheduler settings
            .set_default("scheduler.max_concurrent_jobs", 5)?
            .set_default("scheduler.max_retries", 3)?
            .set_default("scheduler.retry_delay", 60)?
            .set_default("scheduler.high_interval", 60)?
            .set_default("scheduler.medium_interval", 300)?
            .set_default("scheduler.low_interval", 900)?
            .set_default("scheduler.popular_interval", 3600)?
            // Default Proxy settings
            .set_default("proxy.enabled", false)?
            .set_default("proxy.rotation_threshold", 10)?
            .set_default("proxy.max_fail_count", 3)?
            .set_default("proxy.max_usage_per_batch", 5)?
            .set_default("proxy.refresh_interval", 3600)?
            .set_default("proxy.rate_limit_delay_ms", 1000)?
            // Default Repository settings
            .set_default("repository.enabled", true)?
            .set_default("repository.ttl_minutes", 30)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("CROWDRS").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// 转换为抓取器运行时配置
    pub fn scraper_config(&self) -> ScraperConfig {
        ScraperConfig {
            api_key: self.scraper.api_key.clone(),
            base_url: self.scraper.base_url.clone(),
            timeout: Duration::from_secs(self.scraper.timeout),
            retry_attempts: self.scraper.retry_attempts,
            retry_delay: Duration::from_millis(self.scraper.retry_delay_ms),
            batch_size: self.scraper.batch_size,
            batch_pause: Duration::from_millis(self.scraper.batch_pause_ms),
        }
    }

    /// 转换为调度器运行时配置
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_jobs: self.scheduler.max_concurrent_jobs,
            max_retries: self.scheduler.max_retries,
            retry_delay_base: Duration::from_secs(self.scheduler.retry_delay),
            high_interval: Duration::from_secs(self.scheduler.high_interval),
            medium_interval: Duration::from_secs(self.scheduler.medium_interval),
            low_interval: Duration::from_secs(self.scheduler.low_interval),
            popular_interval: Duration::from_secs(self.scheduler.popular_interval),
        }
    }

    /// 转换为代理池运行时配置
    pub fn proxy_config(&self) -> ProxyManagerConfig {
        ProxyManagerConfig {
            rotation_threshold: self.proxy.rotation_threshold,
            max_fail_count: self.proxy.max_fail_count,
            max_usage_per_batch: self.proxy.max_usage_per_batch,
            refresh_interval: Duration::from_secs(self.proxy.refresh_interval),
            rate_limit_delay: Duration::from_millis(self.proxy.rate_limit_delay_ms),
        }
    }
}
