// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::proxy::{ProxyDetails, ProxyStats};
use crate::infrastructure::proxy_provider::ProxyProviderClient;
use crate::utils::errors::ProxyError;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 代理管理器配置
#[derive(Debug, Clone)]
pub struct ProxyManagerConfig {
    /// 轮换阈值，同一代理使用次数达到后应轮换
    pub rotation_threshold: u32,
    /// 失败阈值，连续失败达到后停用该代理
    pub max_fail_count: u32,
    /// 单个批次窗口内同一代理的最大使用次数
    pub max_usage_per_batch: u32,
    /// 池刷新间隔
    pub refresh_interval: Duration,
    /// 两次使用之间的最小延迟
    pub rate_limit_delay: Duration,
}

impl Default for ProxyManagerConfig {
    fn default() -> Self {
        Self {
            rotation_threshold: 10,
            max_fail_count: 3,
            max_usage_per_batch: 5,
            refresh_interval: Duration::from_secs(3600),
            rate_limit_delay: Duration::from_millis(1000),
        }
    }
}

/// 代理管理器
///
/// 持有出口代理身份池：按轮询分发、跟踪成败统计、
/// 停用超过失败阈值的代理、按周期从提供商刷新池。
/// 计数器在锁内更新，可被并发派发的作业安全调用。
pub struct ProxyManager {
    provider: Option<ProxyProviderClient>,
    config: ProxyManagerConfig,
    pool: Mutex<Vec<ProxyDetails>>,
    stats: Mutex<ProxyStats>,
    /// 响应时间样本数，用于计算滚动平均
    response_samples: Mutex<u64>,
    cursor: AtomicUsize,
    last_refresh: Mutex<Option<Instant>>,
    /// 批次窗口内各代理的分发次数；None 表示没有打开的窗口
    batch_usage: Mutex<Option<HashMap<String, u32>>>,
}

impl ProxyManager {
    /// 创建新的代理管理器
    ///
    /// `provider` 为 None 时池保持为空，调用方将直连
    pub fn new(provider: Option<ProxyProviderClient>, config: ProxyManagerConfig) -> Self {
        Self {
            provider,
            config,
            pool: Mutex::new(Vec::new()),
            stats: Mutex::new(ProxyStats::default()),
            response_samples: Mutex::new(0),
            cursor: AtomicUsize::new(0),
            last_refresh: Mutex::new(None),
            batch_usage: Mutex::new(None),
        }
    }

    /// 打开一个批次窗口
    ///
    /// 窗口内每个代理的分发次数不超过 `max_usage_per_batch`；
    /// 全部代理达到上限后 `get_proxy` 返回 None（直连）
    pub fn begin_batch(&self) {
        *self.batch_usage.lock() = Some(HashMap::new());
    }

    /// 关闭批次窗口，恢复不设上限的分发
    pub fn end_batch(&self) {
        *self.batch_usage.lock() = None;
    }

    /// 初始化代理池
    ///
    /// 提供商已配置时拉取代理列表填充池；未配置不是错误。
    /// 仅当提供商网络调用本身失败时向上传播。
    pub async fn initialize(&self) -> Result<(), ProxyError> {
        match &self.provider {
            Some(_) => {
                self.refresh_pool().await?;
                info!(
                    "Proxy pool initialized with {} proxies",
                    self.pool.lock().len()
                );
                Ok(())
            }
            None => {
                info!("No proxy provider configured, operating without proxies");
                Ok(())
            }
        }
    }

    /// 从提供商刷新池
    ///
    /// 合并按 `server:port` 去重；合并前剪除已失效或
    /// 超过失败阈值的条目
    pub async fn refresh_pool(&self) -> Result<(), ProxyError> {
        let provider = match &self.provider {
            Some(p) => p,
            None => return Ok(()),
        };

        let fetched = provider.fetch_proxies().await?;
        self.merge_pool(fetched);
        *self.last_refresh.lock() = Some(Instant::now());
        Ok(())
    }

    fn merge_pool(&self, fetched: Vec<ProxyDetails>) {
        let mut pool = self.pool.lock();

        let before = pool.len();
        pool.retain(|p| p.active && p.fail_count < self.config.max_fail_count);
        let pruned = before - pool.len();

        let mut added = 0;
        for proxy in fetched {
            if !pool.iter().any(|p| p.key() == proxy.key()) {
                pool.push(proxy);
                added += 1;
            }
        }

        info!("Proxy pool refreshed: {} pruned, {} added", pruned, added);
    }

    /// 获取下一个可用代理
    ///
    /// 刷新间隔已过时先刷新；池中无活跃条目时返回 None，
    /// 表示调用方应使用直连。活跃子集按轮询选取。
    pub async fn get_proxy(&self) -> Option<ProxyDetails> {
        let stale = self
            .last_refresh
            .lock()
            .map(|at| at.elapsed() >= self.config.refresh_interval)
            .unwrap_or(self.provider.is_some());

        if stale {
            if let Err(e) = self.refresh_pool().await {
                // 刷新失败不致命，继续使用现有池
                warn!("Proxy pool refresh failed: {}", e);
            }
        }

        let mut pool = self.pool.lock();
        let mut batch_usage = self.batch_usage.lock();
        let active_indices: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, p)| p.active)
            .filter(|(_, p)| match batch_usage.as_ref() {
                Some(usage) => {
                    usage.get(&p.key()).copied().unwrap_or(0) < self.config.max_usage_per_batch
                }
                None => true,
            })
            .map(|(i, _)| i)
            .collect();

        if active_indices.is_empty() {
            return None;
        }

        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % active_indices.len();
        let idx = active_indices[slot];
        pool[idx].last_used = Some(Utc::now());
        if let Some(usage) = batch_usage.as_mut() {
            *usage.entry(pool[idx].key()).or_insert(0) += 1;
        }
        self.stats.lock().total_requests += 1;

        Some(pool[idx].clone())
    }

    /// 报告一次代理失败
    ///
    /// 失败被隔离在该代理上：计数、可能停用，绝不中断调用方
    pub fn report_proxy_failure(&self, proxy: &ProxyDetails, error: &str) {
        let mut pool = self.pool.lock();
        if let Some(entry) = pool.iter_mut().find(|p| p.key() == proxy.key()) {
            entry.fail_count += 1;
            if entry.fail_count >= self.config.max_fail_count {
                entry.active = false;
                warn!(
                    "Proxy {} deactivated after {} failures (last error: {})",
                    entry.key(),
                    entry.fail_count,
                    error
                );
            }
        }
        self.stats.lock().failed_requests += 1;
    }

    /// 报告一次代理成功
    ///
    /// 成功归零该代理的连续失败计数，并把响应时间并入
    /// 历史成功的滚动平均
    pub fn report_proxy_success(&self, proxy: &ProxyDetails, response_time_ms: Option<u64>) {
        {
            let mut pool = self.pool.lock();
            if let Some(entry) = pool.iter_mut().find(|p| p.key() == proxy.key()) {
                entry.success_count += 1;
                entry.fail_count = 0;
            }
        }

        let mut stats = self.stats.lock();
        stats.successful_requests += 1;

        if let Some(rt) = response_time_ms {
            let mut samples = self.response_samples.lock();
            *samples += 1;
            let n = *samples as f64;
            stats.average_response_time =
                (stats.average_response_time * (n - 1.0) + rt as f64) / n;
        }
    }

    /// 纯谓词：使用次数达到轮换阈值后为 true
    pub fn should_rotate_proxy(&self, usage_count: u32) -> bool {
        usage_count >= self.config.rotation_threshold
    }

    /// 速率限制延迟
    ///
    /// 抓取器在两次尝试之间调用，以遵守提供商速率限制
    pub async fn apply_rate_limit(&self) {
        tokio::time::sleep(self.config.rate_limit_delay).await;
    }

    /// 获取聚合统计
    pub fn get_stats(&self) -> ProxyStats {
        self.stats.lock().clone()
    }

    /// 获取池中全部代理
    pub fn get_all_proxies(&self) -> Vec<ProxyDetails> {
        self.pool.lock().clone()
    }

    /// 获取活跃代理数量
    pub fn get_active_proxy_count(&self) -> usize {
        self.pool.lock().iter().filter(|p| p.active).count()
    }

    #[cfg(test)]
    pub(crate) fn seed_pool(&self, proxies: Vec<ProxyDetails>) {
        *self.pool.lock() = proxies;
        *self.last_refresh.lock() = Some(Instant::now());
    }
}
