// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::crowd_data::ScrapingResult;
use crate::domain::models::job::{JobPriority, ScrapingJob, ScrapingTarget};
use crate::domain::repositories::crowd_data_repository::CrowdDataRepository;
use crate::scraper::CrowdScraper;
use crate::utils::retry_policy::RetryPolicy;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 作业完成回调
///
/// 作业到达终态（完成/失败/取消不含取消——取消在取消点记录）时调用
pub type CompletionCallback = Arc<dyn Fn(&ScrapingJob) + Send + Sync>;

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 全局并发上限，活跃作业数不超过该值
    pub max_concurrent_jobs: usize,
    /// 作业级最大重试次数
    pub max_retries: u32,
    /// 重试退避基础延迟
    pub retry_delay_base: Duration,
    /// 高优先级队列排水间隔
    pub high_interval: Duration,
    /// 中优先级队列排水间隔
    pub medium_interval: Duration,
    /// 低优先级队列排水间隔
    pub low_interval: Duration,
    /// 热门餐厅重提交周期
    pub popular_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            max_retries: 3,
            retry_delay_base: Duration::from_secs(60),
            high_interval: Duration::from_secs(60),
            medium_interval: Duration::from_secs(300),
            low_interval: Duration::from_secs(900),
            popular_interval: Duration::from_secs(3600),
        }
    }
}

/// 调度器部分配置更新；None 字段保持当前值
#[derive(Debug, Default, Clone)]
pub struct SchedulerConfigUpdate {
    pub max_concurrent_jobs: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay_base: Option<Duration>,
    pub high_interval: Option<Duration>,
    pub medium_interval: Option<Duration>,
    pub low_interval: Option<Duration>,
    pub popular_interval: Option<Duration>,
}

/// 调度器可变状态
///
/// 三条优先级队列、活跃集合与历史记录共用一把锁；
/// 任一时刻一个作业只会出现在三者之一
#[derive(Default)]
struct SchedulerState {
    high: Vec<ScrapingJob>,
    medium: Vec<ScrapingJob>,
    low: Vec<ScrapingJob>,
    active: HashMap<Uuid, ScrapingJob>,
    history: Vec<ScrapingJob>,
}

impl SchedulerState {
    fn queue_mut(&mut self, priority: JobPriority) -> &mut Vec<ScrapingJob> {
        match priority {
            JobPriority::High => &mut self.high,
            JobPriority::Medium => &mut self.medium,
            JobPriority::Low => &mut self.low,
        }
    }

    fn queues(&self) -> [&Vec<ScrapingJob>; 3] {
        [&self.high, &self.medium, &self.low]
    }
}

struct SchedulerInner {
    config: RwLock<SchedulerConfig>,
    state: Mutex<SchedulerState>,
    scraper: Arc<CrowdScraper>,
    repository: Option<Arc<dyn CrowdDataRepository>>,
    on_complete: Option<CompletionCallback>,
    popular_targets: Mutex<Option<Vec<ScrapingTarget>>>,
}

/// 作业调度器
///
/// 维护高/中/低三条抓取作业优先级队列。每条队列由独立定时器
/// 驱动：到期作业按 `scheduled_for` 升序、在全局并发上限内批量
/// 派发给抓取器并发执行。失败的尝试以指数退避重新入队，预算
/// 耗尽后转入历史。支持单个/批量临时提交、取消，以及按热度
/// 评分定优先级的周期性热门餐厅重提交。
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    popular_timer: Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    /// 创建新的作业调度器
    ///
    /// `repository` 为可选的人流数据仓库：配置后在抓取前查询
    /// 新鲜记录以避免重复工作，并在抓取成功后写回
    pub fn new(
        config: SchedulerConfig,
        scraper: Arc<CrowdScraper>,
        repository: Option<Arc<dyn CrowdDataRepository>>,
    ) -> Self {
        Self::with_callback(config, scraper, repository, None)
    }

    /// 创建带完成回调的调度器
    pub fn with_callback(
        config: SchedulerConfig,
        scraper: Arc<CrowdScraper>,
        repository: Option<Arc<dyn CrowdDataRepository>>,
        on_complete: Option<CompletionCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config: RwLock::new(config),
                state: Mutex::new(SchedulerState::default()),
                scraper,
                repository,
                on_complete,
                popular_targets: Mutex::new(None),
            }),
            timers: Mutex::new(Vec::new()),
            popular_timer: Mutex::new(None),
        }
    }

    /// 启动周期性排水定时器
    ///
    /// 每个优先级一个独立定时器，互相之间没有顺序保证
    pub fn start(&self) {
        let mut timers = self.timers.lock();
        if !timers.is_empty() {
            return;
        }

        let config = self.inner.config.read();
        let intervals = [
            (JobPriority::High, config.high_interval),
            (JobPriority::Medium, config.medium_interval),
            (JobPriority::Low, config.low_interval),
        ];
        drop(config);

        for (priority, period) in intervals {
            let inner = self.inner.clone();
            timers.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                loop {
                    ticker.tick().await;
                    SchedulerInner::drain(inner.clone(), priority).await;
                }
            }));
        }

        info!("Scheduler timers started");
    }

    /// 停止所有周期性定时器
    ///
    /// 在途作业不被打断，执行完毕后正常落账
    pub fn stop(&self) {
        for handle in self.timers.lock().drain(..) {
            handle.abort();
        }
        if let Some(handle) = self.popular_timer.lock().take() {
            handle.abort();
        }
        info!("Scheduler timers stopped");
    }

    /// 调度单个抓取作业
    ///
    /// 作业以 Pending 状态进入对应优先级队列；高优先级且已到期时
    /// 额外触发一次带外排水，不等待下一次定时器
    pub fn schedule_job(
        &self,
        target: ScrapingTarget,
        priority: JobPriority,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Uuid {
        let scheduled_for = scheduled_for.unwrap_or_else(Utc::now);
        let max_retries = self.inner.config.read().max_retries;
        let job = ScrapingJob::new(target, priority, scheduled_for, max_retries);
        let id = job.id;

        debug!(
            "Scheduling job {} ({}, priority {})",
            id, job.target.name, priority
        );

        let due_now = job.is_due(Utc::now());
        self.inner.state.lock().queue_mut(priority).push(job);

        if priority == JobPriority::High && due_now {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                SchedulerInner::drain(inner, JobPriority::High).await;
            });
        }

        id
    }

    /// 批量调度，同一优先级下每个目标一个作业
    pub fn schedule_batch(
        &self,
        targets: Vec<ScrapingTarget>,
        priority: JobPriority,
    ) -> Vec<Uuid> {
        targets
            .into_iter()
            .map(|t| self.schedule_job(t, priority, None))
            .collect()
    }

    /// 安装/替换热门餐厅重提交周期
    ///
    /// 每个周期按热度评分重提交全部目标：≥80 高优先级，
    /// ≥50 中优先级，其余低优先级
    pub fn schedule_popular_restaurants(&self, targets: Vec<ScrapingTarget>) {
        *self.inner.popular_targets.lock() = Some(targets);

        let mut slot = self.popular_timer.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let inner = self.inner.clone();
        let period = self.inner.config.read().popular_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                SchedulerInner::resubmit_popular(&inner);
            }
        }));

        info!("Popular-restaurants cycle installed");
    }

    /// 取消作业
    ///
    /// 无论作业位于哪条队列或活跃槽位都将其移除、标记取消并
    /// 记入历史；在途抓取不会被打断。返回是否找到了该作业。
    pub fn cancel_job(&self, id: Uuid) -> bool {
        let mut state = self.inner.state.lock();

        for priority in [JobPriority::High, JobPriority::Medium, JobPriority::Low] {
            let queue = state.queue_mut(priority);
            if let Some(pos) = queue.iter().position(|j| j.id == id) {
                let mut job = queue.remove(pos);
                if job.cancel().is_ok() {
                    info!("Job {} cancelled from {} queue", id, priority);
                    state.history.push(job);
                }
                return true;
            }
        }

        if let Some(mut job) = state.active.remove(&id) {
            if job.cancel().is_ok() {
                info!("Job {} cancelled while dispatched", id);
                state.history.push(job);
            }
            return true;
        }

        false
    }

    /// 合并新配置并重启所有周期定时器，使新间隔立即生效
    pub fn update_config(&self, update: SchedulerConfigUpdate) {
        {
            let mut config = self.inner.config.write();
            if let Some(v) = update.max_concurrent_jobs {
                config.max_concurrent_jobs = v;
            }
            if let Some(v) = update.max_retries {
                config.max_retries = v;
            }
            if let Some(v) = update.retry_delay_base {
                config.retry_delay_base = v;
            }
            if let Some(v) = update.high_interval {
                config.high_interval = v;
            }
            if let Some(v) = update.medium_interval {
                config.medium_interval = v;
            }
            if let Some(v) = update.low_interval {
                config.low_interval = v;
            }
            if let Some(v) = update.popular_interval {
                config.popular_interval = v;
            }
        }

        let was_running = !self.timers.lock().is_empty();
        if was_running {
            for handle in self.timers.lock().drain(..) {
                handle.abort();
            }
            self.start();
        }

        let popular = self.inner.popular_targets.lock().clone();
        if let Some(targets) = popular {
            if self.popular_timer.lock().is_some() {
                self.schedule_popular_restaurants(targets);
            }
        }

        info!("Scheduler configuration updated");
    }

    /// 获取全部等待中作业（三条队列的并集）
    pub fn get_pending_jobs(&self) -> Vec<ScrapingJob> {
        let state = self.inner.state.lock();
        state.queues().iter().flat_map(|q| q.iter().cloned()).collect()
    }

    /// 获取全部活跃作业
    pub fn get_active_jobs(&self) -> Vec<ScrapingJob> {
        self.inner.state.lock().active.values().cloned().collect()
    }

    /// 获取历史记录，最近完成的在前
    ///
    /// 历史仅受读取侧 limit 约束，从不按大小自动剪除
    pub fn get_job_history(&self, limit: Option<usize>) -> Vec<ScrapingJob> {
        let state = self.inner.state.lock();
        let iter = state.history.iter().rev().cloned();
        match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    /// 显式清空历史记录
    pub fn clear_history(&self) {
        self.inner.state.lock().history.clear();
    }

    /// 按 ID 在队列、活跃集合和历史中查找作业
    pub fn get_job(&self, id: Uuid) -> Option<ScrapingJob> {
        let state = self.inner.state.lock();

        for queue in state.queues() {
            if let Some(job) = queue.iter().find(|j| j.id == id) {
                return Some(job.clone());
            }
        }
        if let Some(job) = state.active.get(&id) {
            return Some(job.clone());
        }
        state.history.iter().find(|j| j.id == id).cloned()
    }

    /// 立即执行一次指定优先级队列的排水
    ///
    /// 供测试和带外派发使用；生产路径由定时器驱动
    pub async fn drain_due(&self, priority: JobPriority) {
        SchedulerInner::drain(self.inner.clone(), priority).await;
    }

    #[cfg(test)]
    pub(crate) fn inject_job(&self, job: ScrapingJob) {
        let priority = job.priority;
        self.inner.state.lock().queue_mut(priority).push(job);
    }
}

impl SchedulerInner {
    /// 重提交全部热门目标
    fn resubmit_popular(inner: &Arc<SchedulerInner>) {
        let targets = match inner.popular_targets.lock().clone() {
            Some(t) => t,
            None => return,
        };

        let max_retries = inner.config.read().max_retries;
        let mut state = inner.state.lock();
        for target in targets {
            let priority = JobPriority::from_popularity(target.popularity.unwrap_or(0));
            let job = ScrapingJob::new(target, priority, Utc::now(), max_retries);
            state.queue_mut(priority).push(job);
        }
        drop(state);

        debug!("Popular-restaurants cycle resubmitted targets");
    }

    /// 排水一条优先级队列
    ///
    /// 在锁内计算空闲槽位、按 `scheduled_for` 升序取出到期作业并
    /// 迁入活跃集合，随后在锁外并发派发执行
    async fn drain(inner: Arc<SchedulerInner>, priority: JobPriority) {
        let dispatched = {
            let max_concurrent = inner.config.read().max_concurrent_jobs;
            let mut state = inner.state.lock();

            let available = max_concurrent.saturating_sub(state.active.len());
            if available == 0 {
                return;
            }

            let now = Utc::now();
            let queue = state.queue_mut(priority);
            queue.sort_by_key(|j| j.scheduled_for);

            let mut taken = Vec::new();
            let mut rejected = Vec::new();
            while taken.len() < available
                && queue.first().map(|j| j.is_due(now)).unwrap_or(false)
            {
                let mut job = queue.remove(0);
                match job.start() {
                    Ok(()) => taken.push(job),
                    Err(e) => {
                        warn!("Job {} could not start: {}", job.id, e);
                        rejected.push(job);
                    }
                }
            }

            // 无法派发的作业转入历史，作业不会凭空消失
            for job in rejected {
                state.history.push(job);
            }
            for job in &taken {
                state.active.insert(job.id, job.clone());
            }
            taken
        };

        if dispatched.is_empty() {
            return;
        }

        debug!(
            "Draining {} queue: dispatching {} jobs",
            priority,
            dispatched.len()
        );

        // 同一次排水取出的作业并发执行，而不是逐个串行等待
        for job in dispatched {
            let inner = inner.clone();
            tokio::spawn(async move {
                SchedulerInner::execute_job(inner, job).await;
            });
        }
    }

    /// 执行一个已派发的作业
    async fn execute_job(inner: Arc<SchedulerInner>, job: ScrapingJob) {
        // 仓库里有足够新鲜的记录时跳过抓取
        if let Some(repo) = &inner.repository {
            match repo.get_latest_crowd_data(&job.target.id).await {
                Ok(Some(data)) => {
                    debug!(
                        "Fresh crowd data for target {}, skipping scrape",
                        job.target.id
                    );
                    Self::finish(&inner, job.id, ScrapingResult::ok(Some(data), 0));
                    return;
                }
                Ok(None) => {}
                Err(e) => warn!("Repository lookup failed for {}: {}", job.target.id, e),
            }
        }

        let result = inner
            .scraper
            .extract_crowd_level_data(&job.target.name, job.target.location.as_deref())
            .await;

        if result.success {
            if let (Some(repo), Some(data)) = (&inner.repository, &result.data) {
                if let Err(e) = repo.store_crowd_data(&job.target.id, data.clone()).await {
                    warn!("Failed to store crowd data for {}: {}", job.target.id, e);
                }
            }
        }

        Self::finish(&inner, job.id, result);
    }

    /// 作业执行结束后的落账
    ///
    /// 成功转 Completed；失败先消耗重试预算按指数退避重新入队，
    /// 预算耗尽转 Failed。无论结局作业都会离开活跃集合。
    fn finish(inner: &Arc<SchedulerInner>, job_id: Uuid, result: ScrapingResult) {
        let terminal = {
            let config = inner.config.read();
            let policy = RetryPolicy::with_base(config.max_retries, config.retry_delay_base);
            drop(config);

            let mut state = inner.state.lock();
            let mut job = match state.active.remove(&job_id) {
                Some(job) => job,
                None => {
                    // 执行途中被取消：取消点已落账，这里不再处理
                    debug!("Job {} no longer active (cancelled mid-flight)", job_id);
                    return;
                }
            };

            if result.success {
                if let Err(e) = job.complete(result) {
                    warn!("Job {} completion rejected: {}", job_id, e);
                }
                info!("Job {} completed", job_id);
                state.history.push(job.clone());
                Some(job)
            } else {
                job.retry_count += 1;
                if job.can_retry() {
                    let next = policy.next_retry_time(job.retry_count, Utc::now());
                    if let Err(e) = job.requeue(next) {
                        warn!("Job {} requeue rejected: {}", job_id, e);
                    }
                    info!(
                        "Job {} failed (attempt {}), requeued for {}",
                        job_id, job.retry_count, next
                    );
                    let priority = job.priority;
                    state.queue_mut(priority).push(job);
                    None
                } else {
                    if let Err(e) = job.fail(result) {
                        warn!("Job {} failure transition rejected: {}", job_id, e);
                    }
                    warn!("Job {} failed permanently after retry budget", job_id);
                    state.history.push(job.clone());
                    Some(job)
                }
            }
        };

        if let (Some(job), Some(callback)) = (terminal, &inner.on_complete) {
            callback(&job);
        }
    }
}
