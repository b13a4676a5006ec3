// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::crowd_data::ScrapingResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 抓取目标实体
///
/// 标识一家待抓取人流数据的餐厅。由调用方创建，
/// 同一目标可被多个作业先后引用，不归属于任何单个作业。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingTarget {
    /// 目标唯一标识符
    pub id: String,
    /// 餐厅名称
    pub name: String,
    /// 位置描述，用于限定搜索范围（可选）
    pub location: Option<String>,
    /// 最近一次成功抓取时间，由调度器在作业成功时更新
    pub last_scraped: Option<DateTime<Utc>>,
    /// 热度评分 (0-100)，用于周期性重提交时推导优先级
    pub popularity: Option<u8>,
}

impl ScrapingTarget {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: None,
            last_scraped: None,
            popularity: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_popularity(mut self, popularity: u8) -> Self {
        self.popularity = Some(popularity);
        self
    }
}

/// 作业优先级枚举
///
/// 每个优先级对应调度器中一条独立的队列和独立的排水定时器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    /// 高优先级，到期后可触发带外立即派发
    High,
    /// 中优先级
    #[default]
    Medium,
    /// 低优先级
    Low,
}

impl JobPriority {
    /// 根据热度评分推导优先级
    ///
    /// 评分 ≥80 为高优先级，≥50 为中优先级，其余为低优先级
    pub fn from_popularity(popularity: u8) -> Self {
        if popularity >= 80 {
            JobPriority::High
        } else if popularity >= 50 {
            JobPriority::Medium
        } else {
            JobPriority::Low
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobPriority::High => write!(f, "high"),
            JobPriority::Medium => write!(f, "medium"),
            JobPriority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for JobPriority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(JobPriority::High),
            "medium" => Ok(JobPriority::Medium),
            "low" => Ok(JobPriority::Low),
            _ => Err(()),
        }
    }
}

/// 作业状态枚举
///
/// 表示作业在其生命周期中的不同状态。
/// 状态转换遵循以下流程：
/// Pending → Running → Completed/Failed；Pending → Cancelled
/// 失败的尝试在重试预算耗尽前回到 Pending 并推迟 scheduled_for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 等待中，作业位于某条优先级队列
    #[default]
    Pending,
    /// 执行中，作业已派发给抓取器
    Running,
    /// 已完成，抓取成功（终态）
    Completed,
    /// 已失败，重试预算耗尽（终态）
    Failed,
    /// 已取消，调用方主动取消（终态）
    Cancelled,
}

impl JobStatus {
    /// 判断是否为终态
    ///
    /// 终态作业进入历史记录，不会再次入队
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换，当作业状态转换不符合生命周期规则时发生
    #[error("Invalid state transition")]
    InvalidStateTransition,

    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// 抓取作业实体
///
/// 表示对某个目标的一次计划抓取，携带独立的重试/退避状态。
/// 作业在其生命周期内由调度器独占持有；任一时刻作业只会出现在
/// 优先级队列、活跃集合或历史记录三者之一。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingJob {
    /// 作业唯一标识符，创建时生成且保持稳定
    pub id: Uuid,
    /// 抓取目标
    pub target: ScrapingTarget,
    /// 作业优先级，决定所属队列
    pub priority: JobPriority,
    /// 作业状态，跟踪生命周期当前阶段
    pub status: JobStatus,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 计划执行时间，失败重试时被推迟
    pub scheduled_for: DateTime<Utc>,
    /// 开始执行时间
    pub started_at: Option<DateTime<Utc>>,
    /// 完成时间
    pub completed_at: Option<DateTime<Utc>>,
    /// 抓取结果，作业完成或最终失败后填充
    pub result: Option<ScrapingResult>,
    /// 已失败尝试次数
    pub retry_count: u32,
    /// 最大重试次数
    pub max_retries: u32,
}

impl ScrapingJob {
    /// 创建一个新的抓取作业
    pub fn new(
        target: ScrapingTarget,
        priority: JobPriority,
        scheduled_for: DateTime<Utc>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            priority,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            scheduled_for,
            started_at: None,
            completed_at: None,
            result: None,
            retry_count: 0,
            max_retries,
        }
    }

    /// 启动作业
    ///
    /// 将作业状态从 Pending 变更为 Running
    pub fn start(&mut self) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Pending => {
                self.status = JobStatus::Running;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 完成作业
    ///
    /// 将作业状态从 Running 变更为 Completed
    pub fn complete(&mut self, result: ScrapingResult) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Completed;
                self.completed_at = Some(Utc::now());
                self.target.last_scraped = Some(Utc::now());
                self.result = Some(result);
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 标记作业最终失败
    ///
    /// 仅在重试预算耗尽后调用，将状态从 Running 变更为 Failed
    pub fn fail(&mut self, result: ScrapingResult) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Failed;
                self.completed_at = Some(Utc::now());
                self.result = Some(result);
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 取消作业
    ///
    /// 仅允许从非终态取消；在途抓取不会被打断，只是不再被重新入队
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Pending | JobStatus::Running => {
                self.status = JobStatus::Cancelled;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 将失败的尝试重新排队
    ///
    /// 状态回到 Pending 并把 scheduled_for 推迟到给定时间
    pub fn requeue(&mut self, scheduled_for: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Pending;
                self.scheduled_for = scheduled_for;
                self.started_at = None;
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 判断作业是否还有重试预算
    pub fn can_retry(&self) -> bool {
        self.retry_count <= self.max_retries
    }

    /// 判断作业是否已到期可派发
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for <= now
    }
}
