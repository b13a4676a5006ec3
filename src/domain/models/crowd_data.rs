// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 人流等级枚举
///
/// 对场所当前繁忙程度的粗粒度分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrowdLevel {
    /// 繁忙
    Busy,
    /// 一般
    Moderate,
    /// 空闲
    NotBusy,
    /// 未知，页面存在但无法判定
    #[default]
    Unknown,
}

impl fmt::Display for CrowdLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CrowdLevel::Busy => write!(f, "busy"),
            CrowdLevel::Moderate => write!(f, "moderate"),
            CrowdLevel::NotBusy => write!(f, "not_busy"),
            CrowdLevel::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for CrowdLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "busy" => Ok(CrowdLevel::Busy),
            "moderate" => Ok(CrowdLevel::Moderate),
            "not_busy" => Ok(CrowdLevel::NotBusy),
            "unknown" => Ok(CrowdLevel::Unknown),
            _ => Err(()),
        }
    }
}

/// 高峰时段条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakHour {
    /// 星期几（"Monday" 等，当前时段为采样日）
    pub day: String,
    /// 小时 (0-23)
    pub hour: u8,
    /// 该时段的人流等级
    pub level: CrowdLevel,
}

/// 人流数据
///
/// 一次抓取的归一化产物，生成后不可变；
/// 可由外部仓库按 TTL 缓存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdLevelData {
    /// 餐厅名称（可选）
    pub restaurant_name: Option<String>,
    /// 当前人流等级
    pub crowd_level: CrowdLevel,
    /// 当前占用百分比（可选）
    pub crowd_percentage: Option<u8>,
    /// 高峰时段列表（可选）
    pub peak_hours: Option<Vec<PeakHour>>,
    /// 平均停留时间描述
    pub average_time_spent: String,
    /// 数据生成时间
    pub last_updated: DateTime<Utc>,
    /// 信号来源，命名上游搜索引擎
    pub source: String,
}

impl CrowdLevelData {
    /// 创建一条新的人流数据记录
    ///
    /// `source` 固定为 "google"，即信号所派生自的上游搜索引擎
    pub fn new(restaurant_name: Option<String>, crowd_level: CrowdLevel) -> Self {
        Self {
            restaurant_name,
            crowd_level,
            crowd_percentage: None,
            peak_hours: None,
            average_time_spent: "unknown".to_string(),
            last_updated: Utc::now(),
            source: "google".to_string(),
        }
    }
}

/// 抓取结果信封
///
/// 单个目标一次抓取操作的最终结局；
/// `success=false` 时携带 `error` 而非 `data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingResult {
    /// 是否成功
    pub success: bool,
    /// 抓取到的人流数据；成功但页面无繁忙度组件时为 None
    pub data: Option<CrowdLevelData>,
    /// 失败原因描述
    pub error: Option<String>,
    /// 首次尝试之外额外消耗的尝试次数
    pub retry_count: u32,
}

impl ScrapingResult {
    /// 构造成功结果
    pub fn ok(data: Option<CrowdLevelData>, retry_count: u32) -> Self {
        Self {
            success: true,
            data,
            error: None,
            retry_count,
        }
    }

    /// 构造失败结果
    pub fn err(error: impl Into<String>, retry_count: u32) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            retry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crowd_level_round_trip() {
        for level in ["busy", "moderate", "not_busy", "unknown"] {
            let parsed: CrowdLevel = level.parse().unwrap();
            assert_eq!(parsed.to_string(), level);
        }
        assert!("packed".parse::<CrowdLevel>().is_err());
    }

    #[test]
    fn test_new_data_defaults() {
        let data = CrowdLevelData::new(Some("Golden Wok".into()), CrowdLevel::Busy);
        assert_eq!(data.source, "google");
        assert_eq!(data.average_time_spent, "unknown");
        assert!(data.crowd_percentage.is_none());
        assert!(data.peak_hours.is_none());
    }

    #[test]
    fn test_result_envelopes() {
        let ok = ScrapingResult::ok(None, 2);
        assert!(ok.success);
        assert!(ok.error.is_none());
        assert_eq!(ok.retry_count, 2);

        let err = ScrapingResult::err("provider down", 3);
        assert!(!err.success);
        assert!(err.data.is_none());
        assert_eq!(err.error.as_deref(), Some("provider down"));
    }
}
