// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::crowd_data::CrowdLevelData;
use crate::domain::repositories::crowd_data_repository::{CrowdDataRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// 内存人流数据仓库
///
/// `CrowdDataRepository` 的进程内实现，按 TTL 判断记录新鲜度。
/// 供调度器的抓取前新鲜度检查和测试使用。
pub struct MemoryCrowdRepository {
    ttl: Duration,
    records: Mutex<HashMap<String, CrowdLevelData>>,
}

impl MemoryCrowdRepository {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// 清除所有已过期的记录
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, data| now - data.last_updated <= self.ttl);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl CrowdDataRepository for MemoryCrowdRepository {
    async fn get_latest_crowd_data(
        &self,
        target_id: &str,
    ) -> Result<Option<CrowdLevelData>, RepositoryError> {
        let records = self.records.lock();
        let fresh = records
            .get(target_id)
            .filter(|data| Utc::now() - data.last_updated <= self.ttl)
            .cloned();
        Ok(fresh)
    }

    async fn store_crowd_data(
        &self,
        target_id: &str,
        data: CrowdLevelData,
    ) -> Result<CrowdLevelData, RepositoryError> {
        if target_id.is_empty() {
            return Err(RepositoryError::InvalidParameter(
                "target_id must not be empty".to_string(),
            ));
        }
        self.records
            .lock()
            .insert(target_id.to_string(), data.clone());
        Ok(data)
    }
}
