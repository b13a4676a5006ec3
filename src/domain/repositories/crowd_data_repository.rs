// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::crowd_data::CrowdLevelData;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 存储后端错误
    #[error("Storage error: {0}")]
    StorageError(String),

    /// 未找到数据
    #[error("Not found")]
    NotFound,

    /// 无效参数
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// 人流数据仓库特质
///
/// 外部协作者边界：调度器在抓取前查询最新记录以避免重复
/// 工作，在抓取成功后写回。记录的 TTL 与清理由实现方负责。
#[async_trait]
pub trait CrowdDataRepository: Send + Sync {
    /// 获取目标的最新人流数据
    ///
    /// 仅返回实现方认为仍然新鲜的记录，过期记录视为不存在
    async fn get_latest_crowd_data(
        &self,
        target_id: &str,
    ) -> Result<Option<CrowdLevelData>, RepositoryError>;

    /// 存储一条人流数据
    async fn store_crowd_data(
        &self,
        target_id: &str,
        data: CrowdLevelData,
    ) -> Result<CrowdLevelData, RepositoryError>;
}

#[async_trait]
impl<T: CrowdDataRepository + ?Sized> CrowdDataRepository for Arc<T> {
    async fn get_latest_crowd_data(
        &self,
        target_id: &str,
    ) -> Result<Option<CrowdLevelData>, RepositoryError> {
        (**self).get_latest_crowd_data(target_id).await
    }

    async fn store_crowd_data(
        &self,
        target_id: &str,
        data: CrowdLevelData,
    ) -> Result<CrowdLevelData, RepositoryError> {
        (**self).store_crowd_data(target_id, data).await
    }
}
