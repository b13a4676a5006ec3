// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 抓取错误类型
///
/// 覆盖从凭证检查到数据提取的整个抓取流程
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// 缺少数据提供商凭证，属于配置错误，不可重试
    #[error("SERP provider credentials are not configured")]
    MissingCredentials,

    /// 网络请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// 提供商返回非成功状态码
    #[error("Provider returned status: {0}")]
    ProviderStatus(u16),

    /// 提供商返回空结果列表
    #[error("Provider returned no rendered results")]
    EmptyResults,

    /// 其他错误
    #[error("Scrape error: {0}")]
    Other(String),
}

impl ScrapeError {
    /// 判断错误是否可重试
    ///
    /// 配置错误立即失败；网络错误和提供商侧的瞬时错误可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::MissingCredentials => false,
            ScrapeError::RequestFailed(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            ScrapeError::ProviderStatus(_) => true,
            ScrapeError::EmptyResults => true,
            ScrapeError::Other(_) => false,
        }
    }
}

/// 代理提供商错误类型
#[derive(Error, Debug)]
pub enum ProxyError {
    /// 代理列表请求失败
    #[error("Proxy provider request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// 代理提供商返回非成功状态码
    #[error("Proxy provider returned status: {0}")]
    ProviderStatus(u16),
}
