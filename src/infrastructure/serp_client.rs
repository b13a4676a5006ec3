use crate::domain::models::proxy::ProxyDetails;
use crate::utils::errors::ScrapeError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// SERP 请求载荷
///
/// `render` 指示提供商返回渲染后的页面标记
#[derive(Debug, Serialize)]
struct SerpRequest<'a> {
    query: &'a str,
    render: &'a str,
}

/// SERP 响应中的单个结果块
#[derive(Debug, Deserialize)]
pub struct SerpResultBlock {
    /// 渲染后的页面标记
    pub content: String,
}

/// SERP 提供商响应
#[derive(Debug, Deserialize)]
pub struct SerpResponse {
    /// 提供商侧状态码
    pub status_code: u16,
    /// 结果块列表
    #[serde(default)]
    pub results: Vec<SerpResultBlock>,
}

/// 外部 SERP 数据提供商客户端
///
/// 每次抓取尝试发起一个 POST 调用，请求携带查询串和渲染指令，
/// 响应携带该查询渲染后的标记块。凭证缺失在任何网络调用之前失败。
#[derive(Clone)]
pub struct SerpClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl SerpClient {
    /// 创建新的 SERP 客户端
    ///
    /// # 参数
    ///
    /// * `api_key` - 提供商凭证
    /// * `base_url` - 提供商端点，测试时可指向 mock 服务
    /// * `timeout` - 单次调用超时时间
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout,
        })
    }

    /// 判断凭证是否已配置
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.base_url.is_empty()
    }

    /// 获取查询对应的渲染标记
    ///
    /// 非成功状态码和空结果列表都视为可重试的瞬时失败。
    /// 传入代理时通过该出口身份发起请求，否则直连。
    pub async fn fetch_rendered(
        &self,
        query: &str,
        proxy: Option<&ProxyDetails>,
    ) -> Result<String, ScrapeError> {
        if !self.has_credentials() {
            return Err(ScrapeError::MissingCredentials);
        }

        let url = Url::parse(&format!("{}/search", self.base_url.trim_end_matches('/')))
            .map_err(|e| ScrapeError::Other(format!("invalid provider endpoint: {}", e)))?;
        debug!("SERP request: query={}, proxy={:?}", query, proxy.map(|p| p.key()));

        // 每个尝试可能使用不同的出口身份，按需构建带代理的客户端
        let response = match proxy {
            Some(p) => {
                let proxied = Client::builder()
                    .user_agent(USER_AGENT)
                    .timeout(self.timeout)
                    .proxy(reqwest::Proxy::all(p.proxy_url())?)
                    .build()?;
                proxied
                    .post(url)
                    .bearer_auth(&self.api_key)
                    .json(&SerpRequest {
                        query,
                        render: "html",
                    })
                    .send()
                    .await?
            }
            None => {
                self.client
                    .post(url)
                    .bearer_auth(&self.api_key)
                    .json(&SerpRequest {
                        query,
                        render: "html",
                    })
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("SERP provider returned HTTP {}", status);
            return Err(ScrapeError::ProviderStatus(status.as_u16()));
        }

        let body: SerpResponse = response.json().await?;

        if !(200..300).contains(&body.status_code) {
            warn!("SERP provider reported status_code {}", body.status_code);
            return Err(ScrapeError::ProviderStatus(body.status_code));
        }

        let block = body.results.into_iter().next().ok_or_else(|| {
            warn!("SERP provider returned empty result list for '{}'", query);
            ScrapeError::EmptyResults
        })?;

        info!(
            "SERP provider returned rendered markup: {} bytes",
            block.content.len()
        );
        Ok(block.content)
    }
}
