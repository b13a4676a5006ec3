use crate::domain::models::proxy::ProxyDetails;
use crate::utils::errors::ProxyError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// 代理提供商返回的单条记录
#[derive(Debug, Deserialize)]
pub struct ProxyRecord {
    pub ip: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl From<ProxyRecord> for ProxyDetails {
    fn from(record: ProxyRecord) -> Self {
        let mut proxy = ProxyDetails::new(record.ip, record.port);
        proxy.username = record.username;
        proxy.password = record.password;
        proxy.country = record.country;
        proxy.city = record.city;
        proxy.state = record.state;
        proxy
    }
}

/// 代理提供商客户端
///
/// 一次 GET 调用返回代理记录数组，使用 bearer 凭证认证
pub struct ProxyProviderClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ProxyProviderClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// 拉取代理列表
    pub async fn fetch_proxies(&self) -> Result<Vec<ProxyDetails>, ProxyError> {
        let response = self
            .client
            .get(&self.base_url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Proxy provider returned HTTP {}", status);
            return Err(ProxyError::ProviderStatus(status.as_u16()));
        }

        let records: Vec<ProxyRecord> = response.json().await?;
        info!("Proxy provider returned {} proxies", records.len());

        Ok(records.into_iter().map(ProxyDetails::from).collect())
    }
}
