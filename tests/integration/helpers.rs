// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crowdrs::scheduler::SchedulerConfig;
use crowdrs::scraper::{CrowdScraper, ScraperConfig};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 包含繁忙度组件的渲染页面样例
pub const POPULAR_TIMES_PAGE: &str = r#"
<html><body>
    <div class="section">
        <h2>Popular times</h2>
        <div aria-label="Currently 75% busy."></div>
        <div aria-label="45% busy at 1 PM."></div>
        <div aria-label="80% busy at 7 PM."></div>
        <span>People typically spend 45 min here.</span>
    </div>
</body></html>
"#;

/// 不含繁忙度组件的渲染页面样例
pub const NO_WIDGET_PAGE: &str =
    "<html><body><h1>Opening hours</h1><p>Mon-Sun 11am-10pm</p></body></html>";

pub fn serp_body(content: &str) -> serde_json::Value {
    serde_json::json!({"status_code": 200, "results": [{"content": content}]})
}

/// 启动始终返回给定页面的 SERP mock 服务
pub async fn serp_server_with(content: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serp_body(content)))
        .mount(&server)
        .await;
    server
}

pub fn test_scraper(server: &MockServer, retry_attempts: u32) -> Arc<CrowdScraper> {
    Arc::new(
        CrowdScraper::new(
            ScraperConfig {
                api_key: "integration-key".into(),
                base_url: server.uri(),
                timeout: Duration::from_secs(5),
                retry_attempts,
                retry_delay: Duration::from_millis(10),
                batch_size: 2,
                batch_pause: Duration::from_millis(10),
            },
            None,
        )
        .expect("scraper should build"),
    )
}

pub fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent_jobs: 4,
        max_retries: 2,
        retry_delay_base: Duration::from_millis(10),
        high_interval: Duration::from_millis(50),
        medium_interval: Duration::from_millis(50),
        low_interval: Duration::from_millis(50),
        popular_interval: Duration::from_millis(100),
    }
}

/// 轮询等待条件成立，超时 panic
pub async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
