// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crowdrs::infrastructure::proxy_provider::ProxyProviderClient;
use crowdrs::proxy::{ProxyManager, ProxyManagerConfig};
use std::time::Duration;
use wiremock::matchers::{bearer_token, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pool_config() -> ProxyManagerConfig {
    ProxyManagerConfig {
        rotation_threshold: 5,
        max_fail_count: 2,
        max_usage_per_batch: 3,
        refresh_interval: Duration::from_secs(3600),
        rate_limit_delay: Duration::from_millis(1),
    }
}

fn record(ip: &str, port: u16) -> serde_json::Value {
    serde_json::json!({"ip": ip, "port": port, "country": "US"})
}

async fn provider_with(records: serde_json::Value) -> (MockServer, ProxyProviderClient) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(bearer_token("proxy-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records))
        .mount(&server)
        .await;
    let client = ProxyProviderClient::new("proxy-key", server.uri());
    (server, client)
}

#[tokio::test]
async fn test_initialize_populates_pool_from_provider() {
    let (_server, client) = provider_with(serde_json::json!([
        record("10.0.0.1", 8080),
        record("10.0.0.2", 3128),
    ]))
    .await;

    let manager = ProxyManager::new(Some(client), pool_config());
    manager.initialize().await.unwrap();

    assert_eq!(manager.get_active_proxy_count(), 2);
    let keys: Vec<String> = manager.get_all_proxies().iter().map(|p| p.key()).collect();
    assert!(keys.contains(&"10.0.0.1:8080".to_string()));
    assert!(keys.contains(&"10.0.0.2:3128".to_string()));
}

#[tokio::test]
async fn test_round_robin_distribution_over_pool() {
    let (_server, client) = provider_with(serde_json::json!([
        record("10.0.0.1", 8080),
        record("10.0.0.2", 3128),
    ]))
    .await;

    let manager = ProxyManager::new(Some(client), pool_config());
    manager.initialize().await.unwrap();

    let first = manager.get_proxy().await.unwrap();
    let second = manager.get_proxy().await.unwrap();
    let third = manager.get_proxy().await.unwrap();

    assert_ne!(first.key(), second.key());
    assert_eq!(first.key(), third.key());
    assert_eq!(manager.get_stats().total_requests, 3);
}

#[tokio::test]
async fn test_repeated_failures_deactivate_proxy() {
    let (_server, client) = provider_with(serde_json::json!([
        record("10.0.0.1", 8080),
        record("10.0.0.2", 3128),
    ]))
    .await;

    let manager = ProxyManager::new(Some(client), pool_config());
    manager.initialize().await.unwrap();

    let victim = manager
        .get_all_proxies()
        .into_iter()
        .find(|p| p.key() == "10.0.0.1:8080")
        .unwrap();

    // max_fail_count = 2
    manager.report_proxy_failure(&victim, "connect timeout");
    assert_eq!(manager.get_active_proxy_count(), 2);
    manager.report_proxy_failure(&victim, "connect timeout");
    assert_eq!(manager.get_active_proxy_count(), 1);

    // 分发只会命中幸存的代理
    for _ in 0..4 {
        let picked = manager.get_proxy().await.unwrap();
        assert_eq!(picked.key(), "10.0.0.2:3128");
    }
}

#[tokio::test]
async fn test_success_report_resets_failure_streak() {
    let (_server, client) =
        provider_with(serde_json::json!([record("10.0.0.1", 8080)])).await;

    let manager = ProxyManager::new(Some(client), pool_config());
    manager.initialize().await.unwrap();

    let proxy = manager.get_all_proxies().remove(0);
    manager.report_proxy_failure(&proxy, "timeout");
    manager.report_proxy_success(&proxy, Some(120));
    manager.report_proxy_failure(&proxy, "timeout");

    // 连续失败从未达到阈值
    assert_eq!(manager.get_active_proxy_count(), 1);

    let stats = manager.get_stats();
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 2);
    assert!((stats.average_response_time - 120.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_refresh_prunes_deactivated_entries() {
    let server = MockServer::start().await;
    // 第一次返回两条，之后只返回幸存的一条
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            record("10.0.0.1", 8080),
            record("10.0.0.2", 3128),
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([record("10.0.0.2", 3128)])),
        )
        .mount(&server)
        .await;

    let client = ProxyProviderClient::new("proxy-key", server.uri());
    let manager = ProxyManager::new(Some(client), pool_config());
    manager.initialize().await.unwrap();
    assert_eq!(manager.get_active_proxy_count(), 2);

    // 连续失败停用 10.0.0.1，刷新时被剪除且提供商不再返回它
    let victim = manager
        .get_all_proxies()
        .into_iter()
        .find(|p| p.key() == "10.0.0.1:8080")
        .unwrap();
    manager.report_proxy_failure(&victim, "connect refused");
    manager.report_proxy_failure(&victim, "connect refused");

    manager.refresh_pool().await.unwrap();
    let keys: Vec<String> = manager.get_all_proxies().iter().map(|p| p.key()).collect();
    assert_eq!(keys, vec!["10.0.0.2:3128".to_string()]);
}

#[tokio::test]
async fn test_manager_without_provider_hands_out_nothing() {
    let manager = ProxyManager::new(None, pool_config());
    manager.initialize().await.unwrap();

    assert_eq!(manager.get_active_proxy_count(), 0);
    assert!(manager.get_proxy().await.is_none());
}
