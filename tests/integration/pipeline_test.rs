// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    serp_body, serp_server_with, test_scheduler_config, test_scraper, wait_for, NO_WIDGET_PAGE,
    POPULAR_TIMES_PAGE,
};
use chrono::Duration as ChronoDuration;
use crowdrs::domain::models::crowd_data::CrowdLevel;
use crowdrs::domain::models::job::{JobPriority, JobStatus, ScrapingTarget};
use crowdrs::domain::repositories::crowd_data_repository::CrowdDataRepository;
use crowdrs::infrastructure::memory_repository::MemoryCrowdRepository;
use crowdrs::scheduler::JobScheduler;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_scheduled_job_produces_extracted_crowd_data() {
    let server = serp_server_with(POPULAR_TIMES_PAGE).await;
    let scheduler = JobScheduler::new(test_scheduler_config(), test_scraper(&server, 0), None);

    let id = scheduler.schedule_job(
        ScrapingTarget::new("golden-wok", "Golden Wok").with_location("Austin, TX"),
        JobPriority::High,
        None,
    );

    // 高优先级到期作业带外派发，无需等定时器
    wait_for(|| !scheduler.get_job_history(None).is_empty()).await;

    let job = scheduler.get_job(id).expect("job should be in history");
    assert_eq!(job.status, JobStatus::Completed);

    let result = job.result.expect("completed job carries result");
    assert!(result.success);

    let data = result.data.expect("page has a popular-times widget");
    assert_eq!(data.crowd_level, CrowdLevel::Busy);
    assert_eq!(data.crowd_percentage, Some(75));
    assert_eq!(data.average_time_spent, "45 min");
    assert_eq!(data.restaurant_name.as_deref(), Some("Golden Wok"));
    assert_eq!(data.source, "google");
    assert_eq!(data.peak_hours.expect("peaks present").len(), 2);
}

#[tokio::test]
async fn test_page_without_widget_completes_with_no_data() {
    let server = serp_server_with(NO_WIDGET_PAGE).await;
    let scheduler = JobScheduler::new(test_scheduler_config(), test_scraper(&server, 0), None);

    let id = scheduler.schedule_job(
        ScrapingTarget::new("quiet-place", "Quiet Place"),
        JobPriority::High,
        None,
    );

    wait_for(|| !scheduler.get_job_history(None).is_empty()).await;

    let job = scheduler.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.unwrap();
    assert!(result.success);
    assert!(result.data.is_none());
}

#[tokio::test]
async fn test_transient_provider_failure_recovers_within_job() {
    let server = MockServer::start().await;
    // 前两次调用 500，之后恢复
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serp_body(POPULAR_TIMES_PAGE)))
        .mount(&server)
        .await;

    let scheduler = JobScheduler::new(test_scheduler_config(), test_scraper(&server, 3), None);

    let id = scheduler.schedule_job(
        ScrapingTarget::new("golden-wok", "Golden Wok"),
        JobPriority::High,
        None,
    );

    wait_for(|| !scheduler.get_job_history(None).is_empty()).await;

    let job = scheduler.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    // 抓取器内部消耗了两次重试
    assert_eq!(job.result.unwrap().retry_count, 2);
}

#[tokio::test]
async fn test_exhausted_job_fails_with_error_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = test_scheduler_config();
    config.max_retries = 1;
    let scheduler = JobScheduler::new(config, test_scraper(&server, 0), None);

    let id = scheduler.schedule_job(
        ScrapingTarget::new("golden-wok", "Golden Wok"),
        JobPriority::Low,
        None,
    );

    // 先排空，失败后重新入队，再排空直至预算耗尽
    scheduler.drain_due(JobPriority::Low).await;
    wait_for(|| {
        scheduler
            .get_job(id)
            .map(|j| j.status == JobStatus::Pending && j.retry_count == 1)
            .unwrap_or(false)
    })
    .await;

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    scheduler.drain_due(JobPriority::Low).await;

    wait_for(|| {
        scheduler
            .get_job(id)
            .map(|j| j.status == JobStatus::Failed)
            .unwrap_or(false)
    })
    .await;

    let job = scheduler.get_job(id).unwrap();
    // 初次尝试 + 1 次重试
    assert_eq!(job.retry_count, 2);
    let result = job.result.unwrap();
    assert!(!result.success);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_successful_scrape_writes_through_repository() {
    let server = serp_server_with(POPULAR_TIMES_PAGE).await;
    let repo = Arc::new(MemoryCrowdRepository::new(ChronoDuration::minutes(30)));
    let scheduler = JobScheduler::new(
        test_scheduler_config(),
        test_scraper(&server, 0),
        Some(repo.clone()),
    );

    scheduler.schedule_job(
        ScrapingTarget::new("golden-wok", "Golden Wok"),
        JobPriority::High,
        None,
    );

    wait_for(|| !scheduler.get_job_history(None).is_empty()).await;

    let stored = repo
        .get_latest_crowd_data("golden-wok")
        .await
        .unwrap()
        .expect("result should be written through");
    assert_eq!(stored.crowd_level, CrowdLevel::Busy);
}

#[tokio::test]
async fn test_fresh_repository_record_short_circuits_provider() {
    let server = MockServer::start().await;
    // 任何到达提供商的调用都会让作业失败
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let repo = Arc::new(MemoryCrowdRepository::new(ChronoDuration::minutes(30)));
    let cached = crowdrs::domain::models::crowd_data::CrowdLevelData::new(
        Some("Golden Wok".into()),
        CrowdLevel::Moderate,
    );
    repo.store_crowd_data("golden-wok", cached).await.unwrap();

    let scheduler = JobScheduler::new(
        test_scheduler_config(),
        test_scraper(&server, 0),
        Some(repo),
    );

    let id = scheduler.schedule_job(
        ScrapingTarget::new("golden-wok", "Golden Wok"),
        JobPriority::High,
        None,
    );

    wait_for(|| !scheduler.get_job_history(None).is_empty()).await;

    let job = scheduler.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        job.result.unwrap().data.unwrap().crowd_level,
        CrowdLevel::Moderate
    );
}

#[tokio::test]
async fn test_timer_driven_drain_processes_queue() {
    let server = serp_server_with(POPULAR_TIMES_PAGE).await;
    let scheduler = JobScheduler::new(test_scheduler_config(), test_scraper(&server, 0), None);

    let targets: Vec<ScrapingTarget> = (0..3)
        .map(|i| ScrapingTarget::new(format!("r-{}", i), format!("Restaurant {}", i)))
        .collect();
    let ids = scheduler.schedule_batch(targets, JobPriority::Medium);
    assert_eq!(ids.len(), 3);

    scheduler.start();
    wait_for(|| scheduler.get_job_history(None).len() == 3).await;
    scheduler.stop();

    assert!(scheduler
        .get_job_history(None)
        .iter()
        .all(|j| j.status == JobStatus::Completed));
    assert!(scheduler.get_pending_jobs().is_empty());
    assert!(scheduler.get_active_jobs().is_empty());
}

#[tokio::test]
async fn test_batch_process_reports_per_restaurant_results() {
    let server = serp_server_with(POPULAR_TIMES_PAGE).await;
    let scraper = test_scraper(&server, 0);

    let names: Vec<String> = (0..5).map(|i| format!("Restaurant {}", i)).collect();
    let results = scraper.batch_process(&names, Some("Austin, TX"), Some(2)).await;

    assert_eq!(results.len(), 5);
    for name in &names {
        let result = &results[name];
        assert!(result.success);
        assert_eq!(
            result.data.as_ref().unwrap().restaurant_name.as_deref(),
            Some(name.as_str())
        );
    }
}

#[tokio::test]
async fn test_cancelled_job_never_reaches_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serp_body(POPULAR_TIMES_PAGE)))
        .expect(0)
        .mount(&server)
        .await;

    let scheduler = JobScheduler::new(test_scheduler_config(), test_scraper(&server, 0), None);

    // 中优先级作业不会被带外派发，取消发生在任何排水之前
    let id = scheduler.schedule_job(
        ScrapingTarget::new("golden-wok", "Golden Wok"),
        JobPriority::Medium,
        None,
    );
    assert!(scheduler.cancel_job(id));

    scheduler.drain_due(JobPriority::Medium).await;

    let job = scheduler.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(scheduler.get_pending_jobs().is_empty());
}
