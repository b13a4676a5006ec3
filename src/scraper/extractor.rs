use crate::domain::models::crowd_data::{CrowdLevel, CrowdLevelData, PeakHour};
use chrono::{Local, Timelike};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use tracing::{debug, info};

/// 繁忙度组件的文本地标
///
/// 页面缺少该地标时说明目标没有繁忙度数据，不是错误
const POPULAR_TIMES_LANDMARK: &str = "popular times";

fn percent_busy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})%\s*busy").unwrap())
}

fn time_spent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 时长数字可以带小数点（"1.5 hours"），单位词跟在数字之后
    RE.get_or_init(|| {
        Regex::new(r"(?i)people typically spend\s+(?:up to\s+)?([0-9][0-9.]*(?:\s+[a-z]+)+?)(?:\s+here)?[.<]")
            .unwrap()
    })
}

fn peak_hour_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d{1,3})%\s*busy\s+at\s+(\d{1,2})\s*(AM|PM)").unwrap())
}

/// 按子串规则对繁忙度短语分类
///
/// 优先级遵循既有文档化顺序：先检查 "not busy" 变体，
/// 再检查 "usually"（一般），最后才是裸 "busy"
pub fn classify_busyness(text: &str) -> CrowdLevel {
    let lower = text.to_lowercase();

    if lower.contains("not busy") || lower.contains("not too busy") {
        CrowdLevel::NotBusy
    } else if lower.contains("usually") {
        CrowdLevel::Moderate
    } else if lower.contains("busy") {
        CrowdLevel::Busy
    } else {
        CrowdLevel::Unknown
    }
}

/// 从渲染后的页面标记提取人流数据
///
/// 先定位 "Popular times" 地标，缺失时返回 None（目标无繁忙度
/// 组件，视为无信号的成功抓取）。存在时按就近/当前小时规则定位
/// 繁忙度短语并分类，同时独立提取平均停留时间短语。
pub fn extract_crowd_data_from_page(
    html: &str,
    restaurant_name: Option<&str>,
) -> Option<CrowdLevelData> {
    let document = Html::parse_document(html);
    let full_text: String = document.root_element().text().collect::<Vec<_>>().join(" ");

    if !full_text.to_lowercase().contains(POPULAR_TIMES_LANDMARK) {
        debug!("No popular-times landmark in markup");
        return None;
    }

    info!("Popular-times landmark found, extracting crowd signal");

    // 收集 aria-label 短语，Google 的繁忙度柱状图把数据放在这里
    let aria_selector = Selector::parse("[aria-label]").unwrap();
    let aria_labels: Vec<String> = document
        .select(&aria_selector)
        .filter_map(|e| e.value().attr("aria-label"))
        .map(|s| s.to_string())
        .collect();

    let current_phrase = locate_current_phrase(&aria_labels, &full_text);

    let crowd_level = current_phrase
        .as_deref()
        .map(classify_busyness)
        .unwrap_or(CrowdLevel::Unknown);

    let crowd_percentage = current_phrase.as_deref().and_then(|phrase| {
        percent_busy_re()
            .captures(phrase)
            .and_then(|c| c[1].parse::<u8>().ok())
            .filter(|p| *p <= 100)
    });

    let mut data = CrowdLevelData::new(restaurant_name.map(|s| s.to_string()), crowd_level);
    data.crowd_percentage = crowd_percentage;
    data.average_time_spent = extract_average_time_spent(&full_text);
    data.peak_hours = extract_peak_hours(&aria_labels);

    Some(data)
}

/// 定位描述当前时段繁忙度的短语
///
/// 策略 1: 带 "Currently"/"Live" 标记的短语（当前选中）
/// 策略 2: 匹配本地当前小时的 aria-label
/// 策略 3: 回退到全文中第一个可分类的繁忙度短语
fn locate_current_phrase(aria_labels: &[String], full_text: &str) -> Option<String> {
    for label in aria_labels {
        let lower = label.to_lowercase();
        if lower.contains("currently") || lower.contains("live") {
            return Some(label.clone());
        }
    }

    let now = Local::now();
    let (hour12, meridiem) = hour_display(now.hour());
    let marker = format!("at {} {}", hour12, meridiem);
    for label in aria_labels {
        if label.to_lowercase().contains(&marker.to_lowercase()) {
            return Some(label.clone());
        }
    }

    // 句子级回退：在地标附近找第一段提到 busy 的文本
    for sentence in full_text.split(['.', ';', '\n']) {
        if classify_busyness(sentence) != CrowdLevel::Unknown {
            return Some(sentence.trim().to_string());
        }
    }

    None
}

/// 提取平均停留时间短语，缺失时返回 "unknown"
fn extract_average_time_spent(full_text: &str) -> String {
    // 句点可能缺失，补一个以便统一匹配
    let padded = format!("{}.", full_text);
    time_spent_re()
        .captures(&padded)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// 从占用率短语收集高峰时段
fn extract_peak_hours(aria_labels: &[String]) -> Option<Vec<PeakHour>> {
    let day = Local::now().format("%A").to_string();
    let mut hours = Vec::new();

    for label in aria_labels {
        if let Some(caps) = peak_hour_re().captures(label) {
            let pct: u8 = match caps[1].parse() {
                Ok(p) if p <= 100 => p,
                _ => continue,
            };
            let hour12: u8 = match caps[2].parse() {
                Ok(h) if (1..=12).contains(&h) => h,
                _ => continue,
            };
            let hour = to_hour24(hour12, &caps[3]);

            let level = if pct >= 70 {
                CrowdLevel::Busy
            } else if pct >= 40 {
                CrowdLevel::Moderate
            } else {
                CrowdLevel::NotBusy
            };

            hours.push(PeakHour {
                day: day.clone(),
                hour,
                level,
            });
        }
    }

    if hours.is_empty() {
        None
    } else {
        Some(hours)
    }
}

fn hour_display(hour24: u32) -> (u32, &'static str) {
    match hour24 {
        0 => (12, "AM"),
        1..=11 => (hour24, "AM"),
        12 => (12, "PM"),
        _ => (hour24 - 12, "PM"),
    }
}

fn to_hour24(hour12: u8, meridiem: &str) -> u8 {
    match (hour12, meridiem.eq_ignore_ascii_case("pm")) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    }
}
