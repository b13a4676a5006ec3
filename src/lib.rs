// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体和仓库接口
pub mod domain;

/// 基础设施模块
///
/// 提供外部服务集成，如 SERP 提供商、代理提供商和数据仓库
pub mod infrastructure;

/// 代理模块
///
/// 管理出口代理身份池的分发、统计与刷新
pub mod proxy;

/// 调度器模块
///
/// 实现优先级作业队列和周期性排水调度
pub mod scheduler;

/// 抓取器模块
///
/// 获取渲染后的页面并提取餐厅人流数据
pub mod scraper;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;
