// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施模块
///
/// 提供外部服务集成：SERP 数据提供商、代理提供商和仓库实现
pub mod memory_repository;
pub mod proxy_provider;
pub mod serp_client;
