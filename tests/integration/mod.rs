// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 集成测试主模块
///
/// 覆盖调度器到抓取器的完整管道、代理池轮换以及数据仓库写回
mod helpers;
mod pipeline_test;
mod proxy_pool_test;
