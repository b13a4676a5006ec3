// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 包含抓取作业、人流数据和代理等核心业务实体
pub mod crowd_data;
pub mod job;
pub mod proxy;
