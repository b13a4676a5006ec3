// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 代理模块
///
/// 管理出口代理身份池的分发、统计与刷新
pub mod manager;

pub use manager::{ProxyManager, ProxyManagerConfig};
