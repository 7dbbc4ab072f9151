//! 时间相关函数
//!
//! 提供进程内单调时钟（纳秒）以及纳秒与传输帧号之间的换算。
//! 时间戳用于环形缓冲区的回绕通知，帧号换算用于模拟设备帧计数器。

use std::sync::OnceLock;
use std::time::Instant;

/// 时钟零点（首次调用时确定，全局只初始化一次）
static EPOCH: OnceLock<Instant> = OnceLock::new();

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// 获取当前时间（纳秒，自进程内时钟零点起）
#[inline]
pub fn now_ns() -> u64 {
    let epoch = *EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// 每帧时长（纳秒）
#[inline]
pub fn frame_period_ns(frames_per_second: u32) -> u64 {
    NANOS_PER_SEC / frames_per_second.max(1) as u64
}

/// 纳秒 → 帧号（向下取整）
#[inline]
pub fn ns_to_frames(ns: u64, frames_per_second: u32) -> u64 {
    // u128 中间值避免长时间运行后溢出
    (ns as u128 * frames_per_second as u128 / NANOS_PER_SEC as u128) as u64
}

/// 帧号 → 纳秒
#[inline]
pub fn frames_to_ns(frames: u64, frames_per_second: u32) -> u64 {
    (frames as u128 * NANOS_PER_SEC as u128 / frames_per_second.max(1) as u128) as u64
}
