//! 帧号调度
//!
//! 把端点轮询间隔换算成每个帧列表周期占用的帧号增量，
//! 并依次分配单调递增的目标帧号。

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, StreamError};
use crate::transport::EndpointDescriptor;

/// 起始帧号至少要比当前帧号多出的帧数，留出准备数据的时间
pub const START_SAFETY_FRAMES: u64 = 10;

/// 每个硬件帧包含的传输帧（微帧）数
pub const MICROFRAMES_PER_FRAME: u32 = 8;

/// 帧号调度器
///
/// `next_frame_number` 只应由完成上下文调用，不可重入。
pub struct FrameScheduler {
    frames_per_list: u32,
    next_usable_frame: AtomicU64,
    increase_per_cycle: AtomicU64,
}

impl FrameScheduler {
    pub fn new(frames_per_list: u32) -> Self {
        Self {
            frames_per_list,
            next_usable_frame: AtomicU64::new(0),
            increase_per_cycle: AtomicU64::new(0),
        }
    }

    /// 轮询周期（帧数）= 2^(b_interval-1)
    pub fn poll_interval(b_interval: u8) -> Result<u64> {
        if !(1..=16).contains(&b_interval) {
            return Err(StreamError::BadArgument);
        }
        Ok(1u64 << (b_interval - 1))
    }

    /// 根据端点描述重新计算每周期帧号增量
    ///
    /// 帧列表不是整数个硬件帧时返回 `BadArgument`。
    pub fn reset(&self, endpoint: Option<&EndpointDescriptor>) -> Result<()> {
        let endpoint = endpoint.ok_or(StreamError::NotOpen)?;
        let poll_interval = Self::poll_interval(endpoint.b_interval)?;
        if self.frames_per_list == 0 || self.frames_per_list % MICROFRAMES_PER_FRAME != 0 {
            return Err(StreamError::BadArgument);
        }

        let increase = u64::from(self.frames_per_list / MICROFRAMES_PER_FRAME) * poll_interval;
        self.increase_per_cycle.store(increase, Ordering::Release);

        log::debug!(
            "Scheduler reset: bInterval {} -> poll interval {}, {} frames per cycle",
            endpoint.b_interval,
            poll_interval,
            increase
        );
        Ok(())
    }

    /// 设置第一个目标帧号
    ///
    /// 离 `current_frame` 太近（不足 `START_SAFETY_FRAMES`）时返回 `Timeout`，
    /// 调用方应换一个更晚的帧号重试。
    pub fn start(&self, target_frame: u64, current_frame: u64) -> Result<()> {
        if target_frame < current_frame.saturating_add(START_SAFETY_FRAMES) {
            log::debug!(
                "Start frame {} too close to current frame {}",
                target_frame,
                current_frame
            );
            return Err(StreamError::Timeout);
        }
        self.next_usable_frame.store(target_frame, Ordering::Release);
        Ok(())
    }

    /// 返回当前目标帧号并前进一个周期
    #[inline]
    pub fn next_frame_number(&self) -> u64 {
        let increase = self.increase_per_cycle.load(Ordering::Acquire);
        self.next_usable_frame.fetch_add(increase, Ordering::AcqRel)
    }

    #[inline]
    pub fn increase_per_cycle(&self) -> u64 {
        self.increase_per_cycle.load(Ordering::Acquire)
    }

    #[inline]
    pub fn next_usable_frame(&self) -> u64 {
        self.next_usable_frame.load(Ordering::Acquire)
    }

    pub fn frames_per_list(&self) -> u32 {
        self.frames_per_list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(b_interval: u8) -> EndpointDescriptor {
        EndpointDescriptor {
            address: 0x01,
            b_interval,
            max_packet_size: 392,
        }
    }

    #[test]
    fn test_reset_requires_open_pipe() {
        let scheduler = FrameScheduler::new(64);
        assert_eq!(scheduler.reset(None), Err(StreamError::NotOpen));
    }

    #[test]
    fn test_increase_per_cycle() {
        let scheduler = FrameScheduler::new(64);

        scheduler.reset(Some(&endpoint(1))).unwrap();
        assert_eq!(scheduler.increase_per_cycle(), 8);

        scheduler.reset(Some(&endpoint(4))).unwrap();
        assert_eq!(scheduler.increase_per_cycle(), 64);

        let short = FrameScheduler::new(16);
        short.reset(Some(&endpoint(2))).unwrap();
        assert_eq!(short.increase_per_cycle(), 4);
    }

    #[test]
    fn test_invalid_b_interval() {
        let scheduler = FrameScheduler::new(64);
        assert_eq!(scheduler.reset(Some(&endpoint(0))), Err(StreamError::BadArgument));
        assert_eq!(scheduler.reset(Some(&endpoint(17))), Err(StreamError::BadArgument));
    }

    #[test]
    fn test_partial_hardware_frames_rejected() {
        for frames_per_list in [0, 1, 4, 12] {
            let scheduler = FrameScheduler::new(frames_per_list);
            assert_eq!(
                scheduler.reset(Some(&endpoint(1))),
                Err(StreamError::BadArgument)
            );
            assert_eq!(scheduler.increase_per_cycle(), 0);
        }
    }

    #[test]
    fn test_start_safety_margin() {
        let scheduler = FrameScheduler::new(64);
        scheduler.reset(Some(&endpoint(1))).unwrap();

        assert_eq!(scheduler.start(1009, 1000), Err(StreamError::Timeout));
        assert_eq!(scheduler.start(500, 1000), Err(StreamError::Timeout));
        assert_eq!(scheduler.start(1010, 1000), Ok(()));
        assert_eq!(scheduler.next_usable_frame(), 1010);
    }

    #[test]
    fn test_next_frame_numbers_are_arithmetic() {
        let scheduler = FrameScheduler::new(64);
        scheduler.reset(Some(&endpoint(3))).unwrap();
        scheduler.start(2000, 1000).unwrap();

        let step = scheduler.increase_per_cycle();
        assert_eq!(step, 32);

        let frames: Vec<u64> = (0..10).map(|_| scheduler.next_frame_number()).collect();
        assert_eq!(frames[0], 2000);
        for pair in frames.windows(2) {
            assert!(pair[1] > pair[0]);
            assert_eq!(pair[1] - pair[0], step);
        }
    }
}
