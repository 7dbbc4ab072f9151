//! 流统计模块
//!
//! 在提交 / 完成回调中收集统计信息，所有操作都是 lock-free 的

use std::sync::atomic::{AtomicU64, Ordering};

/// 输出流统计收集器
pub struct StreamStats {
    lists_submitted: AtomicU64,
    lists_completed: AtomicU64,
    bytes_submitted: AtomicU64,

    // 传输层报告的错误
    list_errors: AtomicU64,
    frame_errors: AtomicU64,

    // 帧大小历史不足，无法准备帧列表
    history_underruns: AtomicU64,
    // 音频数据不足，以静音帧代替
    audio_underruns: AtomicU64,
    // 帧大小既不是标称值也不是标称值 +1
    irregular_frames: AtomicU64,
    // 帧大小历史不足时以整列静音代替
    silent_lists: AtomicU64,

    // 跨越缓冲区末尾、需要拼接两段的帧
    wrap_splices: AtomicU64,

    // 生产者写游标回绕
    producer_wraps: AtomicU64,
    last_wrap_timestamp: AtomicU64,

    // 最近完成的帧列表进度
    last_completed_offset: AtomicU64,
    last_completed_frame: AtomicU64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self {
            lists_submitted: AtomicU64::new(0),
            lists_completed: AtomicU64::new(0),
            bytes_submitted: AtomicU64::new(0),
            list_errors: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
            history_underruns: AtomicU64::new(0),
            audio_underruns: AtomicU64::new(0),
            irregular_frames: AtomicU64::new(0),
            silent_lists: AtomicU64::new(0),
            wrap_splices: AtomicU64::new(0),
            producer_wraps: AtomicU64::new(0),
            last_wrap_timestamp: AtomicU64::new(0),
            last_completed_offset: AtomicU64::new(0),
            last_completed_frame: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_submitted(&self, bytes: u64) {
        self.lists_submitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_submitted.fetch_add(bytes, Ordering::Relaxed);
    }

    /// 记录一个完成的帧列表及其进度标签
    #[inline]
    pub fn record_completed(&self, byte_offset: u64, frame_number: u64) {
        self.lists_completed.fetch_add(1, Ordering::Relaxed);
        self.last_completed_offset
            .store(byte_offset, Ordering::Relaxed);
        self.last_completed_frame
            .store(frame_number, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_list_error(&self) {
        self.list_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_errors(&self, count: u64) {
        self.frame_errors.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_history_underrun(&self) {
        self.history_underruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_audio_underrun(&self) {
        self.audio_underruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_irregular_frame(&self) {
        self.irregular_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_silent_list(&self) {
        self.silent_lists.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_wrap_splice(&self) {
        self.wrap_splices.fetch_add(1, Ordering::Relaxed);
    }

    /// 生产者回绕钩子调用
    #[inline]
    pub fn record_producer_wrap(&self, timestamp: u64) {
        self.producer_wraps.fetch_add(1, Ordering::Relaxed);
        self.last_wrap_timestamp.store(timestamp, Ordering::Relaxed);
    }

    #[inline]
    pub fn lists_submitted(&self) -> u64 {
        self.lists_submitted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn lists_completed(&self) -> u64 {
        self.lists_completed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn history_underruns(&self) -> u64 {
        self.history_underruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn audio_underruns(&self) -> u64 {
        self.audio_underruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn wrap_splices(&self) -> u64 {
        self.wrap_splices.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn irregular_frames(&self) -> u64 {
        self.irregular_frames.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn silent_lists(&self) -> u64 {
        self.silent_lists.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn producer_wraps(&self) -> u64 {
        self.producer_wraps.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn last_wrap_timestamp(&self) -> u64 {
        self.last_wrap_timestamp.load(Ordering::Relaxed)
    }

    /// 生成报告
    pub fn report(&self) -> StatsReport {
        StatsReport {
            lists_submitted: self.lists_submitted.load(Ordering::Relaxed),
            lists_completed: self.lists_completed.load(Ordering::Relaxed),
            bytes_submitted: self.bytes_submitted.load(Ordering::Relaxed),
            list_errors: self.list_errors.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            history_underruns: self.history_underruns.load(Ordering::Relaxed),
            audio_underruns: self.audio_underruns.load(Ordering::Relaxed),
            irregular_frames: self.irregular_frames.load(Ordering::Relaxed),
            silent_lists: self.silent_lists.load(Ordering::Relaxed),
            wrap_splices: self.wrap_splices.load(Ordering::Relaxed),
            producer_wraps: self.producer_wraps.load(Ordering::Relaxed),
            last_wrap_timestamp: self.last_wrap_timestamp.load(Ordering::Relaxed),
            last_completed_offset: self.last_completed_offset.load(Ordering::Relaxed),
            last_completed_frame: self.last_completed_frame.load(Ordering::Relaxed),
        }
    }

    /// 重置统计
    pub fn reset(&self) {
        for counter in [
            &self.lists_submitted,
            &self.lists_completed,
            &self.bytes_submitted,
            &self.list_errors,
            &self.frame_errors,
            &self.history_underruns,
            &self.audio_underruns,
            &self.irregular_frames,
            &self.silent_lists,
            &self.wrap_splices,
            &self.producer_wraps,
            &self.last_wrap_timestamp,
            &self.last_completed_offset,
            &self.last_completed_frame,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 统计报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    pub lists_submitted: u64,
    pub lists_completed: u64,
    pub bytes_submitted: u64,
    pub list_errors: u64,
    pub frame_errors: u64,
    pub history_underruns: u64,
    pub audio_underruns: u64,
    pub irregular_frames: u64,
    pub silent_lists: u64,
    pub wrap_splices: u64,
    pub producer_wraps: u64,
    pub last_wrap_timestamp: u64,
    pub last_completed_offset: u64,
    pub last_completed_frame: u64,
}

impl std::fmt::Display for StatsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Stream Statistics")?;
        writeln!(f, "=================")?;
        writeln!(f, "Frame lists submitted: {}", self.lists_submitted)?;
        writeln!(f, "Frame lists completed: {}", self.lists_completed)?;
        writeln!(f, "Bytes submitted: {}", self.bytes_submitted)?;
        writeln!(f)?;

        writeln!(f, "Transport errors:")?;
        writeln!(f, "  Lists: {}", self.list_errors)?;
        writeln!(f, "  Frames: {}", self.frame_errors)?;
        writeln!(f)?;

        writeln!(f, "Pacing:")?;
        writeln!(f, "  Frame size history underruns: {}", self.history_underruns)?;
        writeln!(f, "  Audio underruns (silent frames): {}", self.audio_underruns)?;
        writeln!(f, "  Irregular frame sizes: {}", self.irregular_frames)?;
        writeln!(f, "  Silent frame lists: {}", self.silent_lists)?;
        writeln!(f, "  Wrap splices: {}", self.wrap_splices)?;
        writeln!(f)?;

        writeln!(f, "Producer wraps: {}", self.producer_wraps)?;
        writeln!(
            f,
            "Last wrap timestamp: {:.3} ms",
            self.last_wrap_timestamp as f64 / 1_000_000.0
        )?;
        writeln!(
            f,
            "Last completed: offset {} @ frame {}",
            self.last_completed_offset, self.last_completed_frame
        )?;

        Ok(())
    }
}
