//! 等时输出流
//!
//! 生命周期：`( init ( start stop )* free )*`
//!
//! ```text
//! Uninitialized → Initialized → Started → Stopping → Stopped → Freed
//!                      ↑                                 │
//!                      └──────── start 可从 Stopped 重新开始
//! ```
//!
//! 两个执行上下文：
//! - 控制上下文：init / start / stop / free
//! - 完成上下文：传输层完成回调，准备并提交下一个帧列表
//!
//! `current_frame_list`、`should_stop`、状态和在途计数是两个上下文共享的原子量。
//! 准备侧状态（音频源、帧大小历史、字节游标）只在 start 之前由控制上下文写入，
//! 之后由完成上下文访问。目标帧号也在它的 Mutex 内分配，与字节游标一起前进。

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::ring_buffer::{CircularBuffer, FrameSizeHistory};
use crate::audio::stats::StreamStats;
use crate::error::{Result, StreamError};
use crate::stream::scheduler::{FrameScheduler, MICROFRAMES_PER_FRAME};
use crate::transport::{
    Completion, CompletionHandler, FrameData, FrameList, IsocFrame, IsochTransport, WriteTag,
};

/// 输出流拥有的传输队列数
const OUTPUT_QUEUES: u32 = 1;

/// 输出流配置
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// 每个帧列表包含的传输帧数，必须是 8 的倍数
    pub frames_per_list: u32,
    /// 同时在途的帧列表数（轮转长度）
    pub frame_lists: u32,
    /// 每个样本（采样帧）的字节数
    pub bytes_per_sample: u32,
}

impl StreamConfig {
    /// 整个轮转的传输帧数
    ///
    /// 帧列表只能覆盖完整的硬件帧（8 个传输帧），否则每周期的帧号增量
    /// 会被截断，相邻帧列表落在同一个或重叠的时间槽上。
    pub fn rotation_frames(&self) -> Result<usize> {
        if self.frames_per_list == 0
            || self.frames_per_list % MICROFRAMES_PER_FRAME != 0
            || self.frame_lists == 0
        {
            return Err(StreamError::BadArgument);
        }
        self.frames_per_list
            .checked_mul(self.frame_lists)
            .map(|frames| frames as usize)
            .ok_or(StreamError::BadArgument)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frames_per_list: 64,
            frame_lists: 4,
            // 立体声 24-bit
            bytes_per_sample: 6,
        }
    }
}

/// 流关闭通知
pub trait StreamListener: Send + Sync {
    /// 所有在途帧列表都已完成；每个 stop 周期恰好调用一次。
    /// 在此之后才可以调用 `free`。
    fn notify_closed(&self);
}

/// 生命周期状态
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Uninitialized = 0,
    Initialized = 1,
    Started = 2,
    Stopping = 3,
    Stopped = 4,
    Freed = 5,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initialized,
            2 => Self::Started,
            3 => Self::Stopping,
            4 => Self::Stopped,
            5 => Self::Freed,
            _ => Self::Uninitialized,
        }
    }
}

/// 帧列表完成后要从音频缓冲区释放的字节
#[derive(Clone, Copy, Debug)]
struct Release {
    bytes: usize,
    generation: u32,
}

/// 准备侧状态
struct PrepareState {
    audio: Option<Arc<CircularBuffer<u8>>>,
    history: Option<Arc<FrameSizeHistory>>,
    /// 标称帧样本数；实际为它或它 +1
    stock_samples_in_frame: u32,
    /// 下一个待发送字节在音频缓冲区中的位置
    previously_prepared_offset: usize,
    /// 已交给传输层、尚未完成的字节数
    pending_bytes: usize,
    /// 每次重新同步加一，旧代的释放请求作废
    generation: u32,
    irregular_reported: bool,
    audio_underrun_reported: bool,
}

impl PrepareState {
    fn new() -> Self {
        Self {
            audio: None,
            history: None,
            stock_samples_in_frame: 0,
            previously_prepared_offset: 0,
            pending_bytes: 0,
            generation: 0,
            irregular_reported: false,
            audio_underrun_reported: false,
        }
    }
}

struct Inner {
    config: StreamConfig,
    transport: Arc<dyn IsochTransport>,
    listener: Arc<dyn StreamListener>,
    scheduler: FrameScheduler,
    stats: Arc<StreamStats>,

    state: AtomicU8,
    /// 下一个预期完成的帧列表编号，模 frame_lists 轮转
    current_frame_list: AtomicU32,
    /// 0 = 运行中；非 0 = 正在停止，每完成一个帧列表加一
    should_stop: AtomicU32,
    in_flight: AtomicU32,
    terminated_queues: AtomicU32,

    prepare: Mutex<PrepareState>,
}

/// 等时输出流
#[derive(Clone)]
pub struct OutputStream {
    inner: Arc<Inner>,
}

impl OutputStream {
    pub fn new(
        config: StreamConfig,
        transport: Arc<dyn IsochTransport>,
        listener: Arc<dyn StreamListener>,
    ) -> Self {
        let scheduler = FrameScheduler::new(config.frames_per_list);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                listener,
                scheduler,
                stats: Arc::new(StreamStats::new()),
                state: AtomicU8::new(StreamState::Uninitialized as u8),
                current_frame_list: AtomicU32::new(0),
                should_stop: AtomicU32::new(0),
                in_flight: AtomicU32::new(0),
                terminated_queues: AtomicU32::new(0),
                prepare: Mutex::new(PrepareState::new()),
            }),
        }
    }

    /// 初始化，不触碰传输层
    pub fn init(&self) -> Result<()> {
        let inner = &self.inner;
        let from = inner.state();
        if !matches!(from, StreamState::Uninitialized | StreamState::Freed) {
            return Err(StreamError::InvalidState("init on an initialized stream"));
        }
        inner.config.rotation_frames()?;
        inner.transition(from, StreamState::Initialized)?;
        log::debug!(
            "Output stream initialized: {} lists x {} frames",
            inner.config.frame_lists,
            inner.config.frames_per_list
        );
        Ok(())
    }

    /// 设置上游音频缓冲区（字节）
    pub fn attach_audio(&self, audio: Arc<CircularBuffer<u8>>) -> Result<()> {
        if matches!(
            self.inner.state(),
            StreamState::Started | StreamState::Stopping
        ) {
            return Err(StreamError::InvalidState("attach audio while running"));
        }
        self.inner.prepare.lock().audio = Some(audio);
        Ok(())
    }

    /// 开始输出
    ///
    /// `start_frame` 必须比设备当前帧号至少晚 `START_SAFETY_FRAMES`，否则返回
    /// `Timeout`，调用方换更晚的帧号重试。
    /// `nominal_frame_samples` 是标称帧样本数，最大帧为它 +1。
    pub fn start(
        &self,
        history: Arc<FrameSizeHistory>,
        start_frame: u64,
        nominal_frame_samples: u32,
    ) -> Result<()> {
        let inner = &self.inner;
        let from = inner.state();
        if !matches!(from, StreamState::Initialized | StreamState::Stopped) {
            return Err(StreamError::InvalidState(
                "start requires an initialized or stopped stream",
            ));
        }

        inner.scheduler.reset(inner.transport.endpoint().as_ref())?;
        inner
            .scheduler
            .start(start_frame, inner.transport.frame_number())?;

        let needed = inner.config.rotation_frames()?;
        {
            let mut prep = inner.prepare.lock();
            let audio = prep.audio.clone().ok_or(StreamError::NoDevice)?;
            if audio.capacity() == 0 {
                return Err(StreamError::NoMemory);
            }
            if history.available() < needed {
                log::warn!(
                    "Frame size history holds {} entries, {} needed to start",
                    history.available(),
                    needed
                );
                inner.stats.record_history_underrun();
                return Err(StreamError::Underrun);
            }

            prep.history = Some(history);
            prep.stock_samples_in_frame = nominal_frame_samples;
            prep.previously_prepared_offset = audio.read_position();
            prep.pending_bytes = 0;
            prep.generation = prep.generation.wrapping_add(1);
            prep.irregular_reported = false;
            prep.audio_underrun_reported = false;
        }

        inner.current_frame_list.store(0, Ordering::Release);
        inner.should_stop.store(0, Ordering::SeqCst);
        inner.in_flight.store(0, Ordering::SeqCst);
        inner.terminated_queues.store(0, Ordering::Release);
        inner.transition(from, StreamState::Started)?;

        for list_nr in 0..inner.config.frame_lists {
            if let Err(e) = inner.write_frame_list(list_nr) {
                if list_nr == 0 {
                    log::error!("Failed to submit first frame list: {}", e);
                    inner.state.store(from as u8, Ordering::SeqCst);
                    return Err(e);
                }
                log::warn!(
                    "Only {} of {} frame lists queued: {}",
                    list_nr,
                    inner.config.frame_lists,
                    e
                );
                break;
            }
        }

        log::info!(
            "Output stream started at frame {} ({} samples/frame nominal)",
            start_frame,
            nominal_frame_samples
        );
        Ok(())
    }

    /// 请求停止
    ///
    /// 不取消已提交的帧列表，立即返回；全部完成后调用 `notify_closed`。
    pub fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.state() != StreamState::Started {
            return Err(StreamError::InvalidState("stop on a stream that is not started"));
        }
        inner.transition(StreamState::Started, StreamState::Stopping)?;
        // 之后的完成回调不再重新提交
        inner.should_stop.store(1, Ordering::SeqCst);
        log::debug!(
            "Output stream stopping, {} frame lists in flight",
            inner.in_flight.load(Ordering::SeqCst)
        );
        inner.check_drained();
        Ok(())
    }

    /// 释放资源；只能在收到 `notify_closed` 之后调用
    pub fn free(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.state() != StreamState::Stopped {
            return Err(StreamError::InvalidState("free before the stream closed"));
        }
        inner.transition(StreamState::Stopped, StreamState::Freed)?;

        let mut prep = inner.prepare.lock();
        prep.audio = None;
        prep.history = None;
        prep.pending_bytes = 0;
        log::debug!("Output stream freed");
        Ok(())
    }

    /// 准备并提交一个帧列表
    pub fn write_frame_list(&self, list_nr: u32) -> Result<()> {
        if !matches!(
            self.inner.state(),
            StreamState::Started | StreamState::Stopping
        ) {
            return Err(StreamError::InvalidState("write on a stream that is not started"));
        }
        self.inner.write_frame_list(list_nr)
    }

    /// 供音频缓冲区回绕钩子使用：记录生产者回绕时间戳
    pub fn wrap_hook(&self) -> impl Fn(u64) + Send + Sync + 'static {
        let stats = Arc::clone(&self.inner.stats);
        move |timestamp| stats.record_producer_wrap(timestamp)
    }

    pub fn state(&self) -> StreamState {
        self.inner.state()
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.inner.stats)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.inner.scheduler
    }

    pub fn current_frame_list(&self) -> u32 {
        self.inner.current_frame_list.load(Ordering::Acquire)
    }

    /// 停止后已排空的帧列表数
    pub fn drained_lists(&self) -> u32 {
        self.inner
            .should_stop
            .load(Ordering::Acquire)
            .saturating_sub(1)
    }

    pub fn in_flight(&self) -> u32 {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn previously_prepared_offset(&self) -> usize {
        self.inner.prepare.lock().previously_prepared_offset
    }

    pub fn stock_samples_in_frame(&self) -> u32 {
        self.inner.prepare.lock().stock_samples_in_frame
    }
}

impl Inner {
    #[inline]
    fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: StreamState, to: StreamState) -> Result<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| StreamError::InvalidState("concurrent lifecycle transition"))
    }

    /// 准备帧列表：检查前置条件，然后按帧大小历史切分音频缓冲区
    ///
    /// - `NoDevice`: 没有音频源
    /// - `NoMemory`: 音频缓冲区大小为 0
    /// - `Underrun`: 帧大小历史不足一个帧列表
    ///
    /// 任何一个条件不满足都不会消费帧大小历史。
    /// 目标帧号在同一把锁内分配，帧号顺序与音频字节顺序一致。
    fn prepare_write_frame_list(&self, list_nr: u32) -> Result<(FrameList, Release, WriteTag)> {
        let mut prep = self.prepare.lock();
        let audio = prep.audio.clone().ok_or(StreamError::NoDevice)?;
        let size = audio.capacity();
        if size == 0 {
            return Err(StreamError::NoMemory);
        }
        let history = prep
            .history
            .clone()
            .ok_or(StreamError::NotReady)?;

        let frame_count = self.config.frames_per_list as usize;
        if history.available() < frame_count {
            self.stats.record_history_underrun();
            return Err(StreamError::Underrun);
        }

        Self::resync_if_moved(&mut prep, &audio);

        let nominal = prep.stock_samples_in_frame;
        let bytes_per_sample = self.config.bytes_per_sample as usize;
        let mut frames = Vec::with_capacity(frame_count);
        let mut release_bytes = 0;

        for _ in 0..frame_count {
            let samples = history.pop()?;
            if samples != nominal && samples != nominal + 1 {
                self.stats.record_irregular_frame();
                if !prep.irregular_reported {
                    log::warn!(
                        "Frame size {} outside nominal {}/{}",
                        samples,
                        nominal,
                        nominal + 1
                    );
                    prep.irregular_reported = true;
                }
            }

            let byte_len = samples as usize * bytes_per_sample;
            let unsent = audio.available().saturating_sub(prep.pending_bytes);

            let data = if byte_len == 0 {
                let at = prep.previously_prepared_offset;
                FrameData::Contiguous(at..at)
            } else if unsent < byte_len {
                // 数据不够：发送静音保持节拍，游标不动
                self.stats.record_audio_underrun();
                if !prep.audio_underrun_reported {
                    log::warn!(
                        "Audio underrun: {} bytes needed, {} available",
                        byte_len,
                        unsent
                    );
                    prep.audio_underrun_reported = true;
                }
                FrameData::Silence
            } else {
                let span = audio.span(prep.previously_prepared_offset, byte_len)?;
                if span.is_wrapped() {
                    self.stats.record_wrap_splice();
                }
                prep.previously_prepared_offset =
                    (prep.previously_prepared_offset + byte_len) % size;
                prep.pending_bytes += byte_len;
                prep.audio_underrun_reported = false;
                release_bytes += byte_len;
                FrameData::from(span)
            };

            frames.push(IsocFrame { byte_len, data });
        }

        let frame_number = self.scheduler.next_frame_number();
        let list = FrameList {
            list_nr,
            frame_number,
            frames,
        };
        let release = Release {
            bytes: release_bytes,
            generation: prep.generation,
        };
        let tag = WriteTag {
            byte_offset: prep.previously_prepared_offset,
            frame_number,
        };
        Ok((list, release, tag))
    }

    /// 整列静音：标称大小，不消费帧大小历史和音频数据，只占用下一个时间槽
    fn prepare_silent_frame_list(&self, list_nr: u32) -> (FrameList, Release, WriteTag) {
        let prep = self.prepare.lock();
        let byte_len = prep.stock_samples_in_frame as usize * self.config.bytes_per_sample as usize;
        let frames = (0..self.config.frames_per_list)
            .map(|_| IsocFrame {
                byte_len,
                data: FrameData::Silence,
            })
            .collect();

        let frame_number = self.scheduler.next_frame_number();
        let list = FrameList {
            list_nr,
            frame_number,
            frames,
        };
        let release = Release {
            bytes: 0,
            generation: prep.generation,
        };
        let tag = WriteTag {
            byte_offset: prep.previously_prepared_offset,
            frame_number,
        };
        (list, release, tag)
    }

    fn write_frame_list(self: &Arc<Self>, list_nr: u32) -> Result<()> {
        let (list, release, tag) = self.prepare_write_frame_list(list_nr)?;
        self.submit_frame_list(list, release, tag)
    }

    /// 完成回调中重新提交；帧大小历史跟不上时以静音列表占住轮转位置
    fn resubmit_frame_list(self: &Arc<Self>, list_nr: u32) -> Result<()> {
        match self.write_frame_list(list_nr) {
            Err(StreamError::Underrun) => {
                let (list, release, tag) = self.prepare_silent_frame_list(list_nr);
                log::debug!(
                    "Frame size history empty, frame list {} sent silent at frame {}",
                    list_nr,
                    tag.frame_number
                );
                self.submit_frame_list(list, release, tag)?;
                self.stats.record_silent_list();
                Ok(())
            }
            result => result,
        }
    }

    fn submit_frame_list(
        self: &Arc<Self>,
        list: FrameList,
        release: Release,
        tag: WriteTag,
    ) -> Result<()> {
        let list_nr = list.list_nr;
        let bytes = list.byte_len() as u64;

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let stream = Arc::clone(self);
        let handler: CompletionHandler =
            Box::new(move |completion| stream.write_completed(list_nr, tag, release, completion));

        if let Err(e) = self.transport.submit(list, handler) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.release(release);
            return Err(e);
        }

        self.stats.record_submitted(bytes);
        log::trace!(
            "Frame list {} queued at frame {} ({} bytes)",
            list_nr,
            tag.frame_number,
            bytes
        );
        Ok(())
    }

    /// 帧列表已由硬件传输完毕，把对应字节还给生产者
    fn release(&self, release: Release) {
        if release.bytes == 0 {
            return;
        }
        let mut prep = self.prepare.lock();
        let Some(audio) = prep.audio.clone() else {
            return;
        };
        if release.generation != prep.generation || Self::resync_if_moved(&mut prep, &audio) {
            return;
        }
        prep.pending_bytes = prep.pending_bytes.saturating_sub(release.bytes);
        if let Err(e) = audio.consume(release.bytes) {
            log::warn!("Failed to release {} audio bytes: {}", release.bytes, e);
        }
    }

    /// 有人 seek 过音频缓冲区：从新的读位置继续，在途帧列表的释放作废
    ///
    /// 返回是否发生了重新同步
    fn resync_if_moved(prep: &mut PrepareState, audio: &CircularBuffer<u8>) -> bool {
        let size = audio.capacity();
        if size == 0 {
            return false;
        }
        let expected_read =
            (prep.previously_prepared_offset + size - prep.pending_bytes % size) % size;
        let read = audio.read_position();
        if read == expected_read {
            return false;
        }
        log::info!(
            "Audio buffer resynchronized: offset {} -> {}",
            prep.previously_prepared_offset,
            read
        );
        prep.previously_prepared_offset = read;
        prep.pending_bytes = 0;
        prep.generation = prep.generation.wrapping_add(1);
        true
    }

    /// 完成回调
    fn write_completed(
        self: &Arc<Self>,
        list_nr: u32,
        tag: WriteTag,
        release: Release,
        completion: Completion,
    ) {
        self.release(release);
        self.stats
            .record_completed(tag.byte_offset as u64, tag.frame_number);

        if let Err(e) = &completion.result {
            log::warn!("Frame list {} at frame {} failed: {}", list_nr, tag.frame_number, e);
            self.stats.record_list_error();
        }
        let failed = completion.failed_frames();
        if failed > 0 {
            self.stats.record_frame_errors(failed as u64);
        }

        self.current_frame_list
            .store((list_nr + 1) % self.config.frame_lists, Ordering::Release);

        if self.should_stop.load(Ordering::SeqCst) == 0 {
            // 先提交下一个再减在途计数，停止时在途数不会提前归零
            if let Err(e) = self.resubmit_frame_list(list_nr) {
                log::error!("Frame list {} dropped from rotation: {}", list_nr, e);
            }
        } else {
            self.should_stop.fetch_add(1, Ordering::SeqCst);
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.check_drained();
    }

    /// 停止中且没有在途帧列表时，进入 Stopped
    fn check_drained(&self) {
        if self.in_flight.load(Ordering::SeqCst) != 0 {
            return;
        }
        if self
            .transition(StreamState::Stopping, StreamState::Stopped)
            .is_ok()
        {
            log::debug!(
                "Output stream drained after {} completions",
                self.should_stop.load(Ordering::SeqCst).saturating_sub(1)
            );
            self.queue_terminated();
        }
    }

    /// 所有队列都终止后通知一次
    fn queue_terminated(&self) {
        let terminated = self.terminated_queues.fetch_add(1, Ordering::AcqRel) + 1;
        if terminated == OUTPUT_QUEUES {
            log::info!("Output stream closed");
            self.listener.notify_closed();
        }
    }
}
