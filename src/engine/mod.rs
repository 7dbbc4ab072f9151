//! 流引擎
//!
//! 整合生产者、环形缓冲区、输出流和传输层
//! 核心设计：生产者线程和传输完成回调完全解耦，通过 lock-free ring buffer 连接
//!
//! ```text
//! producer 线程 ──push_slice──► audio ring ──span──► OutputStream ──submit──► transport
//!        └──────push(size)────► frame size history ──pop──┘                     │
//!                                      ▲                                         │
//!                                      └────────── consume (完成回调) ◄──────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::audio::timing::{now_ns, ns_to_frames, NANOS_PER_SEC};
use crate::audio::{AudioFormat, CircularBuffer, FrameSizeHistory, FrameSizer, StatsReport};
use crate::error::StreamError;
use crate::stream::{FrameScheduler, OutputStream, StreamConfig, StreamListener, StreamState};
use crate::stream::{MICROFRAMES_PER_FRAME, START_SAFETY_FRAMES};
use crate::transport::{EndpointDescriptor, IsochTransport, SimConfig, SimulatedTransport};

/// 起始帧号 Timeout 时的重试次数
const START_RETRIES: u32 = 3;

/// 引擎配置
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub format: AudioFormat,
    /// 缓冲时长（毫秒），决定音频缓冲区和帧大小历史的容量
    pub buffer_ms: u32,
    /// 设备帧时钟频率
    pub frames_per_second: u32,
    /// 端点轮询间隔指数
    pub b_interval: u8,
    pub frames_per_list: u32,
    pub frame_lists: u32,
    /// 测试音频率
    pub tone_hz: f64,
    /// 锁定音频缓冲区内存
    pub lock_memory: bool,
    /// 模拟传输的帧错误率
    pub frame_error_rate: f64,
    /// 模拟传输的完成抖动（微秒）
    pub jitter_us: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let stream = StreamConfig::default();
        Self {
            format: AudioFormat::new(48000, 2, 24),
            buffer_ms: 200,
            frames_per_second: 1000,
            b_interval: 1,
            frames_per_list: stream.frames_per_list,
            frame_lists: stream.frame_lists,
            tone_hz: 1000.0,
            lock_memory: false,
            frame_error_rate: 0.0,
            jitter_us: 0,
        }
    }
}

/// 由配置推导出的调度参数
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleInfo {
    /// 每秒传输帧数
    pub transfer_rate: u32,
    /// 每传输帧标称样本数
    pub nominal_samples: u32,
    pub bytes_per_sample: u32,
    /// 每个帧列表周期前进的帧号
    pub increase_per_cycle: u64,
    pub list_duration_ms: f64,
    /// 缓冲区能容纳的传输帧数
    pub buffer_transfers: usize,
    /// 音频缓冲区槽位数（字节）
    pub audio_capacity: usize,
    /// 帧大小历史槽位数
    pub history_capacity: usize,
}

impl std::fmt::Display for ScheduleInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Transfer frames/s: {}", self.transfer_rate)?;
        writeln!(
            f,
            "Samples per transfer: {} (max {})",
            self.nominal_samples,
            self.nominal_samples + 1
        )?;
        writeln!(f, "Bytes per sample frame: {}", self.bytes_per_sample)?;
        writeln!(f, "Frame numbers per list: {}", self.increase_per_cycle)?;
        writeln!(f, "List duration: {:.3} ms", self.list_duration_ms)?;
        writeln!(f, "Buffered transfers: {}", self.buffer_transfers)?;
        writeln!(f, "Audio buffer: {} bytes", self.audio_capacity)?;
        write!(f, "Frame size history: {} entries", self.history_capacity)
    }
}

impl EngineConfig {
    /// 推导调度参数；参数组合无法运行时返回 `BadArgument`
    pub fn schedule(&self) -> Result<ScheduleInfo, StreamError> {
        let bytes_per_sample = self.format.bytes_per_frame() as u32;
        if self.format.sample_rate == 0 || bytes_per_sample == 0 || self.frames_per_second == 0 {
            return Err(StreamError::BadArgument);
        }
        let rotation = self.stream_config(bytes_per_sample).rotation_frames()?;

        let poll_interval = FrameScheduler::poll_interval(self.b_interval)?;
        let transfer_rate =
            (self.frames_per_second as u64 * MICROFRAMES_PER_FRAME as u64 / poll_interval) as u32;
        if transfer_rate == 0 {
            return Err(StreamError::BadArgument);
        }
        let nominal_samples = self.format.nominal_frame_samples(transfer_rate);
        let increase_per_cycle =
            (self.frames_per_list / MICROFRAMES_PER_FRAME) as u64 * poll_interval;

        let buffer_transfers = (transfer_rate as u64 * self.buffer_ms as u64 / 1000) as usize;
        // 至少能同时容纳两轮帧列表
        if buffer_transfers / 2 < rotation {
            return Err(StreamError::BadArgument);
        }

        let max_frame_bytes = (nominal_samples as usize + 1) * bytes_per_sample as usize;
        Ok(ScheduleInfo {
            transfer_rate,
            nominal_samples,
            bytes_per_sample,
            increase_per_cycle,
            list_duration_ms: self.frames_per_list as f64 * 1000.0 / transfer_rate as f64,
            buffer_transfers,
            // 环形缓冲区保留一个空槽
            audio_capacity: buffer_transfers * max_frame_bytes + 1,
            history_capacity: buffer_transfers + 1,
        })
    }

    fn stream_config(&self, bytes_per_sample: u32) -> StreamConfig {
        StreamConfig {
            frames_per_list: self.frames_per_list,
            frame_lists: self.frame_lists,
            bytes_per_sample,
        }
    }
}

/// 引擎错误
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("failed to spawn producer thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("stream did not close within {0:?}")]
    CloseTimeout(Duration),
}

/// 引擎统计
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub stream: StatsReport,
    /// 生产者写入的传输帧数
    pub frames_produced: u64,
    pub samples_produced: u64,
    /// 生产者因缓冲区满而等待的次数
    pub producer_stalls: u64,
    pub lists_delivered: u64,
    pub bytes_delivered: u64,
    /// 音频缓冲区填充比例
    pub buffer_fill_ratio: f64,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stream)?;
        writeln!(f)?;
        writeln!(f, "Producer:")?;
        writeln!(f, "  Transfer frames: {}", self.frames_produced)?;
        writeln!(f, "  Samples: {}", self.samples_produced)?;
        writeln!(f, "  Stalls (buffer full): {}", self.producer_stalls)?;
        writeln!(f, "  Buffer fill: {:.1}%", self.buffer_fill_ratio * 100.0)?;
        writeln!(f)?;
        writeln!(f, "Transport:")?;
        writeln!(f, "  Lists delivered: {}", self.lists_delivered)?;
        write!(f, "  Bytes delivered: {}", self.bytes_delivered)
    }
}

/// 生产者线程共享状态
///
/// 完全基于原子操作，无锁设计
struct ProducerState {
    running: AtomicBool,
    frames_produced: AtomicU64,
    samples_produced: AtomicU64,
    stalls: AtomicU64,
}

/// 流关闭通知转发到 channel
struct CloseSignal {
    sender: Sender<()>,
}

impl StreamListener for CloseSignal {
    fn notify_closed(&self) {
        // 接收端已丢弃说明引擎已经不在等待
        let _ = self.sender.send(());
    }
}

/// 测试音生产者：按帧大小序列生成样本，写入音频缓冲区和帧大小历史
struct ToneProducer {
    format: AudioFormat,
    sizer: FrameSizer,
    audio: Arc<CircularBuffer<u8>>,
    history: Arc<FrameSizeHistory>,
    phase: f64,
    phase_step: f64,
    ns_per_byte: u64,
    /// 已取出但因缓冲区满尚未写入的帧大小
    held_size: Option<u32>,
    samples: Vec<i32>,
    bytes: Vec<u8>,
}

impl ToneProducer {
    fn new(
        format: AudioFormat,
        transfer_rate: u32,
        tone_hz: f64,
        audio: Arc<CircularBuffer<u8>>,
        history: Arc<FrameSizeHistory>,
    ) -> Self {
        let sizer = FrameSizer::new(format.sample_rate, transfer_rate);
        let max_samples = (sizer.nominal() as usize + 1) * format.channels as usize;
        let byte_rate = format.sample_rate as u64 * format.bytes_per_frame() as u64;
        Self {
            format,
            sizer,
            audio,
            history,
            phase: 0.0,
            phase_step: tone_hz * std::f64::consts::TAU / format.sample_rate as f64,
            ns_per_byte: NANOS_PER_SEC / byte_rate.max(1),
            held_size: None,
            samples: vec![0; max_samples],
            bytes: vec![0; max_samples * format.bytes_per_sample()],
        }
    }

    /// 写入一个传输帧，返回它的样本数；缓冲区满返回 None
    fn produce_frame(&mut self) -> Option<u32> {
        let size = self
            .held_size
            .take()
            .unwrap_or_else(|| self.sizer.next_frame_samples());
        let channels = self.format.channels as usize;
        let byte_len = size as usize * self.format.bytes_per_frame();
        if self.history.vacant() == 0 || self.audio.vacant() < byte_len {
            self.held_size = Some(size);
            return None;
        }

        let samples = &mut self.samples[..size as usize * channels];
        for frame in samples.chunks_exact_mut(channels) {
            // -12 dBFS，左对齐到 i32
            let value = (self.phase.sin() * 0.25 * i32::MAX as f64) as i32;
            frame.fill(value);
            self.phase = (self.phase + self.phase_step) % std::f64::consts::TAU;
        }
        let written = self.format.samples_to_bytes(samples, &mut self.bytes);

        // 先写数据再写大小：消费者看到大小时数据一定已经可见
        let timestamp = now_ns();
        if let Err(e) = self
            .audio
            .push_slice(&self.bytes[..written], timestamp, self.ns_per_byte)
        {
            log::error!("Audio push failed: {}", e);
            return None;
        }
        if let Err(e) = self.history.push(size, timestamp) {
            log::error!("Frame size push failed: {}", e);
            return None;
        }
        Some(size)
    }

    /// 写入至多 `frames` 个传输帧，返回实际写入数
    fn fill(&mut self, frames: u64, state: &ProducerState) -> u64 {
        let mut produced = 0;
        let mut samples = 0u64;
        while produced < frames {
            match self.produce_frame() {
                Some(size) => samples += size as u64,
                None => {
                    state.stalls.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
            produced += 1;
        }
        state
            .frames_produced
            .fetch_add(produced, Ordering::Relaxed);
        state
            .samples_produced
            .fetch_add(samples, Ordering::Relaxed);
        produced
    }
}

/// 流引擎
pub struct Engine {
    config: EngineConfig,
    schedule: ScheduleInfo,
    transport: Arc<SimulatedTransport>,
    stream: OutputStream,
    audio: Arc<CircularBuffer<u8>>,
    history: Arc<FrameSizeHistory>,
    closed: Receiver<()>,
    producer_thread: Option<JoinHandle<()>>,
    producer_state: Arc<ProducerState>,
}

impl Engine {
    /// 创建引擎：分配缓冲区、创建传输和输出流并初始化
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let schedule = config.schedule()?;

        let transport = Arc::new(SimulatedTransport::new(SimConfig {
            frames_per_second: config.frames_per_second,
            endpoint: Some(EndpointDescriptor {
                address: 0x01,
                b_interval: config.b_interval,
                max_packet_size: ((schedule.nominal_samples + 1) * schedule.bytes_per_sample)
                    .min(u16::MAX as u32) as u16,
            }),
            frame_error_rate: config.frame_error_rate,
            jitter_us: config.jitter_us,
            start_frame: 0,
        })?);

        let (close_tx, close_rx) = crossbeam_channel::unbounded();
        let stream = OutputStream::new(
            config.stream_config(schedule.bytes_per_sample),
            transport.clone(),
            Arc::new(CloseSignal { sender: close_tx }),
        );

        // 回绕钩子必须在共享之前安装
        let mut audio = CircularBuffer::<u8>::with_capacity(schedule.audio_capacity, "audio")?;
        audio.set_wrap_hook(stream.wrap_hook());
        if config.lock_memory && !audio.lock_memory() {
            log::warn!("Continuing with unlocked audio buffer");
        }
        let audio = Arc::new(audio);
        let history = Arc::new(FrameSizeHistory::with_capacity(
            schedule.history_capacity,
            "frame sizes",
        )?);

        stream.init()?;
        stream.attach_audio(Arc::clone(&audio))?;
        transport.attach_audio(Arc::clone(&audio));

        log::info!(
            "Engine ready: {}Hz {}ch {}bit, {} transfers/s, {} samples/transfer",
            config.format.sample_rate,
            config.format.channels,
            config.format.bits_per_sample,
            schedule.transfer_rate,
            schedule.nominal_samples
        );

        Ok(Self {
            config,
            schedule,
            transport,
            stream,
            audio,
            history,
            closed: close_rx,
            producer_thread: None,
            producer_state: Arc::new(ProducerState {
                running: AtomicBool::new(false),
                frames_produced: AtomicU64::new(0),
                samples_produced: AtomicU64::new(0),
                stalls: AtomicU64::new(0),
            }),
        })
    }

    /// 预填充缓冲区，启动生产者线程和输出流
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.producer_thread.is_some() {
            return Err(EngineError::InvalidState("engine already running"));
        }

        let mut producer = ToneProducer::new(
            self.config.format,
            self.schedule.transfer_rate,
            self.config.tone_hz,
            Arc::clone(&self.audio),
            Arc::clone(&self.history),
        );
        // 领先消费者半个缓冲区
        let lead = (self.schedule.buffer_transfers / 2) as u64;
        let prefilled = producer.fill(lead, &self.producer_state);
        log::debug!("Prefilled {} transfer frames", prefilled);

        self.producer_state.running.store(true, Ordering::Release);
        let state = Arc::clone(&self.producer_state);
        let transfer_rate = self.schedule.transfer_rate;
        let handle = thread::Builder::new()
            .name("producer".to_string())
            .spawn(move || Self::producer_thread_main(producer, state, transfer_rate, prefilled))?;
        self.producer_thread = Some(handle);

        if let Err(e) = self.start_stream() {
            self.stop_producer();
            return Err(e);
        }
        Ok(())
    }

    fn start_stream(&self) -> Result<(), EngineError> {
        // 上一周期同步关闭时没人等待，残留的通知不能算作本周期的关闭
        let stale = self.closed.try_iter().count();
        if stale > 0 {
            log::debug!("Discarded {} stale close notifications", stale);
        }

        let nominal = self.schedule.nominal_samples;
        let mut attempt = 0;
        loop {
            // 多留两帧给线程调度
            let start_frame = self.transport.frame_number() + START_SAFETY_FRAMES + 2;
            match self
                .stream
                .start(Arc::clone(&self.history), start_frame, nominal)
            {
                Err(StreamError::Timeout) if attempt < START_RETRIES => {
                    attempt += 1;
                    log::debug!("Start frame {} missed, retrying", start_frame);
                }
                result => return result.map_err(EngineError::from),
            }
        }
    }

    /// 生产者线程主函数
    ///
    /// 按真实时间推进：目标写入量 = 已经过的传输帧数 + 预填充量
    fn producer_thread_main(
        mut producer: ToneProducer,
        state: Arc<ProducerState>,
        transfer_rate: u32,
        lead: u64,
    ) {
        let origin = now_ns();
        let mut produced = lead;
        log::info!("Producer thread started, lead {} transfer frames", lead);

        while state.running.load(Ordering::Acquire) {
            let elapsed = ns_to_frames(now_ns().saturating_sub(origin), transfer_rate);
            let target = elapsed + lead;
            if target > produced {
                produced += producer.fill(target - produced, &state);
            }
            thread::sleep(Duration::from_millis(1));
        }

        log::info!("Producer thread finished");
    }

    fn stop_producer(&mut self) {
        self.producer_state.running.store(false, Ordering::Release);
        if let Some(handle) = self.producer_thread.take() {
            if handle.join().is_err() {
                log::error!("Producer thread panicked");
            }
        }
    }

    /// 停止输出流并等待所有在途帧列表完成
    pub fn stop(&mut self, timeout: Duration) -> Result<(), EngineError> {
        if self.stream.state() == StreamState::Started {
            self.stream.stop()?;
        }
        if self.stream.state() == StreamState::Stopping {
            self.closed
                .recv_timeout(timeout)
                .map_err(|_| EngineError::CloseTimeout(timeout))?;
        }
        self.stop_producer();
        log::info!("Engine stopped");
        Ok(())
    }

    /// 运行指定时长，或直到 `interrupt` 被置位
    pub fn run_for(&mut self, duration: Duration, interrupt: &AtomicBool) -> Result<(), EngineError> {
        self.start()?;
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline && !interrupt.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(20));
        }
        self.stop(Duration::from_secs(2))
    }

    pub fn schedule(&self) -> &ScheduleInfo {
        &self.schedule
    }

    pub fn stream(&self) -> &OutputStream {
        &self.stream
    }

    pub fn stats(&self) -> EngineStats {
        let capacity = self.audio.capacity().max(1);
        EngineStats {
            stream: self.stream.stats().report(),
            frames_produced: self.producer_state.frames_produced.load(Ordering::Relaxed),
            samples_produced: self.producer_state.samples_produced.load(Ordering::Relaxed),
            producer_stalls: self.producer_state.stalls.load(Ordering::Relaxed),
            lists_delivered: self.transport.lists_delivered(),
            bytes_delivered: self.transport.bytes_delivered(),
            buffer_fill_ratio: self.audio.available() as f64 / (capacity - 1).max(1) as f64,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop(Duration::from_secs(1)) {
            log::warn!("Engine drop: {}", e);
        }
        if self.stream.state() == StreamState::Stopped {
            if let Err(e) = self.stream.free() {
                log::warn!("Engine drop: {}", e);
            }
        }
        self.transport.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.format.sample_rate, 48000);
        assert_eq!(config.frames_per_list, 64);
        assert_eq!(config.frame_lists, 4);

        let schedule = config.schedule().unwrap();
        assert_eq!(schedule.transfer_rate, 8000);
        assert_eq!(schedule.nominal_samples, 6);
        assert_eq!(schedule.bytes_per_sample, 6);
        assert_eq!(schedule.increase_per_cycle, 8);
        assert_eq!(schedule.buffer_transfers, 1600);
        assert_eq!(schedule.history_capacity, 1601);
        assert_eq!(schedule.audio_capacity, 1600 * 7 * 6 + 1);
    }

    #[test]
    fn test_schedule_with_slower_polling() {
        let config = EngineConfig {
            format: AudioFormat::new(44100, 2, 16),
            b_interval: 2,
            ..Default::default()
        };
        let schedule = config.schedule().unwrap();
        assert_eq!(schedule.transfer_rate, 4000);
        assert_eq!(schedule.nominal_samples, 11);
        assert_eq!(schedule.increase_per_cycle, 16);
        assert!((schedule.list_duration_ms - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_rejects_bad_config() {
        let short = EngineConfig {
            buffer_ms: 10,
            ..Default::default()
        };
        assert_eq!(short.schedule(), Err(StreamError::BadArgument));

        let bad_interval = EngineConfig {
            b_interval: 0,
            ..Default::default()
        };
        assert_eq!(bad_interval.schedule(), Err(StreamError::BadArgument));
    }

    #[test]
    fn test_schedule_rejects_partial_hardware_frames() {
        for frames_per_list in [4, 12, 60] {
            let config = EngineConfig {
                frames_per_list,
                ..Default::default()
            };
            assert_eq!(config.schedule(), Err(StreamError::BadArgument));
            assert!(matches!(
                Engine::new(config),
                Err(EngineError::Stream(StreamError::BadArgument))
            ));
        }

        let overflow = EngineConfig {
            frames_per_list: 8,
            frame_lists: u32::MAX,
            ..Default::default()
        };
        assert_eq!(overflow.schedule(), Err(StreamError::BadArgument));
    }

    #[test]
    fn test_tone_producer_pairs_sizes_with_bytes() {
        let format = AudioFormat::new(44100, 2, 24);
        let audio = Arc::new(CircularBuffer::<u8>::with_capacity(4096, "audio").unwrap());
        let history = Arc::new(FrameSizeHistory::with_capacity(64, "sizes").unwrap());
        let state = ProducerState {
            running: AtomicBool::new(true),
            frames_produced: AtomicU64::new(0),
            samples_produced: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
        };
        let mut producer =
            ToneProducer::new(format, 8000, 1000.0, Arc::clone(&audio), Arc::clone(&history));

        assert_eq!(producer.fill(40, &state), 40);
        let mut total = 0;
        while let Ok(size) = history.pop() {
            assert!(size == 5 || size == 6);
            total += size as usize;
        }
        assert_eq!(audio.available(), total * 6);
        assert_eq!(state.frames_produced.load(Ordering::Relaxed), 40);
    }

    #[test]
    fn test_tone_producer_stalls_when_full() {
        let format = AudioFormat::new(48000, 2, 24);
        let audio = Arc::new(CircularBuffer::<u8>::with_capacity(100, "audio").unwrap());
        let history = Arc::new(FrameSizeHistory::with_capacity(64, "sizes").unwrap());
        let state = ProducerState {
            running: AtomicBool::new(true),
            frames_produced: AtomicU64::new(0),
            samples_produced: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
        };
        let mut producer = ToneProducer::new(format, 8000, 440.0, audio.clone(), history.clone());

        // 每帧 36 字节，99 字节可用
        assert_eq!(producer.fill(10, &state), 2);
        assert_eq!(state.stalls.load(Ordering::Relaxed), 1);
        assert_eq!(history.available(), 2);
        assert_eq!(audio.available(), 72);
    }

    #[test]
    fn test_engine_runs_and_drains() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        let interrupt = AtomicBool::new(false);
        engine
            .run_for(Duration::from_millis(200), &interrupt)
            .unwrap();

        assert_eq!(engine.stream().state(), StreamState::Stopped);
        let stats = engine.stats();
        assert!(stats.stream.lists_completed > 0);
        assert_eq!(stats.stream.lists_completed, stats.stream.lists_submitted);
        assert_eq!(stats.lists_delivered, stats.stream.lists_completed);
        assert!(stats.frames_produced > 0);
        assert_eq!(engine.stream().in_flight(), 0);
    }

    #[test]
    fn test_restart_waits_for_its_own_close() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        engine.start().unwrap();

        // 直接停止输出流：关闭通知进入 channel，但没有人接收
        engine.stream().stop().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while engine.stream().state() != StreamState::Stopped && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(engine.stream().state(), StreamState::Stopped);
        engine.stop(Duration::from_secs(2)).unwrap();

        // 第二个周期的 stop 必须等到本周期的在途帧列表全部完成
        engine.start().unwrap();
        assert!(engine.stream().in_flight() > 0);
        engine.stop(Duration::from_secs(2)).unwrap();
        assert_eq!(engine.stream().state(), StreamState::Stopped);
        assert_eq!(engine.stream().in_flight(), 0);
    }

    #[test]
    fn test_engine_start_twice() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        engine.start().unwrap();
        assert!(matches!(
            engine.start(),
            Err(EngineError::InvalidState(_))
        ));
        engine.stop(Duration::from_secs(2)).unwrap();
    }
}
