//! 模拟等时传输
//!
//! 进程内的传输实现，用于 CLI 和测试：
//! - 帧时钟由 `timing::now_ns` 换算而来，单调递增
//! - 提交的帧列表进入 crossbeam channel，由一个 worker 线程按 FIFO 处理
//! - worker 等到帧列表占用的最后一帧过去后调用完成回调
//! - 可选：按区间从音频缓冲区读出实际字节（验证描述是否正确）、
//!   注入完成抖动和帧错误

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rand::Rng;

use crate::audio::ring_buffer::CircularBuffer;
use crate::audio::timing::{frames_to_ns, now_ns, ns_to_frames};
use crate::error::{Result, StreamError};
use crate::transport::{
    Completion, CompletionHandler, EndpointDescriptor, FrameData, FrameList, FrameStatus,
    IsochTransport,
};

/// 每个硬件帧包含的传输帧（微帧）数
const TRANSFERS_PER_FRAME: u64 = 8;

/// 模拟传输配置
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// 帧时钟频率
    pub frames_per_second: u32,
    /// 输出端点；None 表示管道未打开
    pub endpoint: Option<EndpointDescriptor>,
    /// 每帧传输失败的概率 [0, 1]
    pub frame_error_rate: f64,
    /// 完成回调的最大随机延迟（微秒）
    pub jitter_us: u64,
    /// 帧时钟起点
    pub start_frame: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 1000,
            endpoint: Some(EndpointDescriptor {
                address: 0x01,
                b_interval: 1,
                max_packet_size: 1024,
            }),
            frame_error_rate: 0.0,
            jitter_us: 0,
            start_frame: 0,
        }
    }
}

type Job = (FrameList, CompletionHandler);

/// worker 与提交方共享的状态
struct Shared {
    config: SimConfig,
    origin_ns: u64,
    audio: Mutex<Option<Arc<CircularBuffer<u8>>>>,
    lists_delivered: AtomicU64,
    bytes_delivered: AtomicU64,
    silent_frames: AtomicU64,
}

impl Shared {
    fn frame_number(&self) -> u64 {
        let elapsed = now_ns().saturating_sub(self.origin_ns);
        self.config.start_frame + ns_to_frames(elapsed, self.config.frames_per_second)
    }

    /// 帧列表最后一帧结束时的时钟时刻（纳秒）
    fn deadline_ns(&self, list: &FrameList) -> u64 {
        let poll_interval = self
            .config
            .endpoint
            .map(|ep| 1u64 << (ep.b_interval.clamp(1, 16) - 1))
            .unwrap_or(1);
        let frames = (list.frames.len() as u64 / TRANSFERS_PER_FRAME).max(1) * poll_interval;
        let end_frame = (list.frame_number + frames).saturating_sub(self.config.start_frame);
        self.origin_ns + frames_to_ns(end_frame, self.config.frames_per_second)
    }
}

/// 模拟传输
pub struct SimulatedTransport {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedTransport {
    pub fn new(config: SimConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            config,
            origin_ns: now_ns(),
            audio: Mutex::new(None),
            lists_delivered: AtomicU64::new(0),
            bytes_delivered: AtomicU64::new(0),
            silent_frames: AtomicU64::new(0),
        });

        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("isoc-sim".to_string())
            .spawn(move || Self::worker_main(worker_shared, receiver))
            .map_err(|e| StreamError::Transport(format!("failed to spawn worker: {e}")))?;

        Ok(Self {
            shared,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// 设置完成时读取数据的音频缓冲区
    pub fn attach_audio(&self, audio: Arc<CircularBuffer<u8>>) {
        *self.shared.audio.lock() = Some(audio);
    }

    pub fn lists_delivered(&self) -> u64 {
        self.shared.lists_delivered.load(Ordering::Relaxed)
    }

    pub fn bytes_delivered(&self) -> u64 {
        self.shared.bytes_delivered.load(Ordering::Relaxed)
    }

    pub fn silent_frames(&self) -> u64 {
        self.shared.silent_frames.load(Ordering::Relaxed)
    }

    /// 关闭提交通道，等待 worker 处理完剩余帧列表后退出
    pub fn shutdown(&self) {
        // 先放开锁再 join：完成回调可能正在 submit
        let sender = self.sender.lock().take();
        drop(sender);

        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Simulated transport worker panicked");
            }
            log::debug!("Simulated transport shut down");
        }
    }

    fn worker_main(shared: Arc<Shared>, receiver: Receiver<Job>) {
        log::debug!(
            "Simulated transport started at frame {} ({} frames/s)",
            shared.config.start_frame,
            shared.config.frames_per_second
        );
        let mut rng = rand::thread_rng();
        let mut scratch = Vec::new();
        let error_rate = shared.config.frame_error_rate.clamp(0.0, 1.0);

        // 发送端全部断开且队列清空后退出
        while let Ok((list, on_complete)) = receiver.recv() {
            let mut deadline = shared.deadline_ns(&list);
            if shared.config.jitter_us > 0 {
                deadline += rng.gen_range(0..=shared.config.jitter_us) * 1_000;
            }
            let now = now_ns();
            if deadline > now {
                thread::sleep(Duration::from_nanos(deadline - now));
            }

            let audio = shared.audio.lock().clone();
            let mut frames = Vec::with_capacity(list.frames.len());
            for frame in &list.frames {
                if error_rate > 0.0 && rng.gen_bool(error_rate) {
                    frames.push(FrameStatus::Error);
                    continue;
                }
                match (&frame.data, &audio) {
                    (FrameData::Silence, _) => {
                        shared.silent_frames.fetch_add(1, Ordering::Relaxed);
                    }
                    (data, Some(audio)) => {
                        scratch.clear();
                        if let Some(span) = data.span() {
                            if let Err(e) = audio.copy_span(&span, &mut scratch) {
                                log::warn!("Frame at {} unreadable: {}", list.frame_number, e);
                                frames.push(FrameStatus::Error);
                                continue;
                            }
                        }
                    }
                    (_, None) => {}
                }
                shared
                    .bytes_delivered
                    .fetch_add(frame.byte_len as u64, Ordering::Relaxed);
                frames.push(FrameStatus::Ok {
                    transferred: frame.byte_len,
                });
            }

            shared.lists_delivered.fetch_add(1, Ordering::Relaxed);
            on_complete(Completion {
                result: Ok(()),
                frames,
            });
        }

        log::debug!("Simulated transport worker finished");
    }
}

impl IsochTransport for SimulatedTransport {
    fn frame_number(&self) -> u64 {
        self.shared.frame_number()
    }

    fn endpoint(&self) -> Option<EndpointDescriptor> {
        self.shared.config.endpoint
    }

    fn submit(&self, list: FrameList, on_complete: CompletionHandler) -> Result<()> {
        if self.shared.config.endpoint.is_none() {
            return Err(StreamError::NotOpen);
        }
        let sender = self.sender.lock();
        let sender = sender
            .as_ref()
            .ok_or_else(|| StreamError::Transport("transport shut down".into()))?;
        sender
            .send((list, on_complete))
            .map_err(|_| StreamError::Transport("worker gone".into()))
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::IsocFrame;

    fn list(frame_number: u64, frames: Vec<IsocFrame>) -> FrameList {
        FrameList {
            list_nr: 0,
            frame_number,
            frames,
        }
    }

    fn frame(byte_len: usize, data: FrameData) -> IsocFrame {
        IsocFrame { byte_len, data }
    }

    /// 提交并等待完成
    fn submit_and_wait(transport: &SimulatedTransport, list: FrameList) -> Completion {
        let (tx, rx) = crossbeam_channel::bounded(1);
        transport
            .submit(
                list,
                Box::new(move |completion| {
                    let _ = tx.send(completion);
                }),
            )
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_frame_clock_advances() {
        let transport = SimulatedTransport::new(SimConfig {
            start_frame: 500,
            ..Default::default()
        })
        .unwrap();

        let first = transport.frame_number();
        assert!(first >= 500);
        thread::sleep(Duration::from_millis(5));
        assert!(transport.frame_number() >= first + 4);
    }

    #[test]
    fn test_submit_without_endpoint() {
        let transport = SimulatedTransport::new(SimConfig {
            endpoint: None,
            ..Default::default()
        })
        .unwrap();
        let result = transport.submit(list(0, vec![]), Box::new(|_| {}));
        assert_eq!(result, Err(StreamError::NotOpen));
    }

    #[test]
    fn test_completion_after_scheduled_frames() {
        let transport = SimulatedTransport::new(SimConfig::default()).unwrap();
        let target = transport.frame_number() + 3;
        let frames = (0..8)
            .map(|i| frame(12, FrameData::Contiguous(i * 12..(i + 1) * 12)))
            .collect();

        let completion = submit_and_wait(&transport, list(target, frames));
        assert!(completion.result.is_ok());
        assert_eq!(completion.failed_frames(), 0);
        assert_eq!(completion.frames.len(), 8);
        // 8 个传输帧占一帧，完成时时钟已经越过它
        assert!(transport.frame_number() >= target + 1);
        assert_eq!(transport.lists_delivered(), 1);
        assert_eq!(transport.bytes_delivered(), 96);
    }

    #[test]
    fn test_error_injection() {
        let transport = SimulatedTransport::new(SimConfig {
            frame_error_rate: 1.0,
            ..Default::default()
        })
        .unwrap();
        let frames = vec![frame(6, FrameData::Silence), frame(6, FrameData::Silence)];

        let completion = submit_and_wait(&transport, list(transport.frame_number(), frames));
        assert_eq!(completion.failed_frames(), 2);
        assert_eq!(transport.bytes_delivered(), 0);
    }

    #[test]
    fn test_reads_spans_from_attached_audio() {
        let transport = SimulatedTransport::new(SimConfig::default()).unwrap();
        let audio = CircularBuffer::<u8>::with_capacity(16, "audio").unwrap();
        audio.push_slice(&[7; 15], 0, 0).unwrap();
        transport.attach_audio(Arc::new(audio));

        let frames = vec![
            frame(
                8,
                FrameData::Wrapped {
                    head: 12..16,
                    tail: 0..4,
                },
            ),
            frame(4, FrameData::Contiguous(4..8)),
            frame(4, FrameData::Silence),
            // 越界区间：传输失败
            frame(4, FrameData::Contiguous(14..18)),
        ];
        let completion = submit_and_wait(&transport, list(transport.frame_number(), frames));
        assert_eq!(completion.failed_frames(), 1);
        assert_eq!(completion.frames[3], FrameStatus::Error);
        assert_eq!(transport.bytes_delivered(), 16);
        assert_eq!(transport.silent_frames(), 1);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let transport = SimulatedTransport::new(SimConfig::default()).unwrap();
        transport.shutdown();
        let result = transport.submit(list(0, vec![]), Box::new(|_| {}));
        assert!(matches!(result, Err(StreamError::Transport(_))));
        // 重复关闭无副作用
        transport.shutdown();
    }

    #[test]
    fn test_completions_in_submission_order() {
        let transport = SimulatedTransport::new(SimConfig::default()).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let base = transport.frame_number() + 1;

        for n in 0..4u32 {
            let tx = tx.clone();
            let mut l = list(base + n as u64, vec![frame(4, FrameData::Silence)]);
            l.list_nr = n;
            transport
                .submit(l, Box::new(move |_| {
                    let _ = tx.send(n);
                }))
                .unwrap();
        }
        let order: Vec<u32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
