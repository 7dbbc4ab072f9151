//! 等时传输层接口
//!
//! 核心只通过这里的 trait 和数据类型与传输层交互：
//! - 提交帧列表（异步，完成后调用回调）
//! - 查询设备当前帧号
//! - 读取端点轮询间隔描述
//!
//! 帧数据用索引区间描述音频环形缓冲区中的位置，核心从不拷贝样本，
//! 由传输层按区间读取（见 `CircularBuffer::copy_span`）。

pub mod sim;

use std::ops::Range;

use crate::audio::ring_buffer::Span;
use crate::error::{Result, StreamError};

pub use sim::{SimConfig, SimulatedTransport};

/// 端点描述（只保留调度需要的字段）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    /// 轮询间隔指数，周期 = 2^(b_interval-1) 帧
    pub b_interval: u8,
    pub max_packet_size: u16,
}

/// 一个传输帧的数据来源
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameData {
    /// 音频缓冲区中的一段连续字节
    Contiguous(Range<usize>),
    /// 跨越缓冲区末尾：两段子区间拼接成一个逻辑连续帧
    Wrapped { head: Range<usize>, tail: Range<usize> },
    /// 音频数据不足，发送等长静音
    Silence,
}

impl From<Span> for FrameData {
    fn from(span: Span) -> Self {
        match span.tail {
            Some(tail) => Self::Wrapped {
                head: span.head,
                tail,
            },
            None => Self::Contiguous(span.head),
        }
    }
}

impl FrameData {
    /// 转回 `Span`；静音帧返回 None
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Contiguous(range) => Some(Span {
                head: range.clone(),
                tail: None,
            }),
            Self::Wrapped { head, tail } => Some(Span {
                head: head.clone(),
                tail: Some(tail.clone()),
            }),
            Self::Silence => None,
        }
    }
}

/// 单个传输帧
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IsocFrame {
    pub byte_len: usize,
    pub data: FrameData,
}

/// 一次提交的帧列表
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameList {
    /// 在轮转中的编号 [0, frame_lists)
    pub list_nr: u32,
    /// 第一帧的目标帧号
    pub frame_number: u64,
    pub frames: Vec<IsocFrame>,
}

impl FrameList {
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(|f| f.byte_len).sum()
    }
}

/// 完成回调携带的进度：帧列表结束时的字节偏移和它的帧号
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteTag {
    pub byte_offset: usize,
    pub frame_number: u64,
}

/// 每帧传输状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Ok { transferred: usize },
    Error,
}

impl FrameStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// 帧列表完成结果
#[derive(Clone, Debug)]
pub struct Completion {
    pub result: Result<()>,
    pub frames: Vec<FrameStatus>,
}

impl Completion {
    /// 所有帧都按长度传输成功
    pub fn success(list: &FrameList) -> Self {
        Self {
            result: Ok(()),
            frames: list
                .frames
                .iter()
                .map(|f| FrameStatus::Ok {
                    transferred: f.byte_len,
                })
                .collect(),
        }
    }

    pub fn failed(error: StreamError, frame_count: usize) -> Self {
        Self {
            result: Err(error),
            frames: vec![FrameStatus::Error; frame_count],
        }
    }

    pub fn failed_frames(&self) -> usize {
        self.frames.iter().filter(|f| !f.is_ok()).count()
    }
}

/// 完成回调，捕获提交方自身（替代 "对象指针 + 参数" 式回调）
pub type CompletionHandler = Box<dyn FnOnce(Completion) + Send>;

/// 等时传输
///
/// `submit` 之后，传输层在帧列表全部传输完后恰好调用一次 `on_complete`，
/// 且按提交顺序、在同一个完成上下文中串行调用。
pub trait IsochTransport: Send + Sync {
    /// 设备当前帧号（单调递增）
    fn frame_number(&self) -> u64;

    /// 输出端点描述；管道未打开时为 None
    fn endpoint(&self) -> Option<EndpointDescriptor>;

    /// 异步提交帧列表
    fn submit(&self, list: FrameList, on_complete: CompletionHandler) -> Result<()>;
}
