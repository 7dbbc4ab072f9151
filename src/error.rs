//! 错误类型
//!
//! 所有核心操作返回 `Result<T, StreamError>`，`Ok` 即 Success。
//! Overrun / Underrun / Timeout 属于可恢复的瞬态状况，由调用方决定如何处理。

use thiserror::Error;

/// 流核心错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// 参数非法（容量为 0、seek 越界等）
    #[error("bad argument")]
    BadArgument,
    /// 内存分配失败
    #[error("no resources: allocation failed")]
    NoResources,
    /// 传输管道不可用
    #[error("transport pipe not open")]
    NotOpen,
    /// 缓冲区尚未初始化
    #[error("not ready: buffer not initialized")]
    NotReady,
    /// 写入会超出容量
    #[error("overrun")]
    Overrun,
    /// 可读数据不足
    #[error("underrun")]
    Underrun,
    /// 上游音频源不存在
    #[error("no device: audio source absent")]
    NoDevice,
    /// 音频缓冲区大小为 0
    #[error("no memory: audio buffer size is zero")]
    NoMemory,
    /// 目标帧号距当前帧太近
    #[error("timeout: start frame too close to the current frame")]
    Timeout,
    /// 生命周期调用顺序错误
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// 传输层提交失败
    #[error("transport error: {0}")]
    Transport(String),
}

impl StreamError {
    /// 是否为流式场景下预期的瞬态状况
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Overrun | Self::Underrun | Self::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
