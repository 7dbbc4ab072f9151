//! 音频核心模块
//!
//! 包含：
//! - Ring Buffer: Lock-free SPSC 环形缓冲区与帧大小历史
//! - Format: 音频格式、样本打包、帧大小生成
//! - Timing: 单调时钟与帧号换算
//! - Stats: 输出流统计

pub mod format;
pub mod ring_buffer;
pub mod stats;
pub mod timing;

pub use format::{AudioFormat, FrameSizer};
pub use ring_buffer::{CircularBuffer, FrameSizeHistory, SeekOutcome, Span};
pub use stats::{StatsReport, StreamStats};
