//! 等时输出流
//!
//! - `scheduler`: 帧号调度
//! - `output`: 输出流状态机与帧列表准备

pub mod output;
pub mod scheduler;

pub use output::{OutputStream, StreamConfig, StreamListener, StreamState};
pub use scheduler::{FrameScheduler, MICROFRAMES_PER_FRAME, START_SAFETY_FRAMES};
