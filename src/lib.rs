//! isoc-stream Library
//!
//! Streams a continuous audio buffer out to an isochronous transport:
//! a lock-free SPSC circular buffer, a frame-number scheduler and an
//! output stream state machine that keeps a rotation of frame lists in flight.

pub mod audio;
pub mod engine;
pub mod error;
pub mod stream;
pub mod transport;

pub use error::{Result, StreamError};
