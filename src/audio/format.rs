//! 音频格式与帧大小计算
//!
//! 内部样本表示：所有位深统一左对齐到 i32 的高位
//! - 16-bit: 占据 bit[31:16]
//! - 24-bit: 占据 bit[31:8]
//! - 32-bit: 占据 bit[31:0]
//!
//! 传输帧里的"样本"指一个采样帧（所有声道各一个样本），
//! 字节数 = 样本数 × `bytes_per_frame()`。

/// 音频格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// 创建新的音频格式
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// 每采样帧的字节数
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }

    /// 每样本的字节数
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// 每个传输帧的标称样本数；实际帧为标称值或标称值 +1
    #[inline]
    pub fn nominal_frame_samples(&self, frames_per_second: u32) -> u32 {
        self.sample_rate / frames_per_second.max(1)
    }

    /// 将 i32 样本（左对齐）打包为 little-endian 输出字节
    ///
    /// 返回写入的字节数
    pub fn samples_to_bytes(&self, samples: &[i32], output: &mut [u8]) -> usize {
        let width = self.bytes_per_sample();
        if width == 0 {
            return 0;
        }
        let mut written = 0;
        for (&sample, chunk) in samples.iter().zip(output.chunks_exact_mut(width)) {
            match width {
                // 右移取回原位深
                2 => chunk.copy_from_slice(&((sample >> 16) as i16).to_le_bytes()),
                3 => chunk.copy_from_slice(&(sample >> 8).to_le_bytes()[..3]),
                4 => chunk.copy_from_slice(&sample.to_le_bytes()),
                _ => return written,
            }
            written += width;
        }
        written
    }
}

/// 帧大小生成器（生产者侧）
///
/// 采样率通常不是帧率的整数倍（44100 / 8000 = 5.5125），
/// 用小数累加器把余数分摊到各帧：每帧样本数只会是标称值或标称值 +1。
#[derive(Clone, Debug)]
pub struct FrameSizer {
    sample_rate: u32,
    frames_per_second: u32,
    accumulator: u32,
}

impl FrameSizer {
    pub fn new(sample_rate: u32, frames_per_second: u32) -> Self {
        Self {
            sample_rate,
            frames_per_second: frames_per_second.max(1),
            accumulator: 0,
        }
    }

    pub fn nominal(&self) -> u32 {
        self.sample_rate / self.frames_per_second
    }

    /// 下一帧的样本数
    #[inline]
    pub fn next_frame_samples(&mut self) -> u32 {
        self.accumulator += self.sample_rate % self.frames_per_second;
        let extra = self.accumulator / self.frames_per_second;
        self.accumulator %= self.frames_per_second;
        self.nominal() + extra
    }

    pub fn reset(&mut self) {
        self.accumulator = 0;
    }
}
