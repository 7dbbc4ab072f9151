//! Lock-free Single-Producer Single-Consumer Circular Buffer
//!
//! 设计目标：
//! - 零锁：生产者和消费者完全无锁操作
//! - 零分配：所有内存在 `init` 时预分配，分配失败返回 `NoResources`
//! - 缓存友好：读写游标各自独占一个 cache line（`CachePadded`）
//! - 内存锁定：可选 mlock 防止 page fault
//!
//! 容量为 `size` 的缓冲区永远保留一个空槽用于区分满和空，
//! 所以可用容量是 `size - 1`，且 `available() + vacant() == size - 1`。
//!
//! 同一时刻最多一个生产者上下文（push）和一个消费者上下文（pop/seek/consume），
//! 二者可以并发运行。`init` / `free` 需要 `&mut self`，由类型系统保证不与读写并发。

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::atomic::AtomicCell;
use crossbeam_utils::CachePadded;

use crate::error::{Result, StreamError};

/// 写游标回绕到 0 时调用的通知钩子，参数为该元素的时间戳
pub type WrapHook = Box<dyn Fn(u64) + Send + Sync>;

/// 帧大小历史：生产者记录每个硬件帧放入的样本数，输出流按 FIFO 顺序消费
pub type FrameSizeHistory = CircularBuffer<u32>;

/// `seek` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// 读游标本来就在目标位置
    Unchanged,
    /// 读游标被强制移动，下游缓存的状态需要丢弃
    Resynchronized,
}

/// 一段可能跨越缓冲区物理末尾的区间，最多两段连续索引
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// 回绕前的部分（或整段）
    pub head: Range<usize>,
    /// 回绕后从 0 开始的部分
    pub tail: Option<Range<usize>>,
}

impl Span {
    #[inline]
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.as_ref().map_or(0, |t| t.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_wrapped(&self) -> bool {
        self.tail.is_some()
    }
}

/// SPSC 环形缓冲区
pub struct CircularBuffer<T: Copy + Default> {
    buffer: Box<[AtomicCell<T>]>,
    name: String,

    // 读写游标各占一个 cache line，避免 false sharing
    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,

    // 最近有人调用过 pop；为 false 时不再报告 overrun
    popped: AtomicBool,

    wrap_hook: Option<WrapHook>,

    // 是否已锁定内存
    memory_locked: AtomicBool,
}

impl<T: Copy + Default> CircularBuffer<T> {
    /// 创建未初始化的缓冲区，使用前必须调用 `init`
    pub fn new() -> Self {
        Self {
            buffer: Vec::new().into_boxed_slice(),
            name: String::new(),
            write_pos: CachePadded::new(AtomicUsize::new(0)),
            read_pos: CachePadded::new(AtomicUsize::new(0)),
            popped: AtomicBool::new(false),
            wrap_hook: None,
            memory_locked: AtomicBool::new(false),
        }
    }

    /// 创建并初始化
    pub fn with_capacity(capacity: usize, name: &str) -> Result<Self> {
        let mut ring = Self::new();
        ring.init(capacity, name)?;
        Ok(ring)
    }

    /// 分配 `capacity` 个槽位（可用容量 `capacity - 1`）
    ///
    /// 之前持有的存储会先释放。分配失败时容量重置为 0。
    pub fn init(&mut self, capacity: usize, name: &str) -> Result<()> {
        self.name = name.to_string();
        log::debug!("CircularBuffer<{}> allocate {}", self.name, capacity);
        if capacity == 0 {
            return Err(StreamError::BadArgument);
        }

        self.free();

        self.read_pos.store(0, Ordering::Relaxed);
        self.write_pos.store(0, Ordering::Relaxed);
        self.popped.store(false, Ordering::Relaxed);

        // 最后一步才分配：非空存储即表示缓冲区可用
        let mut storage: Vec<AtomicCell<T>> = Vec::new();
        if storage.try_reserve_exact(capacity).is_err() {
            log::warn!(
                "CircularBuffer<{}> failed to allocate {} elements",
                self.name,
                capacity
            );
            return Err(StreamError::NoResources);
        }
        storage.extend(std::iter::repeat_with(|| AtomicCell::new(T::default())).take(capacity));
        self.buffer = storage.into_boxed_slice();
        Ok(())
    }

    /// 释放存储，可重复调用
    pub fn free(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.unlock_memory();
        log::debug!("CircularBuffer<{}> freed {}", self.name, self.buffer.len());
        self.buffer = Vec::new().into_boxed_slice();
        self.read_pos.store(0, Ordering::Relaxed);
        self.write_pos.store(0, Ordering::Relaxed);
    }

    /// 安装回绕通知钩子（替换已有的）
    pub fn set_wrap_hook<F>(&mut self, hook: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.wrap_hook = Some(Box::new(hook));
    }

    pub fn clear_wrap_hook(&mut self) {
        self.wrap_hook = None;
    }

    #[inline]
    fn notify_wrap(&self, timestamp: u64) {
        if let Some(hook) = &self.wrap_hook {
            hook(timestamp);
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// 槽位总数（未初始化时为 0）
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 写入单个元素（生产者调用）
    ///
    /// 缓冲区满时返回 `Overrun`，不覆盖任何数据。
    #[inline]
    pub fn push(&self, value: T, timestamp: u64) -> Result<()> {
        let size = self.buffer.len();
        if size == 0 {
            return Err(StreamError::NotReady);
        }

        let write = self.write_pos.load(Ordering::Relaxed);
        let mut next = write + 1;
        if next == size {
            next = 0;
        }
        if next == self.read_pos.load(Ordering::Acquire) {
            return Err(StreamError::Overrun);
        }

        self.buffer[write].store(value);
        self.write_pos.store(next, Ordering::Release);
        if next == 0 {
            self.notify_wrap(timestamp);
        }
        Ok(())
    }

    /// 批量写入（生产者调用）
    ///
    /// 第 n 个元素的时间戳为 `timestamp + n * time_step`。
    /// 超出空闲空间时不失败：旧的未读数据被覆盖，每次 overrun 只警告一次，
    /// 直到下一次 pop 重新启用警告。
    pub fn push_slice(&self, values: &[T], timestamp: u64, time_step: u64) -> Result<()> {
        let size = self.buffer.len();
        if size == 0 {
            return Err(StreamError::NotReady);
        }

        if values.len() > self.vacant() && self.popped.load(Ordering::Acquire) {
            log::warn!(
                "CircularBuffer<{}>::push_slice ignoring overrun ({} > {} vacant)",
                self.name,
                values.len(),
                self.vacant()
            );
            self.popped.store(false, Ordering::Release);
        }

        let mut write = self.write_pos.load(Ordering::Relaxed);
        for (n, &value) in values.iter().enumerate() {
            self.buffer[write].store(value);
            write += 1;
            if write == size {
                write = 0;
                self.write_pos.store(0, Ordering::Release);
                self.notify_wrap(timestamp.wrapping_add((n as u64).wrapping_mul(time_step)));
            }
        }
        self.write_pos.store(write, Ordering::Release);
        Ok(())
    }

    /// 读取单个元素（消费者调用）
    #[inline]
    pub fn pop(&self) -> Result<T> {
        let size = self.buffer.len();
        if size == 0 {
            return Err(StreamError::NotReady);
        }
        self.popped.store(true, Ordering::Release);

        let read = self.read_pos.load(Ordering::Relaxed);
        if read == self.write_pos.load(Ordering::Acquire) {
            return Err(StreamError::Underrun);
        }

        let value = self.buffer[read].load();
        let next = if read + 1 == size { 0 } else { read + 1 };
        self.read_pos.store(next, Ordering::Release);
        Ok(value)
    }

    /// 批量读取，要么全部读到要么一个不读
    pub fn pop_slice(&self, output: &mut [T]) -> Result<()> {
        let read = self.begin_batch_read(output.len())?;
        let size = self.buffer.len();
        for (n, slot) in output.iter_mut().enumerate() {
            *slot = self.buffer[(read + n) % size].load();
        }
        self.read_pos
            .store((read + output.len()) % size, Ordering::Release);
        Ok(())
    }

    /// 丢弃 `count` 个元素而不拷贝；用于数据已经通过 `span` 交给下游之后
    pub fn consume(&self, count: usize) -> Result<()> {
        let read = self.begin_batch_read(count)?;
        self.read_pos
            .store((read + count) % self.buffer.len(), Ordering::Release);
        Ok(())
    }

    #[inline]
    fn begin_batch_read(&self, count: usize) -> Result<usize> {
        if self.buffer.is_empty() {
            return Err(StreamError::NotReady);
        }
        self.popped.store(true, Ordering::Release);
        if count > self.available() {
            return Err(StreamError::Underrun);
        }
        Ok(self.read_pos.load(Ordering::Relaxed))
    }

    /// 当前可读元素数
    #[inline]
    pub fn available(&self) -> usize {
        let size = self.buffer.len();
        if size == 0 {
            return 0;
        }
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        // +size 保证取模前非负
        (size + write - read) % size
    }

    /// 当前可写元素数
    #[inline]
    pub fn vacant(&self) -> usize {
        let size = self.buffer.len();
        if size == 0 {
            return 0;
        }
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        (2 * size + read - write - 1) % size
    }

    /// 强制移动读游标
    ///
    /// 位置变化时返回 `Resynchronized`，调用方应丢弃依赖旧位置的状态。
    pub fn seek(&self, position: usize) -> Result<SeekOutcome> {
        if position >= self.buffer.len() {
            return Err(StreamError::BadArgument);
        }
        if self.read_pos.swap(position, Ordering::AcqRel) != position {
            return Ok(SeekOutcome::Resynchronized);
        }
        Ok(SeekOutcome::Unchanged)
    }

    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos.load(Ordering::Acquire)
    }

    #[inline]
    pub fn write_position(&self) -> usize {
        self.write_pos.load(Ordering::Acquire)
    }

    /// 是否在上一次 overrun 警告之后被 pop 过
    #[inline]
    pub fn has_been_popped(&self) -> bool {
        self.popped.load(Ordering::Acquire)
    }

    /// 把从 `offset` 开始长度为 `len` 的区间拆成至多两段连续索引
    pub fn span(&self, offset: usize, len: usize) -> Result<Span> {
        let size = self.buffer.len();
        if size == 0 {
            return Err(StreamError::NotReady);
        }
        if offset >= size || len > size {
            return Err(StreamError::BadArgument);
        }

        let end = offset + len;
        if end <= size {
            Ok(Span {
                head: offset..end,
                tail: None,
            })
        } else {
            Ok(Span {
                head: offset..size,
                tail: Some(0..end - size),
            })
        }
    }

    /// 把区间内容追加到 `output`（供传输层读取实际数据）
    pub fn copy_span(&self, span: &Span, output: &mut Vec<T>) -> Result<()> {
        output.reserve(span.len());
        for range in std::iter::once(&span.head).chain(span.tail.as_ref()) {
            let cells = self
                .buffer
                .get(range.clone())
                .ok_or(StreamError::BadArgument)?;
            output.extend(cells.iter().map(AtomicCell::load));
        }
        Ok(())
    }

    /// 锁定缓冲区内存，防止被换页
    ///
    /// 在实时音频场景下，page fault 会导致严重的时序抖动。
    /// 返回是否成功锁定
    pub fn lock_memory(&self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        if self.memory_locked.load(Ordering::Acquire) {
            return true;
        }

        let ptr = self.buffer.as_ptr() as *const libc::c_void;
        let len = std::mem::size_of_val(&*self.buffer);

        let result = unsafe { libc::mlock(ptr, len) };

        if result == 0 {
            self.memory_locked.store(true, Ordering::Release);
            log::debug!("CircularBuffer<{}> memory locked: {} bytes", self.name, len);
            true
        } else {
            log::warn!(
                "Failed to lock CircularBuffer<{}> memory: {}",
                self.name,
                std::io::Error::last_os_error()
            );
            false
        }
    }

    /// 解锁缓冲区内存
    pub fn unlock_memory(&self) {
        if !self.memory_locked.swap(false, Ordering::AcqRel) {
            return;
        }

        let ptr = self.buffer.as_ptr() as *const libc::c_void;
        let len = std::mem::size_of_val(&*self.buffer);

        unsafe {
            libc::munlock(ptr, len);
        }
        log::debug!("CircularBuffer<{}> memory unlocked", self.name);
    }

    /// 检查内存是否已锁定
    pub fn is_memory_locked(&self) -> bool {
        self.memory_locked.load(Ordering::Acquire)
    }
}

impl<T: Copy + Default> Default for CircularBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> Drop for CircularBuffer<T> {
    fn drop(&mut self) {
        self.unlock_memory();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_hook(ring: &mut CircularBuffer<i32>) -> Arc<Mutex<Vec<u64>>> {
        let wraps = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&wraps);
        ring.set_wrap_hook(move |ts| sink.lock().push(ts));
        wraps
    }

    #[test]
    fn test_fresh_buffer_occupancy() {
        for capacity in [1usize, 2, 3, 8, 100, 4096] {
            let ring = CircularBuffer::<u32>::with_capacity(capacity, "fresh").unwrap();
            assert_eq!(ring.available(), 0);
            assert_eq!(ring.vacant(), capacity - 1);
        }
    }

    #[test]
    fn test_init_rejects_zero_capacity() {
        let mut ring = CircularBuffer::<u32>::new();
        assert_eq!(ring.init(0, "zero"), Err(StreamError::BadArgument));
        assert!(!ring.is_initialized());
    }

    #[test]
    fn test_uninitialized_operations() {
        let ring = CircularBuffer::<u32>::new();
        assert_eq!(ring.push(1, 0), Err(StreamError::NotReady));
        assert_eq!(ring.push_slice(&[1, 2], 0, 1), Err(StreamError::NotReady));
        assert_eq!(ring.pop(), Err(StreamError::NotReady));
        assert_eq!(ring.pop_slice(&mut [0; 2]), Err(StreamError::NotReady));
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.vacant(), 0);
        assert_eq!(ring.seek(0), Err(StreamError::BadArgument));
    }

    #[test]
    fn test_free_is_idempotent_and_reinit_works() {
        let mut ring = CircularBuffer::<u32>::with_capacity(4, "reinit").unwrap();
        ring.push(7, 0).unwrap();
        ring.free();
        ring.free();
        assert!(!ring.is_initialized());
        assert_eq!(ring.pop(), Err(StreamError::NotReady));

        ring.init(6, "reinit").unwrap();
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.vacant(), 5);
        assert_eq!(ring.read_position(), 0);
        assert_eq!(ring.write_position(), 0);
    }

    #[test]
    fn test_occupancy_invariant_holds() {
        let capacity = 7;
        let ring = CircularBuffer::<u32>::with_capacity(capacity, "invariant").unwrap();
        let mut expected = std::collections::VecDeque::new();

        // 固定的 push/pop 节奏，覆盖多次回绕
        for round in 0..50u32 {
            for i in 0..(round % 4) {
                if ring.push(round * 10 + i, 0).is_ok() {
                    expected.push_back(round * 10 + i);
                }
                assert_eq!(ring.available() + ring.vacant(), capacity - 1);
            }
            for _ in 0..(round % 3) {
                match ring.pop() {
                    Ok(v) => assert_eq!(Some(v), expected.pop_front()),
                    Err(e) => {
                        assert_eq!(e, StreamError::Underrun);
                        assert!(expected.is_empty());
                    }
                }
                assert_eq!(ring.available() + ring.vacant(), capacity - 1);
            }
            assert_eq!(ring.available(), expected.len());
        }
    }

    #[test]
    fn test_single_push_overrun_and_pop_underrun() {
        let ring = CircularBuffer::<i32>::with_capacity(4, "full").unwrap();
        for i in 0..3 {
            ring.push(i, 0).unwrap();
        }
        assert_eq!(ring.vacant(), 0);
        assert_eq!(ring.push(99, 0), Err(StreamError::Overrun));
        assert_eq!(ring.available(), 3);

        for i in 0..3 {
            assert_eq!(ring.pop(), Ok(i));
        }
        assert_eq!(ring.pop(), Err(StreamError::Underrun));
    }

    #[test]
    fn test_pop_slice_is_all_or_nothing() {
        let ring = CircularBuffer::<i32>::with_capacity(8, "batch").unwrap();
        ring.push_slice(&[1, 2, 3], 0, 0).unwrap();

        let mut four = [0; 4];
        assert_eq!(ring.pop_slice(&mut four), Err(StreamError::Underrun));
        assert_eq!(ring.available(), 3);
        assert_eq!(four, [0; 4]);

        let mut three = [0; 3];
        ring.pop_slice(&mut three).unwrap();
        assert_eq!(three, [1, 2, 3]);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_consume_discards_without_copy() {
        let ring = CircularBuffer::<i32>::with_capacity(8, "consume").unwrap();
        ring.push_slice(&[1, 2, 3, 4], 0, 0).unwrap();
        assert_eq!(ring.consume(5), Err(StreamError::Underrun));
        ring.consume(3).unwrap();
        assert_eq!(ring.pop(), Ok(4));
    }

    #[test]
    fn test_wrap_fires_once_per_capacity() {
        let mut ring = CircularBuffer::<i32>::new();
        ring.init(4, "wrap").unwrap();
        let wraps = recording_hook(&mut ring);

        // 每次写 1 读 1，共 12 个元素 => 3 次回绕
        for i in 0..12 {
            ring.push(i, 1000 + i as u64).unwrap();
            ring.pop().unwrap();
        }
        // 写游标在第 4、8、12 个元素之后回到 0
        assert_eq!(*wraps.lock(), vec![1003, 1007, 1011]);
    }

    #[test]
    fn test_batch_wrap_timestamp_interpolated() {
        let mut ring = CircularBuffer::<i32>::new();
        ring.init(8, "interp").unwrap();
        let wraps = recording_hook(&mut ring);

        ring.push_slice(&[0; 3], 0, 0).unwrap();
        ring.consume(3).unwrap();
        // 写游标在 3，第 5 个元素 (n=4) 写到索引 7 后回绕
        ring.push_slice(&[1; 6], 500, 10).unwrap();
        assert_eq!(*wraps.lock(), vec![540]);
        assert_eq!(ring.write_position(), 1);
    }

    #[test]
    fn test_seek() {
        let ring = CircularBuffer::<i32>::with_capacity(8, "seek").unwrap();
        ring.push_slice(&[1, 2, 3, 4, 5], 0, 1).unwrap();

        assert_eq!(ring.seek(0), Ok(SeekOutcome::Unchanged));
        assert_eq!(ring.read_position(), 0);

        assert_eq!(ring.seek(3), Ok(SeekOutcome::Resynchronized));
        assert_eq!(ring.read_position(), 3);
        assert_eq!(ring.pop(), Ok(4));

        assert_eq!(ring.seek(8), Err(StreamError::BadArgument));
        assert_eq!(ring.read_position(), 4);
    }

    #[test]
    fn test_scenario_overrun_suppression() {
        let mut ring = CircularBuffer::<i32>::new();
        ring.init(8, "scenario").unwrap();
        let wraps = recording_hook(&mut ring);

        ring.push_slice(&[10, 11, 12, 13, 14], 0, 1).unwrap();
        assert_eq!(ring.available(), 5);
        assert_eq!(ring.vacant(), 2);

        let mut out = [0; 5];
        ring.pop_slice(&mut out).unwrap();
        assert_eq!(out, [10, 11, 12, 13, 14]);
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.vacant(), 7);
        assert!(ring.has_been_popped());

        // 10 > 7：走 overrun 抑制路径，不失败
        let batch: Vec<i32> = (0..10).collect();
        assert_eq!(ring.push_slice(&batch, 100, 1), Ok(()));
        assert!(!ring.has_been_popped());

        // 写游标从 5 开始：索引 5,6,7 之后回绕，即批内第 3 个元素 (n=2)
        assert_eq!(*wraps.lock(), vec![102]);
        assert_eq!(ring.write_position(), 7);
        assert_eq!(ring.available() + ring.vacant(), 7);
    }

    #[test]
    fn test_scenario_wrap_at_seventh_element() {
        let mut ring = CircularBuffer::<i32>::new();
        ring.init(8, "seventh").unwrap();
        let wraps = recording_hook(&mut ring);

        ring.push(0, 0).unwrap();
        ring.pop().unwrap();
        assert_eq!(ring.vacant(), 7);

        // 写游标从 1 开始：第 7 个元素 (n=6) 写到索引 7 后回绕
        let batch: Vec<i32> = (0..10).collect();
        ring.push_slice(&batch, 100, 1).unwrap();
        assert_eq!(*wraps.lock(), vec![106]);
    }

    #[test]
    fn test_span_split_at_physical_end() {
        let ring = CircularBuffer::<u8>::with_capacity(10, "span").unwrap();

        let straight = ring.span(2, 5).unwrap();
        assert_eq!(straight.head, 2..7);
        assert!(!straight.is_wrapped());

        let exact_end = ring.span(6, 4).unwrap();
        assert_eq!(exact_end.head, 6..10);
        assert!(!exact_end.is_wrapped());

        let wrapped = ring.span(8, 5).unwrap();
        assert_eq!(wrapped.head, 8..10);
        assert_eq!(wrapped.tail, Some(0..3));
        assert_eq!(wrapped.len(), 5);

        assert_eq!(ring.span(10, 1), Err(StreamError::BadArgument));
        assert_eq!(ring.span(0, 11), Err(StreamError::BadArgument));
    }

    #[test]
    fn test_copy_span_reads_across_wrap() {
        let ring = CircularBuffer::<u8>::with_capacity(6, "copy").unwrap();
        ring.push_slice(&[1, 2, 3, 4], 0, 0).unwrap();
        ring.consume(4).unwrap();
        ring.push_slice(&[5, 6, 7, 8], 0, 0).unwrap();

        let span = ring.span(4, 4).unwrap();
        assert!(span.is_wrapped());
        let mut out = Vec::new();
        ring.copy_span(&span, &mut out).unwrap();
        assert_eq!(out, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let ring = Arc::new(CircularBuffer::<u32>::with_capacity(64, "spsc").unwrap());
        let producer_ring = Arc::clone(&ring);
        const COUNT: u32 = 10_000;

        let producer = std::thread::spawn(move || {
            let mut next = 0;
            while next < COUNT {
                if producer_ring.push(next, next as u64).is_ok() {
                    next += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let mut expected = 0;
        while expected < COUNT {
            match ring.pop() {
                Ok(v) => {
                    assert_eq!(v, expected);
                    expected += 1;
                }
                Err(StreamError::Underrun) => std::thread::yield_now(),
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        producer.join().unwrap();
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_lock_memory() {
        let empty = CircularBuffer::<u8>::new();
        assert!(!empty.lock_memory());

        let ring = CircularBuffer::<u8>::with_capacity(4096, "locked").unwrap();
        assert!(!ring.is_memory_locked());
        // 受 RLIMIT_MEMLOCK 限制，可能失败
        let locked = ring.lock_memory();
        assert_eq!(ring.is_memory_locked(), locked);
        ring.unlock_memory();
        assert!(!ring.is_memory_locked());
    }
}
