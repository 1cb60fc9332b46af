//! 异步录制钩子（Async Recording Hook）
//!
//! 把每个原始帧连同接收时间推入有界队列，由其他线程落盘或分析。
//!
//! # 设计要点
//!
//! - **有界队列**: `bounded(capacity)`，队列满时丢弃新帧而不是阻塞读线程
//! - **丢帧监控**: `dropped_frames` 计数器
//! - **时间戳**: 相对于钩子创建时刻的微秒数，回放时可据此还原节奏
//!
//! # 使用示例
//!
//! ```rust
//! use kobuki_driver::hooks::FrameCallback;
//! use kobuki_driver::recording::AsyncRecordingHook;
//! use std::sync::Arc;
//!
//! let (hook, rx) = AsyncRecordingHook::new();
//! let dropped_counter = hook.dropped_frames().clone();
//!
//! let callback = Arc::new(hook) as Arc<dyn FrameCallback>;
//!
//! std::thread::spawn(move || {
//!     while let Ok(frame) = rx.recv() {
//!         // 写入文件...
//!         let _ = frame.to_wire();
//!     }
//! });
//!
//! println!("丢了 {} 帧", dropped_counter.load(std::sync::atomic::Ordering::Relaxed));
//! ```

use crate::hooks::FrameCallback;
use crossbeam_channel::{Receiver, Sender, bounded};
use kobuki_protocol::RawFrame;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// 默认队列容量：50Hz 下约 20 分钟
pub const DEFAULT_RECORDING_CAPACITY: usize = 60_000;

/// 带时间戳的原始帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedFrame {
    /// 自钩子创建起的微秒数
    pub timestamp_us: u64,
    pub frame: RawFrame,
}

impl TimestampedFrame {
    /// 还原为线上字节（含帧头和校验）
    pub fn to_wire(&self) -> Vec<u8> {
        self.frame.to_wire()
    }
}

/// 异步录制钩子
pub struct AsyncRecordingHook {
    tx: Sender<TimestampedFrame>,
    epoch: Instant,
    dropped_frames: Arc<AtomicU64>,
    frame_counter: Arc<AtomicU64>,
}

impl AsyncRecordingHook {
    /// 使用默认容量创建
    #[must_use]
    pub fn new() -> (Self, Receiver<TimestampedFrame>) {
        Self::with_capacity(DEFAULT_RECORDING_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, Receiver<TimestampedFrame>) {
        let (tx, rx) = bounded(capacity);
        let hook = Self {
            tx,
            epoch: Instant::now(),
            dropped_frames: Arc::new(AtomicU64::new(0)),
            frame_counter: Arc::new(AtomicU64::new(0)),
        };
        (hook, rx)
    }

    /// 丢帧计数器（建议在注册前 clone 一份持有）
    #[must_use]
    pub fn dropped_frames(&self) -> &Arc<AtomicU64> {
        &self.dropped_frames
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// 成功入队的帧计数器
    #[must_use]
    pub fn frame_counter(&self) -> &Arc<AtomicU64> {
        &self.frame_counter
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }
}

impl FrameCallback for AsyncRecordingHook {
    #[inline]
    fn on_frame_received(&self, frame: &RawFrame) {
        let ts_frame = TimestampedFrame {
            timestamp_us: self.epoch.elapsed().as_micros() as u64,
            // Bytes 克隆只增加引用计数
            frame: frame.clone(),
        };
        if self.tx.try_send(ts_frame).is_err() {
            // 队列满或接收端已关闭：丢弃新帧
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        } else {
            self.frame_counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}
