//! 驱动运行指标
//!
//! 原子计数器，读线程写入，任意线程读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 驱动实时指标
///
/// # 使用示例
///
/// ```rust
/// use kobuki_driver::DriverMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = DriverMetrics::new();
/// metrics.frames_decoded.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.frames_decoded, 1);
/// ```
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 收到的原始字节数
    pub bytes_received: AtomicU64,

    /// 通过校验的帧数
    pub frames_received: AtomicU64,

    /// 成功解码并合并的帧数
    pub frames_decoded: AtomicU64,

    /// 失步（Resync）次数
    pub framing_errors: AtomicU64,

    /// 失步期间丢弃的字节数
    pub bytes_discarded: AtomicU64,

    /// 解码失败的帧数
    pub decode_errors: AtomicU64,

    /// 跳过的未知子包数
    pub unknown_tags: AtomicU64,

    /// 发布到离散事件通道的事件数（不含 stream_data 与日志通道）
    pub events_published: AtomicU64,

    /// 订阅者失败次数
    pub subscriber_failures: AtomicU64,

    /// 因超时丢弃的不完整帧数
    pub stale_frames_dropped: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 一次性读取全部计数器
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unknown_tags: self.unknown_tags.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            subscriber_failures: self.subscriber_failures.load(Ordering::Relaxed),
            stale_frames_dropped: self.stale_frames_dropped.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.bytes_received.store(0, Ordering::Relaxed);
        self.frames_received.store(0, Ordering::Relaxed);
        self.frames_decoded.store(0, Ordering::Relaxed);
        self.framing_errors.store(0, Ordering::Relaxed);
        self.bytes_discarded.store(0, Ordering::Relaxed);
        self.decode_errors.store(0, Ordering::Relaxed);
        self.unknown_tags.store(0, Ordering::Relaxed);
        self.events_published.store(0, Ordering::Relaxed);
        self.subscriber_failures.store(0, Ordering::Relaxed);
        self.stale_frames_dropped.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub bytes_received: u64,
    pub frames_received: u64,
    pub frames_decoded: u64,
    pub framing_errors: u64,
    pub bytes_discarded: u64,
    pub decode_errors: u64,
    pub unknown_tags: u64,
    pub events_published: u64,
    pub subscriber_failures: u64,
    pub stale_frames_dropped: u64,
}

impl MetricsSnapshot {
    /// 有效帧中解码成功的比例（百分比）
    ///
    /// `frames_received` 为 0 时返回 0.0。
    pub fn decode_success_rate(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        (self.frames_decoded as f64 / self.frames_received as f64) * 100.0
    }

    /// 被丢弃的字节占比（百分比）
    pub fn discard_rate(&self) -> f64 {
        if self.bytes_received == 0 {
            return 0.0;
        }
        (self.bytes_discarded as f64 / self.bytes_received as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_default() {
        let snapshot = DriverMetrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
        assert_eq!(snapshot.decode_success_rate(), 0.0);
        assert_eq!(snapshot.discard_rate(), 0.0);
    }

    #[test]
    fn test_metrics_rates() {
        let metrics = DriverMetrics::new();
        metrics.frames_received.fetch_add(10, Ordering::Relaxed);
        metrics.frames_decoded.fetch_add(9, Ordering::Relaxed);
        metrics.bytes_received.fetch_add(200, Ordering::Relaxed);
        metrics.bytes_discarded.fetch_add(50, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert!((snapshot.decode_success_rate() - 90.0).abs() < 1e-9);
        assert!((snapshot.discard_rate() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = DriverMetrics::new();
        metrics.decode_errors.fetch_add(3, Ordering::Relaxed);
        metrics.unknown_tags.fetch_add(1, Ordering::Relaxed);
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_concurrent_increment() {
        let metrics = Arc::new(DriverMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.events_published.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.snapshot().events_published, 8000);
    }
}
