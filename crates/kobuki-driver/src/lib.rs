//! # Kobuki Driver
//!
//! Kobuki 移动底盘驱动核心（不含串口 IO），包括：
//! - 命名空间化、带类型标签的事件总线（[`bus`]）
//! - 离散状态边沿检测（[`detector`]）
//! - 驱动门面：字节流 → 快照 → 事件（[`Kobuki`]）
//! - 读循环与字节源边界（[`pipeline`]）
//! - 钩子系统：异步录制、自定义回调
//!
//! # 线程模型
//!
//! `Kobuki` 由单个读线程驱动；订阅回调在读线程上同步执行，
//! 其他线程通过 [`SnapshotReader`] 无锁读取最新快照。

mod builder;
pub mod bus;
pub mod channels;
pub mod detector;
mod error;
pub mod events;
pub mod hooks;
mod kobuki;
pub mod metrics;
pub mod pipeline;
pub mod recording;

pub use builder::{DEFAULT_FIRMWARE_REQUIREMENT, DEFAULT_NAMESPACE, DriverConfig, KobukiBuilder};
pub use bus::{
    ChannelInfo, Event, EventBus, FanOutReport, Introspection, PayloadKind, Publisher, Slot,
    SlotResult, SubscriptionHandle,
};
pub use channels::{ChannelSet, Signal, channel_name};
pub use detector::{
    BatteryThresholds, DiscreteEvent, DiscreteState, Domain, Notification, StateDeltaDetector,
};
pub use error::{BusError, DriverError, SlotError, SubscriberFailure};
pub use hooks::{FrameCallback, HookManager};
pub use kobuki::{Kobuki, SnapshotReader};
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use pipeline::{
    ByteSource, ChannelSource, LoopExit, ReadLoopHandle, ReaderSource, read_loop, spawn_read_loop,
};
pub use recording::{AsyncRecordingHook, TimestampedFrame};
