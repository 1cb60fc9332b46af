//! Kobuki 驱动门面
//!
//! 持有一组重组器、解码器和边沿检测器，把字节流转换成总线上的事件。
//!
//! # 单帧处理顺序
//!
//! 1. 原始帧钩子
//! 2. 解码，失败则在 `ros_error` 上报告并丢弃本帧
//! 3. 合并快照并通过 `ArcSwap` 原子替换（之后的所有订阅者都能读到本帧数据）
//! 4. 离散事件（按域顺序）
//! 5. `version_info`（仅在版本信息首次齐全或发生变化时）
//! 6. `stream_data`

use crate::builder::DriverConfig;
use crate::bus::{EventBus, FanOutReport};
use crate::channels::ChannelSet;
use crate::detector::{DiscreteEvent, DiscreteState, Notification, StateDeltaDetector};
use crate::error::DriverError;
use crate::events::VersionInfo;
use crate::hooks::{FrameCallback, HookManager};
use crate::metrics::DriverMetrics;
use arc_swap::ArcSwap;
use kobuki_protocol::{FrameReassembler, FramingError, PacketDecoder, RawFrame, Snapshot};
use parking_lot::RwLock;
use semver::VersionReq;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// 跨线程读取最新快照的句柄
///
/// 读取无锁，返回的快照要么是某一帧合并前的完整状态，要么是合并后的完整状态。
#[derive(Clone)]
pub struct SnapshotReader {
    inner: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotReader {
    pub fn get(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }

    /// 已合并的帧数
    pub fn frame_count(&self) -> u64 {
        self.inner.load().frame_count
    }
}

impl std::fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("frame_count", &self.frame_count())
            .finish()
    }
}

/// Kobuki 驱动
///
/// 非可重入：`on_bytes` 只能由一个线程驱动。其他线程通过 [`SnapshotReader`]
/// 读取快照、通过 [`EventBus`] 订阅事件。
///
/// # 示例
///
/// ```rust
/// use kobuki_driver::{EventBus, Kobuki, KobukiBuilder};
/// use kobuki_driver::events::ButtonEvent;
/// use kobuki_protocol::{CoreSensors, FrameBuilder};
///
/// let bus = EventBus::new();
/// let _sub = bus
///     .subscribe("/kobuki/button_event", |e: &ButtonEvent| {
///         println!("buttons {:#04x} -> {:#04x}", e.previous, e.current);
///         Ok(())
///     })
///     .unwrap();
///
/// let mut kobuki = KobukiBuilder::new().bus(bus).build().unwrap();
/// let core = CoreSensors { buttons: 0x01, battery: 160, ..Default::default() };
/// let bytes = FrameBuilder::new().core_sensors(&core).build().unwrap();
///
/// assert_eq!(kobuki.on_bytes(&bytes), 1);
/// assert_eq!(kobuki.get_snapshot().core.map(|c| c.buttons), Some(0x01));
/// ```
pub struct Kobuki {
    bus: EventBus,
    config: DriverConfig,
    firmware_requirement: VersionReq,

    reassembler: FrameReassembler,
    decoder: PacketDecoder,
    detector: StateDeltaDetector,

    snapshot: Arc<ArcSwap<Snapshot>>,
    channels: ChannelSet,
    hooks: Arc<RwLock<HookManager>>,
    metrics: Arc<DriverMetrics>,

    /// 最近一次发布的版本信息
    version: Option<VersionInfo>,
    /// 最近一次成功解码的时间（看门狗用）
    last_frame_at: Option<Instant>,
}

impl Kobuki {
    /// 创建驱动并在 `config.namespace` 下注册全部通道
    pub fn new(bus: EventBus, config: DriverConfig) -> Result<Self, DriverError> {
        let firmware_requirement = config.validate()?;
        let channels = ChannelSet::register(&bus, &config.namespace)?;
        info!(
            "Kobuki driver on namespace {} (firmware {})",
            config.namespace, firmware_requirement
        );

        Ok(Self {
            reassembler: FrameReassembler::with_capacity(config.buffer_capacity),
            decoder: PacketDecoder::new(),
            detector: StateDeltaDetector::new(config.battery),
            snapshot: Arc::new(ArcSwap::from_pointee(Snapshot::default())),
            channels,
            hooks: Arc::new(RwLock::new(HookManager::new())),
            metrics: Arc::new(DriverMetrics::new()),
            version: None,
            last_frame_at: None,
            bus,
            config,
            firmware_requirement,
        })
    }

    /// 喂入一段字节，返回本次成功解码的帧数
    ///
    /// 字节可以任意切分，长度也不受缓冲区上限约束；不完整的帧留在缓冲区
    /// 等待下一次调用。
    pub fn on_bytes(&mut self, bytes: &[u8]) -> usize {
        self.metrics
            .bytes_received
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);

        let mut decoded = 0;
        let mut rest = bytes;
        loop {
            let n = self.reassembler.fill(rest);
            rest = &rest[n..];
            decoded += self.drain_frames();
            if rest.is_empty() {
                return decoded;
            }
        }
    }

    /// 取出缓冲区中所有已完成的帧
    fn drain_frames(&mut self) -> usize {
        let mut decoded = 0;
        while let Some(item) = self.reassembler.next_frame() {
            match item {
                Ok(frame) => {
                    if self.handle_frame(&frame) {
                        decoded += 1;
                    }
                },
                Err(err) => self.handle_framing_error(err),
            }
        }
        decoded
    }

    fn handle_framing_error(&self, err: FramingError) {
        self.metrics.framing_errors.fetch_add(1, Ordering::Relaxed);
        if let FramingError::Resync { discarded, .. } = err {
            self.metrics
                .bytes_discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
        }
        self.log(LogLevel::Warn, format!("Framing: {err}"));
    }

    fn handle_frame(&mut self, frame: &RawFrame) -> bool {
        self.metrics.frames_received.fetch_add(1, Ordering::Relaxed);
        self.hooks.read().trigger_all(frame);

        let delta = match self.decoder.decode(frame) {
            Ok(delta) => delta,
            Err(err) => {
                self.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                self.log(LogLevel::Error, format!("Decode: {err}"));
                return false;
            },
        };
        if !delta.unknown_tags.is_empty() {
            self.metrics
                .unknown_tags
                .fetch_add(delta.unknown_tags.len() as u64, Ordering::Relaxed);
            self.log(
                LogLevel::Debug,
                format!(
                    "Skipped unknown sub-packets {:02X?}",
                    delta.unknown_tags.as_slice()
                ),
            );
        }

        // 先整体替换快照，再发布任何事件
        let mut next = Snapshot::clone(&self.snapshot.load());
        next.apply(&delta);
        let next = Arc::new(next);
        self.snapshot.store(Arc::clone(&next));
        if self.last_frame_at.is_none() {
            self.log(LogLevel::Info, "Robot online".to_string());
        }
        self.last_frame_at = Some(Instant::now());
        self.metrics.frames_decoded.fetch_add(1, Ordering::Relaxed);

        for notification in self.detector.update(&next) {
            match notification {
                Notification::Discrete(event) => self.publish_discrete(event),
                Notification::DataArrived => {
                    self.refresh_version(&next);
                    let report = self.channels.stream_data.publish(&());
                    self.settle(report);
                },
            }
        }
        true
    }

    fn publish_discrete(&self, event: DiscreteEvent) {
        let report = match event {
            DiscreteEvent::Button(e) => self.channels.button_event.publish(&e),
            DiscreteEvent::Bumper(e) => self.channels.bumper_event.publish(&e),
            DiscreteEvent::Cliff(e) => self.channels.cliff_event.publish(&e),
            DiscreteEvent::Wheel(e) => self.channels.wheel_event.publish(&e),
            DiscreteEvent::Power(e) => self.channels.power_event.publish(&e),
            DiscreteEvent::Input(e) => self.channels.input_event.publish(&e),
            DiscreteEvent::Robot(e) => self.channels.robot_event.publish(&e),
        };
        self.metrics.events_published.fetch_add(1, Ordering::Relaxed);
        self.settle(report);

        if let DiscreteEvent::Robot(e) = event {
            if e.came_online() {
                self.log(LogLevel::Info, "Robot online".to_string());
            }
            for (wheel, over) in e.over_current_transitions() {
                if over {
                    self.log(LogLevel::Warn, format!("Over current on {wheel:?} wheel"));
                }
            }
        }
    }

    /// 版本信息齐全且有变化时发布，并检查固件版本
    fn refresh_version(&mut self, snapshot: &Snapshot) {
        let (Some(hardware), Some(firmware), Some(udid)) = (
            snapshot.hardware_version,
            snapshot.firmware_version,
            snapshot.udid,
        ) else {
            return;
        };
        let info = VersionInfo::new(hardware, firmware, udid);
        if self.version == Some(info) {
            return;
        }
        self.version = Some(info);

        self.log(LogLevel::Info, format!("Version info: {info}"));
        if !info.firmware_matches(&self.firmware_requirement) {
            self.log(
                LogLevel::Warn,
                format!(
                    "Unsupported firmware {} (requires {})",
                    info.firmware_version(),
                    self.firmware_requirement
                ),
            );
        }

        let report = self.channels.version_info.publish(&info);
        self.metrics.events_published.fetch_add(1, Ordering::Relaxed);
        self.settle(report);
    }

    /// 把订阅者失败转成 `ros_error` 消息
    fn settle(&self, report: FanOutReport) {
        if report.failures.is_empty() {
            return;
        }
        self.metrics
            .subscriber_failures
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
        for failure in &report.failures {
            self.log(LogLevel::Error, failure.to_string());
        }
    }

    /// 同时写 tracing 和对应的 `ros_*` 通道
    fn log(&self, level: LogLevel, message: String) {
        let ns = self.config.namespace.as_str();
        let publisher = match level {
            LogLevel::Debug => {
                debug!(namespace = ns, "{}", message);
                &self.channels.ros_debug
            },
            LogLevel::Info => {
                info!(namespace = ns, "{}", message);
                &self.channels.ros_info
            },
            LogLevel::Warn => {
                warn!(namespace = ns, "{}", message);
                &self.channels.ros_warn
            },
            LogLevel::Error => {
                error!(namespace = ns, "{}", message);
                &self.channels.ros_error
            },
        };

        let report = publisher.publish(&message);
        // 日志通道自身的失败只记 tracing，不再回灌总线
        if !report.failures.is_empty() {
            self.metrics
                .subscriber_failures
                .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
            for failure in &report.failures {
                warn!(namespace = ns, "{}", failure);
            }
        }
    }

    /// 离线看门狗
    ///
    /// 距最近一次成功解码超过 `offline_timeout` 时发布离线的 `RobotEvent`，
    /// 返回本次是否发生了离线切换。从未收到过帧时不判定。
    pub fn check_liveness(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_frame_at else {
            return false;
        };
        let silent = now.saturating_duration_since(last);
        if silent < self.config.offline_timeout() {
            return false;
        }
        match self.detector.mark_offline() {
            Some(event) => {
                self.log(
                    LogLevel::Warn,
                    format!("No data for {silent:?}, robot offline"),
                );
                self.publish_discrete(event);
                true
            },
            None => false,
        }
    }

    /// 丢弃缓冲区中的残帧（读循环在帧超时后调用），返回丢弃的字节数
    ///
    /// 残帧之后已经到齐的有效帧会立即解码发布。
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.reassembler.discard_pending();
        if dropped > 0 {
            // 丢弃的字节会并入下一次 Resync 报告，这里只计次数
            self.metrics
                .stale_frames_dropped
                .fetch_add(1, Ordering::Relaxed);
            self.log(
                LogLevel::Debug,
                format!("Dropped {dropped} stale bytes after frame timeout"),
            );
            self.drain_frames();
        }
        dropped
    }

    /// 缓冲区中尚未成帧的字节数
    pub fn buffered(&self) -> usize {
        self.reassembler.buffered()
    }

    /// 最新快照（原子读取）
    pub fn get_snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn snapshot_reader(&self) -> SnapshotReader {
        SnapshotReader {
            inner: Arc::clone(&self.snapshot),
        }
    }

    pub fn discrete_state(&self) -> &DiscreteState {
        self.detector.state()
    }

    pub fn is_online(&self) -> bool {
        self.detector.state().robot.online
    }

    /// 最近一次发布的版本信息
    pub fn version_info(&self) -> Option<VersionInfo> {
        self.version
    }

    pub fn register_callback(&self, callback: Arc<dyn FrameCallback>) {
        self.hooks.write().add_callback(callback);
    }

    pub fn hooks(&self) -> &Arc<RwLock<HookManager>> {
        &self.hooks
    }

    pub fn metrics(&self) -> &Arc<DriverMetrics> {
        &self.metrics
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl std::fmt::Debug for Kobuki {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kobuki")
            .field("namespace", &self.config.namespace)
            .field("buffered", &self.reassembler.buffered())
            .field("state", self.detector.state())
            .finish()
    }
}
