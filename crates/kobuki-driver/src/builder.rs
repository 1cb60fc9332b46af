//! 配置与 Builder
//!
//! `DriverConfig` 是纯数据（可选 serde），`KobukiBuilder` 负责校验并链式构造 `Kobuki`。

use crate::bus::EventBus;
use crate::detector::BatteryThresholds;
use crate::error::DriverError;
use crate::hooks::FrameCallback;
use crate::kobuki::Kobuki;
use kobuki_protocol::constants::{DEFAULT_BUFFER_CAPACITY, FRAME_OVERHEAD};
use semver::VersionReq;
use std::sync::Arc;
use std::time::Duration;

/// 默认命名空间
pub const DEFAULT_NAMESPACE: &str = "/kobuki";

/// 默认固件版本要求
pub const DEFAULT_FIRMWARE_REQUIREMENT: &str = ">=1.1.0, <2.0.0";

/// 驱动配置
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DriverConfig {
    /// 通道命名空间（如 "/kobuki"）
    pub namespace: String,
    /// 固件版本要求（semver 语法）
    pub firmware_requirement: String,
    /// 重组缓冲区容量（字节）
    pub buffer_capacity: usize,
    /// 不完整帧的等待超时（毫秒）
    /// 超过此时间没有新字节到达，丢弃缓冲区中的残帧
    pub frame_timeout_ms: u64,
    /// 离线判定超时（毫秒）
    pub offline_timeout_ms: u64,
    /// 电量等级阈值（TOML 中的子表放在最后）
    pub battery: BatteryThresholds,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            firmware_requirement: DEFAULT_FIRMWARE_REQUIREMENT.to_string(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            frame_timeout_ms: 20,
            offline_timeout_ms: 500, // 底盘以 50Hz 上报，约 25 个周期
            battery: BatteryThresholds::default(),
        }
    }
}

impl DriverConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn offline_timeout(&self) -> Duration {
        Duration::from_millis(self.offline_timeout_ms)
    }

    /// 校验配置并解析固件要求
    pub fn validate(&self) -> Result<VersionReq, DriverError> {
        if !self.namespace.starts_with('/') || self.namespace.trim_end_matches('/').is_empty() {
            return Err(DriverError::InvalidConfig(format!(
                "namespace must start with '/' and be non-empty, got '{}'",
                self.namespace
            )));
        }
        if self.battery.critical_dv > self.battery.low_dv {
            return Err(DriverError::InvalidConfig(format!(
                "critical battery threshold ({}) above low threshold ({})",
                self.battery.critical_dv, self.battery.low_dv
            )));
        }
        let min_capacity = u8::MAX as usize + FRAME_OVERHEAD;
        if self.buffer_capacity < min_capacity {
            return Err(DriverError::InvalidConfig(format!(
                "buffer capacity must be at least {} bytes, got {}",
                min_capacity, self.buffer_capacity
            )));
        }
        if self.frame_timeout_ms == 0 || self.offline_timeout_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(VersionReq::parse(&self.firmware_requirement)?)
    }
}

/// Kobuki Builder（链式构造）
///
/// # Example
///
/// ```rust
/// use kobuki_driver::{EventBus, KobukiBuilder};
/// use std::time::Duration;
///
/// let bus = EventBus::new();
/// let kobuki = KobukiBuilder::new()
///     .bus(bus.clone())
///     .namespace("/mobile_base")
///     .offline_timeout(Duration::from_millis(300))
///     .build()
///     .unwrap();
///
/// assert_eq!(kobuki.namespace(), "/mobile_base");
/// assert_eq!(bus.publisher_count("/mobile_base/stream_data"), 1);
/// ```
#[derive(Default)]
pub struct KobukiBuilder {
    bus: Option<EventBus>,
    config: DriverConfig,
    callbacks: Vec<Arc<dyn FrameCallback>>,
}

impl KobukiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用共享的事件总线（默认新建一个私有总线）
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// 整体替换配置
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn battery_thresholds(mut self, thresholds: BatteryThresholds) -> Self {
        self.config.battery = thresholds;
        self
    }

    pub fn firmware_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.config.firmware_requirement = requirement.into();
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.config.frame_timeout_ms = saturating_millis(timeout);
        self
    }

    pub fn offline_timeout(mut self, timeout: Duration) -> Self {
        self.config.offline_timeout_ms = saturating_millis(timeout);
        self
    }

    /// 预先注册原始帧钩子
    pub fn callback(mut self, callback: Arc<dyn FrameCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// 校验配置并创建驱动
    ///
    /// # 错误
    /// - `InvalidConfig` / `FirmwareRequirement`: 配置无效
    /// - `Bus(TypeMismatch)`: 命名空间下的通道已被其他类型占用
    pub fn build(self) -> Result<Kobuki, DriverError> {
        let bus = self.bus.unwrap_or_default();
        let kobuki = Kobuki::new(bus, self.config)?;
        {
            let mut hooks = kobuki.hooks().write();
            for callback in self.callbacks {
                hooks.add_callback(callback);
            }
        }
        Ok(kobuki)
    }
}

/// 超出 u64 的毫秒数按 `u64::MAX` 处理
fn saturating_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
