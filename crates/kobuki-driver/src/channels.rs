//! 固定通道约定
//!
//! 通道名为 `{namespace}/{signal}`，十个信号名与载荷类型一一对应，不可增减。

use crate::bus::{EventBus, PayloadKind, Publisher};
use crate::error::BusError;
use crate::events::*;

/// 通道信号名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    StreamData,
    RosDebug,
    RosInfo,
    RosWarn,
    RosError,
    ButtonEvent,
    BumperEvent,
    CliffEvent,
    WheelEvent,
    PowerEvent,
    InputEvent,
    RobotEvent,
    VersionInfo,
}

impl Signal {
    pub const ALL: [Signal; 13] = [
        Signal::StreamData,
        Signal::RosDebug,
        Signal::RosInfo,
        Signal::RosWarn,
        Signal::RosError,
        Signal::ButtonEvent,
        Signal::BumperEvent,
        Signal::CliffEvent,
        Signal::WheelEvent,
        Signal::PowerEvent,
        Signal::InputEvent,
        Signal::RobotEvent,
        Signal::VersionInfo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::StreamData => "stream_data",
            Signal::RosDebug => "ros_debug",
            Signal::RosInfo => "ros_info",
            Signal::RosWarn => "ros_warn",
            Signal::RosError => "ros_error",
            Signal::ButtonEvent => "button_event",
            Signal::BumperEvent => "bumper_event",
            Signal::CliffEvent => "cliff_event",
            Signal::WheelEvent => "wheel_event",
            Signal::PowerEvent => "power_event",
            Signal::InputEvent => "input_event",
            Signal::RobotEvent => "robot_event",
            Signal::VersionInfo => "version_info",
        }
    }

    pub fn kind(self) -> PayloadKind {
        match self {
            Signal::StreamData => PayloadKind::Void,
            Signal::RosDebug | Signal::RosInfo | Signal::RosWarn | Signal::RosError => {
                PayloadKind::String
            },
            Signal::ButtonEvent => PayloadKind::ButtonEvent,
            Signal::BumperEvent => PayloadKind::BumperEvent,
            Signal::CliffEvent => PayloadKind::CliffEvent,
            Signal::WheelEvent => PayloadKind::WheelEvent,
            Signal::PowerEvent => PayloadKind::PowerEvent,
            Signal::InputEvent => PayloadKind::InputEvent,
            Signal::RobotEvent => PayloadKind::RobotEvent,
            Signal::VersionInfo => PayloadKind::VersionInfo,
        }
    }
}

/// 拼接通道名
///
/// 命名空间末尾的 `/` 会被去掉，`"/kobuki/"` 与 `"/kobuki"` 等价。
pub fn channel_name(namespace: &str, signal: Signal) -> String {
    format!("{}/{}", namespace.trim_end_matches('/'), signal.as_str())
}

/// 一个驱动实例持有的全部发布者
#[derive(Debug)]
pub struct ChannelSet {
    pub stream_data: Publisher<()>,
    pub ros_debug: Publisher<String>,
    pub ros_info: Publisher<String>,
    pub ros_warn: Publisher<String>,
    pub ros_error: Publisher<String>,
    pub button_event: Publisher<ButtonEvent>,
    pub bumper_event: Publisher<BumperEvent>,
    pub cliff_event: Publisher<CliffEvent>,
    pub wheel_event: Publisher<WheelEvent>,
    pub power_event: Publisher<PowerEvent>,
    pub input_event: Publisher<InputEvent>,
    pub robot_event: Publisher<RobotEvent>,
    pub version_info: Publisher<VersionInfo>,
}

impl ChannelSet {
    /// 在命名空间下注册全部通道
    ///
    /// 任一通道已被其他类型占用时返回 `TypeMismatch`；已注册成功的句柄随之 drop，
    /// 发布者计数会恢复原值。
    pub fn register(bus: &EventBus, namespace: &str) -> Result<Self, BusError> {
        let name = |signal| channel_name(namespace, signal);
        Ok(Self {
            stream_data: bus.register(&name(Signal::StreamData))?,
            ros_debug: bus.register(&name(Signal::RosDebug))?,
            ros_info: bus.register(&name(Signal::RosInfo))?,
            ros_warn: bus.register(&name(Signal::RosWarn))?,
            ros_error: bus.register(&name(Signal::RosError))?,
            button_event: bus.register(&name(Signal::ButtonEvent))?,
            bumper_event: bus.register(&name(Signal::BumperEvent))?,
            cliff_event: bus.register(&name(Signal::CliffEvent))?,
            wheel_event: bus.register(&name(Signal::WheelEvent))?,
            power_event: bus.register(&name(Signal::PowerEvent))?,
            input_event: bus.register(&name(Signal::InputEvent))?,
            robot_event: bus.register(&name(Signal::RobotEvent))?,
            version_info: bus.register(&name(Signal::VersionInfo))?,
        })
    }
}
