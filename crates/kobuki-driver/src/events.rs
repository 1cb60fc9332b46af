//! 离散事件载荷
//!
//! 每个事件都带有 `previous` / `current` 两个值，便于订阅者自行判断变化的位。
//! 位定义与 `kobuki_protocol::constants` 一致。

use kobuki_protocol::constants::*;
use kobuki_protocol::{PowerSource, UniqueDeviceId, Version, is_charging, power_source};
use smallvec::SmallVec;

/// 按位展开 `previous -> current` 的变化
fn transitions<T: Copy, S: Copy>(
    previous: u8,
    current: u8,
    bits: &[(u8, T)],
    set: S,
    cleared: S,
) -> SmallVec<[(T, S); 3]> {
    let changed = previous ^ current;
    bits.iter()
        .filter(|(mask, _)| changed & mask != 0)
        .map(|&(mask, item)| (item, if current & mask != 0 { set } else { cleared }))
        .collect()
}

// ============================================================================
// 按钮
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    B0,
    B1,
    B2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonState {
    Released,
    Pressed,
}

/// 按钮掩码变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub previous: u8,
    pub current: u8,
}

impl ButtonEvent {
    const BITS: [(u8, Button); 3] = [
        (BUTTON_0, Button::B0),
        (BUTTON_1, Button::B1),
        (BUTTON_2, Button::B2),
    ];

    pub fn changed(&self) -> u8 {
        self.previous ^ self.current
    }

    pub fn transitions(&self) -> SmallVec<[(Button, ButtonState); 3]> {
        transitions(
            self.previous,
            self.current,
            &Self::BITS,
            ButtonState::Pressed,
            ButtonState::Released,
        )
    }
}

// ============================================================================
// 碰撞
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bumper {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BumperState {
    Released,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumperEvent {
    pub previous: u8,
    pub current: u8,
}

impl BumperEvent {
    const BITS: [(u8, Bumper); 3] = [
        (BUMPER_RIGHT, Bumper::Right),
        (BUMPER_CENTER, Bumper::Center),
        (BUMPER_LEFT, Bumper::Left),
    ];

    pub fn changed(&self) -> u8 {
        self.previous ^ self.current
    }

    pub fn transitions(&self) -> SmallVec<[(Bumper, BumperState); 3]> {
        transitions(
            self.previous,
            self.current,
            &Self::BITS,
            BumperState::Pressed,
            BumperState::Released,
        )
    }
}

// ============================================================================
// 悬崖
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CliffSensor {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CliffState {
    Floor,
    Cliff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliffEvent {
    pub previous: u8,
    pub current: u8,
    /// 最近一次底部 ADC 读数 [right, central, left]（Cliff 子包未出现过时为 None）
    pub bottom: Option<[u16; 3]>,
}

impl CliffEvent {
    const BITS: [(u8, CliffSensor); 3] = [
        (CLIFF_RIGHT, CliffSensor::Right),
        (CLIFF_CENTER, CliffSensor::Center),
        (CLIFF_LEFT, CliffSensor::Left),
    ];

    pub fn changed(&self) -> u8 {
        self.previous ^ self.current
    }

    pub fn transitions(&self) -> SmallVec<[(CliffSensor, CliffState); 3]> {
        transitions(
            self.previous,
            self.current,
            &Self::BITS,
            CliffState::Cliff,
            CliffState::Floor,
        )
    }
}

// ============================================================================
// 轮子悬空
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wheel {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WheelState {
    Raised,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelEvent {
    pub previous: u8,
    pub current: u8,
}

impl WheelEvent {
    const BITS: [(u8, Wheel); 2] = [
        (WHEEL_DROP_RIGHT, Wheel::Right),
        (WHEEL_DROP_LEFT, Wheel::Left),
    ];

    pub fn changed(&self) -> u8 {
        self.previous ^ self.current
    }

    pub fn transitions(&self) -> SmallVec<[(Wheel, WheelState); 3]> {
        transitions(
            self.previous,
            self.current,
            &Self::BITS,
            WheelState::Dropped,
            WheelState::Raised,
        )
    }
}

// ============================================================================
// 电源
// ============================================================================

/// 电池电量等级（由电压阈值划分）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatteryLevel {
    #[default]
    Healthy,
    Low,
    Critical,
}

/// 电源域的离散值
///
/// 只包含充电器原始字节和电量等级，电压本身的抖动不构成事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerState {
    pub charger: u8,
    pub battery: BatteryLevel,
}

impl PowerState {
    pub fn source(&self) -> PowerSource {
        power_source(self.charger)
    }

    pub fn is_charging(&self) -> bool {
        is_charging(self.charger)
    }
}

/// 电源变化的语义分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerEventKind {
    Unplugged,
    PluggedToAdapter,
    PluggedToDockbase,
    ChargeCompleted,
    ChargingResumed,
    BatteryLow,
    BatteryCritical,
    BatteryRecovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerEvent {
    pub previous: PowerState,
    pub current: PowerState,
    /// 当前电池电压（0.1 V）
    pub battery_dv: u8,
}

impl PowerEvent {
    /// 本次变化包含的语义事件（充电器变化在前，电量变化在后）
    pub fn kinds(&self) -> SmallVec<[PowerEventKind; 2]> {
        let mut kinds = SmallVec::new();

        if self.previous.charger != self.current.charger {
            let kind = match (self.previous.source(), self.current.source()) {
                (PowerSource::None, PowerSource::None) => None,
                (_, PowerSource::None) => Some(PowerEventKind::Unplugged),
                (PowerSource::Adapter, PowerSource::Adapter)
                | (PowerSource::Dock, PowerSource::Dock) => {
                    match (self.previous.is_charging(), self.current.is_charging()) {
                        (true, false) => Some(PowerEventKind::ChargeCompleted),
                        (false, true) => Some(PowerEventKind::ChargingResumed),
                        _ => None,
                    }
                },
                (_, PowerSource::Adapter) => Some(PowerEventKind::PluggedToAdapter),
                (_, PowerSource::Dock) => Some(PowerEventKind::PluggedToDockbase),
            };
            kinds.extend(kind);
        }

        if self.previous.battery != self.current.battery {
            kinds.push(match self.current.battery {
                BatteryLevel::Healthy => PowerEventKind::BatteryRecovered,
                BatteryLevel::Low => PowerEventKind::BatteryLow,
                BatteryLevel::Critical => PowerEventKind::BatteryCritical,
            });
        }

        kinds
    }

    pub fn voltage(&self) -> f64 {
        self.battery_dv as f64 * 0.1
    }
}

// ============================================================================
// GPIO
// ============================================================================

/// 通用数字输入（低 4 位）变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub previous: u8,
    pub current: u8,
}

impl InputEvent {
    pub fn changed(&self) -> u8 {
        self.previous ^ self.current
    }

    /// 当前 4 路输入的电平
    pub fn values(&self) -> [bool; 4] {
        std::array::from_fn(|i| self.current & (1 << i) != 0)
    }
}

// ============================================================================
// 机器人状态
// ============================================================================

/// 在线状态 + 过流标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RobotSafety {
    pub online: bool,
    /// 过流位（Bit 0 左轮，Bit 1 右轮）
    pub over_current: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotEvent {
    pub previous: RobotSafety,
    pub current: RobotSafety,
}

impl RobotEvent {
    pub fn came_online(&self) -> bool {
        !self.previous.online && self.current.online
    }

    pub fn went_offline(&self) -> bool {
        self.previous.online && !self.current.online
    }

    /// 过流变化 `(Wheel, 是否过流)`
    pub fn over_current_transitions(&self) -> SmallVec<[(Wheel, bool); 3]> {
        transitions(
            self.previous.over_current,
            self.current.over_current,
            &[(OVER_CURRENT_LEFT, Wheel::Left), (OVER_CURRENT_RIGHT, Wheel::Right)],
            true,
            false,
        )
    }
}

// ============================================================================
// 版本信息
// ============================================================================

/// 硬件、固件、驱动版本与设备唯一 ID
///
/// 版本号以 `major << 16 | minor << 8 | patch` 打包。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub hardware: u32,
    pub firmware: u32,
    pub software: u32,
    pub udid: [u32; 3],
}

impl VersionInfo {
    pub fn new(hardware: Version, firmware: Version, udid: UniqueDeviceId) -> Self {
        Self {
            hardware: hardware.to_u32(),
            firmware: firmware.to_u32(),
            software: Self::software_version(),
            udid: udid.udid,
        }
    }

    /// 本驱动的版本号（打包格式）
    pub fn software_version() -> u32 {
        semver::Version::parse(env!("CARGO_PKG_VERSION"))
            .map(|v| {
                Version {
                    major: v.major as u8,
                    minor: v.minor as u8,
                    patch: v.patch as u8,
                }
                .to_u32()
            })
            .unwrap_or(0)
    }

    pub fn hardware_version(&self) -> Version {
        Version::from_u32(self.hardware)
    }

    pub fn firmware_version(&self) -> Version {
        Version::from_u32(self.firmware)
    }

    pub fn software_version_triplet(&self) -> Version {
        Version::from_u32(self.software)
    }

    /// 固件是否满足版本要求
    pub fn firmware_matches(&self, requirement: &semver::VersionReq) -> bool {
        let fw = self.firmware_version();
        requirement.matches(&semver::Version::new(
            fw.major as u64,
            fw.minor as u64,
            fw.patch as u64,
        ))
    }

    pub fn udid_string(&self) -> String {
        UniqueDeviceId { udid: self.udid }.to_string()
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hardware {}, firmware {}, software {}, udid {}",
            self.hardware_version(),
            self.firmware_version(),
            self.software_version_triplet(),
            self.udid_string()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_transitions() {
        let event = ButtonEvent {
            previous: 0x01,
            current: 0x04,
        };
        assert_eq!(event.changed(), 0x05);
        assert_eq!(
            event.transitions().as_slice(),
            &[(Button::B0, ButtonState::Released), (Button::B2, ButtonState::Pressed)]
        );
    }

    #[test]
    fn test_bumper_transitions_ignore_reserved_bits() {
        let event = BumperEvent {
            previous: 0x00,
            current: 0x82,
        };
        assert_eq!(
            event.transitions().as_slice(),
            &[(Bumper::Center, BumperState::Pressed)]
        );
    }

    #[test]
    fn test_cliff_and_wheel_transitions() {
        let cliff = CliffEvent {
            previous: 0x00,
            current: CLIFF_LEFT,
            bottom: Some([10, 20, 30]),
        };
        assert_eq!(
            cliff.transitions().as_slice(),
            &[(CliffSensor::Left, CliffState::Cliff)]
        );

        let wheel = WheelEvent {
            previous: WHEEL_DROP_RIGHT,
            current: WHEEL_DROP_LEFT,
        };
        assert_eq!(
            wheel.transitions().as_slice(),
            &[(Wheel::Right, WheelState::Raised), (Wheel::Left, WheelState::Dropped)]
        );
    }

    #[test]
    fn test_power_kinds_plug_and_unplug() {
        let discharging = PowerState::default();
        let adapter = PowerState {
            charger: 22,
            battery: BatteryLevel::Healthy,
        };
        let dock = PowerState {
            charger: 6,
            battery: BatteryLevel::Healthy,
        };

        let plugged = PowerEvent {
            previous: discharging,
            current: adapter,
            battery_dv: 160,
        };
        assert_eq!(plugged.kinds().as_slice(), &[PowerEventKind::PluggedToAdapter]);

        let docked = PowerEvent {
            previous: discharging,
            current: dock,
            battery_dv: 160,
        };
        assert_eq!(docked.kinds().as_slice(), &[PowerEventKind::PluggedToDockbase]);

        let unplugged = PowerEvent {
            previous: dock,
            current: discharging,
            battery_dv: 160,
        };
        assert_eq!(unplugged.kinds().as_slice(), &[PowerEventKind::Unplugged]);
    }

    #[test]
    fn test_power_kinds_charge_completed_and_battery() {
        let charging = PowerState {
            charger: 6,
            battery: BatteryLevel::Low,
        };
        let charged = PowerState {
            charger: 2,
            battery: BatteryLevel::Healthy,
        };
        let event = PowerEvent {
            previous: charging,
            current: charged,
            battery_dv: 165,
        };
        assert_eq!(
            event.kinds().as_slice(),
            &[PowerEventKind::ChargeCompleted, PowerEventKind::BatteryRecovered]
        );
        assert!((event.voltage() - 16.5).abs() < 1e-9);

        let critical = PowerEvent {
            previous: PowerState::default(),
            current: PowerState {
                charger: 0,
                battery: BatteryLevel::Critical,
            },
            battery_dv: 130,
        };
        assert_eq!(critical.kinds().as_slice(), &[PowerEventKind::BatteryCritical]);
    }

    #[test]
    fn test_input_values() {
        let event = InputEvent {
            previous: 0x00,
            current: 0x09,
        };
        assert_eq!(event.values(), [true, false, false, true]);
        assert_eq!(event.changed(), 0x09);
    }

    #[test]
    fn test_robot_event_helpers() {
        let event = RobotEvent {
            previous: RobotSafety::default(),
            current: RobotSafety {
                online: true,
                over_current: OVER_CURRENT_RIGHT,
            },
        };
        assert!(event.came_online());
        assert!(!event.went_offline());
        assert_eq!(
            event.over_current_transitions().as_slice(),
            &[(Wheel::Right, true)]
        );
    }

    #[test]
    fn test_version_info_packing() {
        let info = VersionInfo::new(
            Version {
                major: 1,
                minor: 0,
                patch: 4,
            },
            Version {
                major: 1,
                minor: 2,
                patch: 0,
            },
            UniqueDeviceId { udid: [1, 2, 3] },
        );
        assert_eq!(info.hardware, 0x01_00_04);
        assert_eq!(info.firmware, 0x01_02_00);
        assert_eq!(info.firmware_version().to_string(), "1.2.0");

        let req = semver::VersionReq::parse(">=1.1.0, <2.0.0").unwrap();
        assert!(info.firmware_matches(&req));

        let old = VersionInfo {
            firmware: 0x01_00_09,
            ..info
        };
        assert!(!old.firmware_matches(&req));
    }

    #[test]
    fn test_software_version_matches_crate() {
        let packed = VersionInfo::software_version();
        let expected = semver::Version::parse(env!("CARGO_PKG_VERSION")).unwrap();
        assert_eq!(Version::from_u32(packed).major as u64, expected.major);
        assert_eq!(Version::from_u32(packed).minor as u64, expected.minor);
    }
}
