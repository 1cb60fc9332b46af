//! 子包结构体定义
//!
//! 每个子包由 `TAG | LEN | BODY` 组成，本模块给出每种 TAG 的固定布局，
//! 并提供从 BODY 字节解析的方法和物理量转换方法。
//!
//! 多字节整数均为小端字节序。

use crate::constants::*;
use crate::{DecodeError, bytes_to_i16_le, bytes_to_u16_le, bytes_to_u32_le};
use bilge::prelude::*;
use smallvec::SmallVec;

// ============================================================================
// TAG 定义
// ============================================================================

/// 子包类型标识
///
/// 未列出的 TAG 由解码器按声明长度跳过（向前兼容），不会导致整帧失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Tag {
    CoreSensors = 1,
    DockInfraRed = 3,
    Inertia = 4,
    Cliff = 5,
    Current = 6,
    HardwareVersion = 10,
    FirmwareVersion = 11,
    ThreeAxisGyro = 13,
    GeneralPurposeInput = 16,
    UniqueDeviceId = 19,
    ControllerInfo = 21,
}

impl Tag {
    /// 所有已知 TAG（按数值升序）
    pub const ALL: [Tag; 11] = [
        Tag::CoreSensors,
        Tag::DockInfraRed,
        Tag::Inertia,
        Tag::Cliff,
        Tag::Current,
        Tag::HardwareVersion,
        Tag::FirmwareVersion,
        Tag::ThreeAxisGyro,
        Tag::GeneralPurposeInput,
        Tag::UniqueDeviceId,
        Tag::ControllerInfo,
    ];

    /// 固定布局长度
    ///
    /// `ThreeAxisGyro` 为变长子包（`2 + 6N`），返回 `None`。
    pub const fn fixed_len(self) -> Option<usize> {
        match self {
            Tag::CoreSensors => Some(15),
            Tag::DockInfraRed => Some(3),
            Tag::Inertia => Some(7),
            Tag::Cliff => Some(6),
            Tag::Current => Some(2),
            Tag::HardwareVersion => Some(4),
            Tag::FirmwareVersion => Some(4),
            Tag::ThreeAxisGyro => None,
            Tag::GeneralPurposeInput => Some(16),
            Tag::UniqueDeviceId => Some(12),
            Tag::ControllerInfo => Some(13),
        }
    }

    /// TAG 原始值
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 校验固定长度子包的 BODY 长度
fn expect_len(tag: Tag, body: &[u8]) -> Result<(), DecodeError> {
    match tag.fixed_len() {
        Some(expected) if body.len() != expected => Err(DecodeError::InvalidLength {
            tag,
            expected,
            actual: body.len(),
        }),
        _ => Ok(()),
    }
}

// ============================================================================
// 位域定义
// ============================================================================

/// 保险杠位域（CoreSensors Byte 2）
///
/// - Bit 0: 右
/// - Bit 1: 中
/// - Bit 2: 左
/// - Bit 3-7: 保留
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct BumperFlags {
    pub right: bool,
    pub center: bool,
    pub left: bool,
    pub reserved: u5,
}

/// 悬崖传感器位域（CoreSensors Byte 4），位序与保险杠相同
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct CliffFlags {
    pub right: bool,
    pub center: bool,
    pub left: bool,
    pub reserved: u5,
}

/// 轮子悬空位域（CoreSensors Byte 3）
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct WheelDropFlags {
    pub right: bool, // Bit 0
    pub left: bool,  // Bit 1
    pub reserved: u6,
}

/// 按键位域（CoreSensors Byte 11）
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct ButtonFlags {
    pub button0: bool,
    pub button1: bool,
    pub button2: bool,
    pub reserved: u5,
}

/// 过流位域（CoreSensors Byte 14）
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct OverCurrentFlags {
    pub left: bool,  // Bit 0
    pub right: bool, // Bit 1
    pub reserved: u6,
}

// ============================================================================
// 充电器状态
// ============================================================================

/// 充电器状态（CoreSensors Byte 12）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ChargerState {
    /// 放电中（未接电源）
    #[default]
    Discharging = 0,
    /// 底座供电，已充满
    DockingCharged = 2,
    /// 底座供电，充电中
    DockingCharging = 6,
    /// 适配器供电，已充满
    AdapterCharged = 18,
    /// 适配器供电，充电中
    AdapterCharging = 22,
}

/// 电源来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerSource {
    None,
    Dock,
    Adapter,
}

/// 从原始充电器字节推导电源来源
///
/// 只看 Bit 1（已接入）和 Bit 4（适配器），固件新增的状态值也能归类。
pub fn power_source(charger: u8) -> PowerSource {
    if charger & CHARGER_PLUGGED == 0 {
        PowerSource::None
    } else if charger & CHARGER_ADAPTER != 0 {
        PowerSource::Adapter
    } else {
        PowerSource::Dock
    }
}

/// 是否正在充电
pub fn is_charging(charger: u8) -> bool {
    charger & CHARGER_CHARGING != 0
}

// ============================================================================
// 子包结构体
// ============================================================================

/// 基础传感器 (TAG 1)
///
/// 约 50Hz 随每帧下发，包含离散状态判定所需的全部位掩码。
/// - 编码器：16 位无符号，回绕计数
/// - 电池：单位 0.1V
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoreSensors {
    pub timestamp_ms: u16,  // Byte 0-1
    pub bumper: u8,         // Byte 2
    pub wheel_drop: u8,     // Byte 3
    pub cliff: u8,          // Byte 4
    pub left_encoder: u16,  // Byte 5-6
    pub right_encoder: u16, // Byte 7-8
    pub left_pwm: i8,       // Byte 9
    pub right_pwm: i8,      // Byte 10
    pub buttons: u8,        // Byte 11
    pub charger: u8,        // Byte 12
    pub battery: u8,        // Byte 13: 0.1V
    pub over_current: u8,   // Byte 14
}

impl CoreSensors {
    /// 从 BODY 字节解析
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        expect_len(Tag::CoreSensors, body)?;
        Ok(Self {
            timestamp_ms: bytes_to_u16_le([body[0], body[1]]),
            bumper: body[2],
            wheel_drop: body[3],
            cliff: body[4],
            left_encoder: bytes_to_u16_le([body[5], body[6]]),
            right_encoder: bytes_to_u16_le([body[7], body[8]]),
            left_pwm: body[9] as i8,
            right_pwm: body[10] as i8,
            buttons: body[11],
            charger: body[12],
            battery: body[13],
            over_current: body[14],
        })
    }

    /// 编码为 BODY 字节（用于模拟器和测试夹具）
    pub fn to_bytes(&self) -> [u8; 15] {
        let mut out = [0u8; 15];
        out[0..2].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        out[2] = self.bumper;
        out[3] = self.wheel_drop;
        out[4] = self.cliff;
        out[5..7].copy_from_slice(&self.left_encoder.to_le_bytes());
        out[7..9].copy_from_slice(&self.right_encoder.to_le_bytes());
        out[9] = self.left_pwm as u8;
        out[10] = self.right_pwm as u8;
        out[11] = self.buttons;
        out[12] = self.charger;
        out[13] = self.battery;
        out[14] = self.over_current;
        out
    }

    pub fn bumper_flags(&self) -> BumperFlags {
        BumperFlags::from(u8::new(self.bumper))
    }

    pub fn cliff_flags(&self) -> CliffFlags {
        CliffFlags::from(u8::new(self.cliff))
    }

    pub fn wheel_drop_flags(&self) -> WheelDropFlags {
        WheelDropFlags::from(u8::new(self.wheel_drop))
    }

    pub fn button_flags(&self) -> ButtonFlags {
        ButtonFlags::from(u8::new(self.buttons))
    }

    pub fn over_current_flags(&self) -> OverCurrentFlags {
        OverCurrentFlags::from(u8::new(self.over_current))
    }

    /// 充电器状态（未知值归为 `Discharging`，需要原始值时读 `charger` 字段）
    pub fn charger_state(&self) -> ChargerState {
        ChargerState::from(self.charger)
    }

    /// 电池电压（V）
    pub fn battery_voltage(&self) -> f64 {
        self.battery as f64 / 10.0
    }
}

/// 回充红外 (TAG 3)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DockInfraRed {
    pub right: u8,
    pub central: u8,
    pub left: u8,
}

impl DockInfraRed {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        expect_len(Tag::DockInfraRed, body)?;
        Ok(Self {
            right: body[0],
            central: body[1],
            left: body[2],
        })
    }
}

/// 惯性数据 (TAG 4)
///
/// 单位：角度 0.01°，角速度 0.01°/s（原始值）。Byte 4-6 保留。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Inertia {
    pub angle: i16,      // Byte 0-1
    pub angle_rate: i16, // Byte 2-3
}

impl Inertia {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        expect_len(Tag::Inertia, body)?;
        Ok(Self {
            angle: bytes_to_i16_le([body[0], body[1]]),
            angle_rate: bytes_to_i16_le([body[2], body[3]]),
        })
    }

    /// 航向角（度）
    pub fn heading_deg(&self) -> f64 {
        self.angle as f64 / 100.0
    }

    /// 航向角（弧度）
    pub fn heading_rad(&self) -> f64 {
        self.heading_deg().to_radians()
    }

    /// 角速度（度/秒）
    pub fn angular_velocity_deg(&self) -> f64 {
        self.angle_rate as f64 / 100.0
    }
}

/// 悬崖传感器 ADC (TAG 5)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cliff {
    /// [右, 中, 左]
    pub bottom: [u16; 3],
}

impl Cliff {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        expect_len(Tag::Cliff, body)?;
        Ok(Self {
            bottom: [
                bytes_to_u16_le([body[0], body[1]]),
                bytes_to_u16_le([body[2], body[3]]),
                bytes_to_u16_le([body[4], body[5]]),
            ],
        })
    }
}

/// 电机电流 (TAG 6)，单位 10mA
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Current {
    pub left: u8,
    pub right: u8,
}

impl Current {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        expect_len(Tag::Current, body)?;
        Ok(Self {
            left: body[0],
            right: body[1],
        })
    }

    /// 左右电机电流（A）
    pub fn amps(&self) -> [f64; 2] {
        [self.left as f64 * 0.01, self.right as f64 * 0.01]
    }
}

/// 版本号（硬件 TAG 10 / 固件 TAG 11 共用布局）
///
/// 线上顺序为 `patch, minor, major, reserved`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    fn parse(tag: Tag, body: &[u8]) -> Result<Self, DecodeError> {
        expect_len(tag, body)?;
        Ok(Self {
            patch: body[0],
            minor: body[1],
            major: body[2],
        })
    }

    /// 打包为 `major << 16 | minor << 8 | patch`
    pub fn to_u32(self) -> u32 {
        ((self.major as u32) << 16) | ((self.minor as u32) << 8) | self.patch as u32
    }

    /// 从打包值还原
    pub fn from_u32(value: u32) -> Self {
        Self {
            major: (value >> 16) as u8,
            minor: (value >> 8) as u8,
            patch: value as u8,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// 三轴陀螺仪原始数据 (TAG 13)
///
/// 变长子包：`frame_id u8 | followed_len u8 | N × (x, y, z) u16`，
/// 其中 `followed_len == 3N`，子包长度为 `2 + 6N`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThreeAxisGyro {
    pub frame_id: u8,
    pub samples: SmallVec<[[u16; 3]; 3]>,
}

impl ThreeAxisGyro {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        if body.len() < 2 || (body.len() - 2) % 6 != 0 {
            return Err(DecodeError::Malformed {
                tag: Tag::ThreeAxisGyro,
                reason: "length must be 2 + 6N",
            });
        }
        let count = (body.len() - 2) / 6;
        if body[1] as usize != count * 3 {
            return Err(DecodeError::Malformed {
                tag: Tag::ThreeAxisGyro,
                reason: "followed length disagrees with sample count",
            });
        }

        let samples = body[2..]
            .chunks_exact(6)
            .map(|c| {
                [
                    bytes_to_u16_le([c[0], c[1]]),
                    bytes_to_u16_le([c[2], c[3]]),
                    bytes_to_u16_le([c[4], c[5]]),
                ]
            })
            .collect();

        Ok(Self {
            frame_id: body[0],
            samples,
        })
    }
}

/// 通用输入 (TAG 16)
///
/// 数字输入只有低 4 位有效；模拟输入 4 路，12 位 ADC。Byte 10-15 保留。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeneralPurposeInput {
    pub digital: u16,
    pub analog: [u16; 4],
}

impl GeneralPurposeInput {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        expect_len(Tag::GeneralPurposeInput, body)?;
        let mut analog = [0u16; 4];
        for (i, value) in analog.iter_mut().enumerate() {
            let offset = 2 + i * 2;
            *value = bytes_to_u16_le([body[offset], body[offset + 1]]);
        }
        Ok(Self {
            digital: bytes_to_u16_le([body[0], body[1]]),
            analog,
        })
    }

    /// 4 路数字输入掩码
    pub fn digital_mask(&self) -> u8 {
        (self.digital & DIGITAL_INPUT_MASK) as u8
    }
}

/// 设备唯一 ID (TAG 19)，96 位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UniqueDeviceId {
    pub udid: [u32; 3],
}

impl UniqueDeviceId {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        expect_len(Tag::UniqueDeviceId, body)?;
        Ok(Self {
            udid: [
                bytes_to_u32_le([body[0], body[1], body[2], body[3]]),
                bytes_to_u32_le([body[4], body[5], body[6], body[7]]),
                bytes_to_u32_le([body[8], body[9], body[10], body[11]]),
            ],
        })
    }
}

impl std::fmt::Display for UniqueDeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08X}-{:08X}-{:08X}",
            self.udid[0], self.udid[1], self.udid[2]
        )
    }
}

/// 轮速控制器 PID 参数 (TAG 21)
///
/// 增益为 1000 倍定点数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerInfo {
    /// 0: 出厂参数，1: 用户参数
    pub kind: u8,
    pub p_gain: u32,
    pub i_gain: u32,
    pub d_gain: u32,
}

impl ControllerInfo {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        expect_len(Tag::ControllerInfo, body)?;
        Ok(Self {
            kind: body[0],
            p_gain: bytes_to_u32_le([body[1], body[2], body[3], body[4]]),
            i_gain: bytes_to_u32_le([body[5], body[6], body[7], body[8]]),
            d_gain: bytes_to_u32_le([body[9], body[10], body[11], body[12]]),
        })
    }

    pub fn gains(&self) -> [f64; 3] {
        [
            self.p_gain as f64 / 1000.0,
            self.i_gain as f64 / 1000.0,
            self.d_gain as f64 / 1000.0,
        ]
    }
}

// ============================================================================
// 统一子包类型
// ============================================================================

/// 一个已解码的子包
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubPacket {
    CoreSensors(CoreSensors),
    DockInfraRed(DockInfraRed),
    Inertia(Inertia),
    Cliff(Cliff),
    Current(Current),
    HardwareVersion(Version),
    FirmwareVersion(Version),
    ThreeAxisGyro(ThreeAxisGyro),
    GeneralPurposeInput(GeneralPurposeInput),
    UniqueDeviceId(UniqueDeviceId),
    ControllerInfo(ControllerInfo),
}

impl SubPacket {
    /// 按 TAG 查表解析 BODY
    pub fn parse(tag: Tag, body: &[u8]) -> Result<Self, DecodeError> {
        Ok(match tag {
            Tag::CoreSensors => SubPacket::CoreSensors(CoreSensors::parse(body)?),
            Tag::DockInfraRed => SubPacket::DockInfraRed(DockInfraRed::parse(body)?),
            Tag::Inertia => SubPacket::Inertia(Inertia::parse(body)?),
            Tag::Cliff => SubPacket::Cliff(Cliff::parse(body)?),
            Tag::Current => SubPacket::Current(Current::parse(body)?),
            Tag::HardwareVersion => SubPacket::HardwareVersion(Version::parse(tag, body)?),
            Tag::FirmwareVersion => SubPacket::FirmwareVersion(Version::parse(tag, body)?),
            Tag::ThreeAxisGyro => SubPacket::ThreeAxisGyro(ThreeAxisGyro::parse(body)?),
            Tag::GeneralPurposeInput => {
                SubPacket::GeneralPurposeInput(GeneralPurposeInput::parse(body)?)
            },
            Tag::UniqueDeviceId => SubPacket::UniqueDeviceId(UniqueDeviceId::parse(body)?),
            Tag::ControllerInfo => SubPacket::ControllerInfo(ControllerInfo::parse(body)?),
        })
    }

    pub fn tag(&self) -> Tag {
        match self {
            SubPacket::CoreSensors(_) => Tag::CoreSensors,
            SubPacket::DockInfraRed(_) => Tag::DockInfraRed,
            SubPacket::Inertia(_) => Tag::Inertia,
            SubPacket::Cliff(_) => Tag::Cliff,
            SubPacket::Current(_) => Tag::Current,
            SubPacket::HardwareVersion(_) => Tag::HardwareVersion,
            SubPacket::FirmwareVersion(_) => Tag::FirmwareVersion,
            SubPacket::ThreeAxisGyro(_) => Tag::ThreeAxisGyro,
            SubPacket::GeneralPurposeInput(_) => Tag::GeneralPurposeInput,
            SubPacket::UniqueDeviceId(_) => Tag::UniqueDeviceId,
            SubPacket::ControllerInfo(_) => Tag::ControllerInfo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_from_u8() {
        assert_eq!(Tag::try_from(1u8).unwrap(), Tag::CoreSensors);
        assert_eq!(Tag::try_from(19u8).unwrap(), Tag::UniqueDeviceId);
        assert!(Tag::try_from(2u8).is_err());
        assert!(Tag::try_from(0xFFu8).is_err());
    }

    #[test]
    fn test_core_sensors_parse() {
        let body = [
            0x34, 0x12, // timestamp
            0x05, // bumper: right + left
            0x02, // wheel drop: left
            0x00, // cliff
            0x10, 0x00, // left encoder
            0x20, 0x01, // right encoder
            0xFF, // left pwm = -1
            0x05, // right pwm
            0x01, // buttons
            0x06, // charger: docking charging
            0xA5, // battery 16.5V
            0x00, // over current
        ];
        let core = CoreSensors::parse(&body).unwrap();
        assert_eq!(core.timestamp_ms, 0x1234);
        assert_eq!(core.left_encoder, 0x0010);
        assert_eq!(core.right_encoder, 0x0120);
        assert_eq!(core.left_pwm, -1);
        assert_eq!(core.charger_state(), ChargerState::DockingCharging);
        assert!((core.battery_voltage() - 16.5).abs() < 1e-9);

        let bumper = core.bumper_flags();
        assert!(bumper.right());
        assert!(!bumper.center());
        assert!(bumper.left());
        assert!(core.wheel_drop_flags().left());
        assert!(!core.wheel_drop_flags().right());
        assert!(core.button_flags().button0());

        assert_eq!(core.to_bytes(), body);
    }

    #[test]
    fn test_core_sensors_invalid_length() {
        let result = CoreSensors::parse(&[0u8; 14]);
        assert!(matches!(
            result,
            Err(DecodeError::InvalidLength {
                tag: Tag::CoreSensors,
                expected: 15,
                actual: 14
            })
        ));
    }

    #[test]
    fn test_power_source() {
        assert_eq!(power_source(0), PowerSource::None);
        assert_eq!(power_source(2), PowerSource::Dock);
        assert_eq!(power_source(6), PowerSource::Dock);
        assert_eq!(power_source(18), PowerSource::Adapter);
        assert_eq!(power_source(22), PowerSource::Adapter);
        assert!(is_charging(22));
        assert!(!is_charging(18));
    }

    #[test]
    fn test_version_wire_order() {
        // patch, minor, major, reserved
        let packet = SubPacket::parse(Tag::FirmwareVersion, &[3, 2, 1, 0]).unwrap();
        let SubPacket::FirmwareVersion(v) = packet else {
            panic!("Expected FirmwareVersion");
        };
        assert_eq!(v, Version { major: 1, minor: 2, patch: 3 });
        assert_eq!(v.to_u32(), 0x010203);
        assert_eq!(Version::from_u32(0x010203), v);
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn test_gyro_parse() {
        let body = [7, 6, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0];
        let gyro = ThreeAxisGyro::parse(&body).unwrap();
        assert_eq!(gyro.frame_id, 7);
        assert_eq!(gyro.samples.as_slice(), &[[1, 2, 3], [4, 5, 6]]);
    }

    #[test]
    fn test_gyro_inconsistent_length() {
        // followed_len 说 2 组样本，实际只有 1 组
        let body = [7, 6, 1, 0, 2, 0, 3, 0];
        assert!(matches!(
            ThreeAxisGyro::parse(&body),
            Err(DecodeError::Malformed { tag: Tag::ThreeAxisGyro, .. })
        ));
        assert!(ThreeAxisGyro::parse(&[7, 3, 1, 0, 2]).is_err());
    }

    #[test]
    fn test_gpio_digital_mask() {
        let mut body = [0u8; 16];
        body[0] = 0xF5; // 高 4 位应被屏蔽
        body[2] = 0x10;
        body[3] = 0x02;
        let input = GeneralPurposeInput::parse(&body).unwrap();
        assert_eq!(input.digital_mask(), 0x05);
        assert_eq!(input.analog[0], 0x0210);
    }

    #[test]
    fn test_udid_display() {
        let mut body = [0u8; 12];
        body[0..4].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
        body[8..12].copy_from_slice(&1u32.to_le_bytes());
        let id = UniqueDeviceId::parse(&body).unwrap();
        assert_eq!(id.to_string(), "DEADBEEF-00000000-00000001");
    }
}
