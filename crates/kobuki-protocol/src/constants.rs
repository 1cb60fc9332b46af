//! 协议常量定义

/// 帧头第 1 字节
pub const HEADER_0: u8 = 0xAA;

/// 帧头第 2 字节
pub const HEADER_1: u8 = 0x55;

/// 帧头长度（`0xAA 0x55`）
pub const HEADER_LEN: usize = 2;

/// 帧开销：帧头 2 字节 + 长度 1 字节 + 校验 1 字节
pub const FRAME_OVERHEAD: usize = HEADER_LEN + 2;

/// 子包头长度（tag + length）
pub const SUB_HEADER_LEN: usize = 2;

/// 重组缓冲区默认容量（字节）
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

// ============================================================================
// 位定义（CoreSensors 内的位掩码）
// ============================================================================

pub const BUMPER_RIGHT: u8 = 0x01;
pub const BUMPER_CENTER: u8 = 0x02;
pub const BUMPER_LEFT: u8 = 0x04;

pub const CLIFF_RIGHT: u8 = 0x01;
pub const CLIFF_CENTER: u8 = 0x02;
pub const CLIFF_LEFT: u8 = 0x04;

pub const WHEEL_DROP_RIGHT: u8 = 0x01;
pub const WHEEL_DROP_LEFT: u8 = 0x02;

pub const BUTTON_0: u8 = 0x01;
pub const BUTTON_1: u8 = 0x02;
pub const BUTTON_2: u8 = 0x04;

pub const OVER_CURRENT_LEFT: u8 = 0x01;
pub const OVER_CURRENT_RIGHT: u8 = 0x02;

/// GPIO 数字输入的有效位（4 路）
pub const DIGITAL_INPUT_MASK: u16 = 0x000F;

// ============================================================================
// 充电器状态位
// ============================================================================

/// 已接入电源（底座或适配器）
pub const CHARGER_PLUGGED: u8 = 0x02;
/// 正在充电
pub const CHARGER_CHARGING: u8 = 0x04;
/// 电源来自适配器（否则来自底座）
pub const CHARGER_ADAPTER: u8 = 0x10;
