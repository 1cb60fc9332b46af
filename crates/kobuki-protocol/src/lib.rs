//! # Kobuki Protocol
//!
//! Kobuki 移动底盘串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量定义
//! - `frame`: 字节流重组（帧头查找、校验、失步恢复）
//! - `packets`: 子包布局与解析
//! - `decoder`: 帧内子包迭代解码
//! - `snapshot`: 跨帧合并的最新状态
//!
//! ## 帧格式
//!
//! ```text
//! 0xAA 0x55 | LEN | PAYLOAD (LEN bytes) | CS
//! PAYLOAD = { TAG | SUBLEN | BODY (SUBLEN bytes) }*
//! CS = LEN ^ PAYLOAD[0] ^ ... ^ PAYLOAD[LEN-1]
//! ```
//!
//! ## 字节序
//!
//! 多字节整数均为小端字节序。

pub mod constants;
pub mod decoder;
pub mod frame;
pub mod packets;
pub mod snapshot;

// 重新导出常用类型
pub use decoder::{PacketDecoder, SnapshotDelta};
pub use frame::{FrameBuilder, FrameReassembler, Frames, RawFrame, checksum};
pub use packets::*;
pub use snapshot::Snapshot;

use thiserror::Error;

/// 帧重组错误（可恢复）
///
/// 失步期间的所有异常（噪声字节、校验失败的候选帧）被累积为一个
/// `Resync`，在下一个有效帧之前报告一次。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error(
        "Resynchronized after discarding {discarded} bytes ({checksum_failures} checksum failures)"
    )]
    Resync {
        discarded: usize,
        checksum_failures: usize,
    },

    #[error("Payload too long: {len} bytes (max 255)")]
    PayloadTooLong { len: usize },
}

/// 子包解码错误（仅中止当前帧）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated sub-packet header at offset {offset}")]
    HeaderTruncated { offset: usize },

    #[error("Sub-packet 0x{tag:02X} declares {declared} bytes but only {remaining} remain")]
    Overrun {
        tag: u8,
        declared: usize,
        remaining: usize,
    },

    #[error("Invalid length for {tag:?}: expected {expected}, got {actual}")]
    InvalidLength {
        tag: Tag,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed {tag:?}: {reason}")]
    Malformed { tag: Tag, reason: &'static str },
}

/// 字节序转换工具函数
///
/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// 小端字节序转 i16
pub fn bytes_to_i16_le(bytes: [u8; 2]) -> i16 {
    i16::from_le_bytes(bytes)
}

/// 小端字节序转 u32
pub fn bytes_to_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_u16_le() {
        assert_eq!(bytes_to_u16_le([0x34, 0x12]), 0x1234);
    }

    #[test]
    fn test_bytes_to_i16_le_negative() {
        assert_eq!(bytes_to_i16_le([0xFF, 0xFF]), -1);
        assert_eq!(bytes_to_i16_le([0x18, 0xFC]), -1000);
    }

    #[test]
    fn test_bytes_to_u32_le() {
        assert_eq!(bytes_to_u32_le([0x78, 0x56, 0x34, 0x12]), 0x12345678);
    }

    #[test]
    fn test_error_display() {
        let err = DecodeError::Overrun {
            tag: 0x01,
            declared: 15,
            remaining: 3,
        };
        assert_eq!(
            err.to_string(),
            "Sub-packet 0x01 declares 15 bytes but only 3 remain"
        );

        let err = FramingError::Resync {
            discarded: 7,
            checksum_failures: 1,
        };
        assert!(err.to_string().contains("7 bytes"));
    }
}
