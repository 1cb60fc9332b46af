//! 帧内子包解码
//!
//! 按 `(TAG, LEN)` 头依次迭代子包，对已知 TAG 查表解析，对未知 TAG 按声明
//! 长度跳过。任何子包出错都会中止当前帧，但不会留下跨帧状态。

use crate::constants::SUB_HEADER_LEN;
use crate::frame::RawFrame;
use crate::packets::{SubPacket, Tag};
use crate::DecodeError;
use smallvec::SmallVec;
use tracing::trace;

/// 一帧的解码结果：待合并进 `Snapshot` 的子包集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDelta {
    /// 已解析的子包（按帧内顺序）
    pub packets: SmallVec<[SubPacket; 6]>,
    /// 被跳过的未知 TAG
    pub unknown_tags: SmallVec<[u8; 2]>,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// 本帧是否携带指定 TAG
    pub fn contains(&self, tag: Tag) -> bool {
        self.packets.iter().any(|p| p.tag() == tag)
    }
}

/// 子包解码器
///
/// 无状态；同一帧内相同 TAG 出现多次时按出现顺序全部保留，合并时后者覆盖前者。
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketDecoder;

impl PacketDecoder {
    pub fn new() -> Self {
        Self
    }

    /// 解码一帧
    ///
    /// # 错误
    /// - `HeaderTruncated`: 剩余字节不足一个子包头
    /// - `Overrun`: 子包声明长度超出帧内剩余字节
    /// - `InvalidLength` / `Malformed`: 已知 TAG 的长度与布局不符
    pub fn decode(&self, frame: &RawFrame) -> Result<SnapshotDelta, DecodeError> {
        let payload = frame.payload();
        let mut delta = SnapshotDelta::default();
        let mut offset = 0;

        while offset < payload.len() {
            if payload.len() - offset < SUB_HEADER_LEN {
                return Err(DecodeError::HeaderTruncated { offset });
            }
            let raw_tag = payload[offset];
            let declared = payload[offset + 1] as usize;
            let body_start = offset + SUB_HEADER_LEN;
            let remaining = payload.len() - body_start;
            if declared > remaining {
                return Err(DecodeError::Overrun {
                    tag: raw_tag,
                    declared,
                    remaining,
                });
            }
            let body = &payload[body_start..body_start + declared];

            match Tag::try_from(raw_tag) {
                Ok(tag) => delta.packets.push(SubPacket::parse(tag, body)?),
                Err(_) => {
                    trace!("Skipping unknown sub-packet 0x{:02X} ({} bytes)", raw_tag, declared);
                    delta.unknown_tags.push(raw_tag);
                },
            }

            offset = body_start + declared;
        }

        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::{CoreSensors, Current, DockInfraRed};

    fn decode(payload: &[u8]) -> Result<SnapshotDelta, DecodeError> {
        PacketDecoder::new().decode(&RawFrame::from_payload(payload.to_vec()))
    }

    #[test]
    fn test_decode_empty_frame() {
        let delta = decode(&[]).unwrap();
        assert!(delta.is_empty());
        assert!(delta.unknown_tags.is_empty());
    }

    #[test]
    fn test_decode_multiple_sub_packets() {
        let core = CoreSensors {
            buttons: 0x02,
            ..Default::default()
        };
        let mut payload = vec![1, 15];
        payload.extend_from_slice(&core.to_bytes());
        payload.extend_from_slice(&[3, 3, 1, 2, 4]);
        payload.extend_from_slice(&[6, 2, 7, 8]);

        let delta = decode(&payload).unwrap();
        assert_eq!(
            delta.packets.as_slice(),
            &[
                SubPacket::CoreSensors(core),
                SubPacket::DockInfraRed(DockInfraRed {
                    right: 1,
                    central: 2,
                    left: 4
                }),
                SubPacket::Current(Current { left: 7, right: 8 }),
            ]
        );
        assert!(delta.contains(Tag::DockInfraRed));
        assert!(!delta.contains(Tag::Inertia));
    }

    #[test]
    fn test_unknown_tag_skipped() {
        // TAG 0x7F 未知，长度 3；之后的电流子包仍应被解析
        let payload = [0x7F, 3, 0xAA, 0xBB, 0xCC, 6, 2, 1, 1];
        let delta = decode(&payload).unwrap();
        assert_eq!(delta.unknown_tags.as_slice(), &[0x7F]);
        assert_eq!(
            delta.packets.as_slice(),
            &[SubPacket::Current(Current { left: 1, right: 1 })]
        );
    }

    #[test]
    fn test_overrun_aborts_frame() {
        let payload = [6, 2, 1, 1, 1, 15, 0, 0];
        assert_eq!(
            decode(&payload),
            Err(DecodeError::Overrun {
                tag: 1,
                declared: 15,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_unknown_tag_overrun_is_error() {
        let payload = [0x7F, 10, 0, 0];
        assert!(matches!(
            decode(&payload),
            Err(DecodeError::Overrun { tag: 0x7F, .. })
        ));
    }

    #[test]
    fn test_truncated_header() {
        let payload = [6, 2, 1, 1, 6];
        assert_eq!(
            decode(&payload),
            Err(DecodeError::HeaderTruncated { offset: 4 })
        );
    }

    #[test]
    fn test_known_tag_wrong_length() {
        let payload = [6, 3, 1, 1, 1];
        assert_eq!(
            decode(&payload),
            Err(DecodeError::InvalidLength {
                tag: Tag::Current,
                expected: 2,
                actual: 3
            })
        );
    }
}
