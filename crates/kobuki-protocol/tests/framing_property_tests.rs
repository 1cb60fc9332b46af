//! 帧重组与解码的属性测试
//!
//! 使用 proptest 验证失步恢复、分片无关性和解码器的健壮性。

use kobuki_protocol::*;
use proptest::prelude::*;

/// 不含帧头首字节的噪声（避免意外构成有效帧）
fn noise() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>().prop_filter("no header byte", |b| *b != 0xAA), 1..64)
}

/// 由若干电流/红外子包组成的合法载荷
fn payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec((any::<u8>(), any::<u8>(), any::<bool>()), 0..8).prop_map(|items| {
        let mut builder = FrameBuilder::new();
        for (a, b, dock) in items {
            builder = if dock {
                builder.sub_packet(Tag::DockInfraRed.as_u8(), &[a, b, a ^ b])
            } else {
                builder.sub_packet(Tag::Current.as_u8(), &[a, b])
            };
        }
        builder.build().unwrap()
    })
}

fn payload_of(wire: &[u8]) -> &[u8] {
    &wire[3..wire.len() - 1]
}

proptest! {
    /// 噪声 + 有效帧：恰好一个失步错误，然后是该帧
    #[test]
    fn noise_then_frame_resyncs_once(noise in noise(), wire in payload()) {
        let mut bytes = noise.clone();
        bytes.extend_from_slice(&wire);

        let mut reassembler = FrameReassembler::new();
        let out: Vec<_> = reassembler.feed(&bytes).collect();

        prop_assert_eq!(out.len(), 2);
        prop_assert_eq!(
            out[0].clone(),
            Err(FramingError::Resync { discarded: noise.len(), checksum_failures: 0 })
        );
        let frame = out[1].clone().unwrap();
        prop_assert_eq!(frame.payload(), payload_of(&wire));
    }

    /// 无论如何切片输入，产出的帧序列相同
    #[test]
    fn chunking_does_not_change_output(
        frames in prop::collection::vec(payload(), 1..6),
        chunk in 1usize..32,
    ) {
        let bytes: Vec<u8> = frames.iter().flatten().copied().collect();

        let mut whole = FrameReassembler::new();
        let expected: Vec<_> = whole.feed(&bytes).collect();

        let mut pieces = FrameReassembler::new();
        let mut actual = Vec::new();
        for part in bytes.chunks(chunk) {
            actual.extend(pieces.feed(part));
        }

        prop_assert_eq!(&actual, &expected);
        prop_assert_eq!(actual.len(), frames.len());
    }

    /// 一次输入远超缓冲区上限时，每个帧仍被交付且没有失步
    #[test]
    fn oversized_input_keeps_every_frame(wire in payload(), repeat in 1usize..400) {
        let bytes = wire.repeat(repeat);

        let mut reassembler = FrameReassembler::with_capacity(0);
        let out: Vec<_> = reassembler.feed(&bytes).collect();

        prop_assert_eq!(out.len(), repeat);
        for frame in out {
            let frame = frame.unwrap();
            prop_assert_eq!(frame.payload(), payload_of(&wire));
        }
    }

    /// 合法载荷总能被完整解码
    #[test]
    fn valid_payload_decodes(wire in payload()) {
        let frame = RawFrame::from_payload(payload_of(&wire).to_vec());
        let delta = PacketDecoder::new().decode(&frame);
        prop_assert!(delta.is_ok());
    }

    /// 任意载荷都不会让解码器 panic，且失败时不产出部分结果
    #[test]
    fn arbitrary_payload_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
        let frame = RawFrame::from_payload(bytes);
        let _ = PacketDecoder::new().decode(&frame);
    }
}

#[test]
fn test_noise_with_fake_headers() {
    // 噪声里的假帧头：一个校验失败，一个长度超长
    let good = FrameBuilder::new()
        .sub_packet(Tag::Current.as_u8(), &[1, 2])
        .build()
        .unwrap();
    let mut bytes = vec![0x10, 0xAA, 0x55, 0x02, 0x06, 0x00, 0xEE, 0x20, 0xAA, 0x55, 0xF0];
    bytes.extend_from_slice(&good);

    let mut reassembler = FrameReassembler::new();
    // 长度超长的假帧头一直等待，直到帧超时
    assert!(reassembler.feed(&bytes).next().is_none());
    assert_eq!(reassembler.discard_pending(), 3);

    let out: Vec<_> = reassembler.feed(&[]).collect();
    assert_eq!(out.len(), 2);
    match &out[0] {
        Err(FramingError::Resync {
            discarded,
            checksum_failures,
        }) => {
            assert_eq!(*discarded, 11);
            assert_eq!(*checksum_failures, 1);
        },
        other => panic!("Expected Resync, got {:?}", other),
    }
    assert_eq!(out[1].as_ref().unwrap().payload(), &[6, 2, 1, 2]);
}

#[test]
fn test_decode_error_isolated_to_frame() {
    let bad = FrameBuilder::new().raw(&[1, 15, 0]).build().unwrap();
    let good = FrameBuilder::new()
        .sub_packet(Tag::Current.as_u8(), &[3, 4])
        .build()
        .unwrap();
    let mut bytes = bad;
    bytes.extend_from_slice(&good);

    let decoder = PacketDecoder::new();
    let mut reassembler = FrameReassembler::new();
    let mut snapshot = Snapshot::new();
    let mut errors = 0;
    for frame in reassembler.feed(&bytes) {
        match decoder.decode(&frame.unwrap()) {
            Ok(delta) => snapshot.apply(&delta),
            Err(_) => errors += 1,
        }
    }

    assert_eq!(errors, 1);
    assert_eq!(snapshot.frame_count, 1);
    assert_eq!(snapshot.current, Some(Current { left: 3, right: 4 }));
}
